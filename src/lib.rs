//! Monte Carlo solver for the number of months of saving needed before a
//! pension and ISA portfolio can fund a target retirement income.

pub mod api;
pub mod core;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Installs the global `tracing` subscriber. `RUST_LOG` directives are
/// honoured; this crate logs at `info` unless told otherwise.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt};

        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = "fire_solver=info".parse() {
            filter = filter.add_directive(directive);
        }
        if fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init().is_ok() {
            tracing::info!("fire-solver tracing initialized");
        }
    });
}

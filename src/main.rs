use std::env;

#[tokio::main]
async fn main() {
    fire_solver::init_tracing();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port = raw_args
                .get(2)
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            if let Err(e) = fire_solver::api::run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Some("solve") => {
            let cli_args = raw_args
                .iter()
                .take(1)
                .chain(raw_args.iter().skip(2))
                .cloned();
            if let Err(e) = fire_solver::api::run_cli(cli_args) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Usage: fire-solver serve [port]");
            eprintln!("       fire-solver solve --help");
            std::process::exit(1);
        }
    }
}

use super::tax::{income_tax, net_after_tax};
use super::types::{AccountState, PensionRules, TaxSchedule, WithdrawalDecision};

const MAX_BISECTION_STEPS: u32 = 20;
const NET_PRECISION: f64 = 1.0;
// Worst combined marginal rate is 60% inside the allowance taper, so this
// many gross units always cover one net unit under the default bands.
const GROSS_UP_BOUND: f64 = 2.5;

pub const MIN_OPTIMIZER_YEARS: u32 = 5;
pub const MAX_LOOKAHEAD_YEARS: u32 = 25;
const LOOKAHEAD_RETURN_DISCOUNT: f64 = 0.75;
const COARSE_STEP: f64 = 0.10;
const FINE_SPAN: f64 = 0.08;
const FINE_STEP: f64 = 0.02;

#[derive(Debug, Clone, Copy)]
pub struct WithdrawalContext {
    pub tax: TaxSchedule,
    pub rules: PensionRules,
    pub price_index: f64,
    pub tolerance: f64,
}

impl WithdrawalContext {
    fn schedule(&self) -> TaxSchedule {
        self.tax.indexed(self.price_index)
    }

    fn next_year(&self, inflation: f64) -> Self {
        Self {
            price_index: self.price_index * (1.0 + inflation),
            ..*self
        }
    }

    pub fn state_pension_gross(&self, age: f64) -> f64 {
        if age < self.rules.state_pension_age {
            0.0
        } else {
            (self.rules.state_pension_annual * self.price_index).max(0.0)
        }
    }

    pub fn state_pension_net(&self, age: f64) -> f64 {
        net_after_tax(self.state_pension_gross(age), &self.schedule())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Lookahead {
    pub years_remaining: u32,
    pub expected_return: f64,
    pub inflation: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PensionDraw {
    gross: f64,
    tax_free: f64,
    tax: f64,
    net: f64,
}

pub fn allocate_withdrawal(
    state: &AccountState,
    target_net: f64,
    age: f64,
    ctx: &WithdrawalContext,
    lookahead: Option<Lookahead>,
) -> WithdrawalDecision {
    let ratio = match lookahead {
        Some(view) if optimizer_applies(state, age, ctx, view) => {
            optimal_pension_ratio(state, target_net, age, ctx, view)
        }
        _ => 1.0,
    };
    allocate_with_ratio(state, target_net, age, ctx, ratio)
}

fn optimizer_applies(
    state: &AccountState,
    age: f64,
    ctx: &WithdrawalContext,
    view: Lookahead,
) -> bool {
    view.years_remaining > MIN_OPTIMIZER_YEARS
        && state.pension > 0.0
        && state.isa > 0.0
        && age >= ctx.rules.pension_access_age
}

pub fn allocate_with_ratio(
    state: &AccountState,
    target_net: f64,
    age: f64,
    ctx: &WithdrawalContext,
    pension_ratio: f64,
) -> WithdrawalDecision {
    let schedule = ctx.schedule();
    let pension_ratio = pension_ratio.clamp(0.0, 1.0);

    let state_pension_gross = ctx.state_pension_gross(age);
    let state_pension_tax = income_tax(state_pension_gross, &schedule);
    let state_pension_net = (state_pension_gross - state_pension_tax).max(0.0);
    let remaining = (target_net.max(0.0) - state_pension_net).max(0.0);

    let isa_available = state.isa.max(0.0);
    let mut decision = WithdrawalDecision {
        state_pension_gross,
        tax_paid: state_pension_tax,
        net_income: state_pension_net,
        allowance_used: state.allowance_used,
        ..WithdrawalDecision::default()
    };

    if remaining <= 0.0 {
        return decision;
    }

    if age < ctx.rules.pension_access_age {
        let from_isa = isa_available.min(remaining);
        decision.from_isa = from_isa;
        decision.net_income += from_isa;
        return decision;
    }

    let isa_first = isa_available.min(remaining * (1.0 - pension_ratio));
    let allowance_remaining =
        (ctx.rules.lifetime_tax_free_allowance - state.allowance_used).max(0.0);
    let draw = draw_pension_for_net(
        state.pension.max(0.0),
        remaining - isa_first,
        state_pension_gross,
        allowance_remaining,
        ctx.rules.tax_free_fraction,
        &schedule,
    );
    let shortfall = (remaining - isa_first - draw.net).max(0.0);
    let isa_top_up = (isa_available - isa_first).min(shortfall).max(0.0);

    decision.from_pension = draw.gross;
    decision.from_isa = isa_first + isa_top_up;
    decision.pension_tax_free = draw.tax_free;
    decision.tax_paid += draw.tax;
    decision.net_income += draw.net + isa_first + isa_top_up;
    decision.allowance_used = (state.allowance_used + draw.tax_free)
        .min(ctx.rules.lifetime_tax_free_allowance.max(state.allowance_used));
    decision
}

fn pension_net_for_gross(
    gross: f64,
    base_income: f64,
    allowance_remaining: f64,
    tax_free_fraction: f64,
    schedule: &TaxSchedule,
) -> PensionDraw {
    if gross <= 0.0 {
        return PensionDraw::default();
    }
    let tax_free = (gross * tax_free_fraction.clamp(0.0, 1.0)).min(allowance_remaining);
    let taxable = gross - tax_free;
    let tax = (income_tax(base_income + taxable, schedule) - income_tax(base_income, schedule))
        .max(0.0);
    PensionDraw {
        gross,
        tax_free,
        tax,
        net: (gross - tax).max(0.0),
    }
}

fn draw_pension_for_net(
    available: f64,
    net_needed: f64,
    base_income: f64,
    allowance_remaining: f64,
    tax_free_fraction: f64,
    schedule: &TaxSchedule,
) -> PensionDraw {
    if net_needed <= 0.0 || available <= 0.0 {
        return PensionDraw::default();
    }
    let net_of = |gross: f64| {
        pension_net_for_gross(
            gross,
            base_income,
            allowance_remaining,
            tax_free_fraction,
            schedule,
        )
    };

    let everything = net_of(available);
    if everything.net <= net_needed {
        return everything;
    }

    let mut lo = 0.0;
    let mut hi = (net_needed * GROSS_UP_BOUND).min(available);
    if net_of(hi).net < net_needed {
        hi = available;
    }

    for _ in 0..MAX_BISECTION_STEPS {
        if net_of(hi).net - net_needed <= NET_PRECISION {
            break;
        }
        let mid = (lo + hi) * 0.5;
        if net_of(mid).net < net_needed {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    net_of(hi)
}

pub fn optimal_pension_ratio(
    state: &AccountState,
    target_net: f64,
    age: f64,
    ctx: &WithdrawalContext,
    view: Lookahead,
) -> f64 {
    let coarse_steps = (1.0 / COARSE_STEP).round() as u32;
    let mut best_ratio = 0.0;
    let mut best_score = None;
    for step in 0..=coarse_steps {
        let ratio = step as f64 * COARSE_STEP;
        let score = years_survived(state, target_net, age, ctx, view, ratio);
        if best_score.is_none_or(|best| score > best) {
            best_ratio = ratio;
            best_score = Some(score);
        }
    }

    let coarse_best = best_ratio;
    let fine_steps = (2.0 * FINE_SPAN / FINE_STEP).round() as u32;
    for step in 0..=fine_steps {
        let ratio = coarse_best - FINE_SPAN + step as f64 * FINE_STEP;
        if !(0.0..=1.0).contains(&ratio) || (ratio - coarse_best).abs() < 1e-9 {
            continue;
        }
        let score = years_survived(state, target_net, age, ctx, view, ratio);
        if best_score.is_none_or(|best| score > best) {
            best_ratio = ratio;
            best_score = Some(score);
        }
    }

    best_ratio
}

fn years_survived(
    state: &AccountState,
    target_net: f64,
    age: f64,
    ctx: &WithdrawalContext,
    view: Lookahead,
    ratio: f64,
) -> u32 {
    let horizon = view.years_remaining.min(MAX_LOOKAHEAD_YEARS);
    let growth = view.expected_return * LOOKAHEAD_RETURN_DISCOUNT;

    let mut projected = *state;
    let mut year_ctx = *ctx;
    let mut target = target_net;
    for year in 0..horizon {
        let decision = allocate_with_ratio(&projected, target, age + year as f64, &year_ctx, ratio);
        if decision.net_income + year_ctx.tolerance < target {
            return year;
        }
        projected.apply_withdrawal(&decision);
        projected.apply_return(growth);
        target *= 1.0 + view.inflation;
        year_ctx = year_ctx.next_year(view.inflation);
    }
    horizon
}

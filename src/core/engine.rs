use super::money::{Pence, clamp_non_negative, div_rate, grow, mul_rate};
use super::types::{AccountState, AdhocWithdrawals, Strategy, TaxParameters, YearSnapshot};

/// Snapshot sequence plus the total net spending the run could not fund.
/// Unmet need is not an error: exhausted pools simply produce years with
/// lower-than-requested effective spending.
#[derive(Debug, Clone)]
pub struct TimelineOutcome {
    pub years: Vec<YearSnapshot>,
    pub unmet_need: Pence,
}

/// Per-run policy state threaded through the year transitions.
#[derive(Debug, Clone, Copy)]
struct PolicyState {
    lump_sum_taken: bool,
}

#[derive(Debug, Clone, Copy)]
struct YearOutcome {
    tax_paid: Pence,
    unmet: Pence,
}

/// A single pension withdrawal: how much left the pot, the net cash it
/// yielded, the tax due, and the personal allowance it consumed. Callers
/// running multiple withdrawals in one year must subtract
/// `allowance_consumed` before the next call.
#[derive(Debug, Clone, Copy)]
struct PensionWithdrawal {
    gross: Pence,
    net: Pence,
    tax: Pence,
    allowance_consumed: Pence,
}

impl PensionWithdrawal {
    const NONE: PensionWithdrawal = PensionWithdrawal {
        gross: 0,
        net: 0,
        tax: 0,
        allowance_consumed: 0,
    };
}

pub fn run_timeline(
    strategy: Strategy,
    initial: AccountState,
    required_net_annual: Pence,
    adhoc: &AdhocWithdrawals,
    params: &TaxParameters,
) -> Vec<YearSnapshot> {
    run_timeline_checked(strategy, initial, required_net_annual, adhoc, params).years
}

pub fn run_timeline_checked(
    strategy: Strategy,
    initial: AccountState,
    required_net_annual: Pence,
    adhoc: &AdhocWithdrawals,
    params: &TaxParameters,
) -> TimelineOutcome {
    let mut state = initial;
    let mut policy = PolicyState {
        lump_sum_taken: false,
    };

    let year_count = params.end_age.saturating_sub(params.start_age) as usize + 1;
    let mut years = Vec::with_capacity(year_count);
    let mut unmet_need = 0;

    for age in params.start_age..=params.end_age {
        let pension_start = state.pension;
        let other_start = state.other_savings;
        let isa_start = state.isa_savings;

        let extra = adhoc.get(&age).copied().unwrap_or(0);
        let need = clamp_non_negative(
            required_net_annual + extra - params.state_pension_income(age),
        );

        let outcome = apply_year(strategy, &mut state, need, age, params, &mut policy);
        unmet_need += outcome.unmet;

        state.pension = grow(state.pension, params.pension_growth_rate);

        years.push(YearSnapshot {
            age,
            pension_start,
            pension_end: state.pension,
            other_start,
            other_end: state.other_savings,
            isa_start,
            isa_end: state.isa_savings,
            tax_paid: outcome.tax_paid,
            extra_this_year: extra,
        });
    }

    TimelineOutcome { years, unmet_need }
}

fn apply_year(
    strategy: Strategy,
    state: &mut AccountState,
    need: Pence,
    age: u32,
    params: &TaxParameters,
    policy: &mut PolicyState,
) -> YearOutcome {
    match strategy {
        Strategy::LumpSumFirst => lump_sum_first_year(state, need, age, params, policy),
        Strategy::SavingsFirstUfpls => savings_first_year(state, need, age, params),
        Strategy::AllowanceFillUfpls => allowance_fill_year(state, need, age, params, false),
        Strategy::AllowanceFillWithTopUp => allowance_fill_year(state, need, age, params, true),
        Strategy::BasicBandFill => band_fill_year(state, need, age, params),
        Strategy::PensionFirstUfpls => pension_first_year(state, need, age, params),
    }
}

fn allowance_for_year(age: u32, params: &TaxParameters) -> Pence {
    clamp_non_negative(params.personal_allowance - params.state_pension_income(age))
}

/// Draw up to `amount` net from savings, other pool first, then ISA.
/// Returns the amount actually drawn.
fn draw_from_savings(state: &mut AccountState, amount: Pence) -> Pence {
    if amount <= 0 {
        return 0;
    }
    let from_other = amount.min(state.other_savings);
    state.other_savings -= from_other;
    let from_isa = (amount - from_other).min(state.isa_savings);
    state.isa_savings -= from_isa;
    from_other + from_isa
}

/// UFPLS gross-up: the pre-tax withdrawal needed to yield `net_needed` when
/// each withdrawal splits into a tax-free fraction and a taxable fraction,
/// with `allowance_left` of the taxable slice shielded from tax.
fn ufpls_gross_up(
    net_needed: Pence,
    allowance_left: Pence,
    params: &TaxParameters,
    pension_balance: Pence,
) -> PensionWithdrawal {
    if net_needed <= 0 || pension_balance <= 0 {
        return PensionWithdrawal::NONE;
    }

    let taxed_portion = params.taxed_portion();
    if taxed_portion <= 0.0 {
        // Fully tax-free withdrawals: net always equals gross.
        let gross = net_needed.min(pension_balance);
        return PensionWithdrawal {
            gross,
            net: gross,
            tax: 0,
            allowance_consumed: 0,
        };
    }

    let rate = params.basic_rate;
    let within_allowance_cap = div_rate(allowance_left, taxed_portion);
    let gross_required = if net_needed <= within_allowance_cap {
        net_needed
    } else {
        let adjusted = clamp_non_negative(net_needed - mul_rate(allowance_left, rate));
        let net_factor = params.tax_free_portion + taxed_portion * (1.0 - rate);
        div_rate(adjusted, net_factor)
    };

    let gross = gross_required.min(pension_balance);
    let taxable = mul_rate(gross, taxed_portion);
    let zero_tax = taxable.min(allowance_left);
    let taxed_above = clamp_non_negative(taxable - zero_tax);
    let tax = mul_rate(taxed_above, rate);

    PensionWithdrawal {
        gross,
        net: gross - tax,
        tax,
        allowance_consumed: zero_tax,
    }
}

/// Plain income-tax withdrawal from an already fully crystallised pot: no
/// tax-free fraction, every pound above the allowance taxed at basic rate.
/// Net and tax are rounded independently, matching the reference totals.
fn crystallised_gross_up(
    net_needed: Pence,
    allowance_left: Pence,
    params: &TaxParameters,
    pension_balance: Pence,
) -> PensionWithdrawal {
    if net_needed <= 0 || pension_balance <= 0 {
        return PensionWithdrawal::NONE;
    }

    let rate = params.basic_rate;
    let gross_required = if net_needed <= allowance_left {
        net_needed
    } else {
        allowance_left + div_rate(net_needed - allowance_left, 1.0 - rate)
    };

    let gross = gross_required.min(pension_balance);
    let zero_tax = gross.min(allowance_left);
    let taxed = clamp_non_negative(gross - zero_tax);

    PensionWithdrawal {
        gross,
        net: zero_tax + mul_rate(taxed, 1.0 - rate),
        tax: mul_rate(taxed, rate),
        allowance_consumed: zero_tax,
    }
}

/// Withdraw gross up to the point where the taxable slice exactly fills the
/// remaining allowance, so net equals gross and no tax arises. `net_cap`
/// additionally caps the withdrawal at the remaining spending need.
fn zero_tax_fill(
    net_cap: Option<Pence>,
    allowance_left: Pence,
    params: &TaxParameters,
    pension_balance: Pence,
) -> PensionWithdrawal {
    if pension_balance <= 0 || allowance_left <= 0 {
        return PensionWithdrawal::NONE;
    }

    let taxed_portion = params.taxed_portion();
    let mut gross = if taxed_portion <= 0.0 {
        pension_balance
    } else {
        div_rate(allowance_left, taxed_portion).min(pension_balance)
    };
    if let Some(cap) = net_cap {
        gross = gross.min(cap);
    }
    if gross <= 0 {
        return PensionWithdrawal::NONE;
    }

    let taxable = mul_rate(gross, taxed_portion);
    PensionWithdrawal {
        gross,
        net: gross,
        tax: 0,
        allowance_consumed: taxable.min(allowance_left),
    }
}

fn lump_sum_first_year(
    state: &mut AccountState,
    need: Pence,
    age: u32,
    params: &TaxParameters,
    policy: &mut PolicyState,
) -> YearOutcome {
    let mut need = need;
    let mut tax_paid = 0;

    need -= draw_from_savings(state, need);

    // One-time tax-free lump sum into savings, only once savings fall short.
    if need > 0 && !policy.lump_sum_taken && state.pension > 0 {
        let lump = mul_rate(state.pension, params.tax_free_portion);
        state.pension -= lump;
        state.other_savings += lump;
        policy.lump_sum_taken = true;

        need -= draw_from_savings(state, need);
    }

    if need > 0 && state.pension > 0 {
        let withdrawal = crystallised_gross_up(
            need,
            allowance_for_year(age, params),
            params,
            state.pension,
        );
        state.pension -= withdrawal.gross;
        tax_paid += withdrawal.tax;
        need = clamp_non_negative(need - withdrawal.net);
    }

    YearOutcome {
        tax_paid,
        unmet: need,
    }
}

fn savings_first_year(
    state: &mut AccountState,
    need: Pence,
    age: u32,
    params: &TaxParameters,
) -> YearOutcome {
    let mut need = need;
    let mut tax_paid = 0;

    need -= draw_from_savings(state, need);

    if need > 0 && state.pension > 0 {
        let withdrawal =
            ufpls_gross_up(need, allowance_for_year(age, params), params, state.pension);
        state.pension -= withdrawal.gross;
        tax_paid += withdrawal.tax;
        need = clamp_non_negative(need - withdrawal.net);
    }

    YearOutcome {
        tax_paid,
        unmet: need,
    }
}

/// Shared transition for the allowance-fill strategies: zero-tax UFPLS up to
/// the allowance headroom first (even when savings could cover the year),
/// then savings, then a grossed-up pension top-up, then savings again.
/// `contribute` adds the annual no-income pension contribution beforehand.
fn allowance_fill_year(
    state: &mut AccountState,
    need: Pence,
    age: u32,
    params: &TaxParameters,
    contribute: bool,
) -> YearOutcome {
    let mut need = need;
    let mut tax_paid = 0;

    // Basic-rate relief: paying `gross x (1 - rate)` from savings credits the
    // full gross amount to the pension. Allowed without earnings up to the
    // no-income limit while age <= 75.
    if contribute && age <= 75 && state.savings_total() > 0 {
        let relief_factor = 1.0 - params.basic_rate;
        let net_cap = mul_rate(params.no_income_contribution_limit_gross, relief_factor);
        let net_paid = draw_from_savings(state, net_cap);
        if net_paid > 0 {
            state.pension += div_rate(net_paid, relief_factor);
        }
    }

    if need > 0 && state.pension > 0 {
        let mut allowance_left = allowance_for_year(age, params);

        let fill = zero_tax_fill(Some(need), allowance_left, params, state.pension);
        state.pension -= fill.gross;
        need = clamp_non_negative(need - fill.net);
        allowance_left = clamp_non_negative(allowance_left - fill.allowance_consumed);

        if need > 0 {
            need -= draw_from_savings(state, need);
        }

        if need > 0 && state.pension > 0 {
            let withdrawal = ufpls_gross_up(need, allowance_left, params, state.pension);
            state.pension -= withdrawal.gross;
            tax_paid += withdrawal.tax;
            need = clamp_non_negative(need - withdrawal.net);
        }
    }

    if need > 0 {
        need -= draw_from_savings(state, need);
    }

    YearOutcome {
        tax_paid,
        unmet: need,
    }
}

/// Pension-first two-stage fill: the allowance headroom at zero tax, then the
/// remaining basic-rate band at basic rate. The pooled net proceeds meet the
/// year's need; any surplus is banked into other savings.
fn band_fill_year(
    state: &mut AccountState,
    need: Pence,
    age: u32,
    params: &TaxParameters,
) -> YearOutcome {
    let mut need = need;
    let mut tax_paid = 0;

    let state_pension = params.state_pension_income(age);
    let mut allowance_left = allowance_for_year(age, params);
    let mut net_from_pension = 0;

    if state.pension > 0 && allowance_left > 0 {
        let fill = zero_tax_fill(None, allowance_left, params, state.pension);
        state.pension -= fill.gross;
        allowance_left = clamp_non_negative(allowance_left - fill.allowance_consumed);
        net_from_pension += fill.net;
    }

    if state.pension > 0 {
        // State pension income above the allowance already occupies part of
        // the basic-rate band.
        let taxable_state_pension =
            clamp_non_negative(state_pension - params.personal_allowance);
        let remaining_band = clamp_non_negative(params.basic_rate_band - taxable_state_pension);

        if remaining_band > 0 {
            let taxed_portion = params.taxed_portion();
            let gross_target = if taxed_portion <= 0.0 {
                state.pension
            } else {
                div_rate(remaining_band + allowance_left, taxed_portion)
            };
            let gross = gross_target.min(state.pension);

            if gross > 0 {
                let taxable = mul_rate(gross, taxed_portion);
                let zero_tax = taxable.min(allowance_left);
                let taxed_above = clamp_non_negative(taxable - zero_tax);
                let tax = mul_rate(taxed_above, params.basic_rate);

                state.pension -= gross;
                tax_paid += tax;
                net_from_pension += gross - tax;
            }
        }
    }

    if net_from_pension > 0 {
        let spent = net_from_pension.min(need);
        need -= spent;
        state.other_savings += net_from_pension - spent;
    }

    if need > 0 {
        need -= draw_from_savings(state, need);
    }

    YearOutcome {
        tax_paid,
        unmet: need,
    }
}

fn pension_first_year(
    state: &mut AccountState,
    need: Pence,
    age: u32,
    params: &TaxParameters,
) -> YearOutcome {
    let mut need = need;
    let mut tax_paid = 0;

    if need > 0 && state.pension > 0 {
        let withdrawal =
            ufpls_gross_up(need, allowance_for_year(age, params), params, state.pension);
        state.pension -= withdrawal.gross;
        tax_paid += withdrawal.tax;
        need = clamp_non_negative(need - withdrawal.net);
    }

    if need > 0 {
        need -= draw_from_savings(state, need);
    }

    YearOutcome {
        tax_paid,
        unmet: need,
    }
}

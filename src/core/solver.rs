use serde::Serialize;

use super::engine::run_timeline_checked;
use super::money::Pence;
use super::types::{AccountState, AdhocWithdrawals, Strategy, TaxParameters};

/// Bisection search configuration for the maximum sustainable annual net
/// spend. Bounds and tolerance are pence.
#[derive(Debug, Clone, Copy)]
pub struct SolveConfig {
    pub search_min: Pence,
    pub search_max: Pence,
    pub tolerance: Pence,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveIteration {
    pub iteration: u32,
    pub lower_bound: Pence,
    pub upper_bound: Pence,
    pub candidate_value: Pence,
    pub fully_funded: bool,
    pub unmet_need: Pence,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub solved_value: Option<Pence>,
    pub iterations: Vec<SolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// Find the largest annual net spend the strategy can fund through `end_age`
/// with zero unmet need. The simulation is deterministic, so plain bisection
/// between the bounds converges to within the tolerance.
pub fn solve_max_spending(
    strategy: Strategy,
    initial: AccountState,
    adhoc: &AdhocWithdrawals,
    params: &TaxParameters,
    config: SolveConfig,
) -> Result<SolveResult, String> {
    validate_config(config)?;

    let unmet = |spend: Pence| {
        run_timeline_checked(strategy, initial, spend, adhoc, params).unmet_need
    };

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);

    if unmet(config.search_min) > 0 {
        return Ok(SolveResult {
            solved_value: None,
            iterations,
            converged: false,
            feasible: false,
            message: "Lower spending bound is already unfundable within the search bounds."
                .to_string(),
        });
    }

    if unmet(config.search_max) == 0 {
        return Ok(SolveResult {
            solved_value: Some(config.search_max),
            iterations,
            converged: true,
            feasible: true,
            message: "Upper spending bound is still fully funded; increase search max for more."
                .to_string(),
        });
    }

    let mut lo = config.search_min;
    let mut hi = config.search_max;
    let mut converged = false;
    let mut it = 0;

    while it < config.max_iterations {
        it += 1;
        let mid = lo + (hi - lo) / 2;
        let unmet_need = unmet(mid);
        let fully_funded = unmet_need == 0;
        iterations.push(SolveIteration {
            iteration: it,
            lower_bound: lo,
            upper_bound: hi,
            candidate_value: mid,
            fully_funded,
            unmet_need,
        });

        if fully_funded {
            lo = mid;
        } else {
            hi = mid;
        }

        if hi - lo <= config.tolerance {
            converged = true;
            break;
        }
    }

    let message = if converged {
        "Solved maximum sustainable spending.".to_string()
    } else {
        "Reached max iterations before tolerance was met; returning best estimate.".to_string()
    };

    Ok(SolveResult {
        solved_value: Some(lo),
        iterations,
        converged,
        feasible: true,
        message,
    })
}

fn validate_config(config: SolveConfig) -> Result<(), String> {
    if config.search_min < 0 {
        return Err("searchMin must be >= 0".to_string());
    }
    if config.search_max <= config.search_min {
        return Err("searchMax must be greater than searchMin".to_string());
    }
    if config.tolerance <= 0 {
        return Err("tolerance must be > 0".to_string());
    }
    if config.max_iterations == 0 {
        return Err("maxIterations must be > 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn solver_params() -> TaxParameters {
        TaxParameters {
            personal_allowance: 12_570_00,
            state_pension_annual: 11_973_00,
            basic_rate: 0.20,
            basic_rate_band: 37_700_00,
            tax_free_portion: 0.25,
            pension_growth_rate: 0.0,
            no_income_contribution_limit_gross: 3_600_00,
            start_age: 60,
            end_age: 60,
        }
    }

    fn assert_close(actual: Pence, expected: Pence, tolerance: Pence) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}, tolerance {tolerance}"
        );
    }

    #[test]
    fn solver_finds_savings_only_ceiling() {
        // £50,000 of savings and one year to fund: the ceiling is £50,000.
        let config = SolveConfig {
            search_min: 0,
            search_max: 100_000_00,
            tolerance: 1_00,
            max_iterations: 48,
        };

        let result = solve_max_spending(
            Strategy::SavingsFirstUfpls,
            AccountState {
                pension: 0,
                other_savings: 50_000_00,
                isa_savings: 0,
            },
            &BTreeMap::new(),
            &solver_params(),
            config,
        )
        .expect("must solve");

        assert!(result.feasible);
        assert!(result.converged);
        assert_close(
            result.solved_value.expect("value expected"),
            50_000_00,
            config.tolerance + 1,
        );
    }

    #[test]
    fn solver_finds_pension_only_ceiling_net_of_tax() {
        // Draining a £100k pot through UFPLS in one year nets £87,514:
        // taxable £75,000, £12,570 shielded, 20% on the rest.
        let config = SolveConfig {
            search_min: 0,
            search_max: 100_000_00,
            tolerance: 1_00,
            max_iterations: 48,
        };

        let result = solve_max_spending(
            Strategy::PensionFirstUfpls,
            AccountState {
                pension: 100_000_00,
                other_savings: 0,
                isa_savings: 0,
            },
            &BTreeMap::new(),
            &solver_params(),
            config,
        )
        .expect("must solve");

        assert!(result.feasible);
        assert_close(
            result.solved_value.expect("value expected"),
            87_514_00,
            config.tolerance + 1,
        );
    }

    #[test]
    fn solver_reports_infeasible_when_lower_bound_is_unfundable() {
        let config = SolveConfig {
            search_min: 10_000_00,
            search_max: 50_000_00,
            tolerance: 1_00,
            max_iterations: 32,
        };

        let result = solve_max_spending(
            Strategy::SavingsFirstUfpls,
            AccountState {
                pension: 0,
                other_savings: 5_000_00,
                isa_savings: 0,
            },
            &BTreeMap::new(),
            &solver_params(),
            config,
        )
        .expect("must return result");

        assert!(!result.feasible);
        assert!(result.solved_value.is_none());
    }

    #[test]
    fn solver_returns_upper_bound_when_it_is_still_funded() {
        let config = SolveConfig {
            search_min: 0,
            search_max: 1_000_00,
            tolerance: 1_00,
            max_iterations: 32,
        };

        let result = solve_max_spending(
            Strategy::SavingsFirstUfpls,
            AccountState {
                pension: 0,
                other_savings: 50_000_00,
                isa_savings: 0,
            },
            &BTreeMap::new(),
            &solver_params(),
            config,
        )
        .expect("must solve");

        assert!(result.converged);
        assert_eq!(result.solved_value, Some(1_000_00));
    }

    #[test]
    fn solver_rejects_inverted_bounds() {
        let config = SolveConfig {
            search_min: 10_00,
            search_max: 10_00,
            tolerance: 1_00,
            max_iterations: 32,
        };

        let err = solve_max_spending(
            Strategy::SavingsFirstUfpls,
            AccountState {
                pension: 0,
                other_savings: 0,
                isa_savings: 0,
            },
            &BTreeMap::new(),
            &solver_params(),
            config,
        )
        .expect_err("must reject");
        assert!(err.contains("searchMax"));
    }
}

mod engine;
mod money;
mod solver;
mod types;

pub use engine::{TimelineOutcome, run_timeline, run_timeline_checked};
pub use money::{
    Pence, clamp_non_negative, div_rate, format_gbp, from_pence, grow, mul_rate, to_pence,
};
pub use solver::{SolveConfig, SolveIteration, SolveResult, solve_max_spending};
pub use types::{
    AccountState, AdhocWithdrawals, STATE_PENSION_AGE, Strategy, TaxParameters, YearSnapshot,
};

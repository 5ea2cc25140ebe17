use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::money::Pence;

/// Age from which state pension income is received.
pub const STATE_PENSION_AGE: u32 = 67;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Savings first; a one-time tax-free lump sum into savings, then plain
    /// income-tax drawdown from the fully crystallised remainder.
    #[serde(alias = "strategy1", alias = "lumpSumFirst")]
    LumpSumFirst,
    /// Savings first; residual need grossed up via UFPLS each year.
    #[serde(alias = "strategy2", alias = "savingsFirstUfpls")]
    SavingsFirstUfpls,
    /// Fill the zero-tax UFPLS headroom from the pension every year, then
    /// savings, then a grossed-up top-up.
    #[serde(alias = "strategy3", alias = "allowanceFillUfpls")]
    AllowanceFillUfpls,
    /// AllowanceFillUfpls plus the annual no-income pension contribution from
    /// savings while age <= 75.
    #[serde(alias = "strategy3a", alias = "strategy3A", alias = "allowanceFillWithTopUp")]
    AllowanceFillWithTopUp,
    /// Fill the personal allowance then the basic-rate band from the pension;
    /// net surplus is banked into other savings.
    #[serde(alias = "strategy4", alias = "basicBandFill")]
    BasicBandFill,
    /// Gross up the whole need from the pension; savings only once the
    /// pension is exhausted.
    #[serde(alias = "strategy5", alias = "pensionFirstUfpls")]
    PensionFirstUfpls,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::LumpSumFirst,
        Strategy::SavingsFirstUfpls,
        Strategy::AllowanceFillUfpls,
        Strategy::AllowanceFillWithTopUp,
        Strategy::BasicBandFill,
        Strategy::PensionFirstUfpls,
    ];
}

/// Immutable tax-regime and horizon configuration for one simulation run.
/// Amounts are pence; rates are fractions (0.20 = 20%).
#[derive(Debug, Clone, Copy)]
pub struct TaxParameters {
    pub personal_allowance: Pence,
    pub state_pension_annual: Pence,
    pub basic_rate: f64,
    pub basic_rate_band: Pence,
    pub tax_free_portion: f64,
    pub pension_growth_rate: f64,
    pub no_income_contribution_limit_gross: Pence,
    pub start_age: u32,
    pub end_age: u32,
}

impl TaxParameters {
    pub fn state_pension_income(&self, age: u32) -> Pence {
        if age >= STATE_PENSION_AGE {
            self.state_pension_annual
        } else {
            0
        }
    }

    /// Taxable fraction of a UFPLS withdrawal.
    pub fn taxed_portion(&self) -> f64 {
        1.0 - self.tax_free_portion
    }
}

/// Per-run balances. Owned by exactly one (strategy, spend amount) run;
/// every run starts from the caller-supplied initial balances.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct AccountState {
    pub pension: Pence,
    pub other_savings: Pence,
    pub isa_savings: Pence,
}

impl AccountState {
    pub fn savings_total(&self) -> Pence {
        self.other_savings + self.isa_savings
    }

    pub fn total(&self) -> Pence {
        self.pension + self.savings_total()
    }
}

/// Extra net spending required at specific ages, additive to the annual
/// baseline. Ages outside the simulated range have no effect.
pub type AdhocWithdrawals = BTreeMap<u32, Pence>;

/// One simulated year, immutable once emitted.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSnapshot {
    pub age: u32,
    pub pension_start: Pence,
    pub pension_end: Pence,
    pub other_start: Pence,
    pub other_end: Pence,
    pub isa_start: Pence,
    pub isa_end: Pence,
    pub tax_paid: Pence,
    pub extra_this_year: Pence,
}

impl YearSnapshot {
    pub fn savings_start(&self) -> Pence {
        self.other_start + self.isa_start
    }

    pub fn savings_end(&self) -> Pence {
        self.other_end + self.isa_end
    }

    pub fn total_end(&self) -> Pence {
        self.pension_end + self.savings_end()
    }
}

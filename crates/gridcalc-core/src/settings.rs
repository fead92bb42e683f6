//! Calculation settings owned by a workbook

use rust_decimal::Decimal;

/// Knobs that control a recalculation pass
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CalculationSettings {
    /// Resolve circular references by iteration instead of flagging them
    pub iterative: bool,
    /// Upper bound on sweeps per cyclic component
    pub max_iterations: u32,
    /// Convergence threshold on the maximum absolute delta of a sweep
    pub epsilon: Decimal,
    /// Fractional digits kept when a numeric result is committed
    pub decimal_scale: u32,
    /// Formulas nested deeper than this are rejected
    pub max_nesting_depth: usize,
    /// Range references covering more cells than this are rejected
    pub max_range_cells: u64,
    /// Evaluate wide levels on the thread pool
    pub parallel: bool,
    /// Minimum level width before the thread pool is used
    pub parallel_threshold: usize,
}

impl Default for CalculationSettings {
    fn default() -> Self {
        Self {
            iterative: false,
            max_iterations: 100,
            epsilon: Decimal::new(1, 3),
            decimal_scale: 10,
            max_nesting_depth: 64,
            max_range_cells: 5_000_000,
            parallel: true,
            parallel_threshold: 64,
        }
    }
}

impl CalculationSettings {
    /// Enable iterative calculation
    pub fn with_iteration(mut self, max_iterations: u32, epsilon: Decimal) -> Self {
        self.iterative = true;
        self.max_iterations = max_iterations;
        self.epsilon = epsilon;
        self
    }

    /// Round a committed number to the configured scale
    pub fn round(&self, n: Decimal) -> Decimal {
        n.round_dp_with_strategy(
            self.decimal_scale,
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        )
    }
}

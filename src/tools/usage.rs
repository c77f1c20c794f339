use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::resilience::RateBudget;
use crate::usage::{HealthReport, UsageMetrics};

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct UsageRequest {
    /// Zero all counters after taking the snapshot.
    pub reset: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UsageReport {
    pub demo_mode: bool,
    pub metrics: UsageMetrics,
    pub error_rate: f64,
    pub health: HealthReport,
    pub rate_budget: BudgetInfo,
}

#[derive(Debug, Serialize)]
pub struct BudgetInfo {
    pub capacity: u32,
    pub tokens_available: f64,
    pub refill_rate_per_second: f64,
}

impl From<RateBudget> for BudgetInfo {
    fn from(budget: RateBudget) -> Self {
        Self {
            capacity: budget.capacity,
            tokens_available: budget.tokens_available,
            refill_rate_per_second: budget.refill_rate_per_second,
        }
    }
}

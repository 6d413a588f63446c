//! District performance record and its derived metrics.
//!
//! A record is keyed by `(region, period)` and carries raw programme figures
//! plus a `performance` block derived from them. The derivation helpers live
//! here so the upstream parser and the record store compute rates the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PeriodId, RecordKey, RegionId};

/// Percentages are reported as whole numbers in `0..=100`.
const MAX_PERCENT: f64 = 100.0;

/// Where the returned copy of a record actually came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Upstream,
    Cache,
    Store,
    Synthetic,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Upstream => write!(f, "upstream"),
            DataSource::Cache => write!(f, "cache"),
            DataSource::Store => write!(f, "store"),
            DataSource::Synthetic => write!(f, "synthetic"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct HeadCount {
    pub households: f64,
    pub persons: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct WorkProgress {
    pub total: f64,
    pub ongoing: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Budget {
    pub approved: f64,
    pub available: f64,
    pub expenditure: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct WagePayments {
    pub total: f64,
    pub pending_payments: f64,
    pub average_wage_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    /// Person-days of employment.
    pub employment_generated: f64,
    pub average_wage_days: f64,
    pub completion_rate: u8,
    pub utilization_rate: u8,
    pub transparency_score: u8,
}

impl Performance {
    /// Mean of completion, utilization and transparency, rounded.
    pub fn overall_score(&self) -> u8 {
        let sum = f64::from(self.completion_rate)
            + f64::from(self.utilization_rate)
            + f64::from(self.transparency_score);
        (sum / 3.0).round() as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Assets {
    pub individual_beneficiary: f64,
    pub public_works: f64,
    pub common_property: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SocialAudit {
    /// Gram panchayats where a social audit was conducted.
    pub conducted_units: f64,
    pub total_units: f64,
    pub issues_raised: f64,
    pub issues_resolved: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    pub last_updated: DateTime<Utc>,
    pub source: DataSource,
    pub verified: bool,
    /// 0-100
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub region_id: RegionId,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub period_id: PeriodId,
    pub demand: HeadCount,
    pub work_provided: HeadCount,
    pub works_completed: WorkProgress,
    pub budget: Budget,
    pub wage_payments: WagePayments,
    pub performance: Performance,
    pub assets: Assets,
    pub social_audit: SocialAudit,
    pub data_quality: DataQuality,
}

impl PerformanceRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.region_id.clone(), self.period_id)
    }

    pub fn overall_score(&self) -> u8 {
        self.performance.overall_score()
    }

    pub fn is_synthetic(&self) -> bool {
        self.data_quality.source == DataSource::Synthetic
    }

    /// Re-label provenance for a copy served from `tier`.
    ///
    /// Synthetic data stays synthetic no matter which tier returned it.
    pub fn served_from(mut self, tier: DataSource) -> Self {
        if !self.is_synthetic() {
            self.data_quality.source = tier;
        }
        self
    }

    /// Recompute the derived rates from the raw figures.
    ///
    /// Transparency depends on payload completeness and is left as parsed.
    pub fn recompute_performance(&mut self) {
        self.performance.completion_rate =
            completion_rate(self.works_completed.total, self.works_completed.ongoing);
        self.performance.utilization_rate =
            utilization_rate(self.budget.expenditure, self.budget.approved);
        if self.demand.persons > 0.0 {
            self.performance.employment_generated = self.work_provided.persons;
        }
    }
}

fn clamp_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, MAX_PERCENT) as u8
}

/// `round(100 * completed / (completed + ongoing))`, 0 when nothing is recorded.
pub fn completion_rate(completed: f64, ongoing: f64) -> u8 {
    let total = completed + ongoing;
    if total > 0.0 {
        clamp_percent(completed / total * 100.0)
    } else {
        0
    }
}

/// `round(100 * expenditure / approved)`, 0 when nothing is approved.
pub fn utilization_rate(expenditure: f64, approved: f64) -> u8 {
    if approved > 0.0 {
        clamp_percent(expenditure / approved * 100.0)
    } else {
        0
    }
}

/// Transparency: 60% social audit coverage plus 40% required-field completeness.
///
/// `required_present` counts how many of `required_total` key figures were
/// present and positive in the source payload.
pub fn transparency_score(
    audited_units: f64,
    total_units: f64,
    required_present: usize,
    required_total: usize,
) -> u8 {
    let mut score = 0.0;
    if audited_units != 0.0 && total_units != 0.0 {
        score += audited_units / total_units * 100.0 * 0.6;
    }
    if required_total > 0 {
        score += required_present as f64 / required_total as f64 * 40.0;
    }
    clamp_percent(score)
}

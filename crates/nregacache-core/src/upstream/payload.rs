//! Field-by-field coercion of the portal payload into a `PerformanceRecord`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::UpstreamError;
use crate::models::{
    record, Assets, Budget, DataQuality, DataSource, HeadCount, Performance, PerformanceRecord,
    PeriodId, RegionId, SocialAudit, WagePayments, WorkProgress,
};

/// Confidence attached to records parsed from the portal.
pub const UPSTREAM_CONFIDENCE: u8 = 95;

/// Fields whose presence counts towards the transparency score.
const REQUIRED_FIELDS: [&str; 4] = [
    "demand_households",
    "work_households",
    "budget_approved",
    "expenditure",
];

/// Portal payload as `field -> number`, `None` where the value was not numeric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPayload(HashMap<String, Option<f64>>);

impl RawPayload {
    /// Build from a decoded JSON body. Only a JSON object is accepted.
    pub fn from_json(value: &Value) -> Result<Self, UpstreamError> {
        let object = value.as_object().ok_or_else(|| {
            UpstreamError::InvalidResponse("expected a JSON object payload".to_string())
        })?;

        let fields = object
            .iter()
            .map(|(key, value)| (key.clone(), coerce_number(value)))
            .collect();
        Ok(Self(fields))
    }

    /// Numeric value of `field`, 0 when absent or not a number.
    pub fn number(&self, field: &str) -> f64 {
        self.0.get(field).copied().flatten().unwrap_or(0.0)
    }

    fn is_positive(&self, field: &str) -> bool {
        self.number(field) > 0.0
    }

    /// Convert into the canonical record, stamping `fetched_at`.
    pub fn into_record(
        &self,
        region: &RegionId,
        period: &PeriodId,
        fetched_at: DateTime<Utc>,
    ) -> PerformanceRecord {
        let n = |field: &str| self.number(field);

        let required_present = REQUIRED_FIELDS
            .iter()
            .filter(|field| self.is_positive(field))
            .count();

        PerformanceRecord {
            region_id: region.clone(),
            period_id: *period,
            demand: HeadCount {
                households: n("demand_households"),
                persons: n("demand_persons"),
            },
            work_provided: HeadCount {
                households: n("work_households"),
                persons: n("work_persons"),
            },
            works_completed: WorkProgress {
                total: n("works_completed"),
                ongoing: n("works_ongoing"),
            },
            budget: Budget {
                approved: n("budget_approved"),
                available: n("budget_available"),
                expenditure: n("expenditure"),
            },
            wage_payments: WagePayments {
                total: n("wage_payments"),
                pending_payments: n("pending_payments"),
                average_wage_rate: n("avg_wage_rate"),
            },
            performance: Performance {
                employment_generated: n("employment_generated"),
                average_wage_days: n("avg_wage_days"),
                completion_rate: record::completion_rate(
                    n("works_completed"),
                    n("works_ongoing"),
                ),
                utilization_rate: record::utilization_rate(
                    n("expenditure"),
                    n("budget_approved"),
                ),
                transparency_score: record::transparency_score(
                    n("audit_gps"),
                    n("total_gps"),
                    required_present,
                    REQUIRED_FIELDS.len(),
                ),
            },
            assets: Assets {
                individual_beneficiary: n("individual_assets"),
                public_works: n("public_works"),
                common_property: n("common_property"),
            },
            social_audit: SocialAudit {
                conducted_units: n("audit_gps"),
                total_units: n("total_gps"),
                issues_raised: n("issues_raised"),
                issues_resolved: n("issues_resolved"),
            },
            data_quality: DataQuality {
                last_updated: fetched_at,
                source: DataSource::Upstream,
                verified: true,
                confidence: UPSTREAM_CONFIDENCE,
            },
        }
    }
}

/// Numbers pass through; numeric strings (thousands separators allowed) are parsed.
fn coerce_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (RegionId, PeriodId) {
        (
            RegionId::parse("0901").unwrap(),
            PeriodId::parse("2024-25").unwrap(),
        )
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&json!(42)), Some(42.0));
        assert_eq!(coerce_number(&json!(" 12.5 ")), Some(12.5));
        assert_eq!(coerce_number(&json!("1,234,567")), Some(1_234_567.0));
        assert_eq!(coerce_number(&json!("n/a")), None);
        assert_eq!(coerce_number(&json!(null)), None);
        assert_eq!(coerce_number(&json!(true)), None);
        assert_eq!(coerce_number(&json!([1])), None);
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        assert!(RawPayload::from_json(&json!([1, 2, 3])).is_err());
        assert!(RawPayload::from_json(&json!("html")).is_err());
    }

    #[test]
    fn test_parse_computes_rates() {
        let (region, period) = ids();
        let payload = RawPayload::from_json(&json!({
            "works_completed": 40,
            "works_ongoing": 10,
            "budget_approved": 1000000,
            "expenditure": 700000
        }))
        .unwrap();

        let record = payload.into_record(&region, &period, Utc::now());
        assert_eq!(record.performance.completion_rate, 80);
        assert_eq!(record.performance.utilization_rate, 70);
        // No audit data; 2 of 4 required fields present
        assert_eq!(record.performance.transparency_score, 20);
        assert_eq!(record.data_quality.source, DataSource::Upstream);
        assert!(record.data_quality.verified);
        assert_eq!(record.data_quality.confidence, 95);
    }

    #[test]
    fn test_malformed_fields_degrade_to_zero() {
        let (region, period) = ids();
        let payload = RawPayload::from_json(&json!({
            "demand_households": "not a number",
            "demand_persons": null,
            "work_households": {"nested": 1},
            "works_completed": "12",
            "budget_approved": 0,
            "expenditure": 5000
        }))
        .unwrap();

        let record = payload.into_record(&region, &period, Utc::now());
        assert_eq!(record.demand.households, 0.0);
        assert_eq!(record.demand.persons, 0.0);
        assert_eq!(record.work_provided.households, 0.0);
        assert_eq!(record.works_completed.total, 12.0);
        assert_eq!(record.performance.completion_rate, 100);
        // approved = 0 => utilization 0
        assert_eq!(record.performance.utilization_rate, 0);
        // Absent fields
        assert_eq!(record.assets.public_works, 0.0);
    }

    #[test]
    fn test_transparency_uses_audit_coverage() {
        let (region, period) = ids();
        let payload = RawPayload::from_json(&json!({
            "audit_gps": "8",
            "total_gps": "10",
            "demand_households": 100,
            "work_households": 90,
            "budget_approved": 1000,
            "expenditure": 900
        }))
        .unwrap();

        let record = payload.into_record(&region, &period, Utc::now());
        // 48 from coverage + 40 from completeness
        assert_eq!(record.performance.transparency_score, 88);
        assert_eq!(record.social_audit.conducted_units, 8.0);
    }
}

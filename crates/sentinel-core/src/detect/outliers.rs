//! Abnormal amount detection
//!
//! Categorized entries are grouped into (category, unit) cohorts. Within a
//! cohort an amount is an outlier when its robust z-score (deviation over the
//! scaled median absolute deviation) or its relative deviation from the
//! median crosses the configured threshold.

use std::collections::BTreeMap;

use serde_json::json;

use super::{anomaly_hash, DetectionConfig};
use crate::models::{AnomalyKind, Finding, LedgerEntry};

/// Floor for denominators, so a zero MAD or zero median never divides by zero
const EPSILON: f64 = 1e-6;

/// Calculate median of a slice
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Flag entries whose amount is far from their cohort's median
pub fn find_outliers(entries: &[LedgerEntry], config: &DetectionConfig) -> Vec<Finding> {
    let mut cohorts: BTreeMap<(i64, Option<i64>), Vec<&LedgerEntry>> = BTreeMap::new();
    for entry in entries.iter().filter(|e| !e.is_deleted()) {
        if let Some(category_id) = entry.category_id {
            cohorts
                .entry((category_id, entry.unit_id))
                .or_default()
                .push(entry);
        }
    }

    let mut findings = Vec::new();
    for ((category_id, unit_id), members) in cohorts {
        let amounts: Vec<f64> = members.iter().map(|e| e.amount).collect();
        let center = median(&amounts);
        let deviations: Vec<f64> = amounts.iter().map(|a| (a - center).abs()).collect();
        let mad = config.mad_scale * median(&deviations);

        let mad_floor = if mad > EPSILON { mad } else { EPSILON };
        let median_floor = if center.abs() > EPSILON {
            center.abs()
        } else {
            EPSILON
        };

        for entry in members {
            let deviation = (entry.amount - center).abs();
            let z_score = deviation / mad_floor;
            let relative = deviation / median_floor;

            if z_score <= config.outlier_z_threshold
                && relative <= config.outlier_relative_threshold
            {
                continue;
            }

            let unit_key = unit_id.map_or_else(|| "none".to_string(), |u| u.to_string());
            let key = format!("{}|{}|{}", category_id, unit_key, entry.id);

            findings.push(Finding {
                kind: AnomalyKind::Outlier,
                hash: anomaly_hash(AnomalyKind::Outlier, &key),
                member_entry_ids: vec![entry.id],
                details: json!({
                    "categoryId": category_id,
                    "unitId": unit_id,
                    "amount": entry.amount,
                    "median": round4(center),
                    "mad": round4(mad),
                    "zScore": round4(z_score),
                    "relativeDeviation": round4(relative),
                    "cohortSize": amounts.len(),
                }),
            });
        }
    }

    findings
}

//! Duplicate posting detection
//!
//! Entries are bucketed by (normalized description, posting date, amount in
//! cents, unit). With a tolerance of `w` days an entry also lands in the
//! buckets for the `w` days after its posting date, so a posting that trails
//! its twin by up to `w` days shares a bucket with it. Offsets only go
//! forward, which keeps "A on D, B on D+1, C on D+2" at `w = 1` as the two
//! overlapping pairs {A, B} and {B, C} rather than one chain.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use serde_json::json;

use super::anomaly_hash;
use crate::models::{AnomalyKind, Finding, LedgerEntry};
use crate::normalize::normalize_description;

/// Fixed-point rendering of an amount in cents ("-1500.00")
pub(crate) fn amount_key(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Everything in a bucket key except the date
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Signature {
    description: String,
    amount: String,
    unit: Option<Option<i64>>,
}

impl Signature {
    fn bucket_key(&self, date: NaiveDate) -> String {
        let mut key = format!("{}|{}|{}", self.description, date, self.amount);
        if let Some(unit) = self.unit {
            match unit {
                Some(id) => key.push_str(&format!("|{}", id)),
                None => key.push_str("|none"),
            }
        }
        key
    }
}

/// Find groups of entries that look like the same posting recorded twice
///
/// Soft-deleted entries are ignored. A bucket produces a finding when it holds
/// at least two distinct entries, unless an earlier bucket of the same
/// signature already holds exactly those entries or a strict superset of them.
pub fn find_duplicates(
    entries: &[LedgerEntry],
    tolerance_days: u32,
    include_unit: bool,
) -> Vec<Finding> {
    let mut buckets: BTreeMap<Signature, BTreeMap<NaiveDate, BTreeSet<i64>>> = BTreeMap::new();

    for entry in entries.iter().filter(|e| !e.is_deleted()) {
        let signature = Signature {
            description: normalize_description(&entry.description),
            amount: amount_key(entry.amount),
            unit: include_unit.then_some(entry.unit_id),
        };
        let by_date = buckets.entry(signature).or_default();

        for offset in 0..=i64::from(tolerance_days) {
            let Some(date) = entry.posting_date.checked_add_signed(Duration::days(offset)) else {
                continue;
            };
            by_date.entry(date).or_default().insert(entry.id);
        }
    }

    let mut findings = Vec::new();
    for (signature, by_date) in buckets {
        let candidates: Vec<(NaiveDate, BTreeSet<i64>)> = by_date
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .collect();

        for (i, (date, members)) in candidates.iter().enumerate() {
            let redundant = candidates.iter().enumerate().any(|(j, (_, other))| {
                (other.len() > members.len() && members.is_subset(other))
                    || (j < i && other == members)
            });
            if redundant {
                continue;
            }

            let key = signature.bucket_key(*date);
            findings.push(Finding {
                kind: AnomalyKind::Duplicate,
                hash: anomaly_hash(AnomalyKind::Duplicate, &key),
                member_entry_ids: members.iter().copied().collect(),
                details: json!({
                    "bucketKey": key,
                    "description": signature.description,
                    "postingDate": date.to_string(),
                    "amount": signature.amount,
                    "unitId": signature.unit.flatten(),
                }),
            });
        }
    }

    findings
}

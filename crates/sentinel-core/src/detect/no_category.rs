//! Missing category detection

use serde_json::json;

use super::anomaly_hash;
use crate::models::{AnomalyKind, Finding, LedgerEntry};

/// One finding per active entry that has no category
pub fn find_uncategorized(entries: &[LedgerEntry]) -> Vec<Finding> {
    entries
        .iter()
        .filter(|e| !e.is_deleted() && e.category_id.is_none())
        .map(|e| Finding {
            kind: AnomalyKind::NoCategory,
            hash: anomaly_hash(AnomalyKind::NoCategory, &e.id.to_string()),
            member_entry_ids: vec![e.id],
            details: json!({
                "description": e.description,
                "postingDate": e.posting_date.to_string(),
                "amount": e.amount,
                "unitId": e.unit_id,
            }),
        })
        .collect()
}

//! Anomaly command implementations (list, show, resolve)

use anyhow::{Context, Result};
use chrono::Utc;
use sentinel_core::{
    resolve_anomaly, Anomaly, AnomalyKind, AnomalyStatus, Database, ResolutionAction,
    ResolutionPayload, ResolutionSummary,
};

use super::{format_amount, truncate, CLI_USER};

pub fn cmd_anomalies_list(db: &Database, all: bool, kind: Option<&str>) -> Result<()> {
    let kind: Option<AnomalyKind> = kind
        .map(|k| k.parse::<AnomalyKind>())
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let status = if all {
        None
    } else {
        Some(AnomalyStatus::Pending)
    };

    let anomalies = db.list_anomalies(status, kind)?;

    if anomalies.is_empty() {
        if all {
            println!("No anomalies recorded. Run detection with:");
            println!("  sentinel detect");
        } else {
            println!("✅ No pending anomalies.");
        }
        return Ok(());
    }

    println!();
    if all {
        println!("🚨 Anomalies ({})", anomalies.len());
    } else {
        println!("🚨 Pending Anomalies ({})", anomalies.len());
    }
    println!("   ─────────────────────────────────────────────────────────────");

    for anomaly in &anomalies {
        println!(
            "   [{}] {} {:<12} │ {:<8} │ entries {}",
            anomaly.id,
            kind_icon(anomaly.kind),
            anomaly.kind.as_str(),
            anomaly.status.as_str(),
            format_ids(&anomaly.member_entry_ids)
        );
    }

    println!();
    println!("   Use 'sentinel show <id>' for details.");

    Ok(())
}

pub fn cmd_anomaly_show(db: &Database, id: i64) -> Result<()> {
    let anomaly = db
        .get_anomaly(id)?
        .ok_or_else(|| anyhow::anyhow!("Anomaly {} not found", id))?;

    print_anomaly(db, &anomaly)?;

    let history = db.anomaly_history(anomaly.id)?;
    if !history.is_empty() {
        println!();
        println!("   History:");
        for event in &history {
            println!(
                "   {} │ {:<10} │ {}",
                event.timestamp, event.action, event.user_email
            );
        }
    }

    if !anomaly.status.is_terminal() {
        println!();
        println!("   Resolve with one of:");
        match anomaly.kind {
            AnomalyKind::Duplicate => {
                println!(
                    "     sentinel resolve {} merge --keep <id> --delete <id>...",
                    anomaly.id
                );
            }
            AnomalyKind::NoCategory => {
                println!(
                    "     sentinel resolve {} set_category --category <id>",
                    anomaly.id
                );
            }
            AnomalyKind::Outlier => {}
        }
        println!("     sentinel resolve {} keep", anomaly.id);
        println!("     sentinel resolve {} ignore", anomaly.id);
    }

    Ok(())
}

fn print_anomaly(db: &Database, anomaly: &Anomaly) -> Result<()> {
    println!();
    println!(
        "{} Anomaly #{} - {}",
        kind_icon(anomaly.kind),
        anomaly.id,
        anomaly.kind.label()
    );
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Status: {}", anomaly.status.as_str());
    println!(
        "   First detected: {}",
        anomaly.first_detected_at.format("%Y-%m-%d %H:%M")
    );
    println!(
        "   Last detected:  {}",
        anomaly.last_detected_at.format("%Y-%m-%d %H:%M")
    );
    if let Some(resolved_at) = anomaly.resolved_at {
        println!("   Closed: {}", resolved_at.format("%Y-%m-%d %H:%M"));
    }
    if let Some(notes) = &anomaly.notes {
        println!("   Notes: {}", notes);
    }

    println!();
    println!("   Entries:");
    for entry_id in &anomaly.member_entry_ids {
        match db.get_ledger_entry(*entry_id)? {
            Some(entry) => println!(
                "   [{}] {} │ {:>12} │ {}{}",
                entry.id,
                entry.posting_date,
                format_amount(entry.amount),
                truncate(&entry.description, 40),
                if entry.is_deleted() { " (deleted)" } else { "" }
            ),
            None => println!("   [{}] (entry no longer exists)", entry_id),
        }
    }

    if let Some(details) = &anomaly.details {
        println!();
        println!("   Details:");
        println!(
            "   {}",
            serde_json::to_string_pretty(details)?.replace('\n', "\n   ")
        );
    }

    Ok(())
}

/// Options for `sentinel resolve`
#[derive(Debug, Default)]
pub struct ResolveArgs {
    pub keep: Option<i64>,
    pub delete: Vec<i64>,
    pub category: Option<i64>,
    pub note: Option<String>,
}

pub fn cmd_resolve(
    db: &Database,
    id: i64,
    action: &str,
    args: ResolveArgs,
) -> Result<ResolutionSummary> {
    let action: ResolutionAction = action.parse()?;
    let payload = ResolutionPayload {
        keep_id: args.keep,
        delete_ids: args.delete.into_iter().map(Some).collect(),
        category_id: args.category,
        note: args.note,
    };

    let summary = resolve_anomaly(db, CLI_USER, id, action, &payload, Utc::now())
        .with_context(|| format!("Failed to resolve anomaly {}", id))?;

    match summary {
        ResolutionSummary::Merged { merged } => {
            println!("✅ Anomaly {} resolved: {} entries soft-deleted", id, merged);
        }
        ResolutionSummary::Ignored { .. } => {
            println!("✅ Anomaly {} closed ({})", id, action);
        }
        ResolutionSummary::Categorized { categorized } => {
            println!(
                "✅ Anomaly {} resolved: {} entries categorized",
                id, categorized
            );
        }
    }

    Ok(summary)
}

fn kind_icon(kind: AnomalyKind) -> &'static str {
    match kind {
        AnomalyKind::Duplicate => "👯",
        AnomalyKind::NoCategory => "🏷️",
        AnomalyKind::Outlier => "📈",
    }
}

fn format_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `anomalies` - Anomaly commands (list, show, resolve)
//! - `core` - Core commands (init, detect) and shared utilities (open_db)
//! - `entries` - Ledger entry listing
//! - `import` - CSV import
//! - `serve` - Web server command
//! - `status` - Database status

pub mod anomalies;
pub mod core;
pub mod entries;
pub mod import;
pub mod serve;
pub mod status;

// Re-export command functions for main.rs
pub use anomalies::*;
pub use core::*;
pub use entries::*;
pub use import::*;
pub use serve::*;
pub use status::*;

/// Acting user recorded in the audit log for CLI operations
pub const CLI_USER: &str = "cli";

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format an amount with sign coloring (red for outflows, green for inflows)
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("\x1b[31m-{:.2}\x1b[0m", amount.abs())
    } else {
        format!("\x1b[32m+{:.2}\x1b[0m", amount)
    }
}

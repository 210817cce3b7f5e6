//! Server command implementation

use std::path::Path;

use anyhow::Result;
use sentinel_server::{DetectionScheduleConfig, ServerConfig};

use super::open_db;

pub async fn cmd_serve(db_path: &Path, host: &str, port: u16) -> Result<()> {
    println!("🚀 Starting Sentinel web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    // Parse allowed CORS origins from environment (comma-separated)
    let allowed_origins: Vec<String> = std::env::var("SENTINEL_ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if !allowed_origins.is_empty() {
        println!("   🌐 CORS origins: {}", allowed_origins.join(", "));
    }
    if let Some(schedule) = DetectionScheduleConfig::from_env() {
        println!(
            "   ⏰ Recalculating every {} hours (SENTINEL_DETECT_SCHEDULE)",
            schedule.interval_hours
        );
    }
    println!();
    println!("   ⚠️  No authentication - the x-user-email header is trusted as-is");
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path)?;
    let config = ServerConfig { allowed_origins };

    sentinel_server::serve_with_config(db, host, port, config).await?;

    Ok(())
}

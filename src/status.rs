//! Store and ledger overview.
//!
//! `autot status` reads the store files and the ledger without modifying
//! them and without contacting the embedding provider.

use anyhow::Result;
use std::path::Path;

use autot_core::models::StoreKind;

use crate::config::Config;
use crate::ledger::Ledger;
use crate::stores::read_store_file;

/// Run the status command and print a summary.
pub fn run_status(config: &Config) -> Result<()> {
    println!("autot status");
    println!();
    println!(
        "  {:<8} {:>8} {:>6} {:<24} {:<16} {}",
        "STORE", "RECORDS", "DIMS", "MODEL", "LAST ADDED", "PATH"
    );
    println!("  {}", "-".repeat(84));

    let stores = [
        (StoreKind::Source, &config.stores.source.path),
        (StoreKind::Target, &config.stores.target.path),
        (StoreKind::Project, &config.stores.project.path),
    ];
    for (kind, path) in stores {
        print_store_line(kind, path);
    }

    let entries = Ledger::read_entries(&config.ledger.path)?;
    println!();
    println!("  Ledger:    {} ({} processed)", config.ledger.path.display(), entries.len());
    if let Some(last) = entries.last() {
        println!("  Last:      {}", last);
    }
    println!();
    Ok(())
}

fn print_store_line(kind: StoreKind, path: &Path) {
    if !path.exists() {
        println!("  {:<8} {:>8} {:>6} {:<24} {:<16} {}", kind, "-", "-", "(missing)", "-", path.display());
        return;
    }
    match read_store_file(path) {
        Ok(store) => {
            let last = store
                .records
                .iter()
                .map(|r| r.created_at)
                .max()
                .map(format_ts_relative)
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<8} {:>8} {:>6} {:<24} {:<16} {}",
                kind,
                store.count,
                store.dims,
                store.model,
                last,
                path.display()
            );
        }
        Err(e) => {
            println!("  {:<8} {:>8} {:>6} {:<24} {:<16} {}", kind, "?", "?", "(unreadable)", "-", path.display());
            println!("           {}", e);
        }
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 2 * 3600 - 5), "2 hours ago");
        assert_eq!(format_ts_relative(now - 86400 - 5), "1 day ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}

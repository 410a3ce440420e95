use std::collections::BTreeSet;

use crate::cfg::DiffCfg;

/// Accounts that appeared and disappeared between two snapshots.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub new: Vec<String>,
    pub missing: Vec<String>,
}

impl ChangeSet {
    /// `missing` stays empty when removal tracking is off.
    pub fn between(previous: &BTreeSet<String>, current: &BTreeSet<String>, cfg: &DiffCfg) -> Self {
        let new = current.difference(previous).cloned().collect();
        let missing = if cfg.track_removals {
            previous.difference(current).cloned().collect()
        } else {
            Vec::new()
        };
        Self { new, missing }
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.missing.is_empty()
    }
}

pub fn started_message(poll_seconds: u64) -> String {
    format!("⏱️ Client account monitor started (checking every {} seconds)", poll_seconds)
}

pub fn first_run_message(total: usize) -> String {
    format!(
        "📊 Started mirroring client accounts to Google Sheets and watching for changes\nCurrent client_account total: {}",
        total
    )
}

/// Text announcing a change, or `None` when nothing changed.
pub fn change_message(changes: &ChangeSet, total: usize, cfg: &DiffCfg) -> Option<String> {
    if changes.is_empty() {
        return None;
    }

    let mut sections = Vec::new();
    if !changes.new.is_empty() {
        sections.push(section("🆕", "New client_account", &changes.new, cfg.enumerate_limit));
    }
    if !changes.missing.is_empty() {
        sections.push(section("❌", "Missing client_account", &changes.missing, cfg.enumerate_limit));
    }
    sections.push(format!("📊 Current client_account total: {}", total));

    Some(sections.join("\n\n"))
}

/// Lists ids one per line while they fit under `limit`, else only counts them.
fn section(icon: &str, title: &str, ids: &[String], limit: usize) -> String {
    if ids.len() <= limit {
        let lines: Vec<String> = ids.iter().map(|id| format!("• {}", id)).collect();
        format!("{} {}:\n{}", icon, title, lines.join("\n"))
    } else {
        format!("{} {}: {} accounts", icon, title, ids.len())
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::transform::scalar_text;

/// Accounts known as of the last completed cycle.
pub type Snapshot = BTreeSet<String>;

/// On-disk layout of the snapshot file.
#[derive(Debug, Serialize, Deserialize, Default)]
struct State {
    #[serde(default)]
    client_accounts: Vec<Value>,
}

/// Reads the previous snapshot. A missing or unreadable file is treated as
/// "no history" and yields an empty set.
pub fn load_state(state_path: &str) -> Snapshot {
    let path = Path::new(state_path);

    if !path.exists() {
        info!("State file not found, starting without history: {}", state_path);
        return Snapshot::new();
    }

    debug!("Loading state from: {}", state_path);
    match read_state(path) {
        Ok(accounts) => {
            info!("Loaded state: {} known accounts", accounts.len());
            accounts
        }
        Err(e) => {
            warn!("Ignoring unreadable state file {}: {:#}", state_path, e);
            Snapshot::new()
        }
    }
}

fn read_state(path: &Path) -> Result<Snapshot> {
    let content = fs::read_to_string(path)?;
    let state: State = serde_json::from_str(&content).context("failed to parse state file")?;
    Ok(state.client_accounts.iter().map(scalar_text).collect())
}

/// Persists the snapshot, sorted. Failures are logged and swallowed: a lost
/// write only means the same change is reported again next cycle.
pub fn save_state(state_path: &str, accounts: &Snapshot) {
    match write_state(state_path, accounts) {
        Ok(()) => info!("Saved state: {} accounts to {}", accounts.len(), state_path),
        Err(e) => warn!("Failed to save state to {}: {:#}", state_path, e),
    }
}

fn write_state(state_path: &str, accounts: &Snapshot) -> Result<()> {
    debug!("Saving state to: {}", state_path);
    let path = Path::new(state_path);

    // Ensure directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let state = State {
        client_accounts: accounts.iter().cloned().map(Value::String).collect(),
    };
    let json = serde_json::to_string_pretty(&state)?;

    // Write next to the target and rename so readers never see a partial file.
    let tmp_path = format!("{}.tmp", state_path);
    fs::write(&tmp_path, json).with_context(|| format!("failed to write {}", tmp_path))?;
    fs::rename(&tmp_path, path).with_context(|| format!("failed to replace {}", state_path))?;

    Ok(())
}

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::{
    api::ApiClient,
    cfg::Cfg,
    diff::{change_message, first_run_message, started_message, ChangeSet},
    notify::Telegram,
    sheets::SheetMirror,
    state::{load_state, save_state},
    transform::extract_accounts,
};

/// Everything one cycle needs, built once at startup.
pub struct Pipeline {
    cfg: Cfg,
    api: ApiClient,
    telegram: Telegram,
    sheet: Option<SheetMirror>,
}

/// What a cycle ended up doing, mainly for logs and tests.
#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No earlier snapshot; this cycle only recorded the baseline.
    Initialized { total: usize },
    Changed { new: usize, missing: usize, total: usize },
    Unchanged { total: usize },
}

impl Pipeline {
    pub async fn new(cfg: Cfg) -> Result<Self> {
        let api = ApiClient::new(&cfg.api)?;
        let telegram = Telegram::new(&cfg.telegram)?;
        let sheet = match cfg.sheet {
            Some(ref sheet_cfg) => Some(
                SheetMirror::connect(sheet_cfg)
                    .await
                    .context("failed to set up Google Sheets mirroring")?,
            ),
            None => None,
        };

        Ok(Self::with_parts(cfg, api, telegram, sheet))
    }

    pub fn with_parts(cfg: Cfg, api: ApiClient, telegram: Telegram, sheet: Option<SheetMirror>) -> Self {
        Self {
            cfg,
            api,
            telegram,
            sheet,
        }
    }

    /// One pass: fetch, mirror, announce changes, then persist the snapshot.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        info!("Starting cycle");

        let rows = self.api.fetch_all_clients().await?;
        let current = extract_accounts(&rows, &self.cfg.account_field);
        let previous = load_state(&self.cfg.state_path);
        let total = current.len();

        match self.sheet {
            Some(ref sheet) => sheet.write_snapshot(&rows).await?,
            None => warn!("GSHEET_ID not set; skipping sheet write"),
        }

        if previous.is_empty() {
            save_state(&self.cfg.state_path, &current);
            if !self.cfg.first_run_silent {
                self.telegram.send(&first_run_message(total)).await;
            }
            info!("No previous snapshot; recorded {} accounts as baseline", total);
            return Ok(CycleOutcome::Initialized { total });
        }

        let changes = ChangeSet::between(&previous, &current, &self.cfg.diff);
        let outcome = match change_message(&changes, total, &self.cfg.diff) {
            Some(text) => {
                info!(
                    new = changes.new.len(),
                    missing = changes.missing.len(),
                    total = total,
                    "Account changes detected"
                );
                self.telegram.send(&text).await;
                CycleOutcome::Changed {
                    new: changes.new.len(),
                    missing: changes.missing.len(),
                    total,
                }
            }
            None => {
                info!("No account changes ({} accounts)", total);
                CycleOutcome::Unchanged { total }
            }
        };

        // Only after the notification attempt.
        save_state(&self.cfg.state_path, &current);
        Ok(outcome)
    }

    /// Announces startup, then runs a cycle every `poll_seconds` forever.
    /// A failed cycle is logged and the loop carries on.
    pub async fn run_forever(&self) {
        let interval = Duration::from_secs(self.cfg.poll_seconds);
        self.telegram.send(&started_message(self.cfg.poll_seconds)).await;
        info!("Monitoring every {} seconds", self.cfg.poll_seconds);

        loop {
            if let Err(e) = self.run_cycle().await {
                error!("Cycle failed: {:#}", e);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use secrecy::SecretString;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::args::Args;

pub const DEFAULT_API_URL: &str = "https://my.exnessaffiliates.com/api/reports/clients/";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_TAB_NAME: &str = "clients_snapshot";
pub const DEFAULT_STATE_PATH: &str = "state_clients.json";
pub const DEFAULT_ACCOUNT_FIELD: &str = "client_account";
pub const DEFAULT_ENUMERATE_LIMIT: usize = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment: {0}")]
    Missing(String),

    #[error("GSHEET_ID is set but no Google credentials were given: set GOOGLE_APPLICATION_CREDENTIALS (file path) or GOOGLE_SERVICE_ACCOUNT_JSON (json string)")]
    MissingSheetCredentials,

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Immutable runtime configuration, built once at startup.
#[derive(Debug)]
pub struct Cfg {
    pub api: ApiCfg,
    pub telegram: TelegramCfg,
    /// `None` when no spreadsheet id is configured; mirroring is then skipped.
    pub sheet: Option<SheetCfg>,
    pub diff: DiffCfg,
    pub account_field: String,
    pub poll_seconds: u64,
    pub state_path: String,
    pub first_run_silent: bool,
}

#[derive(Debug)]
pub struct ApiCfg {
    pub url: String,
    pub token: SecretString,
    pub max_attempts: u32,
    /// Backoff unit; the wait before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct TelegramCfg {
    pub api_base: String,
    pub token: SecretString,
    pub chat_id: String,
}

#[derive(Debug)]
pub struct SheetCfg {
    pub sheet_id: String,
    pub tab_name: String,
    pub credentials: Credentials,
}

/// Where the service account key comes from.
#[derive(Debug)]
pub enum Credentials {
    File(PathBuf),
    Inline(SecretString),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffCfg {
    pub track_removals: bool,
    pub enumerate_limit: usize,
}

impl Default for DiffCfg {
    fn default() -> Self {
        Self {
            track_removals: true,
            enumerate_limit: DEFAULT_ENUMERATE_LIMIT,
        }
    }
}

impl Cfg {
    pub fn load(args: Args) -> Result<Self> {
        info!("Loading configuration from: {}", args.config);

        let source = Config::builder()
            .add_source(File::with_name(&args.config).required(false))
            .add_source(Environment::default())
            .build()
            .with_context(|| format!("failed to read configuration from {}", args.config))?;

        let cfg = Self::from_source(&source, &args)?;
        debug!("Final configuration: {:?}", cfg);
        Ok(cfg)
    }

    /// Builds the configuration from already merged sources, then applies
    /// command line overrides and validates.
    pub fn from_source(source: &Config, args: &Args) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut required = |key: &str| {
            let value = string(source, key);
            if value.is_none() {
                missing.push(key.to_uppercase());
            }
            value.unwrap_or_default()
        };
        let api_token = required("exness_jwt");
        let telegram_token = required("telegram_token");
        let chat_id = required("telegram_chat_id");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing.join(", ")));
        }

        let sheet = match string(source, "gsheet_id") {
            Some(sheet_id) => {
                let credentials = if let Some(path) = string(source, "google_application_credentials") {
                    Credentials::File(PathBuf::from(path))
                } else if let Some(json) = string(source, "google_service_account_json") {
                    Credentials::Inline(SecretString::new(json))
                } else {
                    return Err(ConfigError::MissingSheetCredentials);
                };
                Some(SheetCfg {
                    sheet_id,
                    tab_name: string(source, "gsheet_name").unwrap_or_else(|| DEFAULT_TAB_NAME.to_string()),
                    credentials,
                })
            }
            None => None,
        };

        let mut cfg = Cfg {
            api: ApiCfg {
                url: string(source, "api_url").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                token: SecretString::new(api_token),
                max_attempts: parsed(source, "api_max_attempts", 3)?,
                backoff: Duration::from_millis(parsed(source, "api_backoff_ms", 1200)?),
                timeout: Duration::from_secs(parsed(source, "api_timeout_seconds", 30)?),
            },
            telegram: TelegramCfg {
                api_base: string(source, "telegram_api_base")
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
                token: SecretString::new(telegram_token),
                chat_id,
            },
            sheet,
            diff: DiffCfg {
                track_removals: flag(source, "track_removals", true),
                enumerate_limit: parsed(source, "enumerate_limit", DEFAULT_ENUMERATE_LIMIT)?,
            },
            account_field: string(source, "account_field")
                .unwrap_or_else(|| DEFAULT_ACCOUNT_FIELD.to_string()),
            poll_seconds: parsed(source, "poll_seconds", 0)?,
            state_path: string(source, "state_file").unwrap_or_else(|| DEFAULT_STATE_PATH.to_string()),
            first_run_silent: flag(source, "first_run_silent", false),
        };

        // Override with command line arguments if provided
        if let Some(poll_seconds) = args.poll_seconds {
            debug!("Overriding poll_seconds from command line");
            cfg.poll_seconds = poll_seconds;
        }
        if let Some(ref state_file) = args.state_file {
            debug!("Overriding state_file from command line");
            cfg.state_path = state_file.clone();
        }
        if args.once {
            cfg.poll_seconds = 0;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "api_max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.state_path.is_empty() {
            return Err(ConfigError::Invalid {
                key: "state_file",
                reason: "cannot be empty".to_string(),
            });
        }
        if self.account_field.is_empty() {
            return Err(ConfigError::Invalid {
                key: "account_field",
                reason: "cannot be empty".to_string(),
            });
        }

        match self.sheet {
            Some(ref sheet) => info!("Mirroring to sheet {} tab '{}'", sheet.sheet_id, sheet.tab_name),
            None => info!("GSHEET_ID not set; sheet mirroring disabled"),
        }
        info!("Configuration validation passed");
        Ok(())
    }

    pub fn is_one_shot(&self) -> bool {
        self.poll_seconds == 0
    }
}

/// Trimmed string value; empty counts as unset.
fn string(source: &Config, key: &str) -> Option<String> {
    source
        .get_string(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(source: &Config, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match string(source, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("'{}': {}", raw, e),
        }),
        None => Ok(default),
    }
}

fn flag(source: &Config, key: &str, default: bool) -> bool {
    string(source, key).map_or(default, |v| parse_flag(&v))
}

/// `1`, `true` and `yes` (any case) are true; everything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::builder::DefaultState;
    use config::ConfigBuilder;
    use secrecy::ExposeSecret;

    fn base() -> ConfigBuilder<DefaultState> {
        Config::builder()
            .set_override("exness_jwt", "JWT abc")
            .unwrap()
            .set_override("telegram_token", "123:tok")
            .unwrap()
            .set_override("telegram_chat_id", "-1001")
            .unwrap()
    }

    #[test]
    fn test_defaults_with_required_values() {
        let source = base().build().unwrap();
        let cfg = Cfg::from_source(&source, &Args::default()).unwrap();

        assert_eq!(cfg.api.url, DEFAULT_API_URL);
        assert_eq!(cfg.api.token.expose_secret(), "JWT abc");
        assert_eq!(cfg.api.max_attempts, 3);
        assert_eq!(cfg.api.backoff, Duration::from_millis(1200));
        assert_eq!(cfg.telegram.chat_id, "-1001");
        assert!(cfg.sheet.is_none());
        assert_eq!(cfg.diff, DiffCfg::default());
        assert_eq!(cfg.account_field, "client_account");
        assert_eq!(cfg.state_path, DEFAULT_STATE_PATH);
        assert!(cfg.is_one_shot());
        assert!(!cfg.first_run_silent);
    }

    #[test]
    fn test_missing_required_values_are_listed() {
        let source = Config::builder()
            .set_override("telegram_token", "123:tok")
            .unwrap()
            .set_override("telegram_chat_id", "   ")
            .unwrap()
            .build()
            .unwrap();

        let err = Cfg::from_source(&source, &Args::default()).unwrap_err();
        match err {
            ConfigError::Missing(keys) => assert_eq!(keys, "EXNESS_JWT, TELEGRAM_CHAT_ID"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sheet_requires_credentials() {
        let source = base().set_override("gsheet_id", "sheet-1").unwrap().build().unwrap();
        assert!(matches!(
            Cfg::from_source(&source, &Args::default()),
            Err(ConfigError::MissingSheetCredentials)
        ));
    }

    #[test]
    fn test_credential_file_wins_over_inline_json() {
        let source = base()
            .set_override("gsheet_id", "sheet-1")
            .unwrap()
            .set_override("google_application_credentials", "/keys/sa.json")
            .unwrap()
            .set_override("google_service_account_json", "{}")
            .unwrap()
            .build()
            .unwrap();

        let cfg = Cfg::from_source(&source, &Args::default()).unwrap();
        let sheet = cfg.sheet.unwrap();
        assert_eq!(sheet.tab_name, DEFAULT_TAB_NAME);
        assert!(matches!(sheet.credentials, Credentials::File(ref p) if p == &PathBuf::from("/keys/sa.json")));
    }

    #[test]
    fn test_command_line_overrides() {
        let source = base()
            .set_override("poll_seconds", "60")
            .unwrap()
            .set_override("state_file", "from_env.json")
            .unwrap()
            .build()
            .unwrap();

        let args = Args {
            state_file: Some("from_cli.json".to_string()),
            ..Args::default()
        };
        let cfg = Cfg::from_source(&source, &args).unwrap();
        assert_eq!(cfg.poll_seconds, 60);
        assert_eq!(cfg.state_path, "from_cli.json");

        let once = Args {
            once: true,
            ..Args::default()
        };
        assert!(Cfg::from_source(&source, &once).unwrap().is_one_shot());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let source = base().set_override("poll_seconds", "soon").unwrap().build().unwrap();
        assert!(matches!(
            Cfg::from_source(&source, &Args::default()),
            Err(ConfigError::Invalid { key: "poll_seconds", .. })
        ));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("on"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_diff_settings() {
        let source = base()
            .set_override("track_removals", "no")
            .unwrap()
            .set_override("enumerate_limit", "30")
            .unwrap()
            .set_override("first_run_silent", "Yes")
            .unwrap()
            .build()
            .unwrap();

        let cfg = Cfg::from_source(&source, &Args::default()).unwrap();
        assert!(!cfg.diff.track_removals);
        assert_eq!(cfg.diff.enumerate_limit, 30);
        assert!(cfg.first_run_silent);
    }
}

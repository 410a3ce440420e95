use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "client_watch")]
#[command(about = "Poll the affiliate clients report, mirror it to Google Sheets and announce account changes on Telegram")]
#[command(version)]
pub struct Args {
    /// Run one cycle then exit, regardless of POLL_SECONDS
    #[arg(long)]
    pub once: bool,

    /// Seconds between cycles (0 = run once)
    #[arg(long, value_name = "SECONDS")]
    pub poll_seconds: Option<u64>,

    /// Path of the snapshot file holding the last seen accounts
    #[arg(long, value_name = "PATH")]
    pub state_file: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Path to config file
    #[arg(long, default_value = "config/config.toml")]
    pub config: String,
}

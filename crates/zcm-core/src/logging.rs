//! Process-wide `env_logger` setup for `zcm`.
//!
//! Filter precedence is `RUST_LOG`, then `ZCM_LOG_LEVEL`, then the level the
//! binary hands to [`init`]. Records go to stderr as one JSON object per line
//! unless `ZCM_LOG_FORMAT` asks for something else, in which case they are
//! written as plain text.

use env_logger::{Builder, Env};
use serde_json::json;
use std::env;
use std::io::Write;
use std::sync::OnceLock;

static INSTALLED: OnceLock<()> = OnceLock::new();

const FORMAT_ENV: &str = "ZCM_LOG_FORMAT";
const LEVEL_ENV: &str = "ZCM_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Plain,
}

impl LogFormat {
    fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(_) => LogFormat::Plain,
        }
    }
}

/// Install the logger once per process; later calls keep the first setup.
pub fn init(default_level: &str) {
    INSTALLED.get_or_init(|| install(default_level));
}

/// `ZCM_LOG_LEVEL` when set to something non-blank, else `default_level`.
fn fallback_filter(setting: Option<String>, default_level: &str) -> String {
    setting
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default_level.to_string())
}

fn install(default_level: &str) {
    let filter = fallback_filter(env::var(LEVEL_ENV).ok(), default_level);
    let mut builder = Builder::from_env(Env::default().default_filter_or(filter));

    match LogFormat::from_setting(env::var(FORMAT_ENV).ok().as_deref()) {
        LogFormat::Json => builder.format(|buf, record| {
            let line = json!({
                "timestamp": buf.timestamp().to_string(),
                "level": record.level().as_str().to_ascii_lowercase(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{line}")
        }),
        LogFormat::Plain => builder.format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}: {}",
                buf.timestamp(),
                record.level(),
                record.target(),
                record.args()
            )
        }),
    };

    if let Err(err) = builder.try_init() {
        eprintln!("zcm: logger already installed elsewhere: {err}");
    }
}

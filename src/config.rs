//! Bot configuration.
//!
//! Settings come from a `KEY=VALUE` file (`bot.config`). Any key can be
//! overridden by an environment variable of the same name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use secrecy::SecretString;

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "bot.config";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "REPORT_BOT_CONFIG";

/// Keys overwritten with random values by [`scrub_credentials`].
const SECRET_KEYS: &[&str] = &["BOT_TOKEN", "TEMPLATE_PATH"];

const SKELETON: &str = "# report-bot configuration\nBOT_TOKEN=\nTEMPLATE_PATH=\n";

/// Runtime settings.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// File the settings were read from.
    pub source_path: PathBuf,
    /// Telegram bot token. `None` runs the CLI transport.
    pub bot_token: Option<SecretString>,
    pub template_path: PathBuf,
    pub storage_dir: PathBuf,
    pub chat_config_path: PathBuf,
    pub log_dir: PathBuf,
    pub converter_timeout: Duration,
    /// Telegram usernames or numeric ids. `*` admits everyone.
    pub allowed_users: Vec<String>,
    pub scrub_on_exit: bool,
}

impl BotConfig {
    /// Find and parse the config file, applying environment overrides.
    ///
    /// When no file exists anywhere on the search path, a blank one is
    /// written to the current directory and loading fails.
    pub fn load() -> Result<Self, ConfigError> {
        let Some(path) = search_paths().into_iter().find(|p| p.is_file()) else {
            let path = PathBuf::from(CONFIG_FILE);
            std::fs::write(&path, SKELETON)?;
            return Err(ConfigError::MissingFile {
                path,
                hint: "Fill in BOT_TOKEN and TEMPLATE_PATH and start again.".to_string(),
            });
        };

        let contents = std::fs::read_to_string(&path)?;
        Self::parse_with(&contents, path, |key| std::env::var(key).ok())
    }

    /// Build a config from file contents. `lookup` supplies overrides.
    pub fn parse_with(
        contents: &str,
        source_path: PathBuf,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let pairs = parse_pairs(contents);
        let get = |key: &str| -> Option<String> {
            lookup(key)
                .or_else(|| {
                    pairs
                        .iter()
                        .rev()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone())
                })
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = get("BOT_TOKEN").map(SecretString::from);

        let template_path = get("TEMPLATE_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "TEMPLATE_PATH".to_string(),
                hint: format!("Set it in {} to the .docx template.", source_path.display()),
            })?;

        let storage_dir = get("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("Storage"));
        let chat_config_path = get("CHAT_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_dir.join("chat_configs.json"));
        let log_dir = get("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| storage_dir.join("logs"));

        let converter_timeout = match get("CONVERTER_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "CONVERTER_TIMEOUT_SECS".to_string(),
                        message: format!("expected a positive number of seconds, got '{raw}'"),
                    });
                }
            },
            None => Duration::from_secs(120),
        };

        let allowed_users: Vec<String> = get("ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let scrub_on_exit = match get("SCRUB_ON_EXIT") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "SCRUB_ON_EXIT".to_string(),
                message: format!("expected true or false, got '{raw}'"),
            })?,
            None => true,
        };

        Ok(Self {
            source_path,
            bot_token,
            template_path,
            storage_dir,
            chat_config_path,
            log_dir,
            converter_timeout,
            allowed_users,
            scrub_on_exit,
        })
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
        paths.push(PathBuf::from(explicit));
    }
    paths.push(PathBuf::from(CONFIG_FILE));
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(dir.join(CONFIG_FILE));
    }
    paths
}

/// `KEY=VALUE` pairs in file order. Blank lines, `#` comments and lines
/// without `=` are skipped.
fn parse_pairs(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "si" | "sí" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Overwrite the secret values in the config file at `path` with random
/// text. Every other line is kept as written.
pub fn scrub_credentials(path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    std::fs::write(path, scrub_contents(&contents, &mut rand::thread_rng()))?;
    Ok(())
}

fn scrub_contents(contents: &str, rng: &mut impl Rng) -> String {
    let mut out = String::with_capacity(contents.len());
    for line in contents.lines() {
        let key = line
            .split_once('=')
            .map(|(k, _)| k.trim())
            .filter(|k| !k.starts_with('#'));
        match key {
            Some(key) if SECRET_KEYS.contains(&key) => {
                let noise: String = (0..32)
                    .map(|_| char::from(rng.sample(Alphanumeric)))
                    .collect();
                out.push_str(&format!("{key}={noise}"));
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

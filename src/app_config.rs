//! Config file loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chapterdl_core::{FetchConfig, QueueConfig};

/// Optional settings read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    /// Library and queue state directory.
    pub data_dir: Option<PathBuf>,
    /// Minimum page images for a chapter to count as downloaded.
    pub min_items: Option<usize>,
    /// Delay between two pipeline runs in milliseconds.
    pub settle_delay_ms: Option<u64>,
    /// Delay after a finished task in milliseconds.
    pub cooldown_ms: Option<u64>,
    /// Unit of the linear extraction wait in milliseconds.
    pub wait_unit_ms: Option<u64>,
    /// Per-image fetch timeout in seconds.
    pub fetch_timeout_secs: Option<u64>,
    /// Attempts per image request, including the first.
    pub max_retries: Option<u32>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(min_items) = self.min_items
            && !(1..=1000).contains(&min_items)
        {
            bail!("Invalid config value for `min_items`: {min_items}. Expected range: 1..=1000");
        }
        validate_millis("settle_delay_ms", self.settle_delay_ms, 0)?;
        validate_millis("cooldown_ms", self.cooldown_ms, 0)?;
        validate_millis("wait_unit_ms", self.wait_unit_ms, 1)?;
        if let Some(secs) = self.fetch_timeout_secs
            && !(1..=3600).contains(&secs)
        {
            bail!("Invalid config value for `fetch_timeout_secs`: {secs}. Expected range: 1..=3600");
        }
        if let Some(retries) = self.max_retries
            && !(1..=10).contains(&retries)
        {
            bail!("Invalid config value for `max_retries`: {retries}. Expected range: 1..=10");
        }
        Ok(())
    }

    /// Applies the queue-related values on top of `base`.
    #[must_use]
    pub fn queue_config(&self, base: QueueConfig) -> QueueConfig {
        QueueConfig {
            min_items: self.min_items.unwrap_or(base.min_items),
            settle_delay: self
                .settle_delay_ms
                .map_or(base.settle_delay, Duration::from_millis),
            cooldown: self.cooldown_ms.map_or(base.cooldown, Duration::from_millis),
            wait_unit: self.wait_unit_ms.map_or(base.wait_unit, Duration::from_millis),
            fetch_timeout: self
                .fetch_timeout_secs
                .map_or(base.fetch_timeout, Duration::from_secs),
            ..base
        }
    }

    /// Applies the fetcher-related values on top of `base`.
    #[must_use]
    pub fn fetch_config(&self, base: FetchConfig) -> FetchConfig {
        FetchConfig {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            ..base
        }
    }
}

fn validate_millis(field: &str, value: Option<u64>, min: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=60_000).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..=60000");
    }
    Ok(())
}

/// Verbosity labels accepted by the `verbosity` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log filter used when neither `RUST_LOG` nor a CLI flag decides.
    #[must_use]
    pub fn filter(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

impl FromStr for VerbositySetting {
    type Err = anyhow::Error;

    fn from_str(label: &str) -> Result<Self> {
        Ok(match label {
            "default" => Self::Default,
            "verbose" => Self::Verbose,
            "quiet" => Self::Quiet,
            "debug" => Self::Debug,
            other => bail!("'{other}' is not one of: default, verbose, quiet, debug"),
        })
    }
}

/// `$XDG_CONFIG_HOME/chapterdl/config.toml`, else `$HOME/.config/chapterdl/config.toml`.
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    xdg_dir("XDG_CONFIG_HOME", &[".config"]).map(|dir| dir.join("config.toml"))
}

/// `$XDG_DATA_HOME/chapterdl`, else `$HOME/.local/share/chapterdl`, else
/// `./chapterdl-data`.
#[must_use]
pub fn resolve_default_data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"])
        .unwrap_or_else(|| PathBuf::from("chapterdl-data"))
}

/// The `chapterdl` directory under `$xdg_var`, falling back to
/// `$HOME/<home_fallback...>`.
fn xdg_dir(xdg_var: &str, home_fallback: &[&str]) -> Option<PathBuf> {
    let non_empty = |name: &str| env::var_os(name).filter(|value| !value.is_empty());
    let base = match non_empty(xdg_var) {
        Some(xdg) => PathBuf::from(xdg),
        None => home_fallback
            .iter()
            .fold(PathBuf::from(non_empty("HOME")?), |path, part| path.join(part)),
    };
    Some(base.join("chapterdl"))
}

/// Loads the config file from the default path; a missing file yields defaults.
pub fn load_default_file_config() -> Result<FileConfig> {
    match resolve_default_config_path() {
        Some(path) if path.is_file() => load_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

/// Right-hand side of a `key = value` line.
#[derive(Debug, PartialEq)]
enum ConfigValue {
    Text(String),
    Integer(u64),
}

impl ConfigValue {
    fn parse(raw: &str) -> Result<Self> {
        if let Some(inner) = raw.strip_prefix('"') {
            let Some(text) = inner.strip_suffix('"') else {
                bail!("unterminated string");
            };
            return Ok(Self::Text(text.to_string()));
        }
        raw.parse::<u64>()
            .map(Self::Integer)
            .map_err(|_| anyhow::anyhow!("expected a quoted string or a non-negative integer"))
    }

    fn text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Integer(_) => bail!("expected a double-quoted string"),
        }
    }

    fn integer<T: TryFrom<u64>>(self) -> Result<T> {
        match self {
            Self::Integer(n) => T::try_from(n).map_err(|_| anyhow::anyhow!("{n} is out of range")),
            Self::Text(_) => bail!("expected an integer"),
        }
    }
}

impl FileConfig {
    fn set(&mut self, key: &str, value: ConfigValue) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = Some(PathBuf::from(value.text()?)),
            "min_items" => self.min_items = Some(value.integer()?),
            "settle_delay_ms" => self.settle_delay_ms = Some(value.integer()?),
            "cooldown_ms" => self.cooldown_ms = Some(value.integer()?),
            "wait_unit_ms" => self.wait_unit_ms = Some(value.integer()?),
            "fetch_timeout_secs" => self.fetch_timeout_secs = Some(value.integer()?),
            "max_retries" => self.max_retries = Some(value.integer()?),
            "verbosity" => self.verbosity = Some(value.text()?.parse()?),
            unknown => bail!("Unknown configuration key: '{unknown}'"),
        }
        Ok(())
    }
}

const KNOWN_KEYS: [&str; 8] = [
    "data_dir",
    "min_items",
    "settle_delay_ms",
    "cooldown_ms",
    "wait_unit_ms",
    "fetch_timeout_secs",
    "max_retries",
    "verbosity",
];

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_no, line) in (1..).zip(raw.lines()) {
        let line = without_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=').map(|(k, v)| (k.trim(), v.trim())) else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        if !KNOWN_KEYS.contains(&key) {
            bail!("Unknown configuration key: '{key}' on line {line_no}");
        }
        ConfigValue::parse(value)
            .and_then(|value| cfg.set(key, value))
            .with_context(|| format!("Invalid `{key}` value on line {line_no}"))?;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Cuts a trailing `# comment`, ignoring `#` inside double quotes.
fn without_comment(line: &str) -> &str {
    let mut quoted = false;
    let end = line
        .char_indices()
        .find(|&(_, ch)| {
            if ch == '"' {
                quoted = !quoted;
            }
            ch == '#' && !quoted
        })
        .map_or(line.len(), |(index, _)| index);
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
min_items = 4
verbosity = "verbose"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.min_items, Some(4));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
        assert!(cfg.data_dir.is_none());
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
data_dir = "/srv/manga # library" # where chapters go
cooldown_ms = 250 # between chapters
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/srv/manga # library")));
        assert_eq!(cfg.cooldown_ms, Some(250));
    }

    #[test]
    fn test_parse_config_rejects_zero_min_items() {
        let err = parse_config_str("min_items = 0").expect_err("zero min_items expected");
        assert!(err.to_string().contains("min_items"));
    }

    #[test]
    fn test_parse_config_rejects_zero_wait_unit() {
        let err = parse_config_str("wait_unit_ms = 0").expect_err("zero wait unit expected");
        assert!(err.to_string().contains("wait_unit_ms"));
    }

    #[test]
    fn test_parse_config_rejects_trailing_tokens() {
        let err = parse_config_str("settle_delay_ms = 5 later").expect_err("trailing token error");
        assert!(err.to_string().contains("settle_delay_ms"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("data_dir = /tmp/x").expect_err("unquoted path error");
        assert!(err.to_string().contains("data_dir"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("concurrency = 4").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_verbosity() {
        let err = parse_config_str(r#"verbosity = "loud""#).expect_err("invalid verbosity");
        assert!(err.to_string().contains("verbosity"));
    }

    #[test]
    fn test_queue_config_overrides_only_set_fields() {
        let cfg = parse_config_str(
            r#"
min_items = 3
fetch_timeout_secs = 5
"#,
        )
        .expect("config should parse");
        let queue = cfg.queue_config(QueueConfig::default());
        assert_eq!(queue.min_items, 3);
        assert_eq!(queue.fetch_timeout, Duration::from_secs(5));
        assert_eq!(queue.cooldown, QueueConfig::default().cooldown);
        assert!(queue.validate().is_ok());
    }

    #[test]
    fn test_fetch_config_takes_max_retries() {
        let cfg = parse_config_str("max_retries = 5").expect("config should parse");
        assert_eq!(cfg.fetch_config(FetchConfig::default()).max_retries, 5);
    }

    #[test]
    fn test_config_value_kinds() {
        assert_eq!(ConfigValue::parse("\"a b\"").unwrap(), ConfigValue::Text("a b".into()));
        assert_eq!(ConfigValue::parse("42").unwrap(), ConfigValue::Integer(42));
        assert!(ConfigValue::parse("-1").is_err());
        assert!(ConfigValue::parse("\"open").is_err());
        assert!(ConfigValue::Integer(1 << 40).integer::<u32>().is_err());
    }

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(VerbositySetting::Default.filter(), "info");
        assert_eq!(VerbositySetting::Verbose.filter(), "debug");
        assert_eq!(VerbositySetting::Quiet.filter(), "error");
        assert_eq!(VerbositySetting::Debug.filter(), "trace");
    }
}

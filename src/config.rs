//! Configuration file loading and merging with CLI flags.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use vidgrab_core::download::{
    DEFAULT_MIN_FREE_SPACE, DEFAULT_PREFERRED_FORMAT, MAX_CONCURRENCY, resolve_default_directory,
};
use vidgrab_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, OrchestratorSettings, RetryPolicy};

use crate::cli::Args;

/// Environment variable holding the extraction request signing secret.
pub const SIGNING_SECRET_ENV: &str = "VIDGRAB_SIGNING_SECRET";

const BYTES_PER_MB: u64 = 1024 * 1024;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 5_000;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Values read from the `key = value` config file; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<u8>,
    pub max_attempts: Option<u8>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub preferred_format: Option<String>,
    pub extract_endpoint: Option<String>,
    pub catalog_domain: Option<String>,
    pub min_free_space_mb: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=MAX_CONCURRENCY).contains(&usize::from(concurrency))
        {
            bail!(
                "Invalid config value for `concurrency`: {concurrency}. Expected range: 1..={MAX_CONCURRENCY}"
            );
        }
        if let Some(attempts) = self.max_attempts
            && !(1..=10).contains(&attempts)
        {
            bail!("Invalid config value for `max_attempts`: {attempts}. Expected range: 1..=10");
        }
        validate_range("initial_delay_ms", self.initial_delay_ms, 0..=60_000)?;
        validate_range("max_delay_ms", self.max_delay_ms, 0..=600_000)?;
        if let (Some(initial), Some(max)) = (self.initial_delay_ms, self.max_delay_ms)
            && initial > max
        {
            bail!("Invalid config: `initial_delay_ms` ({initial}) exceeds `max_delay_ms` ({max})");
        }
        validate_range("min_free_space_mb", self.min_free_space_mb, 0..=1_048_576)?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1..=3600)?;
        validate_range("read_timeout_secs", self.read_timeout_secs, 1..=3600)?;
        validate_non_empty("preferred_format", self.preferred_format.as_deref())?;
        validate_non_empty("extract_endpoint", self.extract_endpoint.as_deref())?;
        validate_non_empty("catalog_domain", self.catalog_domain.as_deref())?;
        Ok(())
    }
}

fn validate_range(
    field: &str,
    value: Option<u64>,
    range: std::ops::RangeInclusive<u64>,
) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !range.contains(&value) {
        bail!(
            "Invalid config value for `{field}`: {value}. Expected range: {}..={}",
            range.start(),
            range.end()
        );
    }
    Ok(())
}

fn validate_non_empty(field: &str, value: Option<&str>) -> Result<()> {
    if let Some(value) = value
        && value.trim().is_empty()
    {
        bail!("Invalid config value for `{field}`: must not be empty");
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/vidgrab/config.toml`
/// 2. `$HOME/.config/vidgrab/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("vidgrab")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("vidgrab")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return read_config_file(path).map(Some);
    }

    match resolve_default_config_path() {
        Some(path) if path.exists() => read_config_file(&path).map(Some),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let line_number = line_index + 1;
        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_number}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "concurrency" => cfg.concurrency = Some(parse_integer_u8(value).with_context(context)?),
            "max_attempts" => {
                cfg.max_attempts = Some(parse_integer_u8(value).with_context(context)?);
            }
            "initial_delay_ms" => {
                cfg.initial_delay_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "max_delay_ms" => {
                cfg.max_delay_ms = Some(parse_integer_u64(value).with_context(context)?);
            }
            "preferred_format" => {
                cfg.preferred_format = Some(parse_string_literal(value).with_context(context)?);
            }
            "extract_endpoint" => {
                cfg.extract_endpoint = Some(parse_string_literal(value).with_context(context)?);
            }
            "catalog_domain" => {
                cfg.catalog_domain = Some(parse_string_literal(value).with_context(context)?);
            }
            "min_free_space_mb" => {
                cfg.min_free_space_mb = Some(parse_integer_u64(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let value = parse_integer_u64(raw_value)?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

/// Effective settings after CLI flags are layered over the config file.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub settings: OrchestratorSettings,
    pub extract_endpoint: String,
    pub catalog_domain: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl RuntimeConfig {
    /// Merges CLI flags over file values over built-in defaults.
    ///
    /// The extraction endpoint and the catalog domain have no default.
    pub fn resolve(args: &Args, file: Option<FileConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();

        let Some(extract_endpoint) = args.endpoint.clone().or(file.extract_endpoint) else {
            bail!("No extraction endpoint configured; pass --endpoint or set `extract_endpoint`");
        };
        let Some(catalog_domain) = args.catalog_domain.clone().or(file.catalog_domain) else {
            bail!("No catalog domain configured; pass --catalog-domain or set `catalog_domain`");
        };

        let concurrency = args
            .concurrency
            .or(file.concurrency)
            .map_or(DEFAULT_CONCURRENCY, usize::from);
        let max_attempts = args
            .max_attempts
            .or(file.max_attempts)
            .map_or(DEFAULT_MAX_ATTEMPTS, u32::from);
        let initial_delay_ms = file.initial_delay_ms.unwrap_or(DEFAULT_INITIAL_DELAY_MS);
        let max_delay_ms = file
            .max_delay_ms
            .unwrap_or(DEFAULT_MAX_DELAY_MS)
            .max(initial_delay_ms);

        let settings = OrchestratorSettings {
            output_dir: args
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(resolve_default_directory),
            concurrency,
            retry_policy: RetryPolicy::new(
                max_attempts,
                Duration::from_millis(initial_delay_ms),
                Duration::from_millis(max_delay_ms),
                2.0,
            ),
            preferred_format: args
                .format
                .clone()
                .or(file.preferred_format)
                .unwrap_or_else(|| DEFAULT_PREFERRED_FORMAT.to_string()),
            min_free_space: file
                .min_free_space_mb
                .map_or(DEFAULT_MIN_FREE_SPACE, |mb| mb.saturating_mul(BYTES_PER_MB)),
        };

        Ok(Self {
            settings,
            extract_endpoint,
            catalog_domain,
            connect_timeout_secs: file
                .connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
        })
    }
}

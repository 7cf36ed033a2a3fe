//! Configuration management for `ticket_ferry`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`FERRY_*`, `SUPEROPS_API_KEY`, `SYNCRO_API_KEY`, ...)
//! 3. Project config (.ferry/config.yaml)
//! 4. User config (~/.config/tferry/config.yaml)
//! 5. Defaults
//!
//! Every source is flattened into dotted keys (`destination.api-key`,
//! `missing.contact`, `status-map.In Progress`) and merged into one
//! [`ConfigLayer`], which [`FerryConfig::from_layer`] turns into typed settings.

use crate::api::{HttpSettings, SuperOpsClient, SyncroClient, superops};
use crate::dedup::SubjectMarker;
use crate::error::{FerryError, Result};
use crate::import::ImportSettings;
use crate::resolve::{MissingPolicy, ResolvePolicy};
use crate::util::{normalize_key as normalize_match_key, parse_source_timestamp, parse_utc_offset};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the working directory discovered from the CWD.
pub const FERRY_DIR_NAME: &str = ".ferry";
const SNAPSHOT_FILENAME: &str = "reference.json";
const LINKS_DB_FILENAME: &str = "links.db";
const LOGS_DIRNAME: &str = "logs";
const CONFIG_FILENAME: &str = "config.yaml";

/// Config file written by `tferry init`.
pub const DEFAULT_CONFIG_YAML: &str = r#"# tferry configuration. Environment variables and CLI flags override these.
source:
  # url: https://api.superops.ai/msp
  # subdomain: your-tenant
  # api-key: set SUPEROPS_API_KEY instead of storing it here
destination:
  # url: https://your-account.syncromsp.com/api/v1
  # api-key: set SYNCRO_API_KEY instead of storing it here
http:
  rate-limit-ms: 500
  timeout-secs: 30
  max-retries: 3
import:
  # cutoff: 2024-04-01
  utc-offset: "+00:00"
dedup:
  marker-prefix: SRC
  legacy-suffix: false
missing:
  customer: fail
  contact: create
  technician: skip
  status: default:Resolved
  issue-type: default:Other
# status-map:
#   Closed: Resolved
# type-map:
#   Hardware: Hardware Issue
"#;

/// Files inside a ferry directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FerryPaths {
    pub dir: PathBuf,
    pub config: PathBuf,
    pub snapshot: PathBuf,
    pub links_db: PathBuf,
    pub logs: PathBuf,
}

impl FerryPaths {
    #[must_use]
    pub fn new(ferry_dir: &Path) -> Self {
        Self {
            dir: ferry_dir.to_path_buf(),
            config: ferry_dir.join(CONFIG_FILENAME),
            snapshot: ferry_dir.join(SNAPSHOT_FILENAME),
            links_db: ferry_dir.join(LINKS_DB_FILENAME),
            logs: ferry_dir.join(LOGS_DIRNAME),
        }
    }
}

/// Discover the active `.ferry` directory.
///
/// Honors `FERRY_DIR` when set, otherwise walks up from `start` (or CWD).
///
/// # Errors
///
/// Returns an error if no ferry directory is found or the CWD cannot be read.
pub fn discover_ferry_dir(start: Option<&Path>) -> Result<PathBuf> {
    discover_ferry_dir_with_env(start, None)
}

fn discover_ferry_dir_with_env(
    start: Option<&Path>,
    env_override: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = env_override {
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
    } else if let Ok(value) = env::var("FERRY_DIR") {
        if !value.trim().is_empty() {
            let path = PathBuf::from(value);
            if path.is_dir() {
                return Ok(path);
            }
        }
    }

    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        let candidate = current.join(FERRY_DIR_NAME);
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    Err(FerryError::NotInitialized)
}

/// Flattened `dotted.key -> value` configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: HashMap<String, String>,
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        Ok(layer_from_yaml_value(&value))
    }

    /// Build a layer from environment variables.
    ///
    /// `FERRY_SECTION__SOME_KEY` maps to `section.some-key`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut layer = Self::default();

        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix("FERRY_") {
                if stripped == "DIR" {
                    continue;
                }
                for variant in env_key_variants(stripped) {
                    layer.insert(&variant, value.clone());
                }
                continue;
            }

            let mapped = match key.as_str() {
                "SUPEROPS_API_KEY" => "source.api-key",
                "SUPEROPS_SUBDOMAIN" => "source.subdomain",
                "SYNCRO_API_KEY" => "destination.api-key",
                "SYNCRO_URL" => "destination.url",
                _ => continue,
            };
            layer.insert(mapped, value);
        }

        layer
    }

    /// Insert a value under its canonical key.
    pub fn insert(&mut self, key: &str, value: String) {
        self.values.insert(canonical_key(key), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&canonical_key(key))
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Entries under `prefix.` with the prefix removed.
    fn section(&self, prefix: &str) -> impl Iterator<Item = (&str, &str)> {
        let prefix = format!("{prefix}.");
        self.values.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix.as_str())
                .map(|rest| (rest, value.as_str()))
        })
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub destination_url: Option<String>,
    pub cutoff: Option<String>,
    pub rate_limit_ms: Option<u64>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(url) = &self.destination_url {
            layer.insert("destination.url", url.clone());
        }
        if let Some(cutoff) = &self.cutoff {
            layer.insert("import.cutoff", cutoff.clone());
        }
        if let Some(rate_limit) = self.rate_limit_ms {
            layer.insert("http.rate-limit-ms", rate_limit.to_string());
        }

        layer
    }
}

/// Load project config (.ferry/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(ferry_dir: &Path) -> Result<ConfigLayer> {
    ConfigLayer::from_yaml(&ferry_dir.join(CONFIG_FILENAME))
}

/// Load user config (~/.config/tferry/config.yaml). A missing HOME yields an empty layer.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home)
        .join(".config")
        .join("tferry")
        .join(CONFIG_FILENAME);
    ConfigLayer::from_yaml(&path)
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    for (key, value) in [
        ("source.url", superops::DEFAULT_BASE_URL),
        ("http.rate-limit-ms", "500"),
        ("http.timeout-secs", "30"),
        ("http.max-retries", "3"),
        ("http.retry-delay-ms", "1000"),
        ("import.utc-offset", "+00:00"),
        ("dedup.marker-prefix", crate::dedup::DEFAULT_MARKER_PREFIX),
        ("dedup.legacy-suffix", "false"),
        ("missing.customer", "fail"),
        ("missing.contact", "create"),
        ("missing.technician", "skip"),
        ("missing.status", "default:Resolved"),
        ("missing.issue-type", "default:Other"),
    ] {
        layer.insert(key, value.to_string());
    }
    layer
}

/// Load configuration with the standard precedence order.
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed.
pub fn load_config(ferry_dir: &Path, cli: &CliOverrides) -> Result<ConfigLayer> {
    let defaults = default_config_layer();
    let user = load_user_config()?;
    let project = load_project_config(ferry_dir)?;
    let env_layer = ConfigLayer::from_env();
    let cli_layer = cli.as_layer();

    Ok(ConfigLayer::merge_layers(&[
        defaults, user, project, env_layer, cli_layer,
    ]))
}

/// Connection settings for one remote system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub subdomain: Option<String>,
}

/// Typed configuration for a run.
#[derive(Debug, Clone)]
pub struct FerryConfig {
    pub source: EndpointConfig,
    pub destination: EndpointConfig,
    pub http: HttpSettings,
    pub cutoff: Option<DateTime<Utc>>,
    pub utc_offset: FixedOffset,
    pub marker: SubjectMarker,
    pub legacy_suffix: bool,
    pub policy: ResolvePolicy,
}

impl FerryConfig {
    /// Convert a merged layer into typed settings.
    ///
    /// Credentials are not required here; see [`source_client`](Self::source_client).
    ///
    /// # Errors
    ///
    /// Returns a config error for malformed numbers, dates, offsets, marker
    /// prefixes or missing policies.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let http = HttpSettings {
            timeout: Duration::from_secs(parse_u64(layer, "http.timeout-secs")?.unwrap_or(30)),
            min_interval: Duration::from_millis(
                parse_u64(layer, "http.rate-limit-ms")?.unwrap_or(500),
            ),
            max_retries: u32::try_from(parse_u64(layer, "http.max-retries")?.unwrap_or(3))
                .map_err(|_| FerryError::config("http.max-retries is too large"))?,
            retry_delay: Duration::from_millis(
                parse_u64(layer, "http.retry-delay-ms")?.unwrap_or(1000),
            ),
        };

        let cutoff = layer
            .get("import.cutoff")
            .map(|raw| {
                parse_source_timestamp(raw).ok_or_else(|| {
                    FerryError::config(format!(
                        "import.cutoff '{raw}' is not a date (expected e.g. 2024-04-01)"
                    ))
                })
            })
            .transpose()?;

        let raw_offset = layer.get("import.utc-offset").unwrap_or("+00:00");
        let utc_offset = parse_utc_offset(raw_offset).ok_or_else(|| {
            FerryError::config(format!(
                "import.utc-offset '{raw_offset}' is not a UTC offset (expected e.g. -05:00)"
            ))
        })?;

        let marker = SubjectMarker::new(
            layer
                .get("dedup.marker-prefix")
                .unwrap_or(crate::dedup::DEFAULT_MARKER_PREFIX),
        )?;
        let legacy_suffix = parse_flag(layer, "dedup.legacy-suffix")?.unwrap_or(false);

        let defaults = ResolvePolicy::default();
        let policy = ResolvePolicy {
            customer: parse_policy(layer, "missing.customer", defaults.customer)?,
            contact: parse_policy(layer, "missing.contact", defaults.contact)?,
            technician: parse_policy(layer, "missing.technician", defaults.technician)?,
            status: parse_policy(layer, "missing.status", defaults.status)?,
            issue_type: parse_policy(layer, "missing.issue-type", defaults.issue_type)?,
            status_map: value_map(layer, "status-map"),
            type_map: value_map(layer, "type-map"),
        };
        policy.validate()?;

        Ok(Self {
            source: endpoint(layer, "source"),
            destination: endpoint(layer, "destination"),
            http,
            cutoff,
            utc_offset,
            marker,
            legacy_suffix,
            policy,
        })
    }

    #[must_use]
    pub fn import_settings(&self) -> ImportSettings {
        ImportSettings {
            cutoff: self.cutoff,
            utc_offset: self.utc_offset,
            marker: self.marker.clone(),
            legacy_suffix: self.legacy_suffix,
        }
    }

    /// Build the SuperOps client.
    ///
    /// # Errors
    ///
    /// Returns a config error if the API key or subdomain is missing.
    pub fn source_client(&self) -> Result<SuperOpsClient> {
        let api_key = required(self.source.api_key.as_deref(), "source.api-key", "SUPEROPS_API_KEY")?;
        let subdomain = required(
            self.source.subdomain.as_deref(),
            "source.subdomain",
            "SUPEROPS_SUBDOMAIN",
        )?;
        let url = self
            .source
            .url
            .as_deref()
            .unwrap_or(superops::DEFAULT_BASE_URL);
        SuperOpsClient::new(url, api_key, subdomain, self.http)
            .map_err(|e| FerryError::config(format!("Cannot build SuperOps client: {e}")))
    }

    /// Build the Syncro client.
    ///
    /// # Errors
    ///
    /// Returns a config error if the API key or URL is missing.
    pub fn destination_client(&self) -> Result<SyncroClient> {
        let api_key = required(
            self.destination.api_key.as_deref(),
            "destination.api-key",
            "SYNCRO_API_KEY",
        )?;
        let url = required(self.destination.url.as_deref(), "destination.url", "SYNCRO_URL")?;
        SyncroClient::new(url, api_key, self.http)
            .map_err(|e| FerryError::config(format!("Cannot build Syncro client: {e}")))
    }
}

fn required<'a>(value: Option<&'a str>, key: &str, env_name: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FerryError::config(format!("{key} is not set (config.yaml or {env_name})")))
}

fn endpoint(layer: &ConfigLayer, section: &str) -> EndpointConfig {
    let get = |name: &str| layer.get(&format!("{section}.{name}")).map(str::to_string);
    EndpointConfig {
        url: get("url"),
        api_key: get("api-key"),
        subdomain: get("subdomain"),
    }
}

fn parse_u64(layer: &ConfigLayer, key: &str) -> Result<Option<u64>> {
    layer
        .get(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| FerryError::config(format!("{key} must be a whole number, got '{value}'")))
        })
        .transpose()
}

fn parse_flag(layer: &ConfigLayer, key: &str) -> Result<Option<bool>> {
    layer
        .get(key)
        .map(|value| {
            parse_bool(value)
                .ok_or_else(|| FerryError::config(format!("{key} must be true or false, got '{value}'")))
        })
        .transpose()
}

fn parse_policy(layer: &ConfigLayer, key: &str, fallback: MissingPolicy) -> Result<MissingPolicy> {
    match layer.get(key) {
        Some(value) => value
            .parse()
            .map_err(|e: String| FerryError::config(format!("{key}: {e}"))),
        None => Ok(fallback),
    }
}

fn value_map(layer: &ConfigLayer, section: &str) -> HashMap<String, String> {
    layer
        .section(section)
        .filter(|(_, to)| !to.trim().is_empty())
        .map(|(from, to)| (normalize_match_key(from), to.trim().to_string()))
        .collect()
}

/// Lower-case, `_` to `-`; the free-form part of `status-map.*` / `type-map.*`
/// keys is kept as written.
fn canonical_key(key: &str) -> String {
    let key = key.trim();
    if let Some((head, tail)) = key.split_once('.') {
        let head = normalize_key(head);
        if head == "status-map" || head == "type-map" {
            return format!("{head}.{}", tail.trim());
        }
    }
    normalize_key(key)
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn env_key_variants(raw: &str) -> Vec<String> {
    let raw_lower = raw.to_lowercase();
    let mut variants = vec![raw_lower.replace("__", ".").replace('_', "-")];
    if !raw_lower.contains("__") {
        let dotted = raw_lower.replacen('_', ".", 1);
        if !variants.contains(&dotted) {
            variants.push(dotted);
        }
    }
    variants
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    let mut flat = HashMap::new();
    flatten_yaml(value, "", &mut flat);

    for (key, value) in flat {
        layer.insert(&key, value);
    }

    layer
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = yaml_scalar_to_string(key) else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}

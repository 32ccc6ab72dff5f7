//! Application configuration loaded at startup.
//!
//! The file format follows the file extension (YAML, TOML or JSON).
//! `GAUGEWATCH_*` environment variables override file values.

use crate::error::{Result, WatchError};
use crate::watch::data::RecordSpec;
use crate::watch::parser::ParserKind;
use crate::watch::scan::ScanPattern;
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Command deadline used when a source does not set one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Monitor value format used when none is configured.
pub const DEFAULT_VALUE_FORMAT: &str = "%f";

/// Everything the watch service and the web surface are built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub monitors: Vec<MonitorConfig>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub graphs: Vec<GraphConfig>,
}

/// Metric kinds a monitor can publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    #[default]
    Gauge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: MonitorKind,
    pub value: MonitorValueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorValueConfig {
    pub source_id: String,
    pub record_id: String,
    #[serde(default)]
    pub header: String,
    #[serde(default = "default_value_format")]
    pub format: String,
    #[serde(default)]
    pub labels: Vec<LabelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub command: String,
    #[serde(
        default = "default_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,
    pub output: SourceOutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOutputConfig {
    pub parser: ParserKind,
    #[serde(default)]
    pub records: Vec<RecordConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    pub id: String,
    #[serde(default)]
    pub first_line_is_header: bool,
    #[serde(default)]
    pub header: Vec<String>,
    #[serde(default)]
    pub parser_options: BTreeMap<String, String>,
}

/// Chart settings handed to the dashboard as they are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub id: String,
    #[serde(default)]
    pub chart_delay: i64,
    #[serde(default)]
    pub chart_options: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub series_options: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub time_options: BTreeMap<String, serde_json::Value>,
}

impl From<&RecordConfig> for RecordSpec {
    fn from(config: &RecordConfig) -> Self {
        Self {
            id: config.id.clone(),
            header: config.header.clone(),
            first_row_is_header: config.first_line_is_header,
            options: config.parser_options.clone(),
        }
    }
}

impl AppConfig {
    /// Monitors keyed by id.
    pub fn monitors_map(&self) -> BTreeMap<&str, &MonitorConfig> {
        self.monitors.iter().map(|m| (m.id.as_str(), m)).collect()
    }

    /// Reject configurations the pipeline cannot run.
    pub fn validate(&self) -> Result<()> {
        let mut source_ids = HashSet::new();
        for source in &self.sources {
            if source.id.is_empty() {
                return Err(WatchError::config_error("source with an empty id"));
            }
            if !source_ids.insert(source.id.as_str()) {
                return Err(WatchError::config_error(format!("duplicate source id '{}'", source.id)));
            }
            let mut record_ids = HashSet::new();
            for record in &source.output.records {
                if !record_ids.insert(record.id.as_str()) {
                    return Err(WatchError::config_error(format!(
                        "source '{}': duplicate record id '{}'",
                        source.id, record.id
                    )));
                }
                let separator = record
                    .parser_options
                    .get("separator")
                    .or_else(|| record.parser_options.get("delimiter"));
                if let Some(sep) = separator {
                    if sep.len() != 1 || !sep.is_ascii() {
                        return Err(WatchError::config_error(format!(
                            "source '{}', record '{}': separator must be a single ASCII character, got '{}'",
                            source.id, record.id, sep
                        )));
                    }
                }
            }
        }

        let mut monitor_ids = HashSet::new();
        for monitor in &self.monitors {
            if !is_metric_name(&monitor.id) {
                return Err(WatchError::config_error(format!(
                    "monitor id '{}' is not a valid metric name",
                    monitor.id
                )));
            }
            if !monitor_ids.insert(monitor.id.as_str()) {
                return Err(WatchError::config_error(format!("duplicate monitor id '{}'", monitor.id)));
            }

            let value = &monitor.value;
            let Some(source) = self.sources.iter().find(|s| s.id == value.source_id) else {
                return Err(WatchError::config_error(format!(
                    "monitor '{}' refers to unknown source '{}'",
                    monitor.id, value.source_id
                )));
            };
            if !source.output.records.iter().any(|r| r.id == value.record_id) {
                return Err(WatchError::config_error(format!(
                    "monitor '{}' refers to unknown record '{}' of source '{}'",
                    monitor.id, value.record_id, value.source_id
                )));
            }
            if !ScanPattern::new(&value.format).has_placeholder() {
                return Err(WatchError::config_error(format!(
                    "monitor '{}': value format '{}' has no placeholder",
                    monitor.id, value.format
                )));
            }
        }
        Ok(())
    }
}

/// Load, but do not validate, the configuration at `path`.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let config = Config::builder()
        .add_source(File::from(path))
        .add_source(Environment::with_prefix("GAUGEWATCH").separator("__"))
        .build()
        .map_err(|e| WatchError::config_error(format!("{}: {}", path.display(), e)))?;

    let app: AppConfig = config
        .try_deserialize()
        .map_err(|e| WatchError::config_error(format!("{}: {}", path.display(), e)))?;
    debug!(
        path = %path.display(),
        sources = app.sources.len(),
        monitors = app.monitors.len(),
        "Configuration loaded"
    );
    Ok(app)
}

/// Parse `"250ms"`, `"5s"`, `"2m"`, `"1h"` or a bare number of milliseconds.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{input}'"))?;
    let seconds = match unit.trim() {
        "" | "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("invalid duration unit '{other}' in '{input}'")),
    };
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration '{input}': {e}"))
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn default_value_format() -> String {
    DEFAULT_VALUE_FORMAT.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{}ms", duration.as_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const YAML: &str = r#"
monitors:
  - id: wifi_signal
    title: WiFi signal
    value:
      source_id: router
      record_id: wifi
      header: signal
      labels:
        - header: ssid
  - id: downstream_power
    title: Downstream power
    value:
      source_id: modem
      record_id: downstream
      header: power
      format: "%f dBmV"
      labels:
        - header: dcid
        - header: freq
          format: "%s MHz"
sources:
  - id: router
    command: "cat /tmp/wifi"
    timeout: 2s
    output:
      parser: csv
      records:
        - id: wifi
          header: [signal, ssid]
          parser_options:
            separator: ":"
  - id: modem
    command: "curl -s http://192.168.100.1/status"
    output:
      parser: htmlquery
      records:
        - id: downstream
          first_line_is_header: true
          header: [name, dcid, freq, power]
          parser_options:
            format: table
            path: "table:nth-of-type(1) > tbody"
graphs:
  - id: signal
    chart_delay: 1000
"#;

    fn write_config(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml() {
        let file = write_config(YAML, ".yaml");
        let config = load_config(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.monitors.len(), 2);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.graphs.len(), 1);

        let wifi = &config.monitors[0];
        assert_eq!(wifi.kind, MonitorKind::Gauge);
        assert_eq!(wifi.value.format, DEFAULT_VALUE_FORMAT);
        assert_eq!(wifi.value.labels[0].format, None);

        let router = &config.sources[0];
        assert_eq!(router.timeout, Duration::from_secs(2));
        assert_eq!(router.output.parser, ParserKind::Delimited);
        assert_eq!(config.sources[1].timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.sources[1].output.parser, ParserKind::Markup);
        assert!(config.sources[1].output.records[0].first_line_is_header);

        assert!(config.monitors_map().contains_key("downstream_power"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/gaugewatch.yaml")).unwrap_err();
        assert!(matches!(err, WatchError::Config(_)));
    }

    #[test]
    fn test_record_spec_from_config() {
        let file = write_config(YAML, ".yaml");
        let config = load_config(file.path()).unwrap();
        let spec = RecordSpec::from(&config.sources[1].output.records[0]);

        assert_eq!(spec.id, "downstream");
        assert!(spec.first_row_is_header);
        assert_eq!(spec.options.get("format").map(String::as_str), Some("table"));
    }

    #[test]
    fn test_validate_unknown_source() {
        let file = write_config(YAML, ".yaml");
        let mut config = load_config(file.path()).unwrap();
        config.monitors[0].value.source_id = "switch".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown source 'switch'"));
    }

    #[test]
    fn test_validate_unknown_record_and_bad_name() {
        let file = write_config(YAML, ".yaml");
        let mut config = load_config(file.path()).unwrap();
        config.monitors[0].value.record_id = "lan".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("unknown record 'lan'"));

        config.monitors[0].value.record_id = "wifi".to_string();
        config.monitors[0].id = "wifi-signal".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("not a valid metric name"));
    }

    #[test]
    fn test_validate_format_without_placeholder() {
        let file = write_config(YAML, ".yaml");
        let mut config = load_config(file.path()).unwrap();
        config.monitors[1].value.format = "dBmV".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("no placeholder"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1500"), Ok(Duration::from_millis(1500)));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn test_config_round_trips_to_json() {
        let file = write_config(YAML, ".yaml");
        let config = load_config(file.path()).unwrap();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["sources"][0]["timeout"], "2000ms");
        assert_eq!(json["monitors"][0]["type"], "gauge");
        assert_eq!(json["sources"][1]["output"]["parser"], "htmlquery");
    }
}

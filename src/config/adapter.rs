use crate::error::ValidationError;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Output of an adapter: the canonical JSON document plus anything worth
/// telling the user about the conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Adapted {
    pub value: Value,
    pub warnings: Vec<String>,
}

/// Converts a source format into the canonical JSON document.
pub trait ConfigAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn adapt(&self, input: &str) -> Result<Adapted>;
}

pub struct JsonAdapter;

impl ConfigAdapter for JsonAdapter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn adapt(&self, input: &str) -> Result<Adapted> {
        let value: Value = serde_json::from_str(input).context("Failed to parse JSON")?;
        Ok(Adapted {
            value,
            warnings: Vec::new(),
        })
    }
}

pub struct TomlAdapter;

impl ConfigAdapter for TomlAdapter {
    fn name(&self) -> &'static str {
        "toml"
    }

    fn adapt(&self, input: &str) -> Result<Adapted> {
        let table: toml::Table = toml::from_str(input).context("Failed to parse TOML")?;

        let mut warnings = Vec::new();
        collect_datetime_warnings(&toml::Value::Table(table.clone()), "", &mut warnings);

        let value = serde_json::to_value(&table).context("Failed to convert TOML to JSON")?;
        Ok(Adapted { value, warnings })
    }
}

fn collect_datetime_warnings(value: &toml::Value, path: &str, warnings: &mut Vec<String>) {
    match value {
        toml::Value::Datetime(_) => warnings.push(format!(
            "[!] {}: TOML datetime has no JSON equivalent; quote it if a string was meant",
            path
        )),
        toml::Value::Table(table) => {
            for (key, v) in table {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                collect_datetime_warnings(v, &child, warnings);
            }
        }
        toml::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                collect_datetime_warnings(v, &format!("{}[{}]", path, i), warnings);
            }
        }
        _ => {}
    }
}

static ADAPTERS: &[&dyn ConfigAdapter] = &[&JsonAdapter, &TomlAdapter];

pub fn adapter_names() -> Vec<&'static str> {
    ADAPTERS.iter().map(|a| a.name()).collect()
}

pub fn adapter_for(name: &str) -> Result<&'static dyn ConfigAdapter> {
    ADAPTERS
        .iter()
        .copied()
        .find(|a| a.name() == name)
        .with_context(|| {
            format!(
                "Unknown config adapter '{}'. Available: {}",
                name,
                adapter_names().join(", ")
            )
        })
}

/// Adapter implied by the file extension; JSON when there is none.
pub fn detect(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => "toml",
        _ => "json",
    }
}

/// Read and adapt a configuration file. Syntax errors surface as a
/// document-level [`ValidationError`].
pub fn load(path: &Path, adapter: Option<&str>) -> Result<Adapted> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let adapter = adapter_for(adapter.unwrap_or_else(|| detect(path)))?;

    adapter.adapt(&content).map_err(|e| {
        ValidationError::document(format!("{} ({} adapter): {:#}", path.display(), adapter.name(), e))
            .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_toml_adapts_to_canonical_json() {
        let input = r#"
[server]
port = 9000

[[apps]]
module = "storage.memory"
name = "store1"
params = { entries = { greeting = "hello" } }

[[apps]]
module = "http.handlers.kv"
params = { storage = "store1" }
"#;
        let adapted = TomlAdapter.adapt(input).unwrap();
        assert!(adapted.warnings.is_empty());
        assert_eq!(
            adapted.value,
            json!({
                "server": {"port": 9000},
                "apps": [
                    {"module": "storage.memory", "name": "store1", "params": {"entries": {"greeting": "hello"}}},
                    {"module": "http.handlers.kv", "params": {"storage": "store1"}}
                ]
            })
        );
    }

    #[test]
    fn test_toml_datetime_warns() {
        let adapted = TomlAdapter.adapt("[lifecycle]\nsince = 1979-05-27T07:32:00Z\n").unwrap();
        assert_eq!(adapted.warnings.len(), 1);
        assert!(adapted.warnings[0].contains("lifecycle.since"));
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect(Path::new("fe-host.toml")), "toml");
        assert_eq!(detect(Path::new("fe-host.json")), "json");
        assert_eq!(detect(Path::new("fe-host")), "json");
    }

    #[test]
    fn test_unknown_adapter() {
        let err = adapter_for("caddyfile").err().unwrap();
        assert!(err.to_string().contains("Available: json, toml"));
    }

    #[test]
    fn test_load_syntax_error_is_validation_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = load(file.path(), Some("json")).unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
    }
}

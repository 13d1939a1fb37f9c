//! Configuration intake.
//!
//! The proxy is configured by a single document of the shape
//! `{ modules: [ { name, config }, … ] }`; list order is pipeline order
//! and extra top-level keys are ignored. The document comes either from
//! a file (extension-dispatched between JSON, YAML, and TOML) or from a
//! foreign document store (see [`store`]).

use std::path::Path;

use bson::{Bson, Document};

use crate::error::{ProxyError, Result};
use crate::modules::{ModuleChain, ModuleRegistry};

pub mod store;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8124;

/// Read a configuration document from a file, dispatching on its
/// extension.
pub fn load_file(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ProxyError::Config(format!(
            "error reading configuration file {}: {e}",
            path.display()
        ))
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| {
            ProxyError::Config(format!("{} lacks a filename extension", path.display()))
        })?;

    let value: serde_json::Value = match extension {
        "json" => serde_json::from_str(&content)
            .map_err(|e| ProxyError::Config(format!("failed to parse {}: {e}", path.display())))?,
        "yaml" | "yml" => serde_yaml::from_str(&content)
            .map_err(|e| ProxyError::Config(format!("failed to parse {}: {e}", path.display())))?,
        "toml" => toml::from_str(&content)
            .map_err(|e| ProxyError::Config(format!("failed to parse {}: {e}", path.display())))?,
        other => {
            return Err(ProxyError::Config(format!(
                "unrecognized extension: {other:?}"
            )))
        }
    };

    bson::to_document(&value)
        .map_err(|e| ProxyError::Config(format!("invalid configuration document: {e}")))
}

/// Build the module chain a configuration document describes.
///
/// A missing `modules` key or an unknown module name is a warning, not
/// an error; a module rejecting its options aborts startup.
pub fn build_chain(registry: &ModuleRegistry, config: &Document) -> Result<ModuleChain> {
    let mut chain = ModuleChain::new();

    let entries = match config.get("modules") {
        None => {
            tracing::warn!("no modules provided; proxy will start without modules");
            return Ok(chain);
        }
        Some(Bson::Array(entries)) => entries,
        Some(other) => {
            return Err(ProxyError::Config(format!(
                "\"modules\" must be an array, not {other:?}"
            )))
        }
    };

    for entry in entries {
        let Bson::Document(entry) = entry else {
            tracing::warn!("module configuration entry is not a document: {entry:?}");
            continue;
        };
        let Ok(name) = entry.get_str("name") else {
            tracing::warn!("module in configuration does not have a name");
            continue;
        };
        let Some(mut module) = registry.instantiate(name) else {
            tracing::warn!("module doesn't exist in the registry: {name}");
            continue;
        };

        let options = entry.get_document("config").cloned().unwrap_or_default();
        module.configure(options).map_err(|e| {
            ProxyError::Config(format!("invalid configuration for module {name}: {e}"))
        })?;

        chain.add(module);
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::default_registry;
    use bson::doc;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(extension: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{extension}"))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_json_yaml_and_toml_uniformly() {
        let json = write_config("json", r#"{"modules": [{"name": "mockule", "config": {}}]}"#);
        let yaml = write_config("yaml", "modules:\n  - name: mockule\n    config: {}\n");
        let toml = write_config("toml", "[[modules]]\nname = \"mockule\"\n[modules.config]\n");

        for file in [&json, &yaml, &toml] {
            let config = load_file(file.path()).unwrap();
            let entries = config.get_array("modules").unwrap();
            assert_eq!(entries.len(), 1, "wrong shape from {:?}", file.path());
        }
    }

    #[test]
    fn rejects_unknown_extension_and_bad_content() {
        let ini = write_config("ini", "[modules]");
        assert!(matches!(load_file(ini.path()), Err(ProxyError::Config(_))));

        let broken = write_config("json", "{not json");
        assert!(matches!(load_file(broken.path()), Err(ProxyError::Config(_))));
    }

    #[test]
    fn builds_chain_in_configuration_order() {
        let registry = default_registry();
        let config = doc! {
            "modules": [{ "name": "mockule", "config": {} }],
            "ignored": "extra top-level keys are fine",
        };
        let chain = build_chain(&registry, &config).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn unknown_module_is_skipped_not_fatal() {
        let registry = default_registry();
        let config = doc! {
            "modules": [
                { "name": "does-not-exist", "config": {} },
                { "name": "mockule" },
                { "no_name_at_all": 1 },
            ],
        };
        let chain = build_chain(&registry, &config).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn missing_modules_key_yields_empty_chain() {
        let registry = default_registry();
        let chain = build_chain(&registry, &doc! {}).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn non_array_modules_value_is_fatal() {
        let registry = default_registry();
        assert!(build_chain(&registry, &doc! { "modules": "mockule" }).is_err());
    }

    #[test]
    fn module_rejecting_options_is_fatal() {
        let registry = default_registry();
        let config = doc! {
            "modules": [{ "name": "mockule", "config": { "greeting": 42 } }],
        };
        assert!(build_chain(&registry, &config).is_err());
    }
}

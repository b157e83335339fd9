//! Configuration loading and parsing

use analytics_engine::{
    BlockDescriptor, EngineConfig, InputTarget, ModelDescriptor, OutputFormat, Wire,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    /// Event files replayed in addition to those given with `--events`
    #[serde(default)]
    pub events: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    /// Write one file per event file here instead of stdout
    pub output_dir: Option<PathBuf>,
    /// Also write the async signals emitted during replay
    #[serde(default)]
    pub include_signals: bool,
}

/// One model to deploy before replay
///
/// Blocks are either listed inline or read from a JSON deployment
/// descriptor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub id: String,
    pub descriptor_file: Option<PathBuf>,
    #[serde(default)]
    pub blocks: Vec<BlockDescriptor>,
    #[serde(default)]
    pub input_bindings: BTreeMap<String, InputTarget>,
    #[serde(default)]
    pub unbound_inputs: Vec<String>,
    #[serde(default)]
    pub wires: Vec<Wire>,
}

impl ModelConfig {
    /// Build the deployment descriptor of this model
    ///
    /// Relative descriptor paths are resolved against `base_dir`.
    pub fn descriptor(&self, base_dir: &Path) -> Result<ModelDescriptor> {
        if let Some(file) = &self.descriptor_file {
            let path = base_dir.join(file);
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read descriptor file: {:?}", path))?;
            let descriptor: ModelDescriptor = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse descriptor file: {:?}", path))?;
            return Ok(descriptor);
        }

        Ok(ModelDescriptor {
            blocks: self.blocks.clone(),
            input_bindings: self.input_bindings.clone(),
            unbound_inputs: self.unbound_inputs.clone(),
            wires: self.wires.clone(),
        })
    }
}

impl AppConfig {
    /// Resolve every model descriptor
    pub fn descriptors(&self, base_dir: &Path) -> Result<Vec<(String, ModelDescriptor)>> {
        self.models
            .iter()
            .map(|model| Ok((model.id.clone(), model.descriptor(base_dir)?)))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if model.id.trim().is_empty() {
                bail!("Model with an empty id");
            }
            if !seen.insert(model.id.as_str()) {
                bail!("Model {} is configured twice", model.id);
            }
            match (&model.descriptor_file, model.blocks.is_empty()) {
                (Some(_), false) => {
                    bail!("Model {} has both descriptor_file and inline blocks", model.id)
                }
                (None, true) => bail!("Model {} has no blocks", model.id),
                _ => {}
            }
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
        [engine]
        correlation_id = "replay-1"

        [output]
        format = "text"

        [[models]]
        id = "model_0"

        [[models.blocks]]
        id = "band"
        type = "apamax.analyticsbuilder.custom.AlarmBand"
        parameters = { upper = 10.0, lower = 5 }

        [models.input_bindings]
        temperature = { block = "band", input = "value" }
    "#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = toml::from_str(CONFIG).unwrap();
        assert_eq!(config.engine.correlation_id, "replay-1");
        assert_eq!(config.engine.max_signal_depth, 8);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.models.len(), 1);

        let descriptor = config.models[0].descriptor(Path::new(".")).unwrap();
        assert_eq!(descriptor.blocks[0].block_type, "apamax.analyticsbuilder.custom.AlarmBand");
        assert_eq!(descriptor.blocks[0].parameters["lower"].as_f64(), Some(5.0));
        assert_eq!(descriptor.input_bindings["temperature"].block, "band");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.models[0].id, "model_0");
    }

    #[test]
    fn test_descriptor_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("stats.json"),
            r#"{"blocks": [{"id": "stats", "type": "DiscreteStatistics"}]}"#,
        )
        .unwrap();
        let config: AppConfig = toml::from_str(
            r#"
            [[models]]
            id = "m"
            descriptor_file = "stats.json"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        let descriptors = config.descriptors(dir.path()).unwrap();
        assert_eq!(descriptors[0].0, "m");
        assert_eq!(descriptors[0].1.blocks[0].block_type, "DiscreteStatistics");
    }

    #[test]
    fn test_validation_errors() {
        let duplicate: AppConfig = toml::from_str(
            r#"
            [[models]]
            id = "m"
            blocks = [{ id = "s", type = "SumLast" }]

            [[models]]
            id = "m"
            blocks = [{ id = "s", type = "SumLast" }]
            "#,
        )
        .unwrap();
        assert!(duplicate.validate().is_err());

        let empty: AppConfig = toml::from_str("[[models]]\nid = \"m\"\n").unwrap();
        assert!(empty.validate().is_err());

        let missing = load_config(Path::new("/nonexistent/config.toml"));
        assert!(missing.unwrap_err().to_string().contains("Failed to read config file"));
    }
}

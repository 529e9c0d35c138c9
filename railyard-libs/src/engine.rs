//! Pipeline engine seam.
//!
//! Pipelines are executed by an external engine. The project only writes
//! pipeline definitions and builds the command lines that run them.

use crate::error::AppError;
use crate::Result;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Everything needed to write one pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineBuildRequest {
    pub pipeline_name: String,
    /// Module-qualified pipeline class
    pub class_name: String,
    pub output_yaml: PathBuf,
    /// Stage overrides file, if the flavor overrides any stage
    pub stages_config: Option<PathBuf>,
    pub output_dir: String,
    pub log_dir: String,
    pub kwargs: Map<String, Value>,
    pub catalog_tag: Option<String>,
}

/// Arguments of one engine invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandRequest {
    pub pipeline_path: String,
    /// Engine configuration file, derived from `pipeline_path` when unset
    pub config: Option<String>,
    pub inputs: IndexMap<String, String>,
    pub output_dir: String,
    pub log_dir: String,
    pub extra: IndexMap<String, String>,
}

/// External pipeline engine.
pub trait PipelineEngine {
    /// Write the pipeline definition to `request.output_yaml`.
    fn build_and_write(&self, request: &PipelineBuildRequest) -> Result<()>;

    /// Command line running a written pipeline.
    fn command(&self, request: &CommandRequest) -> Vec<String>;
}

/// Engine driving the `ceci` command line runner.
#[derive(Debug, Clone, Default)]
pub struct CeciEngine;

impl CeciEngine {
    /// Default engine configuration next to a pipeline definition.
    pub fn default_config(pipeline_path: &str) -> String {
        pipeline_path.replace(".yaml", "_config.yml")
    }
}

impl PipelineEngine for CeciEngine {
    fn build_and_write(&self, request: &PipelineBuildRequest) -> Result<()> {
        let mut definition = Map::new();
        definition.insert("name".to_string(), Value::String(request.pipeline_name.clone()));
        definition.insert(
            "pipeline_class".to_string(),
            Value::String(request.class_name.clone()),
        );
        definition.insert(
            "config".to_string(),
            Value::String(CeciEngine::default_config(
                &request.output_yaml.to_string_lossy(),
            )),
        );
        if let Some(stages_config) = &request.stages_config {
            definition.insert(
                "stages_config".to_string(),
                Value::String(stages_config.display().to_string()),
            );
        }
        if let Some(catalog_tag) = &request.catalog_tag {
            definition.insert("catalog_tag".to_string(), Value::String(catalog_tag.clone()));
        }
        definition.insert("output_dir".to_string(), Value::String(request.output_dir.clone()));
        definition.insert("log_dir".to_string(), Value::String(request.log_dir.clone()));
        definition.insert("kwargs".to_string(), Value::Object(request.kwargs.clone()));

        if let Some(parent) = request.output_yaml.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_yaml::to_string(&Value::Object(definition)).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to serialize pipeline {}: {}",
                request.pipeline_name, e
            ))
        })?;
        fs::write(&request.output_yaml, text)?;
        info!("Writing {:?}", request.output_yaml);
        Ok(())
    }

    fn command(&self, request: &CommandRequest) -> Vec<String> {
        let config = request
            .config
            .clone()
            .unwrap_or_else(|| CeciEngine::default_config(&request.pipeline_path));

        let mut command_line = vec![
            "ceci".to_string(),
            request.pipeline_path.clone(),
            format!("config={}", config),
            format!("output_dir={}", request.output_dir),
            format!("log_dir={}", request.log_dir),
        ];
        command_line.extend(
            request
                .inputs
                .iter()
                .map(|(key, value)| format!("inputs.{}={}", key, value)),
        );
        command_line.extend(
            request
                .extra
                .iter()
                .map(|(key, value)| format!("{}={}", key, value)),
        );
        command_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_command_line() {
        let mut inputs = IndexMap::new();
        inputs.insert("input_train".to_string(), "train.hdf5".to_string());
        inputs.insert("input_test".to_string(), "test.hdf5".to_string());
        let mut extra = IndexMap::new();
        extra.insert("resume".to_string(), "True".to_string());

        let command = CeciEngine.command(&CommandRequest {
            pipeline_path: "pipelines/pz_baseline.yaml".to_string(),
            config: None,
            inputs,
            output_dir: "out".to_string(),
            log_dir: "out/logs".to_string(),
            extra,
        });
        assert_eq!(
            command,
            vec![
                "ceci",
                "pipelines/pz_baseline.yaml",
                "config=pipelines/pz_baseline_config.yml",
                "output_dir=out",
                "log_dir=out/logs",
                "inputs.input_train=train.hdf5",
                "inputs.input_test=test.hdf5",
                "resume=True",
            ]
        );
    }

    #[test]
    fn test_build_and_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let output_yaml = temp_dir.path().join("pipelines/nested/pz_baseline.yaml");
        let mut kwargs = Map::new();
        kwargs.insert("algorithms".to_string(), json!({"knn": {"Module": "m"}}));

        CeciEngine
            .build_and_write(&PipelineBuildRequest {
                pipeline_name: "pz".to_string(),
                class_name: "rail.pipelines.estimation.pz_all.PzPipeline".to_string(),
                output_yaml: output_yaml.clone(),
                stages_config: None,
                output_dir: "scratch".to_string(),
                log_dir: "scratch/logs/pz".to_string(),
                kwargs,
                catalog_tag: Some("roman_rubin".to_string()),
            })
            .unwrap();

        let written: Value = serde_yaml::from_str(&fs::read_to_string(&output_yaml).unwrap()).unwrap();
        assert_eq!(written["pipeline_class"], json!("rail.pipelines.estimation.pz_all.PzPipeline"));
        assert_eq!(written["catalog_tag"], json!("roman_rubin"));
        assert_eq!(written["kwargs"]["algorithms"]["knn"]["Module"], json!("m"));
        assert!(written.get("stages_config").is_none());
    }
}

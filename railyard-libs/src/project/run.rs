//! Turning written pipelines into engine command lines.

use super::Project;
use crate::engine::CommandRequest;
use crate::error::AppError;
use crate::template::{self, Bindings};
use crate::Result;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// One engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    pub pipeline: String,
    pub command: Vec<String>,
    pub inputs: IndexMap<String, String>,
    pub output_dir: String,
    pub log_dir: String,
    /// Iteration variable values, empty for single-input runs
    pub iteration: Bindings,
}

impl Project {
    fn pipeline_path(&self, pipeline: &str, flavor: &str, bindings: &Bindings) -> Result<String> {
        let mut bindings = bindings.clone();
        bindings.insert("pipeline".to_string(), Value::String(pipeline.to_string()));
        bindings.insert("flavor".to_string(), Value::String(flavor.to_string()));
        self.get_path("pipeline_path", &bindings)
    }

    /// Command running a pipeline once on its flavor's input files.
    ///
    /// Each input of the pipeline names a file alias; an alias without
    /// its own flavor is looked up in the running flavor. `bindings` must
    /// bind `{selection}`.
    pub fn run_pipeline_single(&self, pipeline: &str, flavor: &str, bindings: &Bindings) -> Result<ExecutionUnit> {
        let pipeline_template = self.get_pipeline(pipeline)?;
        let pipeline_path = self.pipeline_path(pipeline, flavor, bindings)?;

        let mut inputs = IndexMap::new();
        for alias in pipeline_template.input_file_aliases()? {
            let alias_flavor = alias.flavor.as_deref().unwrap_or(flavor);
            let path = self.get_file_for_flavor(alias_flavor, &alias.tag, bindings)?;
            inputs.insert(alias.key, path);
        }

        let mut sink_bindings = bindings.clone();
        sink_bindings.insert("flavor".to_string(), Value::String(flavor.to_string()));
        let output_dir = self.get_path("ceci_output_dir", &sink_bindings)?;
        let log_dir = format!("{}/logs", output_dir);

        let command = self.generate_command(&CommandRequest {
            pipeline_path,
            inputs: inputs.clone(),
            output_dir: output_dir.clone(),
            log_dir: log_dir.clone(),
            ..Default::default()
        });
        debug!("{}", command.join(" "));

        Ok(ExecutionUnit {
            pipeline: pipeline.to_string(),
            command,
            inputs,
            output_dir,
            log_dir,
            iteration: Bindings::new(),
        })
    }

    /// Commands running a pipeline once per file of its input catalog.
    ///
    /// The pipeline's `input_catalog_basename` is bound as `{basename}`.
    /// Outputs go next to the matching file of the output catalog when the
    /// pipeline names one.
    pub fn run_pipeline_catalog(&self, pipeline: &str, flavor: &str, bindings: &Bindings) -> Result<Vec<ExecutionUnit>> {
        let pipeline_template = self.get_pipeline(pipeline)?;
        let input_catalog = pipeline_template.input_catalog_template.as_deref().ok_or_else(|| {
            AppError::ConfigError(format!("Pipeline '{}' has no input_catalog_template", pipeline))
        })?;
        let pipeline_path = self.pipeline_path(pipeline, flavor, bindings)?;

        let mut base = bindings.clone();
        base.insert("flavor".to_string(), Value::String(flavor.to_string()));
        if let Some(basename) = &pipeline_template.input_catalog_basename {
            base.insert("basename".to_string(), Value::String(basename.clone()));
        }
        let interpolants = self.interpolants(&base);

        let source = self.catalog_entry(input_catalog)?.instantiate(&interpolants)?;
        let sink = match &pipeline_template.output_catalog_template {
            Some(name) => Some(self.catalog_entry(name)?.instantiate(&interpolants)?),
            None => None,
        };

        let iteration_vars = source.iteration_values(&self.config.iteration_vars)?;
        let mut units = Vec::new();
        for combination in template::iteration_combinations(&iteration_vars)? {
            let input = source.resolve_one(&combination)?;
            let output_dir = match &sink {
                Some(sink) => {
                    let output = sink.resolve_one(&combination)?;
                    Path::new(&output)
                        .parent()
                        .map(|dir| dir.display().to_string())
                        .unwrap_or_default()
                }
                None => self.get_path("ceci_output_dir", &base)?,
            };
            let log_dir = format!("{}/logs", output_dir);

            let mut inputs = IndexMap::new();
            inputs.insert("input".to_string(), input);
            let command = self.generate_command(&CommandRequest {
                pipeline_path: pipeline_path.clone(),
                inputs: inputs.clone(),
                output_dir: output_dir.clone(),
                log_dir: log_dir.clone(),
                ..Default::default()
            });

            units.push(ExecutionUnit {
                pipeline: pipeline.to_string(),
                command,
                inputs,
                output_dir,
                log_dir,
                iteration: combination,
            });
        }
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::ci_document;
    use super::*;
    use serde_json::json;

    fn create_test_project() -> Project {
        Project::from_document(&ci_document("/data"), None).unwrap()
    }

    fn gold() -> Bindings {
        json!({"selection": "gold"}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_run_pipeline_single() {
        let project = create_test_project();
        let unit = project.run_pipeline_single("pz", "train_cosmos", &gold()).unwrap();

        assert_eq!(
            unit.inputs["input_train"],
            "/data/catalogs/test/ci_test_gold_baseline_100k.hdf5"
        );
        assert_eq!(unit.output_dir, "/data/projects/ci_test/data/gold_train_cosmos");
        assert_eq!(
            unit.command[..3],
            [
                "ceci".to_string(),
                "/data/projects/ci_test/pipelines/pz_train_cosmos.yaml".to_string(),
                "config=/data/projects/ci_test/pipelines/pz_train_cosmos_config.yml".to_string(),
            ]
        );
        assert!(unit
            .command
            .contains(&"inputs.input_test=/data/catalogs/test/ci_test_gold_baseline_100k.hdf5".to_string()));
    }

    #[test]
    fn test_alias_without_flavor_follows_running_flavor() {
        let project = create_test_project();
        let unit = project.run_pipeline_single("inform", "train_cosmos", &gold()).unwrap();
        assert_eq!(
            unit.inputs["input"],
            "/data/catalogs/test/ci_test_gold_train_cosmos_100k.hdf5"
        );
    }

    #[test]
    fn test_run_pipeline_catalog() {
        let project = create_test_project();
        let units = project
            .run_pipeline_catalog("spec_selection", "baseline", &gold())
            .unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].inputs["input"], "/data/catalogs/ci_test_gold/3433/part-0.csv");
        assert_eq!(units[0].output_dir, "/data/catalogs/ci_test_gold_baseline/3433");
        assert_eq!(units[0].log_dir, "/data/catalogs/ci_test_gold_baseline/3433/logs");
        assert_eq!(units[1].iteration["healpix"], json!(3344));
    }

    #[test]
    fn test_catalog_run_needs_input_catalog() {
        let project = create_test_project();
        assert!(matches!(
            project.run_pipeline_catalog("pz", "baseline", &gold()),
            Err(AppError::ConfigError(_))
        ));
    }
}

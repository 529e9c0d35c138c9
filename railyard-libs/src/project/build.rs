//! Writing pipeline definitions for a flavor.

use super::{ALL, Project};
use crate::components::{AlgorithmKind, PipelineInstance};
use crate::configurable::Configurable;
use crate::engine::PipelineBuildRequest;
use crate::error::AppError;
use crate::template::Bindings;
use crate::Result;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Kwarg the older project files used for the p(z) algorithm list.
const LEGACY_ALGORITHMS_KWARG: &str = "PZAlgorithms";

/// A pipeline ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineBuildPlan {
    pub request: PipelineBuildRequest,
    /// Overrides addressed to individual stages, written next to the pipeline
    pub stage_overrides: Map<String, Value>,
}

/// Outcome of [`Project::build_pipelines`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BuildReport {
    pub built: Vec<PathBuf>,
    pub skipped_existing: Vec<PathBuf>,
    /// Pipelines the flavor does not enable
    pub skipped_disabled: Vec<String>,
}

impl Project {
    /// Bind a pipeline template to a flavor and that flavor's overrides.
    pub fn make_pipeline_instance(&self, pipeline: &str, flavor: &str) -> Result<PipelineInstance> {
        self.get_pipeline(pipeline)?;
        let resolved = self.get_flavor(flavor)?;

        let mut interpolants = Map::new();
        interpolants.insert("flavor".to_string(), Value::String(flavor.to_string()));

        let instance = PipelineInstance {
            name: format!("{}_{}", pipeline, flavor),
            pipeline_template: pipeline.to_string(),
            flavor: flavor.to_string(),
            overrides: resolved.overrides_for(pipeline),
            interpolants,
        };
        instance.check()?;
        Ok(instance)
    }

    /// Work out everything needed to write one pipeline for one flavor.
    ///
    /// Algorithm lists in the kwargs (`algorithms: ['all']`, `selectors:
    /// ['zCOSMOS']`, ...) are expanded to the pipeline dictionary of the
    /// named algorithms.
    pub fn prepare_pipeline_build(&self, pipeline: &str, flavor: &str) -> Result<PipelineBuildPlan> {
        let template = self.get_pipeline(pipeline)?;
        let resolved = self.get_flavor(flavor)?;
        let instance = self.make_pipeline_instance(pipeline, flavor)?;

        let mut kwargs = instance.merged_kwargs(template);
        if let Some(algorithms) = kwargs.shift_remove(LEGACY_ALGORITHMS_KWARG) {
            kwargs.insert("algorithms".to_string(), algorithms);
        }
        for (key, value) in kwargs.iter_mut() {
            if let Some(kind) = AlgorithmKind::from_pipeline_kwarg(key) {
                *value = self.expand_algorithm_kwarg(kind, value)?;
            }
        }

        let mut bindings = Bindings::new();
        bindings.insert("pipeline".to_string(), Value::String(pipeline.to_string()));
        bindings.insert("flavor".to_string(), Value::String(flavor.to_string()));
        let output_yaml = PathBuf::from(self.get_path("pipeline_path", &bindings)?);

        let stage_overrides = instance.stage_overrides();
        let stages_config = if stage_overrides.is_empty() {
            None
        } else {
            let dir = output_yaml.parent().unwrap_or_else(|| Path::new("."));
            Some(dir.join(format!("{}_{}_overrides.yml", pipeline, flavor)))
        };

        let output_dir = self.get_common_path("project_scratch_dir", &Bindings::new())?;
        let log_dir = format!("{}/logs/{}", output_dir, pipeline);
        let (_, class_name) = template.class_parts();
        debug!("Preparing {} ({}) for flavor {}", pipeline, class_name, flavor);

        Ok(PipelineBuildPlan {
            request: PipelineBuildRequest {
                pipeline_name: pipeline.to_string(),
                class_name: template.pipeline_class.clone(),
                output_yaml,
                stages_config,
                output_dir,
                log_dir,
                kwargs,
                catalog_tag: resolved.catalog_tag.clone(),
            },
            stage_overrides,
        })
    }

    fn expand_algorithm_kwarg(&self, kind: AlgorithmKind, value: &Value) -> Result<Value> {
        let Value::Array(names) = value else {
            return Ok(value.clone());
        };
        let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
        if names.contains(&ALL) {
            return Ok(Value::Object(self.get_algorithms(kind)?));
        }

        let mut dict = Map::new();
        for name in names {
            self.get_algorithm_holder(kind, name)?.fill_dict(&mut dict);
        }
        Ok(Value::Object(dict))
    }

    /// Write every pipeline the flavor enables.
    ///
    /// # Arguments
    ///
    /// * `flavor` - Flavor to build for
    /// * `force` - Overwrite pipelines that were already written
    pub fn build_pipelines(&self, flavor: &str, force: bool) -> Result<BuildReport> {
        let resolved = self.get_flavor(flavor)?;
        let mut report = BuildReport::default();

        for template in self.get_pipelines()? {
            if !resolved.enables(&template.name) {
                info!("Skipping pipeline {} from flavor {}", template.name, flavor);
                report.skipped_disabled.push(template.name.clone());
                continue;
            }

            let plan = self.prepare_pipeline_build(&template.name, flavor)?;
            let output_yaml = plan.request.output_yaml.clone();
            if output_yaml.exists() {
                if force {
                    info!("Overwriting existing pipeline {:?}", output_yaml);
                } else {
                    info!("Skipping existing pipeline {:?}", output_yaml);
                    report.skipped_existing.push(output_yaml);
                    continue;
                }
            }

            if let Some(stages_config) = &plan.request.stages_config {
                write_stage_overrides(stages_config, &plan.stage_overrides)?;
            }
            self.engine.build_and_write(&plan.request)?;
            report.built.push(output_yaml);
        }

        Ok(report)
    }
}

fn write_stage_overrides(path: &Path, overrides: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_yaml::to_string(&Value::Object(overrides.clone()))
        .map_err(|e| AppError::ConfigError(format!("Failed to write {:?}: {}", path, e)))?;
    fs::write(path, text)?;
    info!("Writing {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::ci_document;
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_project(temp_dir: &TempDir) -> Project {
        let root = temp_dir.path().to_string_lossy().to_string();
        Project::from_document(&ci_document(&root), None).unwrap()
    }

    fn read_back(path: &Path) -> Value {
        serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_build_baseline_then_skip_existing() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_test_project(&temp_dir);

        let report = project.build_pipelines("baseline", false).unwrap();
        assert_eq!(report.built.len(), 3);
        assert!(report.skipped_disabled.is_empty());

        let pz = temp_dir.path().join("projects/ci_test/pipelines/pz_baseline.yaml");
        assert_eq!(report.built[0], pz);
        let written = read_back(&pz);
        assert_eq!(written["catalog_tag"], json!("roman_rubin"));
        let algorithms: Vec<&String> = written["kwargs"]["algorithms"].as_object().unwrap().keys().collect();
        assert_eq!(algorithms, vec!["knn", "gpz"]);

        let selection = read_back(&temp_dir.path().join("projects/ci_test/pipelines/spec_selection_baseline.yaml"));
        assert_eq!(
            selection["kwargs"]["selectors"]["zCOSMOS"]["Select"],
            json!("SpecSelection_zCOSMOS")
        );

        let report = project.build_pipelines("baseline", false).unwrap();
        assert!(report.built.is_empty());
        assert_eq!(report.skipped_existing.len(), 3);

        let report = project.build_pipelines("baseline", true).unwrap();
        assert_eq!(report.built.len(), 3);
    }

    #[test]
    fn test_flavor_disables_pipelines() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_test_project(&temp_dir);

        let report = project.build_pipelines("train_cosmos", false).unwrap();
        assert_eq!(
            report.built,
            vec![temp_dir.path().join("projects/ci_test/pipelines/pz_train_cosmos.yaml")]
        );
        assert_eq!(report.skipped_disabled, vec!["inform", "spec_selection"]);
    }

    #[test]
    fn test_flavor_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_test_project(&temp_dir);

        let plan = project.prepare_pipeline_build("pz", "gpz_gl").unwrap();
        let algorithms: Vec<&String> = plan.request.kwargs["algorithms"].as_object().unwrap().keys().collect();
        assert_eq!(algorithms, vec!["gpz"]);
        assert!(plan.stage_overrides.is_empty());
        assert!(plan.request.stages_config.is_none());

        project.build_pipelines("gpz_gl", false).unwrap();
        let overrides = temp_dir
            .path()
            .join("projects/ci_test/pipelines/inform_gpz_gl_overrides.yml");
        assert_eq!(read_back(&overrides), json!({"inform_gpz": {"gpz_method": "GL"}}));
        let inform = read_back(&temp_dir.path().join("projects/ci_test/pipelines/inform_gpz_gl.yaml"));
        assert_eq!(inform["stages_config"], json!(overrides.display().to_string()));
    }

    #[test]
    fn test_build_request_paths() {
        let temp_dir = TempDir::new().unwrap();
        let project = create_test_project(&temp_dir);
        let root = temp_dir.path().display().to_string();

        let plan = project.prepare_pipeline_build("inform", "baseline").unwrap();
        assert_eq!(plan.request.output_dir, format!("{}/projects/ci_test", root));
        assert_eq!(plan.request.log_dir, format!("{}/projects/ci_test/logs/inform", root));
        assert_eq!(
            plan.request.class_name,
            "rail.pipelines.estimation.inform_all.InformPipeline"
        );
    }

    #[test]
    fn test_legacy_algorithm_kwarg_and_unknown_names() {
        let temp_dir = TempDir::new().unwrap();
        let mut project = create_test_project(&temp_dir);
        project
            .add_flavor(
                "legacy",
                &json!({"pipeline_overrides": {"pz": {"kwargs": {"PZAlgorithms": ["knn"]}}}}),
            )
            .unwrap();
        let plan = project.prepare_pipeline_build("pz", "legacy").unwrap();
        let algorithms: Vec<&String> = plan.request.kwargs["algorithms"].as_object().unwrap().keys().collect();
        assert_eq!(algorithms, vec!["knn"]);
        assert!(!plan.request.kwargs.contains_key("PZAlgorithms"));

        project
            .add_flavor(
                "typo",
                &json!({"pipeline_overrides": {"default": {"kwargs": {"algorithms": ["gpzz"]}}}}),
            )
            .unwrap();
        assert!(matches!(
            project.prepare_pipeline_build("pz", "typo"),
            Err(AppError::UnknownComponent { .. })
        ));
    }
}

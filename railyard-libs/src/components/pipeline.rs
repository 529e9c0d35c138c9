//! Pipeline templates and instances
//!
//! ```yaml
//! Pipelines:
//!   - PipelineTemplate:
//!       name: pz
//!       pipeline_class: rail.pipelines.estimation.pz_all.PzPipeline
//!       input_file_templates:
//!         input_train:
//!           flavor: baseline
//!           tag: train
//!         input_test:
//!           flavor: baseline
//!           tag: test
//!       kwargs:
//!         algorithms: ['all']
//!   - PipelineInstance:
//!       name: pz_gpz_only
//!       pipeline_template: pz
//!       flavor: gpz
//!       overrides:
//!         kwargs:
//!           algorithms: ['gpz']
//! ```

use crate::configurable::{Configurable, Param, ParamDefault, ParamType, describe_value};
use crate::error::AppError;
use crate::merge;
use crate::registry::RegistryEntry;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const PIPELINE_TEMPLATE_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Pipeline name"),
    Param::required("pipeline_class", ParamType::Str, "Full class name for Pipeline"),
    Param::optional(
        "input_catalog_template",
        ParamType::Str,
        ParamDefault::Null,
        "Template to use for input catalog",
    ),
    Param::optional(
        "output_catalog_template",
        ParamType::Str,
        ParamDefault::Null,
        "Template to use for output catalog",
    ),
    Param::optional(
        "input_catalog_basename",
        ParamType::Str,
        ParamDefault::Null,
        "Basename of the input catalog files",
    ),
    Param::optional(
        "input_file_templates",
        ParamType::Dict,
        ParamDefault::EmptyDict,
        "Templates to use for input files",
    ),
    Param::optional(
        "kwargs",
        ParamType::Dict,
        ParamDefault::EmptyDict,
        "Keywords to provide Pipeline c'tor",
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTemplate {
    pub name: String,
    pub pipeline_class: String,
    pub input_catalog_template: Option<String>,
    pub output_catalog_template: Option<String>,
    pub input_catalog_basename: Option<String>,
    pub input_file_templates: Map<String, Value>,
    pub kwargs: Map<String, Value>,
}

/// One pipeline input bound to a flavor file alias.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFileAlias {
    /// Pipeline input key, e.g. `input_train`
    pub key: String,
    /// Label looked up in the flavor's `file_aliases`
    pub tag: String,
    /// Flavor to draw the file from, `None` for the running flavor
    pub flavor: Option<String>,
}

impl Configurable for PipelineTemplate {
    const TAG: &'static str = "PipelineTemplate";

    fn schema() -> &'static [Param] {
        PIPELINE_TEMPLATE_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<()> {
        let mut violations = Vec::new();

        if self.class_parts().0.is_empty() {
            violations.push(format!(
                "pipeline_class: '{}' is not a module-qualified class name",
                self.pipeline_class
            ));
        }

        for (key, spec) in &self.input_file_templates {
            if let Err(reason) = parse_input_alias(key, spec) {
                violations.push(format!("input_file_templates.{}: {}", key, reason));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidConfiguration {
                kind: Self::TAG.to_string(),
                name: self.name.clone(),
                violations,
            })
        }
    }
}

fn parse_input_alias(key: &str, spec: &Value) -> std::result::Result<InputFileAlias, String> {
    let Some(spec) = spec.as_object() else {
        return Err(format!("expected a mapping, got {}", describe_value(spec)));
    };
    let tag = spec
        .get("tag")
        .and_then(Value::as_str)
        .ok_or_else(|| "'tag' must be a string".to_string())?;
    let flavor = match spec.get("flavor") {
        None | Some(Value::Null) => None,
        Some(Value::String(flavor)) => Some(flavor.clone()),
        Some(other) => return Err(format!("'flavor' must be a string, got {}", describe_value(other))),
    };
    Ok(InputFileAlias {
        key: key.to_string(),
        tag: tag.to_string(),
        flavor,
    })
}

impl PipelineTemplate {
    /// Split `pipeline_class` into (module, class name).
    pub fn class_parts(&self) -> (&str, &str) {
        self.pipeline_class
            .rsplit_once('.')
            .unwrap_or(("", self.pipeline_class.as_str()))
    }

    /// Declared file inputs, in declaration order.
    pub fn input_file_aliases(&self) -> Result<Vec<InputFileAlias>> {
        self.input_file_templates
            .iter()
            .map(|(key, spec)| {
                parse_input_alias(key, spec).map_err(|reason| AppError::InvalidConfiguration {
                    kind: Self::TAG.to_string(),
                    name: self.name.clone(),
                    violations: vec![format!("input_file_templates.{}: {}", key, reason)],
                })
            })
            .collect()
    }
}

const PIPELINE_INSTANCE_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Pipeline name"),
    Param::required(
        "pipeline_template",
        ParamType::Str,
        "Name of PipelineTemplate to use",
    ),
    Param::optional(
        "flavor",
        ParamType::Str,
        ParamDefault::Str("baseline"),
        "Flavor the instance is bound to",
    ),
    Param::optional(
        "overrides",
        ParamType::Dict,
        ParamDefault::EmptyDict,
        "Parameters to override from template",
    ),
    Param::optional(
        "interpolants",
        ParamType::Dict,
        ParamDefault::EmptyDict,
        "Parameters to interpolate from template",
    ),
];

/// A pipeline template bound to one flavor with its overrides merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInstance {
    pub name: String,
    pub pipeline_template: String,
    pub flavor: String,
    pub overrides: Map<String, Value>,
    pub interpolants: Map<String, Value>,
}

impl Configurable for PipelineInstance {
    const TAG: &'static str = "PipelineInstance";

    fn schema() -> &'static [Param] {
        PIPELINE_INSTANCE_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl PipelineInstance {
    /// Template `kwargs` with the instance's `overrides.kwargs` deep-merged on top.
    pub fn merged_kwargs(&self, template: &PipelineTemplate) -> Map<String, Value> {
        let base = Value::Object(template.kwargs.clone());
        match self.overrides.get("kwargs") {
            Some(overlay) => match merge::deep_merge(&base, overlay) {
                Value::Object(map) => map,
                _ => template.kwargs.clone(),
            },
            None => template.kwargs.clone(),
        }
    }

    /// Overrides addressed to pipeline stages, i.e. everything but `kwargs`.
    pub fn stage_overrides(&self) -> Map<String, Value> {
        self.overrides
            .iter()
            .filter(|(key, _)| key.as_str() != "kwargs")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Entry of the `Pipelines` category.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEntry {
    Template(PipelineTemplate),
    Instance(PipelineInstance),
}

impl PipelineEntry {
    pub const TAGS: &'static [&'static str] = &[PipelineTemplate::TAG, PipelineInstance::TAG];

    pub fn as_template(&self) -> Option<&PipelineTemplate> {
        match self {
            PipelineEntry::Template(t) => Some(t),
            PipelineEntry::Instance(_) => None,
        }
    }

    pub fn as_instance(&self) -> Option<&PipelineInstance> {
        match self {
            PipelineEntry::Instance(i) => Some(i),
            PipelineEntry::Template(_) => None,
        }
    }
}

impl RegistryEntry for PipelineEntry {
    fn from_tagged(tag: &str, raw: &Value) -> Result<Self> {
        match tag {
            PipelineTemplate::TAG => Ok(PipelineEntry::Template(PipelineTemplate::from_dict(raw)?)),
            _ => Ok(PipelineEntry::Instance(PipelineInstance::from_dict(raw)?)),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            PipelineEntry::Template(_) => PipelineTemplate::TAG,
            PipelineEntry::Instance(_) => PipelineInstance::TAG,
        }
    }

    fn name(&self) -> &str {
        match self {
            PipelineEntry::Template(t) => &t.name,
            PipelineEntry::Instance(i) => &i.name,
        }
    }

    fn to_dict(&self) -> Result<Value> {
        match self {
            PipelineEntry::Template(t) => t.to_dict(),
            PipelineEntry::Instance(i) => i.to_dict(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pz_template() -> PipelineTemplate {
        PipelineTemplate::from_dict(&json!({
            "name": "pz",
            "pipeline_class": "rail.pipelines.estimation.pz_all.PzPipeline",
            "input_file_templates": {
                "input_train": {"flavor": "baseline", "tag": "train"},
                "input_test": {"tag": "test"},
            },
            "kwargs": {"algorithms": ["all"], "n_bins": 10},
        }))
        .unwrap()
    }

    #[test]
    fn test_class_parts() {
        let template = pz_template();
        assert_eq!(
            template.class_parts(),
            ("rail.pipelines.estimation.pz_all", "PzPipeline")
        );
        assert_eq!(template.input_catalog_template, None);
    }

    #[test]
    fn test_input_file_aliases() {
        let aliases = pz_template().input_file_aliases().unwrap();
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases[0].key, "input_train");
        assert_eq!(aliases[0].flavor.as_deref(), Some("baseline"));
        assert_eq!(aliases[1].tag, "test");
        assert_eq!(aliases[1].flavor, None);
    }

    #[test]
    fn test_bad_input_alias_rejected() {
        let err = PipelineTemplate::from_dict(&json!({
            "name": "bad",
            "pipeline_class": "PzPipeline",
            "input_file_templates": {"input": "train"},
        }))
        .unwrap_err();
        match err {
            AppError::InvalidConfiguration { violations, .. } => assert_eq!(violations.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_instance_merges_kwargs() {
        let instance = PipelineInstance::from_dict(&json!({
            "name": "pz_gpz",
            "pipeline_template": "pz",
            "overrides": {
                "kwargs": {"algorithms": ["gpz"]},
                "inform_gpz": {"gpz_method": "GL"},
            },
        }))
        .unwrap();
        assert_eq!(instance.flavor, "baseline");

        let kwargs = instance.merged_kwargs(&pz_template());
        assert_eq!(Value::Object(kwargs), json!({"algorithms": ["gpz"], "n_bins": 10}));
        assert_eq!(
            Value::Object(instance.stage_overrides()),
            json!({"inform_gpz": {"gpz_method": "GL"}})
        );
    }

    #[test]
    fn test_template_round_trip() {
        let template = pz_template();
        let entry = PipelineEntry::from_tagged("PipelineTemplate", &template.to_dict().unwrap()).unwrap();
        assert_eq!(entry.as_template(), Some(&template));
    }
}

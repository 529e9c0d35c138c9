//! Analysis flavors
//!
//! A flavor is the project's `Baseline` with a named set of overrides merged
//! on top. Flavors are validated leniently: projects may attach their own
//! keys next to the known ones.

use crate::configurable::{Configurable, Param, ParamDefault, ParamType, ValidationMode};
use crate::error::AppError;
use crate::merge;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const FLAVOR_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Flavor name"),
    Param::optional(
        "catalog_tag",
        ParamType::Str,
        ParamDefault::Null,
        "tag for catalog being used",
    ),
    Param::optional(
        "pipelines",
        ParamType::List,
        ParamDefault::StrList(&["all"]),
        "pipelines being used",
    ),
    Param::optional(
        "file_aliases",
        ParamType::Dict,
        ParamDefault::EmptyDict,
        "file aliases used",
    ),
    Param::optional(
        "pipeline_overrides",
        ParamType::Dict,
        ParamDefault::EmptyDict,
        "per-pipeline overrides, 'default' applies to every pipeline",
    ),
];

/// Key of the override block applied to every pipeline.
pub const DEFAULT_OVERRIDE_KEY: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub name: String,
    pub catalog_tag: Option<String>,
    pub pipelines: Vec<String>,
    pub file_aliases: Map<String, Value>,
    pub pipeline_overrides: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Configurable for Flavor {
    const TAG: &'static str = "Flavor";
    const MODE: ValidationMode = ValidationMode::Lenient;

    fn schema() -> &'static [Param] {
        FLAVOR_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<()> {
        let violations: Vec<String> = self
            .file_aliases
            .iter()
            .filter(|(_, alias)| !alias.is_string())
            .map(|(label, _)| format!("file_aliases.{}: expected a file name", label))
            .collect();

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

impl Flavor {
    /// Build a flavor by merging `overrides` onto `baseline`.
    ///
    /// # Arguments
    ///
    /// * `name` - Flavor name, takes precedence over any `name` key
    /// * `baseline` - The project's `Baseline` block
    /// * `overrides` - The flavor's own keys, empty for the baseline itself
    pub fn derive(name: &str, baseline: &Value, overrides: &Value) -> Result<Self> {
        let mut merged = if overrides.is_null() {
            baseline.clone()
        } else {
            merge::deep_merge(baseline, overrides)
        };
        if merged.is_null() {
            merged = Value::Object(Map::new());
        }
        let Value::Object(map) = &mut merged else {
            return Err(AppError::ConfigError(format!(
                "Flavor '{}' must be a mapping of options",
                name
            )));
        };
        map.insert("name".to_string(), Value::String(name.to_string()));
        Self::from_dict(&merged)
    }

    /// Whether the flavor builds `pipeline`.
    pub fn enables(&self, pipeline: &str) -> bool {
        self.pipelines
            .iter()
            .any(|enabled| enabled == "all" || enabled == pipeline)
    }

    /// File name a label is aliased to.
    ///
    /// # Errors
    ///
    /// * `AppError::ConfigError` if the label is not aliased by this flavor
    pub fn file_alias(&self, label: &str) -> Result<&str> {
        self.file_aliases
            .get(label)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::ConfigError(format!(
                    "Label '{}' not found in flavor '{}', known labels are {:?}",
                    label,
                    self.name,
                    self.file_aliases.keys().collect::<Vec<_>>()
                ))
            })
    }

    /// Overrides for one pipeline: the `default` block with the
    /// pipeline-specific block deep-merged on top.
    pub fn overrides_for(&self, pipeline: &str) -> Map<String, Value> {
        let mut merged = self
            .pipeline_overrides
            .get(DEFAULT_OVERRIDE_KEY)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        if let Some(specific) = self.pipeline_overrides.get(pipeline) {
            merge::merge_into(&mut merged, specific);
        }

        match merged {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inherits_unspecified_keys() {
        let baseline = json!({"pipelines": ["all"], "x": 1});
        let flavor = Flavor::derive("pz_only", &baseline, &json!({"pipelines": ["pz"]})).unwrap();
        assert_eq!(flavor.pipelines, vec!["pz".to_string()]);
        assert_eq!(flavor.extra.get("x"), Some(&json!(1)));
        assert!(flavor.enables("pz"));
        assert!(!flavor.enables("inform"));

        let base = Flavor::derive("baseline", &baseline, &json!({})).unwrap();
        assert!(base.enables("inform"));
    }

    #[test]
    fn test_override_precedence() {
        let flavor = Flavor::derive(
            "gpz",
            &json!({}),
            &json!({"pipeline_overrides": {
                "default": {"kwargs": {"algorithms": ["gpz"]}},
                "inform": {"inform_gpz": {"gpz_method": "GL"}},
            }}),
        )
        .unwrap();

        assert_eq!(
            Value::Object(flavor.overrides_for("inform")),
            json!({"kwargs": {"algorithms": ["gpz"]}, "inform_gpz": {"gpz_method": "GL"}})
        );
        assert_eq!(
            Value::Object(flavor.overrides_for("estimate")),
            json!({"kwargs": {"algorithms": ["gpz"]}})
        );
    }

    #[test]
    fn test_specific_override_wins_on_same_path() {
        let flavor = Flavor::derive(
            "f",
            &json!({}),
            &json!({"pipeline_overrides": {
                "default": {"kwargs": {"algorithms": ["gpz"], "n": 1}},
                "pz": {"kwargs": {"algorithms": ["knn"]}},
            }}),
        )
        .unwrap();
        assert_eq!(
            Value::Object(flavor.overrides_for("pz")),
            json!({"kwargs": {"algorithms": ["knn"], "n": 1}})
        );
    }

    #[test]
    fn test_file_alias_lookup() {
        let flavor = Flavor::derive(
            "baseline",
            &json!({"file_aliases": {"train": "test_file_100k"}}),
            &Value::Null,
        )
        .unwrap();
        assert_eq!(flavor.file_alias("train").unwrap(), "test_file_100k");
        assert!(matches!(flavor.file_alias("test"), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_derive_name_wins() {
        let flavor = Flavor::derive("real", &json!({"name": "ignored"}), &json!({"name": "also"})).unwrap();
        assert_eq!(flavor.name, "real");
        assert!(flavor.extra.is_empty());
    }
}

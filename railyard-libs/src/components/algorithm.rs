//! Algorithm holders
//!
//! An algorithm holder names an implementation module and binds each role
//! of its kind (e.g. `Inform` and `Estimate` for p(z) algorithms) to a class
//! name. Holders never load anything themselves; they only resolve a role to
//! an [`AlgorithmRef`] that the pipeline engine or the algorithm table
//! understands.
//!
//! ```yaml
//! PZAlgorithms:
//!   - PZAlgorithm:
//!       name: knn
//!       Estimate: KNearNeighEstimator
//!       Inform: KNearNeighInformer
//!       Module: rail.estimation.algos.k_nearneigh
//! ```

use crate::configurable::{Param, ParamType, ValidationMode, validate_options};
use crate::error::AppError;
use crate::registry::RegistryEntry;
use crate::Result;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;

/// The closed set of algorithm kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    PZAlgorithm,
    Classifier,
    Summarizer,
    SpecSelection,
    ErrorModel,
    Reducer,
    Subsampler,
}

const PZ_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Algorithm name"),
    Param::required("Module", ParamType::Str, "Name of associated module"),
    Param::required("Estimate", ParamType::Str, "Estimator Class"),
    Param::required("Inform", ParamType::Str, "Informer Class"),
];

const CLASSIFIER_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Algorithm name"),
    Param::required("Module", ParamType::Str, "Name of associated module"),
    Param::required("Classify", ParamType::Str, "Classifier Class"),
];

const SUMMARIZER_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Algorithm name"),
    Param::required("Module", ParamType::Str, "Name of associated module"),
    Param::required("Summarize", ParamType::Str, "Summarizer Class"),
];

const SPEC_SELECTION_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Algorithm name"),
    Param::required("Module", ParamType::Str, "Name of associated module"),
    Param::required("Select", ParamType::Str, "Selector Class"),
];

const ERROR_MODEL_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Algorithm name"),
    Param::required("Module", ParamType::Str, "Name of associated module"),
    Param::required("ErrorModel", ParamType::Str, "Photometric Error Model Class"),
];

const REDUCER_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Algorithm name"),
    Param::required("Module", ParamType::Str, "Name of associated module"),
    Param::required("Reduce", ParamType::Str, "Data Reducer Class"),
];

const SUBSAMPLER_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Algorithm name"),
    Param::required("Module", ParamType::Str, "Name of associated module"),
    Param::required("Subsample", ParamType::Str, "Data Subsampler Class"),
];

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 7] = [
        AlgorithmKind::SpecSelection,
        AlgorithmKind::PZAlgorithm,
        AlgorithmKind::Classifier,
        AlgorithmKind::Summarizer,
        AlgorithmKind::ErrorModel,
        AlgorithmKind::Subsampler,
        AlgorithmKind::Reducer,
    ];

    /// Position of the kind in [`AlgorithmKind::ALL`].
    pub fn index(&self) -> usize {
        match self {
            AlgorithmKind::SpecSelection => 0,
            AlgorithmKind::PZAlgorithm => 1,
            AlgorithmKind::Classifier => 2,
            AlgorithmKind::Summarizer => 3,
            AlgorithmKind::ErrorModel => 4,
            AlgorithmKind::Subsampler => 5,
            AlgorithmKind::Reducer => 6,
        }
    }

    /// Tag of a holder block.
    pub fn tag(&self) -> &'static str {
        match self {
            AlgorithmKind::PZAlgorithm => "PZAlgorithm",
            AlgorithmKind::Classifier => "Classifier",
            AlgorithmKind::Summarizer => "Summarizer",
            AlgorithmKind::SpecSelection => "SpecSelection",
            AlgorithmKind::ErrorModel => "ErrorModel",
            AlgorithmKind::Reducer => "Reducer",
            AlgorithmKind::Subsampler => "Subsampler",
        }
    }

    /// Document category holding holders of this kind.
    pub fn category(&self) -> &'static str {
        match self {
            AlgorithmKind::PZAlgorithm => "PZAlgorithms",
            AlgorithmKind::Classifier => "Classifiers",
            AlgorithmKind::Summarizer => "Summarizers",
            AlgorithmKind::SpecSelection => "SpecSelections",
            AlgorithmKind::ErrorModel => "ErrorModels",
            AlgorithmKind::Reducer => "Reducers",
            AlgorithmKind::Subsampler => "Subsamplers",
        }
    }

    /// Tags accepted in this kind's category (one per kind).
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            AlgorithmKind::PZAlgorithm => &["PZAlgorithm"],
            AlgorithmKind::Classifier => &["Classifier"],
            AlgorithmKind::Summarizer => &["Summarizer"],
            AlgorithmKind::SpecSelection => &["SpecSelection"],
            AlgorithmKind::ErrorModel => &["ErrorModel"],
            AlgorithmKind::Reducer => &["Reducer"],
            AlgorithmKind::Subsampler => &["Subsampler"],
        }
    }

    /// Role keys a holder of this kind must bind.
    pub fn roles(&self) -> &'static [&'static str] {
        match self {
            AlgorithmKind::PZAlgorithm => &["Estimate", "Inform"],
            AlgorithmKind::Classifier => &["Classify"],
            AlgorithmKind::Summarizer => &["Summarize"],
            AlgorithmKind::SpecSelection => &["Select"],
            AlgorithmKind::ErrorModel => &["ErrorModel"],
            AlgorithmKind::Reducer => &["Reduce"],
            AlgorithmKind::Subsampler => &["Subsample"],
        }
    }

    fn schema(&self) -> &'static [Param] {
        match self {
            AlgorithmKind::PZAlgorithm => PZ_SCHEMA,
            AlgorithmKind::Classifier => CLASSIFIER_SCHEMA,
            AlgorithmKind::Summarizer => SUMMARIZER_SCHEMA,
            AlgorithmKind::SpecSelection => SPEC_SELECTION_SCHEMA,
            AlgorithmKind::ErrorModel => ERROR_MODEL_SCHEMA,
            AlgorithmKind::Reducer => REDUCER_SCHEMA,
            AlgorithmKind::Subsampler => SUBSAMPLER_SCHEMA,
        }
    }

    /// Pipeline keyword that takes a dictionary of this kind's algorithms.
    pub fn pipeline_kwarg(&self) -> Option<&'static str> {
        match self {
            AlgorithmKind::PZAlgorithm => Some("algorithms"),
            AlgorithmKind::Classifier => Some("classifiers"),
            AlgorithmKind::Summarizer => Some("summarizers"),
            AlgorithmKind::SpecSelection => Some("selectors"),
            AlgorithmKind::ErrorModel => Some("error_models"),
            AlgorithmKind::Reducer | AlgorithmKind::Subsampler => None,
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn from_category(category: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.category() == category)
    }

    pub fn from_pipeline_kwarg(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.pipeline_kwarg() == Some(key))
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A resolved (module, class) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmRef {
    pub module: String,
    pub class_name: String,
}

impl AlgorithmRef {
    /// `module.Class`
    pub fn qualified(&self) -> String {
        if self.module.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.module, self.class_name)
        }
    }
}

impl fmt::Display for AlgorithmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// Binding of an algorithm's roles to implementation classes.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmHolder {
    kind: AlgorithmKind,
    name: String,
    module: String,
    roles: IndexMap<String, String>,
}

impl AlgorithmHolder {
    /// Validate a raw block against the schema of `kind`.
    pub fn from_dict(kind: AlgorithmKind, raw: &Value) -> Result<Self> {
        let validated = validate_options(kind.tag(), kind.schema(), ValidationMode::Strict, raw)?;
        let text = |key: &str| {
            validated
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            kind,
            name: text("name"),
            module: text("Module"),
            roles: kind
                .roles()
                .iter()
                .map(|role| (role.to_string(), text(role)))
                .collect(),
        })
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Resolve one role of the algorithm.
    ///
    /// # Errors
    ///
    /// * `AppError::AlgorithmNotFound` if the holder does not bind `role`
    pub fn role(&self, role: &str) -> Result<AlgorithmRef> {
        let class_name = self.roles.get(role).ok_or_else(|| {
            AppError::AlgorithmNotFound(format!(
                "{} '{}' has no role '{}', known roles are {:?}",
                self.kind,
                self.name,
                role,
                self.roles.keys().collect::<Vec<_>>()
            ))
        })?;
        Ok(AlgorithmRef {
            module: self.module.clone(),
            class_name: class_name.clone(),
        })
    }

    /// Options without the name, as pipelines expect them.
    fn options(&self) -> Map<String, Value> {
        let mut options = Map::new();
        options.insert("Module".to_string(), Value::String(self.module.clone()));
        for (role, class_name) in &self.roles {
            options.insert(role.clone(), Value::String(class_name.clone()));
        }
        options
    }

    /// Add `name: {Module, <roles>}` to a pipeline algorithm dictionary.
    pub fn fill_dict(&self, dict: &mut Map<String, Value>) {
        dict.insert(self.name.clone(), Value::Object(self.options()));
    }
}

impl RegistryEntry for AlgorithmHolder {
    fn from_tagged(tag: &str, raw: &Value) -> Result<Self> {
        let kind = AlgorithmKind::from_tag(tag)
            .ok_or_else(|| AppError::ConfigError(format!("Unknown algorithm tag '{}'", tag)))?;
        Self::from_dict(kind, raw)
    }

    fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn to_dict(&self) -> Result<Value> {
        let mut dict = Map::new();
        dict.insert("name".to_string(), Value::String(self.name.clone()));
        dict.extend(self.options());
        Ok(Value::Object(dict))
    }
}

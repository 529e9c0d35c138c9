//! Projects
//!
//! A project selects components from a [`Library`], defines the common
//! paths and path templates they resolve against, and layers analysis
//! flavors on top of a baseline configuration.
//!
//! ```yaml
//! Includes:
//!   - library.yaml
//! Project:
//!   Name: ci_test
//!   CommonPaths:
//!     root: tests/temp_data
//!     scratch_root: "{root}"
//!     project: ci_test
//!   IterationVars:
//!     healpix: [3433, 3344]
//!   Baseline:
//!     catalog_tag: roman_rubin
//!     pipelines: ['all']
//!     file_aliases:
//!       test: test_file_100k
//!       train: train_file_100k
//!   Flavors:
//!     - Flavor:
//!         name: train_cosmos
//!         pipelines: ['pz']
//! ```

pub mod build;
pub mod data;
pub mod run;

pub use build::{BuildReport, PipelineBuildPlan};
pub use data::{ReduceFailure, ReduceReport, ReduceRequest, SubsampleRequest};
pub use run::ExecutionUnit;

use crate::algorithms::AlgorithmTable;
use crate::components::{
    AlgorithmHolder, AlgorithmKind, CatalogEntry, FileEntry, Flavor, PipelineTemplate, Selection,
    Subsample,
};
use crate::configurable::{Configurable, Param, ParamDefault, ParamType};
use crate::engine::{CeciEngine, CommandRequest, PipelineEngine};
use crate::error::AppError;
use crate::library::{Library, PROJECT_KEY, read_yaml};
use crate::registry::{Registry, RegistryEntry, closest_names};
use crate::template::{self, Bindings};
use crate::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Path templates every project starts from.
pub const DEFAULT_PATH_TEMPLATES: &[(&str, &str)] = &[
    ("pipeline_path", "{pipelines_dir}/{pipeline}_{flavor}.yaml"),
    ("ceci_output_dir", "{project_dir}/data/{selection}_{flavor}"),
    ("ceci_file_path", "{tag}_{stage}.{suffix}"),
];

/// Common paths every project starts from.
pub const DEFAULT_COMMON_PATHS: &[(&str, &str)] = &[
    ("root", "."),
    ("scratch_root", "."),
    ("catalogs_dir", "{root}/catalogs"),
    ("project", ""),
    ("project_dir", "{root}/projects/{project}"),
    ("project_scratch_dir", "{scratch_root}/projects/{project}"),
    ("pipelines_dir", "{project_dir}/pipelines"),
];

/// Name of the flavor every project has.
pub const BASELINE: &str = "baseline";

/// Selection-list entry meaning every registered component.
pub const ALL: &str = "all";

const PROJECT_SCHEMA: &[Param] = &[
    Param::required("Name", ParamType::Str, "Project name"),
    Param::optional("PathTemplates", ParamType::Dict, ParamDefault::EmptyDict, "File path templates"),
    Param::optional("CommonPaths", ParamType::Dict, ParamDefault::EmptyDict, "Paths to shared directories"),
    Param::optional("IterationVars", ParamType::Dict, ParamDefault::EmptyDict, "Iteration variables to use"),
    Param::optional("Catalogs", ParamType::List, ParamDefault::StrList(&[ALL]), "Catalog templates to use"),
    Param::optional("Files", ParamType::List, ParamDefault::StrList(&[ALL]), "File templates to use"),
    Param::optional("Pipelines", ParamType::List, ParamDefault::StrList(&[ALL]), "Pipeline templates to use"),
    Param::optional("Reducers", ParamType::List, ParamDefault::StrList(&[ALL]), "Data reducers to use"),
    Param::optional("Subsamplers", ParamType::List, ParamDefault::StrList(&[ALL]), "Data subsamplers to use"),
    Param::optional("Selections", ParamType::List, ParamDefault::StrList(&[ALL]), "Data selections to use"),
    Param::optional("Subsamples", ParamType::List, ParamDefault::StrList(&[ALL]), "Data subsamples to use"),
    Param::optional("PZAlgorithms", ParamType::List, ParamDefault::StrList(&[ALL]), "p(z) algorithms to use"),
    Param::optional("SpecSelections", ParamType::List, ParamDefault::StrList(&[ALL]), "Spectroscopic selections to use"),
    Param::optional("Classifiers", ParamType::List, ParamDefault::StrList(&[ALL]), "Tomographic classifiers to use"),
    Param::optional("Summarizers", ParamType::List, ParamDefault::StrList(&[ALL]), "n(z) summarizers to use"),
    Param::optional("ErrorModels", ParamType::List, ParamDefault::StrList(&[ALL]), "Photometric ErrorModels to use"),
    Param::required("Baseline", ParamType::Dict, "Baseline analysis configuration"),
    Param::optional("Flavors", ParamType::List, ParamDefault::EmptyList, "Analysis variants"),
];

/// The `Project` block of a project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectConfig {
    pub name: String,
    pub path_templates: Map<String, Value>,
    pub common_paths: Map<String, Value>,
    pub iteration_vars: Map<String, Value>,
    pub catalogs: Vec<String>,
    pub files: Vec<String>,
    pub pipelines: Vec<String>,
    pub reducers: Vec<String>,
    pub subsamplers: Vec<String>,
    pub selections: Vec<String>,
    pub subsamples: Vec<String>,
    #[serde(rename = "PZAlgorithms")]
    pub pz_algorithms: Vec<String>,
    pub spec_selections: Vec<String>,
    pub classifiers: Vec<String>,
    pub summarizers: Vec<String>,
    pub error_models: Vec<String>,
    pub baseline: Map<String, Value>,
    pub flavors: Vec<Value>,
}

impl Configurable for ProjectConfig {
    const TAG: &'static str = "Project";

    fn schema() -> &'static [Param] {
        PROJECT_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<()> {
        let mut violations = Vec::new();

        let mut seen = HashSet::new();
        for item in &self.flavors {
            match flavor_block(item) {
                Ok((name, _)) if name == BASELINE || !seen.insert(name.clone()) => {
                    violations.push(format!("Flavors: '{}' is defined more than once", name));
                }
                Ok(_) => {}
                Err(reason) => violations.push(format!("Flavors: {}", reason)),
            }
        }

        for (name, values) in &self.iteration_vars {
            if !values.is_array() {
                violations.push(format!("IterationVars.{}: expected a list of values", name));
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

impl ProjectConfig {
    /// Selection list of an algorithm category.
    pub fn algorithm_selection(&self, kind: AlgorithmKind) -> &[String] {
        match kind {
            AlgorithmKind::PZAlgorithm => &self.pz_algorithms,
            AlgorithmKind::Classifier => &self.classifiers,
            AlgorithmKind::Summarizer => &self.summarizers,
            AlgorithmKind::SpecSelection => &self.spec_selections,
            AlgorithmKind::ErrorModel => &self.error_models,
            AlgorithmKind::Reducer => &self.reducers,
            AlgorithmKind::Subsampler => &self.subsamplers,
        }
    }
}

/// Split a `{Flavor: {name: ..., ...}}` block into its name and options.
fn flavor_block(item: &Value) -> std::result::Result<(String, Value), String> {
    let options = item
        .as_object()
        .filter(|block| block.len() == 1)
        .and_then(|block| block.get(Flavor::TAG))
        .ok_or_else(|| "each entry must be a single 'Flavor' block".to_string())?;
    let name = options
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "a Flavor block has no name".to_string())?;
    Ok((name.to_string(), options.clone()))
}

fn defaults(table: &[(&str, &str)]) -> Bindings {
    table
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect()
}

/// A loaded project bound to its library and execution collaborators.
pub struct Project {
    config: ProjectConfig,
    library: Arc<Library>,
    engine: Box<dyn PipelineEngine>,
    algorithms: AlgorithmTable,
    path_templates: Bindings,
    common_paths: Bindings,
    resolved_common_paths: Bindings,
    flavors: IndexMap<String, Value>,
}

impl Project {
    /// Load a project document.
    ///
    /// Top-level `Includes` and component categories are loaded into a new
    /// library before the `Project` block is validated.
    pub fn load_config<P: AsRef<Path>>(config_file: P) -> Result<Self> {
        let expanded = template::expand_env(&config_file.as_ref().to_string_lossy());
        let path = Path::new(&expanded);
        info!("Loading project from {:?}", path);
        let doc = read_yaml(path)?;
        Self::from_document(&doc, Some(path))
    }

    /// Build a project from an in-memory document.
    pub fn from_document(doc: &Value, origin: Option<&Path>) -> Result<Self> {
        let block = doc.get(PROJECT_KEY).ok_or_else(|| {
            AppError::ConfigError(match origin {
                Some(path) => format!("Project file {:?} has no Project block", path),
                None => "Project document has no Project block".to_string(),
            })
        })?;

        let mut library = Library::new();
        library.load_value(doc, origin)?;
        let config = ProjectConfig::from_dict(block)?;
        Self::new(config, Arc::new(library))
    }

    /// Bind a validated project configuration to a library.
    pub fn new(config: ProjectConfig, library: Arc<Library>) -> Result<Self> {
        let mut path_templates = defaults(DEFAULT_PATH_TEMPLATES);
        path_templates.extend(config.path_templates.clone());

        let mut common_paths = defaults(DEFAULT_COMMON_PATHS);
        common_paths.extend(config.common_paths.clone());
        let resolved_common_paths = template::resolve_bindings(&common_paths)?;

        let mut flavors = IndexMap::new();
        for item in &config.flavors {
            let (name, options) = flavor_block(item).map_err(AppError::ConfigError)?;
            Flavor::derive(&name, &Value::Object(config.baseline.clone()), &options)?;
            flavors.insert(name, options);
        }

        Ok(Self {
            config,
            library,
            engine: Box::new(CeciEngine),
            algorithms: AlgorithmTable::new(),
            path_templates,
            common_paths,
            resolved_common_paths,
            flavors,
        })
    }

    /// Replace the pipeline engine.
    pub fn with_engine(mut self, engine: Box<dyn PipelineEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Replace the table of algorithm implementations.
    pub fn with_algorithms(mut self, algorithms: AlgorithmTable) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn algorithms_mut(&mut self) -> &mut AlgorithmTable {
        &mut self.algorithms
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn shared_library(&self) -> Arc<Library> {
        Arc::clone(&self.library)
    }

    pub fn iteration_vars(&self) -> &Bindings {
        &self.config.iteration_vars
    }

    /// Common paths overlaid with caller bindings; the caller wins.
    fn interpolants(&self, bindings: &Bindings) -> Bindings {
        let mut merged = self.common_paths.clone();
        merged.extend(bindings.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn get_path_templates(&self) -> &Bindings {
        &self.path_templates
    }

    /// Resolve a named path template.
    ///
    /// # Errors
    ///
    /// * `AppError::UnknownComponent` if no such template is defined
    /// * `AppError::MissingInterpolant` if a placeholder stays unbound
    pub fn get_path(&self, path_key: &str, bindings: &Bindings) -> Result<String> {
        let path_template = self
            .path_templates
            .get(path_key)
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::UnknownComponent {
                category: "PathTemplate".to_string(),
                name: path_key.to_string(),
                suggestions: closest_names(path_key, self.path_templates.keys()),
            })?;
        template::resolve(path_template, &self.interpolants(bindings))
    }

    /// Every common path, fully resolved.
    pub fn get_common_paths(&self) -> &Bindings {
        &self.resolved_common_paths
    }

    pub fn get_common_path(&self, path_key: &str, bindings: &Bindings) -> Result<String> {
        let value = self.common_paths.get(path_key).ok_or_else(|| AppError::UnknownComponent {
            category: "CommonPath".to_string(),
            name: path_key.to_string(),
            suggestions: closest_names(path_key, self.common_paths.keys()),
        })?;
        match value {
            Value::String(path) => template::resolve(path, &self.interpolants(bindings)),
            other => Ok(other.to_string()),
        }
    }

    pub fn get_files(&self) -> Result<Vec<&FileEntry>> {
        selected(self.library.files(), &self.config.files)
    }

    /// Resolve the path of a file.
    pub fn get_file(&self, name: &str, bindings: &Bindings) -> Result<String> {
        check_selected("Files", &self.config.files, name)?;
        match self.library.files().get(name)? {
            FileEntry::Template(file) => file.resolve(&self.interpolants(bindings)),
            FileEntry::Instance(file) => Ok(file.path.clone()),
        }
    }

    /// Resolve the file a flavor aliases to `label`, e.g. its training file.
    ///
    /// The flavor and label are bound as `{flavor}` and `{label}`.
    pub fn get_file_for_flavor(&self, flavor: &str, label: &str, bindings: &Bindings) -> Result<String> {
        let resolved = self.get_flavor(flavor)?;
        let alias = resolved.file_alias(label)?;
        let mut bindings = bindings.clone();
        bindings.insert("flavor".to_string(), Value::String(flavor.to_string()));
        bindings.insert("label".to_string(), Value::String(label.to_string()));
        self.get_file(alias, &bindings)
    }

    /// Definition of the file a flavor aliases to `label`.
    pub fn get_file_metadata_for_flavor(&self, flavor: &str, label: &str) -> Result<&FileEntry> {
        let resolved = self.get_flavor(flavor)?;
        let alias = resolved.file_alias(label)?;
        check_selected("Files", &self.config.files, alias)?;
        self.library.files().get(alias)
    }

    pub fn get_catalogs(&self) -> Result<Vec<&CatalogEntry>> {
        selected(self.library.catalogs(), &self.config.catalogs)
    }

    fn catalog_entry(&self, name: &str) -> Result<&CatalogEntry> {
        check_selected("Catalogs", &self.config.catalogs, name)?;
        self.library.catalogs().get(name)
    }

    /// Resolve a catalog path template; iteration variables must be bound too.
    pub fn get_catalog(&self, name: &str, bindings: &Bindings) -> Result<String> {
        let path_template = match self.catalog_entry(name)? {
            CatalogEntry::Template(catalog) => &catalog.path_template,
            CatalogEntry::Instance(catalog) => &catalog.path_template,
        };
        template::resolve(path_template, &self.interpolants(bindings))
    }

    /// Every file of a catalog, expanded over the project's iteration variables.
    pub fn get_catalog_files(&self, name: &str, bindings: &Bindings) -> Result<Vec<String>> {
        let instance = self
            .catalog_entry(name)?
            .instantiate(&self.interpolants(bindings))?;
        instance.resolve(&self.config.iteration_vars)
    }

    /// Every flavor, baseline first.
    pub fn get_flavors(&self) -> Result<IndexMap<String, Flavor>> {
        self.flavor_names()
            .into_iter()
            .map(|name| {
                let flavor = self.get_flavor(&name)?;
                Ok((name, flavor))
            })
            .collect()
    }

    pub fn flavor_names(&self) -> Vec<String> {
        std::iter::once(BASELINE.to_string())
            .chain(self.flavors.keys().cloned())
            .collect()
    }

    /// Resolve a flavor: the baseline with the flavor's overrides merged on top.
    ///
    /// # Errors
    ///
    /// * `AppError::UnknownFlavor` if the flavor is not defined
    pub fn get_flavor(&self, name: &str) -> Result<Flavor> {
        let baseline = Value::Object(self.config.baseline.clone());
        if name == BASELINE {
            return Flavor::derive(BASELINE, &baseline, &Value::Null);
        }
        let overrides = self.flavors.get(name).ok_or_else(|| AppError::UnknownFlavor {
            name: name.to_string(),
            known: self.flavor_names(),
        })?;
        Flavor::derive(name, &baseline, overrides)
    }

    /// Add a flavor for this session; the project document is not changed.
    ///
    /// # Errors
    ///
    /// * `AppError::DuplicateFlavor` if the name is taken
    /// * `AppError::InvalidConfiguration` if the merged flavor is invalid
    pub fn add_flavor(&mut self, name: &str, overrides: &Value) -> Result<Flavor> {
        if name == BASELINE || self.flavors.contains_key(name) {
            return Err(AppError::DuplicateFlavor(name.to_string()));
        }
        let flavor = Flavor::derive(name, &Value::Object(self.config.baseline.clone()), overrides)?;
        self.flavors.insert(name.to_string(), overrides.clone());
        info!("Added flavor '{}' to project '{}'", name, self.config.name);
        Ok(flavor)
    }

    pub fn get_selections(&self) -> Result<Vec<&Selection>> {
        selected(self.library.selections(), &self.config.selections)
    }

    pub fn get_selection(&self, name: &str) -> Result<&Selection> {
        check_selected("Selections", &self.config.selections, name)?;
        self.library.selection(name)
    }

    pub fn get_subsamples(&self) -> Result<Vec<&Subsample>> {
        selected(self.library.subsamples(), &self.config.subsamples)
    }

    pub fn get_subsample(&self, name: &str) -> Result<&Subsample> {
        check_selected("Subsamples", &self.config.subsamples, name)?;
        self.library.subsample(name)
    }

    pub fn get_algorithm_holder(&self, kind: AlgorithmKind, name: &str) -> Result<&AlgorithmHolder> {
        check_selected(kind.category(), self.config.algorithm_selection(kind), name)?;
        self.library.algorithm(kind, name)
    }

    /// Pipeline dictionary of every selected algorithm of one kind:
    /// `{name: {Module, <roles>}}`.
    pub fn get_algorithms(&self, kind: AlgorithmKind) -> Result<Map<String, Value>> {
        let mut dict = Map::new();
        for holder in selected(self.library.algorithms(kind), self.config.algorithm_selection(kind))? {
            holder.fill_dict(&mut dict);
        }
        Ok(dict)
    }

    /// Pipeline options of one algorithm: `{Module, <roles>}`.
    pub fn get_algorithm(&self, kind: AlgorithmKind, name: &str) -> Result<Value> {
        let mut dict = Map::new();
        self.get_algorithm_holder(kind, name)?.fill_dict(&mut dict);
        Ok(dict.remove(name).unwrap_or(Value::Null))
    }

    /// Selected pipeline templates.
    pub fn get_pipelines(&self) -> Result<Vec<&PipelineTemplate>> {
        Ok(selected(self.library.pipelines(), &self.config.pipelines)?
            .into_iter()
            .filter_map(|entry| entry.as_template())
            .collect())
    }

    pub fn get_pipeline(&self, name: &str) -> Result<&PipelineTemplate> {
        check_selected("Pipelines", &self.config.pipelines, name)?;
        self.library.pipeline_template(name)
    }

    /// Flavors to iterate a command over; `all` expands to every flavor.
    pub fn get_flavor_args(&self, flavors: &[String]) -> Vec<String> {
        if flavors.iter().any(|f| f == ALL) {
            self.flavor_names()
        } else {
            flavors.to_vec()
        }
    }

    /// Selections to iterate a command over; `all` expands to every selection.
    pub fn get_selection_args(&self, selections: &[String]) -> Result<Vec<String>> {
        if selections.iter().any(|s| s == ALL) {
            Ok(self
                .get_selections()?
                .into_iter()
                .map(|selection| selection.name.clone())
                .collect())
        } else {
            Ok(selections.to_vec())
        }
    }

    /// Cartesian product of argument lists, first key outermost.
    pub fn generate_kwargs_iterable(&self, dimensions: &Bindings) -> Result<Vec<Bindings>> {
        template::iteration_combinations(dimensions)
    }

    /// Command line running a pipeline through the engine.
    pub fn generate_command(&self, request: &CommandRequest) -> Vec<String> {
        self.engine.command(request)
    }

    /// Readable report of the library and the project configuration.
    pub fn inspect(&self) -> Result<String> {
        let mut out = String::new();
        out.push_str("Library\n>>>>>>>>\n");
        out.push_str(&self.library.summary());
        out.push_str("<<<<<<<<\n");
        out.push_str(&format!("Project: {}\n>>>>>>>>\n", self.config.name));

        let Value::Object(config) = self.config.to_dict()? else {
            return Ok(out);
        };
        for (key, value) in &config {
            if key == "Flavors" {
                out.push_str("Flavors:\n");
                for name in self.flavors.keys() {
                    out.push_str(&format!("- {}\n", name));
                }
                continue;
            }
            let mut entry = Map::new();
            entry.insert(key.clone(), value.clone());
            let text = serde_yaml::to_string(&Value::Object(entry))
                .map_err(|e| AppError::ConfigError(format!("Failed to render {}: {}", key, e)))?;
            out.push_str(&text);
        }
        out.push_str("<<<<<<<<\n");
        Ok(out)
    }
}

/// Entries named by a selection list, in list order; `all` selects everything.
fn selected<'a, E: RegistryEntry>(registry: &'a Registry<E>, selection: &[String]) -> Result<Vec<&'a E>> {
    if selection.iter().any(|name| name == ALL) {
        return Ok(registry.iter().collect());
    }
    selection.iter().map(|name| registry.get(name)).collect()
}

fn check_selected(category: &str, selection: &[String], name: &str) -> Result<()> {
    if selection.iter().any(|s| s == ALL || s == name) {
        return Ok(());
    }
    Err(AppError::UnknownComponent {
        category: category.to_string(),
        name: name.to_string(),
        suggestions: closest_names(name, selection),
    })
}

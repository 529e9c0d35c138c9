//! Library of named components
//!
//! The [`Library`] is the context object holding one [`Registry`] per
//! configuration category. Documents are loaded into it cumulatively;
//! `Includes` are followed depth-first before the including document's own
//! categories are added.
//!
//! ```yaml
//! Includes:
//!   - ${RAILYARD_CONFIG_DIR}/catalogs.yaml
//! Selections:
//!   - Selection:
//!       name: gold
//!       cuts:
//!         maglim_i: [null, 25.5]
//! ```

use crate::components::{
    AlgorithmHolder, AlgorithmKind, AlgorithmRef, CatalogEntry, CatalogTemplate, FileEntry,
    FileInstance, FileTemplate, PipelineEntry, PipelineInstance, PipelineTemplate, Selection,
    Subsample,
};
use crate::error::AppError;
use crate::plotting::{
    DataEntry, Dataset, DatasetList, PlotGroup, Plotter, PlotterList, PlotsEntry, ProjectRef,
};
use crate::registry::{Registry, closest_names};
use crate::template;
use crate::Result;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Top-level key listing documents to load first.
pub const INCLUDES_KEY: &str = "Includes";

/// Top-level key of a project block, ignored by the library.
pub const PROJECT_KEY: &str = "Project";

/// Read a YAML document into a JSON value tree. Empty documents are `null`.
pub fn read_yaml(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(format!("Failed to read config file at {:?}: {}", path, e))
    })?;
    let value: Value = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::ConfigError(format!("Failed to parse config YAML at {:?}: {}", path, e))
    })?;
    Ok(value)
}

/// Documents being loaded (for cycle detection) and already loaded.
#[derive(Debug, Default)]
struct IncludeState {
    stack: Vec<PathBuf>,
    done: HashSet<PathBuf>,
}

/// Every component registry, one per category.
#[derive(Debug, Clone)]
pub struct Library {
    files: Registry<FileEntry>,
    catalogs: Registry<CatalogEntry>,
    pipelines: Registry<PipelineEntry>,
    selections: Registry<Selection>,
    subsamples: Registry<Subsample>,
    algorithms: [Registry<AlgorithmHolder>; 7],
    plots: Registry<PlotsEntry>,
    data: Registry<DataEntry>,
    plot_groups: Registry<PlotGroup>,
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

impl Library {
    pub fn new() -> Self {
        Self {
            files: Registry::new("Files", FileEntry::TAGS),
            catalogs: Registry::new("Catalogs", CatalogEntry::TAGS),
            pipelines: Registry::new("Pipelines", PipelineEntry::TAGS),
            selections: Registry::new("Selections", &["Selection"]),
            subsamples: Registry::new("Subsamples", &["Subsample"]),
            algorithms: AlgorithmKind::ALL.map(|kind| Registry::new(kind.category(), kind.tags())),
            plots: Registry::new("Plots", PlotsEntry::TAGS),
            data: Registry::new("Data", DataEntry::TAGS),
            plot_groups: Registry::new("PlotGroups", &["PlotGroup"]),
        }
    }

    /// Every category key a document may use, in serialization order.
    pub fn categories() -> Vec<&'static str> {
        let mut categories = vec!["Files", "Catalogs", "Pipelines", "Selections", "Subsamples"];
        categories.extend(AlgorithmKind::ALL.iter().map(|kind| kind.category()));
        categories.extend(["Plots", "Data", "PlotGroups"]);
        categories
    }

    /// Load a configuration document and everything it includes.
    ///
    /// # Arguments
    ///
    /// * `path` - Document path; `$VAR` references are expanded
    ///
    /// # Errors
    ///
    /// * `AppError::ConfigError` if a document cannot be read, an include
    ///   cannot be found, includes form a cycle or a category is unknown
    /// * Any validation or registration error of the loaded components
    pub fn load_yaml<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = canonical_path(&template::expand_env(&path.as_ref().to_string_lossy()))?;
        self.transaction(|library| {
            let mut state = IncludeState::default();
            library.load_file(&path, &mut state)?;
            library.check_references()
        })
    }

    /// Load an in-memory document.
    ///
    /// Relative `Includes` are resolved against the current directory, then
    /// against `origin`'s directory when given.
    pub fn load_value(&mut self, doc: &Value, origin: Option<&Path>) -> Result<()> {
        self.transaction(|library| {
            let mut state = IncludeState::default();
            if let Some(origin) = origin.and_then(|o| o.canonicalize().ok()) {
                state.stack.push(origin);
            }
            let base_dir = origin.and_then(Path::parent).map(Path::to_path_buf);
            library.load_document(doc, base_dir.as_deref(), &mut state)?;
            library.check_references()
        })
    }

    /// Run `load`, restoring every registry if it fails.
    fn transaction<F>(&mut self, load: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let snapshot = self.clone();
        let result = load(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    fn load_file(&mut self, path: &Path, state: &mut IncludeState) -> Result<()> {
        if state.stack.iter().any(|p| p == path) {
            let chain: Vec<String> = state
                .stack
                .iter()
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect();
            return Err(AppError::ConfigError(format!(
                "Include cycle: {}",
                chain.join(" -> ")
            )));
        }
        if state.done.contains(path) {
            debug!("Skipping already loaded {:?}", path);
            return Ok(());
        }

        info!("Loading library definitions from {:?}", path);
        let doc = read_yaml(path)?;

        state.stack.push(path.to_path_buf());
        let result = self.load_document(&doc, path.parent(), state);
        state.stack.pop();
        result?;

        state.done.insert(path.to_path_buf());
        Ok(())
    }

    fn load_document(
        &mut self,
        doc: &Value,
        base_dir: Option<&Path>,
        state: &mut IncludeState,
    ) -> Result<()> {
        let map = match doc {
            Value::Null => return Ok(()),
            Value::Object(map) => map,
            _ => {
                return Err(AppError::ConfigError(
                    "A configuration document must be a mapping of categories".to_string(),
                ));
            }
        };

        if let Some(includes) = map.get(INCLUDES_KEY) {
            for include in include_list(includes)? {
                let path = resolve_include(&include, base_dir)?;
                self.load_file(&path, state)?;
            }
        }

        for (key, items) in map {
            if key == INCLUDES_KEY || key == PROJECT_KEY {
                continue;
            }
            self.load_category(key, items)?;
        }
        Ok(())
    }

    /// Load the blocks of one category.
    pub fn load_category(&mut self, category: &str, items: &Value) -> Result<usize> {
        if let Some(kind) = AlgorithmKind::from_category(category) {
            return self.algorithms[kind.index()].load(items);
        }
        match category {
            "Files" => self.files.load(items),
            "Catalogs" => self.catalogs.load(items),
            "Pipelines" => self.pipelines.load(items),
            "Selections" => self.selections.load(items),
            "Subsamples" => self.subsamples.load(items),
            "Plots" => self.plots.load(items),
            "Data" => self.data.load(items),
            "PlotGroups" => self.plot_groups.load(items),
            other => {
                let suggestions = closest_names(other, Self::categories());
                let hint = if suggestions.is_empty() {
                    String::new()
                } else {
                    format!(", did you mean: {}?", suggestions.join(", "))
                };
                Err(AppError::ConfigError(format!(
                    "Unknown category '{}'{}",
                    other, hint
                )))
            }
        }
    }

    /// Check that lists and groups only name registered components.
    pub fn check_references(&self) -> Result<()> {
        for list in self.plots.iter_as(PlotsEntry::as_plotter_list) {
            for plotter in &list.plotters {
                self.plotter(plotter)?;
            }
        }
        for list in self.data.iter_as(DataEntry::as_dataset_list) {
            for dataset in &list.datasets {
                self.dataset(dataset)?;
            }
        }
        for group in self.plot_groups.iter() {
            self.plotter_list(&group.plotter_list_name)?;
            self.dataset_list(&group.dataset_list_name)?;
        }
        Ok(())
    }

    /// Clear every registry.
    pub fn reset(&mut self) {
        self.files.reset();
        self.catalogs.reset();
        self.pipelines.reset();
        self.selections.reset();
        self.subsamples.reset();
        for registry in &mut self.algorithms {
            registry.reset();
        }
        self.plots.reset();
        self.data.reset();
        self.plot_groups.reset();
    }

    /// Serialize every non-empty registry back into one document.
    pub fn to_dict(&self) -> Result<Value> {
        let mut doc = Map::new();
        let mut add = |category: &str, items: Value, empty: bool| {
            if !empty {
                doc.insert(category.to_string(), items);
            }
        };

        add("Files", self.files.to_dict()?, self.files.is_empty());
        add("Catalogs", self.catalogs.to_dict()?, self.catalogs.is_empty());
        add("Pipelines", self.pipelines.to_dict()?, self.pipelines.is_empty());
        add("Selections", self.selections.to_dict()?, self.selections.is_empty());
        add("Subsamples", self.subsamples.to_dict()?, self.subsamples.is_empty());
        for registry in &self.algorithms {
            add(registry.category(), registry.to_dict()?, registry.is_empty());
        }
        add("Plots", self.plots.to_dict()?, self.plots.is_empty());
        add("Data", self.data.to_dict()?, self.data.is_empty());
        add("PlotGroups", self.plot_groups.to_dict()?, self.plot_groups.is_empty());

        Ok(Value::Object(doc))
    }

    /// Listing of every registry's contents.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.files.summary());
        out.push_str(&self.catalogs.summary());
        out.push_str(&self.pipelines.summary());
        out.push_str(&self.selections.summary());
        out.push_str(&self.subsamples.summary());
        for registry in &self.algorithms {
            out.push_str(&registry.summary());
        }
        out.push_str(&self.plots.summary());
        out.push_str(&self.data.summary());
        out.push_str(&self.plot_groups.summary());
        out
    }

    pub fn files(&self) -> &Registry<FileEntry> {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut Registry<FileEntry> {
        &mut self.files
    }

    pub fn catalogs(&self) -> &Registry<CatalogEntry> {
        &self.catalogs
    }

    pub fn catalogs_mut(&mut self) -> &mut Registry<CatalogEntry> {
        &mut self.catalogs
    }

    pub fn pipelines(&self) -> &Registry<PipelineEntry> {
        &self.pipelines
    }

    pub fn pipelines_mut(&mut self) -> &mut Registry<PipelineEntry> {
        &mut self.pipelines
    }

    pub fn selections(&self) -> &Registry<Selection> {
        &self.selections
    }

    pub fn selections_mut(&mut self) -> &mut Registry<Selection> {
        &mut self.selections
    }

    pub fn subsamples(&self) -> &Registry<Subsample> {
        &self.subsamples
    }

    pub fn subsamples_mut(&mut self) -> &mut Registry<Subsample> {
        &mut self.subsamples
    }

    pub fn algorithms(&self, kind: AlgorithmKind) -> &Registry<AlgorithmHolder> {
        &self.algorithms[kind.index()]
    }

    pub fn algorithms_mut(&mut self, kind: AlgorithmKind) -> &mut Registry<AlgorithmHolder> {
        &mut self.algorithms[kind.index()]
    }

    pub fn plots(&self) -> &Registry<PlotsEntry> {
        &self.plots
    }

    pub fn data(&self) -> &Registry<DataEntry> {
        &self.data
    }

    pub fn plot_groups(&self) -> &Registry<PlotGroup> {
        &self.plot_groups
    }

    pub fn plot_groups_mut(&mut self) -> &mut Registry<PlotGroup> {
        &mut self.plot_groups
    }

    pub fn file_template(&self, name: &str) -> Result<&FileTemplate> {
        self.files.get_as("FileTemplate", name, FileEntry::as_template)
    }

    pub fn file_instance(&self, name: &str) -> Result<&FileInstance> {
        self.files.get_as("FileInstance", name, FileEntry::as_instance)
    }

    pub fn catalog_template(&self, name: &str) -> Result<&CatalogTemplate> {
        self.catalogs.get_as("CatalogTemplate", name, CatalogEntry::as_template)
    }

    pub fn pipeline_template(&self, name: &str) -> Result<&PipelineTemplate> {
        self.pipelines.get_as("PipelineTemplate", name, PipelineEntry::as_template)
    }

    pub fn pipeline_instance(&self, name: &str) -> Result<&PipelineInstance> {
        self.pipelines.get_as("PipelineInstance", name, PipelineEntry::as_instance)
    }

    pub fn selection(&self, name: &str) -> Result<&Selection> {
        self.selections.get(name)
    }

    pub fn subsample(&self, name: &str) -> Result<&Subsample> {
        self.subsamples.get(name)
    }

    pub fn algorithm(&self, kind: AlgorithmKind, name: &str) -> Result<&AlgorithmHolder> {
        self.algorithms(kind).get(name)
    }

    /// Resolve one role of a registered algorithm, e.g. the `Reduce` class of a reducer.
    pub fn get_algorithm_class(
        &self,
        kind: AlgorithmKind,
        name: &str,
        role: &str,
    ) -> Result<AlgorithmRef> {
        self.algorithm(kind, name)?.role(role)
    }

    pub fn plotter(&self, name: &str) -> Result<&Plotter> {
        self.plots.get_as("Plotter", name, PlotsEntry::as_plotter)
    }

    pub fn plotter_list(&self, name: &str) -> Result<&PlotterList> {
        self.plots.get_as("PlotterList", name, PlotsEntry::as_plotter_list)
    }

    pub fn dataset(&self, name: &str) -> Result<&Dataset> {
        self.data.get_as("Dataset", name, DataEntry::as_dataset)
    }

    pub fn dataset_list(&self, name: &str) -> Result<&DatasetList> {
        self.data.get_as("DatasetList", name, DataEntry::as_dataset_list)
    }

    pub fn project_ref(&self, name: &str) -> Result<&ProjectRef> {
        self.data.get_as("Project", name, DataEntry::as_project)
    }

    pub fn plot_group(&self, name: &str) -> Result<&PlotGroup> {
        self.plot_groups.get(name)
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

fn include_list(includes: &Value) -> Result<Vec<String>> {
    let items = match includes {
        Value::Null => return Ok(Vec::new()),
        Value::String(single) => return Ok(vec![single.clone()]),
        Value::Array(items) => items,
        _ => {
            return Err(AppError::ConfigError(
                "Includes must be a list of file paths".to_string(),
            ));
        }
    };
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                AppError::ConfigError(format!("Include entries must be paths, got {}", item))
            })
        })
        .collect()
}

/// Resolve an include against the current directory, then `base_dir`.
fn resolve_include(include: &str, base_dir: Option<&Path>) -> Result<PathBuf> {
    let expanded = PathBuf::from(template::expand_env(include));
    if expanded.is_absolute() || expanded.exists() {
        return canonical_path(&expanded.to_string_lossy());
    }
    if let Some(candidate) = base_dir.map(|dir| dir.join(&expanded)) {
        if candidate.exists() {
            return canonical_path(&candidate.to_string_lossy());
        }
    }
    Err(AppError::ConfigError(format!(
        "Included file '{}' not found",
        include
    )))
}

fn canonical_path(path: &str) -> Result<PathBuf> {
    Path::new(path).canonicalize().map_err(|e| {
        AppError::ConfigError(format!("Failed to locate config file '{}': {}", path, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_value_dispatches_categories() {
        let mut library = Library::new();
        library
            .load_value(
                &json!({
                    "Selections": [{"Selection": {"name": "gold", "cuts": {"maglim_i": [null, 25.5]}}}],
                    "Reducers": [{"Reducer": {"name": "cuts", "Module": "catalog_tools", "Reduce": "CutReducer"}}],
                }),
                None,
            )
            .unwrap();

        assert_eq!(library.selections().len(), 1);
        let reducer = library
            .get_algorithm_class(AlgorithmKind::Reducer, "cuts", "Reduce")
            .unwrap();
        assert_eq!(reducer.class_name, "CutReducer");
        assert!(library.algorithms(AlgorithmKind::PZAlgorithm).is_empty());
    }

    #[test]
    fn test_unknown_category_suggests() {
        let mut library = Library::new();
        let err = library
            .load_value(&json!({"Catalogz": []}), None)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Unknown category 'Catalogz', did you mean: Catalogs?"
        );
    }

    #[test]
    fn test_includes_load_first_and_relative_to_document() {
        let temp_dir = TempDir::new().unwrap();
        write(
            &temp_dir,
            "base.yaml",
            "Files:\n  - FileTemplate:\n      name: train\n      path_template: \"{catalogs_dir}/train.hdf5\"\n",
        );
        let top = write(
            &temp_dir,
            "top.yaml",
            "Includes:\n  - base.yaml\nFiles:\n  - FileInstance:\n      name: ref\n      path: /data/ref.hdf5\n",
        );

        let mut library = Library::new();
        library.load_yaml(&top).unwrap();
        assert_eq!(library.files().names(), vec!["train", "ref"]);
        assert!(library.file_template("train").is_ok());
        assert!(library.file_template("ref").is_err());
    }

    #[test]
    fn test_diamond_include_loads_once() {
        let temp_dir = TempDir::new().unwrap();
        write(
            &temp_dir,
            "shared.yaml",
            "Selections:\n  - Selection:\n      name: gold\n",
        );
        write(&temp_dir, "left.yaml", "Includes: [shared.yaml]\n");
        write(&temp_dir, "right.yaml", "Includes: [shared.yaml]\n");
        let top = write(&temp_dir, "top.yaml", "Includes: [left.yaml, right.yaml]\n");

        let mut library = Library::new();
        library.load_yaml(&top).unwrap();
        assert_eq!(library.selections().names(), vec!["gold"]);
    }

    #[test]
    fn test_include_cycle_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir, "a.yaml", "Includes: [b.yaml]\n");
        let b = write(&temp_dir, "b.yaml", "Includes: [a.yaml]\n");

        let mut library = Library::new();
        let err = library.load_yaml(&b).unwrap_err();
        match err {
            AppError::ConfigError(message) => assert!(message.starts_with("Include cycle")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_include() {
        let mut library = Library::new();
        let err = library
            .load_value(&json!({"Includes": ["no/such/file.yaml"]}), None)
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_round_trip_and_reset() {
        let doc = json!({
            "Catalogs": [{"CatalogTemplate": {
                "name": "truth",
                "path_template": "{catalogs_dir}/{project}/{healpix}/part-0.parquet",
                "iteration_vars": ["healpix"],
                "interpolants": [],
            }}],
            "Subsamples": [{"Subsample": {"name": "s", "seed": 1, "num_objects": 10}}],
        });

        let mut library = Library::new();
        library.load_value(&doc, None).unwrap();
        let dumped = library.to_dict().unwrap();
        assert_eq!(dumped, doc);

        library.reset();
        assert!(library.catalogs().is_empty());
        library.load_value(&dumped, None).unwrap();
        assert_eq!(library.to_dict().unwrap(), doc);
    }

    #[test]
    fn test_list_members_must_exist() {
        let mut library = Library::new();
        let err = library
            .load_value(
                &json!({"Plots": [{"PlotterList": {"name": "l", "plotters": ["missing"]}}]}),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownComponent { .. }));
    }

    #[test]
    fn test_failed_load_leaves_library_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = write(
            &temp_dir,
            "broken.yaml",
            "Selections:\n  - Selection:\n      name: gold\n      cuts: {}\nCatalogs:\n  - CatalogTemplate:\n      name: truth\n",
        );

        let mut library = Library::new();
        assert!(library.load_yaml(&path).is_err());
        assert!(library.selections().is_empty());
        assert!(library.catalogs().is_empty());
    }

    #[test]
    fn test_project_block_is_skipped() {
        let mut library = Library::new();
        library
            .load_value(&json!({"Project": {"Name": "x"}, "Selections": []}), None)
            .unwrap();
        assert!(library.selections().is_empty());
        assert!(library.summary().contains("Selections: 0 entries"));
    }
}

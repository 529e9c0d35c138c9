//! Running plot groups
//!
//! Rendering belongs to an external backend behind [`PlotRenderer`]; this
//! module only decides which plots to make and where they go.

use super::plot_group::PlotJob;
use crate::library::Library;
use crate::error::AppError;
use crate::Result;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Seam to the plotting backend.
pub trait PlotRenderer {
    /// Render one plot to `job.path`. The parent directory already exists.
    fn render(&mut self, job: &PlotJob) -> Result<()>;
}

/// Outcome of [`run`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlotRunReport {
    /// Plots handed to the renderer
    pub rendered: Vec<PathBuf>,
    /// With `find_only`, plots already on disk
    pub found: Vec<PathBuf>,
    /// With `find_only`, plots not yet made
    pub missing: Vec<PathBuf>,
}

/// Make the plots of the selected groups.
///
/// # Arguments
///
/// * `include` - Groups to run, every registered group when empty
/// * `exclude` - Groups to skip
/// * `outdir` - Directory prepended to every group's output directory
/// * `find_only` - Only report which plot files exist
///
/// # Errors
///
/// * `AppError::UnknownComponent` if an included group is not registered
/// * Any error raised by the renderer
pub fn run(
    library: &Library,
    renderer: &mut dyn PlotRenderer,
    include: &[String],
    exclude: &[String],
    outdir: &Path,
    find_only: bool,
) -> Result<PlotRunReport> {
    let groups: Vec<String> = if include.is_empty() {
        library.plot_groups().names()
    } else {
        include.to_vec()
    };

    let mut report = PlotRunReport::default();
    for group_name in groups.iter().filter(|name| !exclude.contains(*name)) {
        let group = library.plot_group(group_name)?;
        let jobs = group.resolve(library, outdir)?;
        info!("Plot group '{}': {} plots", group_name, jobs.len());

        for job in jobs {
            if find_only {
                if job.path.exists() {
                    report.found.push(job.path);
                } else {
                    report.missing.push(job.path);
                }
                continue;
            }

            if let Some(parent) = job.path.parent() {
                fs::create_dir_all(parent)?;
            }
            renderer.render(&job)?;
            report.rendered.push(job.path);
        }
    }
    Ok(report)
}

/// Write a PlotGroups document pairing one plotter list with dataset lists.
///
/// Groups are named `{output_prefix}{dataset_list}_{plotter_list}`. When
/// `dataset_list_names` is empty every dataset list of `dataset_yaml` is used.
/// The written document includes both source documents.
pub fn make_plot_group_document(
    output_yaml: &Path,
    plotter_yaml: &Path,
    dataset_yaml: &Path,
    plotter_list_name: &str,
    output_prefix: &str,
    dataset_list_names: &[String],
) -> Result<Value> {
    let mut library = Library::new();
    library.load_yaml(plotter_yaml)?;
    library.load_yaml(dataset_yaml)?;
    library.plotter_list(plotter_list_name)?;

    let dataset_lists: Vec<String> = if dataset_list_names.is_empty() {
        library
            .data()
            .iter_as(super::DataEntry::as_dataset_list)
            .map(|list| list.name.clone())
            .collect()
    } else {
        for name in dataset_list_names {
            library.dataset_list(name)?;
        }
        dataset_list_names.to_vec()
    };

    let groups: Vec<Value> = dataset_lists
        .iter()
        .map(|dataset_list| {
            let mut group = Map::new();
            group.insert(
                "name".to_string(),
                Value::String(format!("{}{}_{}", output_prefix, dataset_list, plotter_list_name)),
            );
            group.insert(
                "plotter_list_name".to_string(),
                Value::String(plotter_list_name.to_string()),
            );
            group.insert(
                "dataset_list_name".to_string(),
                Value::String(dataset_list.clone()),
            );
            let mut block = Map::new();
            block.insert("PlotGroup".to_string(), Value::Object(group));
            Value::Object(block)
        })
        .collect();

    let mut doc = Map::new();
    doc.insert(
        "Includes".to_string(),
        Value::Array(vec![
            Value::String(plotter_yaml.display().to_string()),
            Value::String(dataset_yaml.display().to_string()),
        ]),
    );
    doc.insert("PlotGroups".to_string(), Value::Array(groups));
    let doc = Value::Object(doc);

    if let Some(parent) = output_yaml.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let text = serde_yaml::to_string(&doc)
        .map_err(|e| AppError::ConfigError(format!("Failed to write {:?}: {}", output_yaml, e)))?;
    fs::write(output_yaml, text)?;
    info!("Wrote {} plot groups to {:?}", dataset_lists.len(), output_yaml);

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PLOTS_YAML: &str = "\
Plots:
  - Plotter:
      name: hist
      class_name: Hist
  - PlotterList:
      name: basic
      plotters: [hist]
";

    const DATA_YAML: &str = "\
Data:
  - Dataset:
      name: knn
      extractor: E
      project: ci_test
      selection: gold
      flavor: baseline
      tag: test
      algo: knn
  - Dataset:
      name: fzb
      extractor: E
      project: ci_test
      selection: gold
      flavor: baseline
      tag: test
      algo: fzboost
  - DatasetList:
      name: gold_knn
      datasets: [knn]
  - DatasetList:
      name: gold_all
      datasets: [knn, fzb]
";

    struct RecordingRenderer {
        seen: Vec<String>,
    }

    impl PlotRenderer for RecordingRenderer {
        fn render(&mut self, job: &PlotJob) -> Result<()> {
            self.seen.push(format!("{}:{}", job.plotter.name, job.dataset.name));
            fs::write(&job.path, b"png")?;
            Ok(())
        }
    }

    fn setup() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let plots = temp_dir.path().join("plots.yaml");
        let data = temp_dir.path().join("data.yaml");
        fs::write(&plots, PLOTS_YAML).unwrap();
        fs::write(&data, DATA_YAML).unwrap();

        let groups = temp_dir.path().join("groups/plot_groups.yaml");
        make_plot_group_document(&groups, &plots, &data, "basic", "ci_", &[]).unwrap();
        (temp_dir, groups)
    }

    #[test]
    fn test_make_plot_group_document() {
        let (_temp_dir, groups) = setup();
        let mut library = Library::new();
        library.load_yaml(&groups).unwrap();
        assert_eq!(
            library.plot_groups().names(),
            vec!["ci_gold_knn_basic", "ci_gold_all_basic"]
        );
        assert_eq!(library.plot_group("ci_gold_all_basic").unwrap().figtype, "png");
    }

    #[test]
    fn test_run_then_find() {
        let (temp_dir, groups) = setup();
        let mut library = Library::new();
        library.load_yaml(&groups).unwrap();

        let outdir = temp_dir.path().join("out");
        let mut renderer = RecordingRenderer { seen: Vec::new() };
        let report = run(
            &library,
            &mut renderer,
            &["ci_gold_knn_basic".to_string()],
            &[],
            &outdir,
            false,
        )
        .unwrap();
        assert_eq!(renderer.seen, vec!["hist:knn"]);
        assert_eq!(report.rendered, vec![outdir.join("hist_knn.png")]);

        let report = run(
            &library,
            &mut renderer,
            &[],
            &["ci_gold_knn_basic".to_string()],
            &outdir,
            true,
        )
        .unwrap();
        assert_eq!(report.found, vec![outdir.join("hist_knn.png")]);
        assert_eq!(report.missing, vec![outdir.join("hist_fzb.png")]);
        assert_eq!(renderer.seen.len(), 1);
    }

    #[test]
    fn test_unknown_group() {
        let (_temp_dir, groups) = setup();
        let mut library = Library::new();
        library.load_yaml(&groups).unwrap();
        let mut renderer = RecordingRenderer { seen: Vec::new() };
        let err = run(&library, &mut renderer, &["nope".to_string()], &[], Path::new("."), true)
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownComponent { .. }));
    }
}

//! End-to-end checks against the CI project under `tests/ci/`.

use railyard_libs::{AppError, Library, Project};
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CI_PROJECT: &str = "tests/ci/project.yaml";

fn bindings(value: Value) -> railyard_libs::Bindings {
    value.as_object().cloned().unwrap()
}

/// Copy the CI project into `temp_dir` with its root moved there.
fn scratch_project(temp_dir: &TempDir) -> (Project, PathBuf) {
    let root = temp_dir.path().join("data");
    let project_yaml = fs::read_to_string(CI_PROJECT)
        .unwrap()
        .replace("tests/temp_data", &root.display().to_string());
    fs::write(temp_dir.path().join("project.yaml"), project_yaml).unwrap();
    fs::copy("tests/ci/library.yaml", temp_dir.path().join("library.yaml")).unwrap();

    let project = Project::load_config(temp_dir.path().join("project.yaml")).unwrap();
    (project, root)
}

#[test]
fn test_load_ci_project() {
    let project = Project::load_config(CI_PROJECT).unwrap();
    assert_eq!(project.name(), "ci_test");
    assert_eq!(project.flavor_names(), vec!["baseline", "train_zCOSMOS", "gpz_gl"]);

    let path = project
        .get_path("pipeline_path", &bindings(json!({"pipeline": "pz", "flavor": "baseline"})))
        .unwrap();
    assert_eq!(path, "tests/temp_data/projects/ci_test/pipelines/pz_baseline.yaml");

    assert_eq!(project.library().selections().len(), 2);
    assert_eq!(
        project.get_common_paths().get("project_scratch_dir"),
        Some(&json!("tests/temp_data/projects/ci_test"))
    );
}

#[test]
fn test_flavor_file_aliases() {
    let project = Project::load_config(CI_PROJECT).unwrap();
    let gold = bindings(json!({"selection": "gold"}));

    assert_eq!(
        project.get_file_for_flavor("train_zCOSMOS", "train", &gold).unwrap(),
        "tests/temp_data/catalogs/test/ci_test_gold_zCOSMOS_100k.hdf5"
    );
    assert_eq!(
        project.get_file_for_flavor("train_zCOSMOS", "test", &gold).unwrap(),
        "tests/temp_data/catalogs/test/ci_test_gold_baseline_100k.hdf5"
    );
    assert!(matches!(
        project.get_file_for_flavor("train_zcosmos", "train", &gold),
        Err(AppError::UnknownFlavor { .. })
    ));
}

#[test]
fn test_build_then_run() {
    let temp_dir = TempDir::new().unwrap();
    let (project, root) = scratch_project(&temp_dir);
    let pipelines_dir = root.join("projects/ci_test/pipelines");

    let report = project.build_pipelines("baseline", false).unwrap();
    assert_eq!(report.built.len(), 3);
    assert!(pipelines_dir.join("spec_selection_baseline.yaml").exists());

    let report = project.build_pipelines("gpz_gl", false).unwrap();
    assert_eq!(report.skipped_disabled, vec!["spec_selection"]);
    assert!(pipelines_dir.join("inform_gpz_gl_overrides.yml").exists());

    let unit = project
        .run_pipeline_single("pz", "gpz_gl", &bindings(json!({"selection": "gold"})))
        .unwrap();
    assert_eq!(unit.command[0], "ceci");
    assert_eq!(
        Path::new(&unit.command[1]),
        pipelines_dir.join("pz_gpz_gl.yaml").as_path()
    );

    let units = project
        .run_pipeline_catalog("spec_selection", "baseline", &bindings(json!({"selection": "gold"})))
        .unwrap();
    let pixels: Vec<&Value> = units.iter().map(|u| &u.iteration["healpix"]).collect();
    assert_eq!(pixels, vec![&json!(3433), &json!(3344)]);
    assert!(units[1].inputs["input"].ends_with("catalogs/ci_test_gold/3344/part-0.csv"));
}

#[test]
fn test_selection_list_restricts_project() {
    let project = Project::load_config(CI_PROJECT).unwrap();
    assert_eq!(
        project.get_selection_args(&["all".to_string()]).unwrap(),
        vec!["gold", "blend"]
    );
    assert!(project.get_selection("gold").is_ok());
}

#[test]
fn test_plots_document() {
    let mut library = Library::new();
    library.load_yaml("tests/ci/plots.yaml").unwrap();

    let project = library.project_ref("ci_test").unwrap().load().unwrap();
    assert_eq!(project.name(), "ci_test");

    let group = library.plot_group("gold_baseline_test_zestimate_v_ztrue").unwrap();
    let jobs = group.resolve(&library, Path::new("plots")).unwrap();
    assert_eq!(jobs.len(), 4);
    assert_eq!(
        jobs[0].path,
        PathBuf::from("plots/ci_test/zestimate_v_ztrue_hist2d_gold_baseline_test_knn.png")
    );
    assert_eq!(jobs[0].plotter.options.get("n_zbins"), Some(&json!(150)));
}

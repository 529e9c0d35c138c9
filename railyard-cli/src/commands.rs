//! Subcommand bodies.

use super::{
    BuildArgs, MakeGroupsArgs, PlotRunArgs, ProjectArgs, ReduceArgs, RunArgs, RunMode,
    SubsampleArgs,
};
use anyhow::{Context, Result, bail};
use railyard_libs::plotting::{self, PlotJob, PlotRenderer};
use railyard_libs::{AlgorithmTable, Bindings, ExecutionUnit, Library, Project, ReduceRequest, SubsampleRequest};
use serde_json::Value;
use std::process;
use tracing::{error, info, warn};

fn load_project(args: &ProjectArgs) -> Result<Project> {
    let mut algorithms = AlgorithmTable::new();
    catalog_tools::register(&mut algorithms);
    let project = Project::load_config(&args.config_file)
        .with_context(|| format!("Failed to load project {:?}", args.config_file))?;
    Ok(project.with_algorithms(algorithms))
}

fn bindings(pairs: &[(&str, &str)]) -> Bindings {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect()
}

pub fn inspect(args: &ProjectArgs) -> Result<()> {
    let project = load_project(args)?;
    print!("{}", project.inspect()?);
    Ok(())
}

pub fn build(args: &BuildArgs) -> Result<()> {
    let project = load_project(&args.project)?;
    for flavor in project.get_flavor_args(&args.flavors) {
        let report = project
            .build_pipelines(&flavor, args.force)
            .with_context(|| format!("Failed to build pipelines for flavor {}", flavor))?;
        info!(
            "Flavor {}: built {}, kept {} existing, {} not enabled",
            flavor,
            report.built.len(),
            report.skipped_existing.len(),
            report.skipped_disabled.len()
        );
    }
    Ok(())
}

pub fn reduce(args: &ReduceArgs) -> Result<()> {
    let project = load_project(&args.project)?;
    let mut failures = 0;
    for selection in project.get_selection_args(&args.selections)? {
        let report = project.reduce_data(&ReduceRequest {
            catalog_template: args.catalog_template.clone(),
            output_catalog_template: args.output_catalog_template.clone(),
            reducer: args.reducer_class_name.clone(),
            input_selection: args.input_selection.clone(),
            selection: selection.clone(),
            bindings: Bindings::new(),
            dry_run: args.run_mode == RunMode::DryRun,
        })?;
        info!("Selection {}: {} files", selection, report.outputs.len());
        failures += report.failures.len();
    }
    if failures > 0 {
        bail!("{} files failed to reduce", failures);
    }
    Ok(())
}

pub fn subsample(args: &SubsampleArgs) -> Result<()> {
    let project = load_project(&args.project)?;
    for flavor in project.get_flavor_args(&args.flavors) {
        for selection in project.get_selection_args(&args.selections)? {
            let output = project.subsample_data(&SubsampleRequest {
                catalog_template: args.catalog_template.clone(),
                file_template: args.file_template.clone(),
                subsampler: args.subsampler_class_name.clone(),
                subsample: args.subsample.clone(),
                bindings: bindings(&[("flavor", flavor.as_str()), ("selection", selection.as_str())]),
                dry_run: args.run_mode == RunMode::DryRun,
            })?;
            println!("{}", output);
        }
    }
    Ok(())
}

pub fn run_single(args: &RunArgs) -> Result<()> {
    let project = load_project(&args.project)?;
    let mut units = Vec::new();
    for flavor in project.get_flavor_args(&args.flavors) {
        for selection in project.get_selection_args(&args.selections)? {
            units.push(project.run_pipeline_single(
                &args.pipeline,
                &flavor,
                &bindings(&[("selection", selection.as_str())]),
            )?);
        }
    }
    execute(&units, args.run_mode)
}

pub fn run_catalog(args: &RunArgs) -> Result<()> {
    let project = load_project(&args.project)?;
    let mut units = Vec::new();
    for flavor in project.get_flavor_args(&args.flavors) {
        for selection in project.get_selection_args(&args.selections)? {
            units.extend(project.run_pipeline_catalog(
                &args.pipeline,
                &flavor,
                &bindings(&[("selection", selection.as_str())]),
            )?);
        }
    }
    execute(&units, args.run_mode)
}

/// Run or log every unit; fails if any command exits non-zero.
fn execute(units: &[ExecutionUnit], run_mode: RunMode) -> Result<()> {
    let mut failed = false;
    for unit in units {
        let command_line = unit.command.join(" ");
        match run_mode {
            RunMode::DryRun => println!("{}", command_line),
            RunMode::Bash => {
                info!("Running {}", command_line);
                std::fs::create_dir_all(&unit.log_dir)
                    .with_context(|| format!("Failed to create {}", unit.log_dir))?;
                let status = process::Command::new("bash")
                    .arg("-c")
                    .arg(&command_line)
                    .status()
                    .with_context(|| format!("Failed to start {}", command_line))?;
                if !status.success() {
                    error!("{} exited with {}", unit.pipeline, status);
                    failed = true;
                }
            }
        }
    }
    if failed {
        bail!("At least one pipeline run failed");
    }
    Ok(())
}

/// Lists plot jobs on stdout for an external plotting backend.
struct JobListRenderer;

impl PlotRenderer for JobListRenderer {
    fn render(&mut self, job: &PlotJob) -> railyard_libs::Result<()> {
        println!(
            "{}\t{}\t{}\t{}",
            job.group,
            job.plotter.class_name,
            job.dataset.name,
            job.path.display()
        );
        Ok(())
    }
}

pub fn plot_run(args: &PlotRunArgs) -> Result<()> {
    let mut library = Library::new();
    for yaml_file in &args.yaml_files {
        library
            .load_yaml(yaml_file)
            .with_context(|| format!("Failed to load {:?}", yaml_file))?;
    }

    let report = plotting::run(
        &library,
        &mut JobListRenderer,
        &args.include_groups,
        &args.exclude_groups,
        &args.outdir,
        args.find_only,
    )?;
    if args.find_only {
        for path in &report.missing {
            warn!("Missing plot {:?}", path);
        }
        info!("{} plots found, {} missing", report.found.len(), report.missing.len());
    } else {
        info!("{} plots listed", report.rendered.len());
    }
    Ok(())
}

pub fn make_groups(args: &MakeGroupsArgs) -> Result<()> {
    plotting::make_plot_group_document(
        &args.output_yaml,
        &args.plotter_yaml,
        &args.dataset_yaml,
        &args.plotter_list_name,
        &args.output_prefix,
        &args.dataset_list_names,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_bindings() {
        let b = bindings(&[("flavor", "baseline"), ("selection", "gold")]);
        assert_eq!(b["flavor"], Value::String("baseline".to_string()));
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_execute_dry_run_and_bash() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs").display().to_string();
        let unit = |command: &str| ExecutionUnit {
            pipeline: "pz".to_string(),
            command: vec![command.to_string()],
            inputs: IndexMap::new(),
            output_dir: temp_dir.path().display().to_string(),
            log_dir: log_dir.clone(),
            iteration: Bindings::new(),
        };

        assert!(execute(&[unit("false")], RunMode::DryRun).is_ok());
        assert!(execute(&[unit("true")], RunMode::Bash).is_ok());
        assert!(execute(&[unit("false"), unit("true")], RunMode::Bash).is_err());
    }
}

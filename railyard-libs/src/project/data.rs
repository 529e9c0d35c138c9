//! Reducing and subsampling catalogs.

use super::Project;
use crate::components::AlgorithmKind;
use crate::error::AppError;
use crate::template::{self, Bindings};
use crate::Result;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Arguments of [`Project::reduce_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceRequest {
    /// Catalog to read
    pub catalog_template: String,
    /// Catalog to write, one file per input file
    pub output_catalog_template: String,
    /// Reducer name in the library
    pub reducer: String,
    /// Selection the input catalog was made with, bound as `{selection}` on input
    pub input_selection: String,
    /// Selection to apply, bound as `{selection}` on output
    pub selection: String,
    pub bindings: Bindings,
    pub dry_run: bool,
}

/// A reduction that failed for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceFailure {
    pub input: String,
    pub output: String,
    pub message: String,
}

/// Outcome of [`Project::reduce_data`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReduceReport {
    /// Output files written, or that would be written on a dry run
    pub outputs: Vec<String>,
    pub failures: Vec<ReduceFailure>,
    pub dry_run: bool,
}

/// Arguments of [`Project::subsample_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubsampleRequest {
    pub catalog_template: String,
    /// File the subsample is written to
    pub file_template: String,
    /// Subsampler name in the library
    pub subsampler: String,
    /// Subsample definition, giving the seed and size
    pub subsample: String,
    pub bindings: Bindings,
    pub dry_run: bool,
}

impl Project {
    /// Apply a selection to every file of a catalog.
    ///
    /// A failure on one file is logged and recorded in the report, and
    /// whatever the reducer left at its output path is removed; the
    /// remaining files are still reduced. A whole-catalog reducer that fails
    /// records a failure for every file.
    ///
    /// # Errors
    ///
    /// * `AppError::UnknownComponent` if a catalog, reducer or selection is unknown
    /// * `AppError::AlgorithmNotFound` if the reducer has no registered implementation
    /// * `AppError::ConfigError` if the two catalogs have different file counts
    pub fn reduce_data(&self, request: &ReduceRequest) -> Result<ReduceReport> {
        let mut input_bindings = request.bindings.clone();
        input_bindings.insert(
            "selection".to_string(),
            Value::String(request.input_selection.clone()),
        );
        let sources = self.get_catalog_files(&request.catalog_template, &input_bindings)?;

        let mut output_bindings = request.bindings.clone();
        output_bindings.insert("selection".to_string(), Value::String(request.selection.clone()));
        let sinks = self.get_catalog_files(&request.output_catalog_template, &output_bindings)?;

        if sources.len() != sinks.len() {
            return Err(AppError::ConfigError(format!(
                "Catalog '{}' has {} files but '{}' has {}",
                request.catalog_template,
                sources.len(),
                request.output_catalog_template,
                sinks.len()
            )));
        }

        let algorithm = self
            .get_algorithm_holder(AlgorithmKind::Reducer, &request.reducer)?
            .role("Reduce")?;
        let selection = self.get_selection(&request.selection)?;
        let reducer = self.algorithms.reducer(&algorithm, selection)?;

        let mut report = ReduceReport {
            dry_run: request.dry_run,
            ..Default::default()
        };
        if request.dry_run {
            for (source, sink) in sources.iter().zip(&sinks) {
                info!("Would reduce {} -> {} with {}", source, sink, algorithm);
            }
            report.outputs = sinks;
            return Ok(report);
        }

        for sink in &sinks {
            create_parent(&local_path(sink))?;
        }

        if reducer.handles_whole_catalog() {
            let inputs: Vec<PathBuf> = sources.iter().map(|p| local_path(p)).collect();
            let outputs: Vec<PathBuf> = sinks.iter().map(|p| local_path(p)).collect();
            match reducer.reduce_catalog(&inputs, &outputs) {
                Ok(()) => {
                    info!("Reduced {} files of {}", sinks.len(), request.catalog_template);
                    report.outputs = sinks;
                }
                Err(e) => {
                    warn!("Failed to reduce {}: {}", request.catalog_template, e);
                    let message = e.to_string();
                    for (source, sink) in sources.into_iter().zip(sinks) {
                        discard(&local_path(&sink));
                        report.failures.push(ReduceFailure {
                            input: source,
                            output: sink,
                            message: message.clone(),
                        });
                    }
                }
            }
            return Ok(report);
        }

        for (source, sink) in sources.iter().zip(sinks) {
            match reducer.reduce(&local_path(source), &local_path(&sink)) {
                Ok(()) => {
                    info!("Reduced {} -> {}", source, sink);
                    report.outputs.push(sink);
                }
                Err(e) => {
                    warn!("Failed to reduce {}: {}", source, e);
                    discard(&local_path(&sink));
                    report.failures.push(ReduceFailure {
                        input: source.clone(),
                        output: sink,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Draw a subsample of a catalog into a single file.
    ///
    /// # Returns
    ///
    /// The path of the subsample file.
    pub fn subsample_data(&self, request: &SubsampleRequest) -> Result<String> {
        let output = self.get_file(&request.file_template, &request.bindings)?;
        let sources = self.get_catalog_files(&request.catalog_template, &request.bindings)?;

        let algorithm = self
            .get_algorithm_holder(AlgorithmKind::Subsampler, &request.subsampler)?
            .role("Subsample")?;
        let subsample = self.get_subsample(&request.subsample)?;
        let subsampler = self.algorithms.subsampler(&algorithm, subsample)?;

        if request.dry_run {
            info!("Would subsample {} files into {}", sources.len(), output);
            return Ok(output);
        }

        let output_path = local_path(&output);
        create_parent(&output_path)?;
        let inputs: Vec<PathBuf> = sources.iter().map(|p| local_path(p)).collect();
        subsampler.subsample(&inputs, &output_path)?;
        info!(
            "Subsampled {} objects from {} files into {}",
            subsample.num_objects,
            inputs.len(),
            output
        );
        Ok(output)
    }
}

fn local_path(path: &str) -> PathBuf {
    PathBuf::from(template::expand_env(path))
}

/// Remove a partial output so later runs never read it.
fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {:?}: {}", path, e),
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

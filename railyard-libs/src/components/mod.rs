//! Component types that appear in library documents.
//!
//! Each type is a [`Configurable`](crate::Configurable) with its own schema.
//! Categories that hold more than one block shape (`Files`, `Catalogs`,
//! `Pipelines`) are wrapped in entry enums dispatched on the tag key.

pub mod algorithm;
pub mod catalog;
pub mod file;
pub mod flavor;
pub mod pipeline;
pub mod selection;

pub use algorithm::{AlgorithmHolder, AlgorithmKind, AlgorithmRef};
pub use catalog::{CatalogEntry, CatalogInstance, CatalogTemplate};
pub use file::{FileEntry, FileInstance, FileTemplate};
pub use flavor::Flavor;
pub use pipeline::{PipelineEntry, PipelineInstance, PipelineTemplate};
pub use selection::{RangeCut, Selection, Subsample};

use crate::error::AppError;
use crate::template;
use crate::Result;

/// Names every path template may use without declaring them.
pub const COMMON_PATH_KEYS: &[&str] = &[
    "root",
    "scratch_root",
    "catalogs_dir",
    "project",
    "project_dir",
    "project_scratch_dir",
    "pipelines_dir",
];

/// Check that every placeholder of a template is declared.
///
/// Templates without declared interpolants are only checked for syntax;
/// their placeholders are bound at resolution time.
pub(crate) fn check_declared_placeholders(
    kind: &str,
    name: &str,
    path_template: &str,
    interpolants: &[String],
    iteration_vars: &[String],
) -> Result<()> {
    if interpolants.is_empty() {
        template::placeholders(path_template)?;
        return Ok(());
    }

    let allowed: Vec<&str> = COMMON_PATH_KEYS
        .iter()
        .copied()
        .chain(interpolants.iter().map(String::as_str))
        .chain(iteration_vars.iter().map(String::as_str))
        .collect();

    let unbound = template::unbound_placeholders(path_template, &allowed)?;
    if unbound.is_empty() {
        return Ok(());
    }

    Err(AppError::InvalidConfiguration {
        kind: kind.to_string(),
        name: name.to_string(),
        violations: unbound
            .into_iter()
            .map(|placeholder| {
                format!(
                    "path_template: '{}' is not a declared interpolant, iteration variable or common path",
                    placeholder
                )
            })
            .collect(),
    })
}

/// Check that a resolved path leaves only iteration variables unbound.
pub(crate) fn check_fully_bound(
    kind: &str,
    name: &str,
    field: &str,
    path: &str,
    iteration_vars: &[String],
) -> Result<()> {
    let unbound = template::unbound_placeholders(path, iteration_vars)?;
    if unbound.is_empty() {
        return Ok(());
    }

    Err(AppError::InvalidConfiguration {
        kind: kind.to_string(),
        name: name.to_string(),
        violations: unbound
            .into_iter()
            .map(|placeholder| format!("{}: '{}' is not bound", field, placeholder))
            .collect(),
    })
}

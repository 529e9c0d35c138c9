//! # Catalog Tools
//!
//! Reference reducer and subsampler working on CSV catalog shards.
//!
//! ## Features
//!
//! - `CutReducer`: keeps the rows passing every range cut of a selection
//! - `RandomSubsampler`: seeded random draw across many shards into one file
//!
//! Register both with [`register`] before handing the table to a project:
//!
//! ```rust,ignore
//! let mut table = AlgorithmTable::new();
//! catalog_tools::register(&mut table);
//! let project = Project::load_config("project.yaml")?.with_algorithms(table);
//! ```

pub mod cut;
pub mod subsample;

pub use cut::CutReducer;
pub use subsample::RandomSubsampler;

use railyard_libs::{AlgorithmTable, AppError, Result};
use std::fmt::Display;
use std::path::Path;
use tempfile::NamedTempFile;

/// Module name the library documents use for these algorithms.
pub const MODULE: &str = "catalog_tools";

/// Add every algorithm of this crate to `table`.
pub fn register(table: &mut AlgorithmTable) {
    table.register_reducer(&format!("{}.CutReducer", MODULE), cut::make_cut_reducer);
    table.register_subsampler(
        &format!("{}.RandomSubsampler", MODULE),
        subsample::make_random_subsampler,
    );
}

pub(crate) fn failed(algorithm: &str, error: impl Display) -> AppError {
    AppError::AlgorithmFailed {
        algorithm: algorithm.to_string(),
        message: error.to_string(),
    }
}

/// CSV writer over a temporary file next to `output`.
///
/// Nothing appears at `output` until [`persist`] succeeds; dropping the
/// writer on an error path removes the temporary file.
pub(crate) fn staged_writer(algorithm: &str, output: &Path) -> Result<csv::Writer<NamedTempFile>> {
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file = NamedTempFile::new_in(parent).map_err(|e| failed(algorithm, e))?;
    Ok(csv::Writer::from_writer(file))
}

/// Flush a staged writer and move its file to `output`.
pub(crate) fn persist(algorithm: &str, writer: csv::Writer<NamedTempFile>, output: &Path) -> Result<()> {
    let file = writer.into_inner().map_err(|e| failed(algorithm, e.error()))?;
    file.persist(output).map_err(|e| failed(algorithm, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use railyard_libs::AlgorithmRef;

    #[test]
    fn test_register() {
        let mut table = AlgorithmTable::new();
        register(&mut table);
        assert_eq!(table.reducer_names(), vec!["catalog_tools.CutReducer"]);
        assert_eq!(table.subsampler_names(), vec!["catalog_tools.RandomSubsampler"]);

        let algorithm = AlgorithmRef {
            module: MODULE.to_string(),
            class_name: "CutReducer".to_string(),
        };
        assert_eq!(algorithm.qualified(), "catalog_tools.CutReducer");
    }
}

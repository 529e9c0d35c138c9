//! Algorithm plugin seam.
//!
//! Configuration documents name algorithm implementations by module and
//! class. At run time those names are looked up in an [`AlgorithmTable`]
//! that plugin crates fill with constructor functions, so resolving a name
//! is a table lookup rather than a dynamic import.

use crate::components::{AlgorithmRef, Selection, Subsample};
use crate::error::AppError;
use crate::Result;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Applies a selection to catalog files.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use railyard_libs::{AppError, Reducer};
/// use std::path::Path;
///
/// struct CopyReducer;
///
/// impl Reducer for CopyReducer {
///     fn reduce(&self, input: &Path, output: &Path) -> Result<(), AppError> {
///         std::fs::copy(input, output)?;
///         Ok(())
///     }
/// }
/// ```
pub trait Reducer {
    /// Reduce one input file into one output file.
    ///
    /// # Arguments
    ///
    /// * `input` - Source catalog file
    /// * `output` - Destination file; its directory already exists
    fn reduce(&self, input: &Path, output: &Path) -> Result<()>;

    /// Whether the reducer wants the whole catalog in one call.
    fn handles_whole_catalog(&self) -> bool {
        false
    }

    /// Reduce every input into the output at the same position.
    ///
    /// The default reduces file by file and stops at the first failure.
    fn reduce_catalog(&self, inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<()> {
        if inputs.len() != outputs.len() {
            return Err(AppError::ConfigError(format!(
                "Reducer got {} inputs for {} outputs",
                inputs.len(),
                outputs.len()
            )));
        }
        for (input, output) in inputs.iter().zip(outputs) {
            self.reduce(input, output)?;
        }
        Ok(())
    }
}

/// Draws a fixed-size random subsample from catalog files.
pub trait Subsampler {
    /// Write the subsample of all `inputs` to the single file `output`.
    fn subsample(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// Constructor of a reducer for one selection.
pub type ReducerFactory = fn(&Selection) -> Result<Box<dyn Reducer>>;

/// Constructor of a subsampler for one subsample definition.
pub type SubsamplerFactory = fn(&Subsample) -> Result<Box<dyn Subsampler>>;

/// Implementations available to a project, keyed by class name.
///
/// Keys are either bare class names (`CutReducer`) or module-qualified
/// ones (`catalog_tools.CutReducer`); lookups try the qualified name first.
#[derive(Debug, Clone, Default)]
pub struct AlgorithmTable {
    reducers: IndexMap<String, ReducerFactory>,
    subsamplers: IndexMap<String, SubsamplerFactory>,
}

impl AlgorithmTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_reducer(&mut self, id: &str, factory: ReducerFactory) {
        self.reducers.insert(id.to_string(), factory);
    }

    pub fn register_subsampler(&mut self, id: &str, factory: SubsamplerFactory) {
        self.subsamplers.insert(id.to_string(), factory);
    }

    pub fn reducer_names(&self) -> Vec<String> {
        self.reducers.keys().cloned().collect()
    }

    pub fn subsampler_names(&self) -> Vec<String> {
        self.subsamplers.keys().cloned().collect()
    }

    /// Build the reducer `algorithm` refers to.
    ///
    /// # Errors
    ///
    /// * `AppError::AlgorithmNotFound` if no implementation is registered
    /// * Any error raised by the implementation's constructor
    pub fn reducer(
        &self,
        algorithm: &AlgorithmRef,
        selection: &Selection,
    ) -> Result<Box<dyn Reducer>> {
        let factory = lookup(&self.reducers, algorithm, "reducer")?;
        factory(selection)
    }

    /// Build the subsampler `algorithm` refers to.
    pub fn subsampler(
        &self,
        algorithm: &AlgorithmRef,
        subsample: &Subsample,
    ) -> Result<Box<dyn Subsampler>> {
        let factory = lookup(&self.subsamplers, algorithm, "subsampler")?;
        factory(subsample)
    }
}

fn lookup<F: Copy>(
    table: &IndexMap<String, F>,
    algorithm: &AlgorithmRef,
    what: &str,
) -> Result<F> {
    table
        .get(&algorithm.qualified())
        .or_else(|| table.get(&algorithm.class_name))
        .copied()
        .ok_or_else(|| {
            AppError::AlgorithmNotFound(format!(
                "No {} implementation for '{}', registered: [{}]",
                what,
                algorithm.qualified(),
                table.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configurable::Configurable;
    use serde_json::json;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    struct CopyReducer;

    impl Reducer for CopyReducer {
        fn reduce(&self, input: &Path, output: &Path) -> Result<()> {
            fs::copy(input, output)?;
            Ok(())
        }
    }

    fn make_copy_reducer(_selection: &Selection) -> Result<Box<dyn Reducer>> {
        Ok(Box::new(CopyReducer))
    }

    struct CountingSubsampler {
        calls: RefCell<usize>,
    }

    impl Subsampler for CountingSubsampler {
        fn subsample(&self, _inputs: &[PathBuf], _output: &Path) -> Result<()> {
            *self.calls.borrow_mut() += 1;
            Ok(())
        }
    }

    fn make_counting_subsampler(_subsample: &Subsample) -> Result<Box<dyn Subsampler>> {
        Ok(Box::new(CountingSubsampler {
            calls: RefCell::new(0),
        }))
    }

    fn algorithm(module: &str, class_name: &str) -> AlgorithmRef {
        AlgorithmRef {
            module: module.to_string(),
            class_name: class_name.to_string(),
        }
    }

    #[test]
    fn test_lookup_prefers_qualified_name() {
        let mut table = AlgorithmTable::new();
        table.register_reducer("CopyReducer", make_copy_reducer);
        let selection = Selection::from_dict(&json!({"name": "all"})).unwrap();

        assert!(table.reducer(&algorithm("anything", "CopyReducer"), &selection).is_ok());

        let err = table
            .reducer(&algorithm("m", "MissingReducer"), &selection)
            .err()
            .unwrap();
        match err {
            AppError::AlgorithmNotFound(message) => {
                assert!(message.contains("m.MissingReducer"));
                assert!(message.contains("CopyReducer"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_reduce_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let inputs: Vec<PathBuf> = (0..2).map(|i| temp_dir.path().join(format!("in{i}.csv"))).collect();
        let outputs: Vec<PathBuf> = (0..2).map(|i| temp_dir.path().join(format!("out{i}.csv"))).collect();
        for input in &inputs {
            fs::write(input, "a\n1\n").unwrap();
        }

        CopyReducer.reduce_catalog(&inputs, &outputs).unwrap();
        assert!(outputs.iter().all(|o| o.exists()));
        assert!(CopyReducer.reduce_catalog(&inputs, &outputs[..1]).is_err());
    }

    #[test]
    fn test_subsampler_registration() {
        let mut table = AlgorithmTable::new();
        table.register_subsampler("catalog_tools.CountingSubsampler", make_counting_subsampler);
        let subsample = Subsample::from_dict(&json!({"name": "s", "seed": 1, "num_objects": 2})).unwrap();

        let subsampler = table
            .subsampler(&algorithm("catalog_tools", "CountingSubsampler"), &subsample)
            .unwrap();
        subsampler.subsample(&[], Path::new("unused")).unwrap();
        assert!(table
            .subsampler(&algorithm("other", "CountingSubsampler"), &subsample)
            .is_err());
        assert_eq!(table.subsampler_names(), vec!["catalog_tools.CountingSubsampler"]);
    }
}

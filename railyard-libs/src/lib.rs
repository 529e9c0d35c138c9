//! # Railyard Libraries
//!
//! Bookkeeping core for RAIL-style photo-z analysis projects. This crate
//! resolves path templates, validates component definitions, keeps them in
//! a [`Library`], and layers a [`Project`] with flavors on top of it.
//!
//! ## Main Components
//!
//! - `template`: `{placeholder}` resolution and iteration-variable expansion
//! - `Configurable`: schema-validated component options
//! - `Library`: registries of files, catalogs, pipelines, algorithms and plots
//! - `Project`: common paths, flavors, pipeline building and run commands
//! - `Reducer` / `Subsampler` / `PipelineEngine` / `PlotRenderer`: seams to
//!   the code that touches data

pub mod algorithms;
pub mod components;
pub mod configurable;
pub mod engine;
pub mod error;
pub mod library;
pub mod merge;
pub mod plotting;
pub mod project;
pub mod registry;
pub mod template;

// Re-export main types for convenience
pub use algorithms::{AlgorithmTable, Reducer, ReducerFactory, Subsampler, SubsamplerFactory};
pub use components::{
    AlgorithmHolder, AlgorithmKind, AlgorithmRef, CatalogEntry, CatalogInstance, CatalogTemplate,
    FileEntry, FileInstance, FileTemplate, Flavor, PipelineEntry, PipelineInstance,
    PipelineTemplate, RangeCut, Selection, Subsample,
};
pub use configurable::{Configurable, Param, ParamDefault, ParamType, ValidationMode};
pub use engine::{CeciEngine, CommandRequest, PipelineBuildRequest, PipelineEngine};
pub use error::AppError;
pub use library::Library;
pub use plotting::{PlotGroup, PlotJob, PlotRenderer, PlotRunReport};
pub use project::{
    BuildReport, ExecutionUnit, Project, ProjectConfig, ReduceReport, ReduceRequest,
    SubsampleRequest,
};
pub use registry::{Registry, RegistryEntry};
pub use template::Bindings;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

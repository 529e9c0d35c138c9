//! Plotting bookkeeping
//!
//! Plotters, datasets and the groups pairing them, plus the driver that
//! expands groups into plot jobs for an external renderer.

pub mod control;
pub mod dataset;
pub mod plot_group;
pub mod plotter;

pub use control::{PlotRenderer, PlotRunReport, make_plot_group_document, run};
pub use dataset::{DataEntry, Dataset, DatasetList, ProjectRef};
pub use plot_group::{PlotGroup, PlotJob};
pub use plotter::{Plotter, PlotterList, PlotsEntry};

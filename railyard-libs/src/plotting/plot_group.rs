//! Plot groups
//!
//! A plot group pairs a plotter list with a dataset list; every plotter is
//! run on every dataset.
//!
//! ```yaml
//! PlotGroups:
//!   - PlotGroup:
//!       name: blend_baseline_zestimate_v_ztrue
//!       plotter_list_name: zestimate_v_ztrue
//!       dataset_list_name: blend_baseline
//!       outdir: plots
//! ```

use super::{Dataset, Plotter};
use crate::configurable::{Configurable, Param, ParamDefault, ParamType};
use crate::library::Library;
use crate::registry::RegistryEntry;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

const PLOT_GROUP_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "PlotGroup name"),
    Param::required("plotter_list_name", ParamType::Str, "PlotterList name"),
    Param::required("dataset_list_name", ParamType::Str, "DatasetList name"),
    Param::optional("outdir", ParamType::Str, ParamDefault::Str("."), "Output directory"),
    Param::optional("figtype", ParamType::Str, ParamDefault::Str("png"), "Plot type"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotGroup {
    pub name: String,
    pub plotter_list_name: String,
    pub dataset_list_name: String,
    pub outdir: String,
    pub figtype: String,
}

/// One plot to make: a plotter applied to a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotJob {
    pub group: String,
    pub plotter: Plotter,
    pub dataset: Dataset,
    pub path: PathBuf,
}

impl Configurable for PlotGroup {
    const TAG: &'static str = "PlotGroup";

    fn schema() -> &'static [Param] {
        PLOT_GROUP_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl PlotGroup {
    /// Expand the group into its jobs, plotters outermost.
    ///
    /// # Arguments
    ///
    /// * `library` - Library holding the plotters and datasets
    /// * `outdir` - Directory prepended to the group's own `outdir`
    ///
    /// # Errors
    ///
    /// * `AppError::UnknownComponent` if a list or one of its members is not registered
    pub fn resolve(&self, library: &Library, outdir: &Path) -> Result<Vec<PlotJob>> {
        let plotter_list = library.plotter_list(&self.plotter_list_name)?;
        let dataset_list = library.dataset_list(&self.dataset_list_name)?;
        let group_dir = outdir.join(&self.outdir);

        let mut jobs = Vec::with_capacity(plotter_list.plotters.len() * dataset_list.datasets.len());
        for plotter_name in &plotter_list.plotters {
            let plotter = library.plotter(plotter_name)?;
            for dataset_name in &dataset_list.datasets {
                let dataset = library.dataset(dataset_name)?;
                jobs.push(PlotJob {
                    group: self.name.clone(),
                    plotter: plotter.clone(),
                    dataset: dataset.clone(),
                    path: group_dir.join(format!(
                        "{}_{}.{}",
                        plotter.name, dataset.name, self.figtype
                    )),
                });
            }
        }
        Ok(jobs)
    }
}

impl RegistryEntry for PlotGroup {
    fn from_tagged(_tag: &str, raw: &Value) -> Result<Self> {
        Self::from_dict(raw)
    }

    fn tag(&self) -> &'static str {
        Self::TAG
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn to_dict(&self) -> Result<Value> {
        Configurable::to_dict(self)
    }
}

//! Plotter definitions
//!
//! ```yaml
//! Plots:
//!   - Plotter:
//!       name: zestimate_v_ztrue_hist2d
//!       class_name: rail.plotting.pz_plotters.PZPlotterPointEstimateVsTrueHist2D
//!       z_min: 0.0
//!       z_max: 3.0
//!   - PlotterList:
//!       name: zestimate_v_ztrue
//!       plotters:
//!         - zestimate_v_ztrue_hist2d
//! ```

use crate::configurable::{Configurable, Param, ParamType, ValidationMode};
use crate::registry::RegistryEntry;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const PLOTTER_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Plotter name"),
    Param::required("class_name", ParamType::Str, "Plotter class name"),
];

/// A configured plotter; backend options are kept as they were written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plotter {
    pub name: String,
    pub class_name: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl Configurable for Plotter {
    const TAG: &'static str = "Plotter";
    const MODE: ValidationMode = ValidationMode::Lenient;

    fn schema() -> &'static [Param] {
        PLOTTER_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }
}

const PLOTTER_LIST_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "PlotterList name"),
    Param::required("plotters", ParamType::List, "Names of the plotters in the list"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotterList {
    pub name: String,
    pub plotters: Vec<String>,
}

impl Configurable for PlotterList {
    const TAG: &'static str = "PlotterList";

    fn schema() -> &'static [Param] {
        PLOTTER_LIST_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Entry of the `Plots` category.
#[derive(Debug, Clone, PartialEq)]
pub enum PlotsEntry {
    Plotter(Plotter),
    PlotterList(PlotterList),
}

impl PlotsEntry {
    pub const TAGS: &'static [&'static str] = &[Plotter::TAG, PlotterList::TAG];

    pub fn as_plotter(&self) -> Option<&Plotter> {
        match self {
            PlotsEntry::Plotter(p) => Some(p),
            PlotsEntry::PlotterList(_) => None,
        }
    }

    pub fn as_plotter_list(&self) -> Option<&PlotterList> {
        match self {
            PlotsEntry::PlotterList(l) => Some(l),
            PlotsEntry::Plotter(_) => None,
        }
    }
}

impl RegistryEntry for PlotsEntry {
    fn from_tagged(tag: &str, raw: &Value) -> Result<Self> {
        match tag {
            Plotter::TAG => Ok(PlotsEntry::Plotter(Plotter::from_dict(raw)?)),
            _ => Ok(PlotsEntry::PlotterList(PlotterList::from_dict(raw)?)),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            PlotsEntry::Plotter(_) => Plotter::TAG,
            PlotsEntry::PlotterList(_) => PlotterList::TAG,
        }
    }

    fn name(&self) -> &str {
        match self {
            PlotsEntry::Plotter(p) => &p.name,
            PlotsEntry::PlotterList(l) => &l.name,
        }
    }

    fn to_dict(&self) -> Result<Value> {
        match self {
            PlotsEntry::Plotter(p) => p.to_dict(),
            PlotsEntry::PlotterList(l) => l.to_dict(),
        }
    }
}

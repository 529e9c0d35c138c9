//! Selections and subsamples
//!
//! Both are plain parameter bags handed to the data reduction and
//! subsampling algorithms.
//!
//! ```yaml
//! Selections:
//!   - Selection:
//!       name: maglim_25.5
//!       cuts:
//!         maglim_i: [null, 25.5]
//! Subsamples:
//!   - Subsample:
//!       name: test_100k
//!       seed: 1234
//!       num_objects: 100000
//! ```

use crate::configurable::{Configurable, Param, ParamDefault, ParamType, describe_value};
use crate::error::AppError;
use crate::registry::RegistryEntry;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SELECTION_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Selection name"),
    Param::optional(
        "cuts",
        ParamType::Dict,
        ParamDefault::EmptyDict,
        "Cuts associated to selection",
    ),
];

/// A named set of cuts, `{column: [min, max]}` with `null` for an open end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub name: String,
    pub cuts: Map<String, Value>,
}

/// One parsed cut: keep rows with `min <= value < max`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeCut {
    pub column: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeCut {
    pub fn accepts(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value < max)
    }
}

impl Configurable for Selection {
    const TAG: &'static str = "Selection";

    fn schema() -> &'static [Param] {
        SELECTION_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<()> {
        self.range_cuts().map(|_| ())
    }
}

impl Selection {
    /// Parse the cuts into typed ranges, in declaration order.
    ///
    /// # Errors
    ///
    /// * `AppError::InvalidConfiguration` listing every malformed cut
    pub fn range_cuts(&self) -> Result<Vec<RangeCut>> {
        let mut cuts = Vec::with_capacity(self.cuts.len());
        let mut violations = Vec::new();

        for (column, bounds) in &self.cuts {
            match parse_bounds(bounds) {
                Ok((min, max)) => cuts.push(RangeCut {
                    column: column.clone(),
                    min,
                    max,
                }),
                Err(reason) => violations.push(format!("cuts.{}: {}", column, reason)),
            }
        }

        if !violations.is_empty() {
            return Err(AppError::InvalidConfiguration {
                kind: Self::TAG.to_string(),
                name: self.name.clone(),
                violations,
            });
        }
        Ok(cuts)
    }
}

fn parse_bounds(bounds: &Value) -> std::result::Result<(Option<f64>, Option<f64>), String> {
    let Some([min, max]) = bounds.as_array().map(Vec::as_slice) else {
        return Err(format!(
            "expected a [min, max] pair, got {}",
            describe_value(bounds)
        ));
    };

    let bound = |value: &Value| match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("{} is not a finite number", n)),
        other => Err(format!("bounds must be numbers or null, got {}", describe_value(other))),
    };

    Ok((bound(min)?, bound(max)?))
}

const SUBSAMPLE_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Subsample name"),
    Param::required("seed", ParamType::Int, "Random number seed"),
    Param::required("num_objects", ParamType::Int, "Number of objects to pick"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subsample {
    pub name: String,
    pub seed: i64,
    pub num_objects: i64,
}

impl Configurable for Subsample {
    const TAG: &'static str = "Subsample";

    fn schema() -> &'static [Param] {
        SUBSAMPLE_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<()> {
        let mut violations = Vec::new();
        if self.seed < 0 {
            violations.push(format!("seed: must not be negative, got {}", self.seed));
        }
        if self.num_objects < 0 {
            violations.push(format!(
                "num_objects: must not be negative, got {}",
                self.num_objects
            ));
        }
        if !violations.is_empty() {
            return Err(AppError::InvalidConfiguration {
                kind: Self::TAG.to_string(),
                name: self.name.clone(),
                violations,
            });
        }
        Ok(())
    }
}

impl RegistryEntry for Selection {
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

impl RegistryEntry for Subsample {
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

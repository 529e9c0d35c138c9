//! Catalog templates and instances
//!
//! A catalog is a set of files sharing one path template, one file per
//! combination of its iteration variables (typically healpix pixels).
//!
//! ```yaml
//! Catalogs:
//!   - CatalogTemplate:
//!       name: reduced
//!       path_template: "{catalogs_dir}/{project}_{selection}/{healpix}/part-0.pq"
//!       iteration_vars: ['healpix']
//! ```

use super::{check_declared_placeholders, check_fully_bound};
use crate::configurable::{Configurable, Param, ParamDefault, ParamType};
use crate::error::AppError;
use crate::registry::RegistryEntry;
use crate::template::{self, Bindings};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

const CATALOG_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Catalog name"),
    Param::required("path_template", ParamType::Str, "Template for path to catalog files"),
    Param::optional(
        "iteration_vars",
        ParamType::List,
        ParamDefault::EmptyList,
        "Variables to iterate over to construct catalog",
    ),
    Param::optional(
        "interpolants",
        ParamType::List,
        ParamDefault::EmptyList,
        "Free variables of the template",
    ),
];

const CATALOG_INSTANCE_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Catalog name"),
    Param::required("path_template", ParamType::Str, "Path to catalog files, with iteration variables"),
    Param::optional(
        "iteration_vars",
        ParamType::List,
        ParamDefault::EmptyList,
        "Variables to iterate over to construct catalog",
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTemplate {
    pub name: String,
    pub path_template: String,
    pub iteration_vars: Vec<String>,
    pub interpolants: Vec<String>,
}

impl Configurable for CatalogTemplate {
    const TAG: &'static str = "CatalogTemplate";

    fn schema() -> &'static [Param] {
        CATALOG_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<()> {
        check_declared_placeholders(
            Self::TAG,
            &self.name,
            &self.path_template,
            &self.interpolants,
            &self.iteration_vars,
        )
    }
}

impl CatalogTemplate {
    /// Bind interpolants, leaving iteration variables as placeholders.
    pub fn make_catalog_instance(&self, name: &str, bindings: &Bindings) -> Result<CatalogInstance> {
        let path_template =
            template::resolve_partial(&self.path_template, bindings, &self.iteration_vars)?;
        let instance = CatalogInstance {
            name: name.to_string(),
            path_template,
            iteration_vars: self.iteration_vars.clone(),
        };
        instance.check()?;
        Ok(instance)
    }
}

/// A catalog whose only free variables are its iteration variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogInstance {
    pub name: String,
    pub path_template: String,
    pub iteration_vars: Vec<String>,
}

impl Configurable for CatalogInstance {
    const TAG: &'static str = "CatalogInstance";

    fn schema() -> &'static [Param] {
        CATALOG_INSTANCE_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<()> {
        check_fully_bound(
            Self::TAG,
            &self.name,
            "path_template",
            &self.path_template,
            &self.iteration_vars,
        )
    }
}

impl CatalogInstance {
    /// Pick this catalog's iteration variables out of `values`, in declared order.
    ///
    /// # Errors
    ///
    /// * `AppError::MissingInterpolant` if a declared iteration variable has no values
    pub fn iteration_values(&self, values: &Bindings) -> Result<Bindings> {
        let mut selected = Bindings::new();
        for var in &self.iteration_vars {
            let value = values.get(var).ok_or_else(|| AppError::MissingInterpolant {
                name: var.clone(),
                template: self.path_template.clone(),
            })?;
            selected.insert(var.clone(), value.clone());
        }
        Ok(selected)
    }

    /// Every file path of the catalog, one per iteration combination.
    pub fn resolve(&self, values: &Bindings) -> Result<Vec<String>> {
        let iteration_vars = self.iteration_values(values)?;
        template::resolve_iter(&self.path_template, &Bindings::new(), &iteration_vars)
    }

    /// Path of the file for one iteration combination.
    pub fn resolve_one(&self, combination: &Bindings) -> Result<String> {
        template::resolve(&self.path_template, combination)
    }

    /// Existence of each catalog file, in [`CatalogInstance::resolve`] order.
    pub fn check_files(&self, values: &Bindings) -> Result<Vec<bool>> {
        Ok(self
            .resolve(values)?
            .iter()
            .map(|path| Path::new(&template::expand_env(path)).exists())
            .collect())
    }
}

/// Entry of the `Catalogs` category.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogEntry {
    Template(CatalogTemplate),
    Instance(CatalogInstance),
}

impl CatalogEntry {
    pub const TAGS: &'static [&'static str] = &[CatalogTemplate::TAG, CatalogInstance::TAG];

    pub fn as_template(&self) -> Option<&CatalogTemplate> {
        match self {
            CatalogEntry::Template(t) => Some(t),
            CatalogEntry::Instance(_) => None,
        }
    }

    pub fn as_instance(&self) -> Option<&CatalogInstance> {
        match self {
            CatalogEntry::Instance(i) => Some(i),
            CatalogEntry::Template(_) => None,
        }
    }

    /// Instance for the given bindings; instances are returned as they are.
    pub fn instantiate(&self, bindings: &Bindings) -> Result<CatalogInstance> {
        match self {
            CatalogEntry::Template(t) => t.make_catalog_instance(&t.name, bindings),
            CatalogEntry::Instance(i) => Ok(i.clone()),
        }
    }
}

impl RegistryEntry for CatalogEntry {
    fn from_tagged(tag: &str, raw: &Value) -> Result<Self> {
        match tag {
            CatalogTemplate::TAG => Ok(CatalogEntry::Template(CatalogTemplate::from_dict(raw)?)),
            _ => Ok(CatalogEntry::Instance(CatalogInstance::from_dict(raw)?)),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            CatalogEntry::Template(_) => CatalogTemplate::TAG,
            CatalogEntry::Instance(_) => CatalogInstance::TAG,
        }
    }

    fn name(&self) -> &str {
        match self {
            CatalogEntry::Template(t) => &t.name,
            CatalogEntry::Instance(i) => &i.name,
        }
    }

    fn to_dict(&self) -> Result<Value> {
        match self {
            CatalogEntry::Template(t) => t.to_dict(),
            CatalogEntry::Instance(i) => i.to_dict(),
        }
    }
}

//! Dataset definitions
//!
//! Datasets name the project outputs a plot is drawn from. Projects are
//! referenced by name and loaded on demand from their own documents.
//!
//! ```yaml
//! Data:
//!   - Project:
//!       name: ci_test
//!       yaml_file: tests/ci/project.yaml
//!   - Dataset:
//!       name: blend_baseline_knn
//!       extractor: rail.plotting.pz_data_extraction.PZPointEstimateDataExtractor
//!       project: ci_test
//!       selection: blend
//!       flavor: baseline
//!       tag: test
//!       algo: knn
//!   - DatasetList:
//!       name: blend_baseline
//!       datasets:
//!         - blend_baseline_knn
//! ```

use crate::configurable::{Configurable, Param, ParamType};
use crate::project::Project;
use crate::registry::RegistryEntry;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DATASET_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Dataset name"),
    Param::required("extractor", ParamType::Str, "Dataset extractor class name"),
    Param::required("project", ParamType::Str, "Project name"),
    Param::required("selection", ParamType::Str, "Project data selection"),
    Param::required("flavor", ParamType::Str, "Project analysis flavor"),
    Param::required("tag", ParamType::Str, "Project file tag"),
    Param::required("algo", ParamType::Str, "Project algorithm"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub extractor: String,
    pub project: String,
    pub selection: String,
    pub flavor: String,
    pub tag: String,
    pub algo: String,
}

impl Configurable for Dataset {
    const TAG: &'static str = "Dataset";

    fn schema() -> &'static [Param] {
        DATASET_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }
}

const DATASET_LIST_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "DatasetList name"),
    Param::required("datasets", ParamType::List, "Names of the datasets in the list"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetList {
    pub name: String,
    pub datasets: Vec<String>,
}

impl Configurable for DatasetList {
    const TAG: &'static str = "DatasetList";

    fn schema() -> &'static [Param] {
        DATASET_LIST_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }
}

const PROJECT_REF_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "Project name"),
    Param::required("yaml_file", ParamType::Str, "Project configuration file"),
];

/// A project known to the plotting layer by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub name: String,
    pub yaml_file: String,
}

impl Configurable for ProjectRef {
    const TAG: &'static str = "Project";

    fn schema() -> &'static [Param] {
        PROJECT_REF_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ProjectRef {
    /// Load the referenced project document.
    pub fn load(&self) -> Result<Project> {
        Project::load_config(&self.yaml_file)
    }
}

/// Entry of the `Data` category.
#[derive(Debug, Clone, PartialEq)]
pub enum DataEntry {
    Dataset(Dataset),
    DatasetList(DatasetList),
    Project(ProjectRef),
}

impl DataEntry {
    pub const TAGS: &'static [&'static str] = &[Dataset::TAG, DatasetList::TAG, ProjectRef::TAG];

    pub fn as_dataset(&self) -> Option<&Dataset> {
        match self {
            DataEntry::Dataset(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dataset_list(&self) -> Option<&DatasetList> {
        match self {
            DataEntry::DatasetList(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_project(&self) -> Option<&ProjectRef> {
        match self {
            DataEntry::Project(p) => Some(p),
            _ => None,
        }
    }
}

impl RegistryEntry for DataEntry {
    fn from_tagged(tag: &str, raw: &Value) -> Result<Self> {
        match tag {
            Dataset::TAG => Ok(DataEntry::Dataset(Dataset::from_dict(raw)?)),
            DatasetList::TAG => Ok(DataEntry::DatasetList(DatasetList::from_dict(raw)?)),
            _ => Ok(DataEntry::Project(ProjectRef::from_dict(raw)?)),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            DataEntry::Dataset(_) => Dataset::TAG,
            DataEntry::DatasetList(_) => DatasetList::TAG,
            DataEntry::Project(_) => ProjectRef::TAG,
        }
    }

    fn name(&self) -> &str {
        match self {
            DataEntry::Dataset(d) => &d.name,
            DataEntry::DatasetList(l) => &l.name,
            DataEntry::Project(p) => &p.name,
        }
    }

    fn to_dict(&self) -> Result<Value> {
        match self {
            DataEntry::Dataset(d) => d.to_dict(),
            DataEntry::DatasetList(l) => l.to_dict(),
            DataEntry::Project(p) => p.to_dict(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    #[test]
    fn test_dataset_requires_every_key() {
        let err = Dataset::from_dict(&json!({"name": "d", "extractor": "E", "project": "p"})).unwrap_err();
        match err {
            AppError::InvalidConfiguration { violations, .. } => assert_eq!(violations.len(), 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_entries_dispatch_on_tag() {
        let entry = DataEntry::from_tagged(
            "Project",
            &json!({"name": "ci_test", "yaml_file": "tests/ci/project.yaml"}),
        )
        .unwrap();
        assert_eq!(entry.tag(), "Project");
        assert_eq!(entry.as_project().map(|p| p.yaml_file.as_str()), Some("tests/ci/project.yaml"));

        let entry = DataEntry::from_tagged("DatasetList", &json!({"name": "l", "datasets": "only"})).unwrap();
        assert_eq!(
            entry.as_dataset_list().map(|l| l.datasets.clone()),
            Some(vec!["only".to_string()])
        );
    }
}

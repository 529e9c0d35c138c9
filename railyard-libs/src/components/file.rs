//! File templates and instances
//!
//! ```yaml
//! Files:
//!   - FileTemplate:
//!       name: test_file_100k
//!       path_template: "{catalogs_dir}/test/{project}_{selection}_baseline_100k.hdf5"
//!   - FileInstance:
//!       name: reference
//!       path: "/data/reference.hdf5"
//! ```

use super::{check_declared_placeholders, check_fully_bound};
use crate::configurable::{Configurable, Param, ParamDefault, ParamType};
use crate::registry::RegistryEntry;
use crate::template::{self, Bindings};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Template for the path of a single file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTemplate {
    pub name: String,
    pub path_template: String,
    pub interpolants: Vec<String>,
}

const FILE_TEMPLATE_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "File name"),
    Param::required("path_template", ParamType::Str, "Template for path to file"),
    Param::optional(
        "interpolants",
        ParamType::List,
        ParamDefault::EmptyList,
        "Free variables of the template",
    ),
];

impl Configurable for FileTemplate {
    const TAG: &'static str = "FileTemplate";

    fn schema() -> &'static [Param] {
        FILE_TEMPLATE_SCHEMA
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
            &[],
        )
    }
}

impl FileTemplate {
    /// Resolve the template to a concrete path.
    pub fn resolve(&self, bindings: &Bindings) -> Result<String> {
        template::resolve(&self.path_template, bindings)
    }

    /// Bind every interpolant, producing a [`FileInstance`].
    pub fn make_file_instance(&self, name: &str, bindings: &Bindings) -> Result<FileInstance> {
        Ok(FileInstance {
            name: name.to_string(),
            path: self.resolve(bindings)?,
        })
    }
}

/// A file with a fully resolved path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInstance {
    pub name: String,
    pub path: String,
}

const FILE_INSTANCE_SCHEMA: &[Param] = &[
    Param::required("name", ParamType::Str, "File name"),
    Param::required("path", ParamType::Str, "Path to file"),
];

impl Configurable for FileInstance {
    const TAG: &'static str = "FileInstance";

    fn schema() -> &'static [Param] {
        FILE_INSTANCE_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<()> {
        check_fully_bound(Self::TAG, &self.name, "path", &self.path, &[])
    }
}

impl FileInstance {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the file exists, after environment expansion.
    pub fn check_file(&self) -> bool {
        Path::new(&template::expand_env(&self.path)).exists()
    }
}

/// Entry of the `Files` category.
#[derive(Debug, Clone, PartialEq)]
pub enum FileEntry {
    Template(FileTemplate),
    Instance(FileInstance),
}

impl FileEntry {
    pub const TAGS: &'static [&'static str] = &[FileTemplate::TAG, FileInstance::TAG];

    pub fn as_template(&self) -> Option<&FileTemplate> {
        match self {
            FileEntry::Template(t) => Some(t),
            FileEntry::Instance(_) => None,
        }
    }

    pub fn as_instance(&self) -> Option<&FileInstance> {
        match self {
            FileEntry::Instance(i) => Some(i),
            FileEntry::Template(_) => None,
        }
    }
}

impl RegistryEntry for FileEntry {
    fn from_tagged(tag: &str, raw: &Value) -> Result<Self> {
        match tag {
            FileTemplate::TAG => Ok(FileEntry::Template(FileTemplate::from_dict(raw)?)),
            _ => Ok(FileEntry::Instance(FileInstance::from_dict(raw)?)),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            FileEntry::Template(_) => FileTemplate::TAG,
            FileEntry::Instance(_) => FileInstance::TAG,
        }
    }

    fn name(&self) -> &str {
        match self {
            FileEntry::Template(t) => &t.name,
            FileEntry::Instance(i) => &i.name,
        }
    }

    fn to_dict(&self) -> Result<Value> {
        match self {
            FileEntry::Template(t) => t.to_dict(),
            FileEntry::Instance(i) => i.to_dict(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_make_file_instance() {
        let template = FileTemplate::from_dict(&json!({
            "name": "test_file_100k",
            "path_template": "{catalogs_dir}/test/{project}_{selection}_100k.hdf5",
        }))
        .unwrap();

        let bindings = json!({"catalogs_dir": "/data", "project": "ci_test", "selection": "gold"});
        let instance = template
            .make_file_instance("test", bindings.as_object().unwrap())
            .unwrap();
        assert_eq!(instance.path(), "/data/test/ci_test_gold_100k.hdf5");
    }

    #[test]
    fn test_declared_interpolants_are_enforced() {
        let err = FileTemplate::from_dict(&json!({
            "name": "bad",
            "path_template": "{project_dir}/{flavor}/{mystery}.hdf5",
            "interpolants": ["flavor"],
        }))
        .unwrap_err();

        match err {
            AppError::InvalidConfiguration { violations, .. } => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].contains("'mystery'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_instance_with_placeholder_is_rejected() {
        let result = FileInstance::from_dict(&json!({"name": "x", "path": "/data/{flavor}.pq"}));
        assert!(matches!(result, Err(AppError::InvalidConfiguration { .. })));
    }

    #[test]
    fn test_check_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("present.hdf5");
        std::fs::write(&path, b"x").unwrap();

        let present = FileInstance {
            name: "present".to_string(),
            path: path.to_string_lossy().to_string(),
        };
        let absent = FileInstance {
            name: "absent".to_string(),
            path: temp_dir.path().join("absent.hdf5").to_string_lossy().to_string(),
        };
        assert!(present.check_file());
        assert!(!absent.check_file());
    }

    #[test]
    fn test_entry_round_trip() {
        let raw = json!({"name": "t", "path_template": "{root}/t.pq", "interpolants": []});
        let entry = FileEntry::from_tagged("FileTemplate", &raw).unwrap();
        assert_eq!(entry.tag(), "FileTemplate");
        assert_eq!(entry.to_dict().unwrap(), raw);
    }
}

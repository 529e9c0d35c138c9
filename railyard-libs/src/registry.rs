//! Component registries
//!
//! One [`Registry`] per configuration category keeps the components of that
//! category by name, in load order. Entries are tagged sum types: the tag
//! key of each configuration block selects the constructor.

use crate::error::AppError;
use crate::Result;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info};

/// A component that can live in a [`Registry`].
pub trait RegistryEntry: Clone + fmt::Debug {
    /// Build the entry for a tag from its raw option map.
    fn from_tagged(tag: &str, raw: &Value) -> Result<Self>;

    /// Tag this entry is written back under.
    fn tag(&self) -> &'static str;

    fn name(&self) -> &str;

    /// Raw option map, as accepted by [`RegistryEntry::from_tagged`].
    fn to_dict(&self) -> Result<Value>;
}

/// Registry of named components for one category
#[derive(Debug, Clone)]
pub struct Registry<E> {
    category: &'static str,
    tags: &'static [&'static str],
    entries: IndexMap<String, E>,
}

impl<E: RegistryEntry> Registry<E> {
    /// Create an empty registry accepting the given tags
    pub fn new(category: &'static str, tags: &'static [&'static str]) -> Self {
        Self {
            category,
            tags,
            entries: IndexMap::new(),
        }
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn tags(&self) -> &'static [&'static str] {
        self.tags
    }

    /// Load a list of tagged blocks, e.g.
    ///
    /// ```yaml
    /// - CatalogTemplate:
    ///     name: truth
    ///     path_template: "{catalogs_dir}/{project}/{healpix}/part-0.parquet"
    ///     iteration_vars: ['healpix']
    /// ```
    ///
    /// Loads are cumulative. Nothing is registered unless every block is
    /// valid. Returns the number of entries added.
    ///
    /// # Errors
    ///
    /// * `AppError::ConfigError` if the value is not a list of single-tag blocks
    ///   or a tag does not belong to this category
    /// * `AppError::InvalidConfiguration` if a block fails validation
    /// * `AppError::DuplicateComponent` if a name is already registered
    pub fn load(&mut self, items: &Value) -> Result<usize> {
        let Some(items) = items.as_array() else {
            return Err(AppError::ConfigError(format!(
                "{} must be a list of tagged blocks",
                self.category
            )));
        };

        let mut staged: IndexMap<String, E> = IndexMap::new();
        for item in items {
            let block = item.as_object().filter(|map| map.len() == 1);
            let Some((tag, raw)) = block.and_then(|map| map.iter().next()) else {
                return Err(AppError::ConfigError(format!(
                    "Each {} entry must be a single block tagged with one of {:?}",
                    self.category, self.tags
                )));
            };

            if !self.tags.contains(&tag.as_str()) {
                return Err(AppError::ConfigError(format!(
                    "Expecting one of {:?} in {}, not '{}'",
                    self.tags, self.category, tag
                )));
            }

            let entry = E::from_tagged(tag, raw)?;
            let name = entry.name().to_string();
            if self.entries.contains_key(&name) || staged.contains_key(&name) {
                return Err(AppError::DuplicateComponent {
                    category: self.category.to_string(),
                    name,
                });
            }
            staged.insert(name, entry);
        }

        let added = staged.len();
        self.entries.extend(staged);
        debug!("Loaded {} entries into {}", added, self.category);
        Ok(added)
    }

    /// Register an entry
    ///
    /// # Arguments
    ///
    /// * `entry` - Entry to register
    /// * `replace` - Overwrite an existing entry with the same name
    ///
    /// # Returns
    ///
    /// * `Ok(())` if registered successfully
    /// * `Err(AppError::DuplicateComponent)` if the name exists and `replace` is false
    pub fn add(&mut self, entry: E, replace: bool) -> Result<()> {
        let name = entry.name().to_string();

        if self.entries.contains_key(&name) {
            if !replace {
                return Err(AppError::DuplicateComponent {
                    category: self.category.to_string(),
                    name,
                });
            }
            info!("Replacing {} '{}'", self.category, name);
        }

        self.entries.insert(name, entry);
        Ok(())
    }

    /// Get an entry by name
    ///
    /// # Errors
    ///
    /// * `AppError::UnknownComponent` with the closest registered names
    pub fn get(&self, name: &str) -> Result<&E> {
        self.entries
            .get(name)
            .ok_or_else(|| AppError::UnknownComponent {
                category: self.category.to_string(),
                name: name.to_string(),
                suggestions: closest_names(name, self.entries.keys()),
            })
    }

    /// Get an entry by name and narrow it to one variant.
    ///
    /// An entry of another variant is reported as unknown under `kind`.
    pub fn get_as<'a, T>(
        &'a self,
        kind: &str,
        name: &str,
        pick: impl Fn(&'a E) -> Option<&'a T>,
    ) -> Result<&'a T> {
        match self.entries.get(name).and_then(&pick) {
            Some(value) => Ok(value),
            None => Err(AppError::UnknownComponent {
                category: kind.to_string(),
                name: name.to_string(),
                suggestions: closest_names(
                    name,
                    self.entries
                        .iter()
                        .filter(|(_, entry)| pick(*entry).is_some())
                        .map(|(key, _)| key),
                ),
            }),
        }
    }

    /// All entries of one variant, in load order.
    pub fn iter_as<'a, T: 'a>(
        &'a self,
        pick: impl Fn(&'a E) -> Option<&'a T> + 'a,
    ) -> impl Iterator<Item = &'a T> + 'a {
        self.entries.values().filter_map(pick)
    }

    pub fn find(&self, name: &str) -> Option<&E> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }

    /// Remove every entry
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Serialize back to the list-of-tagged-blocks shape `load` accepts.
    pub fn to_dict(&self) -> Result<Value> {
        let mut items = Vec::with_capacity(self.entries.len());
        for entry in self.entries.values() {
            let mut block = Map::new();
            block.insert(entry.tag().to_string(), entry.to_dict()?);
            items.push(Value::Object(block));
        }
        Ok(Value::Array(items))
    }

    /// One line per entry, for inspection output.
    pub fn summary(&self) -> String {
        let mut out = format!("{}: {} entries\n", self.category, self.entries.len());
        for entry in self.entries.values() {
            out.push_str(&format!("  {} ({})\n", entry.name(), entry.tag()));
        }
        out
    }
}

/// Up to three candidates within edit distance 3 of `name`, closest first.
pub fn closest_names<'a, I, S>(name: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a S>,
    S: AsRef<str> + 'a + ?Sized,
{
    let mut scored: Vec<(usize, String)> = candidates
        .into_iter()
        .map(|candidate| {
            let candidate = candidate.as_ref();
            (strsim::levenshtein(name, candidate), candidate.to_string())
        })
        .filter(|(distance, _)| *distance <= 3)
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(3).map(|(_, name)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    enum Shape {
        Circle { name: String, radius: i64 },
        Square { name: String, side: i64 },
    }

    impl RegistryEntry for Shape {
        fn from_tagged(tag: &str, raw: &Value) -> Result<Self> {
            let name = raw["name"].as_str().unwrap_or_default().to_string();
            match tag {
                "Circle" => Ok(Shape::Circle {
                    name,
                    radius: raw["radius"].as_i64().unwrap_or_default(),
                }),
                "Square" => Ok(Shape::Square {
                    name,
                    side: raw["side"].as_i64().unwrap_or_default(),
                }),
                other => Err(AppError::ConfigError(other.to_string())),
            }
        }

        fn tag(&self) -> &'static str {
            match self {
                Shape::Circle { .. } => "Circle",
                Shape::Square { .. } => "Square",
            }
        }

        fn name(&self) -> &str {
            match self {
                Shape::Circle { name, .. } | Shape::Square { name, .. } => name,
            }
        }

        fn to_dict(&self) -> Result<Value> {
            Ok(match self {
                Shape::Circle { name, radius } => json!({"name": name, "radius": radius}),
                Shape::Square { name, side } => json!({"name": name, "side": side}),
            })
        }
    }

    fn create_test_registry() -> Registry<Shape> {
        let mut registry = Registry::new("Shapes", &["Circle", "Square"]);
        registry
            .load(&json!([
                {"Circle": {"name": "small", "radius": 1}},
                {"Square": {"name": "box", "side": 4}},
                {"Circle": {"name": "large", "radius": 9}},
            ]))
            .unwrap();
        registry
    }

    #[test]
    fn test_load_dispatches_on_tag() {
        let registry = create_test_registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["small", "box", "large"]);
        assert_eq!(
            registry.get("box").unwrap(),
            &Shape::Square {
                name: "box".to_string(),
                side: 4
            }
        );
    }

    #[test]
    fn test_load_rejects_foreign_tag() {
        let mut registry: Registry<Shape> = Registry::new("Shapes", &["Circle", "Square"]);
        let err = registry
            .load(&json!([{"Triangle": {"name": "t"}}]))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = registry
            .load(&json!([{"Circle": {"name": "a"}, "Square": {"name": "b"}}]))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_failed_load_registers_nothing() {
        let mut registry = create_test_registry();
        let err = registry
            .load(&json!([
                {"Square": {"name": "tile", "side": 2}},
                {"Circle": {"name": "dot", "radius": 0}},
                {"Circle": {"name": "dot", "radius": 1}},
            ]))
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateComponent { .. }));

        let err = registry
            .load(&json!([
                {"Square": {"name": "tile", "side": 2}},
                {"Hexagon": {"name": "hex"}},
            ]))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert_eq!(registry.names(), vec!["small", "box", "large"]);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = create_test_registry();
        let replacement = Shape::Circle {
            name: "small".to_string(),
            radius: 2,
        };

        let err = registry.add(replacement.clone(), false).unwrap_err();
        assert!(matches!(err, AppError::DuplicateComponent { .. }));

        registry.add(replacement.clone(), true).unwrap();
        assert_eq!(registry.get("small").unwrap(), &replacement);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_unknown_name_suggests_closest() {
        let registry = create_test_registry();
        match registry.get("smal").unwrap_err() {
            AppError::UnknownComponent {
                category,
                name,
                suggestions,
            } => {
                assert_eq!(category, "Shapes");
                assert_eq!(name, "smal");
                assert_eq!(suggestions, vec!["small".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_get_as_narrows_variant() {
        let registry = create_test_registry();
        let radius = registry
            .get_as("Circle", "large", |entry| match entry {
                Shape::Circle { radius, .. } => Some(radius),
                _ => None,
            })
            .unwrap();
        assert_eq!(*radius, 9);

        let err = registry
            .get_as("Circle", "box", |entry| match entry {
                Shape::Circle { radius, .. } => Some(radius),
                _ => None,
            })
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownComponent { .. }));
    }

    #[test]
    fn test_round_trip_through_to_dict() {
        let registry = create_test_registry();
        let dumped = registry.to_dict().unwrap();

        let mut reloaded: Registry<Shape> = Registry::new("Shapes", &["Circle", "Square"]);
        reloaded.load(&dumped).unwrap();

        assert_eq!(reloaded.names(), registry.names());
        for entry in registry.iter() {
            let other = reloaded.get(entry.name()).unwrap();
            assert_eq!(other.to_dict().unwrap(), entry.to_dict().unwrap());
        }
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut registry = create_test_registry();
        registry.reset();
        assert!(registry.is_empty());
        registry.reset();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_closest_names_limits_and_orders() {
        let candidates = ["truth", "truth_v2", "reduced", "degraded"];
        assert_eq!(closest_names("trth", candidates.iter()), vec!["truth".to_string()]);

        let candidates = ["pz_a", "pz_b", "pz_c", "pz_d"];
        let found = closest_names("pz_", candidates.iter());
        assert_eq!(found, vec!["pz_a", "pz_b", "pz_c"]);
    }
}

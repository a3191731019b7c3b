//! The class registry: an ordered, de-duplicated name <-> index table.
//!
//! YOLO label lines store only an integer, so the registry is the one piece
//! of state a batch shares across files. It is a `classes.txt` in memory:
//! line order defines the index.
//!
//! One registry is shared by `&` across every YOLO call of a batch, across
//! threads too. Lookups take a shared lock; only [`ClassRegistry::index_of`]
//! on a name it has not seen before takes the exclusive lock, so insertions
//! are serialized and never overlap a read.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;

use crate::error::{LabelError, Location, MEMORY_ORIGIN};

#[derive(Debug, Default, Clone)]
struct Table {
    names: Vec<String>,
    index_by_name: HashMap<String, usize>,
    dirty: bool,
}

/// Ordered set of unique class names with stable indices.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    table: RwLock<Table>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from names in index order.
    ///
    /// Duplicate names keep their first index. The result is not dirty.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Table::default();
        for name in names {
            let name = name.into();
            if !table.index_by_name.contains_key(&name) {
                table.index_by_name.insert(name.clone(), table.names.len());
                table.names.push(name);
            }
        }
        Self {
            table: RwLock::new(table),
        }
    }

    /// Parses a `classes.txt` list: one name per line, trimmed.
    ///
    /// Trailing blank lines are ignored; a blank line between names would
    /// shift every later index and is rejected.
    pub fn from_classes_txt(text: &str, origin: &str) -> Result<Self, LabelError> {
        let lines: Vec<&str> = text.trim_end().lines().collect();
        let mut names = Vec::with_capacity(lines.len());
        for (line_idx, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return Err(LabelError::ClassListInvalid {
                    origin: origin.to_string(),
                    message: format!("line {} is empty", line_idx + 1),
                });
            }
            if names.contains(&trimmed) {
                return Err(LabelError::ClassListInvalid {
                    origin: origin.to_string(),
                    message: format!("line {} repeats class '{}'", line_idx + 1, trimmed),
                });
            }
            names.push(trimmed);
        }
        Ok(Self::from_names(names))
    }

    /// Reads the `names:` key of an Ultralytics `data.yaml`.
    ///
    /// Both the sequence form and the `index: name` mapping are accepted.
    /// Gaps in a mapping are rejected since they would make indices drift.
    pub fn from_data_yaml(text: &str, origin: &str) -> Result<Self, LabelError> {
        let parsed: DataYaml =
            serde_yaml::from_str(text).map_err(|source| LabelError::DataYamlParse {
                origin: origin.to_string(),
                source,
            })?;

        let names = match parsed.names {
            DataYamlNames::Sequence(names) => names,
            DataYamlNames::Mapping(mapping) => {
                let mut names = Vec::with_capacity(mapping.len());
                for (expected, (index, name)) in mapping.into_iter().enumerate() {
                    if index != expected {
                        return Err(LabelError::ClassListInvalid {
                            origin: origin.to_string(),
                            message: format!("names mapping skips index {}", expected),
                        });
                    }
                    names.push(name);
                }
                names
            }
        };

        Ok(Self::from_names(names))
    }

    /// Renders the registry as `classes.txt` text.
    pub fn to_classes_txt(&self) -> String {
        let table = self.read();
        let mut out = String::new();
        for name in &table.names {
            out.push_str(name);
            out.push('\n');
        }
        out
    }

    /// Index of `name`, appending it at the next index on first use.
    pub fn index_of(&self, name: &str) -> usize {
        if let Some(index) = self.read().index_by_name.get(name) {
            return *index;
        }

        let mut table = self.write();
        // Another writer may have inserted between the two locks.
        if let Some(index) = table.index_by_name.get(name) {
            return *index;
        }
        let index = table.names.len();
        table.names.push(name.to_string());
        table.index_by_name.insert(name.to_string(), index);
        table.dirty = true;
        log::debug!("class registry: '{}' assigned index {}", name, index);
        index
    }

    /// Index of `name` without inserting it.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.read().index_by_name.get(name).copied()
    }

    /// Name at `index`.
    ///
    /// Fails with [`LabelError::UnknownClassIndex`] when `index` is negative
    /// or past the end. The error carries no file context; callers re-anchor
    /// it with [`LabelError::at`].
    pub fn name_at(&self, index: i64) -> Result<String, LabelError> {
        let table = self.read();
        usize::try_from(index)
            .ok()
            .and_then(|idx| table.names.get(idx))
            .cloned()
            .ok_or_else(|| LabelError::UnknownClassIndex {
                origin: MEMORY_ORIGIN.to_string(),
                location: Location::Document,
                index,
                class_count: table.names.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all names in index order.
    pub fn names(&self) -> Vec<String> {
        self.read().names.clone()
    }

    /// True if names were appended since construction or the last
    /// [`mark_persisted`](Self::mark_persisted).
    pub fn is_dirty(&self) -> bool {
        self.read().dirty
    }

    pub fn mark_persisted(&self) {
        self.write().dirty = false;
    }

    // Writers never leave the table half-updated, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for ClassRegistry {
    fn clone(&self) -> Self {
        Self {
            table: RwLock::new(self.read().clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

//! Deterministic ordering and id stamping.
//!
//! Works on catalog JSON rather than typed entries so that files written by
//! older runs (or carrying extra fields) keep everything they had.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::info;

use crate::error::{CatalogError, Result};
use crate::store::{read_catalog, write_catalog};

const IMAGES_KEY: &str = "images";

/// The two catalog shapes the sorter understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Catalog {
    /// A single entry sequence: a bare array, or the `images` of a family
    /// catalog whose remaining fields are kept in `header`.
    Flat { header: Option<Map<String, Value>>, entries: Vec<Value> },
    /// An object with one entry sequence per family key, next to header fields.
    Keyed(Map<String, Value>),
}

impl Catalog {
    /// Keyed when the object holds any of `family_keys`; a family catalog
    /// when it holds an `images` array. Anything else is rejected so that
    /// nothing gets written back.
    pub fn from_value(value: Value, family_keys: &[String]) -> Result<Self> {
        match value {
            Value::Array(entries) => Ok(Catalog::Flat { header: None, entries }),
            Value::Object(map) if family_keys.iter().any(|k| map.contains_key(k)) => {
                Ok(Catalog::Keyed(map))
            }
            Value::Object(mut map) => match map.get_mut(IMAGES_KEY).map(Value::take) {
                Some(Value::Array(entries)) => Ok(Catalog::Flat { header: Some(map), entries }),
                _ => Err(CatalogError::UnsupportedShape),
            },
            _ => Err(CatalogError::UnsupportedShape),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Catalog::Flat { header: None, entries } => Value::Array(entries),
            Catalog::Flat { header: Some(mut map), entries } => {
                // `images` kept its slot; replacing in place preserves key order
                match map.get_mut(IMAGES_KEY) {
                    Some(slot) => *slot = Value::Array(entries),
                    None => {
                        map.insert(IMAGES_KEY.to_string(), Value::Array(entries));
                    }
                }
                Value::Object(map)
            }
            Catalog::Keyed(map) => Value::Object(map),
        }
    }

    /// Sort every sequence by case-folded name and stamp 1-based ids.
    /// Returns the number of entries stamped.
    pub fn assign_ids(&mut self) -> Result<usize> {
        match self {
            Catalog::Flat { entries, .. } => assign_sequence(IMAGES_KEY, entries),
            Catalog::Keyed(map) => {
                let mut total = 0;
                for (key, value) in map.iter_mut() {
                    if let Value::Array(entries) = value {
                        total += assign_sequence(key, entries)?;
                    }
                }
                Ok(total)
            }
        }
    }
}

/// Stable sort on the lowercased `name`, then `id` = rank, as the first field.
fn assign_sequence(label: &str, entries: &mut Vec<Value>) -> Result<usize> {
    for (index, entry) in entries.iter().enumerate() {
        if name_of(entry).is_none() {
            return Err(CatalogError::InvalidEntry { sequence: label.to_string(), index });
        }
    }
    entries.sort_by_cached_key(|e| name_of(e).map(str::to_lowercase).unwrap_or_default());
    for (rank, entry) in entries.iter_mut().enumerate() {
        if let Value::Object(fields) = entry.take() {
            let mut stamped = Map::with_capacity(fields.len() + 1);
            stamped.insert("id".to_string(), Value::from(rank as u64 + 1));
            stamped.extend(fields.into_iter().filter(|(k, _)| k != "id"));
            *entry = Value::Object(stamped);
        }
    }
    Ok(entries.len())
}

fn name_of(entry: &Value) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}

/// Sort and stamp a catalog value of either shape.
pub fn assign_ids(value: Value, family_keys: &[String]) -> Result<Value> {
    let mut catalog = Catalog::from_value(value, family_keys)?;
    catalog.assign_ids()?;
    Ok(catalog.into_value())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutcome {
    Stamped { entries: usize },
    /// The file was missing or empty.
    Skipped,
}

/// Rewrite a catalog file in place with sorted, stamped entries. Nothing is
/// written when the file cannot be parsed.
pub fn assign_ids_file(path: &Path, family_keys: &[String]) -> Result<SortOutcome> {
    let Some(value) = read_catalog::<Value>(path)? else {
        return Ok(SortOutcome::Skipped);
    };
    let mut catalog = Catalog::from_value(value, family_keys)?;
    let entries = catalog.assign_ids()?;
    write_catalog(path, &catalog.into_value())?;
    info!(file = %path.display(), entries, "stamped ids");
    Ok(SortOutcome::Stamped { entries })
}

//! Combining family catalogs into the unified catalog.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::{PipelineConfig, UrlProperties, SCHEMA_VERSION};
use crate::entry::CatalogEntry;
use crate::error::{CatalogError, Result};
use crate::family::{now_rfc3339, FamilyCatalog};
use crate::store::read_catalog;

const HEADER_KEYS: [&str; 4] = ["schema_version", "description", "last_update", "url_properties"];

/// Header fields followed by one key per family, in family order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnifiedCatalog {
    pub schema_version: String,
    pub description: String,
    pub last_update: String,
    pub url_properties: UrlProperties,
    pub families: Vec<(String, Vec<CatalogEntry>)>,
}

impl UnifiedCatalog {
    pub fn family(&self, name: &str) -> Option<&[CatalogEntry]> {
        self.families.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }

    pub fn entry_count(&self) -> usize {
        self.families.iter().map(|(_, v)| v.len()).sum()
    }
}

impl Serialize for UnifiedCatalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(HEADER_KEYS.len() + self.families.len()))?;
        map.serialize_entry("schema_version", &self.schema_version)?;
        map.serialize_entry("description", &self.description)?;
        map.serialize_entry("last_update", &self.last_update)?;
        map.serialize_entry("url_properties", &self.url_properties)?;
        for (name, images) in &self.families {
            map.serialize_entry(name, images)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct RawUnified {
    #[serde(default)]
    schema_version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    last_update: String,
    #[serde(default)]
    url_properties: UrlProperties,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Header fields are optional; every other key holding an array is a family.
impl<'de> Deserialize<'de> for UnifiedCatalog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawUnified::deserialize(deserializer)?;
        let mut families = Vec::new();
        for (name, value) in raw.rest {
            if !value.is_array() {
                continue;
            }
            let images: Vec<CatalogEntry> = serde_json::from_value(value)
                .map_err(|e| D::Error::custom(format!("family {name}: {e}")))?;
            families.push((name, images));
        }
        Ok(UnifiedCatalog {
            schema_version: raw.schema_version,
            description: raw.description,
            last_update: raw.last_update,
            url_properties: raw.url_properties,
            families,
        })
    }
}

/// Merge family catalogs. Declared families come first in declared order;
/// any others follow in the order given. Catalogs repeating a family name
/// are joined with [`concat`] first.
///
/// The first non-empty `url_properties` is kept. A later family with
/// different, non-empty properties fails the merge unless
/// `allow_divergent_url_properties` is set, in which case it is only logged.
pub fn merge(catalogs: Vec<(String, FamilyCatalog)>, cfg: &PipelineConfig) -> Result<UnifiedCatalog> {
    let mut pending: Vec<Option<(String, FamilyCatalog)>> =
        group_by_family(catalogs).into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(pending.len());
    for declared in &cfg.families {
        for slot in pending.iter_mut() {
            if slot.as_ref().is_some_and(|(n, _)| *n == declared.name) {
                ordered.extend(slot.take());
            }
        }
    }
    for slot in pending.iter_mut() {
        if let Some((name, cat)) = slot.take() {
            warn!(family = %name, "merging undeclared family after declared ones");
            ordered.push((name, cat));
        }
    }

    let mut url_owner: Option<String> = None;
    let mut url_properties = UrlProperties::default();
    let mut newest: Option<(DateTime<FixedOffset>, String)> = None;
    let mut families = Vec::with_capacity(ordered.len());

    for (name, cat) in ordered {
        if !cat.url_properties.is_empty() {
            match &url_owner {
                None => {
                    url_owner = Some(name.clone());
                    url_properties = cat.url_properties.clone();
                }
                Some(first) if cat.url_properties != url_properties => {
                    if !cfg.allow_divergent_url_properties {
                        return Err(CatalogError::UrlPropertiesMismatch {
                            first: first.clone(),
                            family: name,
                        });
                    }
                    warn!(family = %name, first = %first, "divergent url_properties; keeping the first");
                }
                Some(_) => {}
            }
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(&cat.last_update) {
            if newest.as_ref().map_or(true, |(n, _)| ts > *n) {
                newest = Some((ts, cat.last_update.clone()));
            }
        }
        info!(family = %name, entries = cat.images.len(), "merged family");
        families.push((name, cat.images));
    }

    Ok(UnifiedCatalog {
        schema_version: SCHEMA_VERSION.to_string(),
        description: cfg.description.clone(),
        last_update: newest.map(|(_, s)| s).unwrap_or_else(now_rfc3339),
        url_properties,
        families,
    })
}

/// Load family catalog files and merge them. Missing or empty files are
/// skipped; invalid JSON aborts the merge.
pub fn merge_files(inputs: &[(String, PathBuf)], cfg: &PipelineConfig) -> Result<UnifiedCatalog> {
    let mut catalogs = Vec::with_capacity(inputs.len());
    for (family, path) in inputs {
        if let Some(cat) = read_catalog::<FamilyCatalog>(path)? {
            catalogs.push((family.clone(), cat));
        }
    }
    merge(catalogs, cfg)
}

/// One catalog per family name, in first-seen order; repeats are joined
/// with [`concat`] so every family key is emitted once.
fn group_by_family(catalogs: Vec<(String, FamilyCatalog)>) -> Vec<(String, FamilyCatalog)> {
    let mut grouped: Vec<(String, Vec<FamilyCatalog>)> = Vec::new();
    for (family, cat) in catalogs {
        match grouped.iter_mut().find(|(n, _)| *n == family) {
            Some((_, cats)) => cats.push(cat),
            None => grouped.push((family, vec![cat])),
        }
    }
    grouped
        .into_iter()
        .filter_map(|(family, cats)| concat(cats).map(|c| (family, c)))
        .collect()
}

/// Join catalogs of the same family from several trees: images appended in
/// order, header of the first, most recent `last_update`.
pub fn concat(catalogs: Vec<FamilyCatalog>) -> Option<FamilyCatalog> {
    let mut iter = catalogs.into_iter();
    let mut out = iter.next()?;
    for cat in iter {
        let newer = match (
            DateTime::parse_from_rfc3339(&cat.last_update),
            DateTime::parse_from_rfc3339(&out.last_update),
        ) {
            (Ok(a), Ok(b)) => a > b,
            (Ok(_), Err(_)) => true,
            _ => false,
        };
        if newer {
            out.last_update = cat.last_update;
        }
        out.images.extend(cat.images);
    }
    Some(out)
}

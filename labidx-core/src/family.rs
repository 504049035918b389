use serde::{Deserialize, Serialize};

use crate::config::{FamilyConfig, UrlProperties, SCHEMA_VERSION};
use crate::entry::CatalogEntry;

/// The catalog of one family, as written to `index.<tag>.<family>.json`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FamilyCatalog {
    pub schema_version: String,
    pub description: String,
    pub last_update: String,
    #[serde(default)]
    pub url_properties: UrlProperties,
    pub images: Vec<CatalogEntry>,
}

impl FamilyCatalog {
    pub fn total_size(&self) -> u64 {
        self.images.iter().map(|e| e.metadata.total_size).sum()
    }
}

/// Wrap `entries` with schema metadata. Entries keep their scan order; ids
/// are stamped later by the sort pass.
pub fn assemble(entries: Vec<CatalogEntry>, family: &FamilyConfig) -> FamilyCatalog {
    FamilyCatalog {
        schema_version: SCHEMA_VERSION.to_string(),
        description: family.description.clone(),
        last_update: now_rfc3339(),
        url_properties: family.url_properties.clone(),
        images: entries,
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

//! Duplicate name / content-hash audit of a unified catalog.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::entry::CatalogEntry;
use crate::error::{CatalogError, Result};
use crate::merge::UnifiedCatalog;
use crate::store::read_catalog;

/// Findings for one family. Maps hold only values seen more than once.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FamilyDuplicates {
    /// Keyed by the first-seen spelling; names compare case-insensitively.
    pub duplicate_names: BTreeMap<String, usize>,
    pub duplicate_md5: BTreeMap<String, usize>,
    pub duplicate_sha1: BTreeMap<String, usize>,
    /// Files whose checksum is unresolved (empty), reported separately from
    /// genuine hash collisions.
    pub unresolved_md5: usize,
    pub unresolved_sha1: usize,
}

impl FamilyDuplicates {
    pub fn has_duplicates(&self) -> bool {
        !self.duplicate_names.is_empty()
            || !self.duplicate_md5.is_empty()
            || !self.duplicate_sha1.is_empty()
    }
}

/// Family name → findings, in the order families were audited.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DuplicateReport {
    pub families: Vec<(String, FamilyDuplicates)>,
}

impl Serialize for DuplicateReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.families.len()))?;
        for (name, findings) in &self.families {
            map.serialize_entry(name, findings)?;
        }
        map.end()
    }
}

impl DuplicateReport {
    pub fn is_clean(&self) -> bool {
        self.families.iter().all(|(_, d)| !d.has_duplicates())
    }

    pub fn family(&self, name: &str) -> Option<&FamilyDuplicates> {
        self.families.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }
}

/// Audit the listed families of `catalog`; families it lacks are skipped.
pub fn detect(catalog: &UnifiedCatalog, families: &[String]) -> DuplicateReport {
    let mut report = DuplicateReport::default();
    for name in families {
        let Some(entries) = catalog.family(name) else {
            debug!(family = %name, "family absent from catalog; skipped");
            continue;
        };
        report.families.push((name.clone(), detect_family(entries)));
    }
    report
}

pub fn detect_family(entries: &[CatalogEntry]) -> FamilyDuplicates {
    let mut tally = Tally::default();
    for entry in entries {
        tally.add(
            &entry.name,
            entry.files.iter().map(|f| (f.checksum.md5.as_str(), f.checksum.sha1.as_str())),
        );
    }
    tally.finish()
}

/// Counters for one family; names are keyed by their lowercase form.
#[derive(Default)]
struct Tally {
    // lowercase name -> (first spelling, count)
    names: HashMap<String, (String, usize)>,
    md5: HashMap<String, usize>,
    sha1: HashMap<String, usize>,
    unresolved_md5: usize,
    unresolved_sha1: usize,
}

impl Tally {
    fn add<'a>(&mut self, name: &str, checksums: impl Iterator<Item = (&'a str, &'a str)>) {
        self.names
            .entry(name.to_lowercase())
            .or_insert_with(|| (name.to_string(), 0))
            .1 += 1;
        for (md5, sha1) in checksums {
            count(&mut self.md5, &mut self.unresolved_md5, md5);
            count(&mut self.sha1, &mut self.unresolved_sha1, sha1);
        }
    }

    fn finish(self) -> FamilyDuplicates {
        FamilyDuplicates {
            duplicate_names: self.names.into_values().filter(|(_, n)| *n > 1).collect(),
            duplicate_md5: repeated(self.md5),
            duplicate_sha1: repeated(self.sha1),
            unresolved_md5: self.unresolved_md5,
            unresolved_sha1: self.unresolved_sha1,
        }
    }
}

fn count(seen: &mut HashMap<String, usize>, unresolved: &mut usize, hash: &str) {
    if hash.is_empty() {
        *unresolved += 1;
    } else {
        *seen.entry(hash.to_string()).or_default() += 1;
    }
}

fn repeated(counts: HashMap<String, usize>) -> BTreeMap<String, usize> {
    counts.into_iter().filter(|(_, n)| *n > 1).collect()
}

/// The fields the audit reads. Everything else in a catalog entry is
/// ignored, so hand-edited or older catalogs audit as well as fresh ones.
#[derive(Deserialize)]
struct AuditEntry {
    name: String,
    #[serde(default)]
    files: Vec<AuditFile>,
}

#[derive(Deserialize)]
struct AuditFile {
    #[serde(default)]
    checksum: AuditChecksum,
}

#[derive(Deserialize, Default)]
struct AuditChecksum {
    #[serde(default)]
    md5: String,
    #[serde(default)]
    sha1: String,
}

/// Load a unified catalog file and audit it. `None` when the file is
/// missing or empty. Only `name` and `files[].checksum` are read.
pub fn detect_file(path: &Path, families: &[String]) -> Result<Option<DuplicateReport>> {
    let Some(value) = read_catalog::<Value>(path)? else {
        return Ok(None);
    };
    let Value::Object(mut map) = value else {
        return Err(CatalogError::UnsupportedShape);
    };
    let mut report = DuplicateReport::default();
    for name in families {
        let Some(images @ Value::Array(_)) = map.remove(name) else {
            debug!(family = %name, "family absent from catalog; skipped");
            continue;
        };
        let entries: Vec<AuditEntry> = serde_json::from_value(images)
            .map_err(|source| CatalogError::CatalogParse { path: path.to_path_buf(), source })?;
        let mut tally = Tally::default();
        for entry in &entries {
            tally.add(
                &entry.name,
                entry.files.iter().map(|f| (f.checksum.md5.as_str(), f.checksum.sha1.as_str())),
            );
        }
        report.families.push((name.clone(), tally.finish()));
    }
    Ok(Some(report))
}

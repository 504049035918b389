use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checksum::ChecksumSet;
use crate::config::{FamilyConfig, FileType, LinkStyle, PipelineConfig};
use crate::error::{CatalogError, Result};
use crate::paths::{encode_path, human_size, join_url_path, rel_path};
use crate::scan::RawAsset;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Checksum {
    pub md5: String,
    pub sha1: String,
}

/// One physical file of an asset.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub size: u64,
    pub human_size: String,
    pub file_type: FileType,
    pub extension: String,
    pub checksum: Checksum,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EntryMetadata {
    pub install_path: String,
    pub total_size: u64,
    pub total_human_size: String,
}

/// One logical asset. `id` is absent until the sort pass stamps it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(rename = "type")]
    pub family: String,
    pub format: String,
    pub files: Vec<FileRecord>,
    pub metadata: EntryMetadata,
}

impl CatalogEntry {
    pub fn new(
        name: impl Into<String>,
        family: impl Into<String>,
        format: impl Into<String>,
        install_path: impl Into<String>,
        files: Vec<FileRecord>,
    ) -> Self {
        let mut entry = Self {
            id: None,
            name: name.into(),
            family: family.into(),
            format: format.into(),
            files,
            metadata: EntryMetadata {
                install_path: install_path.into(),
                total_size: 0,
                total_human_size: String::new(),
            },
        };
        entry.recompute_totals();
        entry
    }

    /// Re-derive `total_size` and `total_human_size` from the file list.
    pub fn recompute_totals(&mut self) {
        let total: u64 = self.files.iter().map(|f| f.size).sum();
        self.metadata.total_size = total;
        self.metadata.total_human_size = human_size(total);
    }
}

/// Turns raw assets into catalog entries for one family.
pub struct EntryBuilder<'a> {
    cfg: &'a PipelineConfig,
    family: &'a FamilyConfig,
    root: &'a Path,
    checksums: &'a ChecksumSet,
    /// `protocol://host` of the primary mirror, for `url` links.
    origin: String,
    prefix: String,
    remote_dir: String,
}

impl<'a> EntryBuilder<'a> {
    pub fn new(
        cfg: &'a PipelineConfig,
        family: &'a FamilyConfig,
        root: &'a Path,
        checksums: &'a ChecksumSet,
    ) -> Result<Self> {
        let props = &family.url_properties;
        let host = props.hostnames.get(&family.primary_mirror);
        let prefix = props.prefixes.get(&family.primary_mirror).cloned().unwrap_or_default();
        let origin = match (family.link_style, host) {
            (LinkStyle::Url, Some(host)) => format!("{}://{}", props.protocol, host),
            (LinkStyle::Url, None) => {
                return Err(CatalogError::Config {
                    path: root.to_path_buf(),
                    message: format!(
                        "family {}: primary mirror {:?} has no hostname",
                        family.name, family.primary_mirror
                    ),
                })
            }
            (LinkStyle::Path, _) => String::new(),
        };
        Ok(Self {
            cfg,
            family,
            root,
            checksums,
            origin,
            prefix,
            remote_dir: encode_path(&family.remote_dir),
        })
    }

    pub fn build(&self, raw: &RawAsset) -> Result<CatalogEntry> {
        let mut files = Vec::with_capacity(raw.files().len());
        for path in raw.files() {
            files.push(self.file_record(path)?);
        }
        let entry = CatalogEntry::new(
            raw.name(),
            self.family.name.as_str(),
            raw.format(),
            self.family.install_path_for(raw.name()),
            files,
        );
        debug!(name = %entry.name, files = entry.files.len(), size = entry.metadata.total_size, "built entry");
        Ok(entry)
    }

    fn file_record(&self, path: &Path) -> Result<FileRecord> {
        let meta = fs::metadata(path)
            .map_err(|source| CatalogError::Asset { path: path.to_path_buf(), source })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rel = rel_path(self.root, path);
        let (extension, file_type) = self.cfg.classify(&filename);
        let mirror_path = join_url_path(&[&self.remote_dir, &encode_path(&rel)]);
        let (path_field, url_field) = match self.family.link_style {
            LinkStyle::Path => (Some(mirror_path), None),
            LinkStyle::Url => {
                let full = join_url_path(&["/", &self.prefix, &mirror_path]);
                (None, Some(format!("{}{}", self.origin, full)))
            }
        };
        Ok(FileRecord {
            filename,
            path: path_field,
            url: url_field,
            size: meta.len(),
            human_size: human_size(meta.len()),
            file_type,
            extension,
            checksum: Checksum {
                md5: self.checksums.md5.lookup(&rel).to_string(),
                sha1: self.checksums.sha1.lookup(&rel).to_string(),
            },
        })
    }
}

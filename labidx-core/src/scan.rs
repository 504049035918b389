//! Directory walk and asset grouping.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{matching_suffix, FamilyConfig, Layout};
use crate::error::{CatalogError, Result};
use crate::paths::rel_path;

/// A scanner-identified unit before enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawAsset {
    /// A directory holding at least one set-marker file; every file in it
    /// belongs to the asset.
    DirectorySet { name: String, marker: String, dir: PathBuf, files: Vec<PathBuf> },
    /// A standalone archive in a directory without set markers.
    SingleFile { name: String, format: String, file: PathBuf },
    /// A file of a flat (ungrouped) family.
    FlatFile { name: String, format: String, file: PathBuf },
}

impl RawAsset {
    pub fn name(&self) -> &str {
        match self {
            RawAsset::DirectorySet { name, .. }
            | RawAsset::SingleFile { name, .. }
            | RawAsset::FlatFile { name, .. } => name,
        }
    }

    /// The extension that classified this asset.
    pub fn format(&self) -> &str {
        match self {
            RawAsset::DirectorySet { marker, .. } => marker,
            RawAsset::SingleFile { format, .. } | RawAsset::FlatFile { format, .. } => format,
        }
    }

    /// Constituent files in scan order.
    pub fn files(&self) -> &[PathBuf] {
        match self {
            RawAsset::DirectorySet { files, .. } => files,
            RawAsset::SingleFile { file, .. } | RawAsset::FlatFile { file, .. } => {
                std::slice::from_ref(file)
            }
        }
    }
}

pub struct Scanner<'a> {
    root: PathBuf,
    family: &'a FamilyConfig,
    exclude: GlobSet,
}

impl<'a> Scanner<'a> {
    pub fn new(root: impl Into<PathBuf>, family: &'a FamilyConfig) -> Result<Self> {
        let root = root.into();
        let exclude = build_exclude(&family.exclude).map_err(|e| CatalogError::Config {
            path: root.clone(),
            message: format!("family {}: bad exclude pattern: {e}", family.name),
        })?;
        Ok(Self { root, family, exclude })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the family root depth-first, top-down, and group files into raw
    /// assets. Directory order within a level is the filesystem's.
    pub fn scan(&self) -> Result<Vec<RawAsset>> {
        let mut assets = Vec::new();
        let limit = self.family.truncate.unwrap_or(usize::MAX);
        if limit == 0 {
            return Ok(assets);
        }

        let mut walker = WalkDir::new(&self.root).follow_links(self.family.follow_links);
        if let Some(depth) = self.family.max_depth {
            // `max_depth` counts file depth; directories sit one level above
            if depth == 0 {
                return Ok(assets);
            }
            walker = walker.max_depth(depth - 1);
        }

        for ent in walker {
            let ent = ent.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                CatalogError::Scan { path, source }
            })?;
            if !ent.file_type().is_dir() {
                continue;
            }
            let files = self.list_files(ent.path())?;
            if files.is_empty() {
                continue;
            }
            debug!(dir = %ent.path().display(), files = files.len(), "scanning directory");
            self.group(ent.path(), files, &mut assets, limit);
            if assets.len() >= limit {
                debug!(limit, "truncation limit reached");
                break;
            }
        }
        Ok(assets)
    }

    /// Regular files directly inside `dir`, minus excluded ones.
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let scan_err = |source| CatalogError::Scan { path: dir.to_path_buf(), source };
        let mut files = Vec::new();
        for ent in fs::read_dir(dir).map_err(scan_err)? {
            let ent = ent.map_err(scan_err)?;
            let path = ent.path();
            let is_file = match ent.file_type() {
                Ok(ft) if ft.is_file() => true,
                Ok(ft) if ft.is_symlink() && self.family.follow_links => {
                    fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false)
                }
                Ok(_) => false,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                    false
                }
            };
            if is_file && !self.is_excluded(&path) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let rel = rel_path(&self.root, path);
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        self.exclude.is_match(&rel) || self.exclude.is_match(name.as_ref())
    }

    fn group(&self, dir: &Path, files: Vec<PathBuf>, out: &mut Vec<RawAsset>, limit: usize) {
        match &self.family.layout {
            Layout::Grouped { set_markers, archives } => {
                let marker = files
                    .iter()
                    .find_map(|f| matching_suffix(&file_name(f), set_markers).map(str::to_string));
                if let Some(marker) = marker {
                    out.push(RawAsset::DirectorySet {
                        name: dir_name(dir),
                        marker,
                        dir: dir.to_path_buf(),
                        files,
                    });
                    return;
                }
                for file in files {
                    if out.len() >= limit {
                        return;
                    }
                    let fname = file_name(&file);
                    if let Some(ext) = matching_suffix(&fname, archives) {
                        out.push(RawAsset::SingleFile {
                            name: fname[..fname.len() - ext.len()].to_string(),
                            format: fname[fname.len() - ext.len()..].to_string(),
                            file,
                        });
                    }
                }
            }
            Layout::Flat { extensions } => {
                for file in files {
                    if out.len() >= limit {
                        return;
                    }
                    let fname = file_name(&file);
                    if let Some(ext) = matching_suffix(&fname, extensions) {
                        out.push(RawAsset::FlatFile {
                            format: fname[fname.len() - ext.len()..].to_string(),
                            name: fname,
                            file,
                        });
                    }
                }
            }
        }
    }
}

/// Scan `root` with the given family's layout.
pub fn scan(root: &Path, family: &FamilyConfig) -> Result<Vec<RawAsset>> {
    Scanner::new(root, family)?.scan()
}

fn build_exclude(patterns: &[String]) -> std::result::Result<GlobSet, globset::Error> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        b.add(Glob::new(p)?);
    }
    b.build()
}

fn file_name(p: &Path) -> String {
    p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn dir_name(p: &Path) -> String {
    match p.file_name() {
        Some(n) => n.to_string_lossy().into_owned(),
        None => p.to_string_lossy().into_owned(),
    }
}

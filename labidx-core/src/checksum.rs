//! Lookup of precomputed content hashes.
//!
//! Manifests are the `md5sum`/`sha1sum` style text files written next to the
//! assets by an external process: `<hash>  <relative path>` per line. They
//! are indexed once into a map; nothing here ever reads asset bytes.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::FamilyConfig;
use crate::paths::normalize_separators;

/// Separator between the hash and path columns.
const COLUMN_SEP: &str = "  ";

#[derive(Debug, Clone, Default)]
pub struct ChecksumManifest {
    by_path: HashMap<String, String>,
}

impl ChecksumManifest {
    /// Load a manifest file. A missing or unreadable file yields an empty
    /// manifest, so every lookup resolves to `""`.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(manifest = %path.display(), "checksum manifest missing; checksums left unresolved");
                Self::default()
            }
            Err(e) => {
                warn!(manifest = %path.display(), error = %e, "checksum manifest unreadable; checksums left unresolved");
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut by_path = HashMap::new();
        let mut skipped = 0usize;
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let Some((hash, path)) = line.split_once(COLUMN_SEP) else {
                skipped += 1;
                continue;
            };
            let hash = hash.trim();
            let path = normalize_key(path);
            if hash.is_empty() || path.is_empty() {
                skipped += 1;
                continue;
            }
            // later lines win, matching a re-run appended to the same file
            by_path.insert(path, hash.to_string());
        }
        if skipped > 0 {
            debug!(skipped, "malformed checksum manifest lines ignored");
        }
        Self { by_path }
    }

    /// Hash for `rel_path`, or `""` when unresolved.
    pub fn lookup(&self, rel_path: &str) -> &str {
        self.by_path.get(&normalize_key(rel_path)).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// Strip the binary-mode `*`, a leading `./` and normalize separators.
fn normalize_key(p: &str) -> String {
    let p = p.strip_prefix('*').unwrap_or(p);
    let p = normalize_separators(p);
    match p.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => p,
    }
}

/// Both manifests of one family, loaded once and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct ChecksumSet {
    pub md5: ChecksumManifest,
    pub sha1: ChecksumManifest,
}

impl ChecksumSet {
    pub fn load(root: &Path, family: &FamilyConfig) -> Self {
        Self {
            md5: ChecksumManifest::load(&root.join(&family.md5_manifest)),
            sha1: ChecksumManifest::load(&root.join(&family.sha1_manifest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_skips_malformed_lines() {
        let m = ChecksumManifest::parse(
            "d41d8cd98f00b204e9800998ecf8427e  ./disk1/a.qcow2\n\
             \n\
             garbage-without-separator\n\
             0cc175b9c0f1b6a831c399e269772661  *disk1\\b.qcow2\r\n",
        );
        assert_eq!(m.len(), 2);
        assert_eq!(m.lookup("disk1/a.qcow2"), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(m.lookup("disk1\\b.qcow2"), "0cc175b9c0f1b6a831c399e269772661");
        assert_eq!(m.lookup("disk1/c.qcow2"), "");
    }

    #[test]
    fn paths_with_spaces_keep_their_tail() {
        let m = ChecksumManifest::parse("abc  dir/with  two spaces.bin\n");
        assert_eq!(m.lookup("dir/with  two spaces.bin"), "abc");
    }
}

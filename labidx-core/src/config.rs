//! Immutable pipeline configuration.
//!
//! Everything the scanner, entry builder and assembler need that is not
//! derived from the filesystem lives here: family layouts, mirror tables,
//! install paths, the extension table. A `PipelineConfig` is built once and
//! handed around by reference.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

pub const SCHEMA_VERSION: &str = "1.0";

/// Environment variable consulted when no `--config` path is given.
pub const CONFIG_ENV: &str = "LABIDX_CONFIG";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Disk,
    Template,
    Document,
    Archive,
    Script,
    Image,
    Firmware,
    Other,
}

/// How download locations are written into file records.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkStyle {
    /// Fully qualified `url` for the family's primary mirror.
    #[default]
    Url,
    /// Mirror-relative `path`; clients resolve it through `url_properties`.
    Path,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct UrlProperties {
    pub protocol: String,
    pub hostnames: BTreeMap<String, String>,
    pub prefixes: BTreeMap<String, String>,
}

impl UrlProperties {
    pub fn is_empty(&self) -> bool {
        self.protocol.is_empty() && self.hostnames.is_empty() && self.prefixes.is_empty()
    }
}

/// How a family's tree is grouped into assets.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layout {
    /// Directories holding a set-marker file become one asset; elsewhere each
    /// standalone archive is its own asset.
    Grouped { set_markers: Vec<String>, archives: Vec<String> },
    /// Every file with a listed extension is its own asset.
    Flat { extensions: Vec<String> },
}

impl Default for Layout {
    fn default() -> Self {
        Layout::Flat { extensions: Vec::new() }
    }
}

/// Fields missing from a configuration file take the values of
/// `FamilyConfig::default()`: the standard manifest names and exclude list,
/// `url` links through the `main` mirror. `url_properties` has no default
/// and must be given for `url` links.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct FamilyConfig {
    pub name: String,
    pub description: String,
    /// Scan root, relative to `PipelineConfig::base_dir` unless absolute.
    pub root: PathBuf,
    /// Location of the family under every mirror prefix, e.g. `addons/qemu`.
    pub remote_dir: String,
    pub layout: Layout,
    /// `{name}` is replaced with the entry name.
    pub install_path: String,
    pub link_style: LinkStyle,
    /// Key into `url_properties.hostnames` / `prefixes` used for `url` links.
    pub primary_mirror: String,
    pub url_properties: UrlProperties,
    /// Checksum manifests, relative to the family root.
    pub md5_manifest: PathBuf,
    pub sha1_manifest: PathBuf,
    /// Glob patterns matched against root-relative paths and file names.
    pub exclude: Vec<String>,
    pub max_depth: Option<usize>,
    pub follow_links: bool,
    pub truncate: Option<usize>,
}

impl Default for FamilyConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            root: PathBuf::new(),
            remote_dir: String::new(),
            layout: Layout::default(),
            install_path: String::new(),
            link_style: LinkStyle::Url,
            primary_mirror: "main".to_string(),
            url_properties: UrlProperties::default(),
            md5_manifest: PathBuf::from("md5sum.txt"),
            sha1_manifest: PathBuf::from("sha1sum.txt"),
            exclude: ["*.json", "md5sum.txt", "sha1sum.txt", "*.py"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_depth: None,
            follow_links: false,
            truncate: None,
        }
    }
}

impl FamilyConfig {
    pub fn install_path_for(&self, name: &str) -> String {
        self.install_path.replace("{name}", name)
    }

    /// Lowercased family name, used in output file names.
    pub fn slug(&self) -> String {
        self.name.to_lowercase()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MirrorRule {
    pub from: String,
    pub to: String,
}

/// One alternate-mirror catalog flavour.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MirrorVariant {
    pub name: String,
    /// Output tag substituted for `PipelineConfig::output_tag` in file names.
    pub file_tag: String,
    pub rules: Vec<MirrorRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PipelineConfig {
    pub description: String,
    pub base_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Tag used in output names: `index.<tag>.json`, `index.<tag>.<family>.json`.
    pub output_tag: String,
    /// Declared family order; also the key order of the unified catalog.
    pub families: Vec<FamilyConfig>,
    /// Extension (with leading dot, lowercase) to file type.
    pub file_types: BTreeMap<String, FileType>,
    pub mirrors: Vec<MirrorVariant>,
    pub allow_divergent_url_properties: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let file_types = [
            (".qcow2", FileType::Disk),
            (".img", FileType::Disk),
            (".vmdk", FileType::Disk),
            (".iso", FileType::Disk),
            (".yml", FileType::Template),
            (".yaml", FileType::Template),
            (".txt", FileType::Document),
            (".md", FileType::Document),
            (".tar.gz", FileType::Archive),
            (".tgz", FileType::Archive),
            (".zip", FileType::Archive),
            (".py", FileType::Script),
            (".sh", FileType::Script),
            (".png", FileType::Image),
            (".bin", FileType::Firmware),
            (".image", FileType::Firmware),
        ]
        .into_iter()
        .map(|(ext, t)| (ext.to_string(), t))
        .collect();

        Self {
            description: "Network emulation image catalog".to_string(),
            base_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            output_tag: "od".to_string(),
            families: vec![
                default_family(
                    "QEMU",
                    "addons/qemu",
                    Layout::Grouped {
                        set_markers: vec![".qcow2".into()],
                        archives: vec![".tgz".into(), ".tar.gz".into(), ".zip".into()],
                    },
                    "/opt/unetlab/addons/qemu/{name}",
                ),
                default_family(
                    "IOL",
                    "addons/iol/bin",
                    Layout::Flat { extensions: vec![".bin".into()] },
                    "/opt/unetlab/addons/iol/bin/{name}",
                ),
                default_family(
                    "DYNAMIPS",
                    "addons/dynamips",
                    Layout::Flat { extensions: vec![".image".into()] },
                    "/opt/unetlab/addons/dynamips/",
                ),
            ],
            file_types,
            mirrors: vec![MirrorVariant {
                name: "drive".to_string(),
                file_tag: "gd".to_string(),
                rules: vec![MirrorRule {
                    from: "labhub.eu.org/api/raw/?path=/".to_string(),
                    to: "drive.labhub.eu.org/0:/".to_string(),
                }],
            }],
            allow_divergent_url_properties: false,
        }
    }
}

fn default_family(name: &str, root: &str, layout: Layout, install_path: &str) -> FamilyConfig {
    let flat = matches!(layout, Layout::Flat { .. });
    let mut hostnames = BTreeMap::new();
    hostnames.insert("main".to_string(), "labhub.eu.org".to_string());
    hostnames.insert("drive".to_string(), "drive.labhub.eu.org".to_string());
    let mut prefixes = BTreeMap::new();
    prefixes.insert("main".to_string(), "/api/raw/?path=/".to_string());
    prefixes.insert("drive".to_string(), "/0:/".to_string());

    FamilyConfig {
        name: name.to_string(),
        description: format!("{name} images"),
        root: PathBuf::from(root),
        remote_dir: root.to_string(),
        layout,
        install_path: install_path.to_string(),
        url_properties: UrlProperties {
            protocol: "https".to_string(),
            hostnames,
            prefixes,
        },
        max_depth: if flat { Some(1) } else { None },
        ..FamilyConfig::default()
    }
}

impl PipelineConfig {
    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| CatalogError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_reader(std::io::BufReader::new(f)).map_err(|e| CatalogError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// `explicit`, else `$LABIDX_CONFIG`, else built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load(p);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(p) if !p.is_empty() => Self::load(Path::new(&p)),
            _ => Ok(Self::default()),
        }
    }

    pub fn family(&self, name: &str) -> Result<&FamilyConfig> {
        self.families
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| CatalogError::UnknownFamily(name.to_string()))
    }

    pub fn family_names(&self) -> Vec<String> {
        self.families.iter().map(|f| f.name.clone()).collect()
    }

    pub fn family_root(&self, family: &FamilyConfig) -> PathBuf {
        if family.root.is_absolute() {
            family.root.clone()
        } else {
            self.base_dir.join(&family.root)
        }
    }

    pub fn unified_catalog_path(&self) -> PathBuf {
        self.output_dir.join(format!("index.{}.json", self.output_tag))
    }

    pub fn family_catalog_path(&self, family: &FamilyConfig) -> PathBuf {
        self.output_dir
            .join(format!("index.{}.{}.json", self.output_tag, family.slug()))
    }

    /// Classify a file name: the longest matching table extension wins.
    /// Returns the extension as it appears in the name and its type; names
    /// with no table match fall back to their last extension and `Other`.
    pub fn classify(&self, file_name: &str) -> (String, FileType) {
        let best = self
            .file_types
            .iter()
            .filter(|(ext, _)| has_suffix_ci(file_name, ext))
            .max_by_key(|(ext, _)| ext.len());
        match best {
            Some((ext, t)) => (file_name[file_name.len() - ext.len()..].to_string(), *t),
            None => {
                let ext = Path::new(file_name)
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                (ext, FileType::Other)
            }
        }
    }
}

/// ASCII case-insensitive suffix test that never splits a UTF-8 sequence.
pub fn has_suffix_ci(name: &str, suffix: &str) -> bool {
    if suffix.is_empty() || name.len() < suffix.len() {
        return false;
    }
    let cut = name.len() - suffix.len();
    name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(suffix)
}

/// The first of `suffixes` that `name` ends with, preferring the longest.
pub fn matching_suffix<'a>(name: &str, suffixes: &'a [String]) -> Option<&'a str> {
    suffixes
        .iter()
        .filter(|s| has_suffix_ci(name, s))
        .max_by_key(|s| s.len())
        .map(String::as_str)
}

//! End-to-end run: scan → build → assemble per family (in parallel), then
//! merge → ids → mirrors → duplicate audit.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::checksum::ChecksumSet;
use crate::config::{FamilyConfig, PipelineConfig};
use crate::dupes::{self, DuplicateReport};
use crate::entry::{CatalogEntry, EntryBuilder};
use crate::error::{CatalogError, Result};
use crate::family::{assemble, FamilyCatalog};
use crate::merge::{merge, UnifiedCatalog};
use crate::mirror;
use crate::paths::human_size;
use crate::progress::Progress;
use crate::scan::Scanner;
use crate::sort;
use crate::store::write_catalog;

/// A family catalog together with what was dropped while building it.
#[derive(Debug, Clone)]
pub struct FamilyRun {
    pub catalog: FamilyCatalog,
    pub skipped_assets: usize,
}

/// Scan one family root and build its (unsorted) catalog. Unreadable
/// directories fail the family; files that vanish mid-scan skip their asset.
pub fn index_family(
    cfg: &PipelineConfig,
    family: &FamilyConfig,
    root: &Path,
    progress: &Progress,
) -> Result<FamilyRun> {
    let raw = Scanner::new(root, family)?.scan()?;
    progress.add_assets_total(raw.len());
    info!(family = %family.name, assets = raw.len(), "scan complete");

    let checksums = ChecksumSet::load(root, family);
    let builder = EntryBuilder::new(cfg, family, root, &checksums)?;
    let built: Vec<Option<CatalogEntry>> = raw
        .par_iter()
        .map(|asset| {
            let res = builder.build(asset);
            progress.inc_asset();
            match res {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(family = %family.name, asset = %asset.name(), error = %e, "skipping asset");
                    None
                }
            }
        })
        .collect();

    let skipped_assets = built.iter().filter(|e| e.is_none()).count();
    let entries: Vec<CatalogEntry> = built.into_iter().flatten().collect();
    Ok(FamilyRun { catalog: assemble(entries, family), skipped_assets })
}

/// Per-format counts and sizes of one family catalog.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilySummary {
    pub family: String,
    pub entries: usize,
    pub total_size: u64,
    pub total_human_size: String,
    pub by_format: BTreeMap<String, usize>,
    pub skipped_assets: usize,
    pub output: Option<PathBuf>,
}

pub fn summarize(family: &str, catalog: &FamilyCatalog) -> FamilySummary {
    let mut by_format = BTreeMap::new();
    for e in &catalog.images {
        *by_format.entry(e.format.to_lowercase()).or_insert(0) += 1;
    }
    let total = catalog.total_size();
    FamilySummary {
        family: family.to_string(),
        entries: catalog.images.len(),
        total_size: total,
        total_human_size: human_size(total),
        by_format,
        skipped_assets: 0,
        output: None,
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Index,
    Merge,
    Sort,
    Mirror,
    Audit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Index => "index",
            Stage::Merge => "merge",
            Stage::Sort => "sort",
            Stage::Mirror => "mirror",
            Stage::Audit => "audit",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub target: String,
    pub error: String,
}

/// Everything a reporting layer needs to render a run.
#[derive(Serialize, Debug, Clone, Default)]
pub struct PipelineReport {
    pub families: Vec<FamilySummary>,
    pub unified: Option<PathBuf>,
    pub mirrors: Vec<PathBuf>,
    pub duplicates: Option<DuplicateReport>,
    pub failures: Vec<StageFailure>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, stage: Stage, target: impl Into<String>, err: &CatalogError) {
        let target = target.into();
        warn!(%stage, %target, error = %err, "stage failed");
        self.failures.push(StageFailure { stage, target, error: err.to_string() });
    }
}

/// Sort, stamp and write one catalog.
fn write_sorted<T: Serialize>(path: &Path, catalog: &T, family_keys: &[String]) -> Result<Value> {
    let value = sort::assign_ids(serde_json::to_value(catalog)?, family_keys)?;
    write_catalog(path, &value)?;
    Ok(value)
}

/// Run the whole pipeline for every configured family. Failures are
/// recorded in the report; a failed family is left out of the merge.
pub fn run(cfg: &PipelineConfig, progress: &Progress) -> PipelineReport {
    let mut report = PipelineReport::default();
    let family_keys = cfg.family_names();

    progress.set_stage("Indexing");
    progress.set_families_total(cfg.families.len());
    progress.start();

    let runs: Vec<(&FamilyConfig, Result<(FamilyRun, PathBuf)>)> = cfg
        .families
        .par_iter()
        .map(|family| {
            let root = cfg.family_root(family);
            let res = index_family(cfg, family, &root, progress).and_then(|run| {
                let out = cfg.family_catalog_path(family);
                write_sorted(&out, &run.catalog, &family_keys)?;
                Ok((run, out))
            });
            progress.inc_family();
            (family, res)
        })
        .collect();
    progress.stop();

    let mut catalogs = Vec::new();
    let mut written = Vec::new();
    for (family, res) in runs {
        match res {
            Ok((run, out)) => {
                let mut summary = summarize(&family.name, &run.catalog);
                summary.skipped_assets = run.skipped_assets;
                summary.output = Some(out.clone());
                report.families.push(summary);
                written.push(out);
                catalogs.push((family.name.clone(), run.catalog));
            }
            Err(e) => report.fail(Stage::Index, &family.name, &e),
        }
    }

    progress.set_stage("Merging");
    let unified_path = cfg.unified_catalog_path();
    let unified = match merge(catalogs, cfg) {
        Ok(u) => u,
        Err(e) => {
            report.fail(Stage::Merge, unified_path.display().to_string(), &e);
            return report;
        }
    };
    let sorted = match write_sorted(&unified_path, &unified, &family_keys) {
        Ok(v) => v,
        Err(e) => {
            report.fail(Stage::Sort, unified_path.display().to_string(), &e);
            return report;
        }
    };
    report.unified = Some(unified_path.clone());
    written.push(unified_path.clone());

    progress.set_stage("Mirrors");
    for variant in &cfg.mirrors {
        for input in &written {
            match mirror::rewrite_file(input, &cfg.output_tag, variant) {
                Ok(Some(out)) => report.mirrors.push(out),
                Ok(None) => {}
                Err(e) => report.fail(Stage::Mirror, input.display().to_string(), &e),
            }
        }
    }

    progress.set_stage("Auditing");
    match serde_json::from_value::<UnifiedCatalog>(sorted) {
        Ok(stamped) => {
            let dupes = dupes::detect(&stamped, &family_keys);
            if !dupes.is_clean() {
                warn!("duplicates found in unified catalog");
            }
            report.duplicates = Some(dupes);
        }
        Err(e) => report.fail(Stage::Audit, unified_path.display().to_string(), &CatalogError::from(e)),
    }

    info!(
        families = report.families.len(),
        failures = report.failures.len(),
        mirrors = report.mirrors.len(),
        "pipeline finished"
    );
    report
}

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use labidx_core::config::PipelineConfig;
use labidx_core::dupes::{self, DuplicateReport};
use labidx_core::family::FamilyCatalog;
use labidx_core::merge::merge_files;
use labidx_core::pipeline::{self, FamilySummary, PipelineReport};
use labidx_core::progress::Progress;
use labidx_core::sort::{self, SortOutcome};
use labidx_core::store::{read_catalog, to_pretty_json, write_catalog};
use labidx_core::mirror;

#[derive(Parser)]
#[command(name = "labidx", version, about = "Lab image catalog builder")]
struct Cli {
    /// Configuration file (JSON); falls back to $LABIDX_CONFIG, then built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Scan one family and write its catalog
    Index {
        #[arg(long)] family: String,
        #[arg(long)] root: Option<PathBuf>,
        #[arg(long)] output: Option<PathBuf>,
        /// Keep only the first N assets (for trial runs)
        #[arg(long)] truncate: Option<usize>,
    },
    /// Run the whole pipeline: index every family, merge, sort, mirror, audit
    Build {
        #[arg(long)] out: Option<PathBuf>,
        #[arg(long, default_value_t = false)] progress: bool,
    },
    /// Merge family catalogs (FAMILY=PATH, or PATH named index.<tag>.<family>.json)
    Merge {
        #[arg(long)] out: PathBuf,
        #[arg(required = true)] catalogs: Vec<String>,
    },
    /// Sort entries and stamp ids in place
    Sort {
        #[arg(required = true)] files: Vec<PathBuf>,
    },
    /// Write mirror variants of catalog files
    Mirror {
        #[arg(required = true)] files: Vec<PathBuf>,
    },
    /// Report duplicate names and checksums in a unified catalog
    Dupes {
        file: PathBuf,
        #[arg(long, default_value_t = false)] json: bool,
    },
    /// Per-format counts and total size of a family catalog
    Summary { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = PipelineConfig::resolve(cli.config.as_deref()).context("loading configuration")?;
    match cli.cmd {
        Cmd::Index { family, root, output, truncate } => index(&cfg, &family, root, output, truncate)?,
        Cmd::Build { out, progress } => build(cfg, out, progress)?,
        Cmd::Merge { out, catalogs } => merge(&cfg, &out, &catalogs)?,
        Cmd::Sort { files } => sort_files(&cfg, &files)?,
        Cmd::Mirror { files } => mirror_files(&cfg, &files)?,
        Cmd::Dupes { file, json } => audit(&cfg, &file, json)?,
        Cmd::Summary { file } => summary(&file)?,
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose { 0 => "warn", 1 => "info", _ => "debug" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn index(cfg: &PipelineConfig, family: &str, root: Option<PathBuf>, output: Option<PathBuf>, truncate: Option<usize>) -> Result<()> {
    let mut fam = cfg.family(family)?.clone();
    if truncate.is_some() { fam.truncate = truncate; }
    let root = root.unwrap_or_else(|| cfg.family_root(&fam));
    let output = output.unwrap_or_else(|| cfg.family_catalog_path(&fam));

    let run = pipeline::index_family(cfg, &fam, &root, &Progress::new(false))
        .with_context(|| format!("indexing {} under {}", fam.name, root.display()))?;
    write_catalog(&output, &run.catalog).with_context(|| format!("writing {}", output.display()))?;

    let mut s = pipeline::summarize(&fam.name, &run.catalog);
    s.skipped_assets = run.skipped_assets;
    s.output = Some(output);
    print_summary(&s);
    Ok(())
}

fn build(mut cfg: PipelineConfig, out: Option<PathBuf>, show_progress: bool) -> Result<()> {
    if let Some(dir) = out { cfg.output_dir = dir; }
    let report = pipeline::run(&cfg, &Progress::new(show_progress));
    print_report(&report);
    if !report.is_success() {
        bail!("{} stage(s) failed", report.failures.len());
    }
    Ok(())
}

fn merge(cfg: &PipelineConfig, out: &Path, catalogs: &[String]) -> Result<()> {
    let inputs = catalogs
        .iter()
        .map(|arg| parse_catalog_arg(cfg, arg))
        .collect::<Result<Vec<_>>>()?;
    let unified = merge_files(&inputs, cfg).context("merging catalogs")?;
    write_catalog(out, &unified).with_context(|| format!("writing {}", out.display()))?;
    println!("Merged {} famil(ies), {} entries -> {}", unified.families.len(), unified.entry_count(), out.display());
    Ok(())
}

/// `FAMILY=PATH`, or a bare path whose last dotted component before `.json`
/// names a configured family.
fn parse_catalog_arg(cfg: &PipelineConfig, arg: &str) -> Result<(String, PathBuf)> {
    let canonical = |name: &str| {
        cfg.families
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.name.clone())
    };
    if let Some((family, path)) = arg.split_once('=') {
        if !family.is_empty() && !path.is_empty() {
            return Ok((canonical(family).unwrap_or_else(|| family.to_string()), PathBuf::from(path)));
        }
    }
    let path = PathBuf::from(arg);
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let tail = stem.rsplit('.').next().unwrap_or_default();
    canonical(tail)
        .map(|family| (family, path.clone()))
        .ok_or_else(|| anyhow!("cannot tell the family of {}; pass it as FAMILY=PATH", path.display()))
}

fn sort_files(cfg: &PipelineConfig, files: &[PathBuf]) -> Result<()> {
    let keys = cfg.family_names();
    let mut failed = 0usize;
    for f in files {
        match sort::assign_ids_file(f, &keys) {
            Ok(SortOutcome::Stamped { entries }) => println!("{}: {} entries", f.display(), entries),
            Ok(SortOutcome::Skipped) => println!("{}: skipped (missing or empty)", f.display()),
            Err(e) => { error!(file = %f.display(), error = %e, "sort failed"); failed += 1; }
        }
    }
    if failed > 0 { bail!("{} of {} file(s) could not be sorted", failed, files.len()); }
    Ok(())
}

fn mirror_files(cfg: &PipelineConfig, files: &[PathBuf]) -> Result<()> {
    if cfg.mirrors.is_empty() { warn!("no mirror variants configured"); }
    let mut failed = 0usize;
    for f in files {
        for variant in &cfg.mirrors {
            match mirror::rewrite_file(f, &cfg.output_tag, variant) {
                Ok(Some(out)) => println!("{} -> {}", f.display(), out.display()),
                Ok(None) => println!("{}: skipped (missing or empty)", f.display()),
                Err(e) => { error!(file = %f.display(), variant = %variant.name, error = %e, "mirror failed"); failed += 1; }
            }
        }
    }
    if failed > 0 { bail!("{} mirror variant(s) could not be written", failed); }
    Ok(())
}

fn audit(cfg: &PipelineConfig, file: &Path, json: bool) -> Result<()> {
    let Some(report) = dupes::detect_file(file, &cfg.family_names())
        .with_context(|| format!("auditing {}", file.display()))?
    else {
        println!("{}: skipped (missing or empty)", file.display());
        return Ok(());
    };
    if json {
        let bytes = to_pretty_json(&report)?;
        print!("{}", String::from_utf8_lossy(&bytes));
    } else {
        print_duplicates(&report);
    }
    Ok(())
}

fn summary(file: &Path) -> Result<()> {
    let cat: FamilyCatalog = read_catalog(file)
        .with_context(|| format!("reading {}", file.display()))?
        .ok_or_else(|| anyhow!("{} is missing or empty", file.display()))?;
    let label = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    print_summary(&pipeline::summarize(&label, &cat));
    Ok(())
}

fn print_summary(s: &FamilySummary) {
    println!("{}: {} entries, {} ({} bytes)", s.family, s.entries, s.total_human_size, s.total_size);
    for (format, n) in &s.by_format {
        println!("  {:12} {:6}", format, n);
    }
    if s.skipped_assets > 0 { println!("  skipped assets: {}", s.skipped_assets); }
    if let Some(out) = &s.output { println!("  -> {}", out.display()); }
}

fn print_report(r: &PipelineReport) {
    for s in &r.families { print_summary(s); }
    if let Some(u) = &r.unified { println!("Unified catalog -> {}", u.display()); }
    for m in &r.mirrors { println!("Mirror -> {}", m.display()); }
    if let Some(d) = &r.duplicates { print_duplicates(d); }
    for f in &r.failures {
        println!("FAILED {} {}: {}", f.stage, f.target, f.error);
    }
}

fn print_duplicates(report: &DuplicateReport) {
    if report.is_clean() { println!("No duplicates"); }
    for (family, d) in &report.families {
        if !d.has_duplicates() && d.unresolved_md5 == 0 && d.unresolved_sha1 == 0 { continue; }
        println!("{}:", family);
        for (name, n) in &d.duplicate_names { println!("  name  {} x{}", name, n); }
        for (h, n) in &d.duplicate_md5 { println!("  md5   {} x{}", h, n); }
        for (h, n) in &d.duplicate_sha1 { println!("  sha1  {} x{}", h, n); }
        if d.unresolved_md5 > 0 || d.unresolved_sha1 > 0 {
            println!("  unresolved checksums: md5 {}, sha1 {}", d.unresolved_md5, d.unresolved_sha1);
        }
    }
}

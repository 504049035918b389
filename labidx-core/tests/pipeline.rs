use labidx_core::config::PipelineConfig;
use labidx_core::pipeline::{run, Stage};
use labidx_core::progress::Progress;
use labidx_core::store::read_catalog;
use serde_json::Value;
use std::fs;
use std::path::Path;

fn write(path: &Path, len: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, vec![1u8; len]).unwrap();
}

fn lab_tree(base: &Path) {
    write(&base.join("addons/qemu/vyos-1.4/virtioa.qcow2"), 2048);
    write(&base.join("addons/qemu/Router/hda.qcow2"), 100);
    write(&base.join("addons/qemu/extras/router.tgz"), 50);
    fs::write(
        base.join("addons/qemu/md5sum.txt"),
        "aaaa  vyos-1.4/virtioa.qcow2\naaaa  Router/hda.qcow2\n",
    )
    .unwrap();
    write(&base.join("addons/iol/bin/L2-ADVENTERPRISEK9.bin"), 10);
    write(&base.join("addons/dynamips/c7200.image"), 20);
}

fn config(base: &Path) -> PipelineConfig {
    PipelineConfig {
        base_dir: base.to_path_buf(),
        output_dir: base.join("out"),
        ..PipelineConfig::default()
    }
}

#[test]
fn full_run_writes_every_artifact() {
    let td = tempfile::tempdir().unwrap();
    lab_tree(td.path());
    let cfg = config(td.path());

    let report = run(&cfg, &Progress::new(false));
    assert!(report.is_success(), "{:?}", report.failures);
    assert_eq!(report.families.len(), 3);

    let out = td.path().join("out");
    for name in [
        "index.od.json",
        "index.gd.json",
        "index.od.qemu.json",
        "index.gd.qemu.json",
        "index.od.iol.json",
        "index.od.dynamips.json",
        "index.gd.dynamips.json",
    ] {
        assert!(out.join(name).is_file(), "missing {name}");
    }
    assert_eq!(report.mirrors.len(), 4);

    let unified: Value = read_catalog(&out.join("index.od.json")).unwrap().unwrap();
    let keys: Vec<_> = unified.as_object().unwrap().keys().cloned().collect();
    assert_eq!(
        keys,
        ["schema_version", "description", "last_update", "url_properties", "QEMU", "IOL", "DYNAMIPS"]
    );
    let qemu: Vec<_> = unified["QEMU"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["id"].as_u64().unwrap(), e["name"].as_str().unwrap().to_string()))
        .collect();
    // Router/router tie on the sort key; their relative order follows the walk
    assert_eq!(qemu.iter().map(|(id, _)| *id).collect::<Vec<_>>(), [1, 2, 3]);
    assert!(qemu[..2].iter().all(|(_, n)| n.eq_ignore_ascii_case("router")));
    assert_eq!(qemu[2].1, "vyos-1.4");
    assert_eq!(unified["IOL"][0]["id"], 1);
    assert_eq!(unified["DYNAMIPS"][0]["metadata"]["install_path"], "/opt/unetlab/addons/dynamips/");

    let drive: Value = read_catalog(&out.join("index.gd.json")).unwrap().unwrap();
    let url = drive["IOL"][0]["files"][0]["url"].as_str().unwrap();
    assert_eq!(url, "https://drive.labhub.eu.org/0:/addons/iol/bin/L2-ADVENTERPRISEK9.bin");

    let dupes = report.duplicates.as_ref().unwrap();
    let q = dupes.family("QEMU").unwrap();
    assert_eq!(q.duplicate_names.len(), 1);
    let (name, count) = q.duplicate_names.iter().next().unwrap();
    assert!(name.eq_ignore_ascii_case("router"));
    assert_eq!(*count, 2);
    assert_eq!(q.duplicate_md5.get("aaaa"), Some(&2));
    // router.tgz has no manifest line
    assert_eq!(q.unresolved_md5, 1);
    assert_eq!(q.unresolved_sha1, 3);

    let qs = report.families.iter().find(|s| s.family == "QEMU").unwrap();
    assert_eq!(qs.entries, 3);
    assert_eq!(qs.total_size, 2198);
    assert_eq!(qs.output.as_deref(), Some(out.join("index.od.qemu.json").as_path()));
}

#[test]
fn broken_family_is_left_out_of_the_merge() {
    let td = tempfile::tempdir().unwrap();
    lab_tree(td.path());
    fs::remove_dir_all(td.path().join("addons/dynamips")).unwrap();
    let cfg = config(td.path());

    let report = run(&cfg, &Progress::new(false));
    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, Stage::Index);
    assert_eq!(report.failures[0].target, "DYNAMIPS");

    let unified: Value = read_catalog(&td.path().join("out/index.od.json")).unwrap().unwrap();
    assert!(unified.get("QEMU").is_some());
    assert!(unified.get("DYNAMIPS").is_none());
}

#[test]
fn divergent_properties_stop_after_family_files() {
    let td = tempfile::tempdir().unwrap();
    lab_tree(td.path());
    let mut cfg = config(td.path());
    cfg.families[1].url_properties.protocol = "http".into();

    let report = run(&cfg, &Progress::new(false));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, Stage::Merge);
    assert!(report.unified.is_none());
    assert!(report.duplicates.is_none());
    assert!(td.path().join("out/index.od.iol.json").is_file());
    assert!(!td.path().join("out/index.od.json").exists());
}

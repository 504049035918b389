use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::process::Command;

fn labidx(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("labidx").unwrap();
    cmd.current_dir(dir).env_remove("LABIDX_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn lab_tree(td: &assert_fs::TempDir) {
    td.child("addons/qemu/vyos/vyos.qcow2").write_binary(&[0u8; 1024]).unwrap();
    td.child("addons/qemu/vyos/extra.qcow2").write_binary(&[0u8; 2048]).unwrap();
    td.child("addons/qemu/md5sum.txt")
        .write_str("0cc175b9c0f1b6a831c399e269772661  vyos/vyos.qcow2\n")
        .unwrap();
    td.child("addons/iol/bin/l3.bin").write_binary(&[0u8; 10]).unwrap();
    td.child("addons/dynamips/c3725.image").write_binary(&[0u8; 20]).unwrap();
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn build_writes_catalogs_and_mirrors() {
    let td = assert_fs::TempDir::new().unwrap();
    lab_tree(&td);

    labidx(td.path())
        .args(["build", "--out", "catalogs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("QEMU: 1 entries, 3.0 Ki (3072 bytes)"))
        .stdout(predicate::str::contains("No duplicates"));

    td.child("catalogs/index.od.json").assert(predicate::path::is_file());
    td.child("catalogs/index.gd.json").assert(predicate::path::is_file());
    td.child("catalogs/index.od.iol.json").assert(predicate::path::is_file());

    let unified = read_json(&td.path().join("catalogs/index.od.json"));
    assert_eq!(unified["QEMU"][0]["id"], 1);
    assert_eq!(unified["QEMU"][0]["metadata"]["total_human_size"], "3.0 Ki");
    let gd = read_json(&td.path().join("catalogs/index.gd.json"));
    assert!(gd["IOL"][0]["files"][0]["url"]
        .as_str()
        .unwrap()
        .starts_with("https://drive.labhub.eu.org/0:/addons/iol/bin/"));
}

#[test]
fn index_merge_sort_mirror_by_hand() {
    let td = assert_fs::TempDir::new().unwrap();
    lab_tree(&td);

    labidx(td.path())
        .args(["index", "--family", "QEMU", "--output", "q.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("QEMU: 1 entries"));
    labidx(td.path())
        .args(["index", "--family", "iol", "--root", "addons/iol/bin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown family"));
    labidx(td.path())
        .args(["index", "--family", "IOL", "--root", "addons/iol/bin"])
        .assert()
        .success();
    td.child("index.od.iol.json").assert(predicate::path::is_file());

    labidx(td.path())
        .args(["merge", "--out", "index.od.json", "QEMU=q.json", "index.od.iol.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 entries"));
    labidx(td.path())
        .args(["merge", "--out", "x.json", "q.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FAMILY=PATH"));

    let merged = read_json(&td.path().join("index.od.json"));
    assert!(merged["QEMU"][0].get("id").is_none());

    labidx(td.path())
        .args(["sort", "index.od.json", "missing.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("index.od.json: 2 entries"))
        .stdout(predicate::str::contains("missing.json: skipped"));
    let sorted = read_json(&td.path().join("index.od.json"));
    assert_eq!(sorted["QEMU"][0]["id"], 1);
    assert_eq!(sorted["IOL"][0]["id"], 1);

    labidx(td.path())
        .args(["mirror", "index.od.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("index.gd.json"));
    td.child("index.gd.json").assert(predicate::path::is_file());
}

#[test]
fn dupes_reports_without_failing() {
    let td = assert_fs::TempDir::new().unwrap();
    td.child("addons/qemu/Router/a.qcow2").write_binary(&[1u8; 4]).unwrap();
    td.child("addons/qemu/pack/router.zip").write_binary(&[1u8; 4]).unwrap();
    td.child("addons/iol/bin").create_dir_all().unwrap();
    td.child("addons/dynamips").create_dir_all().unwrap();
    labidx(td.path()).args(["build"]).assert().success();

    labidx(td.path())
        .args(["dupes", "index.od.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("QEMU:"))
        .stdout(predicate::str::contains("x2"));

    let out = labidx(td.path()).args(["dupes", "index.od.json", "--json"]).output().unwrap();
    assert!(out.status.success());
    let report: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["QEMU"]["unresolved_md5"], 2);
    assert_eq!(report["QEMU"]["duplicate_names"].as_object().unwrap().len(), 1);
}

#[test]
fn summary_and_bad_input() {
    let td = assert_fs::TempDir::new().unwrap();
    lab_tree(&td);
    labidx(td.path()).args(["index", "--family", "DYNAMIPS"]).assert().success();

    labidx(td.path())
        .args(["summary", "index.od.dynamips.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 entries, 20.0 (20 bytes)"))
        .stdout(predicate::str::contains(".image"));

    td.child("broken.json").write_str("{ nope").unwrap();
    labidx(td.path())
        .args(["sort", "broken.json"])
        .assert()
        .failure();
    td.child("broken.json").assert("{ nope");

    labidx(td.path())
        .args(["summary", "absent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing or empty"));
}

#[test]
fn config_file_overrides_defaults() {
    let td = assert_fs::TempDir::new().unwrap();
    td.child("fw/a.rom").write_binary(&[0u8; 8]).unwrap();
    td.child("labidx.json")
        .write_str(
            r#"{
    "output_tag": "main",
    "families": [{
        "name": "ROMS",
        "root": "fw",
        "layout": {"kind": "flat", "extensions": [".rom"]},
        "install_path": "/roms/{name}",
        "link_style": "path"
    }],
    "mirrors": []
}"#,
        )
        .unwrap();

    labidx(td.path())
        .args(["--config", "labidx.json", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ROMS: 1 entries"));
    let unified = read_json(&td.path().join("index.main.json"));
    assert_eq!(unified["ROMS"][0]["files"][0]["path"], "a.rom");
    assert_eq!(unified["ROMS"][0]["metadata"]["install_path"], "/roms/a.rom");
}

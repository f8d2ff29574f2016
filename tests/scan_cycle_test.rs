use image::{ImageFormat, RgbImage};
use serde_json::Value;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::tempdir;

const KEY: &str = "20230401-120000-NOAA19";
const META: &str = "CHAN_A=Channel A: 2 (near infrared)\n\
                    CHAN_B=Channel B: 4 (thermal infrared)\n\
                    GAIN=Gain: -3.5\n\
                    MAXELEV=67\n";

fn write_png(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_pixel(width, height, image::Rgb([30, 90, 150]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir images");
    fs::write(path, out.into_inner()).expect("write png");
}

fn write_pass(share: &Path, key: &str, meta: &str) {
    let meta_dir = share.join("meta/2023/04");
    fs::create_dir_all(&meta_dir).expect("mkdir meta");
    fs::write(meta_dir.join(format!("{key}.txt")), meta).expect("write meta");
    write_png(&share.join(format!("images/2023/04/{key}-RAW.png")), 80, 40);
}

fn index_cmd(home: &Path, share: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("noaa-index");
    cmd.current_dir(home)
        .env("NOAA_HOME", home)
        .env("NOAA_REMOTE_URI", share)
        .env("NOAA_CONFIG_PATH", home.join("absent.toml"))
        .env("NOAA_LOG", "warn");
    cmd
}

fn catalog(home: &Path) -> Vec<Value> {
    let raw = fs::read_to_string(home.join("db/passes.json")).expect("read catalog");
    serde_json::from_str(&raw).expect("parse catalog")
}

#[test]
fn scan_catalogs_pass_once_and_rescan_is_idempotent() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    let share = tmp.path().join("share");
    fs::create_dir_all(&home).expect("mkdir home");
    write_pass(&share, KEY, META);

    let output = index_cmd(&home, &share)
        .arg("scan")
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&output).expect("report json");
    assert_eq!(report["command"], "scan");
    assert_eq!(report["ok"], true);
    let details = report["details"].as_array().expect("details");
    assert!(details.iter().any(|d| d == "scan.cataloged=1"));

    let passes = catalog(&home);
    assert_eq!(passes.len(), 1);
    let pass = &passes[0];
    assert_eq!(pass["FileKey"], KEY);
    assert_eq!(pass["SatelliteName"], "NOAA19");
    assert_eq!(pass["Gain"], 3.5);
    assert_eq!(pass["MaxElevation"], 67);
    assert_eq!(pass["EndTime"], Value::Null);
    assert_eq!(pass["EnhancementTypes"], 31);
    assert_eq!(pass["ThumbnailEnhancementType"], "RAW");
    assert!(
        pass["ThumbnailUri"]
            .as_str()
            .expect("uri")
            .starts_with("data:image/jpeg;base64,")
    );

    index_cmd(&home, &share).arg("scan").assert().success();
    assert_eq!(catalog(&home).len(), 1);

    let audit = fs::read_to_string(home.join("logs/audit.log")).expect("audit log");
    let statuses = audit
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("audit line"))
        .map(|event| {
            format!(
                "{}:{}",
                event["phase"].as_str().unwrap_or(""),
                event["status"].as_str().unwrap_or("")
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(statuses, vec!["scan:ok", "scan:ok"]);
}

#[test]
fn invalid_metadata_is_skipped_without_failing_the_scan() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    let share = tmp.path().join("share");
    fs::create_dir_all(&home).expect("mkdir home");
    write_pass(&share, KEY, &META.replace("MAXELEV=67", "MAXELEV=abc"));
    write_pass(&share, "20230401-140000-NOAA18", META);

    index_cmd(&home, &share)
        .arg("scan")
        .assert()
        .success()
        .stdout(predicates::str::contains("scan.invalid_metadata=1"));

    let passes = catalog(&home);
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0]["FileKey"], "20230401-140000-NOAA18");
}

#[test]
fn passes_lists_catalog_filtered_by_site() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    let share = tmp.path().join("share");
    fs::create_dir_all(&home).expect("mkdir home");
    write_pass(&share.join("north"), KEY, META);
    write_pass(&share.join("south"), "20230401-140000-NOAA18", META);

    index_cmd(&home, &share)
        .env("NOAA_SITES", "north,south")
        .arg("scan")
        .assert()
        .success();
    assert_eq!(catalog(&home).len(), 2);

    index_cmd(&home, &share)
        .arg("passes")
        .arg("--site")
        .arg("south")
        .assert()
        .success()
        .stdout(predicates::str::contains("selected=1"))
        .stdout(predicates::str::contains("pass=20230401-140000-NOAA18 site=south"));
}

#[test]
fn unreadable_metadata_tree_aborts_scan_with_remote_code() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    fs::create_dir_all(&home).expect("mkdir home");
    let share = tmp.path().join("share");
    fs::create_dir_all(&share).expect("mkdir share");
    // A file where the metadata directory is expected makes the listing fail.
    fs::write(share.join("meta"), "not a directory").expect("write");

    index_cmd(&home, &share)
        .arg("scan")
        .assert()
        .code(2)
        .stdout(predicates::str::contains("E002_REMOTE_UNAVAILABLE"));
}

#[test]
fn broken_site_is_reported_while_later_sites_are_cataloged() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    let share = tmp.path().join("share");
    fs::create_dir_all(&home).expect("mkdir home");
    write_pass(&share.join("north"), KEY, META);
    fs::write(
        share.join(format!("north/images/2023/04/{KEY}-RAW.png")),
        "not a png",
    )
    .expect("corrupt raw");
    write_pass(&share.join("south"), "20230401-140000-NOAA18", META);

    index_cmd(&home, &share)
        .env("NOAA_SITES", "north,south")
        .arg("scan")
        .assert()
        .code(2)
        .stdout(predicates::str::contains("scan.cataloged=1"))
        .stdout(predicates::str::contains(
            "scan aborted for site north (E006_THUMBNAIL_DECODE)",
        ));

    let passes = catalog(&home);
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0]["FileKey"], "20230401-140000-NOAA18");

    let audit = fs::read_to_string(home.join("logs/audit.log")).expect("audit log");
    let event: Value = serde_json::from_str(audit.lines().last().expect("event")).expect("json");
    assert_eq!(event["status"], "error");
}

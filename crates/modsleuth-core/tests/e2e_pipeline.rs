/// End-to-end pipeline tests.
///
/// Every test builds real zip archives in a temporary mods folder, runs
/// complete passes through `Pipeline::run_pass` and checks the files a pass
/// leaves behind: the catalog manifests, the derived cache and the watcher
/// state. A stock directory holding only `pickup.zip` stands in for the
/// game's vehicle folder so the built-in reserved list does not apply.
use modsleuth_core::catalog::Catalog;
use modsleuth_core::pipeline::progress::PipelineEvent;
use modsleuth_core::{start_pass, Config, ErrorKind, Pipeline};
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Fixture {
    _tmp: TempDir,
    mods: PathBuf,
    config: Config,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let mods = tmp.path().join("mods");
        let stock = tmp.path().join("stock");
        let data = tmp.path().join("data");
        fs::create_dir_all(&mods).unwrap();
        fs::create_dir_all(&stock).unwrap();
        fs::create_dir_all(&data).unwrap();
        fs::write(stock.join("pickup.zip"), b"").unwrap();

        let mut config = Config::with_data_dir(&data);
        fs::write(&config.reserved_source, format!("{}\n", stock.display())).unwrap();
        config.roots = vec![mods.clone()];
        config.workers = 2;
        Self {
            _tmp: tmp,
            mods,
            config,
        }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.config.clone()).unwrap()
    }

    fn cache_file(&self, name: &str) -> PathBuf {
        self.config.cache_dir.join(name)
    }

    fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(16, 9, image::Rgb([40, 120, 200]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// `cars.zip`: one complete `roamer` folder with a preview.
fn write_cars(dir: &Path) {
    let png = png_bytes();
    write_zip(
        &dir.join("cars.zip"),
        &[
            ("vehicles/roamer/info.json", br#"{"Name": "Roamer", "Value": 12000,}"#),
            ("vehicles/roamer/base.pc", b"{}"),
            ("vehicles/roamer/base.jpg", &png),
        ],
    );
}

/// `vanilla.zip`: a `Pickup` folder shadowing a stock vehicle.
fn write_vanilla(dir: &Path) {
    write_zip(&dir.join("vanilla.zip"), &[("vehicles/Pickup/custom.pc", b"{}")]);
}

fn write_mod_a(dir: &Path) {
    write_zip(
        &dir.join("modA.zip"),
        &[
            ("vehicles/Hopper/info.json", br#"{"Name": "Hopper", "Value": 9000}"#),
            ("vehicles/Hopper/a.pc", b"{}"),
        ],
    );
}

fn write_mod_b(dir: &Path) {
    write_zip(&dir.join("modB.zip"), &[("vehicles/hopper/b.pc", b"{}")]);
}

/// Drain events from a background pass until `ScanComplete` arrives.
fn drain_to_completion(rx: &crossbeam_channel::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut events = Vec::new();
    loop {
        assert!(Instant::now() < deadline, "pass did not complete within 30 seconds");
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => {
                let done = matches!(
                    event,
                    PipelineEvent::ScanComplete(_) | PipelineEvent::PassFailed(_)
                );
                events.push(event);
                if done {
                    return events;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                panic!("pass channel disconnected before completion")
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn first_pass_builds_catalog_and_cache() {
    let fx = Fixture::new();
    write_cars(&fx.mods);
    write_vanilla(&fx.mods);

    let summary = fx.pipeline().run_pass(false).unwrap();
    assert_eq!(summary.archives, 2);
    assert_eq!(summary.prioritized, 1);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.errors, 0);
    assert!(summary.new_archives.is_empty(), "first run reports nothing as new");

    let good = fx.read(&fx.config.good_output_path());
    let expected = concat!(
        "cars.zip (package)  - \"roamer\" (internal folder name) - \"vehicles/roamer/base.jpg\" (config picture)\r\n",
        "core_vehicles.spawnNewVehicle(\"roamer\", {config = 'vehicles/roamer/base.pc'})\r\n",
        "\r\n",
        "vanilla.zip (package)  - \"pickup\" (internal folder name) - \"IMAGE_NOT_FOUND-USEMISSING\" (config picture)\r\n",
        "core_vehicles.spawnNewVehicle(\"pickup\", {config = 'vehicles/Pickup/custom.pc'})\r\n",
        "\r\n",
    );
    assert_eq!(good, expected);

    let bad = fx.read(&fx.config.bad_output_path());
    assert_eq!(
        bad,
        "=== pickup ===\r\nvanilla.zip (package)  - \"pickup\" (internal folder name)\r\n\r\n"
    );

    assert!(fx.cache_file("vehicles--roamer_cars.zip--info.json").is_file());
    let preview = fx.cache_file("vehicles--roamer_cars.zip--base.jpg");
    let decoded = image::load_from_memory(&fs::read(&preview).unwrap()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 110));

    assert!(fx.config.manifest_path().is_file());
    assert!(fx.config.original_output_path().is_file());
    assert!(fx.config.state_path().is_file());
    assert_eq!(fx.read(&fx.config.new_archives_path()), "");
}

#[test]
fn every_preview_path_exists() {
    let fx = Fixture::new();
    write_cars(&fx.mods);
    write_vanilla(&fx.mods);
    write_mod_b(&fx.mods);

    let pipeline = fx.pipeline();
    pipeline.run_pass(false).unwrap();
    let catalog = pipeline.load_catalog().unwrap();
    assert_eq!(catalog.entries.len(), 3);
    for entry in &catalog.entries {
        assert!(
            entry.preview_path.is_file(),
            "missing preview {} for {}",
            entry.preview_path.display(),
            entry.display_name
        );
    }
    let placeholder = fx.config.placeholder_path();
    let with_placeholder = catalog
        .entries
        .iter()
        .filter(|e| e.preview_path == placeholder)
        .count();
    assert_eq!(with_placeholder, 2);
}

#[test]
fn folder_without_metadata_links_to_first_owner() {
    let fx = Fixture::new();
    write_mod_a(&fx.mods);
    write_mod_b(&fx.mods);

    let pipeline = fx.pipeline();
    let summary = pipeline.run_pass(false).unwrap();
    assert_eq!(summary.fallback_links, 1);
    assert_eq!(summary.conflicts, 1);

    // "Hopper" in modA.zip and "hopper" in modB.zip are reported, not merged silently.
    let bad = fx.read(&fx.config.bad_output_path());
    assert_eq!(
        bad,
        "=== NAMING CONFLICTS ===\r\n\
         modB.zip (package)  - \"hopper\" (internal folder name) - conflicts with modA.zip \"Hopper\"\r\n\r\n"
    );

    let good = fx.read(&fx.config.good_output_path());
    assert!(good.contains(
        "modB.zip (package)  - \"Hopper\" (internal folder name) - \"IMAGE_NOT_FOUND-USEMISSING\" (config picture)\r\n\
         core_vehicles.spawnNewVehicle(\"Hopper\", {config = 'vehicles/hopper/b.pc'}) (USE vehicles--hopper_modA.zip--info.json)\r\n"
    ));

    // The planned snapshot has neither the link nor the adopted casing.
    let original = fx.read(&fx.config.original_output_path());
    assert!(original.contains("spawnNewVehicle(\"hopper\", {config = 'vehicles/hopper/b.pc'})\r\n"));
    assert!(!original.contains("(USE "));

    let catalog: Catalog = pipeline.load_catalog().unwrap();
    let b = catalog
        .entries
        .iter()
        .find(|e| e.archive_id == "modB.zip")
        .unwrap();
    assert_eq!(b.info.name, "Hopper");
    assert_eq!(b.info.value, 9000.0);
}

#[test]
fn each_preview_gets_its_own_description_line() {
    let fx = Fixture::new();
    let png = png_bytes();
    write_zip(
        &fx.mods.join("cars.zip"),
        &[
            ("vehicles/roamer/info.json", br#"{"Name": "Roamer"}"#),
            ("vehicles/roamer/base.pc", b"{}"),
            ("vehicles/roamer/base.jpg", &png),
            ("vehicles/roamer/base.png", &png),
        ],
    );

    let pipeline = fx.pipeline();
    let summary = pipeline.run_pass(false).unwrap();
    assert_eq!(summary.accepted, 1);

    let good = fx.read(&fx.config.good_output_path());
    let expected = concat!(
        "cars.zip (package)  - \"roamer\" (internal folder name) - \"vehicles/roamer/base.jpg\" (config picture)\r\n",
        "cars.zip (package)  - \"roamer\" (internal folder name) - \"vehicles/roamer/base.png\" (config picture)\r\n",
        "core_vehicles.spawnNewVehicle(\"roamer\", {config = 'vehicles/roamer/base.pc'})\r\n",
        "\r\n",
    );
    assert_eq!(good, expected);

    let catalog = pipeline.load_catalog().unwrap();
    assert!(catalog.errors.is_empty());
    assert_eq!(catalog.entries.len(), 1);
    assert_eq!(
        catalog.entries[0].preview_path,
        fx.cache_file("vehicles--roamer_cars.zip--base.jpg")
    );
}

#[test]
fn repeated_passes_are_idempotent() {
    let fx = Fixture::new();
    write_cars(&fx.mods);
    write_vanilla(&fx.mods);
    write_mod_a(&fx.mods);
    write_mod_b(&fx.mods);

    let pipeline = fx.pipeline();
    pipeline.run_pass(false).unwrap();
    let good = fs::read(fx.config.good_output_path()).unwrap();
    let bad = fs::read(fx.config.bad_output_path()).unwrap();
    let manifest = fs::read(fx.config.manifest_path()).unwrap();

    let second = pipeline.run_pass(false).unwrap();
    assert_eq!(second.extracted, 0);
    assert!(second.new_archives.is_empty());
    assert_eq!(fs::read(fx.config.good_output_path()).unwrap(), good);
    assert_eq!(fs::read(fx.config.bad_output_path()).unwrap(), bad);
    assert_eq!(fs::read(fx.config.manifest_path()).unwrap(), manifest);
}

#[test]
fn full_pass_over_warm_cache_writes_nothing() {
    let fx = Fixture::new();
    write_cars(&fx.mods);
    write_mod_a(&fx.mods);

    let pipeline = fx.pipeline();
    let first = pipeline.run_pass(false).unwrap();
    assert_eq!(first.extracted, 3);

    let full = pipeline.run_pass(true).unwrap();
    assert_eq!(full.extracted, 0);
    assert_eq!(full.skipped, 3);
}

#[test]
fn new_archive_is_reported_on_next_pass() {
    let fx = Fixture::new();
    write_cars(&fx.mods);

    let pipeline = fx.pipeline();
    pipeline.run_pass(false).unwrap();

    write_mod_a(&fx.mods);
    let summary = pipeline.run_pass(false).unwrap();
    assert_eq!(summary.new_archives, ["modA.zip"]);
    assert_eq!(summary.extracted, 1, "only the new archive is extracted");
    assert_eq!(fx.read(&fx.config.new_archives_path()), "modA.zip\r\n");
    assert!(fx.cache_file("vehicles--hopper_modA.zip--info.json").is_file());
}

#[test]
fn removed_archive_is_purged_from_cache() {
    let fx = Fixture::new();
    write_cars(&fx.mods);

    let pipeline = fx.pipeline();
    pipeline.run_pass(false).unwrap();
    assert!(fx.cache_file("vehicles--roamer_cars.zip--info.json").is_file());

    fs::remove_file(fx.mods.join("cars.zip")).unwrap();
    let summary = pipeline.run_pass(false).unwrap();
    assert_eq!(summary.removed_archives, 1);
    assert_eq!(summary.purged, 2);
    assert!(!fx.cache_file("vehicles--roamer_cars.zip--info.json").exists());
    assert!(!fx.cache_file("vehicles--roamer_cars.zip--base.jpg").exists());
    assert_eq!(fx.read(&fx.config.good_output_path()), "");
}

#[test]
fn replaced_archive_is_re_extracted() {
    let fx = Fixture::new();
    write_mod_a(&fx.mods);

    let pipeline = fx.pipeline();
    pipeline.run_pass(false).unwrap();

    let path = fx.mods.join("modA.zip");
    write_zip(
        &path,
        &[
            ("vehicles/Hopper/info.json", br#"{"Name": "Hopper II", "Value": 9500}"#),
            ("vehicles/Hopper/a.pc", b"{}"),
        ],
    );
    let later = SystemTime::now() + Duration::from_secs(60);
    fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(later)
        .unwrap();

    let summary = pipeline.run_pass(false).unwrap();
    assert_eq!(summary.modified_archives, 1);
    assert_eq!(summary.purged, 1);
    assert_eq!(summary.extracted, 1);
    let info = fx.read(&fx.cache_file("vehicles--hopper_modA.zip--info.json"));
    assert!(info.contains("Hopper II"));
}

#[test]
fn corrupt_archive_is_counted_not_fatal() {
    let fx = Fixture::new();
    write_cars(&fx.mods);
    fs::write(fx.mods.join("broken.zip"), b"this is not a zip archive").unwrap();

    let summary = fx.pipeline().run_pass(false).unwrap();
    assert_eq!(summary.archives, 2);
    assert_eq!(summary.errors_of(ErrorKind::CorruptArchive), 1);
    assert_eq!(summary.accepted, 1);

    let manifest = fx.read(&fx.config.manifest_path());
    assert!(manifest.contains("broken.zip"));
    let bad = fx.read(&fx.config.bad_output_path());
    assert!(bad.contains("broken.zip (package)\r\n"));
}

#[test]
fn reserved_set_change_clears_cache() {
    let fx = Fixture::new();
    write_cars(&fx.mods);

    let pipeline = fx.pipeline();
    pipeline.run_pass(false).unwrap();

    // `roamer` becomes a stock vehicle.
    let stock = fx.config.data_dir.parent().unwrap().join("stock");
    fs::write(stock.join("roamer.zip"), b"").unwrap();

    let summary = pipeline.run_pass(false).unwrap();
    assert!(summary.cache_cleared);
    assert_eq!(summary.extracted, 2, "everything is re-extracted after a clear");
    let good = fx.read(&fx.config.good_output_path());
    assert!(good.contains("spawnNewVehicle(\"roamer\""));
    let bad = fx.read(&fx.config.bad_output_path());
    assert!(bad.starts_with("=== roamer ===\r\n"));
}

#[test]
fn resolve_reads_existing_manifest() {
    let fx = Fixture::new();
    write_mod_a(&fx.mods);
    write_mod_b(&fx.mods);

    let pipeline = fx.pipeline();
    pipeline.run_pass(false).unwrap();
    let good = fs::read(fx.config.good_output_path()).unwrap();
    fs::remove_file(fx.config.good_output_path()).unwrap();

    let (resolution, errors) = pipeline.resolve_from_manifest().unwrap();
    assert!(errors.is_empty());
    assert_eq!(resolution.accepted.len(), 2);
    assert_eq!(fs::read(fx.config.good_output_path()).unwrap(), good);
}

#[test]
fn resolve_without_manifest_fails() {
    let fx = Fixture::new();
    let mut config = fx.config.clone();
    config.read_retry_attempts = 1;
    let err = Pipeline::new(config)
        .unwrap()
        .resolve_from_manifest()
        .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn background_pass_reports_through_channel() {
    let fx = Fixture::new();
    write_cars(&fx.mods);

    let handle = start_pass(Arc::new(fx.pipeline()), false).unwrap();
    let events = drain_to_completion(&handle.events_rx);
    assert_eq!(events.first(), Some(&PipelineEvent::ScanStarted { root: None }));
    match events.last() {
        Some(PipelineEvent::ScanComplete(summary)) => assert_eq!(summary.accepted, 1),
        other => panic!("unexpected final event {other:?}"),
    }
}

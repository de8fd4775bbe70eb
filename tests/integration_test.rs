use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::Result;
use chrono::{DateTime, Local};
use filetime::FileTime;

use chronosort::destination::CollisionPolicy;
use chronosort::metadata::{Field, MetadataStore};
use chronosort::mover::{MediaMover, MoveOptions};
use chronosort::query::DateWindow;
use chronosort::repair::{RepairOptions, TimestampRepairer};
use chronosort::writer::TimestampWriter;

const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

/// In-memory metadata store: what the repair pipeline writes, the mover
/// reads back. Substitutes for the exiftool-backed store.
struct InMemoryStore {
    fields: Mutex<HashMap<(PathBuf, Field), String>>,
}

impl InMemoryStore {
    fn new() -> Self {
        Self {
            fields: Mutex::new(HashMap::new()),
        }
    }

    fn preset(&self, path: &Path, field: Field, value: &str) {
        self.fields
            .lock()
            .unwrap()
            .insert((path.to_path_buf(), field), value.to_string());
    }

    fn get(&self, path: &Path, field: Field) -> Option<String> {
        self.fields
            .lock()
            .unwrap()
            .get(&(path.to_path_buf(), field))
            .cloned()
    }
}

impl MetadataStore for InMemoryStore {
    fn read(&self, path: &Path, field: Field) -> Result<Option<String>> {
        Ok(self.get(path, field))
    }

    fn write_many(&self, path: &Path, fields: &[(Field, String)]) -> Result<()> {
        let mut map = self.fields.lock().unwrap();
        for (field, value) in fields {
            map.insert((path.to_path_buf(), *field), value.clone());
        }
        Ok(())
    }
}

fn write_jpeg(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, JPEG_HEADER).expect("Failed to write test image");
    path
}

fn mtime_epoch(path: &Path) -> u64 {
    fs::metadata(path)
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn local_year_month(epoch: u64) -> (String, String) {
    let local = DateTime::<Local>::from(UNIX_EPOCH + Duration::from_secs(epoch));
    (
        local.format("%Y").to_string(),
        local.format("%m").to_string(),
    )
}

fn default_move_options(target: &Path) -> MoveOptions {
    MoveOptions {
        target_root: target.to_path_buf(),
        recursive: false,
        policy: CollisionPolicy::Counter,
        copy: false,
        preserve_owner: false,
        dry_run: false,
    }
}

#[test]
fn test_repair_sets_mtime_and_round_trips_metadata() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let path = write_jpeg(source.path(), "1640390400.jpg");
    let store = InMemoryStore::new();

    let repairer = TimestampRepairer::new(
        &store,
        RepairOptions {
            root: source.path().to_path_buf(),
            recursive: false,
            window: DateWindow::default(),
            dry_run: false,
        },
    );

    // Act
    let report = repairer.run().expect("Repair failed");

    // Assert
    assert_eq!(report.candidates, 1);
    assert_eq!(report.repaired, 1);
    assert_eq!(report.skipped, 0);
    assert!(report.errors.is_empty());
    assert_eq!(mtime_epoch(&path), 1640390400);

    // Metadata and mtime describe the identical instant
    let written = store
        .get(&path, Field::DateTimeOriginal)
        .expect("DateTimeOriginal was not written");
    assert_eq!(
        written,
        TimestampWriter::format_instant(1640390400).unwrap()
    );
    let parsed = chrono::NaiveDateTime::parse_from_str(&written, "%Y:%m:%d %H:%M:%S")
        .expect("Written value is not a calendar datetime");
    let round_trip = parsed
        .and_local_timezone(Local)
        .earliest()
        .expect("Written value does not exist in the local timezone")
        .timestamp();
    assert_eq!(round_trip, 1640390400);
    assert_eq!(store.get(&path, Field::CreateDate), Some(written.clone()));
    assert_eq!(store.get(&path, Field::ModifyDate), Some(written));
}

#[test]
fn test_repair_truncates_millisecond_names() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let path = write_jpeg(source.path(), "1617235200999.jpg");
    let store = InMemoryStore::new();

    let repairer = TimestampRepairer::new(
        &store,
        RepairOptions {
            root: source.path().to_path_buf(),
            recursive: false,
            window: DateWindow::default(),
            dry_run: false,
        },
    );

    // Act
    let report = repairer.run().expect("Repair failed");

    // Assert: milliseconds are dropped, not rounded
    assert_eq!(report.repaired, 1);
    assert_eq!(mtime_epoch(&path), 1617235200);
}

#[test]
fn test_repair_is_idempotent() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let path = write_jpeg(source.path(), "1640390400.jpg");
    let store = InMemoryStore::new();

    let options = || RepairOptions {
        root: source.path().to_path_buf(),
        recursive: false,
        window: DateWindow::default(),
        dry_run: false,
    };

    // Act
    TimestampRepairer::new(&store, options())
        .run()
        .expect("First repair failed");
    let mtime_first = mtime_epoch(&path);
    let field_first = store.get(&path, Field::DateTimeOriginal);

    TimestampRepairer::new(&store, options())
        .run()
        .expect("Second repair failed");

    // Assert
    assert_eq!(mtime_epoch(&path), mtime_first);
    assert_eq!(store.get(&path, Field::DateTimeOriginal), field_first);
}

#[test]
fn test_repair_skips_non_timestamp_names() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    write_jpeg(source.path(), "not_a_timestamp.jpg");
    write_jpeg(source.path(), "12345.jpg");
    let store = InMemoryStore::new();

    let repairer = TimestampRepairer::new(
        &store,
        RepairOptions {
            root: source.path().to_path_buf(),
            recursive: false,
            window: DateWindow::default(),
            dry_run: false,
        },
    );

    // Act
    let report = repairer.run().expect("Repair failed");

    // Assert: skipped with diagnostics, batch still succeeds
    assert_eq!(report.candidates, 2);
    assert_eq!(report.repaired, 0);
    assert_eq!(report.skipped, 2);
    assert!(report.errors.is_empty());
    assert!(store.fields.lock().unwrap().is_empty());
}

#[test]
fn test_repair_honors_date_window() {
    // Arrange: mtimes at 2022-01-01, 2022-06-15 and 2023-01-01 UTC
    let source = tempfile::tempdir().unwrap();
    let old = write_jpeg(source.path(), "1000000000.jpg");
    let mid = write_jpeg(source.path(), "1100000000.jpg");
    let new = write_jpeg(source.path(), "1200000000.jpg");
    filetime::set_file_mtime(&old, FileTime::from_unix_time(1640995200, 0)).unwrap();
    filetime::set_file_mtime(&mid, FileTime::from_unix_time(1655251200, 0)).unwrap();
    filetime::set_file_mtime(&new, FileTime::from_unix_time(1672531200, 0)).unwrap();
    let store = InMemoryStore::new();

    let repairer = TimestampRepairer::new(
        &store,
        RepairOptions {
            root: source.path().to_path_buf(),
            recursive: false,
            window: DateWindow {
                after: Some(UNIX_EPOCH + Duration::from_secs(1640995200)),
                before: Some(UNIX_EPOCH + Duration::from_secs(1672444800)),
            },
            dry_run: false,
        },
    );

    // Act
    let report = repairer.run().expect("Repair failed");

    // Assert: only the file strictly inside the window was touched
    assert_eq!(report.candidates, 1);
    assert_eq!(report.repaired, 1);
    assert_eq!(mtime_epoch(&mid), 1100000000);
    assert_eq!(mtime_epoch(&old), 1640995200);
    assert_eq!(mtime_epoch(&new), 1672531200);
}

#[test]
fn test_move_places_file_by_metadata_date() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let path = write_jpeg(source.path(), "holiday.jpg");
    let store = InMemoryStore::new();
    store.preset(&path, Field::DateTimeOriginal, "2023:05:15 10:30:00");

    let mover = MediaMover::new(&store, default_move_options(target.path()));

    // Act
    let report = mover.run(source.path()).expect("Move failed");

    // Assert
    assert_eq!(report.moved, 1);
    assert!(report.errors.is_empty());
    let dest = target.path().join("2023").join("05").join("holiday.jpg");
    assert!(dest.exists(), "Expected file at {}", dest.display());
    assert!(!path.exists(), "Source should be gone after a move");
}

#[test]
fn test_move_collision_keeps_both_files() {
    // Arrange: two different files destined for the same basename
    let source_a = tempfile::tempdir().unwrap();
    let source_b = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let first = write_jpeg(source_a.path(), "dup.jpg");
    let second_path = source_b.path().join("dup.jpg");
    let mut second_bytes = JPEG_HEADER.to_vec();
    second_bytes.extend_from_slice(b"different payload");
    fs::write(&second_path, &second_bytes).unwrap();

    let store = InMemoryStore::new();
    store.preset(&first, Field::DateTimeOriginal, "2023:05:15 10:30:00");
    store.preset(&second_path, Field::DateTimeOriginal, "2023:05:15 11:00:00");

    let mover = MediaMover::new(&store, default_move_options(target.path()));

    // Act
    mover.run(&first).expect("First move failed");
    mover.run(&second_path).expect("Second move failed");

    // Assert: both survive under distinct names, neither overwritten
    let month_dir = target.path().join("2023").join("05");
    assert!(month_dir.join("dup.jpg").exists());
    assert!(month_dir.join("dup_1.jpg").exists());
    assert_eq!(fs::read(month_dir.join("dup.jpg")).unwrap(), JPEG_HEADER);
    assert_eq!(fs::read(month_dir.join("dup_1.jpg")).unwrap(), second_bytes);
}

#[test]
fn test_move_falls_back_to_mtime_without_metadata() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let path = write_jpeg(source.path(), "bare.jpg");
    let epoch: u64 = 1684147800;
    filetime::set_file_mtime(&path, FileTime::from_unix_time(epoch as i64, 0)).unwrap();
    let store = InMemoryStore::new();

    let mover = MediaMover::new(&store, default_move_options(target.path()));

    // Act
    let report = mover.run(source.path()).expect("Move failed");

    // Assert
    assert_eq!(report.moved, 1);
    let (year, month) = local_year_month(epoch);
    let dest = target.path().join(year).join(month).join("bare.jpg");
    assert!(dest.exists(), "Expected file at {}", dest.display());
}

#[test]
fn test_move_never_touches_thumbnail_artifacts() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let thumb = write_jpeg(source.path(), "SYNOPHOTO_THUMB_M_pic.jpg");
    let store = InMemoryStore::new();
    store.preset(&thumb, Field::DateTimeOriginal, "2023:05:15 10:30:00");

    let mover = MediaMover::new(&store, default_move_options(target.path()));

    // Act: both the directory scan and the single-file path must refuse
    let dir_report = mover.run(source.path()).expect("Move failed");
    let file_report = mover.run(&thumb).expect("Move failed");

    // Assert
    assert_eq!(dir_report.moved, 0);
    assert_eq!(file_report.moved, 0);
    assert_eq!(file_report.skipped, 1);
    assert!(thumb.exists(), "Thumbnail artifact must stay in place");
}

#[test]
fn test_move_skips_unsupported_content() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let notes = source.path().join("notes.txt");
    fs::write(&notes, b"not media").unwrap();
    let store = InMemoryStore::new();

    let mover = MediaMover::new(&store, default_move_options(target.path()));

    // Act
    let report = mover.run(source.path()).expect("Move failed");

    // Assert
    assert_eq!(report.candidates, 1);
    assert_eq!(report.moved, 0);
    assert_eq!(report.skipped, 1);
    assert!(report.errors.is_empty());
    assert!(notes.exists());
}

#[test]
fn test_move_copy_mode_keeps_source() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let path = write_jpeg(source.path(), "holiday.jpg");
    let store = InMemoryStore::new();
    store.preset(&path, Field::DateTimeOriginal, "2023:05:15 10:30:00");

    let mut options = default_move_options(target.path());
    options.copy = true;
    let mover = MediaMover::new(&store, options);

    // Act
    let report = mover.run(source.path()).expect("Copy failed");

    // Assert
    assert_eq!(report.moved, 1);
    assert!(path.exists(), "Copy mode must leave the source in place");
    assert!(target
        .path()
        .join("2023")
        .join("05")
        .join("holiday.jpg")
        .exists());
}

#[test]
fn test_move_dry_run_relocates_nothing() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let path = write_jpeg(source.path(), "holiday.jpg");
    let store = InMemoryStore::new();
    store.preset(&path, Field::DateTimeOriginal, "2023:05:15 10:30:00");

    let mut options = default_move_options(target.path());
    options.dry_run = true;
    let mover = MediaMover::new(&store, options);

    // Act
    let report = mover.run(source.path()).expect("Dry run failed");

    // Assert
    assert_eq!(report.moved, 1);
    assert!(path.exists());
    assert!(!target.path().join("2023").exists());
}

#[test]
fn test_repair_chains_into_mover() {
    // Arrange
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    let path = write_jpeg(source.path(), "1640390400.jpg");
    let store = InMemoryStore::new();

    let mover = MediaMover::new(&store, default_move_options(target.path()));
    let repairer = TimestampRepairer::new(
        &store,
        RepairOptions {
            root: source.path().to_path_buf(),
            recursive: false,
            window: DateWindow::default(),
            dry_run: false,
        },
    )
    .with_mover(mover);

    // Act
    let report = repairer.run().expect("Repair failed");

    // Assert: repaired, then organized by the freshly written metadata
    assert_eq!(report.repaired, 1);
    assert!(!path.exists(), "Source should have been moved");
    let (year, month) = local_year_month(1640390400);
    let dest = target
        .path()
        .join(year)
        .join(month)
        .join("1640390400.jpg");
    assert!(dest.exists(), "Expected file at {}", dest.display());
    assert_eq!(mtime_epoch(&dest), 1640390400);
}

#[test]
fn test_per_file_failures_do_not_stop_the_batch() {
    // Arrange: a store that refuses one file but serves the other
    struct FlakyStore {
        inner: InMemoryStore,
    }
    impl MetadataStore for FlakyStore {
        fn read(&self, path: &Path, field: Field) -> Result<Option<String>> {
            self.inner.read(path, field)
        }
        fn write_many(&self, path: &Path, fields: &[(Field, String)]) -> Result<()> {
            if path.to_string_lossy().contains("poison") {
                anyhow::bail!("tool refused this file");
            }
            self.inner.write_many(path, fields)
        }
    }

    let source = tempfile::tempdir().unwrap();
    let poisoned = write_jpeg(source.path(), "1617235200.jpg");
    let renamed = source.path().join("poison_marker");
    fs::create_dir(&renamed).unwrap();
    let poisoned_path = renamed.join("1617235200.jpg");
    fs::rename(&poisoned, &poisoned_path).unwrap();
    write_jpeg(source.path(), "1640390400.jpg");
    let store = FlakyStore {
        inner: InMemoryStore::new(),
    };

    let repairer = TimestampRepairer::new(
        &store,
        RepairOptions {
            root: source.path().to_path_buf(),
            recursive: true,
            window: DateWindow::default(),
            dry_run: false,
        },
    );

    // Act
    let report = repairer.run().expect("Batch should not fail");

    // Assert
    assert_eq!(report.candidates, 2);
    assert_eq!(report.repaired, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors.len(), 1);
}

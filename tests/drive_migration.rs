#![cfg(unix)]

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use faststart::{
    BackendKind, CACHE_FILENAME, DRIVE_ROOT_ENV, Drive, FileItem, FsDrive, MigrationCache,
    MigrationConfig, ModeFlags, run_migration,
};

fn drive_item(drive_root: &Path, drive_path: &str) -> FileItem {
    let drive = FsDrive::open(drive_root).expect("reopen drive");
    let node = drive
        .get_node_by_path(Path::new(drive_path))
        .expect("lookup")
        .expect("node exists");
    FileItem::from(&node)
}

#[test]
fn drive_backends_replace_in_place_and_export_cross_backend() {
    let drive_root = tempdir().expect("drive root");
    fs::create_dir_all(drive_root.path().join("library")).expect("seed library");
    fs::create_dir_all(drive_root.path().join("exports")).expect("seed exports");
    fs::write(drive_root.path().join("library/movie.mkv"), b"movie bytes").expect("seed movie");
    fs::write(drive_root.path().join("exports/clip.mkv"), b"clip bytes").expect("seed clip");

    // The drive connector is selected through the environment; this test
    // binary runs both phases against the same root.
    unsafe {
        std::env::set_var(DRIVE_ROOT_ENV, drive_root.path());
    }

    let bin = tempdir().expect("tool dir");
    let tools = common::stub_tools(bin.path());

    // Phase 1: drive source and drive sink, which means a same-location
    // store replacing the origin in its folder.
    let origin = drive_item(drive_root.path(), "library/movie.mkv");
    let data = tempdir().expect("data dir");
    let config = MigrationConfig {
        data_path: data.path().to_path_buf(),
        roots: vec![PathBuf::from("/library")],
        jobs: 1,
        source: BackendKind::Drive,
        sink: BackendKind::Drive,
        output_path: None,
        tmp_path: None,
        modes: ModeFlags::default(),
        tools: tools.clone(),
    };
    run_migration(&config).expect("drive-to-drive run");

    assert_eq!(
        fs::read(drive_root.path().join("library/movie.mp4")).expect("read replacement"),
        b"movie bytes"
    );
    assert!(!drive_root.path().join("library/movie.mkv").exists());
    // The trashed origin is preserved for manual recovery.
    assert!(
        fs::read_dir(drive_root.path().join(".trash"))
            .expect("list trash")
            .count()
            > 0
    );

    let cache = MigrationCache::open(&data.path().join(CACHE_FILENAME)).expect("open cache");
    let replacement = drive_item(drive_root.path(), "library/movie.mp4");
    assert!(cache.is_migrated(&replacement).expect("replacement migrated"));
    // The artifact has a new id, so the origin's record was dropped.
    assert_ne!(replacement.id, origin.id);
    assert!(!cache.has_cache(&origin).expect("origin forgotten"));

    // Phase 2: drive source, local sink. The origin stays untouched and the
    // cache tracks it under its own id.
    let out = tempdir().expect("output dir");
    let data = tempdir().expect("data dir");
    let config = MigrationConfig {
        data_path: data.path().to_path_buf(),
        roots: vec![PathBuf::from("/exports")],
        jobs: 1,
        source: BackendKind::Drive,
        sink: BackendKind::Local,
        output_path: Some(out.path().join("migrated")),
        tmp_path: None,
        modes: ModeFlags::default(),
        tools,
    };
    run_migration(&config).expect("drive-to-local run");

    assert_eq!(
        fs::read(out.path().join("migrated/clip.mp4")).expect("read artifact"),
        b"clip bytes"
    );
    assert!(drive_root.path().join("exports/clip.mkv").exists());

    let cache = MigrationCache::open(&data.path().join(CACHE_FILENAME)).expect("open cache");
    let clip = drive_item(drive_root.path(), "exports/clip.mkv");
    assert!(cache.is_migrated(&clip).expect("clip migrated"));
}

#![cfg(unix)]

mod common;

use std::fs;
use std::path::PathBuf;

use tempfile::tempdir;

use faststart::{
    BackendKind, CACHE_FILENAME, FileItem, MigrationCache, MigrationConfig, ModeFlags,
    run_migration,
};

#[test]
fn migrates_a_local_tree_and_resumes_as_a_noop() {
    let root = tempdir().expect("library root");
    let data = tempdir().expect("data dir");
    let out = tempdir().expect("output dir");
    let bin = tempdir().expect("tool dir");
    let tmp = tempdir().expect("tmp dir");

    fs::write(root.path().join("native.mp4"), b"already streamable").expect("seed");
    fs::write(root.path().join("show.mkv"), b"matroska payload").expect("seed");
    fs::write(root.path().join("notes.txt"), b"not a video").expect("seed");

    let library = root.path().canonicalize().expect("canonical root");
    let config = MigrationConfig {
        data_path: data.path().to_path_buf(),
        roots: vec![library.clone()],
        jobs: 2,
        source: BackendKind::Local,
        sink: BackendKind::Local,
        output_path: Some(out.path().join("migrated")),
        tmp_path: Some(tmp.path().to_path_buf()),
        modes: ModeFlags::default(),
        tools: common::stub_tools(bin.path()),
    };

    run_migration(&config).expect("first run");

    // The foreign container was transcoded and written out under .mp4.
    let stored = out.path().join("migrated/show.mp4");
    assert_eq!(fs::read(&stored).expect("read artifact"), b"matroska payload");
    // The pristine MP4 needed no store, and the text file got no job.
    assert!(!out.path().join("migrated/native.mp4").exists());
    assert!(!out.path().join("migrated/notes.txt").exists());
    // Sources are never mutated by the local sink.
    assert!(library.join("show.mkv").exists());

    let cache = MigrationCache::open(&data.path().join(CACHE_FILENAME)).expect("open cache");
    let native = FileItem::from_local_path(&library.join("native.mp4")).expect("describe");
    let show = FileItem::from_local_path(&library.join("show.mkv")).expect("describe");
    assert!(cache.is_migrated(&native).expect("native migrated"));
    assert!(cache.is_migrated(&show).expect("show migrated"));

    // Scratch space is gone once the run completes.
    assert_eq!(
        fs::read_dir(tmp.path()).expect("list tmp").count(),
        0,
        "scratch root must be removed"
    );

    // A second run sees only migrated items and stores nothing new.
    fs::remove_file(&stored).expect("clear output");
    run_migration(&config).expect("second run");
    assert!(!stored.exists());
}

#[test]
fn cache_only_records_verdicts_without_storing() {
    let root = tempdir().expect("library root");
    let data = tempdir().expect("data dir");
    let out = tempdir().expect("output dir");
    let bin = tempdir().expect("tool dir");

    fs::write(root.path().join("show.mkv"), b"matroska payload").expect("seed");
    let library = root.path().canonicalize().expect("canonical root");

    let config = MigrationConfig {
        data_path: data.path().to_path_buf(),
        roots: vec![library.clone()],
        jobs: 1,
        source: BackendKind::Local,
        sink: BackendKind::Local,
        output_path: Some(out.path().join("migrated")),
        tmp_path: None,
        modes: ModeFlags {
            cache_only: true,
            ..ModeFlags::default()
        },
        tools: common::stub_tools(bin.path()),
    };

    run_migration(&config).expect("cache-only run");

    let cache = MigrationCache::open(&data.path().join(CACHE_FILENAME)).expect("open cache");
    let show = FileItem::from_local_path(&library.join("show.mkv")).expect("describe");
    assert!(cache.has_cache(&show).expect("cached"));
    assert!(cache.need_transcode(&show).expect("needs transcode"));
    assert!(!cache.is_migrated(&show).expect("not migrated"));
    assert!(!out.path().join("migrated").exists());
}

#[test]
fn missing_roots_walk_to_nothing() {
    let data = tempdir().expect("data dir");
    let out = tempdir().expect("output dir");
    let bin = tempdir().expect("tool dir");

    let config = MigrationConfig {
        data_path: data.path().to_path_buf(),
        roots: vec![PathBuf::from("/definitely/not/here")],
        jobs: 1,
        source: BackendKind::Local,
        sink: BackendKind::Local,
        output_path: Some(out.path().join("migrated")),
        tmp_path: None,
        modes: ModeFlags::default(),
        tools: common::stub_tools(bin.path()),
    };

    run_migration(&config).expect("run over missing root");
    assert!(!out.path().join("migrated").exists());
}

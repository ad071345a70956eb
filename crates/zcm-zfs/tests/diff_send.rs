#![cfg(unix)]

mod common;

use common::FakeZfs;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use zcm_core::dataset::{ChangeType, CreateOptions, DiffOptions, FileType};
use zcm_core::error::{ZcmError, ZcmResult};
use zcm_core::provider::DatasetProvider;

fn mounted_dataset(fake: &FakeZfs) {
    fake.provider
        .create(
            "tank/data",
            &CreateOptions {
                mountpoint: Some(PathBuf::from("/mnt/x")),
                ..CreateOptions::default()
            },
        )
        .unwrap();
    fake.provider.snapshot("v1", "tank/data", false).unwrap();
}

#[test]
fn diff_paths_are_relative_to_the_mountpoint() {
    let fake = FakeZfs::new();
    mounted_dataset(&fake);

    let options = DiffOptions {
        origin_snapshot: Some("tank/data@v1".into()),
        include_file_types: true,
        recursive: false,
    };
    let records = fake
        .provider
        .diff("tank/data", &options)
        .unwrap()
        .collect::<ZcmResult<Vec<_>>>()
        .unwrap();

    assert_eq!(records.len(), 4);
    assert_eq!(records[0].change, ChangeType::Modified);
    assert_eq!(records[0].file_type, Some(FileType::Directory));
    assert_eq!(records[0].path, PathBuf::from(""));
    assert_eq!(records[1].change, ChangeType::Added);
    assert_eq!(records[1].path, PathBuf::from("dir/file"));
    assert_eq!(records[2].file_type, Some(FileType::Link));
    assert_eq!(records[2].path, PathBuf::from("old\twith tab"));
    assert_eq!(records[3].change, ChangeType::Renamed);
    assert_eq!(records[3].path, PathBuf::from("a\t/mnt/x/b"));

    let diff_call = fake.calls_for("diff").pop().unwrap();
    assert_eq!(diff_call, vec!["diff", "-H", "-t", "-F", "tank/data@v1", "tank/data"]);
}

#[test]
fn snapshot_diffs_keep_absolute_paths() {
    let fake = FakeZfs::new();
    mounted_dataset(&fake);

    let records = fake
        .provider
        .diff("tank/data@v1", &DiffOptions::default())
        .unwrap()
        .collect::<ZcmResult<Vec<_>>>()
        .unwrap();
    assert_eq!(records[1].path, PathBuf::from("/mnt/x/dir/file"));
    assert!(records.iter().all(|r| r.file_type.is_none()));

    let diff_call = fake.calls_for("diff").pop().unwrap();
    assert_eq!(diff_call, vec!["diff", "-H", "-t", "-E", "tank/data@v1"]);
}

#[test]
fn diff_of_missing_dataset_fails() {
    let fake = FakeZfs::new();
    let result = fake
        .provider
        .diff("tank/ghost", &DiffOptions::default())
        .and_then(|stream| stream.collect::<ZcmResult<Vec<_>>>());
    assert!(matches!(result, Err(ZcmError::CommandFailed { .. })));
}

#[test]
fn abandoning_a_diff_stops_the_tool() {
    let fake = FakeZfs::new();
    fake.provider
        .create("tank/endless", &CreateOptions::default())
        .unwrap();

    let started = Instant::now();
    let first: Vec<_> = fake
        .provider
        .diff("tank/endless", &DiffOptions::default())
        .unwrap()
        .take(5)
        .collect::<ZcmResult<Vec<_>>>()
        .unwrap();
    assert_eq!(first.len(), 5);
    assert_eq!(first[4].path, PathBuf::from("file4"));
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn send_writes_stream_to_file() {
    let fake = FakeZfs::new();
    mounted_dataset(&fake);
    fake.provider.snapshot("v2", "tank/data", false).unwrap();

    let full = fake.out_file("full.zstream");
    let bytes = fake.provider.send("tank/data@v1", &full, None).unwrap();
    let written = fs::read_to_string(&full).unwrap();
    assert_eq!(bytes, written.len() as u64);
    assert!(written.starts_with("SEND tank/data@v1 block 0\n"));

    let incremental = fake.out_file("incr.zstream");
    fake.provider
        .send("tank/data@v2", &incremental, Some("tank/data@v1"))
        .unwrap();
    assert_eq!(
        fake.calls_for("send").pop().unwrap(),
        vec!["send", "-i", "tank/data@v1", "tank/data@v2"]
    );
}

#[test]
fn failed_send_removes_partial_output() {
    let fake = FakeZfs::new();
    let out = fake.out_file("missing.zstream");
    match fake.provider.send("tank@never", &out, None) {
        Err(ZcmError::CommandFailed { verb, .. }) => assert_eq!(verb, "send"),
        other => panic!("expected CommandFailed, got {:?}", other),
    }
    assert!(!out.exists());
}

mod common;

use std::fs;

use common::*;
use tempfile::tempdir;
use tex_bucket_core::bucket::{split, BucketArchive, DEFAULT_PAYLOAD_SUFFIX};
use tex_bucket_core::PipelineError;

#[test]
fn split_keeps_only_members_with_payload_suffix() {
    let tmp = tempdir().unwrap();
    let first = gzip_named("a.tex", b"first");
    let second = tar_gz(&[("main.tex", MAIN_TEX)]);
    let third = gzip(b"third");
    let bucket = write_file(
        tmp.path(),
        "src_0001.tar",
        &tar_bytes(&[
            ("2401/2401.00001.gz", first.as_slice()),
            ("2401/2401.00001.pdf", b"%PDF-1.5".as_slice()),
            ("2401/2401.00002.gz", second.as_slice()),
            ("2401/2401.00003.gz", third.as_slice()),
            ("2401/README", b"notes".as_slice()),
        ]),
    );
    let destination = tmp.path().join("archives");

    let payloads = split(&bucket, &destination, DEFAULT_PAYLOAD_SUFFIX).expect("split");

    let names: Vec<&str> = payloads.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["2401.00001.gz", "2401.00002.gz", "2401.00003.gz"]);
    assert_eq!(fs::read(destination.join("2401.00001.gz")).unwrap(), first);
    assert_eq!(fs::read(destination.join("2401.00002.gz")).unwrap(), second);
    assert_eq!(fs::read(&payloads[2].path).unwrap(), third);
    assert_eq!(entry_count(&destination), 3);
}

#[test]
fn payload_sequence_is_lazy_and_one_shot() {
    let tmp = tempdir().unwrap();
    let bucket = write_file(
        tmp.path(),
        "bucket.tar",
        &tar_bytes(&[("x.gz", b"x".as_slice()), ("y.gz", b"y".as_slice())]),
    );
    let mut archive = BucketArchive::open(&bucket).expect("open");

    let mut payloads = archive.payloads(tmp.path(), ".gz").expect("entries");
    let first = payloads.next().expect("one payload").expect("copied");
    assert_eq!(first.name, "x.gz");
    assert!(!tmp.path().join("y.gz").exists(), "later members are not copied yet");
    drop(payloads);

    assert!(archive.payloads(tmp.path(), ".gz").is_err());
}

#[test]
fn unreadable_bucket_is_fatal() {
    let tmp = tempdir().unwrap();
    let err = split(&tmp.path().join("missing.tar"), tmp.path(), ".gz").unwrap_err();
    assert!(matches!(err, PipelineError::Bucket { .. }));
    assert!(err.is_fatal());
    assert_eq!(err.kind(), "bucket_unreadable");
}

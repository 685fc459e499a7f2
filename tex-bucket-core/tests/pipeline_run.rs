mod common;

use std::fs;
use std::path::Path;

use common::*;
use tempfile::tempdir;
use tex_bucket_core::config::ProcessConfig;
use tex_bucket_core::pipeline::{resolve_directory, run_bucket, DocumentStatus, REPORT_FILE_NAME};
use tex_bucket_core::tokenizer::Tokenizer;
use tex_bucket_core::PipelineError;

fn config_in(root: &Path) -> ProcessConfig {
    ProcessConfig {
        archive_dir: root.join("archives"),
        extract_dir: root.join("extracted"),
        output_dir: root.join("merged"),
        ..ProcessConfig::default()
    }
}

fn mixed_bucket(dir: &Path) -> std::path::PathBuf {
    let good = tar_gz(&[("main.tex", MAIN_TEX), ("intro.tex", INTRO_TEX)]);
    let cyclic = tar_gz(&[
        ("main.tex", "\\input{a}\n"),
        ("a.tex", "\\input{main}\n"),
    ]);
    write_file(
        dir,
        "src_0001.tar",
        &tar_bytes(&[
            ("2401.00001.gz", good.as_slice()),
            ("2401.00001.pdf", b"%PDF-1.5".as_slice()),
            ("2401.00002.gz", cyclic.as_slice()),
            ("2401.00003.gz", b"not compressed".as_slice()),
        ]),
    )
}

#[tokio::test]
async fn bucket_run_merges_good_documents_and_skips_the_rest() {
    let tmp = tempdir().unwrap();
    let config = config_in(tmp.path());
    let bucket = mixed_bucket(tmp.path());

    let report = run_bucket(&config, &bucket, None).await.expect("run");

    assert_eq!(report.bucket, "src_0001.tar");
    assert_eq!(report.merged, 1);
    assert_eq!(report.skipped, 2);

    let good = report.document("2401.00001").expect("good document");
    assert_eq!(good.status, DocumentStatus::Merged);
    assert_eq!(good.root.as_deref(), Some("main.tex"));
    let merged = fs::read_to_string(config.output_dir.join("2401.00001.tex")).unwrap();
    assert_eq!(
        merged,
        "\\documentclass{article}\n\\begin{document}\nIntro with 50\\% share.\nBody text.\n\\end{document}\n"
    );

    let cyclic = report.document("2401.00002").expect("cyclic document");
    assert_eq!(cyclic.status, DocumentStatus::Rejected);
    assert_eq!(cyclic.failure_kind.as_deref(), Some("cyclic_inclusion"));

    let garbage = report.document("2401.00003").expect("non-gzip document");
    assert_eq!(garbage.status, DocumentStatus::ExtractionFailed);
    assert_eq!(garbage.failure_kind.as_deref(), Some("unrecognized_format"));

    // One merged document plus the report, no leftovers.
    assert_eq!(entry_count(&config.output_dir), 2);
    assert_eq!(entry_count(&config.extract_dir), 0);
    // Extracted payloads are removed, unrecognised ones stay for inspection.
    assert!(!config.archive_dir.join("2401.00001.gz").exists());
    assert!(config.archive_dir.join("2401.00003.gz").exists());
}

#[tokio::test]
async fn report_is_written_as_json() {
    let tmp = tempdir().unwrap();
    let config = config_in(tmp.path());
    let bucket = mixed_bucket(tmp.path());

    let report = run_bucket(&config, &bucket, None).await.expect("run");

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.output_dir.join(REPORT_FILE_NAME)).unwrap())
            .expect("valid json");
    assert_eq!(json["run_id"], report.run_id.as_str());
    assert_eq!(json["merged"], 1);
    assert_eq!(json["documents"][1]["status"], "rejected");
    assert_eq!(json["documents"][2]["status"], "extraction_failed");
}

#[tokio::test]
async fn concurrent_run_gives_the_same_outcome() {
    let tmp = tempdir().unwrap();
    let config = ProcessConfig {
        concurrency: 4,
        ..config_in(tmp.path())
    };
    let members: Vec<(String, Vec<u8>)> = (0..6)
        .map(|i| {
            let body = format!("Document {i}\n");
            (format!("2401.1000{i}.gz"), gzip_named("ms.tex", body.as_bytes()))
        })
        .collect();
    let members: Vec<(&str, &[u8])> = members
        .iter()
        .map(|(n, b)| (n.as_str(), b.as_slice()))
        .collect();
    let bucket = write_file(tmp.path(), "bucket.tar", &tar_bytes(&members));

    let report = run_bucket(&config, &bucket, None).await.expect("run");

    assert_eq!(report.merged, 6);
    let names: Vec<&str> = report.documents.iter().map(|d| d.name.as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert_eq!(
        fs::read_to_string(config.output_dir.join("2401.10003.tex")).unwrap(),
        "Document 3\n"
    );
}

#[tokio::test]
async fn payloads_with_the_same_document_name_do_not_share_an_output() {
    let tmp = tempdir().unwrap();
    let config = ProcessConfig {
        concurrency: 2,
        ..config_in(tmp.path())
    };
    let single = gzip_named("ms.tex", b"first\n");
    let container = tar_gz(&[("main.tex", "second\n")]);
    let bucket = write_file(
        tmp.path(),
        "bucket.tar",
        &tar_bytes(&[("x.gz", single.as_slice()), ("x.tar.gz", container.as_slice())]),
    );

    let report = run_bucket(&config, &bucket, None).await.expect("run");

    assert_eq!(report.documents.len(), 2);
    assert!(report.documents.iter().all(|d| d.name == "x"));
    assert_eq!(report.merged, 1);
    assert_eq!(report.skipped, 1);
    let refused: Vec<_> = report
        .documents
        .iter()
        .filter(|d| d.status != DocumentStatus::Merged)
        .collect();
    assert_eq!(refused.len(), 1);
    assert_eq!(refused[0].status, DocumentStatus::ExtractionFailed);
    assert_eq!(refused[0].failure_kind.as_deref(), Some("destination_exists"));
    assert_eq!(
        fs::read_to_string(config.output_dir.join("x.tex")).unwrap(),
        "first\n"
    );
    // x.tex plus the report.
    assert_eq!(entry_count(&config.output_dir), 2);
}

#[tokio::test]
async fn missing_bucket_ends_the_run() {
    let tmp = tempdir().unwrap();
    let err = run_bucket(&config_in(tmp.path()), &tmp.path().join("absent.tar"), None)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn directory_without_sources_is_skipped() {
    let tmp = tempdir().unwrap();
    write_file(tmp.path(), "refs.bib", b"@article{x}");
    let err = resolve_directory(tmp.path(), &Tokenizer::default(), ".tex", false).unwrap_err();
    assert!(matches!(err, PipelineError::NoSourceFiles(_)));
    assert!(tmp.path().join("refs.bib").exists());
}

#[test]
fn pruning_keeps_only_source_files() {
    let tmp = tempdir().unwrap();
    write_file(tmp.path(), "main.tex", b"\\input{sec/a}\n");
    write_file(tmp.path(), "sec/a.tex", b"A\n");
    write_file(tmp.path(), "sec/plot.png", b"png");
    write_file(tmp.path(), "figs/only.pdf", b"pdf");

    let merged = resolve_directory(tmp.path(), &Tokenizer::default(), ".tex", true).expect("merge");

    assert_eq!(merged.text, "A\n");
    assert!(!tmp.path().join("sec/plot.png").exists());
    assert!(!tmp.path().join("figs").exists());
    assert!(tmp.path().join("sec/a.tex").exists());
}

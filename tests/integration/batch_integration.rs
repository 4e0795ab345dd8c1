use lopdf::Document;
use pdfgate::config::{split_file_list, ProtectOptions};
use pdfgate::run_batch;

use crate::fixtures::{registered_ocg_names, TestFixtures};

#[tokio::test]
async fn test_batch_protects_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let a = TestFixtures::write(dir.path(), "a.pdf", &TestFixtures::pdf_bytes(1));
    let b = TestFixtures::write(dir.path(), "b.pdf", &TestFixtures::pdf_bytes(2));
    let out = dir.path().join("protected");

    let options = ProtectOptions {
        files: split_file_list(&format!("{};{}", a.display(), b.display())),
        output_dir: Some(out.clone()),
        ..TestFixtures::options()
    };
    let report = run_batch(options, Some(2)).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 2);

    let doc = Document::load(out.join("b.pdf")).unwrap();
    assert_eq!(registered_ocg_names(&doc).len(), 12);
}

#[tokio::test]
async fn test_batch_keeps_first_error_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let good = TestFixtures::write(dir.path(), "good.pdf", &TestFixtures::pdf_bytes(1));
    let locked = TestFixtures::write(dir.path(), "locked.pdf", &TestFixtures::encrypted_pdf_bytes());

    let options = ProtectOptions {
        files: vec![locked.clone(), good],
        output_dir: Some(dir.path().join("out")),
        ..TestFixtures::options()
    };
    let report = run_batch(options, Some(1)).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed(), 1);
    match &report.first_error {
        Some((path, _)) => assert_eq!(path, &locked),
        None => panic!("expected the locked file to fail"),
    }
    assert!(dir.path().join("out").join("good.pdf").exists());
}

#[tokio::test]
async fn test_batch_from_front_end_config() {
    let dir = tempfile::tempdir().unwrap();
    let a = TestFixtures::write(dir.path(), "a.pdf", &TestFixtures::pdf_bytes(1));
    let config = serde_json::json!({
        "Files": format!("{}", a.display()),
        "OutputDir": dir.path().join("out"),
        "StartTime": "2024-01-01",
        "EndTime": "2030-01-01",
        "ExperiredText": "Expired",
    });
    let options = ProtectOptions::from_str_any(&config.to_string()).unwrap();

    let report = run_batch(options, None).await.unwrap();
    assert_eq!(report.succeeded, 1);
}

#[tokio::test]
async fn test_batch_with_duplicate_file_names_keeps_every_output() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<_> = (0..6)
        .map(|i| {
            let folder = dir.path().join(format!("src{}", i));
            std::fs::create_dir_all(&folder).unwrap();
            TestFixtures::write(&folder, "same.pdf", &TestFixtures::pdf_bytes(i + 1))
        })
        .collect();
    let out = dir.path().join("out");

    let options = ProtectOptions {
        files,
        output_dir: Some(out.clone()),
        ..TestFixtures::options()
    };
    let report = run_batch(options, Some(6)).await.unwrap();
    assert_eq!(report.succeeded, 6);

    let mut written: Vec<_> = report.outputs.iter().filter_map(|o| o.output.clone()).collect();
    written.sort();
    written.dedup();
    assert_eq!(written.len(), 6);
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 6);

    let mut pages: Vec<_> = written
        .iter()
        .map(|path| Document::load(path).unwrap().get_pages().len())
        .collect();
    pages.sort();
    assert_eq!(pages, vec![1, 2, 3, 4, 5, 6]);
}

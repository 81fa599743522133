use ezbak::core::{
    BackupRunner, BackupSet, CopyOutcome, ExcludeRule, ProgressEvent, ProgressTracker,
};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn run(set: BackupSet, dest: &Path) -> (ezbak::core::RunSummary, Vec<ProgressEvent>) {
    let runner = BackupRunner::new(ProgressTracker::new());
    let (tx, mut rx) = mpsc::channel(256);

    let handle = {
        let dest = dest.to_path_buf();
        tokio::spawn(async move {
            runner
                .run(Uuid::now_v7(), set, dest, tx, CancellationToken::new())
                .await
        })
    };

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let summary = handle.await.unwrap().unwrap();
    (summary, events)
}

#[tokio::test]
async fn scenario_include_file_and_directory_with_extension_exclude() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(src.join("docs")).unwrap();
    fs::write(src.join("a.txt"), b"a").unwrap();
    fs::write(src.join("docs/readme.md"), b"readme").unwrap();
    fs::write(src.join("docs/notes.tmp"), b"scratch").unwrap();
    let dest = temp.path().join("backup");

    let set = BackupSet {
        includes: vec![src.join("a.txt"), src.join("docs")],
        excludes: vec![ExcludeRule::Extension(".tmp".into())],
    };

    let (summary, events) = run(set, &dest).await;

    assert_eq!(summary.copied, 2);
    assert_eq!(summary.skipped_excluded, 1);
    assert_eq!(summary.failed(), 0);

    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"a");
    assert_eq!(fs::read(dest.join("docs/readme.md")).unwrap(), b"readme");
    assert!(!dest.join("docs/notes.tmp").exists());

    // The excluded file is still reported, with no destination.
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::File {
            source,
            destination: None,
            outcome: CopyOutcome::SkippedExcluded,
        } if source.ends_with("notes.tmp")
    )));
}

#[tokio::test]
async fn second_run_skips_everything_unchanged() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("one.txt"), b"one").unwrap();
    fs::write(src.join("two.txt"), b"two").unwrap();
    let dest = temp.path().join("backup");

    let set = BackupSet {
        includes: vec![src],
        excludes: vec![],
    };

    let (first, _) = run(set.clone(), &dest).await;
    assert_eq!(first.copied, 2);

    let (second, _) = run(set, &dest).await;
    assert_eq!(second.copied, 0);
    assert_eq!(second.skipped_not_newer, 2);
    assert_eq!(second.failed(), 0);
}

#[tokio::test]
async fn newer_source_overwrites_older_destination() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("report.txt"), b"fresh").unwrap();
    let dest = temp.path().join("backup");
    fs::create_dir_all(dest.join("src")).unwrap();
    fs::write(dest.join("src/report.txt"), b"stale").unwrap();
    filetime::set_file_mtime(
        dest.join("src/report.txt"),
        FileTime::from_unix_time(1_000_000, 0),
    )
    .unwrap();

    let set = BackupSet {
        includes: vec![src],
        excludes: vec![],
    };

    let (summary, _) = run(set, &dest).await;
    assert_eq!(summary.copied, 1);
    assert_eq!(fs::read(dest.join("src/report.txt")).unwrap(), b"fresh");
}

#[tokio::test]
async fn older_source_leaves_destination_alone() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("report.txt"), b"old").unwrap();
    filetime::set_file_mtime(
        src.join("report.txt"),
        FileTime::from_unix_time(1_000_000, 0),
    )
    .unwrap();
    let dest = temp.path().join("backup");
    fs::create_dir_all(dest.join("src")).unwrap();
    fs::write(dest.join("src/report.txt"), b"current").unwrap();

    let set = BackupSet {
        includes: vec![src],
        excludes: vec![],
    };

    let (summary, _) = run(set, &dest).await;
    assert_eq!(summary.copied, 0);
    assert_eq!(summary.skipped_not_newer, 1);
    assert_eq!(fs::read(dest.join("src/report.txt")).unwrap(), b"current");
}

#[tokio::test]
async fn one_bad_file_does_not_stop_the_rest() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(src.join("blocked")).unwrap();
    fs::write(src.join("good-1.txt"), b"1").unwrap();
    fs::write(src.join("good-2.txt"), b"2").unwrap();
    fs::write(src.join("blocked/victim.txt"), b"x").unwrap();
    let dest = temp.path().join("backup");

    // Occupy the destination subdirectory's path with a file so the copy
    // for blocked/victim.txt cannot create its parent.
    fs::create_dir_all(dest.join("src")).unwrap();
    fs::write(dest.join("src/blocked"), b"in the way").unwrap();

    let set = BackupSet {
        includes: vec![src],
        excludes: vec![],
    };

    let (summary, _) = run(set, &dest).await;
    assert_eq!(summary.copied, 2);
    assert_eq!(summary.failed(), 1);
    assert!(
        summary.failures[0]
            .path
            .ends_with(PathBuf::from("blocked/victim.txt"))
    );
    assert!(dest.join("src/good-1.txt").exists());
    assert!(dest.join("src/good-2.txt").exists());
}

#[tokio::test]
async fn missing_include_is_a_recorded_failure_not_an_abort() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("keep.txt"), b"keep").unwrap();
    let dest = temp.path().join("backup");

    let set = BackupSet {
        includes: vec![temp.path().join("does-not-exist"), src],
        excludes: vec![],
    };

    let (summary, events) = run(set, &dest).await;
    assert_eq!(summary.copied, 1);
    assert_eq!(summary.failed(), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::File {
            outcome: CopyOutcome::Failed { .. },
            ..
        }
    )));
}

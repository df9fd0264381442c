mod common;

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Local;
use common::{activities, files_below, materials, write_file, SwitchProbe};
use dropwatch_core::platform::RenameProbe;
use dropwatch_core::transfer::FileCopier;
use dropwatch_core::{Error, TransferEngine, TransferOutcome};
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

const SIX_MIB: usize = 6 * 1024 * 1024;

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let tmp = tempdir().unwrap();
    let incoming = tmp.path().join("incoming");
    let processed = tmp.path().join("processed");
    fs::create_dir_all(&incoming).unwrap();
    (tmp, incoming, processed)
}

fn engine(processed: &Path) -> TransferEngine {
    TransferEngine::new(
        processed.to_path_buf(),
        materials(),
        activities(),
        Arc::new(RenameProbe),
    )
    .with_invalid_file_grace(Duration::ZERO)
}

fn dated_dir(root: &Path) -> PathBuf {
    let today = Local::now().date_naive();
    root.join(today.format("%Y").to_string())
        .join(today.format("%B").to_string())
        .join(today.format("%d").to_string())
}

/// Writes only half of the source.
struct TruncatingCopier;

impl FileCopier for TruncatingCopier {
    fn copy(&self, source: &Path, destination: &Path, _cancel: &CancellationToken) -> io::Result<bool> {
        let data = fs::read(source)?;
        let mut out = File::create(destination)?;
        out.write_all(&data[..data.len() / 2])?;
        Ok(true)
    }
}

#[tokio::test]
async fn test_ready_file_is_moved_into_dated_tree() {
    let (_tmp, incoming, processed) = setup();
    let source = incoming.join("KL_KHI_Episode_01.mp4");
    write_file(&source, SIX_MIB);

    let outcome = engine(&processed)
        .transfer(&source, &CancellationToken::new())
        .await
        .unwrap();

    let destination = match outcome {
        TransferOutcome::Transferred(destination) => destination,
        other => panic!("expected a completed transfer, got {other:?}"),
    };
    let expected_dir = dated_dir(&processed.join("KONTEN LOKAL").join("KEPRI HARI INI"));
    assert_eq!(destination.directory, expected_dir);
    assert_eq!(destination.file_name, "Episode_01.mp4");

    let target = destination.full_path();
    assert_eq!(fs::metadata(&target).unwrap().len(), SIX_MIB as u64);
    assert!(!source.exists(), "source should be deleted after a verified copy");
}

#[tokio::test]
async fn test_copy_preserves_modification_time() {
    let (_tmp, incoming, processed) = setup();
    let source = incoming.join("KN_KM_Dialog.mov");
    write_file(&source, 4096);
    let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(stamp)
        .unwrap();

    let outcome = engine(&processed)
        .transfer(&source, &CancellationToken::new())
        .await
        .unwrap();
    let destination = match outcome {
        TransferOutcome::Transferred(destination) => destination,
        other => panic!("expected a completed transfer, got {other:?}"),
    };

    let modified = fs::metadata(destination.full_path()).unwrap().modified().unwrap();
    assert_eq!(modified, stamp);
}

#[tokio::test]
async fn test_existing_destination_is_overwritten() {
    let (_tmp, incoming, processed) = setup();
    let dir = dated_dir(&processed.join("KONTEN LOKAL").join("KEPRI HARI INI"));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Episode_02.mp4"), b"stale copy from an earlier run").unwrap();

    let source = incoming.join("KL_KHI_Episode_02.mp4");
    write_file(&source, 8192);

    engine(&processed)
        .transfer(&source, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fs::metadata(dir.join("Episode_02.mp4")).unwrap().len(), 8192);
}

#[tokio::test]
async fn test_size_mismatch_keeps_source_and_removes_copy() {
    let (_tmp, incoming, processed) = setup();
    let source = incoming.join("KL_KHI_Episode_03.mp4");
    write_file(&source, 8192);

    let engine = engine(&processed).with_copier(Arc::new(TruncatingCopier));
    let result = engine.transfer(&source, &CancellationToken::new()).await;

    match result {
        Err(Error::CopyVerificationFailed {
            destination,
            expected,
            actual,
        }) => {
            assert_eq!(expected, 8192);
            assert_eq!(actual, 4096);
            assert!(!destination.exists(), "partial copy must be removed");
        }
        other => panic!("expected CopyVerificationFailed, got {other:?}"),
    }
    assert!(source.exists(), "source must survive a failed verification");
}

#[tokio::test]
async fn test_invalid_name_is_deleted() {
    let (_tmp, incoming, processed) = setup();
    let source = incoming.join("Episode.mp4");
    write_file(&source, 2048);

    let result = engine(&processed)
        .transfer(&source, &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(Error::InvalidFormat { removed: true, .. })
    ));
    assert!(!source.exists());
    assert!(!processed.exists(), "nothing should be copied for an invalid name");
}

#[tokio::test]
async fn test_locked_invalid_name_is_left_in_place() {
    let (_tmp, incoming, processed) = setup();
    let source = incoming.join("KL_KHI_NoExtension");
    write_file(&source, 2048);

    let engine = TransferEngine::new(processed, materials(), activities(), SwitchProbe::locked())
        .with_invalid_file_grace(Duration::ZERO);
    let result = engine.transfer(&source, &CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(Error::InvalidFormat { removed: false, .. })
    ));
    assert!(source.exists());
}

#[tokio::test]
async fn test_relocked_source_is_reported_after_copy() {
    let (_tmp, incoming, processed) = setup();
    let source = incoming.join("KL_KHI_Episode_04.mp4");
    write_file(&source, 4096);

    let engine = TransferEngine::new(processed, materials(), activities(), SwitchProbe::locked());
    let result = engine.transfer(&source, &CancellationToken::new()).await;

    match result {
        Err(Error::SourceDeleteFailedAfterCopy {
            source_path,
            destination,
            ..
        }) => {
            assert_eq!(source_path, source);
            assert_eq!(fs::metadata(&destination).unwrap().len(), 4096);
        }
        other => panic!("expected SourceDeleteFailedAfterCopy, got {other:?}"),
    }
    assert!(source.exists());
}

#[tokio::test]
async fn test_cancelled_copy_leaves_no_destination() {
    let (_tmp, incoming, processed) = setup();
    let source = incoming.join("KL_KHI_Episode_05.mp4");
    write_file(&source, SIX_MIB);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = engine(&processed).transfer(&source, &cancel).await.unwrap();

    assert_eq!(outcome, TransferOutcome::Cancelled);
    assert!(source.exists());
    assert!(!dated_dir(&processed.join("KONTEN LOKAL").join("KEPRI HARI INI"))
        .join("Episode_05.mp4")
        .exists());
}

#[tokio::test]
async fn test_unsafe_code_keeps_source() {
    let (_tmp, incoming, processed) = setup();
    let source = incoming.join(".._KHI_Escape.mp4");
    write_file(&source, 4096);

    let result = engine(&processed)
        .transfer(&source, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::UnsafeDestination { .. })));
    assert!(source.exists());
}

#[tokio::test]
async fn test_empty_activity_files_under_material() {
    let (_tmp, incoming, processed) = setup();
    let source = incoming.join("KL__Title.mp4");
    write_file(&source, 4096);

    let outcome = engine(&processed)
        .transfer(&source, &CancellationToken::new())
        .await
        .unwrap();

    let target = dated_dir(&processed.join("KONTEN LOKAL")).join("Title.mp4");
    match outcome {
        TransferOutcome::Transferred(destination) => assert_eq!(destination.full_path(), target),
        other => panic!("expected a completed transfer, got {other:?}"),
    }
    assert_eq!(fs::metadata(&target).unwrap().len(), 4096);
    assert!(!source.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_non_utf8_title_is_not_renamed() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let (_tmp, incoming, processed) = setup();
    let source = incoming.join(OsStr::from_bytes(b"KL_KHI_Ep\xff01.mp4"));
    write_file(&source, 4096);

    engine(&processed)
        .transfer(&source, &CancellationToken::new())
        .await
        .unwrap();

    let copied = files_below(&processed);
    assert_eq!(copied.len(), 1);
    assert_eq!(copied[0].file_name().unwrap().as_bytes(), b"Ep\xff01.mp4");
    assert_eq!(
        copied[0].parent().unwrap(),
        dated_dir(&processed.join("KONTEN LOKAL").join("KEPRI HARI INI"))
    );
    assert!(!source.exists());
}

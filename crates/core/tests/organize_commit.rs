//! Organizer commit protocol integration tests.
//!
//! These drive a single organizer run against a real cache directory and
//! library tree, with the service, database and mover mocked:
//! plan -> stop service -> update rows -> move -> delete -> commit -> start -> rescan

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use grinder_core::{
    library::MediaItem,
    organizer::{CommitStep, OrganizeError, OrganizeReport, OrganizerDeps, OrganizerState},
    rules::TimeWindow,
    testing::{
        fixtures, DatabaseFault, MockDatabase, MockLibrary, MockMover, MockService,
        RecordingNotifier, RecordingTerminator, ServiceCall,
    },
    Notification, Organizer, PathMapper,
};

struct TestHarness {
    library: MockLibrary,
    mover: MockMover,
    database: MockDatabase,
    service: MockService,
    notifier: RecordingNotifier,
    fatal: RecordingTerminator,
    cache: TempDir,
    media: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            library: MockLibrary::new(),
            mover: MockMover::new(),
            database: MockDatabase::new(),
            service: MockService::new(),
            notifier: RecordingNotifier::new(),
            fatal: RecordingTerminator::new(),
            cache: TempDir::new().expect("Failed to create cache dir"),
            media: TempDir::new().expect("Failed to create media dir"),
        }
    }

    fn deps(&self, rescan_windows: Vec<TimeWindow>, readonly: bool) -> Arc<OrganizerDeps> {
        Arc::new(OrganizerDeps {
            cache_dir: self.cache.path().to_path_buf(),
            mapper: Arc::new(PathMapper::new(Vec::new())),
            mover: Arc::new(self.mover.clone()),
            database: Arc::new(self.database.clone()),
            service: Arc::new(self.service.clone()),
            connector: Arc::new(self.library.clone()),
            fatal: Arc::new(self.fatal.clone()),
            notifier: Arc::new(self.notifier.clone()),
            audit: None,
            rescan_windows,
            readonly,
        })
    }

    fn organizer(&self) -> Organizer {
        Organizer::new(0, self.deps(vec![always()], false))
    }

    /// Writes an original file into the library and returns its item.
    fn original(&self, rating_key: &str, file_name: &str) -> MediaItem {
        let path = self.media.path().join(file_name);
        std::fs::write(&path, b"original").expect("Failed to write original");
        fixtures::media_item(rating_key, &path.to_string_lossy())
    }

    /// Writes a transcoded output into the item's cache directory.
    fn output(&self, rating_key: &str, file_name: &str) -> PathBuf {
        let dir = self.cache.path().join(rating_key);
        std::fs::create_dir_all(&dir).expect("Failed to create item cache dir");
        let path = dir.join(file_name);
        std::fs::write(&path, b"transcoded").expect("Failed to write output");
        path
    }

    fn library_file(&self, file_name: &str) -> PathBuf {
        self.media.path().join(file_name)
    }
}

fn always() -> TimeWindow {
    TimeWindow::parse("00:00", "00:00").unwrap()
}

async fn finish(organizer: &mut Organizer) -> Result<OrganizeReport, OrganizeError> {
    let start = std::time::Instant::now();
    loop {
        if let Some(result) = organizer.reap().await {
            return result;
        }
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "organizer run did not finish"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn exists(path: &Path) -> bool {
    path.exists()
}

#[tokio::test]
async fn test_commit_moves_output_and_repoints_row() {
    let h = TestHarness::new();
    let item = h.original("101", "Heat.avi");
    h.output("101", "Heat.mkv");

    let mut organizer = h.organizer();
    assert!(organizer.organize(vec![item.clone()]));
    assert!(organizer.is_organizing());

    let report = finish(&mut organizer).await.expect("organize should succeed");
    assert_eq!(report.committed, vec!["101"]);
    assert_eq!(report.moved, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.mismatched_rows, 0);
    assert_eq!(report.rescanned, vec!["1"]);
    assert!(!report.readonly);
    assert_eq!(organizer.state(), OrganizerState::Ready);

    assert!(exists(&h.library_file("Heat.mkv")));
    assert!(!exists(&h.library_file("Heat.avi")));
    assert!(!exists(&h.cache.path().join("101")));

    let committed = h.database.committed();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].old_path, item.locations[0]);
    assert_eq!(
        committed[0].new_path,
        h.library_file("Heat.mkv").to_string_lossy()
    );

    assert_eq!(
        h.service.calls().await,
        vec![ServiceCall::Stop, ServiceCall::Start]
    );
    assert_eq!(h.library.refreshed_sections().await, vec!["1"]);
    assert!(!h.fatal.was_invoked().await);
}

#[tokio::test]
async fn test_same_name_output_replaces_original_without_row_update() {
    let h = TestHarness::new();
    let item = h.original("7", "Alien.mkv");
    h.output("7", "Alien.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    let report = finish(&mut organizer).await.unwrap();

    assert_eq!(report.committed, vec!["7"]);
    assert_eq!(report.moved, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(
        std::fs::read(h.library_file("Alien.mkv")).unwrap(),
        b"transcoded"
    );
    assert!(h.database.committed().is_empty());
    assert_eq!(h.database.session_count(), 1);
}

#[tokio::test]
async fn test_empty_transaction_leaves_service_running() {
    let h = TestHarness::new();
    let item = h.original("5", "Ran.avi");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    let report = finish(&mut organizer).await.unwrap();

    assert!(report.committed.is_empty());
    assert_eq!(report.stale, vec!["5"]);
    assert!(h.service.calls().await.is_empty());
    assert_eq!(h.database.session_count(), 0);
    assert!(h.library.refreshed_sections().await.is_empty());
    assert!(exists(&h.library_file("Ran.avi")));
}

#[tokio::test]
async fn test_orphan_cache_dirs_are_removed() {
    let h = TestHarness::new();
    let item = h.original("1", "Ikiru.avi");
    h.output("1", "Ikiru.mkv");
    h.output("999", "leftover.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    let report = finish(&mut organizer).await.unwrap();

    assert_eq!(report.orphans_removed, 1);
    assert!(!exists(&h.cache.path().join("999")));
    assert_eq!(report.committed, vec!["1"]);
}

#[tokio::test]
async fn test_row_count_mismatch_is_reported_not_fatal() {
    let h = TestHarness::new();
    h.database.set_rows_per_update(0);
    let item = h.original("3", "Ran.avi");
    h.output("3", "Ran.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    let report = finish(&mut organizer).await.unwrap();

    assert_eq!(report.mismatched_rows, 1);
    assert_eq!(report.committed, vec!["3"]);
    assert!(!h.fatal.was_invoked().await);
}

#[tokio::test]
async fn test_outside_rescan_window_skips_rescan() {
    let h = TestHarness::new();
    let item = h.original("8", "Stalker.avi");
    h.output("8", "Stalker.mkv");

    let mut organizer = Organizer::new(0, h.deps(Vec::new(), false));
    organizer.organize(vec![item]);
    let report = finish(&mut organizer).await.unwrap();

    assert_eq!(report.committed, vec!["8"]);
    assert!(report.rescanned.is_empty());
    assert!(h.library.refreshed_sections().await.is_empty());
    assert_eq!(
        h.service.calls().await,
        vec![ServiceCall::Stop, ServiceCall::Start]
    );
}

#[tokio::test]
async fn test_rescan_failure_does_not_fail_the_run() {
    let h = TestHarness::new();
    h.library.fail_refresh(true).await;
    let item = h.original("8", "Solaris.avi");
    h.output("8", "Solaris.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    let report = finish(&mut organizer).await.unwrap();

    assert_eq!(report.committed, vec!["8"]);
    assert!(report.rescanned.is_empty());
    assert!(organizer.is_ready());
}

#[tokio::test]
async fn test_readonly_changes_nothing() {
    let h = TestHarness::new();
    let item = h.original("4", "Ran.avi");
    let output = h.output("4", "Ran.mkv");

    let mut organizer = Organizer::new(0, h.deps(vec![always()], true));
    organizer.organize(vec![item]);
    let report = finish(&mut organizer).await.unwrap();

    assert!(report.readonly);
    assert_eq!(report.committed, vec!["4"]);
    assert_eq!(report.moved, 0);
    assert!(exists(&output));
    assert!(exists(&h.library_file("Ran.avi")));
    assert!(h.service.calls().await.is_empty());
    assert_eq!(h.database.session_count(), 0);
    assert!(h.mover.moves().await.is_empty());
}

async fn assert_fatal_abort(h: &TestHarness, organizer: &mut Organizer, step: CommitStep) {
    let err = finish(organizer).await.unwrap_err();
    match err {
        OrganizeError::Commit { step: failed, .. } => assert_eq!(failed, step),
        other => panic!("expected commit failure, got {other:?}"),
    }
    assert!(organizer.is_zombie());

    let reasons = h.fatal.reasons().await;
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].starts_with(&step.to_string()));

    assert_eq!(h.service.calls().await, vec![ServiceCall::Stop]);
    assert!(h.library.refreshed_sections().await.is_empty());
    assert!(h.database.committed().is_empty());
    assert!(h
        .notifier
        .notifications()
        .await
        .iter()
        .any(|n| matches!(n, Notification::TransactionAborted { .. })));
}

#[tokio::test]
async fn test_update_failure_is_fatal() {
    let h = TestHarness::new();
    h.database.set_fault(DatabaseFault::Update(0));
    let item = h.original("11", "Ran.avi");
    let output = h.output("11", "Ran.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    assert_fatal_abort(&h, &mut organizer, CommitStep::Update).await;

    assert!(exists(&h.library_file("Ran.avi")));
    assert!(exists(&output));
}

#[tokio::test]
async fn test_open_failure_is_fatal_at_update_step() {
    let h = TestHarness::new();
    h.database.set_fault(DatabaseFault::Begin);
    let item = h.original("11", "Ran.avi");
    h.output("11", "Ran.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    assert_fatal_abort(&h, &mut organizer, CommitStep::Update).await;
}

#[tokio::test]
async fn test_move_failure_is_fatal() {
    let h = TestHarness::new();
    h.mover.fail_move(true).await;
    let item = h.original("12", "Ran.avi");
    h.output("12", "Ran.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    assert_fatal_abort(&h, &mut organizer, CommitStep::Move).await;

    assert!(exists(&h.library_file("Ran.avi")));
}

#[tokio::test]
async fn test_delete_failure_is_fatal() {
    let h = TestHarness::new();
    h.mover.fail_remove_file(true).await;
    let item = h.original("13", "Ran.avi");
    h.output("13", "Ran.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    assert_fatal_abort(&h, &mut organizer, CommitStep::Delete).await;
}

#[tokio::test]
async fn test_move_failure_midway_is_fatal() {
    let h = TestHarness::new();
    h.mover.fail_move_after(1).await;
    let items = vec![
        h.original("21", "Ran.avi"),
        h.original("22", "Kagemusha.avi"),
        h.original("23", "Ikiru.avi"),
    ];
    h.output("21", "Ran.mkv");
    h.output("22", "Kagemusha.mkv");
    h.output("23", "Ikiru.mkv");

    let mut organizer = h.organizer();
    organizer.organize(items);
    assert_fatal_abort(&h, &mut organizer, CommitStep::Move).await;

    assert_eq!(h.mover.moves().await.len(), 1);
    let placed = ["Ran.mkv", "Kagemusha.mkv", "Ikiru.mkv"]
        .iter()
        .filter(|f| exists(&h.library_file(f)))
        .count();
    assert_eq!(placed, 1);
    for original in ["Ran.avi", "Kagemusha.avi", "Ikiru.avi"] {
        assert!(exists(&h.library_file(original)));
    }
}

#[tokio::test]
async fn test_delete_failure_midway_is_fatal() {
    let h = TestHarness::new();
    h.mover.fail_remove_file_after(1).await;
    let items = vec![
        h.original("31", "Ran.avi"),
        h.original("32", "Kagemusha.avi"),
        h.original("33", "Ikiru.avi"),
    ];
    h.output("31", "Ran.mkv");
    h.output("32", "Kagemusha.mkv");
    h.output("33", "Ikiru.mkv");

    let mut organizer = h.organizer();
    organizer.organize(items);
    assert_fatal_abort(&h, &mut organizer, CommitStep::Delete).await;

    assert_eq!(h.mover.moves().await.len(), 3);
    let deleted = ["Ran.avi", "Kagemusha.avi", "Ikiru.avi"]
        .iter()
        .filter(|f| !exists(&h.library_file(f)))
        .count();
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn test_commit_failure_is_fatal() {
    let h = TestHarness::new();
    h.database.set_fault(DatabaseFault::Commit);
    let item = h.original("14", "Ran.avi");
    h.output("14", "Ran.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    assert_fatal_abort(&h, &mut organizer, CommitStep::Commit).await;
}

#[tokio::test]
async fn test_service_stop_failure_zombifies_without_fatal() {
    let h = TestHarness::new();
    h.service.fail_stop(true).await;
    let item = h.original("15", "Ran.avi");
    h.output("15", "Ran.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item]);
    let err = finish(&mut organizer).await.unwrap_err();

    assert!(matches!(err, OrganizeError::ServiceStop(_)));
    assert!(organizer.is_zombie());
    assert!(!h.fatal.was_invoked().await);
    assert_eq!(h.database.session_count(), 0);
    assert!(exists(&h.library_file("Ran.avi")));
}

#[tokio::test]
async fn test_zombie_organizer_refuses_work() {
    let h = TestHarness::new();
    h.service.fail_start(true).await;
    let item = h.original("16", "Ran.avi");
    h.output("16", "Ran.mkv");

    let mut organizer = h.organizer();
    organizer.organize(vec![item.clone()]);
    let err = finish(&mut organizer).await.unwrap_err();
    match err {
        OrganizeError::ServiceStart { report, .. } => {
            assert_eq!(report.committed, vec!["16".to_string()]);
            assert_eq!(report.moved, 1);
            assert!(!report.rescanned);
        }
        other => panic!("expected service start failure, got {other:?}"),
    }
    assert_eq!(h.database.committed().len(), 1);
    assert!(exists(&h.library_file("Ran.mkv")));
    assert!(!exists(&h.cache.path().join("16")));
    assert!(h.library.refreshed_sections().await.is_empty());
    assert!(!h.fatal.was_invoked().await);

    assert!(!organizer.organize(vec![item]));
}

/*!
 * Interrupted-run and resume tests: whatever stage a run stops at, the next
 * run picks up from the persisted state instead of starting over.
 */

use std::sync::Arc;
use std::sync::atomic::Ordering;

use bookforge::pipeline::Orchestrator;
use bookforge::roles::Role;
use bookforge::roles::mock::{MockBehavior, MockFetcher, MockTranslator};
use bookforge::store::BookStore;

use crate::common;

fn orchestrator_with(
    dir: &tempfile::TempDir,
    fetcher: Arc<MockFetcher>,
    translator: Arc<MockTranslator>,
    task: &bookforge::app_config::Task,
) -> Orchestrator {
    let registry = common::registry_of(vec![
        Role::Fetcher(fetcher),
        Role::Translator(translator),
    ]);
    Orchestrator::new(
        registry,
        BookStore::open(dir.path().join("store"), 0).unwrap(),
        common::config_for(task),
        common::role_ctx(dir),
    )
}

#[tokio::test]
async fn test_failedTranslationRun_shouldResumeWithoutRefetching() {
    let dir = common::create_temp_dir().unwrap();
    let task = common::sample_task(&["t"], &[]);

    // First run: content lands in the store but every translation call fails
    let fetcher = common::sample_fetcher();
    let broken = Arc::new(MockTranslator::new("t", MockBehavior::Failing));
    let first = orchestrator_with(&dir, fetcher, broken, &task);
    let report = first.run_task(&task).await.unwrap();
    assert_eq!(report.episodes_fetched, 2);
    assert_eq!(report.translation.translated, 0);
    assert_eq!(report.pending_after, 3);

    // Second run against the same store: a working backend fills the pending
    // lines, the fetcher is only asked for structure
    let fetcher = common::sample_fetcher();
    let working = Arc::new(MockTranslator::working("t"));
    let second = orchestrator_with(&dir, fetcher.clone(), working, &task);
    let report = second.run_task(&task).await.unwrap();
    assert_eq!(report.episodes_fetched, 0);
    assert_eq!(fetcher.content_calls(), 0);
    assert_eq!(report.translation.translated, 3);
    assert_eq!(report.pending_after, 0);
}

#[tokio::test]
async fn test_runStoppedBeforeTranslation_shouldResumeAtTranslation() {
    let dir = common::create_temp_dir().unwrap();

    // A run configured with no translators stops after the content stage
    let fetch_only_task = common::sample_task(&[], &[]);
    let fetcher = common::sample_fetcher();
    let translator = Arc::new(MockTranslator::working("t"));
    let first = orchestrator_with(&dir, fetcher, translator, &fetch_only_task);
    let report = first.run_task(&fetch_only_task).await.unwrap();
    assert_eq!(report.episodes_fetched, 2);
    assert_eq!(report.pending_after, 3);

    // Next run with a translator chain resumes from the stored content
    let task = common::sample_task(&["t"], &[]);
    let fetcher = common::sample_fetcher();
    let translator = Arc::new(MockTranslator::working("t"));
    let second = orchestrator_with(&dir, fetcher.clone(), translator, &task);
    let report = second.run_task(&task).await.unwrap();
    assert_eq!(fetcher.content_calls(), 0);
    assert_eq!(report.translation.translated, 3);
}

#[tokio::test]
async fn test_abortedRun_shouldLeaveStoreUntouchedAndRetryable() {
    let dir = common::create_temp_dir().unwrap();
    let task = common::sample_task(&["t"], &[]);
    let fetcher = common::sample_fetcher();
    let translator = Arc::new(MockTranslator::working("t"));
    let orchestrator = orchestrator_with(&dir, fetcher.clone(), translator, &task);

    orchestrator.abort_flag().store(true, Ordering::SeqCst);
    assert!(orchestrator.run_task(&task).await.is_err());
    assert_eq!(fetcher.structure_calls(), 0);

    // Clearing the flag makes the same orchestrator usable again
    orchestrator.abort_flag().store(false, Ordering::SeqCst);
    let report = orchestrator.run_task(&task).await.unwrap();
    assert_eq!(report.translation.translated, 3);
}

#[test]
fn test_storeReopen_shouldServePersistedTranslations() {
    common::init_test_logging();
    let dir = common::create_temp_dir().unwrap();
    let task = common::sample_task(&["t"], &[]);

    tokio_test::block_on(async {
        let fetcher = common::sample_fetcher();
        let translator = Arc::new(MockTranslator::working("t"));
        let orchestrator = orchestrator_with(&dir, fetcher, translator, &task);
        orchestrator.run_task(&task).await.unwrap();
    });

    // A brand new store instance sees the finished book on disk
    let store = BookStore::open(dir.path().join("store"), 0).unwrap();
    let book = store.load(common::BOOK_URL).unwrap().unwrap();
    assert!(book.fully_translated());
    assert!(store.query_untranslated(common::BOOK_URL).unwrap().is_empty());
}

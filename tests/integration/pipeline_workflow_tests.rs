/*!
 * End-to-end incremental pipeline tests: repeated runs against a changing
 * source must only ever touch what actually changed.
 */

use std::sync::Arc;

use bookforge::book::{Book, Chapter, Episode};
use bookforge::pipeline::Orchestrator;
use bookforge::roles::Role;
use bookforge::roles::html::{HtmlExporter, JsonExporter};
use bookforge::roles::mock::{MockFetcher, MockTranslator};

use crate::common;

struct Pipeline {
    _dir: tempfile::TempDir,
    fetcher: Arc<MockFetcher>,
    translator: Arc<MockTranslator>,
    store: bookforge::store::BookStore,
    orchestrator: Orchestrator,
    task: bookforge::app_config::Task,
}

fn pipeline() -> Pipeline {
    let dir = common::create_temp_dir().unwrap();
    let fetcher = common::sample_fetcher();
    let translator = Arc::new(MockTranslator::working("t"));
    let task = common::sample_task(&["t"], &[]);
    let registry = common::registry_of(vec![
        Role::Fetcher(fetcher.clone()),
        Role::Translator(translator.clone()),
    ]);
    let store = common::open_store(&dir).unwrap();
    let orchestrator = Orchestrator::new(
        registry,
        store.clone(),
        common::config_for(&task),
        common::role_ctx(&dir),
    );
    Pipeline {
        fetcher,
        translator,
        store,
        orchestrator,
        task,
        _dir: dir,
    }
}

/// The sample skeleton with every episode stamped as updated now, forcing a
/// content refetch on the next run
fn touched_skeleton() -> Book {
    let mut book = common::sample_skeleton();
    for chapter in &mut book.chapters {
        for episode in &mut chapter.episodes {
            episode.time_meta.updated_at = Some(chrono::Utc::now());
        }
    }
    book
}

#[tokio::test]
async fn test_rerunWithoutSourceChanges_shouldDoNothing() {
    let p = pipeline();
    let first = p.orchestrator.run_task(&p.task).await.unwrap();
    assert_eq!(first.translation.translated, 3);
    let calls_after_first = p.translator.calls();
    let fetches_after_first = p.fetcher.content_calls();

    let second = p.orchestrator.run_task(&p.task).await.unwrap();
    assert_eq!(second.episodes_fetched, 0);
    assert_eq!(second.translation.batches_dispatched, 0);
    assert_eq!(second.pending_after, 0);
    assert_eq!(p.translator.calls(), calls_after_first);
    assert_eq!(p.fetcher.content_calls(), fetches_after_first);
}

#[tokio::test]
async fn test_changedLine_shouldRetranslateOnlyThatLine() {
    let p = pipeline();
    p.orchestrator.run_task(&p.task).await.unwrap();

    // The source rewrites one line of e1 and stamps the episode updated
    p.fetcher.set_structure(touched_skeleton());
    p.fetcher
        .set_content("c1", "e1", vec!["line one rewritten", "line two"]);

    let report = p.orchestrator.run_task(&p.task).await.unwrap();
    assert_eq!(report.updated_episodes, 2);
    // One line changed; the other three keep their translations untouched
    assert_eq!(report.translation.translated, 1);

    let book = p.store.load(common::BOOK_URL).unwrap().unwrap();
    let lines = &book.chapters[0].episodes[0].lines;
    assert_eq!(lines[0].translated.as_deref(), Some("t::line one rewritten"));
    assert_eq!(lines[1].translated.as_deref(), Some("t::line two"));
}

#[tokio::test]
async fn test_reorderedAndRenamedEpisodes_shouldNotRefetchOrDuplicate() {
    let p = pipeline();
    p.orchestrator.run_task(&p.task).await.unwrap();

    // Same ids, new order and a renamed episode, no updated stamps
    let mut skeleton = Book::new("Sample Book", "Author", common::BOOK_URL);
    let mut chapter = Chapter::new("c1", "Chapter One");
    chapter.episodes.push(Episode::new("e2", "Second"));
    chapter.episodes.push(Episode::new("e1", "First, Revised"));
    skeleton.chapters.push(chapter);
    p.fetcher.set_structure(skeleton);

    let report = p.orchestrator.run_task(&p.task).await.unwrap();
    assert_eq!(report.new_episodes, 0);
    assert_eq!(report.episodes_fetched, 0);
    assert_eq!(report.translation.batches_dispatched, 0);
    assert_eq!(report.pending_after, 0);
}

#[tokio::test]
async fn test_delistedEpisode_shouldSurviveAsOrphan() {
    let p = pipeline();
    p.orchestrator.run_task(&p.task).await.unwrap();

    // The source stops listing e2
    let mut skeleton = Book::new("Sample Book", "Author", common::BOOK_URL);
    let mut chapter = Chapter::new("c1", "Chapter One");
    chapter.episodes.push(Episode::new("e1", "First"));
    skeleton.chapters.push(chapter);
    p.fetcher.set_structure(skeleton);

    let report = p.orchestrator.run_task(&p.task).await.unwrap();
    assert_eq!(report.orphaned, 1);
    assert_eq!(report.pending_after, 0);
}

#[tokio::test]
async fn test_newEpisode_shouldBeFetchedAndTranslatedAlone() {
    let p = pipeline();
    p.orchestrator.run_task(&p.task).await.unwrap();
    let calls_after_first = p.translator.calls();

    let mut skeleton = common::sample_skeleton();
    skeleton.chapters[0]
        .episodes
        .push(Episode::new("e3", "Third"));
    p.fetcher.set_structure(skeleton);
    p.fetcher.set_content("c1", "e3", vec!["fresh line"]);

    let report = p.orchestrator.run_task(&p.task).await.unwrap();
    assert_eq!(report.new_episodes, 1);
    assert_eq!(report.episodes_fetched, 1);
    assert_eq!(report.translation.translated, 1);
    assert!(p.translator.calls() > calls_after_first);
}

#[tokio::test]
async fn test_builtinExporters_shouldWriteArtifacts() {
    let dir = common::create_temp_dir().unwrap();
    let fetcher = common::sample_fetcher();
    let translator = Arc::new(MockTranslator::working("t"));
    let task = common::sample_task(&["t"], &["html", "json"]);
    let registry = common::registry_of(vec![
        Role::Fetcher(fetcher),
        Role::Translator(translator),
        Role::Exporter(Arc::new(HtmlExporter::new("html"))),
        Role::Exporter(Arc::new(JsonExporter::new("json"))),
    ]);
    let orchestrator = Orchestrator::new(
        registry,
        common::open_store(&dir).unwrap(),
        common::config_for(&task),
        common::role_ctx(&dir),
    );

    let report = orchestrator.run_task(&task).await.unwrap();
    assert_eq!(report.artifacts.len(), 2);
    assert!(report.export_failures.is_empty());
    for (_, path) in &report.artifacts {
        assert!(path.exists(), "artifact missing: {:?}", path);
    }
    let html_path = &report.artifacts[0].1;
    let html = std::fs::read_to_string(html_path).unwrap();
    assert!(html.contains("t::line one"));
}

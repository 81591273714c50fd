//! Save and restore of a retriever index on disk.

use std::fs;
use std::sync::Arc;

use cogquery_rag::persistence::{DOCUMENTS_FILE, FRAGMENTS_FILE};
use cogquery_rag::{
    Document, HashingEmbeddingProvider, IndexPersistence, ParentChildRetriever, RagError,
    RestoreOutcome, RetrieverStatus, SplitSettings, SplitStrategy,
};
use tempfile::TempDir;

fn retriever(dimensions: usize) -> ParentChildRetriever {
    ParentChildRetriever::builder()
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(dimensions)))
        .build()
        .unwrap()
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new("a.txt", "The sky is blue. Water is wet.")
            .with_metadata("path", "/docs/a.txt"),
        Document::new("b.txt", "Grass is green. Fire is hot."),
        Document::new("c.md", "Rust programs are compiled ahead of time."),
    ]
}

async fn ingested(dimensions: usize) -> ParentChildRetriever {
    let retriever = retriever(dimensions);
    retriever.ingest(&corpus(), 20, 5).await.unwrap();
    retriever
}

#[tokio::test]
async fn restored_index_answers_queries_identically() {
    let dir = TempDir::new().unwrap();
    let persistence = IndexPersistence::in_dir(dir.path());

    let original = ingested(384).await;
    original.save(&persistence).await.unwrap();
    assert!(dir.path().join(FRAGMENTS_FILE).exists());
    assert!(dir.path().join(DOCUMENTS_FILE).exists());

    let restored = retriever(384);
    let outcome = restored.restore(&persistence).await.unwrap();
    let fragments = original.stats().await.fragments;
    assert_eq!(outcome, RestoreOutcome::Restored { documents: 3, fragments });
    assert_eq!(restored.status().await, RetrieverStatus::Ready);
    assert_eq!(restored.stats().await, original.stats().await);

    for query in ["sky color", "fire is hot", "compiled rust", "nothing matches this"] {
        for top_k in 1..=6 {
            let expected = original.retrieve_with_top_k(query, top_k).await.unwrap();
            let actual = restored.retrieve_with_top_k(query, top_k).await.unwrap();
            assert_eq!(actual, expected, "query {query:?} with top_k {top_k}");
        }
    }

    let a = restored.document("a.txt").await.unwrap();
    assert_eq!(a.metadata.get("path").map(String::as_str), Some("/docs/a.txt"));
    assert_eq!(a.source(), Some("a.txt"));
}

#[tokio::test]
async fn missing_artifacts_mean_not_found() {
    let dir = TempDir::new().unwrap();
    let persistence = IndexPersistence::in_dir(dir.path().join("never-saved"));

    let retriever = retriever(384);
    assert_eq!(retriever.restore(&persistence).await.unwrap(), RestoreOutcome::NotFound);
    assert_eq!(retriever.status().await, RetrieverStatus::Uninitialized);
}

#[tokio::test]
async fn one_missing_artifact_means_not_found() {
    let dir = TempDir::new().unwrap();
    let persistence = IndexPersistence::in_dir(dir.path());
    ingested(384).await.save(&persistence).await.unwrap();

    fs::remove_file(dir.path().join(FRAGMENTS_FILE)).unwrap();
    assert!(persistence.load(384).unwrap().is_none());
}

#[tokio::test]
async fn garbage_artifact_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let persistence = IndexPersistence::in_dir(dir.path());
    ingested(384).await.save(&persistence).await.unwrap();

    fs::write(dir.path().join(DOCUMENTS_FILE), b"{ not json").unwrap();

    let retriever = retriever(384);
    let err = retriever.restore(&persistence).await.unwrap_err();
    match err {
        RagError::PersistenceCorrupt { path, .. } => assert!(path.ends_with(DOCUMENTS_FILE)),
        other => panic!("expected PersistenceCorrupt, got {other:?}"),
    }
    assert_eq!(retriever.status().await, RetrieverStatus::Uninitialized);
}

#[test]
fn unknown_format_version_is_corrupt() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(DOCUMENTS_FILE),
        r#"{"format_version": 99, "saved_at": "2026-01-01T00:00:00Z", "documents": {}}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join(FRAGMENTS_FILE),
        concat!(
            r#"{"format_version": 1, "saved_at": "2026-01-01T00:00:00Z", "#,
            r#""dimensions": 8, "fragments": []}"#
        ),
    )
    .unwrap();

    let persistence = IndexPersistence::in_dir(dir.path());
    assert!(matches!(persistence.load(8), Err(RagError::PersistenceCorrupt { .. })));
}

#[tokio::test]
async fn dimension_mismatch_is_incompatible() {
    let dir = TempDir::new().unwrap();
    let persistence = IndexPersistence::in_dir(dir.path());
    ingested(384).await.save(&persistence).await.unwrap();

    let other = retriever(128);
    let err = other.restore(&persistence).await.unwrap_err();
    assert!(matches!(err, RagError::IncompatibleIndex { expected: 128, found: 384 }));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn save_creates_missing_directories() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("deep").join("index");
    let persistence = IndexPersistence::in_dir(&nested);

    ingested(64).await.save(&persistence).await.unwrap();
    assert!(nested.join(FRAGMENTS_FILE).is_file());
    assert!(!nested.join(format!("{FRAGMENTS_FILE}.tmp")).exists());
}

#[tokio::test]
async fn saving_an_empty_retriever_is_rejected() {
    let dir = TempDir::new().unwrap();
    let persistence = IndexPersistence::in_dir(dir.path());

    let err = retriever(64).save(&persistence).await.unwrap_err();
    assert!(matches!(err, RagError::NotReady));
    assert!(!dir.path().join(DOCUMENTS_FILE).exists());
}

#[tokio::test]
async fn failed_save_keeps_previous_artifact() {
    let dir = TempDir::new().unwrap();
    let fragments_path = dir.path().join(FRAGMENTS_FILE);
    let good = IndexPersistence::in_dir(dir.path());
    ingested(64).await.save(&good).await.unwrap();
    let before = fs::read(&fragments_path).unwrap();

    // a directory in place of the documents artifact makes its rename fail
    let blocker = dir.path().join("blocker");
    fs::create_dir_all(blocker.join("inside")).unwrap();
    let broken = IndexPersistence::with_paths(&fragments_path, &blocker);

    let retriever = retriever(64);
    let other = [Document::new("z.txt", "a different corpus entirely")];
    retriever.ingest(&other, 20, 5).await.unwrap();
    assert!(matches!(
        retriever.save(&broken).await,
        Err(RagError::PersistenceIo { .. })
    ));

    assert_eq!(fs::read(&fragments_path).unwrap(), before);
    assert!(!dir.path().join(format!("{FRAGMENTS_FILE}.tmp")).exists());
    assert!(!dir.path().join("blocker.tmp").exists());

    let state = good.load(64).unwrap().unwrap();
    assert_eq!(state.documents().len(), 3);
}

#[tokio::test]
async fn restore_replaces_in_memory_state() {
    let dir = TempDir::new().unwrap();
    let persistence = IndexPersistence::in_dir(dir.path());
    ingested(64).await.save(&persistence).await.unwrap();

    let retriever = retriever(64);
    retriever.ingest(&[Document::new("z.txt", "unsaved")], 20, 5).await.unwrap();
    retriever.restore(&persistence).await.unwrap();

    assert_eq!(retriever.document_ids().await, vec!["a.txt", "b.txt", "c.md"]);
}

#[tokio::test]
async fn rebuild_after_restore_keeps_the_ingest_sizes() {
    let dir = TempDir::new().unwrap();
    let persistence = IndexPersistence::in_dir(dir.path());
    let original = ingested(384).await;
    original.save(&persistence).await.unwrap();

    let state = persistence.load(384).unwrap().unwrap();
    let expected =
        SplitSettings { strategy: SplitStrategy::Window, fragment_size: 20, fragment_overlap: 5 };
    assert_eq!(state.split_settings(), Some(expected));

    // configured with the 1000/150 defaults
    let restored = retriever(384);
    restored.restore(&persistence).await.unwrap();
    let rebuilt = restored.rebuild_index().await.unwrap();
    assert_eq!(rebuilt.fragments, original.stats().await.fragments);
}

#[tokio::test]
async fn artifacts_without_split_settings_still_load() {
    let dir = TempDir::new().unwrap();
    let persistence = IndexPersistence::in_dir(dir.path());
    ingested(384).await.save(&persistence).await.unwrap();

    let path = dir.path().join(FRAGMENTS_FILE);
    let bytes = fs::read(&path).unwrap();
    let mut value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    value.as_object_mut().unwrap().remove("split").unwrap();
    fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    let state = persistence.load(384).unwrap().unwrap();
    assert_eq!(state.split_settings(), None);
    assert_eq!(state.documents().len(), 3);
}

//! Behaviour of the parent/child retriever: scenarios and properties.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use cogquery_rag::{
    Document, DocumentStore, EmbeddingProvider, Fragment, FragmentIndex, HashingEmbeddingProvider,
    IndexState, IngestResult, ParentChildRetriever, RagError, RetrieverConfig, RetrieverStatus,
};
use proptest::prelude::*;

/// Hashing embeddings, except any text mentioning "poison" fails.
struct PoisonSensitive(HashingEmbeddingProvider);

#[async_trait]
impl EmbeddingProvider for PoisonSensitive {
    async fn embed(&self, text: &str) -> cogquery_rag::Result<Vec<f32>> {
        if text.contains("poison") {
            return Err(RagError::EmbeddingError {
                provider: "PoisonSensitive".into(),
                message: "refused".into(),
            });
        }
        self.0.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }
}

fn retriever_with(config: RetrieverConfig) -> ParentChildRetriever {
    ParentChildRetriever::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
        .build()
        .unwrap()
}

fn sky_and_grass() -> Vec<Document> {
    vec![
        Document::new("a.txt", "The sky is blue. Water is wet."),
        Document::new("b.txt", "Grass is green. Fire is hot."),
    ]
}

fn ids(documents: &[Document]) -> Vec<&str> {
    documents.iter().map(|d| d.id.as_str()).collect()
}

#[tokio::test]
async fn retrieve_before_ingest_is_not_ready() {
    let retriever = retriever_with(RetrieverConfig::default());
    let err = retriever.retrieve("sky").await.unwrap_err();
    assert!(matches!(err, RagError::NotReady));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn basic_ingest_and_query() {
    let retriever = retriever_with(RetrieverConfig::default());
    let result = retriever.ingest(&sky_and_grass(), 20, 5).await.unwrap();
    assert_eq!(result, IngestResult { documents: 2, fragments: 4 });
    assert_eq!(retriever.status().await, RetrieverStatus::Ready);

    let documents = retriever.retrieve_with_top_k("sky color", 4).await.unwrap();
    assert_eq!(documents[0].id, "a.txt");
    assert!(documents.len() <= 2);
    assert_eq!(documents[0].content, "The sky is blue. Water is wet.");
}

#[tokio::test]
async fn distance_cutoff_keeps_only_the_matching_topic() {
    let config = RetrieverConfig::builder().max_distance(1.3).build().unwrap();
    let retriever = retriever_with(config);
    retriever.ingest(&sky_and_grass(), 20, 5).await.unwrap();

    let documents = retriever.retrieve_with_top_k("sky color", 4).await.unwrap();
    assert_eq!(ids(&documents), vec!["a.txt"]);

    let documents = retriever.retrieve_with_top_k("green grass", 4).await.unwrap();
    assert_eq!(ids(&documents), vec!["b.txt"]);
}

#[tokio::test]
async fn parents_are_deduplicated_in_rank_order() {
    let retriever = retriever_with(RetrieverConfig::default());
    retriever.ingest(&sky_and_grass(), 20, 5).await.unwrap();

    let hits = retriever.retrieve_hits("fire is hot", 4).await.unwrap();
    assert_eq!(hits.len(), 4);
    let documents = retriever.retrieve_with_top_k("fire is hot", 4).await.unwrap();
    assert_eq!(ids(&documents), vec!["b.txt", "a.txt"]);
    assert_eq!(hits[0].parent_id, "b.txt");
}

#[tokio::test]
async fn re_ingest_overwrites_document_but_keeps_old_fragments() {
    let config =
        RetrieverConfig::builder().fragment_size(20).fragment_overlap(5).build().unwrap();
    let retriever = retriever_with(config);
    let lava = [Document::new("a.txt", "Volcanoes erupt molten lava.")];
    retriever.ingest(&lava, 20, 5).await.unwrap();
    let before = retriever.stats().await.fragments;

    let penguins = [Document::new("a.txt", "Penguins live in Antarctica.")];
    retriever.ingest(&penguins, 20, 5).await.unwrap();
    let stored = retriever.document("a.txt").await.unwrap();
    assert_eq!(stored.content, "Penguins live in Antarctica.");

    let stats = retriever.stats().await;
    assert_eq!(stats.documents, 1);
    assert!(stats.fragments > before);

    // a stale fragment still matches, but resolves to the new content
    let documents = retriever.retrieve("volcanoes lava").await.unwrap();
    assert_eq!(documents[0].content, "Penguins live in Antarctica.");

    let rebuilt = retriever.rebuild_index().await.unwrap();
    assert_eq!(rebuilt.documents, 1);
    assert_eq!(retriever.stats().await.fragments, rebuilt.fragments);
    assert!(rebuilt.fragments < stats.fragments);
}

#[tokio::test]
async fn failed_ingest_rolls_back_everything() {
    let retriever = ParentChildRetriever::builder()
        .embedding_provider(Arc::new(PoisonSensitive(HashingEmbeddingProvider::default())))
        .build()
        .unwrap();

    // a failure on a fresh retriever leaves it uninitialized
    let err = retriever
        .ingest(&[Document::new("x.txt", "poison in the very first batch")], 20, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));
    assert_eq!(retriever.status().await, RetrieverStatus::Uninitialized);
    assert!(retriever.document_ids().await.is_empty());

    retriever.ingest(&sky_and_grass(), 20, 5).await.unwrap();
    let before = retriever.stats().await;

    let batch = [
        Document::new("c.txt", "A harmless new document."),
        Document::new("a.txt", "this is poison text"),
    ];
    assert!(retriever.ingest(&batch, 20, 5).await.is_err());

    assert_eq!(retriever.stats().await, before);
    assert_eq!(retriever.document_ids().await, vec!["a.txt", "b.txt"]);
    assert_eq!(
        retriever.document("a.txt").await.unwrap().content,
        "The sky is blue. Water is wet."
    );
    assert_eq!(retriever.status().await, RetrieverStatus::Ready);
}

#[tokio::test]
async fn query_embedding_failure_is_reported() {
    let retriever = ParentChildRetriever::builder()
        .embedding_provider(Arc::new(PoisonSensitive(HashingEmbeddingProvider::default())))
        .build()
        .unwrap();
    retriever.ingest(&sky_and_grass(), 20, 5).await.unwrap();
    assert!(matches!(
        retriever.retrieve("poison query").await,
        Err(RagError::EmbeddingError { .. })
    ));
}

#[tokio::test]
async fn orphan_fragments_are_skipped() {
    let provider = HashingEmbeddingProvider::default();
    let mut fragments = Vec::new();
    for (text, parent) in [("ghost sky story", "ghost.txt"), ("real sky story", "real.txt")] {
        let mut fragment = Fragment::new(text, parent);
        fragment.embedding = provider.embed(text).await.unwrap();
        fragments.push(fragment);
    }
    let index = FragmentIndex::from_fragments(provider.dimensions(), fragments).unwrap();
    let real = Document::new("real.txt", "real sky story");
    let documents: DocumentStore = [("real.txt".to_string(), real)].into_iter().collect();

    let retriever = ParentChildRetriever::builder()
        .embedding_provider(Arc::new(provider))
        .index_state(IndexState::from_parts(index, documents))
        .build()
        .unwrap();

    let stats = retriever.stats().await;
    assert_eq!(stats.orphan_fragments, 1);
    assert_eq!(stats.status, RetrieverStatus::Ready);

    let found = retriever.retrieve("ghost sky story").await.unwrap();
    assert_eq!(ids(&found), vec!["real.txt"]);
}

#[tokio::test]
async fn rebuild_uses_ingest_sizes_not_configured_ones() {
    let retriever = retriever_with(RetrieverConfig::default());
    let ingested = retriever.ingest(&sky_and_grass(), 20, 5).await.unwrap();
    assert_eq!(ingested.fragments, 4);

    let rebuilt = retriever.rebuild_index().await.unwrap();
    assert_eq!(rebuilt, IngestResult { documents: 2, fragments: 4 });
}

#[tokio::test]
async fn recursive_strategy_is_used_for_ingest() {
    let config = RetrieverConfig::builder()
        .split_strategy(cogquery_rag::SplitStrategy::Recursive)
        .build()
        .unwrap();
    let retriever = retriever_with(config);
    let doc = Document::new("p.txt", "One short sentence. Another short sentence.");
    let result = retriever.ingest(&[doc], 25, 5).await.unwrap();
    assert_eq!(result.fragments, 2);
}

const WORDS: [&str; 12] = [
    "river", "mountain", "engine", "protocol", "garden", "planet", "signal", "harbor", "forest",
    "circuit", "violin", "desert",
];

fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::sample::select(WORDS.to_vec()), 1..30)
        .prop_map(|words| words.join(" "))
}

/// *For any* ingested corpus and query, retrieval SHALL return distinct
/// stored documents, ordered by the rank of their best fragment, and every
/// fragment SHALL resolve to a stored parent.
mod prop_retrieve_parents {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(40))]

        #[test]
        fn distinct_parents_in_first_hit_order(
            contents in proptest::collection::vec(arb_text(), 1..6),
            query in arb_text(),
            top_k in 1usize..30,
            size in 10usize..60,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (documents, hits, stats, stored_ids) = rt.block_on(async {
                let retriever = retriever_with(RetrieverConfig::default());
                let docs: Vec<Document> = contents
                    .iter()
                    .enumerate()
                    .map(|(i, text)| Document::new(format!("doc{i}.txt"), text.clone()))
                    .collect();
                retriever.ingest(&docs, size, size / 3).await.unwrap();
                let documents = retriever.retrieve_with_top_k(&query, top_k).await.unwrap();
                let hits = retriever.retrieve_hits(&query, top_k).await.unwrap();
                (documents, hits, retriever.stats().await, retriever.document_ids().await)
            });

            prop_assert_eq!(stats.orphan_fragments, 0);

            let returned: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
            let unique: HashSet<&str> = returned.iter().copied().collect();
            prop_assert_eq!(unique.len(), returned.len());
            prop_assert!(returned.iter().all(|id| stored_ids.iter().any(|s| s == id)));

            let mut expected: Vec<&str> = Vec::new();
            for hit in &hits {
                if !expected.contains(&hit.parent_id.as_str()) {
                    expected.push(hit.parent_id.as_str());
                }
            }
            prop_assert_eq!(returned, expected);
        }
    }
}

//! Integration tests for the retrieval engine: ingestion, rollback,
//! thresholded search and deletion.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use docchat_rag::{
    DocumentMetadata, EmbeddingProvider, HashingEmbeddingProvider, RagConfig, RagError,
    RetrievalEngine, build_prompt,
};
use proptest::prelude::*;

/// Wraps the hashing embedder, counting calls and refusing texts containing a marker.
struct CountingEmbedder {
    inner: HashingEmbeddingProvider,
    calls: AtomicUsize,
    refuse: Option<&'static str>,
}

impl CountingEmbedder {
    fn new(refuse: Option<&'static str>) -> Self {
        Self { inner: HashingEmbeddingProvider::new(128), calls: AtomicUsize::new(0), refuse }
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> docchat_rag::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse.is_some_and(|marker| text.contains(marker)) {
            return Err(RagError::embedding("counting", "refused passage"));
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_id(&self) -> String {
        "counting".to_string()
    }
}

fn metadata(filename: &str, minutes_ago: i64) -> DocumentMetadata {
    DocumentMetadata {
        filename: filename.to_string(),
        file_type: "txt".to_string(),
        size: 0,
        upload_time: Utc::now() - Duration::minutes(minutes_ago),
        word_count: 0,
        char_count: 0,
    }
}

fn engine_with(provider: Arc<dyn EmbeddingProvider>, config: RagConfig) -> RetrievalEngine {
    RetrievalEngine::builder().config(config).embedding_provider(provider).build().unwrap()
}

fn hashing_engine() -> RetrievalEngine {
    engine_with(Arc::new(HashingEmbeddingProvider::default()), RagConfig::default())
}

#[tokio::test]
async fn paris_document_answers_capital_question() {
    let engine = hashing_engine();
    let paris = "Paris is the capital of France. It is located on the Seine.";
    engine.add_document("paris", paris, metadata("france.txt", 1)).await.unwrap();
    let bread = "Mix flour, water and yeast, then bake the dough.";
    engine.add_document("bread", bread, metadata("b.txt", 0)).await.unwrap();

    let question = "What is the capital of France?";
    let results = engine.search_documents(question, 5, None).await.unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].document_id, "paris");
    assert!(results[0].text.contains("Seine"));
    assert_eq!(results[0].metadata.filename, "france.txt");
    assert!(results.iter().all(|r| r.score >= r.threshold));
    assert!(results.iter().all(|r| r.document_id != "bread"));

    let prompt = build_prompt(question, &results, 4000);
    assert!(prompt.contains("[france.txt]"));
    assert!(prompt.contains(paris));
}

#[tokio::test]
async fn lone_paris_document_is_the_single_answer() {
    let engine = hashing_engine();
    let paris = "Paris is the capital of France. It is located on the Seine.";
    engine.add_document("paris", paris, metadata("france.txt", 0)).await.unwrap();

    let capital = engine.search_documents("What is the capital of France?", 1, None).await.unwrap();
    assert_eq!(capital.len(), 1);
    assert_eq!(capital[0].document_id, "paris");

    let bread = engine.search_documents("recipe for bread", 1, Some(-1.0)).await.unwrap();
    assert_eq!(bread.len(), 1);
    assert!(capital[0].score > bread[0].score);
}

#[tokio::test]
async fn symbol_only_passages_are_indexed() {
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(0).build().unwrap();
    let engine = engine_with(Arc::new(HashingEmbeddingProvider::default()), config);

    let mut notes = metadata("notes.md", 1);
    notes.file_type = "md".to_string();
    let chunks = engine.add_document("notes", "---\n\n# Title\nBody", notes).await.unwrap();
    assert!(chunks >= 1);
    assert!(engine.contains_document("notes").await);

    engine.add_document("emoji", "😀😀 —", metadata("emoji.txt", 0)).await.unwrap();
    let stats = engine.get_collection_stats().await;
    assert_eq!(stats.document_count, 2);

    let results = engine.search_documents("Title", 5, None).await.unwrap();
    assert_eq!(results[0].document_id, "notes");
}

#[tokio::test]
async fn failed_embedding_rolls_back_the_whole_document() {
    let embedder = Arc::new(CountingEmbedder::new(Some("FAIL")));
    let config =
        RagConfig::builder().chunk_size(12).chunk_overlap(0).embed_batch_size(1).build().unwrap();
    let engine = engine_with(embedder.clone(), config);

    engine.add_document("keep", "kept words", metadata("keep.txt", 5)).await.unwrap();
    let before = engine.get_collection_stats().await;

    let text = "one alpha\n\ntwo beta\n\nthree FAIL\n\nfour delta\n\nfive epsilon";
    let err = engine.add_document("broken", text, metadata("broken.txt", 0)).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingFailure { .. }));

    // One call for "keep", then chunks 0 and 1 succeed and chunk 2 fails.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
    assert_eq!(engine.get_collection_stats().await, before);
    assert!(!engine.contains_document("broken").await);
    assert!(!engine.vector_index().contains_document("broken").await);

    let results = engine.search_documents("alpha beta", 10, Some(-1.0)).await.unwrap();
    assert!(results.iter().all(|r| r.document_id == "keep"));

    // The id is free again once the failure is gone.
    engine.add_document("broken", "one alpha", metadata("broken.txt", 0)).await.unwrap();
}

#[tokio::test]
async fn empty_index_search_skips_embedding() {
    let embedder = Arc::new(CountingEmbedder::new(None));
    let engine = engine_with(embedder.clone(), RagConfig::default());

    let results = engine.search_documents("anything at all", 5, None).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn query_embedding_failure_is_an_error() {
    let embedder = Arc::new(CountingEmbedder::new(Some("FAIL")));
    let engine = engine_with(embedder, RagConfig::default());
    engine.add_document("d", "plain words", metadata("d.txt", 0)).await.unwrap();

    let err = engine.search_documents("FAIL please", 5, None).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingFailure { .. }));
}

#[tokio::test]
async fn stats_track_adds_and_removes() {
    let engine = hashing_engine();
    let empty = engine.get_collection_stats().await;
    assert_eq!((empty.document_count, empty.chunk_count), (0, 0));
    assert_eq!(empty.embedding_model, "hashing-384");
    assert_eq!(empty.dimensions, 384);

    engine.add_document("a", "first document text", metadata("a.txt", 2)).await.unwrap();
    engine.add_document("b", "second document text", metadata("b.txt", 1)).await.unwrap();
    let stats = engine.get_collection_stats().await;
    assert_eq!((stats.document_count, stats.indexed_document_count, stats.chunk_count), (2, 2, 2));

    assert!(engine.remove_document("a").await.unwrap());
    let stats = engine.get_collection_stats().await;
    assert_eq!((stats.document_count, stats.chunk_count), (1, 1));
}

#[tokio::test]
async fn removing_twice_is_idempotent() {
    let engine = hashing_engine();
    engine.add_document("a", "some text to delete", metadata("a.txt", 0)).await.unwrap();

    assert!(engine.remove_document("a").await.unwrap());
    let after_first = engine.get_collection_stats().await;
    assert!(!engine.remove_document("a").await.unwrap());
    assert_eq!(engine.get_collection_stats().await, after_first);
    assert!(!engine.remove_document("never-existed").await.unwrap());

    let results = engine.search_documents("delete", 5, Some(-1.0)).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn self_similarity_ranks_first() {
    let engine = hashing_engine();
    let passages = [
        "The Seine flows through Paris.",
        "Rust has ownership and borrowing.",
        "Tokio is an asynchronous runtime.",
    ];
    for (i, text) in passages.iter().enumerate() {
        engine.add_document(&format!("d{i}"), text, metadata("p.txt", 0)).await.unwrap();
    }

    for (i, text) in passages.iter().enumerate() {
        let results = engine.search_documents(text, 1, None).await.unwrap();
        assert_eq!(results[0].document_id, format!("d{i}"));
        assert!((results[0].score - 1.0).abs() < 1e-4);
    }
}

#[tokio::test]
async fn documents_are_listed_newest_first() {
    let engine = hashing_engine();
    engine.add_document("old", "old text", metadata("old.txt", 10)).await.unwrap();
    engine.add_document("new", "new text", metadata("new.txt", 0)).await.unwrap();
    engine.add_document("mid", "mid text", metadata("mid.txt", 5)).await.unwrap();

    let ids: Vec<_> =
        engine.list_documents().await.into_iter().map(|d| d.document_id).collect();
    assert_eq!(ids, ["new", "mid", "old"]);
}

#[tokio::test]
async fn results_are_truncated_to_n_results() {
    let engine = hashing_engine();
    for i in 0..8 {
        let text = format!("shared topic words number {i}");
        engine.add_document(&format!("d{i}"), &text, metadata("t.txt", 0)).await.unwrap();
    }
    let results = engine.search_documents("shared topic words", 3, Some(-1.0)).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(results.iter().all(|r| r.threshold == -1.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingestion_of_one_id_admits_exactly_one() {
    let engine = Arc::new(hashing_engine());
    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.add_document("same", &format!("text variant {i}"), metadata("s.txt", 0)).await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert!(matches!(e, RagError::DuplicateDocument(_))),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(engine.get_collection_stats().await.chunk_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingestion_of_distinct_ids_keeps_every_document() {
    let engine = Arc::new(hashing_engine());
    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let text = format!("document number {i} about topic {}", i % 4);
            engine.add_document(&format!("doc{i}"), &text, metadata("c.txt", 0)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stats = engine.get_collection_stats().await;
    assert_eq!((stats.document_count, stats.chunk_count), (16, 16));
}

const VOCABULARY: [&str; 10] =
    ["paris", "france", "seine", "river", "bread", "flour", "rust", "tokio", "vector", "index"];

fn arb_sentence() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::sample::select(VOCABULARY.to_vec()), 1..8)
        .prop_map(|words| words.join(" "))
}

/// **Property 7: Static threshold monotonicity**
/// *For any* corpus and query, raising a static threshold SHALL never add
/// results: the results at the higher threshold are a subset of those at the
/// lower one.
mod prop_static_threshold_monotonic {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn higher_threshold_yields_subset(
            documents in proptest::collection::vec(arb_sentence(), 1..10),
            query in arb_sentence(),
            low in -1.0f32..1.0,
            delta in 0.0f32..1.0,
        ) {
            let high = low + delta;
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (at_low, at_high) = rt.block_on(async {
                let engine = hashing_engine();
                for (i, text) in documents.iter().enumerate() {
                    let id = format!("d{i}");
                    engine.add_document(&id, text, metadata("p.txt", 0)).await.unwrap();
                }
                let at_low = engine.search_documents(&query, 50, Some(low)).await.unwrap();
                let at_high = engine.search_documents(&query, 50, Some(high)).await.unwrap();
                (at_low, at_high)
            });

            prop_assert!(at_high.len() <= at_low.len());
            for result in &at_high {
                prop_assert!(result.score >= high);
                prop_assert!(at_low.iter().any(|r| r.chunk_id == result.chunk_id));
            }
        }
    }
}

/// **Property 8: Dynamic threshold never comes back empty**
/// *For any* non-empty corpus, a query with embeddable tokens under the
/// default dynamic policy SHALL return at least one result.
mod prop_dynamic_threshold_non_empty {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn dynamic_search_returns_results(
            documents in proptest::collection::vec(arb_sentence(), 1..10),
            query in arb_sentence(),
            n_results in 1usize..6,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let engine = hashing_engine();
                for (i, text) in documents.iter().enumerate() {
                    let id = format!("d{i}");
                    engine.add_document(&id, text, metadata("p.txt", 0)).await.unwrap();
                }
                engine.search_documents(&query, n_results, None).await.unwrap()
            });

            prop_assert!(!results.is_empty());
            prop_assert!(results.len() <= n_results);
            prop_assert!(results.iter().all(|r| r.score >= r.threshold));
        }
    }
}

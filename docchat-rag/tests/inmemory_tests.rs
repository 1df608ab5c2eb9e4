//! Property tests for in-memory vector index search ordering.

use chrono::Utc;
use docchat_rag::document::{Chunk, DocumentMetadata, IndexEntry};
use docchat_rag::inmemory::InMemoryVectorIndex;
use docchat_rag::vectorstore::VectorIndex;
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-3 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn entry(document_id: &str, position: usize, embedding: Vec<f32>) -> IndexEntry {
    IndexEntry {
        chunk: Chunk {
            id: Chunk::id_for(document_id, position),
            document_id: document_id.to_string(),
            text: format!("passage {position}"),
            position,
            offset: 0,
            embedding,
        },
        metadata: DocumentMetadata {
            filename: format!("{document_id}.txt"),
            file_type: "txt".to_string(),
            size: 0,
            upload_time: Utc::now(),
            word_count: 2,
            char_count: 10,
        },
    }
}

/// Build an index holding `embeddings`, spread round-robin over three documents.
async fn build_index(dim: usize, embeddings: &[Vec<f32>]) -> InMemoryVectorIndex {
    let index = InMemoryVectorIndex::new(dim);
    for (position, embedding) in embeddings.iter().enumerate() {
        let document_id = format!("doc_{}", position % 3);
        index.insert(entry(&document_id, position, embedding.clone())).await.unwrap();
    }
    index
}

/// **Property 1: In-memory vector index search ordering**
/// *For any* set of entries stored in an InMemoryVectorIndex, searching with
/// a query embedding SHALL return results ordered by descending cosine
/// similarity score, and the number of results SHALL be at most k and at
/// most the number of stored entries.
mod prop_inmemory_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_k(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let index = build_index(DIM, &embeddings).await;
                index.search(&query, k).await.unwrap()
            });

            prop_assert!(results.len() <= k);
            prop_assert_eq!(results.len(), k.min(embeddings.len()));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score
                );
            }

            for result in &results {
                prop_assert!(
                    (-1.0 - 1e-5..=1.0 + 1e-5).contains(&result.score),
                    "score {} outside [-1, 1]",
                    result.score
                );
            }
        }
    }
}

/// **Property 2: Self-similarity ranks first**
/// *For any* stored entry, searching with its own embedding SHALL return a
/// top result with score ≈ 1.0.
mod prop_self_similarity {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn own_embedding_scores_one(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..15),
            pick in any::<prop::sample::Index>(),
        ) {
            let target = pick.index(embeddings.len());
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let index = build_index(DIM, &embeddings).await;
                index.search(&embeddings[target], 1).await.unwrap()
            });

            prop_assert_eq!(results.len(), 1);
            prop_assert!((results[0].score - 1.0).abs() < 1e-4, "top score {}", results[0].score);
        }
    }
}

/// **Property 3: Document deletion is complete and idempotent**
/// *For any* index, deleting a document SHALL remove exactly its entries,
/// and deleting it again SHALL remove nothing.
mod prop_delete_by_document {
    use super::*;

    const DIM: usize = 4;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn delete_removes_exactly_the_document(
            embeddings in proptest::collection::vec(arb_normalized_embedding(DIM), 1..20),
        ) {
            let expected = embeddings.iter().enumerate().filter(|(i, _)| i % 3 == 0).count();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (first, second, stats, hits) = rt.block_on(async {
                let index = build_index(DIM, &embeddings).await;
                let first = index.delete_by_document("doc_0").await.unwrap();
                let second = index.delete_by_document("doc_0").await.unwrap();
                let hits = index.search(&embeddings[0], embeddings.len()).await.unwrap();
                (first, second, index.stats().await, hits)
            });

            prop_assert_eq!(first, expected);
            prop_assert_eq!(second, 0);
            prop_assert_eq!(stats.entry_count, embeddings.len() - expected);
            prop_assert!(hits.iter().all(|h| h.entry.chunk.document_id != "doc_0"));
        }
    }
}

//! Exact rescoring of nearest-neighbour candidates
//!
//! Every store searches in two stages:
//! 1. Fetch an oversampled candidate pool (2x limit) by cosine ANN search
//! 2. Recompute the exact similarity with the tenant's provider, drop
//!    candidates below the threshold, and order by a combined ranking score

use crate::embedding::EmbeddingProvider;
use crate::memory::params::SearchParams;
use crate::memory::types::{EntityRecord, LongTermRecord, Record, ScoredRecord, ShortTermRecord};

/// Weight of similarity in the long-term ranking score
pub const LONG_TERM_SIMILARITY_WEIGHT: f32 = 0.7;
/// Weight of importance in the long-term ranking score
pub const LONG_TERM_IMPORTANCE_WEIGHT: f32 = 0.3;

pub const ENTITY_SIMILARITY_WEIGHT: f32 = 0.5;
pub const ENTITY_CONFIDENCE_WEIGHT: f32 = 0.3;
/// Ceiling on the mention-count contribution to the entity ranking score
pub const ENTITY_MENTION_BONUS_CAP: f32 = 0.2;

/// How a record takes part in ranking
pub(crate) trait Rankable: Record {
    fn embedding(&self) -> &[f32];
    fn ranking_score(&self, similarity: f32) -> f32;
}

impl Rankable for ShortTermRecord {
    fn embedding(&self) -> &[f32] {
        &self.embedding
    }
    fn ranking_score(&self, similarity: f32) -> f32 {
        similarity
    }
}

impl Rankable for LongTermRecord {
    fn embedding(&self) -> &[f32] {
        &self.embedding
    }
    fn ranking_score(&self, similarity: f32) -> f32 {
        long_term_score(similarity, self.importance)
    }
}

impl Rankable for EntityRecord {
    fn embedding(&self) -> &[f32] {
        &self.embedding
    }
    fn ranking_score(&self, similarity: f32) -> f32 {
        entity_score(similarity, self.confidence, self.mention_count)
    }
}

pub fn long_term_score(similarity: f32, importance: f32) -> f32 {
    similarity * LONG_TERM_SIMILARITY_WEIGHT + importance * LONG_TERM_IMPORTANCE_WEIGHT
}

pub fn entity_score(similarity: f32, confidence: f32, mention_count: u32) -> f32 {
    let mention_bonus = (mention_count as f32 / 10.0).min(ENTITY_MENTION_BONUS_CAP);
    similarity * ENTITY_SIMILARITY_WEIGHT + confidence * ENTITY_CONFIDENCE_WEIGHT + mention_bonus
}

/// Rescore candidates against the query vector and keep the best `limit`.
///
/// Ties on score fall back to newest first, then id, so results are stable
/// across calls.
pub(crate) fn rank<T: Rankable>(
    candidates: Vec<T>,
    query: &[f32],
    provider: &dyn EmbeddingProvider,
    params: &SearchParams,
) -> Vec<ScoredRecord<T>> {
    let mut results: Vec<ScoredRecord<T>> = candidates
        .into_iter()
        .filter_map(|record| {
            let similarity = provider.similarity(query, record.embedding());
            if similarity < params.threshold {
                return None;
            }
            let score = record.ranking_score(similarity);
            Some(ScoredRecord {
                record,
                similarity,
                score,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.record.created_at().cmp(&a.record.created_at()))
            .then_with(|| a.record.id().cmp(&b.record.id()))
    });
    results.truncate(params.limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbeddingProvider;
    use crate::memory::types::TenantId;
    use chrono::Utc;
    use uuid::Uuid;

    fn long_term(importance: f32, embedding: Vec<f32>) -> LongTermRecord {
        let now = Utc::now();
        LongTermRecord {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("crew").unwrap(),
            content: "fact".to_string(),
            content_type: "fact".to_string(),
            summary: None,
            metadata: None,
            importance,
            access_count: 0,
            last_accessed: None,
            source_execution_id: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            embedding,
        }
    }

    #[test]
    fn long_term_score_weights_importance() {
        let high = long_term_score(0.8, 0.9);
        let low = long_term_score(0.8, 0.1);
        assert!((high - 0.83).abs() < 1e-6);
        assert!((low - 0.59).abs() < 1e-6);
        assert!(high > low);
    }

    #[test]
    fn entity_score_caps_mention_bonus() {
        let few = entity_score(1.0, 1.0, 1);
        let many = entity_score(1.0, 1.0, 50);
        assert!((few - 0.9).abs() < 1e-6);
        assert!((many - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rank_orders_equal_similarity_by_importance() {
        let provider = HashEmbeddingProvider::new(4);
        let query = vec![1.0, 0.0, 0.0, 0.0];
        let candidates = vec![
            long_term(0.1, vec![1.0, 0.0, 0.0, 0.0]),
            long_term(0.9, vec![1.0, 0.0, 0.0, 0.0]),
        ];

        let ranked = rank(candidates, &query, &provider, &SearchParams::new(10, 0.5));
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].record.importance, 0.9);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn rank_drops_below_threshold_and_truncates() {
        let provider = HashEmbeddingProvider::new(4);
        let query = vec![1.0, 0.0, 0.0, 0.0];
        let candidates = vec![
            long_term(0.5, vec![0.0, 1.0, 0.0, 0.0]),
            long_term(0.5, vec![1.0, 0.1, 0.0, 0.0]),
            long_term(0.6, vec![1.0, 0.0, 0.0, 0.0]),
        ];

        let ranked = rank(candidates, &query, &provider, &SearchParams::new(1, 0.5));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].record.importance, 0.6);
    }
}

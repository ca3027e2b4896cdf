//! Integration tests for the long-term store and consolidation

use std::sync::Arc;

use chrono::{Duration, Utc};
use crewmem::config::MemoryPolicy;
use crewmem::embedding::HashEmbeddingProvider;
use crewmem::memory::params::{LongTermFilter, LongTermInput, LongTermUpdate, SearchParams, ShortTermInput};
use crewmem::memory::types::LongTermRecord;
use crewmem::memory::{LongTermStore, ShortTermStore};
use crewmem::storage::LanceStore;
use crewmem::testing::{TEST_DIMENSION, test_context, test_policy, test_store};
use crewmem::TenantId;
use tempfile::{TempDir, tempdir};
use uuid::Uuid;

struct Fixture {
    long_term: LongTermStore,
    short_term: ShortTermStore,
    db: Arc<LanceStore>,
    _dir: TempDir,
}

/// Test fixture: long- and short-term stores for one tenant
async fn create_fixture(policy: MemoryPolicy) -> Fixture {
    let dir = tempdir().unwrap();
    let db = test_store(dir.path()).await.unwrap();
    let long_term = LongTermStore::new(
        test_context(Arc::clone(&db), "crew-1", policy.clone())
            .await
            .unwrap(),
    );
    let short_term = ShortTermStore::new(
        test_context(Arc::clone(&db), "crew-1", policy)
            .await
            .unwrap(),
    );
    Fixture {
        long_term,
        short_term,
        db,
        _dir: dir,
    }
}

/// Test fixture: a long-term row written straight to the database
fn backdated_record(content: &str, importance: f32, age_days: i64) -> LongTermRecord {
    let created = Utc::now() - Duration::days(age_days);
    LongTermRecord {
        id: Uuid::new_v4(),
        tenant_id: TenantId::new("crew-1").unwrap(),
        content: content.to_string(),
        content_type: "text".to_string(),
        summary: None,
        metadata: None,
        importance,
        access_count: 0,
        last_accessed: None,
        source_execution_id: None,
        tags: Vec::new(),
        created_at: created,
        updated_at: created,
        embedding: HashEmbeddingProvider::new(TEST_DIMENSION).embed_sync(content),
    }
}

mod storage_tests {
    use super::*;

    #[tokio::test]
    async fn test_store_defaults_and_access_tracking() {
        let fx = create_fixture(test_policy()).await;
        let id = fx
            .long_term
            .store(LongTermInput::new("Customers prefer weekly digests"))
            .await
            .unwrap();

        let first = fx.long_term.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(first.importance, 0.5);
        assert_eq!(first.content_type, "text");
        assert_eq!(first.access_count, 1);
        assert!(first.last_accessed.is_some());

        let second = fx.long_term.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(second.access_count, 2);
    }

    #[tokio::test]
    async fn test_update_tags_and_importance() {
        let fx = create_fixture(test_policy()).await;
        let id = fx
            .long_term
            .store(LongTermInput::new("Retry webhooks with backoff").with_tags(["ops"]))
            .await
            .unwrap();

        let updated = fx
            .long_term
            .update(
                id,
                LongTermUpdate {
                    importance: Some(0.95),
                    tags: Some(vec!["ops".to_string(), "webhooks".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let found = fx
            .long_term
            .get_by_tags(&["webhooks".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].importance, 0.95);
        assert!(found[0].updated_at >= found[0].created_at);
    }
}

mod tag_tests {
    use super::*;

    #[tokio::test]
    async fn test_tag_match_is_exact_token() {
        let fx = create_fixture(test_policy()).await;
        fx.long_term
            .store(LongTermInput::new("Inbox triage rules").with_tags(["email"]))
            .await
            .unwrap();
        let ai = fx
            .long_term
            .store(LongTermInput::new("Model evaluation notes").with_tags(["ai", "ml"]))
            .await
            .unwrap();

        let found = fx.long_term.get_by_tags(&["ai".to_string()], 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ai);
    }

    #[tokio::test]
    async fn test_tags_use_and_semantics() {
        let fx = create_fixture(test_policy()).await;
        fx.long_term
            .store(LongTermInput::new("Only ml").with_tags(["ml"]))
            .await
            .unwrap();
        let both = fx
            .long_term
            .store(LongTermInput::new("Both tags").with_tags(["ai", "ml"]))
            .await
            .unwrap();

        let found = fx
            .long_term
            .get_by_tags(&["ml".to_string(), "ai".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![both]);

        let filter = LongTermFilter {
            tags: vec!["ai".to_string()],
            ..Default::default()
        };
        let hits = fx
            .long_term
            .retrieve("Only ml", &SearchParams::new(10, 0.0), &filter)
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.record.id == both));
    }

    #[tokio::test]
    async fn test_empty_tag_query_returns_nothing() {
        let fx = create_fixture(test_policy()).await;
        fx.long_term
            .store(LongTermInput::new("Tagged").with_tags(["x"]))
            .await
            .unwrap();

        assert!(fx.long_term.get_by_tags(&[], 10).await.unwrap().is_empty());
    }
}

mod ranking_tests {
    use super::*;

    #[tokio::test]
    async fn test_importance_breaks_similarity_ties() {
        let fx = create_fixture(test_policy()).await;
        let low = fx
            .long_term
            .store(LongTermInput::new("cache invalidation strategy").with_importance(0.1))
            .await
            .unwrap();
        let high = fx
            .long_term
            .store(LongTermInput::new("cache invalidation strategy").with_importance(0.9))
            .await
            .unwrap();

        let hits = fx
            .long_term
            .retrieve(
                "cache invalidation strategy",
                &SearchParams::new(2, 0.5),
                &LongTermFilter::default(),
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.id, high);
        assert_eq!(hits[1].record.id, low);
        assert!((hits[0].score - (hits[0].similarity * 0.7 + 0.9 * 0.3)).abs() < 1e-4);
        assert!(hits.iter().all(|h| h.record.access_count == 1));
    }

    #[tokio::test]
    async fn test_insights_require_type_and_importance() {
        let fx = create_fixture(test_policy()).await;
        let keep = fx
            .long_term
            .store(
                LongTermInput::new("Batching cuts API cost")
                    .with_content_type("insight")
                    .with_importance(0.8),
            )
            .await
            .unwrap();
        fx.long_term
            .store(
                LongTermInput::new("Minor pattern")
                    .with_content_type("pattern")
                    .with_importance(0.5),
            )
            .await
            .unwrap();
        fx.long_term
            .store(LongTermInput::new("Important but plain").with_importance(0.9))
            .await
            .unwrap();

        let insights = fx.long_term.get_insights(10).await.unwrap();
        assert_eq!(insights.iter().map(|r| r.id).collect::<Vec<_>>(), vec![keep]);
    }
}

mod capacity_tests {
    use super::*;

    #[tokio::test]
    async fn test_cap_evicts_least_important() {
        let policy = MemoryPolicy {
            long_term_max_entries: 2,
            ..test_policy()
        };
        let fx = create_fixture(policy).await;

        let keep_high = fx
            .long_term
            .store(LongTermInput::new("critical runbook").with_importance(0.9))
            .await
            .unwrap();
        let evicted = fx
            .long_term
            .store(LongTermInput::new("trivia").with_importance(0.1))
            .await
            .unwrap();
        let keep_mid = fx
            .long_term
            .store(LongTermInput::new("useful tip").with_importance(0.5))
            .await
            .unwrap();

        assert_eq!(fx.long_term.count().await.unwrap(), 2);
        let remaining: Vec<Uuid> = fx
            .long_term
            .get_recent(10, None)
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert!(remaining.contains(&keep_high));
        assert!(remaining.contains(&keep_mid));
        assert!(!remaining.contains(&evicted));
    }

    #[tokio::test]
    async fn test_cleanup_removes_stale_unimportant_records() {
        let fx = create_fixture(test_policy()).await;
        let stale = backdated_record("old trivia nobody read", 0.1, 45);
        let old_but_important = backdated_record("old but important", 0.8, 45);
        let recent_unimportant = backdated_record("recent trivia", 0.1, 1);
        fx.db
            .insert(&[stale.clone(), old_but_important.clone(), recent_unimportant.clone()])
            .await
            .unwrap();

        assert_eq!(fx.long_term.cleanup().await.unwrap(), 1);
        assert_eq!(fx.long_term.cleanup().await.unwrap(), 0);
        assert_eq!(fx.long_term.count().await.unwrap(), 2);
        assert!(fx.long_term.get_by_id(stale.id).await.unwrap().is_none());
    }
}

mod consolidation_tests {
    use super::*;

    #[tokio::test]
    async fn test_only_relevant_records_are_promoted() {
        let fx = create_fixture(test_policy()).await;
        fx.short_term
            .store(ShortTermInput::new("the client requires SOC2 reports").with_relevance(0.8))
            .await
            .unwrap();
        fx.short_term
            .store(ShortTermInput::new("small talk about lunch").with_relevance(0.2))
            .await
            .unwrap();
        fx.short_term
            .store(ShortTermInput::new("no relevance given"))
            .await
            .unwrap();

        let recent = fx.short_term.get_recent(50, None).await.unwrap();
        assert_eq!(fx.long_term.consolidate_from_short_term(&recent).await.unwrap(), 1);

        let promoted = fx.long_term.get_recent(10, None).await.unwrap();
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].content, "the client requires SOC2 reports");
        assert_eq!(promoted[0].importance, 0.8);
        assert_eq!(
            promoted[0].summary.as_deref(),
            Some("the client requires SOC2 reports")
        );
    }

    #[tokio::test]
    async fn test_duplicates_boost_existing_importance() {
        let fx = create_fixture(test_policy()).await;
        fx.short_term
            .store(ShortTermInput::new("deploys happen on tuesdays").with_relevance(0.8))
            .await
            .unwrap();
        let recent = fx.short_term.get_recent(50, None).await.unwrap();

        assert_eq!(fx.long_term.consolidate_from_short_term(&recent).await.unwrap(), 1);
        assert_eq!(fx.long_term.consolidate_from_short_term(&recent).await.unwrap(), 0);

        let records = fx.long_term.get_recent(10, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].importance - 0.9).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_duplicate_boost_caps_at_one() {
        let fx = create_fixture(test_policy()).await;
        let seeded = backdated_record("the staging cluster runs on arm", 0.95, 0);
        fx.db.insert(std::slice::from_ref(&seeded)).await.unwrap();
        fx.short_term
            .store(ShortTermInput::new("the staging cluster runs on arm").with_relevance(0.9))
            .await
            .unwrap();
        let recent = fx.short_term.get_recent(50, None).await.unwrap();

        assert_eq!(fx.long_term.consolidate_from_short_term(&recent).await.unwrap(), 0);

        let records = fx.long_term.get_recent(10, None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, seeded.id);
        assert_eq!(records[0].importance, 1.0);
    }
}

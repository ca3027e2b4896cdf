//! Integration tests for the memory coordinator
//!
//! Covers cross-store behaviour: tenant isolation, fan-out retrieval,
//! cleanup logging, configuration updates, and the end-to-end scenarios.

use crewmem::config::{MemoryConfigPatch, MemoryPolicy};
use crewmem::memory::cleanup_log::CleanupReason;
use crewmem::memory::params::{
    EntityInput, LongTermInput, MemoryInput, RetrieveOptions, ShortTermInput,
};
use crewmem::memory::types::{MemoryRecord, Record};
use crewmem::testing::{test_coordinator, test_coordinator_with, test_policy};
use crewmem::{MemoryCoordinator, MemoryKind, TenantId};
use serde_json::json;
use tempfile::{TempDir, tempdir};

async fn create_coordinator() -> (MemoryCoordinator, TempDir) {
    let dir = tempdir().unwrap();
    let coordinator = test_coordinator(dir.path()).await.unwrap();
    (coordinator, dir)
}

async fn create_coordinator_with(policy: MemoryPolicy) -> (MemoryCoordinator, TempDir) {
    let dir = tempdir().unwrap();
    let coordinator = test_coordinator_with(dir.path(), policy).await.unwrap();
    (coordinator, dir)
}

fn tenant(id: &str) -> TenantId {
    TenantId::new(id).unwrap()
}

fn short(content: &str) -> MemoryInput {
    MemoryInput::ShortTerm(ShortTermInput::new(content))
}

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_short_term_cap_keeps_newest_hundred() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew-a");

        let mut ids = Vec::with_capacity(150);
        for i in 0..150 {
            ids.push(
                coordinator
                    .store(&crew, short(&format!("turn {i} of a long conversation")))
                    .await
                    .unwrap(),
            );
        }

        let stats = coordinator.stats(&crew).await.unwrap();
        assert_eq!(stats.counts.short_term, 100);
        for id in &ids[..50] {
            assert!(
                coordinator
                    .get(&crew, MemoryKind::ShortTerm, *id)
                    .await
                    .unwrap()
                    .is_none()
            );
        }
        for id in &ids[50..] {
            assert!(
                coordinator
                    .get(&crew, MemoryKind::ShortTerm, *id)
                    .await
                    .unwrap()
                    .is_some()
            );
        }
    }

    #[tokio::test]
    async fn test_long_term_ranking_weights_importance() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew-b");

        let low = coordinator
            .store(
                &crew,
                MemoryInput::LongTerm(
                    LongTermInput::new("vendor contract renewal terms").with_importance(0.1),
                ),
            )
            .await
            .unwrap();
        let high = coordinator
            .store(
                &crew,
                MemoryInput::LongTerm(
                    LongTermInput::new("vendor contract renewal terms").with_importance(0.9),
                ),
            )
            .await
            .unwrap();

        let options = RetrieveOptions::new(5, 0.5).with_kinds([MemoryKind::LongTerm]);
        let results = coordinator
            .retrieve(&crew, "vendor contract renewal terms", &options)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let hits = &results[&MemoryKind::LongTerm];
        assert_eq!(hits[0].record.id(), high);
        assert_eq!(hits[1].record.id(), low);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_entity_mentions_merge() {
        let policy = MemoryPolicy {
            entity_confidence_threshold: 0.5,
            ..test_policy()
        };
        let (coordinator, _dir) = create_coordinator_with(policy).await;
        let crew = tenant("crew-c");

        let acme = |confidence| {
            MemoryInput::Entity(
                EntityInput::new("Acme")
                    .with_name("Acme")
                    .with_confidence(confidence),
            )
        };
        let first = coordinator.store(&crew, acme(0.6)).await.unwrap();
        let second = coordinator.store(&crew, acme(0.9)).await.unwrap();
        assert_eq!(first, second);

        let Some(MemoryRecord::Entity(entity)) = coordinator
            .get(&crew, MemoryKind::Entity, first)
            .await
            .unwrap()
        else {
            panic!("expected entity record");
        };
        assert_eq!(entity.confidence, 0.9);
        assert_eq!(entity.mention_count, 2);
        assert_eq!(coordinator.stats(&crew).await.unwrap().counts.entity, 1);
    }

    #[tokio::test]
    async fn test_relationship_dedup_keeps_strongest() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew-d");
        let person = |name: &str| {
            MemoryInput::Entity(EntityInput::new(name).with_name(name).with_confidence(0.9))
        };

        let a = coordinator.store(&crew, person("Ada")).await.unwrap();
        let b = coordinator.store(&crew, person("Babbage")).await.unwrap();
        coordinator
            .add_relationship(&crew, a, b, "works_for", Some(0.4), None)
            .await
            .unwrap();
        coordinator
            .add_relationship(&crew, a, b, "works_for", Some(0.7), None)
            .await
            .unwrap();

        let views = coordinator.relationships(&crew, a, None).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].relationship.strength, 0.7);
        assert_eq!(coordinator.stats(&crew).await.unwrap().counts.relationships, 1);
    }
}

mod isolation_tests {
    use super::*;

    #[tokio::test]
    async fn test_tenants_never_see_each_other() {
        let (coordinator, _dir) = create_coordinator().await;
        let alpha = tenant("alpha");
        let beta = tenant("beta");

        let id = coordinator
            .store(&alpha, short("alpha private roadmap"))
            .await
            .unwrap();
        coordinator
            .store(
                &alpha,
                MemoryInput::LongTerm(LongTermInput::new("alpha private roadmap")),
            )
            .await
            .unwrap();

        let results = coordinator
            .retrieve(&beta, "alpha private roadmap", &RetrieveOptions::new(10, 0.0))
            .await
            .unwrap();
        assert!(results.values().all(Vec::is_empty));
        assert!(
            coordinator
                .get(&beta, MemoryKind::ShortTerm, id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(!coordinator.delete(&beta, MemoryKind::ShortTerm, id).await.unwrap());

        let cleared = coordinator.clear_all(&beta).await.unwrap();
        assert_eq!(cleared.total, 0);
        assert_eq!(coordinator.stats(&alpha).await.unwrap().counts.total, 2);
    }
}

mod retrieval_tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_returns_every_requested_kind() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew");
        coordinator.store(&crew, short("release checklist")).await.unwrap();

        let all = coordinator
            .retrieve(&crew, "release checklist", &RetrieveOptions::new(5, 0.5))
            .await
            .unwrap();
        assert_eq!(
            all.keys().copied().collect::<Vec<_>>(),
            vec![MemoryKind::ShortTerm, MemoryKind::LongTerm, MemoryKind::Entity]
        );
        assert_eq!(all[&MemoryKind::ShortTerm].len(), 1);
        assert!(all[&MemoryKind::LongTerm].is_empty());

        let err = coordinator
            .retrieve(&crew, "release checklist", &RetrieveOptions::new(5, -0.1))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_conversation_context_through_coordinator() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew");
        for (content_type, content) in [("task_input", "question"), ("task_output", "answer")] {
            coordinator
                .store(
                    &crew,
                    MemoryInput::ShortTerm(ShortTermInput::new(content).with_content_type(content_type)),
                )
                .await
                .unwrap();
        }

        let context = coordinator.conversation_context(&crew, 20, None).await.unwrap();
        assert_eq!(
            context.iter().map(|r| r.content.as_str()).collect::<Vec<_>>(),
            ["question", "answer"]
        );
    }
}

mod maintenance_tests {
    use super::*;

    #[tokio::test]
    async fn test_cleanup_is_logged_and_idempotent() {
        let policy = MemoryPolicy {
            short_term_retention_hours: 0,
            ..test_policy()
        };
        let (coordinator, _dir) = create_coordinator_with(policy).await;
        let crew = tenant("crew");
        coordinator.store(&crew, short("ephemeral one")).await.unwrap();
        coordinator.store(&crew, short("ephemeral two")).await.unwrap();

        let first = coordinator.cleanup(&crew, CleanupReason::OnDemand).await.unwrap();
        assert_eq!(first.short_term, 2);
        assert_eq!(first.total, 2);

        let second = coordinator.cleanup(&crew, CleanupReason::OnDemand).await.unwrap();
        assert_eq!(second.total, 0);

        let stats = coordinator.stats(&crew).await.unwrap();
        assert_eq!(stats.recent_cleanups.len(), 2);
        assert_eq!(stats.recent_cleanups[0].entries_removed, 0);
        assert_eq!(stats.recent_cleanups[1].entries_removed, 2);
        assert!(
            stats
                .recent_cleanups
                .iter()
                .all(|e| e.reason == CleanupReason::OnDemand)
        );
    }

    #[tokio::test]
    async fn test_consolidate_reports_threshold() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew");
        coordinator
            .store(
                &crew,
                MemoryInput::ShortTerm(
                    ShortTermInput::new("budget approved for Q3").with_relevance(0.9),
                ),
            )
            .await
            .unwrap();
        coordinator.store(&crew, short("idle chatter")).await.unwrap();

        let report = coordinator.consolidate(&crew).await.unwrap();
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.consolidated, 1);
        assert_eq!(report.threshold, 0.7);
        assert_eq!(coordinator.stats(&crew).await.unwrap().counts.long_term, 1);
    }

    #[tokio::test]
    async fn test_clear_all_logs_manual_wipe() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew");
        coordinator.store(&crew, short("to be wiped")).await.unwrap();
        coordinator
            .store(&crew, MemoryInput::LongTerm(LongTermInput::new("also wiped")))
            .await
            .unwrap();
        assert!(coordinator.cached_handles(&crew) > 0);

        let report = coordinator.clear_all(&crew).await.unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(coordinator.cached_handles(&crew), 0);

        let stats = coordinator.stats(&crew).await.unwrap();
        assert_eq!(stats.counts.total, 0);
        assert_eq!(stats.recent_cleanups[0].reason, CleanupReason::Manual);
        assert_eq!(stats.recent_cleanups[0].entries_removed, 2);
    }

    #[tokio::test]
    async fn test_stats_report_utilization() {
        let policy = MemoryPolicy {
            short_term_max_entries: 4,
            ..test_policy()
        };
        let (coordinator, _dir) = create_coordinator_with(policy).await;
        let crew = tenant("crew");
        coordinator.store(&crew, short("only entry")).await.unwrap();

        let stats = coordinator.stats(&crew).await.unwrap();
        assert_eq!(stats.limits.short_term_max_entries, 4);
        assert_eq!(stats.utilization.short_term_percent, 25.0);
        assert_eq!(stats.utilization.long_term_percent, 0.0);
        assert_eq!(stats.config.tenant_id, crew);
    }
}

mod config_tests {
    use super::*;

    #[tokio::test]
    async fn test_patch_ignores_unknown_keys_and_rebuilds_handles() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew");
        coordinator.store(&crew, short("before the patch")).await.unwrap();
        assert!(coordinator.cached_handles(&crew) > 0);

        let patch = MemoryConfigPatch::from_json(json!({
            "short_term_max_entries": 2,
            "favourite_colour": "teal"
        }))
        .unwrap();
        let updated = coordinator.update_config(&crew, &patch).await.unwrap();
        assert_eq!(updated.policy.short_term_max_entries, 2);
        assert!(updated.updated_at >= updated.created_at);
        assert_eq!(coordinator.cached_handles(&crew), 0);

        for i in 0..3 {
            coordinator
                .store(&crew, short(&format!("after the patch {i}")))
                .await
                .unwrap();
        }
        assert_eq!(coordinator.stats(&crew).await.unwrap().counts.short_term, 2);
    }

    #[tokio::test]
    async fn test_invalid_patch_leaves_config_unchanged() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew");
        let before = coordinator.config(&crew).await.unwrap();

        let patch = MemoryConfigPatch::from_json(json!({
            "long_term_consolidation_threshold": 1.5
        }))
        .unwrap();
        let err = coordinator.update_config(&crew, &patch).await.unwrap_err();
        assert!(err.is_validation());

        let after = coordinator.config(&crew).await.unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_config_is_created_once_per_tenant() {
        let (coordinator, _dir) = create_coordinator().await;
        let crew = tenant("crew");

        let first = coordinator.config(&crew).await.unwrap();
        let second = coordinator.config(&crew).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(coordinator.tenants().await.unwrap().len(), 1);
    }
}

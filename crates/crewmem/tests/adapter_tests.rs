//! Integration tests for the crew framework adapter

use std::sync::Arc;

use crewmem::config::MemoryPolicy;
use crewmem::memory::types::MemoryKind;
use crewmem::testing::{test_coordinator_with, test_policy};
use crewmem::{AdapterItem, CrewMemoryAdapter, MemoryCoordinator, TenantId};
use tempfile::{TempDir, tempdir};

async fn create_adapter(policy: MemoryPolicy) -> (CrewMemoryAdapter, Arc<MemoryCoordinator>, TempDir) {
    let dir = tempdir().unwrap();
    let coordinator = Arc::new(test_coordinator_with(dir.path(), policy).await.unwrap());
    let adapter = CrewMemoryAdapter::new(Arc::clone(&coordinator), TenantId::new("crew-7").unwrap());
    (adapter, coordinator, dir)
}

#[tokio::test]
async fn test_store_and_retrieve_merges_metadata() {
    let (adapter, _coordinator, _dir) = create_adapter(test_policy()).await;

    assert!(
        adapter
            .store(
                AdapterItem::new("the client wants a dark theme")
                    .with_metadata("content_type", "task_output")
                    .with_metadata("source", "review")
            )
            .await
    );

    let items = adapter
        .get_short_term_memory("the client wants a dark theme", 5)
        .await;
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.content, "the client wants a dark theme");
    assert_eq!(item.memory_type(), Some("short_term"));
    assert!(item.similarity_score().unwrap() > 0.99);
    assert_eq!(item.metadata["source"], "review");
    assert_eq!(item.metadata["content_type"], "task_output");
    assert!(item.metadata["created_at"].as_str().is_some());
}

#[tokio::test]
async fn test_retrieve_groups_kinds_in_order() {
    let (adapter, _coordinator, _dir) = create_adapter(test_policy()).await;
    assert!(adapter.store_long_term(AdapterItem::new("quarterly planning notes")).await);
    assert!(adapter.store_short_term(AdapterItem::new("quarterly planning notes")).await);

    let items = adapter.retrieve("quarterly planning notes", 5).await;
    let kinds: Vec<_> = items.iter().filter_map(AdapterItem::memory_type).collect();
    assert_eq!(kinds, ["short_term", "long_term"]);
}

#[tokio::test]
async fn test_agent_id_is_stamped() {
    let (adapter, coordinator, _dir) = create_adapter(test_policy()).await;
    let adapter = adapter.for_agent("researcher");
    assert!(adapter.store(AdapterItem::new("found three candidate vendors")).await);

    let recent = coordinator
        .short_term(adapter.tenant())
        .await
        .unwrap()
        .get_recent(1, None)
        .await
        .unwrap();
    assert_eq!(recent[0].agent_id.as_deref(), Some("researcher"));
    assert_eq!(
        recent[0].metadata.as_ref().unwrap()["agent_id"],
        "researcher"
    );
}

#[tokio::test]
async fn test_entity_gate_reports_false() {
    let (adapter, coordinator, _dir) = create_adapter(test_policy()).await;
    assert!(!adapter.store_entity(AdapterItem::new("Globex")).await);
    assert_eq!(
        coordinator
            .recent(adapter.tenant(), MemoryKind::Entity, 10, None)
            .await
            .unwrap()
            .len(),
        0
    );

    let lenient = MemoryPolicy {
        entity_confidence_threshold: 0.5,
        ..test_policy()
    };
    let (adapter, _coordinator, _dir) = create_adapter(lenient).await;
    assert!(
        adapter
            .store_entity(AdapterItem::new("Globex").with_metadata("industry", "energy"))
            .await
    );
    let items = adapter.get_entity_memory("Globex", 5).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].metadata["industry"], "energy");
}

#[tokio::test]
async fn test_blank_content_reports_false() {
    let (adapter, _coordinator, _dir) = create_adapter(test_policy()).await;
    assert!(!adapter.store(AdapterItem::new("  ")).await);
}

#[tokio::test]
async fn test_clear_and_stats() {
    let (adapter, _coordinator, _dir) = create_adapter(test_policy()).await;
    adapter.store(AdapterItem::new("first note")).await;
    adapter.store_long_term(AdapterItem::new("durable note")).await;

    let stats = adapter.get_stats().await.unwrap();
    assert_eq!(stats.counts.total, 2);

    adapter.clear().await;
    let stats = adapter.get_stats().await.unwrap();
    assert_eq!(stats.counts.total, 0);
    assert!(adapter.retrieve("first note", 5).await.is_empty());
}

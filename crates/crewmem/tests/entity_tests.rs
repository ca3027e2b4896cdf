//! Integration tests for the entity store and relationship graph

use std::sync::Arc;

use chrono::{Duration, Utc};
use crewmem::config::MemoryPolicy;
use crewmem::embedding::HashEmbeddingProvider;
use crewmem::memory::EntityStore;
use crewmem::memory::params::{EntityFilter, EntityInput, EntityUpdate, SearchParams};
use crewmem::memory::types::{EntityRecord, Metadata, RelationshipDirection};
use crewmem::storage::LanceStore;
use crewmem::testing::{TEST_DIMENSION, test_context, test_policy, test_store};
use crewmem::TenantId;
use serde_json::json;
use tempfile::{TempDir, tempdir};
use uuid::Uuid;

/// Test fixture: entity store with a 0.5 confidence gate
async fn create_store() -> (EntityStore, Arc<LanceStore>, TempDir) {
    let policy = MemoryPolicy {
        entity_confidence_threshold: 0.5,
        ..test_policy()
    };
    let dir = tempdir().unwrap();
    let db = test_store(dir.path()).await.unwrap();
    let ctx = test_context(Arc::clone(&db), "crew-1", policy).await.unwrap();
    (EntityStore::new(ctx), db, dir)
}

fn entity(name: &str, entity_type: &str, confidence: f32) -> EntityInput {
    EntityInput::new(format!("{name} was mentioned"))
        .with_name(name)
        .with_type(entity_type)
        .with_confidence(confidence)
}

/// Test fixture: an entity row written straight to the database
fn backdated_entity(name: &str, confidence: f32, age_days: i64) -> EntityRecord {
    let at = Utc::now() - Duration::days(age_days);
    EntityRecord {
        id: Uuid::new_v4(),
        tenant_id: TenantId::new("crew-1").unwrap(),
        name: name.to_string(),
        entity_type: "person".to_string(),
        description: None,
        attributes: Metadata::new(),
        confidence,
        mention_count: 1,
        first_mentioned: at,
        last_updated: at,
        embedding: HashEmbeddingProvider::new(TEST_DIMENSION).embed_sync(name),
    }
}

mod gating_tests {
    use super::*;

    #[tokio::test]
    async fn test_low_confidence_is_refused() {
        let (store, _db, _dir) = create_store().await;

        let err = store
            .store(entity("Ghost", "person", 0.3))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_name_falls_back_to_first_word() {
        let (store, _db, _dir) = create_store().await;

        let id = store
            .store(EntityInput::new("Kubernetes cluster in eu-west").with_confidence(0.9))
            .await
            .unwrap();
        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.name, "Kubernetes");
        assert_eq!(record.entity_type, "unknown");
        assert_eq!(record.mention_count, 1);
    }
}

mod merge_tests {
    use super::*;

    #[tokio::test]
    async fn test_repeat_mentions_merge() {
        let (store, _db, _dir) = create_store().await;

        let first = store
            .store(entity("Acme", "organization", 0.6))
            .await
            .unwrap();
        let second = store
            .store(entity("Acme", "organization", 0.9))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count().await.unwrap(), 1);
        let acme = store.get_by_id(first).await.unwrap().unwrap();
        assert_eq!(acme.confidence, 0.9);
        assert_eq!(acme.mention_count, 2);
    }

    #[tokio::test]
    async fn test_merge_fills_description_and_extends_attributes() {
        let (store, _db, _dir) = create_store().await;

        let mut first_attrs = Metadata::new();
        first_attrs.insert("hq".to_string(), json!("Berlin"));
        let id = store
            .store(entity("Globex", "organization", 0.7).with_attributes(first_attrs))
            .await
            .unwrap();

        let mut second_attrs = Metadata::new();
        second_attrs.insert("employees".to_string(), json!(1200));
        store
            .store(
                entity("Globex", "organization", 0.6)
                    .with_description("Logistics supplier")
                    .with_attributes(second_attrs),
            )
            .await
            .unwrap();
        store
            .store(entity("Globex", "organization", 0.6).with_description("Ignored rewrite"))
            .await
            .unwrap();

        let globex = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(globex.description.as_deref(), Some("Logistics supplier"));
        assert_eq!(globex.attributes.get("hq"), Some(&json!("Berlin")));
        assert_eq!(globex.attributes.get("employees"), Some(&json!(1200)));
        assert_eq!(globex.confidence, 0.7);
        assert_eq!(globex.mention_count, 3);
    }

    #[tokio::test]
    async fn test_different_types_do_not_merge() {
        let (store, _db, _dir) = create_store().await;

        let person = store.store(entity("Jordan", "person", 0.8)).await.unwrap();
        let place = store.store(entity("Jordan", "location", 0.8)).await.unwrap();

        assert_ne!(person, place);
        assert_eq!(store.count().await.unwrap(), 2);
        let people = store.get_by_type("person", 10).await.unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].id, person);
    }

    #[tokio::test]
    async fn test_update_replaces_attributes() {
        let (store, _db, _dir) = create_store().await;
        let id = store.store(entity("Initech", "organization", 0.8)).await.unwrap();

        let mut attrs = Metadata::new();
        attrs.insert("sector".to_string(), json!("software"));
        assert!(
            store
                .update(
                    id,
                    EntityUpdate {
                        description: Some("Makes TPS report tooling".to_string()),
                        attributes: Some(attrs.clone()),
                        confidence: Some(0.95),
                    },
                )
                .await
                .unwrap()
        );

        let initech = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(initech.attributes, attrs);
        assert_eq!(initech.confidence, 0.95);
        assert!(!store.update(Uuid::new_v4(), EntityUpdate::default()).await.unwrap());
    }
}

mod retrieval_tests {
    use super::*;

    #[tokio::test]
    async fn test_retrieve_bumps_only_returned_entities() {
        let (store, _db, _dir) = create_store().await;
        let target = store
            .store(entity("Marlowe", "person", 0.8).with_description("private investigator"))
            .await
            .unwrap();
        let other = store
            .store(entity("Vivian", "person", 0.8).with_description("heiress"))
            .await
            .unwrap();

        let hits = store
            .retrieve(
                "Marlowe person private investigator",
                &SearchParams::new(1, 0.0),
                &EntityFilter::default(),
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, target);
        assert_eq!(hits[0].record.mention_count, 2);
        assert_eq!(store.get_by_id(target).await.unwrap().unwrap().mention_count, 2);
        assert_eq!(store.get_by_id(other).await.unwrap().unwrap().mention_count, 1);
    }

    #[tokio::test]
    async fn test_filters_by_type_and_confidence() {
        let (store, _db, _dir) = create_store().await;
        store.store(entity("Falcon", "project", 0.55)).await.unwrap();
        let strong = store.store(entity("Falcon", "product", 0.95)).await.unwrap();

        let filter = EntityFilter {
            min_confidence: Some(0.9),
            ..Default::default()
        };
        let hits = store
            .retrieve("Falcon", &SearchParams::new(10, 0.0), &filter)
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.record.id == strong));
    }
}

mod relationship_tests {
    use super::*;

    #[tokio::test]
    async fn test_edges_deduplicate_and_keep_max_strength() {
        let (store, _db, _dir) = create_store().await;
        let a = store.store(entity("Dana", "person", 0.8)).await.unwrap();
        let b = store.store(entity("Umbrella", "organization", 0.8)).await.unwrap();

        let first = store
            .add_relationship(a, b, "works_for", Some(0.4), None)
            .await
            .unwrap();
        let second = store
            .add_relationship(a, b, "works_for", Some(0.7), Some("since 2021".to_string()))
            .await
            .unwrap();
        store
            .add_relationship(a, b, "works_for", Some(0.2), Some("rumour".to_string()))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count_relationships().await.unwrap(), 1);
        let views = store.get_relationships(a, None).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].relationship.strength, 0.7);
        assert_eq!(views[0].relationship.context.as_deref(), Some("rumour"));
    }

    #[tokio::test]
    async fn test_views_carry_direction_and_other_endpoint() {
        let (store, _db, _dir) = create_store().await;
        let a = store.store(entity("Dana", "person", 0.8)).await.unwrap();
        let b = store.store(entity("Umbrella", "organization", 0.8)).await.unwrap();
        store.add_relationship(a, b, "works_for", None, None).await.unwrap();
        store.add_relationship(b, a, "employs", None, None).await.unwrap();

        let from_a = store.get_relationships(a, None).await.unwrap();
        assert_eq!(from_a.len(), 2);
        assert_eq!(from_a[0].direction, RelationshipDirection::Outgoing);
        assert_eq!(from_a[0].other_entity.name, "Umbrella");
        assert_eq!(from_a[0].relationship.strength, 0.5);
        assert_eq!(from_a[1].direction, RelationshipDirection::Incoming);

        let employs = store.get_relationships(a, Some("employs")).await.unwrap();
        assert_eq!(employs.len(), 1);
        assert_eq!(employs[0].relationship.source_entity_id, b);
    }

    #[tokio::test]
    async fn test_missing_endpoint_and_empty_type() {
        let (store, _db, _dir) = create_store().await;
        let a = store.store(entity("Dana", "person", 0.8)).await.unwrap();

        let err = store
            .add_relationship(a, Uuid::new_v4(), "knows", None, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = store
            .add_relationship(a, a, "  ", None, None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert!(store.get_relationships(Uuid::new_v4(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_touching_edges() {
        let (store, _db, _dir) = create_store().await;
        let a = store.store(entity("Dana", "person", 0.8)).await.unwrap();
        let b = store.store(entity("Umbrella", "organization", 0.8)).await.unwrap();
        let c = store.store(entity("Raccoon", "location", 0.8)).await.unwrap();
        store.add_relationship(a, b, "works_for", None, None).await.unwrap();
        store.add_relationship(c, a, "home_of", None, None).await.unwrap();
        store.add_relationship(b, c, "located_in", None, None).await.unwrap();

        assert!(store.delete(a).await.unwrap());
        assert!(!store.delete(a).await.unwrap());
        assert_eq!(store.count_relationships().await.unwrap(), 1);
        assert_eq!(store.get_relationships(b, None).await.unwrap().len(), 1);
    }
}

mod cleanup_tests {
    use super::*;

    #[tokio::test]
    async fn test_cleanup_removes_stale_entities_and_source_orphans() {
        let (store, db, _dir) = create_store().await;
        let stale = backdated_entity("Forgotten", 0.2, 90);
        let old_confident = backdated_entity("Veteran", 0.9, 90);
        db.insert(&[stale.clone(), old_confident.clone()]).await.unwrap();
        let fresh = store.store(entity("Newcomer", "person", 0.8)).await.unwrap();

        store
            .add_relationship(stale.id, fresh, "mentored", None, None)
            .await
            .unwrap();
        store
            .add_relationship(fresh, stale.id, "remembers", None, None)
            .await
            .unwrap();

        // one stale entity plus the edge it was the source of
        assert_eq!(store.cleanup().await.unwrap(), 2);
        assert_eq!(store.cleanup().await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 2);

        assert_eq!(store.count_relationships().await.unwrap(), 1);
        assert!(store.get_relationships(fresh, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_removes_entities_and_edges() {
        let (store, _db, _dir) = create_store().await;
        let a = store.store(entity("Dana", "person", 0.8)).await.unwrap();
        let b = store.store(entity("Umbrella", "organization", 0.8)).await.unwrap();
        store.add_relationship(a, b, "works_for", None, None).await.unwrap();

        assert_eq!(store.clear_all().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.count_relationships().await.unwrap(), 0);
    }
}

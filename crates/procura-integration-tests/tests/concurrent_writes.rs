//! Two engines writing through one store, with the second engine's write
//! landing between the first one's read and its commit.

use std::sync::Arc;

use procura_access::PolicyTable;
use procura_core::{ActorId, EntityType, GroupId, RecordId, Role};
use procura_crypto::KeyPair;
use procura_pipeline::{Engine, PipelineError};
use procura_storage::{KvStore, MemoryKvStore};
use procura_test::{InterleavingKvStore, TestWorld, child_draft, owned_draft, test_client};

/// A world whose engine reads through an [`InterleavingKvStore`], plus a
/// second engine writing straight to the shared store.
async fn racing_world() -> (TestWorld, InterleavingKvStore, Arc<Engine>) {
    let shared: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let racing = InterleavingKvStore::new(Arc::clone(&shared));
    let world = TestWorld::with_store(Arc::new(racing.clone()), |e| e)
        .await
        .unwrap();
    let other = Arc::new(Engine::new(
        shared,
        Arc::new(KeyPair::generate()),
        PolicyTable::default(),
    ));
    (world, racing, other)
}

fn line_item_row(id: RecordId) -> (String, String) {
    (
        format!("record:{}", EntityType::LineItem.table_name()),
        id.storage_key(),
    )
}

fn conflict(err: &PipelineError) -> bool {
    matches!(err, PipelineError::Conflict(_))
}

#[tokio::test]
async fn test_child_create_loses_to_parent_delete() {
    let (world, racing, other) = racing_world().await;
    let g = world.group("plant").await.unwrap();
    let parent = world
        .create(&world.admin, EntityType::LineItem, owned_draft(g))
        .await
        .unwrap()
        .id;

    let (ns, key) = line_item_row(parent);
    let (admin, client) = (world.admin.clone(), test_client());
    racing.after_read(&ns, &key, move || async move {
        other
            .delete(&admin, EntityType::LineItem, parent, &client)
            .await
            .unwrap();
    });

    let err = world
        .engine
        .create(
            &world.admin,
            EntityType::WorkBreakdown,
            child_draft(parent),
            &world.client,
        )
        .await
        .unwrap_err();
    assert!(racing.fired());
    assert!(conflict(&err), "expected a conflict, got {err:?}");

    assert!(world.store.get(&ns, &key).await.unwrap().is_none());
    assert!(
        world
            .engine
            .list_accessible_ids(&world.admin, EntityType::WorkBreakdown)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_parent_delete_loses_to_child_create() {
    let (world, racing, other) = racing_world().await;
    let g = world.group("plant").await.unwrap();
    let parent = world
        .create(&world.admin, EntityType::LineItem, owned_draft(g))
        .await
        .unwrap()
        .id;

    let refs_key = format!(
        "{}:{}",
        EntityType::LineItem.table_name(),
        parent.storage_key()
    );
    let (admin, client) = (world.admin.clone(), test_client());
    racing.after_read("record_refs", &refs_key, move || async move {
        other
            .create(&admin, EntityType::WorkBreakdown, child_draft(parent), &client)
            .await
            .unwrap();
    });

    let err = world
        .engine
        .delete(&world.admin, EntityType::LineItem, parent, &world.client)
        .await
        .unwrap_err();
    assert!(racing.fired());
    assert!(conflict(&err), "expected a conflict, got {err:?}");

    // The parent survives with its new child underneath.
    world
        .engine
        .get_record(&world.admin, EntityType::LineItem, parent)
        .await
        .unwrap();
    let children = world
        .engine
        .list_accessible_ids(&world.admin, EntityType::WorkBreakdown)
        .await
        .unwrap();
    assert_eq!(children.len(), 1);
    assert!(matches!(
        world
            .engine
            .delete(&world.admin, EntityType::LineItem, parent, &world.client)
            .await,
        Err(PipelineError::HasDependents { count: 1, .. })
    ));
}

async fn member_and_group(world: &TestWorld) -> (ActorId, GroupId) {
    let g = world.group("crew").await.unwrap();
    let u = world.actor("una", Role::User).await.unwrap();
    (u.id, g)
}

#[tokio::test]
async fn test_group_delete_loses_to_member_add() {
    let (world, racing, other) = racing_world().await;
    let (u, g) = member_and_group(&world).await;

    let (admin, client) = (world.admin.clone(), test_client());
    racing.after_read("group_members", &g.storage_key(), move || async move {
        other.add_member(&admin, g, u, &client).await.unwrap();
    });

    let err = world
        .engine
        .delete_group(&world.admin, g, &world.client)
        .await
        .unwrap_err();
    assert!(racing.fired());
    assert!(conflict(&err), "expected a conflict, got {err:?}");
    assert!(world.store.get("groups", &g.storage_key()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_member_add_loses_to_group_delete() {
    let (world, racing, other) = racing_world().await;
    let (u, g) = member_and_group(&world).await;

    let (admin, client) = (world.admin.clone(), test_client());
    racing.after_read("groups", &g.storage_key(), move || async move {
        other.delete_group(&admin, g, &client).await.unwrap();
    });

    let err = world
        .engine
        .add_member(&world.admin, g, u, &world.client)
        .await
        .unwrap_err();
    assert!(racing.fired());
    assert!(conflict(&err), "expected a conflict, got {err:?}");
    assert!(world.store.get("groups", &g.storage_key()).await.unwrap().is_none());
    assert!(
        world
            .store
            .get("group_members", &g.storage_key())
            .await
            .unwrap()
            .is_none()
    );
}

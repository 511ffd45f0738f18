//! End-to-end access scenarios over the ownership chain and business cases.

use procura_core::{AccessLevel, Actor, EntityType, RecordDraft, RecordId, RecordPatch, Role};
use procura_grants::GrantRequest;
use procura_pipeline::{PipelineError, PipelineState};
use procura_test::{TestWorld, business_case_draft, owned_draft};

async fn allows(world: &TestWorld, actor: &Actor, ty: EntityType, id: RecordId, level: AccessLevel) -> bool {
    world
        .engine
        .check_access(actor, ty, id, level)
        .await
        .unwrap()
        .is_allowed()
}

#[tokio::test]
async fn test_chain_visibility_and_read_grant() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("capex").await.unwrap();
    let u = world.member("ursula", Role::User, g).await.unwrap();
    let v = world.actor("victor", Role::User).await.unwrap();

    let chain = world.chain(&u, g).await.unwrap();
    for record in [&chain.work_breakdown, &chain.asset, &chain.purchase_order] {
        assert_eq!(record.owner_group, Some(g));
    }
    let p = chain.purchase_order.id;

    assert!(allows(&world, &u, EntityType::PurchaseOrder, p, AccessLevel::Read).await);
    assert!(allows(&world, &u, EntityType::PurchaseOrder, p, AccessLevel::Write).await);
    assert!(
        !world
            .engine
            .list_accessible_ids(&v, EntityType::PurchaseOrder)
            .await
            .unwrap()
            .contains(&p)
    );

    let target = chain.purchase_order.record_ref();
    world
        .engine
        .create_grant(&u, GrantRequest::to_actor(target, v.id, AccessLevel::Read), &world.client)
        .await
        .unwrap();

    let visible = world
        .engine
        .list_accessible_ids(&v, EntityType::PurchaseOrder)
        .await
        .unwrap();
    assert!(visible.contains(&p));
    assert!(allows(&world, &v, EntityType::PurchaseOrder, p, AccessLevel::Read).await);
    assert!(!allows(&world, &v, EntityType::PurchaseOrder, p, AccessLevel::Write).await);

    let err = world
        .engine
        .delete(&v, EntityType::PurchaseOrder, p, &world.client)
        .await
        .unwrap_err();
    assert!(err.is_denied());
}

#[tokio::test]
async fn test_privileged_roles_always_allowed() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("ops").await.unwrap();
    let u = world.member("uwe", Role::User, g).await.unwrap();
    let m = world.actor("mara", Role::Manager).await.unwrap();
    let chain = world.chain(&u, g).await.unwrap();

    for actor in [&world.admin, &m] {
        for level in [AccessLevel::Read, AccessLevel::Write, AccessLevel::Full] {
            assert!(allows(&world, actor, EntityType::Asset, chain.asset.id, level).await);
        }
        assert!(
            allows(&world, actor, EntityType::Asset, RecordId::new(9_999), AccessLevel::Full).await
        );
    }
}

#[tokio::test]
async fn test_owner_group_never_yields_full() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("ops").await.unwrap();
    let creator = world.member("cora", Role::User, g).await.unwrap();
    let peer = world.member("pete", Role::User, g).await.unwrap();
    let chain = world.chain(&creator, g).await.unwrap();
    let asset = chain.asset.id;

    assert!(allows(&world, &creator, EntityType::Asset, asset, AccessLevel::Full).await);
    assert!(allows(&world, &peer, EntityType::Asset, asset, AccessLevel::Write).await);
    assert!(!allows(&world, &peer, EntityType::Asset, asset, AccessLevel::Full).await);

    let grant = GrantRequest::to_actor(chain.asset.record_ref(), peer.id, AccessLevel::Full);
    world
        .engine
        .create_grant(&creator, grant, &world.client)
        .await
        .unwrap();
    assert!(allows(&world, &peer, EntityType::Asset, asset, AccessLevel::Full).await);
}

#[tokio::test]
async fn test_viewer_in_owner_group_gets_nothing_by_membership() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("ops").await.unwrap();
    let u = world.member("ulla", Role::User, g).await.unwrap();
    let viewer = world.member("vera", Role::Viewer, g).await.unwrap();
    let chain = world.chain(&u, g).await.unwrap();

    assert!(!allows(&world, &viewer, EntityType::LineItem, chain.line_item.id, AccessLevel::Read).await);
    let err = world
        .engine
        .create(&viewer, EntityType::BudgetItem, owned_draft(g), &world.client)
        .await
        .unwrap_err();
    assert!(err.is_denied());
}

#[tokio::test]
async fn test_inheritance_is_a_creation_time_copy() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("north").await.unwrap();
    let g2 = world.group("south").await.unwrap();
    let u = world.member("una", Role::User, g).await.unwrap();
    let chain = world.chain(&u, g).await.unwrap();

    assert_eq!(
        world
            .engine
            .resolve_owner_group(EntityType::Asset, chain.asset.id)
            .await
            .unwrap(),
        g
    );

    world
        .engine
        .update(
            &u,
            EntityType::LineItem,
            chain.line_item.id,
            RecordPatch::new().with_owner_group(g2),
            &world.client,
        )
        .await
        .unwrap();

    let po = world
        .engine
        .get_record(&world.admin, EntityType::PurchaseOrder, chain.purchase_order.id)
        .await
        .unwrap();
    assert_eq!(po.owner_group, Some(g));

    let newer = world
        .create(
            &world.admin,
            EntityType::WorkBreakdown,
            RecordDraft::new().with_parent(chain.line_item.id),
        )
        .await
        .unwrap();
    assert_eq!(newer.owner_group, Some(g2));
}

#[tokio::test]
async fn test_missing_parent_persists_nothing() {
    let world = TestWorld::new().await.unwrap();
    let before = world.engine.audit_log().count().await.unwrap();

    let err = world
        .engine
        .create(
            &world.admin,
            EntityType::GoodsReceipt,
            RecordDraft::new().with_parent(RecordId::new(404)),
            &world.client,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ParentMissing(_)));
    assert!(matches!(
        world
            .engine
            .resolve_owner_group(EntityType::PurchaseOrder, RecordId::new(404))
            .await,
        Err(PipelineError::ParentMissing(_))
    ));

    assert_eq!(world.engine.audit_log().count().await.unwrap(), before);
    assert!(
        world
            .engine
            .list_accessible_ids(&world.admin, EntityType::GoodsReceipt)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_business_case_draft_seal() {
    let world = TestWorld::new().await.unwrap();
    let u = world.actor("bea", Role::User).await.unwrap();
    let m = world.actor("max", Role::Manager).await.unwrap();

    let created = world
        .engine
        .create(&u, EntityType::BusinessCase, business_case_draft("Line 4 retrofit"), &world.client)
        .await
        .unwrap();
    assert_eq!(
        created.trace,
        vec![
            PipelineState::Authorizing,
            PipelineState::Snapshotting,
            PipelineState::Mutating,
            PipelineState::Auditing,
            PipelineState::Committed,
        ]
    );
    let b = created.value.id;
    assert!(allows(&world, &u, EntityType::BusinessCase, b, AccessLevel::Write).await);
    assert!(!allows(&world, &u, EntityType::BusinessCase, b, AccessLevel::Full).await);

    world
        .engine
        .update(&u, EntityType::BusinessCase, b, RecordPatch::new().set("amount", 90_000), &world.client)
        .await
        .unwrap();

    let err = world
        .engine
        .update(&u, EntityType::BusinessCase, b, RecordPatch::new().with_status("Submitted"), &world.client)
        .await
        .unwrap_err();
    assert!(err.is_denied());

    world
        .engine
        .update(&m, EntityType::BusinessCase, b, RecordPatch::new().with_status("Submitted"), &world.client)
        .await
        .unwrap();
    assert!(allows(&world, &u, EntityType::BusinessCase, b, AccessLevel::Read).await);
    assert!(!allows(&world, &u, EntityType::BusinessCase, b, AccessLevel::Write).await);

    world
        .engine
        .update(&m, EntityType::BusinessCase, b, RecordPatch::new().with_status("Draft"), &world.client)
        .await
        .unwrap();
    assert!(!allows(&world, &u, EntityType::BusinessCase, b, AccessLevel::Write).await);
}

#[tokio::test]
async fn test_budget_write_reaches_business_case() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("budget").await.unwrap();
    let author = world.actor("ada", Role::User).await.unwrap();
    let holder = world.member("hugo", Role::User, g).await.unwrap();
    let outsider = world.actor("otto", Role::User).await.unwrap();

    let case = world
        .create(&author, EntityType::BusinessCase, business_case_draft("Press line"))
        .await
        .unwrap();
    let budget = world
        .create(&world.admin, EntityType::BudgetItem, owned_draft(g))
        .await
        .unwrap();

    assert!(!allows(&world, &holder, EntityType::BusinessCase, case.id, AccessLevel::Read).await);

    // The line item's creator must be able to read both links.
    let linking = owned_draft(g)
        .with_link(EntityType::BusinessCase, case.id)
        .with_link(EntityType::BudgetItem, budget.id);
    let err = world
        .engine
        .create(&holder, EntityType::LineItem, linking.clone(), &world.client)
        .await
        .unwrap_err();
    assert!(err.is_denied());
    world
        .create(&world.admin, EntityType::LineItem, linking)
        .await
        .unwrap();

    assert!(allows(&world, &holder, EntityType::BusinessCase, case.id, AccessLevel::Write).await);
    assert!(!allows(&world, &holder, EntityType::BusinessCase, case.id, AccessLevel::Full).await);
    assert!(
        world
            .engine
            .list_accessible_ids(&holder, EntityType::BusinessCase)
            .await
            .unwrap()
            .contains(&case.id)
    );
    assert!(!allows(&world, &outsider, EntityType::BusinessCase, case.id, AccessLevel::Read).await);

    let grant = GrantRequest::to_actor(case.record_ref(), outsider.id, AccessLevel::Full);
    world
        .engine
        .create_grant(&world.admin, grant, &world.client)
        .await
        .unwrap();
    assert!(allows(&world, &outsider, EntityType::BusinessCase, case.id, AccessLevel::Full).await);
}

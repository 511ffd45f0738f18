//! Audit trail contents, replay, verification and tamper detection.

use procura_audit::{AuditAction, ChainIssue, MutationRecord, StreamKey, entry_diff, replay};
use procura_core::{AccessLevel, EntityType, RecordPatch, Role};
use procura_grants::GrantRequest;
use procura_pipeline::GRANT_TABLE;
use procura_test::{TestWorld, owned_draft};
use serde_json::json;

#[tokio::test]
async fn test_update_states_match_live_record() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("fleet").await.unwrap();
    let u = world.member("ute", Role::User, g).await.unwrap();
    let item = world
        .create(&u, EntityType::BudgetItem, owned_draft(g).with_field("amount", 10))
        .await
        .unwrap();

    let before = world
        .engine
        .get_record(&u, EntityType::BudgetItem, item.id)
        .await
        .unwrap();
    let updated = world
        .engine
        .update(
            &u,
            EntityType::BudgetItem,
            item.id,
            RecordPatch::new().set("amount", 25).unset("title"),
            &world.client,
        )
        .await
        .unwrap();

    assert_eq!(updated.entry.action, AuditAction::Update);
    assert_eq!(updated.entry.old_state, Some(before.to_state().unwrap()));
    assert_eq!(updated.entry.new_state, Some(updated.value.to_state().unwrap()));
    assert_eq!(updated.entry.client_ip.as_deref(), Some("192.0.2.10"));

    let changes = entry_diff(&updated.entry);
    assert!(changes.iter().any(|c| c.path == "fields.amount"));
    assert!(changes.iter().any(|c| c.path == "fields.title"));
}

#[tokio::test]
async fn test_replay_reconstructs_record() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("fleet").await.unwrap();
    let chain = world.chain(&world.admin, g).await.unwrap();
    let asset = chain.asset.id;

    for amount in [100, 200, 300] {
        world
            .engine
            .update(
                &world.admin,
                EntityType::Asset,
                asset,
                RecordPatch::new().set("amount", amount),
                &world.client,
            )
            .await
            .unwrap();
    }

    let table = EntityType::Asset.table_name();
    let history = world
        .engine
        .audit_history(&world.admin, table, asset.get())
        .await
        .unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.windows(2).all(|w| w[1].follows(&w[0])));

    let live = world
        .engine
        .get_record(&world.admin, EntityType::Asset, asset)
        .await
        .unwrap();
    assert_eq!(replay(&history).unwrap(), Some(live.to_state().unwrap()));

    // Children block deletion of the asset; delete the purchase order instead.
    let po = chain.purchase_order.id;
    world
        .engine
        .delete(&world.admin, EntityType::PurchaseOrder, po, &world.client)
        .await
        .unwrap();
    let po_history = world
        .engine
        .audit_history(&world.admin, EntityType::PurchaseOrder.table_name(), po.get())
        .await
        .unwrap();
    assert_eq!(po_history.last().unwrap().action, AuditAction::Delete);
    assert_eq!(replay(&po_history).unwrap(), None);
}

#[tokio::test]
async fn test_tampered_entry_fails_verification() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("fleet").await.unwrap();
    let item = world
        .create(&world.admin, EntityType::BudgetItem, owned_draft(g))
        .await
        .unwrap();
    let updated = world
        .engine
        .update(
            &world.admin,
            EntityType::BudgetItem,
            item.id,
            RecordPatch::new().set("amount", 1),
            &world.client,
        )
        .await
        .unwrap();

    let table = EntityType::BudgetItem.table_name();
    let clean = world
        .engine
        .verify_audit_chain(&world.admin, table, item.id.get())
        .await
        .unwrap();
    assert!(clean.valid);
    assert_eq!(clean.entries_verified, 2);

    world
        .tamper_entry(&updated.entry, |v| {
            v["new_state"]["fields"]["amount"] = json!(1_000_000);
        })
        .await
        .unwrap();

    let result = world
        .engine
        .verify_audit_chain(&world.admin, table, item.id.get())
        .await
        .unwrap();
    assert!(!result.valid);
    assert!(result.issues.contains(&ChainIssue::InvalidSignature {
        entry_id: updated.entry.id
    }));

    let all = world.engine.verify_audit_log(&world.admin).await.unwrap();
    let stream = StreamKey::new(table, item.id.get());
    assert!(all.iter().any(|(key, r)| *key == stream && !r.valid));
}

#[tokio::test]
async fn test_revoke_affects_future_checks_only() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("fleet").await.unwrap();
    let owner = world.member("olga", Role::User, g).await.unwrap();
    let reader = world.actor("rolf", Role::User).await.unwrap();
    let item = world
        .create(&owner, EntityType::BudgetItem, owned_draft(g))
        .await
        .unwrap();

    let grant = world
        .engine
        .create_grant(
            &owner,
            GrantRequest::to_actor(item.record_ref(), reader.id, AccessLevel::Read),
            &world.client,
        )
        .await
        .unwrap()
        .value;
    let read_before = world
        .engine
        .get_record(&reader, EntityType::BudgetItem, item.id)
        .await
        .unwrap();

    world
        .engine
        .revoke_grant(&owner, grant.id, &world.client)
        .await
        .unwrap();
    assert!(
        world
            .engine
            .get_record(&reader, EntityType::BudgetItem, item.id)
            .await
            .unwrap_err()
            .is_denied()
    );
    assert_eq!(read_before.id, item.id);

    let trail = world
        .engine
        .audit_history(&owner, GRANT_TABLE, grant.id.get())
        .await
        .unwrap();
    let actions: Vec<_> = trail.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Create, AuditAction::Delete]);
    assert!(
        world
            .engine
            .verify_audit_chain(&world.admin, GRANT_TABLE, grant.id.get())
            .await
            .unwrap()
            .valid
    );
}

#[tokio::test]
async fn test_handler_managed_transaction_is_audited() {
    let world = TestWorld::new().await.unwrap();
    let mut tx = world.engine.begin();
    let row = json!({"code": "CC-100", "name": "Maintenance"});
    tx.set_json("cost_centres", "1", &row).unwrap();
    let entry = world
        .engine
        .record_mutation(
            &mut tx,
            MutationRecord {
                action: AuditAction::Create,
                table_name: "cost_centre".to_string(),
                record_id: 1,
                old_state: None,
                new_state: Some(row.clone()),
                actor_id: world.admin.id,
                client: world.client.clone(),
            },
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let history = world
        .engine
        .audit_history(&world.admin, "cost_centre", 1)
        .await
        .unwrap();
    assert_eq!(history, vec![entry]);
    assert!(world.engine.audit_log().entry(history[0].id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_audit_query_roles() {
    let world = TestWorld::new().await.unwrap();
    let viewer = world.actor("vic", Role::Viewer).await.unwrap();
    let user = world.actor("uli", Role::User).await.unwrap();
    let manager = world.actor("mo", Role::Manager).await.unwrap();

    assert!(
        world
            .engine
            .audit_history(&viewer, "user", user.id.get())
            .await
            .unwrap_err()
            .is_denied()
    );
    assert!(
        world
            .engine
            .audit_history(&user, "user", user.id.get())
            .await
            .unwrap_err()
            .is_denied()
    );
    assert!(world.engine.audit_history(&manager, "user", user.id.get()).await.is_ok());
    assert!(world.engine.audit_recent(&user, None).await.unwrap_err().is_denied());

    let recent = world.engine.audit_recent(&manager, Some(2)).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent[0].timestamp >= recent[1].timestamp);
}

#[tokio::test]
async fn test_record_history_follows_read_access() {
    let world = TestWorld::new().await.unwrap();
    let g = world.group("fleet").await.unwrap();
    let owner = world.member("oda", Role::User, g).await.unwrap();
    let outsider = world.actor("otto", Role::User).await.unwrap();
    let item = world
        .create(&owner, EntityType::BudgetItem, owned_draft(g))
        .await
        .unwrap();
    let table = EntityType::BudgetItem.table_name();

    assert_eq!(
        world
            .engine
            .audit_history(&owner, table, item.id.get())
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(
        world
            .engine
            .audit_history(&outsider, table, item.id.get())
            .await
            .unwrap_err()
            .is_denied()
    );

    // Read through a grant opens the record's history but not the grant's.
    let grant = world
        .engine
        .create_grant(
            &owner,
            GrantRequest::to_actor(item.record_ref(), outsider.id, AccessLevel::Read),
            &world.client,
        )
        .await
        .unwrap()
        .value;
    assert!(world.engine.audit_history(&outsider, table, item.id.get()).await.is_ok());
    assert!(
        world
            .engine
            .audit_history(&outsider, GRANT_TABLE, grant.id.get())
            .await
            .unwrap_err()
            .is_denied()
    );
    assert!(world.engine.audit_history(&owner, GRANT_TABLE, grant.id.get()).await.is_ok());

    // Handler-managed tables have no owner to check against.
    assert!(
        world
            .engine
            .audit_history(&owner, "cost_centre", 1)
            .await
            .unwrap_err()
            .is_denied()
    );
}

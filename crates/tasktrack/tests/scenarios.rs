//! End-to-end walkthroughs of create, update, delete and cached reads.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tasktrack::lock::{LockCoordinator, MemoryLeaseStore};
use tasktrack_core::lock::{AcquireOutcome, BackoffPolicy, HolderId};
use tasktrack_core::mutation::MutationOutcome;
use tasktrack_core::record::{EntityRef, Patch, TaskPatch, VersionedRecord};
use tasktrack_core::storage::{AuditAction, DurableStore};

use common::{actor, create_project, create_task, setup};

fn retitle(title: &str) -> Patch {
    Patch::Task(TaskPatch::new().with_title(title))
}

async fn bump_to(setup: &common::Setup, entity: &EntityRef, target: u64) -> VersionedRecord {
    let mut current = setup.state.store.read(entity).await.unwrap().unwrap();
    while current.version < target {
        current = setup
            .state
            .pipeline
            .update(
                entity,
                current.version,
                &retitle(&format!("v{}", current.version + 1)),
                &actor("setup"),
            )
            .await
            .record()
            .cloned()
            .unwrap();
    }
    current
}

#[tokio::test]
async fn stale_update_conflicts_and_keeps_version() {
    let setup = setup();
    let task = create_task(&setup.state, "Draft").await;
    assert_eq!(task.version, 1);
    let entity = task.entity_ref();

    let first = setup
        .state
        .pipeline
        .update(&entity, 1, &retitle("A"), &actor("alice"))
        .await;
    assert_eq!(first.record().map(|r| r.version), Some(2));

    let stale = setup
        .state
        .pipeline
        .update(&entity, 1, &retitle("B"), &actor("bob"))
        .await;
    assert_eq!(stale, MutationOutcome::Conflict { current_version: 2 });
    assert_eq!(stale.status_code(), 409);

    let stored = setup.state.reader.get(&entity).await.unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(
        stored.data,
        first.record().unwrap().data,
        "stale patch must not land"
    );

    setup.state.shutdown().await;
}

#[tokio::test]
async fn two_writers_at_version_five_one_wins_one_conflicts() {
    let setup = setup();
    let task = create_task(&setup.state, "Shared").await;
    let entity = task.entity_ref();
    bump_to(&setup, &entity, 5).await;

    let pipeline = setup.state.pipeline.clone();
    let (left_patch, left_actor) = (retitle("left"), actor("left"));
    let (right_patch, right_actor) = (retitle("right"), actor("right"));
    let (left, right) = tokio::join!(
        pipeline.update(&entity, 5, &left_patch, &left_actor),
        pipeline.update(&entity, 5, &right_patch, &right_actor),
    );

    let mut outcomes = [left, right];
    outcomes.sort_by_key(|o| !o.is_success());
    assert_eq!(outcomes[0].record().map(|r| r.version), Some(6));
    assert_eq!(outcomes[1], MutationOutcome::Conflict { current_version: 6 });

    setup.state.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn lease_is_granted_again_after_ttl() {
    let coordinator = LockCoordinator::new(
        Arc::new(MemoryLeaseStore::new()),
        BackoffPolicy::fail_fast(),
    );
    let ttl = Duration::from_secs(10);
    let holder_a = HolderId::new("holderA");
    let holder_b = HolderId::new("holderB");

    assert!(coordinator.acquire("task:42", &holder_a, ttl).await.unwrap().is_granted());
    assert_eq!(
        coordinator.acquire("task:42", &holder_b, ttl).await.unwrap(),
        AcquireOutcome::AlreadyHeld
    );

    tokio::time::advance(ttl).await;

    match coordinator.acquire("task:42", &holder_b, ttl).await.unwrap() {
        AcquireOutcome::Granted(lease) => assert_eq!(lease.holder_id, holder_b),
        AcquireOutcome::AlreadyHeld => panic!("expired lease still blocks"),
    }
}

#[tokio::test]
async fn update_invalidates_cached_point_entry() {
    let setup = setup();
    let task = create_task(&setup.state, "Cache me").await;
    let entity = task.entity_ref();
    bump_to(&setup, &entity, 3).await;

    let loads = Arc::new(AtomicUsize::new(0));
    let load = || {
        let loads = loads.clone();
        let store = setup.store.clone();
        move || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            store.read(&entity).await
        }
    };

    let cached = setup
        .state
        .coherency
        .get_or_load(&entity, load())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.version, 3);

    let hit = setup
        .state
        .coherency
        .get_or_load(&entity, load())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.version, 3);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let updated = setup
        .state
        .pipeline
        .update(&entity, 3, &retitle("fresh"), &actor("alice"))
        .await;
    assert_eq!(updated.record().map(|r| r.version), Some(4));

    let reloaded = setup
        .state
        .coherency
        .get_or_load(&entity, load())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.version, 4);
    assert_eq!(loads.load(Ordering::SeqCst), 2);

    setup.state.shutdown().await;
}

#[tokio::test]
async fn deleting_a_deleted_record_is_not_found() {
    let setup = setup();
    let project = create_project(&setup.state, uuid::Uuid::new_v4(), "Sunset").await;
    let entity = project.entity_ref();

    let deleted = setup
        .state
        .pipeline
        .delete(&entity, 1, &actor("alice"))
        .await;
    let tombstone = deleted.record().cloned().unwrap();
    assert_eq!(tombstone.version, 2);
    assert!(tombstone.is_deleted());

    let again = setup
        .state
        .pipeline
        .delete(&entity, 2, &actor("alice"))
        .await;
    assert_eq!(again, MutationOutcome::NotFound);

    let trail = setup.state.store.audit_trail(&entity).await.unwrap();
    let actions: Vec<AuditAction> = trail.iter().map(|entry| entry.action).collect();
    assert_eq!(actions, vec![AuditAction::Created, AuditAction::Deleted]);
    assert_eq!(trail[1].before.as_ref().map(|r| r.version), Some(1));

    assert_eq!(setup.state.reader.get(&entity).await.unwrap(), None);

    setup.state.shutdown().await;
}

#[tokio::test]
async fn tenants_never_see_each_others_records() {
    let setup = setup();
    let mine = uuid::Uuid::new_v4();
    let theirs = uuid::Uuid::new_v4();
    let project = create_project(&setup.state, mine, "Private").await;

    let foreign = EntityRef::new(theirs, project.entity_type(), project.id);
    assert_eq!(setup.state.reader.get(&foreign).await.unwrap(), None);

    let outcome = setup
        .state
        .pipeline
        .delete(&foreign, 1, &actor("mallory"))
        .await;
    assert_eq!(outcome, MutationOutcome::NotFound);

    let own = setup.state.reader.get(&project.entity_ref()).await.unwrap();
    assert_eq!(own.map(|r| r.version), Some(1));

    setup.state.shutdown().await;
}

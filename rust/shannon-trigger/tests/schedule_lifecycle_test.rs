//! Schedule lifecycle integration tests.
//!
//! Covers create/update/online/offline/delete against the in-memory store and
//! trigger engine, including compensation when the trigger engine fails.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Duration;

use common::{Fixture, cron_params, daily_params, utc};
use shannon_trigger::ControlError;
use shannon_trigger::database::ScheduleRepository;
use shannon_trigger::domain::{Operator, ReleaseState, WorkflowDefinition};
use shannon_trigger::runtime::{InMemoryTriggerEngine, TriggerEngineClient};
use shannon_trigger::scheduler::{Schedule, SchedulePolicy};

/// Trigger engine whose calls can be made to fail on demand.
#[derive(Debug, Default)]
struct FlakyTriggerEngine {
    fail_register: AtomicBool,
    fail_deregister: AtomicBool,
    inner: InMemoryTriggerEngine,
}

#[async_trait]
impl TriggerEngineClient for FlakyTriggerEngine {
    async fn register_cron(&self, schedule: &Schedule) -> anyhow::Result<()> {
        if self.fail_register.load(Ordering::SeqCst) {
            anyhow::bail!("trigger engine unreachable");
        }
        self.inner.register_cron(schedule).await
    }

    async fn deregister_cron(&self, schedule_id: i64) -> anyhow::Result<()> {
        if self.fail_deregister.load(Ordering::SeqCst) {
            anyhow::bail!("trigger engine unreachable");
        }
        self.inner.deregister_cron(schedule_id).await
    }
}

async fn stored(fixture: &Fixture, schedule_id: i64) -> Schedule {
    ScheduleRepository::select_by_id(&fixture.store, schedule_id)
        .await
        .unwrap()
        .expect("schedule exists")
}

// ============================================================================
// Full lifecycle
// ============================================================================

/// create -> online -> offline -> delete succeeds and keeps the trigger
/// engine in step.
#[tokio::test]
async fn test_full_lifecycle() {
    let fixture = Fixture::new();
    fixture.released_workflow(10);
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    let schedule = schedules
        .create(&owner, 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();
    assert_eq!(schedule.release_state, ReleaseState::Offline);
    assert!(!fixture.engine.is_registered(schedule.id));

    let online = schedules.online(&owner, schedule.id).await.unwrap();
    assert_eq!(online.release_state, ReleaseState::Online);
    assert_eq!(
        fixture.engine.registered_cron(schedule.id).as_deref(),
        Some("0 0 0 * * *")
    );

    let offline = schedules.offline(&owner, schedule.id).await.unwrap();
    assert_eq!(offline.release_state, ReleaseState::Offline);
    assert!(!fixture.engine.is_registered(schedule.id));

    schedules.delete(&owner, schedule.id).await.unwrap();
    let gone = ScheduleRepository::select_by_id(&fixture.store, schedule.id)
        .await
        .unwrap();
    assert!(gone.is_none());
}

/// Deleting before going offline is rejected and leaves the schedule alone.
#[tokio::test]
async fn test_delete_online_schedule_rejected() {
    let fixture = Fixture::new();
    fixture.released_workflow(10);
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    let schedule = schedules
        .create(&owner, 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();
    schedules.online(&owner, schedule.id).await.unwrap();

    let err = schedules.delete(&owner, schedule.id).await.unwrap_err();
    assert!(matches!(err, ControlError::ScheduleIsOnline(id) if id == schedule.id));
    assert_eq!(
        stored(&fixture, schedule.id).await.release_state,
        ReleaseState::Online
    );
    assert!(fixture.engine.is_registered(schedule.id));
}

/// Online and offline are no-ops when the schedule is already there.
#[tokio::test]
async fn test_online_offline_idempotent() {
    let fixture = Fixture::new();
    fixture.released_workflow(10);
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    let schedule = schedules
        .create(&owner, 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();

    let offline = schedules.offline(&owner, schedule.id).await.unwrap();
    assert_eq!(offline.release_state, ReleaseState::Offline);

    schedules.online(&owner, schedule.id).await.unwrap();
    let again = schedules.online(&owner, schedule.id).await.unwrap();
    assert_eq!(again.release_state, ReleaseState::Online);
    assert!(fixture.engine.is_registered(schedule.id));
}

// ============================================================================
// Create and update
// ============================================================================

/// A workflow has at most one schedule.
#[tokio::test]
async fn test_second_schedule_rejected() {
    let fixture = Fixture::new();
    fixture.released_workflow(10);
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    schedules
        .create(&owner, 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();
    let err = schedules
        .create(&owner, 10, cron_params("0 0 12 * * *"), SchedulePolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::ScheduleAlreadyExists(10)));
}

/// Validation runs before anything is persisted.
#[tokio::test]
async fn test_create_validates_window_then_cron() {
    let fixture = Fixture::new();
    fixture.released_workflow(10);
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    let mut params = cron_params("not a cron");
    params.end_time = params.start_time;
    let err = schedules
        .create(&owner, 10, params, SchedulePolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::InvalidTimeWindow { .. }));

    let err = schedules
        .create(&owner, 10, cron_params("not a cron"), SchedulePolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::InvalidCronExpression { .. }));

    let none = ScheduleRepository::select_by_workflow(&fixture.store, 10)
        .await
        .unwrap();
    assert!(none.is_none());
}

/// Unknown workflows cannot be scheduled.
#[tokio::test]
async fn test_create_for_unknown_workflow() {
    let fixture = Fixture::new();
    let err = fixture
        .plane
        .schedules
        .create(&Operator::user(1), 99, daily_params(), SchedulePolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::WorkflowDefinitionNotFound(99)));
}

/// Updates overwrite the window and policy, and sync the warning group.
#[tokio::test]
async fn test_update_offline_schedule() {
    let fixture = Fixture::new();
    fixture.released_workflow(10);
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    let schedule = schedules
        .create(&owner, 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();

    let mut params = cron_params("0 30 6 * * Mon-Fri");
    params.end_time = utc(2024, 6, 30);
    let policy = SchedulePolicy {
        warning_group_id: Some(3),
        worker_group: Some("gpu".to_string()),
        ..SchedulePolicy::default()
    };
    let updated = schedules
        .update(&owner, schedule.id, params, policy)
        .await
        .unwrap();

    assert_eq!(updated.crontab, "0 30 6 * * Mon-Fri");
    assert_eq!(updated.worker_group, "gpu");
    let persisted = stored(&fixture, schedule.id).await;
    assert_eq!(persisted.end_time, utc(2024, 6, 30));
    assert_eq!(fixture.store.definition(10).unwrap().warning_group_id, Some(3));
}

/// ONLINE schedules must be taken offline before they can be edited.
#[tokio::test]
async fn test_update_online_schedule_rejected() {
    let fixture = Fixture::new();
    fixture.released_workflow(10);
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    let schedule = schedules
        .create(&owner, 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();
    schedules.online(&owner, schedule.id).await.unwrap();

    let err = schedules
        .update(&owner, schedule.id, cron_params("0 0 1 * * *"), SchedulePolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::ScheduleOnlineForbidsUpdate(_)));
    assert_eq!(stored(&fixture, schedule.id).await.crontab, "0 0 0 * * *");
}

/// Missing schedules are reported as such.
#[tokio::test]
async fn test_unknown_schedule() {
    let fixture = Fixture::new();
    let owner = Operator::user(1);

    let err = fixture.plane.schedules.online(&owner, 42).await.unwrap_err();
    assert!(matches!(err, ControlError::ScheduleNotFound(42)));
    let err = fixture.plane.schedules.delete(&owner, 42).await.unwrap_err();
    assert!(matches!(err, ControlError::ScheduleNotFound(42)));
}

// ============================================================================
// Preconditions and permissions
// ============================================================================

/// A schedule cannot go online while its workflow is unreleased.
#[tokio::test]
async fn test_online_requires_released_workflow() {
    let fixture = Fixture::new();
    fixture
        .store
        .put_definition(WorkflowDefinition::new(10, "draft", 1));
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    let schedule = schedules
        .create(&owner, 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();
    let err = schedules.online(&owner, schedule.id).await.unwrap_err();
    assert!(matches!(err, ControlError::WorkflowDefinitionNotReleased(10)));
    assert_eq!(
        stored(&fixture, schedule.id).await.release_state,
        ReleaseState::Offline
    );
}

/// Only the owner or an administrator may delete a schedule.
#[tokio::test]
async fn test_delete_requires_owner_or_admin() {
    let fixture = Fixture::new();
    fixture.released_workflow(10);
    let schedules = &fixture.plane.schedules;

    let schedule = schedules
        .create(&Operator::user(1), 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();

    let err = schedules
        .delete(&Operator::user(2), schedule.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::PermissionDenied { user_id: 2, .. }));

    schedules
        .delete(&Operator::admin(9), schedule.id)
        .await
        .unwrap();
}

/// A denied permission check stops the operation before it starts.
#[tokio::test]
async fn test_permission_checker_consulted() {
    let fixture = Fixture::new();
    fixture.released_workflow(10);
    fixture.permissions.deny(1, "create");

    let err = fixture
        .plane
        .schedules
        .create(&Operator::user(1), 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::PermissionDenied { .. }));
}

// ============================================================================
// Trigger engine failures
// ============================================================================

/// A failed registration rolls the schedule back to OFFLINE.
#[tokio::test]
async fn test_online_compensated_when_register_fails() {
    let flaky = Arc::new(FlakyTriggerEngine::default());
    flaky.fail_register.store(true, Ordering::SeqCst);
    let fixture = Fixture::with_trigger_engine(Arc::clone(&flaky) as Arc<dyn TriggerEngineClient>);
    fixture.released_workflow(10);
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    let schedule = schedules
        .create(&owner, 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();

    let err = schedules.online(&owner, schedule.id).await.unwrap_err();
    assert!(matches!(err, ControlError::TriggerEngineSyncFailed { schedule_id, .. } if schedule_id == schedule.id));
    assert_eq!(
        stored(&fixture, schedule.id).await.release_state,
        ReleaseState::Offline
    );
    assert!(!flaky.inner.is_registered(schedule.id));

    // Once the engine recovers the same call goes through.
    flaky.fail_register.store(false, Ordering::SeqCst);
    schedules.online(&owner, schedule.id).await.unwrap();
    assert!(flaky.inner.is_registered(schedule.id));
}

/// A failed deregistration keeps the schedule ONLINE.
#[tokio::test]
async fn test_offline_compensated_when_deregister_fails() {
    let flaky = Arc::new(FlakyTriggerEngine::default());
    let fixture = Fixture::with_trigger_engine(Arc::clone(&flaky) as Arc<dyn TriggerEngineClient>);
    fixture.released_workflow(10);
    let owner = Operator::user(1);
    let schedules = &fixture.plane.schedules;

    let schedule = schedules
        .create(&owner, 10, daily_params(), SchedulePolicy::default())
        .await
        .unwrap();
    schedules.online(&owner, schedule.id).await.unwrap();

    flaky.fail_deregister.store(true, Ordering::SeqCst);
    let err = schedules.offline(&owner, schedule.id).await.unwrap_err();
    assert!(matches!(err, ControlError::TriggerEngineSyncFailed { .. }));
    assert_eq!(
        stored(&fixture, schedule.id).await.release_state,
        ReleaseState::Online
    );
    assert!(flaky.inner.is_registered(schedule.id));
}

// ============================================================================
// Preview
// ============================================================================

/// Preview never reports fire times before now or past the window end.
#[tokio::test]
async fn test_preview_clamped_to_window() {
    let fixture = Fixture::new();
    let mut params = daily_params();
    params.start_time = chrono::Utc::now() + Duration::days(10);
    params.end_time = params.start_time + Duration::days(2);

    let fires = fixture.plane.schedules.preview(&params).unwrap();
    assert!(fires.len() <= 3);
    assert!(!fires.is_empty());
}

use chrono::Duration;
use pnl_model::TemplateDescriptor;
use pnl_session::{
    JsonFileStore, LifecycleProfile, SessionConfig, SessionManager, SessionState, SessionStore,
    StoreConfig, TaskIntent, TaskSession,
};
use pnl_test_utils::{create_ready_task, fixed_time, session_id};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn json_config(dir: &TempDir) -> SessionConfig {
    SessionConfig::default().with_store(StoreConfig::JsonDir(dir.path().to_path_buf()))
}

#[test]
fn test_restart_restores_live_task() {
    let dir = TempDir::new().unwrap();
    let tab = session_id("tab-restart");

    let task = {
        let manager = SessionManager::new(json_config(&dir)).unwrap();
        let task = create_ready_task(&manager, &tab, fixed_time());
        manager.shutdown();
        task
    };

    let manager = SessionManager::new(json_config(&dir)).unwrap();
    assert_eq!(manager.restore_at(fixed_time() + Duration::hours(1)).unwrap(), 1);
    assert_eq!(manager.task_for(&tab), Some(task));
    assert_eq!(manager.session_state(&tab), SessionState::Ready);

    let schedule = manager.get_snapshot_at(task, fixed_time()).unwrap();
    assert_eq!(schedule.panel_name, "LP-1");
    assert_eq!(schedule.circuits.len(), 2);
}

#[test]
fn test_expired_record_is_purged_on_restore() {
    let dir = TempDir::new().unwrap();
    let tab = session_id("tab-stale");
    {
        let manager = SessionManager::new(json_config(&dir)).unwrap();
        manager
            .start_task_at(tab.clone(), TaskIntent::PanelSchedule, fixed_time())
            .unwrap();
    }

    let manager = SessionManager::new(json_config(&dir)).unwrap();
    assert_eq!(manager.restore_at(fixed_time() + Duration::days(2)).unwrap(), 0);
    assert!(manager.task_for(&tab).is_none());
    assert!(JsonFileStore::open(dir.path()).unwrap().load_all().unwrap().is_empty());
}

#[test]
fn test_ephemeral_finish_removes_record() {
    let dir = TempDir::new().unwrap();
    let manager = SessionManager::new(json_config(&dir)).unwrap();
    let tab = session_id("tab-gone");
    let task = manager
        .start_task_at(tab, TaskIntent::PanelSchedule, fixed_time())
        .unwrap();

    let store = JsonFileStore::open(dir.path()).unwrap();
    assert!(store.load(task).unwrap().is_some());

    manager.finish_at(task, fixed_time()).unwrap();
    assert!(store.load(task).unwrap().is_none());
}

#[test]
fn test_persistent_record_survives_finish() {
    let dir = TempDir::new().unwrap();
    let config = json_config(&dir).with_profile(LifecycleProfile::Persistent);
    let tab = session_id("tab-archive");

    let task = {
        let manager = SessionManager::new(config.clone()).unwrap();
        let task = create_ready_task(&manager, &tab, fixed_time());
        manager.finish_at(task, fixed_time()).unwrap();

        let status = manager.get_status_at(task, fixed_time()).unwrap();
        assert_eq!(status.state, SessionState::Finished);
        assert!(status.missing_fields.is_empty());
        assert!(manager.task_for(&tab).is_none());
        task
    };

    let stored = JsonFileStore::open(dir.path()).unwrap().load(task).unwrap().unwrap();
    assert_eq!(stored.state, SessionState::Finished);
    assert!(!stored.parameter_store.is_empty());

    let manager = SessionManager::new(config).unwrap();
    assert_eq!(manager.restore_at(fixed_time() + Duration::days(90)).unwrap(), 1);
    assert!(manager.task_for(&tab).is_none());
    assert_eq!(
        manager.inspect(task, |s| s.parameter_store.len()).unwrap(),
        stored.parameter_store.len()
    );
}

#[test]
fn test_interrupted_build_restores_as_ready() {
    let dir = TempDir::new().unwrap();
    let tab = session_id("tab-crash");
    let store = JsonFileStore::open(dir.path()).unwrap();

    let mut record = TaskSession::new(
        tab.clone(),
        TaskIntent::PanelSchedule,
        LifecycleProfile::Ephemeral,
        TemplateDescriptor::three_phase(),
        64,
        fixed_time(),
    );
    record.state = SessionState::Building;
    store.save(&record).unwrap();

    let manager = SessionManager::new(json_config(&dir)).unwrap();
    assert_eq!(manager.restore_at(fixed_time()).unwrap(), 1);
    assert_eq!(manager.session_state(&tab), SessionState::Ready);
    assert_eq!(
        store.load(record.task_id).unwrap().unwrap().state,
        SessionState::Ready
    );
}

#[test]
fn test_restore_skips_second_task_for_same_conversation() {
    let dir = TempDir::new().unwrap();
    let tab = session_id("tab-dup");
    let store = JsonFileStore::open(dir.path()).unwrap();

    for _ in 0..2 {
        let record = TaskSession::new(
            tab.clone(),
            TaskIntent::PanelSchedule,
            LifecycleProfile::Ephemeral,
            TemplateDescriptor::three_phase(),
            64,
            fixed_time(),
        );
        store.save(&record).unwrap();
    }

    let manager = SessionManager::new(json_config(&dir)).unwrap();
    assert_eq!(manager.restore_at(fixed_time()).unwrap(), 1);
    assert_eq!(manager.active_count(), 1);
}

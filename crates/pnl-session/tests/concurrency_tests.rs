use pnl_model::{ExtractionMethod, HeaderField};
use pnl_session::{SessionError, SessionState, TaskIntent};
use pnl_test_utils::{create_manager, create_ready_task, fixed_time, header_obs, session_id};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_admits_exactly_one() {
    let manager = Arc::new(create_manager());
    let tab = session_id("tab-race");
    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));

    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let tab = tab.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                manager.start_task_at(tab, TaskIntent::PanelSchedule, fixed_time())
            })
        })
        .collect();

    let mut started = Vec::new();
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(task) => started.push(task),
            Err(SessionError::TaskAlreadyActive { .. }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(started.len(), 1);
    assert_eq!(refused, contenders - 1);
    assert_eq!(manager.task_for(&tab), Some(started[0]));
    assert_eq!(manager.active_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_readings_settle_on_higher_confidence() {
    for round in 0..20 {
        let manager = Arc::new(create_manager());
        let tab = session_id(&format!("tab-{round}"));
        let task = manager
            .start_task_at(tab.clone(), TaskIntent::PanelSchedule, fixed_time())
            .unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let readings = [
            header_obs(&tab, HeaderField::Voltage, "208Y/120V", ExtractionMethod::AiVision, fixed_time()),
            header_obs(&tab, HeaderField::Voltage, "480Y/277V", ExtractionMethod::Manual, fixed_time()),
        ];
        let handles: Vec<_> = readings
            .into_iter()
            .map(|obs| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    manager.observe_task_at(task, &obs, fixed_time())
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let voltage = manager
            .inspect(task, |s| s.parameter_store.header(HeaderField::Voltage).cloned())
            .unwrap();
        assert_eq!(voltage, Some("208Y/120V".into()), "round {round}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_do_not_interfere() {
    let manager = Arc::new(create_manager());
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let tab = session_id(&format!("tab-{i}"));
                let task = create_ready_task(&manager, &tab, fixed_time());
                (tab, task)
            })
        })
        .collect();

    let mut tasks = Vec::new();
    for handle in handles {
        tasks.push(handle.await.unwrap());
    }
    assert_eq!(manager.active_count(), 6);

    let (first_tab, first_task) = tasks[0].clone();
    manager.finish_at(first_task, fixed_time()).unwrap();
    assert_eq!(manager.session_state(&first_tab), SessionState::Idle);

    for (tab, task) in &tasks[1..] {
        assert_eq!(manager.session_state(tab), SessionState::Ready);
        let schedule = manager.get_snapshot_at(*task, fixed_time()).unwrap();
        assert_eq!(schedule.panel_name, "LP-1");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_observation_racing_finish_sees_ended_task() {
    for round in 0..50 {
        let manager = Arc::new(create_manager());
        let tab = session_id(&format!("tab-late-{round}"));
        let task = create_ready_task(&manager, &tab, fixed_time());
        let barrier = Arc::new(Barrier::new(3));

        let finisher = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                manager.finish_at(task, fixed_time())
            })
        };
        let observers: Vec<_> = [true, false]
            .into_iter()
            .map(|by_task| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                let obs = header_obs(&tab, HeaderField::Wire, 4u32, ExtractionMethod::Manual, fixed_time());
                tokio::spawn(async move {
                    barrier.wait().await;
                    let mut results = Vec::new();
                    for _ in 0..20 {
                        let result = if by_task {
                            manager.observe_task_at(task, &obs, fixed_time())
                        } else {
                            manager.observe_at(&obs, fixed_time())
                        };
                        results.push(result);
                    }
                    results
                })
            })
            .collect();

        finisher.await.unwrap().unwrap();
        for observer in observers {
            for result in observer.await.unwrap() {
                match result {
                    Ok(_) => {}
                    Err(SessionError::SessionNotActive { state, .. }) => {
                        assert_eq!(state, SessionState::Finished, "round {round}");
                    }
                    Err(other) => panic!("round {round}: unexpected error {other}"),
                }
            }
        }
    }
}

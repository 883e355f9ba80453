#![cfg(unix)]
//! End-to-end supervision of real `sh` children.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use procvisor::{
    DefinitionId, EventKind, HealthCheckConfig, NotificationLevel, Probe, ProbeError, ProcessDefinition,
    ProcessGroup, ProcessInstance, ProcessState, ProcessTable, RestartPolicy, Supervisor, SupervisorConfig,
    SysinfoTable,
};
use tokio::time::{Instant, sleep, timeout};

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        grace: Duration::from_millis(500),
        kill_wait: Duration::from_secs(2),
        restart_settle: Duration::from_millis(50),
        adopt_poll_interval: Duration::from_millis(100),
        ..SupervisorConfig::default()
    }
}

fn supervisor() -> Arc<Supervisor> {
    Supervisor::builder(fast_config()).build()
}

fn shell(name: &str, script: &str) -> ProcessDefinition {
    ProcessDefinition::new(name, "sh", format!("-c '{script}'")).with_restart(RestartPolicy::disabled())
}

async fn wait_for<F>(sup: &Supervisor, id: DefinitionId, what: &str, pred: F) -> ProcessInstance
where
    F: Fn(&ProcessInstance) -> bool,
{
    for _ in 0..200 {
        if let Some(inst) = sup.instance(id).filter(|i| pred(i)) {
            return inst;
        }
        sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}: {:?}", sup.instance(id));
}

async fn eventually<F>(what: &str, limit: Duration, cond: F)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + limit;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(25)).await;
    }
}

fn os_alive(pid: u32) -> bool {
    SysinfoTable::new().is_alive(pid)
}

fn log_texts(sup: &Supervisor, id: DefinitionId) -> Vec<String> {
    sup.logs(id).into_iter().map(|e| e.text).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_then_stop_keeps_pid_in_step_with_state() {
    let sup = supervisor();
    let def = shell("sleeper", "sleep 30");

    sup.start(&def).await.unwrap();
    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Running);
    assert!(inst.pid.is_some());
    assert_eq!(sup.os_pid(def.id), inst.pid);

    sup.start(&def).await.unwrap();
    assert_eq!(sup.instance(def.id).unwrap().pid, inst.pid, "second start is a no-op");

    sup.stop(def.id, false).await;
    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Stopped);
    assert_eq!(inst.pid, None);
    assert!(inst.stopped_at.is_some());
    assert_eq!(sup.os_pid(def.id), None);

    let logs = log_texts(&sup, def.id);
    assert!(logs.iter().any(|l| l.starts_with("Starting: sh -c")));
    assert!(logs.iter().any(|l| l.starts_with("Process started (PID: ")));
    assert!(logs.iter().any(|l| l == "Stopping process..."));
    assert_eq!(logs.last().map(String::as_str), Some("Process stopped"));

    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn starting_then_running_are_published_in_order() {
    let sup = supervisor();
    let mut rx = sup.subscribe();
    let def = shell("sleeper", "sleep 30");
    sup.start(&def).await.unwrap();

    let mut states = Vec::new();
    while states.len() < 2 {
        let ev = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        if ev.kind == EventKind::StateChanged {
            states.push(ev.instance.unwrap().state);
        }
    }
    assert_eq!(states, vec![ProcessState::Starting, ProcessState::Running]);
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clean_exit_lands_in_stopped_with_output_captured() {
    let sup = supervisor();
    let def = shell("once", "echo hello; echo oops 1>&2; exit 0");
    sup.start(&def).await.unwrap();

    let inst = wait_for(&sup, def.id, "Stopped", |i| i.state == ProcessState::Stopped).await;
    assert_eq!(inst.last_exit_code, Some(0));
    assert_eq!(inst.pid, None);

    let logs = log_texts(&sup, def.id);
    assert!(logs.contains(&"hello".to_string()));
    assert!(logs.contains(&"oops".to_string()));
    assert!(logs.contains(&"Process exited normally (code: 0)".to_string()));
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crash_restarts_until_budget_is_spent() {
    let sup = supervisor();
    let def = ProcessDefinition::new("flaky", "sh", "-c 'exit 3'").with_restart(RestartPolicy {
        enabled: true,
        max_attempts: 2,
        delay_secs: 0,
        window_minutes: 10,
    });
    sup.start(&def).await.unwrap();

    let exhausted = "Max restart attempts (2) reached. Not restarting.";
    for _ in 0..200 {
        if log_texts(&sup, def.id).iter().any(|l| l == exhausted) {
            break;
        }
        sleep(Duration::from_millis(25)).await;
    }

    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Crashed);
    assert_eq!(inst.last_exit_code, Some(3));
    assert_eq!(inst.restart_count, 2);
    assert!(inst.restart_window_start.is_some());

    let logs = log_texts(&sup, def.id);
    let launches = logs.iter().filter(|l| l.starts_with("Process started")).count();
    assert_eq!(launches, 3, "initial launch plus two restarts: {logs:#?}");
    assert!(logs.iter().any(|l| l == "Auto-restarting in 0s (attempt 1/2)"));
    assert!(logs.iter().any(|l| l == "Auto-restarting in 0s (attempt 2/2)"));
    assert!(logs.iter().any(|l| l == "Process exited (exit code: 3)"));
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_during_restart_delay_cancels_the_restart() {
    let sup = supervisor();
    let def = ProcessDefinition::new("slow-restart", "sh", "-c 'exit 1'").with_restart(RestartPolicy {
        delay_secs: 1,
        ..RestartPolicy::default()
    });
    sup.start(&def).await.unwrap();
    wait_for(&sup, def.id, "Restarting", |i| i.state == ProcessState::Restarting).await;

    sup.stop(def.id, false).await;
    assert_eq!(sup.instance(def.id).unwrap().state, ProcessState::Stopped);

    sleep(Duration::from_millis(1500)).await;
    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Stopped, "restart must not fire after stop");
    let launches = log_texts(&sup, def.id)
        .iter()
        .filter(|l| l.starts_with("Process started"))
        .count();
    assert_eq!(launches, 1);
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn launch_failure_is_crashed_without_restart() {
    let sup = supervisor();
    let def = ProcessDefinition::new("ghost", "/definitely/not/a/binary", "");

    let err = sup.start(&def).await.unwrap_err();
    assert_eq!(err.as_label(), "supervisor_launch_failed");

    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Crashed);
    assert_eq!(inst.pid, None);
    assert!(inst.last_error.is_some());

    sleep(Duration::from_millis(200)).await;
    assert_eq!(sup.instance(def.id).unwrap().state, ProcessState::Crashed);
    assert!(log_texts(&sup, def.id).iter().any(|l| l.starts_with("Failed to start: ")));
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stubborn_process_is_killed_after_grace() {
    let sup = supervisor();
    let def = shell("stubborn", "trap \"\" INT; sleep 30");
    sup.start(&def).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    timeout(Duration::from_secs(5), sup.stop(def.id, false))
        .await
        .expect("stop finishes within grace + kill wait");
    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Stopped);
    assert_eq!(inst.pid, None);
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crash_raises_a_critical_notification() {
    let sup = supervisor();
    let mut rx = sup.subscribe();
    let def = shell("boom", "exit 2");
    sup.start(&def).await.unwrap();

    let note = timeout(Duration::from_secs(5), async {
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == EventKind::Notification {
                return ev.notification.unwrap();
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(note.level, NotificationLevel::Critical);
    assert_eq!(note.message, "Process crashed (exit code: 2)");
    assert_eq!(note.process_name, "boom");
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn groups_start_together_and_stop_all_is_sequential() {
    let sup = supervisor();
    let mut rx = sup.subscribe();
    let group = ProcessGroup::new("shop")
        .with_process(shell("api", "sleep 30"))
        .with_process(shell("web", "sleep 30").with_startup_delay(0))
        .with_process(shell("manual", "sleep 30").with_auto_start(false));

    assert_eq!(sup.start_group(&group).await, 2);
    let running = sup
        .instances()
        .values()
        .filter(|i| i.state == ProcessState::Running)
        .count();
    assert_eq!(running, 2);
    assert!(sup.instance(group.processes[2].id).is_none());

    assert_eq!(sup.stop_all().await, 2);
    assert!(sup.instances().values().all(|i| i.state == ProcessState::Stopped));

    let saw_all_stopped = timeout(Duration::from_secs(2), async {
        loop {
            if rx.recv().await.unwrap().kind == EventKind::AllStopped {
                return true;
            }
        }
    })
    .await
    .unwrap();
    assert!(saw_all_stopped);
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manual_restart_relaunches_with_new_pid() {
    let sup = supervisor();
    let def = shell("restartable", "sleep 30");
    sup.start(&def).await.unwrap();
    let first = sup.instance(def.id).unwrap().pid;

    sup.restart(def.id).await.unwrap();
    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Running);
    assert_ne!(inst.pid, first);
    assert_eq!(inst.restart_count, 0);

    let unknown = DefinitionId::new();
    assert_eq!(sup.restart(unknown).await.unwrap_err().as_label(), "supervisor_unknown_definition");
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn orphan_is_adopted_and_stoppable() {
    let mut orphan = tokio::process::Command::new("sleep")
        .arg("31.4159")
        .spawn()
        .unwrap();
    let pid = orphan.id().unwrap();
    let reaper = tokio::spawn(async move { orphan.wait().await });

    let sup = supervisor();
    let def = ProcessDefinition::new("left-over", "sleep", "31.4159");
    assert_eq!(sup.adopt_orphans(std::slice::from_ref(&def)).await, 1);

    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Running);
    assert!(inst.adopted);
    assert_eq!(inst.pid, Some(pid));
    assert!(log_texts(&sup, def.id)[0].contains(&format!("PID: {pid}")));

    assert_eq!(sup.adopt_orphans(std::slice::from_ref(&def)).await, 0, "already running");

    sup.stop(def.id, false).await;
    assert_eq!(sup.instance(def.id).unwrap().state, ProcessState::Stopped);
    let status = timeout(Duration::from_secs(5), reaper).await.unwrap().unwrap().unwrap();
    assert!(!status.success());
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_stop_is_finished_by_a_forced_stop() {
    let sup = supervisor();
    let def = shell("stubborn", "trap \"\" INT; sleep 30");
    sup.start(&def).await.unwrap();
    let pid = sup.instance(def.id).unwrap().pid.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert!(timeout(Duration::from_millis(200), sup.stop(def.id, false)).await.is_err());
    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Stopping);
    assert_eq!(inst.pid, Some(pid));

    timeout(Duration::from_secs(5), sup.stop(def.id, true))
        .await
        .expect("forced stop finishes within kill wait");
    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Stopped);
    assert_eq!(inst.pid, None);
    eventually("stubborn process to die", Duration::from_secs(3), || !os_alive(pid)).await;
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_finishes_an_abandoned_stop() {
    let sup = supervisor();
    let def = shell("stubborn", "trap \"\" INT; sleep 30");
    sup.start(&def).await.unwrap();
    let pid = sup.instance(def.id).unwrap().pid.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert!(timeout(Duration::from_millis(200), sup.stop_all()).await.is_err());
    assert_eq!(sup.instance(def.id).unwrap().state, ProcessState::Stopping);

    timeout(Duration::from_secs(5), sup.shutdown())
        .await
        .expect("shutdown finishes within kill wait");
    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Stopped);
    assert_eq!(inst.pid, None);
    eventually("stubborn process to die", Duration::from_secs(3), || !os_alive(pid)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forced_stop_skips_the_grace_period() {
    let sup = Supervisor::builder(SupervisorConfig {
        grace: Duration::from_secs(20),
        ..fast_config()
    })
    .build();
    let def = shell("stubborn", "trap \"\" INT; sleep 30");
    sup.start(&def).await.unwrap();
    let pid = sup.instance(def.id).unwrap().pid.unwrap();

    let began = Instant::now();
    sup.stop(def.id, true).await;
    assert!(began.elapsed() < Duration::from_secs(5), "took {:?}", began.elapsed());
    assert_eq!(sup.instance(def.id).unwrap().state, ProcessState::Stopped);
    eventually("stubborn process to die", Duration::from_secs(3), || !os_alive(pid)).await;

    sup.stop(def.id, true).await;
    assert_eq!(sup.instance(def.id).unwrap().state, ProcessState::Stopped, "stopping twice is a no-op");
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_group_continues_past_a_member_that_never_launched() {
    let sup = supervisor();
    let group = ProcessGroup::new("mixed")
        .with_process(shell("api", "sleep 30"))
        .with_process(ProcessDefinition::new("ghost", "/definitely/not/a/binary", ""))
        .with_process(shell("web", "sleep 30"))
        .with_process(shell("manual", "sleep 30").with_auto_start(false));

    assert_eq!(sup.start_group(&group).await, 2);
    let ghost = group.processes[1].id;
    assert_eq!(sup.instance(ghost).unwrap().state, ProcessState::Crashed);

    sup.stop_group(&group).await;
    for def in &group.processes[..3] {
        let inst = sup.instance(def.id).unwrap();
        assert_eq!(inst.state, ProcessState::Stopped, "{}", def.name);
        assert_eq!(inst.pid, None);
    }
    assert!(sup.instance(group.processes[3].id).is_none());
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_start_and_stop_keep_the_record_consistent() {
    let sup = supervisor();
    let def = shell("racer", "sleep 30");
    sup.register(&def);

    for round in 0..8 {
        let (started, ()) = tokio::join!(sup.start(&def), sup.stop(def.id, false));
        started.unwrap();
        let inst = sup.instance(def.id).unwrap();
        assert!(inst.is_consistent(), "round {round}: {inst:?}");
        match inst.state {
            ProcessState::Running => {
                assert!(os_alive(inst.pid.unwrap()), "round {round}");
                sup.stop(def.id, false).await;
            }
            ProcessState::Stopped => assert_eq!(inst.pid, None),
            other => panic!("round {round}: unexpected {other:?}"),
        }
        let inst = sup.instance(def.id).unwrap();
        assert_eq!(inst.state, ProcessState::Stopped, "round {round}");
        assert!(inst.is_consistent());
    }
    sup.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delayed_restarts_run_three_cycles_then_give_up() {
    let sup = supervisor();
    let mut rx = sup.subscribe();
    let def = ProcessDefinition::new("crashy", "sh", "-c 'sleep 0.1; exit 1'").with_restart(RestartPolicy {
        enabled: true,
        max_attempts: 3,
        delay_secs: 1,
        window_minutes: 10,
    });
    sup.start(&def).await.unwrap();
    let began = Instant::now();

    let exhausted = "Max restart attempts (3) reached. Not restarting.";
    eventually("restart budget to run out", Duration::from_secs(15), || {
        log_texts(&sup, def.id).iter().any(|l| l == exhausted)
    })
    .await;
    assert!(began.elapsed() >= Duration::from_secs(3), "only {:?}", began.elapsed());

    let inst = sup.instance(def.id).unwrap();
    assert_eq!(inst.state, ProcessState::Crashed);
    assert_eq!(inst.restart_count, 3);
    assert_eq!(inst.pid, None);

    let mut restarting = 0;
    while let Ok(ev) = rx.try_recv() {
        if let Some(seen) = ev.instance.filter(|_| ev.kind == EventKind::StateChanged) {
            assert!(seen.is_consistent(), "{seen:?}");
            if seen.state == ProcessState::Restarting {
                restarting += 1;
            }
        }
    }
    assert_eq!(restarting, 3);

    sleep(Duration::from_millis(1500)).await;
    let launches = log_texts(&sup, def.id)
        .iter()
        .filter(|l| l.starts_with("Process started"))
        .count();
    assert_eq!(launches, 4, "no launch after the budget is spent");
    sup.shutdown().await;
}

/// Always reports the target as unreachable.
struct Unreachable;

#[async_trait]
impl Probe for Unreachable {
    async fn check(&self, _config: &HealthCheckConfig) -> Result<(), ProbeError> {
        Err(ProbeError::Transport {
            error: "connection refused".to_string(),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_health_check_restarts_and_follows_state() {
    let sup = Supervisor::builder(fast_config())
        .with_probe(Arc::new(Unreachable))
        .build();
    let def = shell("unhealthy", "sleep 30")
        .with_health_check(HealthCheckConfig::tcp(9).with_interval(1).with_threshold(2));
    sup.start(&def).await.unwrap();
    let first = sup.instance(def.id).unwrap().pid;

    eventually("health check registration", Duration::from_secs(2), || {
        sup.prober().is_registered(def.id)
    })
    .await;
    eventually("health restart", Duration::from_secs(10), || {
        sup.instance(def.id)
            .is_some_and(|i| i.state == ProcessState::Running && i.pid != first)
    })
    .await;
    assert!(
        log_texts(&sup, def.id)
            .iter()
            .any(|l| l.starts_with("Restart requested: "))
    );
    assert_eq!(sup.instance(def.id).unwrap().restart_count, 0);
    eventually("health check re-registration", Duration::from_secs(2), || {
        sup.prober().is_registered(def.id)
    })
    .await;

    sup.stop(def.id, false).await;
    eventually("health check removal", Duration::from_secs(2), || !sup.prober().is_registered(def.id)).await;
    sup.shutdown().await;
}

mod common;

use common::{connection, launch_options, FakeSupervisor, Script, ScriptedConnector};
use palserver_admin::backup::{AutoBackup, BackupPolicy};
use palserver_admin::clock::ManualClock;
use palserver_admin::error::ErrorKind;
use palserver_admin::lifecycle::{
    LifecyclePolicy, LifecycleSequencer, NoticeLevel, SequencerState, RESTART_COUNTDOWN_TICKS,
};
use std::sync::Arc;

struct Harness {
    script: Arc<Script>,
    supervisor: Arc<FakeSupervisor>,
    clock: Arc<ManualClock>,
    sequencer: LifecycleSequencer,
}

fn policy() -> LifecyclePolicy {
    LifecyclePolicy {
        launch: Some(launch_options()),
        ..LifecyclePolicy::default()
    }
}

fn harness(policy: LifecyclePolicy) -> Harness {
    let script = Script::accepting("secret");
    let supervisor = Arc::new(FakeSupervisor::default());
    let clock = Arc::new(ManualClock::new(0));
    let sequencer = LifecycleSequencer::new(
        Arc::new(ScriptedConnector {
            script: script.clone(),
        }),
        supervisor.clone(),
        clock.clone(),
        policy,
    );
    Harness {
        script,
        supervisor,
        clock,
        sequencer,
    }
}

async fn connected(policy: LifecyclePolicy) -> Harness {
    let mut harness = harness(policy);
    harness
        .sequencer
        .test_connection(connection("secret"))
        .await
        .expect("connect failed");
    harness
}

async fn tick_n(sequencer: &mut LifecycleSequencer, count: usize) {
    for _ in 0..count {
        sequencer.tick().await.expect("tick failed");
    }
}

#[tokio::test]
async fn restart_runs_full_timeline() {
    let mut h = connected(policy()).await;
    h.sequencer.begin_restart().expect("restart rejected");

    tick_n(&mut h.sequencer, 10).await;
    let announces: Vec<String> = h
        .script
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("announce:"))
        .collect();
    assert_eq!(announces.len(), 10);
    assert_eq!(announces[0], "announce:The server will restart in 10 seconds!");
    assert_eq!(announces[9], "announce:The server will restart in 1 seconds!");
    assert_eq!(h.script.count("shutdown"), 0);

    tick_n(&mut h.sequencer, 1).await;
    assert_eq!(h.script.count("shutdown:1"), 1);
    assert_eq!(
        h.sequencer.state(),
        SequencerState::AwaitingRelaunch { ticks_remaining: 10 }
    );

    tick_n(&mut h.sequencer, 9).await;
    assert_eq!(h.supervisor.launch_count(), 0);
    tick_n(&mut h.sequencer, 1).await;
    assert_eq!(h.supervisor.launch_count(), 1);
    assert!(h.sequencer.status().server_running);

    tick_n(&mut h.sequencer, 9).await;
    assert_eq!(h.script.count("info:"), 1);
    tick_n(&mut h.sequencer, 1).await;
    assert_eq!(h.script.count("info:"), 2);
    assert_eq!(h.sequencer.state(), SequencerState::Idle);
    assert!(h.sequencer.is_connected());
}

#[tokio::test]
async fn aborted_countdown_never_shuts_down() {
    let mut h = connected(policy()).await;
    h.sequencer.begin_restart().unwrap();
    tick_n(&mut h.sequencer, 5).await;

    let previous = h.sequencer.abort();
    assert_eq!(
        previous,
        Some(SequencerState::CountingDownRestart { ticks_remaining: 6 })
    );
    assert_eq!(h.sequencer.abort(), None);

    tick_n(&mut h.sequencer, 40).await;
    assert_eq!(h.script.count("announce:"), 5);
    assert_eq!(h.script.count("shutdown"), 0);
    assert_eq!(h.supervisor.launch_count(), 0);
}

#[tokio::test]
async fn failed_announce_aborts_sequence() {
    let mut h = connected(policy()).await;
    *h.script.fail_announce_at.lock().unwrap() = Some(3);
    h.sequencer.begin_restart().unwrap();

    tick_n(&mut h.sequencer, 2).await;
    let err = h.sequencer.tick().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::HttpError);
    assert!(err.detail.starts_with("restart countdown aborted"));
    assert_eq!(h.sequencer.state(), SequencerState::Idle);
    assert!(!h.sequencer.is_connected());

    tick_n(&mut h.sequencer, 40).await;
    assert_eq!(h.script.count("shutdown"), 0);
    assert_eq!(h.supervisor.launch_count(), 0);

    let err = h.sequencer.begin_restart().unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotConnected);
}

#[tokio::test]
async fn countdowns_require_connection_and_valid_range() {
    let mut h = harness(policy());
    assert_eq!(
        h.sequencer.begin_restart().unwrap_err().kind,
        ErrorKind::NotConnected
    );
    assert_eq!(
        h.sequencer.begin_shutdown_countdown(60).unwrap_err().kind,
        ErrorKind::NotConnected
    );
    assert_eq!(
        h.sequencer.begin_shutdown_countdown(9).unwrap_err().kind,
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        h.sequencer.begin_shutdown_countdown(1000).unwrap_err().kind,
        ErrorKind::InvalidArgument
    );
    assert_eq!(h.sequencer.state(), SequencerState::Idle);
}

#[tokio::test]
async fn shutdown_countdown_stops_without_relaunch() {
    let mut h = connected(policy()).await;
    h.sequencer.begin_shutdown_countdown(10).unwrap();

    tick_n(&mut h.sequencer, 10).await;
    assert_eq!(h.script.count("announce:The server will shut down in"), 10);
    assert_eq!(h.script.count("shutdown"), 0);

    tick_n(&mut h.sequencer, 1).await;
    assert_eq!(h.script.count("shutdown:1"), 1);
    assert_eq!(h.sequencer.state(), SequencerState::Idle);

    tick_n(&mut h.sequencer, 30).await;
    assert_eq!(h.script.count("shutdown"), 1);
    assert_eq!(h.supervisor.launch_count(), 0);
}

#[tokio::test]
async fn countdown_keeps_ticking_while_backup_runs() {
    let saves = tempfile::tempdir().unwrap();
    let backups = tempfile::tempdir().unwrap();
    std::fs::write(saves.path().join("Level.sav"), b"level").unwrap();

    let mut h = connected(policy()).await;
    *h.sequencer.backup_mut() = AutoBackup::new(BackupPolicy {
        enabled: true,
        interval_secs: 600,
        source_dir: saves.path().to_path_buf(),
        backup_root: backups.path().to_path_buf(),
    });
    let mut notices = h.sequencer.subscribe();
    h.sequencer.begin_shutdown_countdown(10).unwrap();

    h.sequencer.tick().await.unwrap();
    let backup = h.sequencer.due_backup().expect("backup should be due");
    assert!(h.sequencer.due_backup().is_none());

    tick_n(&mut h.sequencer, 3).await;
    assert_eq!(
        h.sequencer.state(),
        SequencerState::CountingDownShutdown { ticks_remaining: 7 }
    );
    assert_eq!(h.script.count("announce:"), 4);
    assert_eq!(h.sequencer.status().last_backup_at, None);

    h.clock.set(4);
    backup.await;
    assert_eq!(h.sequencer.status().last_backup_at, Some(4));
    assert!(h.sequencer.due_backup().is_none());

    let mut reported = None;
    while let Ok(notice) = notices.try_recv() {
        if notice.message.starts_with("save backup completed") {
            reported = Some(notice);
        }
    }
    assert_eq!(reported.expect("no backup notice").level, NoticeLevel::Success);
}

#[tokio::test]
async fn new_countdown_replaces_active_one() {
    let mut h = connected(policy()).await;
    h.sequencer.begin_restart().unwrap();
    tick_n(&mut h.sequencer, 3).await;

    h.sequencer.begin_shutdown_countdown(10).unwrap();
    tick_n(&mut h.sequencer, 11).await;

    assert_eq!(h.script.count("shutdown:1"), 1);
    assert_eq!(h.sequencer.state(), SequencerState::Idle);
    tick_n(&mut h.sequencer, 30).await;
    assert_eq!(h.supervisor.launch_count(), 0);
}

#[tokio::test]
async fn relaunch_failure_aborts_with_sequence_error() {
    let mut h = connected(policy()).await;
    *h.supervisor.fail_launch.lock().unwrap() = true;
    h.sequencer.begin_restart().unwrap();

    tick_n(&mut h.sequencer, 20).await;
    let err = h.sequencer.tick().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SequenceAborted);
    assert!(err.detail.contains("relaunch failed"));
    assert_eq!(h.sequencer.state(), SequencerState::Idle);
}

#[tokio::test]
async fn crash_detection_relaunches_dead_server() {
    let mut h = harness(LifecyclePolicy {
        crash_detection: true,
        ..policy()
    });
    let pid = h.sequencer.start_server().await.unwrap();
    assert_eq!(
        h.sequencer.start_server().await.unwrap_err().kind,
        ErrorKind::InvalidArgument
    );

    h.supervisor.crash(pid);
    h.sequencer.tick().await.unwrap();

    assert_eq!(h.supervisor.launch_count(), 2);
    let status = h.sequencer.status();
    assert!(status.server_running);
    assert_ne!(status.pid, Some(pid));
}

#[tokio::test]
async fn crash_without_detection_only_marks_stopped() {
    let mut h = harness(policy());
    let pid = h.sequencer.start_server().await.unwrap();
    h.supervisor.crash(pid);

    tick_n(&mut h.sequencer, 3).await;
    assert_eq!(h.supervisor.launch_count(), 1);
    assert!(!h.sequencer.status().server_running);
}

#[tokio::test]
async fn intentional_stop_is_not_a_crash() {
    let mut h = connected(LifecyclePolicy {
        crash_detection: true,
        ..policy()
    })
    .await;
    let pid = h.sequencer.start_server().await.unwrap();
    h.sequencer.stop_server().await.unwrap();
    h.supervisor.crash(pid);

    tick_n(&mut h.sequencer, 5).await;
    assert_eq!(h.supervisor.launch_count(), 1);
}

#[tokio::test]
async fn kill_server_clears_tracked_process() {
    let mut h = harness(policy());
    let pid = h.sequencer.start_server().await.unwrap();
    h.sequencer.kill_server().await.unwrap();

    assert_eq!(*h.supervisor.killed.lock().unwrap(), vec![pid]);
    assert_eq!(h.sequencer.status().pid, None);
    assert_eq!(
        h.sequencer.kill_server().await.unwrap_err().kind,
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn auto_restart_respects_uptime_and_player_gate() {
    let mut h = connected(LifecyclePolicy {
        auto_restart: true,
        auto_restart_after_secs: 7200,
        auto_restart_player_gate: true,
        auto_restart_player_limit: 1,
        ..policy()
    })
    .await;
    h.sequencer.start_server().await.unwrap();

    h.clock.set(7200);
    h.sequencer.tick().await.unwrap();
    assert_eq!(h.sequencer.state(), SequencerState::Idle);

    h.script.set_players(3);
    h.sequencer.refresh_players().await.unwrap();
    h.clock.set(7201);
    h.sequencer.tick().await.unwrap();
    assert_eq!(h.sequencer.state(), SequencerState::Idle);

    h.script.set_players(1);
    h.sequencer.refresh_players().await.unwrap();
    h.sequencer.tick().await.unwrap();
    assert_eq!(
        h.sequencer.state(),
        SequencerState::CountingDownRestart {
            ticks_remaining: RESTART_COUNTDOWN_TICKS
        }
    );
}

#[tokio::test]
async fn auto_restart_waits_for_connection() {
    let mut h = harness(LifecyclePolicy {
        auto_restart: true,
        auto_restart_after_secs: 600,
        ..policy()
    });
    h.sequencer.start_server().await.unwrap();
    h.clock.set(10_000);
    tick_n(&mut h.sequencer, 3).await;
    assert_eq!(h.sequencer.state(), SequencerState::Idle);
}

#[tokio::test]
async fn run_command_dispatches_known_verbs() {
    let mut h = connected(policy()).await;
    h.sequencer.run_command("KickPlayer steam_1").await.unwrap();
    h.sequencer.run_command("broadcast hello there").await.unwrap();
    h.sequencer.run_command("save").await.unwrap();
    assert_eq!(h.script.count("kick:steam_1"), 1);
    assert_eq!(h.script.count("announce:hello there"), 1);
    assert_eq!(h.script.count("save"), 1);

    let before = h.script.calls().len();
    let err = h.sequencer.run_command("teleport steam_1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::BadRequest);
    assert_eq!(h.script.calls().len(), before);
}

#[tokio::test]
async fn failed_action_requires_new_connection_test() {
    let mut h = connected(policy()).await;
    h.script.accepted_passwords.lock().unwrap().clear();

    let err = h.sequencer.announce("hello").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert!(!h.sequencer.is_connected());

    let err = h.sequencer.ban_player("steam_2").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotConnected);
    assert_eq!(h.script.count("ban"), 0);
}

#[tokio::test]
async fn notices_are_broadcast() {
    let mut h = connected(policy()).await;
    let mut notices = h.sequencer.subscribe();
    h.sequencer.begin_restart().unwrap();
    h.sequencer.tick().await.unwrap();

    let started = notices.recv().await.unwrap();
    assert_eq!(started.level, NoticeLevel::Info);
    assert!(started.message.contains("restart countdown"));
    let command = notices.recv().await.unwrap();
    assert_eq!(command.level, NoticeLevel::Command);
    assert!(command.message.contains("10 seconds"));
}

#[tokio::test]
async fn adopts_only_live_processes() {
    let mut h = harness(policy());
    h.supervisor.alive.lock().unwrap().insert(77);
    assert!(h.sequencer.adopt_process(77).await);
    assert!(h.sequencer.status().server_running);
    assert!(!h.sequencer.adopt_process(78).await);
    assert_eq!(h.sequencer.status().pid, Some(77));
}

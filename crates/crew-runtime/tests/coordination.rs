//! End-to-end coordination scenarios: teams, messaging, the task board,
//! and the shutdown protocol, exercised through the public runtime API.

use agent_crew_core::schema::{Message, MessageType, TaskStatus, TeammateStatus};
use agent_crew_runtime::context::{LoopConfig, RuntimeContext};
use agent_crew_runtime::inbox::{drain_recipient, send_message};
use agent_crew_runtime::oracle::{
    ContentBlock, Oracle, OracleFailure, OracleRequest, OracleResponse, StopReason,
};
use agent_crew_runtime::tools::{dispatch, AgentIdentity};
use agent_crew_runtime::TaskChanges;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Parks forever on first call, so spawned loops sit harmlessly inside the
/// model call while a test drives inboxes and the board directly. Counts
/// entries so tests can wait until every loop is pinned.
struct StallOracle {
    entered: AtomicUsize,
}

impl StallOracle {
    fn new() -> Arc<Self> {
        Arc::new(StallOracle {
            entered: AtomicUsize::new(0),
        })
    }
}

impl Oracle for StallOracle {
    fn call(&self, _request: OracleRequest<'_>) -> Result<OracleResponse, OracleFailure> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        loop {
            std::thread::park();
        }
    }
}

/// Always replies with a short text turn, so loops quiesce to idle.
struct EchoOracle;

impl Oracle for EchoOracle {
    fn call(&self, _request: OracleRequest<'_>) -> Result<OracleResponse, OracleFailure> {
        Ok(OracleResponse {
            stop_reason: StopReason::EndTurn,
            content: vec![ContentBlock::Text { text: "ok".into() }],
        })
    }
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn runtime(dir: &TempDir, oracle: Arc<dyn Oracle>) -> Arc<RuntimeContext> {
    let config = LoopConfig {
        idle_poll_interval: Duration::from_millis(20),
        ..Default::default()
    };
    RuntimeContext::new(
        dir.path().join("state"),
        dir.path().join("workspace"),
        oracle,
        config,
    )
    .unwrap()
}

fn read_inbox_lines(path: &std::path::Path) -> Vec<Message> {
    let raw = std::fs::read_to_string(path).unwrap_or_default();
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn s1_create_spawn_send_drain() {
    let dir = TempDir::new().unwrap();
    let stall = StallOracle::new();
    let ctx = runtime(&dir, stall.clone());

    ctx.registry.create_team("t1").unwrap();
    let spawned = ctx.registry.spawn(&ctx, "alice", "t1", "hi").unwrap();
    assert_eq!(spawned["name"], "alice");
    assert_eq!(spawned["team"], "t1");
    assert_eq!(spawned["status"], "active");

    // Wait for alice's loop to pin itself inside the model call; after its
    // pre-round drain, inbox traffic is ours to observe.
    wait_until("alice to reach the oracle", || {
        stall.entered.load(Ordering::SeqCst) >= 1
    });

    send_message(
        &ctx.registry,
        MessageType::Message,
        "alice",
        "ping",
        "lead",
        Some("t1"),
        None,
    )
    .unwrap();

    let drained = drain_recipient(&ctx.registry, "alice", Some("t1")).unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].kind, MessageType::Message);
    assert_eq!(drained[0].content, "ping");

    let again = drain_recipient(&ctx.registry, "alice", Some("t1")).unwrap();
    assert!(again.is_empty());
}

#[test]
fn s2_broadcast_reaches_all_but_sender() {
    let dir = TempDir::new().unwrap();
    let stall = StallOracle::new();
    let ctx = runtime(&dir, stall.clone());

    ctx.registry.create_team("big").unwrap();
    let members = ["sender", "m1", "m2", "m3", "m4", "m5"];
    for name in members {
        ctx.registry.spawn(&ctx, name, "big", "wait").unwrap();
    }
    wait_until("all loops to reach the oracle", || {
        stall.entered.load(Ordering::SeqCst) >= members.len()
    });

    let out = send_message(
        &ctx.registry,
        MessageType::Broadcast,
        "",
        "compose a haiku",
        "sender@big",
        Some("big"),
        None,
    )
    .unwrap();
    assert!(out.contains("reached 5 teammates"));

    assert!(drain_recipient(&ctx.registry, "sender", Some("big"))
        .unwrap()
        .is_empty());
    for name in &members[1..] {
        let drained = drain_recipient(&ctx.registry, name, Some("big")).unwrap();
        assert_eq!(drained.len(), 1, "{name}");
        assert_eq!(drained[0].content, "compose a haiku");
    }
}

#[test]
fn s3_task_claim_race_is_safe() {
    let dir = TempDir::new().unwrap();
    let ctx = runtime(&dir, Arc::new(EchoOracle));
    ctx.board.create("contested", None).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for owner in ["X", "Y"] {
        let ctx = Arc::clone(&ctx);
        let barrier = Arc::clone(&barrier);
        handles.push(std::thread::spawn(move || {
            barrier.wait();
            ctx.board
                .update(
                    "1",
                    TaskChanges {
                        owner: Some(owner.to_string()),
                        ..Default::default()
                    },
                )
                .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let task = ctx.board.get("1").unwrap();
    let owner = task.owner.as_deref().unwrap();
    assert!(owner == "X" || owner == "Y");
}

#[test]
fn s4_blocking_edge_gates_claimability() {
    let dir = TempDir::new().unwrap();
    let ctx = runtime(&dir, Arc::new(EchoOracle));

    ctx.board.create("A", None).unwrap();
    ctx.board.create("B", None).unwrap();
    ctx.board
        .update(
            "2",
            TaskChanges {
                add_blocked_by: vec!["1".into()],
                ..Default::default()
            },
        )
        .unwrap();

    let claimable: Vec<String> = ctx
        .board
        .claimable()
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(claimable, vec!["1"]);

    ctx.board
        .update(
            "1",
            TaskChanges {
                status: Some(TaskStatus::Completed),
                ..Default::default()
            },
        )
        .unwrap();

    let claimable: Vec<String> = ctx
        .board
        .claimable()
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(claimable, vec!["2"]);
}

#[test]
fn s5_delete_team_finalizes_members() {
    let dir = TempDir::new().unwrap();
    let stall = StallOracle::new();
    let ctx = runtime(&dir, stall.clone());

    ctx.registry.create_team("t5").unwrap();
    ctx.registry.spawn(&ctx, "alpha", "t5", "work").unwrap();
    ctx.registry.spawn(&ctx, "beta", "t5", "work").unwrap();
    wait_until("both loops to reach the oracle", || {
        stall.entered.load(Ordering::SeqCst) >= 2
    });
    let alpha = ctx.registry.find("alpha", Some("t5")).unwrap();
    let beta = ctx.registry.find("beta", Some("t5")).unwrap();

    let out = ctx
        .registry
        .delete_team("t5", &ctx.pending_shutdowns)
        .unwrap();
    assert!(out.contains("deleted"));

    assert_eq!(alpha.status.get(), TeammateStatus::Shutdown);
    assert_eq!(beta.status.get(), TeammateStatus::Shutdown);
    assert_eq!(ctx.pending_shutdowns.len(), 2);

    // Pre-drain: the shutdown_request sits in each inbox file (the loops
    // are pinned inside the oracle and cannot consume it).
    for member in [&alpha, &beta] {
        let lines = read_inbox_lines(&member.inbox_path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, MessageType::ShutdownRequest);
        assert!(lines[0].request_id.is_some());
    }
}

#[test]
fn s6_external_lock_blocks_drain_without_loss() {
    let dir = TempDir::new().unwrap();
    let stall = StallOracle::new();
    let ctx = runtime(&dir, stall.clone());

    ctx.registry.create_team("t6").unwrap();
    ctx.registry.spawn(&ctx, "alice", "t6", "wait").unwrap();
    wait_until("alice to reach the oracle", || {
        stall.entered.load(Ordering::SeqCst) >= 1
    });

    send_message(
        &ctx.registry,
        MessageType::Message,
        "alice",
        "held back",
        "lead",
        Some("t6"),
        None,
    )
    .unwrap();

    // An external process holds the lock by exclusive-creating the file.
    let alice = ctx.registry.find("alice", Some("t6")).unwrap();
    let lock_path = {
        let mut os = alice.inbox_path.as_os_str().to_os_string();
        os.push(".lock");
        std::path::PathBuf::from(os)
    };
    std::fs::write(&lock_path, b"").unwrap();

    assert!(drain_recipient(&ctx.registry, "alice", Some("t6"))
        .unwrap()
        .is_empty());

    std::fs::remove_file(&lock_path).unwrap();
    let drained = drain_recipient(&ctx.registry, "alice", Some("t6")).unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].content, "held back");
    assert!(drain_recipient(&ctx.registry, "alice", Some("t6"))
        .unwrap()
        .is_empty());
}

#[test]
fn colors_cycle_through_spawn_order() {
    let dir = TempDir::new().unwrap();
    let stall = StallOracle::new();
    let ctx = runtime(&dir, stall);

    ctx.registry.create_team("hue").unwrap();
    let n = agent_crew_runtime::TEAMMATE_COLORS.len() + 2;
    for i in 0..n {
        ctx.registry
            .spawn(&ctx, &format!("w{i}"), "hue", "wait")
            .unwrap();
    }

    for i in 0..n {
        let teammate = ctx.registry.find(&format!("w{i}"), Some("hue")).unwrap();
        let palette = agent_crew_runtime::TEAMMATE_COLORS;
        assert_eq!(teammate.color, palette[i % palette.len()], "teammate w{i}");
    }
}

#[test]
fn idle_teammate_wakes_on_mail_and_quiesces_again() {
    let dir = TempDir::new().unwrap();
    let ctx = runtime(&dir, Arc::new(EchoOracle));

    ctx.registry.create_team("t8").unwrap();
    ctx.registry.spawn(&ctx, "sleeper", "t8", "hello").unwrap();
    let sleeper = ctx.registry.find("sleeper", Some("t8")).unwrap();

    // First round replies with text and quiesces.
    wait_until("sleeper to go idle", || {
        sleeper.status.get() == TeammateStatus::Idle
    });

    send_message(
        &ctx.registry,
        MessageType::Message,
        "sleeper",
        "wake up",
        "team-lead@t8",
        Some("t8"),
        None,
    )
    .unwrap();

    // The loop wakes, drains the message itself, replies, and re-idles.
    wait_until("sleeper to drain its inbox", || {
        !agent_crew_core::io::inbox::inbox_has_mail(&sleeper.inbox_path)
    });
    wait_until("sleeper to quiesce again", || {
        sleeper.status.get() == TeammateStatus::Idle
    });
}

#[test]
fn teammate_acknowledges_shutdown_end_to_end() {
    let dir = TempDir::new().unwrap();
    let ctx = runtime(&dir, Arc::new(EchoOracle));

    ctx.registry.create_team("t9").unwrap();
    let spawned = ctx.registry.spawn(&ctx, "worker", "t9", "hello").unwrap();
    let handle = spawned["handle"].as_str().unwrap().to_string();
    let worker = ctx.registry.find("worker", Some("t9")).unwrap();

    wait_until("worker to go idle", || {
        worker.status.get() == TeammateStatus::Idle
    });

    ctx.registry
        .delete_team("t9", &ctx.pending_shutdowns)
        .unwrap();
    assert_eq!(ctx.pending_shutdowns.len(), 1);

    // The worker wakes on the injected request, acknowledges into the lead
    // inbox, and exits its loop.
    let mut responses: Vec<Message> = Vec::new();
    wait_until("shutdown_response to reach the lead", || {
        responses.extend(
            drain_recipient(&ctx.registry, "team-lead@t9", None)
                .unwrap()
                .into_iter()
                .filter(|m| m.kind == MessageType::ShutdownResponse),
        );
        !responses.is_empty()
    });

    let response = &responses[0];
    assert_eq!(response.sender, "worker@t9");
    let request_id = response.request_id.as_deref().unwrap();
    let entry = ctx.pending_shutdowns.acknowledge(request_id).unwrap();
    assert_eq!(entry.name, "worker");
    assert!(ctx.pending_shutdowns.is_empty());

    assert_eq!(worker.status.get(), TeammateStatus::Shutdown);
    wait_until("worker loop to exit", || {
        ctx.executor.is_finished(&handle).unwrap()
    });
}

#[test]
fn team_create_tool_spawns_initial_teammates() {
    let dir = TempDir::new().unwrap();
    let stall = StallOracle::new();
    let ctx = runtime(&dir, stall);

    let lead = AgentIdentity::lead(None);
    let out = dispatch(
        &ctx,
        &lead,
        "TeamCreate",
        &serde_json::json!({
            "team_name": "demo",
            "teammates": [
                {"name": "poet", "prompt": "write haiku"},
                {"name": "critic", "prompt": "review haiku"},
            ],
        }),
    );
    assert!(out.contains("Created team 'demo'"));
    assert!(out.contains("Spawned poet@demo"));
    assert!(out.contains("Spawned critic@demo"));

    assert!(ctx.registry.find("poet", Some("demo")).is_some());
    assert!(ctx.registry.find("critic", Some("demo")).is_some());

    // And the lifecycle tools stay lead-only.
    let teammate = AgentIdentity::teammate("poet", "demo");
    let refused = dispatch(
        &ctx,
        &teammate,
        "TeamCreate",
        &serde_json::json!({"team_name": "rogue"}),
    );
    assert!(refused.starts_with("Error: InvalidInput"));
}

#[test]
fn inbox_ordering_is_a_prefix_of_append_order() {
    let dir = TempDir::new().unwrap();
    let stall = StallOracle::new();
    let ctx = runtime(&dir, stall.clone());

    ctx.registry.create_team("seq").unwrap();
    ctx.registry.spawn(&ctx, "alice", "seq", "wait").unwrap();
    wait_until("alice to reach the oracle", || {
        stall.entered.load(Ordering::SeqCst) >= 1
    });

    for i in 0..10 {
        send_message(
            &ctx.registry,
            MessageType::Message,
            "alice",
            &format!("m{i}"),
            "lead",
            Some("seq"),
            None,
        )
        .unwrap();
    }

    let drained = drain_recipient(&ctx.registry, "alice", Some("seq")).unwrap();
    let contents: Vec<String> = drained.into_iter().map(|m| m.content).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
    assert_eq!(contents, expected);
}

use std::time::Duration;

use gridlife_app::{ControlHandle, PublishOutcome, TickDriver, share, snapshot_channel};
use gridlife_brain::{PolicyKind, install};
use gridlife_core::{ServerMessage, SimConfig, World};
use serde_json::Value;

fn control(policy: PolicyKind, extended: bool) -> ControlHandle {
    let mut config = SimConfig {
        width: 16,
        height: 12,
        rng_seed: Some(21),
        initial_agents: 0,
        ..SimConfig::default()
    };
    config.food.random_spawn = false;
    config.physiology.enabled = extended;
    let mut world = World::new(config).expect("world");
    let key = install(world.registry_mut(), policy);
    world.set_default_policy(Some(key));
    ControlHandle::new(share(world))
}

#[test]
fn commands_show_up_in_next_state_message() {
    let control = control(PolicyKind::ActorCritic, false);
    for line in [
        r#"{"type":"add_food","x":8,"y":8}"#,
        r#"{"type":"add_agent","x":2,"y":3,"sex":"F","agg":0.2}"#,
        r#"{"type":"add_agent","x":12,"y":3}"#,
        r#"{"type":"bogus"}"#,
    ] {
        let ack = serde_json::to_value(control.handle_line(line).expect("ack")).expect("json");
        assert_eq!(ack, serde_json::json!({"ok": "received"}));
    }

    let (publisher, receiver) = snapshot_channel(4);
    let driver = TickDriver::new(control.shared_world(), publisher, Duration::from_millis(10));
    let (summary, outcome) = driver.tick_once().expect("tick");
    assert_eq!(outcome, PublishOutcome::Delivered);
    assert_eq!(summary.population, 2);

    let message = receiver.try_recv().expect("state");
    let json = serde_json::to_value(message.as_ref()).expect("json");
    assert_eq!(json["type"], "state");
    assert_eq!(json["tick"], 1);
    let agents = json["agents"].as_array().expect("agents");
    assert_eq!(agents.len(), 2);
    for agent in agents {
        for key in [
            "id", "x", "y", "energy", "age", "sex", "spd", "agg", "repro", "strength", "exp",
            "parents", "policy_dir",
        ] {
            assert!(agent.get(key).is_some(), "agent missing {key}: {agent}");
        }
        assert!(agent.get("vitals").is_none());
    }
    assert_eq!(json["metrics"]["population"], 2);
    assert_eq!(json["metrics"]["births"], 2);
}

#[test]
fn extended_snapshots_carry_vitals() {
    let control = control(PolicyKind::QLearningExtended, true);
    control
        .handle_line(r#"{"type":"add_agent","x":5,"y":5,"energy":80}"#)
        .expect("ack");
    let (publisher, receiver) = snapshot_channel(1);
    let driver = TickDriver::new(control.shared_world(), publisher, Duration::from_millis(10));
    driver.tick_once().expect("tick");

    let message = receiver.try_recv().expect("state");
    let ServerMessage::State(snapshot) = message.as_ref() else {
        panic!("expected state");
    };
    let vitals = snapshot.agents[0].vitals.expect("vitals");
    assert!(vitals.health > 0.0);
}

#[test]
fn handshake_precedes_state_and_matches_grid() {
    let control = control(PolicyKind::QLearning, false);
    let handshake: Value =
        serde_json::from_str(&control.handshake_json().expect("handshake")).expect("json");
    assert_eq!(handshake["type"], "config");
    assert_eq!(handshake["w"], 16);
    assert_eq!(handshake["h"], 12);
}

#[tokio::test]
async fn driver_and_control_interleave_safely() {
    let control = control(PolicyKind::QLearning, false);
    let (publisher, receiver) = snapshot_channel(2);
    let driver = TickDriver::new(control.shared_world(), publisher, Duration::from_millis(1))
        .with_max_ticks(Some(30));
    let task = tokio::spawn(driver.run());

    let placer = control.clone();
    let placed = tokio::task::spawn_blocking(move || {
        let mut accepted = 0;
        for x in 0..16 {
            if placer.add_food_at(x, 0, 5.0).expect("place") {
                accepted += 1;
            }
        }
        accepted
    })
    .await
    .expect("placer");

    assert_eq!(task.await.expect("join").expect("run"), 30);
    assert_eq!(placed, 16);
    let snapshot = control.snapshot().expect("snapshot");
    assert_eq!(snapshot.tick.0, 30);
    assert!(receiver.try_recv().is_ok());
}

use rangescan::config::{BallSpec, RobotSpec};
use rangescan::{AgentState, SimConfig, Simulation};
use std::time::Duration;

fn config() -> SimConfig {
    let mut config = SimConfig::from_toml(
        r#"
        [scan]
        scan_line_width = 8
        scan_line_count = 4
        horizontal_fov_deg = 90.0

        [agent]
        seed = 3

        [arena]
        half_width = 10.0
        half_depth = 10.0
        random_balls_per_robot = 0
        "#,
    )
    .unwrap();
    config.robots = vec![RobotSpec {
        tag: "RobotRed".to_string(),
        x: 0.0,
        z: 0.0,
        heading_deg: 0.0,
    }];
    config.arena.balls = vec![BallSpec {
        tag: "BallRed".to_string(),
        x: 0.0,
        z: 6.0,
    }];
    config
}

#[test]
fn robot_finds_and_consumes_the_ball_ahead() {
    let mut sim = Simulation::from_config(&config()).unwrap();
    let step = Duration::from_millis(20);

    let mut saw_traveling = false;
    for _ in 0..250 {
        sim.step(step).unwrap();
        if sim.agent(0).unwrap().state() == AgentState::Traveling {
            saw_traveling = true;
        }
        if sim.targets_consumed() > 0 {
            break;
        }
    }

    assert!(saw_traveling);
    assert_eq!(sim.targets_consumed(), 1);
    assert!(sim.arena().balls().is_empty());
    let robot = sim.agent(0).unwrap();
    assert_eq!(robot.state(), AgentState::Wandering);
    assert!(robot.discoveries().is_empty());
}

#[test]
fn summary_serializes_to_json() {
    let mut sim = Simulation::from_config(&config()).unwrap();
    for _ in 0..10 {
        sim.step(Duration::from_millis(20)).unwrap();
    }
    let json = serde_json::to_value(sim.summary()).unwrap();
    assert_eq!(json[0]["tag"], "RobotRed");
    assert_eq!(json[0]["pixels_scanned"], 20);
}

#[test]
fn bundled_rover_config_builds() {
    let config = SimConfig::from_toml(include_str!("../../rover_sim/rangescan.toml")).unwrap();
    assert_eq!(config.robots.len(), 2);
    let sim = Simulation::from_config(&config).unwrap();
    // One placed ball plus three random ones per robot.
    assert_eq!(sim.arena().balls().len(), 7);
}

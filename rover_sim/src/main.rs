use anyhow::Context;
use rangescan::{RobotSummary, SimConfig, Simulation};
use rangescan_visualizer::{save_png, DepthColorMap, DepthFrame, FrameBus, RayFadeTracker};
use serde::Serialize;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const DEFAULT_CONFIG: &str = "rangescan.toml";
const DEFAULT_OUTPUT_DIR: &str = "rover_output";
const FRAME_BUS_CAPACITY: usize = 64;
const PROGRESS_INTERVAL_SECS: f64 = 5.0;

#[derive(Serialize)]
struct RunSummary {
    simulated_secs: f64,
    steps: u64,
    targets_consumed: u64,
    robots: Vec<RobotSummary>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Logging & Arguments ---
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rover_sim=info,rangescan=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = load_config(args.get(1).map(String::as_str))?;
    let output_dir = PathBuf::from(args.get(2).map(String::as_str).unwrap_or(DEFAULT_OUTPUT_DIR));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;

    // --- 2. Simulation & Frame Export ---
    let mut simulation = Simulation::from_config(&config).context("building simulation")?;
    let bus = FrameBus::new(FRAME_BUS_CAPACITY);
    let writer = tokio::spawn(write_frames(bus.subscribe(), output_dir.clone()));

    let robots: Vec<(usize, String)> = simulation.roster().iter().map(|r| (r.id(), r.tag().to_string())).collect();
    let every_nth = config.simulation.export_every_nth_frame;
    if every_nth > 0 {
        for (id, tag) in robots.iter().cloned() {
            let bus = bus.clone();
            let color_map = DepthColorMap::default();
            let mut frame_index = 0u64;
            simulation.subscribe_depth(id, move |snapshot| {
                frame_index += 1;
                if frame_index % every_nth == 0 {
                    bus.publish(&tag, frame_index, snapshot, &color_map);
                }
            })?;
        }
    }

    // Ray feedback: one fan per robot, lit by pixel scans and aged after each step.
    let mut fans = Vec::with_capacity(robots.len());
    for (id, tag) in &robots {
        let tracker = Rc::new(RefCell::new(RayFadeTracker::for_geometry(simulation.engine(*id)?.geometry())));
        let sink = tracker.clone();
        simulation.subscribe_pixel_scan(*id, move |event| sink.borrow_mut().record(event))?;
        fans.push((tag.clone(), tracker));
    }

    // --- 3. Step Loop ---
    let step = config.simulation.fixed_step()?;
    let steps = config.simulation.step_count();
    let mut pacer = config.simulation.realtime.then(|| tokio::time::interval(step));
    let progress_every = (PROGRESS_INTERVAL_SECS / step.as_secs_f64()).max(1.0) as u64;
    info!(steps, step_ms = step.as_millis() as u64, realtime = config.simulation.realtime, "running");

    for n in 1..=steps {
        if let Some(pacer) = pacer.as_mut() {
            pacer.tick().await;
        }
        let report = simulation.step(step)?;
        for (_, fan) in &fans {
            fan.borrow_mut().update(step);
        }
        if report.targets_consumed > 0 {
            info!(at_secs = simulation.elapsed().as_secs_f64(), consumed = report.targets_consumed, "targets consumed");
        }
        if n % progress_every == 0 {
            info!(
                at_secs = simulation.elapsed().as_secs_f64(),
                balls_left = simulation.arena().balls().len(),
                "progress"
            );
            for (tag, fan) in &fans {
                let fan = fan.borrow();
                let newest = fan.active_rays().into_iter().max_by(|a, b| a.alpha.total_cmp(&b.alpha));
                debug!(robot = %tag, rays_lit = fan.len(), newest = ?newest.map(|ray| ray.coord), "ray fan");
            }
        }
    }

    // --- 4. Summary ---
    let summary = RunSummary {
        simulated_secs: simulation.elapsed().as_secs_f64(),
        steps,
        targets_consumed: simulation.targets_consumed(),
        robots: simulation.summary(),
    };
    // Handlers hold bus senders; dropping both closes the channel for the writer.
    drop(simulation);
    drop(bus);
    let written = writer.await.context("frame writer task")??;

    let summary_path = output_dir.join("summary.json");
    let file = std::fs::File::create(&summary_path)
        .with_context(|| format!("creating {}", summary_path.display()))?;
    serde_json::to_writer_pretty(file, &summary).context("writing summary")?;
    info!(frames = written, summary = %summary_path.display(), "done");
    Ok(())
}

fn load_config(path: Option<&str>) -> anyhow::Result<SimConfig> {
    let path = match path {
        Some(path) => Path::new(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Path::new(DEFAULT_CONFIG),
        None => {
            info!("using default configuration");
            return Ok(SimConfig::default());
        }
    };
    info!("loading configuration from {}", path.display());
    SimConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Writes every received frame as `<robot>_<frame>.png`. Returns the number written.
async fn write_frames(
    mut frames: tokio::sync::broadcast::Receiver<DepthFrame>,
    output_dir: PathBuf,
) -> anyhow::Result<u64> {
    let mut written = 0;
    loop {
        let frame = match frames.recv().await {
            Ok(frame) => frame,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "frame writer fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let path = output_dir.join(format!("{}_{:05}.png", frame.robot, frame.frame_index));
        tokio::task::spawn_blocking(move || save_png(&frame.image, &path)).await??;
        written += 1;
    }
    Ok(written)
}

//! # Navigation executable
//!
//! Long-running local motion planning service. Boots the session and logger,
//! loads parameters, wires the planner's event and output channels, and runs
//! the planner loop until interrupted.
//!
//! An optional scenario file argument replays inbound traffic for
//! demonstration, with no argument the process idles as a service until
//! Ctrl-C.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod scenario;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use std::sync::mpsc::channel;
use std::thread;
use std::time::{Duration, Instant};

// Internal imports
use nav_lib::loc::{PoseTransform, StaticTransformProvider};
use nav_lib::plan::{params::PlanParams, Event, Output, Planner};
use nav_lib::solver::AStarSolver;
use util::logger::{logger_init, LevelFilter};
use util::session::Session;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // Session and logger startup
    let session =
        Session::new("nav_exec", "sessions").wrap_err("Failed to initialise the session")?;
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise the logger")?;

    info!("Navigation Executable");
    info!("");

    // Load the parameters, falling back to the defaults if the file cannot
    // be read
    let params: PlanParams = match util::params::load("nav_exec.toml") {
        Ok(p) => p,
        Err(e) => {
            warn!("Could not load parameters, using defaults: {}", e);
            PlanParams::default()
        }
    };

    let tick_interval = Duration::from_secs_f64(params.tick_interval_s);

    // Event and output channels
    let (event_tx, event_rx) = channel();
    let (output_tx, output_rx) = channel();

    // Ctrl-C requests a planner shutdown
    {
        let tx = event_tx.clone();
        ctrlc::set_handler(move || {
            let _ = tx.send(Event::Shutdown);
        })
        .wrap_err("Failed to install the Ctrl-C handler")?;
    }

    // Tick thread, exits once the planner stops receiving
    let tick_handle = {
        let tx = event_tx.clone();
        thread::spawn(move || loop {
            thread::sleep(tick_interval);
            if tx.send(Event::Tick).is_err() {
                break;
            }
        })
    };

    // Optional scenario playback
    let scenario_handle = match std::env::args().nth(1) {
        Some(path) => {
            let scn = scenario::Scenario::load(&path)
                .wrap_err_with(|| format!("Failed to load the scenario file {:?}", path))?;
            info!("Playing scenario {:?}", scn.name);

            let tx = event_tx.clone();
            Some(thread::spawn(move || {
                let mut player = scenario::ScenarioPlayer::new(scn);
                let epoch = Instant::now();
                loop {
                    match player.pending(epoch.elapsed().as_secs_f64()) {
                        scenario::PendingEvents::None => thread::sleep(Duration::from_millis(10)),
                        scenario::PendingEvents::Some(events) => {
                            for event in events {
                                if tx.send(event).is_err() {
                                    return;
                                }
                            }
                        }
                        scenario::PendingEvents::EndOfScenario => {
                            // Leave a couple of ticks for the final events to
                            // be acted on before stopping
                            thread::sleep(2 * tick_interval);
                            let _ = tx.send(Event::Shutdown);
                            return;
                        }
                    }
                }
            }))
        }
        None => None,
    };

    // Output consumer, logs statuses and archives subgoal search data
    let output_handle = thread::spawn(move || {
        for output in output_rx.iter() {
            match output {
                Output::Path(path) => {
                    info!(
                        "Path published: {} waypoints in frame {:?}",
                        path.len(),
                        path.frame_id
                    );
                }
                Output::Status(status) => info!("Status: {}", status),
                Output::SubgoalViz(viz) => {
                    util::session::save_with_timestamp("subgoals/subgoal.json", viz);
                }
            }
        }
    });

    // The planner runs on the main thread
    let solver = AStarSolver {
        danger_cost: params.danger_cost,
    };
    let tf_provider = StaticTransformProvider::new(PoseTransform::identity());
    let mut planner = Planner::new(params, solver, tf_provider, output_tx);

    planner.run(event_rx).wrap_err("Planner loop failed")?;
    drop(planner);

    // The channels are closed now, so the worker threads unwind on their own
    if tick_handle.join().is_err() {
        warn!("Tick thread panicked");
    }
    if let Some(handle) = scenario_handle {
        if handle.join().is_err() {
            warn!("Scenario thread panicked");
        }
    }
    if output_handle.join().is_err() {
        warn!("Output thread panicked");
    }

    session.exit();

    info!("End of execution");

    Ok(())
}

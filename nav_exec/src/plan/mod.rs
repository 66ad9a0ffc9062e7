//! # Local motion planner
//!
//! The planner consumes an ordered stream of [`Event`]s (map snapshots,
//! footprint updates, tracking progress, goal assignments, and periodic
//! ticks) and emits [`Output`]s (walkable paths, status text, and subgoal
//! visualization data).
//!
//! Each tick runs the replanning decision pipeline: evaluate the safety
//! predicates over the current snapshots, branch in strict priority order,
//! and when a replan is required generate a subgoal and resolve it through
//! the grid solver under a bounded time budget.
//!
//! All events are handled by one consumer, and the `busy` flag marks the
//! window during which a decision cycle executes. Map updates arriving in
//! that window are dropped so that one pipeline run always sees a single
//! consistent snapshot.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod params;
pub mod safety;
pub mod subgoal;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;
use thiserror::Error;

// Internal imports
use crate::loc::{PoseTransform, TransformProvider};
use crate::map::LocalCostMap;
use crate::path::Path;
use crate::solver::GridSolver;
use self::params::PlanParams;
use self::subgoal::SubgoalViz;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The robot's footprint polygon, in the robot frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    /// Polygon points in meters
    pub points_m: Vec<Point2<f64>>,

    /// Time the footprint was captured
    pub stamp: DateTime<Utc>,
}

/// The planner itself, owning the current snapshots of all inbound state.
pub struct Planner<S: GridSolver, T: TransformProvider> {
    params: PlanParams,
    solver: S,
    tf_provider: T,
    output: Sender<Output>,

    local_map: Option<LocalCostMap>,
    footprint: Option<Footprint>,
    goal: Option<Point2<f64>>,
    path: Option<Path>,
    progress: f64,

    /// True exactly while one decision cycle executes
    busy: bool,
}

/// Record of one decision cycle, saved to the session directory.
#[derive(Debug, Clone, Serialize)]
struct ReplanReport {
    branch: &'static str,
    footprint_safe: bool,
    subgoal_safe: bool,
    path_safe: bool,
    path_deprecated: bool,
    robot_following_path: bool,
    progress: f64,
    dis_robot_to_goal_m: f64,
    subgoal_robot_m: Option<Point2<f64>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Inbound planner events.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new local cost map snapshot
    LocalMap(LocalCostMap),

    /// A new robot footprint
    Footprint(Footprint),

    /// Tracking progress reported by the path follower, last value wins
    Progress(f64),

    /// A final goal assignment, in the reference frame
    FinalGoal(Point2<f64>),

    /// Periodic decision tick
    Tick,

    /// Stop the planner loop
    Shutdown,
}

/// Outbound planner data.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// The walkable path, an empty path explicitly signals "no plan"
    Path(Path),

    /// Human readable status text for the current branch
    Status(String),

    /// Advisory subgoal search visualization
    SubgoalViz(SubgoalViz),
}

/// Errors raised by the planner loop.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("The planner output channel is closed")]
    OutputClosed,
}

/// Outcome of the decision pipeline's branch evaluation.
enum Decision {
    /// Footprint unsafe, hold position
    Collision,

    /// Final goal reached
    Arrival,

    /// Keep the current path, republishing it unchanged
    SteadyState(Path),

    /// Replan towards the given robot-frame subgoal
    Replan {
        subgoal_robot_m: Point2<f64>,
        viz: Option<SubgoalViz>,
        status: Option<&'static str>,
    },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<S: GridSolver, T: TransformProvider> Planner<S, T> {
    pub fn new(params: PlanParams, solver: S, tf_provider: T, output: Sender<Output>) -> Self {
        Self {
            params,
            solver,
            tf_provider,
            output,
            local_map: None,
            footprint: None,
            goal: None,
            path: None,
            progress: 0.0,
            busy: false,
        }
    }

    /// Run the planner loop until a [`Event::Shutdown`] arrives or the event
    /// channel closes.
    pub fn run(&mut self, events: Receiver<Event>) -> Result<(), PlanError> {
        info!("Planner loop started");

        while let Ok(event) = events.recv() {
            if !self.handle_event(event)? {
                break;
            }
        }

        info!("Planner loop stopped");
        Ok(())
    }

    /// Handle one event, returning false when the loop should stop.
    fn handle_event(&mut self, event: Event) -> Result<bool, PlanError> {
        match event {
            Event::LocalMap(map) => {
                if self.busy {
                    debug!("Planning in progress, local map update dropped");
                } else {
                    self.local_map = Some(map);
                }
            }
            Event::Footprint(footprint) => {
                self.footprint = Some(footprint);
            }
            Event::Progress(progress) => {
                self.progress = progress;
            }
            Event::FinalGoal(goal) => {
                if self.params.infinite_travel {
                    debug!("Infinite travel mode, ignoring final goal");
                } else {
                    self.busy = true;
                    let result = self.assign_goal(goal);
                    self.busy = false;
                    result?;
                }
            }
            Event::Tick => {
                self.busy = true;
                let result = self.tick();
                self.busy = false;
                result?;
            }
            Event::Shutdown => {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Goal assignment pipeline.
    ///
    /// Goal assignment is one-shot: if the assignment cannot be completed
    /// (no map, unsafe footprint, or no solver solution) the goal is cleared
    /// and the caller must resubmit.
    fn assign_goal(&mut self, goal: Point2<f64>) -> Result<(), PlanError> {
        info!("Final goal assigned: ({:.2}, {:.2})", goal.x, goal.y);
        self.goal = Some(goal);

        let robot_to_ref = match self.lookup_transform() {
            Some(tf) => tf,
            None => return Ok(()),
        };

        enum AssignOutcome {
            NotReady,
            Solved(Path, SubgoalViz),
            Failed(SubgoalViz),
        }

        let outcome = match self.local_map.as_ref() {
            None => AssignOutcome::NotReady,
            Some(map) if !safety::footprint_safe(map, self.footprint.as_ref(), &self.params) => {
                AssignOutcome::NotReady
            }
            Some(map) => {
                let (subgoal_robot, viz) =
                    subgoal::generate_subgoal(map, &goal, &robot_to_ref, &self.params);

                match self.solve_to_point(map, &subgoal_robot, &robot_to_ref) {
                    Ok(path) => AssignOutcome::Solved(path, viz),
                    Err(e) => {
                        error!(
                            "No path finding solution within {:.1} ms: {}",
                            self.params.solver_timeout_ms, e
                        );
                        AssignOutcome::Failed(viz)
                    }
                }
            }
        };

        match outcome {
            AssignOutcome::NotReady => {
                warn!("Missing local map or unsafe footprint");
                self.goal = None;
                self.publish(Output::Status(String::from(
                    "missing map or unsafe footprint, skipping goal assignment",
                )))?;
            }
            AssignOutcome::Solved(path, viz) => {
                self.publish(Output::SubgoalViz(viz))?;
                self.path = Some(path.clone());
                self.publish(Output::Path(path))?;
            }
            AssignOutcome::Failed(viz) => {
                self.goal = None;
                self.publish(Output::SubgoalViz(viz))?;
                self.publish(Output::Path(Path::new_empty(&self.params.path_frame_id)))?;
                self.publish(Output::Status(String::from(
                    "path finding timed out, skipping goal assignment",
                )))?;
            }
        }

        Ok(())
    }

    /// The periodic decision pipeline.
    fn tick(&mut self) -> Result<(), PlanError> {
        if self.local_map.is_none() {
            debug!("No local map yet, skipping tick");
            return Ok(());
        }
        if self.goal.is_none() {
            debug!("No goal, waiting for assignment");
            return Ok(());
        }

        let robot_to_ref = match self.lookup_transform() {
            Some(tf) => tf,
            None => return Ok(()),
        };
        let ref_to_robot = robot_to_ref.inverse();
        let now = Utc::now();

        let (decision, mut report) = {
            let map = match self.local_map.as_ref() {
                Some(m) => m,
                None => return Ok(()),
            };
            let goal = match self.goal {
                Some(g) => g,
                None => return Ok(()),
            };
            let path = self.path.as_ref();

            let footprint_safe = safety::footprint_safe(map, self.footprint.as_ref(), &self.params);
            let subgoal_safe = safety::subgoal_safe(map, path, &ref_to_robot, &self.params);
            let path_safe = safety::path_safe(map, path, &ref_to_robot, &self.params);
            let path_deprecated = safety::path_deprecated(path, now, &self.params);
            let following =
                safety::robot_following_path(path, self.progress, &ref_to_robot, &self.params);

            let robot_pos = robot_to_ref.translation_m();
            let dis_robot_to_goal = (robot_pos.x - goal.x).hypot(robot_pos.y - goal.y);

            let mut report = ReplanReport {
                branch: "",
                footprint_safe,
                subgoal_safe,
                path_safe,
                path_deprecated,
                robot_following_path: following,
                progress: self.progress,
                dis_robot_to_goal_m: dis_robot_to_goal,
                subgoal_robot_m: None,
            };

            let decision = if !footprint_safe {
                error!("Collision detected");
                report.branch = "collision";
                Decision::Collision
            } else if dis_robot_to_goal <= 2.0 * map.resolution_m {
                info!("Arrived at the final goal");
                report.branch = "arrival";
                Decision::Arrival
            } else if (dis_robot_to_goal <= self.params.steady_state_distance_m
                || self.progress < self.params.subgoal_arrival_progress)
                && path_safe
                && following
                && !path_deprecated
            {
                report.branch = "steady_state";
                match self.path.clone() {
                    Some(p) => Decision::SteadyState(p),
                    None => return Ok(()),
                }
            } else if self.progress >= self.params.subgoal_arrival_progress {
                let (sg, viz) = subgoal::generate_subgoal(map, &goal, &robot_to_ref, &self.params);
                warn!("Arriving at the subgoal, generated new subgoal ({:.2}, {:.2})", sg.x, sg.y);
                report.branch = "subgoal_arrival";
                Decision::Replan {
                    subgoal_robot_m: sg,
                    viz: Some(viz),
                    status: Some("subgoal arrival, generating new subgoal"),
                }
            } else if path.is_some() && !subgoal_safe {
                match path
                    .and_then(|p| subgoal::approach_unsafe_subgoal(map, p, &ref_to_robot, &self.params))
                {
                    Some(sg) => {
                        warn!(
                            "Subgoal unsafe, approaching safe waypoint ({:.2}, {:.2})",
                            sg.x, sg.y
                        );
                        report.branch = "approach_unsafe_subgoal";
                        Decision::Replan {
                            subgoal_robot_m: sg,
                            viz: None,
                            status: Some("approaching unsafe subgoal"),
                        }
                    }
                    None => {
                        let (sg, viz) =
                            subgoal::generate_subgoal(map, &goal, &robot_to_ref, &self.params);
                        warn!("Subgoal unsafe, generated new subgoal ({:.2}, {:.2})", sg.x, sg.y);
                        report.branch = "unsafe_subgoal";
                        Decision::Replan {
                            subgoal_robot_m: sg,
                            viz: Some(viz),
                            status: Some("unsafe subgoal, generating new subgoal"),
                        }
                    }
                }
            } else if path.map(|p| !p.is_empty()).unwrap_or(false)
                && (!path_safe || path_deprecated)
            {
                // Keep heading for the current path's first waypoint but
                // plan a fresh route to it
                let first = ref_to_robot.apply(&path.map(|p| p.points_m[0]).unwrap_or_else(|| {
                    Point2::new(self.params.path_start_offset_x_m, self.params.path_start_offset_y_m)
                }));
                let status = if !path_safe {
                    warn!("Existing path is not safe, replanning");
                    report.branch = "unsafe_path";
                    "existing path is not safe"
                } else {
                    warn!("Existing path is deprecated, replanning");
                    report.branch = "deprecated_path";
                    "existing path is deprecated"
                };
                Decision::Replan {
                    subgoal_robot_m: first,
                    viz: None,
                    status: Some(status),
                }
            } else if path.is_some() && !following {
                let (sg, viz) = subgoal::generate_subgoal(map, &goal, &robot_to_ref, &self.params);
                warn!("Robot is off the path, generated new subgoal ({:.2}, {:.2})", sg.x, sg.y);
                report.branch = "off_path";
                Decision::Replan {
                    subgoal_robot_m: sg,
                    viz: Some(viz),
                    status: Some("robot is off the path, generating new subgoal"),
                }
            } else {
                let (sg, viz) = subgoal::generate_subgoal(map, &goal, &robot_to_ref, &self.params);
                info!("No existing path, starting plan");
                report.branch = "new_plan";
                Decision::Replan {
                    subgoal_robot_m: sg,
                    viz: Some(viz),
                    status: Some("no existing path, starting plan"),
                }
            };

            (decision, report)
        };

        match decision {
            Decision::Collision => {
                self.publish(Output::Path(Path::new_empty(&self.params.path_frame_id)))?;
                self.publish(Output::Status(String::from("collision detected")))?;
            }
            Decision::Arrival => {
                self.goal = None;
                self.path = None;
                self.publish(Output::Path(Path::new_empty(&self.params.path_frame_id)))?;
                self.publish(Output::Status(String::from("final goal arrival")))?;
            }
            Decision::SteadyState(path) => {
                // Republish the held path untouched, in particular without
                // refreshing its stamp
                self.publish(Output::Path(path))?;
            }
            Decision::Replan {
                subgoal_robot_m,
                viz,
                status,
            } => {
                report.subgoal_robot_m = Some(subgoal_robot_m);

                if let Some(viz) = viz {
                    self.publish(Output::SubgoalViz(viz))?;
                }
                if let Some(status) = status {
                    self.publish(Output::Status(String::from(status)))?;
                }

                let solved = match self.local_map.as_ref() {
                    Some(map) => self.solve_to_point(map, &subgoal_robot_m, &robot_to_ref),
                    None => return Ok(()),
                };

                match solved {
                    Ok(path) => {
                        self.path = Some(path.clone());
                        self.publish(Output::Path(path))?;
                    }
                    Err(e) => {
                        error!(
                            "No path finding solution within {:.1} ms: {}",
                            self.params.solver_timeout_ms, e
                        );
                        let empty = Path::new_empty(&self.params.path_frame_id);
                        self.path = Some(empty.clone());
                        self.publish(Output::Path(empty))?;
                        self.publish(Output::Status(String::from("path finding timed out")))?;
                    }
                }
            }
        }

        util::session::save_with_timestamp("replans/report.json", report);

        Ok(())
    }

    /// Look up the robot-to-reference transform with a wait budget of one
    /// tick interval, logging and yielding `None` on failure.
    fn lookup_transform(&self) -> Option<PoseTransform> {
        let budget = Duration::from_secs_f64(self.params.tick_interval_s);
        match self.tf_provider.robot_to_reference(budget) {
            Ok(tf) => Some(tf),
            Err(e) => {
                warn!("Pose transform unavailable, skipping cycle: {}", e);
                None
            }
        }
    }

    /// Solve a grid path from the planning origin to the given robot-frame
    /// subgoal, returning the reference-frame path stamped now.
    ///
    /// Planning starts from a cell at a fixed forward offset from the robot
    /// origin, just in front of the robot's own footprint.
    fn solve_to_point(
        &self,
        map: &LocalCostMap,
        subgoal_robot_m: &Point2<f64>,
        robot_to_ref: &PoseTransform,
    ) -> Result<Path, crate::solver::SolveError> {
        let origin_idx = map.index_of_point(&Point2::new(
            self.params.path_start_offset_x_m,
            self.params.path_start_offset_y_m,
        ));
        let target_idx = map.index_of_point(subgoal_robot_m);
        let timeout = Duration::from_secs_f64(self.params.solver_timeout_ms / 1000.0);

        let cells = self.solver.solve(map, origin_idx, target_idx, timeout)?;

        Ok(Path {
            points_m: cells
                .iter()
                .map(|&c| robot_to_ref.apply(&map.point_of_index(c as i64)))
                .collect(),
            stamp: Utc::now(),
            frame_id: self.params.path_frame_id.clone(),
        })
    }

    fn publish(&self, output: Output) -> Result<(), PlanError> {
        self.output.send(output).map_err(|_| PlanError::OutputClosed)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

//! Scenario playback
//!
//! A scenario is a JSON file listing timed inbound events, used to exercise
//! the planner without live map, footprint, and goal sources. Events are
//! released once the session time passes their timestamp.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::Utc;
use nalgebra::Point2;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// Internal imports
use nav_lib::map::LocalCostMap;
use nav_lib::plan::{Event, Footprint};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A playable scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Name of the scenario
    pub name: String,

    /// The timed events, expected in ascending time order
    pub events: Vec<TimedEvent>,
}

/// One event and its release time.
#[derive(Debug, Clone, Deserialize)]
pub struct TimedEvent {
    /// Seconds since scenario start at which the event is released
    pub time_s: f64,

    /// The event itself
    pub event: ScenarioEvent,
}

/// Cursor over a scenario's events.
pub struct ScenarioPlayer {
    scenario: Scenario,
    cursor: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Serializable form of the planner's inbound events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ScenarioEvent {
    LocalMap { map: LocalCostMap },
    Footprint { points_m: Vec<[f64; 2]> },
    Progress { value: f64 },
    FinalGoal { x_m: f64, y_m: f64 },
}

/// Events ready for release at a given time.
pub enum PendingEvents {
    /// Nothing due yet
    None,

    /// The due events, in scenario order
    Some(Vec<Event>),

    /// All events have been released
    EndOfScenario,
}

/// Errors in loading a scenario file.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Cannot read the scenario file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot parse the scenario file: {0}")]
    ParseError(serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let raw = std::fs::read_to_string(path).map_err(ScenarioError::FileLoadError)?;
        serde_json::from_str(&raw).map_err(ScenarioError::ParseError)
    }
}

impl ScenarioEvent {
    /// Convert into a planner event.
    pub fn to_event(&self) -> Event {
        match self {
            ScenarioEvent::LocalMap { map } => Event::LocalMap(map.clone()),
            ScenarioEvent::Footprint { points_m } => Event::Footprint(Footprint {
                points_m: points_m.iter().map(|p| Point2::new(p[0], p[1])).collect(),
                stamp: Utc::now(),
            }),
            ScenarioEvent::Progress { value } => Event::Progress(*value),
            ScenarioEvent::FinalGoal { x_m, y_m } => Event::FinalGoal(Point2::new(*x_m, *y_m)),
        }
    }
}

impl ScenarioPlayer {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            cursor: 0,
        }
    }

    /// Get the events due at the given elapsed time, advancing the cursor
    /// past them.
    pub fn pending(&mut self, elapsed_s: f64) -> PendingEvents {
        if self.cursor >= self.scenario.events.len() {
            return PendingEvents::EndOfScenario;
        }

        let mut due = Vec::new();

        while let Some(timed) = self.scenario.events.get(self.cursor) {
            if timed.time_s <= elapsed_s {
                due.push(timed.event.to_event());
                self.cursor += 1;
            } else {
                break;
            }
        }

        if due.is_empty() {
            PendingEvents::None
        } else {
            PendingEvents::Some(due)
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn demo_scenario() -> Scenario {
        serde_json::from_str(
            r#"{
                "name": "demo",
                "events": [
                    {"time_s": 0.0, "event": {"type": "Progress", "value": 0.1}},
                    {"time_s": 0.5, "event": {"type": "FinalGoal", "x_m": 3.0, "y_m": 1.0}},
                    {"time_s": 0.5, "event": {"type": "Footprint", "points_m": [[0.0, 0.0], [0.3, 0.0]]}}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn events_release_in_time_order() {
        let mut player = ScenarioPlayer::new(demo_scenario());

        match player.pending(0.1) {
            PendingEvents::Some(events) => {
                assert_eq!(events, vec![Event::Progress(0.1)]);
            }
            _ => panic!("expected one due event"),
        }

        assert!(matches!(player.pending(0.2), PendingEvents::None));

        match player.pending(0.6) {
            PendingEvents::Some(events) => {
                assert_eq!(events.len(), 2);
                assert!(matches!(events[0], Event::FinalGoal(_)));
                assert!(matches!(events[1], Event::Footprint(_)));
            }
            _ => panic!("expected two due events"),
        }

        assert!(matches!(player.pending(1.0), PendingEvents::EndOfScenario));
    }

    #[test]
    fn map_events_parse() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "name": "map",
                "events": [
                    {"time_s": 0.0, "event": {"type": "LocalMap", "map": {
                        "resolution_m": 0.5,
                        "origin_m": [-1.0, -1.0],
                        "width": 4,
                        "height": 4,
                        "data": [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
                    }}}
                ]
            }"#,
        )
        .unwrap();

        match scenario.events[0].event.to_event() {
            Event::LocalMap(map) => {
                assert_eq!(map.width, 4);
                assert_eq!(map.data.len(), 16);
            }
            other => panic!("expected a map event, got {:?}", other),
        }
    }
}

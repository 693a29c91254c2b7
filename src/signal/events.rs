//! Measurement events in the form of 3GPP TS 38.331 (A4, D1, D2, T1) with
//! hysteresis and time-to-trigger.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::config::{A4Config, DistanceEventConfig, EventConfig, T1Config};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
pub enum EventType {
    A4,
    D1,
    D2,
    T1,
}

impl EventType {
    pub const ALL: [EventType; 4] = [EventType::A4, EventType::D1, EventType::D2, EventType::T1];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
    Entering,
    Leaving,
    None,
}

/// Values the decision was made from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    Rsrp {
        rsrp_dbm: f64,
    },
    Distance {
        serving_km: Option<f64>,
        neighbour_km: f64,
    },
    InView {
        seconds: f64,
    },
}

impl Measurement {
    pub fn is_finite(&self) -> bool {
        match *self {
            Measurement::Rsrp { rsrp_dbm } => rsrp_dbm.is_finite(),
            Measurement::Distance {
                serving_km,
                neighbour_km,
            } => neighbour_km.is_finite() && serving_km.map_or(true, f64::is_finite),
            Measurement::InView { seconds } => seconds.is_finite(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementEvent {
    pub event_type: EventType,
    pub condition_met: bool,
    pub transition: Transition,
    pub measured: Measurement,
}

impl MeasurementEvent {
    pub fn is_active(&self) -> bool {
        self.condition_met || self.transition != Transition::None
    }
}

/// Entering and leaving conditions of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conditions {
    pub entering: bool,
    pub leaving: bool,
}

pub fn a4_conditions(config: &A4Config, visible: bool, rsrp_dbm: f64) -> Conditions {
    let mn = rsrp_dbm + config.offset_db;
    Conditions {
        entering: visible && mn - config.hysteresis_db > config.threshold_dbm,
        leaving: !visible || mn + config.hysteresis_db < config.threshold_dbm,
    }
}

/// D1 and D2. `serving_km` is `None` when there is no serving satellite or
/// this satellite is the serving one.
pub fn distance_conditions(
    config: &DistanceEventConfig,
    visible: bool,
    serving_km: Option<f64>,
    neighbour_km: f64,
) -> Conditions {
    match serving_km {
        Some(ml1) if visible => {
            let hys = config.hysteresis_km;
            Conditions {
                entering: ml1 - hys > config.threshold1_km && neighbour_km + hys < config.threshold2_km,
                leaving: ml1 + hys < config.threshold1_km || neighbour_km - hys > config.threshold2_km,
            }
        }
        _ => Conditions {
            entering: false,
            leaving: true,
        },
    }
}

pub fn t1_conditions(config: &T1Config, visible: bool, in_view_s: f64) -> Conditions {
    let threshold = config.threshold.as_secs_f64();
    let expiry = threshold + config.duration.as_secs_f64();
    Conditions {
        entering: visible && in_view_s > threshold && in_view_s <= expiry,
        leaving: !visible || in_view_s > expiry,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerPhase {
    Idle,
    Pending { since_ms: i64 },
    Triggered,
}

/// Time-to-trigger state machine of one event on one satellite.
///
/// The entering condition has to hold on consecutive samples spanning at
/// least the time-to-trigger before the event is met. Leaving is immediate.
#[derive(Debug, Clone)]
pub struct EventTrigger {
    time_to_trigger_ms: i64,
    phase: TriggerPhase,
}

impl EventTrigger {
    pub fn new(time_to_trigger: Duration) -> Self {
        Self {
            time_to_trigger_ms: time_to_trigger.as_millis() as i64,
            phase: TriggerPhase::Idle,
        }
    }

    pub fn is_met(&self) -> bool {
        self.phase == TriggerPhase::Triggered
    }

    pub fn step(&mut self, at_ms: i64, conditions: Conditions) -> (bool, Transition) {
        match self.phase {
            TriggerPhase::Triggered => {
                if conditions.leaving {
                    self.phase = TriggerPhase::Idle;
                    (false, Transition::Leaving)
                } else {
                    (true, Transition::None)
                }
            }
            TriggerPhase::Idle | TriggerPhase::Pending { .. } => {
                if !conditions.entering {
                    self.phase = TriggerPhase::Idle;
                    return (false, Transition::None);
                }
                let since_ms = match self.phase {
                    TriggerPhase::Pending { since_ms } => since_ms,
                    _ => at_ms,
                };
                if at_ms - since_ms >= self.time_to_trigger_ms {
                    self.phase = TriggerPhase::Triggered;
                    (true, Transition::Entering)
                } else {
                    self.phase = TriggerPhase::Pending { since_ms };
                    (false, Transition::None)
                }
            }
        }
    }
}

/// Reference satellite of a constellation at one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServingReference {
    pub norad_id: u32,
    pub range_km: f64,
    pub ground_distance_km: f64,
}

/// Inputs for one sample of one satellite.
#[derive(Debug, Clone, Copy)]
pub struct EventInput {
    pub at_ms: i64,
    pub visible: bool,
    pub rsrp_dbm: f64,
    pub range_km: f64,
    pub ground_distance_km: f64,
    pub in_view_s: f64,
}

/// Runs the four event families over one satellite's samples in order.
#[derive(Debug, Clone)]
pub struct EventEvaluator {
    config: EventConfig,
    a4: EventTrigger,
    d1: EventTrigger,
    d2: EventTrigger,
    t1: EventTrigger,
}

impl EventEvaluator {
    pub fn new(config: &EventConfig) -> Self {
        Self {
            a4: EventTrigger::new(config.a4.time_to_trigger),
            d1: EventTrigger::new(config.d1.time_to_trigger),
            d2: EventTrigger::new(config.d2.time_to_trigger),
            t1: EventTrigger::new(config.t1.time_to_trigger),
            config: config.clone(),
        }
    }

    pub fn step(
        &mut self,
        norad_id: u32,
        input: &EventInput,
        serving: Option<&ServingReference>,
    ) -> Vec<MeasurementEvent> {
        let serving = serving.filter(|s| s.norad_id != norad_id);
        let mut events = Vec::with_capacity(4);

        let (met, transition) = self.a4.step(
            input.at_ms,
            a4_conditions(&self.config.a4, input.visible, input.rsrp_dbm),
        );
        events.push(MeasurementEvent {
            event_type: EventType::A4,
            condition_met: met,
            transition,
            measured: Measurement::Rsrp {
                rsrp_dbm: input.rsrp_dbm,
            },
        });

        let serving_range = serving.map(|s| s.range_km);
        let (met, transition) = self.d1.step(
            input.at_ms,
            distance_conditions(&self.config.d1, input.visible, serving_range, input.range_km),
        );
        events.push(MeasurementEvent {
            event_type: EventType::D1,
            condition_met: met,
            transition,
            measured: Measurement::Distance {
                serving_km: serving_range,
                neighbour_km: input.range_km,
            },
        });

        let serving_ground = serving.map(|s| s.ground_distance_km);
        let (met, transition) = self.d2.step(
            input.at_ms,
            distance_conditions(
                &self.config.d2,
                input.visible,
                serving_ground,
                input.ground_distance_km,
            ),
        );
        events.push(MeasurementEvent {
            event_type: EventType::D2,
            condition_met: met,
            transition,
            measured: Measurement::Distance {
                serving_km: serving_ground,
                neighbour_km: input.ground_distance_km,
            },
        });

        let (met, transition) = self.t1.step(
            input.at_ms,
            t1_conditions(&self.config.t1, input.visible, input.in_view_s),
        );
        events.push(MeasurementEvent {
            event_type: EventType::T1,
            condition_met: met,
            transition,
            measured: Measurement::InView {
                seconds: input.in_view_s,
            },
        });

        events
    }
}

//! Reactive collision avoidance for forklifts equipped with proximity sensors.
//!
//! Every tick the short range sensor classifies nearby obstacles by distance, and the worst
//! classification picks one of three manoeuvres. Nothing is remembered between ticks.

use serde::{Deserialize, Serialize};

use super::{Category, EntityId, Forklift, Kinematics, Position, Warehouse};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    pub enabled: bool,
    /// Name of the locally driven forklift created at startup.
    pub name: String,
    pub sensor_radius: f64,
    pub long_sensor_radius: f64,
    /// Velocity used to back away from an imminent crash.
    pub evasive_velocity: f64,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: String::from("Default"),
            sensor_radius: 90.0,
            long_sensor_radius: 250.0,
            evasive_velocity: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskZone {
    Aware,
    Warning,
    Danger,
}

impl RiskZone {
    pub fn classify(distance: f64, sensor_radius: f64) -> Self {
        if distance < sensor_radius * 2.0 / 3.0 {
            RiskZone::Danger
        } else if distance < sensor_radius {
            RiskZone::Warning
        } else {
            RiskZone::Aware
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RiskLine {
    pub from: (f64, f64),
    pub to: (f64, f64),
    pub zone: RiskZone,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GuidanceLine {
    pub from: (f64, f64),
    pub to: (f64, f64),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    /// Stop, turn hard and back away.
    Evade,
    /// Turn hard while slowly gaining speed.
    Swerve,
    /// Straighten out and speed up.
    Cruise,
}

impl Decision {
    pub fn from_lines(lines: &[RiskLine]) -> Self {
        match lines.iter().map(|line| line.zone).max() {
            Some(RiskZone::Danger) => Decision::Evade,
            Some(RiskZone::Warning) => Decision::Swerve,
            Some(RiskZone::Aware) | None => Decision::Cruise,
        }
    }

    pub fn steer(self, kinematics: &mut Kinematics, evasive_velocity: f64) {
        let max_angular_acceleration = kinematics.config().max_angular_acceleration;
        let step = kinematics.config().move_acceleration;
        match self {
            Decision::Evade => {
                kinematics.reset_movement_velocity();
                kinematics.set_angular_acceleration(max_angular_acceleration);
                kinematics.reverse_movement_direction();
                kinematics.set_movement_velocity(evasive_velocity);
            }
            Decision::Swerve => {
                kinematics.set_angular_acceleration(max_angular_acceleration);
                kinematics.increase_movement_velocity(step);
            }
            Decision::Cruise => {
                kinematics.reset_angular_acceleration();
                if kinematics.movement_velocity() < kinematics.config().max_movement_velocity {
                    kinematics.increase_movement_velocity(step);
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AutopilotReport {
    pub forklift: EntityId,
    pub lines: Vec<RiskLine>,
    pub guidance: Vec<GuidanceLine>,
    pub decision: Decision,
}

/// Classifies everything the sensors of `id` can see.
pub fn survey(warehouse: &Warehouse, id: EntityId) -> Option<(Vec<RiskLine>, Vec<GuidanceLine>)> {
    let forklift = warehouse.forklift(id)?;
    let sensors = forklift.sensors()?;

    let mut targets = vec![Category::Shelf, Category::Forklift];
    let guidance_target = if forklift.is_loaded() {
        targets.push(Category::Container);
        Category::DropZone
    } else {
        Category::Container
    };

    let (short, long) = (sensors.short.id(), sensors.long.id());
    let lines = targets
        .into_iter()
        .flat_map(|category| sighted(warehouse, short, Category::Sensor, category, id))
        .map(|target| {
            let distance = sensors.short.position().distance(target);
            RiskLine {
                from: sensors.short.position().into(),
                to: target.into(),
                zone: RiskZone::classify(distance, sensors.short.radius()),
            }
        })
        .collect();

    let guidance = sighted(warehouse, long, Category::LongSensor, guidance_target, id)
        .into_iter()
        .map(|target| GuidanceLine {
            from: sensors.long.position().into(),
            to: target.into(),
        })
        .collect();

    Some((lines, guidance))
}

/// Positions of the entities of `category` overlapping the sensor `sensor`, apart from its owner.
fn sighted(
    warehouse: &Warehouse,
    sensor: EntityId,
    sensors: Category,
    category: Category,
    owner: EntityId,
) -> Vec<Position> {
    let shapes = warehouse.shapes(category);
    warehouse
        .collisions(sensors, category)
        .into_iter()
        .filter(|(seen_by, target)| *seen_by == sensor && *target != owner)
        .filter_map(|(_, target)| {
            shapes
                .iter()
                .find(|(id, _)| *id == target)
                .map(|(_, shape)| shape.position())
        })
        .collect()
}

/// Runs one autopilot round for every forklift with sensors.
pub fn run(warehouse: &mut Warehouse, config: &AutopilotConfig) -> Vec<AutopilotReport> {
    if !config.enabled {
        return vec![];
    }

    let pilots = warehouse
        .forklifts()
        .filter(|(_, forklift)| forklift.sensors().is_some())
        .map(|(id, _)| id)
        .collect::<Vec<_>>();

    let mut reports = vec![];
    for id in pilots {
        let Some((lines, guidance)) = survey(warehouse, id) else {
            continue;
        };
        let decision = Decision::from_lines(&lines);
        if let Some(forklift) = warehouse.forklift_mut(id) {
            steer(forklift, decision, config.evasive_velocity);
        }
        reports.push(AutopilotReport {
            forklift: id,
            lines,
            guidance,
            decision,
        });
    }
    reports
}

fn steer(forklift: &mut Forklift, decision: Decision, evasive_velocity: f64) {
    decision.steer(forklift.kinematics_mut(), evasive_velocity);
}

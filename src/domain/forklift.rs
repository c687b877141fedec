//! Forklift carrying containers from the floor to the drop zones, optionally equipped with the
//! proximity sensors used by the autopilot.

use std::sync::Arc;

use super::{Angle, EntityId, HasCollision, Kinematics, KinematicsConfig, Position, Shape};

pub const FORKLIFT_RADIUS: f64 = 30.0;
pub const DELIVERY_REWARD: i64 = 10;
pub const CRASH_PENALTY: i64 = 1;

#[derive(Clone, Debug)]
pub struct Forklift {
    name: String,
    kinematics: Kinematics,
    loaded: bool,
    score: i64,
    session_token: Option<String>,
    dirty: bool,
    sensors: Option<Sensors>,
}

impl Forklift {
    pub fn new(
        name: impl Into<String>,
        position: Position,
        heading: Angle,
        config: Arc<KinematicsConfig>,
    ) -> Self {
        Self {
            name: name.into(),
            kinematics: Kinematics::new(position, heading, config),
            loaded: false,
            score: 0,
            session_token: None,
            dirty: false,
            sensors: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_sensors(mut self, sensors: Sensors) -> Self {
        self.sensors = Some(sensors);
        self.slave_sensors();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    pub fn kinematics_mut(&mut self) -> &mut Kinematics {
        &mut self.kinematics
    }

    pub fn position(&self) -> Position {
        self.kinematics.position()
    }

    pub fn heading(&self) -> Angle {
        self.kinematics.heading()
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn is_remote(&self) -> bool {
        self.session_token.is_some()
    }

    pub fn sensors(&self) -> Option<&Sensors> {
        self.sensors.as_ref()
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn load(&mut self) {
        self.loaded = true;
        self.dirty = true;
    }

    pub fn unload(&mut self) {
        self.loaded = false;
        self.dirty = true;
    }

    pub fn crash(&mut self) {
        self.score -= CRASH_PENALTY;
        self.dirty = true;
    }

    pub fn add_delivery(&mut self) {
        self.score += DELIVERY_REWARD;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns whether the forklift was dirty and clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Integrates one tick of movement followed by dampening, then moves the sensors along.
    pub fn update(&mut self) {
        self.kinematics.apply_tick();
        self.kinematics.apply_dampening();
        self.slave_sensors();
    }

    pub fn set_position(&mut self, position: Position) {
        self.kinematics.set_position(position);
        self.slave_sensors();
    }

    pub fn slave_sensors(&mut self) {
        let (position, heading) = (self.position(), self.heading());
        if let Some(sensors) = self.sensors.as_mut() {
            sensors.short.follow(position, heading);
            sensors.long.follow(position, heading);
        }
    }
}

impl HasCollision for Forklift {
    fn shape(&self) -> Shape {
        Shape::Circle {
            position: self.position(),
            radius: FORKLIFT_RADIUS,
        }
    }
}

/// Short and long range proximity sensors of one forklift.
#[derive(Clone, Debug, PartialEq)]
pub struct Sensors {
    pub short: Sensor,
    pub long: Sensor,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sensor {
    id: EntityId,
    position: Position,
    heading: Angle,
    radius: f64,
}

impl Sensor {
    pub fn new(id: EntityId, radius: f64) -> Self {
        Self {
            id,
            position: Position::default(),
            heading: Angle::default(),
            radius,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn heading(&self) -> Angle {
        self.heading
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    fn follow(&mut self, position: Position, heading: Angle) {
        self.position = position;
        self.heading = heading;
    }
}

impl HasCollision for Sensor {
    fn shape(&self) -> Shape {
        Shape::Circle {
            position: self.position,
            radius: self.radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn forklift() -> Forklift {
        Forklift::new(
            "Bot1",
            Position::new(100.0, 100.0),
            Angle::from_deg(0.0),
            Arc::new(KinematicsConfig::default()),
        )
    }

    #[test]
    fn test_forklift_scoring_marks_dirty() {
        let mut forklift = forklift();
        assert!(!forklift.is_dirty());

        forklift.load();
        assert!(forklift.is_loaded());
        assert!(forklift.take_dirty());
        assert!(!forklift.is_dirty());

        forklift.crash();
        forklift.add_delivery();
        assert_eq!(forklift.score(), 9);
        assert!(forklift.take_dirty());
    }

    #[test]
    fn test_forklift_sensors_follow_pose() {
        let mut forklift = forklift().with_sensors(Sensors {
            short: Sensor::new(EntityId::new(1), 90.0),
            long: Sensor::new(EntityId::new(2), 250.0),
        });
        forklift.kinematics_mut().set_angular_acceleration(0.5);
        forklift.kinematics_mut().set_movement_velocity(1.0);
        forklift.update();

        let sensors = forklift.sensors().unwrap();
        assert_eq!(sensors.short.position(), forklift.position());
        assert_eq!(sensors.long.position(), forklift.position());
        assert_abs_diff_eq!(sensors.short.heading().to_deg(), 0.5);
        assert!(forklift.position().x() > 100.0);
    }

    #[test]
    fn test_forklift_shape() {
        let forklift = forklift();
        assert_eq!(
            forklift.shape(),
            Shape::Circle {
                position: Position::new(100.0, 100.0),
                radius: FORKLIFT_RADIUS,
            }
        );
    }
}

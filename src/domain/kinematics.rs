//! Movement model shared by every forklift.
//!
//! Linear movement is described by a scalar `movement_velocity` and a
//! [`MovementDirection`]; the velocity vector is re-derived from both and the current heading.
//! Rotation is driven by an angular acceleration that is added to the heading every tick.

use std::sync::Arc;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use super::{Angle, Position};

/// Tuning constants injected into every [`Kinematics`] instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Per tick decay applied to each velocity component.
    pub move_dampening: f64,
    /// Velocity step used by manual driving and the autopilot.
    pub move_acceleration: f64,
    pub max_movement_acceleration: f64,
    pub max_movement_velocity: f64,
    pub max_angular_acceleration: f64,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            move_dampening: 0.004,
            move_acceleration: 0.01,
            max_movement_acceleration: 0.5,
            max_movement_velocity: 1.0,
            max_angular_acceleration: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    #[default]
    Forward,
    Backward,
}

impl MovementDirection {
    pub fn reversed(self) -> Self {
        match self {
            MovementDirection::Forward => MovementDirection::Backward,
            MovementDirection::Backward => MovementDirection::Forward,
        }
    }
}

/// Decides whether a new scalar velocity may replace the current one.
///
/// Only the current value is compared against the limit: an update is refused if it would push
/// further out of `[-max, max]`, while updates leading back into the range are always taken.
pub fn velocity_update_accepted(current: f64, new: f64, max: f64) -> bool {
    let is_accelerating = new > current;
    let is_decelerating = new <= current;
    let is_too_fast = current > max;
    let is_too_slow = current < -max;

    (is_accelerating && !is_too_fast)
        || (is_decelerating && !is_too_slow)
        || (is_decelerating && is_too_fast)
        || (is_accelerating && is_too_slow)
}

#[derive(Clone, Debug)]
pub struct Kinematics {
    position: Position,
    heading: Angle,
    previous_heading: Angle,
    velocity: Vector2<f64>,
    acceleration: Vector2<f64>,
    movement_velocity: f64,
    movement_direction: MovementDirection,
    movement_acceleration: f64,
    reverse_movement_acceleration: f64,
    acceleration_angle: Angle,
    movement_acceleration_in_angle: f64,
    angular_acceleration: f64,
    apply_acceleration: bool,
    config: Arc<KinematicsConfig>,
}

impl Kinematics {
    pub fn new(position: Position, heading: Angle, config: Arc<KinematicsConfig>) -> Self {
        Self {
            position,
            heading,
            previous_heading: heading,
            velocity: Vector2::zeros(),
            acceleration: Vector2::zeros(),
            movement_velocity: 0.0,
            movement_direction: MovementDirection::Forward,
            movement_acceleration: 0.0,
            reverse_movement_acceleration: 0.0,
            acceleration_angle: Angle::default(),
            movement_acceleration_in_angle: 0.0,
            angular_acceleration: 0.0,
            apply_acceleration: true,
            config,
        }
    }

    pub fn config(&self) -> &KinematicsConfig {
        &self.config
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn heading(&self) -> Angle {
        self.heading
    }

    pub fn velocity(&self) -> Vector2<f64> {
        self.velocity
    }

    pub fn acceleration(&self) -> Vector2<f64> {
        self.acceleration
    }

    pub fn movement_direction(&self) -> MovementDirection {
        self.movement_direction
    }

    pub fn moving_forward(&self) -> bool {
        self.movement_direction == MovementDirection::Forward
    }

    pub fn moving_backward(&self) -> bool {
        !self.moving_forward()
    }

    pub fn set_apply_acceleration(&mut self, apply: bool) {
        self.apply_acceleration = apply;
    }

    /// Magnitude of the velocity vector.
    pub fn movement_velocity(&self) -> f64 {
        self.velocity.norm()
    }

    /// Stores `new_velocity` if [`velocity_update_accepted`] allows it and re-derives the
    /// velocity vector from the stored value, the heading and the movement direction.
    pub fn set_movement_velocity(&mut self, new_velocity: f64) {
        if velocity_update_accepted(
            self.movement_velocity,
            new_velocity,
            self.config.max_movement_velocity,
        ) {
            self.movement_velocity = new_velocity;
        }

        let direction = match self.movement_direction {
            MovementDirection::Forward => self.heading,
            MovementDirection::Backward => self.heading.opposite(),
        };
        self.velocity = direction.unit() * self.movement_velocity;
    }

    pub fn reset_movement_velocity(&mut self) {
        self.set_movement_velocity(0.0);
    }

    pub fn increase_movement_velocity(&mut self, delta: f64) {
        let velocity = self.movement_velocity();
        if self.moving_backward() && velocity - delta < delta && velocity + delta > 0.0 {
            self.reverse_movement_direction();
        }

        let velocity = self.movement_velocity();
        if self.moving_forward() {
            self.set_movement_velocity(velocity + delta);
        } else {
            self.set_movement_velocity(velocity - delta);
        }
    }

    pub fn decrease_movement_velocity(&mut self, delta: f64) {
        if self.moving_forward() && self.movement_velocity() - delta < 0.0 {
            self.reverse_movement_direction();
        }

        let velocity = self.movement_velocity();
        if self.moving_forward() {
            self.set_movement_velocity(velocity - delta);
        } else {
            self.set_movement_velocity(velocity + delta);
        }
    }

    pub fn reverse_movement_direction(&mut self) {
        self.movement_direction = self.movement_direction.reversed();
    }

    pub fn movement_acceleration(&self) -> f64 {
        self.movement_acceleration
    }

    /// Only takes effect while the current value is below the acceleration limit.
    pub fn set_movement_acceleration(&mut self, acceleration: f64) {
        if self.movement_acceleration.abs() < self.config.max_movement_acceleration {
            self.movement_acceleration = acceleration;
        }
    }

    /// Only takes effect while the current value is below the acceleration limit.
    pub fn set_reverse_movement_acceleration(&mut self, acceleration: f64) {
        if self.reverse_movement_acceleration.abs() < self.config.max_movement_acceleration {
            self.reverse_movement_acceleration = acceleration;
        }
    }

    pub fn accelerate_in_angle(&mut self, angle: Angle, magnitude: f64) {
        self.acceleration = angle.unit() * magnitude;
    }

    pub fn nudge_in_angle(&mut self, angle: Angle, magnitude: f64) {
        self.velocity += angle.unit() * magnitude;
    }

    pub fn set_acceleration_in_angle(&mut self, angle: Angle, magnitude: f64) {
        self.acceleration_angle = angle;
        self.movement_acceleration_in_angle = magnitude;
    }

    pub fn unset_acceleration_in_angle(&mut self) {
        self.set_acceleration_in_angle(Angle::default(), 0.0);
    }

    pub fn turn(&mut self, delta: f64) {
        self.heading = self.heading + Angle::from_deg(delta);
        self.update_velocity_vector();
    }

    pub fn angular_acceleration(&self) -> f64 {
        self.angular_acceleration
    }

    /// Stored as given; values beyond the limit are skipped by [`Kinematics::apply_tick`].
    pub fn set_angular_acceleration(&mut self, angular_acceleration: f64) {
        self.angular_acceleration = angular_acceleration;
    }

    pub fn reset_angular_acceleration(&mut self) {
        self.angular_acceleration = 0.0;
    }

    pub fn angular_moved(&self) -> bool {
        self.heading != self.previous_heading
    }

    /// Advances the movement by one tick: acceleration inputs, rotation, then velocity and
    /// position integration.
    pub fn apply_tick(&mut self) {
        if self.apply_acceleration {
            self.update_velocity_vector();

            if self.movement_acceleration != 0.0 {
                self.accelerate_in_angle(self.heading, self.movement_acceleration);
            }
            if self.reverse_movement_acceleration != 0.0 {
                self.accelerate_in_angle(
                    self.heading.opposite(),
                    self.reverse_movement_acceleration,
                );
            }
            if self.movement_acceleration_in_angle != 0.0 {
                self.acceleration +=
                    self.acceleration_angle.unit() * self.movement_acceleration_in_angle;
            }
        }

        self.previous_heading = self.heading;
        if self.angular_acceleration.abs() <= self.config.max_angular_acceleration {
            self.heading = self.heading + Angle::from_deg(self.angular_acceleration);
        }

        self.velocity += self.acceleration;
        self.position = self.position + self.velocity;
    }

    /// Moves each velocity component towards zero and snaps small remainders to exactly zero.
    pub fn apply_dampening(&mut self) {
        let step = self.config.move_dampening;
        for component in self.velocity.iter_mut() {
            if *component != 0.0 && component.abs() > step {
                *component -= component.signum() * step;
            }
            if component.abs() <= step {
                *component = 0.0;
            }
        }
    }

    fn update_velocity_vector(&mut self) {
        self.set_movement_velocity(self.movement_velocity());
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    const EPSILON: f64 = 1e-9;

    fn kinematics(heading: f64) -> Kinematics {
        Kinematics::new(
            Position::new(0.0, 0.0),
            Angle::from_deg(heading),
            Arc::new(KinematicsConfig::default()),
        )
    }

    fn moving(velocity: f64, direction: MovementDirection) -> Kinematics {
        let mut kinematics = kinematics(0.0);
        if direction == MovementDirection::Backward {
            kinematics.reverse_movement_direction();
        }
        kinematics.set_movement_velocity(velocity);
        kinematics
    }

    #[rstest]
    #[case::increase_within_range(0.2, 0.3, 0.5, true)]
    #[case::increase_beyond_range_from_inside(0.5, 0.9, 0.5, true)]
    #[case::increase_while_too_fast(0.6, 0.7, 0.5, false)]
    #[case::decrease_while_too_fast(0.6, 0.4, 0.5, true)]
    #[case::decrease_within_range(0.3, 0.1, 0.5, true)]
    #[case::decrease_while_too_slow(-0.6, -0.7, 0.5, false)]
    #[case::increase_while_too_slow(-0.6, -0.4, 0.5, true)]
    #[case::unchanged_while_too_slow(-0.6, -0.6, 0.5, false)]
    fn test_velocity_update_accepted(
        #[case] current: f64,
        #[case] new: f64,
        #[case] max: f64,
        #[case] expected: bool,
    ) {
        assert_eq!(velocity_update_accepted(current, new, max), expected);
    }

    #[test]
    fn test_set_movement_velocity_follows_heading_and_direction() {
        let mut kinematics = kinematics(90.0);
        kinematics.set_movement_velocity(0.5);
        assert_abs_diff_eq!(kinematics.velocity().x, 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(kinematics.velocity().y, 0.5, epsilon = EPSILON);

        kinematics.reverse_movement_direction();
        kinematics.set_movement_velocity(0.5);
        assert_abs_diff_eq!(kinematics.velocity().y, -0.5, epsilon = EPSILON);
        assert_abs_diff_eq!(kinematics.movement_velocity(), 0.5, epsilon = EPSILON);
    }

    #[test]
    fn test_set_movement_velocity_refuses_to_go_further_beyond_limit() {
        let mut kinematics = kinematics(0.0);
        kinematics.set_movement_velocity(1.2);
        assert_abs_diff_eq!(kinematics.movement_velocity(), 1.2, epsilon = EPSILON);
        kinematics.set_movement_velocity(1.5);
        assert_abs_diff_eq!(kinematics.movement_velocity(), 1.2, epsilon = EPSILON);
        kinematics.set_movement_velocity(0.8);
        assert_abs_diff_eq!(kinematics.movement_velocity(), 0.8, epsilon = EPSILON);
    }

    #[test]
    fn test_decrease_five_times_from_forward() {
        let mut kinematics = Kinematics::new(
            Position::new(0.0, 0.0),
            Angle::from_deg(0.0),
            Arc::new(KinematicsConfig {
                max_movement_velocity: 0.5,
                ..KinematicsConfig::default()
            }),
        );
        kinematics.set_movement_velocity(0.3);
        let mut expected = 0.3;
        for _ in 0..5 {
            kinematics.decrease_movement_velocity(0.05);
            expected -= 0.05;
            assert_eq!(kinematics.movement_direction(), MovementDirection::Forward);
            assert_abs_diff_eq!(kinematics.movement_velocity(), expected, epsilon = EPSILON);
        }
        assert_abs_diff_eq!(kinematics.movement_velocity(), 0.05, epsilon = EPSILON);

        kinematics.decrease_movement_velocity(0.1);
        assert_eq!(kinematics.movement_direction(), MovementDirection::Backward);
        assert_abs_diff_eq!(kinematics.movement_velocity(), 0.15, epsilon = EPSILON);
        assert!(kinematics.velocity().x < 0.0);

        kinematics.decrease_movement_velocity(0.05);
        assert_eq!(kinematics.movement_direction(), MovementDirection::Backward);
        assert_abs_diff_eq!(kinematics.movement_velocity(), 0.2, epsilon = EPSILON);
    }

    #[test]
    fn test_increase_from_backward_flips_near_zero() {
        let mut kinematics = moving(0.05, MovementDirection::Backward);
        kinematics.increase_movement_velocity(0.05);
        assert_eq!(kinematics.movement_direction(), MovementDirection::Forward);
        assert_abs_diff_eq!(kinematics.movement_velocity(), 0.1, epsilon = EPSILON);
        assert!(kinematics.velocity().x > 0.0);
    }

    #[test]
    fn test_increase_from_backward_slows_down() {
        let mut kinematics = moving(0.4, MovementDirection::Backward);
        kinematics.increase_movement_velocity(0.1);
        assert_eq!(kinematics.movement_direction(), MovementDirection::Backward);
        assert_abs_diff_eq!(kinematics.movement_velocity(), 0.3, epsilon = EPSILON);
    }

    #[test]
    fn test_apply_tick_integrates_movement_acceleration() {
        let mut kinematics = kinematics(0.0);
        kinematics.set_movement_acceleration(0.1);
        kinematics.apply_tick();
        assert_abs_diff_eq!(kinematics.velocity().x, 0.1, epsilon = EPSILON);
        assert_abs_diff_eq!(kinematics.position().x(), 0.1, epsilon = EPSILON);
        kinematics.apply_tick();
        assert_abs_diff_eq!(kinematics.velocity().x, 0.2, epsilon = EPSILON);
        assert_abs_diff_eq!(kinematics.position().x(), 0.3, epsilon = EPSILON);
        assert_abs_diff_eq!(kinematics.position().y(), 0.0, epsilon = EPSILON);
    }

    #[test]
    fn test_apply_tick_reverse_acceleration_points_backwards() {
        let mut kinematics = kinematics(0.0);
        kinematics.set_reverse_movement_acceleration(0.1);
        kinematics.apply_tick();
        assert_abs_diff_eq!(kinematics.acceleration().x, -0.1, epsilon = EPSILON);
        assert_abs_diff_eq!(kinematics.position().x(), -0.1, epsilon = EPSILON);
    }

    #[test]
    fn test_apply_tick_adds_acceleration_in_angle() {
        let mut kinematics = kinematics(0.0);
        kinematics.set_acceleration_in_angle(Angle::from_deg(90.0), 0.1);
        kinematics.apply_tick();
        assert_abs_diff_eq!(kinematics.acceleration().x, 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(kinematics.acceleration().y, 0.1, epsilon = EPSILON);

        kinematics.unset_acceleration_in_angle();
        kinematics.set_apply_acceleration(false);
        kinematics.apply_tick();
        assert_abs_diff_eq!(kinematics.acceleration().y, 0.1, epsilon = EPSILON);
    }

    #[test]
    fn test_movement_acceleration_only_settable_below_limit() {
        let mut kinematics = kinematics(0.0);
        kinematics.set_movement_acceleration(0.3);
        assert_abs_diff_eq!(kinematics.movement_acceleration(), 0.3);
        kinematics.set_movement_acceleration(0.6);
        assert_abs_diff_eq!(kinematics.movement_acceleration(), 0.6);
        kinematics.set_movement_acceleration(0.1);
        assert_abs_diff_eq!(kinematics.movement_acceleration(), 0.6);
    }

    #[rstest]
    #[case::within_limit(0.5, 10.5)]
    #[case::at_limit(1.0, 11.0)]
    #[case::negative(-0.5, 9.5)]
    #[case::beyond_limit(2.0, 10.0)]
    #[case::beyond_negative_limit(-1.5, 10.0)]
    fn test_apply_tick_rotation(#[case] angular_acceleration: f64, #[case] expected: f64) {
        let mut kinematics = kinematics(10.0);
        kinematics.set_angular_acceleration(angular_acceleration);
        kinematics.apply_tick();
        assert_abs_diff_eq!(kinematics.heading().to_deg(), expected, epsilon = EPSILON);
        assert_eq!(kinematics.angular_moved(), expected != 10.0);
    }

    #[test]
    fn test_turn_rotates_velocity() {
        let mut kinematics = moving(0.5, MovementDirection::Forward);
        kinematics.turn(90.0);
        assert_abs_diff_eq!(kinematics.velocity().x, 0.0, epsilon = EPSILON);
        assert_abs_diff_eq!(kinematics.velocity().y, 0.5, epsilon = EPSILON);
    }

    #[test]
    fn test_nudge_in_angle() {
        let mut kinematics = kinematics(0.0);
        kinematics.nudge_in_angle(Angle::from_deg(180.0), 0.25);
        assert_abs_diff_eq!(kinematics.velocity().x, -0.25, epsilon = EPSILON);
    }

    #[rstest]
    #[case::decays(0.1, 0.096)]
    #[case::decays_negative(-0.1, -0.096)]
    #[case::snaps_after_decay(0.006, 0.0)]
    #[case::snaps_small(0.003, 0.0)]
    #[case::stays_zero(0.0, 0.0)]
    fn test_apply_dampening(#[case] velocity: f64, #[case] expected: f64) {
        let mut kinematics = kinematics(0.0);
        kinematics.nudge_in_angle(Angle::from_deg(0.0), velocity);
        kinematics.apply_dampening();
        assert_abs_diff_eq!(kinematics.velocity().x, expected, epsilon = EPSILON);
        assert_eq!(kinematics.velocity().y, 0.0);
    }

    #[test]
    fn test_apply_dampening_is_idempotent_at_zero() {
        let mut kinematics = kinematics(30.0);
        kinematics.set_movement_velocity(0.05);
        while kinematics.velocity() != Vector2::zeros() {
            kinematics.apply_dampening();
        }
        for _ in 0..10 {
            kinematics.apply_dampening();
            assert_eq!(kinematics.velocity(), Vector2::zeros());
        }
    }

    proptest! {
        #[test]
        fn velocity_update_matches_reference(
            current in -2.0f64..2.0,
            new in -2.0f64..2.0,
            max in 0.0f64..1.5,
        ) {
            let reference = if new > current { current <= max } else { current >= -max };
            prop_assert_eq!(velocity_update_accepted(current, new, max), reference);
        }

        #[test]
        fn movement_velocity_never_negative(
            heading in 0.0f64..360.0,
            steps in proptest::collection::vec((any::<bool>(), 0.0f64..0.5), 1..40),
        ) {
            let mut kinematics = kinematics(heading);
            for (increase, delta) in steps {
                if increase {
                    kinematics.increase_movement_velocity(delta);
                } else {
                    kinematics.decrease_movement_velocity(delta);
                }
                prop_assert!(kinematics.movement_velocity() >= 0.0);
                prop_assert!(kinematics.movement_velocity <= kinematics.movement_velocity() + EPSILON);
                prop_assert!(kinematics.movement_velocity >= -EPSILON);
            }
        }
    }
}

//! Collision detection based on basic shapes.

use super::Position;

pub trait HasCollision {
    fn has_collision(&self, other: &dyn HasCollision) -> bool {
        self.shape().has_intersection(&other.shape())
    }

    fn shape(&self) -> Shape;
}

/// Footprint of an entity. Rectangles are axis aligned and centred on `position`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Shape {
    Rectangle {
        position: Position,
        x_length: f64,
        y_length: f64,
    },
    Circle {
        position: Position,
        radius: f64,
    },
}

impl Shape {
    pub fn position(&self) -> Position {
        match self {
            Shape::Rectangle { position, .. } | Shape::Circle { position, .. } => *position,
        }
    }

    pub fn with_position(self, new_position: Position) -> Shape {
        match self {
            Shape::Rectangle {
                x_length, y_length, ..
            } => Shape::Rectangle {
                position: new_position,
                x_length,
                y_length,
            },
            Shape::Circle { radius, .. } => Shape::Circle {
                position: new_position,
                radius,
            },
        }
    }

    /// Width and height of the axis aligned box enclosing the shape.
    pub fn extent(&self) -> (f64, f64) {
        match self {
            Shape::Rectangle {
                x_length, y_length, ..
            } => (*x_length, *y_length),
            Shape::Circle { radius, .. } => (2.0 * radius, 2.0 * radius),
        }
    }

    pub fn has_intersection(&self, other: &Shape) -> bool {
        match (self, other) {
            (
                Shape::Circle { position, radius },
                Shape::Circle {
                    position: other_position,
                    radius: other_radius,
                },
            ) => position.distance(*other_position) < radius + other_radius,
            (
                Shape::Circle { position, radius },
                Shape::Rectangle {
                    position: other_position,
                    x_length: other_x_length,
                    y_length: other_y_length,
                },
            )
            | (
                Shape::Rectangle {
                    position: other_position,
                    x_length: other_x_length,
                    y_length: other_y_length,
                },
                Shape::Circle { position, radius },
            ) => {
                let x_min = other_position.x() - other_x_length / 2.0;
                let x_max = other_position.x() + other_x_length / 2.0;
                let y_min = other_position.y() - other_y_length / 2.0;
                let y_max = other_position.y() + other_y_length / 2.0;
                let closest = Position::new(
                    position.x().clamp(x_min, x_max),
                    position.y().clamp(y_min, y_max),
                );
                position.distance(closest) < *radius
            }
            (
                Shape::Rectangle {
                    position,
                    x_length,
                    y_length,
                },
                Shape::Rectangle {
                    position: other_position,
                    x_length: other_x_length,
                    y_length: other_y_length,
                },
            ) => {
                (position.x() - other_position.x()).abs() * 2.0 < x_length + other_x_length
                    && (position.y() - other_position.y()).abs() * 2.0 < y_length + other_y_length
            }
        }
    }
}

impl HasCollision for Shape {
    fn shape(&self) -> Shape {
        *self
    }
}

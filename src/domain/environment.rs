//! Static parts of the warehouse: the arena, shelves, drop zones and the containers waiting to be
//! picked up.

use serde::{Deserialize, Serialize};

use super::{HasCollision, Position, Shape};

pub const SHELF_WIDTH: f64 = 21.0;
pub const SHELF_HEIGHT: f64 = 105.0;
pub const SHELF_GAP: f64 = 60.0;
pub const SHELF_CORRIDOR: f64 = 200.0;
pub const DROP_ZONE_WIDTH: f64 = 75.0;
pub const DROP_ZONE_HEIGHT: f64 = 58.0;
pub const CONTAINER_RADIUS: f64 = 16.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Arena {
    pub width: f64,
    pub height: f64,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

impl Arena {
    pub fn centre(&self) -> Position {
        Position::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn contains(&self, position: Position) -> bool {
        (0.0..=self.width).contains(&position.x()) && (0.0..=self.height).contains(&position.y())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Shelf {
    position: Position,
}

impl Shelf {
    pub fn new(position: Position) -> Self {
        Self { position }
    }

    pub fn footprint() -> Shape {
        Shape::Rectangle {
            position: Position::default(),
            x_length: SHELF_WIDTH,
            y_length: SHELF_HEIGHT,
        }
    }

    /// Centres of the shelves of the default layout: up to two rows of six blocks with four
    /// shelves each. Blocks with a shelf centre outside the arena are left out.
    pub fn layout(arena: &Arena) -> Vec<Position> {
        let mut positions = vec![];
        for i in 0..2 {
            for j in 0..6 {
                let x = SHELF_GAP + (SHELF_WIDTH + SHELF_GAP) * 2.0 * j as f64;
                let y = SHELF_GAP + (SHELF_HEIGHT * 2.0 + SHELF_CORRIDOR) * i as f64;
                let fits = x + SHELF_WIDTH + 1.0 <= arena.width
                    && y + SHELF_HEIGHT + 1.0 <= arena.height;
                if !fits {
                    continue;
                }
                for (dx, dy) in [
                    (0.0, 0.0),
                    (SHELF_WIDTH + 1.0, 0.0),
                    (0.0, SHELF_HEIGHT + 1.0),
                    (SHELF_WIDTH + 1.0, SHELF_HEIGHT + 1.0),
                ] {
                    positions.push(Position::new(x + dx, y + dy));
                }
            }
        }
        positions
    }
}

impl HasCollision for Shelf {
    fn shape(&self) -> Shape {
        Shelf::footprint().with_position(self.position)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DropZone {
    position: Position,
}

impl DropZone {
    pub fn new(position: Position) -> Self {
        Self { position }
    }

    pub fn footprint() -> Shape {
        Shape::Rectangle {
            position: Position::default(),
            x_length: DROP_ZONE_WIDTH,
            y_length: DROP_ZONE_HEIGHT,
        }
    }
}

impl HasCollision for DropZone {
    fn shape(&self) -> Shape {
        DropZone::footprint().with_position(self.position)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Container {
    position: Position,
}

impl Container {
    pub fn new(position: Position) -> Self {
        Self { position }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn footprint() -> Shape {
        Shape::Circle {
            position: Position::default(),
            radius: CONTAINER_RADIUS,
        }
    }
}

impl HasCollision for Container {
    fn shape(&self) -> Shape {
        Container::footprint().with_position(self.position)
    }
}

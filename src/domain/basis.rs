//! Basic building blocks.

use std::ops::{Add, Neg, Sub};

use nalgebra::Vector2;

#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Position {
    x: f64,
    y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn distance(&self, position: Self) -> f64 {
        ((self.x - position.x).powi(2) + (self.y - position.y).powi(2)).sqrt()
    }
}

impl From<Position> for (f64, f64) {
    fn from(value: Position) -> Self {
        (value.x, value.y)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Add<Vector2<f64>> for Position {
    type Output = Position;

    fn add(self, rhs: Vector2<f64>) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// Heading in degrees, kept within `[0, 360)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Angle(f64);

impl Angle {
    pub fn from_deg(degree: f64) -> Self {
        Self(degree.rem_euclid(360.0))
    }

    pub fn to_deg(self) -> f64 {
        self.0
    }

    pub fn to_rad(self) -> f64 {
        self.0.to_radians()
    }

    /// Unit vector pointing along the angle.
    pub fn unit(self) -> Vector2<f64> {
        let radians = self.to_rad();
        Vector2::new(radians.cos(), radians.sin())
    }

    pub fn opposite(self) -> Self {
        self + Angle::from_deg(180.0)
    }
}

impl Neg for Angle {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Angle::from_deg(-self.0)
    }
}

impl Add for Angle {
    type Output = Angle;

    fn add(self, rhs: Self) -> Self::Output {
        Angle::from_deg(self.0 + rhs.0)
    }
}

impl From<Angle> for f64 {
    fn from(value: Angle) -> Self {
        value.0
    }
}

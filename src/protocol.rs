//! Remote control of forklifts over a topic based publish/subscribe channel.
//!
//! Clients ask for a forklift on `create`, receive a session token on `created/<key>` and then
//! steer it through `<token>/control` until they give it back on `<token>/remove`. All topics are
//! relative to the configured prefix.

mod inbox;
mod message;
mod telemetry;
mod token_book;

use std::time::SystemTime;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::{EntityId, PlacementError, Warehouse};

pub use inbox::Inbox;
pub use message::{Command, Fields};
pub use telemetry::{Settings, Topics, WorldStatus};
pub use token_book::{TokenBook, TokenBookError};

/// Message received from the channel, topic without prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Message waiting to be published, topic including prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("malformed field {0:?}, expected key=value")]
    MalformedField(String),
    #[error("missing field {0:?}")]
    MissingField(&'static str),
    #[error("invalid number {value:?} for field {field:?}")]
    InvalidNumber { field: String, value: String },
    #[error("unknown topic {0:?}")]
    UnknownTopic(String),
    #[error("no forklift for token {0:?}")]
    UnknownToken(String),
    #[error("forklift limit of {0} reached")]
    CapacityExceeded(usize),
    #[error("no room for another forklift: {0}")]
    Placement(#[from] PlacementError),
}

/// State change caused by an accepted command.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Created {
        id: EntityId,
        name: String,
        token: String,
        key: String,
        /// Whether the token was minted for this request rather than taken from the token book.
        minted: bool,
        /// Whether a forklift of the same name was destroyed.
        replaced: bool,
    },
    Controlled {
        id: EntityId,
        name: String,
    },
    Removed {
        id: EntityId,
        name: String,
    },
}

pub struct ControlProtocol {
    token_book: TokenBook,
    max_forklifts: usize,
}

impl ControlProtocol {
    pub fn new(token_book: TokenBook, max_forklifts: usize) -> Self {
        Self {
            token_book,
            max_forklifts,
        }
    }

    pub fn token_book(&self) -> &TokenBook {
        &self.token_book
    }

    pub fn handle(
        &mut self,
        warehouse: &mut Warehouse,
        command: Command,
    ) -> Result<Effect, ProtocolError> {
        match command {
            Command::Create { name, key } => self.create(warehouse, name, key),
            Command::Control {
                token,
                steering,
                throttle,
            } => control(warehouse, &token, steering, throttle),
            Command::Remove { token } => {
                let removed = warehouse
                    .find_forklift_by_token(&token)
                    .and_then(|id| warehouse.remove_forklift(id).map(|forklift| (id, forklift)));
                let (id, forklift) = removed.ok_or(ProtocolError::UnknownToken(token))?;
                Ok(Effect::Removed {
                    id,
                    name: forklift.name().to_owned(),
                })
            }
        }
    }

    fn create(
        &mut self,
        warehouse: &mut Warehouse,
        name: String,
        key: String,
    ) -> Result<Effect, ProtocolError> {
        if warehouse.forklift_count() >= self.max_forklifts {
            return Err(ProtocolError::CapacityExceeded(self.max_forklifts));
        }

        let (token, minted) = match self.token_book.token_for(&name) {
            Some(token) => (token.to_owned(), false),
            None => (mint_token(&name, SystemTime::now()), true),
        };

        let previous = warehouse.find_forklift_by_name(&name);
        let id = warehouse.spawn_forklift(&name, Some(&token), None)?;
        if let Some(previous) = previous {
            warehouse.remove_forklift(previous);
        }
        if minted {
            self.token_book.insert(&name, &token);
        }

        Ok(Effect::Created {
            id,
            name,
            token,
            key,
            minted,
            replaced: previous.is_some(),
        })
    }
}

fn control(
    warehouse: &mut Warehouse,
    token: &str,
    steering: Option<f64>,
    throttle: Option<f64>,
) -> Result<Effect, ProtocolError> {
    let unknown = || ProtocolError::UnknownToken(token.to_owned());
    let id = warehouse.find_forklift_by_token(token).ok_or_else(unknown)?;
    let forklift = warehouse.forklift_mut(id).ok_or_else(unknown)?;

    let kinematics = forklift.kinematics_mut();
    let max_angular_acceleration = kinematics.config().max_angular_acceleration;
    let max_movement_acceleration = kinematics.config().max_movement_acceleration;

    if let Some(steering) = steering {
        kinematics.set_angular_acceleration(
            steering.clamp(-max_angular_acceleration, max_angular_acceleration),
        );
    }
    if let Some(throttle) = throttle {
        let delta = throttle.clamp(-max_movement_acceleration, max_movement_acceleration);
        if delta < 0.0 {
            kinematics.decrease_movement_velocity(delta.abs());
        } else if delta > 0.0 {
            kinematics.increase_movement_velocity(delta);
        }
    }
    if steering.is_some() || throttle.is_some() {
        forklift.mark_dirty();
    }

    Ok(Effect::Controlled {
        id,
        name: forklift.name().to_owned(),
    })
}

/// Hex encoded SHA-256 of the name and the given time.
pub fn mint_token(name: &str, now: SystemTime) -> String {
    let nanos = now
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(nanos.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

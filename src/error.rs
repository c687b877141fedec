use thiserror::Error;

use crate::{config::ConfigError, domain::PlacementError, protocol::TokenBookError};

/// Errors preventing the simulation from starting.
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to furnish the warehouse: {0}")]
    Placement(#[from] PlacementError),
    #[error(transparent)]
    TokenBook(#[from] TokenBookError),
}

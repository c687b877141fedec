//! The resource module encapsulates domain entities for use with Bevy.

use std::ops::{Deref, DerefMut};

use bevy::ecs::system::Resource;

use crate::{
    config::SimulationConfig,
    domain,
    protocol::{self, Topics},
    transport,
};

macro_rules! wrapper_resource {
    ($name:ident, $inner:ty) => {
        #[derive(Resource)]
        pub struct $name($inner);

        impl Deref for $name {
            type Target = $inner;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

wrapper_resource!(WarehouseRes, domain::Warehouse);
wrapper_resource!(ProtocolRes, protocol::ControlProtocol);
wrapper_resource!(InboxRes, protocol::Inbox);
wrapper_resource!(ControlChannelRes, transport::ControlChannel);
wrapper_resource!(AutopilotRes, domain::AutopilotConfig);

/// Tick counter and the settings of the running simulation.
#[derive(Resource)]
pub struct SimulationRes {
    pub config: SimulationConfig,
    pub topics: Topics,
    pub tick: u64,
}

impl SimulationRes {
    pub fn new(config: SimulationConfig, topics: Topics) -> Self {
        Self {
            config,
            topics,
            tick: 0,
        }
    }
}

//! Controller connecting remote clients to their forklifts.
//!
//! Remote forklifts are steered through the message broker. The network threads are started when
//! the plugin is built; if the broker is disabled or the threads cannot be started, the
//! simulation runs with a detached channel and only the autopilot drives.

use bevy::prelude::*;

use crossbeam_channel::{Receiver, Sender};

use crate::{
    protocol::{InboundMessage, OutboundMessage},
    resource::ControlChannelRes,
    transport::{self, BrokerConfig, ControlChannel},
};

pub struct Controller {
    pub broker: BrokerConfig,
}

/// Far ends of a detached channel, kept alive so that the simulation does not see it closed.
#[derive(Resource)]
struct DetachedEnds {
    _inbound: Sender<InboundMessage>,
    outbound: Receiver<OutboundMessage>,
}

fn connect(broker: &BrokerConfig) -> Option<ControlChannel> {
    if !broker.enabled {
        info!("Broker disabled, running without remote control");
        return None;
    }
    match transport::connect(broker) {
        Ok(channel) => Some(channel),
        Err(error) => {
            error!("Running without remote control: {error}");
            None
        }
    }
}

/// Discards telemetry nobody is going to publish.
fn discard_outbound(ends: Res<DetachedEnds>) {
    ends.outbound.try_iter().for_each(drop);
}

impl Plugin for Controller {
    fn build(&self, app: &mut App) {
        match connect(&self.broker) {
            Some(channel) => {
                app.insert_resource(ControlChannelRes::from(channel));
            }
            None => {
                let (channel, inbound, outbound) =
                    ControlChannel::detached(self.broker.channel_capacity);
                app.insert_resource(ControlChannelRes::from(channel))
                    .insert_resource(DetachedEnds {
                        _inbound: inbound,
                        outbound,
                    })
                    .add_systems(Last, discard_outbound);
            }
        }
    }
}

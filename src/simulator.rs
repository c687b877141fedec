//! Simulation of the warehouse floor.
//!
//! Every fixed tick the pending commands are applied, the forklifts are moved, overlaps are turned
//! into score and load changes, the autopilot steers the forklifts with sensors and telemetry is
//! handed to the sender thread.

use std::time::{SystemTime, UNIX_EPOCH};

use bevy::{app::AppExit, prelude::*};

use crate::{
    config::SimulationConfig,
    domain::{autopilot, AutopilotConfig, EntityId, Warehouse},
    protocol::{Command, Effect, Inbox, Settings, Topics, WorldStatus},
    resource::{
        AutopilotRes, ControlChannelRes, InboxRes, ProtocolRes, SimulationRes, WarehouseRes,
    },
};

pub struct Simulator {
    pub simulation: SimulationConfig,
    pub autopilot: AutopilotConfig,
    pub topic_prefix: String,
}

impl Plugin for Simulator {
    fn build(&self, app: &mut App) {
        app.insert_resource(SimulationRes::new(
            self.simulation.clone(),
            Topics::new(&self.topic_prefix),
        ))
        .insert_resource(AutopilotRes::from(self.autopilot.clone()))
        .insert_resource(InboxRes::from(Inbox::new(
            self.simulation.topic_queue_capacity,
        )))
        .add_event::<AppExit>()
        .add_systems(Startup, publish_settings)
        .add_systems(
            FixedUpdate,
            (
                process_commands,
                integrate,
                resolve_collisions,
                run_autopilot,
                publish_telemetry,
                stop_after_max_ticks,
            )
                .chain(),
        )
        .add_systems(Last, save_tokens_on_exit);
    }
}

fn publish_settings(
    warehouse: Res<WarehouseRes>,
    simulation: Res<SimulationRes>,
    mut channel: ResMut<ControlChannelRes>,
) {
    match simulation.topics.settings(&Settings::of(&warehouse)) {
        Ok(message) => channel.send(message),
        Err(error) => error!("Failed to encode settings: {error}"),
    }
}

fn process_commands(
    mut channel: ResMut<ControlChannelRes>,
    mut inbox: ResMut<InboxRes>,
    mut protocol: ResMut<ProtocolRes>,
    mut warehouse: ResMut<WarehouseRes>,
    simulation: Res<SimulationRes>,
) {
    for message in channel.receive() {
        let topic = message.topic.clone();
        if !inbox.push(message) {
            debug!("Queue for {topic} full, dropped its oldest message");
        }
    }

    for message in inbox.take_round() {
        let command = match Command::decode(&message.topic, &message.payload) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                warn!("Discarding message on {}: {error}", message.topic);
                continue;
            }
        };
        debug!("Handling {command:?}");

        match protocol.handle(&mut warehouse, command) {
            Ok(Effect::Created {
                id,
                name,
                token,
                key,
                minted,
                replaced,
            }) => {
                if replaced {
                    info!("Replaced forklift {name} with {id}");
                } else {
                    info!("Created forklift {name} as {id}");
                }
                if minted {
                    if let Err(error) = protocol.token_book().save() {
                        error!("Failed to save tokens: {error}");
                    }
                }
                channel.send(simulation.topics.created_ack(&key, &name, &token));
            }
            Ok(Effect::Controlled { id, name }) => debug!("Steered forklift {name} {id}"),
            Ok(Effect::Removed { id, name }) => info!("Removed forklift {name} {id}"),
            Err(error) => warn!("Rejected message on {}: {error}", message.topic),
        }
    }
}

fn integrate(mut warehouse: ResMut<WarehouseRes>) {
    for (id, forklift) in warehouse.integrate() {
        info!(
            "Forklift {} {id} left the arena and was removed",
            forklift.name()
        );
    }
}

fn forklift_name(warehouse: &Warehouse, id: EntityId) -> &str {
    warehouse
        .forklift(id)
        .map(|forklift| forklift.name())
        .unwrap_or("?")
}

fn resolve_collisions(mut warehouse: ResMut<WarehouseRes>) {
    let report = warehouse.resolve_collisions();

    for id in &report.deliveries {
        info!("Forklift {} {id} delivered a container", forklift_name(&warehouse, *id));
    }
    for (id, container) in &report.pickups {
        debug!(
            "Forklift {} {id} picked up container {container}",
            forklift_name(&warehouse, *id)
        );
    }
    for id in &report.crashes {
        debug!("Forklift {} {id} crashed", forklift_name(&warehouse, *id));
    }
    if report.replenished > 0 {
        info!("Placed {} new containers", report.replenished);
    }
    if let Some(error) = report.replenish_error {
        error!("Failed to place new containers: {error}");
    }
}

fn run_autopilot(mut warehouse: ResMut<WarehouseRes>, config: Res<AutopilotRes>) {
    for report in autopilot::run(&mut warehouse, &config) {
        for line in &report.lines {
            trace!(
                "{}: {:?} obstacle at {:?}",
                report.forklift,
                line.zone,
                line.to
            );
        }
        for line in &report.guidance {
            trace!("{}: target at {:?}", report.forklift, line.to);
        }
        trace!("{}: {:?}", report.forklift, report.decision);
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn publish_telemetry(
    mut simulation: ResMut<SimulationRes>,
    mut warehouse: ResMut<WarehouseRes>,
    mut channel: ResMut<ControlChannelRes>,
) {
    simulation.tick += 1;

    if simulation.tick % simulation.config.status_interval_ticks.max(1) == 0 {
        let status = WorldStatus::of(&warehouse, simulation.tick, unix_millis());
        debug!("Scoreboard: {}", status.scoreboard);
        match simulation.topics.world_status(&status) {
            Ok(message) => channel.send(message),
            Err(error) => error!("Failed to encode status: {error}"),
        }
    }

    match simulation.topics.dirty_forklift_statuses(&mut warehouse) {
        Ok(messages) => messages
            .into_iter()
            .for_each(|message| channel.send(message)),
        Err(error) => error!("Failed to encode forklift status: {error}"),
    }
}

fn stop_after_max_ticks(
    simulation: Res<SimulationRes>,
    mut exit: EventWriter<AppExit>,
    mut stopping: Local<bool>,
) {
    let Some(max_ticks) = simulation.config.max_ticks else {
        return;
    };
    if simulation.tick >= max_ticks && !*stopping {
        info!("Stopping after {} ticks", simulation.tick);
        exit.send(AppExit);
        *stopping = true;
    }
}

fn save_tokens_on_exit(mut exit: EventReader<AppExit>, protocol: Res<ProtocolRes>) {
    if exit.read().last().is_none() {
        return;
    }
    match protocol.token_book().save() {
        Ok(()) => info!("Saved {} tokens", protocol.token_book().len()),
        Err(error) => error!("Failed to save tokens: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bevy::ecs::event::Events;
    use crossbeam_channel::{Receiver, Sender};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        domain::{Arena, KinematicsConfig, LayoutConfig},
        protocol::{ControlProtocol, Fields, InboundMessage, OutboundMessage, TokenBook},
        tests::SEED,
        transport::ControlChannel,
    };

    fn app() -> (App, Sender<InboundMessage>, Receiver<OutboundMessage>) {
        let warehouse = Warehouse::furnished(
            Arena::default(),
            LayoutConfig {
                seed: Some(SEED),
                ..LayoutConfig::default()
            },
            Arc::new(KinematicsConfig::default()),
        )
        .unwrap();
        let (channel, inbound, outbound) = ControlChannel::detached(64);

        let mut app = App::new();
        app.insert_resource(WarehouseRes::from(warehouse))
            .insert_resource(ProtocolRes::from(ControlProtocol::new(
                TokenBook::default(),
                10,
            )))
            .insert_resource(ControlChannelRes::from(channel))
            .add_plugins(Simulator {
                simulation: SimulationConfig {
                    status_interval_ticks: 2,
                    max_ticks: Some(3),
                    ..SimulationConfig::default()
                },
                autopilot: AutopilotConfig::default(),
                topic_prefix: "warehouse".to_owned(),
            });
        (app, inbound, outbound)
    }

    fn command(inbound: &Sender<InboundMessage>, topic: &str, payload: &str) {
        inbound
            .send(InboundMessage {
                topic: topic.to_owned(),
                payload: payload.to_owned(),
            })
            .unwrap();
    }

    fn tick(app: &mut App) {
        app.world.run_schedule(FixedUpdate);
    }

    #[test]
    fn test_remote_session() {
        let (mut app, inbound, outbound) = app();

        app.world.run_schedule(Startup);
        let settings = outbound.try_recv().unwrap();
        assert_eq!(settings.topic, "warehouse/settings");
        assert!(settings.retain);

        command(&inbound, "create", "name=Bot1,key=k1");
        tick(&mut app);
        let ack = outbound.try_recv().unwrap();
        assert_eq!(ack.topic, "warehouse/created/k1");
        let fields = Fields::parse(&ack.payload).unwrap();
        assert_eq!(fields.get("name"), Some("Bot1"));
        let token = fields.get("token").unwrap().to_owned();
        assert_eq!(token.len(), 64);
        assert!(outbound.try_recv().is_err());

        command(&inbound, &format!("{token}/control"), "m=0.5,r=0.2");
        tick(&mut app);
        let topics = outbound.try_iter().map(|m| m.topic).collect::<Vec<_>>();
        assert_eq!(
            topics,
            vec![
                "warehouse/status".to_owned(),
                format!("warehouse/{token}/status")
            ]
        );

        command(&inbound, &format!("{token}/remove"), "");
        tick(&mut app);
        assert_eq!(app.world.resource::<SimulationRes>().tick, 3);
        assert_eq!(app.world.resource::<WarehouseRes>().forklift_count(), 0);
        assert!(!app.world.resource::<Events<AppExit>>().is_empty());
    }

    #[test]
    fn test_invalid_messages_leave_state_unchanged() {
        let (mut app, inbound, outbound) = app();

        command(&inbound, "create", "name=Bot1");
        command(&inbound, "nobody/control", "m=0.1");
        command(&inbound, "status", "{}");
        command(&inbound, "shutdown", "");
        tick(&mut app);

        assert_eq!(app.world.resource::<WarehouseRes>().forklift_count(), 0);
        assert!(outbound.try_recv().is_err());
    }

    #[test]
    fn test_one_message_per_topic_and_tick() {
        let (mut app, inbound, outbound) = app();

        command(&inbound, "create", "name=Bot1,key=k1");
        command(&inbound, "create", "name=Bot2,key=k2");
        tick(&mut app);
        assert_eq!(app.world.resource::<WarehouseRes>().forklift_count(), 1);
        assert_eq!(
            outbound.try_recv().unwrap().topic,
            "warehouse/created/k1"
        );

        tick(&mut app);
        assert_eq!(app.world.resource::<WarehouseRes>().forklift_count(), 2);
        let topics = outbound.try_iter().map(|m| m.topic).collect::<Vec<_>>();
        assert!(topics.contains(&"warehouse/created/k2".to_owned()));
    }

    #[test]
    fn test_create_at_capacity_sends_no_ack() {
        let (mut app, inbound, outbound) = app();
        {
            let mut warehouse = app.world.resource_mut::<WarehouseRes>();
            for i in 0..10 {
                warehouse
                    .spawn_forklift(&format!("Bot{i}"), Some(&format!("token{i}")), None)
                    .unwrap();
            }
        }

        command(&inbound, "create", "name=Late,key=k1");
        tick(&mut app);

        let warehouse = app.world.resource::<WarehouseRes>();
        assert_eq!(warehouse.forklift_count(), 10);
        assert_eq!(warehouse.find_forklift_by_name("Late"), None);
        assert!(outbound
            .try_iter()
            .all(|message| !message.topic.starts_with("warehouse/created/")));
    }

    #[test]
    fn test_token_file_survives_unsafe_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.csv");
        let (mut app, inbound, _outbound) = app();
        app.insert_resource(ProtocolRes::from(ControlProtocol::new(
            TokenBook::load(&path).unwrap(),
            10,
        )));

        command(&inbound, "create", "name=Bo\nb,key=k1");
        tick(&mut app);
        assert_eq!(app.world.resource::<WarehouseRes>().forklift_count(), 0);

        command(&inbound, "create", "name=Bob,key=k2");
        tick(&mut app);
        assert_eq!(app.world.resource::<WarehouseRes>().forklift_count(), 1);

        let book = TokenBook::load(&path).unwrap();
        assert_eq!(book.len(), 1);
        assert!(book.token_for("Bob").is_some());
    }
}

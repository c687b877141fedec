use std::{env, sync::Arc};

use bevy::{app::ScheduleRunnerPlugin, log::LogPlugin, prelude::*};


mod config;
mod controller;
mod domain;
mod error;
mod protocol;
mod resource;
mod simulator;
mod transport;

use config::SimulatorConfig;
use domain::Warehouse;
use error::SimulatorError;
use protocol::{ControlProtocol, TokenBook};
use resource::{ProtocolRes, WarehouseRes};

fn main() -> Result<(), SimulatorError> {
    let config = SimulatorConfig::load(env::args())?;
    let tick = config.simulation.tick_period()?;

    let mut app = App::new();
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(tick)))
        .add_plugins(LogPlugin {
            level: config.logging.level()?,
            filter: config.logging.filter.clone(),
            ..default()
        })
        .insert_resource(Time::<Fixed>::from_duration(tick));

    let mut warehouse = Warehouse::furnished(
        config.arena,
        config.layout.clone(),
        Arc::new(config.kinematics.clone()),
    )?;
    let pilot = warehouse.spawn_forklift(
        &config.autopilot.name,
        None,
        Some((
            config.autopilot.sensor_radius,
            config.autopilot.long_sensor_radius,
        )),
    )?;
    info!(
        "Warehouse of {}x{} with {} containers, {} driven by the autopilot",
        config.arena.width,
        config.arena.height,
        warehouse.container_count(),
        pilot
    );

    let token_book = TokenBook::load(&config.simulation.token_file)?;
    info!(
        "Loaded {} tokens from {}",
        token_book.len(),
        config.simulation.token_file.display()
    );

    app.insert_resource(WarehouseRes::from(warehouse))
        .insert_resource(ProtocolRes::from(ControlProtocol::new(
            token_book,
            config.simulation.max_forklifts,
        )))
        .add_plugins(controller::Controller {
            broker: config.broker.clone(),
        })
        .add_plugins(simulator::Simulator {
            simulation: config.simulation.clone(),
            autopilot: config.autopilot.clone(),
            topic_prefix: config.broker.topic_prefix.clone(),
        })
        .run();

    Ok(())
}

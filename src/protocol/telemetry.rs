//! Outbound payloads. Snapshots are JSON, the create acknowledgement uses the same `key=value`
//! format as the inbound commands.

use serde::Serialize;

use super::OutboundMessage;
use crate::domain::{Forklift, HasCollision, MovementDirection, Shape, Warehouse};

/// Builds the full topic names below the configured prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_owned(),
        }
    }

    /// Wildcard filter matching every topic below the prefix.
    pub fn subscription(&self) -> String {
        format!("{}/#", self.prefix)
    }

    /// Topic relative to the prefix, `None` for foreign topics.
    pub fn strip<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    fn topic(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.prefix)
    }

    pub fn created_ack(&self, key: &str, name: &str, token: &str) -> OutboundMessage {
        OutboundMessage {
            topic: self.topic(&format!("created/{key}")),
            payload: format!("name={name},token={token}"),
            retain: false,
        }
    }

    pub fn world_status(&self, status: &WorldStatus) -> serde_json::Result<OutboundMessage> {
        Ok(OutboundMessage {
            topic: self.topic("status"),
            payload: serde_json::to_string(status)?,
            retain: false,
        })
    }

    pub fn forklift_status(
        &self,
        token: &str,
        status: &ForkliftStatus,
    ) -> serde_json::Result<OutboundMessage> {
        Ok(OutboundMessage {
            topic: self.topic(&format!("{token}/status")),
            payload: serde_json::to_string(status)?,
            retain: false,
        })
    }

    pub fn settings(&self, settings: &Settings) -> serde_json::Result<OutboundMessage> {
        Ok(OutboundMessage {
            topic: self.topic("settings"),
            payload: serde_json::to_string(settings)?,
            retain: true,
        })
    }

    /// Status of every remote forklift changed since the last call. Clears their dirty flags.
    pub fn dirty_forklift_statuses(
        &self,
        warehouse: &mut Warehouse,
    ) -> serde_json::Result<Vec<OutboundMessage>> {
        let mut messages = vec![];
        for (_, forklift) in warehouse.forklifts_mut() {
            if !forklift.is_remote() || !forklift.take_dirty() {
                continue;
            }
            if let Some(token) = forklift.session_token() {
                messages.push(self.forklift_status(token, &ForkliftStatus::of(forklift))?);
            }
        }
        Ok(messages)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForkliftStatus<'a> {
    pub name: &'a str,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub velocity: f64,
    pub direction: MovementDirection,
    pub score: i64,
    pub loaded: bool,
}

impl<'a> ForkliftStatus<'a> {
    pub fn of(forklift: &'a Forklift) -> Self {
        let kinematics = forklift.kinematics();
        Self {
            name: forklift.name(),
            x: forklift.position().x(),
            y: forklift.position().y(),
            heading: forklift.heading().to_deg(),
            velocity: kinematics.movement_velocity(),
            direction: kinematics.movement_direction(),
            score: forklift.score(),
            loaded: forklift.is_loaded(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContainerStatus {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorldStatus<'a> {
    pub tick: u64,
    /// Milliseconds since the unix epoch.
    pub timestamp: u64,
    pub forklifts: Vec<ForkliftStatus<'a>>,
    pub containers: Vec<ContainerStatus>,
    pub scoreboard: String,
}

impl<'a> WorldStatus<'a> {
    pub fn of(warehouse: &'a Warehouse, tick: u64, timestamp: u64) -> Self {
        let forklifts = warehouse
            .forklifts()
            .map(|(_, forklift)| ForkliftStatus::of(forklift))
            .collect::<Vec<_>>();
        let scoreboard = forklifts
            .iter()
            .map(|status| format!("{}: {}", status.name, status.score))
            .collect::<Vec<_>>()
            .join(", ");
        let containers = warehouse
            .containers()
            .map(|(_, container)| ContainerStatus {
                x: container.position().x(),
                y: container.position().y(),
            })
            .collect();
        Self {
            tick,
            timestamp,
            forklifts,
            containers,
            scoreboard,
        }
    }
}

/// Axis aligned rectangle given by its centre.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Footprint {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Shape> for Footprint {
    fn from(shape: Shape) -> Self {
        let (width, height) = shape.extent();
        Self {
            x: shape.position().x(),
            y: shape.position().y(),
            width,
            height,
        }
    }
}

/// Static layout published once so that clients can draw the warehouse.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Settings {
    pub width: f64,
    pub height: f64,
    pub shelves: Vec<Footprint>,
    pub drop_zones: Vec<Footprint>,
}

impl Settings {
    pub fn of(warehouse: &Warehouse) -> Self {
        let arena = warehouse.arena();
        Self {
            width: arena.width,
            height: arena.height,
            shelves: warehouse
                .shelves()
                .map(|(_, shelf)| shelf.shape().into())
                .collect(),
            drop_zones: warehouse
                .drop_zones()
                .map(|(_, zone)| zone.shape().into())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::{
        domain::Position,
        tests::{empty_warehouse, forklift_at},
    };

    #[rstest]
    #[case::child("warehouse/created/k1", Some("created/k1"))]
    #[case::prefix_only("warehouse", None)]
    #[case::similar_prefix("warehouses/create", None)]
    #[case::foreign("other/create", None)]
    fn test_topics_strip(#[case] topic: &str, #[case] expected: Option<&str>) {
        assert_eq!(Topics::new("warehouse/").strip(topic), expected);
    }

    #[test]
    fn test_created_ack() {
        let message = Topics::new("warehouse").created_ack("k1", "Bot1", "abc");
        assert_eq!(
            message,
            OutboundMessage {
                topic: "warehouse/created/k1".to_owned(),
                payload: "name=Bot1,token=abc".to_owned(),
                retain: false,
            }
        );
    }

    #[test]
    fn test_world_status_payload() {
        let mut warehouse = empty_warehouse();
        warehouse.add_forklift(forklift_at(100.0, 200.0));
        let id = warehouse.add_forklift(forklift_at(300.0, 200.0).with_session_token("t1"));
        warehouse.forklift_mut(id).unwrap().add_delivery();
        warehouse.add_container(Position::new(50.0, 60.0));

        let status = WorldStatus::of(&warehouse, 42, 1_700_000_000_000);
        assert_eq!(status.scoreboard, "Bot: 0, Bot: 10");
        let message = Topics::new("warehouse").world_status(&status).unwrap();
        assert_eq!(message.topic, "warehouse/status");
        assert!(!message.retain);
        assert_snapshot!(message.payload, @r#"{"tick":42,"timestamp":1700000000000,"forklifts":[{"name":"Bot","x":100.0,"y":200.0,"heading":0.0,"velocity":0.0,"direction":"forward","score":0,"loaded":false},{"name":"Bot","x":300.0,"y":200.0,"heading":0.0,"velocity":0.0,"direction":"forward","score":10,"loaded":false}],"containers":[{"x":50.0,"y":60.0}],"scoreboard":"Bot: 0, Bot: 10"}"#);
    }

    #[test]
    fn test_dirty_forklift_statuses_only_remote_and_once() {
        let mut warehouse = empty_warehouse();
        let local = warehouse.add_forklift(forklift_at(100.0, 200.0));
        let remote = warehouse.add_forklift(forklift_at(300.0, 200.0).with_session_token("t1"));
        warehouse.forklift_mut(local).unwrap().load();
        warehouse.forklift_mut(remote).unwrap().load();
        let topics = Topics::new("warehouse");

        let messages = topics.dirty_forklift_statuses(&mut warehouse).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "warehouse/t1/status");
        assert_snapshot!(messages[0].payload, @r#"{"name":"Bot","x":300.0,"y":200.0,"heading":0.0,"velocity":0.0,"direction":"forward","score":0,"loaded":true}"#);

        assert!(topics
            .dirty_forklift_statuses(&mut warehouse)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_settings_payload() {
        let mut warehouse = empty_warehouse();
        warehouse.add_shelf(Position::new(60.0, 60.0));
        warehouse.add_drop_zone(Position::new(400.0, 300.0));

        let message = Topics::new("warehouse")
            .settings(&Settings::of(&warehouse))
            .unwrap();
        assert_eq!(message.topic, "warehouse/settings");
        assert!(message.retain);
        assert_snapshot!(message.payload, @r#"{"width":800.0,"height":600.0,"shelves":[{"x":60.0,"y":60.0,"width":21.0,"height":105.0}],"drop_zones":[{"x":400.0,"y":300.0,"width":75.0,"height":58.0}]}"#);
    }
}

use std::collections::BTreeMap;

use bevy::log::debug;

use super::ProtocolError;

/// Command decoded from an inbound topic and its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Create {
        name: String,
        key: String,
    },
    Control {
        token: String,
        steering: Option<f64>,
        throttle: Option<f64>,
    },
    Remove {
        token: String,
    },
}

impl Command {
    /// Decodes a message received on `topic`, given without prefix.
    ///
    /// Returns `Ok(None)` for the topics the simulator publishes itself, which come back to it
    /// through the wildcard subscription.
    pub fn decode(topic: &str, payload: &str) -> Result<Option<Self>, ProtocolError> {
        let segments = topic.split('/').collect::<Vec<_>>();
        let command = match segments.as_slice() {
            ["create"] => {
                let fields = Fields::parse(payload)?;
                Self::Create {
                    name: fields.text("name", &[])?.to_owned(),
                    key: fields.text("key", &['/', '+', '#'])?.to_owned(),
                }
            }
            [token, "control"] if !token.is_empty() => {
                let fields = Fields::parse(payload)?;
                for key in fields.keys().filter(|key| !matches!(*key, "r" | "m")) {
                    debug!("Ignoring control field {key:?} from {token}");
                }
                Self::Control {
                    token: token.to_string(),
                    steering: fields.number("r")?,
                    throttle: fields.number("m")?,
                }
            }
            [token, "remove"] if !token.is_empty() => Self::Remove {
                token: token.to_string(),
            },
            ["status" | "settings"] | ["created", _] | [_, "status"] => return Ok(None),
            _ => return Err(ProtocolError::UnknownTopic(topic.to_owned())),
        };
        Ok(Some(command))
    }
}

/// Comma separated `key=value` pairs. A repeated key keeps its last value.
#[derive(Debug, Default, PartialEq)]
pub struct Fields<'a>(BTreeMap<&'a str, &'a str>);

impl<'a> Fields<'a> {
    pub fn parse(payload: &'a str) -> Result<Self, ProtocolError> {
        let mut fields = BTreeMap::new();
        for field in payload.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| ProtocolError::MalformedField(field.to_owned()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ProtocolError::MalformedField(field.to_owned()));
            }
            fields.insert(key, value.trim());
        }
        Ok(Self(fields))
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.0.keys().copied()
    }

    /// Value of a field that must be present and non-empty.
    pub fn require(&self, key: &'static str) -> Result<&'a str, ProtocolError> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .ok_or(ProtocolError::MissingField(key))
    }

    /// Required value free of control characters and of the `forbidden` ones. Names are stored
    /// one per line in the token file and keys end up as a topic level.
    pub fn text(&self, key: &'static str, forbidden: &[char]) -> Result<&'a str, ProtocolError> {
        let value = self.require(key)?;
        if value
            .chars()
            .any(|c| c.is_control() || c == ',' || forbidden.contains(&c))
        {
            return Err(ProtocolError::MalformedField(format!("{key}={value}")));
        }
        Ok(value)
    }

    /// Optional finite number.
    pub fn number(&self, key: &str) -> Result<Option<f64>, ProtocolError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        match value.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(Some(number)),
            _ => Err(ProtocolError::InvalidNumber {
                field: key.to_owned(),
                value: value.to_owned(),
            }),
        }
    }
}

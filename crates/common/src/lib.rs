use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const RECEIVE_HOST_PROPERTY: &str = "receiveHost";
pub const RECEIVE_PORT_PROPERTY: &str = "receivePort";

/// Document served by the multi-master plugin at `status/json/`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusDocument {
    /// Milliseconds after which a peer's last heartbeat counts as stale.
    pub outdated_threshold: i64,
    #[serde(rename = "self")]
    pub self_peer: PeerInfo,
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
    #[serde(default)]
    pub recent_evicts: Vec<EvictRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId {
    pub string: String,
}

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self { string: id.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.string
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.string)
    }
}

/// A property value as the producer ships it: JSON text wrapped in an object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonProperty {
    pub string: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl JsonProperty {
    pub fn from_text(text: &str) -> Self {
        Self {
            string: serde_json::Value::String(text.to_string()).to_string(),
            type_name: Some("java.lang.String".to_string()),
        }
    }

    /// Second decode of the already-decoded document field.
    ///
    /// The producer encodes each property value to JSON before embedding it
    /// in a JSON document, so the inner text still carries its quoting. This
    /// looks like an upstream double-encoding bug; it is kept for
    /// compatibility. Strings display without quotes, anything else as its
    /// compact JSON text.
    pub fn decode_display(&self) -> Result<String, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(&self.string)?;
        Ok(match value {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    #[serde(default)]
    pub properties: BTreeMap<String, JsonProperty>,
}

impl PeerInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: PeerId::new(id),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_receive_address(mut self, host: &str, port: &str) -> Self {
        self.properties
            .insert(RECEIVE_HOST_PROPERTY.to_string(), JsonProperty::from_text(host));
        self.properties
            .insert(RECEIVE_PORT_PROPERTY.to_string(), JsonProperty::from_text(port));
        self
    }

    pub fn property_text(&self, name: &str) -> Result<String, DecodeError> {
        let property = self
            .properties
            .get(name)
            .ok_or_else(|| DecodeError::MissingProperty {
                peer: self.id.clone(),
                name: name.to_string(),
            })?;

        property
            .decode_display()
            .map_err(|err| DecodeError::MalformedProperty {
                peer: self.id.clone(),
                name: name.to_string(),
                reason: err.to_string(),
            })
    }

    pub fn receive_host(&self) -> Result<String, DecodeError> {
        self.property_text(RECEIVE_HOST_PROPERTY)
    }

    pub fn receive_port(&self) -> Result<String, DecodeError> {
        self.property_text(RECEIVE_PORT_PROPERTY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub peer: PeerInfo,
    /// Epoch milliseconds of the peer's latest heartbeat.
    pub last_seen: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvictRecord {
    pub plugin_name: String,
    pub cache_name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    MissingProperty {
        peer: PeerId,
        name: String,
    },
    MalformedProperty {
        peer: PeerId,
        name: String,
        reason: String,
    },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingProperty { peer, name } => {
                write!(f, "peer {peer} has no property \"{name}\"")
            }
            Self::MalformedProperty { peer, name, reason } => {
                write!(f, "peer {peer} property \"{name}\" is not valid JSON: {reason}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

pub const GRID_COLUMNS: usize = 5;
pub const GRID_SPACING: f64 = 50.0;
pub const SPAWN_HEIGHT: f64 = 10.0;

pub const PALETTE: [&str; 12] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#FFD93D", "#6BCF7F", "#C792EA",
    "#FF8C94", "#A8E6CF", "#FF6F91", "#5DADE2",
];

pub const UPDATE_TAG: &str = "update";

/// Axis label (`x`, `y`, `z`) to value. Partial maps are legal.
pub type Axes = HashMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn axes(x: f64, y: f64, z: f64) -> Axes {
    HashMap::from([
        ("x".to_string(), x),
        ("y".to_string(), y),
        ("z".to_string(), z),
    ])
}

pub fn zero_axes() -> Axes {
    axes(0.0, 0.0, 0.0)
}

/// Grid placement for a newly admitted player, derived from how many
/// players were registered before it.
pub fn spawn_position(registry_size: usize) -> Axes {
    let column = (registry_size % GRID_COLUMNS) as f64;
    let row = (registry_size / GRID_COLUMNS) as f64;
    axes(column * GRID_SPACING, SPAWN_HEIGHT, row * GRID_SPACING)
}

/// Reads one axis map out of a loosely typed payload field.
///
/// Anything that is not a JSON object yields an empty map. Inside an object,
/// entries that are not numbers are skipped.
pub fn axes_from_value(value: Option<&Value>) -> Axes {
    match value {
        Some(Value::Object(entries)) => entries
            .iter()
            .filter_map(|(axis, v)| v.as_f64().map(|n| (axis.clone(), n)))
            .collect(),
        _ => Axes::new(),
    }
}

/// The three motion fields reported by a client. Updates replace each field
/// as a whole; there is no per-axis merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    #[serde(default)]
    pub position: Axes,
    #[serde(default)]
    pub rotation: Axes,
    #[serde(default)]
    pub velocity: Axes,
}

impl Motion {
    pub fn spawn(registry_size: usize) -> Self {
        Self {
            position: spawn_position(registry_size),
            rotation: zero_axes(),
            velocity: zero_axes(),
        }
    }

    pub fn from_payload(data: &Map<String, Value>) -> Self {
        Self {
            position: axes_from_value(data.get("position")),
            rotation: axes_from_value(data.get("rotation")),
            velocity: axes_from_value(data.get("velocity")),
        }
    }
}

/// A player as seen by other clients: everything except the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(flatten)]
    pub motion: Motion,
    pub color: String,
}

/// Messages emitted by the relay. On the wire: `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    Init {
        id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        players: HashMap<PlayerId, PlayerView>,
    },
    PlayerJoined(PlayerView),
    PlayerUpdate {
        id: PlayerId,
        #[serde(flatten)]
        motion: Motion,
    },
    PlayerLeft {
        id: PlayerId,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Inbound envelope. Decoding is forgiving about the tag and a missing or
/// null payload, but a payload that is not an object is a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Update(Motion),
    /// Any other tag. Accepted and ignored by the relay.
    Other(String),
}

impl Envelope {
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn update(motion: &Motion) -> Self {
        let mut data = Map::new();
        for (field, values) in [
            ("position", &motion.position),
            ("rotation", &motion.rotation),
            ("velocity", &motion.velocity),
        ] {
            let entries = values
                .iter()
                .filter_map(|(axis, v)| {
                    serde_json::Number::from_f64(*v).map(|n| (axis.clone(), Value::Number(n)))
                })
                .collect();
            data.insert(field.to_string(), Value::Object(entries));
        }
        Self {
            kind: UPDATE_TAG.to_string(),
            data,
        }
    }

    pub fn into_client_message(self) -> ClientMessage {
        if self.kind == UPDATE_TAG {
            ClientMessage::Update(Motion::from_payload(&self.data))
        } else {
            ClientMessage::Other(self.kind)
        }
    }
}

//! Wire messages.
//!
//! Every frame on the connection is a single JSON object. Protocol fields use
//! a leading underscore (see [`fields`]); everything else is an entity
//! attribute.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::types::TransitionId;

/// Names of the protocol fields.
pub mod fields {
    /// Declared entity type (required).
    pub const SYNC_TYPE: &str = "_sync_type";
    /// Operation; `sync` when absent.
    pub const OPERATION: &str = "_sync_operation";
    /// Owner key of the entity.
    pub const OWNER: &str = "_sync_owner";
    /// Transition identifier, present only during a transition.
    pub const TRANSITION_ID: &str = "transition_id";
    /// Sequence numbers this message answers.
    pub const RESP_FOR: &str = "_resp_for";
    /// Sequence numbers acknowledged without payload.
    pub const NO_RESP_FOR: &str = "_no_resp_for";
    /// Presence flags the response as a rejection.
    pub const IS_ERROR: &str = "_sync_is_error";
    /// Bit flags; see [`FLAG_RESPONSE_REQUESTED`](super::FLAG_RESPONSE_REQUESTED).
    pub const FLAGS: &str = "_flags";
}

/// Attribute names starting with this marker are not merged onto entities.
pub const RESERVED_PREFIX: char = '_';

/// `_flags` bit requesting a correlated response.
pub const FLAG_RESPONSE_REQUESTED: u64 = 1;

/// Operations a client puts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Sync,
    Create,
    Forward,
    Delete,
    Transition,
    Clone,
}

impl Operation {
    /// Wire name of the operation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operation::Sync => "sync",
            Operation::Create => "create",
            Operation::Forward => "forward",
            Operation::Delete => "delete",
            Operation::Transition => "transition",
            Operation::Clone => "clone",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sync" => Ok(Operation::Sync),
            "create" => Ok(Operation::Create),
            "forward" => Ok(Operation::Forward),
            "delete" => Ok(Operation::Delete),
            "transition" => Ok(Operation::Transition),
            "clone" => Ok(Operation::Clone),
            other => Err(CoreError::UnknownOperation(other.to_string())),
        }
    }
}

/// A JSON object message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireMessage(Map<String, Value>);

impl WireMessage {
    /// Create a message for the given type.
    pub fn new(sync_type: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(fields::SYNC_TYPE.to_string(), Value::String(sync_type.into()));
        Self(map)
    }

    /// Wrap an existing object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Decode a frame. The frame must hold a JSON object.
    pub fn decode(frame: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(frame)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(CoreError::NotAnObject),
        }
    }

    /// Encode to a frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(&self.0).map_err(|e| CoreError::Encoding(e.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Set `_sync_operation`.
    pub fn with_operation(self, operation: Operation) -> Self {
        self.with(fields::OPERATION, Value::String(operation.as_str().to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// The declared type, if any.
    pub fn sync_type(&self) -> Option<&str> {
        self.0.get(fields::SYNC_TYPE).and_then(Value::as_str)
    }

    /// The declared type, failing when absent.
    pub fn require_sync_type(&self) -> Result<&str> {
        self.sync_type().ok_or(CoreError::MissingField(fields::SYNC_TYPE))
    }

    /// The operation name; `sync` when absent.
    pub fn operation(&self) -> &str {
        self.0
            .get(fields::OPERATION)
            .and_then(Value::as_str)
            .unwrap_or(Operation::Sync.as_str())
    }

    pub fn owner(&self) -> Option<&Value> {
        self.0.get(fields::OWNER).filter(|v| !v.is_null())
    }

    pub fn transition_id(&self) -> Option<TransitionId> {
        self.0
            .get(fields::TRANSITION_ID)
            .and_then(Value::as_str)
            .map(TransitionId::from_wire)
    }

    /// Sequence numbers this message responds to.
    pub fn resp_for(&self) -> Option<Vec<u64>> {
        self.sequence_list(fields::RESP_FOR)
    }

    /// Sequence numbers acknowledged without a payload.
    pub fn no_resp_for(&self) -> Option<Vec<u64>> {
        self.sequence_list(fields::NO_RESP_FOR)
    }

    /// Whether the server flagged this response as a rejection.
    pub fn is_error(&self) -> bool {
        self.0.contains_key(fields::IS_ERROR)
    }

    pub fn flags(&self) -> u64 {
        self.0.get(fields::FLAGS).and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn response_requested(&self) -> bool {
        self.flags() & FLAG_RESPONSE_REQUESTED != 0
    }

    // Sequence numbers may arrive as numbers or numeric strings.
    fn sequence_list(&self, field: &str) -> Option<Vec<u64>> {
        let items = self.0.get(field)?.as_array()?;
        Some(
            items
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                })
                .collect(),
        )
    }
}

impl From<Map<String, Value>> for WireMessage {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

//! Messages relayed between a client connection and its kernel

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of a session a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Sent by the user's connection, bound for the kernel
    Client,
    /// Emitted by the kernel, bound for the connection
    Kernel,
}

impl Origin {
    /// The side a message from this origin is delivered to
    pub fn opposite(self) -> Self {
        match self {
            Self::Client => Self::Kernel,
            Self::Kernel => Self::Client,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Kernel => "kernel",
        }
    }
}

/// A single relayed message. The body is opaque JSON to everything except
/// processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub origin: Origin,
    pub body: Value,
}

impl Message {
    pub fn new(origin: Origin, body: Value) -> Self {
        Self { origin, body }
    }

    pub fn from_client(body: Value) -> Self {
        Self::new(Origin::Client, body)
    }

    pub fn from_kernel(body: Value) -> Self {
        Self::new(Origin::Kernel, body)
    }

    /// The `type` field of the body, if it is a string
    pub fn msg_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    /// Set a top-level field, turning a non-object body into an object first
    pub fn set_field(&mut self, name: &str, value: Value) {
        if !self.body.is_object() {
            self.body = Value::Object(serde_json::Map::new());
        }
        if let Value::Object(map) = &mut self.body {
            map.insert(name.to_string(), value);
        }
    }
}

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Opaque caller token (a hotkey address). Only equality is meaningful.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One `(role, message)` entry of a chat-style payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Inbound request as handed over by the serving layer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncomingRequest {
    pub caller: Identity,
    pub payload: Vec<Message>,
    pub headers: BTreeMap<String, String>,
}

impl IncomingRequest {
    pub fn new(caller: impl Into<Identity>, payload: Vec<Message>) -> Self {
        Self {
            caller: caller.into(),
            payload,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Content hash of the payload. Callers and headers do not contribute, so
    /// identical messages from different callers collide on purpose.
    pub fn fingerprint(&self) -> Fingerprint {
        let encoded = serde_json::to_vec(&self.payload).unwrap_or_default();
        Fingerprint(blake3::hash(&encoded).into())
    }
}

/// Fixed-length blake3 digest of a serialized payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

use crate::ids::PackageName;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

///
/// Command
/// One addressed request to a companion app. Built per call and dropped once
/// its result has been consumed.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub action: String,
    pub source: PackageName,
    pub target: Option<PackageName>,
    pub target_uid: Option<u32>,
    pub payload: Map<String, Value>,
}

impl Command {
    pub fn new(source: PackageName, action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            source,
            target: None,
            target_uid: None,
            payload: Map::new(),
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: PackageName) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub const fn with_target_uid(mut self, uid: u32) -> Self {
        self.target_uid = Some(uid);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.action, self.source)?;
        if let Some(target) = &self.target {
            write!(f, " -> {target}")?;
        }
        if let Some(uid) = self.target_uid {
            write!(f, " (uid {uid})")?;
        }

        Ok(())
    }
}

///
/// RemoteError
/// An exception the companion app caught and serialized back.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RemoteError {
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

impl RemoteError {
    pub const MISSING_BROADCAST: &'static str = "MissingBroadcastException";

    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// The app waited for a broadcast that never arrived.
    #[must_use]
    pub fn is_missing_broadcast(&self) -> bool {
        self.kind
            .rsplit(['.', '$'])
            .next()
            .is_some_and(|simple| simple == Self::MISSING_BROADCAST)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_broadcast_matches_simple_class_name() {
        assert!(RemoteError::new("MissingBroadcastException", "").is_missing_broadcast());
        assert!(
            RemoteError::new("android.appenumeration.cts.MissingBroadcastException", "x")
                .is_missing_broadcast()
        );
        assert!(!RemoteError::new("NotMissingBroadcastException", "").is_missing_broadcast());
        assert!(!RemoteError::new("IllegalStateException", "").is_missing_broadcast());
    }

    #[test]
    fn display_includes_target() {
        let cmd = Command::new(PackageName::new("com.example.queries").unwrap(), "GET_INSTALLED")
            .with_target(PackageName::new("com.example.target").unwrap())
            .with_extra("flags", 0);

        assert_eq!(
            cmd.to_string(),
            "GET_INSTALLED via com.example.queries -> com.example.target"
        );
        assert_eq!(cmd.payload["flags"], 0);
    }
}

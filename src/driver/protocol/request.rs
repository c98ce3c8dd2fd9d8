use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Request frame: `[sequenceId, databaseName, methodName, [args...]]`
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub seq: i64,
    pub database: String,
    pub method: String,
    pub args: Vec<Value>,
}

/// A frame that could not be read as a request.
///
/// `seq` is set when the first element was still a usable sequence id, in
/// which case the sender can be answered on that id.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed request frame: {reason}")]
pub struct FrameError {
    pub seq: Option<i64>,
    pub reason: String,
}

impl FrameError {
    fn new(seq: Option<i64>, reason: impl Into<String>) -> Self {
        Self {
            seq,
            reason: reason.into(),
        }
    }
}

impl RequestFrame {
    pub fn new(
        seq: i64,
        database: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            seq,
            database: database.into(),
            method: method.into(),
            args,
        }
    }

    /// Read a request out of a decoded frame: exactly
    /// `[integer, string, string, array]`.
    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let Value::Array(items) = value else {
            return Err(FrameError::new(None, "frame must be an array"));
        };

        let seq = items.first().and_then(Value::as_i64);
        let Some(seq) = seq else {
            return Err(FrameError::new(None, "sequence id must be an integer"));
        };

        if items.len() != 4 {
            return Err(FrameError::new(
                Some(seq),
                format!("expected 4 elements, got {}", items.len()),
            ));
        }

        let mut items = items.into_iter().skip(1);
        let database = match items.next() {
            Some(Value::String(name)) => name,
            _ => return Err(FrameError::new(Some(seq), "database name must be a string")),
        };
        let method = match items.next() {
            Some(Value::String(name)) => name,
            _ => return Err(FrameError::new(Some(seq), "method name must be a string")),
        };
        let args = match items.next() {
            Some(Value::Array(args)) => args,
            _ => return Err(FrameError::new(Some(seq), "arguments must be an array")),
        };

        Ok(Self {
            seq,
            database,
            method,
            args,
        })
    }

    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::from(self.seq),
            Value::String(self.database.clone()),
            Value::String(self.method.clone()),
            Value::Array(self.args.clone()),
        ])
    }
}

impl Serialize for RequestFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.seq, &self.database, &self.method, &self.args).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RequestFrame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RequestFrame::from_value(value).map_err(serde::de::Error::custom)
    }
}

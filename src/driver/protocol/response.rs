use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::error::RpcError;

/// Response frame: `[sequenceId, [error, result]]`.
///
/// On success the error slot is `null`; on failure the result slot is.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub seq: i64,
    pub result: Result<Value, RpcError>,
}

impl ResponseFrame {
    pub fn new(seq: i64, result: Result<Value, RpcError>) -> Self {
        Self { seq, result }
    }

    pub fn ok(seq: i64, value: Value) -> Self {
        Self::new(seq, Ok(value))
    }

    pub fn error(seq: i64, err: RpcError) -> Self {
        Self::new(seq, Err(err))
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    pub fn rpc_error(&self) -> Option<&RpcError> {
        self.result.as_ref().err()
    }
}

impl Serialize for ResponseFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let outcome = match &self.result {
            Ok(value) => (None, Some(value)),
            Err(err) => (Some(err), None),
        };
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.seq)?;
        tuple.serialize_element(&outcome)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for ResponseFrame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (seq, (error, value)): (i64, (Option<RpcError>, Option<Value>)) =
            Deserialize::deserialize(deserializer)?;
        let result = match error {
            Some(err) => Err(err),
            None => Ok(value.unwrap_or(Value::Null)),
        };
        Ok(Self { seq, result })
    }
}

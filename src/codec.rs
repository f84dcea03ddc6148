//! JSON-RPC 2.0 envelopes.
//!
//! Params travel as a list of independently encoded values; the server keeps
//! them as raw JSON until it knows which type each position expects.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt;
use thiserror::Error;

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Code used for every error returned by a handler.
pub const APPLICATION_ERROR: i32 = 1;

const RESERVED: std::ops::RangeInclusive<i32> = -32768..=-32000;

/// The `"jsonrpc": "2.0"` marker. Any other value fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version;

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        if version == "2.0" {
            Ok(Version)
        } else {
            Err(de::Error::custom(format!(
                "unsupported jsonrpc version {version:?}"
            )))
        }
    }
}

/// A call or, without `id`, a notification.
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Box<RawValue>>,
}

impl Request {
    pub fn new(id: Option<i64>, method: impl Into<String>, params: Vec<Box<RawValue>>) -> Self {
        Self {
            jsonrpc: Version,
            id,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A response frame. The server builds it with a raw `result`; the client
/// decodes it straight into the operation's declared value type.
#[derive(Debug, Serialize, Deserialize)]
pub struct Response<R = Box<RawValue>> {
    pub jsonrpc: Version,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl<R> Response<R> {
    pub fn success(id: i64, result: Option<R>) -> Self {
        Self {
            jsonrpc: Version,
            id,
            result,
            error: None,
        }
    }

    pub fn failure(id: i64, error: RpcError) -> Self {
        Self {
            jsonrpc: Version,
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl<R: Serialize> Response<R> {
    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// The `error` member of a response. Only `code` and `message` cross the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn parse(message: impl fmt::Display) -> Self {
        Self::new(PARSE_ERROR, message.to_string())
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method '{method}' not found"))
    }

    pub fn invalid_params(expected: usize, got: usize) -> Self {
        Self::new(
            INVALID_PARAMS,
            format!("wrong param count: expected {expected}, got {got}"),
        )
    }

    pub fn application(message: String) -> Self {
        Self::new(APPLICATION_ERROR, message)
    }

    /// Whether the code lies in the range JSON-RPC keeps for itself.
    pub fn is_reserved(&self) -> bool {
        RESERVED.contains(&self.code)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_reserved() {
            write!(f, "RPC error ({}): {}", self.code, self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for RpcError {}

/// A body that is not a valid request, with whatever `id` could be salvaged.
#[derive(Debug, Error)]
#[error("malformed request: {source}")]
pub struct DecodeFailure {
    pub id: Option<i64>,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Deserialize)]
struct IdProbe {
    #[serde(default)]
    id: Option<i64>,
}

/// Decodes a request envelope.
///
/// When the body is well-formed JSON but not a valid request, the `id` is read
/// on its own so the caller can still be answered.
pub fn decode_request(body: &[u8]) -> Result<Request, DecodeFailure> {
    serde_json::from_slice(body).map_err(|source| DecodeFailure {
        id: serde_json::from_slice::<IdProbe>(body)
            .ok()
            .and_then(|probe| probe.id),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        let params = vec![RawValue::from_string("2".into()).unwrap()];
        let call = Request::new(Some(7), "Calc.Add", params);
        let value: serde_json::Value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 7, "method": "Calc.Add", "params": [2]})
        );

        let note = Request::new(None, "Calc.Log", Vec::new());
        assert!(note.is_notification());
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "Calc.Log", "params": []})
        );
    }

    #[test]
    fn response_omits_absent_members() {
        let ok = Response::<Box<RawValue>>::success(3, None);
        assert_eq!(ok.to_vec().unwrap(), br#"{"jsonrpc":"2.0","id":3}"#);

        let failed = Response::<Box<RawValue>>::failure(4, RpcError::method_not_found("X.Y"));
        let value: serde_json::Value = serde_json::from_slice(&failed.to_vec().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 4, "error": {"code": -32601, "message": "method 'X.Y' not found"}})
        );
    }

    #[test]
    fn client_side_decodes_typed_result() {
        let resp: Response<Vec<u32>> =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":9,"result":[1,2,3]}"#).unwrap();
        assert_eq!(resp.id, 9);
        assert_eq!(resp.result, Some(vec![1, 2, 3]));
        assert!(resp.error.is_none());
    }

    #[test]
    fn error_frame_decodes_into_any_value_type() {
        #[derive(Debug, Deserialize)]
        struct Point {
            #[allow(dead_code)]
            x: i32,
        }

        let resp: Response<Point> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":1,"message":"boom"}}"#,
        )
        .unwrap();
        assert!(resp.result.is_none());
        assert_eq!(resp.error, Some(RpcError::application("boom".into())));
    }

    #[test]
    fn params_stay_raw_until_typed() {
        let req = decode_request(br#"{"jsonrpc":"2.0","id":1,"method":"A.B","params":[{"x":1}, "s"]}"#)
            .unwrap();
        assert_eq!(req.params[0].get(), r#"{"x":1}"#);
        assert_eq!(req.params[1].get(), r#""s""#);
    }

    #[test]
    fn decode_failure_salvages_id() {
        let err = decode_request(br#"{"jsonrpc":"1.0","id":5,"method":"A.B"}"#).unwrap_err();
        assert_eq!(err.id, Some(5));

        let err = decode_request(br#"{"jsonrpc":"2.0","id":6,"method":17}"#).unwrap_err();
        assert_eq!(err.id, Some(6));

        let err = decode_request(br#"{"jsonrpc":"2.0","id":6,"#).unwrap_err();
        assert_eq!(err.id, None);
    }

    #[test]
    fn rpc_error_display() {
        assert_eq!(
            RpcError::invalid_params(2, 1).to_string(),
            "RPC error (-32602): wrong param count: expected 2, got 1"
        );
        assert_eq!(RpcError::application("boom".into()).to_string(), "boom");
        assert!(!RpcError::application("boom".into()).is_reserved());
    }
}

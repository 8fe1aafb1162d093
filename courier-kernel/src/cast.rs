//! Response casting.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{KernelError, RawResponse, ResponseType, Result};

/// Caller-visible result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum CastResult<T = Value> {
    /// The transport response, untouched.
    Raw(RawResponse),
    /// The body parsed as a loosely-typed JSON object.
    Map(Map<String, Value>),
    /// The body deserialized into the caller's type.
    Object(T),
}

impl<T> CastResult<T> {
    /// Raw response, if this is a raw result.
    pub fn as_raw(&self) -> Option<&RawResponse> {
        match self {
            Self::Raw(response) => Some(response),
            _ => None,
        }
    }

    /// Decoded map, if this is a map result.
    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Consume and return the raw response.
    pub fn into_raw(self) -> Option<RawResponse> {
        match self {
            Self::Raw(response) => Some(response),
            _ => None,
        }
    }

    /// Consume and return the decoded map.
    pub fn into_map(self) -> Option<Map<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Consume and return the typed value.
    pub fn into_object(self) -> Option<T> {
        match self {
            Self::Object(value) => Some(value),
            _ => None,
        }
    }
}

/// Converts transport responses into [`CastResult`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseCaster;

impl ResponseCaster {
    /// Cast `response` according to `response_type`.
    ///
    /// Decoding borrows the buffered body; nothing is returned on failure.
    pub fn cast<T: DeserializeOwned>(
        &self,
        response: RawResponse,
        response_type: ResponseType,
    ) -> Result<CastResult<T>> {
        match response_type {
            ResponseType::Raw => Ok(CastResult::Raw(response)),
            ResponseType::Map => Self::to_map(&response).map(CastResult::Map),
            ResponseType::Object => response.json::<T>().map(CastResult::Object),
        }
    }

    /// Parse the body as a JSON object.
    pub fn to_map(response: &RawResponse) -> Result<Map<String, Value>> {
        match response.json::<Value>() {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(KernelError::Decode {
                target: ResponseType::Map.as_str().to_string(),
                message: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
            Err(KernelError::Decode { message, .. }) => Err(KernelError::Decode {
                target: ResponseType::Map.as_str().to_string(),
                message,
            }),
            Err(e) => Err(e),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, StatusCode};
    use serde::Deserialize;
    use url::Url;

    #[derive(Debug, Deserialize, PartialEq)]
    struct MenuResponse {
        errcode: i64,
        errmsg: String,
    }

    fn response(status: StatusCode, body: &'static str) -> RawResponse {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace", HeaderValue::from_static("t-1"));
        RawResponse::new(
            status,
            headers,
            Bytes::from_static(body.as_bytes()),
            Url::parse("https://api.example.com/cgi-bin/menu/get").unwrap(),
        )
    }

    #[test]
    fn test_raw_is_untouched() {
        let original = response(StatusCode::BAD_GATEWAY, "not json at all");
        let result: CastResult = ResponseCaster
            .cast(original.clone(), ResponseType::Raw)
            .unwrap();

        let raw = result.into_raw().unwrap();
        assert_eq!(raw, original);
        assert_eq!(raw.text().unwrap(), "not json at all");
        assert_eq!(raw.text().unwrap(), "not json at all");
    }

    #[test]
    fn test_map_decoding() {
        let result: CastResult = ResponseCaster
            .cast(
                response(StatusCode::OK, r#"{"errcode":0,"errmsg":"ok"}"#),
                ResponseType::Map,
            )
            .unwrap();
        let map = result.into_map().unwrap();
        assert_eq!(map["errmsg"], "ok");
    }

    #[test]
    fn test_object_decoding() {
        let result: CastResult<MenuResponse> = ResponseCaster
            .cast(
                response(StatusCode::OK, r#"{"errcode":40013,"errmsg":"invalid appid"}"#),
                ResponseType::Object,
            )
            .unwrap();
        assert_eq!(
            result.into_object(),
            Some(MenuResponse {
                errcode: 40013,
                errmsg: "invalid appid".to_string()
            })
        );
    }

    #[test]
    fn test_decode_failures() {
        let err = ResponseCaster
            .cast::<Value>(response(StatusCode::OK, "<xml/>"), ResponseType::Map)
            .unwrap_err();
        assert!(err.is_decode());

        let err = ResponseCaster
            .cast::<Value>(response(StatusCode::OK, "[1,2]"), ResponseType::Map)
            .unwrap_err();
        assert!(err.to_string().contains("an array"));

        let err = ResponseCaster
            .cast::<MenuResponse>(response(StatusCode::OK, r#"{"errcode":"x"}"#), ResponseType::Object)
            .unwrap_err();
        assert!(err.is_decode());
    }
}

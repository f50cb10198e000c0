//! JSON frames exchanged with the monitoring server.
//!
//! One frame is one JSON object. Outbound frames always carry `action` and
//! `request_id` alongside the action's parameters. Inbound frames are parsed
//! into an [`InboundMessage`]; when one carries a `request_id` that matches
//! an outstanding request, its body becomes that request's [`Response`].

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{error::ClientError, identifier::RequestId};

/// Key naming the action an outbound frame invokes.
pub const ACTION_KEY: &str = "action";
/// Key carrying the correlation identifier in both directions.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Errors raised while parsing an inbound frame.
///
/// Malformed frames are logged and dropped; they never close the connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame was not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame was valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
}

/// A request frame ready to be written to the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundFrame {
    fields: Map<String, Value>,
}

impl OutboundFrame {
    /// Build a frame for `action` carrying `params` as additional fields.
    ///
    /// `params` must serialize to a JSON object or `null`. The reserved keys
    /// `action` and `request_id` are always set from the arguments, even if
    /// `params` carries its own values for them.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Serialize`] if `params` fails to serialize and
    /// [`ClientError::InvalidParams`] if it is not an object.
    ///
    /// # Examples
    ///
    /// ```
    /// use netview::{OutboundFrame, RequestId};
    /// use serde_json::json;
    ///
    /// let frame =
    ///     OutboundFrame::new("get_ports", RequestId::from("r1"), json!({"device": 7}))
    ///         .expect("object params");
    /// let text = frame.encode().expect("encode");
    /// let value: serde_json::Value = serde_json::from_str(&text).expect("json");
    /// assert_eq!(value["action"], "get_ports");
    /// assert_eq!(value["request_id"], "r1");
    /// assert_eq!(value["device"], 7);
    /// ```
    pub fn new<P: Serialize>(
        action: &str,
        request_id: RequestId,
        params: P,
    ) -> Result<Self, ClientError> {
        let mut fields = match serde_json::to_value(params) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(_) => return Err(ClientError::InvalidParams),
            Err(e) => return Err(ClientError::Serialize(e.into())),
        };
        fields.insert(ACTION_KEY.to_owned(), Value::String(action.to_owned()));
        fields.insert(
            REQUEST_ID_KEY.to_owned(),
            Value::String(request_id.as_str().to_owned()),
        );
        Ok(Self { fields })
    }

    /// Return the action name.
    #[must_use]
    pub fn action(&self) -> Option<&str> { self.fields.get(ACTION_KEY).and_then(Value::as_str) }

    /// Render the frame as a single line of JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Serialize`] if encoding fails.
    pub fn encode(&self) -> Result<String, ClientError> {
        serde_json::to_string(&self.fields).map_err(|e| ClientError::Serialize(e.into()))
    }
}

/// A parsed inbound frame.
///
/// Every parsed message is fanned out to message observers, whether or not it
/// answered a request.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    request_id: Option<RequestId>,
    body: Map<String, Value>,
}

impl InboundMessage {
    /// Parse a text frame.
    ///
    /// A `request_id` that is not a JSON string is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] if the text is not a JSON object.
    ///
    /// # Examples
    ///
    /// ```
    /// use netview::InboundMessage;
    ///
    /// let msg = InboundMessage::parse(r#"{"type":"alarm","device":3}"#).expect("object");
    /// assert!(msg.request_id().is_none());
    /// assert_eq!(msg.get("type").and_then(|v| v.as_str()), Some("alarm"));
    /// ```
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let Value::Object(body) = serde_json::from_str(text)? else {
            return Err(FrameError::NotAnObject);
        };
        let request_id = body
            .get(REQUEST_ID_KEY)
            .and_then(Value::as_str)
            .map(RequestId::from);
        Ok(Self { request_id, body })
    }

    /// Correlation identifier carried by the message, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> { self.request_id.as_ref() }

    /// Look up a field of the message body.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> { self.body.get(key) }

    /// Borrow the full message body.
    #[must_use]
    pub fn body(&self) -> &Map<String, Value> { &self.body }

    /// Copy the body into a [`Response`].
    #[must_use]
    pub fn to_response(&self) -> Response { Response(self.body.clone()) }
}

/// Verbatim server reply to a request.
///
/// The success indicator and payload fields are defined by the application,
/// not by this crate; the accessors cover the conventional `success`, `data`
/// and `error` keys.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Response(Map<String, Value>);

impl Response {
    /// The `success` flag, when present and boolean.
    #[must_use]
    pub fn success(&self) -> Option<bool> { self.0.get("success").and_then(Value::as_bool) }

    /// The `data` payload, when present.
    #[must_use]
    pub fn data(&self) -> Option<&Value> { self.0.get("data") }

    /// The `error` payload, when present.
    #[must_use]
    pub fn error(&self) -> Option<&Value> { self.0.get("error") }

    /// Look up any field of the reply.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> { self.0.get(key) }

    /// Borrow the reply object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> { &self.0 }

    /// Take ownership of the reply object.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> { self.0 }

    /// Deserialize the whole reply into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Deserialize`] if the reply does not match `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        serde_json::from_value(Value::Object(self.0)).map_err(|e| ClientError::Deserialize(e.into()))
    }
}

impl From<Map<String, Value>> for Response {
    fn from(value: Map<String, Value>) -> Self { Self(value) }
}

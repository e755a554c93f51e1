//! Socket.IO v4 text packets carried over an Engine.IO v4 websocket.

use crate::ServiceError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Engine.IO `0{sid, pingInterval, ...}`
    Open(Value),
    /// Engine.IO `1`
    Close,
    /// Engine.IO `2`
    Ping,
    /// Engine.IO `3`
    Pong,
    /// Engine.IO `6`
    Noop,
    /// Socket.IO `40{...}`
    Connect(Option<Value>),
    /// Socket.IO `41`
    Disconnect,
    /// Socket.IO `42["event", payload]`
    Event { name: String, payload: Value },
    /// Socket.IO `44{message}`
    ConnectError(String),
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, ServiceError> {
        let mut chars = text.chars();
        let engine = chars
            .next()
            .ok_or_else(|| ServiceError::ParseError("Empty frame".to_string()))?;
        let rest = chars.as_str();

        match engine {
            '0' => Ok(Frame::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Frame::Close),
            '2' => Ok(Frame::Ping),
            '3' => Ok(Frame::Pong),
            '6' => Ok(Frame::Noop),
            '4' => Self::parse_socket(rest),
            other => Err(ServiceError::ParseError(format!(
                "Unsupported engine packet type {}",
                other
            ))),
        }
    }

    fn parse_socket(text: &str) -> Result<Self, ServiceError> {
        let mut chars = text.chars();
        let packet = chars
            .next()
            .ok_or_else(|| ServiceError::ParseError("Empty socket packet".to_string()))?;
        let body = strip_namespace_and_ack(chars.as_str());

        match packet {
            '0' => {
                if body.is_empty() {
                    Ok(Frame::Connect(None))
                } else {
                    Ok(Frame::Connect(Some(serde_json::from_str(body)?)))
                }
            }
            '1' => Ok(Frame::Disconnect),
            '2' => {
                let mut items = match serde_json::from_str::<Value>(body)? {
                    Value::Array(items) => items.into_iter(),
                    _ => {
                        return Err(ServiceError::ParseError(
                            "Event packet is not an array".to_string(),
                        ));
                    }
                };
                let name = match items.next() {
                    Some(Value::String(name)) => name,
                    _ => {
                        return Err(ServiceError::ParseError(
                            "Event packet without a name".to_string(),
                        ));
                    }
                };
                Ok(Frame::Event {
                    name,
                    payload: items.next().unwrap_or(Value::Null),
                })
            }
            '4' => {
                let message = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| body.to_string());
                Ok(Frame::ConnectError(message))
            }
            other => Err(ServiceError::ParseError(format!(
                "Unsupported socket packet type {}",
                other
            ))),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Frame::Open(value) => format!("0{}", value),
            Frame::Close => "1".to_string(),
            Frame::Ping => "2".to_string(),
            Frame::Pong => "3".to_string(),
            Frame::Noop => "6".to_string(),
            Frame::Connect(None) => "40".to_string(),
            Frame::Connect(Some(auth)) => format!("40{}", auth),
            Frame::Disconnect => "41".to_string(),
            Frame::Event { name, payload } => {
                format!("42{}", Value::Array(vec![Value::String(name.clone()), payload.clone()]))
            }
            Frame::ConnectError(message) => {
                format!("44{}", serde_json::json!({ "message": message }))
            }
        }
    }
}

/// Drops a `/namespace,` prefix and an ack id, both unused on the default namespace.
fn strip_namespace_and_ack(body: &str) -> &str {
    let body = if body.starts_with('/') {
        body.split_once(',').map(|(_, rest)| rest).unwrap_or("")
    } else {
        body
    };
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

//! Protocol response types

use bytes::{BufMut, BytesMut};
use serde::Serialize;

/// A response frame
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// +OK [message]
    Ok(Option<String>),

    /// -ERR <code> <message>
    Error { code: String, message: String },

    /// $<length>\r\n<data>
    Bulk(Vec<u8>),

    /// PONG
    Pong,
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(None)
    }

    pub fn ok_with_message(msg: impl Into<String>) -> Self {
        Response::Ok(Some(msg.into()))
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Response::Bulk(data.into())
    }

    /// Bulk frame carrying `value` serialized as JSON
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(data) => Response::Bulk(data),
            Err(e) => Response::error("INTERNAL", e.to_string()),
        }
    }

    pub fn pong() -> Self {
        Response::Pong
    }

    /// Encode the response to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the response into an existing buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Response::Ok(None) => {
                buf.put_slice(b"+OK\r\n");
            }
            Response::Ok(Some(msg)) => {
                buf.put_slice(b"+OK ");
                buf.put_slice(msg.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Response::Error { code, message } => {
                buf.put_slice(b"-ERR ");
                buf.put_slice(code.as_bytes());
                buf.put_slice(b" ");
                // keep the frame on one line
                buf.put_slice(message.replace(['\r', '\n'], " ").as_bytes());
                buf.put_slice(b"\r\n");
            }
            Response::Bulk(data) => {
                buf.put_slice(b"$");
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Response::Pong => {
                buf.put_slice(b"+PONG\r\n");
            }
        }
    }
}

//! coedit Transport Layer
//!
//! Provides network transport for coedit:
//! - TCP: one command per line
//! - WebSocket: one command per text frame, browser-compatible

pub mod handler;
pub mod tcp;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use handler::ConnectionHandler;
pub use tcp::TcpServer;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketServer;

/// Error type returned by the server accept loops
pub type ServerError = Box<dyn std::error::Error + Send + Sync>;

//! WebSocket transport for coedit

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coedit_core::SessionManager;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info};

use crate::handler::ConnectionHandler;
use crate::ServerError;

/// WebSocket Server for coedit
pub struct WebSocketServer {
    manager: Arc<SessionManager>,
    addr: SocketAddr,
    client_counter: AtomicU64,
    password: Option<String>,
}

impl WebSocketServer {
    pub fn new(manager: Arc<SessionManager>, addr: SocketAddr) -> Self {
        Self {
            manager,
            addr,
            client_counter: AtomicU64::new(0),
            password: None,
        }
    }

    /// Create a server with authentication required
    pub fn with_password(manager: Arc<SessionManager>, addr: SocketAddr, password: String) -> Self {
        Self {
            password: Some(password),
            ..Self::new(manager, addr)
        }
    }

    /// Start the WebSocket server
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "coedit WebSocket server listening");
        self.serve(listener).await
    }

    /// Accept connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let client_id = format!(
                        "ws:{}:{}",
                        peer_addr,
                        self.client_counter.fetch_add(1, Ordering::Relaxed)
                    );
                    let manager = self.manager.clone();
                    let password = self.password.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, client_id.clone(), manager, password).await {
                            error!(client = %client_id, error = %e, "WebSocket connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        client_id: String,
        manager: Arc<SessionManager>,
        password: Option<String>,
    ) -> Result<(), ServerError> {
        let ws_stream = accept_async(stream).await?;
        let (mut write, mut read) = ws_stream.split();

        info!(client = %client_id, "WebSocket client connected");

        let mut handler = match password {
            Some(pwd) => ConnectionHandler::with_auth(client_id.clone(), manager, pwd),
            None => ConnectionHandler::new(client_id.clone(), manager),
        };

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let mut data = text.into_bytes();
                    // Ensure line ending for parser
                    if !data.ends_with(b"\n") {
                        data.extend_from_slice(b"\r\n");
                    }

                    for response in handler.process(&data).await {
                        let encoded = response.encode();
                        let text = String::from_utf8_lossy(&encoded).to_string();
                        write.send(Message::Text(text)).await?;

                        if ConnectionHandler::is_goodbye(&response) {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
                Ok(Message::Binary(mut data)) => {
                    if !data.ends_with(b"\n") {
                        data.extend_from_slice(b"\r\n");
                    }

                    for response in handler.process(&data).await {
                        write.send(Message::Binary(response.encode().to_vec())).await?;

                        if ConnectionHandler::is_goodbye(&response) {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                }
                Ok(Message::Ping(data)) => {
                    write.send(Message::Pong(data)).await?;
                }
                Ok(Message::Close(_)) => {
                    info!(client = %client_id, "WebSocket client disconnected");
                    break;
                }
                Ok(other) => {
                    debug!(client = %client_id, ?other, "Ignoring WebSocket frame");
                }
                Err(e) => {
                    error!(client = %client_id, error = %e, "WebSocket read error");
                    break;
                }
            }
        }

        Ok(())
    }
}

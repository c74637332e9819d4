//! TCP transport for coedit

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coedit_core::SessionManager;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::handler::ConnectionHandler;
use crate::ServerError;

/// TCP Server for coedit
pub struct TcpServer {
    manager: Arc<SessionManager>,
    addr: SocketAddr,
    client_counter: AtomicU64,
    password: Option<String>,
}

impl TcpServer {
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

    /// Start the TCP server
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "coedit TCP server listening");
        self.serve(listener).await
    }

    /// Accept connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let client_id = format!(
                        "tcp:{}:{}",
                        peer_addr,
                        self.client_counter.fetch_add(1, Ordering::Relaxed)
                    );
                    let manager = self.manager.clone();
                    let password = self.password.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, client_id.clone(), manager, password).await {
                            error!(client = %client_id, error = %e, "Connection error");
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
        mut stream: TcpStream,
        client_id: String,
        manager: Arc<SessionManager>,
        password: Option<String>,
    ) -> Result<(), ServerError> {
        info!(client = %client_id, "Client connected");

        let mut handler = match password {
            Some(pwd) => ConnectionHandler::with_auth(client_id.clone(), manager, pwd),
            None => ConnectionHandler::new(client_id.clone(), manager),
        };
        let mut buf = vec![0u8; 4096];

        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) => {
                    info!(client = %client_id, "Client disconnected");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    error!(client = %client_id, error = %e, "Read error");
                    break;
                }
            };

            for response in handler.process(&buf[..n]).await {
                stream.write_all(&response.encode()).await?;

                if ConnectionHandler::is_goodbye(&response) {
                    info!(client = %client_id, "Client quit");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

//! Connection handler - parses commands and routes them to the session manager

use coedit_core::{DocumentId, Operation, SessionManager, UserId};
use coedit_protocol::{Command, CommandKind, Parser, Response};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handles a single client connection
pub struct ConnectionHandler {
    /// Unique client ID
    pub client_id: String,
    manager: Arc<SessionManager>,
    parser: Parser,
    /// Whether client is authenticated
    authenticated: bool,
    /// Server password (if auth required)
    password: Option<String>,
}

impl ConnectionHandler {
    pub fn new(client_id: String, manager: Arc<SessionManager>) -> Self {
        Self {
            client_id,
            manager,
            parser: Parser::new(),
            authenticated: true,
            password: None,
        }
    }

    /// Create a new handler with authentication required
    pub fn with_auth(client_id: String, manager: Arc<SessionManager>, password: String) -> Self {
        Self {
            client_id,
            manager,
            parser: Parser::new(),
            authenticated: false,
            password: Some(password),
        }
    }

    /// Process incoming data and return responses
    pub async fn process(&mut self, data: &[u8]) -> Vec<Response> {
        let mut responses = Vec::new();

        if let Err(e) = self.parser.feed(data) {
            self.parser.clear();
            responses.push(Response::error(e.code(), e.to_string()));
            return responses;
        }

        loop {
            match self.parser.parse() {
                Ok(Some(cmd)) => {
                    let response = self.handle_command(cmd).await;
                    responses.push(response);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(client = %self.client_id, error = %e, "Rejected command line");
                    responses.push(Response::error(e.code(), e.to_string()));
                }
            }
        }

        responses
    }

    /// Whether a response ends the connection
    pub fn is_goodbye(response: &Response) -> bool {
        matches!(response, Response::Ok(Some(msg)) if msg == "Goodbye")
    }

    async fn handle_command(&mut self, cmd: Command) -> Response {
        debug!(client = %self.client_id, cmd = ?cmd.kind, "Processing command");

        let Command { kind, document_id } = cmd;

        // AUTH, PING and QUIT are always allowed
        let kind = match kind {
            CommandKind::Auth { password } => return self.handle_auth(password),
            CommandKind::Ping => return Response::pong(),
            CommandKind::Quit => return Response::ok_with_message("Goodbye"),
            other => other,
        };

        if !self.authenticated {
            return Response::error("NOAUTH", "Authentication required. Use AUTH <password>");
        }

        match (kind, document_id) {
            (CommandKind::Info, _) => self.handle_info().await,
            (CommandKind::Register { user }, Some(id)) => self.handle_register(&id, &user).await,
            (CommandKind::Unregister { user }, Some(id)) => self.handle_unregister(&id, &user).await,
            (CommandKind::Pull { user }, Some(id)) => self.handle_pull(&id, &user).await,
            (CommandKind::Push { user, ops }, Some(id)) => self.handle_push(&id, &user, &ops).await,
            _ => Response::error("PARSE_ERROR", "Document ID required"),
        }
    }

    fn handle_auth(&mut self, password: String) -> Response {
        match &self.password {
            Some(expected) if expected == &password => {
                self.authenticated = true;
                info!(client = %self.client_id, "Client authenticated");
                Response::ok()
            }
            Some(_) => {
                warn!(client = %self.client_id, "Authentication failed");
                Response::error("WRONGPASS", "Invalid password")
            }
            None => Response::ok_with_message("No authentication required"),
        }
    }

    async fn handle_register(&self, id: &DocumentId, user: &UserId) -> Response {
        match self.manager.register(user, id).await {
            Ok(content) => Response::bulk(content.into_bytes()),
            Err(e) => Response::error("REGISTER_ERROR", e.to_string()),
        }
    }

    async fn handle_unregister(&self, id: &DocumentId, user: &UserId) -> Response {
        if !self.manager.unregister(user, id).await {
            debug!(client = %self.client_id, doc_id = %id, user = %user, "Unregister had no effect");
        }
        Response::ok()
    }

    async fn handle_pull(&self, id: &DocumentId, user: &UserId) -> Response {
        match self.manager.pull(user, id).await {
            Ok(result) => Response::json(&result),
            Err(e) => Response::error("PULL_ERROR", e.to_string()),
        }
    }

    async fn handle_push(&self, id: &DocumentId, user: &UserId, ops: &[Operation]) -> Response {
        match self.manager.push(user, id, ops).await {
            Ok(summary) => {
                debug!(
                    client = %self.client_id,
                    doc_id = %id,
                    committed = summary.committed,
                    dropped = summary.dropped,
                    "Push applied"
                );
                Response::ok()
            }
            Err(e) => Response::error("PUSH_ERROR", e.to_string()),
        }
    }

    async fn handle_info(&self) -> Response {
        let stats = self.manager.stats().await;
        let config = self.manager.config();
        Response::json(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": stats.session_count,
            "users": stats.user_count,
            "flush_interval_secs": config.flush_interval().as_secs(),
            "transform_window": config.transform_window.to_string(),
            "client_id": self.client_id,
        }))
    }
}

//! Protocol command types

use coedit_core::{DocumentId, Operation, UserId};

/// A parsed command
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub document_id: Option<DocumentId>,
}

/// All supported commands
#[derive(Debug, Clone)]
pub enum CommandKind {
    /// REGISTER <id> <user>
    Register { user: UserId },

    /// UNREGISTER <id> <user>
    Unregister { user: UserId },

    /// PULL <id> <user>
    Pull { user: UserId },

    /// PUSH <id> <user> <ops>
    Push { user: UserId, ops: Vec<Operation> },

    /// AUTH <password>
    Auth { password: String },

    /// PING
    Ping,

    /// QUIT
    Quit,

    /// INFO
    Info,
}

impl Command {
    pub fn register(id: DocumentId, user: UserId) -> Self {
        Command {
            kind: CommandKind::Register { user },
            document_id: Some(id),
        }
    }

    pub fn unregister(id: DocumentId, user: UserId) -> Self {
        Command {
            kind: CommandKind::Unregister { user },
            document_id: Some(id),
        }
    }

    pub fn pull(id: DocumentId, user: UserId) -> Self {
        Command {
            kind: CommandKind::Pull { user },
            document_id: Some(id),
        }
    }

    pub fn push(id: DocumentId, user: UserId, ops: Vec<Operation>) -> Self {
        Command {
            kind: CommandKind::Push { user, ops },
            document_id: Some(id),
        }
    }

    pub fn auth(password: String) -> Self {
        Command {
            kind: CommandKind::Auth { password },
            document_id: None,
        }
    }

    pub fn ping() -> Self {
        Command {
            kind: CommandKind::Ping,
            document_id: None,
        }
    }

    pub fn quit() -> Self {
        Command {
            kind: CommandKind::Quit,
            document_id: None,
        }
    }

    pub fn info() -> Self {
        Command {
            kind: CommandKind::Info,
            document_id: None,
        }
    }

    /// The user a document command acts for
    pub fn user(&self) -> Option<&UserId> {
        match &self.kind {
            CommandKind::Register { user }
            | CommandKind::Unregister { user }
            | CommandKind::Pull { user }
            | CommandKind::Push { user, .. } => Some(user),
            _ => None,
        }
    }
}

//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};

/// The kind of interaction observed by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// A plain chat message.
    Message,
    /// A bot command (e.g. `/top`).
    Command,
    /// A user joined the chat.
    Join,
}

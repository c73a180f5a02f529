//! Outcome of a correlated request.

use futures::future::{BoxFuture, Shared};
use thiserror::Error;

use crate::entity::EntityHandle;
use crate::message::WireMessage;
use crate::types::TransitionId;

/// Value a pending request resolves with.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The server acknowledged the request without payload (`_no_resp_for`).
    Empty,
    /// A receiver produced an entity from the response message.
    Entity(EntityHandle),
    /// No receiver produced a usable result; the raw response.
    Message(WireMessage),
}

impl Reply {
    pub fn is_empty(&self) -> bool {
        matches!(self, Reply::Empty)
    }

    pub fn entity(&self) -> Option<&EntityHandle> {
        match self {
            Reply::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&WireMessage> {
        match self {
            Reply::Message(message) => Some(message),
            _ => None,
        }
    }
}

/// Why a pending request did not resolve successfully.
#[derive(Debug, Clone, Error)]
pub enum ResponseError {
    /// The server answered with `_sync_is_error`.
    #[error("request rejected by server: {}", .0.sync_type().unwrap_or("<untyped>"))]
    Rejected(WireMessage),

    /// The request was dropped unanswered because its connection went away
    /// or the manager was closed.
    #[error("request abandoned: connection closed before a response")]
    Abandoned,

    /// The configured request timeout elapsed.
    #[error("request timed out")]
    TimedOut,

    /// A message under another transition id reached the entity first and
    /// rolled the transition back.
    #[error("transition {0} broken")]
    BrokenTransition(TransitionId),
}

impl ResponseError {
    /// The server's rejection message, if this is a rejection.
    pub fn rejection(&self) -> Option<&WireMessage> {
        match self {
            ResponseError::Rejected(message) => Some(message),
            _ => None,
        }
    }
}

/// Shared deferred result of an outstanding transition.
///
/// Every caller joining the same transition awaits a clone of it.
pub type TransitionPromise = Shared<BoxFuture<'static, Result<Reply, ResponseError>>>;

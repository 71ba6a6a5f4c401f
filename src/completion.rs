use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::model::{Completion, Role, Turn};

/// Failure of one completion call, classified by what the caller should do next.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The credential was rejected. Continuing is pointless.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    /// The provider asked us to slow down; the same turn may be retried later.
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    /// Transport, provider-side or response-shape failures.
    #[error("{0}")]
    Other(String),
}

impl CompletionError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub messages: &'a [Turn],
    pub model: &'a str,
    pub max_output_tokens: u32,
}

impl CompletionRequest<'_> {
    /// The provider only accepts a conversation that ends with the user speaking.
    pub fn validate(&self) -> Result<(), CompletionError> {
        match self.messages.last() {
            None => Err(CompletionError::other(
                "Cannot request a completion without any messages",
            )),
            Some(turn) if turn.role != Role::User => Err(CompletionError::other(
                "Cannot request a completion when the last message is not from the user",
            )),
            Some(_) => Ok(()),
        }
    }
}

pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Completion, CompletionError>> + 'a>>;

/// Stateless call into a language-model provider. Implementations must not
/// retry on their own; recovery belongs to the caller.
pub trait CompletionClient {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFuture<'a>;
}

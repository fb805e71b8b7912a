//! Processor trait and outcome

use async_trait::async_trait;

use crate::error::ProcessorError;
use crate::message::Message;
use crate::session::SessionContext;

/// Result of running one processor (or a whole chain) over a message
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Continue with this (possibly transformed) message
    Forward(Message),
    /// Drop the message; nothing further runs and nothing is delivered
    Filtered,
}

impl Outcome {
    pub fn is_filtered(&self) -> bool {
        matches!(self, Self::Filtered)
    }

    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Forward(message) => Some(message),
            Self::Filtered => None,
        }
    }
}

/// One stage of the chain.
///
/// Processors see the session only through its read-only [`SessionContext`]
/// and must not block: any I/O has to be awaited.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Name used in logs and in [`ProcessingError`](crate::error::ProcessingError)
    fn name(&self) -> &str;

    async fn process(
        &self,
        message: Message,
        session: &SessionContext,
    ) -> Result<Outcome, ProcessorError>;
}

//! Built-in processors

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::processor::{Outcome, Processor};
use crate::error::ProcessorError;
use crate::message::{Message, Origin};
use crate::session::SessionContext;

type ProcessFn =
    dyn Fn(Message, &SessionContext) -> Result<Outcome, ProcessorError> + Send + Sync + 'static;

/// Adapts a synchronous closure into a [`Processor`]
pub struct FnProcessor {
    name: String,
    f: Box<ProcessFn>,
}

impl FnProcessor {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Message, &SessionContext) -> Result<Outcome, ProcessorError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

#[async_trait]
impl Processor for FnProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(
        &self,
        message: Message,
        session: &SessionContext,
    ) -> Result<Outcome, ProcessorError> {
        (self.f)(message, session)
    }
}

/// Vetoes messages whose `type` is in a deny list, in both directions
pub struct DropMessageTypes {
    types: HashSet<String>,
}

impl DropMessageTypes {
    pub fn new(types: impl IntoIterator<Item = String>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Processor for DropMessageTypes {
    fn name(&self) -> &str {
        "drop_types"
    }

    async fn process(
        &self,
        message: Message,
        _session: &SessionContext,
    ) -> Result<Outcome, ProcessorError> {
        match message.msg_type() {
            Some(kind) if self.types.contains(kind) => Ok(Outcome::Filtered),
            _ => Ok(Outcome::Forward(message)),
        }
    }
}

/// Stamps `metadata.session_key` onto messages bound for the kernel
pub struct TagSession;

#[async_trait]
impl Processor for TagSession {
    fn name(&self) -> &str {
        "tag_session"
    }

    async fn process(
        &self,
        mut message: Message,
        session: &SessionContext,
    ) -> Result<Outcome, ProcessorError> {
        if message.origin != Origin::Client {
            return Ok(Outcome::Forward(message));
        }

        let key = Value::String(session.session_key.to_string());
        match message.body.get_mut("metadata") {
            Some(Value::Object(metadata)) => {
                metadata.insert("session_key".to_string(), key);
            }
            Some(_) => {
                return Err(ProcessorError::InvalidMessage(
                    "metadata must be an object".to_string(),
                ));
            }
            None => message.set_field("metadata", json!({ "session_key": key })),
        }
        Ok(Outcome::Forward(message))
    }
}

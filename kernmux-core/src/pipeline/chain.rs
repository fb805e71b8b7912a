//! Ordered processor chain

use std::sync::Arc;

use super::builtin::{DropMessageTypes, TagSession};
use super::processor::{Outcome, Processor};
use crate::config::PipelineConfig;
use crate::error::ProcessingError;
use crate::message::Message;
use crate::session::SessionContext;

/// Processors in fixed order, shared by every session
#[derive(Clone, Default)]
pub struct Pipeline {
    processors: Vec<Arc<dyn Processor>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Builder seeded with the built-in processors enabled in `config`
    pub fn from_config(config: &PipelineConfig) -> PipelineBuilder {
        let mut builder = Self::builder();
        if !config.drop_types.is_empty() {
            builder = builder.then(DropMessageTypes::new(config.drop_types.iter().cloned()));
        }
        if config.tag_session {
            builder = builder.then(TagSession);
        }
        builder
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Processor names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// Run `message` through every processor in order.
    ///
    /// Stops at the first veto or error; the message is dropped in both cases.
    pub async fn run(
        &self,
        message: Message,
        session: &SessionContext,
    ) -> Result<Outcome, ProcessingError> {
        let mut message = message;

        for processor in &self.processors {
            match processor.process(message, session).await {
                Ok(Outcome::Forward(next)) => message = next,
                Ok(Outcome::Filtered) => {
                    tracing::debug!(
                        session_key = %session.session_key,
                        processor = processor.name(),
                        "Message filtered"
                    );
                    return Ok(Outcome::Filtered);
                }
                Err(source) => {
                    return Err(ProcessingError {
                        processor: processor.name().to_string(),
                        source,
                    });
                }
            }
        }

        Ok(Outcome::Forward(message))
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    processors: Vec<Arc<dyn Processor>>,
}

impl PipelineBuilder {
    /// Append a processor to the end of the chain
    pub fn then(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Append an already shared processor
    pub fn then_shared(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            processors: self.processors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessorError;
    use crate::pipeline::FnProcessor;
    use crate::session::testing::context;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn append(tag: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> FnProcessor {
        FnProcessor::new(tag, move |mut message, _| {
            log.lock().unwrap().push(tag);
            let trail = message.body["trail"].as_str().unwrap_or("").to_string();
            message.set_field("trail", Value::String(trail + tag));
            Ok(Outcome::Forward(message))
        })
    }

    #[tokio::test]
    async fn empty_pipeline_forwards_unchanged() {
        let message = Message::from_client(json!({"type": "exec"}));
        let outcome = Pipeline::default().run(message.clone(), &context("s")).await;
        assert_eq!(outcome.unwrap(), Outcome::Forward(message));
    }

    #[tokio::test]
    async fn processors_compose_in_order() {
        let log = Arc::new(Mutex::new(vec![]));
        let pipeline = Pipeline::builder()
            .then(append("1", log.clone()))
            .then(append("2", log.clone()))
            .then(append("3", log.clone()))
            .build();

        let outcome = pipeline
            .run(Message::from_client(json!({})), &context("s"))
            .await
            .unwrap();

        let message = outcome.into_message().unwrap();
        assert_eq!(message.body["trail"], "123");
        assert_eq!(*log.lock().unwrap(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn filter_short_circuits_chain() {
        let log = Arc::new(Mutex::new(vec![]));
        let pipeline = Pipeline::builder()
            .then(append("1", log.clone()))
            .then(FnProcessor::new("veto", |_, _| Ok(Outcome::Filtered)))
            .then(append("3", log.clone()))
            .build();

        let outcome = pipeline
            .run(Message::from_client(json!({})), &context("s"))
            .await
            .unwrap();

        assert!(outcome.is_filtered());
        assert_eq!(*log.lock().unwrap(), vec!["1"]);
    }

    #[tokio::test]
    async fn error_names_failing_processor_and_chain_stays_usable() {
        let log = Arc::new(Mutex::new(vec![]));
        let pipeline = Pipeline::builder()
            .then(FnProcessor::new("picky", |message, _| {
                if message.body.get("bad").is_some() {
                    Err(ProcessorError::InvalidMessage("bad field".to_string()))
                } else {
                    Ok(Outcome::Forward(message))
                }
            }))
            .then(append("after", log.clone()))
            .build();
        let ctx = context("s");

        let err = pipeline
            .run(Message::from_client(json!({"bad": true})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.processor, "picky");
        assert!(log.lock().unwrap().is_empty());

        let ok = pipeline.run(Message::from_client(json!({})), &ctx).await;
        assert!(matches!(ok, Ok(Outcome::Forward(_))));
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn from_config_places_builtins_first() {
        let config = PipelineConfig {
            drop_types: vec!["comm_open".to_string()],
            tag_session: true,
        };
        let pipeline = Pipeline::from_config(&config)
            .then(FnProcessor::new("custom", |m, _| Ok(Outcome::Forward(m))))
            .build();

        assert_eq!(pipeline.names(), vec!["drop_types", "tag_session", "custom"]);
    }

    #[test]
    fn default_config_adds_nothing() {
        let pipeline = Pipeline::from_config(&PipelineConfig::default()).build();
        assert!(pipeline.is_empty());
    }
}

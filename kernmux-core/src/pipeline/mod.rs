//! Message pipeline
//!
//! Every relayed message passes through an ordered chain of [`Processor`]s.
//! Each one may transform the message or veto it; a veto is final.

pub mod builtin;
pub mod chain;
pub mod processor;

pub use builtin::{DropMessageTypes, FnProcessor, TagSession};
pub use chain::{Pipeline, PipelineBuilder};
pub use processor::{Outcome, Processor};

use std::time::Duration;

use gyre_core::time::{Tag, TagError};

/// Type-erased error carried out of user reaction bodies.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("Reactor '{name}' constructed without a parent below the root")]
    OrphanReactor { name: String },

    #[error("Connection {source_port} -> {target_port} is outside the connecting reactor's scope")]
    OutsideContainer {
        source_port: String,
        target_port: String,
    },

    #[error("Destination port {target_port} already has an upstream source {existing}")]
    DestinationOccupied {
        target_port: String,
        existing: String,
    },

    #[error("Edge would introduce a cycle in the precedence graph: {what}")]
    CycleIntroduced { what: String },

    #[error("Connection {source_port} -> {target_port} creates a zero-delay feedthrough path")]
    DirectFeedThrough {
        source_port: String,
        target_port: String,
    },

    #[error("Reaction '{reaction}' registers trigger '{trigger}' outside the reactor and its children")]
    TriggerOutOfScope { reaction: String, trigger: String },

    #[error("Procedure reaction '{reaction}' may declare exactly one trigger")]
    MultipleTriggersOnProcedure { reaction: String },

    #[error("Capability requested with an invalid key: {what}")]
    InvalidKey { what: String },

    #[error("Reaction '{reaction}' missed its deadline by {lag:?}")]
    DeadlineViolation { reaction: String, lag: Duration },

    #[error("Federated action scheduled at {intended} violates tag ordering at {current}")]
    FederatedTagViolation { intended: Tag, current: Tag },

    #[error(transparent)]
    TagOverflow(#[from] TagError),

    #[error("Reaction '{reaction}' failed: {source}")]
    ReactionFailure {
        reaction: String,
        #[source]
        source: BoxedError,
    },

    #[error("Duplicate Port definition: {reactor}.{port}")]
    DuplicatePortDefinition { reactor: String, port: String },

    #[error("Duplicate Action definition: {reactor}.{action}")]
    DuplicateActionDefinition { reactor: String, action: String },

    #[error("Error registering Reaction '{reaction}': {what}")]
    ReactionRegistration { reaction: String, what: String },

    #[error("Value type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Reactor '{reactor}' is shutting down or terminated")]
    TerminalReactor { reactor: String },

    #[error("Caller port {port} has no bound callee")]
    UnboundCallerPort { port: String },

    #[error("The scheduler is no longer accepting events")]
    SchedulerDisconnected,

    #[error("Inconsistent runtime state: {what}")]
    InconsistentState { what: String },
}

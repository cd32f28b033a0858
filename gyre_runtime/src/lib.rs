//! Runtime types and discrete event executor for `gyre`.
//!
//! A program is a hierarchy of [`Reactor`]s owning typed ports, actions,
//! timers and reactions. The [`App`] is the unique root of the hierarchy; it
//! owns the arenas all components live in, the precedence graph over
//! reactions, and the tag-ordered event queue the scheduler drains.
//!
//! Reactions fire at logical [`Tag`]s in precedence order. Privileged
//! *mutation* reactions may rewire the connection graph mid-execution through
//! the [`MutationContext`] mediator; all changes of a failed mutation are
//! rolled back before the error surfaces.

mod action;
mod app;
mod assembler;
mod connection;
mod context;
mod data;
mod diag;
mod env;
mod error;
mod event;
mod fed;
mod graph;
mod port;
mod reaction;
mod reactor;
mod sched;

pub use action::{ActionKind, ActionOrigin, ActionRef, BaseAction, ShutdownRef, StartupRef, TimerRef, TimerSpec};
pub use app::{App, AppHandle};
pub use assembler::{Assembler, MutationContext, ReactionBuilderState, SchedulableHandle};
pub use context::{Context, PhysicalScheduler};
pub use data::{PortData, ReactorState};
pub use env::Env;
pub use error::{BoxedError, RuntimeError};
pub use event::TaggedEvent;
pub use fed::{FederatePortAction, TagAuthority};
pub use graph::{DepGraph, Level};
pub use port::{
    BasePort, CalleePort, CallerPort, InPort, InPortBank, OutPort, OutPortBank, PortHandle,
    PortKind, ValuePort, WritablePort,
};
pub use reaction::{Reaction, TriggerRef};
pub use reactor::{BankInfo, Lifecycle, OwnerKey, Reactor};
pub use sched::Config;

pub use gyre_core::{
    keys::{ActionKey, PortKey, ReactionKey, ReactorKey},
    time::{Tag, TagError, Timestamp},
};

/// Convenient alias for [`std::time::Duration`], mirrored here so user code
/// rarely needs to reach outside the crate.
pub use std::time::Duration;

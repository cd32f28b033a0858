use std::{any::Any, fmt::Debug, sync::Arc, time::Duration};

use gyre_core::keys::{ActionKey, PortKey, ReactorKey};

use crate::{
    action::{ActionRef, ShutdownRef, StartupRef, TimerRef},
    context::Context,
    data::{PortData, ReactorState},
    error::BoxedError,
    fed::FederatePortAction,
    port::{CalleePort, InPort, OutPort},
    MutationContext,
};

/// A trigger of a reaction: a port or an action (timers, startup and
/// shutdown are actions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerRef {
    Port(PortKey),
    Action(ActionKey),
}

impl<T: PortData> From<InPort<T>> for TriggerRef {
    fn from(port: InPort<T>) -> Self {
        TriggerRef::Port(port.key)
    }
}

impl<T: PortData> From<OutPort<T>> for TriggerRef {
    fn from(port: OutPort<T>) -> Self {
        TriggerRef::Port(port.key)
    }
}

impl<A: PortData, R: PortData> From<CalleePort<A, R>> for TriggerRef {
    fn from(port: CalleePort<A, R>) -> Self {
        TriggerRef::Port(port.key)
    }
}

impl<T: PortData> From<ActionRef<T>> for TriggerRef {
    fn from(action: ActionRef<T>) -> Self {
        TriggerRef::Action(action.key)
    }
}

impl From<TimerRef> for TriggerRef {
    fn from(timer: TimerRef) -> Self {
        TriggerRef::Action(timer.key)
    }
}

impl From<StartupRef> for TriggerRef {
    fn from(startup: StartupRef) -> Self {
        TriggerRef::Action(startup.key)
    }
}

impl From<ShutdownRef> for TriggerRef {
    fn from(shutdown: ShutdownRef) -> Self {
        TriggerRef::Action(shutdown.key)
    }
}

impl<T: PortData> From<FederatePortAction<T>> for TriggerRef {
    fn from(action: FederatePortAction<T>) -> Self {
        TriggerRef::Action(action.key)
    }
}

/// Signature of a plain reaction body (and of a deadline handler).
pub type ReactionFn =
    dyn Fn(&mut Context, &mut dyn ReactorState) -> Result<(), BoxedError> + Send + Sync;

/// Signature of a mutation body, invoked with the graph-mutation mediator.
pub type MutationFn =
    dyn Fn(&mut MutationContext, &mut dyn ReactorState) -> Result<(), BoxedError> + Send + Sync;

/// Signature of a procedure body, invoked synchronously by a caller.
pub type ProcedureFn = dyn Fn(&mut Context, &mut dyn ReactorState, Box<dyn Any + Send>) -> Result<Box<dyn Any + Send>, BoxedError>
    + Send
    + Sync;

#[derive(Clone)]
pub enum ReactionBody {
    Plain(Arc<ReactionFn>),
    Mutation(Arc<MutationFn>),
    Procedure(Arc<ProcedureFn>),
}

impl Debug for ReactionBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReactionBody::Plain(_) => write!(f, "Plain(..)"),
            ReactionBody::Mutation(_) => write!(f, "Mutation(..)"),
            ReactionBody::Procedure(_) => write!(f, "Procedure(..)"),
        }
    }
}

/// Local deadline relative to the logical time of the firing tag. When the
/// deadline is missed, the handler (if any) runs in place of the body.
#[derive(Clone)]
pub struct Deadline {
    pub(crate) delta: Duration,
    pub(crate) handler: Option<Arc<ReactionFn>>,
}

impl Debug for Deadline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deadline")
            .field("delta", &self.delta)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

pub struct Reaction {
    name: String,
    /// The Reactor containing this Reaction
    reactor: ReactorKey,
    /// Registration index among the reactor's reactions
    priority: usize,
    is_mutation: bool,
    /// Triggers enabling this reaction
    triggers: Vec<TriggerRef>,
    /// Ports this reaction may read without being triggered by them
    reads: Vec<PortKey>,
    /// Ports this reaction may set (incl. caller ports it may invoke)
    effects: Vec<PortKey>,
    /// Actions this reaction may schedule
    schedulables: Vec<ActionKey>,
    body: ReactionBody,
    deadline: Option<Deadline>,
}

impl Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .field("reactor", &self.reactor)
            .field("priority", &self.priority)
            .field("is_mutation", &self.is_mutation)
            .field("triggers", &self.triggers)
            .field("body", &self.body)
            .finish()
    }
}

impl Reaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        reactor: ReactorKey,
        priority: usize,
        is_mutation: bool,
        triggers: Vec<TriggerRef>,
        reads: Vec<PortKey>,
        effects: Vec<PortKey>,
        schedulables: Vec<ActionKey>,
        body: ReactionBody,
        deadline: Option<Deadline>,
    ) -> Self {
        Self {
            name,
            reactor,
            priority,
            is_mutation,
            triggers,
            reads,
            effects,
            schedulables,
            body,
            deadline,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reactor(&self) -> ReactorKey {
        self.reactor
    }

    pub fn priority(&self) -> usize {
        self.priority
    }

    pub fn is_mutation(&self) -> bool {
        self.is_mutation
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self.body, ReactionBody::Procedure(_))
    }

    /// Key ordering reactions within one reactor: mutations first, then
    /// registration order.
    pub(crate) fn order_key(&self) -> (u8, usize) {
        (u8::from(!self.is_mutation), self.priority)
    }

    pub fn triggers(&self) -> &[TriggerRef] {
        &self.triggers
    }

    pub(crate) fn trigger_ports(&self) -> impl Iterator<Item = PortKey> + '_ {
        self.triggers.iter().filter_map(|t| match t {
            TriggerRef::Port(p) => Some(*p),
            TriggerRef::Action(_) => None,
        })
    }

    pub(crate) fn trigger_actions(&self) -> impl Iterator<Item = ActionKey> + '_ {
        self.triggers.iter().filter_map(|t| match t {
            TriggerRef::Action(a) => Some(*a),
            TriggerRef::Port(_) => None,
        })
    }

    pub fn reads(&self) -> &[PortKey] {
        &self.reads
    }

    pub fn effects(&self) -> &[PortKey] {
        &self.effects
    }

    pub fn schedulables(&self) -> &[ActionKey] {
        &self.schedulables
    }

    pub(crate) fn body(&self) -> &ReactionBody {
        &self.body
    }

    pub(crate) fn deadline(&self) -> Option<&Deadline> {
        self.deadline.as_ref()
    }

    /// Reaction keys this reaction depends on through declared ports.
    pub(crate) fn reads_and_triggered_ports(&self) -> impl Iterator<Item = PortKey> + '_ {
        self.trigger_ports().chain(self.reads.iter().copied())
    }
}

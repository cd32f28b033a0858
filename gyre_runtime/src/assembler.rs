//! The assembly surface: declaring ports, actions, timers and reactions on
//! a reactor, and the key-gated mediator mutations use to reshape the graph
//! mid-execution.

use std::{marker::PhantomData, sync::Arc, time::Duration};

use gyre_core::keys::{ActionKey, PortKey, ReactionKey, ReactorKey};

use crate::{
    action::{
        ActionKind, ActionOrigin, ActionRef, ShutdownRef, StartupRef, TimerRef, TimerSpec,
        DEFAULT_MIN_SPACING,
    },
    connection::{self, ConnScope},
    context::Context,
    data::{PortData, ReactorState},
    env::Env,
    error::{BoxedError, RuntimeError},
    fed::FederatePortAction,
    port::{
        CalleePort, CallerPort, InPort, InPortBank, OutPort, OutPortBank, PortHandle, PortKind,
        WritablePort,
    },
    reaction::{Deadline, ReactionBody, TriggerRef},
    reactor::{BankInfo, Lifecycle, OwnerKey},
};

/// Actions a reaction may schedule.
pub trait SchedulableHandle: Copy {
    fn action_key(self) -> ActionKey;
}

impl<T: PortData> SchedulableHandle for ActionRef<T> {
    fn action_key(self) -> ActionKey {
        self.key
    }
}

impl<T: PortData> SchedulableHandle for FederatePortAction<T> {
    fn action_key(self) -> ActionKey {
        self.key
    }
}

/// Components created under one assembly or mutation scope, tracked so a
/// failed mutation can be rolled back.
#[derive(Default, Debug)]
pub(crate) struct Creations {
    pub reactors: Vec<ReactorKey>,
    pub ports: Vec<PortKey>,
    pub actions: Vec<ActionKey>,
    pub reactions: Vec<ReactionKey>,
    pub bindings: Vec<(PortKey, PortKey)>,
}

impl Creations {
    pub fn is_empty(&self) -> bool {
        self.reactors.is_empty()
            && self.ports.is_empty()
            && self.actions.is_empty()
            && self.reactions.is_empty()
            && self.bindings.is_empty()
    }
}

/// Run `f` against a fresh reactor under `parent`, recording everything it
/// creates into `creations`.
pub(crate) fn assemble<S: ReactorState, R>(
    env: &mut Env,
    parent: ReactorKey,
    name: &str,
    state: S,
    bank_info: Option<BankInfo>,
    creations: &mut Creations,
    f: impl FnOnce(&mut Assembler<'_, S>) -> Result<R, RuntimeError>,
) -> Result<(ReactorKey, R), RuntimeError> {
    let key = env.add_reactor(name, Some(parent), Box::new(state), bank_info)?;
    creations.reactors.push(key);
    let mut asm = Assembler {
        env,
        creations,
        reactor: key,
        _marker: PhantomData,
    };
    let out = f(&mut asm)?;
    Ok((key, out))
}

/// Declaration scope of one reactor with state type `S`.
pub struct Assembler<'a, S: ReactorState> {
    pub(crate) env: &'a mut Env,
    pub(crate) creations: &'a mut Creations,
    pub(crate) reactor: ReactorKey,
    pub(crate) _marker: PhantomData<fn() -> S>,
}

impl<'a, S: ReactorState> Assembler<'a, S> {
    pub fn reactor_key(&self) -> ReactorKey {
        self.reactor
    }

    /// The identity key of the reactor being assembled.
    pub fn owner_key(&self) -> OwnerKey {
        self.env.reactors[self.reactor].owner_key()
    }

    pub fn bank_info(&self) -> Option<BankInfo> {
        self.env.reactors[self.reactor].bank_info().cloned()
    }

    fn add_port<T: PortData>(&mut self, name: &str, kind: PortKind) -> Result<PortKey, RuntimeError> {
        let key = self.env.add_port::<T>(name, kind, self.reactor)?;
        self.creations.ports.push(key);
        Ok(key)
    }

    /// Declare an input port.
    pub fn input<T: PortData>(&mut self, name: &str) -> Result<InPort<T>, RuntimeError> {
        self.add_port::<T>(name, PortKind::Input).map(InPort::from_key)
    }

    /// Declare an output port.
    pub fn output<T: PortData>(&mut self, name: &str) -> Result<OutPort<T>, RuntimeError> {
        self.add_port::<T>(name, PortKind::Output).map(OutPort::from_key)
    }

    /// Declare the calling end of a procedure pair.
    pub fn caller<A: PortData, R: PortData>(
        &mut self,
        name: &str,
    ) -> Result<CallerPort<A, R>, RuntimeError> {
        self.add_port::<(A, R)>(name, PortKind::Caller)
            .map(CallerPort::from_key)
    }

    /// Declare the callee end of a procedure pair.
    pub fn callee<A: PortData, R: PortData>(
        &mut self,
        name: &str,
    ) -> Result<CalleePort<A, R>, RuntimeError> {
        self.add_port::<(A, R)>(name, PortKind::Callee)
            .map(CalleePort::from_key)
    }

    /// Declare a fixed-width bank of input ports.
    pub fn input_bank<T: PortData>(
        &mut self,
        name: &str,
        width: usize,
    ) -> Result<InPortBank<T>, RuntimeError> {
        let mut keys = Vec::with_capacity(width);
        for i in 0..width {
            keys.push(self.add_port::<T>(&format!("{name}[{i}]"), PortKind::Input)?);
        }
        Ok(InPortBank {
            keys,
            _marker: PhantomData,
        })
    }

    /// Declare a fixed-width bank of output ports.
    pub fn output_bank<T: PortData>(
        &mut self,
        name: &str,
        width: usize,
    ) -> Result<OutPortBank<T>, RuntimeError> {
        let mut keys = Vec::with_capacity(width);
        for i in 0..width {
            keys.push(self.add_port::<T>(&format!("{name}[{i}]"), PortKind::Output)?);
        }
        Ok(OutPortBank {
            keys,
            _marker: PhantomData,
        })
    }

    fn add_action<T: PortData>(
        &mut self,
        name: &str,
        kind: ActionKind,
        min_delay: Duration,
        min_spacing: Duration,
    ) -> Result<ActionKey, RuntimeError> {
        let key = self
            .env
            .add_action::<T>(name, kind, self.reactor, min_delay, min_spacing)?;
        self.creations.actions.push(key);
        Ok(key)
    }

    /// Declare a logical action with the default minimum spacing.
    pub fn logical_action<T: PortData>(
        &mut self,
        name: &str,
        min_delay: Option<Duration>,
    ) -> Result<ActionRef<T>, RuntimeError> {
        self.add_action::<T>(
            name,
            ActionKind::Standard(ActionOrigin::Logical),
            min_delay.unwrap_or_default(),
            DEFAULT_MIN_SPACING,
        )
        .map(ActionRef::from_key)
    }

    /// Declare a physical action; its events take their base tag from the
    /// wall clock.
    pub fn physical_action<T: PortData>(
        &mut self,
        name: &str,
        min_delay: Option<Duration>,
    ) -> Result<ActionRef<T>, RuntimeError> {
        self.add_action::<T>(
            name,
            ActionKind::Standard(ActionOrigin::Physical),
            min_delay.unwrap_or_default(),
            DEFAULT_MIN_SPACING,
        )
        .map(ActionRef::from_key)
    }

    /// Declare a logical action with an explicit minimum inter-arrival time.
    pub fn logical_action_spaced<T: PortData>(
        &mut self,
        name: &str,
        min_delay: Option<Duration>,
        min_spacing: Duration,
    ) -> Result<ActionRef<T>, RuntimeError> {
        self.add_action::<T>(
            name,
            ActionKind::Standard(ActionOrigin::Logical),
            min_delay.unwrap_or_default(),
            min_spacing,
        )
        .map(ActionRef::from_key)
    }

    /// Declare a timer firing first at `start + offset`, then every
    /// `period`. A zero period fires exactly once.
    pub fn timer(
        &mut self,
        name: &str,
        offset: Duration,
        period: Duration,
    ) -> Result<TimerRef, RuntimeError> {
        self.add_action::<()>(
            name,
            ActionKind::Timer(TimerSpec { offset, period }),
            Duration::ZERO,
            DEFAULT_MIN_SPACING,
        )
        .map(|key| TimerRef { key })
    }

    /// Declare a federate port action; scheduling it requires an intended
    /// tag from an external authority.
    pub fn federate_port<T: PortData>(
        &mut self,
        name: &str,
    ) -> Result<FederatePortAction<T>, RuntimeError> {
        self.add_action::<T>(
            name,
            ActionKind::Standard(ActionOrigin::Logical),
            Duration::ZERO,
            DEFAULT_MIN_SPACING,
        )
        .map(FederatePortAction::from_key)
    }

    /// The reactor's builtin startup trigger.
    pub fn startup(&self) -> StartupRef {
        StartupRef {
            key: self.env.reactors[self.reactor].startup,
        }
    }

    /// The reactor's builtin shutdown trigger.
    pub fn shutdown(&self) -> ShutdownRef {
        ShutdownRef {
            key: self.env.reactors[self.reactor].shutdown,
        }
    }

    /// Mint a writable facade for `port` using this reactor's identity key.
    pub fn writable<T: PortData, P>(&self, port: P) -> Result<WritablePort<T>, RuntimeError>
    where
        P: PortHandle + Into<WritablePort<T>>,
    {
        self.env.as_writable(port, self.owner_key())
    }

    /// Instantiate a child reactor.
    pub fn child<S2: ReactorState, R>(
        &mut self,
        name: &str,
        state: S2,
        f: impl FnOnce(&mut Assembler<'_, S2>) -> Result<R, RuntimeError>,
    ) -> Result<(ReactorKey, R), RuntimeError> {
        assemble(self.env, self.reactor, name, state, None, self.creations, f)
    }

    /// Instantiate a homogeneous bank of `width` child reactors. Each
    /// member observes its index via [`Context::bank_index`].
    pub fn bank<S2: ReactorState, R>(
        &mut self,
        name: &str,
        width: usize,
        mut state: impl FnMut(usize) -> S2,
        f: impl Fn(&mut Assembler<'_, S2>, usize) -> Result<R, RuntimeError>,
    ) -> Result<Vec<(ReactorKey, R)>, RuntimeError> {
        let mut members = Vec::with_capacity(width);
        for idx in 0..width {
            let info = BankInfo { idx, total: width };
            let member = assemble(
                self.env,
                self.reactor,
                &format!("{name}[{idx}]"),
                state(idx),
                Some(info),
                self.creations,
                |asm| f(asm, idx),
            )?;
            members.push(member);
        }
        Ok(members)
    }

    /// Statically wire two ports under this reactor's authority.
    pub fn connect(
        &mut self,
        src: impl PortHandle,
        dst: impl PortHandle,
    ) -> Result<(), RuntimeError> {
        let (src, dst) = (src.port_key(), dst.port_key());
        connection::establish(self.env, ConnScope::Construction(self.reactor), src, dst)?;
        self.creations.bindings.push((src, dst));
        Ok(())
    }

    pub fn can_connect(&self, src: impl PortHandle, dst: impl PortHandle) -> bool {
        connection::can(
            self.env,
            ConnScope::Construction(self.reactor),
            src.port_key(),
            dst.port_key(),
        )
    }

    /// Start declaring a reaction.
    pub fn reaction<'b>(&'b mut self, name: Option<&str>) -> ReactionBuilderState<'b, 'a, S> {
        ReactionBuilderState::new(self, name, false)
    }

    /// Start declaring a mutation: a privileged reaction that may rewire
    /// the graph through the [`MutationContext`] mediator.
    pub fn mutation<'b>(&'b mut self, name: Option<&str>) -> ReactionBuilderState<'b, 'a, S> {
        ReactionBuilderState::new(self, name, true)
    }

    /// Declare a procedure: a reaction whose single trigger is a callee
    /// port, executed synchronously within the caller's firing.
    pub fn procedure<A, R, F>(
        &mut self,
        name: Option<&str>,
        callee: CalleePort<A, R>,
        f: F,
    ) -> Result<ReactionKey, RuntimeError>
    where
        A: PortData,
        R: PortData,
        F: Fn(&mut Context, &mut S, A) -> Result<R, BoxedError> + Send + Sync + 'static,
    {
        self.reaction(name)
            .with_trigger(callee)
            .with_procedure_body(f)
            .finish()
    }
}

/// Builder for a single reaction of a reactor with state `S`.
pub struct ReactionBuilderState<'b, 'a, S: ReactorState> {
    asm: &'b mut Assembler<'a, S>,
    name: Option<String>,
    is_mutation: bool,
    triggers: Vec<TriggerRef>,
    reads: Vec<PortKey>,
    effects: Vec<PortKey>,
    schedulables: Vec<ActionKey>,
    body: Option<ReactionBody>,
    deadline: Option<Deadline>,
}

impl<'b, 'a, S: ReactorState> ReactionBuilderState<'b, 'a, S> {
    fn new(asm: &'b mut Assembler<'a, S>, name: Option<&str>, is_mutation: bool) -> Self {
        Self {
            asm,
            name: name.map(str::to_owned),
            is_mutation,
            triggers: Vec::new(),
            reads: Vec::new(),
            effects: Vec::new(),
            schedulables: Vec::new(),
            body: None,
            deadline: None,
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<TriggerRef>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    /// Declare a port readable without triggering on it.
    pub fn with_read(mut self, port: impl PortHandle) -> Self {
        self.reads.push(port.port_key());
        self
    }

    /// Declare a port this reaction may set.
    pub fn with_effect<T: PortData>(mut self, port: impl Into<WritablePort<T>>) -> Self {
        self.effects.push(port.into().key());
        self
    }

    /// Declare a caller port this reaction may invoke.
    pub fn with_caller<A: PortData, R: PortData>(mut self, port: CallerPort<A, R>) -> Self {
        self.effects.push(port.key());
        self
    }

    /// Declare an action this reaction may schedule.
    pub fn with_schedulable(mut self, action: impl SchedulableHandle) -> Self {
        self.schedulables.push(action.action_key());
        self
    }

    /// Declare a deadline with no handler; a violation is logged and the
    /// body still runs.
    pub fn with_deadline(mut self, delta: Duration) -> Self {
        self.deadline = Some(Deadline {
            delta,
            handler: None,
        });
        self
    }

    /// Declare a deadline whose handler runs in place of the body when the
    /// deadline is missed.
    pub fn with_deadline_handler<F>(mut self, delta: Duration, handler: F) -> Self
    where
        F: Fn(&mut Context, &mut S) -> Result<(), BoxedError> + Send + Sync + 'static,
    {
        self.deadline = Some(Deadline {
            delta,
            handler: Some(Arc::new(move |ctx: &mut Context, state: &mut dyn ReactorState| {
                let state = state
                    .downcast_mut::<S>()
                    .expect("reactor state type diverged from registration");
                handler(ctx, state)
            })),
        });
        self
    }

    pub fn with_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context, &mut S) -> Result<(), BoxedError> + Send + Sync + 'static,
    {
        self.body = Some(ReactionBody::Plain(Arc::new(
            move |ctx: &mut Context, state: &mut dyn ReactorState| {
                let state = state
                    .downcast_mut::<S>()
                    .expect("reactor state type diverged from registration");
                f(ctx, state)
            },
        )));
        self
    }

    pub fn with_mutation_body<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut MutationContext, &mut S) -> Result<(), BoxedError> + Send + Sync + 'static,
    {
        self.body = Some(ReactionBody::Mutation(Arc::new(
            move |ctx: &mut MutationContext, state: &mut dyn ReactorState| {
                let state = state
                    .downcast_mut::<S>()
                    .expect("reactor state type diverged from registration");
                f(ctx, state)
            },
        )));
        self
    }

    pub fn with_procedure_body<A, R, F>(mut self, f: F) -> Self
    where
        A: PortData,
        R: PortData,
        F: Fn(&mut Context, &mut S, A) -> Result<R, BoxedError> + Send + Sync + 'static,
    {
        self.body = Some(ReactionBody::Procedure(Arc::new(
            move |ctx: &mut Context,
                  state: &mut dyn ReactorState,
                  arg: Box<dyn std::any::Any + Send>| {
                let state = state
                    .downcast_mut::<S>()
                    .expect("reactor state type diverged from registration");
                let arg = *arg.downcast::<A>().map_err(|_| {
                    Box::new(RuntimeError::TypeMismatch {
                        expected: std::any::type_name::<A>(),
                        found: "procedure argument",
                    }) as BoxedError
                })?;
                let ret = f(ctx, state, arg)?;
                Ok(Box::new(ret) as Box<dyn std::any::Any + Send>)
            },
        )));
        self
    }

    pub fn finish(self) -> Result<ReactionKey, RuntimeError> {
        let Self {
            asm,
            name,
            is_mutation,
            triggers,
            reads,
            effects,
            schedulables,
            body,
            deadline,
        } = self;

        let display_name = name.clone().unwrap_or_else(|| "<unnamed>".into());
        let body = body.ok_or_else(|| RuntimeError::ReactionRegistration {
            reaction: display_name.clone(),
            what: "a reaction requires a body".into(),
        })?;

        match (&body, is_mutation) {
            (ReactionBody::Mutation(_), false) => {
                return Err(RuntimeError::ReactionRegistration {
                    reaction: display_name,
                    what: "mutation bodies must be registered via `mutation()`".into(),
                });
            }
            (ReactionBody::Plain(_), true) | (ReactionBody::Procedure(_), true) => {
                return Err(RuntimeError::ReactionRegistration {
                    reaction: display_name,
                    what: "`mutation()` requires a mutation body".into(),
                });
            }
            _ => {}
        }

        if triggers.is_empty() {
            return Err(RuntimeError::ReactionRegistration {
                reaction: display_name,
                what: "a reaction requires at least one trigger".into(),
            });
        }

        let key = asm.env.register_reaction(
            name,
            asm.reactor,
            is_mutation,
            triggers,
            reads,
            effects,
            schedulables,
            body,
            deadline,
        )?;
        asm.creations.reactions.push(key);
        Ok(key)
    }
}

/// Undo log of one mutation: everything it created or removed, so a failed
/// mutation leaves no trace.
#[derive(Default)]
pub(crate) struct Journal {
    pub creations: Creations,
    pub removed_bindings: Vec<(PortKey, PortKey)>,
}

impl Journal {
    pub fn is_empty(&self) -> bool {
        self.creations.is_empty() && self.removed_bindings.is_empty()
    }

    /// Undo all recorded changes in reverse order, then restore the graph.
    pub fn rollback(self, env: &mut Env) -> Result<(), RuntimeError> {
        let Journal {
            creations,
            removed_bindings,
        } = self;

        for &(src, dst) in creations.bindings.iter().rev() {
            env.bindings.unbind(src, dst);
        }
        for &(src, dst) in removed_bindings.iter().rev() {
            env.bindings.bind_raw(src, dst);
        }
        for &key in creations.reactions.iter().rev() {
            env.remove_reaction(key);
        }
        for &key in creations.ports.iter().rev() {
            env.remove_port(key);
        }
        for &key in creations.actions.iter().rev() {
            env.remove_action(key);
        }
        for &key in creations.reactors.iter().rev() {
            env.remove_reactor(key);
        }
        env.rebuild_graph()
    }

    /// Make the surviving changes effective; returns whether the topology
    /// changed and remaining reactions must be re-levelled.
    pub fn commit(&self, env: &mut Env) -> Result<bool, RuntimeError> {
        if self.is_empty() {
            return Ok(false);
        }
        env.rebuild_graph()?;
        Ok(true)
    }
}

/// Opaque mediator handed to mutation bodies: the owning reactor's identity
/// key bound to `connect`/`disconnect`/`add_sibling`.
pub struct MutationContext<'c, 'a> {
    pub(crate) ctx: &'c mut Context<'a>,
    pub(crate) journal: Journal,
}

impl<'c, 'a> std::ops::Deref for MutationContext<'c, 'a> {
    type Target = Context<'a>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<'c, 'a> std::ops::DerefMut for MutationContext<'c, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl<'c, 'a> MutationContext<'c, 'a> {
    pub(crate) fn new(ctx: &'c mut Context<'a>) -> Self {
        Self {
            ctx,
            journal: Journal::default(),
        }
    }

    /// Wire `src` to `dst` under the mutating reactor's authority.
    pub fn connect(
        &mut self,
        src: impl PortHandle,
        dst: impl PortHandle,
    ) -> Result<(), RuntimeError> {
        let scope = ConnScope::Mutation(self.ctx.reactor);
        let (src, dst) = (src.port_key(), dst.port_key());
        connection::establish(self.ctx.env, scope, src, dst)?;
        self.journal.creations.bindings.push((src, dst));
        Ok(())
    }

    /// Remove the binding `src -> dst`; absent bindings are a no-op.
    pub fn disconnect(
        &mut self,
        src: impl PortHandle,
        dst: impl PortHandle,
    ) -> Result<(), RuntimeError> {
        let scope = ConnScope::Mutation(self.ctx.reactor);
        let removed =
            connection::sever(self.ctx.env, scope, src.port_key(), Some(dst.port_key()))?;
        self.journal.removed_bindings.extend(removed);
        Ok(())
    }

    /// Remove every binding leaving `src`.
    pub fn disconnect_all(&mut self, src: impl PortHandle) -> Result<(), RuntimeError> {
        let scope = ConnScope::Mutation(self.ctx.reactor);
        let removed = connection::sever(self.ctx.env, scope, src.port_key(), None)?;
        self.journal.removed_bindings.extend(removed);
        Ok(())
    }

    pub fn can_connect(&self, src: impl PortHandle, dst: impl PortHandle) -> bool {
        connection::can(
            self.ctx.env,
            ConnScope::Mutation(self.ctx.reactor),
            src.port_key(),
            dst.port_key(),
        )
    }

    /// Construct a new reactor at the same containment level as the
    /// mutating reactor. It becomes effective at the end of the mutation;
    /// its startup fires at the next microstep.
    pub fn add_sibling<S2: ReactorState, R>(
        &mut self,
        name: &str,
        state: S2,
        f: impl FnOnce(&mut Assembler<'_, S2>) -> Result<R, RuntimeError>,
    ) -> Result<(ReactorKey, R), RuntimeError> {
        let owner = self.ctx.reactor;
        let owner_reactor = &self.ctx.env.reactors[owner];
        if matches!(
            owner_reactor.lifecycle(),
            Lifecycle::ShuttingDown | Lifecycle::Terminated
        ) {
            return Err(RuntimeError::TerminalReactor {
                reactor: self.ctx.env.fqn(owner),
            });
        }
        let parent = owner_reactor
            .parent()
            .ok_or_else(|| RuntimeError::OrphanReactor { name: name.into() })?;

        let (key, out) = assemble(
            self.ctx.env,
            parent,
            name,
            state,
            None,
            &mut self.journal.creations,
            f,
        )?;
        self.ctx.outcome.spawned.push(key);
        Ok((key, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{App, Config};

    #[test]
    fn test_trigger_out_of_scope() {
        let mut app = App::new("app", Config::default());
        let (_, foreign_out) = app
            .reactor("other", (), |asm| asm.output::<u32>("out"))
            .unwrap();

        let res = app.reactor("r", (), |asm| {
            asm.reaction(Some("bad"))
                .with_trigger(foreign_out)
                .with_body(|_ctx, _state: &mut ()| Ok(()))
                .finish()
        });
        assert!(matches!(
            res,
            Err(RuntimeError::TriggerOutOfScope { trigger, .. }) if trigger == "app.other.out"
        ));
    }

    #[test]
    fn test_reaction_without_trigger() {
        let mut app = App::new("app", Config::default());
        let res = app.reactor("r", (), |asm| {
            let out = asm.output::<u32>("out")?;
            asm.reaction(None)
                .with_effect(out)
                .with_body(|_ctx, _state: &mut ()| Ok(()))
                .finish()
        });
        assert!(matches!(res, Err(RuntimeError::ReactionRegistration { .. })));
    }

    #[test]
    fn test_own_input_cannot_be_effect() {
        let mut app = App::new("app", Config::default());
        let res = app.reactor("r", (), |asm| {
            let input = asm.input::<u32>("in")?;
            let startup = asm.startup();
            asm.reaction(None)
                .with_trigger(startup)
                .with_effect(input)
                .with_body(|_ctx, _state: &mut ()| Ok(()))
                .finish()
        });
        assert!(matches!(res, Err(RuntimeError::ReactionRegistration { .. })));
    }

    #[test]
    fn test_foreign_effect_is_invalid_key() {
        let mut app = App::new("app", Config::default());
        let (_, foreign_out) = app
            .reactor("other", (), |asm| asm.output::<u32>("out"))
            .unwrap();
        let res = app.reactor("r", (), |asm| {
            let startup = asm.startup();
            asm.reaction(None)
                .with_trigger(startup)
                .with_effect(foreign_out)
                .with_body(|_ctx, _state: &mut ()| Ok(()))
                .finish()
        });
        assert!(matches!(res, Err(RuntimeError::InvalidKey { .. })));
    }

    #[test]
    fn test_multiple_triggers_on_procedure() {
        let mut app = App::new("app", Config::default());
        let res = app.reactor("r", (), |asm| {
            let callee = asm.callee::<u32, u32>("serve")?;
            let startup = asm.startup();
            asm.reaction(Some("proc"))
                .with_trigger(callee)
                .with_trigger(startup)
                .with_procedure_body(|_ctx, _state: &mut (), arg: u32| Ok(arg))
                .finish()
        });
        assert!(matches!(
            res,
            Err(RuntimeError::MultipleTriggersOnProcedure { .. })
        ));
    }

    #[test]
    fn test_mutation_body_mismatch() {
        let mut app = App::new("app", Config::default());
        let res = app.reactor("r", (), |asm| {
            let startup = asm.startup();
            asm.mutation(Some("m"))
                .with_trigger(startup)
                .with_body(|_ctx, _state: &mut ()| Ok(()))
                .finish()
        });
        assert!(matches!(res, Err(RuntimeError::ReactionRegistration { .. })));

        let res = app.reactor("r2", (), |asm| {
            let startup = asm.startup();
            asm.reaction(Some("m"))
                .with_trigger(startup)
                .with_mutation_body(|_ctx, _state: &mut ()| Ok(()))
                .finish()
        });
        assert!(matches!(res, Err(RuntimeError::ReactionRegistration { .. })));
    }

    #[test]
    fn test_journal_rollback() {
        use crate::connection::{self, ConnScope};

        let mut env = Env::new("app");
        let root = env.root();
        let mut creations = Creations::default();
        let (_, out) = assemble(&mut env, root, "a", (), None, &mut creations, |asm| {
            asm.output::<u32>("out")
        })
        .unwrap();
        env.rebuild_graph().unwrap();

        let mut journal = Journal::default();
        let (_, spawned_in) = assemble(
            &mut env,
            root,
            "spawned",
            (),
            None,
            &mut journal.creations,
            |asm| asm.input::<u32>("in"),
        )
        .unwrap();
        connection::establish(
            &mut env,
            ConnScope::Construction(root),
            out.port_key(),
            spawned_in.port_key(),
        )
        .unwrap();
        journal
            .creations
            .bindings
            .push((out.port_key(), spawned_in.port_key()));

        assert!(env.find_reactor_by_name("spawned").is_some());
        assert!(env.bindings.inward(spawned_in.port_key()).is_some());

        journal.rollback(&mut env).unwrap();
        assert!(env.find_reactor_by_name("spawned").is_none());
        assert!(env.bindings.inward(spawned_in.port_key()).is_none());
        assert!(env.find_reactor_by_name("a").is_some());
    }
}

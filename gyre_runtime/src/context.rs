//! Scheduler context passed into reaction bodies, and the thread-safe
//! handle for scheduling physical actions from outside the scheduler.

use std::{marker::PhantomData, time::Duration};

use crossbeam_channel::Sender;
use gyre_core::{
    keys::{PortKey, ReactionKey, ReactorKey},
    time::{Tag, Timestamp},
};

use crate::{
    action::ActionRef,
    data::PortData,
    env::Env,
    error::RuntimeError,
    event::{PhysicalEvent, TaggedEvent},
    fed::{FederatePortAction, TagAuthority},
    port::{CallerPort, Port, ValuePort, WritablePort},
    reaction::ReactionBody,
};

/// Everything a finished reaction firing hands back to the scheduler.
#[derive(Default)]
pub(crate) struct ReactionOutcome {
    /// Same-tag reactions triggered by port writes
    pub triggered: Vec<ReactionKey>,
    /// Events scheduled for future tags
    pub scheduled: Vec<TaggedEvent>,
    /// Ports set during the firing; cleared at tag advance
    pub set_ports: Vec<PortKey>,
    /// Actions made present at the current tag; cleared at tag advance
    pub staged_actions: Vec<gyre_core::keys::ActionKey>,
    /// A cooperative stop was requested
    pub stop_requested: bool,
    /// The mutation changed the graph topology
    pub graph_changed: bool,
    /// Reactors spawned by a mutation, pending startup
    pub spawned: Vec<ReactorKey>,
}

impl ReactionOutcome {
    pub fn merge(&mut self, other: ReactionOutcome) {
        self.triggered.extend(other.triggered);
        self.scheduled.extend(other.scheduled);
        self.set_ports.extend(other.set_ports);
        self.staged_actions.extend(other.staged_actions);
        self.stop_requested |= other.stop_requested;
        self.graph_changed |= other.graph_changed;
        self.spawned.extend(other.spawned);
    }
}

/// Scheduler context passed into reaction bodies.
pub struct Context<'a> {
    pub(crate) env: &'a mut Env,
    pub(crate) start_time: Timestamp,
    pub(crate) tag: Tag,
    pub(crate) reaction: ReactionKey,
    pub(crate) reactor: ReactorKey,
    pub(crate) outcome: ReactionOutcome,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        env: &'a mut Env,
        start_time: Timestamp,
        tag: Tag,
        reaction: ReactionKey,
        reactor: ReactorKey,
    ) -> Self {
        Self {
            env,
            start_time,
            tag,
            reaction,
            reactor,
            outcome: ReactionOutcome::default(),
        }
    }

    pub(crate) fn into_outcome(self) -> ReactionOutcome {
        self.outcome
    }

    pub fn get_tag(&self) -> Tag {
        self.tag
    }

    pub fn get_start_time(&self) -> Timestamp {
        self.start_time
    }

    /// The current logical time, frozen during the execution of a reaction.
    pub fn get_logical_time(&self) -> Timestamp {
        self.tag.to_logical_time(self.start_time)
    }

    pub fn get_physical_time(&self) -> Timestamp {
        Timestamp::now()
    }

    pub fn get_elapsed_logical_time(&self) -> Duration {
        self.tag.get_offset().into()
    }

    pub fn get_elapsed_physical_time(&self) -> Duration {
        Timestamp::now()
            .checked_duration_since(self.start_time)
            .unwrap_or_default()
    }

    /// The index of the owning reactor within its bank, if any.
    pub fn bank_index(&self) -> Option<usize> {
        self.env.reactors[self.reactor]
            .bank_info()
            .map(|info| info.idx)
    }

    /// Read a port's value at the current tag; absent ports read as `None`.
    pub fn get<T: PortData>(&self, port: impl ValuePort<T>) -> Option<T> {
        let port = self.env.ports.get(port.port_key())?;
        port.downcast_ref::<Port<T>>()
            .expect("port handle type diverged from arena slot")
            .get()
            .clone()
    }

    pub fn is_present<T: PortData>(&self, port: impl ValuePort<T>) -> bool {
        self.env
            .ports
            .get(port.port_key())
            .is_some_and(|p| p.is_present())
    }

    /// Set a port's value, marking it present for the remainder of the tag
    /// and propagating along connections to all downstream ports.
    ///
    /// Only ports the firing reaction declared as effects are writable;
    /// everything else fails with [`RuntimeError::InvalidKey`].
    pub fn set<T: PortData>(
        &mut self,
        port: impl Into<WritablePort<T>>,
        value: T,
    ) -> Result<(), RuntimeError> {
        let port: WritablePort<T> = port.into();
        let key = port.key;

        if !self.env.reactions[self.reaction].effects().contains(&key) {
            return Err(RuntimeError::InvalidKey {
                what: format!(
                    "set({}) by {}",
                    self.env.port_fqn(key),
                    self.env.reaction_fqn(self.reaction)
                ),
            });
        }

        let mut affected = vec![key];
        affected.extend(self.env.bindings.downstream(key));

        for &p in &affected {
            let Some(slot) = self.env.ports.get_mut(p) else {
                continue;
            };
            slot.downcast_mut::<Port<T>>()
                .ok_or(RuntimeError::TypeMismatch {
                    expected: std::any::type_name::<T>(),
                    found: "connected port of a different type",
                })?
                .set(value.clone());
            self.outcome.set_ports.push(p);
            if let Some(triggered) = self.env.port_triggers.get(p) {
                self.outcome
                    .triggered
                    .extend(triggered.iter().copied().filter(|&r| {
                        !self.env.reactions[r].is_procedure()
                    }));
            }
        }
        Ok(())
    }

    /// Read an action's value at the current tag.
    pub fn get_action<T: PortData>(&self, action: impl Into<ActionRef<T>>) -> Option<T> {
        let action = action.into();
        let slot = self.env.actions.get(action.key)?;
        slot.downcast_ref::<crate::action::Action<T>>()
            .expect("action handle type diverged from arena slot")
            .get()
            .clone()
    }

    /// Schedule the action to trigger at a future tag.
    ///
    /// Logical actions base the tag on the current logical tag, physical
    /// actions on the wall clock. A zero total delay advances the
    /// microstep. Events closer to the previous one than the action's
    /// minimum spacing are deferred to `previous + min_spacing`.
    pub fn schedule<T: PortData>(
        &mut self,
        action: ActionRef<T>,
        value: Option<T>,
        delay: Option<Duration>,
    ) -> Result<(), RuntimeError> {
        if !self.env.reactions[self.reaction]
            .schedulables()
            .contains(&action.key)
        {
            return Err(RuntimeError::InvalidKey {
                what: format!(
                    "schedule({}) by {}",
                    self.env.action_fqn(action.key),
                    self.env.reaction_fqn(self.reaction)
                ),
            });
        }

        let slot = self
            .env
            .actions
            .get_mut(action.key)
            .ok_or(RuntimeError::InconsistentState {
                what: "scheduled action was removed".into(),
            })?;

        let total = slot
            .min_delay()
            .checked_add(delay.unwrap_or_default())
            .ok_or(gyre_core::time::TagError::TagOverflow)?;

        let base = if slot.kind().is_logical() {
            self.tag
        } else {
            Tag::now(self.start_time)
        };
        let mut new_tag = if total.is_zero() {
            base.delay(None)?
        } else {
            base.delay(Some(total))?
        };

        // defer events violating the minimum inter-arrival time; same-offset
        // microstep advances are exempt
        if let Some(last) = slot.last_scheduled() {
            if new_tag.get_offset() > last.get_offset() {
                let gap = new_tag
                    .get_offset()
                    .checked_duration_since(last.get_offset())
                    .unwrap_or_default();
                if gap < slot.min_spacing() {
                    new_tag = Tag::new(
                        last.get_offset().checked_offset(slot.min_spacing())?,
                        0,
                    );
                }
            }
        }
        slot.set_last_scheduled(new_tag);

        tracing::trace!(action = %self.env.action_fqn(action.key), tag = %new_tag, "Scheduling");
        self.outcome.scheduled.push(TaggedEvent {
            tag: new_tag,
            trigger: action.key,
            value: value.map(|v| Box::new(v) as _),
        });
        Ok(())
    }

    /// Schedule a federate port action at an externally supplied tag. The
    /// intended tag must lie strictly after the current tag, or at/after it
    /// when the authority's last grant was provisional.
    pub fn schedule_federated<T: PortData>(
        &mut self,
        action: FederatePortAction<T>,
        value: Option<T>,
        intended: Tag,
        authority: &TagAuthority,
    ) -> Result<(), RuntimeError> {
        if !self.env.reactions[self.reaction]
            .schedulables()
            .contains(&action.key)
        {
            return Err(RuntimeError::InvalidKey {
                what: format!(
                    "schedule({}) by {}",
                    self.env.action_fqn(action.key),
                    self.env.reaction_fqn(self.reaction)
                ),
            });
        }
        if !authority.allows(intended, self.tag) {
            return Err(RuntimeError::FederatedTagViolation {
                intended,
                current: self.tag,
            });
        }
        if let Some(slot) = self.env.actions.get_mut(action.key) {
            slot.set_last_scheduled(intended);
        }

        if intended == self.tag {
            // a provisional grant delivers within the tag being processed
            let slot = self.env.actions.get_mut(action.key).ok_or(
                RuntimeError::InconsistentState {
                    what: "scheduled action was removed".into(),
                },
            )?;
            slot.stage(value.map(|v| Box::new(v) as _))?;
            self.outcome.staged_actions.push(action.key);
            if let Some(triggered) = self.env.action_triggers.get(action.key) {
                self.outcome.triggered.extend(triggered.iter().copied());
            }
            return Ok(());
        }

        self.outcome.scheduled.push(TaggedEvent {
            tag: intended,
            trigger: action.key,
            value: value.map(|v| Box::new(v) as _),
        });
        Ok(())
    }

    /// Synchronously invoke the procedure bound to `port`, returning its
    /// result. The callee executes within the caller's firing at the same
    /// tag; only the wall clock advances.
    pub fn call<A: PortData, R: PortData>(
        &mut self,
        port: CallerPort<A, R>,
        arg: A,
    ) -> Result<R, RuntimeError> {
        if !self.env.reactions[self.reaction].effects().contains(&port.key) {
            return Err(RuntimeError::InvalidKey {
                what: format!(
                    "call({}) by {}",
                    self.env.port_fqn(port.key),
                    self.env.reaction_fqn(self.reaction)
                ),
            });
        }

        let callee = self
            .env
            .bindings
            .outward(port.key)
            .next()
            .ok_or_else(|| RuntimeError::UnboundCallerPort {
                port: self.env.port_fqn(port.key),
            })?;
        let proc_key = self
            .env
            .port_triggers
            .get(callee)
            .and_then(|v| v.first())
            .copied()
            .ok_or_else(|| RuntimeError::UnboundCallerPort {
                port: self.env.port_fqn(callee),
            })?;

        let (body, callee_reactor, callee_fqn) = {
            let reaction = &self.env.reactions[proc_key];
            let ReactionBody::Procedure(body) = reaction.body() else {
                return Err(RuntimeError::InconsistentState {
                    what: format!(
                        "callee port {} is not bound to a procedure",
                        self.env.port_fqn(callee)
                    ),
                });
            };
            (
                body.clone(),
                reaction.reactor(),
                self.env.reaction_fqn(proc_key),
            )
        };

        let mut state = self.env.reactors[callee_reactor].state.take().ok_or(
            RuntimeError::InconsistentState {
                what: format!("procedure '{callee_fqn}' is already on the call stack"),
            },
        )?;

        let (outcome, result) = {
            let mut sub = Context::new(
                &mut *self.env,
                self.start_time,
                self.tag,
                proc_key,
                callee_reactor,
            );
            let result = body(&mut sub, state.as_mut(), Box::new(arg));
            (sub.into_outcome(), result)
        };
        self.env.reactors[callee_reactor].state = Some(state);
        self.outcome.merge(outcome);

        let value = result.map_err(|source| RuntimeError::ReactionFailure {
            reaction: callee_fqn,
            source,
        })?;
        value
            .downcast::<R>()
            .map(|boxed| *boxed)
            .map_err(|_| RuntimeError::TypeMismatch {
                expected: std::any::type_name::<R>(),
                found: "procedure return value",
            })
    }

    /// Request a cooperative stop at the end of the current tag. Remaining
    /// events at later tags are discarded except shutdown handlers.
    pub fn request_stop(&mut self) {
        self.outcome.stop_requested = true;
    }
}

/// Cloneable, thread-safe handle scheduling one physical action from
/// outside the scheduler thread. Events are serialized onto the main event
/// queue through a channel supporting concurrent producers.
pub struct PhysicalScheduler<T: PortData> {
    pub(crate) action: gyre_core::keys::ActionKey,
    pub(crate) min_delay: Duration,
    pub(crate) tx: Sender<PhysicalEvent>,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

impl<T: PortData> Clone for PhysicalScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            action: self.action,
            min_delay: self.min_delay,
            tx: self.tx.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: PortData> std::fmt::Debug for PhysicalScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PhysicalScheduler({:?})", self.action)
    }
}

impl<T: PortData> PhysicalScheduler<T> {
    /// Schedule the action at `wall clock now + min_delay + delay`.
    pub fn schedule(&self, value: T, delay: Option<Duration>) -> Result<(), RuntimeError> {
        let when = Timestamp::now()
            .saturating_offset(self.min_delay.saturating_add(delay.unwrap_or_default()));
        self.tx
            .send(PhysicalEvent::trigger(
                when,
                self.action,
                Some(Box::new(value)),
            ))
            .map_err(|_| RuntimeError::SchedulerDisconnected)
    }
}

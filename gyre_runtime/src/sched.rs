//! The single-threaded cooperative scheduler: drains the tag-ordered event
//! queue, fires triggered reactions in precedence order, and carries the
//! startup/shutdown discipline.

use std::{collections::BTreeSet, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use gyre_core::{
    keys::{ActionKey, ReactionKey},
    time::{Tag, Timestamp},
};

use crate::{
    action::ActionKind,
    assembler::MutationContext,
    context::{Context, ReactionOutcome},
    env::Env,
    error::RuntimeError,
    event::{EventQueue, PhysicalEvent, TaggedEvent},
    graph::Level,
    reaction::ReactionBody,
    reactor::Lifecycle,
};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Advance logical time as fast as possible, without wall-clock
    /// synchronization
    pub fast: bool,
    /// Keep the scheduler alive waiting for asynchronous physical events
    /// once the queue runs dry
    pub keep_alive: bool,
    /// Stop processing events whose time lies beyond this bound
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fast: true,
            keep_alive: false,
            timeout: None,
        }
    }
}

impl Config {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }
}

/// Firing-set ordering: level, then containment depth, then intra-reactor
/// registration order. A pure function of the graph, hence deterministic.
type FiringEntry = (Level, usize, (u8, usize), ReactionKey);

pub(crate) struct Scheduler {
    env: Env,
    config: Config,
    event_queue: EventQueue,
    phys_rx: Receiver<PhysicalEvent>,
    /// Initial wall-clock time
    start_time: Timestamp,
    /// The last tag handed to `process_tag`; processed tags are strictly
    /// monotonically increasing
    last_processed: Option<Tag>,
    stop_requested: bool,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("env", &self.env)
            .field("event_queue", &self.event_queue)
            .field("start_time", &self.start_time)
            .field("config", &self.config)
            .finish()
    }
}

impl Scheduler {
    pub fn new(env: Env, config: Config, phys_rx: Receiver<PhysicalEvent>) -> Self {
        Self {
            env,
            config,
            event_queue: EventQueue::default(),
            phys_rx,
            start_time: Timestamp::now(),
            last_processed: None,
            stop_requested: false,
        }
    }

    pub fn into_env(self) -> Env {
        self.env
    }

    /// Bootstrap and run until termination.
    #[tracing::instrument(skip(self))]
    pub fn event_loop(&mut self) -> Result<(), RuntimeError> {
        self.start_time = Timestamp::now();
        self.startup()?;

        let shutdown_tag = loop {
            self.drain_physical()?;

            if self.stop_requested {
                break self.next_microstep_tag()?;
            }

            let Some(next_tag) = self.event_queue.peek_tag() else {
                if self.config.keep_alive && self.wait_for_physical()? {
                    continue;
                }
                tracing::trace!("No more events in queue. -> Terminate!");
                break self.next_microstep_tag()?;
            };

            if let Some(timeout) = self.config.timeout {
                if next_tag > Tag::new(timeout, usize::MAX) {
                    tracing::debug!(?timeout, "Remaining events lie beyond the timeout");
                    break self.next_microstep_tag()?;
                }
            }

            if !self.config.fast && self.synchronize_wall_clock(next_tag)? {
                // woken by an asynchronous event; re-evaluate the queue minimum
                continue;
            }

            let events = self.event_queue.pop_all_at(next_tag);
            self.process_tag(next_tag, events)?;

            if self.stop_requested {
                break self.next_microstep_tag()?;
            }
        };

        self.shutdown(shutdown_tag)
    }

    /// Seed startup events and first timer firings, and activate the
    /// hierarchy.
    #[tracing::instrument(skip(self))]
    fn startup(&mut self) -> Result<(), RuntimeError> {
        self.env.rebuild_graph()?;
        self.env.set_all_lifecycles(Lifecycle::Active);

        let startups: Vec<ActionKey> =
            self.env.reactors.values().map(|r| r.startup).collect();
        for action in startups {
            self.event_queue.push(TaggedEvent {
                tag: Tag::ORIGIN,
                trigger: action,
                value: None,
            });
        }

        let timers: Vec<(ActionKey, Tag)> = self
            .env
            .actions
            .iter()
            .filter_map(|(key, action)| match action.kind() {
                ActionKind::Timer(spec) => Some((key, Tag::new(spec.offset, 0))),
                _ => None,
            })
            .collect();
        for (action, tag) in timers {
            if self.within_timeout(tag) {
                self.event_queue.push(TaggedEvent {
                    tag,
                    trigger: action,
                    value: None,
                });
            }
        }

        tracing::info!(tag = %Tag::ORIGIN, "Starting the execution.");
        Ok(())
    }

    fn within_timeout(&self, tag: Tag) -> bool {
        self.config
            .timeout
            .is_none_or(|timeout| Duration::from(tag.get_offset()) <= timeout)
    }

    /// Shutdown one microstep past the last processed tag.
    fn next_microstep_tag(&self) -> Result<Tag, RuntimeError> {
        Ok(match self.last_processed {
            Some(tag) => tag.delay(None)?,
            None => Tag::ORIGIN,
        })
    }

    /// Push all pending asynchronous events into the queue.
    fn drain_physical(&mut self) -> Result<(), RuntimeError> {
        while let Ok(event) = self.phys_rx.try_recv() {
            self.handle_physical(event)?;
        }
        Ok(())
    }

    fn handle_physical(&mut self, event: PhysicalEvent) -> Result<(), RuntimeError> {
        match event {
            PhysicalEvent::Trigger {
                when,
                action,
                value,
            } => {
                let mut tag = Tag::absolute(self.start_time, when);
                if let Some(last) = self.last_processed {
                    if tag <= last {
                        tag = last.delay(None)?;
                    }
                }
                tracing::debug!(action = %self.env.action_fqn(action), tag = %tag, "Physical event");
                self.event_queue.push(TaggedEvent {
                    tag,
                    trigger: action,
                    value,
                });
            }
            PhysicalEvent::Stop => {
                tracing::info!("Stop requested");
                self.stop_requested = true;
            }
        }
        Ok(())
    }

    /// Block until a physical event arrives (or the timeout elapses).
    /// Returns true when the loop should re-evaluate the queue.
    fn wait_for_physical(&mut self) -> Result<bool, RuntimeError> {
        if let Some(timeout) = self.config.timeout {
            let deadline = self.start_time.saturating_offset(timeout);
            let Some(remaining) = deadline.checked_duration_since(Timestamp::now()) else {
                return Ok(false);
            };
            tracing::debug!(?remaining, "Waiting for async event until timeout.");
            match self.phys_rx.recv_timeout(remaining) {
                Ok(event) => {
                    self.handle_physical(event)?;
                    Ok(true)
                }
                Err(_) => Ok(false),
            }
        } else {
            tracing::debug!("Waiting indefinitely for async event.");
            match self.phys_rx.recv() {
                Ok(event) => {
                    self.handle_physical(event)?;
                    Ok(true)
                }
                Err(_) => Ok(false),
            }
        }
    }

    /// Wait until the wall clock reaches the tag. Returns true when an
    /// asynchronous event interrupted the wait.
    fn synchronize_wall_clock(&mut self, tag: Tag) -> Result<bool, RuntimeError> {
        let target = tag.to_logical_time(self.start_time);
        let now = Timestamp::now();

        if now < target {
            let advance = target - now;
            tracing::debug!(?advance, "Need to sleep");
            match self.phys_rx.recv_timeout(advance) {
                Ok(event) => {
                    tracing::debug!("Sleep interrupted by async event");
                    self.handle_physical(event)?;
                    return Ok(true);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if let Some(remaining) = target.checked_duration_since(Timestamp::now()) {
                        std::thread::sleep(remaining);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        Ok(false)
    }

    fn firing_entry(&self, key: ReactionKey) -> FiringEntry {
        let level = self.env.graph.level(key);
        let (depth, order) = self.env.firing_order(key);
        (level, depth, order, key)
    }

    /// Process all reactions triggered at `tag` in increasing order of
    /// level; within a level, by containment depth and registration order.
    #[tracing::instrument(skip(self, events), fields(tag = %tag))]
    fn process_tag(&mut self, tag: Tag, events: Vec<TaggedEvent>) -> Result<(), RuntimeError> {
        debug_assert!(
            self.last_processed.is_none_or(|last| tag > last),
            "processed tags must be strictly increasing"
        );

        let mut firing: BTreeSet<FiringEntry> = BTreeSet::new();
        let mut staged: Vec<ActionKey> = Vec::new();
        let mut set_ports = Vec::new();

        for event in events {
            let Some(action) = self.env.actions.get_mut(event.trigger) else {
                // the trigger was removed by an earlier mutation
                continue;
            };
            action.stage(event.value)?;
            let kind = action.kind();
            staged.push(event.trigger);

            if let ActionKind::Timer(spec) = kind {
                if spec.is_periodic() {
                    if let Ok(offset) = tag.get_offset().checked_offset(spec.period) {
                        let next = Tag::new(offset, 0);
                        if self.within_timeout(next) {
                            self.event_queue.push(TaggedEvent {
                                tag: next,
                                trigger: event.trigger,
                                value: None,
                            });
                        }
                    }
                }
            }

            for &key in self
                .env
                .action_triggers
                .get(event.trigger)
                .into_iter()
                .flatten()
            {
                firing.insert(self.firing_entry(key));
            }
        }

        while let Some((level, _, _, key)) = firing.pop_first() {
            let Some(reaction) = self.env.reactions.get(key) else {
                continue;
            };
            if reaction.is_procedure() {
                continue;
            }
            if !self.env.reactors[reaction.reactor()].is_runnable() {
                continue;
            }

            tracing::trace!(level = %level, reaction = %self.env.reaction_fqn(key), "Executing");
            let outcome = self.execute_reaction(key, tag)?;

            for r in outcome.triggered {
                firing.insert(self.firing_entry(r));
            }
            for event in outcome.scheduled {
                self.event_queue.push(event);
            }
            set_ports.extend(outcome.set_ports);
            staged.extend(outcome.staged_actions);
            self.stop_requested |= outcome.stop_requested;

            for spawned in outcome.spawned {
                if let Some(reactor) = self.env.reactors.get_mut(spawned) {
                    reactor.set_lifecycle(Lifecycle::Active);
                    let startup = reactor.startup;
                    self.event_queue.push(TaggedEvent {
                        tag: tag.delay(None)?,
                        trigger: startup,
                        value: None,
                    });
                }
            }

            if outcome.graph_changed {
                // the mutation re-shaped the graph; re-level the remaining
                // firing set under the new topology
                let remaining: Vec<ReactionKey> =
                    firing.iter().map(|&(_, _, _, key)| key).collect();
                firing.clear();
                for key in remaining {
                    if self.env.reactions.contains_key(key) {
                        firing.insert(self.firing_entry(key));
                    }
                }
            }
        }

        // clear presence at tag advance
        for port in set_ports {
            if let Some(slot) = self.env.ports.get_mut(port) {
                slot.cleanup();
            }
        }
        for action in staged {
            if let Some(slot) = self.env.actions.get_mut(action) {
                slot.cleanup();
            }
        }

        self.last_processed = Some(tag);
        Ok(())
    }

    fn execute_reaction(
        &mut self,
        key: ReactionKey,
        tag: Tag,
    ) -> Result<ReactionOutcome, RuntimeError> {
        let (reactor_key, body, deadline, fqn) = {
            let reaction = &self.env.reactions[key];
            (
                reaction.reactor(),
                reaction.body().clone(),
                reaction.deadline().cloned(),
                self.env.reaction_fqn(key),
            )
        };

        // deadline check happens before invocation; a violation swaps in the
        // handler when one exists, otherwise the body still runs
        let mut handler = None;
        if let Some(deadline) = deadline {
            let physical_elapsed = Timestamp::now()
                .checked_duration_since(self.start_time)
                .unwrap_or_default();
            let lag = physical_elapsed.saturating_sub(tag.get_offset().into());
            if lag > deadline.delta {
                if deadline.handler.is_some() {
                    tracing::debug!(reaction = %fqn, ?lag, "Deadline missed; running handler");
                    handler = deadline.handler;
                } else {
                    tracing::warn!(
                        "{}",
                        RuntimeError::DeadlineViolation {
                            reaction: fqn.clone(),
                            lag,
                        }
                    );
                }
            }
        }

        let mut state = self.env.reactors[reactor_key].state.take().ok_or_else(|| {
            RuntimeError::InconsistentState {
                what: format!("state of '{fqn}' is unavailable"),
            }
        })?;

        let (mut outcome, result, journal) = match (handler, body) {
            (Some(handler), _) => {
                let mut ctx = Context::new(&mut self.env, self.start_time, tag, key, reactor_key);
                let result = handler(&mut ctx, state.as_mut());
                (ctx.into_outcome(), result, None)
            }
            (None, ReactionBody::Plain(f)) => {
                let mut ctx = Context::new(&mut self.env, self.start_time, tag, key, reactor_key);
                let result = f(&mut ctx, state.as_mut());
                (ctx.into_outcome(), result, None)
            }
            (None, ReactionBody::Mutation(f)) => {
                let mut ctx = Context::new(&mut self.env, self.start_time, tag, key, reactor_key);
                let mut mctx = MutationContext::new(&mut ctx);
                let result = f(&mut mctx, state.as_mut());
                let journal = mctx.journal;
                (ctx.into_outcome(), result, Some(journal))
            }
            (None, ReactionBody::Procedure(_)) => {
                // procedures never enter the firing set
                (ReactionOutcome::default(), Ok(()), None)
            }
        };

        self.env.reactors[reactor_key].state = Some(state);

        match result {
            Ok(()) => {
                if let Some(journal) = journal {
                    outcome.graph_changed = journal.commit(&mut self.env)?;
                }
                Ok(outcome)
            }
            Err(source) => {
                // roll back whatever a failed mutation had already applied
                if let Some(journal) = journal {
                    if !journal.is_empty() {
                        tracing::debug!(reaction = %fqn, "Rolling back failed mutation");
                    }
                    journal.rollback(&mut self.env)?;
                }
                Err(RuntimeError::ReactionFailure {
                    reaction: fqn,
                    source,
                })
            }
        }
    }

    /// Fire shutdown-triggered reactions at `tag`, then terminate the
    /// hierarchy.
    #[tracing::instrument(skip(self))]
    fn shutdown(&mut self, tag: Tag) -> Result<(), RuntimeError> {
        tracing::info!(tag = %tag, "Shutting down.");
        self.env.set_all_lifecycles(Lifecycle::ShuttingDown);

        let shutdowns: Vec<ActionKey> =
            self.env.reactors.values().map(|r| r.shutdown).collect();
        let events = shutdowns
            .into_iter()
            .map(|action| TaggedEvent {
                tag,
                trigger: action,
                value: None,
            })
            .collect();
        self.process_tag(tag, events)?;

        self.env.set_all_lifecycles(Lifecycle::Terminated);

        if !self.event_queue.is_empty() {
            tracing::warn!(
                "---- There are {} unprocessed future events on the event queue.",
                self.event_queue.len()
            );
        }

        tracing::info!("---- Elapsed logical time: {:?}", Duration::from(tag.get_offset()));
        let physical_elapsed = Timestamp::now().checked_duration_since(self.start_time);
        tracing::info!("---- Elapsed physical time: {:?}", physical_elapsed);
        tracing::info!("Scheduler has been shut down.");
        Ok(())
    }
}

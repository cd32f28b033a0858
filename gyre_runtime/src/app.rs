//! The `App` is the unique root of the reactor hierarchy. It assembles the
//! program, owns the runtime state until `run`, and carries the
//! success/fail callbacks invoked at termination.

use std::marker::PhantomData;

use crossbeam_channel::{Receiver, Sender};

use crate::{
    action::{ActionKind, ActionOrigin, ActionRef},
    assembler::{self, Assembler, Creations},
    connection::{self, ConnScope},
    context::PhysicalScheduler,
    data::{PortData, ReactorState},
    env::Env,
    error::RuntimeError,
    event::PhysicalEvent,
    port::PortHandle,
    sched::{Config, Scheduler},
    ReactorKey,
};

pub struct App {
    env: Env,
    config: Config,
    phys_tx: Sender<PhysicalEvent>,
    phys_rx: Receiver<PhysicalEvent>,
    on_success: Option<Box<dyn FnOnce() + Send>>,
    on_fail: Option<Box<dyn FnOnce(&RuntimeError) + Send>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("env", &self.env)
            .field("config", &self.config)
            .finish()
    }
}

/// Cloneable handle for requesting a cooperative stop from outside the
/// scheduler thread.
#[derive(Debug, Clone)]
pub struct AppHandle {
    tx: Sender<PhysicalEvent>,
}

impl AppHandle {
    /// Stop the app at the end of the current tag; remaining events are
    /// discarded except shutdown handlers.
    pub fn request_stop(&self) {
        let _ = self.tx.send(PhysicalEvent::stop());
    }
}

impl App {
    pub fn new(name: &str, config: Config) -> Self {
        let (phys_tx, phys_rx) = crossbeam_channel::unbounded();
        Self {
            env: Env::new(name),
            config,
            phys_tx,
            phys_rx,
            on_success: None,
            on_fail: None,
        }
    }

    /// Callback invoked on natural termination.
    pub fn with_success(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Callback invoked when a reaction failure terminates the run.
    pub fn with_fail(mut self, f: impl FnOnce(&RuntimeError) + Send + 'static) -> Self {
        self.on_fail = Some(Box::new(f));
        self
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Instantiate a top-level reactor.
    pub fn reactor<S: ReactorState, R>(
        &mut self,
        name: &str,
        state: S,
        f: impl FnOnce(&mut Assembler<'_, S>) -> Result<R, RuntimeError>,
    ) -> Result<(ReactorKey, R), RuntimeError> {
        let mut creations = Creations::default();
        let root = self.env.root();
        assembler::assemble(&mut self.env, root, name, state, None, &mut creations, f)
    }

    /// Declare ports, actions and reactions on the root itself.
    pub fn assemble<R>(
        &mut self,
        f: impl FnOnce(&mut Assembler<'_, ()>) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError> {
        let mut creations = Creations::default();
        let root = self.env.root();
        let mut asm = Assembler {
            env: &mut self.env,
            creations: &mut creations,
            reactor: root,
            _marker: PhantomData,
        };
        f(&mut asm)
    }

    /// Statically wire two ports under the root's authority.
    pub fn connect(
        &mut self,
        src: impl PortHandle,
        dst: impl PortHandle,
    ) -> Result<(), RuntimeError> {
        let root = self.env.root();
        connection::establish(
            &mut self.env,
            ConnScope::Construction(root),
            src.port_key(),
            dst.port_key(),
        )
    }

    pub fn can_connect(&self, src: impl PortHandle, dst: impl PortHandle) -> bool {
        connection::can(
            &self.env,
            ConnScope::Construction(self.env.root()),
            src.port_key(),
            dst.port_key(),
        )
    }

    pub fn handle(&self) -> AppHandle {
        AppHandle {
            tx: self.phys_tx.clone(),
        }
    }

    /// Thread-safe scheduler for one physical action, usable from callbacks
    /// outside the reactor program.
    pub fn physical_scheduler<T: PortData>(
        &self,
        action: ActionRef<T>,
    ) -> Result<PhysicalScheduler<T>, RuntimeError> {
        let slot = &self.env.actions[action.key()];
        if slot.kind() != ActionKind::Standard(ActionOrigin::Physical) {
            return Err(RuntimeError::InvalidKey {
                what: format!(
                    "physical_scheduler({}) on a non-physical action",
                    self.env.action_fqn(action.key())
                ),
            });
        }
        Ok(PhysicalScheduler {
            action: action.key(),
            min_delay: slot.min_delay(),
            tx: self.phys_tx.clone(),
            _marker: PhantomData,
        })
    }

    /// Bootstrap and run until termination. Returns the final runtime state
    /// for inspection on success.
    pub fn run(self) -> Result<Env, RuntimeError> {
        let App {
            env,
            config,
            phys_tx,
            phys_rx,
            on_success,
            on_fail,
        } = self;
        // the scheduler owns no sender; once all handles drop, keep-alive
        // waits terminate
        drop(phys_tx);

        let mut scheduler = Scheduler::new(env, config, phys_rx);
        match scheduler.event_loop() {
            Ok(()) => {
                if let Some(f) = on_success {
                    f();
                }
                Ok(scheduler.into_env())
            }
            Err(err) => {
                if let Some(f) = on_fail {
                    f(&err);
                }
                Err(err)
            }
        }
    }
}

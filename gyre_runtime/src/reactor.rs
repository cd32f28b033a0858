use std::fmt::Debug;

use gyre_core::keys::{ActionKey, PortKey, ReactionKey, ReactorKey};

use crate::data::ReactorState;

/// Opaque identity key of a reactor. Operations requiring mutation
/// capability demand the matching key; it cannot be constructed outside the
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerKey(pub(crate) u64);

/// Lifecycle state of a reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Constructing,
    Active,
    ShuttingDown,
    Terminated,
}

/// Bank information for a reactor instantiated as part of a bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankInfo {
    /// The index of this reactor within the bank
    pub idx: usize,
    /// The total number of reactors in the bank
    pub total: usize,
}

pub struct Reactor {
    /// The instance name of the reactor
    name: String,
    parent: Option<ReactorKey>,
    /// Containment depth; the root sits at 0.
    depth: usize,
    owner_key: OwnerKey,
    lifecycle: Lifecycle,
    /// The user state bag; taken out while one of this reactor's reactions runs.
    pub(crate) state: Option<Box<dyn ReactorState>>,
    pub(crate) children: Vec<ReactorKey>,
    pub(crate) ports: Vec<PortKey>,
    pub(crate) actions: Vec<ActionKey>,
    /// Ordered reactions: mutations first, then plain, in registration order.
    pub(crate) reactions: Vec<ReactionKey>,
    pub(crate) startup: ActionKey,
    pub(crate) shutdown: ActionKey,
    bank_info: Option<BankInfo>,
    pub(crate) next_priority: usize,
}

impl Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("lifecycle", &self.lifecycle)
            .field("children", &self.children)
            .field("reactions", &self.reactions)
            .finish()
    }
}

impl Reactor {
    pub(crate) fn new(
        name: &str,
        parent: Option<ReactorKey>,
        depth: usize,
        owner_key: OwnerKey,
        state: Box<dyn ReactorState>,
        bank_info: Option<BankInfo>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            parent,
            depth,
            owner_key,
            lifecycle: Lifecycle::Constructing,
            state: Some(state),
            children: Vec::new(),
            ports: Vec::new(),
            actions: Vec::new(),
            reactions: Vec::new(),
            startup: ActionKey::default(),
            shutdown: ActionKey::default(),
            bank_info,
            next_priority: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ReactorKey> {
        self.parent
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    pub(crate) fn owner_key(&self) -> OwnerKey {
        self.owner_key
    }

    pub fn bank_info(&self) -> Option<&BankInfo> {
        self.bank_info.as_ref()
    }

    /// Borrow the state bag as the concrete type it was registered with.
    pub fn get_state<T: ReactorState>(&self) -> Option<&T> {
        self.state.as_ref().and_then(|s| s.downcast_ref())
    }

    pub fn get_state_mut<T: ReactorState>(&mut self) -> Option<&mut T> {
        self.state.as_mut().and_then(|s| s.downcast_mut())
    }

    /// True when reactions of this reactor may still fire.
    pub(crate) fn is_runnable(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active | Lifecycle::ShuttingDown)
    }
}

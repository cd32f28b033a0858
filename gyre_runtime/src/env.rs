//! `Env` stores the live runtime state of all reactors: the component
//! arenas, the port binding table, the precedence graph, and the trigger
//! maps derived from reaction declarations.

use std::time::Duration;

use gyre_core::keys::{ActionKey, PortKey, ReactionKey, ReactorKey};
use slotmap::{SecondaryMap, SlotMap};

use crate::{
    action::{Action, ActionKind, BaseAction},
    connection::Bindings,
    data::{PortData, ReactorState},
    error::RuntimeError,
    graph::{DepGraph, EdgeCause},
    port::{BasePort, Port, PortHandle, PortKind, WritablePort},
    reaction::{Deadline, Reaction, ReactionBody, TriggerRef},
    reactor::{BankInfo, Lifecycle, OwnerKey, Reactor},
};

#[derive(Default)]
pub struct Env {
    /// The runtime set of Reactors
    pub(crate) reactors: SlotMap<ReactorKey, Reactor>,
    /// The runtime set of Ports
    pub(crate) ports: SlotMap<PortKey, Box<dyn BasePort>>,
    /// The runtime set of Actions
    pub(crate) actions: SlotMap<ActionKey, Box<dyn BaseAction>>,
    /// The runtime set of Reactions
    pub(crate) reactions: SlotMap<ReactionKey, Reaction>,
    /// Port-to-port connections
    pub(crate) bindings: Bindings,
    /// The precedence graph over reactions
    pub(crate) graph: DepGraph,
    /// For each Port, the Reactions triggered by it
    pub(crate) port_triggers: SecondaryMap<PortKey, Vec<ReactionKey>>,
    /// For each Port, the Reactions triggered by or reading it
    pub(crate) port_readers: SecondaryMap<PortKey, Vec<ReactionKey>>,
    /// For each Port, the Reactions that may set it
    pub(crate) port_writers: SecondaryMap<PortKey, Vec<ReactionKey>>,
    /// For each Action, the Reactions triggered by it
    pub(crate) action_triggers: SecondaryMap<ActionKey, Vec<ReactionKey>>,
    /// The root reactor of the hierarchy
    pub(crate) root: ReactorKey,
    key_mint: u64,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("reactors", &self.reactors.len())
            .field("ports", &self.ports.len())
            .field("actions", &self.actions.len())
            .field("reactions", &self.reactions.len())
            .finish()
    }
}

impl Env {
    pub(crate) fn new(root_name: &str) -> Self {
        let mut env = Self::default();
        let root = env
            .add_reactor(root_name, None, Box::new(()), None)
            .expect("the first reactor is always the root");
        env.root = root;
        env
    }

    pub fn root(&self) -> ReactorKey {
        self.root
    }

    pub(crate) fn mint_owner_key(&mut self) -> OwnerKey {
        self.key_mint += 1;
        OwnerKey(self.key_mint)
    }

    /// Add a new reactor below `parent`. Every reactor except the root must
    /// have a parent.
    pub fn add_reactor(
        &mut self,
        name: &str,
        parent: Option<ReactorKey>,
        state: Box<dyn ReactorState>,
        bank_info: Option<BankInfo>,
    ) -> Result<ReactorKey, RuntimeError> {
        let depth = match parent {
            Some(parent_key) => self.reactors[parent_key].depth() + 1,
            None if self.reactors.is_empty() => 0,
            None => {
                return Err(RuntimeError::OrphanReactor { name: name.into() });
            }
        };

        let owner_key = self.mint_owner_key();
        let key = self
            .reactors
            .insert(Reactor::new(name, parent, depth, owner_key, state, bank_info));

        if let Some(parent_key) = parent {
            self.reactors[parent_key].children.push(key);
        }

        let startup = self.add_action::<()>(
            "__startup",
            ActionKind::Startup,
            key,
            Duration::ZERO,
            crate::action::DEFAULT_MIN_SPACING,
        )?;
        let shutdown = self.add_action::<()>(
            "__shutdown",
            ActionKind::Shutdown,
            key,
            Duration::ZERO,
            crate::action::DEFAULT_MIN_SPACING,
        )?;

        let reactor = &mut self.reactors[key];
        reactor.startup = startup;
        reactor.shutdown = shutdown;

        Ok(key)
    }

    pub(crate) fn add_port<T: PortData>(
        &mut self,
        name: &str,
        kind: PortKind,
        reactor_key: ReactorKey,
    ) -> Result<PortKey, RuntimeError> {
        let reactor = &self.reactors[reactor_key];
        if reactor
            .ports
            .iter()
            .any(|&p| self.ports[p].name() == name)
        {
            return Err(RuntimeError::DuplicatePortDefinition {
                reactor: reactor.name().to_owned(),
                port: name.into(),
            });
        }

        let key = self
            .ports
            .insert_with_key(|key| Port::<T>::new(name, key, kind, reactor_key).boxed());
        self.reactors[reactor_key].ports.push(key);
        Ok(key)
    }

    pub(crate) fn add_action<T: PortData>(
        &mut self,
        name: &str,
        kind: ActionKind,
        reactor_key: ReactorKey,
        min_delay: Duration,
        min_spacing: Duration,
    ) -> Result<ActionKey, RuntimeError> {
        let reactor = &self.reactors[reactor_key];
        if reactor
            .actions
            .iter()
            .any(|&a| self.actions[a].name() == name)
        {
            return Err(RuntimeError::DuplicateActionDefinition {
                reactor: reactor.name().to_owned(),
                action: name.into(),
            });
        }

        let key = self.actions.insert_with_key(|key| {
            Action::<T>::new(name, key, reactor_key, kind, min_delay, min_spacing).boxed()
        });
        self.reactors[reactor_key].actions.push(key);
        Ok(key)
    }

    /// Mint a key-gated writable facade for `port`. Fails with
    /// [`RuntimeError::InvalidKey`] unless `key` matches the owning
    /// reactor's identity key.
    pub fn as_writable<T: PortData, P>(
        &self,
        port: P,
        key: OwnerKey,
    ) -> Result<WritablePort<T>, RuntimeError>
    where
        P: PortHandle + Into<WritablePort<T>>,
    {
        let port_key = port.port_key();
        let owner = self.ports[port_key].owner();
        if self.reactors[owner].owner_key() != key {
            return Err(RuntimeError::InvalidKey {
                what: format!("writable({})", self.port_fqn(port_key)),
            });
        }
        Ok(port.into())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn register_reaction(
        &mut self,
        name: Option<String>,
        reactor_key: ReactorKey,
        is_mutation: bool,
        triggers: Vec<TriggerRef>,
        reads: Vec<PortKey>,
        effects: Vec<PortKey>,
        schedulables: Vec<ActionKey>,
        body: ReactionBody,
        deadline: Option<Deadline>,
    ) -> Result<ReactionKey, RuntimeError> {
        let priority = self.reactors[reactor_key].next_priority;
        let name = name.unwrap_or_else(|| format!("reaction_{priority}"));
        let fqn = format!("{}.{}", self.fqn(reactor_key), name);

        self.validate_reaction(&fqn, reactor_key, &triggers, &reads, &effects, &schedulables, &body)?;

        let reaction = Reaction::new(
            name,
            reactor_key,
            priority,
            is_mutation,
            triggers,
            reads,
            effects,
            schedulables,
            body,
            deadline,
        );

        // dataflow edges implied by the declared ports
        let mut new_edges: Vec<(ReactionKey, ReactionKey, EdgeCause)> = Vec::new();
        let key = self.reactions.insert(reaction);
        {
            let reaction = &self.reactions[key];
            for p in reaction.reads_and_triggered_ports() {
                let origin = self.bindings.follow_inward(p);
                for &w in self.port_writers.get(origin).into_iter().flatten() {
                    new_edges.push((w, key, EdgeCause::Port(origin)));
                }
            }
            for &e in reaction.effects() {
                let mut downstream = vec![e];
                downstream.extend(self.bindings.downstream(e));
                for q in downstream {
                    for &r in self.port_readers.get(q).into_iter().flatten() {
                        if r != key {
                            new_edges.push((key, r, EdgeCause::Port(e)));
                        }
                    }
                }
            }
        }

        // intra-reactor chain position: mutations sort before plain reactions
        let reactor = &mut self.reactors[reactor_key];
        reactor.next_priority += 1;
        let insert_at = if is_mutation {
            reactor
                .reactions
                .iter()
                .position(|&r| !self.reactions[r].is_mutation())
                .unwrap_or(reactor.reactions.len())
        } else {
            reactor.reactions.len()
        };
        reactor.reactions.insert(insert_at, key);
        if insert_at > 0 {
            let prev = reactor.reactions[insert_at - 1];
            new_edges.push((prev, key, EdgeCause::Priority));
        }
        if insert_at + 1 < reactor.reactions.len() {
            let next = reactor.reactions[insert_at + 1];
            new_edges.push((key, next, EdgeCause::Priority));
        }

        self.graph.add_node(key);
        let probe: Vec<_> = new_edges.iter().map(|&(a, b, _)| (a, b)).collect();
        if !self.graph.edges_admissible(&probe) {
            // undo the insertion before surfacing the error
            self.graph.remove_node(key);
            self.reactors[reactor_key].reactions.retain(|&r| r != key);
            self.reactions.remove(key);
            return Err(RuntimeError::CycleIntroduced { what: fqn });
        }
        for (a, b, cause) in new_edges {
            self.graph.add_edge_unchecked(a, b, cause);
        }

        // trigger maps
        let reaction = &self.reactions[key];
        let trigger_ports: Vec<_> = reaction.trigger_ports().collect();
        let trigger_actions: Vec<_> = reaction.trigger_actions().collect();
        let read_ports = reaction.reads().to_vec();
        let effect_ports = reaction.effects().to_vec();
        for p in &trigger_ports {
            self.port_triggers.entry(*p).unwrap().or_default().push(key);
            self.port_readers.entry(*p).unwrap().or_default().push(key);
        }
        for p in &read_ports {
            self.port_readers.entry(*p).unwrap().or_default().push(key);
        }
        for p in &effect_ports {
            self.port_writers.entry(*p).unwrap().or_default().push(key);
        }
        for a in &trigger_actions {
            self.action_triggers.entry(*a).unwrap().or_default().push(key);
        }

        Ok(key)
    }

    #[allow(clippy::too_many_arguments)]
    fn validate_reaction(
        &self,
        fqn: &str,
        reactor_key: ReactorKey,
        triggers: &[TriggerRef],
        reads: &[PortKey],
        effects: &[PortKey],
        schedulables: &[ActionKey],
        body: &ReactionBody,
    ) -> Result<(), RuntimeError> {
        let is_procedure = matches!(body, ReactionBody::Procedure(_));

        if is_procedure {
            if triggers.len() != 1 {
                return Err(RuntimeError::MultipleTriggersOnProcedure {
                    reaction: fqn.into(),
                });
            }
            match triggers[0] {
                TriggerRef::Port(p) if self.ports[p].kind() == PortKind::Callee => {}
                _ => {
                    return Err(RuntimeError::ReactionRegistration {
                        reaction: fqn.into(),
                        what: "a procedure's single trigger must be a callee port".into(),
                    });
                }
            }
        }

        for trigger in triggers {
            match *trigger {
                TriggerRef::Port(p) => {
                    let port = &self.ports[p];
                    let owner = port.owner();
                    let in_scope = owner == reactor_key
                        || self.reactors[owner].parent() == Some(reactor_key);
                    if !in_scope {
                        return Err(RuntimeError::TriggerOutOfScope {
                            reaction: fqn.into(),
                            trigger: self.port_fqn(p),
                        });
                    }
                    let valid = match port.kind() {
                        PortKind::Input => owner == reactor_key,
                        PortKind::Output => owner != reactor_key,
                        PortKind::Callee => is_procedure && owner == reactor_key,
                        PortKind::Caller => false,
                    };
                    if !valid {
                        return Err(RuntimeError::ReactionRegistration {
                            reaction: fqn.into(),
                            what: format!(
                                "port {} cannot trigger this reaction",
                                self.port_fqn(p)
                            ),
                        });
                    }
                }
                TriggerRef::Action(a) => {
                    if self.actions[a].owner() != reactor_key {
                        return Err(RuntimeError::TriggerOutOfScope {
                            reaction: fqn.into(),
                            trigger: self.action_fqn(a),
                        });
                    }
                }
            }
        }

        for &p in reads {
            let port = &self.ports[p];
            let owner = port.owner();
            let valid = match port.kind() {
                PortKind::Input => owner == reactor_key,
                PortKind::Output => self.reactors[owner].parent() == Some(reactor_key),
                _ => false,
            };
            if !valid {
                return Err(RuntimeError::TriggerOutOfScope {
                    reaction: fqn.into(),
                    trigger: self.port_fqn(p),
                });
            }
        }

        for &p in effects {
            let port = &self.ports[p];
            let owner = port.owner();
            let in_scope = owner == reactor_key
                || self.reactors[owner].parent() == Some(reactor_key);
            if !in_scope {
                return Err(RuntimeError::InvalidKey {
                    what: format!("writable({}) requested by {}", self.port_fqn(p), fqn),
                });
            }
            let valid = match port.kind() {
                PortKind::Output => owner == reactor_key,
                PortKind::Input => owner != reactor_key,
                PortKind::Caller => owner == reactor_key,
                PortKind::Callee => false,
            };
            if !valid {
                return Err(RuntimeError::ReactionRegistration {
                    reaction: fqn.into(),
                    what: format!("port {} cannot be an effect", self.port_fqn(p)),
                });
            }
            if self.bindings.inward(p).is_some() {
                return Err(RuntimeError::ReactionRegistration {
                    reaction: fqn.into(),
                    what: format!(
                        "port {} already receives a connection and cannot be an effect",
                        self.port_fqn(p)
                    ),
                });
            }
        }

        for &a in schedulables {
            if self.actions[a].owner() != reactor_key {
                return Err(RuntimeError::InvalidKey {
                    what: format!("schedulable({}) requested by {}", self.action_fqn(a), fqn),
                });
            }
        }

        Ok(())
    }

    pub(crate) fn remove_reaction(&mut self, key: ReactionKey) {
        let Some(reaction) = self.reactions.remove(key) else {
            return;
        };
        let reactor_key = reaction.reactor();
        if let Some(reactor) = self.reactors.get_mut(reactor_key) {
            reactor.reactions.retain(|&r| r != key);
        }
        for p in reaction.trigger_ports() {
            if let Some(v) = self.port_triggers.get_mut(p) {
                v.retain(|&r| r != key);
            }
            if let Some(v) = self.port_readers.get_mut(p) {
                v.retain(|&r| r != key);
            }
        }
        for &p in reaction.reads() {
            if let Some(v) = self.port_readers.get_mut(p) {
                v.retain(|&r| r != key);
            }
        }
        for &p in reaction.effects() {
            if let Some(v) = self.port_writers.get_mut(p) {
                v.retain(|&r| r != key);
            }
        }
        for a in reaction.trigger_actions() {
            if let Some(v) = self.action_triggers.get_mut(a) {
                v.retain(|&r| r != key);
            }
        }
        self.graph.remove_node(key);
    }

    pub(crate) fn remove_port(&mut self, key: PortKey) {
        let Some(port) = self.ports.remove(key) else {
            return;
        };
        if let Some(reactor) = self.reactors.get_mut(port.owner()) {
            reactor.ports.retain(|&p| p != key);
        }
        self.bindings.remove_port(key);
        self.port_triggers.remove(key);
        self.port_readers.remove(key);
        self.port_writers.remove(key);
    }

    pub(crate) fn remove_action(&mut self, key: ActionKey) {
        let Some(action) = self.actions.remove(key) else {
            return;
        };
        if let Some(reactor) = self.reactors.get_mut(action.owner()) {
            reactor.actions.retain(|&a| a != key);
        }
        self.action_triggers.remove(key);
    }

    /// Remove a reactor and everything it still owns. Children must have
    /// been removed beforehand.
    pub(crate) fn remove_reactor(&mut self, key: ReactorKey) {
        let Some(reactor) = self.reactors.get(key) else {
            return;
        };
        let reactions = reactor.reactions.clone();
        let ports = reactor.ports.clone();
        let actions = reactor.actions.clone();
        let parent = reactor.parent();
        for r in reactions {
            self.remove_reaction(r);
        }
        for p in ports {
            self.remove_port(p);
        }
        for a in actions {
            self.remove_action(a);
        }
        if let Some(parent) = parent.and_then(|p| self.reactors.get_mut(p)) {
            parent.children.retain(|&c| c != key);
        }
        self.reactors.remove(key);
    }

    /// Rebuild the precedence graph from the current model and re-assign
    /// topological levels.
    pub(crate) fn rebuild_graph(&mut self) -> Result<(), RuntimeError> {
        let mut graph = DepGraph::default();
        for key in self.reactions.keys() {
            graph.add_node(key);
        }

        for reactor in self.reactors.values() {
            for pair in reactor.reactions.windows(2) {
                graph.add_edge_unchecked(pair[0], pair[1], EdgeCause::Priority);
            }
        }

        for (key, reaction) in &self.reactions {
            for p in reaction.reads_and_triggered_ports() {
                let origin = self.bindings.follow_inward(p);
                for &w in self.port_writers.get(origin).into_iter().flatten() {
                    if w != key {
                        graph.add_edge_unchecked(w, key, EdgeCause::Port(origin));
                    }
                }
            }
        }

        graph.topological_levels()?;
        self.graph = graph;
        Ok(())
    }

    // ---- naming ----------------------------------------------------------

    /// Fully-qualified dotted name of a reactor.
    pub fn fqn(&self, key: ReactorKey) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            let Some(reactor) = self.reactors.get(k) else {
                break;
            };
            segments.push(reactor.name().to_owned());
            cursor = reactor.parent();
        }
        segments.reverse();
        segments.join(".")
    }

    pub fn port_fqn(&self, key: PortKey) -> String {
        match self.ports.get(key) {
            Some(port) => format!("{}.{}", self.fqn(port.owner()), port.name()),
            None => format!("<removed:{key}>"),
        }
    }

    pub fn action_fqn(&self, key: ActionKey) -> String {
        match self.actions.get(key) {
            Some(action) => format!("{}.{}", self.fqn(action.owner()), action.name()),
            None => format!("<removed:{key}>"),
        }
    }

    pub fn reaction_fqn(&self, key: ReactionKey) -> String {
        match self.reactions.get(key) {
            Some(reaction) => format!("{}.{}", self.fqn(reaction.reactor()), reaction.name()),
            None => format!("<removed:{key}>"),
        }
    }

    // ---- queries ---------------------------------------------------------

    /// Find a reactor by its instance name.
    pub fn find_reactor_by_name(&self, name: &str) -> Option<&Reactor> {
        self.reactors
            .values()
            .find(|reactor| reactor.name() == name)
    }

    pub fn iter_reactors(&self) -> impl Iterator<Item = (ReactorKey, &Reactor)> {
        self.reactors.iter()
    }

    pub fn get_reactor(&self, key: ReactorKey) -> Option<&Reactor> {
        self.reactors.get(key)
    }

    pub(crate) fn set_all_lifecycles(&mut self, lifecycle: Lifecycle) {
        for reactor in self.reactors.values_mut() {
            reactor.set_lifecycle(lifecycle);
        }
    }

    /// Ordering data for the deterministic level tie-break: containment
    /// depth first, then intra-reactor registration order.
    pub(crate) fn firing_order(&self, key: ReactionKey) -> (usize, (u8, usize)) {
        let reaction = &self.reactions[key];
        let depth = self.reactors[reaction.reactor()].depth();
        (depth, reaction.order_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_and_orphans() {
        let mut env = Env::new("app");
        assert_eq!(env.fqn(env.root()), "app");

        // a second root is rejected
        let err = env.add_reactor("stray", None, Box::new(()), None);
        assert!(matches!(err, Err(RuntimeError::OrphanReactor { name }) if name == "stray"));

        let child = env
            .add_reactor("child", Some(env.root()), Box::new(()), None)
            .unwrap();
        assert_eq!(env.fqn(child), "app.child");
        assert_eq!(env.get_reactor(child).unwrap().depth(), 1);
    }

    #[test]
    fn test_duplicate_port() {
        let mut env = Env::new("app");
        let root = env.root();
        env.add_port::<u32>("p0", PortKind::Input, root).unwrap();
        let err = env.add_port::<u32>("p0", PortKind::Output, root);
        assert!(matches!(
            err,
            Err(RuntimeError::DuplicatePortDefinition { reactor, port })
                if reactor == "app" && port == "p0"
        ));
    }

    #[test]
    fn test_duplicate_action() {
        let mut env = Env::new("app");
        let root = env.root();
        env.add_action::<()>(
            "a0",
            ActionKind::Standard(crate::action::ActionOrigin::Logical),
            root,
            Duration::ZERO,
            crate::action::DEFAULT_MIN_SPACING,
        )
        .unwrap();
        let err = env.add_action::<()>(
            "a0",
            ActionKind::Standard(crate::action::ActionOrigin::Logical),
            root,
            Duration::ZERO,
            crate::action::DEFAULT_MIN_SPACING,
        );
        assert!(matches!(
            err,
            Err(RuntimeError::DuplicateActionDefinition { .. })
        ));
    }

    #[test]
    fn test_as_writable_key_gate() {
        let mut env = Env::new("app");
        let root = env.root();
        let child = env.add_reactor("child", Some(root), Box::new(()), None).unwrap();
        let port = env.add_port::<u32>("out", PortKind::Output, child).unwrap();
        let handle = crate::port::OutPort::<u32>::from_key(port);

        let own_key = env.reactors[child].owner_key();
        assert!(env.as_writable(handle, own_key).is_ok());

        let foreign_key = env.reactors[root].owner_key();
        assert!(matches!(
            env.as_writable(handle, foreign_key),
            Err(RuntimeError::InvalidKey { .. })
        ));
    }
}

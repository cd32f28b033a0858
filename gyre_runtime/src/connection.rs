//! Port-to-port connections: the binding table, the validity rules guarding
//! `connect`, and the reachability analysis behind cycle and
//! direct-feedthrough detection.

use std::collections::{BTreeSet, VecDeque};

use gyre_core::keys::{PortKey, ReactionKey, ReactorKey};
use slotmap::SecondaryMap;

use crate::{
    env::Env,
    error::RuntimeError,
    graph::EdgeCause,
    port::PortKind,
};

/// The connection table: at most one inward (upstream) binding per port,
/// any number of outward (downstream) bindings.
#[derive(Default, Debug)]
pub(crate) struct Bindings {
    inward: SecondaryMap<PortKey, PortKey>,
    outward: SecondaryMap<PortKey, BTreeSet<PortKey>>,
}

impl Bindings {
    pub fn inward(&self, port: PortKey) -> Option<PortKey> {
        self.inward.get(port).copied()
    }

    pub fn outward(&self, port: PortKey) -> impl Iterator<Item = PortKey> + '_ {
        self.outward
            .get(port)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Follow the inward bindings of a port to its ultimate source.
    pub fn follow_inward(&self, port: PortKey) -> PortKey {
        let mut cur = port;
        while let Some(&next) = self.inward.get(cur) {
            cur = next;
        }
        cur
    }

    /// All ports transitively downstream of `port` (excluding `port`).
    pub fn downstream(&self, port: PortKey) -> Vec<PortKey> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<PortKey> = self.outward(port).collect();
        while let Some(p) = queue.pop_front() {
            if seen.insert(p) {
                out.push(p);
                queue.extend(self.outward(p));
            }
        }
        out
    }

    pub(crate) fn bind_raw(&mut self, src: PortKey, dst: PortKey) {
        self.inward.insert(dst, src);
        self.outward.entry(src).unwrap().or_default().insert(dst);
    }

    pub(crate) fn unbind(&mut self, src: PortKey, dst: PortKey) -> bool {
        if self.inward.get(dst) != Some(&src) {
            return false;
        }
        self.inward.remove(dst);
        if let Some(set) = self.outward.get_mut(src) {
            set.remove(&dst);
        }
        true
    }

    /// Drop every binding mentioning `port`; used when the port is removed.
    pub(crate) fn remove_port(&mut self, port: PortKey) {
        self.inward.remove(port);
        self.outward.remove(port);
        for set in self.outward.values_mut() {
            set.remove(&port);
        }
        let orphaned: Vec<_> = self
            .inward
            .iter()
            .filter_map(|(dst, &src)| (src == port).then_some(dst))
            .collect();
        for dst in orphaned {
            self.inward.remove(dst);
        }
    }
}

/// The authority under which a connection is requested.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ConnScope {
    /// Static wiring by the given reactor during construction.
    Construction(ReactorKey),
    /// Wiring from inside a mutation of the given reactor. Mutations may
    /// additionally wire to sibling ports, provided at least one endpoint
    /// stays within the mutating reactor or its children.
    Mutation(ReactorKey),
}

impl ConnScope {
    fn reactor(&self) -> ReactorKey {
        match *self {
            ConnScope::Construction(key) | ConnScope::Mutation(key) => key,
        }
    }
}

/// Direction rules relative to a connecting reactor `c`:
/// input-to-input only downward, output-to-output only upward,
/// output-to-input across siblings, input-to-output only on `c` itself.
fn direction_ok(env: &Env, c: ReactorKey, src: PortKey, dst: PortKey) -> bool {
    let src_port = &env.ports[src];
    let dst_port = &env.ports[dst];
    let src_owner = src_port.owner();
    let dst_owner = dst_port.owner();
    let src_parent = env.reactors[src_owner].parent();
    let dst_parent = env.reactors[dst_owner].parent();

    match (src_port.kind(), dst_port.kind()) {
        (PortKind::Input, PortKind::Input) => src_owner == c && dst_parent == Some(c),
        (PortKind::Output, PortKind::Input) => src_parent == Some(c) && dst_parent == Some(c),
        (PortKind::Output, PortKind::Output) => src_parent == Some(c) && dst_owner == c,
        (PortKind::Input, PortKind::Output) => src_owner == c && dst_owner == c,
        (PortKind::Caller, PortKind::Callee) => src_parent == Some(c) && dst_parent == Some(c),
        _ => false,
    }
}

fn within(env: &Env, c: ReactorKey, owner: ReactorKey) -> bool {
    owner == c || env.reactors[owner].parent() == Some(c)
}

fn visibility_ok(env: &Env, scope: ConnScope, src: PortKey, dst: PortKey) -> bool {
    let c = scope.reactor();
    if direction_ok(env, c, src, dst) {
        return true;
    }
    if let ConnScope::Mutation(m) = scope {
        // spawn-and-wire: judged from the parent's vantage point, with at
        // least one endpoint anchored in the mutating reactor's scope
        if let Some(parent) = env.reactors[m].parent() {
            let src_owner = env.ports[src].owner();
            let dst_owner = env.ports[dst].owner();
            let anchored = within(env, m, src_owner) || within(env, m, dst_owner);
            return anchored && direction_ok(env, parent, src, dst);
        }
    }
    false
}

/// Mixed node for the zero-delay reachability walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FlowNode {
    Port(PortKey),
    Reaction(ReactionKey),
}

/// True iff a value present on `from` can influence `to` within the same
/// tag, walking port bindings and reaction read/effect relations across the
/// whole hierarchy.
pub(crate) fn port_reaches(env: &Env, from: PortKey, to: PortKey) -> bool {
    if from == to {
        return true;
    }
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([FlowNode::Port(from)]);
    while let Some(node) = queue.pop_front() {
        if !seen.insert(node) {
            continue;
        }
        match node {
            FlowNode::Port(p) => {
                if p == to {
                    return true;
                }
                queue.extend(env.bindings.outward(p).map(FlowNode::Port));
                if let Some(readers) = env.port_readers.get(p) {
                    queue.extend(readers.iter().copied().map(FlowNode::Reaction));
                }
            }
            FlowNode::Reaction(r) => {
                if let Some(reaction) = env.reactions.get(r) {
                    queue.extend(reaction.effects().iter().copied().map(FlowNode::Port));
                }
            }
        }
    }
    false
}

/// The precedence edges a binding `src -> dst` implies: every writer of the
/// binding's ultimate source must fire before every reader downstream of
/// `dst`.
fn implied_edges(env: &Env, src: PortKey, dst: PortKey) -> Vec<(ReactionKey, ReactionKey)> {
    let origin = env.bindings.follow_inward(src);
    let writers: Vec<ReactionKey> = env
        .port_writers
        .get(origin)
        .into_iter()
        .flatten()
        .copied()
        .collect();
    if writers.is_empty() {
        return Vec::new();
    }

    let mut readers: Vec<ReactionKey> = Vec::new();
    let mut targets = vec![dst];
    targets.extend(env.bindings.downstream(dst));
    for q in targets {
        readers.extend(env.port_readers.get(q).into_iter().flatten().copied());
    }

    let mut edges = Vec::new();
    for &w in &writers {
        for &r in &readers {
            if w != r {
                edges.push((w, r));
            }
        }
    }
    edges
}

fn validate(env: &Env, scope: ConnScope, src: PortKey, dst: PortKey) -> Result<(), RuntimeError> {
    let source_port = env.port_fqn(src);
    let target_port = env.port_fqn(dst);

    if env.ports[src].type_name() != env.ports[dst].type_name() {
        return Err(RuntimeError::TypeMismatch {
            expected: env.ports[src].type_name(),
            found: env.ports[dst].type_name(),
        });
    }

    if !visibility_ok(env, scope, src, dst) {
        return Err(RuntimeError::OutsideContainer {
            source_port,
            target_port,
        });
    }

    if let Some(existing) = env.bindings.inward(dst) {
        return Err(RuntimeError::DestinationOccupied {
            target_port,
            existing: env.port_fqn(existing),
        });
    }
    if env
        .port_writers
        .get(dst)
        .is_some_and(|writers| !writers.is_empty())
    {
        return Err(RuntimeError::DestinationOccupied {
            target_port,
            existing: "a reaction effect".into(),
        });
    }

    // a value arriving on `dst` that can already flow back into `src` would
    // close a zero-delay loop
    if port_reaches(env, dst, src) {
        let feedthrough = env.ports[src].kind() == PortKind::Input
            && env.ports[dst].kind() == PortKind::Output;
        return Err(if feedthrough {
            RuntimeError::DirectFeedThrough {
                source_port,
                target_port,
            }
        } else {
            RuntimeError::CycleIntroduced {
                what: format!("{source_port} -> {target_port}"),
            }
        });
    }

    let edges = implied_edges(env, src, dst);
    if !env.graph.edges_admissible(&edges) {
        return Err(RuntimeError::CycleIntroduced {
            what: format!("{source_port} -> {target_port}"),
        });
    }

    Ok(())
}

/// Non-mutating probe: would `connect(src, dst)` succeed?
pub(crate) fn can(env: &Env, scope: ConnScope, src: PortKey, dst: PortKey) -> bool {
    validate(env, scope, src, dst).is_ok()
}

/// Validate and apply a connection, adding the implied precedence edges.
pub(crate) fn establish(
    env: &mut Env,
    scope: ConnScope,
    src: PortKey,
    dst: PortKey,
) -> Result<(), RuntimeError> {
    validate(env, scope, src, dst)?;
    let origin = env.bindings.follow_inward(src);
    let edges = implied_edges(env, src, dst);
    env.bindings.bind_raw(src, dst);
    for (a, b) in edges {
        env.graph.add_edge_unchecked(a, b, EdgeCause::Port(origin));
    }
    tracing::debug!(
        src = %env.port_fqn(src),
        dst = %env.port_fqn(dst),
        "Connected"
    );
    Ok(())
}

/// Remove the binding `src -> dst` (or all bindings from `src` when `dst`
/// is `None`). Absent bindings are a no-op. Returns the removed pairs.
pub(crate) fn sever(
    env: &mut Env,
    scope: ConnScope,
    src: PortKey,
    dst: Option<PortKey>,
) -> Result<Vec<(PortKey, PortKey)>, RuntimeError> {
    let c = scope.reactor();
    let src_owner = env.ports[src].owner();
    if !within(env, c, src_owner)
        && !matches!(scope, ConnScope::Mutation(m)
            if env.reactors[m].parent().is_some_and(|p| within(env, p, src_owner)))
    {
        return Err(RuntimeError::OutsideContainer {
            source_port: env.port_fqn(src),
            target_port: dst.map(|d| env.port_fqn(d)).unwrap_or_else(|| "*".into()),
        });
    }

    let targets: Vec<PortKey> = match dst {
        Some(d) => vec![d],
        None => env.bindings.outward(src).collect(),
    };

    let mut removed = Vec::new();
    for d in targets {
        if env.bindings.unbind(src, d) {
            removed.push((src, d));
        }
    }
    if !removed.is_empty() {
        tracing::debug!(src = %env.port_fqn(src), n = removed.len(), "Disconnected");
    }
    Ok(removed)
}

//! Diagnostic output: a Mermaid-style dump of the precedence graph and an
//! indented hierarchy listing. These are the only persisted artifacts the
//! runtime emits.

use std::collections::HashMap;
use std::fmt::Write;

use gyre_core::keys::{ReactionKey, ReactorKey};
use itertools::Itertools;

use crate::{env::Env, graph::EdgeCause, port::PortKind};

impl Env {
    /// Render the precedence graph as a Mermaid flowchart. Nodes carry
    /// fully-qualified reaction names; edges are labelled with the causing
    /// port or the intra-reactor `priority` rule.
    pub fn precedence_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");

        let nodes: Vec<(ReactionKey, String)> = self
            .reactions
            .keys()
            .map(|key| (key, self.reaction_fqn(key)))
            .sorted_by(|(_, a), (_, b)| a.cmp(b))
            .collect();
        let ids: HashMap<ReactionKey, usize> = nodes
            .iter()
            .enumerate()
            .map(|(idx, (key, _))| (*key, idx))
            .collect();

        for (key, fqn) in &nodes {
            let _ = writeln!(out, "    r{}[\"{}\"]", ids[key], fqn);
        }

        let edges = self
            .graph
            .edges()
            .map(|(a, b, cause)| {
                let label = match cause {
                    EdgeCause::Priority => "priority".to_owned(),
                    EdgeCause::Port(port) => self.port_fqn(port),
                };
                (ids[&a], ids[&b], label)
            })
            .sorted();
        for (a, b, label) in edges {
            let _ = writeln!(out, "    r{a} -->|\"{label}\"| r{b}");
        }

        out
    }

    /// Render the containment tree with each reactor's ports, actions and
    /// reactions.
    pub fn hierarchy_listing(&self) -> String {
        let mut out = String::new();
        self.write_reactor_listing(self.root, 0, &mut out);
        out
    }

    fn write_reactor_listing(&self, key: ReactorKey, depth: usize, out: &mut String) {
        let Some(reactor) = self.reactors.get(key) else {
            return;
        };
        let pad = "  ".repeat(depth);
        let bank = reactor
            .bank_info()
            .map(|info| format!(" [{}/{}]", info.idx, info.total))
            .unwrap_or_default();
        let _ = writeln!(out, "{pad}{}{bank}", reactor.name());

        for &port in &reactor.ports {
            let port = &self.ports[port];
            let kind = match port.kind() {
                PortKind::Input => "in",
                PortKind::Output => "out",
                PortKind::Caller => "caller",
                PortKind::Callee => "callee",
            };
            let _ = writeln!(out, "{pad}  {kind} {}: {}", port.name(), port.type_name());
        }
        for &action in &reactor.actions {
            let action = &self.actions[action];
            let _ = writeln!(out, "{pad}  action {} {:?}", action.name(), action.kind());
        }
        for &reaction in &reactor.reactions {
            let reaction = &self.reactions[reaction];
            let marker = if reaction.is_mutation() {
                " (mutation)"
            } else if reaction.is_procedure() {
                " (procedure)"
            } else {
                ""
            };
            let _ = writeln!(out, "{pad}  reaction {}{marker}", reaction.name());
        }

        for &child in &reactor.children {
            self.write_reactor_listing(child, depth + 1, out);
        }
    }
}

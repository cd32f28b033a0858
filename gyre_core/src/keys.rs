//! Runtime keys for the various types of Reactor components.

slotmap::new_key_type! {
    /// Runtime key for a Reactor
    pub struct ReactorKey;

    /// Runtime key for a Reaction
    pub struct ReactionKey;

    /// Runtime key for a Port
    pub struct PortKey;

    /// Runtime key for an Action
    pub struct ActionKey;
}

impl std::fmt::Display for ReactorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for ReactionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for PortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for ActionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

//! Local enforcement point for federated scheduling. The wider
//! time-advance-grant protocol lives outside this crate; only the intended
//! tag rules are checked here.

use std::marker::PhantomData;

use gyre_core::{keys::ActionKey, time::Tag};

use crate::data::PortData;

/// Stub of the external authority granting tag advances to this runtime.
#[derive(Debug, Default, Clone)]
pub struct TagAuthority {
    last_grant: Option<Tag>,
    provisional: bool,
}

impl TagAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the authority's most recent grant.
    pub fn record_grant(&mut self, tag: Tag, provisional: bool) {
        self.last_grant = Some(tag);
        self.provisional = provisional;
    }

    pub fn last_grant(&self) -> Option<Tag> {
        self.last_grant
    }

    /// The intended tag must be strictly greater than the current tag; when
    /// the last grant is provisional, greater-or-equal is allowed.
    pub fn allows(&self, intended: Tag, current: Tag) -> bool {
        if intended > current {
            true
        } else {
            self.provisional && intended == current
        }
    }
}

/// A logical action whose scheduling requires an intended tag supplied by
/// an external authority. See [`crate::Context::schedule_federated`].
pub struct FederatePortAction<T: PortData> {
    pub(crate) key: ActionKey,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

impl<T: PortData> std::fmt::Debug for FederatePortAction<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FederatePortAction({:?})", self.key)
    }
}

impl<T: PortData> Clone for FederatePortAction<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: PortData> Copy for FederatePortAction<T> {}

impl<T: PortData> FederatePortAction<T> {
    pub(crate) fn from_key(key: ActionKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> ActionKey {
        self.key
    }
}

impl<T: PortData> From<FederatePortAction<T>> for crate::action::ActionRef<T> {
    fn from(action: FederatePortAction<T>) -> Self {
        crate::action::ActionRef::from_key(action.key)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_intended_tag_rules() {
        let current = Tag::new(Duration::from_secs(1), 0);
        let mut authority = TagAuthority::new();

        assert!(authority.allows(Tag::new(Duration::from_secs(2), 0), current));
        assert!(!authority.allows(current, current));
        assert!(!authority.allows(Tag::ORIGIN, current));

        authority.record_grant(current, true);
        assert!(authority.allows(current, current));
        assert!(!authority.allows(Tag::ORIGIN, current));

        authority.record_grant(current, false);
        assert!(!authority.allows(current, current));
    }
}

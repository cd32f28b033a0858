//! Actions are self-scheduled triggers. When an action's event is drained at
//! a tag, all reactions declaring the action as a trigger are enqueued.
//!
//! Two origins govern how the event tag is derived:
//! - `Logical`: current logical tag + `min_delay` + extra delay.
//! - `Physical`: current wall-clock time + `min_delay` + extra delay.
//!
//! Startup, Shutdown and Timers are builtin logical actions owned by the
//! scheduler lifecycle.

use std::{any::Any, fmt::Debug, marker::PhantomData, time::Duration};

use downcast_rs::{impl_downcast, Downcast};
use gyre_core::{
    keys::{ActionKey, ReactorKey},
    time::Tag,
};

use crate::{data::PortData, error::RuntimeError};

/// Default minimum inter-arrival time between two events of the same action.
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_nanos(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOrigin {
    Logical,
    Physical,
}

/// Firing spec for a timer: first at `start + offset`, then every `period`.
/// A zero `period` fires exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSpec {
    pub offset: Duration,
    pub period: Duration,
}

impl TimerSpec {
    pub fn once(offset: Duration) -> Self {
        Self {
            offset,
            period: Duration::ZERO,
        }
    }

    pub fn is_periodic(&self) -> bool {
        !self.period.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Standard(ActionOrigin),
    Timer(TimerSpec),
    Startup,
    Shutdown,
}

impl ActionKind {
    pub fn is_logical(&self) -> bool {
        !matches!(self, ActionKind::Standard(ActionOrigin::Physical))
    }
}

pub trait BaseAction: Debug + Send + Sync + Downcast {
    /// Get the name of this action
    fn name(&self) -> &str;

    /// Get the key for this action
    fn key(&self) -> ActionKey;

    /// The reactor owning this action
    fn owner(&self) -> ReactorKey;

    fn kind(&self) -> ActionKind;

    /// Minimum delay applied to every schedule call
    fn min_delay(&self) -> Duration;

    /// Minimum inter-arrival time between two events of this action
    fn min_spacing(&self) -> Duration;

    /// Tag of the most recently scheduled event
    fn last_scheduled(&self) -> Option<Tag>;

    fn set_last_scheduled(&mut self, tag: Tag);

    /// Return true if an event of this action was drained at the current tag
    fn is_present(&self) -> bool;

    /// Make the action present at the current tag, carrying `value`.
    fn stage(&mut self, value: Option<Box<dyn Any + Send>>) -> Result<(), RuntimeError>;

    /// Clear presence at tag advance
    fn cleanup(&mut self);

    /// Get the concrete type name carried by this action
    fn type_name(&self) -> &'static str;
}
impl_downcast!(BaseAction);

pub struct Action<T: PortData> {
    name: String,
    key: ActionKey,
    owner: ReactorKey,
    kind: ActionKind,
    min_delay: Duration,
    min_spacing: Duration,
    last_scheduled: Option<Tag>,
    present: bool,
    value: Option<T>,
}

impl<T: PortData> Debug for Action<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("min_delay", &self.min_delay)
            .finish()
    }
}

impl<T: PortData> Action<T> {
    pub fn new(
        name: &str,
        key: ActionKey,
        owner: ReactorKey,
        kind: ActionKind,
        min_delay: Duration,
        min_spacing: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            key,
            owner,
            kind,
            min_delay,
            min_spacing,
            last_scheduled: None,
            present: false,
            value: None,
        }
    }

    pub fn get(&self) -> &Option<T> {
        &self.value
    }

    pub fn boxed(self) -> Box<dyn BaseAction> {
        Box::new(self)
    }
}

impl<T: PortData> BaseAction for Action<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> ActionKey {
        self.key
    }

    fn owner(&self) -> ReactorKey {
        self.owner
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }

    fn min_delay(&self) -> Duration {
        self.min_delay
    }

    fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    fn last_scheduled(&self) -> Option<Tag> {
        self.last_scheduled
    }

    fn set_last_scheduled(&mut self, tag: Tag) {
        self.last_scheduled = Some(tag);
    }

    fn is_present(&self) -> bool {
        self.present
    }

    fn stage(&mut self, value: Option<Box<dyn Any + Send>>) -> Result<(), RuntimeError> {
        match value {
            Some(value) => {
                let value = value
                    .downcast::<T>()
                    .map_err(|_| RuntimeError::TypeMismatch {
                        expected: std::any::type_name::<T>(),
                        found: "scheduled event value",
                    })?;
                self.value = Some(*value);
            }
            None => self.value = None,
        }
        self.present = true;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.present = false;
        self.value = None;
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A typed reference to a schedulable action.
pub struct ActionRef<T: PortData> {
    pub(crate) key: ActionKey,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

impl<T: PortData> Debug for ActionRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActionRef({:?})", self.key)
    }
}

impl<T: PortData> Clone for ActionRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: PortData> Copy for ActionRef<T> {}

impl<T: PortData> ActionRef<T> {
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

/// Reference to a reactor's timer.
#[derive(Debug, Clone, Copy)]
pub struct TimerRef {
    pub(crate) key: ActionKey,
}

/// Reference to a reactor's builtin startup action.
#[derive(Debug, Clone, Copy)]
pub struct StartupRef {
    pub(crate) key: ActionKey,
}

/// Reference to a reactor's builtin shutdown action.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownRef {
    pub(crate) key: ActionKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_value() {
        let mut action = Action::<u32>::new(
            "a0",
            ActionKey::default(),
            ReactorKey::default(),
            ActionKind::Standard(ActionOrigin::Logical),
            Duration::ZERO,
            DEFAULT_MIN_SPACING,
        );
        assert!(!action.is_present());
        action.stage(Some(Box::new(7u32))).unwrap();
        assert!(action.is_present());
        assert_eq!(action.get(), &Some(7));
        action.cleanup();
        assert!(!action.is_present());
    }

    #[test]
    fn test_stage_type_mismatch() {
        let mut action = Action::<u32>::new(
            "a0",
            ActionKey::default(),
            ReactorKey::default(),
            ActionKind::Standard(ActionOrigin::Logical),
            Duration::ZERO,
            DEFAULT_MIN_SPACING,
        );
        let res = action.stage(Some(Box::new("wrong")));
        assert!(matches!(res, Err(RuntimeError::TypeMismatch { .. })));
    }
}

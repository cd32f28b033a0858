use std::{fmt::Display, time::Duration};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Error raised by checked tag arithmetic.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagError {
    #[error("tag arithmetic overflowed the maximum representable time")]
    TagOverflow,
}

/// Timestamps are represented as the duration since the origin of logical time.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Self = Self(Duration::ZERO);
    pub const MAX: Self = Self(Duration::MAX);

    pub fn now() -> Self {
        Self(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("System time before UNIX epoch"),
        )
    }

    /// Offset this timestamp, saturating at [`Timestamp::MAX`].
    pub fn saturating_offset(&self, offset: Duration) -> Self {
        Self(self.0.saturating_add(offset))
    }

    /// Offset this timestamp, failing with [`TagError::TagOverflow`] on overflow.
    pub fn checked_offset(&self, offset: Duration) -> Result<Self, TagError> {
        self.0
            .checked_add(offset)
            .map(Self)
            .ok_or(TagError::TagOverflow)
    }

    pub fn checked_duration_since(&self, earlier: Self) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }
}

impl From<Duration> for Timestamp {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl From<Timestamp> for Duration {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.0
    }
}

impl std::ops::Sub for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

/// A point in superdense logical time: an offset from the origin plus a
/// microstep counting same-instant rounds.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    /// Offset from origin of logical time
    offset: Timestamp,
    /// Superdense-timestep.
    microstep: usize,
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}+{}]", Duration::from(self.offset), self.microstep)
    }
}

impl Tag {
    /// The origin of logical time.
    pub const ORIGIN: Self = Self {
        offset: Timestamp::ZERO,
        microstep: 0,
    };

    /// Create a new Tag given an offset from the origin, and a microstep
    pub fn new(offset: impl Into<Timestamp>, microstep: usize) -> Tag {
        Self {
            offset: offset.into(),
            microstep,
        }
    }

    /// Create a tag from an absolute instant, given the origin `t0`.
    pub fn absolute(t0: Timestamp, instant: Timestamp) -> Self {
        Self {
            offset: instant
                .checked_duration_since(t0)
                .unwrap_or(Duration::ZERO)
                .into(),
            microstep: 0,
        }
    }

    /// Create a tag for the current physical time, given the origin `t0`.
    pub fn now(t0: Timestamp) -> Self {
        Self::absolute(t0, Timestamp::now())
    }

    /// Create an instant given the origin
    pub fn to_logical_time(&self, origin: Timestamp) -> Timestamp {
        origin.saturating_offset(self.offset.into())
    }

    /// Create a new Tag offset from the current.
    ///
    /// A `None` or zero offset advances the microstep; a positive offset
    /// advances time and resets the microstep.
    pub fn delay(&self, offset: Option<Duration>) -> Result<Self, TagError> {
        match offset {
            Some(offset) if !offset.is_zero() => Ok(Self {
                offset: self.offset.checked_offset(offset)?,
                microstep: 0,
            }),
            _ => Ok(Self {
                offset: self.offset,
                microstep: self.microstep.checked_add(1).ok_or(TagError::TagOverflow)?,
            }),
        }
    }

    pub fn get_offset(&self) -> Timestamp {
        self.offset
    }

    pub fn microstep(&self) -> usize {
        self.microstep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_order() {
        let t0 = Tag::new(Duration::from_secs(1), 0);
        let t1 = Tag::new(Duration::from_secs(1), 1);
        let t2 = Tag::new(Duration::from_secs(2), 0);
        assert!(t0 < t1);
        assert!(t1 < t2);
        assert!(Tag::ORIGIN < t0);
    }

    #[test]
    fn test_delay_microstep() {
        let t = Tag::new(Duration::from_millis(5), 3);
        assert_eq!(
            t.delay(None).unwrap(),
            Tag::new(Duration::from_millis(5), 4)
        );
        assert_eq!(
            t.delay(Some(Duration::ZERO)).unwrap(),
            Tag::new(Duration::from_millis(5), 4)
        );
        assert_eq!(
            t.delay(Some(Duration::from_millis(1))).unwrap(),
            Tag::new(Duration::from_millis(6), 0)
        );
    }

    #[test]
    fn test_delay_overflow() {
        let t = Tag::new(Duration::MAX, 0);
        assert_eq!(
            t.delay(Some(Duration::from_nanos(1))),
            Err(TagError::TagOverflow)
        );

        let t = Tag::new(Duration::ZERO, usize::MAX);
        assert_eq!(t.delay(None), Err(TagError::TagOverflow));
    }

    #[test]
    fn test_timestamp_saturation() {
        let max = Timestamp::MAX;
        assert_eq!(max.saturating_offset(Duration::from_secs(1)), max);
        assert!(max.checked_offset(Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_absolute_before_origin() {
        let t0 = Timestamp::from(Duration::from_secs(10));
        let earlier = Timestamp::from(Duration::from_secs(5));
        assert_eq!(Tag::absolute(t0, earlier), Tag::ORIGIN);
    }
}

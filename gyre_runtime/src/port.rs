use std::{fmt::Debug, marker::PhantomData};

use downcast_rs::{impl_downcast, Downcast};
use gyre_core::keys::{PortKey, ReactorKey};

use crate::data::PortData;

/// The directional kind of a port.
///
/// `Caller`/`Callee` are the endpoints of a synchronous procedure invocation
/// pair; they never hold tag-scoped values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Input,
    Output,
    Caller,
    Callee,
}

pub trait BasePort: Debug + Send + Sync + Downcast {
    /// Get the name of this port
    fn name(&self) -> &str;

    /// Get the key for this port
    fn key(&self) -> PortKey;

    /// The directional kind of this port
    fn kind(&self) -> PortKind;

    /// The reactor owning this port
    fn owner(&self) -> ReactorKey;

    /// Return true if the port holds a value at the current tag
    fn is_present(&self) -> bool;

    /// Reset the internal value at tag advance
    fn cleanup(&mut self);

    /// Get the internal type name str
    fn type_name(&self) -> &'static str;
}
impl_downcast!(BasePort);

pub struct Port<T: PortData> {
    name: String,
    key: PortKey,
    kind: PortKind,
    owner: ReactorKey,
    value: Option<T>,
}

impl<T: PortData> Debug for Port<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<T: PortData> Port<T> {
    pub fn new(name: &str, key: PortKey, kind: PortKind, owner: ReactorKey) -> Self {
        Self {
            name: name.to_owned(),
            key,
            kind,
            owner,
            value: None,
        }
    }

    pub fn get(&self) -> &Option<T> {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = Some(value);
    }

    pub fn boxed(self) -> Box<dyn BasePort> {
        Box::new(self)
    }
}

impl<T: PortData> BasePort for Port<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> PortKey {
        self.key
    }

    fn kind(&self) -> PortKind {
        self.kind
    }

    fn owner(&self) -> ReactorKey {
        self.owner
    }

    fn is_present(&self) -> bool {
        self.value.is_some()
    }

    fn cleanup(&mut self) {
        self.value = None;
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Type-erased handle over the typed port references below, used by the
/// connection engine.
pub trait PortHandle: Copy {
    fn port_key(self) -> PortKey;
}

/// A typed reference to an input port.
pub struct InPort<T: PortData> {
    pub(crate) key: PortKey,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

/// A typed reference to an output port.
pub struct OutPort<T: PortData> {
    pub(crate) key: PortKey,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

/// The calling end of a synchronous procedure pair. `A` is the argument
/// type, `R` the return type.
pub struct CallerPort<A: PortData, R: PortData> {
    pub(crate) key: PortKey,
    pub(crate) _marker: PhantomData<fn() -> (A, R)>,
}

/// The callee end of a synchronous procedure pair.
pub struct CalleePort<A: PortData, R: PortData> {
    pub(crate) key: PortKey,
    pub(crate) _marker: PhantomData<fn() -> (A, R)>,
}

macro_rules! impl_port_ref {
    ($name:ident < $($gen:ident),+ >) => {
        impl<$($gen: PortData),+> Debug for $name<$($gen),+> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.key)
            }
        }

        impl<$($gen: PortData),+> Clone for $name<$($gen),+> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<$($gen: PortData),+> Copy for $name<$($gen),+> {}

        impl<$($gen: PortData),+> $name<$($gen),+> {
            pub(crate) fn from_key(key: PortKey) -> Self {
                Self { key, _marker: PhantomData }
            }

            pub fn key(&self) -> PortKey {
                self.key
            }
        }

        impl<$($gen: PortData),+> PortHandle for $name<$($gen),+> {
            fn port_key(self) -> PortKey {
                self.key
            }
        }
    };
}

impl_port_ref!(InPort<T>);
impl_port_ref!(OutPort<T>);
impl_port_ref!(CallerPort<A, R>);
impl_port_ref!(CalleePort<A, R>);

/// Marker for port references whose arena slot holds a `Port<T>` value.
pub trait ValuePort<T: PortData>: PortHandle {}
impl<T: PortData> ValuePort<T> for InPort<T> {}
impl<T: PortData> ValuePort<T> for OutPort<T> {}

/// Key-gated facade granting `set` on a port to the reaction that declared
/// it as an effect. Obtained via [`crate::Env::as_writable`] or implicitly
/// through a reaction builder's `with_effect`.
pub struct WritablePort<T: PortData> {
    pub(crate) key: PortKey,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

impl_port_ref!(WritablePort<T>);

impl<T: PortData> From<OutPort<T>> for WritablePort<T> {
    fn from(port: OutPort<T>) -> Self {
        Self::from_key(port.key)
    }
}

impl<T: PortData> From<InPort<T>> for WritablePort<T> {
    fn from(port: InPort<T>) -> Self {
        Self::from_key(port.key)
    }
}

/// A fixed-width bank of input ports addressable by channel index.
pub struct InPortBank<T: PortData> {
    pub(crate) keys: Vec<PortKey>,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

/// A fixed-width bank of output ports addressable by channel index.
pub struct OutPortBank<T: PortData> {
    pub(crate) keys: Vec<PortKey>,
    pub(crate) _marker: PhantomData<fn() -> T>,
}

macro_rules! impl_port_bank {
    ($bank:ident, $port:ident) => {
        impl<T: PortData> Clone for $bank<T> {
            fn clone(&self) -> Self {
                Self {
                    keys: self.keys.clone(),
                    _marker: PhantomData,
                }
            }
        }

        impl<T: PortData> $bank<T> {
            pub fn width(&self) -> usize {
                self.keys.len()
            }

            pub fn is_empty(&self) -> bool {
                self.keys.is_empty()
            }

            /// Get the port at channel `idx`. Panics if `idx` is out of range.
            pub fn channel(&self, idx: usize) -> $port<T> {
                $port::from_key(self.keys[idx])
            }

            pub fn get(&self, idx: usize) -> Option<$port<T>> {
                self.keys.get(idx).map(|&key| $port::from_key(key))
            }

            pub fn iter(&self) -> impl Iterator<Item = $port<T>> + '_ {
                self.keys.iter().map(|&key| $port::from_key(key))
            }
        }
    };
}

impl_port_bank!(InPortBank, InPort);
impl_port_bank!(OutPortBank, OutPort);

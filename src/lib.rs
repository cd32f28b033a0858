#![doc = include_str!("../README.md")]
#![deny(clippy::all)]

pub use gyre_core::{keys, time};
pub use gyre_runtime as runtime;

/// Everything a typical reactor program needs in scope.
pub mod prelude {
    pub use crate::runtime::{
        ActionRef, App, AppHandle, Assembler, BankInfo, CalleePort, CallerPort, Config, Context,
        Duration, Env, FederatePortAction, InPort, InPortBank, MutationContext, OutPort,
        OutPortBank, PhysicalScheduler, RuntimeError, ShutdownRef, StartupRef, Tag, TagAuthority,
        TimerRef, Timestamp, WritablePort,
    };
}

use downcast_rs::{impl_downcast, DowncastSync};

/// Types that can flow through ports and actions.
pub trait PortData: std::fmt::Debug + Clone + Send + Sync + 'static {}
impl<T> PortData for T where T: std::fmt::Debug + Clone + Send + Sync + 'static {}

/// The private state bag of a Reactor.
///
/// Any `Send + Sync + 'static` type qualifies; reactions receive it back as
/// the concrete type they were registered with.
pub trait ReactorState: DowncastSync {}
impl<T> ReactorState for T where T: std::any::Any + Send + Sync {}

impl_downcast!(sync ReactorState);

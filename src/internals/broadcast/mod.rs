pub mod registry;
pub mod task;

pub use registry::{ClientRegistry, OutboundMessage, SubscriberHandle, SubscriberId};

pub mod chain;
pub mod encode;
pub mod external;
pub mod service;

pub use service::SnapshotService;

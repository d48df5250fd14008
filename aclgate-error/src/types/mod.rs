pub mod acl;
pub mod config;
pub mod context;
pub mod rule;

pub use acl::*;
pub use config::*;
pub use context::*;
pub use rule::*;

//! Error types shared by the aclgate crates.

pub mod ext;
pub mod result_ext;
pub mod stack;
pub mod status_code;
pub mod types;

pub use ext::*;
pub use result_ext::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

pub type AclResult<T> = Result<T, StackError>;

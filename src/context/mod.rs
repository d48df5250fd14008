pub mod request;
pub mod request_context;
pub mod transactional;
pub mod user;

pub use request::{RequestInfo, StaticRequestInfo, StaticRequestInfoBuilder};
pub use request_context::{HistoryEntry, RequestContext};
pub use transactional::{CommitChain, SharedTransaction, Transaction, Transactional};
pub use user::{
    BasicAuth, LoggedUser, AVAILABLE_GROUPS_HEADER, CURRENT_GROUP_HEADER, USERNAME_HEADER,
};

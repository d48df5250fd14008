/// Access control list: ordered blocks, verdicts, audit and hot reload.
pub mod acl;
/// Named policies made of ordered rule chains.
pub mod block;
/// Settings loading (YAML, JSON, TOML and environment overrides).
pub mod config;
/// Per-request state: request view, transactional fields, logged user.
pub mod context;
/// Registry of external services referenced by rules.
pub mod definitions;
/// Tracing subscriber setup (filters, formats, sinks).
pub mod logging;
/// Wildcard pattern matching with negation.
pub mod matcher;
/// Rule trait, decorators and the built-in rule catalog.
pub mod rules;
/// Short-circuiting evaluation of ordered async steps.
pub mod sequencer;
/// `@{...}` placeholder resolution.
pub mod variables;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use acl::{Acl, AclHandle, AclOutcome, AuditRecord, AuditSink, TracingAuditSink};
pub use block::{Block, BlockExitResult, Policy, Verbosity};
pub use config::{AclSettings, BlockSettings, DefinitionSettings};
pub use context::{
    BasicAuth, LoggedUser, RequestContext, RequestInfo, StaticRequestInfo, Transactional,
};
pub use definitions::{Definitions, ExternalAuthenticationService, GroupsProvider};
pub use matcher::WildcardMatcher;
pub use rules::{Capabilities, Rule, RuleExitResult, SyncRule};
pub use variables::VariablesManager;

/// Error types shared with hosts.
pub use aclgate_error::{
    AclError, AclResult, ConfigError, ContextError, RuleError, StackError, StatusCode,
};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::AclOutcome;
use crate::context::RequestContext;

/// Audit trail entry, one per evaluated request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub id: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub final_state: String,
    pub matched_block: String,
    pub duration_ms: u64,
    pub action: String,
    pub origin_address: Option<String>,
    pub resource_names: Vec<String>,
    pub method: String,
    pub path: String,
    pub content_length: usize,
    /// Header names, or names and values when `full_headers` was requested.
    pub headers: BTreeMap<String, String>,
    pub user: Option<String>,
    pub acl_history: Vec<String>,
}

/// Receives audit records. Called on the evaluating task, so it must not
/// block for long.
pub trait AuditSink: Send + Sync {
    fn submit(
        &self,
        record: &AuditRecord,
    );
}

/// Writes records as JSON through `tracing` under the `aclgate::audit`
/// target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditRecord {
    pub fn new(
        ctx: &RequestContext,
        outcome: &AclOutcome,
        full_headers: bool,
    ) -> Self {
        let headers = ctx
            .headers()
            .iter()
            .map(|(k, v)| {
                let value = if full_headers && !k.eq_ignore_ascii_case("authorization") {
                    v.clone()
                } else {
                    String::new()
                };
                (k.clone(), value)
            })
            .collect();
        Self {
            id: ctx.id().to_string(),
            timestamp: Utc::now(),
            final_state: outcome.final_state().to_string(),
            matched_block: outcome.matched_block().to_string(),
            duration_ms: ctx.elapsed().as_millis() as u64,
            action: ctx.action(),
            origin_address: ctx.remote_address(),
            resource_names: ctx.indices().into_iter().collect(),
            method: ctx.method(),
            path: ctx.uri(),
            content_length: ctx.content_length(),
            headers,
            user: ctx
                .logged_user()
                .map(|u| u.id)
                .or_else(|| ctx.basic_auth().map(|a| a.user)),
            acl_history: ctx.history().iter().map(|h| h.to_string()).collect(),
        }
    }
}

impl AuditSink for TracingAuditSink {
    fn submit(
        &self,
        record: &AuditRecord,
    ) {
        match serde_json::to_string(record) {
            Ok(json) => info!(target: "aclgate::audit", request_id = %record.id, "{json}"),
            Err(err) => {
                warn!(request_id = %record.id, error = %err, "cannot serialize audit record")
            }
        }
    }
}

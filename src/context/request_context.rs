use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use aclgate_error::ContextError;
use tracing::{debug, Level};

use super::{
    request::RequestInfo,
    transactional::{CommitChain, Transactional},
    user::{BasicAuth, LoggedUser},
};
use crate::{rules::RuleExitResult, variables::VariablesManager};

const AUTHORIZATION_HEADER: &str = "authorization";
const USER_AGENT_HEADER: &str = "user-agent";

/// Rule verdicts collected while one block was evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub block: String,
    pub results: Vec<RuleExitResult>,
}

/// Per-request view handed to rules.
///
/// Identity attributes are read once from the host. Indices, logged user and
/// response headers are transactional: rules mutate them freely, `reset`
/// throws the mutations away and `commit` hands them to the host once.
/// Committing the logged user adds its identity headers to the response
/// headers, which are committed after it.
pub struct RequestContext {
    info: Arc<dyn RequestInfo>,
    id: String,
    headers: HashMap<String, String>,
    started: Instant,
    chain: CommitChain,
    indices: Transactional<BTreeSet<String>>,
    logged_user: Transactional<Option<LoggedUser>>,
    response_headers: Transactional<BTreeMap<String, String>>,
    history: Vec<HistoryEntry>,
    sub_contexts: Vec<RequestContext>,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl RequestContext {
    pub fn new(info: Arc<dyn RequestInfo>) -> Result<Self, ContextError> {
        let chain = CommitChain::new("request");

        let indices = indices_field(&info);
        indices.delegate_to(&chain)?;

        let response_headers = {
            let info = info.clone();
            Transactional::new(
                "response_headers",
                BTreeMap::new,
                move |headers: &BTreeMap<String, String>| {
                    if headers.is_empty() {
                        return Ok(());
                    }
                    info.write_response_headers(headers)
                },
            )
        };

        let logged_user = {
            let response_headers = response_headers.clone();
            Transactional::new(
                "logged_user",
                || None,
                move |user: &Option<LoggedUser>| {
                    if let Some(user) = user {
                        let mut headers = response_headers.get();
                        headers.extend(user.response_headers());
                        response_headers.mutate(headers);
                    }
                    Ok(())
                },
            )
        };
        // the user hook writes into the headers, so it commits first
        logged_user.delegate_to(&chain)?;
        response_headers.delegate_to(&chain)?;

        let mut context = Self {
            id: info.id(),
            headers: info.headers(),
            started: Instant::now(),
            info: info.clone(),
            chain,
            indices,
            logged_user,
            response_headers,
            history: Vec::new(),
            sub_contexts: Vec::new(),
        };

        for sub in info.sub_requests() {
            let sub_context = context.sub_context(sub)?;
            context.sub_contexts.push(sub_context);
        }

        Ok(context)
    }

    /// Context for one part of a composite request.
    ///
    /// It owns its index set and shares identity and response headers with
    /// this context. Its commit chain is nested into this one.
    fn sub_context(
        &self,
        info: Arc<dyn RequestInfo>,
    ) -> Result<Self, ContextError> {
        let chain = CommitChain::new("sub_request");
        let indices = indices_field(&info);
        indices.delegate_to(&chain)?;
        chain.delegate_to(&self.chain)?;

        Ok(Self {
            id: format!("{}-sub", self.id),
            headers: self.headers.clone(),
            started: self.started,
            info,
            chain,
            indices,
            logged_user: self.logged_user.clone(),
            response_headers: self.response_headers.clone(),
            history: Vec::new(),
            sub_contexts: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn action(&self) -> String {
        self.info.action()
    }

    pub fn method(&self) -> String {
        self.info.method()
    }

    pub fn uri(&self) -> String {
        self.info.uri()
    }

    pub fn remote_address(&self) -> Option<String> {
        self.info.remote_address()
    }

    pub fn body(&self) -> String {
        self.info.body()
    }

    pub fn content_length(&self) -> usize {
        self.info.content_length()
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Header value, looked up case-insensitively.
    pub fn header(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn basic_auth(&self) -> Option<BasicAuth> {
        self.header(AUTHORIZATION_HEADER)
            .and_then(BasicAuth::from_header_value)
    }

    pub fn involves_indices(&self) -> bool {
        self.info.involves_indices()
    }

    pub fn is_read_request(&self) -> bool {
        self.info.is_read_request()
    }

    pub fn is_composite_request(&self) -> bool {
        self.info.is_composite_request()
    }

    pub fn all_indices_and_aliases(&self) -> BTreeSet<String> {
        self.info.all_indices_and_aliases()
    }

    pub fn expand_indices(
        &self,
        patterns: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        self.info.expand_indices(patterns)
    }

    /// Working index set.
    pub fn indices(&self) -> BTreeSet<String> {
        self.indices.get()
    }

    /// Index set as the host parsed it.
    pub fn initial_indices(&self) -> BTreeSet<String> {
        self.indices.get_initial()
    }

    pub fn set_indices(
        &mut self,
        indices: BTreeSet<String>,
    ) {
        debug!(request_id = %self.id, ?indices, "narrowing indices");
        self.indices.mutate(indices);
    }

    pub fn logged_user(&self) -> Option<LoggedUser> {
        self.logged_user.get()
    }

    pub fn set_logged_user(
        &mut self,
        user: LoggedUser,
    ) {
        self.logged_user.mutate(Some(user));
    }

    pub fn response_headers(&self) -> BTreeMap<String, String> {
        self.response_headers.get()
    }

    pub fn set_response_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        let mut headers = self.response_headers.get();
        headers.insert(name.into(), value.into());
        self.response_headers.mutate(headers);
    }

    /// Resolver for `@{...}` placeholders bound to this request.
    pub fn variables(&self) -> VariablesManager {
        let user = self.logged_user().map(|u| u.id);
        VariablesManager::new(&self.headers, user.as_deref())
    }

    pub fn has_sub_requests(&self) -> bool {
        !self.sub_contexts.is_empty()
    }

    pub fn sub_contexts_mut(&mut self) -> &mut [RequestContext] {
        &mut self.sub_contexts
    }

    pub fn add_history(
        &mut self,
        block: impl Into<String>,
        results: Vec<RuleExitResult>,
    ) {
        self.history.push(HistoryEntry {
            block: block.into(),
            results,
        });
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Throws away every mutation since the last reset.
    pub fn reset(&self) {
        self.chain.reset();
    }

    /// Hands the working values to the host. Fails on a second call.
    pub fn commit(&self) -> Result<(), ContextError> {
        debug!(request_id = %self.id, "committing request context");
        self.chain.commit()
    }

    pub fn is_committed(&self) -> bool {
        self.chain.is_committed()
    }

    fn header_summary(&self) -> String {
        let mut names: Vec<&String> = self.headers.keys().collect();
        names.sort();
        if !tracing::enabled!(Level::DEBUG) {
            return names
                .into_iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(",");
        }
        names
            .into_iter()
            .map(|k| {
                if k.eq_ignore_ascii_case(AUTHORIZATION_HEADER) {
                    format!("{k}=<OMITTED>")
                } else {
                    format!("{k}={}", self.headers[k])
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn indices_field(info: &Arc<dyn RequestInfo>) -> Transactional<BTreeSet<String>> {
    let for_init = info.clone();
    let for_commit = info.clone();
    Transactional::new(
        "indices",
        move || {
            if for_init.involves_indices() {
                for_init.indices()
            } else {
                BTreeSet::new()
            }
        },
        move |indices: &BTreeSet<String>| {
            if !for_commit.involves_indices() || *indices == for_commit.indices() {
                return Ok(());
            }
            for_commit.write_indices(indices)
        },
    )
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for HistoryEntry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let rules: Vec<String> = self.results.iter().map(|r| r.to_string()).collect();
        write!(f, "[{}->[{}]]", self.block, rules.join(", "))
    }
}

impl fmt::Display for RequestContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let user = match self.logged_user() {
            Some(user) => user.id,
            None => match self.basic_auth() {
                Some(auth) => format!("{}(?)", auth.user),
                None => "[no basic auth header]".to_string(),
            },
        };
        let indices = if self.involves_indices() {
            self.indices().into_iter().collect::<Vec<_>>().join(",")
        } else {
            "<N/A>".to_string()
        };
        let history: Vec<String> = self.history.iter().map(|h| h.to_string()).collect();

        write!(
            f,
            concat!(
                "{{ ID:{}, ACT:{}, USR:{}, BRS:{}, OA:{}, IDX:{}, MET:{}, PTH:{}, ",
                "CNT:<OMITTED, LENGTH={}>, HDR:{}, HIS:{} }}"
            ),
            self.id,
            self.action(),
            user,
            self.header(USER_AGENT_HEADER).is_some_and(|ua| !ua.is_empty()),
            self.remote_address().unwrap_or_else(|| "<N/A>".to_string()),
            indices,
            self.method(),
            self.uri(),
            self.content_length(),
            self.header_summary(),
            history.join(", "),
        )
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("indices", &self.indices)
            .field("logged_user", &self.logged_user)
            .field("response_headers", &self.response_headers)
            .field("history", &self.history)
            .field("sub_contexts", &self.sub_contexts.len())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use aclgate_error::ContextError;
use parking_lot::Mutex;

use crate::matcher::WildcardMatcher;

/// What the host knows about one inbound operation.
///
/// Implementations adapt the host's native request object. Lookups are
/// read-only; the two `write_*` methods are called once, while the winning
/// block is committed.
pub trait RequestInfo: Send + Sync {
    /// Task or request identifier assigned by the host.
    fn id(&self) -> String;

    fn action(&self) -> String;

    fn method(&self) -> String;

    fn uri(&self) -> String;

    fn remote_address(&self) -> Option<String>;

    /// Raw headers with their original names.
    fn headers(&self) -> HashMap<String, String>;

    fn body(&self) -> String;

    fn content_length(&self) -> usize {
        self.body().len()
    }

    /// Whether the operation addresses indices at all.
    fn involves_indices(&self) -> bool;

    /// Indices named by the request, as the host parsed them.
    fn indices(&self) -> BTreeSet<String>;

    /// Every index and alias known to the cluster.
    fn all_indices_and_aliases(&self) -> BTreeSet<String>;

    /// Resolves index patterns into concrete index names.
    fn expand_indices(
        &self,
        patterns: &BTreeSet<String>,
    ) -> BTreeSet<String>;

    fn is_read_request(&self) -> bool;

    /// Whether the request bundles several independent operations.
    fn is_composite_request(&self) -> bool {
        false
    }

    /// Parts of a composite request, each evaluated with its own index set.
    fn sub_requests(&self) -> Vec<Arc<dyn RequestInfo>> {
        Vec::new()
    }

    /// Applies a narrowed or rewritten index set to the native request.
    fn write_indices(
        &self,
        indices: &BTreeSet<String>,
    ) -> Result<(), ContextError>;

    /// Attaches headers to the response the host will send.
    fn write_response_headers(
        &self,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), ContextError>;
}

/// In-memory [`RequestInfo`] for hosts without a native request object and
/// for tests.
///
/// Write-backs are recorded and can be read back through
/// [`StaticRequestInfo::written_indices`] and
/// [`StaticRequestInfo::written_headers`].
#[derive(Debug, Default)]
pub struct StaticRequestInfo {
    id: String,
    action: String,
    method: String,
    uri: String,
    remote_address: Option<String>,
    headers: HashMap<String, String>,
    body: String,
    involves_indices: bool,
    indices: BTreeSet<String>,
    all_indices: BTreeSet<String>,
    read_request: bool,
    composite: bool,
    sub_requests: Vec<Arc<StaticRequestInfo>>,
    index_write_error: Option<ContextError>,
    written_indices: Mutex<Option<BTreeSet<String>>>,
    written_headers: Mutex<BTreeMap<String, String>>,
}

#[derive(Debug, Default)]
pub struct StaticRequestInfoBuilder {
    inner: StaticRequestInfo,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl StaticRequestInfo {
    pub fn builder() -> StaticRequestInfoBuilder {
        StaticRequestInfoBuilder {
            inner: StaticRequestInfo {
                id: uuid::Uuid::new_v4().simple().to_string(),
                action: "cluster:monitor/main".to_string(),
                method: "GET".to_string(),
                uri: "/".to_string(),
                remote_address: Some("127.0.0.1".to_string()),
                read_request: true,
                ..Default::default()
            },
        }
    }

    /// Index set handed to the host on commit, if any.
    pub fn written_indices(&self) -> Option<BTreeSet<String>> {
        self.written_indices.lock().clone()
    }

    /// Response headers handed to the host on commit.
    pub fn written_headers(&self) -> BTreeMap<String, String> {
        self.written_headers.lock().clone()
    }
}

impl StaticRequestInfoBuilder {
    pub fn id(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.inner.id = id.into();
        self
    }

    pub fn action(
        mut self,
        action: impl Into<String>,
    ) -> Self {
        self.inner.action = action.into();
        self
    }

    pub fn method(
        mut self,
        method: impl Into<String>,
    ) -> Self {
        self.inner.method = method.into();
        self
    }

    pub fn uri(
        mut self,
        uri: impl Into<String>,
    ) -> Self {
        self.inner.uri = uri.into();
        self
    }

    pub fn remote_address(
        mut self,
        address: Option<&str>,
    ) -> Self {
        self.inner.remote_address = address.map(str::to_string);
        self
    }

    pub fn header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.inner.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(
        mut self,
        body: impl Into<String>,
    ) -> Self {
        self.inner.body = body.into();
        self
    }

    /// Requested indices. Marks the request as one involving indices.
    pub fn indices<I, S>(
        mut self,
        indices: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.involves_indices = true;
        self.inner.indices = indices.into_iter().map(Into::into).collect();
        self
    }

    pub fn involves_indices(
        mut self,
        involves: bool,
    ) -> Self {
        self.inner.involves_indices = involves;
        self
    }

    pub fn all_indices<I, S>(
        mut self,
        indices: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.all_indices = indices.into_iter().map(Into::into).collect();
        self
    }

    pub fn read_request(
        mut self,
        read: bool,
    ) -> Self {
        self.inner.read_request = read;
        self
    }

    pub fn composite(
        mut self,
        composite: bool,
    ) -> Self {
        self.inner.composite = composite;
        self
    }

    /// Adds a part of a composite request. Marks the request as composite.
    pub fn sub_request(
        mut self,
        sub: StaticRequestInfo,
    ) -> Self {
        self.inner.composite = true;
        self.inner.sub_requests.push(Arc::new(sub));
        self
    }

    /// Makes [`RequestInfo::write_indices`] fail with `error`.
    pub fn fail_index_write(
        mut self,
        error: ContextError,
    ) -> Self {
        self.inner.index_write_error = Some(error);
        self
    }

    pub fn build(self) -> StaticRequestInfo {
        self.inner
    }
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations for StaticRequestInfo
////////////////////////////////////////////////////////////////////////////////

impl RequestInfo for StaticRequestInfo {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn action(&self) -> String {
        self.action.clone()
    }

    fn method(&self) -> String {
        self.method.clone()
    }

    fn uri(&self) -> String {
        self.uri.clone()
    }

    fn remote_address(&self) -> Option<String> {
        self.remote_address.clone()
    }

    fn headers(&self) -> HashMap<String, String> {
        self.headers.clone()
    }

    fn body(&self) -> String {
        self.body.clone()
    }

    fn involves_indices(&self) -> bool {
        self.involves_indices
    }

    fn indices(&self) -> BTreeSet<String> {
        self.indices.clone()
    }

    fn all_indices_and_aliases(&self) -> BTreeSet<String> {
        self.all_indices.clone()
    }

    fn expand_indices(
        &self,
        patterns: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        match WildcardMatcher::new(patterns) {
            Ok(matcher) => matcher.filter(&self.all_indices),
            Err(_) => BTreeSet::new(),
        }
    }

    fn is_read_request(&self) -> bool {
        self.read_request
    }

    fn is_composite_request(&self) -> bool {
        self.composite
    }

    fn sub_requests(&self) -> Vec<Arc<dyn RequestInfo>> {
        self.sub_requests
            .iter()
            .map(|s| s.clone() as Arc<dyn RequestInfo>)
            .collect()
    }

    fn write_indices(
        &self,
        indices: &BTreeSet<String>,
    ) -> Result<(), ContextError> {
        if let Some(ref err) = self.index_write_error {
            return Err(err.clone());
        }
        *self.written_indices.lock() = Some(indices.clone());
        Ok(())
    }

    fn write_response_headers(
        &self,
        headers: &BTreeMap<String, String>,
    ) -> Result<(), ContextError> {
        self.written_headers
            .lock()
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

use std::{collections::BTreeSet, fmt};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

pub const USERNAME_HEADER: &str = "x-ror-username";
pub const AVAILABLE_GROUPS_HEADER: &str = "x-ror-available-groups";
pub const CURRENT_GROUP_HEADER: &str = "x-ror-current-group";

/// Identity established by an authentication rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LoggedUser {
    pub id: String,
    pub available_groups: BTreeSet<String>,
    pub current_group: Option<String>,
}

/// Credentials carried by an `Authorization: Basic ...` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl LoggedUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            available_groups: BTreeSet::new(),
            current_group: None,
        }
    }

    pub fn with_groups<I, S>(
        mut self,
        groups: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_current_group(
        mut self,
        group: impl Into<String>,
    ) -> Self {
        self.current_group = Some(group.into());
        self
    }

    /// Response headers announcing this identity to the client.
    pub fn response_headers(&self) -> Vec<(String, String)> {
        let mut out = vec![(USERNAME_HEADER.to_string(), self.id.clone())];
        if !self.available_groups.is_empty() {
            let groups: Vec<&str> = self.available_groups.iter().map(String::as_str).collect();
            out.push((AVAILABLE_GROUPS_HEADER.to_string(), groups.join(",")));
        }
        if let Some(ref group) = self.current_group {
            out.push((CURRENT_GROUP_HEADER.to_string(), group.clone()));
        }
        out
    }
}

impl BasicAuth {
    /// Parses the value of an `Authorization` header.
    ///
    /// Returns `None` for other schemes, invalid base64 or a payload without
    /// `:`.
    pub fn from_header_value(value: &str) -> Option<Self> {
        let value = value.trim();
        let (scheme, encoded) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// `user:password`, as hashed by credential rules.
    pub fn colon_separated(&self) -> String {
        format!("{}:{}", self.user, self.password)
    }

    pub fn to_header_value(&self) -> String {
        format!("Basic {}", STANDARD.encode(self.colon_separated()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for LoggedUser {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<hidden>")
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

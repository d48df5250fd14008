use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Status codes used to categorize errors.
///
/// # Ranges:
/// - 0xxx: success
/// - 1xxx: general errors
/// - 2xxx: data / lookup errors
/// - 3xxx: authentication and permissions
/// - 4xxx: configuration
/// - 5xxx: evaluation pipeline and request context
///
/// # Implementation:
/// - `num_enum::TryFromPrimitive` provides a native `TryFrom<u32>`.
/// - optional: `strum` for `AsRefStr`/`EnumIter` (feature = "strum").
/// - optional: `serde_repr` to serialize as the numeric value (feature =
///   "serde_repr").
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: success ===
    Success = 0,

    // === 1xxx: general ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: data ===
    NotFound = 2000,
    AlreadyExists = 2001,
    InvalidValue = 2002,

    // === 3xxx: authentication / permissions ===
    AuthFailed = 3000,
    PermissionDenied = 3001,
    InvalidCredentials = 3002,
    Unauthorized = 3003,

    // === 4xxx: configuration ===
    InvalidConfig = 4000,
    UnknownRule = 4001,
    InvalidRuleValue = 4002,
    MissingAuthentication = 4003,
    DuplicateBlock = 4004,
    UnknownDefinition = 4005,
    SettingsSource = 4006,

    // === 5xxx: evaluation ===
    RuleFailed = 5000,
    ExternalService = 5001,
    AlreadyCommitted = 5002,
    AlreadyDelegated = 5003,
    WriteBackFailed = 5004,
    RulePanicked = 5005,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Numeric representation of the status code.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Tries to get a `StatusCode` from a `u32`.
    ///
    /// Uses `TryFrom<u32>` from `num_enum`; returns `None` if the value
    /// doesn't match any variant.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Returns `true` if `code` stands for a successful result.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Whether the code describes a problem with the request itself.
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        (2000..=3999).contains(&c) || matches!(self, Self::InvalidArgs)
    }

    /// Configuration errors (4xxx), raised while building an ACL.
    pub fn is_config_error(&self) -> bool {
        (4000..=4999).contains(&self.code())
    }

    /// Errors raised while a request is being evaluated (5xxx).
    pub fn is_evaluation_error(&self) -> bool {
        (5000..=5999).contains(&self.code())
    }

    /// HTTP status matching the code.
    ///
    /// Hosts use it to pick the response status of a rejected request.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Success => 200,
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::InvalidArgs | Self::InvalidValue => 400,
            Self::AuthFailed | Self::InvalidCredentials | Self::Unauthorized => 401,
            Self::PermissionDenied => 403,
            Self::Unsupported => 501,
            Self::ExternalService => 502,
            _ => 500,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations for StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

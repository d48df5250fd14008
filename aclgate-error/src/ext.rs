use std::{any::Any, error::Error};

use crate::StatusCode;

/// Common surface of every aclgate error (object-safe), so errors of
/// different kinds can travel inside one [`StackError`](crate::StackError).
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Status of the error, [`StatusCode::Internal`] by default.
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Returns the error as [`Any`](std::any::Any) so it can be downcast.
    fn as_any(&self) -> &dyn Any;

    /// Safe message for the client.
    ///
    /// Internal errors collapse to `"Internal server error"`.
    fn client_message(&self) -> String {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal | StatusCode::Unexpected => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

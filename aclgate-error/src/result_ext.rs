use crate::StackError;

/// `.context(...)` for any result whose error converts into [`StackError`].
pub trait ResultExt<T> {
    fn context<C>(
        self,
        context: C,
    ) -> Result<T, StackError>
    where
        C: Into<String>;

    /// Lazy variant, the closure only runs on error.
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        context: C,
    ) -> Result<T, StackError>
    where
        C: Into<String>,
    {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.into().context(context)),
        }
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.into().context(f())),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AclResult, ConfigError, StatusCode};

    fn parse_block(name: &str) -> Result<(), ConfigError> {
        Err(ConfigError::DuplicateBlock {
            block: name.to_string(),
        })
    }

    /// Checks that the recorded location is the caller's line.
    #[test]
    fn test_context_records_caller() {
        fn load() -> AclResult<()> {
            parse_block("b").context("loading acl")?;
            Ok(())
        }

        let err = load().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::DuplicateBlock);
        assert_eq!(err.contexts()[0].message, "loading acl");
        assert!(err.contexts()[0].location.file().ends_with("result_ext.rs"));
    }

    #[test]
    fn test_with_context_is_lazy() {
        let mut called = false;
        let ok: Result<(), ConfigError> = Ok(());
        ok.with_context(|| {
            called = true;
            "unused"
        })
        .unwrap();
        assert!(!called);

        let err = parse_block("b")
            .with_context(|| format!("block {}", 1))
            .unwrap_err();
        assert_eq!(err.to_string(), "block 1: block name 'b' is declared more than once");
    }
}

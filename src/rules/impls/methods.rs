use std::collections::BTreeSet;

use aclgate_error::RuleError;

use crate::{context::RequestContext, rules::SyncRule};

#[derive(Debug, Clone)]
pub struct MethodsRule {
    methods: BTreeSet<String>,
}

impl MethodsRule {
    pub fn new(methods: Vec<String>) -> Self {
        Self {
            methods: methods.iter().map(|m| m.trim().to_ascii_uppercase()).collect(),
        }
    }
}

impl SyncRule for MethodsRule {
    fn key(&self) -> &str {
        "methods"
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        Ok(self.methods.contains(&ctx.method().to_ascii_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::context::StaticRequestInfo;

    #[rstest]
    #[case("GET", true)]
    #[case("head", true)]
    #[case("POST", false)]
    fn test_methods(
        #[case] method: &str,
        #[case] expected: bool,
    ) {
        let rule = MethodsRule::new(vec!["get".to_string(), "HEAD".to_string()]);
        let info = StaticRequestInfo::builder().method(method).build();
        let mut ctx = RequestContext::new(Arc::new(info)).unwrap();
        assert_eq!(rule.check_sync(&mut ctx).unwrap(), expected);
    }
}

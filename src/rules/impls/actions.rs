use aclgate_error::{ConfigError, RuleError};

use crate::{context::RequestContext, matcher::WildcardMatcher, rules::SyncRule};

/// Matches the action name, e.g. `indices:data/read/*`.
#[derive(Debug, Clone)]
pub struct ActionsRule {
    actions: WildcardMatcher,
}

impl ActionsRule {
    pub fn new(actions: Vec<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            actions: WildcardMatcher::with_negations(actions)?,
        })
    }
}

impl SyncRule for ActionsRule {
    fn key(&self) -> &str {
        "actions"
    }

    fn check_sync(
        &self,
        ctx: &mut RequestContext,
    ) -> Result<bool, RuleError> {
        Ok(self.actions.is_match(&ctx.action()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::context::StaticRequestInfo;

    #[rstest]
    #[case("indices:data/read/search", true)]
    #[case("indices:data/read/scroll", false)]
    #[case("cluster:monitor/health", true)]
    #[case("indices:data/write/index", false)]
    fn test_actions(
        #[case] action: &str,
        #[case] expected: bool,
    ) {
        let rule = ActionsRule::new(vec![
            "indices:data/read/*".to_string(),
            "cluster:*".to_string(),
            "~indices:data/read/scroll*".to_string(),
        ])
        .unwrap();
        let info = StaticRequestInfo::builder().action(action).build();
        let mut ctx = RequestContext::new(Arc::new(info)).unwrap();
        assert_eq!(rule.check_sync(&mut ctx).unwrap(), expected);
    }
}

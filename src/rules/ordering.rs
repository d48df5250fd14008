use std::sync::Arc;

use super::Rule;

/// Evaluation position of each known rule inside a block.
///
/// Authentication comes first because later rules read the logged user,
/// request inspection follows, authorization runs last.
static RULE_POSITION: phf::Map<&'static str, u8> = phf::phf_map! {
    "auth_key" => 0,
    "auth_key_sha256" => 1,
    "proxy_auth" => 2,
    "external_authentication" => 3,

    "hosts" => 10,
    "x_forwarded_for" => 11,
    "uri_re" => 12,
    "maxBodyLength" => 13,
    "methods" => 14,
    "headers" => 15,
    "headers_and" => 16,
    "headers_or" => 17,

    "indices" => 20,
    "actions" => 21,
    "indices_rewrite" => 22,

    "users" => 30,

    "groups_provider_authorization" => 40,
};

/// Position for rules the table does not know, after every known rule.
const UNKNOWN_POSITION: u8 = u8::MAX;

pub fn position_of(key: &str) -> u8 {
    RULE_POSITION.get(key).copied().unwrap_or(UNKNOWN_POSITION)
}

/// Reorders rules by position. Rules sharing a position keep their order.
pub fn sort_rules(rules: &mut [Arc<dyn Rule>]) {
    rules.sort_by_key(|r| position_of(r.key()));
}

#[cfg(test)]
mod tests {
    use aclgate_error::RuleError;
    use async_trait::async_trait;

    use super::*;
    use crate::{
        context::RequestContext,
        rules::{Capabilities, RuleExitResult},
    };

    struct Named(&'static str);

    #[async_trait]
    impl Rule for Named {
        fn key(&self) -> &str {
            self.0
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }

        async fn check(
            &self,
            _ctx: &mut RequestContext,
        ) -> Result<RuleExitResult, RuleError> {
            Ok(RuleExitResult::matched(self.0))
        }
    }

    #[test]
    fn test_sort_rules() {
        let mut rules: Vec<Arc<dyn Rule>> = vec![
            Arc::new(Named("groups_provider_authorization")),
            Arc::new(Named("custom")),
            Arc::new(Named("indices")),
            Arc::new(Named("hosts")),
            Arc::new(Named("auth_key")),
            Arc::new(Named("users")),
        ];
        sort_rules(&mut rules);
        let keys: Vec<&str> = rules.iter().map(|r| r.key()).collect();
        assert_eq!(
            keys,
            vec![
                "auth_key",
                "hosts",
                "indices",
                "users",
                "groups_provider_authorization",
                "custom",
            ]
        );
    }

    /// Checks that rules with the same position keep declaration order.
    #[test]
    fn test_sort_is_stable() {
        let mut rules: Vec<Arc<dyn Rule>> = vec![
            Arc::new(Named("second_custom")),
            Arc::new(Named("first_custom")),
        ];
        sort_rules(&mut rules);
        assert_eq!(rules[0].key(), "second_custom");
        assert_eq!(position_of("nope"), UNKNOWN_POSITION);
    }
}

//! End-to-end checks of the ACL against in-memory requests.

use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use aclgate::{
    context::{AVAILABLE_GROUPS_HEADER, CURRENT_GROUP_HEADER, USERNAME_HEADER},
    Acl, AclHandle, AclOutcome, AclSettings, BasicAuth, ContextError, Definitions,
    ExternalAuthenticationService, GroupsProvider, LoggedUser, RequestContext, RuleError,
    StaticRequestInfo,
};
use async_trait::async_trait;

const CLUSTER: [&str; 4] = ["logs-1", "logs-2", "metrics", "secret"];

/// Accepts one fixed password and counts calls.
struct PasswordService {
    password: &'static str,
    calls: AtomicUsize,
    broken: bool,
}

#[async_trait]
impl ExternalAuthenticationService for PasswordService {
    fn name(&self) -> &str {
        "ext1"
    }

    async fn authenticate(
        &self,
        credentials: &BasicAuth,
    ) -> Result<bool, RuleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(RuleError::ExternalService {
                service: "ext1".to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(credentials.password == self.password)
    }
}

struct StaticGroups {
    groups: &'static [&'static str],
    calls: AtomicUsize,
}

#[async_trait]
impl GroupsProvider for StaticGroups {
    fn name(&self) -> &str {
        "ldap1"
    }

    async fn groups_of(
        &self,
        _user: &LoggedUser,
    ) -> Result<BTreeSet<String>, RuleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.groups.iter().map(|g| g.to_string()).collect())
    }
}

fn password_service(broken: bool) -> Arc<PasswordService> {
    Arc::new(PasswordService {
        password: "secret",
        calls: AtomicUsize::new(0),
        broken,
    })
}

fn basic(
    user: &str,
    password: &str,
) -> String {
    BasicAuth {
        user: user.to_string(),
        password: password.to_string(),
    }
    .to_header_value()
}

fn context(info: &Arc<StaticRequestInfo>) -> RequestContext {
    RequestContext::new(info.clone()).unwrap()
}

/// Checks that an ALLOW verdict commits the logged user as response headers.
#[tokio::test]
async fn test_allow_commits_user_headers() {
    let settings = AclSettings::from_yaml_str(
        r#"
access_control_rules:
  - name: "alice"
    auth_key: "alice:pw"
"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &Definitions::new()).unwrap();

    let info = Arc::new(
        StaticRequestInfo::builder()
            .header("Authorization", basic("alice", "pw"))
            .build(),
    );
    let mut ctx = context(&info);
    let outcome = acl.check(&mut ctx).await;

    assert_eq!(
        outcome,
        AclOutcome::Allowed {
            block: "alice".to_string()
        }
    );
    assert_eq!(info.written_headers().get(USERNAME_HEADER).map(String::as_str), Some("alice"));
}

#[tokio::test]
async fn test_forbid_block_first() {
    let settings = AclSettings::from_json(
        r#"{"access_control_rules": [
            {"name": "no deletes", "type": "forbid", "methods": ["DELETE"]},
            {"name": "alice", "auth_key": "alice:pw"}
        ]}"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &Definitions::new()).unwrap();

    let info = Arc::new(
        StaticRequestInfo::builder()
            .method("DELETE")
            .header("Authorization", basic("alice", "pw"))
            .build(),
    );
    let mut ctx = context(&info);
    let outcome = acl.check(&mut ctx).await;

    assert_eq!(outcome.matched_block(), "no deletes");
    assert_eq!(outcome.http_status(), 401);
    assert!(info.written_headers().is_empty());
    assert_eq!(ctx.history().len(), 1);
}

/// Checks that a failing external service cannot let a request through.
#[tokio::test]
async fn test_failing_service_is_fail_closed() {
    let service = password_service(true);
    let definitions = Definitions::new().with_authentication_service(service.clone());
    let settings = AclSettings::from_json(
        r#"{"prompt_for_basic_auth": false, "access_control_rules": [
            {"name": "ext", "external_authentication": "ext1"}
        ]}"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &definitions).unwrap();

    let info = Arc::new(
        StaticRequestInfo::builder()
            .header("Authorization", basic("bob", "secret"))
            .build(),
    );
    let mut ctx = context(&info);
    let outcome = acl.check(&mut ctx).await;

    assert_eq!(outcome.http_status(), 403);
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert!(!ctx.history()[0].results[0].matched);
}

/// Checks that authorization is never consulted after failed authentication.
#[tokio::test]
async fn test_block_short_circuits() {
    let service = password_service(false);
    let groups = Arc::new(StaticGroups {
        groups: &["ops"],
        calls: AtomicUsize::new(0),
    });
    let definitions = Definitions::new()
        .with_authentication_service(service.clone())
        .with_groups_provider(groups.clone());
    let settings = AclSettings::from_json(
        r#"{"access_control_rules": [{
            "name": "ops",
            "groups_provider_authorization": {"user_groups_provider": "ldap1", "groups": ["ops"]},
            "external_authentication": "ext1"
        }]}"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &definitions).unwrap();

    let wrong = Arc::new(
        StaticRequestInfo::builder()
            .header("Authorization", basic("bob", "nope"))
            .build(),
    );
    assert!(!acl.check(&mut context(&wrong)).await.is_allowed());
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert_eq!(groups.calls.load(Ordering::SeqCst), 0);

    let right = Arc::new(
        StaticRequestInfo::builder()
            .header("Authorization", basic("bob", "secret"))
            .build(),
    );
    assert!(acl.check(&mut context(&right)).await.is_allowed());
    assert_eq!(groups.calls.load(Ordering::SeqCst), 1);
    let headers = right.written_headers();
    assert_eq!(headers.get(AVAILABLE_GROUPS_HEADER).map(String::as_str), Some("ops"));
    assert_eq!(headers.get(CURRENT_GROUP_HEADER).map(String::as_str), Some("ops"));
}

#[tokio::test(start_paused = true)]
async fn test_external_authentication_cache_ttl() {
    let service = password_service(false);
    let definitions = Definitions::new().with_authentication_service(service.clone());
    let settings = AclSettings::from_json(
        r#"{"access_control_rules": [
            {"name": "ext", "external_authentication": {"service": "ext1", "cache_ttl_in_sec": 10}}
        ]}"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &definitions).unwrap();
    let info = Arc::new(
        StaticRequestInfo::builder()
            .header("Authorization", basic("bob", "secret"))
            .build(),
    );

    for _ in 0..3 {
        let mut ctx = context(&info);
        assert!(acl.check(&mut ctx).await.is_allowed());
        assert_eq!(ctx.logged_user().map(|u| u.id), Some("bob".to_string()));
    }
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(acl.check(&mut context(&info)).await.is_allowed());
    assert_eq!(service.calls.load(Ordering::SeqCst), 2);
}

/// Checks that a wildcard read is narrowed to the allowed indices on commit.
#[tokio::test]
async fn test_indices_are_narrowed() {
    let settings = AclSettings::from_json(
        r#"{"access_control_rules": [{"name": "logs", "indices": ["logs-*"]}]}"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &Definitions::new()).unwrap();

    let info = Arc::new(
        StaticRequestInfo::builder()
            .action("indices:data/read/search")
            .indices(["*"])
            .all_indices(CLUSTER)
            .build(),
    );
    let mut ctx = context(&info);
    assert!(acl.check(&mut ctx).await.is_allowed());

    let expected: BTreeSet<String> = ["logs-1", "logs-2"].iter().map(|s| s.to_string()).collect();
    assert_eq!(info.written_indices(), Some(expected));

    let denied = Arc::new(
        StaticRequestInfo::builder()
            .indices(["secret"])
            .all_indices(CLUSTER)
            .read_request(false)
            .build(),
    );
    assert!(!acl.check(&mut context(&denied)).await.is_allowed());
    assert_eq!(denied.written_indices(), None);
}

#[tokio::test]
async fn test_missing_index_on_commit_is_not_found() {
    let settings = AclSettings::from_json(
        r#"{"access_control_rules": [{"name": "logs", "indices": ["logs-*"]}]}"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &Definitions::new()).unwrap();

    let info = Arc::new(
        StaticRequestInfo::builder()
            .indices(["_all"])
            .all_indices(CLUSTER)
            .fail_index_write(ContextError::NotFound {
                resource: "logs-2".to_string(),
            })
            .build(),
    );
    let outcome = acl.check(&mut context(&info)).await;
    assert_eq!(
        outcome,
        AclOutcome::NotFound {
            resource: "logs-2".to_string()
        }
    );
    assert_eq!(outcome.http_status(), 404);
}

/// Checks that only the matching block's mutations reach the host.
#[tokio::test]
async fn test_mutations_of_failed_blocks_are_discarded() {
    let settings = AclSettings::from_json(
        r#"{"access_control_rules": [
            {"name": "logs for carol", "indices": ["logs-*"], "users": ["carol"]},
            {"name": "everything", "methods": ["GET"]}
        ]}"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &Definitions::new()).unwrap();

    let info = Arc::new(
        StaticRequestInfo::builder()
            .indices(["*"])
            .all_indices(CLUSTER)
            .build(),
    );
    let mut ctx = context(&info);
    let outcome = acl.check(&mut ctx).await;
    assert_eq!(outcome.matched_block(), "everything");
    assert_eq!(ctx.history()[0].results.len(), 2);
    assert_eq!(info.written_indices(), None);
}

/// Checks that a cached group verdict is not reused for another requested
/// group.
#[tokio::test]
async fn test_authorization_cache_respects_requested_group() {
    let groups = Arc::new(StaticGroups {
        groups: &["ops", "dev"],
        calls: AtomicUsize::new(0),
    });
    let definitions = Definitions::new().with_groups_provider(groups.clone());
    let settings = AclSettings::from_json(
        r#"{"access_control_rules": [{
            "name": "ops",
            "auth_key": "bob:pw",
            "groups_provider_authorization": {
                "user_groups_provider": "ldap1",
                "groups": ["ops"],
                "cache_ttl_in_sec": 60
            }
        }]}"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &definitions).unwrap();
    let request = |group: Option<&str>| {
        let mut builder =
            StaticRequestInfo::builder().header("Authorization", basic("bob", "pw"));
        if let Some(group) = group {
            builder = builder.header(CURRENT_GROUP_HEADER, group);
        }
        Arc::new(builder.build())
    };

    let plain = request(None);
    assert!(acl.check(&mut context(&plain)).await.is_allowed());
    assert_eq!(
        plain.written_headers().get(CURRENT_GROUP_HEADER).map(String::as_str),
        Some("ops")
    );

    let dev = request(Some("dev"));
    assert!(!acl.check(&mut context(&dev)).await.is_allowed());
    assert_eq!(groups.calls.load(Ordering::SeqCst), 2);

    // the refusal for "dev" is cached as well
    assert!(!acl.check(&mut context(&request(Some("dev")))).await.is_allowed());
    assert_eq!(groups.calls.load(Ordering::SeqCst), 2);

    let ops = request(Some("ops"));
    assert!(acl.check(&mut context(&ops)).await.is_allowed());
    assert_eq!(groups.calls.load(Ordering::SeqCst), 3);
}

/// Checks that a failing write-back turns an ALLOW into an error.
#[tokio::test]
async fn test_commit_failure_is_errored() {
    let settings = AclSettings::from_json(
        r#"{"access_control_rules": [{"name": "logs", "indices": ["logs-*"]}]}"#,
    )
    .unwrap();
    let acl = Acl::new(&settings, &Definitions::new()).unwrap();

    let info = Arc::new(
        StaticRequestInfo::builder()
            .indices(["_all"])
            .all_indices(CLUSTER)
            .fail_index_write(ContextError::WriteBack {
                field: "indices".to_string(),
                reason: "request is read-only".to_string(),
            })
            .build(),
    );
    let outcome = acl.check(&mut context(&info)).await;

    let AclOutcome::Errored { ref reason } = outcome else {
        panic!("expected an error, got {outcome:?}");
    };
    assert!(reason.contains("cannot commit block 'logs'"), "got: {reason}");
    assert!(reason.contains("request is read-only"), "got: {reason}");
    assert!(!outcome.is_allowed());
    assert_eq!(outcome.http_status(), 500);
    assert_eq!(outcome.final_state(), "ERRORED");
    assert_eq!(info.written_indices(), None);
}

#[tokio::test]
async fn test_handle_reload() -> anyhow::Result<()> {
    let definitions = Definitions::new();
    let handle = AclHandle::from_settings(
        &AclSettings::from_json(
            r#"{"access_control_rules": [{"name": "get", "methods": "GET"}]}"#,
        )?,
        &definitions,
    )?;

    let info = Arc::new(StaticRequestInfo::builder().method("POST").build());
    assert!(!handle.check(&mut RequestContext::new(info.clone())?).await.is_allowed());

    let broken = AclSettings::from_json(
        r#"{"access_control_rules": [{"name": "ext", "external_authentication": "missing"}]}"#,
    )?;
    assert!(handle.reload(&broken, &definitions).is_err());
    assert_eq!(handle.current().blocks()[0].name(), "get");

    let post = AclSettings::from_json(
        r#"{"access_control_rules": [{"name": "post", "methods": "POST"}]}"#,
    )?;
    handle.reload(&post, &definitions)?;
    assert!(handle.check(&mut RequestContext::new(info)?).await.is_allowed());
    Ok(())
}

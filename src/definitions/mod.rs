//! Named clients for external systems, shared by every rule that refers to
//! them.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use aclgate_error::{ConfigError, RuleError};
use async_trait::async_trait;

use crate::context::{BasicAuth, LoggedUser};

/// Checks credentials against a remote authority.
#[async_trait]
pub trait ExternalAuthenticationService: Send + Sync {
    fn name(&self) -> &str;

    async fn authenticate(
        &self,
        credentials: &BasicAuth,
    ) -> Result<bool, RuleError>;
}

/// Looks up the groups a user belongs to.
#[async_trait]
pub trait GroupsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn groups_of(
        &self,
        user: &LoggedUser,
    ) -> Result<BTreeSet<String>, RuleError>;
}

/// Registry of definitions, injected when the ACL is built.
#[derive(Clone, Default)]
pub struct Definitions {
    authentication_services: HashMap<String, Arc<dyn ExternalAuthenticationService>>,
    groups_providers: HashMap<String, Arc<dyn GroupsProvider>>,
}

////////////////////////////////////////////////////////////////////////////////
// Own methods
////////////////////////////////////////////////////////////////////////////////

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authentication_service(
        mut self,
        service: Arc<dyn ExternalAuthenticationService>,
    ) -> Self {
        self.authentication_services
            .insert(service.name().to_string(), service);
        self
    }

    pub fn with_groups_provider(
        mut self,
        provider: Arc<dyn GroupsProvider>,
    ) -> Self {
        self.groups_providers
            .insert(provider.name().to_string(), provider);
        self
    }

    pub fn authentication_service(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ExternalAuthenticationService>, ConfigError> {
        self.authentication_services
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDefinition {
                kind: "external_authentication_service".to_string(),
                name: name.to_string(),
            })
    }

    pub fn groups_provider(
        &self,
        name: &str,
    ) -> Result<Arc<dyn GroupsProvider>, ConfigError> {
        self.groups_providers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDefinition {
                kind: "user_groups_provider".to_string(),
                name: name.to_string(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.authentication_services.is_empty() && self.groups_providers.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Trait implementations for Definitions
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for Definitions {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut services: Vec<&String> = self.authentication_services.keys().collect();
        services.sort();
        let mut providers: Vec<&String> = self.groups_providers.keys().collect();
        providers.sort();
        f.debug_struct("Definitions")
            .field("authentication_services", &services)
            .field("groups_providers", &providers)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

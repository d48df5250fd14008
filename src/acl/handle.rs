use std::{path::Path, sync::Arc};

use aclgate_error::{AclResult, ResultExt};
use parking_lot::RwLock;
use tracing::{info, warn};

use super::{Acl, AclOutcome};
use crate::{config::AclSettings, context::RequestContext, definitions::Definitions};

/// Shared, hot-swappable ACL.
///
/// Requests already running keep the instance they started with; a reload
/// only affects requests checked after it.
#[derive(Debug, Clone)]
pub struct AclHandle {
    current: Arc<RwLock<Arc<Acl>>>,
}

impl AclHandle {
    pub fn new(acl: Acl) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(acl))),
        }
    }

    pub fn from_settings(
        settings: &AclSettings,
        definitions: &Definitions,
    ) -> AclResult<Self> {
        let acl = Acl::new(settings, definitions).context("cannot build initial acl")?;
        Ok(Self::new(acl))
    }

    pub fn current(&self) -> Arc<Acl> {
        self.current.read().clone()
    }

    /// Builds a new ACL and swaps it in. On failure the running ACL stays.
    pub fn reload(
        &self,
        settings: &AclSettings,
        definitions: &Definitions,
    ) -> AclResult<()> {
        match Acl::new(settings, definitions) {
            Ok(acl) => {
                *self.current.write() = Arc::new(acl);
                info!("acl reloaded");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "acl reload rejected, keeping the running one");
                Err(err).context("acl reload rejected")
            }
        }
    }

    /// Reads the settings file again and reloads from it.
    pub fn reload_from_file(
        &self,
        path: impl AsRef<Path>,
        definitions: &Definitions,
    ) -> AclResult<()> {
        let settings = AclSettings::load(path)?;
        self.reload(&settings, definitions)
    }

    pub async fn check(
        &self,
        ctx: &mut RequestContext,
    ) -> AclOutcome {
        let acl = self.current();
        acl.check(ctx).await
    }
}

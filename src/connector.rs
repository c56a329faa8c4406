//! Source connector seam.
//!
//! A connector knows how to ask one upstream system what changed since a
//! checkpoint and how to produce document text. Implementations live in
//! [`connector_workspace`](crate::connector_workspace) and
//! [`connector_codehost`](crate::connector_codehost); tests inject scripted
//! stubs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{SourceDocument, SourceKind, Tenant};

#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn source_kind(&self) -> SourceKind;

    /// List documents changed since the given instant. Depending on the
    /// upstream, `raw_text` may still be empty here; [`hydrate`] fills it.
    ///
    /// [`hydrate`]: SourceConnector::hydrate
    async fn list_changed(&self, since: DateTime<Utc>) -> Result<Vec<SourceDocument>>;

    /// Fetch the full text for one listed document when the listing did not
    /// include it. Called per document inside the sync fan-out, so a failure
    /// here is isolated to that document.
    async fn hydrate(&self, _doc: &mut SourceDocument) -> Result<()> {
        Ok(())
    }
}

/// Build the connector for a tenant's source kind.
///
/// Fails with [`Error::InvalidConfig`] when the tenant has no configuration
/// for that source.
pub fn connector_for(tenant: &Tenant, kind: SourceKind) -> Result<Arc<dyn SourceConnector>> {
    match kind {
        SourceKind::Workspace => {
            let source = tenant.workspace.as_ref().ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "tenant '{}' has no workspace source configured",
                    tenant.id
                ))
            })?;
            Ok(Arc::new(
                crate::connector_workspace::WorkspaceConnector::new(source.database_id.clone())?,
            ))
        }
        SourceKind::CodeHost => {
            let source = tenant.codehost.as_ref().ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "tenant '{}' has no codehost source configured",
                    tenant.id
                ))
            })?;
            Ok(Arc::new(crate::connector_codehost::CodeHostConnector::new(
                source.owner.clone(),
                source.repo.clone(),
            )?))
        }
    }
}

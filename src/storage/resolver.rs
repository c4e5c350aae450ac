use std::future::Future;
use std::sync::Arc;

use super::{Backend, BackendKind, RemoteBackend, StoreError};

/// Picks the storage tier for each operation: the remote service when it is
/// configured and reachable, otherwise the platform's local tier.
pub struct BackendResolver {
    remote: Option<Arc<RemoteBackend>>,
    local: Option<Arc<dyn Backend>>,
}

impl BackendResolver {
    pub fn new(remote: Option<Arc<RemoteBackend>>, local: Option<Arc<dyn Backend>>) -> Self {
        Self { remote, local }
    }

    pub fn local_only(local: Arc<dyn Backend>) -> Self {
        Self::new(None, Some(local))
    }

    pub fn remote(&self) -> Option<&Arc<RemoteBackend>> {
        self.remote.as_ref()
    }

    /// Tiers to try right now, highest priority first
    pub async fn tiers(&self) -> Vec<Arc<dyn Backend>> {
        let mut tiers: Vec<Arc<dyn Backend>> = Vec::with_capacity(2);
        if let Some(remote) = &self.remote {
            if remote.is_available().await {
                tiers.push(remote.clone());
            }
        }
        if let Some(local) = &self.local {
            tiers.push(local.clone());
        }
        tiers
    }

    /// Run `op` against the first tier that answers. A tier that reports
    /// itself unavailable is skipped and the next one is tried; any other
    /// error is final.
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, StoreError>
    where
        F: Fn(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut last_error = None;

        for tier in self.tiers().await {
            let kind = tier.kind();
            match op(tier).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_unavailable() => {
                    tracing::warn!("{} failed on {} tier: {}", operation, kind, e);
                    if kind == BackendKind::Remote {
                        if let Some(remote) = &self.remote {
                            remote.mark_unreachable().await;
                        }
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_error {
            Some(e) => {
                tracing::error!("{}: no storage tier could serve the request", operation);
                Err(e)
            }
            None => Err(StoreError::NoBackend),
        }
    }
}

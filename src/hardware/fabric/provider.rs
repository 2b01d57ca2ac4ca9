//! Fabric Interface Provider
//!
//! Queries the fabric library, normalizes each result into a
//! [`FabricInterface`] and aggregates them by domain name.

use super::fi_info::FiInfoSource;
use super::names::lib_fabric_provider_list_to_ext;
use crate::config::FabricConfig;
use crate::domain::ports::{
    FabricDiscoverer, FabricInterface, FabricInterfaceSet, Info, InfoSourceRef,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Convert one query result into a fabric interface.
///
/// The result carries exactly one provider; merging interfaces that share a
/// domain happens in [`FabricInterfaceSet::add`].
pub fn info_to_fabric_interface(info: Option<&dyn Info>) -> Result<FabricInterface> {
    let info = info.ok_or_else(|| Error::InvalidInput("nil fabric info".into()))?;

    let name = info.domain_name();
    if name.is_empty() {
        return Err(Error::MissingField {
            field: "domain name",
        });
    }

    let raw_provider = info.fabric_provider();
    if raw_provider.is_empty() {
        return Err(Error::MissingField { field: "provider" });
    }
    let provider = lib_fabric_provider_list_to_ext(raw_provider)?;

    FabricInterface::new(name, info.os_name(), [provider])
}

/// Discovers fabric interfaces through an [`InfoSource`](crate::domain::ports::InfoSource)
pub struct FabricProvider {
    source: InfoSourceRef,
    query_timeout: Option<Duration>,
}

impl FabricProvider {
    /// Create a provider over an arbitrary info source
    pub fn new(source: InfoSourceRef) -> Self {
        Self {
            source,
            query_timeout: None,
        }
    }

    /// Create a provider backed by `fi_info` as configured
    pub fn from_config(config: &FabricConfig) -> Self {
        let mut source = FiInfoSource::new(&config.fi_info_path);
        if !config.verbose_query {
            source = source.terse();
        }
        Self::new(Arc::new(source)).with_timeout(config.query_timeout())
    }

    /// Abandon the query after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Run the blocking query on a worker, honoring cancellation and timeout.
    ///
    /// The native call cannot be interrupted; on cancellation its result is
    /// dropped when it eventually returns.
    async fn query(&self, cancel: &CancellationToken) -> Result<Vec<Box<dyn Info + Send>>> {
        let source = Arc::clone(&self.source);
        let handle = tokio::task::spawn_blocking(move || source.query());

        let joined = async {
            handle
                .await
                .map_err(|e| Error::Internal(format!("fabric query task failed: {}", e)))?
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = with_deadline(self.query_timeout, joined) => result,
        }
    }
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| Error::Timeout(d))?,
        None => fut.await,
    }
}

#[async_trait]
impl FabricDiscoverer for FabricProvider {
    async fn get_fabric_interfaces(&self, cancel: &CancellationToken) -> Result<FabricInterfaceSet> {
        let infos = self.query(cancel).await?;
        debug!("Normalizing {} fabric query results", infos.len());

        let mut set = FabricInterfaceSet::new();
        for info in &infos {
            match info_to_fabric_interface(Some(&**info as &dyn Info)) {
                Ok(iface) => set.add(iface),
                Err(e @ Error::InvalidInput(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "Skipping fabric entry (domain {:?}, provider {:?}): {}",
                        info.domain_name(),
                        info.fabric_provider(),
                        e
                    );
                }
            }
        }

        info!("Found {} fabric interfaces", set.len());
        Ok(set)
    }
}

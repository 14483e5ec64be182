//! Resource collectors and the refresh pipeline
//!
//! A collector fetches one engine collection and renders it into exposition
//! fragments. The [`Aggregator`] fans out over every collector with a single
//! token, and the [`RefreshLoop`] publishes the result into the snapshot
//! cache on a fixed cadence.

mod aggregate;
mod r#loop;


pub use aggregate::{Aggregation, Aggregator};
pub use r#loop::{RefreshConfig, RefreshLoop, RefreshLoopBuilder};

use crate::client::EngineClient;
use crate::error::{ExporterError, Result};
use crate::format;
use crate::models::Token;
use serde_json::Value;
use std::sync::Arc;

pub use async_trait::async_trait;

/// One source of exposition fragments
#[async_trait]
pub trait ResourceCollector: Send + Sync {
    /// Stable name used in logs, health components and self-metrics
    fn name(&self) -> &str;

    /// Fetch and render the resource; each fragment is one metric family
    async fn collect(&self, token: &Token) -> Result<Vec<String>>;
}

/// Engine resource collections exported by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Vms,
    Hosts,
    Clusters,
    DataCenters,
    StorageDomains,
}

impl ResourceKind {
    /// Collection order, which is also the order of the snapshot body
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Vms,
        ResourceKind::Hosts,
        ResourceKind::Clusters,
        ResourceKind::DataCenters,
        ResourceKind::StorageDomains,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Vms => "vms",
            ResourceKind::Hosts => "hosts",
            ResourceKind::Clusters => "clusters",
            ResourceKind::DataCenters => "datacenters",
            ResourceKind::StorageDomains => "storagedomains",
        }
    }

    /// API path including the `follow` links the formatter reads
    pub fn path(self) -> &'static str {
        match self {
            ResourceKind::Vms => {
                "/ovirt-engine/api/vms?follow=statistics,disk_attachments.disk.statistics,\
                 nics.statistics,snapshots.disks.statistics,tags"
            }
            ResourceKind::Hosts => "/ovirt-engine/api/hosts?follow=statistics,nics.statistics,tags",
            ResourceKind::Clusters => "/ovirt-engine/api/clusters?follow=enabledfeatures",
            ResourceKind::DataCenters => {
                "/ovirt-engine/api/datacenters?follow=mac_pool,qoss,quotas,\
                 quotas.quotastoragelimits,quotas.quotaclusterlimits"
            }
            ResourceKind::StorageDomains => "/ovirt-engine/api/storagedomains",
        }
    }

    /// Key holding the object array in the collection response
    pub fn root_key(self) -> &'static str {
        match self {
            ResourceKind::Vms => "vm",
            ResourceKind::Hosts => "host",
            ResourceKind::Clusters => "cluster",
            ResourceKind::DataCenters => "data_center",
            ResourceKind::StorageDomains => "storage_domain",
        }
    }

    pub fn format(self, items: &[Value]) -> Vec<String> {
        match self {
            ResourceKind::Vms => format::vm::format(items),
            ResourceKind::Hosts => format::host::format(items),
            ResourceKind::Clusters => format::cluster::format(items),
            ResourceKind::DataCenters => format::datacenter::format(items),
            ResourceKind::StorageDomains => format::storage_domain::format(items),
        }
    }
}

/// Objects under `root_key`.
///
/// The engine omits the key entirely for an empty collection, so a missing
/// key is an empty list; any other shape is an upstream error.
pub fn collection_items<'a>(payload: &'a Value, kind: ResourceKind) -> Result<&'a [Value]> {
    let Value::Object(map) = payload else {
        return Err(ExporterError::upstream(
            kind.name(),
            "collection response is not a JSON object",
        ));
    };

    match map.get(kind.root_key()) {
        None => Ok(&[][..]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(ExporterError::upstream(
            kind.name(),
            format!("`{}` is not an array", kind.root_key()),
        )),
    }
}

/// Collector backed by one engine collection endpoint
pub struct EngineCollector {
    kind: ResourceKind,
    client: Arc<EngineClient>,
}

impl EngineCollector {
    pub fn new(kind: ResourceKind, client: Arc<EngineClient>) -> Self {
        Self { kind, client }
    }
}

#[async_trait]
impl ResourceCollector for EngineCollector {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn collect(&self, token: &Token) -> Result<Vec<String>> {
        let payload = self
            .client
            .fetch_collection(token, self.kind.path())
            .await
            .map_err(|e| e.into_upstream(self.kind.name()))?;

        let items = collection_items(&payload, self.kind)?;
        tracing::debug!(collector = self.kind.name(), objects = items.len(), "Fetched collection");

        Ok(self.kind.format(items))
    }
}

/// Ordered, fixed set of collectors
#[derive(Clone, Default)]
pub struct CollectorSet {
    collectors: Vec<Arc<dyn ResourceCollector>>,
}

impl CollectorSet {
    pub fn new(collectors: Vec<Arc<dyn ResourceCollector>>) -> Self {
        Self { collectors }
    }

    /// The five engine collectors, in [`ResourceKind::ALL`] order
    pub fn engine(client: Arc<EngineClient>) -> Self {
        let collectors = ResourceKind::ALL
            .into_iter()
            .map(|kind| {
                let collector = EngineCollector::new(kind, Arc::clone(&client));
                Arc::new(collector) as Arc<dyn ResourceCollector>
            })
            .collect();
        Self { collectors }
    }

    pub fn names(&self) -> Vec<String> {
        self.collectors.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ResourceCollector>> {
        self.collectors.iter()
    }
}

//! Tool Registry: name-keyed provider connections behind a read/write lock.
//!
//! Reads (listing, calling) share the lock. `connect` reserves the name
//! under the write lock, runs the handshake without holding it, and only
//! publishes the connection once the handshake succeeded, so a failed
//! connect leaves nothing behind.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde_json::Value;

use crate::config::{ProviderConfig, ProvidersConfig};
use crate::types::{RegistryError, ToolCallOutcome, ToolDescriptor};

use super::connection::{ClientOptions, ConnectionStatus, ToolConnection};

/// One line of `providers/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub status: ConnectionStatus,
    pub tool_count: usize,
}

#[derive(Default)]
struct State {
    connections: HashMap<String, Arc<ToolConnection>>,
    connecting: HashSet<String>,
}

pub struct ToolRegistry {
    state: RwLock<State>,
    options: ClientOptions,
}

/// Holds a name while its handshake runs. Dropping it without publishing
/// (error or cancelled future) frees the name again.
struct Reservation<'a> {
    registry: &'a ToolRegistry,
    name: String,
    armed: bool,
}

impl Reservation<'_> {
    fn publish(mut self, conn: Arc<ToolConnection>) {
        let mut state = self.registry.write();
        state.connecting.remove(&self.name);
        state.connections.insert(self.name.clone(), conn);
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.write().connecting.remove(&self.name);
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl ToolRegistry {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            state: RwLock::new(State::default()),
            options,
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// A closed entry stays listed until it is replaced or disconnected.
    fn reserve(&self, name: &str) -> Result<Reservation<'_>, RegistryError> {
        let mut state = self.write();
        let live = state
            .connections
            .get(name)
            .is_some_and(|c| c.status() != ConnectionStatus::Closed);
        if live || !state.connecting.insert(name.to_string()) {
            return Err(RegistryError::AlreadyConnected(name.to_string()));
        }
        Ok(Reservation {
            registry: self,
            name: name.to_string(),
            armed: true,
        })
    }

    /// Launch a provider, handshake, and publish it under `name`.
    pub async fn connect(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<ToolConnection>, RegistryError> {
        let reservation = self.reserve(name)?;
        tracing::info!(provider = %name, command = %config.command, "connecting provider");

        let conn = ToolConnection::connect(name, config, &self.options)
            .await
            .map_err(|source| RegistryError::Connect {
                provider: name.to_string(),
                source,
            })?;

        let conn = Arc::new(conn);
        reservation.publish(Arc::clone(&conn));
        Ok(conn)
    }

    /// Publish a connection that was set up elsewhere.
    pub fn attach(&self, conn: ToolConnection) -> Result<Arc<ToolConnection>, RegistryError> {
        let name = conn.name().to_string();
        let reservation = self.reserve(&name)?;
        let conn = Arc::new(conn);
        reservation.publish(Arc::clone(&conn));
        Ok(conn)
    }

    /// Connect every configured provider concurrently. Failures are logged
    /// and returned; the others stay connected.
    pub async fn connect_all(&self, config: &ProvidersConfig) -> Vec<(String, RegistryError)> {
        let attempts = config.providers.iter().map(|(name, provider)| async move {
            (name.clone(), self.connect(name, provider).await)
        });

        let mut failures = Vec::new();
        for (name, result) in futures::future::join_all(attempts).await {
            if let Err(e) = result {
                tracing::warn!(provider = %name, "skipping provider: {e}");
                failures.push((name, e));
            }
        }
        failures
    }

    /// Remove and close a provider. Returns whether it was present.
    pub async fn disconnect(&self, name: &str) -> bool {
        let removed = self.write().connections.remove(name);
        match removed {
            Some(conn) => {
                conn.close().await;
                true
            }
            None => false,
        }
    }

    /// Close and remove every provider.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.write().connections.drain().map(|(_, c)| c).collect();
        if drained.is_empty() {
            return;
        }
        let count = drained.len();
        futures::future::join_all(drained.iter().map(|c| c.close())).await;
        tracing::info!(providers = count, "registry shut down");
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolConnection>> {
        self.read().connections.get(name).cloned()
    }

    fn require(&self, name: &str) -> Result<Arc<ToolConnection>, RegistryError> {
        self.get(name)
            .ok_or_else(|| RegistryError::ProviderNotFound(name.to_string()))
    }

    /// Call a tool on a provider. Provider-side failures come back inside
    /// the outcome; transport failures as [`RegistryError::CallFailed`].
    pub async fn call_tool(
        &self,
        provider: &str,
        tool: &str,
        arguments: Option<Value>,
    ) -> Result<ToolCallOutcome, RegistryError> {
        let conn = self.require(provider)?;
        if !conn.has_tool(tool) {
            return Err(RegistryError::ToolNotFound {
                provider: provider.to_string(),
                tool: tool.to_string(),
            });
        }

        conn.call_tool(tool, arguments)
            .await
            .map_err(|source| RegistryError::CallFailed {
                provider: provider.to_string(),
                tool: tool.to_string(),
                source,
            })
    }

    pub async fn refresh_tools(&self, provider: &str) -> Result<usize, RegistryError> {
        let conn = self.require(provider)?;
        conn.refresh_tools()
            .await
            .map_err(|source| RegistryError::Refresh {
                provider: provider.to_string(),
                source,
            })
    }

    /// Provider names, sorted.
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().connections.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn summaries(&self) -> Vec<ProviderSummary> {
        let mut summaries: Vec<ProviderSummary> = self
            .read()
            .connections
            .values()
            .map(|c| ProviderSummary {
                name: c.name().to_string(),
                status: c.status(),
                tool_count: c.tools().len(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn list_tools(&self, provider: &str) -> Result<Vec<ToolDescriptor>, RegistryError> {
        Ok(self.require(provider)?.tools().to_vec())
    }

    /// Every provider's catalog, keyed by provider name.
    pub fn all_tools(&self) -> BTreeMap<String, Vec<ToolDescriptor>> {
        self.read()
            .connections
            .iter()
            .map(|(name, c)| (name.clone(), c.tools().to_vec()))
            .collect()
    }

    pub fn status(&self, provider: &str) -> Option<ConnectionStatus> {
        self.get(provider).map(|c| c.status())
    }

    /// Healthy when nothing is configured or at least one provider is ready.
    pub fn is_healthy(&self) -> bool {
        let state = self.read();
        state.connections.is_empty()
            || state
                .connections
                .values()
                .any(|c| c.status() == ConnectionStatus::Ready)
    }

    pub fn len(&self) -> usize {
        self.read().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().connections.is_empty()
    }
}

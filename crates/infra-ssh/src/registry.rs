// ConnectionRegistry - one RemoteConnection per fingerprint, owned explicitly

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use duct_core::domain::RemoteSettings;
use duct_core::port::SubstrateLog;

use crate::connection::RemoteConnection;
use crate::credentials::{Credentials, Target};
use crate::error::RegistryError;
use crate::fingerprint::Fingerprint;
use crate::known_hosts::KnownHosts;
use crate::transport::SshTransport;

/// Process-wide cache of remote connections, passed to whoever builds sources.
///
/// Entries are never evicted; [`ConnectionRegistry::shutdown`] closes them all.
pub struct ConnectionRegistry {
    transport: Arc<dyn SshTransport>,
    log: Arc<dyn SubstrateLog>,
    connections: Mutex<HashMap<Fingerprint, Arc<RemoteConnection>>>,
    trust_stores: Mutex<HashMap<PathBuf, Arc<KnownHosts>>>,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn SshTransport>, log: Arc<dyn SubstrateLog>) -> Self {
        Self {
            transport,
            log,
            connections: Mutex::new(HashMap::new()),
            trust_stores: Mutex::new(HashMap::new()),
        }
    }

    /// Return the connection for these settings, creating it on first use.
    ///
    /// # Errors
    /// - RegistryError::InvalidSettings if no credential is configured
    /// - RegistryError::TrustStore if the known hosts file exists but cannot be read
    pub fn acquire(&self, settings: &RemoteSettings) -> Result<Arc<RemoteConnection>, RegistryError> {
        settings.validate()?;
        let fingerprint = Fingerprint::of(settings);

        let mut connections = self.connections.lock();
        if let Some(existing) = connections.get(&fingerprint) {
            debug!(host = %settings.host, fingerprint = %fingerprint, "Reusing remote connection");
            return Ok(Arc::clone(existing));
        }

        let trust = self.trust_store(&settings.known_hosts_file)?;
        let connection = RemoteConnection::new(
            Target::from_settings(settings),
            Credentials::from_settings(settings),
            fingerprint.clone(),
            trust,
            Arc::clone(&self.transport),
            Arc::clone(&self.log),
        );
        connections.insert(fingerprint.clone(), Arc::clone(&connection));

        info!(
            host = %settings.host,
            port = settings.port,
            user = %settings.username,
            fingerprint = %fingerprint,
            "Registered remote connection"
        );
        Ok(connection)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<RemoteConnection>> {
        self.connections.lock().get(fingerprint).cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    fn trust_store(&self, path: &str) -> Result<Arc<KnownHosts>, RegistryError> {
        let key = PathBuf::from(path);
        let mut stores = self.trust_stores.lock();
        if let Some(store) = stores.get(&key) {
            return Ok(Arc::clone(store));
        }

        let store = Arc::new(KnownHosts::open(&key).map_err(|source| RegistryError::TrustStore {
            path: path.to_string(),
            source,
        })?);
        stores.insert(key, Arc::clone(&store));
        Ok(store)
    }

    /// Cancel reconnect loops and close every transport
    pub async fn shutdown(&self) {
        let connections: Vec<Arc<RemoteConnection>> = self.connections.lock().values().cloned().collect();
        for connection in connections {
            connection.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use crate::transport::TransportSession;
    use async_trait::async_trait;
    use duct_core::port::NoopLog;
    use tempfile::TempDir;

    struct UnreachableTransport;

    #[async_trait]
    impl SshTransport for UnreachableTransport {
        async fn open(
            &self,
            target: &Target,
            _trust: Arc<KnownHosts>,
        ) -> Result<Arc<dyn TransportSession>, ConnectError> {
            Err(ConnectError::Transport(format!("{} unreachable", target.host)))
        }
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Arc::new(UnreachableTransport), Arc::new(NoopLog))
    }

    fn settings(dir: &TempDir, host: &str) -> RemoteSettings {
        RemoteSettings {
            host: host.to_string(),
            port: 22,
            username: "mon".to_string(),
            password: Some("pw".to_string()),
            key: None,
            keyfile: None,
            keypass: None,
            known_hosts_file: dir.path().join("known_hosts").to_string_lossy().into_owned(),
        }
    }

    #[test]
    fn test_same_fingerprint_shares_connection() {
        let dir = TempDir::new().unwrap();
        let registry = registry();

        let a = registry.acquire(&settings(&dir, "db01")).unwrap();
        let b = registry.acquire(&settings(&dir, "db01")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_fingerprints_do_not_share() {
        let dir = TempDir::new().unwrap();
        let registry = registry();

        let a = registry.acquire(&settings(&dir, "db01")).unwrap();
        let b = registry.acquire(&settings(&dir, "db02")).unwrap();
        let c = registry
            .acquire(&RemoteSettings {
                password: Some("other".to_string()),
                ..settings(&dir, "db01")
            })
            .unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = registry();

        let result = registry.acquire(&RemoteSettings {
            password: None,
            ..settings(&dir, "db01")
        });
        assert!(matches!(result, Err(RegistryError::InvalidSettings(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_returns_one_instance() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(registry());
        let settings = settings(&dir, "db01");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let settings = settings.clone();
                tokio::spawn(async move { registry.acquire(&settings).unwrap() })
            })
            .collect();

        let mut connections = Vec::new();
        for handle in handles {
            connections.push(handle.await.unwrap());
        }
        assert!(connections.iter().all(|c| Arc::ptr_eq(c, &connections[0])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_disconnected() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let connection = registry.acquire(&settings(&dir, "db01")).unwrap();

        let result = connection.connect().await;
        assert!(matches!(result, Err(ConnectError::Transport(_))));
        assert_eq!(connection.state(), crate::ConnectionState::Disconnected);
    }
}

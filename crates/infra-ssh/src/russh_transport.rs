// russh implementation of the SSH transport port

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::{KeyPair, PublicKey};
use russh_keys::PublicKeyBase64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use duct_core::port::{CommandOutput, ExecutionError, LogLevel, SubstrateLog};

use crate::credentials::{AuthMethod, Credentials, Target};
use crate::error::ConnectError;
use crate::known_hosts::{KnownHosts, Verdict};
use crate::transport::{SshTransport, TransportSession};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Client handler applying the trust-on-first-use policy during key exchange
struct TofuHandler {
    trust: Arc<KnownHosts>,
    hostname: String,
    address: String,
    rejected: Arc<AtomicBool>,
    log: Arc<dyn SubstrateLog>,
}

#[async_trait]
impl client::Handler for TofuHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let algorithm = server_public_key.name();
        let key = server_public_key.public_key_base64();

        match self.trust.verify(&self.hostname, Some(&self.address), algorithm, &key) {
            Ok(Verdict::Known) => Ok(true),
            Ok(Verdict::Learned) => {
                self.log.record(
                    LogLevel::Info,
                    &self.hostname,
                    &format!("Added {} host key for {} ({})", algorithm, self.hostname, self.address),
                );
                Ok(true)
            }
            Ok(Verdict::Mismatch) => {
                self.rejected.store(true, Ordering::SeqCst);
                self.log.record(
                    LogLevel::Warn,
                    &self.hostname,
                    &format!("{} host key for {} has changed", algorithm, self.hostname),
                );
                Ok(false)
            }
            Err(e) => {
                self.log.record(
                    LogLevel::Warn,
                    &self.hostname,
                    &format!("Trusting host key but could not save it: {}", e),
                );
                Ok(true)
            }
        }
    }
}

/// Opens russh client sessions
pub struct RusshTransport {
    log: Arc<dyn SubstrateLog>,
}

impl RusshTransport {
    pub fn new(log: Arc<dyn SubstrateLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl SshTransport for RusshTransport {
    async fn open(
        &self,
        target: &Target,
        trust: Arc<KnownHosts>,
    ) -> Result<Arc<dyn TransportSession>, ConnectError> {
        let address = tokio::net::lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|e| ConnectError::Transport(format!("resolving {}: {}", target.host, e)))?
            .next()
            .ok_or_else(|| ConnectError::Transport(format!("{} has no address", target.host)))?;

        let rejected = Arc::new(AtomicBool::new(false));
        let handler = TofuHandler {
            trust,
            hostname: target.host.clone(),
            address: address.ip().to_string(),
            rejected: Arc::clone(&rejected),
            log: Arc::clone(&self.log),
        };

        let config = Arc::new(client::Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Default::default()
        });

        let handle = client::connect(config, address, handler).await.map_err(|e| {
            if rejected.load(Ordering::SeqCst) {
                ConnectError::HostKeyMismatch {
                    host: target.host.clone(),
                }
            } else {
                ConnectError::Transport(e.to_string())
            }
        })?;

        Ok(Arc::new(RusshSession {
            handle: Mutex::new(handle),
        }))
    }
}

struct RusshSession {
    handle: Mutex<Handle<TofuHandler>>,
}

fn load_key(method: &AuthMethod<'_>) -> Result<Option<KeyPair>, ConnectError> {
    match *method {
        AuthMethod::Key { material, passphrase } => russh_keys::decode_secret_key(material, passphrase)
            .map(Some)
            .map_err(|e| ConnectError::KeyMaterial(e.to_string())),
        AuthMethod::KeyFile { path, passphrase } => russh_keys::load_secret_key(path, passphrase)
            .map(Some)
            .map_err(|e| ConnectError::KeyMaterial(format!("{}: {}", path, e))),
        AuthMethod::Password(_) => Ok(None),
    }
}

#[async_trait]
impl TransportSession for RusshSession {
    async fn authenticate(&self, username: &str, credentials: &Credentials) -> Result<(), ConnectError> {
        let mut handle = self.handle.lock().await;
        let mut key_error = None;

        for method in credentials.methods() {
            let accepted = match method {
                AuthMethod::Password(password) => handle.authenticate_password(username, password).await,
                _ => match load_key(&method) {
                    Ok(Some(pair)) => handle.authenticate_publickey(username, Arc::new(pair)).await,
                    Ok(None) => continue,
                    Err(e) => {
                        key_error = Some(e);
                        continue;
                    }
                },
            }
            .map_err(|e| ConnectError::Transport(e.to_string()))?;

            if accepted {
                return Ok(());
            }
        }

        Err(key_error.unwrap_or_else(|| ConnectError::AuthRejected {
            username: username.to_string(),
        }))
    }

    async fn exec(&self, command_line: &str) -> Result<CommandOutput, ExecutionError> {
        let mut channel = {
            let handle = self.handle.lock().await;
            handle
                .channel_open_session()
                .await
                .map_err(|e| ExecutionError::Channel(e.to_string()))?
        };
        channel
            .exec(true, command_line)
            .await
            .map_err(|e| ExecutionError::Channel(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status as i32),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    return Err(ExecutionError::Killed(format!("remote signal {:?}", signal_name)));
                }
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            // A channel closed cleanly without a status counts as success
            exit_code: exit_code.unwrap_or(0),
        })
    }

    async fn closed(&self) {
        loop {
            if self.handle.lock().await.is_closed() {
                return;
            }
            tokio::time::sleep(CLOSE_POLL_INTERVAL).await;
        }
    }

    async fn close(&self) {
        let handle = self.handle.lock().await;
        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await;
    }
}

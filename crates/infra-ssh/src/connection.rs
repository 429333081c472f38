// RemoteConnection - one persistent, shared, auto-reconnecting SSH connection

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

use duct_core::application::constants::RECONNECT_DELAY;
use duct_core::application::{shutdown_channel, ExecutionChannel, ShutdownSender};
use duct_core::port::{
    CommandExecutor, CommandOutput, ExecutionError, LogLevel, RemoteLink, SubstrateLog,
};

use crate::credentials::{Credentials, Target};
use crate::error::ConnectError;
use crate::fingerprint::Fingerprint;
use crate::known_hosts::KnownHosts;
use crate::state::ConnectionState;
use crate::transport::{SshTransport, TransportSession};

/// A logical connection to one target, shared by every source with the same
/// fingerprint.
///
/// Commands never wait for the connection: while it is not CONNECTED they
/// return [`CommandOutput::not_connected`] at once. A transport that drops
/// after reaching CONNECTED is re-established every [`RECONNECT_DELAY`] until
/// it succeeds. Failures of an explicit [`RemoteConnection::connect`] are
/// returned to the caller and not retried.
pub struct RemoteConnection {
    target: Target,
    credentials: Credentials,
    fingerprint: Fingerprint,
    trust: Arc<KnownHosts>,
    transport: Arc<dyn SshTransport>,
    log: Arc<dyn SubstrateLog>,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Option<Arc<dyn TransportSession>>>,
    /// Bumped for every established session so stale loss reports are ignored
    generation: AtomicU64,
    reconnecting: AtomicBool,
    shutdown: ShutdownSender,
    this: Weak<RemoteConnection>,
}

impl RemoteConnection {
    pub fn new(
        target: Target,
        credentials: Credentials,
        fingerprint: Fingerprint,
        trust: Arc<KnownHosts>,
        transport: Arc<dyn SshTransport>,
        log: Arc<dyn SubstrateLog>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = shutdown_channel();

        Arc::new_cyclic(|this| Self {
            target,
            credentials,
            fingerprint,
            trust,
            transport,
            log,
            state,
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
            reconnecting: AtomicBool::new(false),
            shutdown,
            this: this.clone(),
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe every state transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Execution channel for sources sampling through this connection
    pub fn channel(self: &Arc<Self>) -> ExecutionChannel {
        ExecutionChannel::Remote {
            executor: self.clone(),
            link: self.clone(),
        }
    }

    fn record(&self, level: LogLevel, message: &str) {
        self.log.record(level, &self.target.host, message);
    }

    /// Apply `to` if the state machine allows it from the current state
    fn transition(&self, to: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if state.can_transition(to) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Claim the right to connect: DISCONNECTED or FAILED become CONNECTING
    fn claim(&self) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, ConnectionState::Disconnected | ConnectionState::Failed) {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        })
    }

    fn abandon(&self, error: &ConnectError) {
        let next = if error.is_rejection() {
            ConnectionState::Failed
        } else {
            ConnectionState::Disconnected
        };
        self.transition(next);
    }

    /// Open, verify and authenticate the transport.
    ///
    /// Returns `Ok(())` without doing anything while another attempt is in
    /// progress or the connection is already up.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        if self.shutdown.is_shutdown() {
            return Err(ConnectError::Shutdown);
        }
        if !self.claim() {
            return Ok(());
        }

        self.record(LogLevel::Info, &format!("Opening SSH connection to {}", self.target));

        let session = match self.transport.open(&self.target, Arc::clone(&self.trust)).await {
            Ok(session) => session,
            Err(e) => {
                self.abandon(&e);
                self.record(LogLevel::Warn, &format!("Connection to {} failed: {}", self.target, e));
                return Err(e);
            }
        };

        self.transition(ConnectionState::Authenticating);
        if let Err(e) = session
            .authenticate(&self.target.username, &self.credentials)
            .await
        {
            session.close().await;
            self.abandon(&e);
            self.record(LogLevel::Warn, &format!("Connection to {} failed: {}", self.target, e));
            return Err(e);
        }

        if self.shutdown.is_shutdown() {
            session.close().await;
            self.transition(ConnectionState::Disconnected);
            return Err(ConnectError::Shutdown);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.session.lock() = Some(Arc::clone(&session));
        self.transition(ConnectionState::Connected);
        self.watch_session(generation, session);

        self.record(LogLevel::Info, &format!("Established SSH connection to {}", self.target));
        Ok(())
    }

    fn watch_session(&self, generation: u64, session: Arc<dyn TransportSession>) {
        let this = self.this.clone();
        let mut token = self.shutdown.token();

        tokio::spawn(async move {
            tokio::select! {
                _ = session.closed() => {}
                _ = token.wait() => return,
            }
            if let Some(connection) = this.upgrade() {
                connection.transport_lost(generation);
            }
        });
    }

    fn transport_lost(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }

        let dropped = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
        if !dropped {
            return;
        }

        self.session.lock().take();
        self.record(
            LogLevel::Warn,
            &format!("Connection to {} lost: retrying", self.target.host),
        );
        self.spawn_reconnect();
    }

    fn spawn_reconnect(&self) {
        if self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = self.this.clone();
        let mut token = self.shutdown.token();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.wait() => return,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }

                let Some(connection) = this.upgrade() else {
                    return;
                };

                if !connection.state().is_busy() {
                    if let Err(e) = connection.connect().await {
                        connection.record(
                            LogLevel::Debug,
                            &format!("Reconnect to {} failed: {}", connection.target, e),
                        );
                    }
                }

                if connection.is_connected() {
                    connection.reconnecting.store(false, Ordering::SeqCst);
                    // Lost again before the flag was cleared and nobody took over
                    if connection.is_connected() || connection.reconnecting.swap(true, Ordering::SeqCst) {
                        return;
                    }
                }
            }
        });
    }

    /// Stop reconnecting and close the transport. The connection stays
    /// DISCONNECTED afterwards.
    pub async fn shutdown(&self) {
        self.shutdown.shutdown();
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close().await;
        }
        self.transition(ConnectionState::Disconnected);
        self.record(LogLevel::Debug, &format!("Connection to {} shut down", self.target));
    }

    fn session(&self) -> Option<Arc<dyn TransportSession>> {
        if self.state() != ConnectionState::Connected {
            return None;
        }
        self.session.lock().clone()
    }
}

/// `KEY=VALUE ... command arg1 arg2`
pub(crate) fn command_line(command: &str, args: &[String], env: &BTreeMap<String, String>) -> String {
    let mut parts: Vec<String> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    parts.push(command.to_string());
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

#[async_trait]
impl CommandExecutor for RemoteConnection {
    async fn run(
        &self,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecutionError> {
        let Some(session) = self.session() else {
            return Ok(CommandOutput::not_connected());
        };

        let line = command_line(command, args, env);
        self.record(LogLevel::Debug, &format!("exec: {}", line));

        match tokio::time::timeout(timeout, session.exec(&line)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(timeout.as_millis() as u64)),
        }
    }

    fn describe(&self) -> String {
        format!("ssh://{}", self.target)
    }
}

#[async_trait]
impl RemoteLink for RemoteConnection {
    async fn connect(&self) -> Result<(), ExecutionError> {
        RemoteConnection::connect(self).await.map_err(ExecutionError::from)
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn describe(&self) -> String {
        format!("ssh://{}", self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duct_core::port::substrate_log::mocks::MemoryLog;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Session whose closure is triggered by the test
    struct FakeSession {
        lost: Notify,
        gone: AtomicBool,
        execs: Mutex<Vec<String>>,
    }

    impl FakeSession {
        fn new() -> Self {
            Self {
                lost: Notify::new(),
                gone: AtomicBool::new(false),
                execs: Mutex::new(Vec::new()),
            }
        }

        fn drop_transport(&self) {
            self.gone.store(true, Ordering::SeqCst);
            self.lost.notify_waiters();
        }
    }

    #[async_trait]
    impl TransportSession for FakeSession {
        async fn authenticate(&self, _username: &str, _credentials: &Credentials) -> Result<(), ConnectError> {
            Ok(())
        }

        async fn exec(&self, command_line: &str) -> Result<CommandOutput, ExecutionError> {
            self.execs.lock().push(command_line.to_string());
            if command_line.starts_with("sleep") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(CommandOutput {
                stdout: "ok\n".to_string(),
                stderr: String::new(),
                exit_code: 0,
            })
        }

        async fn closed(&self) {
            let notified = self.lost.notified();
            if self.gone.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }

        async fn close(&self) {
            self.drop_transport();
        }
    }

    struct FakeTransport {
        opens: AtomicUsize,
        /// Upcoming opens to refuse with a transport error
        refusals: AtomicUsize,
        sessions: Mutex<Vec<Arc<FakeSession>>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                opens: AtomicUsize::new(0),
                refusals: AtomicUsize::new(0),
                sessions: Mutex::new(Vec::new()),
            }
        }

        fn last(&self) -> Arc<FakeSession> {
            self.sessions.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl SshTransport for FakeTransport {
        async fn open(
            &self,
            _target: &Target,
            _trust: Arc<KnownHosts>,
        ) -> Result<Arc<dyn TransportSession>, ConnectError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let refused = self
                .refusals
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(ConnectError::Transport("connection refused".to_string()));
            }
            let session = Arc::new(FakeSession::new());
            self.sessions.lock().push(session.clone());
            Ok(session)
        }
    }

    fn connection(transport: Arc<FakeTransport>, dir: &TempDir) -> Arc<RemoteConnection> {
        let target = Target {
            host: "db01".to_string(),
            port: 22,
            username: "mon".to_string(),
        };
        let settings = duct_core::domain::RemoteSettings {
            host: target.host.clone(),
            port: target.port,
            username: target.username.clone(),
            password: Some("pw".to_string()),
            key: None,
            keyfile: None,
            keypass: None,
            known_hosts_file: String::new(),
        };
        RemoteConnection::new(
            target,
            Credentials::from_settings(&settings),
            Fingerprint::of(&settings),
            Arc::new(KnownHosts::open(dir.path().join("known_hosts")).unwrap()),
            transport,
            Arc::new(MemoryLog::new()),
        )
    }

    #[test]
    fn test_command_line_prefixes_env() {
        let mut env = BTreeMap::new();
        env.insert("LANG".to_string(), "C".to_string());
        env.insert("A".to_string(), "1".to_string());

        let line = command_line("df", &["-k".to_string(), "/".to_string()], &env);
        assert_eq!(line, "A=1 LANG=C df -k /");
        assert_eq!(command_line("uptime", &[], &BTreeMap::new()), "uptime");
    }

    #[tokio::test]
    async fn test_run_before_connect_is_not_connected() {
        let dir = TempDir::new().unwrap();
        let conn = connection(Arc::new(FakeTransport::new()), &dir);

        let output = conn
            .run("uptime", &[], &BTreeMap::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(output, CommandOutput::not_connected());
    }

    #[tokio::test]
    async fn test_connect_then_run() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let conn = connection(transport.clone(), &dir);

        conn.connect().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);

        let output = conn
            .run("uptime", &[], &BTreeMap::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(output.stdout, "ok\n");
        assert_eq!(transport.last().execs.lock().clone(), vec!["uptime".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_twice_opens_once() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let conn = connection(transport.clone(), &dir);

        conn.connect().await.unwrap();
        conn.connect().await.unwrap();
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_timeout_keeps_connection() {
        let dir = TempDir::new().unwrap();
        let conn = connection(Arc::new(FakeTransport::new()), &dir);
        conn.connect().await.unwrap();

        let result = conn
            .run("sleep", &["10".to_string()], &BTreeMap::new(), Duration::from_millis(50))
            .await;
        assert_eq!(result, Err(ExecutionError::Timeout(50)));
        assert_eq!(conn.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_loss_reconnects_after_delay() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let conn = connection(transport.clone(), &dir);
        conn.connect().await.unwrap();

        let mut states = conn.subscribe();
        transport.last().drop_transport();

        tokio::time::timeout(Duration::from_secs(1), states.wait_for(|s| *s == ConnectionState::Disconnected))
            .await
            .expect("loss should be noticed")
            .unwrap();
        let output = conn
            .run("uptime", &[], &BTreeMap::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(output, CommandOutput::not_connected());

        tokio::time::timeout(Duration::from_secs(3), states.wait_for(|s| *s == ConnectionState::Connected))
            .await
            .expect("should reconnect")
            .unwrap();
        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_retries_until_transport_returns() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let conn = connection(transport.clone(), &dir);
        conn.connect().await.unwrap();

        transport.refusals.store(3, Ordering::SeqCst);
        let mut states = conn.subscribe();
        transport.last().drop_transport();

        states
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(30), states.wait_for(|s| *s == ConnectionState::Connected))
            .await
            .expect("should keep retrying until the transport comes back")
            .unwrap();
        assert_eq!(transport.opens.load(Ordering::SeqCst), 5);
        assert_eq!(transport.sessions.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_reconnect() {
        let dir = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let conn = connection(transport.clone(), &dir);
        conn.connect().await.unwrap();

        conn.shutdown().await;
        tokio::time::sleep(Duration::from_millis(1300)).await;

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
        assert_eq!(conn.connect().await, Err(ConnectError::Shutdown));
    }
}

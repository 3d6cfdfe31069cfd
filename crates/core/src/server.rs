//! TCP distribution server.
//!
//! Lifecycle: `Stopped -> Starting -> Listening -> Stopping -> Stopped`.
//! One accept thread polls a nonblocking listener; every accepted connection
//! gets a [`ClientSession`] thread and a record in the client table.
//!
//! The client table compacts: when a client leaves, every later client moves
//! down one index. Lookups by index are therefore only meaningful between two
//! change notifications.

use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::controller::ControllerRegistry;
use crate::error::{Error, Result};
use crate::notifier::ChangeNotifier;
use crate::protocol::DEFAULT_PORT;
use crate::session::ClientSession;

/// How often the accept loop checks for a stop request.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Identifier of a connection, unique for the server's lifetime.
pub type ClientId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
    Stopping,
}

impl ServerState {
    fn as_raw(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Starting => 1,
            Self::Listening => 2,
            Self::Stopping => 3,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Starting,
            2 => Self::Listening,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

struct ClientRecord {
    id: ClientId,
    label: String,
    addr: SocketAddr,
    /// Clone of the session's socket, used to unblock it on stop.
    stream: TcpStream,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ClientTableInner {
    records: Vec<ClientRecord>,
    /// Threads of sessions that already removed themselves.
    finished: Vec<JoinHandle<()>>,
}

/// Connected clients, in connection order.
#[derive(Default)]
pub(crate) struct ClientTable {
    inner: Mutex<ClientTableInner>,
    next_id: AtomicU64,
}

impl ClientTable {
    fn lock(&self) -> MutexGuard<'_, ClientTableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub(crate) fn label(&self, index: usize) -> Option<String> {
        self.lock().records.get(index).map(|r| r.label.clone())
    }

    pub(crate) fn addr(&self, index: usize) -> Option<SocketAddr> {
        self.lock().records.get(index).map(|r| r.addr)
    }

    pub(crate) fn relabel(&self, id: ClientId, label: String) {
        if let Some(record) = self.lock().records.iter_mut().find(|r| r.id == id) {
            record.label = label;
        }
    }

    /// Drop the record of client `id`, keeping its thread handle for joining.
    pub(crate) fn remove(&self, id: ClientId) {
        let mut inner = self.lock();
        if let Some(pos) = inner.records.iter().position(|r| r.id == id) {
            let record = inner.records.remove(pos);
            if let Some(handle) = record.handle {
                inner.finished.push(handle);
            }
        }
    }

    /// Join session threads that have already exited.
    fn reap_finished(&self) {
        let done: Vec<JoinHandle<()>> = {
            let mut inner = self.lock();
            let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.finished)
                .into_iter()
                .partition(|h| h.is_finished());
            inner.finished = running;
            done
        };
        for handle in done {
            join_session(handle);
        }
    }

    /// Shut down every client socket and hand back all session threads.
    fn close_all(&self) -> Vec<JoinHandle<()>> {
        let mut inner = self.lock();
        let mut handles = std::mem::take(&mut inner.finished);
        for record in inner.records.iter_mut() {
            let _ = record.stream.shutdown(Shutdown::Both);
            handles.extend(record.handle.take());
        }
        handles
    }

    fn clear(&self) {
        self.lock().records.clear();
    }
}

fn join_session(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        warn!("Client session thread panicked");
    }
}

/// State shared between the server handle and its threads.
pub(crate) struct ServerShared {
    pub(crate) registry: Arc<ControllerRegistry>,
    pub(crate) clients: ClientTable,
    pub(crate) notifier: ChangeNotifier,
}

impl ServerShared {
    pub(crate) fn new(registry: Arc<ControllerRegistry>) -> Self {
        Self {
            registry,
            clients: ClientTable::default(),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Label-change entry point shared by sessions and the public server API.
    pub(crate) fn client_info_changed(&self) {
        self.notifier.notify();
    }
}

/// Serves a [`ControllerRegistry`] to SDK clients over TCP.
///
/// Queries (`port`, `is_online`, client lookups) never wait on `start` or
/// `stop`, so they are safe to call from change callbacks.
pub struct DistributionServer {
    shared: Arc<ServerShared>,
    state: AtomicU8,
    port: AtomicU16,
    shutdown: Arc<AtomicBool>,
    /// Accept thread handle; its lock also serializes `start` and `stop`.
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl DistributionServer {
    pub fn new(registry: Arc<ControllerRegistry>) -> Self {
        Self {
            shared: Arc::new(ServerShared::new(registry)),
            state: AtomicU8::new(ServerState::Stopped.as_raw()),
            port: AtomicU16::new(DEFAULT_PORT),
            shutdown: Arc::new(AtomicBool::new(false)),
            accept_thread: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.shared.registry
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_raw(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state.as_raw(), Ordering::Release);
    }

    fn transition(&self, from: ServerState, to: ServerState) -> bool {
        self.state
            .compare_exchange(from.as_raw(), to.as_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Configured port, or the bound port while listening.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    /// Change the listening port. Port 0 picks an ephemeral port at `start`.
    pub fn set_port(&self, port: u16) -> Result<()> {
        if self.state() != ServerState::Stopped {
            return Err(Error::PortLocked(self.port()));
        }
        self.port.store(port, Ordering::Release);
        Ok(())
    }

    pub fn is_online(&self) -> bool {
        self.state() == ServerState::Listening
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.len()
    }

    /// Label the client at `index` identified itself with (empty until then).
    pub fn client_label(&self, index: usize) -> Option<String> {
        self.shared.clients.label(index)
    }

    pub fn client_addr(&self, index: usize) -> Option<SocketAddr> {
        self.shared.clients.addr(index)
    }

    /// Call `callback` whenever a client connects, disconnects or relabels.
    pub fn register_client_change_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.shared.notifier.register(callback);
    }

    /// Fire the client change callbacks.
    pub fn client_info_changed(&self) {
        self.shared.client_info_changed();
    }

    /// Bind the listener and spawn the accept thread.
    pub fn start(&self) -> Result<()> {
        let mut accept_thread = self
            .accept_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.transition(ServerState::Stopped, ServerState::Starting) {
            return Err(Error::AlreadyRunning);
        }

        let listener = match self.bind() {
            Ok(listener) => listener,
            Err(e) => {
                self.set_state(ServerState::Stopped);
                warn!(port = self.port(), error = %e, "Server failed to start");
                return Err(e);
            }
        };
        let port = self.port();

        self.shutdown.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let shutdown = Arc::clone(&self.shutdown);
        let spawned = thread::Builder::new()
            .name("rgb-hub-accept".into())
            .spawn(move || accept_loop(listener, shared, shutdown));
        match spawned {
            Ok(handle) => *accept_thread = Some(handle),
            Err(e) => {
                self.set_state(ServerState::Stopped);
                return Err(e.into());
            }
        }

        self.set_state(ServerState::Listening);
        info!(port, "Server listening");
        Ok(())
    }

    fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port()))?;
        listener.set_nonblocking(true)?;
        self.port
            .store(listener.local_addr()?.port(), Ordering::Release);
        Ok(listener)
    }

    /// Close the listener, disconnect every client and join all threads.
    ///
    /// Does nothing unless the server is listening.
    pub fn stop(&self) {
        let mut accept_thread = self
            .accept_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.transition(ServerState::Listening, ServerState::Stopping) {
            return;
        }
        info!(port = self.port(), "Server stopping");

        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = accept_thread.take() {
            if handle.join().is_err() {
                warn!("Accept thread panicked");
            }
        }

        let sessions = self.shared.clients.close_all();
        debug!(sessions = sessions.len(), "Joining client sessions");
        for handle in sessions {
            join_session(handle);
        }
        self.shared.clients.clear();

        self.set_state(ServerState::Stopped);
        info!("Server stopped");
        self.shared.client_info_changed();
    }
}

impl Drop for DistributionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<ServerShared>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = admit(&shared, stream, peer) {
                    warn!(peer = %peer, error = %e, "Failed to start client session");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                shared.clients.reap_finished();
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    debug!("Accept loop exited");
}

fn admit(shared: &Arc<ServerShared>, stream: TcpStream, peer: SocketAddr) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let control = stream.try_clone()?;
    let id = shared.clients.next_id();

    {
        // The session cannot touch its record before this lock is released.
        let mut inner = shared.clients.lock();
        let session = ClientSession::new(id, peer, stream, Arc::clone(shared));
        let handle = thread::Builder::new()
            .name(format!("rgb-hub-client-{id}"))
            .spawn(move || session.run())?;
        inner.records.push(ClientRecord {
            id,
            label: String::new(),
            addr: peer,
            stream: control,
            handle: Some(handle),
        });
    }

    info!(client = id, peer = %peer, "Client connected");
    shared.client_info_changed();
    Ok(())
}

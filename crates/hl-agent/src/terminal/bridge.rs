//! Terminal bridge
//!
//! Each terminal request gets its own transport and its own shell. Bytes
//! flow between the two until either side stops, then the session is torn
//! down exactly once.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hl_core::error::{HlError, SessionError};
use hl_protocol::{Frame, RequestId, TerminalControl, TerminalSize};

use crate::state::AgentState;
use crate::transport::{FrameStream, SafeConn};

use super::pty::PtyProcess;
use super::shell::resolve_shell;

/// Largest chunk forwarded from the pty in one frame
pub const PTY_READ_CHUNK: usize = 4096;

/// Chunks buffered between the blocking pty reader and the transport.
///
/// Small on purpose: a slow transport should stall the reader thread
/// rather than grow memory.
const PTY_OUTPUT_CHANNEL_CAPACITY: usize = 64;

type SharedProcess = Arc<Mutex<Box<dyn PtyProcess>>>;
type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One live terminal: a shell on a pty plus its dedicated transport
pub struct TerminalSession {
    request_id: RequestId,
    conn: Arc<SafeConn>,
    process: SharedProcess,
    cancel: CancellationToken,
    torn_down: AtomicBool,
}

impl TerminalSession {
    fn new(request_id: RequestId, conn: Arc<SafeConn>, process: SharedProcess) -> Self {
        Self {
            request_id,
            conn,
            process,
            cancel: CancellationToken::new(),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Kill the shell's process group, release the pty and close the
    /// transport. Only the first call does anything.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Tearing down {}", self.request_id);
        self.cancel.cancel();

        let process = Arc::clone(&self.process);
        let request_id = self.request_id.clone();
        let closing = tokio::task::spawn_blocking(move || {
            let mut process = lock(&process);
            match process.try_wait() {
                Ok(Some(code)) => {
                    tracing::debug!("Shell for {} exited with code {}", request_id, code)
                }
                Ok(None) => tracing::debug!("Killing shell for {}", request_id),
                Err(e) => tracing::debug!("Failed to poll shell for {}: {}", request_id, e),
            }
            process.close();
        });
        if let Err(e) = closing.await {
            tracing::warn!("Failed to close pty for {}: {}", self.request_id, e);
        }
        self.conn.close().await;
    }
}

/// Live terminal sessions, keyed by request id
#[derive(Default)]
pub struct TerminalRegistry {
    sessions: DashMap<RequestId, Arc<TerminalSession>>,
}

impl TerminalRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, session: Arc<TerminalSession>) {
        if let Some(previous) = self
            .sessions
            .insert(session.request_id.clone(), Arc::clone(&session))
        {
            tracing::warn!("Terminal {} opened twice", previous.request_id);
            previous.cancel.cancel();
        }
    }

    fn remove(&self, session: &Arc<TerminalSession>) {
        self.sessions
            .remove_if(&session.request_id, |_, current| Arc::ptr_eq(current, session));
    }

    /// Whether a session is open for `request_id`
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.sessions.contains_key(request_id)
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is open
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Tear down every open session
    pub async fn shutdown_all(&self) {
        let sessions: Vec<Arc<TerminalSession>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        if !sessions.is_empty() {
            tracing::info!("Closing {} terminal session(s)", sessions.len());
        }
        for session in sessions {
            session.teardown().await;
            self.remove(&session);
        }
    }
}

/// Serve one terminal request until either side ends it
pub async fn run_terminal(state: Arc<AgentState>, request_id: RequestId) {
    let url = state.endpoints.terminal_ws(&request_id);
    let (conn, stream) = match state.dialer.dial(&url).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!("Failed to open terminal transport for {}: {}", request_id, e);
            return;
        }
    };
    let conn = Arc::new(conn);
    tracing::info!("Terminal {} connected", request_id);

    let (process, reader, writer) = match open_shell(&state) {
        Ok(parts) => parts,
        Err(e) => {
            tracing::warn!("Failed to start shell for {}: {}", request_id, e);
            let notice = match e {
                SessionError::NoShell => SessionError::NoShell.to_string(),
                other => format!("Error: {}\r\n", other),
            };
            if let Err(e) = conn.send(Frame::text(notice)).await {
                tracing::debug!("Could not report setup failure: {}", e);
            }
            conn.close().await;
            return;
        }
    };

    let process: SharedProcess = Arc::new(Mutex::new(process));
    let writer: SharedWriter = Arc::new(Mutex::new(writer));
    let session = Arc::new(TerminalSession::new(
        request_id.clone(),
        Arc::clone(&conn),
        Arc::clone(&process),
    ));
    state.terminals.insert(Arc::clone(&session));

    let outcome = tokio::select! {
        result = relay_pty_output(reader, Arc::clone(&conn)) => result,
        result = relay_transport_input(stream, writer, process) => result,
        _ = session.cancel.cancelled() => Ok(()),
    };

    if let Err(e) = outcome {
        tracing::warn!("Terminal {} failed: {}", request_id, e);
        if let Err(e) = conn.send(Frame::text(format!("Error: {}\r\n", e))).await {
            tracing::debug!("Could not report relay failure: {}", e);
        }
    }

    session.teardown().await;
    state.terminals.remove(&session);
    tracing::info!("Terminal {} closed", request_id);
}

type ShellParts = (
    Box<dyn PtyProcess>,
    Box<dyn Read + Send>,
    Box<dyn Write + Send>,
);

fn open_shell(state: &AgentState) -> Result<ShellParts, SessionError> {
    let shell = resolve_shell(state.config.default_shell.as_deref())?;

    let mut env = vec![("TERM".to_string(), "xterm-256color".to_string())];
    env.extend(state.config.default_env.iter().cloned());

    let mut process = state.pty.spawn(&shell, TerminalSize::default(), &env)?;
    let reader = process.take_reader()?;
    let writer = process.take_writer()?;
    Ok((process, reader, writer))
}

/// pty -> transport: forward each chunk as a binary frame
async fn relay_pty_output(
    reader: Box<dyn Read + Send>,
    conn: Arc<SafeConn>,
) -> Result<(), HlError> {
    let (tx, mut rx) = mpsc::channel(PTY_OUTPUT_CHANNEL_CAPACITY);
    let _reader = spawn_pty_reader(reader, tx);

    while let Some(chunk) = rx.recv().await {
        let chunk = chunk.map_err(SessionError::from)?;
        conn.send(Frame::binary(chunk)).await?;
    }

    tracing::debug!("pty reached end of file");
    Ok(())
}

/// transport -> pty: apply control messages, write everything else raw
async fn relay_transport_input(
    mut stream: FrameStream,
    writer: SharedWriter,
    process: SharedProcess,
) -> Result<(), HlError> {
    while let Some(frame) = stream.recv().await {
        match frame? {
            Frame::Text(text) => match TerminalControl::parse(&text) {
                Some(TerminalControl::Resize { cols, rows }) => {
                    if let Err(e) = lock(&process).resize(TerminalSize::new(rows, cols)) {
                        tracing::warn!("Failed to resize pty: {}", e);
                    }
                }
                Some(TerminalControl::Input { input }) => {
                    write_pty(&writer, input.into_bytes()).await?;
                }
                Some(TerminalControl::Ignore) => {
                    tracing::trace!("Ignoring terminal control message: {}", text);
                }
                None => write_pty(&writer, text.into_bytes()).await?,
            },
            Frame::Binary(data) => write_pty(&writer, data.to_vec()).await?,
        }
    }

    tracing::debug!("Terminal transport closed by peer");
    Ok(())
}

async fn write_pty(writer: &SharedWriter, data: Vec<u8>) -> Result<(), SessionError> {
    let writer = Arc::clone(writer);
    tokio::task::spawn_blocking(move || {
        let mut writer = lock(&writer);
        writer.write_all(&data)?;
        writer.flush()
    })
    .await
    .map_err(io::Error::other)??;
    Ok(())
}

/// Read the pty on a blocking thread until EOF, an error, or the receiver
/// going away.
fn spawn_pty_reader(
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; PTY_READ_CHUNK];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_hangup(&e) => break,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        }

        tracing::trace!("pty reader exiting");
    })
}

/// Linux reports EIO on the master once the slave side has no process left
fn is_hangup(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(libc::EIO)
    }
    #[cfg(not(unix))]
    {
        e.kind() == io::ErrorKind::BrokenPipe
    }
}

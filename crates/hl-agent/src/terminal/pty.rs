//! Pseudo-terminal processes
//!
//! Spawns shells behind a pseudo-terminal using the portable-pty crate
//! (native pty on Unix, ConPTY on Windows). The shell and its pty are one
//! unit: closing the process kills the shell's whole process group and
//! releases the pty.

use std::io::{Read, Write};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use hl_core::error::SessionError;
use hl_protocol::TerminalSize;

/// Creates pty-backed shell processes
pub trait PtyBackend: Send + Sync {
    /// Spawn `shell` on a new pty of the given size with extra environment
    fn spawn(
        &self,
        shell: &str,
        size: TerminalSize,
        env: &[(String, String)],
    ) -> Result<Box<dyn PtyProcess>, SessionError>;
}

/// A running shell attached to a pty
pub trait PtyProcess: Send {
    /// Open a reader for pty output
    fn take_reader(&mut self) -> Result<Box<dyn Read + Send>, SessionError>;

    /// Take the writer for pty input. Only the first call succeeds.
    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, SessionError>;

    /// Change the pty window size
    fn resize(&self, size: TerminalSize) -> Result<(), SessionError>;

    /// Process id of the shell, if known
    fn pid(&self) -> Option<u32>;

    /// Exit code if the shell has already exited
    fn try_wait(&mut self) -> Result<Option<i32>, SessionError>;

    /// Kill the shell's process group, reap it and release the pty
    fn close(&mut self);
}

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Native pseudo-terminal backend
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePty;

impl PtyBackend for NativePty {
    fn spawn(
        &self,
        shell: &str,
        size: TerminalSize,
        env: &[(String, String)],
    ) -> Result<Box<dyn PtyProcess>, SessionError> {
        tracing::info!(
            "Spawning {} on a {}x{} pty",
            shell,
            size.cols,
            size.rows
        );

        let pair = native_pty_system()
            .openpty(pty_size(size))
            .map_err(|e| SessionError::PtyAllocation(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::Spawn(format!("{}: {}", shell, e)))?;

        // Only the child may hold the slave side, so the reader sees EOF once
        // the shell and everything it started are gone
        drop(pair.slave);

        let pid = child.process_id();
        tracing::debug!("Shell started with PID {:?}", pid);

        Ok(Box::new(NativeProcess {
            master: Some(pair.master),
            child,
            pid,
            writer_taken: false,
            closed: false,
        }))
    }
}

struct NativeProcess {
    master: Option<Box<dyn MasterPty + Send>>,
    child: Box<dyn Child + Send + Sync>,
    pid: Option<u32>,
    writer_taken: bool,
    closed: bool,
}

impl NativeProcess {
    fn master(&self) -> Result<&(dyn MasterPty + Send), SessionError> {
        self.master.as_deref().ok_or(SessionError::Closed)
    }

    #[cfg(unix)]
    fn kill_group(&mut self) {
        // The shell is a session leader, so its pid is also its process group id
        if let Some(pid) = self.pid {
            // SAFETY: killpg only sends a signal; a stale pgid yields ESRCH
            let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
            if rc == 0 {
                return;
            }
            tracing::debug!(
                "killpg({}) failed: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
        if let Err(e) = self.child.kill() {
            tracing::debug!("Failed to kill shell: {}", e);
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!("Failed to kill shell: {}", e);
        }
    }
}

impl PtyProcess for NativeProcess {
    fn take_reader(&mut self) -> Result<Box<dyn Read + Send>, SessionError> {
        self.master()?
            .try_clone_reader()
            .map_err(|e| SessionError::PtyAllocation(format!("clone reader: {}", e)))
    }

    fn take_writer(&mut self) -> Result<Box<dyn Write + Send>, SessionError> {
        if self.writer_taken {
            return Err(SessionError::PtyAllocation("writer already taken".into()));
        }
        let writer = self
            .master()?
            .take_writer()
            .map_err(|e| SessionError::PtyAllocation(format!("take writer: {}", e)))?;
        self.writer_taken = true;
        Ok(writer)
    }

    fn resize(&self, size: TerminalSize) -> Result<(), SessionError> {
        tracing::debug!("Resizing pty to {}x{}", size.cols, size.rows);
        self.master()?
            .resize(pty_size(size))
            .map_err(|e| SessionError::Io(std::io::Error::other(e.to_string())))
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_wait(&mut self) -> Result<Option<i32>, SessionError> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| status.exit_code() as i32))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.kill_group();
        match self.child.wait() {
            Ok(status) => tracing::debug!("Shell exited with code {}", status.exit_code()),
            Err(e) => tracing::debug!("Failed to reap shell: {}", e),
        }
        self.master.take();
    }
}

impl Drop for NativeProcess {
    fn drop(&mut self) {
        self.close();
    }
}

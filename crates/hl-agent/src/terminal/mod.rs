//! Interactive terminal sessions

mod bridge;
pub mod pty;
mod shell;

pub use bridge::{run_terminal, TerminalRegistry, TerminalSession, PTY_READ_CHUNK};
pub use pty::{NativePty, PtyBackend, PtyProcess};
pub use shell::resolve_shell;

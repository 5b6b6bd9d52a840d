//! Remote command execution
//!
//! Runs a one-shot shell command and uploads its combined output. Uploads
//! are retried a bounded number of times; a result that still cannot be
//! delivered is logged and dropped.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;

use hl_core::traits::Uplink;
use hl_protocol::{TaskId, TaskResult};

use crate::state::AgentState;

/// Result text sent when remote execution is turned off
pub const DISABLED_MESSAGE: &str = "Web SSH (REC) is disabled.";

/// Result text sent for an empty command
pub const EMPTY_COMMAND_MESSAGE: &str = "No command provided";

/// Handle one inbound exec request
pub async fn run_task(state: Arc<AgentState>, task_id: TaskId, command: String) {
    if task_id.as_str().is_empty() {
        tracing::debug!("Ignoring exec request without a task id");
        return;
    }

    let result = if state.config.disable_web_ssh {
        tracing::info!("Rejecting {}: remote execution is disabled", task_id);
        TaskResult::now(task_id, DISABLED_MESSAGE, TaskResult::SENTINEL_EXIT_CODE)
    } else if command.trim().is_empty() {
        TaskResult::now(task_id, EMPTY_COMMAND_MESSAGE, 0)
    } else {
        tracing::info!("Executing {}: {}", task_id, command);
        let (output, exit_code) = execute(&command).await;
        tracing::info!("{} finished with exit code {}", task_id, exit_code);
        TaskResult::now(task_id, output, exit_code)
    };

    upload_with_retry(
        state.uplink.as_ref(),
        &result,
        state.config.max_retries,
        state.config.task_retry_delay,
    )
    .await;
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("powershell");
        cmd.args([
            "-NoProfile",
            "-ExecutionPolicy",
            "Bypass",
            "-Command",
            &format!(
                "[Console]::OutputEncoding = [System.Text.Encoding]::UTF8; {}",
                command
            ),
        ]);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

/// Run `command` through the platform shell.
///
/// Returns stdout, followed by a newline and stderr when stderr is not
/// empty, with CRLF folded to LF. The exit code is -1 when the process was
/// killed by a signal or could not be started; in the latter case the text
/// is the spawn error.
pub async fn execute(command: &str) -> (String, i32) {
    let output = shell_command(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("Failed to start shell: {}", e);
            return (e.to_string(), TaskResult::SENTINEL_EXIT_CODE);
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.stderr.is_empty() {
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));
    }
    let text = text.replace("\r\n", "\n");

    let exit_code = output
        .status
        .code()
        .unwrap_or(TaskResult::SENTINEL_EXIT_CODE);
    (text, exit_code)
}

/// POST `result`, retrying up to `max_retries` more times.
///
/// Returns whether the upload eventually succeeded.
pub async fn upload_with_retry(
    uplink: &dyn Uplink,
    result: &TaskResult,
    max_retries: u32,
    delay: Duration,
) -> bool {
    let mut attempt = 0;
    loop {
        match uplink.post_task_result(result).await {
            Ok(()) => return true,
            Err(e) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    "Failed to upload result of {}: {}. Retrying {}/{}",
                    result.task_id,
                    e,
                    attempt,
                    max_retries
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!("Giving up on result of {}: {}", result.task_id, e);
                return false;
            }
        }
    }
}

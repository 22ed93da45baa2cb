use crate::error::RandRunError;
use crate::model::Runnable;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

/// Run `runnable` in the foreground and wait for it to exit.
///
/// The child inherits this process's environment and terminal. Only a failure to
/// start or wait on the child is an error; a non-zero exit is returned as-is.
pub async fn launch(runnable: &Runnable) -> Result<ExitStatus, RandRunError> {
    let launch_err = |source| RandRunError::Launch {
        command: runnable.command_line(),
        source,
    };

    let mut child = Command::new(&runnable.command)
        .args(&runnable.args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(launch_err)?;
    info!(name = %runnable.name, pid = child.id(), "started runnable");

    let status = child.wait().await.map_err(launch_err)?;
    debug!(name = %runnable.name, %status, "runnable exited");
    Ok(status)
}

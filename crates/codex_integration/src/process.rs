use std::{io, path::Path, process::ExitStatus, process::Stdio, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    task::JoinHandle,
    time,
};

use crate::IntegrationError;

pub(crate) struct CommandOutput {
    pub(crate) status: ExitStatus,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
}

pub(crate) async fn drain_stream<R>(mut reader: R) -> Result<Vec<u8>, io::Error>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    Ok(buffer)
}

/// Retries spawns that hit `ETXTBSY` on a binary that was just written; any other
/// spawn failure is returned immediately.
pub(crate) fn spawn_with_retry(
    command: &mut Command,
    binary: &Path,
) -> Result<tokio::process::Child, IntegrationError> {
    let mut backoff = Duration::from_millis(2);
    let mut attempt = 0;
    loop {
        match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => {
                // ETXTBSY
                let is_busy = source.raw_os_error() == Some(26);
                if is_busy && attempt < 4 {
                    attempt += 1;
                    std::thread::sleep(backoff);
                    backoff = std::cmp::min(backoff * 2, Duration::from_millis(50));
                    continue;
                }
                return Err(IntegrationError::Spawn {
                    binary: binary.to_path_buf(),
                    source,
                });
            }
        }
    }
}

async fn collect(
    task: Option<&mut JoinHandle<Result<Vec<u8>, io::Error>>>,
) -> Result<Vec<u8>, IntegrationError> {
    match task {
        Some(task) => task.await?.map_err(IntegrationError::Capture),
        None => Ok(Vec::new()),
    }
}

/// Spawns `command`, drains the requested streams, and waits up to `timeout`.
///
/// The deadline covers both the exit of the child and EOF on its pipes, so a
/// background process that inherits stdout cannot stall the caller. The child is
/// spawned with `kill_on_drop`; on expiry it is killed and the drain tasks are aborted.
pub(crate) async fn run_command(
    mut command: Command,
    binary: &Path,
    timeout: Option<Duration>,
    capture_stdout: bool,
    capture_stderr: bool,
) -> Result<CommandOutput, IntegrationError> {
    command
        .stdin(Stdio::null())
        .stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(if capture_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    let mut child = spawn_with_retry(&mut command, binary)?;

    let mut stdout_task = if capture_stdout {
        let stdout = child
            .stdout
            .take()
            .ok_or(IntegrationError::StdoutUnavailable)?;
        Some(tokio::spawn(drain_stream(stdout)))
    } else {
        None
    };
    let mut stderr_task = if capture_stderr {
        let stderr = child
            .stderr
            .take()
            .ok_or(IntegrationError::StderrUnavailable)?;
        Some(tokio::spawn(drain_stream(stderr)))
    } else {
        None
    };

    let finish = async {
        let status = child
            .wait()
            .await
            .map_err(|source| IntegrationError::Wait { source })?;
        let stdout = collect(stdout_task.as_mut()).await?;
        let stderr = collect(stderr_task.as_mut()).await?;
        Ok::<_, IntegrationError>(CommandOutput {
            status,
            stdout,
            stderr,
        })
    };

    let result = match timeout.filter(|timeout| !timeout.is_zero()) {
        Some(timeout) => match time::timeout(timeout, finish).await {
            Ok(result) => result,
            Err(_) => Err(IntegrationError::Timeout {
                binary: binary.to_path_buf(),
                timeout,
            }),
        },
        None => finish.await,
    };

    if result.is_err() {
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            task.abort();
        }
    }
    result
}

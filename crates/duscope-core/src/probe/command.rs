/// Timeout-guarded external command execution.
///
/// The child's stdout is drained on a helper thread which sends the whole
/// output over a channel. The calling thread waits on that channel with
/// `recv_timeout`; if the deadline passes first the child is killed and
/// reaped so no zombie is left behind.
use crate::error::ProbeError;
use crossbeam_channel::RecvTimeoutError;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Run `program args...` and return its stdout, or fail on spawn error,
/// timeout or non-zero exit.
pub fn run_with_timeout<I, S>(program: &str, args: I, timeout: Duration) -> Result<String, ProbeError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ProbeError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let Some(mut stdout) = child.stdout.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(ProbeError::Unparsable {
            program: program.to_string(),
            output: String::new(),
        });
    };

    let (tx, rx) = crossbeam_channel::bounded::<std::io::Result<String>>(1);
    std::thread::spawn(move || {
        let mut buf = String::new();
        let result = stdout.read_to_string(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });

    let output = match rx.recv_timeout(timeout) {
        Ok(result) => result.unwrap_or_default(),
        Err(RecvTimeoutError::Timeout) => {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(program, ?timeout, "External tool timed out; killed");
            return Err(ProbeError::Timeout {
                program: program.to_string(),
                timeout,
            });
        }
        Err(RecvTimeoutError::Disconnected) => String::new(),
    };

    let status = child.wait().map_err(|source| ProbeError::Spawn {
        program: program.to_string(),
        source,
    })?;
    if !status.success() {
        return Err(ProbeError::ExitStatus {
            program: program.to_string(),
            code: status.code(),
        });
    }
    Ok(output)
}

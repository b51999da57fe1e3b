use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::time::{Duration, Instant};

use labrig_core::{LabError, Result};
use tokio::net::unix::pipe;
use tokio::process::Command;

use crate::logstream::LogStream;

/// How long output may keep arriving after the process itself has exited.
/// Background children that inherited the pipe are cut off after this.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Run `cmd` to completion with stdout and stderr drained into `log`.
///
/// Both streams share one pipe, so the log keeps the order the process wrote
/// in. Returns once the process has exited and its output is drained, or
/// [`DRAIN_GRACE`] later if something it left behind still holds the pipe.
/// A non-zero exit becomes [`LabError::PhaseFailed`] tagged with `phase`.
pub async fn run_logged(mut cmd: Command, phase: &str, log: &LogStream) -> Result<()> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let spawn_err = |reason: String| LabError::ProcessSpawn {
        command: program.clone(),
        reason,
    };
    let start = Instant::now();

    let (reader, writer) = std::io::pipe().map_err(|e| spawn_err(e.to_string()))?;
    let stderr_writer = writer.try_clone().map_err(|e| spawn_err(e.to_string()))?;
    let reader = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
        .map_err(|e| spawn_err(e.to_string()))?;

    let spawned = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(stderr_writer))
        .spawn();
    // The command holds the parent's copies of the write end; EOF needs them gone.
    drop(cmd);
    let mut child = spawned.map_err(|e| spawn_err(e.to_string()))?;

    let mut drain = log.attach(reader);
    let status = child.wait().await;

    match tokio::time::timeout(DRAIN_GRACE, &mut drain).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(phase, error = %e, "output drain task failed"),
        Err(_) => {
            tracing::warn!(
                phase,
                program = %program,
                "output still open after exit, detaching background writers"
            );
            drain.abort();
        }
    }

    let status = status?;
    let code = status.code().unwrap_or(-1);
    tracing::info!(
        phase,
        program = %program,
        exit_code = code,
        duration_seconds = start.elapsed().as_secs_f64(),
        "phase process exited"
    );

    if status.success() {
        Ok(())
    } else {
        Err(LabError::PhaseFailed {
            phase: phase.to_string(),
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn success_captures_every_line_in_order() {
        let log = LogStream::new();
        run_logged(sh("for i in $(seq 1 500); do echo line-$i; done"), "plan", &log)
            .await
            .unwrap();
        let expected: Vec<String> = (1..=500).map(|i| format!("line-{i}")).collect();
        assert_eq!(log.read(), expected);
    }

    #[tokio::test]
    async fn stderr_is_captured() {
        let log = LogStream::new();
        run_logged(sh("echo err-output >&2"), "plan", &log)
            .await
            .unwrap();
        assert_eq!(log.read(), vec!["err-output"]);
    }

    #[tokio::test]
    async fn interleaved_streams_keep_write_order() {
        let log = LogStream::new();
        run_logged(
            sh("i=0; while [ $i -lt 300 ]; do echo o$i; echo e$i >&2; i=$((i+1)); done"),
            "apply",
            &log,
        )
        .await
        .unwrap();
        let expected: Vec<String> = (0..300)
            .flat_map(|i| [format!("o{i}"), format!("e{i}")])
            .collect();
        assert_eq!(log.read(), expected);
    }

    #[tokio::test]
    async fn background_child_does_not_hold_the_phase_open() {
        let log = LogStream::new();
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            run_logged(sh("sleep 20 & echo started"), "extend", &log),
        )
        .await
        .expect("phase returned after the script exited");
        outcome.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(log.read(), vec!["started"]);
    }

    #[tokio::test]
    async fn non_zero_exit_is_phase_failure_with_output_kept() {
        let log = LogStream::new();
        let err = run_logged(sh("echo before-failure; exit 3"), "apply", &log)
            .await
            .unwrap_err();
        match err {
            LabError::PhaseFailed { phase, code } => {
                assert_eq!(phase, "apply");
                assert_eq!(code, 3);
            }
            other => panic!("expected PhaseFailed, got {other:?}"),
        }
        assert_eq!(log.read(), vec!["before-failure"]);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let log = LogStream::new();
        let err = run_logged(Command::new("__labrig_missing_tool__"), "init", &log)
            .await
            .unwrap_err();
        match err {
            LabError::ProcessSpawn { command, .. } => {
                assert!(command.contains("__labrig_missing_tool__"))
            }
            other => panic!("expected ProcessSpawn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn large_output_does_not_stall_exit() {
        let log = LogStream::new();
        // Well past a 64 KiB pipe buffer.
        run_logged(
            sh("i=0; while [ $i -lt 5000 ]; do echo out-$i-xxxxxxxxxxxxxxxxxxxxxxxx; echo err-$i >&2; i=$((i+1)); done"),
            "apply",
            &log,
        )
        .await
        .unwrap();
        assert_eq!(log.read().len(), 10_000);
    }
}

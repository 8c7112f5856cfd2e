//! Asynchronous utilities for use with Tokio.
//!
//! Most of our real work is either blocking (ZIP extraction, image decoding)
//! or happens in external processes (PDF rasterization). The helpers here keep
//! that work off the async executor and turn failures into useful errors.

use crate::prelude::*;

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        // Blocking tasks are only cancelled when the runtime shuts down.
        Err(err) => panic!("blocking task was cancelled: {err}"),
    }
}

/// Report any command failures, and include any error output.
///
/// The output of standard error and standard output will be logged at
/// appropriate levels. And standard error may be optionally checked with
/// `is_error_line` to detect tools which print errors but exit successfully.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
    is_error_line: Option<&dyn Fn(&str) -> bool>,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );
    if !stderr.trim().is_empty() {
        warn!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
    }

    if output.status.success() {
        if let Some(is_error_line) = is_error_line
            && stderr.lines().any(is_error_line)
        {
            return Err(anyhow!(
                "{} printed error output:\n{}",
                command_name,
                stderr,
            ));
        }
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    #[tokio::test]
    async fn spawn_blocking_returns_value() {
        let value = spawn_blocking_propagating_panics(|| 2 + 2).await;
        assert_eq!(value, 4);
    }

    #[test]
    fn command_failure_is_reported() {
        let output = Command::new("sh")
            .arg("-c")
            .arg("echo oops >&2; exit 3")
            .output()
            .unwrap();
        let err = check_for_command_failure("sh", &output, None).unwrap_err();
        assert!(err.to_string().contains("exit code 3"));
    }

    #[test]
    fn error_lines_fail_successful_commands() {
        let output = Command::new("sh")
            .arg("-c")
            .arg("echo 'Syntax Error: bad xref' >&2")
            .output()
            .unwrap();
        let is_error_line = |line: &str| line.contains("Error");
        assert!(check_for_command_failure("sh", &output, Some(&is_error_line)).is_err());
        assert!(check_for_command_failure("sh", &output, None).is_ok());
    }
}

//! External-process capture strategy: run a still-capture tool with a
//! unique temporary output path and collect whatever it deposited there.
//!
//! Success is decided by the output file existing afterwards, not by the
//! process exit status. Real capture tools are known to exit nonzero with
//! diagnostics on their own stream while still writing a usable file, so
//! changing this check would change observable success semantics.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, trace};

use crate::config::OUTPUT_PLACEHOLDER;
use crate::models::telemetry::FaultDescriptor;

static CAPTURE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A uniquely named output path in the system temp directory. The file is
/// not created here; the external tool is expected to deposit it. Dropping
/// the guard removes the file if it exists, so every exit path of a capture
/// attempt (success, failure, timeout-cancellation) cleans up after itself.
pub struct TempCapturePath {
    path: PathBuf,
}

impl TempCapturePath {
    pub fn new() -> Self {
        let seq = CAPTURE_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = env::temp_dir().join(format!(
            "rover-capture-{}-{}.jpg",
            std::process::id(),
            seq
        ));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for TempCapturePath {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempCapturePath {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                trace!("Failed to remove temp capture file: {}", e);
            }
        }
    }
}

/// Locate the first available capture tool from the candidate list.
/// Absolute candidates are checked directly; bare names are resolved by
/// scanning PATH. Candidate order wins over directory order.
pub fn find_capture_tool(candidates: &[String]) -> Option<PathBuf> {
    let dirs: Vec<PathBuf> = env::var_os("PATH")
        .map(|raw| env::split_paths(&raw).collect())
        .unwrap_or_default();
    find_tool_in(&dirs, candidates)
}

fn find_tool_in(dirs: &[PathBuf], candidates: &[String]) -> Option<PathBuf> {
    for candidate in candidates {
        let direct = Path::new(candidate);
        if direct.is_absolute() {
            if is_executable(direct) {
                return Some(direct.to_path_buf());
            }
            continue;
        }
        for dir in dirs {
            let full = dir.join(candidate);
            if is_executable(&full) {
                return Some(full);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Run one command-line variant of the external tool, bounded by the given
/// timeout. On expiry the child is killed and reaped before the temp path
/// guard inspects the output, so a child caught mid-write cannot deposit a
/// file after the cleanup check.
pub async fn run_variant(
    program: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<Vec<u8>, FaultDescriptor> {
    let output = TempCapturePath::new();
    let output_str = output.path().to_string_lossy().into_owned();
    let args: Vec<String> = args
        .iter()
        .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output_str))
        .collect();

    debug!("Running capture tool: {:?} {:?}", program, args);

    let mut child = Command::new(program)
        .args(&args)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            FaultDescriptor::hardware_error(format!(
                "failed to launch {}: {}",
                program.display(),
                e
            ))
        })?;

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(waited) => waited.map_err(|e| {
            FaultDescriptor::hardware_error(format!(
                "failed to wait for {}: {}",
                program.display(),
                e
            ))
        })?,
        Err(_) => {
            // SIGKILL synchronously, then reap, before the guard drops.
            if let Err(e) = child.start_kill() {
                debug!("Failed to kill capture tool: {}", e);
            }
            let _ = child.wait().await;
            return Err(FaultDescriptor::timeout(format!(
                "{} exceeded its {:?} bound",
                program.display(),
                timeout
            )));
        }
    };

    // Existence, not exit status, is the success signal.
    if output.path().exists() {
        if !status.success() {
            debug!(
                "Capture tool exited with {} but produced an output file, using it.",
                status
            );
        }
        let bytes = std::fs::read(output.path())
            .map_err(|e| FaultDescriptor::hardware_error(format!("failed to read output: {}", e)))?;
        return Ok(bytes);
    }

    Err(FaultDescriptor::hardware_error(format!(
        "{} exited with {} and produced no output file",
        program.display(),
        status
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_paths_are_unique_and_cleaned_up() {
        let first = TempCapturePath::new();
        let second = TempCapturePath::new();
        assert_ne!(first.path(), second.path());

        let kept = first.path().to_path_buf();
        std::fs::write(first.path(), b"leftover").unwrap();
        drop(first);
        assert!(!kept.exists());
    }

    #[test]
    fn test_find_tool_prefers_candidate_order() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        for name in ["second-choice", "first-choice"] {
            let path = dir.path().join(name);
            std::fs::write(&path, b"#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        // Plain file, not executable.
        std::fs::write(dir.path().join("not-a-tool"), b"data").unwrap();

        let dirs = vec![dir.path().to_path_buf()];
        let found = find_tool_in(
            &dirs,
            &["first-choice".to_string(), "second-choice".to_string()],
        );
        assert_eq!(found.unwrap(), dir.path().join("first-choice"));

        let found = find_tool_in(&dirs, &["not-a-tool".to_string()]);
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_variant_reads_deposited_file() {
        let bytes = run_variant(
            Path::new("/bin/sh"),
            &[
                "-c".to_string(),
                format!("printf 'jpeg-ish' > {}", OUTPUT_PLACEHOLDER),
            ],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(bytes, b"jpeg-ish");
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_output_file_still_succeeds() {
        // The documented tool quirk: diagnostics plus nonzero status, yet a
        // usable file is deposited.
        let bytes = run_variant(
            Path::new("/bin/sh"),
            &[
                "-c".to_string(),
                format!("printf 'still-usable' > {}; exit 3", OUTPUT_PLACEHOLDER),
            ],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(bytes, b"still-usable");
    }

    #[tokio::test]
    async fn test_no_output_file_is_a_fault() {
        let fault = run_variant(
            Path::new("/bin/sh"),
            &["-c".to_string(), "exit 0".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(fault.detail.contains("no output file"));
    }

    #[tokio::test]
    async fn test_timed_out_child_is_killed_and_output_removed() {
        use crate::models::telemetry::FaultKind;

        // The child records where it wrote, deposits a file, then hangs;
        // the variant must kill it at the bound and remove the deposit.
        let dir = tempfile::tempdir().unwrap();
        let note = dir.path().join("output-path");
        let fault = run_variant(
            Path::new("/bin/sh"),
            &[
                "-c".to_string(),
                format!(
                    "echo {} > {}; printf 'partial' > {}; sleep 5",
                    OUTPUT_PLACEHOLDER,
                    note.display(),
                    OUTPUT_PLACEHOLDER
                ),
            ],
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert_eq!(fault.kind, FaultKind::Timeout);

        let recorded = std::fs::read_to_string(&note).unwrap();
        assert!(!Path::new(recorded.trim()).exists());
    }
}

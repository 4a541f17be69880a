use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

use crate::models::telemetry::{FaultDescriptor, FaultKind};

/// One entry of the ordered capture strategy list.
#[derive(Debug, Clone)]
pub struct CaptureAttempt {
    /// Short name used in logs ("in-process", "external (default)", ...).
    pub label: String,
    pub kind: AttemptKind,
    /// Hard bound on this attempt. On expiry the attempt is abandoned and
    /// the chain moves on.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum AttemptKind {
    /// Drive the lazily-acquired camera handle and encode in process.
    InProcess,
    /// Run one command-line variant of the external capture tool. The args
    /// are fully substituted except for the temp output path, which the
    /// executor allocates per attempt.
    ExternalTool { program: PathBuf, args: Vec<String> },
}

impl CaptureAttempt {
    pub fn in_process(timeout: Duration) -> Self {
        Self {
            label: "in-process".to_string(),
            kind: AttemptKind::InProcess,
            timeout,
        }
    }

    pub fn external(label: &str, program: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            label: format!("external ({})", label),
            kind: AttemptKind::ExternalTool { program, args },
            timeout,
        }
    }
}

/// Executes one capture attempt. The chain below is the only caller; it
/// awaits each attempt to completion (or timeout) before the next, so an
/// executor is free to hold mutable hardware state.
pub trait AttemptExecutor {
    async fn execute(&mut self, attempt: &CaptureAttempt) -> Result<Vec<u8>, FaultDescriptor>;
}

/// Walk the ordered attempt list, short-circuiting on the first success.
///
/// Each attempt runs under its own timeout; a timeout or fault is logged
/// and the chain moves to the next strategy. When every strategy has been
/// exhausted the result is a single `not-found` fault — the caller never
/// sees a partial image.
pub async fn run_capture_chain(
    attempts: &[CaptureAttempt],
    executor: &mut impl AttemptExecutor,
) -> Result<Vec<u8>, FaultDescriptor> {
    let mut last_fault: Option<FaultDescriptor> = None;

    for attempt in attempts {
        debug!("Trying capture strategy: {}.", attempt.label);

        let outcome = tokio::time::timeout(attempt.timeout, executor.execute(attempt)).await;
        match outcome {
            Ok(Ok(bytes)) => {
                debug!(
                    "Capture strategy {} produced {} bytes.",
                    attempt.label,
                    bytes.len()
                );
                return Ok(bytes);
            }
            Ok(Err(fault)) => {
                warn!("Capture strategy {} failed: {}.", attempt.label, fault);
                last_fault = Some(fault);
            }
            Err(_) => {
                warn!(
                    "Capture strategy {} exceeded its {:?} bound, abandoning it.",
                    attempt.label, attempt.timeout
                );
                last_fault = Some(FaultDescriptor::timeout(format!(
                    "{} exceeded its {:?} bound",
                    attempt.label, attempt.timeout
                )));
            }
        }
    }

    let detail = match last_fault {
        Some(fault) => format!("every capture strategy exhausted (last: {})", fault),
        None => "every capture strategy exhausted".to_string(),
    };
    Err(FaultDescriptor::new(FaultKind::NotFound, detail))
}

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::{CaptureConfig, HEIGHT_PLACEHOLDER, WIDTH_PLACEHOLDER};
use crate::externals::camera::{probe_driver, CameraDriver, CaptureMode, DriverFactory};
use crate::models::telemetry::FaultDescriptor;

use super::chain::{run_capture_chain, AttemptExecutor, AttemptKind, CaptureAttempt};
use super::encode::encode_frame;
use super::external::{find_capture_tool, run_variant};

const VARIANT_LABELS: [&str; 3] = ["default", "resolution", "mode"];

/// Owns the single lazily-initialized camera handle and drives the capture
/// strategy chain. Captures are serialized: concurrent requests queue
/// behind the in-flight capture on the slot mutex rather than racing the
/// hardware.
pub struct SnapshotService {
    config: CaptureConfig,
    factory: DriverFactory,
    slot: Mutex<CameraSlot>,
}

#[derive(Default)]
struct CameraSlot {
    driver: Option<Box<dyn CameraDriver>>,
}

impl SnapshotService {
    pub fn new(config: CaptureConfig) -> Self {
        Self::with_factory(config, Box::new(probe_driver))
    }

    /// Inject a driver factory; used by tests and alternative hardware
    /// bindings.
    pub fn with_factory(config: CaptureConfig, factory: DriverFactory) -> Self {
        Self {
            config,
            factory,
            slot: Mutex::new(CameraSlot::default()),
        }
    }

    /// Produce one encoded still image, or a single `not-found` fault once
    /// every strategy is exhausted. Never returns a partial image.
    pub async fn capture_still(&self) -> Result<Vec<u8>, FaultDescriptor> {
        let mut slot = self.slot.lock().await;
        let attempts = self.build_attempts();
        let mut executor = LiveExecutor {
            slot: &mut slot,
            config: &self.config,
            factory: &self.factory,
        };
        run_capture_chain(&attempts, &mut executor).await
    }

    /// Assemble the ordered strategy list for one capture call: the
    /// in-process driver first, then each command-line variant of the
    /// external tool (when one is installed).
    fn build_attempts(&self) -> Vec<CaptureAttempt> {
        let mut attempts = vec![CaptureAttempt::in_process(self.config.attempt_timeout)];

        if let Some(tool) = find_capture_tool(&self.config.tool_candidates) {
            let width = self.config.width.to_string();
            let height = self.config.height.to_string();
            for (index, variant) in self.config.command_variants().into_iter().enumerate() {
                let args: Vec<String> = variant
                    .into_iter()
                    .map(|arg| {
                        arg.replace(WIDTH_PLACEHOLDER, &width)
                            .replace(HEIGHT_PLACEHOLDER, &height)
                    })
                    .collect();
                let label = VARIANT_LABELS
                    .get(index)
                    .copied()
                    .unwrap_or("extra variant");
                attempts.push(CaptureAttempt::external(
                    label,
                    tool.clone(),
                    args,
                    self.config.attempt_timeout,
                ));
            }
        } else {
            debug!("No external capture tool on PATH.");
        }

        attempts
    }
}

struct LiveExecutor<'a> {
    slot: &'a mut CameraSlot,
    config: &'a CaptureConfig,
    factory: &'a DriverFactory,
}

impl LiveExecutor<'_> {
    /// Take the camera handle out of the slot, creating it on first use.
    /// The handle goes back into the slot when its capture finishes; a
    /// capture abandoned at the attempt bound keeps the handle with it, so
    /// the next call re-probes instead of reusing a wedged driver.
    fn take_driver(&mut self) -> Result<(Box<dyn CameraDriver>, bool), FaultDescriptor> {
        if let Some(driver) = self.slot.driver.take() {
            return Ok((driver, false));
        }
        let driver = (self.factory)().ok_or_else(|| {
            FaultDescriptor::hardware_absent("no in-process camera driver available")
        })?;
        Ok((driver, true))
    }

    /// Configure (on first acquisition), capture, and encode on a blocking
    /// thread, so the chain's per-attempt timeout can abandon a stalled
    /// driver transaction. Configuration prefers still mode with a preview
    /// fallback; failure of both leaves the slot empty so a later call may
    /// retry, and is reported as driver-absent for this call.
    async fn capture_in_process(&mut self) -> Result<Vec<u8>, FaultDescriptor> {
        let (mut driver, needs_configure) = self.take_driver()?;
        let width = self.config.width;
        let height = self.config.height;
        let quality = self.config.jpeg_quality;

        let outcome = tokio::task::spawn_blocking(move || {
            if needs_configure {
                if let Err(still_fault) = driver.configure(CaptureMode::Still, width, height) {
                    debug!(
                        "Still configuration failed ({}), retrying preview mode.",
                        still_fault
                    );
                    if let Err(preview_fault) =
                        driver.configure(CaptureMode::Preview, width, height)
                    {
                        return (
                            None,
                            Err(FaultDescriptor::hardware_absent(format!(
                                "camera configuration failed (still: {}; preview: {})",
                                still_fault, preview_fault
                            ))),
                        );
                    }
                }
            }

            let result = driver
                .capture_frame()
                .and_then(|frame| encode_frame(&frame, quality));
            (Some(driver), result)
        })
        .await;

        match outcome {
            Ok((returned, result)) => {
                self.slot.driver = returned;
                result
            }
            Err(e) => Err(FaultDescriptor::hardware_error(format!(
                "in-process capture task failed: {}",
                e
            ))),
        }
    }
}

impl AttemptExecutor for LiveExecutor<'_> {
    async fn execute(&mut self, attempt: &CaptureAttempt) -> Result<Vec<u8>, FaultDescriptor> {
        match &attempt.kind {
            AttemptKind::InProcess => self.capture_in_process().await,
            AttemptKind::ExternalTool { program, args } => {
                run_variant(program, args, attempt.timeout).await
            }
        }
    }
}

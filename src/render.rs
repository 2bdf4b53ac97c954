//! Panel Renderer
//!
//! Renders one image per prompt through the image collaborator. Each panel retries with
//! exponential backoff; panels run on a bounded pool and land in a slot array indexed by
//! panel. Failures are absorbed into `PanelOutcome`s; the caller decides the run with
//! `ThresholdCheck`.

use crate::config::{ImageConfig, RenderConfig};
use crate::error::{PanelDiagnostic, PipelineError};
use crate::provider::{ImageGenerator, ImageRequest};
use crate::types::{ImagePrompt, PanelOutcome, PANEL_COUNT};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Supplies backoff delays
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately (for testing)
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}

/// Exponential backoff schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Final result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Delay after a failed `attempt` (1-based): `base * multiplier^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    pub async fn run<T, E, F, Fut>(&self, sleeper: &dyn Sleeper, op: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.run_while(sleeper, || true, op).await
    }

    /// Like `run`, but no retry is issued once `keep_retrying` returns false. The first
    /// attempt always happens.
    pub async fn run_while<T, E, F, Fut, C>(
        &self,
        sleeper: &dyn Sleeper,
        keep_retrying: C,
        mut op: F,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        C: Fn() -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(err) if attempt < max_attempts && keep_retrying() => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

/// Renders all panels of a strip
pub struct PanelRenderer {
    generator: Arc<dyn ImageGenerator>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
    concurrency: usize,
    min_success: usize,
    short_circuit: bool,
    aspect_ratio: String,
    size: String,
    cache_dir: Option<PathBuf>,
}

impl PanelRenderer {
    pub fn new(generator: Arc<dyn ImageGenerator>, render: &RenderConfig, image: &ImageConfig) -> Self {
        Self {
            generator,
            sleeper: Arc::new(TokioSleeper),
            policy: render.retry_policy(),
            concurrency: render.concurrency,
            min_success: render.min_success,
            short_circuit: render.short_circuit,
            aspect_ratio: image.aspect_ratio.clone(),
            size: image.size.clone(),
            cache_dir: render.panel_cache_dir.clone(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Render every prompt; outcomes come back in ascending panel order.
    pub async fn render_all(&self, prompts: &[ImagePrompt]) -> Vec<PanelOutcome> {
        let total = prompts.len();
        let workers = self.concurrency.clamp(1, PANEL_COUNT).min(total.max(1));
        let slots: Mutex<Vec<Option<PanelOutcome>>> = Mutex::new(vec![None; PANEL_COUNT]);
        let failed = AtomicUsize::new(0);

        info!(panels = total, workers, "Rendering panels");

        let mut pending = prompts.iter();
        let mut in_flight = FuturesUnordered::new();
        for prompt in pending.by_ref().take(workers) {
            in_flight.push(self.render_panel(prompt, total, &failed));
        }
        while let Some(outcome) = in_flight.next().await {
            if !outcome.is_success() {
                failed.fetch_add(1, Ordering::SeqCst);
            }
            let slot = outcome.panel_index.slot();
            let mut guard = slots.lock();
            debug_assert!(guard[slot].is_none(), "panel slot written twice");
            guard[slot] = Some(outcome);
            drop(guard);

            if let Some(prompt) = pending.next() {
                in_flight.push(self.render_panel(prompt, total, &failed));
            }
        }

        slots.into_inner().into_iter().flatten().collect()
    }

    async fn render_panel(&self, prompt: &ImagePrompt, total: usize, failed: &AtomicUsize) -> PanelOutcome {
        let panel = prompt.panel_index;
        let request = ImageRequest {
            prompt: prompt.text.clone(),
            reference_image: self.read_reference(prompt),
            aspect_ratio: self.aspect_ratio.clone(),
            size: self.size.clone(),
        };

        let threshold_reachable = || {
            !self.short_circuit
                || total.saturating_sub(failed.load(Ordering::SeqCst)) >= self.min_success
        };

        let generator = &self.generator;
        let request = &request;
        let outcome = self
            .policy
            .run_while(self.sleeper.as_ref(), threshold_reachable, move |attempt| async move {
                debug!(panel = %panel, attempt, "Requesting panel image");
                let generated = generator.generate(request).await.map_err(|e| e.to_string())?;
                let decoded = image::load_from_memory(&generated.bytes)
                    .map_err(|e| format!("reply is not a decodable image: {}", e))?;
                debug!(
                    panel = %panel,
                    attempt,
                    mime_type = generated.mime_type.as_deref().unwrap_or("unknown"),
                    width = decoded.width(),
                    height = decoded.height(),
                    "Received panel image"
                );
                Ok::<_, String>((generated.bytes, decoded))
            })
            .await;

        match outcome.result {
            Ok((bytes, decoded)) => {
                info!(panel = %panel, attempts = outcome.attempts, "Panel rendered");
                self.cache_panel(prompt, &decoded);
                PanelOutcome::success(panel, bytes, outcome.attempts)
            }
            Err(err) => {
                warn!(panel = %panel, attempts = outcome.attempts, error = %err, "Panel failed");
                PanelOutcome::failed(panel, outcome.attempts, err)
            }
        }
    }

    fn read_reference(&self, prompt: &ImagePrompt) -> Option<Vec<u8>> {
        let path = prompt.reference_file.as_ref()?;
        match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(
                    panel = %prompt.panel_index,
                    path = %path.display(),
                    error = %e,
                    "Reference image unreadable, rendering without it"
                );
                None
            }
        }
    }

    fn cache_panel(&self, prompt: &ImagePrompt, image: &DynamicImage) {
        let Some(dir) = &self.cache_dir else {
            return;
        };
        let path = dir.join(format!("panel_{}.png", prompt.panel_index));
        let result = std::fs::create_dir_all(dir)
            .map_err(|e| e.to_string())
            .and_then(|_| {
                image
                    .save_with_format(&path, ImageFormat::Png)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to cache panel");
        }
    }
}

pub fn count_successes(outcomes: &[PanelOutcome]) -> usize {
    outcomes.iter().filter(|o| o.is_success()).count()
}

pub fn diagnostics(outcomes: &[PanelOutcome]) -> Vec<PanelDiagnostic> {
    outcomes
        .iter()
        .map(|o| PanelDiagnostic {
            panel: o.panel_index,
            succeeded: o.is_success(),
            attempts: o.attempts,
            last_error: o.last_error.clone(),
        })
        .collect()
}

/// Partial-failure threshold for a run
#[derive(Debug, Clone, Copy)]
pub struct ThresholdCheck {
    pub min_success: usize,
}

impl ThresholdCheck {
    pub fn new(min_success: usize) -> Self {
        Self { min_success }
    }

    /// Number of successful panels, or `Threshold` when too few rendered.
    pub fn evaluate(&self, outcomes: &[PanelOutcome]) -> Result<usize, PipelineError> {
        let succeeded = count_successes(outcomes);
        if succeeded < self.min_success {
            return Err(PipelineError::Threshold {
                succeeded,
                required: self.min_success,
                total: outcomes.len(),
                panels: diagnostics(outcomes),
            });
        }
        Ok(succeeded)
    }
}

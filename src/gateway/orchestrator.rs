//! End-to-end draw pipeline
//!
//! ```text
//! Idle → CooldownCheck → ConcurrencyCheck → PreFilter → Optimizing
//!      → PostFilter → Generating → Downloading → Done
//! ```
//!
//! Any stage can end in an abort. The concurrency gate is held only from
//! Optimizing through Downloading, and the cooldown is recorded only on Done.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::backend::registry::BackendRegistry;
use crate::backend::traits::{GeneratedImage, ImageBackend};
use crate::config::{DrawConfig, OptimizerFailurePolicy, Settings};
use crate::error::{AppError, FilterStage, Result};
use crate::gateway::control::DrawControl;
use crate::gateway::cooldown::CooldownTracker;
use crate::gateway::gate::ConcurrencyGate;
use crate::gateway::request::{DrawInput, GenerationRequest, GenerationResult};
use crate::prompt::filter::ContentFilter;
use crate::prompt::optimizer::PromptOptimizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    CooldownCheck,
    ConcurrencyCheck,
    PreFilter,
    Optimizing,
    PostFilter,
    Generating,
    Downloading,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::CooldownCheck => "cooldown_check",
            PipelineStage::ConcurrencyCheck => "concurrency_check",
            PipelineStage::PreFilter => "pre_filter",
            PipelineStage::Optimizing => "optimizing",
            PipelineStage::PostFilter => "post_filter",
            PipelineStage::Generating => "generating",
            PipelineStage::Downloading => "downloading",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Composes cooldown, gate, filter, optimizer and backends into one request flow
pub struct Orchestrator {
    registry: Arc<BackendRegistry>,
    control: Arc<DrawControl>,
    optimizer: PromptOptimizer,
    on_optimizer_failure: OptimizerFailurePolicy,
    filter: ContentFilter,
    cooldown: CooldownTracker,
    gate: ConcurrencyGate,
    draw: DrawConfig,
    deadline: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        settings: &Settings,
        registry: Arc<BackendRegistry>,
        control: Arc<DrawControl>,
    ) -> Result<Self> {
        let optimizer = PromptOptimizer::new(&settings.optimizer)?;

        // Backends registered outside the config are not covered by the derived
        // budget; set draw.pipeline_deadline_ms for those.
        let deadline = match settings.draw.pipeline_deadline_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => settings
                .providers
                .iter()
                .map(|p| p.generate_budget())
                .max()
                .map(|slowest_provider| optimizer.budget() + slowest_provider),
        }
        .filter(|d| !d.is_zero());
        debug!(
            deadline_ms = ?deadline.map(|d| d.as_millis() as u64),
            optimizer = optimizer.is_enabled(),
            "Pipeline configured"
        );

        Ok(Self {
            registry,
            control,
            optimizer,
            on_optimizer_failure: settings.optimizer.on_failure,
            filter: ContentFilter::from_config(&settings.content_filter),
            cooldown: CooldownTracker::new(Duration::from_secs(settings.draw.cooldown_secs)),
            gate: ConcurrencyGate::new(),
            draw: settings.draw.clone(),
            deadline,
        })
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Run one request through the whole pipeline
    pub async fn draw(&self, input: DrawInput) -> Result<GenerationResult> {
        let started = Instant::now();

        if !self.control.is_enabled() {
            info!(user_id = %input.user_id, "Drawing disabled, rejecting request");
            return Err(AppError::DrawingDisabled);
        }

        let request = GenerationRequest::build(input, &self.draw, &self.control.default_service())?;
        let span = info_span!(
            "draw",
            request_id = %request.id(),
            user_id = %request.user_id(),
            service = %request.service(),
        );

        async {
            info!(prompt = %request.raw_prompt(), size = %request.size(), steps = request.steps(), "Handling draw request");
            let outcome = self.run(&request, started).await;
            match &outcome {
                Ok(result) => info!(
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    bytes = result.image_bytes.len(),
                    "Request completed"
                ),
                Err(e) => info!(reason = e.abort_reason(), error = %e, "Request aborted"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: &GenerationRequest, started: Instant) -> Result<GenerationResult> {
        self.enter(PipelineStage::CooldownCheck);
        self.cooldown.check(request.user_id())?;

        self.enter(PipelineStage::ConcurrencyCheck);
        if self.gate.is_busy() {
            return Err(AppError::ConcurrencyBusy);
        }

        self.enter(PipelineStage::PreFilter);
        self.check_content(request.raw_prompt(), FilterStage::Raw)?;

        let backend = self.registry.resolve(request.service())?;

        // Someone may have taken the gate since the peek above
        let guard = self.gate.try_enter().ok_or(AppError::ConcurrencyBusy)?;

        let locked = self.generate_locked(request, backend);
        let (optimized_prompt, image) = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, locked).await {
                Ok(outcome) => outcome?,
                Err(_) => {
                    warn!(deadline_ms = deadline.as_millis() as u64, "Pipeline deadline exceeded");
                    return Err(AppError::Timeout(format!(
                        "pipeline exceeded {}ms",
                        deadline.as_millis()
                    )));
                }
            },
            None => locked.await?,
        };

        self.enter(PipelineStage::Done);
        self.cooldown.record_success(request.user_id());
        drop(guard);

        Ok(GenerationResult {
            request_id: request.id(),
            image_bytes: image.bytes,
            inference_secs: image.inference_secs,
            original_prompt: request.raw_prompt().to_string(),
            optimized_prompt,
            size: request.size().to_string(),
            steps: request.steps(),
            service: request.service().to_string(),
            elapsed: started.elapsed(),
            generated_at: Utc::now(),
        })
    }

    /// The part of the pipeline that runs while holding the gate
    async fn generate_locked(
        &self,
        request: &GenerationRequest,
        backend: Arc<dyn ImageBackend>,
    ) -> Result<(String, GeneratedImage)> {
        self.enter(PipelineStage::Optimizing);
        let optimized = match self.optimizer.optimize(request.raw_prompt()).await {
            Ok(prompt) => prompt,
            Err(e) => match self.on_optimizer_failure {
                OptimizerFailurePolicy::Abort => return Err(e),
                OptimizerFailurePolicy::FallbackToRaw => {
                    warn!(error = %e, "Optimization failed, using raw prompt");
                    request.raw_prompt().to_string()
                }
            },
        };

        self.enter(PipelineStage::PostFilter);
        self.check_content(&optimized, FilterStage::Optimized)?;

        self.enter(PipelineStage::Generating);
        let image = backend
            .generate(&optimized, request.size(), request.steps())
            .await
            .map_err(|e| {
                if matches!(e, AppError::DownloadFailed { .. }) {
                    warn!(stage = %PipelineStage::Downloading, error = %e, "Download failed");
                } else {
                    warn!(stage = %PipelineStage::Generating, error = %e, "Generation failed");
                }
                e
            })?;

        Ok((optimized, image))
    }

    fn check_content(&self, text: &str, stage: FilterStage) -> Result<()> {
        if let Some(keyword) = self.filter.first_match(text) {
            info!(stage = %stage, keyword = %keyword, "Prompt rejected by content filter");
            return Err(AppError::ContentRejected { stage });
        }
        Ok(())
    }

    fn enter(&self, stage: PipelineStage) {
        debug!(stage = %stage, "Pipeline stage");
    }
}

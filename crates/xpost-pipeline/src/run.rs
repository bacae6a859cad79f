//! Job orchestration.
//!
//! One `run` call drives a job end to end: fetch the source, transcode for
//! both platforms and write metadata concurrently, then fan out the two
//! publishes and settle the terminal status at the join barrier.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use xpost_models::{
    GeneratedContent, JobId, JobStatus, Platform, ProgressEvent, PublishJob, StepStatus,
};
use xpost_publish::{PlatformPublisher, PublishRequest};
use xpost_store::JobStore;

use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::seams::{MediaRepository, MetadataSource, ProgressSink, Transcoder, TranscodeOutput};

// Overall percentage at each stage boundary. Values only ever move forward;
// per-platform encode progress is interpolated into the transcode band.
const PCT_ACCEPTED: u8 = 5;
const PCT_TRANSCODED: u8 = 35;
const PCT_GENERATED: u8 = 55;
const PCT_FIRST_PLATFORM: u8 = 78;

/// Everything the orchestrator needs, shared across concurrent stages.
pub struct PipelineContext {
    pub store: Arc<dyn JobStore>,
    pub repository: Arc<dyn MediaRepository>,
    pub transcoder: Arc<dyn Transcoder>,
    pub metadata: Arc<dyn MetadataSource>,
    pub progress: Arc<dyn ProgressSink>,
    pub publishers: Vec<Arc<dyn PlatformPublisher>>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    fn publisher(&self, platform: Platform) -> Option<&Arc<dyn PlatformPublisher>> {
        self.publishers.iter().find(|p| p.platform() == platform)
    }
}

/// Drive one job to a terminal state.
///
/// Never leaves a job non-terminal: any fatal error finalizes it as failed
/// before returning.
pub async fn run(ctx: Arc<PipelineContext>, job_id: JobId) -> PipelineResult<()> {
    let job = ctx
        .store
        .update(&job_id, |j| {
            j.start();
            j.advance_percentage(PCT_ACCEPTED);
        })
        .await?;

    info!(job_id = %job_id, "pipeline started");
    ctx.progress
        .send(
            &job_id,
            &ProgressEvent::step("start", StepStatus::Completed, PCT_ACCEPTED, "Job accepted"),
        )
        .await;

    let work_dir = ctx.config.work_dir.join(job_id.as_str());
    tokio::fs::create_dir_all(&work_dir).await?;

    let outcome = run_stages(&ctx, &job, &work_dir).await;

    if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
        warn!(job_id = %job_id, "failed to clean work dir: {}", e);
    }

    outcome
}

async fn run_stages(
    ctx: &Arc<PipelineContext>,
    job: &PublishJob,
    work_dir: &Path,
) -> PipelineResult<()> {
    let job_id = &job.id;
    let source_path = work_dir.join("source.mp4");

    let step = begin_step(ctx, job_id, "download", "Fetching source video").await?;
    if let Err(e) = ctx
        .repository
        .fetch_source(&job.source.object_key, &source_path)
        .await
    {
        return fail_job(ctx, job_id, &step, format!("source fetch failed: {}", e)).await;
    }
    finish_step(ctx, job_id, &step, StepStatus::Completed, None).await?;

    // Transcodes and metadata generation are independent; run them together.
    let (renders, content) = tokio::join!(
        transcode_stage(ctx, job_id, &source_path, work_dir),
        generate_stage(ctx, job),
    );
    let renders = renders?;

    let content = match content? {
        Some(content) => content,
        None => {
            // Title/description are required by both platforms; without
            // them there is nothing to publish.
            return fail_job_already_stepped(ctx, job_id, "metadata generation failed").await;
        }
    };

    let (instagram_render, youtube_render) = renders;
    tokio::join!(
        publish_platform(ctx, job, Platform::Instagram, instagram_render, &content),
        publish_platform(ctx, job, Platform::Youtube, youtube_render, &content),
    );

    settle(ctx, job_id).await
}

/// Compute and persist the terminal status once both platforms resolved.
async fn settle(ctx: &Arc<PipelineContext>, job_id: &JobId) -> PipelineResult<()> {
    let job = ctx.store.get(job_id).await?;

    let status = match job.terminal_status() {
        Some(status) => status,
        None => {
            // Both branches record an outcome before reaching the barrier;
            // an unresolved platform here is a bug, not a user error.
            error!(job_id = %job_id, "platform outcome missing at join barrier");
            JobStatus::Failed
        }
    };

    let job_error = if status == JobStatus::Failed {
        job.instagram
            .error
            .clone()
            .or_else(|| job.youtube.error.clone())
            .or_else(|| job.first_step_error().map(String::from))
    } else {
        None
    };

    let job = ctx
        .store
        .update(job_id, |j| j.finalize(status, job_error))
        .await?;

    info!(job_id = %job_id, status = %job.status, "pipeline finished");
    ctx.progress
        .send(job_id, &ProgressEvent::job_finished(job_id.clone(), job.status))
        .await;
    Ok(())
}

/// Transcode for both platforms concurrently, interpolating encode progress
/// into the 5-35 band. A failed transcode fails only its platform.
async fn transcode_stage(
    ctx: &Arc<PipelineContext>,
    job_id: &JobId,
    source: &Path,
    work_dir: &Path,
) -> PipelineResult<(Option<TranscodeOutput>, Option<TranscodeOutput>)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(Platform, u8)>();

    let forwarder = {
        let store = ctx.store.clone();
        let progress = ctx.progress.clone();
        let job_id = job_id.clone();
        tokio::spawn(async move {
            let per_platform = Mutex::new([0u8; 2]);
            let mut last_overall = PCT_ACCEPTED;

            while let Some((platform, pct)) = rx.recv().await {
                let avg = {
                    let mut state = match per_platform.lock() {
                        Ok(state) => state,
                        Err(_) => break,
                    };
                    state[platform_index(platform)] = pct.min(100);
                    (u16::from(state[0]) + u16::from(state[1])) / 2
                };
                let span = u16::from(PCT_TRANSCODED - PCT_ACCEPTED);
                let overall = PCT_ACCEPTED + (avg * span / 100) as u8;
                if overall <= last_overall {
                    continue;
                }
                last_overall = overall;

                // Events always carry the document's percentage, which the
                // monotonic guard keeps non-decreasing across racing stages.
                let doc_pct = match store
                    .update(&job_id, |j| j.advance_percentage(overall))
                    .await
                {
                    Ok(job) => job.overall_percentage,
                    Err(e) => {
                        warn!(job_id = %job_id, "failed to persist progress: {}", e);
                        continue;
                    }
                };
                progress
                    .send(
                        &job_id,
                        &ProgressEvent::step_with_data(
                            "transcode",
                            StepStatus::Running,
                            doc_pct,
                            "Transcoding",
                            serde_json::json!({
                                "platform": platform.as_str(),
                                "encodePercentage": pct,
                            }),
                        ),
                    )
                    .await;
            }
        })
    };

    let (instagram, youtube) = tokio::join!(
        transcode_one(ctx, job_id, source, work_dir, Platform::Instagram, tx.clone()),
        transcode_one(ctx, job_id, source, work_dir, Platform::Youtube, tx),
    );
    // Sender halves are dropped; the forwarder drains and exits.
    let _ = forwarder.await;

    ctx.store
        .update(job_id, |j| j.advance_percentage(PCT_TRANSCODED))
        .await?;

    Ok((instagram?, youtube?))
}

async fn transcode_one(
    ctx: &Arc<PipelineContext>,
    job_id: &JobId,
    source: &Path,
    work_dir: &Path,
    platform: Platform,
    progress: mpsc::UnboundedSender<(Platform, u8)>,
) -> PipelineResult<Option<TranscodeOutput>> {
    let step = begin_step(
        ctx,
        job_id,
        format!("transcode:{}", platform),
        format!("Transcoding for {}", platform),
    )
    .await?;

    match ctx
        .transcoder
        .transcode(source, work_dir, platform, progress)
        .await
    {
        Ok(output) => {
            let status = if output.duration_warning.is_some() {
                StepStatus::Warning
            } else {
                StepStatus::Completed
            };
            finish_step(ctx, job_id, &step, status, output.duration_warning.clone()).await?;
            Ok(Some(output))
        }
        Err(e) => {
            let message = format!("transcode failed: {}", e);
            warn!(job_id = %job_id, platform = %platform, "{}", message);
            ctx.store
                .update(job_id, |j| {
                    j.finish_step(&step, StepStatus::Failed, Some(message.clone()));
                    j.platform_mut(platform).fail(&message);
                })
                .await?;
            ctx.progress
                .send(job_id, &ProgressEvent::platform_failed(platform, &message))
                .await;
            Ok(None)
        }
    }
}

/// Generate metadata. Returns `None` on fatal failure (title/description).
async fn generate_stage(
    ctx: &Arc<PipelineContext>,
    job: &PublishJob,
) -> PipelineResult<Option<GeneratedContent>> {
    let job_id = &job.id;
    let step = begin_step(ctx, job_id, "generate", "Writing platform metadata").await?;

    match ctx
        .metadata
        .generate(&job.source.brief, &job.provider_config)
        .await
    {
        Ok(outcome) => {
            let status = if outcome.warnings.is_empty() {
                StepStatus::Completed
            } else {
                StepStatus::Warning
            };
            let note = if outcome.warnings.is_empty() {
                None
            } else {
                Some(outcome.warnings.join("; "))
            };

            let content = outcome.content;
            let updated = ctx
                .store
                .update(job_id, |j| {
                    j.set_generated_content(content.clone());
                    j.finish_step(&step, status, note.clone());
                    j.advance_percentage(PCT_GENERATED);
                })
                .await?;
            ctx.progress
                .send(
                    job_id,
                    &ProgressEvent::step(
                        &step,
                        status,
                        updated.overall_percentage,
                        "Metadata ready",
                    ),
                )
                .await;
            Ok(Some(content))
        }
        Err(e) => {
            let message = format!("metadata generation failed: {}", e);
            let updated = ctx
                .store
                .update(job_id, |j| {
                    j.finish_step(&step, StepStatus::Failed, Some(message.clone()))
                })
                .await?;
            ctx.progress
                .send(
                    job_id,
                    &ProgressEvent::step(
                        &step,
                        StepStatus::Failed,
                        updated.overall_percentage,
                        &message,
                    ),
                )
                .await;
            Ok(None)
        }
    }
}

/// Publish one platform's render. Records the outcome on the job; errors
/// here fail only this platform.
async fn publish_platform(
    ctx: &Arc<PipelineContext>,
    job: &PublishJob,
    platform: Platform,
    render: Option<TranscodeOutput>,
    content: &GeneratedContent,
) {
    let job_id = &job.id;
    let render = match render {
        Some(render) => render,
        // Transcode already failed this platform.
        None => return,
    };

    if let Err(e) = try_publish(ctx, job, platform, &render, content).await {
        let message = e.to_string();
        warn!(job_id = %job_id, platform = %platform, "publish failed: {}", message);
        if let Err(e) = ctx
            .store
            .update(job_id, |j| j.platform_mut(platform).fail(&message))
            .await
        {
            error!(job_id = %job_id, "failed to record publish failure: {}", e);
        }
        ctx.progress
            .send(job_id, &ProgressEvent::platform_failed(platform, message))
            .await;
    }
}

async fn try_publish(
    ctx: &Arc<PipelineContext>,
    job: &PublishJob,
    platform: Platform,
    render: &TranscodeOutput,
    content: &GeneratedContent,
) -> PipelineResult<()> {
    let job_id = &job.id;

    let step = begin_step(
        ctx,
        job_id,
        format!("publish:{}", platform),
        format!("Publishing to {}", platform),
    )
    .await?;
    ctx.store
        .update(job_id, |j| j.platform_mut(platform).start())
        .await?;

    let result: PipelineResult<_> = async {
        let object_key = xpost_storage::render_key(job_id, platform);
        ctx.repository.store_render(&render.path, &object_key).await?;
        let video_url = ctx.repository.presign(&object_key).await?;

        let publisher = ctx
            .publisher(platform)
            .ok_or_else(|| crate::error::PipelineError::stage(format!(
                "no publisher registered for {}",
                platform
            )))?;

        let request = PublishRequest {
            owner_id: job.owner_id.clone(),
            video_path: render.path.clone(),
            video_url,
            content: content.clone(),
        };
        Ok(publisher.publish(&request).await?)
    }
    .await;

    match result {
        Ok(media) => {
            let updated = ctx
                .store
                .update(job_id, |j| {
                    j.platform_mut(platform)
                        .complete(&media.external_id, &media.external_url);
                    j.finish_step(&step, StepStatus::Completed, None);
                    j.advance_percentage(PCT_FIRST_PLATFORM);
                })
                .await?;
            info!(job_id = %job_id, platform = %platform, external_id = %media.external_id, "published");
            ctx.progress
                .send(
                    job_id,
                    &ProgressEvent::platform_published(
                        platform,
                        &media.external_id,
                        &media.external_url,
                    ),
                )
                .await;
            ctx.progress
                .send(
                    job_id,
                    &ProgressEvent::step(
                        &step,
                        StepStatus::Completed,
                        updated.overall_percentage,
                        format!("Published to {}", platform),
                    ),
                )
                .await;
            Ok(())
        }
        Err(e) => {
            let message = e.to_string();
            ctx.store
                .update(job_id, |j| {
                    j.finish_step(&step, StepStatus::Failed, Some(message.clone()))
                })
                .await?;
            Err(e)
        }
    }
}

/// Fail the whole job from a named step.
async fn fail_job(
    ctx: &Arc<PipelineContext>,
    job_id: &JobId,
    step: &str,
    message: String,
) -> PipelineResult<()> {
    let updated = ctx
        .store
        .update(job_id, |j| {
            j.finish_step(step, StepStatus::Failed, Some(message.clone()))
        })
        .await?;
    ctx.progress
        .send(
            job_id,
            &ProgressEvent::step(
                step,
                StepStatus::Failed,
                updated.overall_percentage,
                &message,
            ),
        )
        .await;
    fail_job_already_stepped(ctx, job_id, &message).await
}

/// Fail the whole job when the failing step is already closed.
async fn fail_job_already_stepped(
    ctx: &Arc<PipelineContext>,
    job_id: &JobId,
    message: &str,
) -> PipelineResult<()> {
    let message = message.to_string();
    let job = ctx
        .store
        .update(job_id, |j| {
            for platform in Platform::all() {
                j.platform_mut(platform).fail(&message);
            }
            j.finalize(JobStatus::Failed, Some(message.clone()));
        })
        .await?;

    info!(job_id = %job_id, "pipeline failed: {}", message);
    ctx.progress
        .send(job_id, &ProgressEvent::job_finished(job_id.clone(), job.status))
        .await;
    Ok(())
}

async fn begin_step(
    ctx: &Arc<PipelineContext>,
    job_id: &JobId,
    step: impl Into<String>,
    message: impl Into<String>,
) -> PipelineResult<String> {
    let step = step.into();
    let job = ctx
        .store
        .update(job_id, |j| {
            j.begin_step(&step);
        })
        .await?;
    ctx.progress
        .send(
            job_id,
            &ProgressEvent::step(
                &step,
                StepStatus::Running,
                job.overall_percentage,
                message.into(),
            ),
        )
        .await;
    Ok(step)
}

async fn finish_step(
    ctx: &Arc<PipelineContext>,
    job_id: &JobId,
    step: &str,
    status: StepStatus,
    note: Option<String>,
) -> PipelineResult<()> {
    let job = ctx
        .store
        .update(job_id, |j| j.finish_step(step, status, note.clone()))
        .await?;
    ctx.progress
        .send(
            job_id,
            &ProgressEvent::step(
                step,
                status,
                job.overall_percentage,
                note.unwrap_or_default(),
            ),
        )
        .await;
    Ok(())
}

fn platform_index(platform: Platform) -> usize {
    match platform {
        Platform::Instagram => 0,
        Platform::Youtube => 1,
    }
}

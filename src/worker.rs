//! Worker loop for transcription tasks
//!
//! The worker claims one task at a time from the task bridge, downloads its audio file,
//! transcribes it while reporting progress, reports the result and removes the scratch file.
//! Only one task is processed at a time so the model can use all available resources.
//!
//! Per task: claimed → downloaded → transcribed (or failed) → reported → cleaned up.

use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

use crate::config::{defaults, RunMetadata, WorkerConfig};
use crate::error::WorkerError;
use crate::file_utils;
use crate::models::{CompletionReport, Segment, TakeRequest, TaskResult, TranscriptionOutcome};
use crate::task_bridge::TaskBridge;
use crate::transcriber::{TranscribeError, Transcriber, TranscriptionInfo};

/// Segments buffered between the model thread and the progress reporter.
/// Kept small so progress reports trail the model by at most a few segments.
const SEGMENT_CHANNEL_CAPACITY: usize = 4;

/// Tracks progress of a single task
///
/// Reported values never decrease and stay within 0..=100, whatever the model produces.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress after a segment ending at `segment_end` in audio of `duration` seconds
    pub fn advance(&mut self, segment_end: f64, duration: f64) -> u8 {
        let percent = if duration > 0.0 && segment_end.is_finite() {
            (segment_end * 100.0 / duration).round().clamp(0.0, 100.0) as u8
        } else {
            0
        };
        self.last = self.last.max(percent);
        self.last
    }
}

/// Worker processing transcription tasks
pub struct Worker {
    config: WorkerConfig,
    bridge: Arc<dyn TaskBridge>,
    transcriber: Arc<dyn Transcriber>,
    metadata: RunMetadata,
}

impl Worker {
    pub fn new(
        config: WorkerConfig,
        bridge: Arc<dyn TaskBridge>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        let mut metadata = config.run_metadata();
        metadata.library = transcriber.library().to_string();
        Self {
            config,
            bridge,
            transcriber,
            metadata,
        }
    }

    /// Run until `shutdown` turns true.
    ///
    /// Every iteration that processes no task is followed by the poll interval.
    /// A task in progress is always finished before the loop stops.
    pub async fn run_until(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Ready and waiting for action");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let task_was_processed = match self.check_and_process().await {
                Ok(processed) => processed,
                Err(e) => {
                    error!("Worker iteration failed: {}", e);
                    false
                }
            };

            if !task_was_processed && self.pause(&mut shutdown).await {
                break;
            }
        }

        info!("Worker stopped");
    }

    /// Sleep for the poll interval. Returns true if shutdown was requested meanwhile.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.config.poll_interval);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return *shutdown.borrow(),
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => return true,
                    Ok(()) => continue,
                    // Nobody can ask us to stop any more
                    Err(_) => {
                        sleep.await;
                        return false;
                    }
                },
            }
        }
    }

    /// Claim and process at most one task.
    ///
    /// Returns `Ok(false)` when no task was available. Once a task is claimed it is always
    /// reported, with an error result if the download or the transcription failed.
    pub async fn check_and_process(&self) -> Result<bool, WorkerError> {
        let start_time = Instant::now();

        let request = TakeRequest {
            task_type: defaults::TASK_TYPE.to_string(),
            worker: self.config.worker.clone(),
        };
        let Some(task) = self.bridge.take(&request).await? else {
            debug!("No task available");
            return Ok(false);
        };

        info!("Took task {}", task.id);
        match serde_json::to_string_pretty(&task) {
            Ok(json) => debug!("{}", json),
            Err(e) => debug!("Task {} cannot be printed: {}", task.id, e),
        }

        let (outcome, scratch_file) = match self.download(&task.id).await {
            Ok(path) => (self.transcribe(&task.id, &path).await, Some(path)),
            Err((e, path)) => {
                error!("Failed to download file for task {}: {}", task.id, e);
                (TranscriptionOutcome::Failed(e.to_string()), path)
            }
        };

        let report = CompletionReport {
            result: TaskResult::new(
                outcome,
                start_time.elapsed().as_secs_f64(),
                &self.metadata,
            ),
        };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => debug!("{}", json),
            Err(e) => debug!("Report for task {} cannot be printed: {}", task.id, e),
        }

        info!("Reporting result for task {}", task.id);
        let reported = self.bridge.complete(&task.id, &report).await;

        // Only after the report went out
        if let Some(path) = scratch_file {
            file_utils::remove_scratch_file(&path);
        }

        reported?;
        info!("Task {} done", task.id);
        Ok(true)
    }

    /// Download the task's audio file into the scratch directory.
    ///
    /// On failure the path is returned alongside the error if a partial file may exist.
    async fn download(&self, task_id: &str) -> Result<PathBuf, (WorkerError, Option<PathBuf>)> {
        let path = file_utils::scratch_path(&self.config.temp_dir, task_id).map_err(|e| (e, None))?;

        match self.bridge.fetch_file(task_id, &path).await {
            Ok(bytes) => {
                info!("Downloaded {} bytes for task {}", bytes, task_id);
                Ok(path)
            }
            Err(e) => Err((e.into(), Some(path))),
        }
    }

    /// Transcribe the scratch file, reporting progress for every segment.
    ///
    /// The model runs on a blocking thread and hands segments over as it produces them, so
    /// progress is reported while the transcription is still running.
    async fn transcribe(&self, task_id: &str, audio_file: &Path) -> TranscriptionOutcome {
        info!("Transcribing task {}", task_id);

        let (info_tx, info_rx) = tokio::sync::oneshot::channel::<TranscriptionInfo>();
        let (segment_tx, mut segment_rx) = mpsc::channel::<Segment>(SEGMENT_CHANNEL_CAPACITY);
        let transcriber = Arc::clone(&self.transcriber);
        let audio_file = audio_file.to_path_buf();

        let model = tokio::task::spawn_blocking(move || -> Result<(), TranscribeError> {
            let transcription = transcriber.transcribe(&audio_file)?;
            if info_tx.send(transcription.info).is_err() {
                return Ok(());
            }
            for segment in transcription.segments {
                if segment_tx.blocking_send(segment?).is_err() {
                    break;
                }
            }
            Ok(())
        });

        let mut segments = Vec::new();
        // The sender is dropped without a value when the model fails before describing the audio
        let info = info_rx.await.ok();

        if let Some(info) = &info {
            debug!(
                "Task {}: language {}, {:.1}s of audio",
                task_id, info.language, info.duration
            );
            let mut progress = ProgressTracker::new();
            while let Some(segment) = segment_rx.recv().await {
                let percent = progress.advance(segment.end, info.duration);
                if let Err(e) = self.bridge.report_progress(task_id, percent).await {
                    warn!("Failed to report progress for task {}: {}", task_id, e);
                }
                segments.push(segment);
            }
        }

        let finished = match model.await {
            Ok(result) => result,
            Err(e) => Err(TranscribeError::Aborted(e.to_string())),
        };

        match (finished, info) {
            (Ok(()), Some(info)) => {
                info!("Transcribed task {}: {} segments", task_id, segments.len());
                TranscriptionOutcome::Transcribed {
                    language: info.language,
                    segments,
                }
            }
            (Ok(()), None) => TranscriptionOutcome::Failed(TranscribeError::MissingInfo.to_string()),
            (Err(e), _) => {
                error!("Transcription of task {} failed: {}", task_id, e);
                TranscriptionOutcome::Failed(e.to_string())
            }
        }
    }
}

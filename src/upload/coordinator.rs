//! Upload session state machine
//!
//! One [`UploadCoordinator`] drives one session at a time. Objects at or below the
//! chunking threshold go up in a single request; larger objects are split into blocks,
//! uploaded concurrently with per-block retry, and committed in ascending block order.
//! Every session ends with exactly one terminal [`ProgressEvent`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::limiter::ConcurrencyLimiter;
use super::planner::{BlockPlanner, BlockStatus, MIN_ADAPT_SAMPLES};
use super::progress::{percentage, ProgressEvent, SessionState};
use super::retry::RetryPolicy;
use super::source::UploadObject;
use super::speed::SpeedTracker;
use crate::config::UploadConfig;
use crate::error::{UploadError, UploadResult};
use crate::storage::StorageClient;
use crate::utils::format::{format_file_size, format_speed};

/// Block-size adaptation only runs for uploads with more blocks than this
const ADAPT_MIN_BLOCK_COUNT: usize = 10;

/// Outcome of a completed session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub blob_name: String,
    pub object_size: u64,
    /// Blocks staged and committed; 1 for single-request uploads
    pub block_count: usize,
    pub elapsed: Duration,
    /// Block size the next chunked session will use
    pub next_block_size: u64,
}

/// Store object name for a local file: `{unix_millis}-{file_name}`
pub fn blob_name_for(file_name: &str) -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), file_name)
}

/// State visible to callers other than the task running `start`
struct SessionShared {
    state: SessionState,
    cancel: Option<CancellationToken>,
    last_progress: Option<ProgressEvent>,
}

/// Per-session bookkeeping owned by the task running `start`
struct Session {
    events: UnboundedSender<ProgressEvent>,
    cancel: CancellationToken,
    blob_name: String,
    started_at: Instant,
    percentage: u8,
}

pub struct UploadCoordinator<C: StorageClient> {
    client: Arc<C>,
    config: UploadConfig,
    retry: RetryPolicy,
    planner: Mutex<BlockPlanner>,
    shared: Mutex<SessionShared>,
}

impl<C: StorageClient> UploadCoordinator<C> {
    pub fn new(client: Arc<C>, config: UploadConfig) -> Self {
        let planner = BlockPlanner::with_bounds(
            config.block_size,
            config.min_block_size,
            config.max_block_size,
        );
        let retry = RetryPolicy::new(config.retry_attempts, config.retry_initial_delay);
        Self {
            client,
            config,
            retry,
            planner: Mutex::new(planner),
            shared: Mutex::new(SessionShared {
                state: SessionState::Idle,
                cancel: None,
                last_progress: None,
            }),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.lock_shared().state
    }

    /// Most recent event of the current or last session
    pub fn last_progress(&self) -> Option<ProgressEvent> {
        self.lock_shared().last_progress.clone()
    }

    /// Block size the next chunked session will be planned with
    pub fn block_size_hint(&self) -> u64 {
        self.lock_planner().block_size()
    }

    /// Reject objects above the configured maximum before any network activity
    pub fn validate_object_size(&self, size: u64) -> UploadResult<()> {
        if size > self.config.max_object_size {
            return Err(UploadError::validation(format!(
                "File is too large. Maximum size is {}.",
                format_file_size(self.config.max_object_size)
            )));
        }
        Ok(())
    }

    /// Cancel the running session. Returns `false` when nothing is uploading, in which
    /// case any stale progress is cleared instead.
    pub fn cancel(&self) -> bool {
        let mut shared = self.lock_shared();
        if shared.state == SessionState::Uploading {
            if let Some(token) = &shared.cancel {
                if !token.is_cancelled() {
                    info!("Cancelling upload");
                }
                token.cancel();
            }
            true
        } else {
            shared.last_progress = None;
            false
        }
    }

    /// Upload `object`, streaming progress to `events`.
    ///
    /// Fails with `SessionActive` without emitting anything while another session is
    /// uploading. Otherwise exactly one terminal event is sent before this returns.
    pub async fn start(
        &self,
        object: UploadObject,
        events: UnboundedSender<ProgressEvent>,
    ) -> UploadResult<UploadSummary> {
        let cancel = self.begin_session()?;
        let mut session = Session {
            events,
            cancel,
            blob_name: blob_name_for(&object.name),
            started_at: Instant::now(),
            percentage: 0,
        };

        let result = match self.validate_object_size(object.size()) {
            Ok(()) => {
                info!(
                    "Uploading {} ({}) as {}",
                    object.name,
                    format_file_size(object.size()),
                    session.blob_name
                );
                self.emit_progress(&session, ProgressEvent::uploading(0, None, None));
                if object.size() <= self.config.chunking_threshold {
                    self.upload_single(&mut session, &object).await
                } else {
                    self.upload_chunked(&mut session, &object).await
                }
            }
            Err(e) => Err(e),
        };

        self.finish_session(&session, result)
    }

    fn begin_session(&self) -> UploadResult<CancellationToken> {
        let mut shared = self.lock_shared();
        if shared.state == SessionState::Uploading {
            return Err(UploadError::SessionActive);
        }
        let token = CancellationToken::new();
        shared.state = SessionState::Uploading;
        shared.cancel = Some(token.clone());
        shared.last_progress = None;
        Ok(token)
    }

    /// Send a non-terminal event unless the session has been cancelled
    fn emit_progress(&self, session: &Session, event: ProgressEvent) {
        // Checked under the lock `cancel` takes, so nothing slips out after it returns
        let mut shared = self.lock_shared();
        if session.cancel.is_cancelled() {
            return;
        }
        shared.last_progress = Some(event.clone());
        let _ = session.events.send(event);
    }

    fn finish_session(
        &self,
        session: &Session,
        result: UploadResult<UploadSummary>,
    ) -> UploadResult<UploadSummary> {
        let (state, event) = match &result {
            Ok(summary) => {
                info!(
                    "Upload of {} completed in {}ms",
                    summary.blob_name,
                    summary.elapsed.as_millis()
                );
                (SessionState::Completed, ProgressEvent::completed())
            }
            Err(UploadError::Cancelled) => {
                info!("Upload of {} cancelled", session.blob_name);
                (
                    SessionState::Cancelled,
                    ProgressEvent::cancelled(session.percentage),
                )
            }
            Err(e) => {
                warn!("Upload of {} failed: {}", session.blob_name, e);
                (
                    SessionState::Failed,
                    ProgressEvent::failed(session.percentage, e.to_string()),
                )
            }
        };

        let mut shared = self.lock_shared();
        shared.state = state;
        shared.cancel = None;
        shared.last_progress = Some(event.clone());
        let _ = session.events.send(event);
        result
    }

    async fn upload_single(
        &self,
        session: &mut Session,
        object: &UploadObject,
    ) -> UploadResult<UploadSummary> {
        let size = object.size();
        let data = object.source.read_range(0..size).await?;
        let blob_name = session.blob_name.clone();
        let cancel = session.cancel.clone();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let mut upload = self.client.put_object(
            &blob_name,
            data,
            &object.content_type,
            progress_tx,
            &cancel,
        );

        let mut tracker = SpeedTracker::new(Instant::now());
        let mut bytes_sent = 0u64;
        let result = loop {
            tokio::select! {
                result = &mut upload => break result,
                Some(sent) = progress_rx.recv() => {
                    bytes_sent = (bytes_sent + sent).min(size);
                    tracker.observe(sent, Instant::now());
                    // One event per whole percent
                    let pct = percentage(bytes_sent, size);
                    if pct > session.percentage && !session.cancel.is_cancelled() {
                        session.percentage = pct;
                        let eta = tracker.estimate_remaining(size - bytes_sent);
                        self.emit_progress(
                            session,
                            ProgressEvent::uploading(
                                pct,
                                Some(format_speed(tracker.current_speed())),
                                Some(eta.to_string()),
                            ),
                        );
                    }
                }
            }
        };
        result?;

        session.percentage = 100;
        Ok(UploadSummary {
            blob_name: session.blob_name.clone(),
            object_size: size,
            block_count: 1,
            elapsed: session.started_at.elapsed(),
            next_block_size: self.block_size_hint(),
        })
    }

    async fn upload_chunked(
        &self,
        session: &mut Session,
        object: &UploadObject,
    ) -> UploadResult<UploadSummary> {
        let size = object.size();
        let mut blocks = self.lock_planner().plan_object(size)?;
        let block_count = blocks.len();
        debug!(
            "Planned {} blocks for {} ({} bytes)",
            block_count, session.blob_name, size
        );

        // A failed block stops further dispatch without marking the session cancelled
        let work = session.cancel.child_token();
        let client = self.client.as_ref();
        let retry = &self.retry;
        let source = &object.source;
        let blob_name = session.blob_name.as_str();

        let tasks: Vec<_> = blocks
            .iter()
            .map(|block| {
                let id = block.id.clone();
                let range = block.range.clone();
                let work = &work;
                async move {
                    let started = Instant::now();
                    let data = source.read_range(range).await?;
                    let id = id.as_str();
                    retry
                        .execute(work, || {
                            let data = data.clone();
                            async move { client.put_block(blob_name, id, data, work).await }
                        })
                        .await?;
                    Ok::<_, UploadError>(started.elapsed())
                }
            })
            .collect();

        let mut limiter =
            ConcurrencyLimiter::new(tasks, self.config.max_concurrent_blocks, work.clone());
        let mut tracker = SpeedTracker::new(Instant::now());
        let mut durations = Vec::with_capacity(MIN_ADAPT_SAMPLES);
        let mut bytes_completed = 0u64;
        let mut completed_blocks = 0usize;
        let mut first_error: Option<UploadError> = None;

        loop {
            for index in limiter.dispatch() {
                blocks[index].status = BlockStatus::InFlight;
            }
            let Some((index, outcome)) = limiter.next_completed().await else {
                break;
            };

            match outcome {
                Ok(elapsed) => {
                    let block = &mut blocks[index];
                    block.status = BlockStatus::Done;
                    bytes_completed += block.len();
                    completed_blocks += 1;
                    tracker.observe(block.len(), Instant::now());

                    if durations.len() < MIN_ADAPT_SAMPLES {
                        durations.push(elapsed);
                    }
                    if completed_blocks == MIN_ADAPT_SAMPLES
                        && block_count > ADAPT_MIN_BLOCK_COUNT
                    {
                        self.lock_planner().adapt(&durations);
                    }

                    if first_error.is_none() && !session.cancel.is_cancelled() {
                        session.percentage = percentage(bytes_completed, size);
                        let eta = tracker.estimate_remaining(size - bytes_completed);
                        self.emit_progress(
                            session,
                            ProgressEvent::uploading(
                                session.percentage,
                                Some(format_speed(tracker.current_speed())),
                                Some(eta.to_string()),
                            ),
                        );
                    }
                }
                Err(e) if e.is_cancelled() => {
                    blocks[index].status = BlockStatus::Pending;
                }
                Err(e) => {
                    blocks[index].status = BlockStatus::Failed;
                    warn!("Block {} failed: {}", blocks[index].id, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                        work.cancel();
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if session.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let block_ids: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
        let committed = self
            .retry
            .execute(&session.cancel, || {
                self.client.commit_block_list(
                    blob_name,
                    &block_ids,
                    &object.content_type,
                    &session.cancel,
                )
            })
            .await;
        match committed {
            Ok(()) => {}
            Err(UploadError::Cancelled) => return Err(UploadError::Cancelled),
            Err(e) => {
                return Err(UploadError::Commit {
                    message: e.to_string(),
                })
            }
        }

        session.percentage = 100;
        Ok(UploadSummary {
            blob_name: session.blob_name.clone(),
            object_size: bytes_completed,
            block_count,
            elapsed: session.started_at.elapsed(),
            next_block_size: self.block_size_hint(),
        })
    }

    fn lock_shared(&self) -> MutexGuard<'_, SessionShared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_planner(&self) -> MutexGuard<'_, BlockPlanner> {
        self.planner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

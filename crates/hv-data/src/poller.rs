//! Ingestion job submission and status polling

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hv_core::events::events::JobStatusChanged;
use hv_core::events::EventBus;
use hv_core::{IngestClient, JobStatus, Upload};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::SyncError;

type CompletionHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Lifecycle of the current ingestion job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Uploading { file_name: String },
    /// Submitted; `status` is the last non-terminal status reported
    Active { job_id: String, status: JobStatus },
    Finished { job_id: String },
    Failed { job_id: String },
    Error { job_id: Option<String>, message: String },
}

impl JobState {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            JobState::Active { job_id, .. }
            | JobState::Finished { job_id }
            | JobState::Failed { job_id } => Some(job_id),
            JobState::Error { job_id, .. } => job_id.as_deref(),
            JobState::Idle | JobState::Uploading { .. } => None,
        }
    }

    /// Status as the ingestion endpoint names it, if a job exists
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            JobState::Active { status, .. } => Some(*status),
            JobState::Finished { .. } => Some(JobStatus::Finished),
            JobState::Failed { .. } => Some(JobStatus::Failed),
            JobState::Error { .. } => Some(JobStatus::Error),
            JobState::Idle | JobState::Uploading { .. } => None,
        }
    }

    /// Validate a move to `next`, returning it when allowed
    pub fn transition(&self, next: JobState) -> Result<JobState, SyncError> {
        use JobState::*;

        let allowed = match (self, &next) {
            (Idle | Finished { .. } | Failed { .. } | Error { .. }, Uploading { .. }) => true,
            (Uploading { .. }, Active { .. } | Error { .. }) => true,
            (Active { job_id: from, .. }, Active { job_id: to, .. })
            | (Active { job_id: from, .. }, Finished { job_id: to })
            | (Active { job_id: from, .. }, Failed { job_id: to }) => from == to,
            (Active { .. }, Error { .. } | Idle) => true,
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(SyncError::JobTransition(format!("{:?} -> {:?}", self, next)))
        }
    }
}

/// What the UI shows for the current job
#[derive(Debug, Clone)]
pub struct JobView {
    pub state: JobState,
    /// Full log list from the latest poll
    pub logs: Vec<String>,
    pub polls: u32,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl Default for JobView {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            logs: Vec::new(),
            polls: 0,
            last_polled_at: None,
        }
    }
}

/// Result of [`JobPoller::start`]
#[derive(Debug)]
pub enum StartOutcome {
    /// Nothing selected; no request was made
    NoFile,
    /// The upload was refused; the message is the job's only log line
    Rejected(String),
    /// Polling task for the accepted job; resolves to its final state
    Polling(JoinHandle<JobState>),
}

/// Submits uploads and polls the resulting job until it settles
pub struct JobPoller {
    client: Arc<dyn IngestClient>,
    events: Arc<EventBus>,
    interval: Duration,
    max_failures: u32,
    view: Arc<RwLock<JobView>>,
    on_complete: Option<CompletionHook>,
    poll_token: Mutex<Option<CancellationToken>>,
}

impl JobPoller {
    pub fn new(client: Arc<dyn IngestClient>, config: &SyncConfig) -> Self {
        Self {
            client,
            events: Arc::new(EventBus::new()),
            interval: config.poll_interval(),
            max_failures: config.max_poll_failures.max(1),
            view: Arc::new(RwLock::new(JobView::default())),
            on_complete: None,
            poll_token: Mutex::new(None),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Called with the job id once per job that reaches `finished`
    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(hook));
        self
    }

    pub fn view(&self) -> JobView {
        self.view.read().clone()
    }

    pub fn state(&self) -> JobState {
        self.view.read().state.clone()
    }

    pub fn logs(&self) -> Vec<String> {
        self.view.read().logs.clone()
    }

    /// Submit `upload` and start polling its job
    pub async fn start(&self, upload: Option<&Upload>) -> Result<StartOutcome, SyncError> {
        let Some(upload) = upload else {
            debug!("no file selected, nothing to upload");
            return Ok(StartOutcome::NoFile);
        };

        {
            let mut view = self.view.write();
            view.state = view.state.transition(JobState::Uploading {
                file_name: upload.file_name.clone(),
            })?;
        }

        match self.client.submit(upload).await {
            Ok(ticket) => {
                info!(file = %upload.file_name, job_id = %ticket.job_id, "upload accepted");
                {
                    let mut view = self.view.write();
                    view.state = view.state.transition(JobState::Active {
                        job_id: ticket.job_id.clone(),
                        status: JobStatus::Pending,
                    })?;
                    view.logs.clear();
                    view.polls = 0;
                    view.last_polled_at = None;
                }
                Ok(StartOutcome::Polling(self.poll(ticket.job_id)))
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(file = %upload.file_name, error = %message, "upload rejected");
                let mut view = self.view.write();
                view.state = view.state.transition(JobState::Error {
                    job_id: None,
                    message: message.clone(),
                })?;
                view.logs = vec![message.clone()];
                Ok(StartOutcome::Rejected(message))
            }
        }
    }

    /// Spawn the polling task for `job_id`, cancelling any earlier one
    fn poll(&self, job_id: String) -> JoinHandle<JobState> {
        let token = CancellationToken::new();
        if let Some(previous) = self.poll_token.lock().replace(token.clone()) {
            previous.cancel();
        }

        let client = self.client.clone();
        let view = self.view.clone();
        let events = self.events.clone();
        let on_complete = self.on_complete.clone();
        let interval = self.interval;
        let max_failures = self.max_failures;

        tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let result = tokio::select! {
                    _ = token.cancelled() => break,
                    result = client.job(&job_id) => result,
                };

                let snapshot = match result {
                    Ok(snapshot) => {
                        failures = 0;
                        snapshot
                    }
                    Err(e) => {
                        failures += 1;
                        let message = format!("{:#}", e);
                        warn!(job_id = %job_id, failures, error = %message, "job status fetch failed");
                        if failures >= max_failures {
                            let mut view = view.write();
                            match view.state.transition(JobState::Error {
                                job_id: Some(job_id.clone()),
                                message: message.clone(),
                            }) {
                                Ok(next) => {
                                    view.state = next;
                                    view.logs.push(message);
                                }
                                Err(e) => debug!(error = %e, "job moved on while polling"),
                            }
                            break;
                        }
                        continue;
                    }
                };

                let status = snapshot.status;
                let next = match status {
                    JobStatus::Finished => JobState::Finished { job_id: job_id.clone() },
                    JobStatus::Failed => JobState::Failed { job_id: job_id.clone() },
                    status => JobState::Active { job_id: job_id.clone(), status },
                };

                let log_lines = snapshot.logs.len();
                {
                    let mut view = view.write();
                    match view.state.transition(next) {
                        Ok(next) => view.state = next,
                        Err(e) => {
                            debug!(error = %e, "job moved on while polling");
                            break;
                        }
                    }
                    view.logs = snapshot.logs;
                    view.polls += 1;
                    view.last_polled_at = Some(Utc::now());
                }

                debug!(job_id = %job_id, status = %status, log_lines, "job polled");
                events.publish(JobStatusChanged {
                    job_id: job_id.clone(),
                    status,
                    log_lines,
                });

                match status {
                    JobStatus::Finished => {
                        info!(job_id = %job_id, "ingestion finished");
                        if let Some(hook) = &on_complete {
                            hook(&job_id);
                        }
                        break;
                    }
                    JobStatus::Failed => {
                        warn!(job_id = %job_id, "ingestion failed");
                        break;
                    }
                    _ => {}
                }
            }

            let state = view.read().state.clone();
            state
        })
    }

    /// Stop polling; an active job goes back to idle
    pub fn cancel(&self) {
        if let Some(token) = self.poll_token.lock().take() {
            token.cancel();
        }
        let mut view = self.view.write();
        if let JobState::Active { job_id, .. } = &view.state {
            info!(job_id = %job_id, "polling cancelled");
            view.state = JobState::Idle;
        }
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        if let Some(token) = self.poll_token.lock().take() {
            token.cancel();
        }
    }
}

//! Background work triggered by message ingestion.
//!
//! Each stored message enqueues an analysis job and an auto-reply job on a
//! bounded queue. A dispatcher runs at most `worker_count` jobs at once, and
//! shutdown drains what was already accepted before the timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::config::WorkerConfig;
use parley_core::domain::conversation::{ConversationId, Message, NewMessage};
use parley_core::domain::TenantId;
use parley_core::errors::StoreError;
use parley_core::store::{ConversationStore, MessageSink};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::analysis::ConversationAnalyzer;
use crate::auto_reply::{AutoReplyDecisionService, AutoReplyOutcome};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerJob {
    Analyze { tenant_id: TenantId, conversation_id: ConversationId },
    AutoReply { tenant_id: TenantId, conversation_id: ConversationId },
}

impl TriggerJob {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Analyze { .. } => "analyze",
            Self::AutoReply { .. } => "auto_reply",
        }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("trigger queue is full")]
    QueueFull,
    #[error("trigger pool is shutting down")]
    ShuttingDown,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: TriggerJob);
}

/// Cloneable, non-blocking enqueue side of the trigger queue.
#[derive(Clone, Debug)]
pub struct TriggerHandle {
    sender: mpsc::Sender<TriggerJob>,
    closed: Arc<AtomicBool>,
}

impl TriggerHandle {
    pub fn enqueue(&self, job: TriggerJob) -> Result<(), TriggerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TriggerError::ShuttingDown);
        }

        self.sender.try_send(job).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => TriggerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TriggerError::ShuttingDown,
        })
    }
}

/// Receiving side, handed to [`TriggerPool::start`].
pub struct TriggerQueue {
    receiver: mpsc::Receiver<TriggerJob>,
    closed: Arc<AtomicBool>,
}

/// Creates the queue first so producers can exist before the pool's handler.
pub fn trigger_queue(capacity: usize) -> (TriggerHandle, TriggerQueue) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let closed = Arc::new(AtomicBool::new(false));
    (TriggerHandle { sender, closed: closed.clone() }, TriggerQueue { receiver, closed })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Drained { jobs_processed: u64 },
    TimedOut,
    DispatcherFailed,
}

pub struct TriggerPool {
    closed: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    dispatcher: JoinHandle<u64>,
}

impl TriggerPool {
    pub fn start(queue: TriggerQueue, handler: Arc<dyn JobHandler>, worker_count: usize) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let closed = queue.closed.clone();
        let limit = Arc::new(Semaphore::new(worker_count.max(1)));
        let dispatcher = tokio::spawn(dispatch(queue.receiver, handler, limit, shutdown_rx));

        info!(event_name = "triggers.started", worker_count, "trigger pool started");
        Self { closed, shutdown, dispatcher }
    }

    /// Stops intake, runs every already-queued job, then waits for in-flight
    /// jobs. Anything still running at `drain_timeout` is aborted.
    pub async fn shutdown(self, drain_timeout: Duration) -> ShutdownOutcome {
        self.closed.store(true, Ordering::Release);
        let _ = self.shutdown.send(true);

        let mut dispatcher = self.dispatcher;
        match tokio::time::timeout(drain_timeout, &mut dispatcher).await {
            Ok(Ok(jobs_processed)) => {
                info!(event_name = "triggers.drained", jobs_processed, "trigger pool drained");
                ShutdownOutcome::Drained { jobs_processed }
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "triggers.dispatcher_failed",
                    error = %error,
                    "trigger dispatcher task failed"
                );
                ShutdownOutcome::DispatcherFailed
            }
            Err(_) => {
                dispatcher.abort();
                warn!(
                    event_name = "triggers.drain_timeout",
                    timeout_ms = drain_timeout.as_millis() as u64,
                    "aborting background jobs still running at drain timeout"
                );
                ShutdownOutcome::TimedOut
            }
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<TriggerJob>,
    handler: Arc<dyn JobHandler>,
    limit: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut in_flight = JoinSet::new();
    let mut spawned = 0_u64;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            next = receiver.recv() => match next {
                Some(job) => {
                    spawn_job(&mut in_flight, &handler, &limit, job).await;
                    spawned += 1;
                }
                None => break,
            },
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    receiver.close();
    while let Some(job) = receiver.recv().await {
        spawn_job(&mut in_flight, &handler, &limit, job).await;
        spawned += 1;
    }

    while in_flight.join_next().await.is_some() {}
    spawned
}

/// Waits for a free worker slot, which is what makes a saturated pool fill
/// the queue and reject new jobs.
async fn spawn_job(
    in_flight: &mut JoinSet<()>,
    handler: &Arc<dyn JobHandler>,
    limit: &Arc<Semaphore>,
    job: TriggerJob,
) {
    let Ok(permit) = limit.clone().acquire_owned().await else {
        return;
    };
    let handler = handler.clone();
    in_flight.spawn(async move {
        let _permit = permit;
        debug!(event_name = "triggers.job.started", kind = job.kind(), "running background job");
        handler.handle(job).await;
    });
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TriggerPoolSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub drain_timeout: Duration,
}

impl From<&WorkerConfig> for TriggerPoolSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            queue_capacity: config.queue_capacity,
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
        }
    }
}

/// Runs analysis and auto-reply jobs; failures are logged, never propagated.
pub struct AssistJobHandler {
    analyzer: Arc<ConversationAnalyzer>,
    auto_reply: Arc<AutoReplyDecisionService>,
}

impl AssistJobHandler {
    pub fn new(
        analyzer: Arc<ConversationAnalyzer>,
        auto_reply: Arc<AutoReplyDecisionService>,
    ) -> Self {
        Self { analyzer, auto_reply }
    }
}

#[async_trait]
impl JobHandler for AssistJobHandler {
    async fn handle(&self, job: TriggerJob) {
        match &job {
            TriggerJob::Analyze { tenant_id, conversation_id } => {
                if let Err(error) = self.analyzer.analyze(tenant_id, conversation_id).await {
                    warn!(
                        event_name = "analysis.failed",
                        tenant_id = %tenant_id.0,
                        conversation_id = %conversation_id.0,
                        error = %error,
                        "conversation analysis failed"
                    );
                }
            }
            TriggerJob::AutoReply { tenant_id, conversation_id } => {
                match self.auto_reply.process_auto_reply(tenant_id, conversation_id).await {
                    Ok(AutoReplyOutcome::Sent { .. } | AutoReplyOutcome::Skipped { .. }) => {}
                    Err(error) => warn!(
                        event_name = "auto_reply.failed",
                        tenant_id = %tenant_id.0,
                        conversation_id = %conversation_id.0,
                        error = %error,
                        "auto-reply skipped after storage failure"
                    ),
                }
            }
        }
    }
}

/// Message write path: store first, then trigger background jobs.
pub struct Ingestion {
    conversations: Arc<dyn ConversationStore>,
    triggers: TriggerHandle,
}

impl Ingestion {
    pub fn new(conversations: Arc<dyn ConversationStore>, triggers: TriggerHandle) -> Self {
        Self { conversations, triggers }
    }

    fn trigger(&self, job: TriggerJob) {
        let kind = job.kind();
        if let Err(error) = self.triggers.enqueue(job) {
            warn!(
                event_name = "triggers.enqueue_rejected",
                kind,
                error = %error,
                "background job dropped; message was stored"
            );
        }
    }
}

#[async_trait]
impl MessageSink for Ingestion {
    async fn send_message(
        &self,
        tenant_id: &TenantId,
        conversation_id: &ConversationId,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        let stored =
            self.conversations.append_message(tenant_id, conversation_id, message).await?;

        self.trigger(TriggerJob::Analyze {
            tenant_id: tenant_id.clone(),
            conversation_id: conversation_id.clone(),
        });
        self.trigger(TriggerJob::AutoReply {
            tenant_id: tenant_id.clone(),
            conversation_id: conversation_id.clone(),
        });

        Ok(stored)
    }
}

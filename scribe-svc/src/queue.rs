//! Task-queue serializer
//!
//! Every mutating or model-bound operation goes through one scheduler
//! owning a bounded queue and a single worker task, so operations execute
//! strictly one at a time in submission order, system-wide. Submitters
//! park on a per-operation reply slot; the worker folds handler errors
//! into the reply rather than dying. Shutdown fails everything still
//! queued promptly after the in-flight operation finishes.

use crate::qna::QueryPipeline;
use crate::store::{ChatHistoryStore, TranscriptStore};
use crate::summary::Summarizer;
use crate::tracker::{MinuteTracker, Verdict};
use scribe_common::api::types::GlossaryAction;
use scribe_common::db::models::{ChatChannel, MeetingDetails};
use scribe_common::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

const QUEUE_CAPACITY: usize = 64;

/// One queued unit of work.
#[derive(Debug)]
pub enum Operation {
    UpdateAgenda {
        minutes_id: String,
        agenda: Vec<String>,
    },
    TrackMinutes {
        minutes_id: String,
        topic_id: String,
        topic_title: Option<String>,
        minutes: String,
        abbreviation: Option<String>,
    },
    UpdateMeeting {
        minutes_id: String,
        details: MeetingDetails,
    },
    DeleteTopic {
        minutes_id: String,
        topic_id: String,
    },
    UpdateGlossary {
        minutes_id: String,
        abbreviation: String,
        meaning: String,
        action: GlossaryAction,
    },
    ClearChat {
        chat_history_id: String,
        channel: ChatChannel,
    },
    WebQuery {
        chat_history_id: String,
        question: String,
    },
    Summarise {
        minutes_id: String,
        topic_id: String,
    },
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::UpdateAgenda { .. } => "update_agenda",
            Operation::TrackMinutes { .. } => "track_minutes",
            Operation::UpdateMeeting { .. } => "update_meeting",
            Operation::DeleteTopic { .. } => "delete_topic",
            Operation::UpdateGlossary { .. } => "update_glossary",
            Operation::ClearChat { .. } => "clear_chat",
            Operation::WebQuery { .. } => "web_query",
            Operation::Summarise { .. } => "summarise",
        }
    }
}

/// Per-operation result delivered back to the submitter.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutput {
    Done,
    Verdict(Verdict),
    Answer(String),
    Summary(String),
}

struct QueuedOp {
    correlation_id: Uuid,
    op: Operation,
    reply: oneshot::Sender<Result<OpOutput>>,
}

/// Everything the worker needs to execute operations.
pub struct WorkerDeps {
    pub transcript: TranscriptStore,
    pub history: ChatHistoryStore,
    pub tracker: MinuteTracker,
    pub qna: Arc<QueryPipeline>,
    pub summarizer: Summarizer,
}

pub struct Scheduler {
    tx: mpsc::Sender<QueuedOp>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spawn the worker and return the handle used to submit work.
    pub fn spawn(deps: WorkerDeps) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(worker_loop(rx, deps, shutdown.clone()));
        Arc::new(Self {
            tx,
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Enqueue one operation and park until its result is ready.
    pub async fn submit(&self, op: Operation) -> Result<OpOutput> {
        let correlation_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        debug!(%correlation_id, op = op.name(), "Queueing operation");

        self.tx
            .send(QueuedOp { correlation_id, op, reply: reply_tx })
            .await
            .map_err(|_| Error::Queue("scheduler is not accepting operations".to_string()))?;

        reply_rx
            .await
            .map_err(|_| Error::Queue("operation abandoned during shutdown".to_string()))?
    }

    /// Stop the worker. The in-flight operation finishes; everything
    /// still queued fails with a queue error.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Scheduler worker panicked: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}

async fn worker_loop(
    mut rx: mpsc::Receiver<QueuedOp>,
    deps: WorkerDeps,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                rx.close();
                while let Ok(queued) = rx.try_recv() {
                    let _ = queued.reply.send(Err(Error::Queue(
                        "scheduler shut down before execution".to_string(),
                    )));
                }
                break;
            }

            queued = rx.recv() => {
                let Some(queued) = queued else { break };
                debug!(correlation_id = %queued.correlation_id, op = queued.op.name(),
                    "Executing operation");
                let result = execute(&deps, queued.op).await;
                if let Err(e) = &result {
                    debug!(correlation_id = %queued.correlation_id, "Operation failed: {}", e);
                }
                // Submitter may have given up; nothing to do then
                let _ = queued.reply.send(result);
            }
        }
    }
}

async fn execute(deps: &WorkerDeps, op: Operation) -> Result<OpOutput> {
    match op {
        Operation::UpdateAgenda { minutes_id, agenda } => {
            deps.transcript.set_agenda(&minutes_id, &agenda).await?;
            Ok(OpOutput::Done)
        }
        Operation::TrackMinutes { minutes_id, topic_id, topic_title, minutes, abbreviation } => {
            let verdict = deps
                .tracker
                .track(
                    &minutes_id,
                    &topic_id,
                    topic_title.as_deref(),
                    &minutes,
                    abbreviation.as_deref(),
                )
                .await?;
            Ok(OpOutput::Verdict(verdict))
        }
        Operation::UpdateMeeting { minutes_id, details } => {
            deps.transcript.set_meeting_details(&minutes_id, &details).await?;
            Ok(OpOutput::Done)
        }
        Operation::DeleteTopic { minutes_id, topic_id } => {
            deps.transcript.delete_topic(&minutes_id, &topic_id).await?;
            Ok(OpOutput::Done)
        }
        Operation::UpdateGlossary { minutes_id, abbreviation, meaning, action } => {
            deps.transcript
                .update_glossary(&minutes_id, &abbreviation, &meaning, action)
                .await?;
            Ok(OpOutput::Done)
        }
        Operation::ClearChat { chat_history_id, channel } => {
            deps.history.clear(&chat_history_id, channel).await?;
            Ok(OpOutput::Done)
        }
        Operation::WebQuery { chat_history_id, question } => {
            let answer = deps.qna.answer_web_full(&chat_history_id, &question).await?;
            Ok(OpOutput::Answer(answer))
        }
        Operation::Summarise { minutes_id, topic_id } => {
            let summary = deps.summarizer.summarise(&minutes_id, &topic_id).await?;
            Ok(OpOutput::Summary(summary))
        }
    }
}

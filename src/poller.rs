//! Interview poller — the scheduled entry point of the pipeline.
//!
//! Each tick enumerates active workflows and, for each one, drives
//! credential resolution → mailbox search → fetch/normalize → conversation
//! store → AI dispatch. Failures are isolated per workflow and per
//! message: nothing a single item does aborts its siblings, and anything
//! left in `pending` state is naturally retried on a later tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::credentials::{AccessCredential, CredentialResolver};
use crate::dispatch::AnalysisDispatcher;
use crate::error::Error;
use crate::mailbox::content::{extract_address, extract_new_content};
use crate::mailbox::MailboxClient;
use crate::store::{ConversationRecord, Database, InterviewWorkflow, NewConversation, ProcessState};

/// Delay between invocation-level retries of a failed tick.
const TICK_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Collaborators, injected explicitly so tests can substitute fakes.
pub struct PollerDeps {
    pub store: Arc<dyn Database>,
    pub resolver: Arc<dyn CredentialResolver>,
    pub mailbox: Arc<dyn MailboxClient>,
    pub dispatcher: Arc<dyn AnalysisDispatcher>,
}

/// Counters for one tick, surfaced in the tick log line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub workflows_polled: usize,
    pub workflows_skipped: usize,
    pub messages_seen: usize,
    pub conversations_created: usize,
    pub conversations_processed: usize,
    pub message_failures: usize,
}

/// What happened to one message id within a tick.
enum MessageOutcome {
    /// Record already processed on an earlier tick.
    AlreadyProcessed,
    /// Dispatch confirmed; record is now processed.
    Processed { newly_created: bool },
    /// Record exists but dispatch did not confirm; retried next tick.
    Pending { newly_created: bool, error: Error },
}

/// The scheduled orchestrator.
pub struct InterviewPoller {
    deps: PollerDeps,
    config: PollerConfig,
}

impl InterviewPoller {
    pub fn new(deps: PollerDeps, config: PollerConfig) -> Self {
        Self { deps, config }
    }

    /// Run a single poll tick over all active workflows.
    ///
    /// Returns `Err` only when the workflow listing itself fails —
    /// everything past that point is isolated per item.
    pub async fn run_tick(&self) -> Result<TickSummary, Error> {
        let workflows = self.deps.store.list_active_workflows().await?;

        let mut summary = TickSummary::default();
        if workflows.is_empty() {
            return Ok(summary);
        }

        debug!(count = workflows.len(), "Polling active workflows");

        for workflow in &workflows {
            self.process_workflow(workflow, &mut summary).await;
        }

        Ok(summary)
    }

    /// Process one workflow; failures skip it without touching siblings.
    async fn process_workflow(&self, workflow: &InterviewWorkflow, summary: &mut TickSummary) {
        let credential = match self.deps.resolver.resolve(&workflow.recruiter_id).await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(
                    workflow_id = %workflow.id,
                    recruiter_id = %workflow.recruiter_id,
                    error = %e,
                    "Credential resolution failed — skipping workflow this tick"
                );
                summary.workflows_skipped += 1;
                return;
            }
        };

        let message_ids = match self
            .deps
            .mailbox
            .search(&credential, &workflow.participants(), self.config.search_cap)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    workflow_id = %workflow.id,
                    error = %e,
                    "Mailbox search failed — skipping workflow this tick"
                );
                summary.workflows_skipped += 1;
                return;
            }
        };

        summary.workflows_polled += 1;

        for message_id in &message_ids {
            summary.messages_seen += 1;
            match self.process_message(workflow, &credential, message_id).await {
                Ok(MessageOutcome::AlreadyProcessed) => {}
                Ok(MessageOutcome::Processed { newly_created }) => {
                    if newly_created {
                        summary.conversations_created += 1;
                    }
                    summary.conversations_processed += 1;
                }
                Ok(MessageOutcome::Pending {
                    newly_created,
                    error,
                }) => {
                    if newly_created {
                        summary.conversations_created += 1;
                    }
                    summary.message_failures += 1;
                    warn!(
                        workflow_id = %workflow.id,
                        message_id = %message_id,
                        error = %error,
                        "Dispatch not confirmed — conversation left pending"
                    );
                }
                Err(e) => {
                    summary.message_failures += 1;
                    error!(
                        workflow_id = %workflow.id,
                        message_id = %message_id,
                        error = %e,
                        "Message processing failed — will retry next tick"
                    );
                }
            }
        }
    }

    /// Drive one message id through the conversation state machine.
    ///
    /// `unseen → pending → processed`; `processed` is terminal and a
    /// later sighting is a no-op.
    async fn process_message(
        &self,
        workflow: &InterviewWorkflow,
        credential: &AccessCredential,
        message_id: &str,
    ) -> Result<MessageOutcome, Error> {
        let existing = self
            .deps
            .store
            .find_conversation_by_message_id(message_id)
            .await?;

        let (record, newly_created) = match existing {
            Some(record) if record.state == ProcessState::Processed => {
                debug!(message_id, "Conversation already processed — skipping");
                return Ok(MessageOutcome::AlreadyProcessed);
            }
            Some(record) => {
                // A prior tick created the record but never confirmed
                // dispatch. Retry against the existing record.
                debug!(message_id, conversation_id = %record.id, "Retrying pending conversation");
                (record, false)
            }
            None => (
                self.ingest_message(workflow, credential, message_id).await?,
                true,
            ),
        };

        match self
            .deps
            .dispatcher
            .dispatch(&record.id, &workflow.id, message_id)
            .await
        {
            Ok(()) => {
                self.deps
                    .store
                    .mark_conversation_processed(&record.id)
                    .await?;
                Ok(MessageOutcome::Processed { newly_created })
            }
            Err(e) => Ok(MessageOutcome::Pending {
                newly_created,
                error: e.into(),
            }),
        }
    }

    /// Fetch, normalize, and persist a newly observed message.
    async fn ingest_message(
        &self,
        workflow: &InterviewWorkflow,
        credential: &AccessCredential,
        message_id: &str,
    ) -> Result<ConversationRecord, Error> {
        let raw = self.deps.mailbox.fetch(credential, message_id).await?;

        let fields = NewConversation {
            workflow_id: workflow.id.clone(),
            message_id: message_id.to_string(),
            recipient: raw.header("To").unwrap_or_default().to_string(),
            sender: extract_address(raw.header("From").unwrap_or_default()),
            subject: raw.header("Subject").unwrap_or_default().to_string(),
            content: extract_new_content(&raw.body),
        };

        match self.deps.store.insert_conversation(fields).await {
            Ok(record) => Ok(record),
            Err(crate::error::StoreError::Constraint(_)) => {
                // Lost a create race with an overlapping tick. The row
                // exists now; adopt it instead of failing the message.
                self.deps
                    .store
                    .find_conversation_by_message_id(message_id)
                    .await?
                    .ok_or_else(|| {
                        crate::error::StoreError::NotFound {
                            entity: "conversation".into(),
                            id: message_id.into(),
                        }
                        .into()
                    })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Spawn the fixed-interval poll ticker.
///
/// Returns a `JoinHandle` and a shutdown flag. A tick whose listing fails
/// outright is retried up to `tick_retries` times before waiting for the
/// next interval; per-item failures never trigger these retries.
pub fn spawn_poll_ticker(poller: Arc<InterviewPoller>) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        let interval_secs = poller.config.poll_interval_secs;
        let retries = poller.config.tick_retries;
        info!("Interview poller started — polling every {interval_secs}s");

        let mut tick = tokio::time::interval(Duration::from_secs(interval_secs));

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Interview poller shutting down");
                return;
            }

            run_tick_with_retries(&poller, retries).await;
        }
    });

    (handle, shutdown_flag)
}

/// Run one tick, retrying invocation-level failures a bounded number of
/// times.
async fn run_tick_with_retries(poller: &InterviewPoller, retries: u32) {
    for attempt in 0..=retries {
        match poller.run_tick().await {
            Ok(summary) => {
                if summary != TickSummary::default() {
                    info!(
                        workflows = summary.workflows_polled,
                        skipped = summary.workflows_skipped,
                        messages = summary.messages_seen,
                        created = summary.conversations_created,
                        processed = summary.conversations_processed,
                        failures = summary.message_failures,
                        "Poll tick complete"
                    );
                }
                return;
            }
            Err(e) if attempt < retries => {
                warn!(attempt = attempt + 1, error = %e, "Poll tick failed — retrying");
                tokio::time::sleep(TICK_RETRY_DELAY).await;
            }
            Err(e) => {
                error!(error = %e, "Poll tick abandoned until next interval");
            }
        }
    }
}

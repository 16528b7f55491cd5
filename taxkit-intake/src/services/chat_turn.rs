//! Streaming conversation coordinator
//!
//! Turns one accountant submission into one AI turn, emitting the ordered
//! protocol events (accountant_message → memories? → chunk* → complete)
//! into a channel the SSE handler drains. The turn runs in its own task:
//! a client disconnect drops the channel receiver but never cancels the
//! turn, which always runs to completion and persists its result.
//!
//! Turns are serialized per intake: a second turn cannot begin persisting
//! before the first turn's complete result is durably written, because
//! request dedup depends on reading a consistent document set.

use crate::analysis::{AnalysisProvider, ChatContext, ResponseFragment};
use crate::db;
use crate::models::{ChatStreamEvent, Customer, DetectedMemory, Intake, MessageSender};
use crate::services::intake_state::next_status;
use crate::services::matcher;
use std::collections::HashMap;
use std::sync::Arc;
use taxkit_common::events::{EventBus, IntakeEvent};
use taxkit_common::Result;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Per-intake turn serialization locks
///
/// Lock objects are created on demand and shared by id; the registry only
/// grows by intakes actually chatted on, which is bounded in practice.
#[derive(Clone, Default)]
pub struct TurnLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock object for one intake
    pub async fn for_intake(&self, intake_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(intake_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// One accountant chat submission
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChatTurnInput {
    pub message: String,
    /// Client idempotency token, echoed back on accountant_message so the
    /// optimistic placeholder can be reconciled
    pub client_token: String,
}

/// Assemble the chat context from current intake state
pub(crate) async fn build_chat_context(
    db: &sqlx::SqlitePool,
    intake: &Intake,
    customer: &Customer,
) -> Result<ChatContext> {
    let documents = db::documents::list_for_intake(db, intake.id).await?;
    let firm_notes = db::settings::get_firm_notes(db).await?;

    Ok(ChatContext {
        customer_name: customer.display_name.clone(),
        tax_year: intake.tax_year.clone(),
        documents,
        firm_notes,
        customer_notes: customer.notes.clone(),
    })
}

/// Drop repeated memories (case-insensitive content within a scope)
fn dedupe_memories(memories: Vec<DetectedMemory>) -> Vec<DetectedMemory> {
    let mut seen = std::collections::HashSet::new();
    memories
        .into_iter()
        .filter(|m| seen.insert((m.scope, m.content.trim().to_lowercase())))
        .collect()
}

const UNAVAILABLE_REPLY: &str = "The assistant is unavailable right now, so this message could \
     not be answered. It has been saved with the intake; try again in a little while.";

/// Run one chat turn to completion
///
/// Emits protocol events into `events`; send failures are ignored because
/// the receiver may be gone (client disconnected) while the turn must
/// still persist. Never called while the intake is gated — the handler
/// rejects that before spawning.
#[allow(clippy::too_many_arguments)]
pub async fn run_turn(
    db: sqlx::SqlitePool,
    event_bus: EventBus,
    provider: Arc<dyn AnalysisProvider>,
    turn_locks: TurnLocks,
    intake: Intake,
    customer: Customer,
    input: ChatTurnInput,
    events: mpsc::Sender<ChatStreamEvent>,
) {
    let lock = turn_locks.for_intake(intake.id).await;
    let _guard = lock.lock().await;

    if let Err(e) = run_turn_inner(&db, &event_bus, provider, intake, customer, input, &events).await
    {
        // Persistence failed mid-turn; the stream ends without a complete
        // event and the client treats the turn as failed
        tracing::error!(error = %e, "Chat turn aborted");
    }
}

async fn run_turn_inner(
    db: &sqlx::SqlitePool,
    event_bus: &EventBus,
    provider: Arc<dyn AnalysisProvider>,
    mut intake: Intake,
    customer: Customer,
    input: ChatTurnInput,
    events: &mpsc::Sender<ChatStreamEvent>,
) -> Result<()> {
    // Re-read under the turn lock; an earlier serialized turn may have
    // moved status or documents since the handler loaded this intake
    if let Some(fresh) = db::intakes::get(db, intake.id).await? {
        intake = fresh;
    }

    // History excludes the message being sent; it is persisted next
    let history = db::messages::list_for_intake(db, intake.id).await?;
    let context = build_chat_context(db, &intake, &customer).await?;

    let accountant_message =
        db::messages::insert(db, intake.id, MessageSender::Accountant, &input.message).await?;
    let _ = events
        .send(ChatStreamEvent::AccountantMessage {
            message: accountant_message,
            client_token: input.client_token.clone(),
        })
        .await;

    tracing::info!(
        intake_id = %intake.id,
        client_token = %input.client_token,
        "Chat turn started"
    );

    // Run the provider while forwarding its fragments as protocol events
    let (fragment_tx, mut fragment_rx) = mpsc::channel::<ResponseFragment>(32);
    let respond_future = provider.respond(&history, &input.message, &context, fragment_tx);
    let forward_future = async {
        while let Some(fragment) = fragment_rx.recv().await {
            let event = match fragment {
                ResponseFragment::Memories(detected) => ChatStreamEvent::Memories { detected },
                ResponseFragment::Text(text) => ChatStreamEvent::Chunk { text },
            };
            let _ = events.send(event).await;
        }
    };
    let (outcome, ()) = tokio::join!(respond_future, forward_future);

    match outcome {
        Ok(outcome) => {
            let memories = dedupe_memories(outcome.detected_memories);
            let ai_message =
                db::messages::insert(db, intake.id, MessageSender::Ai, &outcome.reply).await?;

            // Derived document requests pass through dedup before insert
            let mut current_documents = db::documents::list_for_intake(db, intake.id).await?;
            let mut created = Vec::new();
            for request in &outcome.requested_documents {
                if matcher::find_duplicate_request(&current_documents, request).is_some() {
                    tracing::debug!(
                        intake_id = %intake.id,
                        display_name = %request.display_name,
                        "Skipping duplicate document request"
                    );
                    continue;
                }
                let document = db::documents::insert_requested(db, intake.id, request).await?;
                event_bus.emit_lossy(IntakeEvent::DocumentRequested {
                    intake_id: intake.id,
                    document_id: document.id,
                    display_name: document.display_name.clone(),
                    timestamp: chrono::Utc::now(),
                });
                current_documents.push(document.clone());
                created.push(document);
            }

            // New requests may reopen a READY intake
            let new_status = next_status(intake.status, &current_documents, false);
            if new_status != intake.status {
                db::intakes::update_status(db, intake.id, new_status).await?;
                event_bus.emit_lossy(IntakeEvent::IntakeStatusChanged {
                    intake_id: intake.id,
                    old_status: intake.status,
                    new_status,
                    timestamp: chrono::Utc::now(),
                });
                intake.status = new_status;
            }

            event_bus.emit_lossy(IntakeEvent::ChatTurnCompleted {
                intake_id: intake.id,
                message_id: ai_message.id,
                requested_documents: created.len(),
                timestamp: chrono::Utc::now(),
            });

            tracing::info!(
                intake_id = %intake.id,
                message_id = %ai_message.id,
                requests = created.len(),
                memories = memories.len(),
                "Chat turn completed"
            );

            let _ = events
                .send(ChatStreamEvent::Complete {
                    message: ai_message,
                    memories,
                    requested_documents: created,
                })
                .await;
        }
        Err(e) => {
            // Degraded turn: explicitly labeled reply, never fabricated
            // success. The chunk/complete pair keeps the protocol
            // invariant that chunks concatenate to the persisted reply.
            tracing::warn!(intake_id = %intake.id, error = %e, "Chat turn degraded");

            let _ = events
                .send(ChatStreamEvent::Chunk {
                    text: UNAVAILABLE_REPLY.to_string(),
                })
                .await;

            let ai_message =
                db::messages::insert(db, intake.id, MessageSender::Ai, UNAVAILABLE_REPLY).await?;

            event_bus.emit_lossy(IntakeEvent::ChatTurnCompleted {
                intake_id: intake.id,
                message_id: ai_message.id,
                requested_documents: 0,
                timestamp: chrono::Utc::now(),
            });

            let _ = events
                .send(ChatStreamEvent::Complete {
                    message: ai_message,
                    memories: Vec::new(),
                    requested_documents: Vec::new(),
                })
                .await;
        }
    }

    Ok(())
}

//! Upload pipeline
//!
//! Drives one upload batch through store → analyze → extract → match →
//! generate, publishing progress ticks for each step and recomputing the
//! intake status inside the same operation as every document mutation.
//!
//! Analysis failures degrade, they never abort: the upload is preserved as
//! a completed document, the accountant gets an explicitly labeled
//! explanation, and gating state never advances on an uncertified file.

use crate::analysis::{AnalysisProvider, Classification, ResponseFragment};
use crate::db;
use crate::models::{ChatMessage, Customer, Document, Intake, MessageSender};
use crate::services::chat_turn::build_chat_context;
use crate::services::intake_state::{certifies_prior_return, next_status};
use crate::services::matcher::{self, MatchDecision, UploadHints};
use crate::services::progress::ProgressRegistry;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use taxkit_common::events::{EventBus, IntakeEvent, UploadStep};
use taxkit_common::types::IntakeStatus;
use taxkit_common::Result;
use tokio::sync::mpsc;

/// One file received from the upload endpoint
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Result of one upload batch
#[derive(Debug)]
pub struct UploadOutcome {
    /// Documents created or completed by this batch
    pub documents: Vec<Document>,
    /// Narrative chat messages written during processing
    pub messages: Vec<ChatMessage>,
    /// Intake status after reconciliation
    pub status: IntakeStatus,
}

/// Upload pipeline service
pub struct UploadPipeline {
    db: SqlitePool,
    event_bus: EventBus,
    progress: ProgressRegistry,
    provider: Arc<dyn AnalysisProvider>,
    files_folder: PathBuf,
}

impl UploadPipeline {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        progress: ProgressRegistry,
        provider: Arc<dyn AnalysisProvider>,
        files_folder: PathBuf,
    ) -> Self {
        Self {
            db,
            event_bus,
            progress,
            provider,
            files_folder,
        }
    }

    /// Process an upload batch against one intake
    pub async fn process_batch(
        &self,
        intake: &Intake,
        customer: &Customer,
        files: Vec<UploadedFile>,
    ) -> Result<UploadOutcome> {
        let mut intake = intake.clone();
        let mut documents = Vec::new();
        let mut messages = Vec::new();

        tracing::info!(
            intake_id = %intake.id,
            files = files.len(),
            "Processing upload batch"
        );

        for file in files {
            match self
                .process_file(&mut intake, customer, &file)
                .await
            {
                Ok((mut file_documents, mut file_messages)) => {
                    documents.append(&mut file_documents);
                    messages.append(&mut file_messages);
                }
                Err(e) => {
                    self.tick(
                        &intake,
                        customer,
                        UploadStep::Error,
                        100,
                        format!("Processing {} failed: {}", file.file_name, e),
                    );
                    return Err(e);
                }
            }
        }

        Ok(UploadOutcome {
            documents,
            messages,
            status: intake.status,
        })
    }

    async fn process_file(
        &self,
        intake: &mut Intake,
        customer: &Customer,
        file: &UploadedFile,
    ) -> Result<(Vec<Document>, Vec<ChatMessage>)> {
        let mut messages = Vec::new();

        // Store bytes under a content digest
        self.tick(
            intake,
            customer,
            UploadStep::Uploading,
            5,
            format!("Storing {}", file.file_name),
        );
        let file_ref = self.store_file(&file.bytes)?;

        // Re-upload of identical bytes: nothing new to record
        if let Some(existing) = db::documents::find_by_file_ref(&self.db, intake.id, &file_ref).await? {
            tracing::info!(
                intake_id = %intake.id,
                document_id = %existing.id,
                file_name = %file.file_name,
                "Identical file already uploaded; skipping"
            );
            self.tick(
                intake,
                customer,
                UploadStep::Complete,
                100,
                format!("{} was already uploaded", file.file_name),
            );
            return Ok((vec![existing], messages));
        }

        messages.push(
            db::messages::insert(
                &self.db,
                intake.id,
                MessageSender::Accountant,
                &format!("Uploaded {}", file.file_name),
            )
            .await?,
        );

        // Classification; a failure here degrades, it does not abort
        self.tick(
            intake,
            customer,
            UploadStep::Analyzing,
            30,
            format!("Analyzing {}", file.file_name),
        );
        let classification = match self.provider.classify(&file.file_name, &file.bytes).await {
            Ok(classification) => Some(classification),
            Err(e) => {
                tracing::warn!(
                    intake_id = %intake.id,
                    file_name = %file.file_name,
                    error = %e,
                    "Classification unavailable; continuing without it"
                );
                None
            }
        };

        // Structured facts into customer details (upsert by key)
        self.tick(
            intake,
            customer,
            UploadStep::Extracting,
            50,
            "Recording extracted details".to_string(),
        );
        if let Some(classification) = &classification {
            for fact in &classification.extracted_facts {
                let provenance = fact
                    .provenance
                    .as_ref()
                    .and_then(|p| serde_json::to_string(p).ok());
                db::details::upsert(
                    &self.db,
                    intake.id,
                    &fact.category,
                    &fact.label,
                    &fact.value,
                    provenance.as_deref(),
                )
                .await?;
            }
        }

        // Reconciliation
        self.tick(
            intake,
            customer,
            UploadStep::Matching,
            70,
            format!("Matching {}", file.file_name),
        );
        let existing_documents = db::documents::list_for_intake(&self.db, intake.id).await?;
        let hints = UploadHints {
            doc_type: classification.as_ref().and_then(|c| c.doc_type.clone()),
            year: classification.as_ref().and_then(|c| c.year.clone()),
            entity: classification.as_ref().and_then(|c| c.entity.clone()),
        };

        let document = match matcher::decide(&existing_documents, &file.file_name, &hints) {
            MatchDecision::Attach { document_id } => {
                let document =
                    db::documents::mark_completed(&self.db, document_id, &file_ref, None).await?;
                self.event_bus.emit_lossy(IntakeEvent::DocumentCompleted {
                    intake_id: intake.id,
                    document_id: document.id,
                    display_name: document.display_name.clone(),
                    timestamp: chrono::Utc::now(),
                });
                document
            }
            MatchDecision::CreateCompleted => {
                let display_name = display_name_for(&file.file_name, classification.as_ref());
                let document = db::documents::insert_completed(
                    &self.db,
                    intake.id,
                    &display_name,
                    hints.doc_type.as_deref(),
                    hints.year.as_deref(),
                    hints.entity.as_deref(),
                    None,
                    &file_ref,
                )
                .await?;
                self.event_bus.emit_lossy(IntakeEvent::DocumentCompleted {
                    intake_id: intake.id,
                    document_id: document.id,
                    display_name: document.display_name.clone(),
                    timestamp: chrono::Utc::now(),
                });
                document
            }
        };
        let mut documents = vec![document];

        // Gating and narrative
        self.tick(
            intake,
            customer,
            UploadStep::Generating,
            85,
            "Updating intake".to_string(),
        );
        if intake.status == IntakeStatus::AwaitingPriorReturn {
            let certified = classification
                .as_ref()
                .map(|c| certifies_prior_return(c, &intake.tax_year))
                .unwrap_or(false);

            if certified {
                self.set_status(intake, IntakeStatus::Incomplete).await?;
                let (mut generated_documents, mut generated_messages) =
                    self.generate_initial_requests(intake, customer).await?;
                documents.append(&mut generated_documents);
                messages.append(&mut generated_messages);
            } else {
                let explanation =
                    gating_feedback(classification.as_ref(), &intake.tax_year, &file.file_name);
                messages.push(
                    db::messages::insert(&self.db, intake.id, MessageSender::Ai, &explanation)
                        .await?,
                );
            }
        } else if let Some(classification) = &classification {
            if !classification.feedback.trim().is_empty() {
                messages.push(
                    db::messages::insert(
                        &self.db,
                        intake.id,
                        MessageSender::Ai,
                        &classification.feedback,
                    )
                    .await?,
                );
            }
        }

        // Status is recomputed in the same operation as the mutation
        self.recompute_status(intake).await?;

        self.tick(
            intake,
            customer,
            UploadStep::Complete,
            100,
            format!("{} processed", file.file_name),
        );

        Ok((documents, messages))
    }

    /// Certified prior return: ask the analysis provider which documents
    /// the intake still needs, persist the narrative, insert deduped
    /// requests
    async fn generate_initial_requests(
        &self,
        intake: &Intake,
        customer: &Customer,
    ) -> Result<(Vec<Document>, Vec<ChatMessage>)> {
        let mut documents = Vec::new();
        let mut messages = Vec::new();

        let history = db::messages::list_for_intake(&self.db, intake.id).await?;
        let context = build_chat_context(&self.db, intake, customer).await?;
        let prior_year = intake
            .prior_year()
            .map(|y| y.to_string())
            .unwrap_or_else(|| "prior-year".to_string());
        let prompt = format!(
            "The {} return was just accepted. Review what is known and list the documents \
             needed to prepare the {} return, asking for each by name.",
            prior_year, intake.tax_year
        );

        // Fragments are not streamed anywhere for uploads
        let (fragment_tx, fragment_rx) = mpsc::channel::<ResponseFragment>(8);
        drop(fragment_rx);

        match self
            .provider
            .respond(&history, &prompt, &context, fragment_tx)
            .await
        {
            Ok(outcome) => {
                messages.push(
                    db::messages::insert(&self.db, intake.id, MessageSender::Ai, &outcome.reply)
                        .await?,
                );

                let mut current = db::documents::list_for_intake(&self.db, intake.id).await?;
                for request in &outcome.requested_documents {
                    if matcher::find_duplicate_request(&current, request).is_some() {
                        continue;
                    }
                    let document =
                        db::documents::insert_requested(&self.db, intake.id, request).await?;
                    self.event_bus.emit_lossy(IntakeEvent::DocumentRequested {
                        intake_id: intake.id,
                        document_id: document.id,
                        display_name: document.display_name.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                    current.push(document.clone());
                    documents.push(document);
                }
            }
            Err(e) => {
                tracing::warn!(
                    intake_id = %intake.id,
                    error = %e,
                    "Request-list generation unavailable after certification"
                );
                messages.push(
                    db::messages::insert(
                        &self.db,
                        intake.id,
                        MessageSender::Ai,
                        "The prior-year return was accepted. Document analysis is unavailable \
                         right now, so the list of needed documents could not be generated; \
                         send a message once the assistant is back to build it.",
                    )
                    .await?,
                );
            }
        }

        Ok((documents, messages))
    }

    async fn set_status(&self, intake: &mut Intake, new_status: IntakeStatus) -> Result<()> {
        if intake.status == new_status {
            return Ok(());
        }
        db::intakes::update_status(&self.db, intake.id, new_status).await?;
        self.event_bus.emit_lossy(IntakeEvent::IntakeStatusChanged {
            intake_id: intake.id,
            old_status: intake.status,
            new_status,
            timestamp: chrono::Utc::now(),
        });
        tracing::info!(
            intake_id = %intake.id,
            old_status = %intake.status,
            new_status = %new_status,
            "Intake status changed"
        );
        intake.status = new_status;
        Ok(())
    }

    async fn recompute_status(&self, intake: &mut Intake) -> Result<()> {
        let documents = db::documents::list_for_intake(&self.db, intake.id).await?;
        let new_status = next_status(intake.status, &documents, false);
        self.set_status(intake, new_status).await
    }

    /// Store bytes under their sha256 digest; returns the file reference
    fn store_file(&self, bytes: &[u8]) -> Result<String> {
        let digest = hex_digest(bytes);
        let path = self.files_folder.join(&digest);
        if !path.exists() {
            std::fs::create_dir_all(&self.files_folder)?;
            std::fs::write(&path, bytes)?;
        }
        Ok(digest)
    }

    fn tick(
        &self,
        intake: &Intake,
        customer: &Customer,
        step: UploadStep,
        percent: u8,
        detail: String,
    ) {
        self.progress.publish(
            customer.id,
            IntakeEvent::UploadProgress {
                customer_id: customer.id,
                intake_id: intake.id,
                step,
                percent,
                detail,
                timestamp: chrono::Utc::now(),
            },
        );
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Display name for a newly created completed document
fn display_name_for(file_name: &str, classification: Option<&Classification>) -> String {
    if let Some(classification) = classification {
        if let Some(doc_type) = &classification.doc_type {
            let mut name = doc_type.clone();
            if let Some(entity) = classification.entity.as_deref().filter(|e| !e.trim().is_empty())
            {
                name.push_str(&format!(" from {}", entity));
            }
            if let Some(year) = classification.year.as_deref().filter(|y| !y.trim().is_empty()) {
                name.push_str(&format!(" for {}", year));
            }
            return name;
        }
    }
    file_name.to_string()
}

/// Explain to the accountant why a gated intake did not advance
fn gating_feedback(
    classification: Option<&Classification>,
    tax_year: &str,
    file_name: &str,
) -> String {
    let prior_year = tax_year
        .trim()
        .parse::<i32>()
        .map(|y| (y - 1).to_string())
        .unwrap_or_else(|_| "prior-year".to_string());

    match classification {
        None => format!(
            "{} was saved, but document analysis is unavailable, so it could not be verified \
             as the {} return. The intake stays in upload-only mode until a verified {} \
             return is received.",
            file_name, prior_year, prior_year
        ),
        Some(c) if !c.is_valid => format!(
            "{} could not be recognized as a tax document. A {} individual return (Form 1040) \
             is needed before this intake can move forward. {}",
            file_name, prior_year, c.feedback
        ),
        Some(c) => {
            let described = match (&c.doc_type, &c.year) {
                (Some(doc_type), Some(year)) => format!("a {} for {}", doc_type, year),
                (Some(doc_type), None) => format!("a {}", doc_type),
                (None, Some(year)) => format!("a document for {}", year),
                (None, None) => "an unrecognized document".to_string(),
            };
            format!(
                "{} looks like {}, but a {} individual return (Form 1040) is required before \
                 this intake can move forward.",
                file_name, described, prior_year
            )
        }
    }
}

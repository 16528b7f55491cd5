//! Domain models for taxkit-intake

pub mod chat;
pub mod customer;
pub mod document;
pub mod memory;

pub use chat::{ChatMessage, ChatStreamEvent, MessageSender};
pub use customer::{Customer, Intake};
pub use document::{Document, DocumentRequest, Provenance};
pub use memory::{DetectedMemory, DetectedScope, Memory};

//! Document reconciliation matcher
//!
//! Pure decisions, no I/O: given the intake's current document set and one
//! newly uploaded file (plus any structured hints from classification),
//! decide whether the upload fulfills an existing REQUESTED document or
//! becomes a new COMPLETED one. Also answers the dedup question for
//! derived document requests.
//!
//! This is a heuristic, not a cryptographic match. A wrong attach or a
//! spurious new record are acceptable; silently dropping an upload is not.

use crate::models::{Document, DocumentRequest};
use strsim::jaro_winkler;
use taxkit_common::types::DocumentStatus;
use uuid::Uuid;

/// Jaro-Winkler floor for treating two entity names as the same payer
const ENTITY_SIMILARITY_FLOOR: f64 = 0.88;

/// Reconciliation decision for one uploaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchDecision {
    /// An existing REQUESTED document is the same logical document
    Attach { document_id: Uuid },
    /// Nothing outstanding matches; record the upload as a new COMPLETED document
    CreateCompleted,
}

/// Structured hints extracted from the uploaded file
#[derive(Debug, Clone, Default)]
pub struct UploadHints {
    pub doc_type: Option<String>,
    pub year: Option<String>,
    pub entity: Option<String>,
}

/// Normalize a name for comparison: lowercase, strip extension, strip
/// punctuation, collapse whitespace
pub fn normalize_name(name: &str) -> String {
    let stem = match name.rsplit_once('.') {
        // Treat a short trailing segment as an extension; "1099.INT" keeps its tail
        Some((stem, ext)) if ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            stem
        }
        _ => name,
    };

    let mut out = String::with_capacity(stem.len());
    let mut last_was_space = true;
    for c in stem.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Case-insensitive entity overlap: containment either direction, or high
/// string similarity ("Microsoft" vs "Microsoft Corp", not "Micron")
pub fn entities_overlap(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a) || jaro_winkler(&a, &b) >= ENTITY_SIMILARITY_FLOOR
}

fn normalized_eq(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// Filename heuristic: normalized containment either direction
fn filename_match(candidate_name: &str, file_name: &str) -> bool {
    let candidate = normalize_name(candidate_name);
    let file = normalize_name(file_name);
    if candidate.is_empty() || file.is_empty() {
        return false;
    }
    file.contains(&candidate) || candidate.contains(&file)
}

/// Structured-hint agreement: type and year both present and equal, entity
/// blank on either side or overlapping
fn structured_agreement(document: &Document, hints: &UploadHints) -> bool {
    let (Some(hint_type), Some(hint_year)) = (&hints.doc_type, &hints.year) else {
        return false;
    };
    let (Some(doc_type), Some(doc_year)) = (&document.doc_type, &document.year) else {
        return false;
    };

    if !normalized_eq(doc_type, hint_type) || doc_year.trim() != hint_year.trim() {
        return false;
    }

    match (&document.entity, &hints.entity) {
        (Some(doc_entity), Some(hint_entity))
            if !doc_entity.trim().is_empty() && !hint_entity.trim().is_empty() =>
        {
            entities_overlap(doc_entity, hint_entity)
        }
        // Entity blank on either side counts as agreement
        _ => true,
    }
}

/// Decide how one uploaded file reconciles against the document set
///
/// Full structured agreement outranks a filename match; among equally
/// specific candidates the earliest-created wins. `documents` must already
/// be in creation order (the repository lists them that way).
pub fn decide(documents: &[Document], file_name: &str, hints: &UploadHints) -> MatchDecision {
    let mut best: Option<(u8, &Document)> = None;

    for document in documents {
        if document.status != DocumentStatus::Requested {
            continue;
        }

        let specificity = if structured_agreement(document, hints) {
            2
        } else if filename_match(&document.display_name, file_name) {
            1
        } else {
            continue;
        };

        // Strictly-greater keeps the earliest-created among ties
        match best {
            Some((best_specificity, _)) if specificity <= best_specificity => {}
            _ => best = Some((specificity, document)),
        }
    }

    match best {
        Some((_, document)) => MatchDecision::Attach {
            document_id: document.id,
        },
        None => MatchDecision::CreateCompleted,
    }
}

/// Normalized logical-request key for dedup
fn request_key(
    doc_type: Option<&str>,
    year: Option<&str>,
    entity: Option<&str>,
) -> (String, String, String) {
    (
        normalize_name(doc_type.unwrap_or_default()),
        year.unwrap_or_default().trim().to_string(),
        normalize_name(entity.unwrap_or_default()),
    )
}

/// Find an existing document (REQUESTED or COMPLETED) representing the same
/// logical request
///
/// A request whose normalized (type, year, entity) already exists must not
/// create a duplicate; a request already fulfilled must not reopen as a new
/// REQUESTED row either. Requests without a structured type fall back to
/// display-name equality.
pub fn find_duplicate_request(documents: &[Document], request: &DocumentRequest) -> Option<Uuid> {
    let key = request_key(
        request.doc_type.as_deref(),
        request.year.as_deref(),
        request.entity.as_deref(),
    );
    let has_structured_key = !key.0.is_empty();

    documents
        .iter()
        .find(|document| {
            if has_structured_key {
                request_key(
                    document.doc_type.as_deref(),
                    document.year.as_deref(),
                    document.entity.as_deref(),
                ) == key
            } else {
                normalized_eq(&document.display_name, &request.display_name)
            }
        })
        .map(|document| document.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn requested(
        name: &str,
        doc_type: Option<&str>,
        year: Option<&str>,
        entity: Option<&str>,
        age_minutes: i64,
    ) -> Document {
        Document {
            id: Uuid::new_v4(),
            intake_id: Uuid::new_v4(),
            display_name: name.to_string(),
            status: DocumentStatus::Requested,
            doc_type: doc_type.map(str::to_string),
            year: year.map(str::to_string),
            entity: entity.map(str::to_string),
            provenance: None,
            file_ref: None,
            created_at: Utc::now() - Duration::minutes(age_minutes),
            completed_at: None,
        }
    }

    fn completed(name: &str, doc_type: Option<&str>, year: Option<&str>, entity: Option<&str>) -> Document {
        let mut doc = requested(name, doc_type, year, entity, 0);
        doc.status = DocumentStatus::Completed;
        doc.completed_at = Some(Utc::now());
        doc
    }

    fn hints(doc_type: &str, year: &str, entity: Option<&str>) -> UploadHints {
        UploadHints {
            doc_type: Some(doc_type.to_string()),
            year: Some(year.to_string()),
            entity: entity.map(str::to_string),
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("W2_Microsoft.pdf"), "w2 microsoft");
        assert_eq!(normalize_name("2023_Form-1040.PDF"), "2023 form 1040");
        assert_eq!(normalize_name("  weird   name!!  "), "weird name");
        // Long trailing segment is not an extension
        assert_eq!(normalize_name("statement.chase-bank"), "statement chase bank");
    }

    #[test]
    fn test_entities_overlap() {
        assert!(entities_overlap("Microsoft", "Microsoft Corp"));
        assert!(entities_overlap("microsoft", "MICROSOFT"));
        assert!(entities_overlap("Chase", "JPMorgan Chase"));
        assert!(!entities_overlap("Microsoft", "Micron"));
        assert!(!entities_overlap("", "Microsoft"));
    }

    #[test]
    fn test_filename_substring_match_attaches() {
        let w2 = requested("W-2 from Microsoft for 2024", Some("W-2"), Some("2024"), Some("Microsoft"), 10);
        let documents = vec![w2.clone()];

        // No structured hints at all; filename contains "w2 microsoft"? The
        // candidate name normalizes to "w 2 from microsoft for 2024" which the
        // file name does not contain, so rely on hints instead for that case.
        // Here the file name carries the candidate name.
        let decision = decide(&documents, "W-2 from Microsoft for 2024 (signed).pdf", &UploadHints::default());
        assert_eq!(decision, MatchDecision::Attach { document_id: w2.id });
    }

    #[test]
    fn test_structured_match_attaches() {
        let w2 = requested("W-2 from Microsoft for 2024", Some("W-2"), Some("2024"), Some("Microsoft"), 10);
        let documents = vec![w2.clone()];

        let decision = decide(&documents, "scan_0001.pdf", &hints("W-2", "2024", Some("Microsoft Corporation")));
        assert_eq!(decision, MatchDecision::Attach { document_id: w2.id });
    }

    #[test]
    fn test_structured_match_with_blank_entity() {
        let w2 = requested("W-2 for 2024", Some("W-2"), Some("2024"), None, 10);
        let documents = vec![w2.clone()];

        let decision = decide(&documents, "upload.pdf", &hints("W-2", "2024", Some("Microsoft")));
        assert_eq!(decision, MatchDecision::Attach { document_id: w2.id });
    }

    #[test]
    fn test_wrong_year_does_not_attach() {
        let w2 = requested("W-2 from Microsoft for 2024", Some("W-2"), Some("2024"), Some("Microsoft"), 10);
        let documents = vec![w2];

        let decision = decide(&documents, "scan_0001.pdf", &hints("W-2", "2023", Some("Microsoft")));
        assert_eq!(decision, MatchDecision::CreateCompleted);
    }

    #[test]
    fn test_structured_beats_filename() {
        // Filename points at one request, structured hints at another
        let by_name = requested("w2 upload", Some("1099-INT"), Some("2024"), Some("Chase"), 5);
        let by_fields = requested("Wage statement", Some("W-2"), Some("2024"), Some("Microsoft"), 1);
        let documents = vec![by_name.clone(), by_fields.clone()];

        let decision = decide(&documents, "w2_upload.pdf", &hints("W-2", "2024", Some("Microsoft")));
        assert_eq!(
            decision,
            MatchDecision::Attach {
                document_id: by_fields.id
            }
        );
    }

    #[test]
    fn test_tie_breaks_to_earliest_created() {
        let older = requested("W-2 for 2024", Some("W-2"), Some("2024"), None, 60);
        let newer = requested("W-2 for 2024 (spouse)", Some("W-2"), Some("2024"), None, 5);
        // Listed in creation order, as the repository returns them
        let documents = vec![older.clone(), newer];

        let decision = decide(&documents, "upload.pdf", &hints("W-2", "2024", None));
        assert_eq!(decision, MatchDecision::Attach { document_id: older.id });
    }

    #[test]
    fn test_completed_documents_never_attach() {
        let done = completed("W-2 from Microsoft for 2024", Some("W-2"), Some("2024"), Some("Microsoft"));
        let documents = vec![done];

        let decision = decide(&documents, "w2_microsoft.pdf", &hints("W-2", "2024", Some("Microsoft")));
        assert_eq!(decision, MatchDecision::CreateCompleted);
    }

    #[test]
    fn test_no_match_still_records_upload() {
        let decision = decide(&[], "mystery_document.pdf", &UploadHints::default());
        assert_eq!(decision, MatchDecision::CreateCompleted);
    }

    #[test]
    fn test_duplicate_request_against_requested() {
        let w2 = requested("W-2 from Microsoft for 2024", Some("W-2"), Some("2024"), Some("Microsoft"), 10);
        let documents = vec![w2.clone()];

        let request = DocumentRequest {
            display_name: "Microsoft W-2 (2024)".to_string(),
            doc_type: Some("W-2".to_string()),
            year: Some("2024".to_string()),
            entity: Some("microsoft".to_string()),
        };
        assert_eq!(find_duplicate_request(&documents, &request), Some(w2.id));
    }

    #[test]
    fn test_duplicate_request_against_completed() {
        let done = completed("W-2 from Microsoft for 2024", Some("W-2"), Some("2024"), Some("Microsoft"));
        let documents = vec![done.clone()];

        let request = DocumentRequest {
            display_name: "W-2 from Microsoft".to_string(),
            doc_type: Some("W-2".to_string()),
            year: Some("2024".to_string()),
            entity: Some("Microsoft".to_string()),
        };
        // Already fulfilled: must not reopen as a new REQUESTED row
        assert_eq!(find_duplicate_request(&documents, &request), Some(done.id));
    }

    #[test]
    fn test_distinct_request_is_not_duplicate() {
        let w2 = requested("W-2 from Microsoft for 2024", Some("W-2"), Some("2024"), Some("Microsoft"), 10);
        let documents = vec![w2];

        let request = DocumentRequest {
            display_name: "1099-INT from Chase for 2024".to_string(),
            doc_type: Some("1099-INT".to_string()),
            year: Some("2024".to_string()),
            entity: Some("Chase".to_string()),
        };
        assert_eq!(find_duplicate_request(&documents, &request), None);
    }

    #[test]
    fn test_unstructured_request_dedupes_by_display_name() {
        let doc = requested("Closing statement", None, None, None, 10);
        let documents = vec![doc.clone()];

        let request = DocumentRequest {
            display_name: "closing statement".to_string(),
            doc_type: None,
            year: None,
            entity: None,
        };
        assert_eq!(find_duplicate_request(&documents, &request), Some(doc.id));
    }
}

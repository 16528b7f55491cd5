//! Intake status state machine
//!
//! Pure recomputation of intake status from the current status, the
//! document set, and the certification outcome of the latest upload.
//! Recomputed synchronously inside every document-mutating operation; the
//! status is always consistent with the document set when that operation
//! returns.

use crate::analysis::Classification;
use crate::models::Document;
use taxkit_common::types::{DocumentStatus, IntakeStatus};

/// Document types accepted as a prior-year individual return
const PRIOR_RETURN_TYPES: &[&str] = &["form 1040", "1040", "1040 sr", "1040sr", "prior year return"];

/// Whether a classification certifies a valid prior-year return for an
/// intake of the given tax year
///
/// Fails closed: a missing or unparseable year, an unrecognized form type,
/// or an invalid document all refuse certification. An unavailable
/// analysis adapter never reaches this point (no classification exists).
pub fn certifies_prior_return(classification: &Classification, tax_year: &str) -> bool {
    if !classification.is_valid {
        return false;
    }

    let Ok(tax_year) = tax_year.trim().parse::<i32>() else {
        return false;
    };

    let Some(doc_year) = classification
        .year
        .as_deref()
        .and_then(|y| y.trim().parse::<i32>().ok())
    else {
        return false;
    };

    let Some(doc_type) = classification.doc_type.as_deref() else {
        return false;
    };
    let doc_type = crate::services::matcher::normalize_name(doc_type);

    PRIOR_RETURN_TYPES.contains(&doc_type.as_str()) && doc_year == tax_year - 1
}

/// Compute the next status
///
/// - AWAITING_PRIOR_RETURN advances to INCOMPLETE only on a certified
///   prior-year return; it never jumps straight to READY in the same
///   recomputation (the request list is generated immediately after
///   certification, and the following recomputation settles the rest)
/// - INCOMPLETE lifts to READY when nothing is outstanding and at least
///   one document is completed
/// - READY reopens to INCOMPLETE when a new request appears
///
/// Idempotent: with no intervening document mutation and
/// `prior_return_certified == false`, recomputation returns its input.
pub fn next_status(
    current: IntakeStatus,
    documents: &[Document],
    prior_return_certified: bool,
) -> IntakeStatus {
    let requested = documents
        .iter()
        .filter(|d| d.status == DocumentStatus::Requested)
        .count();
    let completed = documents
        .iter()
        .filter(|d| d.status == DocumentStatus::Completed)
        .count();

    match current {
        IntakeStatus::AwaitingPriorReturn => {
            if prior_return_certified {
                IntakeStatus::Incomplete
            } else {
                IntakeStatus::AwaitingPriorReturn
            }
        }
        IntakeStatus::Incomplete => {
            if requested == 0 && completed > 0 {
                IntakeStatus::Ready
            } else {
                IntakeStatus::Incomplete
            }
        }
        IntakeStatus::Ready => {
            if requested > 0 {
                IntakeStatus::Incomplete
            } else {
                IntakeStatus::Ready
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn doc(status: DocumentStatus) -> Document {
        Document {
            id: Uuid::new_v4(),
            intake_id: Uuid::new_v4(),
            display_name: "doc".to_string(),
            status,
            doc_type: None,
            year: None,
            entity: None,
            provenance: None,
            file_ref: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn classification(is_valid: bool, doc_type: Option<&str>, year: Option<&str>) -> Classification {
        Classification {
            is_valid,
            doc_type: doc_type.map(str::to_string),
            year: year.map(str::to_string),
            entity: None,
            extracted_facts: vec![],
            feedback: String::new(),
        }
    }

    #[test]
    fn test_certification_accepts_correct_prior_year() {
        let class = classification(true, Some("Form 1040"), Some("2023"));
        assert!(certifies_prior_return(&class, "2024"));
    }

    #[test]
    fn test_certification_rejects_wrong_year() {
        let class = classification(true, Some("Form 1040"), Some("2022"));
        assert!(!certifies_prior_return(&class, "2024"));
    }

    #[test]
    fn test_certification_rejects_wrong_form() {
        let class = classification(true, Some("W-2"), Some("2023"));
        assert!(!certifies_prior_return(&class, "2024"));
    }

    #[test]
    fn test_certification_fails_closed_on_missing_fields() {
        assert!(!certifies_prior_return(&classification(true, None, Some("2023")), "2024"));
        assert!(!certifies_prior_return(&classification(true, Some("Form 1040"), None), "2024"));
        assert!(!certifies_prior_return(&classification(false, Some("Form 1040"), Some("2023")), "2024"));
        assert!(!certifies_prior_return(&classification(true, Some("Form 1040"), Some("2023")), "20x4"));
    }

    #[test]
    fn test_gated_stays_without_certification() {
        let documents = vec![doc(DocumentStatus::Completed)];
        assert_eq!(
            next_status(IntakeStatus::AwaitingPriorReturn, &documents, false),
            IntakeStatus::AwaitingPriorReturn
        );
    }

    #[test]
    fn test_gated_advances_on_certification_only_to_incomplete() {
        // Even with zero requests and one completed document, certification
        // advances exactly one step
        let documents = vec![doc(DocumentStatus::Completed)];
        assert_eq!(
            next_status(IntakeStatus::AwaitingPriorReturn, &documents, true),
            IntakeStatus::Incomplete
        );
    }

    #[test]
    fn test_incomplete_lifts_to_ready_when_nothing_outstanding() {
        let documents = vec![doc(DocumentStatus::Completed), doc(DocumentStatus::Completed)];
        assert_eq!(
            next_status(IntakeStatus::Incomplete, &documents, false),
            IntakeStatus::Ready
        );
    }

    #[test]
    fn test_incomplete_stays_with_outstanding_requests() {
        let documents = vec![doc(DocumentStatus::Completed), doc(DocumentStatus::Requested)];
        assert_eq!(
            next_status(IntakeStatus::Incomplete, &documents, false),
            IntakeStatus::Incomplete
        );
    }

    #[test]
    fn test_incomplete_needs_at_least_one_completed() {
        assert_eq!(
            next_status(IntakeStatus::Incomplete, &[], false),
            IntakeStatus::Incomplete
        );
    }

    #[test]
    fn test_ready_reopens_on_new_request() {
        let documents = vec![doc(DocumentStatus::Completed), doc(DocumentStatus::Requested)];
        assert_eq!(
            next_status(IntakeStatus::Ready, &documents, false),
            IntakeStatus::Incomplete
        );
    }

    #[test]
    fn test_recomputation_is_idempotent() {
        let documents = vec![doc(DocumentStatus::Completed)];
        for status in [
            IntakeStatus::AwaitingPriorReturn,
            IntakeStatus::Incomplete,
            IntakeStatus::Ready,
        ] {
            let once = next_status(status, &documents, false);
            let twice = next_status(once, &documents, false);
            assert_eq!(once, twice);
        }
    }
}

//! Filename-based preliminary classification.
//!
//! Runs before a task is queued so the optimizer has something to group on
//! while the real analyzer has not seen the document yet. Patterns are
//! matched case-insensitively against the whole source reference.

use crate::task::Priority;

/// Document types that carry enough cross-field structure to justify the
/// extra validation call.
const COMPLEX_TYPES: &[&str] = &["1040", "K-1", "Schedule C"];

/// Predict a document type from a file name or path.
pub fn predict_document_type(source_ref: &str) -> Option<&'static str> {
    let name = source_ref.to_lowercase();

    if name.contains("w2") || name.contains("w-2") {
        Some("W-2")
    } else if name.contains("1099") {
        if name.contains("nec") {
            Some("1099-NEC")
        } else {
            Some("1099-MISC")
        }
    } else if name.contains("1040") {
        Some("1040")
    } else if name.contains("receipt") {
        Some("Receipt")
    } else if name.contains("invoice") {
        Some("Invoice")
    } else {
        None
    }
}

/// Whether the analyzer should be asked to validate its own extraction.
pub fn recommends_validation(priority: Priority, document_type: Option<&str>) -> bool {
    if priority == Priority::Urgent {
        return true;
    }
    document_type.is_some_and(|t| COMPLEX_TYPES.contains(&t))
}

//! Category contiguity check
//!
//! The batcher assumes each category's feature ids form one contiguous
//! range: a batch is always drawn from a single category, and id order
//! within a category carries the dependency order feature authors encoded.
//! A fragmented category would scatter its work across unrelated sessions,
//! so the check runs once at startup and a violation aborts the run.

use thiserror::Error;

use crate::store::Feature;

/// A category's id range was interrupted by another category's ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "category '{category}' is not contiguous: feature {offending_id} reopens it \
     after other categories interleaved"
)]
pub struct ContiguityViolation {
    pub category: String,
    pub offending_id: i64,
}

/// Walk features in id order, allowing each category to open exactly once.
///
/// `features` must already be sorted by id ascending, which is how the
/// store returns them. An empty set is valid.
pub fn ensure_category_contiguity(features: &[Feature]) -> Result<(), ContiguityViolation> {
    let mut closed: Vec<&str> = Vec::new();
    let mut current: Option<&str> = None;

    for feature in features {
        let category = feature.category.as_str();
        if current == Some(category) {
            continue;
        }
        if closed.contains(&category) {
            return Err(ContiguityViolation {
                category: category.to_string(),
                offending_id: feature.id,
            });
        }
        if let Some(previous) = current.take() {
            closed.push(previous);
        }
        current = Some(category);
    }
    Ok(())
}

//! Deduplicating merge of remote batches into a local transcript

use std::collections::HashSet;

use crate::models::{Message, MessageKey};

/// Result of merging one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// The full transcript after the merge.
    pub merged: Vec<Message>,
    /// The messages that were actually new, in arrival order.
    pub accepted: Vec<Message>,
}

/// Merge `incoming` into `local`.
///
/// A message is accepted when no message with the same `(content,
/// timestamp)` exists in `local` or earlier in the same batch. Accepted
/// messages are appended in arrival order; nothing is re-sorted.
pub fn reconcile(local: &[Message], incoming: &[Message]) -> Reconciled {
    let mut merged = local.to_vec();
    let accepted = merge_into(&mut merged, incoming);
    Reconciled { merged, accepted }
}

/// In-place form of [`reconcile`]. Returns the accepted messages.
pub(super) fn merge_into(local: &mut Vec<Message>, incoming: &[Message]) -> Vec<Message> {
    let mut seen: HashSet<MessageKey> = local.iter().map(Message::key).collect();
    let accepted: Vec<Message> = incoming
        .iter()
        .filter(|m| seen.insert(m.key()))
        .cloned()
        .collect();
    local.extend(accepted.iter().cloned());
    accepted
}

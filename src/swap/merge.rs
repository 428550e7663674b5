use super::{EventKind, SwapRecord, SwapUpdate};

/// Applies one live update to `record`, returning the next snapshot.
///
/// Replays are dropped: an update is appended only if no recorded event has the
/// same hash (or, without a hash, the same name and timestamp). Failed updates
/// are kept for the audit trail but touch no derived field. Recipient and
/// provider are fill-once.
pub fn apply_event(record: &SwapRecord, update: &SwapUpdate) -> SwapRecord {
    merge(record, update).unwrap_or_else(|| record.clone())
}

/// Like [`apply_event`], but `None` when the update changes nothing.
pub fn merge(record: &SwapRecord, update: &SwapUpdate) -> Option<SwapRecord> {
    let event = update.to_event();
    if record.events.iter().any(|e| e.same_as(&event)) {
        tracing::debug!(swap_id = %record.id, status = %update.status, "drop replayed update");
        return None;
    }

    let mut next = record.clone();
    next.events.push(event);

    if update.data.failed || update.status.failed {
        return Some(next);
    }

    if let Some(ts) = update.data.ts {
        match update.status.kind {
            EventKind::Posted => next.posted = Some(ts),
            EventKind::Bonded => next.bonded = Some(ts),
            EventKind::Released => next.released = Some(ts),
            EventKind::Executed => next.executed = Some(ts),
            _ => {}
        }
    }

    if next.from_to.recipient.is_none() {
        next.from_to.recipient = update.data.recipient.clone();
    }
    if next.provider.is_none() {
        next.provider = update.data.provider.clone();
    }

    Some(next)
}

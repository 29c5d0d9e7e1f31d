//! Merging a client delta into the server copy of a user's objectives and items.
//!
//! The merge is last-write-wins on `LastModified`, checked per record against one snapshot
//! taken at the start of the call. No lock is held across the call: two reconciliations for
//! the same user interleave at row level, and the snapshot returned at the end may include
//! the other call's writes. Deletes are best-effort per row; the first failed upsert aborts
//! the call without undoing earlier writes, so the whole call is safe to retry.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info};

use std::collections::HashMap;

use crate::internal_error::SyncError;

use super::data::*;
use super::helpers::*;
use super::ids;
use super::store::ObjectiveStore;

#[derive(Debug, Clone, Copy)]
pub struct SyncLimits {
    pub max_batch: usize,
}

impl Default for SyncLimits {
    fn default() -> SyncLimits {
        SyncLimits { max_batch: 100 }
    }
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}

/// Whether an incoming record replaces the stored one with the same key.
///
/// A missing timestamp on either side always replaces. Otherwise the incoming timestamp must
/// be strictly later; a tie or an unparsable value keeps the stored copy.
pub fn supersedes(stored: &str, incoming: &str) -> bool {
    if stored.is_empty() || incoming.is_empty() {
        return true;
    }

    match (parse_timestamp(stored), parse_timestamp(incoming)) {
        (Some(stored), Some(incoming)) => incoming > stored,
        _ => false,
    }
}

#[derive(Debug, Default)]
struct Counts {
    written: usize,
    skipped: usize,
}

pub async fn reconcile<S: ObjectiveStore + ?Sized>(
    store: &S,
    user_id: &str,
    mut delta: Delta,
    restricted: bool,
    limits: &SyncLimits,
) -> Result<FullState, SyncError> {
    check_batch("Objectives", delta.objectives.len(), limits.max_batch)?;
    check_batch("Items", delta.items.len(), limits.max_batch)?;
    check_batch("DeleteObjectives", delta.delete_objectives.len(), limits.max_batch)?;
    check_batch("DeleteItems", delta.delete_items.len(), limits.max_batch)?;

    if !ids::is_user_id(user_id) {
        return Err(SyncError::InvalidIdentifier("UserId"));
    }
    for objective in delta.objectives.iter_mut() {
        claim_objective(user_id, objective)?;
    }
    for item in delta.items.iter_mut() {
        claim_item(user_id, item)?;
    }

    let before = load_full_state(store, user_id).await?;
    let stored_objectives: HashMap<&str, &Objective> = before
        .objectives
        .iter()
        .map(|o| (o.objective_id.as_str(), o))
        .collect();
    let stored_items: HashMap<(&str, &str), &Item> = before
        .items
        .iter()
        .map(|i| ((i.user_id_objective_id.as_str(), i.item_id.as_str()), i))
        .collect();

    if restricted {
        if !delta.delete_objectives.is_empty() || !delta.delete_items.is_empty() {
            info!(
                objectives = delta.delete_objectives.len(),
                items = delta.delete_items.len(),
                "restricted caller; deletions ignored"
            );
        }
    } else {
        let objectives = delete_objectives(store, user_id, &delta.delete_objectives).await;
        let items = delete_items(store, user_id, &delta.delete_items).await;
        debug!(objectives, items, "deletions applied");
    }

    let mut counts = Counts::default();
    for item in delta.items.iter() {
        let key = (item.user_id_objective_id.as_str(), item.item_id.as_str());
        let replace = match stored_items.get(&key) {
            Some(stored) => supersedes(&stored.last_modified, &item.last_modified),
            None => true,
        };

        if replace {
            store.put_item(item).await?;
            counts.written += 1;
        } else {
            counts.skipped += 1;
        }
    }
    debug!(written = counts.written, skipped = counts.skipped, "items merged");

    let mut counts = Counts::default();
    for objective in delta.objectives.iter() {
        let replace = match stored_objectives.get(objective.objective_id.as_str()) {
            Some(stored) => supersedes(&stored.last_modified, &objective.last_modified),
            None => true,
        };

        if replace {
            store.put_objective(objective).await?;
            counts.written += 1;
        } else {
            counts.skipped += 1;
        }
    }
    debug!(written = counts.written, skipped = counts.skipped, "objectives merged");

    Ok(load_full_state(store, user_id).await?)
}

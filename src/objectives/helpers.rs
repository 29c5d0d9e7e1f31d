use tracing::{debug, warn};

use crate::internal_error::SyncError;

use super::data::*;
use super::ids;
use super::store::{ObjectiveStore, StoreResult};

/// Reads every objective of `user_id`, then the items of each one in turn.
pub async fn load_full_state<S: ObjectiveStore + ?Sized>(
    store: &S,
    user_id: &str,
) -> StoreResult<FullState> {
    let objectives = store.query_objectives(user_id).await?;

    let mut items = vec![];
    for objective in objectives.iter() {
        let partition = format!("{}{}", user_id, objective.objective_id);
        items.extend(store.query_items(&partition).await?);
    }

    Ok(FullState { objectives, items })
}

pub fn check_batch(list: &'static str, len: usize, max: usize) -> Result<(), SyncError> {
    if len > max {
        return Err(SyncError::BatchLimit { list, len, max });
    }
    Ok(())
}

/// Binds an incoming objective to `user_id` and gives it an id when it has none.
pub fn claim_objective(user_id: &str, objective: &mut Objective) -> Result<(), SyncError> {
    objective.user_id = user_id.to_string();

    if objective.objective_id.is_empty() {
        objective.objective_id = ids::generate_id();
    } else if !ids::is_objective_id(&objective.objective_id) {
        return Err(SyncError::InvalidIdentifier("ObjectiveId"));
    }

    Ok(())
}

/// Rewrites the item partition from `user_id` and gives the item an id when it has none.
pub fn claim_item(user_id: &str, item: &mut Item) -> Result<(), SyncError> {
    item.user_id_objective_id = ids::compose_partition(user_id, &item.user_id_objective_id);

    if !ids::is_user_id_objective_id(&item.user_id_objective_id) {
        return Err(SyncError::InvalidIdentifier("UserIdObjectiveId"));
    }

    if item.item_id.is_empty() {
        item.item_id = ids::generate_id();
    } else if !ids::is_item_id(&item.item_id) {
        return Err(SyncError::InvalidIdentifier("ItemId"));
    }

    Ok(())
}

/// Deletes the items of an objective and then the objective row.
///
/// Each item is deleted on its own; a failed item is logged and the rest still go. The
/// objective row is only removed when its item list could be read.
pub async fn cascade_delete_objective<S: ObjectiveStore + ?Sized>(
    store: &S,
    user_id: &str,
    objective_id: &str,
) -> bool {
    let partition = format!("{}{}", user_id, objective_id);

    let items = match store.query_items(&partition).await {
        Ok(items) => items,
        Err(e) => {
            warn!(objective_id, "could not list items for cascade delete: {}", e);
            return false;
        }
    };

    for item in items.iter() {
        if let Err(e) = store.delete_item(&partition, &item.item_id).await {
            warn!(item_id = %item.item_id, "item delete failed during cascade: {}", e);
        }
    }

    match store.delete_objective(user_id, objective_id).await {
        Ok(true) => {
            debug!(objective_id, items = items.len(), "objective deleted");
            true
        }
        Ok(false) => {
            debug!(objective_id, "no objective to delete");
            false
        }
        Err(e) => {
            warn!(objective_id, "objective delete failed: {}", e);
            false
        }
    }
}

/// Best-effort deletion of objectives. Malformed ids are skipped. Returns how many were removed.
pub async fn delete_objectives<S: ObjectiveStore + ?Sized>(
    store: &S,
    user_id: &str,
    refs: &[ObjectiveRef],
) -> usize {
    let mut deleted = 0;

    for objective_ref in refs.iter() {
        if !ids::is_objective_id(&objective_ref.objective_id) {
            warn!(objective_id = %objective_ref.objective_id, "skipping delete with malformed id");
            continue;
        }

        if cascade_delete_objective(store, user_id, &objective_ref.objective_id).await {
            deleted += 1;
        }
    }

    deleted
}

/// Best-effort deletion of items. Malformed keys are skipped. Returns how many were removed.
pub async fn delete_items<S: ObjectiveStore + ?Sized>(
    store: &S,
    user_id: &str,
    refs: &[ItemRef],
) -> usize {
    let mut deleted = 0;

    for item_ref in refs.iter() {
        let partition = ids::compose_partition(user_id, &item_ref.user_id_objective_id);
        if !ids::is_user_id_objective_id(&partition) || !ids::is_item_id(&item_ref.item_id) {
            warn!(item_id = %item_ref.item_id, "skipping delete with malformed key");
            continue;
        }

        match store.delete_item(&partition, &item_ref.item_id).await {
            Ok(true) => deleted += 1,
            Ok(false) => debug!(item_id = %item_ref.item_id, "no item to delete"),
            Err(e) => warn!(item_id = %item_ref.item_id, "item delete failed: {}", e),
        }
    }

    deleted
}

/// Writes every objective unconditionally. Stops at the first failed write.
pub async fn put_objectives<S: ObjectiveStore + ?Sized>(
    store: &S,
    user_id: &str,
    mut objectives: Vec<Objective>,
    max_batch: usize,
) -> Result<Vec<Objective>, SyncError> {
    check_batch("Objectives", objectives.len(), max_batch)?;
    for objective in objectives.iter_mut() {
        claim_objective(user_id, objective)?;
    }

    for objective in objectives.iter() {
        store.put_objective(objective).await?;
    }

    Ok(objectives)
}

/// Writes every item unconditionally. Stops at the first failed write.
pub async fn put_items<S: ObjectiveStore + ?Sized>(
    store: &S,
    user_id: &str,
    mut items: Vec<Item>,
    max_batch: usize,
) -> Result<Vec<Item>, SyncError> {
    check_batch("Items", items.len(), max_batch)?;
    for item in items.iter_mut() {
        claim_item(user_id, item)?;
    }

    for item in items.iter() {
        store.put_item(item).await?;
    }

    Ok(items)
}

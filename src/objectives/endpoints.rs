use rocket::data::{Data, ToByteUnit};
use rocket::http::{ContentType, Status};
use rocket::{get, post, uri, State};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use std::sync::Arc;

use crate::config::Config;
use crate::data::Envelope;
use crate::identity::Caller;
use crate::internal_error::{InternalError, SyncError};
use crate::object_store::{attachment_key, backup_key, backup_prefix, SharedObjectStore};

use super::data::*;
use super::helpers::*;
use super::ids;
use super::normalize::*;
use super::store::ObjectiveStore;
use super::sync::{reconcile, SyncLimits};

pub type SharedStore = Arc<dyn ObjectiveStore>;

type EndpointResult<T> = Result<Envelope<T>, SyncError>;

const BAD_BODY: &str = "There was a problem with the body of request.";

async fn read_body(data: Data<'_>, max_bytes: u64) -> Result<Value, SyncError> {
    let body = data
        .open(max_bytes.bytes())
        .into_string()
        .await
        .map_err(InternalError::from)?;

    if !body.is_complete() {
        return Err(SyncError::PayloadTooLarge);
    }
    if body.trim().is_empty() {
        return Err(SyncError::Malformed(BAD_BODY.to_string()));
    }

    serde_json::from_str(&body).map_err(|_| SyncError::Malformed(BAD_BODY.to_string()))
}

fn parse<T: DeserializeOwned>(body: Value) -> Result<T, SyncError> {
    serde_json::from_value(body).map_err(|_| SyncError::Malformed(BAD_BODY.to_string()))
}

fn deny_restricted(caller: &Caller) -> Result<(), SyncError> {
    if caller.is_restricted() {
        return Err(SyncError::Unauthorized(
            "Guest accounts cannot delete records.".to_string(),
        ));
    }
    Ok(())
}

fn records(store: &State<SharedStore>) -> &dyn ObjectiveStore {
    store.inner().as_ref()
}

fn limits(config: &Config) -> SyncLimits {
    SyncLimits {
        max_batch: config.max_batch,
    }
}

#[get("/alive")]
pub fn alive() -> Envelope<&'static str> {
    Envelope::ok("Am I alive?")
}

#[get("/get_objectives")]
pub async fn get_objectives(
    caller: Result<Caller, SyncError>,
    store: &State<SharedStore>,
) -> EndpointResult<Vec<Objective>> {
    let caller = caller?;

    let objectives = store.query_objectives(caller.user_id()).await?;

    Ok(Envelope::ok(objectives))
}

#[post("/get_objective", data = "<data>")]
pub async fn get_objective(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
) -> EndpointResult<Objective> {
    let caller = caller?;
    let body = read_body(data, config.max_payload_bytes).await?;
    let request: ObjectiveIdRequest = parse(body)?;

    match store
        .get_objective(caller.user_id(), &request.objective_id)
        .await?
    {
        Some(objective) => Ok(Envelope::ok(objective)),
        None => Err(SyncError::NotFound("Objective")),
    }
}

#[post("/get_items", data = "<data>")]
pub async fn get_items(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
) -> EndpointResult<Vec<Item>> {
    let caller = caller?;
    let body = read_body(data, config.max_payload_bytes).await?;
    let request: ObjectiveIdRequest = parse(body)?;
    if !ids::is_objective_id(&request.objective_id) {
        return Err(SyncError::InvalidIdentifier("ObjectiveId"));
    }

    let partition = format!("{}{}", caller.user_id(), request.objective_id);
    let items = store.query_items(&partition).await?;

    Ok(Envelope::ok(items))
}

#[post("/get_item", data = "<data>")]
pub async fn get_item(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
) -> EndpointResult<Item> {
    let caller = caller?;
    let body = read_body(data, config.max_payload_bytes).await?;
    let request: ItemKeyRequest = parse(body)?;

    let partition = ids::compose_partition(caller.user_id(), &request.user_id_objective_id);
    match store.get_item(&partition, &request.item_id).await? {
        Some(item) => Ok(Envelope::ok(item)),
        None => Err(SyncError::NotFound("Item")),
    }
}

#[post("/put_objectives", data = "<data>")]
pub async fn put_objectives_endpoint(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
) -> EndpointResult<Vec<Objective>> {
    let caller = caller?;
    let body = read_body(data, config.max_payload_bytes).await?;
    let objectives = read_array(&body)?.iter().map(normalize_objective).collect();

    let written =
        put_objectives(records(store), caller.user_id(), objectives, config.max_batch).await?;

    Ok(Envelope::ok(written))
}

#[post("/delete_objectives", data = "<data>")]
pub async fn delete_objectives_endpoint(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
) -> EndpointResult<DeleteResult> {
    let caller = caller?;
    let body = read_body(data, config.max_payload_bytes).await?;
    deny_restricted(&caller)?;
    let refs: Vec<ObjectiveRef> = read_array(&body)?.iter().map(objective_ref).collect();
    check_batch("DeleteObjectives", refs.len(), config.max_batch)?;

    let deleted = delete_objectives(records(store), caller.user_id(), &refs).await;

    Ok(Envelope::ok(DeleteResult { deleted }))
}

#[post("/put_items", data = "<data>")]
pub async fn put_items_endpoint(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
) -> EndpointResult<Vec<Item>> {
    let caller = caller?;
    let body = read_body(data, config.max_payload_bytes).await?;
    let items = read_array(&body)?.iter().map(normalize_item).collect();

    let written = put_items(records(store), caller.user_id(), items, config.max_batch).await?;

    Ok(Envelope::ok(written))
}

#[post("/delete_items", data = "<data>")]
pub async fn delete_items_endpoint(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
) -> EndpointResult<DeleteResult> {
    let caller = caller?;
    let body = read_body(data, config.max_payload_bytes).await?;
    deny_restricted(&caller)?;
    let refs: Vec<ItemRef> = read_array(&body)?.iter().map(item_ref).collect();
    check_batch("DeleteItems", refs.len(), config.max_batch)?;

    let deleted = delete_items(records(store), caller.user_id(), &refs).await;

    Ok(Envelope::ok(DeleteResult { deleted }))
}

#[post("/sync", data = "<data>")]
pub async fn sync(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
) -> EndpointResult<FullState> {
    let caller = caller?;
    let body = read_body(data, config.max_payload_bytes).await?;
    let delta = read_delta(&body)?;

    let state = reconcile(
        records(store),
        caller.user_id(),
        delta,
        caller.is_restricted(),
        &limits(config),
    )
    .await?;

    Ok(Envelope::ok(state))
}

#[post("/backup")]
pub async fn backup(
    caller: Result<Caller, SyncError>,
    store: &State<SharedStore>,
    objects: &State<SharedObjectStore>,
    config: &State<Config>,
) -> EndpointResult<BackupResult> {
    let caller = caller?;

    let state = reconcile(
        records(store),
        caller.user_id(),
        Delta::default(),
        caller.is_restricted(),
        &limits(config),
    )
    .await?;

    let key = backup_key(caller.user_id(), &now_timestamp());
    let body = serde_json::to_vec_pretty(&state).map_err(InternalError::from)?;
    objects.put(&key, &body).await?;
    info!(user_id = caller.user_id(), key = %key, "backup written");

    Ok(Envelope::created(BackupResult { key }))
}

#[get("/get_backup_list")]
pub async fn get_backup_list(
    caller: Result<Caller, SyncError>,
    objects: &State<SharedObjectStore>,
) -> EndpointResult<BackupListResponse> {
    let caller = caller?;

    let backups = objects.list(&backup_prefix(caller.user_id())).await?;

    Ok(Envelope::ok(BackupListResponse { backups }))
}

fn attachment_path(caller: &Caller, item_id: &str, file_name: &str) -> Result<String, SyncError> {
    if !ids::is_item_id(item_id) {
        return Err(SyncError::InvalidIdentifier("ItemId"));
    }
    if file_name.is_empty() || file_name.contains('/') || file_name.starts_with('.') {
        return Err(SyncError::Malformed("Invalid file name.".to_string()));
    }

    Ok(attachment_key(caller.user_id(), item_id, file_name))
}

#[post("/upload_attachment/<item_id>/<file_name>", data = "<data>")]
pub async fn upload_attachment(
    caller: Result<Caller, SyncError>,
    item_id: &str,
    file_name: &str,
    data: Data<'_>,
    objects: &State<SharedObjectStore>,
    config: &State<Config>,
) -> EndpointResult<String> {
    let caller = caller?;
    let key = attachment_path(&caller, item_id, file_name)?;

    let body = data
        .open(config.max_attachment_kib.kibibytes())
        .into_bytes()
        .await
        .map_err(InternalError::from)?;
    if !body.is_complete() {
        return Err(SyncError::PayloadTooLarge);
    }

    objects.put(&key, &body).await?;

    Ok(Envelope::created(key))
}

#[get("/attachment/<item_id>/<file_name>")]
pub async fn get_attachment(
    caller: Result<Caller, SyncError>,
    item_id: &str,
    file_name: &str,
    objects: &State<SharedObjectStore>,
) -> Result<(ContentType, Vec<u8>), SyncError> {
    let caller = caller?;
    let key = attachment_path(&caller, item_id, file_name)?;

    let content_type = file_name
        .rsplit_once('.')
        .and_then(|(_, extension)| ContentType::from_extension(extension))
        .unwrap_or(ContentType::Binary);

    match objects.get(&key).await? {
        Some(body) => Ok((content_type, body)),
        None => Err(SyncError::NotFound("Attachment")),
    }
}

#[post("/delete_attachment/<item_id>/<file_name>")]
pub async fn delete_attachment(
    caller: Result<Caller, SyncError>,
    item_id: &str,
    file_name: &str,
    objects: &State<SharedObjectStore>,
) -> EndpointResult<()> {
    let caller = caller?;
    deny_restricted(&caller)?;
    let key = attachment_path(&caller, item_id, file_name)?;

    objects.delete(&key).await?;

    Ok(Envelope::message(Status::Ok, "Attachment deleted."))
}

async fn attachment_info(
    caller: &Caller,
    data: Data<'_>,
    config: &Config,
) -> Result<AttachmentInfo, SyncError> {
    let body = read_body(data, config.max_payload_bytes).await?;
    let info: AttachmentInfo = parse(body)?;
    attachment_path(caller, &info.item_id, &info.file_name)?;
    Ok(info)
}

#[post("/generate_get_url", data = "<data>")]
pub async fn generate_get_url(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    config: &State<Config>,
) -> EndpointResult<AttachmentUrl> {
    let caller = caller?;
    let info = attachment_info(&caller, data, config).await?;

    let (item_id, file_name) = (info.item_id.as_str(), info.file_name.as_str());
    let url = uri!("/api", get_attachment(item_id, file_name)).to_string();

    Ok(Envelope::ok(AttachmentUrl { url }))
}

#[post("/generate_put_url", data = "<data>")]
pub async fn generate_put_url(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    config: &State<Config>,
) -> EndpointResult<AttachmentUrl> {
    let caller = caller?;
    let info = attachment_info(&caller, data, config).await?;

    let (item_id, file_name) = (info.item_id.as_str(), info.file_name.as_str());
    let url = uri!("/api", upload_attachment(item_id, file_name)).to_string();

    Ok(Envelope::ok(AttachmentUrl { url }))
}

#[post("/generate_delete_url", data = "<data>")]
pub async fn generate_delete_url(
    caller: Result<Caller, SyncError>,
    data: Data<'_>,
    config: &State<Config>,
) -> EndpointResult<AttachmentUrl> {
    let caller = caller?;
    deny_restricted(&caller)?;
    let info = attachment_info(&caller, data, config).await?;

    let (item_id, file_name) = (info.item_id.as_str(), info.file_name.as_str());
    let url = uri!("/api", delete_attachment(item_id, file_name)).to_string();

    Ok(Envelope::ok(AttachmentUrl { url }))
}

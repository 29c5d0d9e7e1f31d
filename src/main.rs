use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use std::error::Error;
use std::sync::{Arc, Mutex};

use objective_sync::config::Config;
use objective_sync::identity::{SharedIdentity, SqliteIdentity};
use objective_sync::object_store::{FsObjectStore, SharedObjectStore};
use objective_sync::objectives::store::SqliteStore;
use objective_sync::objectives::SharedStore;

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rocket = rocket::build();
    let config: Config = rocket.figment().extract()?;

    let connection = Arc::new(Mutex::new(Connection::open(&config.database_path)?));
    let store: SharedStore = Arc::new(SqliteStore::new(
        connection.clone(),
        config.tables(),
        config.query_page_size,
    )?);
    let identity: SharedIdentity = Arc::new(SqliteIdentity::new(connection, &config.service_name)?);
    let objects: SharedObjectStore = Arc::new(FsObjectStore::new(&config.object_store_root)?);

    info!(
        database = %config.database_path,
        objects = %config.object_store_root,
        "starting objective sync server"
    );

    objective_sync::mount(rocket, config, store, identity, objects)
        .launch()
        .await?;

    Ok(())
}

pub mod config;
pub mod data;
pub mod identity;
pub mod internal_error;
pub mod object_store;
pub mod objectives;

use rocket::http::Status;
use rocket::{catch, catchers, routes, Build, Request, Rocket};

use crate::config::Config;
use crate::data::Envelope;
use crate::identity::SharedIdentity;
use crate::object_store::SharedObjectStore;
use crate::objectives::endpoints;
use crate::objectives::SharedStore;

#[catch(default)]
fn default_catcher(status: Status, _request: &Request) -> Envelope<()> {
    let message = status.reason().unwrap_or("Unknown error.");
    Envelope::failure(status, message)
}

/// Attaches the record, backup and attachment routes to `rocket` under `/api`.
pub fn mount(
    rocket: Rocket<Build>,
    config: Config,
    store: SharedStore,
    identity: SharedIdentity,
    objects: SharedObjectStore,
) -> Rocket<Build> {
    rocket
        .manage(config)
        .manage(store)
        .manage(identity)
        .manage(objects)
        .mount(
            "/api",
            routes![
                endpoints::alive,
                endpoints::get_objectives,
                endpoints::get_objective,
                endpoints::get_items,
                endpoints::get_item,
                endpoints::put_objectives_endpoint,
                endpoints::delete_objectives_endpoint,
                endpoints::put_items_endpoint,
                endpoints::delete_items_endpoint,
                endpoints::sync,
                endpoints::backup,
                endpoints::get_backup_list,
                endpoints::upload_attachment,
                endpoints::get_attachment,
                endpoints::delete_attachment,
                endpoints::generate_get_url,
                endpoints::generate_put_url,
                endpoints::generate_delete_url,
            ],
        )
        .register("/", catchers![default_catcher])
}

#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate polls_test;

use rocket::{Build, Rocket};
use rocket_dyn_templates::Template;

use crate::config::StoreFairing;
use crate::logging::LoggerFairing;
use crate::model::store::Store;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod views;

/// Build the server, connecting to whichever store is configured.
pub fn build() -> Rocket<Build> {
    rocket_base().attach(StoreFairing)
}

/// Build the server around an already-prepared store.
pub fn rocket_for_store(store: Store) -> Rocket<Build> {
    rocket_base().manage(store)
}

fn rocket_base() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(Template::fairing())
}

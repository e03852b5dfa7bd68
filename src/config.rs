use std::path::PathBuf;
use std::sync::Arc;

use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    fixtures,
    mongodb::MongoStore,
    store::{MemoryStore, Store},
};

/// Storage configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// MongoDB connection string. Without one, polls live in memory only.
    #[serde(default)]
    db_uri: Option<String>,
    /// Database to use within the MongoDB deployment.
    #[serde(default = "default_db_name")]
    db_name: String,
    /// JSON file of questions to load on launch.
    #[serde(default)]
    fixtures: Option<PathBuf>,
}

fn default_db_name() -> String {
    "polls".to_string()
}

impl Config {
    pub fn db_uri(&self) -> Option<&str> {
        self.db_uri.as_deref()
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn fixtures(&self) -> Option<&PathBuf> {
        self.fixtures.as_ref()
    }
}

/// A fairing that loads the storage config, connects to MongoDB (or falls back
/// to an in-memory store), loads any fixtures, and places the resulting
/// [`Store`] into managed state. A MongoDB `Client` and `Database` are managed
/// alongside it when in use.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Poll store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let store: Store = match config.db_uri() {
            Some(db_uri) => {
                info!("Loaded database config, connecting...");
                let client = match MongoClient::with_uri_str(db_uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                let db = client.database(config.db_name());
                // Ensure the required indexes and ID counters exist.
                let store = match MongoStore::prepare(&db).await {
                    Ok(store) => store,
                    Err(e) => {
                        error!("Failed to prepare database: {e}");
                        return Err(rocket);
                    }
                };
                info!("...database connection online!");
                rocket = rocket.manage(client).manage(db);
                Arc::new(store)
            }
            None => {
                warn!("No `db_uri` configured, polls will only be kept in memory");
                Arc::new(MemoryStore::new())
            }
        };

        if let Some(path) = config.fixtures() {
            let loaded = match fixtures::load(path) {
                Ok(questions) => fixtures::seed(store.as_ref(), questions).await,
                Err(e) => Err(e),
            };
            match loaded {
                Ok(count) => info!("Loaded {count} questions from {}", path.display()),
                Err(e) => {
                    error!("Failed to load fixtures from {}: {e}", path.display());
                    return Err(rocket);
                }
            }
        }

        // Manage the state.
        rocket = rocket.manage(store);
        Ok(rocket)
    }
}

#[cfg(test)]
mod tests {
    use rocket::figment::{providers::Serialized, Figment};

    use super::*;

    #[test]
    fn defaults() {
        let config: Config = Figment::new().extract().unwrap();
        assert_eq!(config.db_uri(), None);
        assert_eq!(config.db_name(), "polls");
        assert_eq!(config.fixtures(), None);
    }

    #[test]
    fn overrides() {
        let config: Config = Figment::new()
            .merge(Serialized::default("db_uri", "mongodb://localhost:27017"))
            .merge(Serialized::default("fixtures", "fixtures/polls.json"))
            .extract()
            .unwrap();
        assert_eq!(config.db_uri(), Some("mongodb://localhost:27017"));
        assert_eq!(config.fixtures(), Some(&PathBuf::from("fixtures/polls.json")));
    }

    #[rocket::async_test]
    async fn memory_store_with_fixtures() {
        let rocket = rocket::custom(
            rocket::Config::figment().merge(("fixtures", "fixtures/polls.json")),
        )
        .attach(StoreFairing)
        .ignite()
        .await
        .unwrap();

        let store = rocket.state::<Store>().unwrap();
        assert!(!store.latest_questions(5).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn missing_fixtures_abort_launch() {
        let ignited = rocket::custom(
            rocket::Config::figment().merge(("fixtures", "fixtures/does-not-exist.json")),
        )
        .attach(StoreFairing)
        .ignite()
        .await;
        match ignited {
            Ok(_) => panic!("launch should fail without its fixtures"),
            // Inspecting the error's kind marks it as handled.
            Err(error) => assert!(matches!(
                error.kind(),
                rocket::error::ErrorKind::FailedFairings(_)
            )),
        }
    }
}

//! Shared setup for the integration tests: memory backends wired the same
//! way the binary wires its configured ones.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use tasktrack::cache::MemoryCache;
use tasktrack::config::Config;
use tasktrack::lock::MemoryLeaseStore;
use tasktrack::state::AppState;
use tasktrack::storage::InMemoryStore;
use tasktrack_core::record::{Actor, EntityData, Project, Task, VersionedRecord};

pub fn config(vars: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| vars.get(key).cloned())
}

pub struct Setup {
    pub state: AppState,
    pub store: InMemoryStore,
    pub cache: MemoryCache,
}

pub fn setup_with(config: &Config) -> Setup {
    let store = InMemoryStore::new();
    let cache = MemoryCache::new(config.cache_max_entries);
    let state = AppState::build(
        Arc::new(store.clone()),
        Arc::new(cache.clone()),
        Arc::new(MemoryLeaseStore::new()),
        config,
    );
    Setup {
        state,
        store,
        cache,
    }
}

pub fn setup() -> Setup {
    setup_with(&config(&[]))
}

pub fn actor(name: &str) -> Actor {
    Actor::new(name)
}

pub async fn create_task(state: &AppState, title: &str) -> VersionedRecord {
    state
        .pipeline
        .create(
            Uuid::new_v4(),
            EntityData::Task(Task::new(Uuid::new_v4(), title)),
            &actor("alice"),
        )
        .await
        .record()
        .cloned()
        .expect("task created")
}

pub async fn create_project(state: &AppState, workspace_id: Uuid, name: &str) -> VersionedRecord {
    state
        .pipeline
        .create(
            workspace_id,
            EntityData::Project(Project::new(name)),
            &actor("alice"),
        )
        .await
        .record()
        .cloned()
        .expect("project created")
}

// master/src/state.rs

use common::TaskId;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use worker::SharedTranslator;

use crate::config::EngineConfig;
use crate::task::TaskRuntime;

#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<Mutex<HashMap<TaskId, Arc<TaskRuntime>>>>,
    pub translator: SharedTranslator,
    pub config: Arc<EngineConfig>,
}

impl AppState {
    pub fn new(config: EngineConfig, translator: SharedTranslator) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            translator,
            config: Arc::new(config),
        }
    }

    pub fn task(&self, id: &str) -> Option<Arc<TaskRuntime>> {
        lock(&self.tasks).get(id).cloned()
    }

    pub fn all_tasks(&self) -> Vec<Arc<TaskRuntime>> {
        lock(&self.tasks).values().cloned().collect()
    }
}

/// Toma el lock aunque otro hilo haya entrado en pánico con él: cada sección
/// crítica es una actualización de campos, así que el dato sigue siendo coherente.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use blood_alert_core::ports::{Clock, DatabaseService};
use blood_alert_core::service::SosService;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub sos: SosService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Arc<dyn DatabaseService>, clock: Arc<dyn Clock>, config: Arc<Config>) -> Self {
        let sos = SosService::new(db.clone(), clock);
        Self { db, sos, config }
    }
}

use std::sync::Arc;

use staffing_core::{FloaterWeighting, Sessions, Store};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: Arc<Sessions<dyn Store>>,
    pub weighting: FloaterWeighting,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        let sessions = Sessions::new(store.clone(), config.session, config.weighting);
        Self {
            store,
            sessions: Arc::new(sessions),
            weighting: config.weighting,
        }
    }
}

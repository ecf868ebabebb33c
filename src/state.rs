use std::sync::Arc;

use crate::config::CoreConfig;
use crate::services::device_state::DeviceState;
use crate::services::estimator::{FileModelStore, ModelStore};
use crate::services::uploads::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub config: CoreConfig,
    pub models: Arc<dyn ModelStore>,
    pub uploads: Arc<UploadStore>,
    pub device: Arc<DeviceState>,
}

impl AppState {
    pub fn from_config(config: CoreConfig) -> Self {
        let models: Arc<dyn ModelStore> = Arc::new(FileModelStore::new(config.models_path.clone()));
        let uploads = Arc::new(UploadStore::new(config.uploads_path.clone()));
        let device = Arc::new(DeviceState::new(
            config.live_floor_voltage,
            config.live_ceiling_voltage,
        ));
        Self {
            config,
            models,
            uploads,
            device,
        }
    }
}

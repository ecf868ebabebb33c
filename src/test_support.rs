use crate::config::CoreConfig;
use crate::services::estimator::{BoostingParams, SequenceParams};
use crate::state::AppState;

pub fn test_config() -> CoreConfig {
    let tempdir = tempfile::tempdir().expect("tempdir");
    let data_root = tempdir.keep();

    CoreConfig {
        data_root: data_root.clone(),
        uploads_path: data_root.join("uploads"),
        models_path: data_root.join("models"),
        sequence: SequenceParams {
            hidden_units: 8,
            epochs: 2,
            ..SequenceParams::default()
        },
        boosting: BoostingParams {
            n_estimators: 20,
            ..BoostingParams::default()
        },
        live_floor_voltage: 9.0,
        live_ceiling_voltage: 12.6,
    }
}

pub fn test_state() -> AppState {
    AppState::from_config(test_config())
}

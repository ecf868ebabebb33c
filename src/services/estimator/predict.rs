use serde::{Deserialize, Serialize};

use super::store::ModelStore;
use super::{round_to, DurationMap, ModelKind, Reading, Regressor, SessionId};
use crate::error::{EstimatorError, Result};

pub const DEFAULT_VOLTAGE: f64 = 0.0;
pub const DEFAULT_CURRENT: f64 = 0.5;
pub const DEFAULT_TEMPERATURE: f64 = 25.0;

/// A JSON number or a numeric string, as posted by form-driven clients.
#[derive(Debug, Clone, PartialEq, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

impl NumericInput {
    /// `None` for blank text. `NaN` and infinities are rejected.
    pub fn value(&self, field: &str) -> Result<Option<f64>> {
        match self {
            Self::Number(value) if value.is_finite() => Ok(Some(*value)),
            Self::Number(value) => Err(EstimatorError::invalid_number(field, value.to_string())),
            Self::Text(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|value| value.is_finite())
                    .map(Some)
                    .ok_or_else(|| EstimatorError::invalid_number(field, trimmed))
            }
        }
    }
}

impl From<f64> for NumericInput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct PredictRequest {
    #[serde(alias = "user_id")]
    pub session_id: String,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub soc: Option<NumericInput>,
    #[serde(default)]
    pub voltage: Option<NumericInput>,
    #[serde(default)]
    pub current: Option<NumericInput>,
    #[serde(default, alias = "temperature")]
    pub temp: Option<NumericInput>,
}

impl PredictRequest {
    fn reading(&self) -> Result<Reading> {
        let field = |input: &Option<NumericInput>, name: &str, default: f64| -> Result<f64> {
            match input {
                Some(input) => Ok(input.value(name)?.unwrap_or(default)),
                None => Ok(default),
            }
        };
        Ok(Reading::new(
            field(&self.voltage, "voltage", DEFAULT_VOLTAGE)?,
            field(&self.current, "current", DEFAULT_CURRENT)?,
            field(&self.temp, "temp", DEFAULT_TEMPERATURE)?,
        ))
    }

    fn direct_soc(&self) -> Result<Option<f64>> {
        match &self.soc {
            Some(input) => input.value("soc"),
            None => Ok(None),
        }
    }

    fn model_kind(&self) -> Result<ModelKind> {
        self.model_type.as_deref().unwrap_or_default().parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PredictResponse {
    pub soc: f64,
    pub time_remaining_min: f64,
    pub engine_used: String,
}

/// Where a predicted SoC came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Direct,
    Model(ModelKind),
}

impl Engine {
    pub fn label(self) -> String {
        match self {
            Self::Direct => "Direct Input".to_string(),
            Self::Model(kind) => format!("{} AI Model", kind.label()),
        }
    }
}

/// Resolves a prediction request against the artifacts stored for its session.
pub fn predict(store: &dyn ModelStore, request: &PredictRequest) -> Result<PredictResponse> {
    let session = SessionId::parse(&request.session_id)?;

    // A direct SoC needs no regressor, so the model type is only checked
    // on the regressor path.
    let (raw_soc, engine) = match request.direct_soc()? {
        Some(soc) => (soc, Engine::Direct),
        None => {
            let kind = request.model_kind()?;
            let reading = request.reading()?;
            let model = store.model(session, kind)?;
            (model.predict(&reading), Engine::Model(kind))
        }
    };

    let map = match store.duration_map(session) {
        Ok(map) => map,
        Err(EstimatorError::ArtifactNotFound { .. }) => {
            let kind = match engine {
                Engine::Model(kind) => kind,
                Engine::Direct => request.model_kind().unwrap_or_default(),
            };
            return Err(EstimatorError::ModelNotTrained { kind });
        }
        Err(err) => return Err(err),
    };
    let response = finish(raw_soc, engine, &map)?;

    tracing::info!(
        session_id = %session,
        engine = %response.engine_used,
        soc = response.soc,
        time_remaining_min = response.time_remaining_min,
        "prediction served"
    );
    Ok(response)
}

/// Runs `regressor` on `reading` and converts the result like a stored model.
pub fn predict_with(
    regressor: &dyn Regressor,
    kind: ModelKind,
    reading: &Reading,
    map: &DurationMap,
) -> Result<PredictResponse> {
    finish(regressor.predict(reading), Engine::Model(kind), map)
}

fn finish(raw_soc: f64, engine: Engine, map: &DurationMap) -> Result<PredictResponse> {
    if !raw_soc.is_finite() {
        return Err(EstimatorError::Model(format!(
            "{} produced a non-finite SoC ({raw_soc})",
            engine.label()
        )));
    }
    let soc = raw_soc.clamp(0.0, 100.0);
    let seconds = map.remaining_seconds(soc)?;
    Ok(PredictResponse {
        soc: round_to(soc, 2),
        time_remaining_min: round_to(seconds / 60.0, 2),
        engine_used: engine.label(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::estimator::{
        Artifact, BoostedTrees, BoostingParams, MemoryModelStore, TrainedModel, TrainingRow,
    };
    use std::cell::Cell;

    struct Fixed {
        value: f64,
        calls: Cell<usize>,
    }

    impl Fixed {
        fn new(value: f64) -> Self {
            Self {
                value,
                calls: Cell::new(0),
            }
        }
    }

    impl Regressor for Fixed {
        fn predict(&self, _reading: &Reading) -> f64 {
            self.calls.set(self.calls.get() + 1);
            self.value
        }
    }

    fn rows() -> Vec<TrainingRow> {
        (0..=100)
            .map(|t| TrainingRow {
                voltage: 12.6 - t as f64 * 0.036,
                current: 1.0,
                temperature: 25.0,
                soc: 100.0 - t as f64,
                time: t as f64 * 30.0,
                remaining_time: (100 - t) as f64 * 30.0,
            })
            .collect()
    }

    fn seeded_store(with_model: bool) -> (MemoryModelStore, SessionId) {
        let store = MemoryModelStore::new();
        let session = SessionId::generate();
        store
            .put(session, &Artifact::DurationMap(DurationMap::build(&rows())))
            .unwrap();
        if with_model {
            let params = BoostingParams {
                n_estimators: 10,
                ..BoostingParams::default()
            };
            let model = BoostedTrees::fit(&rows(), &params).unwrap();
            store
                .put(session, &Artifact::Model(TrainedModel::Fast(model)))
                .unwrap();
        }
        (store, session)
    }

    #[test]
    fn direct_soc_bypasses_the_regressor() {
        let (store, session) = seeded_store(false);
        let request = PredictRequest {
            session_id: session.to_string(),
            soc: Some(NumericInput::Number(42.0)),
            ..PredictRequest::default()
        };
        let response = predict(&store, &request).unwrap();
        assert_eq!(response.soc, 42.0);
        assert_eq!(response.engine_used, "Direct Input");
        // SoC 42 sits at t = 58 samples -> 42 * 30 s.
        assert_eq!(response.time_remaining_min, 21.0);
    }

    #[test]
    fn direct_soc_accepts_numeric_strings_and_ignores_blanks() {
        let (store, session) = seeded_store(true);
        let request: PredictRequest = serde_json::from_value(serde_json::json!({
            "session_id": session.to_string(),
            "model_type": "fast",
            "soc": " 55.5 ",
        }))
        .unwrap();
        assert_eq!(predict(&store, &request).unwrap().soc, 55.5);

        let request: PredictRequest = serde_json::from_value(serde_json::json!({
            "session_id": session.to_string(),
            "model_type": "fast",
            "soc": "",
            "voltage": "12.6",
        }))
        .unwrap();
        assert_eq!(
            predict(&store, &request).unwrap().engine_used,
            "FAST AI Model"
        );
    }

    #[test]
    fn regressor_output_is_clipped() {
        let map = DurationMap::build(&rows());
        let reading = Reading::new(11.0, 1.0, 25.0);

        let high = Fixed::new(150.0);
        let response = predict_with(&high, ModelKind::Fast, &reading, &map).unwrap();
        assert_eq!(response.soc, 100.0);
        assert_eq!(response.time_remaining_min, 50.0);
        assert_eq!(high.calls.get(), 1);

        let low = Fixed::new(-20.0);
        let response = predict_with(&low, ModelKind::Sequence, &reading, &map).unwrap();
        assert_eq!(response.soc, 0.0);
        assert_eq!(response.time_remaining_min, 0.0);
        assert_eq!(response.engine_used, "SEQUENCE AI Model");
    }

    #[test]
    fn missing_model_asks_for_training() {
        let (store, session) = seeded_store(false);
        let request = PredictRequest {
            session_id: session.to_string(),
            model_type: Some("pro".to_string()),
            voltage: Some(11.0.into()),
            ..PredictRequest::default()
        };
        let err = predict(&store, &request).unwrap_err();
        assert!(matches!(
            err,
            EstimatorError::ModelNotTrained {
                kind: ModelKind::Sequence
            }
        ));
        assert!(err.to_string().contains("train first"));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let (store, session) = seeded_store(true);
        let request = PredictRequest {
            session_id: session.to_string(),
            voltage: Some(NumericInput::Text("twelve".to_string())),
            ..PredictRequest::default()
        };
        assert!(matches!(
            predict(&store, &request),
            Err(EstimatorError::InvalidNumber { .. })
        ));

        let request = PredictRequest {
            session_id: session.to_string(),
            model_type: Some("lstm".to_string()),
            ..PredictRequest::default()
        };
        assert!(matches!(
            predict(&store, &request),
            Err(EstimatorError::UnknownModelKind(_))
        ));

        let request = PredictRequest {
            session_id: "not-a-session".to_string(),
            ..PredictRequest::default()
        };
        assert!(matches!(
            predict(&store, &request),
            Err(EstimatorError::UnknownSession(_))
        ));
    }

    #[test]
    fn non_finite_soc_is_rejected() {
        let (store, session) = seeded_store(true);
        for raw in ["NaN", "nan", "inf", "-Infinity"] {
            let request: PredictRequest = serde_json::from_value(serde_json::json!({
                "session_id": session.to_string(),
                "soc": raw,
            }))
            .unwrap();
            assert!(
                matches!(
                    predict(&store, &request),
                    Err(EstimatorError::InvalidNumber { ref field, .. }) if field == "soc"
                ),
                "{raw} accepted"
            );
        }

        let request = PredictRequest {
            session_id: session.to_string(),
            voltage: Some(NumericInput::Text("NaN".to_string())),
            ..PredictRequest::default()
        };
        assert!(matches!(
            predict(&store, &request),
            Err(EstimatorError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn non_finite_regressor_output_is_an_error() {
        let map = DurationMap::build(&rows());
        let reading = Reading::new(11.0, 1.0, 25.0);
        for value in [f64::NAN, f64::INFINITY] {
            let broken = Fixed::new(value);
            let err = predict_with(&broken, ModelKind::Fast, &reading, &map).unwrap_err();
            assert!(matches!(err, EstimatorError::Model(_)));
            assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn direct_soc_ignores_the_model_type() {
        let (store, session) = seeded_store(false);
        let request: PredictRequest = serde_json::from_value(serde_json::json!({
            "session_id": session.to_string(),
            "model_type": "xgb",
            "soc": 42,
        }))
        .unwrap();
        let response = predict(&store, &request).unwrap();
        assert_eq!(response.engine_used, "Direct Input");
        assert_eq!(response.soc, 42.0);
    }

    #[test]
    fn defaults_fill_missing_sensor_values() {
        let request = PredictRequest::default();
        let reading = request.reading().unwrap();
        assert_eq!(reading, Reading::new(0.0, 0.5, 25.0));
    }
}

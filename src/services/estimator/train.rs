use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::features::{self, ColumnMapping, RawTable};
use super::store::{ModelStore, SessionArtifacts};
use super::{DurationMap, ModelKind, SessionId, TrainedModel, TrainingParams};
use crate::error::{EstimatorError, Result};

/// Upper bound on points returned for plotting a training series.
pub const GRAPH_POINTS: usize = 500;

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct TrainRequest {
    #[serde(alias = "user_id")]
    pub session_id: String,
    #[serde(default)]
    pub mapping: ColumnMapping,
    #[serde(default)]
    pub model_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct GraphData {
    pub time: Vec<f64>,
    pub soc: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TrainResponse {
    pub status: String,
    pub model_type: ModelKind,
    pub highlights: BTreeMap<String, String>,
    pub max_voltage: f64,
    pub graph_data: GraphData,
    /// False when the series was too short to fit the requested engine.
    pub model_persisted: bool,
}

/// Extracts the training series, builds the duration map, fits the engine
/// for `kind` and persists the results. Nothing is written unless every
/// step before persistence succeeded.
pub fn train(
    store: &dyn ModelStore,
    table: &RawTable,
    session: SessionId,
    mapping: &ColumnMapping,
    kind: ModelKind,
    params: &TrainingParams,
) -> Result<TrainResponse> {
    let series = features::extract(table, mapping)?;
    if series.rows.is_empty() {
        return Err(EstimatorError::DurationMapEmpty);
    }

    let duration_map = DurationMap::build(&series.rows);
    let highlights = duration_map.highlights()?;
    let model = TrainedModel::fit(kind, &series.rows, params)?;
    if model.is_none() {
        tracing::warn!(
            session_id = %session,
            model_kind = %kind,
            rows = series.rows.len(),
            "training series too short; no model stored"
        );
    }

    let model_persisted = SessionArtifacts {
        duration_map,
        model,
    }
    .persist(store, session)?;

    tracing::info!(
        session_id = %session,
        model_kind = %kind,
        rows = series.rows.len(),
        max_time = series.max_time,
        model_persisted,
        "training complete"
    );

    Ok(TrainResponse {
        status: "success".to_string(),
        model_type: kind,
        highlights,
        max_voltage: series.max_voltage(),
        graph_data: decimate(&series.rows),
        model_persisted,
    })
}

fn decimate(rows: &[features::TrainingRow]) -> GraphData {
    let step = (rows.len() / GRAPH_POINTS).max(1);
    let mut graph = GraphData::default();
    for row in rows.iter().step_by(step) {
        graph.time.push(row.time);
        graph.soc.push(row.soc);
    }
    graph
}

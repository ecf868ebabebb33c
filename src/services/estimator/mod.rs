pub mod boosting;
pub mod duration_map;
pub mod features;
pub mod predict;
pub mod scaler;
pub mod sequence;
pub mod store;
pub mod train;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{EstimatorError, Result};

pub use boosting::{BoostedTrees, BoostingParams};
pub use duration_map::DurationMap;
pub use features::{ColumnMapping, ExtractedSeries, RawTable, TrainingRow};
pub use sequence::{SequenceModel, SequenceParams};
pub use store::{
    Artifact, ArtifactKind, FileModelStore, MemoryModelStore, ModelStore, SessionArtifacts,
};

/// Which regression engine a session is trained with or predicted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Fast,
    #[serde(alias = "pro")]
    Sequence,
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::Fast
    }
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Sequence => "sequence",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Fast => "FAST",
            Self::Sequence => "SEQUENCE",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = EstimatorError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "fast" => Ok(Self::Fast),
            "sequence" | "pro" => Ok(Self::Sequence),
            other => Err(EstimatorError::UnknownModelKind(other.to_string())),
        }
    }
}

/// Opaque per-upload identifier. Always a UUID so it is safe to embed in file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| EstimatorError::UnknownSession(raw.trim().to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One instantaneous sensor sample fed to a regressor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Reading {
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
}

impl Reading {
    pub fn new(voltage: f64, current: f64, temperature: f64) -> Self {
        Self {
            voltage,
            current,
            temperature,
        }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.voltage, self.current, self.temperature]
    }
}

/// Shared inference capability of both engines.
pub trait Regressor {
    /// Raw SoC estimate, unclipped.
    fn predict(&self, reading: &Reading) -> f64;
}

/// A fitted engine as stored for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    Fast(BoostedTrees),
    Sequence(SequenceModel),
}

impl TrainedModel {
    /// Fits the engine selected by `kind`. `Ok(None)` means the data could not
    /// produce a model (sequence engine with too few rows).
    pub fn fit(
        kind: ModelKind,
        rows: &[TrainingRow],
        params: &TrainingParams,
    ) -> Result<Option<Self>> {
        Ok(match kind {
            ModelKind::Fast => BoostedTrees::fit(rows, &params.boosting).map(Self::Fast),
            ModelKind::Sequence => {
                SequenceModel::fit(rows, &params.sequence)?.map(Self::Sequence)
            }
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Fast(_) => ModelKind::Fast,
            Self::Sequence(_) => ModelKind::Sequence,
        }
    }
}

impl Regressor for TrainedModel {
    fn predict(&self, reading: &Reading) -> f64 {
        match self {
            Self::Fast(model) => model.predict(reading),
            Self::Sequence(model) => model.predict(reading),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainingParams {
    pub boosting: BoostingParams,
    pub sequence: SequenceParams,
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_parses_aliases() {
        assert_eq!("fast".parse::<ModelKind>().unwrap(), ModelKind::Fast);
        assert_eq!("PRO".parse::<ModelKind>().unwrap(), ModelKind::Sequence);
        assert_eq!(" sequence ".parse::<ModelKind>().unwrap(), ModelKind::Sequence);
        assert_eq!("".parse::<ModelKind>().unwrap(), ModelKind::Fast);
        assert!(matches!(
            "lstm".parse::<ModelKind>(),
            Err(EstimatorError::UnknownModelKind(_))
        ));
    }

    #[test]
    fn model_kind_deserializes_legacy_name() {
        let kind: ModelKind = serde_json::from_str("\"pro\"").unwrap();
        assert_eq!(kind, ModelKind::Sequence);
    }

    #[test]
    fn session_id_rejects_path_like_values() {
        assert!(SessionId::parse("../../etc/passwd").is_err());
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn round_to_two_decimals() {
        assert!((round_to(12.3456, 2) - 12.35).abs() < 1e-12);
        assert!((round_to(-0.004, 2) - 0.0).abs() < 1e-12);
    }
}

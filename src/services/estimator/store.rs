use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{DurationMap, ModelKind, SessionId, TrainedModel};
use crate::error::{EstimatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Duration,
    Fast,
    Sequence,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::Fast => "fast",
            Self::Sequence => "sequence",
        }
    }
}

impl From<ModelKind> for ArtifactKind {
    fn from(kind: ModelKind) -> Self {
        match kind {
            ModelKind::Fast => Self::Fast,
            ModelKind::Sequence => Self::Sequence,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "artifact", content = "data", rename_all = "snake_case")]
pub enum Artifact {
    DurationMap(DurationMap),
    Model(TrainedModel),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::DurationMap(_) => ArtifactKind::Duration,
            Self::Model(model) => model.kind().into(),
        }
    }
}

fn artifact_key(session: SessionId, kind: ArtifactKind) -> String {
    format!("{session}_{kind}")
}

/// Per-session artifact persistence. `put` overwrites; `get` fails with
/// `ArtifactNotFound` when nothing was stored under the key.
pub trait ModelStore: Send + Sync {
    fn put(&self, session: SessionId, artifact: &Artifact) -> Result<()>;

    fn get(&self, session: SessionId, kind: ArtifactKind) -> Result<Artifact>;

    fn duration_map(&self, session: SessionId) -> Result<DurationMap> {
        match self.get(session, ArtifactKind::Duration)? {
            Artifact::DurationMap(map) => Ok(map),
            Artifact::Model(_) => Err(EstimatorError::ArtifactNotFound {
                key: artifact_key(session, ArtifactKind::Duration),
            }),
        }
    }

    fn model(&self, session: SessionId, kind: ModelKind) -> Result<TrainedModel> {
        match self.get(session, kind.into()) {
            Ok(Artifact::Model(model)) if model.kind() == kind => Ok(model),
            Ok(_) | Err(EstimatorError::ArtifactNotFound { .. }) => {
                Err(EstimatorError::ModelNotTrained { kind })
            }
            Err(err) => Err(err),
        }
    }
}

/// Everything one training run produces for a session.
#[derive(Debug, Clone)]
pub struct SessionArtifacts {
    pub duration_map: DurationMap,
    pub model: Option<TrainedModel>,
}

impl SessionArtifacts {
    /// Writes the duration map and, when present, the model. A missing model
    /// leaves whatever was stored for that kind before.
    pub fn persist(self, store: &dyn ModelStore, session: SessionId) -> Result<bool> {
        store.put(session, &Artifact::DurationMap(self.duration_map))?;
        match self.model {
            Some(model) => {
                store.put(session, &Artifact::Model(model))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// JSON files named `{session_id}_{kind}.json` under one directory.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    root: PathBuf,
}

impl FileModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, session: SessionId, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(format!("{}.json", artifact_key(session, kind)))
    }
}

impl ModelStore for FileModelStore {
    fn put(&self, session: SessionId, artifact: &Artifact) -> Result<()> {
        let kind = artifact.kind();
        let bytes = serde_json::to_vec(artifact)?;
        std::fs::create_dir_all(&self.root)?;
        let path = self.path_for(session, kind);
        let tmp = self.root.join(format!(
            "{}.json.tmp.{}",
            artifact_key(session, kind),
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&tmp, bytes)?;
        if let Err(err) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err.into());
        }
        tracing::debug!(
            session_id = %session,
            artifact = %kind,
            path = %path.display(),
            "stored artifact"
        );
        Ok(())
    }

    fn get(&self, session: SessionId, kind: ArtifactKind) -> Result<Artifact> {
        let path = self.path_for(session, kind);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(EstimatorError::ArtifactNotFound {
                    key: artifact_key(session, kind),
                });
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, Default)]
pub struct MemoryModelStore {
    artifacts: Mutex<HashMap<(SessionId, ArtifactKind), Artifact>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for MemoryModelStore {
    fn put(&self, session: SessionId, artifact: &Artifact) -> Result<()> {
        let mut guard = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert((session, artifact.kind()), artifact.clone());
        Ok(())
    }

    fn get(&self, session: SessionId, kind: ArtifactKind) -> Result<Artifact> {
        let guard = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .get(&(session, kind))
            .cloned()
            .ok_or_else(|| EstimatorError::ArtifactNotFound {
                key: artifact_key(session, kind),
            })
    }
}

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{EstimatorError, Result};
use crate::services::estimator::{RawTable, SessionId};

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct UploadReceipt {
    pub status: String,
    pub session_id: String,
    pub headers: Vec<String>,
    pub rows: usize,
}

/// Raw session CSVs, one `{session_id}.csv` per upload.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, session: SessionId) -> PathBuf {
        self.root.join(format!("{session}.csv"))
    }

    /// Validates `bytes` as CSV and stores them under a fresh session id.
    pub async fn save(&self, bytes: &[u8]) -> Result<UploadReceipt> {
        let table = RawTable::from_reader(bytes)?;
        self.save_table(&table).await
    }

    pub async fn save_table(&self, table: &RawTable) -> Result<UploadReceipt> {
        if table.headers().iter().all(|h| h.is_empty()) {
            return Err(EstimatorError::Schema(
                "uploaded file has no header row".to_string(),
            ));
        }
        let session = SessionId::generate();
        let bytes = table.to_csv()?;

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(session);
        let tmp = self.root.join(format!("{session}.csv.tmp"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::info!(
            session_id = %session,
            rows = table.len(),
            columns = table.headers().len(),
            "stored session upload"
        );

        Ok(UploadReceipt {
            status: "success".to_string(),
            session_id: session.to_string(),
            headers: table.headers().to_vec(),
            rows: table.len(),
        })
    }

    pub async fn load(&self, session: SessionId) -> Result<RawTable> {
        let bytes = match tokio::fs::read(self.path_for(session)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(EstimatorError::UnknownSession(session.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        RawTable::from_reader(bytes.as_slice())
    }
}

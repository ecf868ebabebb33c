use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{EstimatorError, Result};
use crate::services::estimator::{round_to, RawTable};

/// Samples a recording needs before it can be labelled.
pub const MIN_RECORDING_SAMPLES: usize = 10;

pub const RECORDING_HEADERS: [&str; 5] = ["Time (s)", "Voltage (V)", "Current (A)", "Temp (C)", "SoC"];

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct LiveReading {
    pub voltage: f64,
    pub current: f64,
    pub temp: f64,
    pub soc: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct LiveSnapshot {
    pub recording: bool,
    pub latest: Option<LiveReading>,
    pub buffered_samples: usize,
}

#[derive(Debug, Default)]
struct DeviceInner {
    recording: bool,
    latest: Option<LiveReading>,
    buffer: Vec<LiveReading>,
}

/// Hardware-bridge state: the latest pushed reading plus an optional
/// in-progress recording. Shared through `AppState`.
#[derive(Debug)]
pub struct DeviceState {
    floor_voltage: f64,
    ceiling_voltage: f64,
    inner: RwLock<DeviceInner>,
}

impl DeviceState {
    pub fn new(floor_voltage: f64, ceiling_voltage: f64) -> Self {
        Self {
            floor_voltage,
            ceiling_voltage,
            inner: RwLock::new(DeviceInner::default()),
        }
    }

    /// Linear SoC between the empty-pack floor and full-pack ceiling.
    pub fn live_soc(&self, voltage: f64) -> f64 {
        let span = self.ceiling_voltage - self.floor_voltage;
        if span <= 0.0 {
            return if voltage >= self.ceiling_voltage { 100.0 } else { 0.0 };
        }
        ((voltage - self.floor_voltage) / span * 100.0).clamp(0.0, 100.0)
    }

    pub async fn ingest(&self, voltage: f64, current: f64, temp: f64) -> LiveReading {
        self.ingest_at(voltage, current, temp, Utc::now()).await
    }

    pub async fn ingest_at(
        &self,
        voltage: f64,
        current: f64,
        temp: f64,
        timestamp: DateTime<Utc>,
    ) -> LiveReading {
        let reading = LiveReading {
            voltage,
            current,
            temp,
            soc: round_to(self.live_soc(voltage), 1),
            timestamp,
        };
        let mut inner = self.inner.write().await;
        if inner.recording {
            inner.buffer.push(reading.clone());
        }
        inner.latest = Some(reading.clone());
        reading
    }

    pub async fn snapshot(&self) -> LiveSnapshot {
        let inner = self.inner.read().await;
        LiveSnapshot {
            recording: inner.recording,
            latest: inner.latest.clone(),
            buffered_samples: inner.buffer.len(),
        }
    }

    /// Starts a fresh recording, discarding any unfinished one.
    pub async fn start_recording(&self) -> LiveSnapshot {
        {
            let mut inner = self.inner.write().await;
            if inner.recording {
                tracing::warn!(
                    discarded = inner.buffer.len(),
                    "restarting recording; unfinished samples dropped"
                );
            }
            inner.recording = true;
            inner.buffer.clear();
        }
        tracing::info!("recording started");
        self.snapshot().await
    }

    /// Ends the recording and labels it as a training table. The buffer is
    /// consumed even when labelling fails.
    pub async fn stop_recording(&self) -> Result<RawTable> {
        let samples = {
            let mut inner = self.inner.write().await;
            inner.recording = false;
            std::mem::take(&mut inner.buffer)
        };
        tracing::info!(samples = samples.len(), "recording stopped");
        recording_table(&samples)
    }
}

/// SoC falling linearly from 100 at the first sample to 0 at the last,
/// rounded to 0.1.
pub fn label_linear_soc(times: &[f64]) -> Result<Vec<f64>> {
    if times.len() < MIN_RECORDING_SAMPLES {
        return Err(EstimatorError::RecordingTooShort(format!(
            "{} samples, at least {MIN_RECORDING_SAMPLES} required",
            times.len()
        )));
    }
    let min = times.iter().copied().fold(f64::INFINITY, f64::min);
    let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let duration = max - min;
    if duration <= 0.0 {
        return Err(EstimatorError::RecordingTooShort(
            "recording duration is zero".to_string(),
        ));
    }
    Ok(times
        .iter()
        .map(|t| round_to(100.0 - (t - min) / duration * 100.0, 1).clamp(0.0, 100.0))
        .collect())
}

fn recording_table(samples: &[LiveReading]) -> Result<RawTable> {
    let Some(start) = samples.iter().map(|s| s.timestamp).min() else {
        return Err(EstimatorError::RecordingTooShort(
            "no samples were recorded".to_string(),
        ));
    };
    let mut ordered = samples.to_vec();
    ordered.sort_by_key(|s| s.timestamp);

    let times: Vec<f64> = ordered
        .iter()
        .map(|s| (s.timestamp - start).num_milliseconds() as f64 / 1000.0)
        .collect();
    let soc = label_linear_soc(&times)?;

    let records = ordered
        .iter()
        .zip(times.iter().zip(&soc))
        .map(|(sample, (time, soc))| {
            vec![
                time.to_string(),
                sample.voltage.to_string(),
                sample.current.to_string(),
                sample.temp.to_string(),
                soc.to_string(),
            ]
        })
        .collect();
    let headers = RECORDING_HEADERS.iter().map(|h| h.to_string()).collect();
    Ok(RawTable::new(headers, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn live_soc_is_linear_and_clipped() {
        let device = DeviceState::new(9.0, 12.6);
        assert_eq!(device.live_soc(9.0), 0.0);
        assert_eq!(device.live_soc(12.6), 100.0);
        assert!((device.live_soc(10.8) - 50.0).abs() < 1e-9);
        assert_eq!(device.live_soc(13.5), 100.0);
        assert_eq!(device.live_soc(5.0), 0.0);
    }

    #[test]
    fn linear_labels_run_from_full_to_empty() {
        let times: Vec<f64> = (0..11).map(|t| t as f64 * 3.0).collect();
        let soc = label_linear_soc(&times).unwrap();
        assert_eq!(soc[0], 100.0);
        assert_eq!(soc[5], 50.0);
        assert_eq!(soc[10], 0.0);
        assert_eq!(soc[1], 90.0);
    }

    #[test]
    fn labelling_rejects_short_or_flat_recordings() {
        assert!(matches!(
            label_linear_soc(&[0.0, 1.0, 2.0]),
            Err(EstimatorError::RecordingTooShort(_))
        ));
        assert!(matches!(
            label_linear_soc(&[5.0; 12]),
            Err(EstimatorError::RecordingTooShort(_))
        ));
    }

    #[tokio::test]
    async fn ingest_updates_latest_reading() {
        let device = DeviceState::new(9.0, 12.6);
        assert!(device.snapshot().await.latest.is_none());

        let reading = device.ingest(10.8, 1.2, 24.0).await;
        assert!((reading.soc - 50.0).abs() < 1e-9);

        let snapshot = device.snapshot().await;
        assert!(!snapshot.recording);
        assert_eq!(snapshot.buffered_samples, 0);
        assert_eq!(snapshot.latest, Some(reading));
    }

    #[tokio::test]
    async fn recording_produces_labelled_table() {
        let device = DeviceState::new(9.0, 12.6);
        device.ingest(12.6, 1.0, 25.0).await;
        assert!(device.start_recording().await.recording);

        let start = Utc::now();
        for i in 0..12 {
            device
                .ingest_at(
                    12.6 - i as f64 * 0.3,
                    1.0,
                    25.0,
                    start + Duration::seconds(i * 5),
                )
                .await;
        }
        assert_eq!(device.snapshot().await.buffered_samples, 12);

        let table = device.stop_recording().await.unwrap();
        assert_eq!(table.len(), 12);
        assert_eq!(table.headers()[0], "Time (s)");
        assert_eq!(table.headers()[4], "SoC");
        assert!(!device.snapshot().await.recording);

        let csv = String::from_utf8(table.to_csv().unwrap()).unwrap();
        let first = csv.lines().nth(1).unwrap();
        assert!(first.starts_with("0,12.6,1,25,100"), "{first}");
    }

    #[tokio::test]
    async fn stopping_a_short_recording_fails_and_clears_buffer() {
        let device = DeviceState::new(9.0, 12.6);
        device.start_recording().await;
        device.ingest(12.0, 1.0, 25.0).await;
        assert!(device.stop_recording().await.is_err());
        assert_eq!(device.snapshot().await.buffered_samples, 0);
    }
}

// src/clients/telemetry.rs

use tokio::sync::mpsc::{self, error::TrySendError};
use url::Url;

use super::{TelemetrySink, endpoint};
use crate::{error::ClientError, models::telemetry::TelemetryEvent};

/// Events waiting for the forwarder before new ones are dropped.
pub const TELEMETRY_BUFFER: usize = 1024;

/// Queues events and posts them to `{base}/events` from a background task.
///
/// The queue is bounded: while the event log is slow or down, events beyond
/// the buffer are dropped. Delivery failures are logged and dropped too;
/// there is no retry queue.
pub struct HttpTelemetrySink {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl HttpTelemetrySink {
    /// Starts the forwarder task. Must be called inside a tokio runtime.
    pub fn spawn(client: reqwest::Client, base: &Url) -> Result<Self, ClientError> {
        Self::with_capacity(client, base, TELEMETRY_BUFFER)
    }

    pub fn with_capacity(client: reqwest::Client, base: &Url, capacity: usize) -> Result<Self, ClientError> {
        let url = endpoint(base, &["events"])?;
        let (tx, mut rx) = mpsc::channel::<TelemetryEvent>(capacity);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = deliver(&client, &url, &event).await {
                    tracing::warn!(
                        "Dropping telemetry event for session {}: {}",
                        event.session_id,
                        e
                    );
                }
            }
            tracing::debug!("Telemetry forwarder stopped");
        });

        Ok(Self { tx })
    }

    /// Events queued and not yet picked up by the forwarder.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

async fn deliver(client: &reqwest::Client, url: &Url, event: &TelemetryEvent) -> Result<(), ClientError> {
    let response = client.post(url.clone()).json(event).send().await?;
    if !response.status().is_success() {
        return Err(ClientError::Status(response.status().as_u16()));
    }
    Ok(())
}

impl TelemetrySink for HttpTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    "Telemetry queue full, dropping event for session {}",
                    event.session_id
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Telemetry forwarder is gone, event dropped");
            }
        }
    }
}

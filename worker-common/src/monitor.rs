//! C4: best-effort, non-blocking heartbeats and per-job completion reports
//! to an external monitoring endpoint. Never allowed to block or fail the
//! pipeline: every request uses a 5-second abort timeout and every error is
//! swallowed at debug level.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringStatus {
    pub status: String,
    pub current_scene_id: Option<String>,
    pub current_step: Option<String>,
    pub progress_percent: Option<f32>,
    pub started_at: Option<DateTime<Utc>>,
    pub is_priority: Option<bool>,
}

impl Default for MonitoringStatus {
    fn default() -> Self {
        Self {
            status: "idle".to_owned(),
            current_scene_id: None,
            current_step: None,
            progress_percent: None,
            started_at: None,
            is_priority: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatPayload<'a> {
    consumer_id: &'a str,
    process_method: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_scene_id: &'a Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_step: &'a Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_priority: Option<bool>,
    secret: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobCompletePayload<'a> {
    scene_id: &'a str,
    status: &'a str,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_priority: Option<bool>,
    secret: &'a str,
}

/// Generates one UUID per process (the "consumer id") and, when configured,
/// drives a 10-second heartbeat loop against the monitoring endpoint.
pub struct MonitoringReporter {
    consumer_id: Uuid,
    process_method: String,
    client: reqwest::Client,
    endpoint: Option<(String, String)>, // (monitoring_url, secret)
    status: watch::Sender<MonitoringStatus>,
}

impl MonitoringReporter {
    pub fn new(
        process_method: String,
        monitoring_url: Option<String>,
        monitoring_secret: Option<String>,
    ) -> Arc<Self> {
        let endpoint = match (monitoring_url, monitoring_secret) {
            (Some(url), Some(secret)) => Some((url, secret)),
            _ => None,
        };

        let (status, _) = watch::channel(MonitoringStatus::default());

        Arc::new(Self {
            consumer_id: Uuid::new_v4(),
            process_method,
            client: reqwest::Client::new(),
            endpoint,
            status,
        })
    }

    pub fn consumer_id(&self) -> Uuid {
        self.consumer_id
    }

    /// Spawn the background heartbeat loop. No-op if monitoring isn't
    /// configured.
    pub fn spawn_heartbeat_loop(self: &Arc<Self>) {
        let Some(_) = &self.endpoint else {
            return;
        };
        let reporter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                interval.tick().await;
                reporter.send_heartbeat().await;
            }
        });
    }

    /// Update the reported status and immediately send one heartbeat
    /// out-of-band, in addition to the regular interval.
    pub async fn set_status(&self, status: MonitoringStatus) {
        let _ = self.status.send(status);
        self.send_heartbeat().await;
    }

    async fn send_heartbeat(&self) {
        let Some((url, secret)) = &self.endpoint else {
            return;
        };

        let current = self.status.borrow().clone();
        let payload = HeartbeatPayload {
            consumer_id: &self.consumer_id.to_string(),
            process_method: &self.process_method,
            status: &current.status,
            current_scene_id: &current.current_scene_id,
            current_step: &current.current_step,
            progress_percent: current.progress_percent,
            started_at: current.started_at,
            is_priority: current.is_priority,
            secret,
        };

        let result = self
            .client
            .post(format!("{url}/api/monitoring/heartbeat"))
            .json(&payload)
            .timeout(REPORT_TIMEOUT)
            .send()
            .await;

        if let Err(e) = result {
            debug!("heartbeat report failed, ignoring: {}", e);
        }
    }

    /// Report the final outcome of a job. Swallowed on failure like every
    /// other monitoring call.
    pub async fn report_job_complete(
        &self,
        scene_id: &str,
        success: bool,
        started_at: DateTime<Utc>,
        error_message: Option<&str>,
        is_priority: Option<bool>,
    ) {
        let Some((url, secret)) = &self.endpoint else {
            return;
        };

        let completed_at = Utc::now();
        let payload = JobCompletePayload {
            scene_id,
            status: if success { "success" } else { "failed" },
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds(),
            error_message,
            is_priority,
            secret,
        };

        let result = self
            .client
            .post(format!("{url}/api/monitoring/job-complete"))
            .json(&payload)
            .timeout(REPORT_TIMEOUT)
            .send()
            .await;

        if let Err(e) = result {
            debug!("job-complete report failed, ignoring: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_without_both_url_and_secret() {
        let reporter = MonitoringReporter::new("godot_optimizer".to_owned(), None, None);
        assert!(reporter.endpoint.is_none());

        let reporter = MonitoringReporter::new(
            "godot_optimizer".to_owned(),
            Some("https://monitor.example.com".to_owned()),
            None,
        );
        assert!(reporter.endpoint.is_none());
    }

    #[tokio::test]
    async fn set_status_updates_watch_channel() {
        let reporter = MonitoringReporter::new("godot_optimizer".to_owned(), None, None);
        reporter
            .set_status(MonitoringStatus {
                status: "processing".to_owned(),
                ..Default::default()
            })
            .await;
        assert_eq!(reporter.status.borrow().status, "processing");
    }
}

//! Progress reporter used by remote services.

use std::collections::HashMap;
use std::future::Future;

use tracing::{debug, warn};

use progress_core::correlation;
use progress_core::error::short_type_name;
use progress_core::update::{ERROR, KEYWORDS_PROCESSED, STEP_PROGRESS};
use progress_core::{AggregatedView, CorrelationId, ProgressUpdate, UpdateAck};

use crate::error::ClientError;
use crate::http::HttpClient;

const UPDATE_PATH: &str = "/progress/update";

/// Reports one service's progress on one run to the progress server.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    http: HttpClient,
    correlation_id: CorrelationId,
    service_name: String,
}

impl ProgressReporter {
    /// Create a reporter. Every request carries the correlation headers.
    pub fn new(
        base_url: &str,
        correlation_id: impl Into<CorrelationId>,
        service_name: impl Into<String>,
    ) -> Self {
        let correlation_id = correlation_id.into();
        let headers = correlation::inject_into_headers(&HashMap::new(), &correlation_id);
        Self {
            http: HttpClient::new(base_url).with_headers(headers),
            correlation_id,
            service_name: service_name.into(),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Post an update. An error acknowledgement is returned as `Rejected`.
    pub async fn send(&self, update: &ProgressUpdate) -> Result<UpdateAck, ClientError> {
        let ack: UpdateAck = self.http.post_json(UPDATE_PATH, update).await?;
        if !ack.is_success() {
            return Err(ClientError::Rejected(ack.message));
        }
        debug!(
            correlation_id = %self.correlation_id,
            event_type = %update.event_type,
            "Progress update sent"
        );
        Ok(ack)
    }

    /// Report progress of a step.
    pub async fn report_step(
        &self,
        step_name: &str,
        description: &str,
        progress: f64,
    ) -> Result<UpdateAck, ClientError> {
        let update = self
            .update(STEP_PROGRESS)
            .with_step(step_name)
            .with_progress(progress, description);
        self.send(&update).await
    }

    /// Report an error in a step.
    pub async fn report_error(
        &self,
        step_name: &str,
        message: &str,
        error_type: &str,
        retry_attempt: u32,
    ) -> Result<UpdateAck, ClientError> {
        let mut update = self
            .update(ERROR)
            .with_step(step_name)
            .with_error(message, error_type, retry_attempt);
        update.current_operation = Some(format!("Error in {step_name}: {message}"));
        self.send(&update).await
    }

    /// Report how many keywords out of `total` have been processed.
    pub async fn report_keywords_processed(
        &self,
        processed: usize,
        total: usize,
    ) -> Result<UpdateAck, ClientError> {
        let progress = if total > 0 {
            processed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let update = self.update(KEYWORDS_PROCESSED).with_progress(
            progress,
            format!("Processed {processed}/{total} keywords"),
        );
        self.send(&update).await
    }

    /// Read the run's aggregated view. `None` if the server does not hold it.
    pub async fn fetch_view(&self) -> Result<Option<AggregatedView>, ClientError> {
        let path = format!("/progress/{}", self.correlation_id);
        match self.http.get_json(&path).await {
            Ok(view) => Ok(Some(view)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if the progress server is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        self.http.health().await
    }

    /// Run `work` as step `step_name`, reporting 0% on entry, 100% on
    /// success, and an error on failure.
    ///
    /// Reporting is best effort: failures to reach the server are logged and
    /// never change the result of `work`.
    pub async fn track<F, T, E>(&self, step_name: &str, description: &str, work: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.best_effort(self.report_step(step_name, description, 0.0).await);

        match work.await {
            Ok(value) => {
                let completed = format!("Completed {description}");
                self.best_effort(self.report_step(step_name, &completed, 100.0).await);
                Ok(value)
            }
            Err(e) => {
                let reported = self
                    .report_error(step_name, &e.to_string(), short_type_name::<E>(), 0)
                    .await;
                self.best_effort(reported);
                Err(e)
            }
        }
    }

    fn update(&self, event_type: &str) -> ProgressUpdate {
        ProgressUpdate::new(self.correlation_id.as_str(), event_type)
            .with_service(self.service_name.as_str())
    }

    fn best_effort(&self, outcome: Result<UpdateAck, ClientError>) {
        if let Err(e) = outcome {
            warn!(
                correlation_id = %self.correlation_id,
                error = %e,
                "Failed to send progress update"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use progress_core::Run;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ack() -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({"status": "success", "message": "Progress update received"}))
    }

    async fn setup_test_reporter() -> (MockServer, ProgressReporter) {
        let mock_server = MockServer::start().await;
        let reporter = ProgressReporter::new(&mock_server.uri(), "r1", "scraper");
        (mock_server, reporter)
    }

    #[tokio::test]
    async fn test_report_step_payload() {
        let (mock_server, reporter) = setup_test_reporter().await;
        Mock::given(method("POST"))
            .and(path("/progress/update"))
            .and(header("x-correlation-id", "r1"))
            .and(body_partial_json(json!({
                "correlation_id": "r1",
                "event_type": "step_progress",
                "service_name": "scraper",
                "step_name": "crawl",
                "progress_percentage": 40.0,
                "current_operation": "fetching",
            })))
            .respond_with(ack())
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = reporter.report_step("crawl", "fetching", 40.0).await;
        assert!(result.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_report_error_and_keywords_payloads() {
        let (mock_server, reporter) = setup_test_reporter().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "event_type": "error",
                "step_name": "crawl",
                "error_message": "timeout",
                "error_type": "TimeoutError",
                "retry_attempt": 1,
                "current_operation": "Error in crawl: timeout",
            })))
            .respond_with(ack())
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "event_type": "keywords_processed",
                "progress_percentage": 25.0,
                "current_operation": "Processed 5/20 keywords",
            })))
            .respond_with(ack())
            .expect(1)
            .mount(&mock_server)
            .await;

        reporter
            .report_error("crawl", "timeout", "TimeoutError", 1)
            .await
            .unwrap();
        reporter.report_keywords_processed(5, 20).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_ack_is_rejected() {
        let (mock_server, reporter) = setup_test_reporter().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "error", "message": "nope"})),
            )
            .mount(&mock_server)
            .await;

        let result = reporter.report_step("crawl", "x", 1.0).await;
        assert!(matches!(result, Err(ClientError::Rejected(m)) if m == "nope"));
    }

    #[tokio::test]
    async fn test_fetch_view() {
        let (mock_server, reporter) = setup_test_reporter().await;
        let run = Run::new("r1".into(), "Demo", vec!["crawl".to_string()], Utc::now());
        let view = AggregatedView::from_run(&run, Utc::now());
        Mock::given(method("GET"))
            .and(path("/progress/r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&view))
            .mount(&mock_server)
            .await;

        let fetched = reporter.fetch_view().await.unwrap().unwrap();
        assert_eq!(fetched.correlation_id, view.correlation_id);
        assert_eq!(fetched.steps.len(), 1);

        let other = ProgressReporter::new(&mock_server.uri(), "missing", "scraper");
        assert!(other.fetch_view().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_track_reports_start_and_completion() {
        let (mock_server, reporter) = setup_test_reporter().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"step_name": "crawl", "progress_percentage": 0.0})))
            .respond_with(ack())
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "progress_percentage": 100.0,
                "current_operation": "Completed crawling",
            })))
            .respond_with(ack())
            .expect(1)
            .mount(&mock_server)
            .await;

        let out: Result<u32, String> = reporter.track("crawl", "crawling", async { Ok(3) }).await;
        assert_eq!(out, Ok(3));
    }

    #[tokio::test]
    async fn test_track_reports_failure() {
        let (mock_server, reporter) = setup_test_reporter().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"event_type": "error", "error_message": "boom"})))
            .respond_with(ack())
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"event_type": "step_progress"})))
            .respond_with(ack())
            .expect(1)
            .mount(&mock_server)
            .await;

        let out: Result<u32, String> = reporter
            .track("crawl", "crawling", async { Err("boom".to_string()) })
            .await;
        assert_eq!(out, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_track_survives_unreachable_server() {
        let reporter = ProgressReporter::new("http://127.0.0.1:9", "r1", "scraper");
        let out: Result<&str, String> = reporter.track("crawl", "crawling", async { Ok("done") }).await;
        assert_eq!(out, Ok("done"));
    }
}

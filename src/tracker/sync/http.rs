use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument};

use super::{SessionReport, SyncError, SyncReporter, SyncStatus};

/// Posts each report as json to a fixed endpoint from a background task.
pub struct HttpReporter {
    client: Client,
    endpoint: Url,
    tasks: TaskTracker,
    status: Arc<watch::Sender<SyncStatus>>,
}

impl HttpReporter {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, SyncError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SyncError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(SyncError::InvalidEndpoint(format!(
                "{endpoint}: only http and https are supported"
            )));
        }

        let client = Client::builder().timeout(request_timeout).build()?;
        let (status, _) = watch::channel(SyncStatus::Idle);

        Ok(Self {
            client,
            endpoint,
            tasks: TaskTracker::new(),
            status: Arc::new(status),
        })
    }

    async fn deliver(client: &Client, endpoint: Url, report: &SessionReport) -> Result<(), SyncError> {
        let response = client.post(endpoint).json(report).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl SyncReporter for HttpReporter {
    fn report(&self, report: SessionReport) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let status = self.status.clone();
        let span = info_span!("Reporting session", project = %report.project_id);

        self.tasks.spawn(
            async move {
                match Self::deliver(&client, endpoint, &report).await {
                    Ok(()) => {
                        info!("Reported {} total minutes", report.total_minutes);
                        status.send_replace(SyncStatus::Synced { at: Utc::now() });
                    }
                    Err(e) => {
                        warn!("Report was dropped: {e}");
                        status.send_replace(SyncStatus::Failed {
                            at: Utc::now(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            .instrument(span),
        );
    }

    fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    async fn finalize(&self, wait: Duration) {
        self.tasks.close();
        if tokio::time::timeout(wait, self.tasks.wait()).await.is_err() {
            warn!("Abandoning {} reports still in flight", self.tasks.len());
        }
    }
}

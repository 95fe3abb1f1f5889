use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;

/// One outbound email. All recipients share the same rendered body.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    /// Forwarded to the provider so a repeated dispatch is not delivered twice.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    /// Provider message id, when the provider returns one.
    pub message_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Email API rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Email API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Email API did not answer within {0:?}")]
    Timeout(Duration),
}

/// Outbound transactional email.
#[async_trait]
pub trait EmailGateway: Send + Sync + 'static {
    async fn send(&self, email: &OutgoingEmail) -> Result<DispatchReceipt, GatewayError>;
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

/// Client for a Resend-compatible `POST /emails` API.
#[derive(Clone)]
pub struct ResendGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ResendGateway {
    pub fn new(config: &EmailConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl EmailGateway for ResendGateway {
    async fn send(&self, email: &OutgoingEmail) -> Result<DispatchReceipt, GatewayError> {
        let payload = SendEmailRequest {
            from: &email.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
        };

        let mut request = self
            .client
            .post(self.api_url("/emails"))
            .bearer_auth(&self.api_key)
            .json(&payload);

        if let Some(key) = &email.idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // A 2xx with an unexpected body still counts as accepted.
        let message_id = response
            .json::<SendEmailResponse>()
            .await
            .ok()
            .and_then(|r| r.id);

        tracing::debug!(
            "Email accepted by provider: recipients={}, message_id={:?}",
            email.to.len(),
            message_id
        );

        Ok(DispatchReceipt { message_id })
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every dispatch; fails the sends whose subject contains any
    /// configured marker.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub sent: Mutex<Vec<OutgoingEmail>>,
        fail_subjects: Mutex<Vec<String>>,
    }

    impl RecordingGateway {
        pub fn fail_when_subject_contains(&self, marker: &str) {
            self.fail_subjects.lock().unwrap().push(marker.to_string());
        }

        pub fn stop_failing(&self) {
            self.fail_subjects.lock().unwrap().clear();
        }

        pub fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailGateway for RecordingGateway {
        async fn send(&self, email: &OutgoingEmail) -> Result<DispatchReceipt, GatewayError> {
            let failing = self
                .fail_subjects
                .lock()
                .unwrap()
                .iter()
                .any(|m| email.subject.contains(m.as_str()));
            if failing {
                return Err(GatewayError::Rejected {
                    status: 503,
                    body: "service unavailable".to_string(),
                });
            }

            self.sent.lock().unwrap().push(email.clone());
            Ok(DispatchReceipt {
                message_id: Some(format!("msg-{}", self.sent.lock().unwrap().len())),
            })
        }
    }
}

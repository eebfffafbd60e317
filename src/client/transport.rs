use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::client::session::UploadedImage;
use crate::prompt::InsightRequest;
use crate::relay::InsightsResponse;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay returned status {0}")]
    Status(u16),

    #[error("relay response is not an insights body: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

/// One round trip to the relay endpoint.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(
        &self,
        image: &UploadedImage,
        request: &InsightRequest,
    ) -> Result<String, TransportError>;
}

/// Multipart POST to a running relay.
pub struct HttpRelay {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpRelay {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

/// Multipart body for `request`, with the image under `image`.
pub fn build_form(image: &UploadedImage, request: &InsightRequest) -> Result<Form, TransportError> {
    let part = Part::bytes(image.bytes.clone())
        .file_name(image.name.clone().unwrap_or_else(|| "image".to_string()))
        .mime_str(&image.mime)?;

    let form = Form::new().part("image", part);
    let form = match request {
        InsightRequest::Insights { language, length } => form
            .text("language", language.as_str())
            .text("length", length.as_str()),
        InsightRequest::Question(question) => form.text("question", question.clone()),
    };
    Ok(form)
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn send(
        &self,
        image: &UploadedImage,
        request: &InsightRequest,
    ) -> Result<String, TransportError> {
        let form = build_form(image, request)?;

        debug!("Posting {} bytes to {}", image.bytes.len(), self.endpoint);
        let response = self.http.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed: InsightsResponse = serde_json::from_str(&body)?;
        Ok(parsed.insights)
    }
}

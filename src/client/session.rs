//! Client-side state for one capture → submit → render interaction.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::client::clipboard::Clipboard;
use crate::client::preview::{self, Bounds, Preview};
use crate::client::transport::{RelayTransport, TransportError};
use crate::prompt::{InsightRequest, Language, Length};

pub const NO_IMAGE_MESSAGE: &str = "Please upload an image first.";
pub const EMPTY_QUESTION_MESSAGE: &str = "Please enter a question.";
pub const FAILURE_MESSAGE: &str = "Failed to generate insights. Please try again.";

/// An image held in memory for the session. Never written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

impl UploadedImage {
    /// Only `image/*` types are accepted, like the browser's file picker.
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Result<Self, SessionError> {
        let mime = mime.into();
        if !mime.starts_with("image/") {
            return Err(SessionError::NotAnImage(mime));
        }
        Ok(Self {
            bytes,
            mime,
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let bytes = std::fs::read(path)?;
        let image = Self::new(bytes, mime.essence_str())?;
        Ok(match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => image.with_name(name),
            None => image,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not an image: {0}")]
    NotAnImage(String),

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("no image selected")]
    NoImage,

    #[error("question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Relay(#[from] TransportError),
}

/// Where the user is in image → parameters → submission → result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Progress {
    #[default]
    Idle,
    ImageSelected,
    ParametersSelected,
    Submitting,
    Completed,
    Failed,
}

/// The two mutually exclusive UI variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameters {
    Insights { language: Language, length: Length },
    Question(String),
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters::Insights {
            language: Language::English,
            length: Length::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Shared view of the loading flag.
#[derive(Debug, Clone, Default)]
pub struct LoadingFlag(Arc<AtomicBool>);

impl LoadingFlag {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Holds the loading flag up; dropping it always clears the flag.
struct InFlight(LoadingFlag);

impl InFlight {
    fn start(flag: &LoadingFlag) -> Self {
        flag.0.store(true, Ordering::SeqCst);
        InFlight(flag.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        (self.0).0.store(false, Ordering::SeqCst);
    }
}

fn seconds(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

pub struct InsightSession<T> {
    transport: T,
    container: Bounds,
    image: Option<UploadedImage>,
    preview: Option<Preview>,
    parameters: Parameters,
    result: Option<String>,
    error: Option<String>,
    progress: Progress,
    loading: LoadingFlag,
    notifications: Vec<Notification>,
}

impl<T: RelayTransport> InsightSession<T> {
    pub fn new(transport: T, container: Bounds) -> Self {
        Self {
            transport,
            container,
            image: None,
            preview: None,
            parameters: Parameters::default(),
            result: None,
            error: None,
            progress: Progress::Idle,
            loading: LoadingFlag::default(),
            notifications: Vec::new(),
        }
    }

    pub fn image(&self) -> Option<&UploadedImage> {
        self.image.as_ref()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    pub fn loading_flag(&self) -> LoadingFlag {
        self.loading.clone()
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Stores the image, clears any previous outcome and builds the preview.
    ///
    /// A preview that fails to decode leaves the session without one; the
    /// image itself is still submitted as-is.
    pub async fn select_image(&mut self, image: UploadedImage) {
        self.result = None;
        self.error = None;
        self.preview = None;
        self.progress = Progress::ImageSelected;
        self.image = Some(image);
        self.refresh_preview().await;
    }

    /// Viewport changed; recompute the preview if there is an image.
    pub async fn resize(&mut self, container: Bounds) {
        self.container = container;
        if self.image.is_some() {
            self.refresh_preview().await;
        }
    }

    async fn refresh_preview(&mut self) {
        let Some(image) = &self.image else {
            return;
        };
        match preview::generate_preview(image.bytes.clone(), self.container).await {
            Ok(preview) => self.preview = Some(preview),
            Err(err) => {
                warn!("Preview unavailable: {}", err);
                self.preview = None;
            }
        }
    }

    pub fn remove_image(&mut self) {
        self.image = None;
        self.preview = None;
        self.result = None;
        self.error = None;
        self.progress = Progress::Idle;
    }

    /// Picking a language moves the session on once an image is present.
    pub fn set_parameters(&mut self, language: Language, length: Length) {
        self.parameters = Parameters::Insights { language, length };
        if self.image.is_some() && self.progress == Progress::ImageSelected {
            self.progress = Progress::ParametersSelected;
        }
    }

    pub fn set_question(&mut self, question: impl Into<String>) {
        self.parameters = Parameters::Question(question.into());
    }

    fn validate(&self) -> Result<InsightRequest, SubmitError> {
        if self.image.is_none() {
            return Err(SubmitError::NoImage);
        }
        match &self.parameters {
            Parameters::Insights { language, length } => Ok(InsightRequest::Insights {
                language: *language,
                length: *length,
            }),
            Parameters::Question(q) if q.trim().is_empty() => Err(SubmitError::EmptyQuestion),
            Parameters::Question(q) => Ok(InsightRequest::Question(q.clone())),
        }
    }

    /// Sends the image and parameters to the relay and stores the answer.
    ///
    /// Validation failures never touch the network. The loading flag is set
    /// for exactly the duration of the round trip. Taking `&mut self` keeps
    /// a second submit out until this one resolves.
    pub async fn submit(&mut self) -> Result<&str, SubmitError> {
        let request = match self.validate() {
            Ok(request) => request,
            Err(err) => {
                self.error = Some(
                    match &err {
                        SubmitError::EmptyQuestion => EMPTY_QUESTION_MESSAGE,
                        _ => NO_IMAGE_MESSAGE,
                    }
                    .to_string(),
                );
                return Err(err);
            }
        };

        let in_flight = InFlight::start(&self.loading);

        self.progress = Progress::Submitting;
        let image = self.image.as_ref().ok_or(SubmitError::NoImage)?;
        let started = Instant::now();
        let outcome = self.transport.send(image, &request).await;
        drop(in_flight);
        let elapsed = started.elapsed();

        match outcome {
            Ok(text) => {
                info!("Insights received in {}", seconds(elapsed));
                self.error = None;
                self.progress = Progress::Completed;
                self.notifications.push(Notification {
                    kind: NotificationKind::Success,
                    message: format!("Insights generated in {}", seconds(elapsed)),
                });
                Ok(self.result.insert(text).as_str())
            }
            Err(err) => {
                warn!("Submit failed after {}: {}", seconds(elapsed), err);
                self.result = None;
                self.error = Some(FAILURE_MESSAGE.to_string());
                self.progress = Progress::Failed;
                self.notifications.push(Notification {
                    kind: NotificationKind::Failure,
                    message: format!("Failed after {}", seconds(elapsed)),
                });
                Err(err.into())
            }
        }
    }

    /// Copies the result, if any, and reports how it went.
    pub fn copy_result(&mut self, clipboard: &mut dyn Clipboard) -> Option<NotificationKind> {
        let text = self.result.as_deref()?;
        let notification = match clipboard.set_text(text) {
            Ok(()) => Notification {
                kind: NotificationKind::Success,
                message: "Copied to clipboard".to_string(),
            },
            Err(err) => {
                warn!("Copy failed: {}", err);
                Notification {
                    kind: NotificationKind::Failure,
                    message: "Could not copy to clipboard".to_string(),
                }
            }
        };
        let kind = notification.kind;
        self.notifications.push(notification);
        Some(kind)
    }
}

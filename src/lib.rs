//! Image insights: a relay that forwards an uploaded image and a prompt to a
//! hosted vision-language model, plus the client that captures, submits and
//! renders.

pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod page;
pub mod prompt;
pub mod relay;
pub mod workers_ai;

pub use config::RelayConfig;
pub use error::RelayError;
pub use model::{ModelError, ModelRequest, VisionModel};
pub use prompt::{InsightRequest, Language, Length};
pub use relay::{router, AppState, InsightsResponse};

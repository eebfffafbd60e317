//! Native rendition of the capture and render front end.

pub mod clipboard;
pub mod preview;
pub mod render;
pub mod session;
pub mod transport;

pub use clipboard::{Clipboard, ClipboardError, SystemClipboard};
pub use preview::{Bounds, Preview, PreviewError};
pub use render::{classify, MarkupPolicy, RenderMode};
pub use session::{
    InsightSession, LoadingFlag, Notification, NotificationKind, Parameters, Progress,
    SessionError, SubmitError, UploadedImage,
};
pub use transport::{HttpRelay, RelayTransport, TransportError};

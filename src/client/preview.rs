//! Preview sizing and rasterization.
//!
//! The preview is cosmetic: it is fitted to the display container while
//! keeping the image's aspect ratio, and never exceeds the container on
//! either axis.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::imageops::FilterType;
use image::{GenericImageView, ImageOutputFormat};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub size: Bounds,
    pub data_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode preview: {0}")]
    Encode(#[source] image::ImageError),

    #[error("image or container has a zero dimension")]
    Empty,

    #[error("preview task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Aspect-ratio preserving fit of `image` into `container`.
///
/// If the image is relatively wider than the container, width is pinned to
/// the container width; otherwise height is pinned to the container height.
/// The free axis is floored, and at least one pixel.
pub fn fit(image: Bounds, container: Bounds) -> Result<Bounds, PreviewError> {
    if image.width == 0 || image.height == 0 || container.width == 0 || container.height == 0 {
        return Err(PreviewError::Empty);
    }

    let (iw, ih) = (image.width as u64, image.height as u64);
    let (cw, ch) = (container.width as u64, container.height as u64);

    // iw/ih > cw/ch, compared without rounding
    let size = if iw * ch > cw * ih {
        let height = (cw * ih / iw).clamp(1, ch);
        Bounds::new(container.width, height as u32)
    } else {
        let width = (ch * iw / ih).clamp(1, cw);
        Bounds::new(width as u32, container.height)
    };

    Ok(size)
}

/// Decodes `bytes`, resizes to fit `container` and encodes a PNG data URL.
pub fn render_preview(bytes: &[u8], container: Bounds) -> Result<Preview, PreviewError> {
    let img = image::load_from_memory(bytes).map_err(PreviewError::Decode)?;
    let (width, height) = img.dimensions();
    let size = fit(Bounds::new(width, height), container)?;

    let resized = img.resize_exact(size.width, size.height, FilterType::Triangle);

    let mut png = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
        .map_err(PreviewError::Encode)?;

    Ok(Preview {
        size,
        data_url: format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&png)
        ),
    })
}

/// [`render_preview`] on the blocking pool.
pub async fn generate_preview(bytes: Vec<u8>, container: Bounds) -> Result<Preview, PreviewError> {
    tokio::task::spawn_blocking(move || render_preview(&bytes, container)).await?
}

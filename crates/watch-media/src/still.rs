use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::InputError;

/// Decodes a still image to RGB8 off the async threads.
pub async fn load(path: &Path) -> Result<RgbImage, InputError> {
    let owned = path.to_path_buf();
    let decoded = tokio::task::spawn_blocking(move || image::open(&owned).map(|img| img.to_rgb8()))
        .await
        .map_err(|e| InputError::ImageDecode {
            path: path.to_path_buf(),
            source: image::ImageError::IoError(std::io::Error::other(e)),
        })?;

    let img = decoded.map_err(|source| InputError::ImageDecode { path: path.to_path_buf(), source })?;
    debug!(path = %path.display(), w = img.width(), h = img.height(), "still: decoded");
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn decodes_png() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("shot.png");
        RgbImage::from_pixel(4, 3, image::Rgb([9, 8, 7])).save(&p).unwrap();

        let img = load(&p).await.unwrap();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(0, 0).0, [9, 8, 7]);
    }

    #[tokio::test]
    async fn missing_file_is_input_error() {
        let err = load(Path::new("/nonexistent/shot.jpg")).await.unwrap_err();
        assert!(matches!(err, InputError::ImageDecode { .. }));
        assert!(err.to_string().starts_with("unable to load image"));
    }

    #[tokio::test]
    async fn garbage_bytes_are_input_error() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("broken.jpg");
        std::fs::write(&p, b"definitely not a jpeg").unwrap();
        assert!(matches!(load(&p).await, Err(InputError::ImageDecode { .. })));
    }
}

//! Decoder/Encoder adapter
//!
//! Reads JPEG/PNG/BMP into a canonical BGRA [`PixelBuffer`] and writes
//! buffers back out as PNG. Both calls block; run them off any UI thread.

use crate::pixel_buffer::{BufferError, PixelBuffer, ALPHA, BLUE, CHANNELS, GREEN, RED};
use image::{ExtendedColorType, ImageFormat, ImageReader};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Extensions the selection front end accepts (lower-case, no dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("unsupported image format in {} (detected: {:?})", .path.display(), .detected)]
    UnsupportedFormat {
        path: PathBuf,
        detected: Option<ImageFormat>,
    },

    #[error("corrupt or unreadable image {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("decoded image {} has invalid geometry: {source}", .path.display())]
    Geometry { path: PathBuf, source: BufferError },
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot write {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("PNG encoding failed for {}: {source}", .path.display())]
    Png {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Case-insensitive extension check against [`SUPPORTED_EXTENSIONS`].
pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

fn is_supported_format(format: ImageFormat) -> bool {
    matches!(format, ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp)
}

/// Swaps channels 0 and 2 of every 4-byte group (RGBA <-> BGRA).
fn swap_red_blue(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(CHANNELS) {
        px.swap(0, 2);
    }
}

/// Decodes the first frame of `path` into a packed BGRA buffer.
///
/// The container is sniffed from the file's magic bytes; the extension is
/// only consulted when sniffing finds nothing.
pub fn decode(path: &Path) -> Result<PixelBuffer, DecodeError> {
    let file = File::open(path).map_err(|source| DecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    let format = reader
        .format()
        .or_else(|| ImageFormat::from_path(path).ok())
        .filter(|f| is_supported_format(*f))
        .ok_or_else(|| DecodeError::UnsupportedFormat {
            path: path.to_path_buf(),
            detected: reader.format(),
        })?;
    reader.set_format(format);

    let image = reader.decode().map_err(|source| DecodeError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;

    let rgba = image.into_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixels = rgba.into_raw();
    swap_red_blue(&mut pixels);

    debug!(path = %path.display(), ?format, width, height, "Decoded image");

    PixelBuffer::from_bgra(width, height, pixels).map_err(|source| DecodeError::Geometry {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `buffer` to `path` as PNG, whatever the extension says.
///
/// The PNG is staged in a hidden temp file in the destination directory and
/// renamed over `path` once complete, so a failed write never leaves a
/// truncated output behind.
pub fn encode(buffer: &PixelBuffer, path: &Path) -> Result<(), EncodeError> {
    let io_err = |source: io::Error| EncodeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut rgba = Vec::with_capacity(buffer.row_bytes() * buffer.height() as usize);
    for row in buffer.rows() {
        for px in row.chunks_exact(CHANNELS) {
            rgba.extend_from_slice(&[px[RED], px[GREEN], px[BLUE], px[ALPHA]]);
        }
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    // Overwrites keep the target's mode; new files get 0o666 minus the umask.
    let existing = fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.permissions());

    let mut builder = tempfile::Builder::new();
    builder.prefix(".pixel_filter-").suffix(".part");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let staged = builder.tempfile_in(dir).map_err(io_err)?;

    {
        let mut writer = BufWriter::new(staged.as_file());
        image::write_buffer_with_format(
            &mut writer,
            &rgba,
            buffer.width(),
            buffer.height(),
            ExtendedColorType::Rgba8,
            ImageFormat::Png,
        )
        .map_err(|source| EncodeError::Png {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
    }

    if let Some(permissions) = existing {
        staged.as_file().set_permissions(permissions).map_err(io_err)?;
    }
    staged.persist(path).map_err(|e| io_err(e.error))?;

    debug!(
        path = %path.display(),
        width = buffer.width(),
        height = buffer.height(),
        "Encoded PNG"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension(Path::new("a/photo.JPG")));
        assert!(is_supported_extension(Path::new("photo.jpeg")));
        assert!(is_supported_extension(Path::new("photo.png")));
        assert!(is_supported_extension(Path::new("photo.Bmp")));
        assert!(!is_supported_extension(Path::new("photo.gif")));
        assert!(!is_supported_extension(Path::new("photo")));
    }

    #[test]
    fn test_decode_png_to_bgra() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.png");
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([30, 20, 10, 255]));
        img.put_pixel(1, 0, Rgba([50, 100, 200, 128]));
        img.save(&path).unwrap();

        let buf = decode(&path).unwrap();
        assert_eq!((buf.width(), buf.height()), (2, 1));
        assert_eq!(buf.pixel(0, 0), [10, 20, 30, 255]);
        assert_eq!(buf.pixel(1, 0), [200, 100, 50, 128]);
    }

    #[test]
    fn test_decode_bmp_adds_opaque_alpha() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.bmp");
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, Rgb([1, 2, 3]));
        img.save(&path).unwrap();

        let buf = decode(&path).unwrap();
        assert_eq!(buf.pixel(0, 0), [3, 2, 1, 255]);
    }

    #[test]
    fn test_decode_sniffs_content_not_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("actually_png.jpg");
        RgbaImage::from_pixel(3, 2, Rgba([9, 9, 9, 9]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let buf = decode(&path).unwrap();
        assert_eq!((buf.width(), buf.height()), (3, 2));
    }

    #[test]
    fn test_decode_missing_file() {
        let err = decode(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, DecodeError::Open { .. }));
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        // Valid PNG signature, nothing after it.
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n").unwrap();
        let err = decode(&path).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }), "{err}");
    }

    #[test]
    fn test_decode_unknown_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"just some text").unwrap();
        let err = decode(&path).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat { .. }), "{err}");
    }

    #[test]
    fn test_encode_writes_png_and_strips_padding() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jpg");
        let data = vec![10, 20, 30, 255, 0xEE, 0xEE, 40, 50, 60, 128, 0xEE, 0xEE];
        let buf = PixelBuffer::new(1, 2, 6, data).unwrap();

        encode(&buf, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        let back = decode(&path).unwrap();
        assert_eq!(back.pixel(0, 0), [10, 20, 30, 255]);
        assert_eq!(back.pixel(0, 1), [40, 50, 60, 128]);
    }

    #[test]
    fn test_encode_truncates_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        std::fs::write(&path, vec![0u8; 64 * 1024]).unwrap();

        let buf = PixelBuffer::from_bgra(1, 1, vec![1, 2, 3, 4]).unwrap();
        encode(&buf, &path).unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() < 64 * 1024);
        assert_eq!(decode(&path).unwrap().pixel(0, 0), [1, 2, 3, 4]);
    }

    #[cfg(unix)]
    #[test]
    fn test_encode_output_mode_matches_plain_create() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("plain.bin");
        std::fs::write(&plain, b"x").unwrap();
        let expected = std::fs::metadata(&plain).unwrap().permissions().mode() & 0o777;

        let path = dir.path().join("grayscale_x.png");
        let buf = PixelBuffer::from_bgra(1, 1, vec![1, 2, 3, 4]).unwrap();
        encode(&buf, &path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, expected, "encoded {:o}, plain create {:o}", mode, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_encode_keeps_mode_of_replaced_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        std::fs::write(&path, b"old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        let buf = PixelBuffer::from_bgra(1, 1, vec![1, 2, 3, 4]).unwrap();
        encode(&buf, &path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
        assert_eq!(decode(&path).unwrap().pixel(0, 0), [1, 2, 3, 4]);
    }

    #[test]
    fn test_encode_into_missing_directory_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("out.png");
        let buf = PixelBuffer::from_bgra(1, 1, vec![1, 2, 3, 4]).unwrap();
        let err = encode(&buf, &path).unwrap_err();
        assert!(matches!(err, EncodeError::Io { .. }));
        assert!(!path.exists());
    }
}

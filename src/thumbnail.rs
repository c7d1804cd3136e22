use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, GenericImageView};

pub const THUMBNAIL_MAX_EDGE: u32 = 480;
pub const THUMBNAIL_QUALITY: u8 = 75;
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Target size for a `width` x `height` source: the longer edge is capped at
/// `max_edge`, the other scales with it. Images already small enough keep
/// their size.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let scale = |edge: u32, long: u32| -> u32 {
        ((edge as f64 * max_edge as f64 / long as f64).round() as u32).max(1)
    };
    if width > height && width > max_edge {
        (max_edge, scale(height, width))
    } else if height >= width && height > max_edge {
        (scale(width, height), max_edge)
    } else {
        (width, height)
    }
}

pub fn make_thumbnail(source: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(source)?;
    let (width, height) = img.dimensions();
    let (target_w, target_h) = fit_within(width, height, THUMBNAIL_MAX_EDGE);

    let resized = if (target_w, target_h) == (width, height) {
        img
    } else {
        img.resize_exact(target_w, target_h, FilterType::Triangle)
    };

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, THUMBNAIL_QUALITY).encode_image(&resized.to_rgb8())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn long_edge_is_capped() {
        assert_eq!(fit_within(1200, 600, 480), (480, 240));
        assert_eq!(fit_within(600, 1200, 480), (240, 480));
        assert_eq!(fit_within(1000, 1000, 480), (480, 480));
        assert_eq!(fit_within(300, 200, 480), (300, 200));
        assert_eq!(fit_within(5000, 3, 480), (480, 1));
    }

    #[test]
    fn thumbnails_are_bounded_jpegs() {
        let thumb = make_thumbnail(&png(1200, 800)).unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert_eq!(decoded.dimensions(), (480, 320));
        assert_eq!(image::guess_format(&thumb).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(make_thumbnail(b"definitely not an image").is_err());
    }
}

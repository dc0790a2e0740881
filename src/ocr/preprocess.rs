use image::{imageops, ImageBuffer, Luma, RgbaImage};

use crate::grid::BoundingBox;

/// Converts image to binary by keeping only bright pixels.
///
/// Pixels where R > threshold AND G > threshold AND B > threshold become black (text).
/// All other pixels become white (background).
///
/// Item names are drawn in light text over a dark label, so this isolates the
/// glyphs from the artwork bleeding into the label area.
pub fn threshold_bright_pixels(img: &RgbaImage, threshold: u8) -> ImageBuffer<Luma<u8>, Vec<u8>> {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if pixel[0] > threshold && pixel[1] > threshold && pixel[2] > threshold {
            0u8
        } else {
            255u8
        };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Crops a pixel box from an image, clamped to the image bounds.
///
/// Returns `None` when the box does not overlap the image at all.
pub fn crop_box(img: &RgbaImage, bounds: &BoundingBox) -> Option<RgbaImage> {
    let clamped = bounds.clamp_to(img.width(), img.height())?;
    Some(
        imageops::crop_imm(
            img,
            clamped.x as u32,
            clamped.y as u32,
            clamped.width as u32,
            clamped.height as u32,
        )
        .to_image(),
    )
}

/// Enlarges small label crops; Tesseract reads glyphs under ~20px tall poorly.
pub fn upscale_for_ocr(img: &ImageBuffer<Luma<u8>, Vec<u8>>, factor: u32) -> ImageBuffer<Luma<u8>, Vec<u8>> {
    if factor <= 1 {
        return img.clone();
    }
    imageops::resize(
        img,
        img.width() * factor,
        img.height() * factor,
        imageops::FilterType::Nearest,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_crop_box() {
        let img: RgbaImage = ImageBuffer::from_fn(100, 200, |x, y| Rgba([x as u8, y as u8, 0, 255]));

        let cropped = crop_box(&img, &BoundingBox::new(10, 50, 50, 20)).unwrap();

        assert_eq!(cropped.dimensions(), (50, 20));
        assert_eq!(cropped.get_pixel(0, 0)[0], 10);
        assert_eq!(cropped.get_pixel(0, 0)[1], 50);
    }

    #[test]
    fn test_crop_box_clamps() {
        let img = RgbaImage::new(100, 100);
        let cropped = crop_box(&img, &BoundingBox::new(90, 90, 50, 50)).unwrap();
        assert_eq!(cropped.dimensions(), (10, 10));
        assert!(crop_box(&img, &BoundingBox::new(200, 0, 10, 10)).is_none());
    }

    #[test]
    fn test_threshold_bright_pixels() {
        let mut img = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([100, 100, 100, 255]));
        img.put_pixel(1, 0, Rgba([250, 250, 250, 255]));
        img.put_pixel(2, 0, Rgba([250, 250, 100, 255]));

        let result = threshold_bright_pixels(&img, 190);

        assert_eq!(result.get_pixel(0, 0)[0], 255, "Dark pixel should become white");
        assert_eq!(result.get_pixel(1, 0)[0], 0, "Bright pixel should become black");
        assert_eq!(result.get_pixel(2, 0)[0], 255, "Partially dark pixel should become white");
    }

    #[test]
    fn test_upscale() {
        let img = ImageBuffer::from_pixel(4, 3, Luma([0u8]));
        assert_eq!(upscale_for_ocr(&img, 3).dimensions(), (12, 9));
        assert_eq!(upscale_for_ocr(&img, 1).dimensions(), (4, 3));
    }
}

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;

/// YOLO feature-map stride; input sides must be a multiple of this.
pub const MODEL_STRIDE: u32 = 32;

const PAD_VALUE: u8 = 114;

/// Placement of the original image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub input_size: u32,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    pub fn compute(orig_width: u32, orig_height: u32, image_size: u32) -> Self {
        let input_size = align_to_stride(image_size);
        let scale = (input_size as f32 / orig_width.max(1) as f32)
            .min(input_size as f32 / orig_height.max(1) as f32);
        let (new_w, new_h) = scaled_dims(orig_width, orig_height, scale);
        Self {
            input_size,
            scale,
            pad_x: ((input_size - new_w) / 2) as f32,
            pad_y: ((input_size - new_h) / 2) as f32,
            orig_width,
            orig_height,
        }
    }

    /// Map a box from model-input space back to original image pixels,
    /// clipped to the image bounds.
    pub fn unmap_box(&self, xyxy: [f32; 4]) -> [f32; 4] {
        let max_x = self.orig_width as f32;
        let max_y = self.orig_height as f32;
        [
            ((xyxy[0] - self.pad_x) / self.scale).clamp(0.0, max_x),
            ((xyxy[1] - self.pad_y) / self.scale).clamp(0.0, max_y),
            ((xyxy[2] - self.pad_x) / self.scale).clamp(0.0, max_x),
            ((xyxy[3] - self.pad_y) / self.scale).clamp(0.0, max_y),
        ]
    }
}

pub fn align_to_stride(image_size: u32) -> u32 {
    image_size.max(1).div_ceil(MODEL_STRIDE) * MODEL_STRIDE
}

fn scaled_dims(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    (new_w, new_h)
}

/// Letterbox the image into a `[1, 3, S, S]` RGB tensor scaled to [0, 1].
pub fn preprocess(image: &DynamicImage, image_size: u32) -> (Array4<f32>, Letterbox) {
    let (orig_w, orig_h) = image.dimensions();
    let letterbox = Letterbox::compute(orig_w, orig_h, image_size);
    let size = letterbox.input_size;

    let (new_w, new_h) = scaled_dims(orig_w, orig_h, letterbox.scale);
    let resized = image
        .resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    image::imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
    );

    let mut tensor = Array4::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    (tensor, letterbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size_rounds_up_to_stride() {
        assert_eq!(align_to_stride(1280), 1280);
        assert_eq!(align_to_stride(1000), 1024);
        assert_eq!(align_to_stride(1), 32);
    }

    #[test]
    fn wide_image_is_padded_vertically() {
        let letterbox = Letterbox::compute(640, 320, 640);
        assert_eq!(letterbox.scale, 1.0);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 160.0);
    }

    #[test]
    fn unmap_undoes_scale_and_padding() {
        let letterbox = Letterbox::compute(1280, 640, 640);
        assert_eq!(letterbox.scale, 0.5);
        let mapped = letterbox.unmap_box([10.0, 170.0, 110.0, 270.0]);
        assert_eq!(mapped, [20.0, 20.0, 220.0, 220.0]);
    }

    #[test]
    fn unmap_clips_to_image() {
        let letterbox = Letterbox::compute(100, 100, 64);
        let mapped = letterbox.unmap_box([-5.0, -5.0, 70.0, 70.0]);
        assert_eq!(mapped[0], 0.0);
        assert_eq!(mapped[2], 100.0);
    }

    #[test]
    fn tensor_has_model_input_shape() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 20, Rgb([255, 0, 0])));
        let (tensor, letterbox) = preprocess(&image, 64);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        // Padding rows keep the gray fill value.
        assert!((tensor[[0, 0, 0, 0]] - PAD_VALUE as f32 / 255.0).abs() < 1e-6);
        let center = (letterbox.input_size / 2) as usize;
        assert!((tensor[[0, 0, center, center]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, center, center]], 0.0);
    }
}

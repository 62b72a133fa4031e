use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use shared::Detection;
use std::path::Path;

use super::DetectionError;

const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [52, 69, 147],
    [255, 149, 200],
];

pub fn class_color(class_id: i64) -> Rgb<u8> {
    Rgb(PALETTE[class_id.rem_euclid(PALETTE.len() as i64) as usize])
}

/// Line width grows with the image so boxes stay visible on large photos.
pub fn line_thickness(width: u32, height: u32) -> u32 {
    ((width + height) / 600).max(2)
}

/// Glyph scale for labels; 8px glyphs on small images, larger on photos.
pub fn label_scale(width: u32, height: u32) -> u32 {
    ((width + height) / 800).max(1)
}

/// `person 0.87`, the text written above each box.
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.class_name, detection.confidence)
}

const GLYPH_SIZE: u32 = 8;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

fn fill_rect(canvas: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    for py in y..(y + h).min(height) {
        for px in x..(x + w).min(width) {
            canvas.put_pixel(px, py, color);
        }
    }
}

/// Filled label with white 8x8 bitmap text. It sits on top of the box when
/// there is room and just inside the box otherwise.
pub fn draw_label(
    canvas: &mut RgbImage,
    text: &str,
    box_left: u32,
    box_top: u32,
    color: Rgb<u8>,
    scale: u32,
) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let padding = scale;
    let advance = GLYPH_SIZE * scale;
    let label_width = text.chars().count() as u32 * advance + 2 * padding;
    let label_height = advance + 2 * padding;
    let left = box_left.min(width - 1);
    let top = if box_top >= label_height {
        box_top - label_height
    } else {
        box_top.min(height - 1)
    };

    fill_rect(canvas, left, top, label_width, label_height, color);

    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let glyph_left = left + padding + i as u32 * advance;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if bits & (1 << col) != 0 {
                    fill_rect(
                        canvas,
                        glyph_left + col * scale,
                        top + padding + row as u32 * scale,
                        scale,
                        scale,
                        LABEL_TEXT_COLOR,
                    );
                }
            }
        }
    }
}

pub fn draw_box(canvas: &mut RgbImage, xyxy: [f32; 4], color: Rgb<u8>, thickness: u32) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let x1 = (xyxy[0].max(0.0) as u32).min(width - 1);
    let y1 = (xyxy[1].max(0.0) as u32).min(height - 1);
    let x2 = (xyxy[2].max(0.0) as u32).min(width - 1);
    let y2 = (xyxy[3].max(0.0) as u32).min(height - 1);

    for t in 0..thickness {
        let top = (y1 + t).min(y2);
        let bottom = y2.saturating_sub(t).max(y1);
        let left = (x1 + t).min(x2);
        let right = x2.saturating_sub(t).max(x1);
        for x in x1..=x2 {
            canvas.put_pixel(x, top, color);
            canvas.put_pixel(x, bottom, color);
        }
        for y in y1..=y2 {
            canvas.put_pixel(left, y, color);
            canvas.put_pixel(right, y, color);
        }
    }
}

/// Draw every detection, box and `class confidence` label, onto a copy of `image` and save it as JPEG,
/// creating the parent directory when missing.
pub fn write_annotated(
    image: &DynamicImage,
    detections: &[Detection],
    output_path: &Path,
) -> Result<(), DetectionError> {
    let mut canvas = image.to_rgb8();
    let thickness = line_thickness(canvas.width(), canvas.height());
    let scale = label_scale(canvas.width(), canvas.height());
    for detection in detections {
        let color = class_color(detection.class_id);
        draw_box(&mut canvas, detection.xyxy, color, thickness);
    }
    // Labels go on after every box so no outline is drawn over text.
    for detection in detections {
        draw_label(
            &mut canvas,
            &label_text(detection),
            detection.xyxy[0].max(0.0) as u32,
            detection.xyxy[1].max(0.0) as u32,
            class_color(detection.class_id),
            scale,
        );
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DetectionError::Annotate(e.to_string()))?;
        }
    }
    canvas
        .save_with_format(output_path, ImageFormat::Jpeg)
        .map_err(|e| DetectionError::Annotate(e.to_string()))
}

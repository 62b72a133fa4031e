use ndarray::ArrayView2;
use std::cmp::Ordering;

use super::preprocess::Letterbox;

/// A candidate box in model-input coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub xyxy: [f32; 4],
}

/// Decode a YOLOv8/11 head of shape `[4 + num_classes, num_anchors]`.
/// Rows 0..4 hold `cx, cy, w, h`, the rest hold per-class scores.
pub fn decode(output: ArrayView2<f32>, conf_threshold: f32) -> Vec<Candidate> {
    let (rows, anchors) = output.dim();
    if rows <= 4 {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for class_id in 0..rows - 4 {
            let score = output[[4 + class_id, anchor]];
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }
        if best_score < conf_threshold {
            continue;
        }

        let cx = output[[0, anchor]];
        let cy = output[[1, anchor]];
        let w = output[[2, anchor]];
        let h = output[[3, anchor]];
        candidates.push(Candidate {
            class_id: best_class,
            confidence: best_score,
            xyxy: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }
    candidates
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Class-aware non-max suppression. Output is sorted by descending confidence
/// and truncated to `max_detections`.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.xyxy, &candidate.xyxy) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Map kept candidates back to original-image coordinates, dropping boxes that
/// collapse to nothing after clipping.
pub fn to_image_space(candidates: Vec<Candidate>, letterbox: &Letterbox) -> Vec<Candidate> {
    candidates
        .into_iter()
        .map(|c| Candidate {
            xyxy: letterbox.unmap_box(c.xyxy),
            ..c
        })
        .filter(|c| c.xyxy[2] > c.xyxy[0] && c.xyxy[3] > c.xyxy[1])
        .collect()
}

mod font;
mod nms;
pub mod annotate;
pub mod classify;
pub mod doctor;
#[cfg(feature = "vision-tflite")]
pub mod tflite;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use annotate::annotate;
pub use classify::Classification;

/// Axis-aligned box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Clamp to `0..w` x `0..h`, returning `None` when nothing visible is left.
    pub fn clamp_to(self, w: u32, h: u32) -> Option<Self> {
        if w == 0 || h == 0 {
            return None;
        }
        let max_x = w as i32 - 1;
        let max_y = h as i32 - 1;
        let (x1, x2) = (self.x1.min(self.x2), self.x1.max(self.x2));
        let (y1, y2) = (self.y1.min(self.y2), self.y1.max(self.y2));
        if x2 < 0 || y2 < 0 || x1 > max_x || y1 > max_y {
            return None;
        }
        Some(Self {
            x1: x1.clamp(0, max_x),
            y1: y1.clamp(0, max_y),
            x2: x2.clamp(0, max_x),
            y2: y2.clamp(0, max_y),
        })
    }
}

/// One labeled, located output of a single inference pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn classify(&self) -> Classification {
        Classification::from_label(&self.label)
    }
}

/// Model-space detection straight out of the output tensor.
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    pub class_id: i32,
    pub conf: f32,
    // normalized 0..1
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl RawDetection {
    /// Maps to frame pixels and resolves the label. Non-finite boxes and class ids
    /// outside the name table yield `None`.
    pub fn to_pixels(&self, frame_w: u32, frame_h: u32, class_names: &[String]) -> Option<Detection> {
        if ![self.cx, self.cy, self.w, self.h, self.conf].iter().all(|v| v.is_finite()) {
            return None;
        }
        let label = usize::try_from(self.class_id).ok().and_then(|i| class_names.get(i))?;
        let fw = frame_w as f32;
        let fh = frame_h as f32;
        let x1 = (self.cx - self.w / 2.0) * fw;
        let y1 = (self.cy - self.h / 2.0) * fh;
        let x2 = (self.cx + self.w / 2.0) * fw;
        let y2 = (self.cy + self.h / 2.0) * fh;
        Some(Detection {
            label: label.clone(),
            confidence: self.conf,
            bbox: BBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub backend: String, // "tflite"
    pub use_coral: bool,
    pub model_path: String,
    pub model_path_edgetpu: String,

    pub img_w: u32,
    pub img_h: u32,
    pub class_names: Vec<String>,

    pub conf_threshold: f32,
    pub nms_iou_threshold: f32,
    pub max_detections: usize,
    pub output_layout: String, // "ultralytics" | "ultralytics-v8"
    pub num_threads: i32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            backend: "tflite".into(),
            use_coral: false,
            model_path: "best.tflite".into(),
            model_path_edgetpu: "best_edgetpu.tflite".into(),
            img_w: 640,
            img_h: 640,
            class_names: vec!["drowning".into(), "swimming".into(), "out of water".into()],
            conf_threshold: 0.25,
            nms_iou_threshold: 0.45,
            max_detections: 100,
            output_layout: "ultralytics-v8".into(),
            num_threads: 2,
        }
    }
}

impl VisionConfig {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Byte size of one `img_w x img_h` RGB input tensor with `elem` bytes per channel.
    pub fn input_bytes(&self, elem: usize) -> Result<usize> {
        anyhow::ensure!(self.img_w > 0 && self.img_h > 0, "vision.img_w/img_h must be > 0");
        (self.img_w as usize)
            .checked_mul(self.img_h as usize)
            .and_then(|px| px.checked_mul(3))
            .and_then(|n| n.checked_mul(elem))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "vision.img_w x img_h ({}x{}) is too large for an input tensor",
                    self.img_w,
                    self.img_h
                )
            })
    }
}

/// Frame in, detections out. Implementations own whatever model runtime they wrap.
pub trait Detector: Send {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

pub fn postprocess_ultralytics(
    raw: &[f32],
    num_preds: usize,
    num_classes: usize,
    conf_th: f32,
) -> Vec<RawDetection> {
    // YOLOv5 export, row major:
    // [cx, cy, w, h, obj, cls0..]
    let stride = 5 + num_classes;
    let mut out = Vec::new();

    for i in 0..num_preds {
        let base = i * stride;
        if base + stride > raw.len() { break; }
        let obj = raw[base + 4];
        let (best_c, best_p) = best_class(|c| raw[base + 5 + c], num_classes);
        let conf = obj * best_p;
        if conf >= conf_th {
            out.push(RawDetection {
                class_id: best_c as i32,
                conf,
                cx: raw[base],
                cy: raw[base + 1],
                w: raw[base + 2],
                h: raw[base + 3],
            });
        }
    }
    out
}

pub fn postprocess_ultralytics_v8(
    raw: &[f32],
    num_preds: usize,
    num_classes: usize,
    conf_th: f32,
) -> Vec<RawDetection> {
    // YOLOv8 export, channel major: [4 + C, N], no objectness.
    let rows = 4 + num_classes;
    if raw.len() < rows * num_preds {
        return Vec::new();
    }
    let at = |row: usize, i: usize| raw[row * num_preds + i];
    let mut out = Vec::new();

    for i in 0..num_preds {
        let (best_c, best_p) = best_class(|c| at(4 + c, i), num_classes);
        if best_p >= conf_th {
            out.push(RawDetection {
                class_id: best_c as i32,
                conf: best_p,
                cx: at(0, i),
                cy: at(1, i),
                w: at(2, i),
                h: at(3, i),
            });
        }
    }
    out
}

fn best_class(score: impl Fn(usize) -> f32, num_classes: usize) -> (usize, f32) {
    let mut best_c = 0usize;
    let mut best_p = 0.0f32;
    for c in 0..num_classes {
        let p = score(c);
        if p > best_p { best_p = p; best_c = c; }
    }
    (best_c, best_p)
}

pub fn nms_filter(mut dets: Vec<RawDetection>, iou_th: f32, max_det: usize) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.conf.partial_cmp(&a.conf).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<RawDetection> = Vec::new();

    'outer: for d in dets {
        if kept.len() >= max_det { break; }
        for k in &kept {
            if k.class_id == d.class_id && nms::iou(&d, k) >= iou_th {
                continue 'outer;
            }
        }
        kept.push(d);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        VisionConfig::default().class_names
    }

    #[test]
    fn v5_layout_applies_objectness() {
        // two predictions, 3 classes
        let raw = [
            0.5, 0.5, 0.2, 0.2, 0.9, 0.9, 0.1, 0.0, //
            0.1, 0.1, 0.1, 0.1, 0.2, 0.0, 0.5, 0.0,
        ];
        let dets = postprocess_ultralytics(&raw, 2, 3, 0.25);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 0);
        assert!((dets[0].conf - 0.81).abs() < 1e-5);
    }

    #[test]
    fn input_bytes_is_checked() {
        let cfg = VisionConfig::default();
        assert_eq!(cfg.input_bytes(1).unwrap(), 640 * 640 * 3);
        assert_eq!(cfg.input_bytes(4).unwrap(), 640 * 640 * 3 * 4);

        let zero = VisionConfig { img_w: 0, ..Default::default() };
        assert!(zero.input_bytes(1).is_err());

        // u32::MAX^2 * 3 overflows a 64-bit usize
        let absurd = VisionConfig { img_w: u32::MAX, img_h: u32::MAX, ..Default::default() };
        assert!(absurd.input_bytes(4).is_err());
    }

    #[test]
    fn v8_layout_reads_channel_major() {
        // rows: cx, cy, w, h, c0, c1, c2 ; 2 predictions
        let raw = [
            0.5, 0.2, //
            0.5, 0.2, //
            0.4, 0.1, //
            0.4, 0.1, //
            0.1, 0.0, //
            0.8, 0.1, //
            0.0, 0.2,
        ];
        let dets = postprocess_ultralytics_v8(&raw, 2, 3, 0.25);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert!((dets[0].cx - 0.5).abs() < 1e-6);
    }

    #[test]
    fn v8_layout_short_tensor_is_empty() {
        assert!(postprocess_ultralytics_v8(&[0.0; 5], 2, 3, 0.1).is_empty());
    }

    #[test]
    fn nms_suppresses_same_class_overlap_only() {
        let a = RawDetection { class_id: 0, conf: 0.9, cx: 0.5, cy: 0.5, w: 0.2, h: 0.2 };
        let b = RawDetection { conf: 0.8, cx: 0.51, ..a };
        let c = RawDetection { class_id: 1, conf: 0.7, ..a };
        let kept = nms_filter(vec![b, c, a], 0.5, 10);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].conf, 0.9);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn nms_respects_max_detections() {
        let a = RawDetection { class_id: 0, conf: 0.9, cx: 0.1, cy: 0.1, w: 0.05, h: 0.05 };
        let b = RawDetection { cx: 0.9, conf: 0.8, ..a };
        assert_eq!(nms_filter(vec![a, b], 0.5, 1).len(), 1);
    }

    #[test]
    fn raw_to_pixels_maps_and_labels() {
        let r = RawDetection { class_id: 2, conf: 0.6, cx: 0.5, cy: 0.5, w: 0.5, h: 0.25 };
        let d = r.to_pixels(200, 100, &names()).unwrap();
        assert_eq!(d.label, "out of water");
        assert_eq!(d.bbox, BBox::new(50, 37, 150, 62));
        assert_eq!(d.classify(), Classification::OutOfWater);
    }

    #[test]
    fn raw_to_pixels_drops_anomalies() {
        let r = RawDetection { class_id: 7, conf: 0.6, cx: 0.5, cy: 0.5, w: 0.5, h: 0.5 };
        assert!(r.to_pixels(10, 10, &names()).is_none());
        let r = RawDetection { class_id: 0, cx: f32::NAN, ..r };
        assert!(r.to_pixels(10, 10, &names()).is_none());
    }

    #[test]
    fn bbox_clamp() {
        assert_eq!(BBox::new(-5, -5, 500, 8).clamp_to(100, 50), Some(BBox::new(0, 0, 99, 8)));
        assert_eq!(BBox::new(30, 30, 10, 10).clamp_to(100, 50), Some(BBox::new(10, 10, 30, 30)));
        assert_eq!(BBox::new(200, 0, 300, 10).clamp_to(100, 50), None);
        assert_eq!(BBox::new(0, 0, 1, 1).clamp_to(0, 0), None);
    }
}

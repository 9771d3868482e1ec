use anyhow::Result;
use std::path::Path;

use crate::classify::table_can_report_drowning;
use crate::VisionConfig;

pub fn check_model(cfg: &VisionConfig) -> Result<()> {
    let model_path = if cfg.use_coral { &cfg.model_path_edgetpu } else { &cfg.model_path };
    anyhow::ensure!(Path::new(model_path).is_file(), "vision model missing: {}", model_path);
    anyhow::ensure!(cfg.backend == "tflite", "unknown vision.backend: {}", cfg.backend);
    cfg.input_bytes(std::mem::size_of::<f32>())?;
    check_classes(&cfg.class_names)?;
    check_thresholds(cfg.conf_threshold, cfg.nms_iou_threshold, cfg.max_detections)?;
    anyhow::ensure!(
        matches!(cfg.output_layout.as_str(), "ultralytics" | "ultralytics-v8"),
        "unsupported vision.output_layout: {}",
        cfg.output_layout
    );
    Ok(())
}

pub fn check_classes(class_names: &[String]) -> Result<()> {
    anyhow::ensure!(!class_names.is_empty(), "vision.class_names is empty");
    anyhow::ensure!(
        table_can_report_drowning(class_names),
        "vision.class_names has no drowning class; alarms can never fire"
    );
    Ok(())
}

pub fn check_thresholds(conf: f32, iou: f32, max_det: usize) -> Result<()> {
    anyhow::ensure!(conf > 0.0 && conf < 1.0, "vision.conf_threshold should be in (0, 1)");
    anyhow::ensure!(iou > 0.0 && iou <= 1.0, "vision.nms_iou_threshold should be in (0, 1]");
    anyhow::ensure!(max_det >= 1, "vision.max_detections must be >= 1");
    Ok(())
}

use crate::RawDetection;

pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let (ax1, ay1, ax2, ay2) = corners(a);
    let (bx1, by1, bx2, by2) = corners(b);

    let iw = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
    let ih = (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let inter = iw * ih;
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn corners(d: &RawDetection) -> (f32, f32, f32, f32) {
    (d.cx - d.w / 2.0, d.cy - d.h / 2.0, d.cx + d.w / 2.0, d.cy + d.h / 2.0)
}

fn area(d: &RawDetection) -> f32 {
    d.w.max(0.0) * d.h.max(0.0)
}

use anyhow::Result;
use image::{imageops::FilterType, RgbImage};
use std::{ffi::CString, os::raw::{c_char, c_int, c_void}, ptr};
use tracing::{debug, info};

use crate::{nms_filter, postprocess_ultralytics, postprocess_ultralytics_v8, Detection, Detector, VisionConfig};

#[repr(C)]
struct TfLiteModel;
#[repr(C)]
struct TfLiteInterpreterOptions;
#[repr(C)]
struct TfLiteInterpreter;
#[repr(C)]
struct TfLiteTensor;
#[repr(C)]
struct TfLiteDelegate;

#[link(name = "tensorflowlite_c")]
extern "C" {
    fn TfLiteModelCreateFromFile(model_path: *const c_char) -> *mut TfLiteModel;
    fn TfLiteModelDelete(model: *mut TfLiteModel);

    fn TfLiteInterpreterOptionsCreate() -> *mut TfLiteInterpreterOptions;
    fn TfLiteInterpreterOptionsDelete(options: *mut TfLiteInterpreterOptions);
    fn TfLiteInterpreterOptionsSetNumThreads(options: *mut TfLiteInterpreterOptions, num_threads: c_int);
    #[allow(dead_code)]
    fn TfLiteInterpreterOptionsAddDelegate(options: *mut TfLiteInterpreterOptions, delegate: *mut TfLiteDelegate);

    fn TfLiteInterpreterCreate(model: *const TfLiteModel, options: *const TfLiteInterpreterOptions) -> *mut TfLiteInterpreter;
    fn TfLiteInterpreterDelete(interpreter: *mut TfLiteInterpreter);

    fn TfLiteInterpreterAllocateTensors(interpreter: *mut TfLiteInterpreter) -> c_int;
    fn TfLiteInterpreterInvoke(interpreter: *mut TfLiteInterpreter) -> c_int;

    fn TfLiteInterpreterGetInputTensor(interpreter: *mut TfLiteInterpreter, index: c_int) -> *mut TfLiteTensor;
    fn TfLiteInterpreterGetOutputTensor(interpreter: *mut TfLiteInterpreter, index: c_int) -> *const TfLiteTensor;

    fn TfLiteTensorData(tensor: *const TfLiteTensor) -> *mut c_void;
    fn TfLiteTensorByteSize(tensor: *const TfLiteTensor) -> usize;

    fn TfLiteTensorNumDims(tensor: *const TfLiteTensor) -> c_int;
    fn TfLiteTensorDim(tensor: *const TfLiteTensor, dim_index: c_int) -> c_int;
}

#[cfg(feature = "vision-coral")]
#[link(name = "edgetpu")]
extern "C" {
    fn edgetpu_create_delegate(device_type: c_int, device_path: *const c_char, options: *const c_char) -> *mut TfLiteDelegate;
    fn edgetpu_free_delegate(delegate: *mut TfLiteDelegate);
}

/// Input element type, inferred from the input tensor byte size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    U8,
    F32,
}

pub struct TfliteDetector {
    cfg: VisionConfig,
    model: *mut TfLiteModel,
    opts: *mut TfLiteInterpreterOptions,
    interp: *mut TfLiteInterpreter,
    input_kind: InputKind,
    #[cfg(feature = "vision-coral")]
    delegate: Option<*mut TfLiteDelegate>,
}

// The raw handles are only touched through `&mut self`.
unsafe impl Send for TfliteDetector {}

impl TfliteDetector {
    pub fn new(cfg: VisionConfig) -> Result<Self> {
        let model_path = if cfg.use_coral { cfg.model_path_edgetpu.clone() } else { cfg.model_path.clone() };
        let cpath = CString::new(model_path.as_str())?;
        let model = unsafe { TfLiteModelCreateFromFile(cpath.as_ptr()) };
        anyhow::ensure!(!model.is_null(), "failed to load tflite model: {}", model_path);

        let opts = unsafe { TfLiteInterpreterOptionsCreate() };
        anyhow::ensure!(!opts.is_null(), "failed to create tflite options");
        unsafe { TfLiteInterpreterOptionsSetNumThreads(opts, cfg.num_threads.max(1)); }

        #[cfg(feature = "vision-coral")]
        let delegate = if cfg.use_coral {
            let d = unsafe { edgetpu_create_delegate(0, ptr::null(), ptr::null()) };
            anyhow::ensure!(!d.is_null(), "failed to create EdgeTPU delegate");
            unsafe { TfLiteInterpreterOptionsAddDelegate(opts, d); }
            Some(d)
        } else { None };

        #[cfg(not(feature = "vision-coral"))]
        if cfg.use_coral {
            anyhow::bail!("vision.use_coral=true but binary not built with --features vision-coral");
        }

        let interp = unsafe { TfLiteInterpreterCreate(model, opts) };
        anyhow::ensure!(!interp.is_null(), "failed to create tflite interpreter");

        let rc = unsafe { TfLiteInterpreterAllocateTensors(interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterAllocateTensors failed");

        let input = unsafe { TfLiteInterpreterGetInputTensor(interp, 0) };
        anyhow::ensure!(!input.is_null(), "no input tensor");
        let in_bytes = unsafe { TfLiteTensorByteSize(input) };
        let input_kind = if in_bytes == cfg.input_bytes(std::mem::size_of::<f32>())? {
            InputKind::F32
        } else if in_bytes == cfg.input_bytes(1)? {
            InputKind::U8
        } else {
            anyhow::bail!(
                "input tensor is {} bytes; expected {}x{}x3 as u8 or f32. Check vision.img_w/img_h.",
                in_bytes, cfg.img_w, cfg.img_h
            );
        };

        info!(model = %model_path, input = ?input_kind, layout = %cfg.output_layout, "vision: loaded TFLite model");

        Ok(Self {
            cfg, model, opts, interp, input_kind,
            #[cfg(feature = "vision-coral")]
            delegate,
        })
    }

    pub fn inspect(&mut self) -> Result<String> {
        let input = unsafe { TfLiteInterpreterGetInputTensor(self.interp, 0) };
        anyhow::ensure!(!input.is_null(), "no input tensor");
        let in_dims = tensor_dims(input);
        let in_bytes = unsafe { TfLiteTensorByteSize(input) };

        let out0 = unsafe { TfLiteInterpreterGetOutputTensor(self.interp, 0) };
        anyhow::ensure!(!out0.is_null(), "no output tensor 0");
        let out_dims = tensor_dims(out0);
        let out_bytes = unsafe { TfLiteTensorByteSize(out0) };

        Ok(format!(
            "TFLite inspect:\n- input[0] dims={:?} bytes={} kind={:?}\n- output[0] dims={:?} bytes={}\n- classes={:?}\n",
            in_dims, in_bytes, self.input_kind, out_dims, out_bytes, self.cfg.class_names
        ))
    }

    fn write_input(&mut self, frame: &RgbImage) -> Result<()> {
        let resized = image::imageops::resize(frame, self.cfg.img_w, self.cfg.img_h, FilterType::Triangle);
        let src = resized.as_raw();

        let input = unsafe { TfLiteInterpreterGetInputTensor(self.interp, 0) };
        anyhow::ensure!(!input.is_null(), "no input tensor");
        let in_ptr = unsafe { TfLiteTensorData(input) };
        anyhow::ensure!(!in_ptr.is_null(), "null input tensor data");

        match self.input_kind {
            InputKind::U8 => unsafe {
                ptr::copy_nonoverlapping(src.as_ptr(), in_ptr as *mut u8, src.len());
            },
            InputKind::F32 => {
                let dst = unsafe { std::slice::from_raw_parts_mut(in_ptr as *mut f32, src.len()) };
                for (d, s) in dst.iter_mut().zip(src) {
                    *d = *s as f32 / 255.0;
                }
            }
        }
        Ok(())
    }

    fn read_output(&self) -> Result<(Vec<i32>, &[f32])> {
        let out = unsafe { TfLiteInterpreterGetOutputTensor(self.interp, 0) };
        anyhow::ensure!(!out.is_null(), "no output tensor 0");

        let out_ptr = unsafe { TfLiteTensorData(out) as *const f32 };
        anyhow::ensure!(!out_ptr.is_null(), "null output tensor data");
        let out_bytes = unsafe { TfLiteTensorByteSize(out) };
        let out_len = out_bytes / std::mem::size_of::<f32>();
        let raw = unsafe { std::slice::from_raw_parts(out_ptr, out_len) };
        Ok((tensor_dims(out), raw))
    }
}

impl Detector for TfliteDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        self.write_input(frame)?;

        let rc = unsafe { TfLiteInterpreterInvoke(self.interp) };
        anyhow::ensure!(rc == 0, "TfLiteInterpreterInvoke failed");

        let (out_dims, raw) = self.read_output()?;
        let num_classes = self.cfg.num_classes();
        let th = self.cfg.conf_threshold;

        let dets = match self.cfg.output_layout.as_str() {
            "ultralytics" => {
                let (num_preds, stride) = match out_dims.as_slice() {
                    [1, n, s] | [n, s] => (*n as usize, *s as usize),
                    other => anyhow::bail!("unexpected output dims {:?} for layout ultralytics", other),
                };
                anyhow::ensure!(
                    stride == 5 + num_classes,
                    "stride mismatch: got {}, expected {} (dims {:?}). Check vision.class_names.",
                    stride, 5 + num_classes, out_dims
                );
                postprocess_ultralytics(raw, num_preds, num_classes, th)
            }
            "ultralytics-v8" => {
                let (rows, num_preds) = match out_dims.as_slice() {
                    [1, r, n] | [r, n] => (*r as usize, *n as usize),
                    other => anyhow::bail!("unexpected output dims {:?} for layout ultralytics-v8", other),
                };
                anyhow::ensure!(
                    rows == 4 + num_classes,
                    "row mismatch: got {}, expected {} (dims {:?}). Check vision.class_names.",
                    rows, 4 + num_classes, out_dims
                );
                postprocess_ultralytics_v8(raw, num_preds, num_classes, th)
            }
            other => anyhow::bail!(
                "unsupported output_layout: {} (dims={:?}). Run `poolwatch vision inspect` to view tensors.",
                other, out_dims
            ),
        };

        let kept = nms_filter(dets, self.cfg.nms_iou_threshold, self.cfg.max_detections);
        debug!(kept = kept.len(), "vision: inference done");
        Ok(kept
            .iter()
            .filter_map(|d| d.to_pixels(frame.width(), frame.height(), &self.cfg.class_names))
            .collect())
    }
}

fn tensor_dims(t: *const TfLiteTensor) -> Vec<i32> {
    unsafe {
        let nd = TfLiteTensorNumDims(t);
        (0..nd).map(|i| TfLiteTensorDim(t, i)).collect()
    }
}

impl Drop for TfliteDetector {
    fn drop(&mut self) {
        unsafe {
            if !self.interp.is_null() { TfLiteInterpreterDelete(self.interp); }
            if !self.opts.is_null() { TfLiteInterpreterOptionsDelete(self.opts); }
            if !self.model.is_null() { TfLiteModelDelete(self.model); }
        }
        #[cfg(feature = "vision-coral")]
        unsafe {
            if let Some(d) = self.delegate {
                edgetpu_free_delegate(d);
            }
        }
    }
}

// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/detector.rs - 检测器实例与单帧分类
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
  backend::BackendDescriptor,
  error::DetectError,
  face::FacePreprocessor,
  input::{decode_image, read_image},
  label::{Normalized, Outcome},
  model::{Classifier, ClassifierLoader, InferenceError, Prediction, predict},
};

/// 单帧分类结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameResult {
  pub frame_index: u64,
  pub outcome: Outcome,
  pub label: String,
  /// 预测类别的概率，范围 [0, 1]
  pub raw_confidence: f64,
}

/// 对外报告的单元
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalResult {
  pub is_fake: bool,
  /// 范围 [0, 100]，内部保持全精度，只在序列化时保留两位小数
  pub confidence_percent: f64,
  pub model_used: &'static str,
}

impl CanonicalResult {
  pub fn new(outcome: Outcome, raw_confidence: f64, model_used: &'static str) -> Self {
    CanonicalResult {
      is_fake: outcome.is_fake(),
      confidence_percent: (raw_confidence * 100.0).clamp(0.0, 100.0),
      model_used,
    }
  }
}

/// 一个已选定的后端：模型权重在首次使用时加载，之后被所有调用共享
///
/// 实例本身不保存任何跨帧状态，摄像头的平滑窗口由 [`crate::stream`] 按会话持有。
pub struct DetectorInstance {
  descriptor: BackendDescriptor,
  loader: Arc<dyn ClassifierLoader>,
  face: FacePreprocessor,
  model: Mutex<Option<Arc<dyn Classifier>>>,
}

impl DetectorInstance {
  pub fn new(
    descriptor: BackendDescriptor,
    loader: Arc<dyn ClassifierLoader>,
    face: FacePreprocessor,
  ) -> Self {
    DetectorInstance {
      descriptor,
      loader,
      face,
      model: Mutex::new(None),
    }
  }

  pub fn descriptor(&self) -> &BackendDescriptor {
    &self.descriptor
  }

  pub fn display_name(&self) -> &'static str {
    self.descriptor.display_name
  }

  pub fn is_loaded(&self) -> bool {
    self.model.lock().map(|m| m.is_some()).unwrap_or(false)
  }

  /// 确保模型已加载；加载在锁内进行，并发的首次调用只会加载一次
  pub fn ensure_loaded(&self) -> Result<Arc<dyn Classifier>, DetectError> {
    let mut slot = self
      .model
      .lock()
      .map_err(|_| InferenceError::LockPoisoned)?;
    if let Some(model) = slot.as_ref() {
      return Ok(model.clone());
    }

    let start = Instant::now();
    let model = self.loader.load(&self.descriptor)?;
    info!(
      "后端 {} 加载完成, 耗时 {:.2?}",
      self.descriptor.key,
      start.elapsed()
    );
    *slot = Some(model.clone());
    Ok(model)
  }

  /// 释放已加载的权重，下次使用时重新加载
  pub fn unload(&self) {
    if let Ok(mut slot) = self.model.lock()
      && slot.take().is_some()
    {
      debug!("释放后端 {} 的模型", self.descriptor.key);
    }
  }

  /// 运行到 softmax 概率为止，不做标签归一化
  pub fn predict(&self, image: &RgbImage, enhance: bool) -> Result<Prediction, DetectError> {
    let model = self.ensure_loaded()?;
    let image = if enhance {
      self.face.enhance(image)
    } else {
      std::borrow::Cow::Borrowed(image)
    };

    let start = Instant::now();
    let logits = model.logits(&image)?;
    debug!("推理耗时 {:.2?}, logits: {:?}", start.elapsed(), logits);
    Ok(predict(&logits)?)
  }

  /// 按后端的标签方案归一化类别索引
  pub fn normalize(&self, class_index: usize) -> Result<Normalized, DetectError> {
    let model = self.ensure_loaded()?;
    Ok(
      self
        .descriptor
        .labels
        .normalize(class_index, |i| model.native_label(i)),
    )
  }

  pub fn classify_frame(
    &self,
    image: &RgbImage,
    enhance: bool,
    frame_index: u64,
  ) -> Result<FrameResult, DetectError> {
    let prediction = self.predict(image, enhance)?;
    let normalized = self.normalize(prediction.class_index)?;
    Ok(FrameResult {
      frame_index,
      outcome: normalized.outcome,
      label: normalized.label,
      raw_confidence: prediction.confidence,
    })
  }

  /// 单帧分类
  pub fn classify(&self, image: &RgbImage, enhance: bool) -> Result<CanonicalResult, DetectError> {
    let frame = self.classify_frame(image, enhance, 0)?;
    let result = CanonicalResult::new(frame.outcome, frame.raw_confidence, self.display_name());
    info!(
      "{}: {} ({}), 置信度 {:.2}%",
      self.descriptor.key, frame.outcome, frame.label, result.confidence_percent
    );
    Ok(result)
  }

  pub fn classify_path(&self, path: &Path, enhance: bool) -> Result<CanonicalResult, DetectError> {
    let image = read_image(path)?;
    self.classify(&image, enhance)
  }

  pub fn classify_bytes(&self, bytes: &[u8], enhance: bool) -> Result<CanonicalResult, DetectError> {
    let image = decode_image(bytes)?;
    self.classify(&image, enhance)
  }
}


#[cfg(test)]
mod tests {
  use super::testing::*;
  use super::*;

  #[test]
  fn explicit_backend_maps_class_zero_to_fake() {
    let det = instance("dima806", ScriptedClassifier::constant(logits_for(0, 0.9)));
    let r = det.classify(&blank(4, 4), false).unwrap();
    assert!(r.is_fake);
    assert!((r.confidence_percent - 90.0).abs() < 1e-4);
    assert_eq!(r.model_used, "Dima806 Deepfake Detector");
  }

  #[test]
  fn model_native_labels_are_matched_by_text() {
    let classifier =
      ScriptedClassifier::constant(logits_for(1, 0.8)).with_labels(&["Realism", "Deepfake"]);
    let det = instance("deep-fake-v2", classifier);
    let frame = det.classify_frame(&blank(2, 2), false, 7).unwrap();
    assert_eq!(frame.outcome, Outcome::Fake);
    assert_eq!(frame.label, "Deepfake");
    assert_eq!(frame.frame_index, 7);
  }

  #[test]
  fn unknown_native_index_fails_open_to_real() {
    let det = instance("deep-fake-v2", ScriptedClassifier::constant(vec![0.0, 0.0, 5.0]));
    let frame = det.classify_frame(&blank(2, 2), false, 0).unwrap();
    assert_eq!(frame.label, "Class_2");
    assert_eq!(frame.outcome, Outcome::Real);
  }

  #[test]
  fn weights_load_once() {
    let loader = Arc::new(StaticLoader::new(ScriptedClassifier::constant(vec![1.0, 0.0])));
    let det = Arc::new(instance_with("dima806", loader.clone()));
    assert!(!det.is_loaded());

    let handles: Vec<_> = (0..4)
      .map(|_| {
        let det = det.clone();
        std::thread::spawn(move || det.classify(&blank(2, 2), false).unwrap())
      })
      .collect();
    for h in handles {
      h.join().unwrap();
    }
    assert_eq!(loader.load_count(), 1);

    det.unload();
    assert!(!det.is_loaded());
    det.classify(&blank(2, 2), false).unwrap();
    assert_eq!(loader.load_count(), 2);
  }

  #[test]
  fn load_failure_is_model_load_failure() {
    let det = instance_with("dima806", Arc::new(StaticLoader::failing()));
    let err = det.classify(&blank(2, 2), false).unwrap_err();
    assert_eq!(err.tag(), "model_load_failure");
  }

  #[test]
  fn runtime_errors_surface_as_inference_failure() {
    let classifier = ScriptedClassifier::scripted(vec![Err("npu timeout".into())], vec![1.0, 0.0]);
    let det = instance("dima806", classifier);
    let err = det.classify(&blank(2, 2), false).unwrap_err();
    assert_eq!(err.tag(), "inference_failure");
    // no internal retry, next call proceeds normally
    assert!(det.classify(&blank(2, 2), false).is_ok());
  }

  #[test]
  fn missing_and_malformed_inputs() {
    let det = instance("dima806", ScriptedClassifier::constant(vec![1.0, 0.0]));
    let err = det
      .classify_path(Path::new("/definitely/not/here.jpg"), false)
      .unwrap_err();
    assert!(matches!(err, DetectError::NotFound(_)));
    let err = det.classify_bytes(b"not an image", false).unwrap_err();
    assert!(matches!(err, DetectError::DecodeError(_)));
  }

  #[test]
  fn canonical_confidence_is_bounded() {
    let r = CanonicalResult::new(Outcome::Real, 1.000_000_1, "m");
    assert_eq!(r.confidence_percent, 100.0);
    assert!(!r.is_fake);
  }
}

// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/model.rs - 分类模型
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

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::backend::BackendDescriptor;
#[cfg(any(feature = "model_candle", feature = "model_rknn"))]
use crate::FromUrl;

/// HuggingFace Hub 模型（candle 运行时）
pub const HF_SCHEME: &str = "hf";
/// Rockchip NPU 模型
pub const RKNN_SCHEME: &str = "rknn";

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型路径错误: {0}")]
  InvalidReference(String),
  #[error("模型方案 '{scheme}' 需要启用特性 {feature}")]
  FeatureDisabled {
    scheme: String,
    feature: &'static str,
  },
  #[error("不支持的模型方案: {0}")]
  UnsupportedScheme(String),
  #[error("模型文件读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型配置无效: {0}")]
  InvalidConfig(String),
  #[error("运行时错误: {0}")]
  Runtime(String),
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("运行时错误: {0}")]
  Runtime(String),
  #[error("模型输出为空")]
  EmptyOutput,
  #[error("模型锁已损坏")]
  LockPoisoned,
}

/// 已加载的图像分类器：输入图像，输出每个类别的原始分数（logits）
///
/// 推理期间权重只读，实现需要可在线程间共享。
pub trait Classifier: Send + Sync {
  fn logits(&self, image: &RgbImage) -> Result<Vec<f32>, InferenceError>;

  /// 模型自带的标签词表
  fn native_label(&self, _index: usize) -> Option<&str> {
    None
  }
}

/// 按后端描述符加载分类器
pub trait ClassifierLoader: Send + Sync {
  fn load(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn Classifier>, ModelLoadError>;
}

/// softmax 后的预测
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  pub class_index: usize,
  /// 预测类别的概率，范围 [0, 1]
  pub confidence: f64,
  pub probabilities: Vec<f64>,
}

/// 数值稳定的 softmax：先减去最大值再取指数
pub fn softmax(logits: &[f32]) -> Vec<f64> {
  let max = logits
    .iter()
    .copied()
    .fold(f32::NEG_INFINITY, f32::max) as f64;
  let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
  let sum: f64 = exps.iter().sum();
  exps.into_iter().map(|e| e / sum).collect()
}

/// softmax 后取最大概率类别，并列时取索引最小者
pub fn predict(logits: &[f32]) -> Result<Prediction, InferenceError> {
  if logits.is_empty() {
    return Err(InferenceError::EmptyOutput);
  }
  if logits.iter().any(|l| !l.is_finite()) {
    return Err(InferenceError::Runtime(format!(
      "模型输出包含非有限值: {:?}",
      logits
    )));
  }

  let probabilities = softmax(logits);
  let (class_index, confidence) = probabilities
    .iter()
    .copied()
    .enumerate()
    .fold((0, f64::NEG_INFINITY), |best, (i, p)| {
      if p > best.1 { (i, p) } else { best }
    });

  debug!("预测类别 {} 概率 {:.4}", class_index, confidence);
  Ok(Prediction {
    class_index,
    confidence,
    probabilities,
  })
}

/// 依据模型地址的 URL 方案选择运行时的加载器
///
/// 可以为单个后端覆盖模型地址，例如把 SigLIP 后端指向 RKNN 导出的模型。
#[derive(Debug, Clone, Default)]
pub struct UrlClassifierLoader {
  overrides: HashMap<String, Url>,
}

impl UrlClassifierLoader {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_override(mut self, key: impl Into<String>, url: Url) -> Self {
    self.overrides.insert(key.into(), url);
    self
  }

  pub fn with_overrides<I: IntoIterator<Item = (String, Url)>>(mut self, overrides: I) -> Self {
    self.overrides.extend(overrides);
    self
  }

  pub fn reference(&self, descriptor: &BackendDescriptor) -> Result<Url, ModelLoadError> {
    if let Some(url) = self.overrides.get(descriptor.key) {
      return Ok(url.clone());
    }
    Url::parse(descriptor.model_reference).map_err(|e| {
      ModelLoadError::InvalidReference(format!("{}: {}", descriptor.model_reference, e))
    })
  }
}

impl ClassifierLoader for UrlClassifierLoader {
  fn load(&self, descriptor: &BackendDescriptor) -> Result<Arc<dyn Classifier>, ModelLoadError> {
    let url = self.reference(descriptor)?;
    info!("加载后端 {} 的模型: {}", descriptor.key, url);

    match url.scheme() {
      #[cfg(feature = "model_candle")]
      HF_SCHEME => Ok(Arc::new(HfVitBuilder::from_url(&url)?.build()?)),
      #[cfg(not(feature = "model_candle"))]
      HF_SCHEME => Err(ModelLoadError::FeatureDisabled {
        scheme: HF_SCHEME.to_string(),
        feature: "model_candle",
      }),
      #[cfg(feature = "model_rknn")]
      RKNN_SCHEME => Ok(Arc::new(RknnClassifierBuilder::from_url(&url)?.build()?)),
      #[cfg(not(feature = "model_rknn"))]
      RKNN_SCHEME => Err(ModelLoadError::FeatureDisabled {
        scheme: RKNN_SCHEME.to_string(),
        feature: "model_rknn",
      }),
      other => Err(ModelLoadError::UnsupportedScheme(other.to_string())),
    }
  }
}

/// 解析 `key=url` 形式的模型地址覆盖，供命令行使用
pub fn parse_backend_override(s: &str) -> Result<(String, Url), String> {
  let (key, url) = s
    .split_once('=')
    .ok_or_else(|| format!("期望 <后端>=<URL>，实际为 '{}'", s))?;
  let url = Url::parse(url).map_err(|e| format!("无效的模型地址 '{}': {}", url, e))?;
  Ok((key.to_string(), url))
}

#[cfg(feature = "model_candle")]
mod candle_vit;
#[cfg(feature = "model_candle")]
pub use self::candle_vit::{HfVit, HfVitBuilder};

#[cfg(feature = "model_rknn")]
mod rknn;
#[cfg(feature = "model_rknn")]
pub use self::rknn::{RknnClassifier, RknnClassifierBuilder};

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::BackendCatalog;

  #[test]
  fn softmax_is_stable_for_large_logits() {
    let p = softmax(&[1000.0, 1000.0]);
    assert_eq!(p, vec![0.5, 0.5]);
    let p = softmax(&[-1000.0, 0.0]);
    assert!(p[1] > 0.999_999);
  }

  #[test]
  fn predict_takes_argmax() {
    let p = predict(&[0.1, 2.0, -1.0]).unwrap();
    assert_eq!(p.class_index, 1);
    let sum: f64 = p.probabilities.iter().sum();
    assert!((sum - 1.0).abs() < 1e-12);
    assert!((p.confidence - p.probabilities[1]).abs() < 1e-12);
  }

  #[test]
  fn predict_prefers_first_on_tie() {
    let p = predict(&[3.0, 3.0]).unwrap();
    assert_eq!(p.class_index, 0);
    assert_eq!(p.confidence, 0.5);
  }

  #[test]
  fn predict_rejects_empty_and_nan() {
    assert!(matches!(predict(&[]), Err(InferenceError::EmptyOutput)));
    assert!(matches!(
      predict(&[f32::NAN, 1.0]),
      Err(InferenceError::Runtime(_))
    ));
  }

  #[test]
  fn override_replaces_reference() {
    let catalog = BackendCatalog::builtin();
    let siglip = catalog.resolve("open-deepfake");
    let url = Url::parse("rknn:///opt/models/siglip.rknn").unwrap();
    let loader = UrlClassifierLoader::new().with_override("open-deepfake", url.clone());
    assert_eq!(loader.reference(siglip).unwrap(), url);
    assert_eq!(
      loader.reference(catalog.resolve("dima806")).unwrap().scheme(),
      HF_SCHEME
    );
  }

  #[test]
  fn unknown_scheme_is_a_load_failure() {
    let catalog = BackendCatalog::builtin();
    let loader = UrlClassifierLoader::new()
      .with_override("dima806", Url::parse("onnx:///tmp/model.onnx").unwrap());
    let err = loader.load(catalog.resolve("dima806")).err().unwrap();
    assert!(matches!(err, ModelLoadError::UnsupportedScheme(s) if s == "onnx"));
  }

  #[test]
  fn parses_override_arguments() {
    let (key, url) = parse_backend_override("open-deepfake=rknn:///m/a.rknn?width=256").unwrap();
    assert_eq!(key, "open-deepfake");
    assert_eq!(url.path(), "/m/a.rknn");
    assert!(parse_backend_override("no-equals-sign").is_err());
    assert!(parse_backend_override("k=not a url").is_err());
  }
}

// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/model/candle_vit.rs - HuggingFace ViT 分类模型（candle 运行时）
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

use std::collections::BTreeMap;
use std::sync::Mutex;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::vit;
use hf_hub::{Repo, RepoType, api::sync::Api};
use image::RgbImage;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{InputSpec, TensorLayout, to_f32_tensor},
  model::{Classifier, HF_SCHEME, InferenceError, ModelLoadError},
};

const DEFAULT_REVISION: &str = "main";
const SUPPORTED_MODEL_TYPE: &str = "vit";

fn runtime_err(e: impl std::fmt::Display) -> ModelLoadError {
  ModelLoadError::Runtime(e.to_string())
}

fn infer_err(e: candle_core::Error) -> InferenceError {
  InferenceError::Runtime(e.to_string())
}

/// `hf://<owner>/<repo>?revision=<rev>` 形式的模型构建器
pub struct HfVitBuilder {
  repo_id: String,
  revision: String,
}

impl FromUrlWithScheme for HfVitBuilder {
  const SCHEME: &'static str = HF_SCHEME;
}

impl FromUrl for HfVitBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::InvalidReference(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let owner = url
      .host_str()
      .ok_or_else(|| ModelLoadError::InvalidReference(format!("缺少仓库所有者: {}", url)))?;
    let name = url.path().trim_matches('/');
    if name.is_empty() {
      return Err(ModelLoadError::InvalidReference(format!(
        "缺少仓库名称: {}",
        url
      )));
    }

    let revision = url
      .query_pairs()
      .find(|(k, _)| k == "revision")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_REVISION.to_string());

    Ok(HfVitBuilder {
      repo_id: format!("{}/{}", owner, name),
      revision,
    })
  }
}

impl HfVitBuilder {
  pub fn repo_id(&self) -> &str {
    &self.repo_id
  }

  pub fn build(self) -> Result<HfVit, ModelLoadError> {
    #[cfg(feature = "metal")]
    let device = Device::new_metal(0).unwrap_or(Device::Cpu);
    #[cfg(not(feature = "metal"))]
    let device = Device::Cpu;

    info!(
      "从 HuggingFace 获取模型 {}@{}，设备 {:?}",
      self.repo_id, self.revision, device
    );

    let api = Api::new().map_err(runtime_err)?;
    let repo = api.repo(Repo::with_revision(
      self.repo_id.clone(),
      RepoType::Model,
      self.revision.clone(),
    ));

    let config_path = repo.get("config.json").map_err(runtime_err)?;
    let raw_config: Value = serde_json::from_str(&std::fs::read_to_string(config_path)?)
      .map_err(|e| ModelLoadError::InvalidConfig(e.to_string()))?;

    if let Some(model_type) = raw_config.get("model_type").and_then(Value::as_str)
      && model_type != SUPPORTED_MODEL_TYPE
    {
      return Err(ModelLoadError::InvalidConfig(format!(
        "不支持的模型架构 '{}'，candle 运行时仅支持 {}",
        model_type, SUPPORTED_MODEL_TYPE
      )));
    }

    let id2label = parse_id2label(&raw_config)?;
    let num_labels = id2label.keys().next_back().map(|k| k + 1).unwrap_or(0);
    if num_labels < 2 {
      return Err(ModelLoadError::InvalidConfig(format!(
        "{} 的 id2label 至少需要两个类别",
        self.repo_id
      )));
    }
    debug!("模型标签: {:?}", id2label);

    let spec = match repo.get("preprocessor_config.json") {
      Ok(path) => {
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(path)?)
          .map_err(|e| ModelLoadError::InvalidConfig(e.to_string()))?;
        parse_input_spec(&raw)
      }
      Err(e) => {
        warn!("无法获取 preprocessor_config.json ({}), 使用 ViT 默认预处理", e);
        InputSpec::default()
      }
    };
    debug!("模型输入: {:?}", spec);

    let config: vit::Config = serde_json::from_value(raw_config)
      .map_err(|e| ModelLoadError::InvalidConfig(e.to_string()))?;
    let weights = repo.get("model.safetensors").map_err(runtime_err)?;
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
      .map_err(runtime_err)?;
    let model = vit::Model::new(&config, num_labels, vb).map_err(runtime_err)?;

    info!("模型加载完成: {} ({} 个类别)", self.repo_id, num_labels);

    Ok(HfVit {
      model: Mutex::new(model),
      device,
      spec,
      id2label,
    })
  }
}

/// 解析 `{"id2label": {"0": "Fake", "1": "Real"}}`
fn parse_id2label(config: &Value) -> Result<BTreeMap<usize, String>, ModelLoadError> {
  let map = config
    .get("id2label")
    .and_then(Value::as_object)
    .ok_or_else(|| ModelLoadError::InvalidConfig("config.json 缺少 id2label".to_string()))?;

  map
    .iter()
    .map(|(k, v)| {
      let index = k
        .parse::<usize>()
        .map_err(|_| ModelLoadError::InvalidConfig(format!("无效的类别索引: {}", k)))?;
      let label = v.as_str().unwrap_or_default().to_string();
      Ok((index, label))
    })
    .collect()
}

/// 从 `preprocessor_config.json` 读取尺寸与归一化参数，缺失项使用默认值
fn parse_input_spec(raw: &Value) -> InputSpec {
  let default = InputSpec::default();

  let triple = |key: &str, fallback: [f32; 3]| -> [f32; 3] {
    raw
      .get(key)
      .and_then(Value::as_array)
      .filter(|a| a.len() == 3)
      .map(|a| {
        let mut out = fallback;
        for (o, v) in out.iter_mut().zip(a) {
          *o = v.as_f64().map(|f| f as f32).unwrap_or(*o);
        }
        out
      })
      .unwrap_or(fallback)
  };

  let (width, height) = match raw.get("size") {
    Some(Value::Number(n)) => {
      let s = n.as_u64().unwrap_or(default.width as u64) as u32;
      (s, s)
    }
    Some(Value::Object(o)) => {
      let get = |k: &str| o.get(k).and_then(Value::as_u64).map(|v| v as u32);
      match (get("width"), get("height"), get("shortest_edge")) {
        (Some(w), Some(h), _) => (w, h),
        (_, _, Some(s)) => (s, s),
        _ => (default.width, default.height),
      }
    }
    _ => (default.width, default.height),
  };

  default
    .clone()
    .with_size(width, height)
    .with_layout(TensorLayout::Nchw)
    .with_normalize(
      triple("image_mean", default.mean),
      triple("image_std", default.std),
    )
}

/// HuggingFace ViT 图像分类模型
pub struct HfVit {
  model: Mutex<vit::Model>,
  device: Device,
  spec: InputSpec,
  id2label: BTreeMap<usize, String>,
}

impl Classifier for HfVit {
  fn logits(&self, image: &RgbImage) -> Result<Vec<f32>, InferenceError> {
    let data = to_f32_tensor(image, &self.spec);
    let shape = (
      1,
      3,
      self.spec.height as usize,
      self.spec.width as usize,
    );
    let input = Tensor::from_vec(data, shape, &self.device).map_err(infer_err)?;

    let model = self.model.lock().map_err(|_| InferenceError::LockPoisoned)?;
    let logits = model.forward(&input).map_err(infer_err)?;
    logits
      .flatten_all()
      .and_then(|t| t.to_vec1::<f32>())
      .map_err(infer_err)
  }

  fn native_label(&self, index: usize) -> Option<&str> {
    self.id2label.get(&index).map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_reads_repo_and_revision() {
    let url = Url::parse("hf://dima806/deepfake_vs_real_image_detection").unwrap();
    let b = HfVitBuilder::from_url(&url).unwrap();
    assert_eq!(b.repo_id(), "dima806/deepfake_vs_real_image_detection");
    assert_eq!(b.revision, "main");

    let url = Url::parse("hf://prithivMLmods/open-deepfake-detection?revision=v2").unwrap();
    assert_eq!(HfVitBuilder::from_url(&url).unwrap().revision, "v2");
  }

  #[test]
  fn builder_rejects_other_schemes_and_empty_repo() {
    let url = Url::parse("rknn:///a.rknn").unwrap();
    assert!(HfVitBuilder::from_url(&url).is_err());
    let url = Url::parse("hf://owner-only").unwrap();
    assert!(HfVitBuilder::from_url(&url).is_err());
  }

  #[test]
  fn id2label_is_indexed() {
    let config = serde_json::json!({"id2label": {"1": "Realism", "0": "Deepfake"}});
    let map = parse_id2label(&config).unwrap();
    assert_eq!(map.get(&0).map(String::as_str), Some("Deepfake"));
    assert_eq!(map.get(&1).map(String::as_str), Some("Realism"));
    assert!(parse_id2label(&serde_json::json!({})).is_err());
  }

  #[test]
  fn preprocessor_config_overrides_defaults() {
    let raw = serde_json::json!({
      "size": {"height": 384, "width": 384},
      "image_mean": [0.485, 0.456, 0.406],
      "image_std": [0.229, 0.224, 0.225]
    });
    let spec = parse_input_spec(&raw);
    assert_eq!((spec.width, spec.height), (384, 384));
    assert!((spec.mean[0] - 0.485).abs() < 1e-6);
    assert!((spec.std[2] - 0.225).abs() < 1e-6);

    let spec = parse_input_spec(&serde_json::json!({"size": 256}));
    assert_eq!((spec.width, spec.height), (256, 256));
    assert_eq!(spec.mean, [0.5; 3]);
  }
}

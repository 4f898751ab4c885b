// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/model/rknn.rs - RKNN 分类模型
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

use std::sync::Mutex;

use image::RgbImage;
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{InputSpec, TensorLayout, to_u8_tensor},
  model::{Classifier, InferenceError, ModelLoadError, RKNN_SCHEME},
};

const RKNN_NUM_INPUTS: u32 = 1;
const RKNN_DEFAULT_SIZE: u32 = 224;

impl From<rknpu::Error> for InferenceError {
  fn from(err: rknpu::Error) -> Self {
    InferenceError::Runtime(format!("RKNN 错误: {}", err))
  }
}

fn load_err(msg: &str, e: rknpu::Error) -> ModelLoadError {
  ModelLoadError::Runtime(format!("{}: {}", msg, e))
}

/// `rknn:///path/model.rknn?width=224&height=224&labels=Fake,Real`
pub struct RknnClassifierBuilder {
  model_path: String,
  flags: InitFlags,
  width: u32,
  height: u32,
  labels: Vec<String>,
}

impl FromUrlWithScheme for RknnClassifierBuilder {
  const SCHEME: &'static str = RKNN_SCHEME;
}

impl FromUrl for RknnClassifierBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::InvalidReference(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = RknnClassifierBuilder {
      model_path: url.path().to_string(),
      flags: InitFlags::default(),
      width: RKNN_DEFAULT_SIZE,
      height: RKNN_DEFAULT_SIZE,
      labels: Vec::new(),
    };

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "width" => builder.width = v.parse().unwrap_or(RKNN_DEFAULT_SIZE),
        "height" => builder.height = v.parse().unwrap_or(RKNN_DEFAULT_SIZE),
        "labels" => builder.labels = v.split(',').map(|s| s.trim().to_string()).collect(),
        _ => {}
      }
    }

    Ok(builder)
  }
}

impl RknnClassifierBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnClassifier, ModelLoadError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model_data, self.flags).map_err(|e| load_err("创建 RKNN 上下文失败", e))?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| load_err("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| load_err("无法获取输出数量", e))?;

    if num_inputs != RKNN_NUM_INPUTS || num_outputs == 0 {
      error!(
        "预期模型输入数量为 {}, 实际为 {}; 输出数量为 {}",
        RKNN_NUM_INPUTS, num_inputs, num_outputs
      );
      return Err(ModelLoadError::InvalidConfig(format!(
        "分类模型需要 {} 个输入和至少 1 个输出, 实际为 {} / {}",
        RKNN_NUM_INPUTS, num_inputs, num_outputs
      )));
    }

    info!("模型加载完成");

    Ok(RknnClassifier {
      context: Mutex::new(context),
      spec: InputSpec::default()
        .with_size(self.width, self.height)
        .with_layout(TensorLayout::Nhwc),
      labels: self.labels,
    })
  }
}

/// 运行在 RKNPU 上的分类模型，输入 uint8 NHWC，输出 0 为 logits
pub struct RknnClassifier {
  context: Mutex<Context>,
  spec: InputSpec,
  labels: Vec<String>,
}

impl Classifier for RknnClassifier {
  fn logits(&self, image: &RgbImage) -> Result<Vec<f32>, InferenceError> {
    let input = to_u8_tensor(image, &self.spec);
    let context = self.context.lock().map_err(|_| InferenceError::LockPoisoned)?;

    debug!("设置模型输入");
    context.set_input(0, &input, TensorFormat::NHWC, TensorType::UInt8)?;
    debug!("执行模型推理");
    context.run()?;

    let output = context.get_outputs()?;
    let logits = output.get_f32(0)?.to_vec();
    debug!("模型输出: {:?}", logits);
    Ok(logits)
  }

  fn native_label(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }
}

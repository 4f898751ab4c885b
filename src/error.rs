// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/error.rs - 检测错误定义
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

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{InferenceError, ModelLoadError};

/// 检测引擎对外暴露的错误
///
/// 每个变体都有一个稳定的标签（见 [`DetectError::tag`]），
/// 供调用层（HTTP / CLI）生成带标签的失败响应。
#[derive(Error, Debug)]
pub enum DetectError {
  /// 输入文件不存在
  #[error("输入文件不存在: {}", .0.display())]
  NotFound(PathBuf),
  /// 图像或视频数据无法解码
  #[error("解码失败: {0}")]
  DecodeError(String),
  /// 模型权重或预处理配置无法获取
  #[error("模型加载失败: {0}")]
  ModelLoadFailure(#[from] ModelLoadError),
  /// 前向推理过程中出错
  #[error("推理失败: {0}")]
  InferenceFailure(#[from] InferenceError),
  /// 视频中没有任何采样帧被成功分类
  #[error("视频中没有可成功分类的帧")]
  NoFramesProcessed,
}

impl DetectError {
  pub fn decode(msg: impl std::fmt::Display) -> Self {
    DetectError::DecodeError(msg.to_string())
  }

  pub fn tag(&self) -> &'static str {
    match self {
      DetectError::NotFound(_) => "not_found",
      DetectError::DecodeError(_) => "decode_error",
      DetectError::ModelLoadFailure(_) => "model_load_failure",
      DetectError::InferenceFailure(_) => "inference_failure",
      DetectError::NoFramesProcessed => "no_frames_processed",
    }
  }
}

impl From<image::ImageError> for DetectError {
  fn from(err: image::ImageError) -> Self {
    DetectError::DecodeError(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tags_are_stable() {
    assert_eq!(DetectError::NotFound("a.png".into()).tag(), "not_found");
    assert_eq!(DetectError::decode("bad").tag(), "decode_error");
    assert_eq!(DetectError::NoFramesProcessed.tag(), "no_frames_processed");
    assert_eq!(
      DetectError::from(InferenceError::Runtime("boom".into())).tag(),
      "inference_failure"
    );
  }

  #[test]
  fn not_found_message_names_the_path() {
    let err = DetectError::NotFound("/tmp/missing.jpg".into());
    assert!(err.to_string().contains("/tmp/missing.jpg"));
  }
}

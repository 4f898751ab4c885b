// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/args.rs - 各程序共用的参数配置
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
use std::sync::Arc;

use clap::Args;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl,
  backend::BackendCatalog,
  face::FacePreprocessor,
  model::{UrlClassifierLoader, parse_backend_override},
  output::{OutputError, OutputWrapper},
  registry::DetectorRegistry,
};

/// 引擎参数
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
  /// 覆盖后端的模型地址，格式 `<key>=<url>`，可多次指定
  /// 例如: open-deepfake=rknn:///opt/models/siglip.rknn?labels=Fake,Real
  #[arg(long = "backend-url", value_name = "KEY=URL", value_parser = parse_backend_override)]
  pub backend_urls: Vec<(String, Url)>,

  /// 关闭人脸预处理
  #[arg(long)]
  pub no_face: bool,

  /// Haar 级联文件路径，缺省时在系统目录中查找
  #[arg(long, value_name = "FILE")]
  pub face_cascade: Option<PathBuf>,

  /// 输出地址
  /// 支持格式:
  /// - stdout:[?compact]
  /// - json:///path/report.json
  /// - folder:///dir[?fake-only&frames]
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,
}

impl EngineArgs {
  pub fn log(&self) {
    for (key, url) in &self.backend_urls {
      info!("后端 {} 使用模型: {}", key, url);
    }
    info!("输出路径: {}", self.output);
  }

  pub fn face_preprocessor(&self) -> FacePreprocessor {
    if self.no_face {
      return FacePreprocessor::disabled();
    }
    let face = face_detector(self.face_cascade.as_deref());
    if self.face_unavailable(&face) {
      warn!("没有可用的人脸检测器，摄像头与视频帧将不做人脸增强");
    }
    face
  }

  /// 未指定 `--no-face`，但人脸预处理仍未启用
  fn face_unavailable(&self, face: &FacePreprocessor) -> bool {
    !self.no_face && !face.is_enabled()
  }

  pub fn registry(&self) -> DetectorRegistry {
    let loader = UrlClassifierLoader::new().with_overrides(self.backend_urls.iter().cloned());
    DetectorRegistry::init(
      BackendCatalog::builtin(),
      Arc::new(loader),
      self.face_preprocessor(),
    )
  }

  pub fn output(&self) -> Result<OutputWrapper, OutputError> {
    OutputWrapper::from_url(&self.output)
  }
}

#[cfg(feature = "face_opencv")]
fn face_detector(cascade: Option<&std::path::Path>) -> FacePreprocessor {
  use crate::face::CascadeFaceDetector;

  let detector = match cascade {
    Some(path) => CascadeFaceDetector::from_path(path),
    None => CascadeFaceDetector::locate(),
  };
  match detector {
    Ok(detector) => FacePreprocessor::new(Arc::new(detector)),
    Err(e) => {
      warn!("人脸检测器不可用，跳过人脸预处理: {}", e);
      FacePreprocessor::disabled()
    }
  }
}

#[cfg(not(feature = "face_opencv"))]
fn face_detector(cascade: Option<&std::path::Path>) -> FacePreprocessor {
  if let Some(path) = cascade {
    warn!("未启用 face_opencv 特性，忽略级联文件 {}", path.display());
  }
  FacePreprocessor::disabled()
}

#[cfg(test)]
mod tests {
  use clap::Parser;

  use super::*;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
  }

  #[test]
  fn parses_overrides_and_defaults() {
    let cli = Cli::try_parse_from([
      "test",
      "--backend-url",
      "open-deepfake=rknn:///m.rknn",
      "--no-face",
    ])
    .unwrap();
    assert_eq!(cli.engine.backend_urls.len(), 1);
    assert_eq!(cli.engine.backend_urls[0].0, "open-deepfake");
    assert_eq!(cli.engine.output.scheme(), "stdout");
    assert!(!cli.engine.face_preprocessor().is_enabled());
  }

  #[test]
  fn missing_face_detector_is_flagged_unless_disabled() {
    let cli = Cli::try_parse_from(["test"]).unwrap();
    assert!(cli.engine.face_unavailable(&FacePreprocessor::disabled()));

    let cli = Cli::try_parse_from(["test", "--no-face"]).unwrap();
    assert!(!cli.engine.face_unavailable(&FacePreprocessor::disabled()));
  }

  #[cfg(not(feature = "face_opencv"))]
  #[test]
  fn without_opencv_faces_are_not_enhanced() {
    let cli = Cli::try_parse_from(["test"]).unwrap();
    assert!(!cli.engine.face_preprocessor().is_enabled());
  }

  #[test]
  fn rejects_malformed_override() {
    assert!(Cli::try_parse_from(["test", "--backend-url", "no-equals-sign"]).is_err());
  }
}

// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/backend.rs - 后端描述符目录
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

use serde::Serialize;
use tracing::warn;

use crate::label::{LabelScheme, Outcome};

/// 通用后端，图像 / 视频 / 批量调用的默认值，也是未知键的回退
pub const DEFAULT_BACKEND: &str = "dima806";
/// 摄像头调用的默认后端，连续帧下更稳定
pub const CAMERA_DEFAULT_BACKEND: &str = "deep-fake-v2";

const FAKE_REAL: &[Outcome] = &[Outcome::Fake, Outcome::Real];

const BUILTIN_BACKENDS: &[BackendDescriptor] = &[
  BackendDescriptor {
    key: "dima806",
    model_reference: "hf://dima806/deepfake_vs_real_image_detection",
    labels: LabelScheme::Explicit(FAKE_REAL),
    display_name: "Dima806 Deepfake Detector",
    description: "General purpose deepfake detection",
  },
  BackendDescriptor {
    key: "deep-fake-v2",
    model_reference: "hf://prithivMLmods/Deep-Fake-Detector-v2-Model",
    labels: LabelScheme::ModelNative,
    display_name: "Deep Fake Detector v2 (ViT)",
    description: "Vision Transformer based detector",
  },
  BackendDescriptor {
    key: "open-deepfake",
    model_reference: "hf://prithivMLmods/open-deepfake-detection",
    labels: LabelScheme::Explicit(FAKE_REAL),
    display_name: "Open Deepfake Detection (SigLIP)",
    description: "SigLIP based deepfake detector",
  },
];

/// 一个可选择的分类后端
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
  pub key: &'static str,
  /// 模型位置，URL 形式，方案决定运行时（`hf://`、`rknn://`）
  pub model_reference: &'static str,
  pub labels: LabelScheme,
  pub display_name: &'static str,
  pub description: &'static str,
}

/// 对外列出的后端信息
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
  pub key: &'static str,
  pub name: &'static str,
  pub description: &'static str,
}

impl From<&BackendDescriptor> for BackendInfo {
  fn from(d: &BackendDescriptor) -> Self {
    BackendInfo {
      key: d.key,
      name: d.display_name,
      description: d.description,
    }
  }
}

/// 只读的后端目录，进程启动时创建后不再增删
#[derive(Debug, Clone)]
pub struct BackendCatalog {
  entries: Box<[BackendDescriptor]>,
  default_key: &'static str,
}

impl Default for BackendCatalog {
  fn default() -> Self {
    Self::builtin()
  }
}

impl BackendCatalog {
  pub fn builtin() -> Self {
    BackendCatalog {
      entries: BUILTIN_BACKENDS.into(),
      default_key: DEFAULT_BACKEND,
    }
  }

  /// 用自定义条目建立目录，`default_key` 必须在条目中
  pub fn new(entries: Vec<BackendDescriptor>, default_key: &'static str) -> Option<Self> {
    if !entries.iter().any(|e| e.key == default_key) {
      return None;
    }
    Some(BackendCatalog {
      entries: entries.into_boxed_slice(),
      default_key,
    })
  }

  pub fn get(&self, key: &str) -> Option<&BackendDescriptor> {
    self.entries.iter().find(|e| e.key == key)
  }

  /// 解析后端键，未知键回退到默认后端并记录日志，从不失败
  pub fn resolve(&self, key: &str) -> &BackendDescriptor {
    if let Some(descriptor) = self.get(key) {
      return descriptor;
    }
    warn!("未知的后端: {}, 使用默认后端 {}", key, self.default_key);
    self.default_descriptor()
  }

  pub fn default_descriptor(&self) -> &BackendDescriptor {
    // new() 保证默认键存在
    self
      .get(self.default_key)
      .unwrap_or(&self.entries[0])
  }

  pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
    self.entries.iter()
  }

  pub fn infos(&self) -> Vec<BackendInfo> {
    self.entries.iter().map(BackendInfo::from).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_known_keys() {
    let catalog = BackendCatalog::builtin();
    assert_eq!(catalog.resolve("deep-fake-v2").key, "deep-fake-v2");
    assert_eq!(catalog.resolve("open-deepfake").labels, LabelScheme::Explicit(FAKE_REAL));
    assert_eq!(catalog.resolve("deep-fake-v2").labels, LabelScheme::ModelNative);
  }

  #[test]
  fn unknown_key_falls_back_to_default() {
    let catalog = BackendCatalog::builtin();
    assert_eq!(catalog.resolve("no-such-model").key, DEFAULT_BACKEND);
    assert_eq!(catalog.resolve("").key, DEFAULT_BACKEND);
  }

  #[test]
  fn camera_default_is_in_catalog() {
    assert!(BackendCatalog::builtin().get(CAMERA_DEFAULT_BACKEND).is_some());
  }

  #[test]
  fn custom_catalog_requires_default_entry() {
    let entry = BUILTIN_BACKENDS[1].clone();
    assert!(BackendCatalog::new(vec![entry.clone()], "dima806").is_none());
    let catalog = BackendCatalog::new(vec![entry], "deep-fake-v2").unwrap();
    assert_eq!(catalog.resolve("dima806").key, "deep-fake-v2");
  }

  #[test]
  fn infos_list_every_backend() {
    let infos = BackendCatalog::builtin().infos();
    let keys: Vec<&str> = infos.iter().map(|i| i.key).collect();
    assert_eq!(keys, vec!["dima806", "deep-fake-v2", "open-deepfake"]);
    assert_eq!(infos[0].name, "Dima806 Deepfake Detector");
  }
}

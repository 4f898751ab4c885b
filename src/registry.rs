// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/registry.rs - 检测器注册表
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

//! 按后端键缓存 [`DetectorInstance`] 的注册表。
//!
//! 注册表是显式对象，由调用方创建并传入请求处理流程。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::{
  backend::BackendCatalog,
  detector::DetectorInstance,
  error::DetectError,
  face::FacePreprocessor,
  model::{ClassifierLoader, InferenceError},
};

pub struct DetectorRegistry {
  catalog: BackendCatalog,
  loader: Arc<dyn ClassifierLoader>,
  face: FacePreprocessor,
  instances: Mutex<HashMap<&'static str, Arc<DetectorInstance>>>,
}

impl DetectorRegistry {
  pub fn init(
    catalog: BackendCatalog,
    loader: Arc<dyn ClassifierLoader>,
    face: FacePreprocessor,
  ) -> Self {
    info!(
      "初始化检测器注册表: {} 个后端, 人脸预处理 {}",
      catalog.iter().count(),
      if face.is_enabled() { "开启" } else { "关闭" }
    );
    DetectorRegistry {
      catalog,
      loader,
      face,
      instances: Mutex::new(HashMap::new()),
    }
  }

  pub fn catalog(&self) -> &BackendCatalog {
    &self.catalog
  }

  /// 解析后端键（未知键回退到默认后端），返回缓存的实例或新建一个
  ///
  /// 新建实例不会立刻加载权重。
  pub fn get_or_create(&self, key: &str) -> Result<Arc<DetectorInstance>, DetectError> {
    let descriptor = self.catalog.resolve(key);
    let mut instances = self
      .instances
      .lock()
      .map_err(|_| InferenceError::LockPoisoned)?;

    let instance = instances.entry(descriptor.key).or_insert_with(|| {
      info!("创建检测器实例: {}", descriptor.key);
      Arc::new(DetectorInstance::new(
        descriptor.clone(),
        self.loader.clone(),
        self.face.clone(),
      ))
    });
    Ok(instance.clone())
  }

  /// 预先加载给定后端的权重，返回加载失败的后端及其错误
  pub fn preload<'a, I>(&self, keys: I) -> Vec<(String, DetectError)>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let mut failures = Vec::new();
    for key in keys {
      let result = self
        .get_or_create(key)
        .and_then(|instance| instance.ensure_loaded().map(|_| ()));
      match result {
        Ok(()) => info!("后端 {} 已就绪", key),
        Err(e) => {
          warn!("后端 {} 预加载失败: {}", key, e);
          failures.push((key.to_string(), e));
        }
      }
    }
    failures
  }

  /// 预先加载目录中的全部后端
  pub fn preload_all(&self) -> Vec<(String, DetectError)> {
    let keys: Vec<&'static str> = self.catalog.iter().map(|d| d.key).collect();
    self.preload(keys)
  }

  /// 丢弃所有缓存的实例并释放权重；之后的调用会重新懒加载
  pub fn shutdown(&self) {
    let drained: Vec<_> = match self.instances.lock() {
      Ok(mut instances) => instances.drain().collect(),
      Err(_) => {
        warn!("注册表锁已损坏, 跳过释放");
        return;
      }
    };
    for (key, instance) in drained {
      instance.unload();
      info!("已释放检测器实例: {}", key);
    }
  }

  pub fn cached_keys(&self) -> Vec<&'static str> {
    let mut keys: Vec<_> = self
      .instances
      .lock()
      .map(|m| m.keys().copied().collect())
      .unwrap_or_default();
    keys.sort_unstable();
    keys
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detector::testing::{ScriptedClassifier, StaticLoader, blank};

  fn registry(loader: Arc<StaticLoader>) -> DetectorRegistry {
    DetectorRegistry::init(
      BackendCatalog::builtin(),
      loader,
      FacePreprocessor::disabled(),
    )
  }

  #[test]
  fn instances_are_cached_per_key() {
    let loader = Arc::new(StaticLoader::new(ScriptedClassifier::constant(vec![1.0, 0.0])));
    let reg = registry(loader);
    let a = reg.get_or_create("dima806").unwrap();
    let b = reg.get_or_create("dima806").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    let c = reg.get_or_create("deep-fake-v2").unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
  }

  #[test]
  fn unknown_key_shares_the_default_instance() {
    let loader = Arc::new(StaticLoader::new(ScriptedClassifier::constant(vec![1.0, 0.0])));
    let reg = registry(loader);
    let a = reg.get_or_create("no-such-model").unwrap();
    let b = reg.get_or_create("dima806").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(reg.cached_keys(), vec!["dima806"]);
  }

  #[test]
  fn creation_is_lazy_and_preload_loads() {
    let loader = Arc::new(StaticLoader::new(ScriptedClassifier::constant(vec![1.0, 0.0])));
    let reg = registry(loader.clone());
    let det = reg.get_or_create("dima806").unwrap();
    assert_eq!(loader.load_count(), 0);

    assert!(reg.preload_all().is_empty());
    assert!(det.is_loaded());
    assert_eq!(loader.load_count(), 3);
  }

  #[test]
  fn preload_reports_failures() {
    let reg = registry(Arc::new(StaticLoader::failing()));
    let failures = reg.preload(["dima806", "open-deepfake"]);
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].1.tag(), "model_load_failure");
  }

  #[test]
  fn shutdown_clears_and_reloads_lazily() {
    let loader = Arc::new(StaticLoader::new(ScriptedClassifier::constant(vec![1.0, 0.0])));
    let reg = registry(loader.clone());
    let old = reg.get_or_create("dima806").unwrap();
    old.classify(&blank(2, 2), false).unwrap();

    reg.shutdown();
    assert!(reg.cached_keys().is_empty());
    assert!(!old.is_loaded());

    let new = reg.get_or_create("dima806").unwrap();
    assert!(!Arc::ptr_eq(&old, &new));
    new.classify(&blank(2, 2), false).unwrap();
    assert_eq!(loader.load_count(), 2);
  }
}

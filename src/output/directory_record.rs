// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/output/directory_record.rs - 按日期目录记录检测报告
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Utc};
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::Report};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

/// `folder:///dir?fake-only&frames`
///
/// 每条记录写到 `dir/YYYY/MM/DD/HH-MM-SS-NNNN.json`；
/// `fake-only` 只记录判为伪造的报告，`frames` 同时保存对应的帧为 PNG。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU16,
  fake_only: bool,
  save_frames: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      frame_counter: AtomicU16::new(0),
      fake_only: uri.query_pairs().any(|(k, _)| k == "fake-only"),
      save_frames: uri.query_pairs().any(|(k, _)| k == "frames"),
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn record_stem(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = dated_directory(&self.directory, now);
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }
    Ok(directory.join(format!(
      "{}-{:04X}",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

fn dated_directory(root: &Path, now: DateTime<Utc>) -> PathBuf {
  root
    .join(now.year().to_string())
    .join(format!("{:02}", now.month()))
    .join(format!("{:02}", now.day()))
}

fn is_fake_record(value: &serde_json::Value) -> bool {
  value
    .get("is_fake")
    .or_else(|| value.get("aggregate").and_then(|a| a.get("is_fake")))
    .and_then(serde_json::Value::as_bool)
    .unwrap_or(false)
}

impl Report for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn report<T: Serialize>(&self, record: &T, frame: Option<&RgbImage>) -> Result<(), Self::Error> {
    let value = serde_json::to_value(record)?;
    if self.fake_only && !is_fake_record(&value) {
      return Ok(());
    }

    let stem = self.record_stem(Utc::now())?;
    let json_path = stem.with_extension("json");
    std::fs::write(&json_path, serde_json::to_vec_pretty(&value)?)?;
    if self.save_frames
      && let Some(frame) = frame
    {
      frame.save(stem.with_extension("png"))?;
    }

    debug!("记录报告 {}", json_path.display());
    Ok(())
  }
}

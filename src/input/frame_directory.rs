// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/input/frame_directory.rs - 图像目录回放
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

use image::RgbImage;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{InputError, read_image},
  video::{VideoSource, VideoSourceError},
};

const FRAME_DIRECTORY_SCHEME: &str = "folder";
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// `folder:///dir?fps=15`：按文件名顺序把目录中的图像当作连续帧
pub struct FrameDirectoryInput {
  frames: std::vec::IntoIter<PathBuf>,
  total: u64,
  fps: f64,
}

impl FromUrlWithScheme for FrameDirectoryInput {
  const SCHEME: &'static str = FRAME_DIRECTORY_SCHEME;
}

impl FromUrl for FrameDirectoryInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    let fps = url
      .query_pairs()
      .find(|(k, _)| k == "fps")
      .and_then(|(_, v)| v.parse::<f64>().ok())
      .unwrap_or(0.0);
    Self::open(Path::new(url.path()), fps)
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
    .unwrap_or(false)
}

impl FrameDirectoryInput {
  pub fn open(dir: &Path, fps: f64) -> Result<Self, InputError> {
    if !dir.is_dir() {
      return Err(InputError::NotFound(dir.to_path_buf()));
    }

    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|p| p.is_file() && is_image(p))
      .collect();
    frames.sort();

    info!("图像目录 {}: {} 帧", dir.display(), frames.len());
    Ok(FrameDirectoryInput {
      total: frames.len() as u64,
      frames: frames.into_iter(),
      fps,
    })
  }
}

impl VideoSource for FrameDirectoryInput {
  fn native_fps(&self) -> f64 {
    self.fps
  }

  fn total_frames(&self) -> Option<u64> {
    Some(self.total)
  }

  fn next_frame(&mut self) -> Option<Result<RgbImage, VideoSourceError>> {
    let path = self.frames.next()?;
    debug!("读取帧 {}", path.display());
    Some(read_image(&path).map_err(|e| VideoSourceError::Read(e.to_string())))
  }

  fn skip_frame(&mut self) -> Option<Result<(), VideoSourceError>> {
    self.frames.next().map(|_| Ok(()))
  }
}

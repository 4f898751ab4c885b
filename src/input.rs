// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/input.rs - 视频/图像输入
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
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::DetectError,
  video::{VideoSource, VideoSourceError},
};

mod ffmpeg_video;
mod frame_directory;
mod image_file;
mod payload;

pub use self::ffmpeg_video::{FfmpegVideo, StreamInfo, probe};
pub use self::frame_directory::FrameDirectoryInput;
pub use self::image_file::{ImageFileInput, decode_image, read_bytes, read_image};
pub use self::payload::{PayloadError, decode_payload, decode_payload_lines};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不支持: {0}")]
  SchemeMismatch(String),
  #[error("输入不存在: {}", .0.display())]
  NotFound(PathBuf),
  #[error("IO 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("无法读取视频信息: {0}")]
  Probe(String),
  #[error(transparent)]
  Detect(#[from] DetectError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamer(#[from] GStreamerInputError),
}

impl From<InputError> for DetectError {
  fn from(err: InputError) -> Self {
    match err {
      InputError::NotFound(path) => DetectError::NotFound(path),
      InputError::Detect(e) => e,
      other => DetectError::decode(other),
    }
  }
}

/// 按 URL 方案选择的帧源
pub enum InputWrapper {
  ImageFile(ImageFileInput),
  FrameDirectory(FrameDirectoryInput),
  Ffmpeg(FfmpegVideo),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamer(input));
      }
    }

    match url.scheme() {
      s if s == ImageFileInput::SCHEME => Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?)),
      s if s == FrameDirectoryInput::SCHEME => Ok(InputWrapper::FrameDirectory(
        FrameDirectoryInput::from_url(url)?,
      )),
      s if s == FfmpegVideo::SCHEME => Ok(InputWrapper::Ffmpeg(FfmpegVideo::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InputWrapper {
  /// 命令行参数：可识别的 URL 按方案打开，其余视为视频文件路径
  pub fn open_video(arg: &str) -> Result<Self, InputError> {
    match Url::parse(arg) {
      Ok(url) if url.scheme().len() > 1 && url.scheme() != "file" => Self::from_url(&url),
      Ok(url) if url.scheme() == "file" => {
        Ok(InputWrapper::Ffmpeg(FfmpegVideo::open(Path::new(url.path()))?))
      }
      _ => Ok(InputWrapper::Ffmpeg(FfmpegVideo::open(Path::new(arg))?)),
    }
  }

  fn inner(&mut self) -> &mut dyn VideoSource {
    match self {
      InputWrapper::ImageFile(input) => input,
      InputWrapper::FrameDirectory(input) => input,
      InputWrapper::Ffmpeg(input) => input,
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input,
    }
  }

  fn inner_ref(&self) -> &dyn VideoSource {
    match self {
      InputWrapper::ImageFile(input) => input,
      InputWrapper::FrameDirectory(input) => input,
      InputWrapper::Ffmpeg(input) => input,
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input,
    }
  }
}

impl VideoSource for InputWrapper {
  fn native_fps(&self) -> f64 {
    self.inner_ref().native_fps()
  }

  fn total_frames(&self) -> Option<u64> {
    self.inner_ref().total_frames()
  }

  fn next_frame(&mut self) -> Option<Result<RgbImage, VideoSourceError>> {
    self.inner().next_frame()
  }

  fn skip_frame(&mut self) -> Option<Result<(), VideoSourceError>> {
    self.inner().skip_frame()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtmp://example.com/live").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(s)) if s == "rtmp"
    ));
  }

  #[test]
  fn plain_paths_open_as_ffmpeg_video() {
    let err = InputWrapper::open_video("/no/such/video.mp4").err().unwrap();
    assert!(matches!(err, InputError::NotFound(_)));
    let err: DetectError = InputWrapper::open_video("relative/missing.avi").err().unwrap().into();
    assert_eq!(err.tag(), "not_found");
  }

  #[test]
  fn probe_failures_map_to_decode_error() {
    let err: DetectError = InputError::Probe("moov atom not found".into()).into();
    assert_eq!(err.tag(), "decode_error");
  }
}

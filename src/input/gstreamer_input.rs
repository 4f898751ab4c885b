// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频/摄像头输入
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

//! 基于 GStreamer 的视频输入，支持：
//! - 视频文件：`gst://file/path/to/video.mp4?rotate=90`
//! - V4L2 摄像头：`gst://camera/dev/video0?width=640&height=480&fps=15&format=YUY2`
//!
//! 使用前需要安装 GStreamer 开发库（`libgstreamer1.0-dev`、
//! `libgstreamer-plugins-base1.0-dev`），并启用 `gstreamer_input` 特性。

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  video::{VideoSource, VideoSourceError},
};

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式")]
  UnsupportedFormat,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("状态切换错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

impl From<GStreamerInputError> for VideoSourceError {
  fn from(err: GStreamerInputError) -> Self {
    VideoSourceError::Read(err.to_string())
  }
}

const GSTREAMER_INPUT_SCHEME: &str = "gst";
const PREROLL_TIMEOUT_SECS: u64 = 10;

enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    format: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat,
  VideoFlip {
    method: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode_str = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        format!(
          "v4l2src device={}{} ! video/x-raw,format={},width={},height={},framerate={}/1",
          camera, io_mode_str, format, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat => "videoconvert ! video/x-raw,format=RGB".to_string(),
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// 由 `gst://` URL 生成管道描述
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
  live: bool,
}

impl GStreamerInputPipelineBuilder {
  fn build_camera_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let parse = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let mut items = vec![GStreamerInputBuilderItem::CameraSource {
      camera: path.to_string(),
      io_mode: query.get("io-mode").and_then(|v| v.parse::<u32>().ok()),
      format: query.get("format").cloned().unwrap_or_else(|| "YUY2".to_string()),
      width: parse("width", 640),
      height: parse("height", 480),
      fps: parse("fps", 15),
    }];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));

    GStreamerInputPipelineBuilder { items, live: true }
  }

  fn build_file_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![GStreamerInputBuilderItem::FileSource(path.to_string())];
    items.extend(Self::video_flip(query.get("rotate").map(String::as_str)));
    GStreamerInputPipelineBuilder { items, live: false }
  }

  fn video_flip(rotate: Option<&str>) -> Option<GStreamerInputBuilderItem> {
    let method = match rotate? {
      "90" => 1,
      "180" => 2,
      "270" => 3,
      _ => return None,
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method })
  }

  pub fn description(&self) -> String {
    let basic = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    // 文件输入不能丢帧，否则采样索引会错位
    let sink = if self.live {
      "appsink name=sink max-buffers=2 drop=true"
    } else {
      "appsink name=sink max-buffers=4 drop=false sync=false"
    };
    format!("{} ! {}", basic, sink)
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let description = self.description();
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;
    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkNotFound)?;

    // 预卷以便读取帧率和时长
    pipeline.set_state(gst::State::Paused)?;
    let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
    result?;

    let fps = appsink
      .static_pad("sink")
      .and_then(|pad| pad.current_caps())
      .and_then(|caps| gst_video::VideoInfo::from_caps(&caps).ok())
      .map(|info| {
        let fps = info.fps();
        if fps.denom() == 0 {
          0.0
        } else {
          fps.numer() as f64 / fps.denom() as f64
        }
      })
      .unwrap_or(0.0);

    let total_frames = if self.live || fps <= 0.0 {
      None
    } else {
      pipeline
        .query_duration::<gst::ClockTime>()
        .map(|d| (d.nseconds() as f64 / 1e9 * fps).round() as u64)
        .filter(|n| *n > 0)
    };
    debug!("GStreamer 输入: {:.2} FPS, {:?} 帧", fps, total_frames);

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      fps,
      total_frames,
    })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = GSTREAMER_INPUT_SCHEME;
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let mut builder = match url.host_str() {
      Some("camera") => Self::build_camera_pipeline(url.path(), &query),
      Some("file") => Self::build_file_pipeline(url.path(), &query),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };
    builder.items.push(GStreamerInputBuilderItem::TargetFormat);
    Ok(builder)
  }
}

pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  fps: f64,
  total_frames: Option<u64>,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止 GStreamer 管道: {}", e);
    }
  }
}

impl GStreamerInput {
  fn pull_sample(&self) -> Option<gst::Sample> {
    match self.appsink.pull_sample() {
      Ok(sample) => Some(sample),
      Err(e) => {
        if !self.appsink.is_eos() {
          error!("拉取帧失败: {}", e);
        }
        None
      }
    }
  }
}

impl VideoSource for GStreamerInput {
  fn native_fps(&self) -> f64 {
    self.fps
  }

  fn total_frames(&self) -> Option<u64> {
    self.total_frames
  }

  fn next_frame(&mut self) -> Option<Result<RgbImage, VideoSourceError>> {
    let sample = self.pull_sample()?;
    Some(convert_sample(&sample).map_err(VideoSourceError::from))
  }

  fn skip_frame(&mut self) -> Option<Result<(), VideoSourceError>> {
    self.pull_sample().map(|_| Ok(()))
  }
}

/// 按 caps 中的尺寸和行跨度把样本拷贝为 RGB 图像
fn convert_sample(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;
  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;
  let data = map.as_slice();

  let expected = stride * (height.saturating_sub(1)) + width * 3;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let bgr = match video_info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let mut pixels = Vec::with_capacity(width * height * 3);
  for row in 0..height {
    let line = &data[row * stride..row * stride + width * 3];
    if bgr {
      for px in line.chunks_exact(3) {
        pixels.extend_from_slice(&[px[2], px[1], px[0]]);
      }
    } else {
      pixels.extend_from_slice(line);
    }
  }

  RgbImage::from_raw(width as u32, height as u32, pixels)
    .ok_or(GStreamerInputError::BufferSizeMismatch {
      expected: width * height * 3,
      actual: data.len(),
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_url_builds_v4l2_pipeline() {
    let url = Url::parse("gst://camera/dev/video0?width=1280&height=720&fps=30&rotate=90").unwrap();
    let desc = GStreamerInputPipelineBuilder::from_url(&url).unwrap().description();
    assert!(desc.starts_with(
      "v4l2src device=/dev/video0 ! video/x-raw,format=YUY2,width=1280,height=720,framerate=30/1"
    ));
    assert!(desc.contains("videoflip method=1"));
    assert!(desc.ends_with("appsink name=sink max-buffers=2 drop=true"));
  }

  #[test]
  fn file_url_keeps_every_frame() {
    let url = Url::parse("gst://file/data/clip.mp4").unwrap();
    let desc = GStreamerInputPipelineBuilder::from_url(&url).unwrap().description();
    assert!(desc.starts_with("filesrc location=\"/data/clip.mp4\" ! decodebin"));
    assert!(desc.contains("videoconvert ! video/x-raw,format=RGB"));
    assert!(desc.contains("drop=false"));
  }

  #[test]
  fn rejects_unknown_hosts() {
    let url = Url::parse("gst://rtsp/stream").unwrap();
    assert!(GStreamerInputPipelineBuilder::from_url(&url).is_err());
  }
}

// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/video.rs - 视频采样与投票聚合
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

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  detector::{CanonicalResult, DetectorInstance, FrameResult},
  error::DetectError,
  label::Outcome,
  report::round2,
};

/// 容器未报告帧率时使用的帧率
pub const FALLBACK_FPS: f64 = 30.0;
/// 默认每秒采样一帧
pub const DEFAULT_SAMPLE_FPS: f64 = 1.0;
/// 诊断信息中保留的逐帧结果数量
const FRAME_SAMPLE_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum VideoSourceError {
  #[error("视频源打开失败: {0}")]
  Open(String),
  #[error("视频帧读取失败: {0}")]
  Read(String),
  #[error("IO 错误: {0}")]
  Io(#[from] std::io::Error),
}

impl From<VideoSourceError> for DetectError {
  fn from(err: VideoSourceError) -> Self {
    DetectError::DecodeError(err.to_string())
  }
}

/// 按顺序解码的视频帧源
pub trait VideoSource {
  /// 容器报告的帧率，未知时为 0
  fn native_fps(&self) -> f64;

  /// 容器报告的总帧数
  fn total_frames(&self) -> Option<u64>;

  /// 下一帧，源结束时返回 `None`
  fn next_frame(&mut self) -> Option<Result<RgbImage, VideoSourceError>>;

  /// 跳过一帧；可以不构造图像
  fn skip_frame(&mut self) -> Option<Result<(), VideoSourceError>> {
    self.next_frame().map(|r| r.map(|_| ()))
  }
}

/// 视频级聚合详情
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoAggregate {
  pub is_fake: bool,
  #[serde(serialize_with = "round2")]
  pub confidence_percent: f64,
  pub total_frames: u64,
  pub processed_frames: usize,
  pub fake_frame_count: usize,
  pub real_frame_count: usize,
  /// 前 10 个成功分类的帧
  pub frame_results: Vec<FrameResult>,
}

/// 采样间隔：`max(1, floor(native_fps / target_fps))`，帧率未知时按 30 计
pub fn sample_interval(native_fps: f64, target_fps: f64) -> u64 {
  let native = if native_fps.is_finite() && native_fps > 0.0 {
    native_fps
  } else {
    FALLBACK_FPS
  };
  let target = if target_fps.is_finite() && target_fps > 0.0 {
    target_fps
  } else {
    DEFAULT_SAMPLE_FPS
  };
  ((native / target).floor() as u64).max(1)
}

/// 对视频采样分类并聚合为一个结论
///
/// 模型加载失败会在读取任何帧之前中止；单帧失败只记录日志并跳过。
pub fn aggregate(
  instance: &DetectorInstance,
  source: &mut dyn VideoSource,
  target_fps: f64,
) -> Result<(CanonicalResult, VideoAggregate), DetectError> {
  instance.ensure_loaded()?;

  let interval = sample_interval(source.native_fps(), target_fps);
  info!(
    "处理视频: {:?} 帧, 帧率 {:.2}, 每 {} 帧采样一次",
    source.total_frames(),
    source.native_fps(),
    interval
  );

  let mut frames = Vec::new();
  let mut index: u64 = 0;
  loop {
    if index % interval == 0 {
      match source.next_frame() {
        None => break,
        Some(Ok(image)) => match instance.classify_frame(&image, true, index) {
          Ok(frame) => {
            debug!(
              "帧 {}: {} {:.4}",
              index, frame.outcome, frame.raw_confidence
            );
            frames.push(frame);
          }
          Err(e) => warn!("处理第 {} 帧失败: {}", index, e),
        },
        Some(Err(e)) => {
          warn!("第 {} 帧解码失败, 停止读取: {}", index, e);
          break;
        }
      }
    } else {
      match source.skip_frame() {
        None => break,
        Some(Ok(())) => {}
        Some(Err(e)) => {
          warn!("第 {} 帧解码失败, 停止读取: {}", index, e);
          break;
        }
      }
    }
    index += 1;
  }

  let total_frames = source.total_frames().unwrap_or(index);
  let (result, detail) = reduce(frames, total_frames, instance.display_name())?;
  info!(
    "视频结论: {} ({}/{} 帧伪造, {:.2}%)",
    if result.is_fake { "FAKE" } else { "REAL" },
    detail.fake_frame_count,
    detail.processed_frames,
    result.confidence_percent
  );
  Ok((result, detail))
}

/// 多数投票：严格多数判伪，平票为真；置信度按投票一致程度折减
pub fn reduce(
  mut frames: Vec<FrameResult>,
  total_frames: u64,
  model_used: &'static str,
) -> Result<(CanonicalResult, VideoAggregate), DetectError> {
  let processed = frames.len();
  if processed == 0 {
    return Err(DetectError::NoFramesProcessed);
  }

  let fake = frames.iter().filter(|f| f.outcome == Outcome::Fake).count();
  let real = processed - fake;
  let is_fake = fake > real;
  let avg_confidence =
    frames.iter().map(|f| f.raw_confidence).sum::<f64>() / processed as f64 * 100.0;
  let vote_ratio = fake.max(real) as f64 / processed as f64;
  let confidence_percent = (vote_ratio * avg_confidence).clamp(0.0, 100.0);

  frames.truncate(FRAME_SAMPLE_LIMIT);
  let result = CanonicalResult {
    is_fake,
    confidence_percent,
    model_used,
  };
  let detail = VideoAggregate {
    is_fake,
    confidence_percent,
    total_frames,
    processed_frames: processed,
    fake_frame_count: fake,
    real_frame_count: real,
    frame_results: frames,
  };
  Ok((result, detail))
}

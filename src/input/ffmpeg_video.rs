// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/input/ffmpeg_video.rs - 基于 FFmpeg 命令行的视频解码
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

//! 用 `ffprobe` 读取流信息，再让 `ffmpeg` 把帧以 `rgb24` 原始数据写到标准输出，
//! 逐帧读取。只依赖系统中的 FFmpeg 可执行文件。

use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::InputError,
  video::{VideoSource, VideoSourceError},
};

const FFMPEG_SCHEME: &str = "ffmpeg";

#[derive(Debug, Deserialize)]
struct ProbeOutput {
  #[serde(default)]
  streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
  width: Option<u32>,
  height: Option<u32>,
  avg_frame_rate: Option<String>,
  r_frame_rate: Option<String>,
  nb_frames: Option<String>,
}

/// 视频流基本信息
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
  pub width: u32,
  pub height: u32,
  /// 未知时为 0
  pub fps: f64,
  pub frame_count: Option<u64>,
}

/// 解析 `30000/1001` 形式的帧率，无效或 `0/0` 时为 0
fn parse_rate(rate: &str) -> f64 {
  let value = match rate.split_once('/') {
    Some((n, d)) => match (n.trim().parse::<f64>(), d.trim().parse::<f64>()) {
      (Ok(n), Ok(d)) if d != 0.0 => n / d,
      _ => 0.0,
    },
    None => rate.trim().parse::<f64>().unwrap_or(0.0),
  };
  if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

fn parse_probe(json: &[u8]) -> Result<StreamInfo, InputError> {
  let probe: ProbeOutput =
    serde_json::from_slice(json).map_err(|e| InputError::Probe(e.to_string()))?;
  let stream = probe
    .streams
    .into_iter()
    .next()
    .ok_or_else(|| InputError::Probe("找不到视频流".to_string()))?;

  let (width, height) = match (stream.width, stream.height) {
    (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
    _ => return Err(InputError::Probe("视频流缺少尺寸信息".to_string())),
  };

  let fps = [stream.avg_frame_rate, stream.r_frame_rate]
    .iter()
    .flatten()
    .map(|r| parse_rate(r))
    .find(|r| *r > 0.0)
    .unwrap_or(0.0);
  let frame_count = stream
    .nb_frames
    .and_then(|n| n.parse::<u64>().ok())
    .filter(|n| *n > 0);

  Ok(StreamInfo {
    width,
    height,
    fps,
    frame_count,
  })
}

/// 调用 `ffprobe` 获取第一路视频流的信息
pub fn probe(path: &Path) -> Result<StreamInfo, InputError> {
  let output = Command::new("ffprobe")
    .args(["-v", "error"])
    .args(["-select_streams", "v:0"])
    .args([
      "-show_entries",
      "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames",
    ])
    .args(["-of", "json"])
    .arg(path)
    .stdin(Stdio::null())
    .stderr(Stdio::piped())
    .output()?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(InputError::Probe(format!(
      "ffprobe 失败: {}",
      stderr.trim()
    )));
  }
  parse_probe(&output.stdout)
}

/// 解码为 rgb24 原始帧的 ffmpeg 命令
///
/// `-noautorotate` 使输出帧保持 ffprobe 报告的编码尺寸，带旋转信息的竖屏视频不会被转置。
fn decode_command(path: &Path) -> Command {
  let mut command = Command::new("ffmpeg");
  command
    .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
    .arg("-noautorotate")
    .arg("-i")
    .arg(path)
    .args(["-an", "-sn"])
    .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"]);
  command
}

/// `ffmpeg:///path/to/video.mp4` 或直接给出路径
pub struct FfmpegVideo {
  path: PathBuf,
  info: StreamInfo,
  child: Child,
  stdout: ChildStdout,
  frame: Vec<u8>,
}

impl FromUrlWithScheme for FfmpegVideo {
  const SCHEME: &'static str = FFMPEG_SCHEME;
}

impl FromUrl for FfmpegVideo {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(Path::new(url.path()))
  }
}

impl FfmpegVideo {
  pub fn open(path: &Path) -> Result<Self, InputError> {
    if !path.is_file() {
      return Err(InputError::NotFound(path.to_path_buf()));
    }

    let info = probe(path)?;
    info!(
      "打开视频 {}: {}x{}, {:.2} FPS, {:?} 帧",
      path.display(),
      info.width,
      info.height,
      info.fps,
      info.frame_count
    );

    let mut child = decode_command(path)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .spawn()?;
    let stdout = child
      .stdout
      .take()
      .ok_or_else(|| InputError::Probe("无法获取 ffmpeg 输出".to_string()))?;

    let frame_len = info.width as usize * info.height as usize * 3;
    Ok(FfmpegVideo {
      path: path.to_path_buf(),
      info,
      child,
      stdout,
      frame: vec![0; frame_len],
    })
  }

  pub fn info(&self) -> &StreamInfo {
    &self.info
  }

  /// 读满一帧；流正常结束时返回 `None`
  fn read_frame(&mut self) -> Option<Result<(), VideoSourceError>> {
    match self.stdout.read_exact(&mut self.frame) {
      Ok(()) => Some(Ok(())),
      Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
        debug!("视频 {} 读取结束", self.path.display());
        None
      }
      Err(e) => Some(Err(e.into())),
    }
  }
}

impl VideoSource for FfmpegVideo {
  fn native_fps(&self) -> f64 {
    self.info.fps
  }

  fn total_frames(&self) -> Option<u64> {
    self.info.frame_count
  }

  fn next_frame(&mut self) -> Option<Result<RgbImage, VideoSourceError>> {
    Some(self.read_frame()?.and_then(|()| {
      RgbImage::from_raw(self.info.width, self.info.height, self.frame.clone())
        .ok_or_else(|| VideoSourceError::Read("帧数据长度与尺寸不符".to_string()))
    }))
  }

  fn skip_frame(&mut self) -> Option<Result<(), VideoSourceError>> {
    self.read_frame()
  }
}

impl Drop for FfmpegVideo {
  fn drop(&mut self) {
    if let Err(e) = self.child.kill()
      && e.kind() != ErrorKind::InvalidInput
    {
      warn!("无法结束 ffmpeg 进程: {}", e);
    }
    let _ = self.child.wait();
  }
}

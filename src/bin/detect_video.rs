// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/bin/detect_video.rs - 视频鉴伪
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use jianzhen::{
  args::EngineArgs,
  backend::DEFAULT_BACKEND,
  input::InputWrapper,
  task::{Task, VideoTask},
  video::DEFAULT_SAMPLE_FPS,
};

/// 对视频按帧采样，投票得到整段视频的结论
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后端键，未知的键回退到默认后端
  #[arg(long, value_name = "BACKEND", default_value = DEFAULT_BACKEND)]
  pub backend: String,

  /// 每秒采样的帧数
  #[arg(long, value_name = "FPS", default_value_t = DEFAULT_SAMPLE_FPS)]
  pub fps: f64,

  #[command(flatten)]
  pub engine: EngineArgs,

  /// 输入来源
  /// 支持格式:
  /// - 视频文件路径（通过 ffmpeg 解码）
  /// - ffmpeg:///path/video.mp4
  /// - gst://file/path/video.mp4（需要 gstreamer_input 特性）
  /// - folder:///dir?fps=25
  #[arg(value_name = "SOURCE")]
  pub input: String,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("后端: {}", args.backend);
  info!("输入来源: {}", args.input);
  info!("采样帧率: {}", args.fps);
  args.engine.log();

  let registry = args.engine.registry();
  let detector = registry.get_or_create(&args.backend)?;
  let output = args.engine.output()?;
  let video = InputWrapper::open_video(&args.input)?;

  VideoTask::new(detector, args.fps).run_task((args.input, video), output)
}

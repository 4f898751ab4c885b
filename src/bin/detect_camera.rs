// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/bin/detect_camera.rs - 摄像头连续鉴伪
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use jianzhen::{
  FromUrl,
  args::EngineArgs,
  backend::CAMERA_DEFAULT_BACKEND,
  input::InputWrapper,
  stream::SessionHub,
  task::{ContinuousTask, Task},
};

/// 连续读取摄像头画面，经窗口平滑后逐帧给出结论
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后端键，未知的键回退到默认后端
  #[arg(long, value_name = "BACKEND", default_value = CAMERA_DEFAULT_BACKEND)]
  pub backend: String,

  /// 输入来源
  /// 支持格式:
  /// - gst://camera/dev/video0?width=640&height=480&fps=30
  /// - folder:///dir（按文件名顺序回放）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 会话标识
  #[arg(long, value_name = "SESSION", default_value = "camera")]
  pub session: String,

  /// 最多处理的帧数，0 表示不限制
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,

  #[command(flatten)]
  pub engine: EngineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("后端: {}", args.backend);
  info!("输入来源: {}", args.input);
  info!("会话: {}", args.session);
  args.engine.log();

  let registry = Arc::new(args.engine.registry());
  let hub = Arc::new(SessionHub::new(registry.clone()));
  let input = InputWrapper::from_url(&args.input)?;
  let output = args.engine.output()?;

  let frame_number = (args.frame_number > 0).then_some(args.frame_number);
  let result = ContinuousTask::new(hub.clone(), args.session, args.backend)
    .with_frame_number(frame_number)
    .with_ctrlc()?
    .run_task(input, output);

  hub.close_all();
  registry.shutdown();
  result
}

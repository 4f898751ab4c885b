// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/bin/detect_image.rs - 图像鉴伪
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use jianzhen::{
  args::EngineArgs,
  backend::DEFAULT_BACKEND,
  task::{OneShotTask, Task},
};

/// 对一张或多张图像给出真伪判断
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后端键，未知的键回退到默认后端
  #[arg(long, value_name = "BACKEND", default_value = DEFAULT_BACKEND)]
  pub backend: String,

  #[command(flatten)]
  pub engine: EngineArgs,

  /// 图像文件
  #[arg(value_name = "IMAGE", required = true)]
  pub inputs: Vec<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("后端: {}", args.backend);
  info!("输入: {:?}", args.inputs);
  args.engine.log();

  let registry = args.engine.registry();
  let detector = registry.get_or_create(&args.backend)?;
  let output = args.engine.output()?;

  OneShotTask::new(detector)
    .with_enhance(!args.engine.no_face)
    .run_task(args.inputs, output)
}

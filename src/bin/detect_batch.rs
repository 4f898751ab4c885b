// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/bin/detect_batch.rs - 批量帧鉴伪
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
use tracing::{info, warn};

use jianzhen::{
  DetectError,
  args::EngineArgs,
  backend::DEFAULT_BACKEND,
  input::{decode_payload_lines, read_bytes},
  task::{BatchTask, Task},
};

/// 对一组帧逐帧判断并给出整体结论
///
/// 帧可以是图像文件，也可以是每行一条 base64（可带 `data:` 前缀）的载荷文件。
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后端键，未知的键回退到默认后端
  #[arg(long, value_name = "BACKEND", default_value = DEFAULT_BACKEND)]
  pub backend: String,

  /// base64 载荷文件，每行一帧
  #[arg(long, value_name = "FILE")]
  pub payload_file: Option<PathBuf>,

  #[command(flatten)]
  pub engine: EngineArgs,

  /// 图像文件
  #[arg(value_name = "IMAGE")]
  pub frames: Vec<PathBuf>,
}

/// 按输入顺序收集各帧；读取或解码失败的帧以 `Err` 保留，计入批量的失败帧
fn load_frames(args: &Args) -> Result<Vec<Result<Vec<u8>, DetectError>>> {
  let mut frames: Vec<_> = args.frames.iter().map(|path| read_bytes(path)).collect();

  if let Some(path) = &args.payload_file {
    let text = std::fs::read_to_string(path)?;
    frames.extend(decode_payload_lines(&text));
  }

  for (index, frame) in frames.iter().enumerate() {
    if let Err(e) = frame {
      warn!("第 {} 帧读取失败: {}", index, e);
    }
  }
  Ok(frames)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("后端: {}", args.backend);
  info!("图像文件: {:?}", args.frames);
  info!("载荷文件: {:?}", args.payload_file);
  args.engine.log();

  let frames = load_frames(&args)?;
  info!("共 {} 帧", frames.len());

  let registry = args.engine.registry();
  let detector = registry.get_or_create(&args.backend)?;
  let output = args.engine.output()?;

  BatchTask::new(detector).run_task(frames, output)
}

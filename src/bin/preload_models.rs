// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/bin/preload_models.rs - 预先加载模型权重
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
use tracing::{error, info};

use jianzhen::args::EngineArgs;

/// 预先下载并加载后端模型，未指定后端时加载全部
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 要加载的后端键，可多次指定
  #[arg(long, value_name = "BACKEND")]
  pub backend: Vec<String>,

  #[command(flatten)]
  pub engine: EngineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  args.engine.log();

  let registry = args.engine.registry();
  let now = std::time::Instant::now();
  let failures = if args.backend.is_empty() {
    registry.preload_all()
  } else {
    registry.preload(args.backend.iter().map(String::as_str))
  };

  for (key, e) in &failures {
    error!("后端 {} 加载失败: {}", key, e);
  }
  info!(
    "已加载 {:?}，耗时: {:.2?}",
    registry.cached_keys(),
    now.elapsed()
  );

  if !failures.is_empty() {
    anyhow::bail!("{} 个后端加载失败", failures.len());
  }
  registry.shutdown();
  Ok(())
}

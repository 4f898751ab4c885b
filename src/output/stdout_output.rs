// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/output/stdout_output.rs - 标准输出
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

use std::io::Write;

use image::RgbImage;
use serde::Serialize;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Report},
};

/// `stdout:` 输出多行 JSON，`stdout:?compact` 每条记录一行
#[derive(Debug, Default)]
pub struct StdoutOutput {
  compact: bool,
}

impl FromUrlWithScheme for StdoutOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for StdoutOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(StdoutOutput {
      compact: url.query_pairs().any(|(k, _)| k == "compact"),
    })
  }
}

impl StdoutOutput {
  fn render<T: Serialize>(&self, record: &T) -> Result<String, serde_json::Error> {
    if self.compact {
      serde_json::to_string(record)
    } else {
      serde_json::to_string_pretty(record)
    }
  }
}

impl Report for StdoutOutput {
  type Error = OutputError;

  fn report<T: Serialize>(&self, record: &T, _frame: Option<&RgbImage>) -> Result<(), Self::Error> {
    let line = self.render(record)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compact_mode_is_single_line() {
    let url = Url::parse("stdout:?compact").unwrap();
    let out = StdoutOutput::from_url(&url).unwrap();
    let s = out.render(&serde_json::json!({"a": 1, "b": [1, 2]})).unwrap();
    assert!(!s.contains('\n'));

    let pretty = StdoutOutput::default()
      .render(&serde_json::json!({"a": 1}))
      .unwrap();
    assert!(pretty.contains('\n'));
  }
}

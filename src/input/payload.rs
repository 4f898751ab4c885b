// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/input/payload.rs - base64 图像载荷
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

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

use crate::error::DetectError;

#[derive(Error, Debug)]
pub enum PayloadError {
  #[error("载荷为空")]
  Empty,
  #[error("base64 解码失败: {0}")]
  Base64(#[from] base64::DecodeError),
}

impl From<PayloadError> for DetectError {
  fn from(err: PayloadError) -> Self {
    DetectError::decode(err)
  }
}

/// 解码 base64 图像载荷，`data:image/jpeg;base64,` 之类的前缀会被去掉
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, PayloadError> {
  let payload = payload.trim();
  let data = if payload.starts_with("data:") {
    payload
      .split_once(',')
      .map(|(_, data)| data)
      .unwrap_or_default()
  } else {
    payload
  };

  if data.is_empty() {
    return Err(PayloadError::Empty);
  }
  Ok(STANDARD.decode(data)?)
}

/// 每行一条载荷，空行跳过；每条载荷的解码结果按行顺序返回
pub fn decode_payload_lines(text: &str) -> Vec<Result<Vec<u8>, DetectError>> {
  text
    .lines()
    .filter(|line| !line.trim().is_empty())
    .map(|line| decode_payload(line).map_err(DetectError::from))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn payload_lines_keep_failures_in_place() {
    let frames = decode_payload_lines("aGVsbG8=\n\n!!not base64!!\ndata:image/png;base64,d29ybGQ=\n");
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].as_deref().unwrap(), b"hello");
    assert!(matches!(frames[1], Err(DetectError::DecodeError(_))));
    assert_eq!(frames[2].as_deref().unwrap(), b"world");
  }

  #[test]
  fn strips_data_url_prefix() {
    let bytes = decode_payload("data:image/png;base64,aGVsbG8=").unwrap();
    assert_eq!(bytes, b"hello");
    assert_eq!(decode_payload("  aGVsbG8=\n").unwrap(), b"hello");
  }

  #[test]
  fn rejects_empty_and_invalid() {
    assert!(matches!(decode_payload(""), Err(PayloadError::Empty)));
    assert!(matches!(decode_payload("data:image/png;base64,"), Err(PayloadError::Empty)));
    assert!(matches!(decode_payload("data:nocomma"), Err(PayloadError::Empty)));
    let err: DetectError = decode_payload("@@@").unwrap_err().into();
    assert_eq!(err.tag(), "decode_error");
  }
}

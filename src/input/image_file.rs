// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/input/image_file.rs - 图像文件输入
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::DetectError,
  input::InputError,
  video::{VideoSource, VideoSourceError},
};

const READ_IMAGE_FILE_SCHEME: &str = "image";

/// 读取并解码图像文件；文件不存在为 `NotFound`，无法解码为 `DecodeError`
pub fn read_image(path: &Path) -> Result<RgbImage, DetectError> {
  if !path.is_file() {
    return Err(DetectError::NotFound(path.to_path_buf()));
  }
  let reader = ImageReader::open(path).map_err(|e| match e.kind() {
    std::io::ErrorKind::NotFound => DetectError::NotFound(path.to_path_buf()),
    _ => DetectError::decode(format!("{}: {}", path.display(), e)),
  })?;
  let image = reader
    .with_guessed_format()
    .map_err(|e| DetectError::decode(format!("{}: {}", path.display(), e)))?
    .decode()?;
  debug!("读取图像 {} ({}x{})", path.display(), image.width(), image.height());
  Ok(image.into_rgb8())
}

/// 读出文件的原始字节，不做解码
pub fn read_bytes(path: &Path) -> Result<Vec<u8>, DetectError> {
  std::fs::read(path).map_err(|e| match e.kind() {
    std::io::ErrorKind::NotFound => DetectError::NotFound(path.to_path_buf()),
    _ => DetectError::decode(format!("{}: {}", path.display(), e)),
  })
}

/// 从内存中的编码数据解码图像，格式由内容推断
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DetectError> {
  if bytes.is_empty() {
    return Err(DetectError::decode("图像数据为空"));
  }
  let image = image::load_from_memory(bytes)?;
  Ok(image.into_rgb8())
}

/// `image:///path/to/file.jpg`：只产生一帧的输入
pub struct ImageFileInput {
  path: PathBuf,
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = READ_IMAGE_FILE_SCHEME;
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际为 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::open(Path::new(url.path()))?)
  }
}

impl ImageFileInput {
  pub fn open(path: &Path) -> Result<Self, DetectError> {
    let image = read_image(path)?;
    Ok(ImageFileInput {
      path: path.to_path_buf(),
      image: Some(image),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl VideoSource for ImageFileInput {
  fn native_fps(&self) -> f64 {
    0.0
  }

  fn total_frames(&self) -> Option<u64> {
    Some(1)
  }

  fn next_frame(&mut self) -> Option<Result<RgbImage, VideoSourceError>> {
    self.image.take().map(Ok)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn missing_file_is_not_found() {
    let err = read_image(Path::new("/no/such/dir/face.png")).unwrap_err();
    assert!(matches!(err, DetectError::NotFound(p) if p.ends_with("face.png")));
  }

  #[test]
  fn raw_bytes_keep_not_found_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.bin");
    std::fs::write(&path, b"abc").unwrap();
    assert_eq!(read_bytes(&path).unwrap(), b"abc");
    assert!(matches!(
      read_bytes(&dir.path().join("gone.png")),
      Err(DetectError::NotFound(_))
    ));
  }

  #[test]
  fn garbage_file_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"definitely not a jpeg").unwrap();
    assert!(matches!(read_image(&path), Err(DetectError::DecodeError(_))));
  }

  #[test]
  fn reads_png_into_single_frame_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    RgbImage::from_pixel(3, 2, Rgb([10, 20, 30])).save(&path).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&format!("image://{}", url.path())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.total_frames(), Some(1));
    let frame = input.next_frame().unwrap().unwrap();
    assert_eq!(frame.dimensions(), (3, 2));
    assert!(input.next_frame().is_none());
  }

  #[test]
  fn empty_and_invalid_bytes_fail_to_decode() {
    assert!(matches!(decode_image(&[]), Err(DetectError::DecodeError(_))));
    assert!(matches!(
      decode_image(b"\x89PNG but not really"),
      Err(DetectError::DecodeError(_))
    ));
  }
}

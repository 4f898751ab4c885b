// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/face.rs - 人脸预处理
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

//! 分类前的人脸增强：找到面积最大的人脸，按宽度的 30% 向四周扩展后裁剪，
//! 再对亮度通道做直方图均衡。
//!
//! 这一步只用于提升分类质量，任何内部错误都会退回原图，不会让调用失败。

use std::borrow::Cow;
use std::sync::Arc;

use image::{GrayImage, Luma, Rgb, RgbImage};
use thiserror::Error;
use tracing::debug;

/// 裁剪时向四周扩展的比例（相对人脸宽度）
const FACE_MARGIN_RATIO: f32 = 0.3;

/// 人脸边界框，像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl FaceBox {
  pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
    FaceBox {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> u64 {
    self.width as u64 * self.height as u64
  }
}

#[derive(Error, Debug)]
pub enum FaceDetectError {
  #[error("人脸检测器错误: {0}")]
  Detector(String),
  #[error("人脸区域无效: {0:?}")]
  InvalidRegion(FaceBox),
}

/// 人脸检测能力：输入灰度图，输出人脸框
pub trait FaceDetector: Send + Sync {
  fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceBox>, FaceDetectError>;
}

/// 人脸预处理器，没有检测器时原样返回输入
#[derive(Clone, Default)]
pub struct FacePreprocessor {
  detector: Option<Arc<dyn FaceDetector>>,
}

impl FacePreprocessor {
  pub fn new(detector: Arc<dyn FaceDetector>) -> Self {
    FacePreprocessor {
      detector: Some(detector),
    }
  }

  pub fn disabled() -> Self {
    Self::default()
  }

  pub fn is_enabled(&self) -> bool {
    self.detector.is_some()
  }

  /// 尽力而为的人脸增强
  ///
  /// 未检测到人脸或出现任何错误时返回借用的原图。
  pub fn enhance<'a>(&self, image: &'a RgbImage) -> Cow<'a, RgbImage> {
    let Some(detector) = &self.detector else {
      return Cow::Borrowed(image);
    };

    match enhance_with(detector.as_ref(), image) {
      Ok(Some(enhanced)) => Cow::Owned(enhanced),
      Ok(None) => Cow::Borrowed(image),
      Err(e) => {
        debug!("人脸增强失败: {}, 使用原图", e);
        Cow::Borrowed(image)
      }
    }
  }
}

fn enhance_with(
  detector: &dyn FaceDetector,
  image: &RgbImage,
) -> Result<Option<RgbImage>, FaceDetectError> {
  let gray = image::imageops::grayscale(image);
  let faces = detector.detect(&gray)?;

  let Some(face) = largest_face(&faces) else {
    return Ok(None);
  };

  let (x1, y1, x2, y2) = expand_face(face, image.width(), image.height())?;
  debug!(
    "检测到 {} 张人脸, 裁剪区域 ({}, {}) - ({}, {})",
    faces.len(),
    x1,
    y1,
    x2,
    y2
  );

  let crop = image::imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
  Ok(Some(equalize_luma(&crop)))
}

/// 面积最大的人脸，面积相同时取先出现者
pub fn largest_face(faces: &[FaceBox]) -> Option<&FaceBox> {
  faces.iter().fold(None, |best, face| match best {
    Some(b) if b.area() >= face.area() => Some(b),
    _ => Some(face),
  })
}

/// 向四周扩展 30% 人脸宽度并裁剪到图像范围内，返回 (x1, y1, x2, y2)
pub fn expand_face(
  face: &FaceBox,
  image_width: u32,
  image_height: u32,
) -> Result<(u32, u32, u32, u32), FaceDetectError> {
  let padding = (face.width as f32 * FACE_MARGIN_RATIO) as u32;
  let x1 = face.x.saturating_sub(padding);
  let y1 = face.y.saturating_sub(padding);
  let x2 = face
    .x
    .saturating_add(face.width)
    .saturating_add(padding)
    .min(image_width);
  let y2 = face
    .y
    .saturating_add(face.height)
    .saturating_add(padding)
    .min(image_height);

  if x1 >= x2 || y1 >= y2 {
    return Err(FaceDetectError::InvalidRegion(*face));
  }
  Ok((x1, y1, x2, y2))
}

/// 仅在亮度通道（BT.601 YCbCr 的 Y）上做直方图均衡，保留色度
pub fn equalize_luma(image: &RgbImage) -> RgbImage {
  let (width, height) = image.dimensions();
  let mut luma = GrayImage::new(width, height);
  let mut chroma = Vec::with_capacity((width * height) as usize);

  for (x, y, Rgb([r, g, b])) in image.enumerate_pixels() {
    let (r, g, b) = (*r as f32, *g as f32, *b as f32);
    let yy = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    luma.put_pixel(x, y, Luma([yy.round().clamp(0.0, 255.0) as u8]));
    chroma.push((cb, cr));
  }

  let luma = imageproc::contrast::equalize_histogram(&luma);

  let to_u8 = |v: f32| v.round().clamp(0.0, 255.0) as u8;
  RgbImage::from_fn(width, height, |x, y| {
    let yy = luma.get_pixel(x, y)[0] as f32;
    let (cb, cr) = chroma[(y * width + x) as usize];
    let (cb, cr) = (cb - 128.0, cr - 128.0);
    Rgb([
      to_u8(yy + 1.402 * cr),
      to_u8(yy - 0.344_136 * cb - 0.714_136 * cr),
      to_u8(yy + 1.772 * cb),
    ])
  })
}

#[cfg(feature = "face_opencv")]
mod opencv_cascade;
#[cfg(feature = "face_opencv")]
pub use self::opencv_cascade::CascadeFaceDetector;

// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/frame.rs - 图像到张量的转换
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

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;

/// 张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
  /// Channels × Height × Width
  Nchw,
  /// Height × Width × Channels
  Nhwc,
}

/// 模型输入要求：尺寸、布局与归一化参数
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
  pub width: u32,
  pub height: u32,
  pub layout: TensorLayout,
  pub mean: [f32; 3],
  pub std: [f32; 3],
}

impl Default for InputSpec {
  /// ViT 图像处理器的默认参数
  fn default() -> Self {
    InputSpec {
      width: 224,
      height: 224,
      layout: TensorLayout::Nchw,
      mean: [0.5; 3],
      std: [0.5; 3],
    }
  }
}

impl InputSpec {
  pub fn with_size(mut self, width: u32, height: u32) -> Self {
    self.width = width;
    self.height = height;
    self
  }

  pub fn with_layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn with_normalize(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
    self.mean = mean;
    self.std = std;
    self
  }

  pub fn tensor_len(&self) -> usize {
    RGB_CHANNELS * self.width as usize * self.height as usize
  }
}

fn resized<'a>(image: &'a RgbImage, spec: &InputSpec) -> std::borrow::Cow<'a, RgbImage> {
  if image.dimensions() == (spec.width, spec.height) {
    std::borrow::Cow::Borrowed(image)
  } else {
    std::borrow::Cow::Owned(image::imageops::resize(
      image,
      spec.width,
      spec.height,
      FilterType::Triangle,
    ))
  }
}

/// 缩放、归一化（`(x / 255 - mean) / std`）后按布局展开为 f32 张量
pub fn to_f32_tensor(image: &RgbImage, spec: &InputSpec) -> Vec<f32> {
  let image = resized(image, spec);
  let width = spec.width as usize;
  let height = spec.height as usize;
  let plane = width * height;
  let mut data = vec![0f32; spec.tensor_len()];

  for (x, y, pixel) in image.enumerate_pixels() {
    let pos = y as usize * width + x as usize;
    for c in 0..RGB_CHANNELS {
      let value = (pixel[c] as f32 / 255.0 - spec.mean[c]) / spec.std[c];
      let index = match spec.layout {
        TensorLayout::Nchw => c * plane + pos,
        TensorLayout::Nhwc => pos * RGB_CHANNELS + c,
      };
      data[index] = value;
    }
  }

  data
}

/// 缩放后按布局展开为 u8 张量，归一化交给模型（量化模型常用）
pub fn to_u8_tensor(image: &RgbImage, spec: &InputSpec) -> Vec<u8> {
  let image = resized(image, spec);
  match spec.layout {
    TensorLayout::Nhwc => image.into_owned().into_raw(),
    TensorLayout::Nchw => {
      let plane = spec.width as usize * spec.height as usize;
      let mut data = vec![0u8; spec.tensor_len()];
      for (x, y, pixel) in image.enumerate_pixels() {
        let pos = y as usize * spec.width as usize + x as usize;
        for c in 0..RGB_CHANNELS {
          data[c * plane + pos] = pixel[c];
        }
      }
      data
    }
  }
}

// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/face/opencv_cascade.rs - OpenCV Haar 级联人脸检测
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
use std::sync::Mutex;

use image::GrayImage;
use opencv::{
  core::{Mat, Rect, Size, Vector},
  objdetect::CascadeClassifier,
  prelude::*,
};
use tracing::{debug, info};

use super::{FaceBox, FaceDetectError, FaceDetector};

const CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";
const CASCADE_DIRS: [&str; 4] = [
  ".",
  "/usr/share/opencv4/haarcascades",
  "/usr/local/share/opencv4/haarcascades",
  "/usr/share/opencv/haarcascades",
];

const SCALE_FACTOR: f64 = 1.3;
const MIN_NEIGHBORS: i32 = 5;

/// 最小与最大人脸尺寸，沿用 `detectMultiScale` 的缺省值 (0, 0)，即不限制
fn face_size_bounds() -> (Size, Size) {
  (Size::new(0, 0), Size::new(0, 0))
}

fn cv_err(e: opencv::Error) -> FaceDetectError {
  FaceDetectError::Detector(e.to_string())
}

/// Haar 级联正脸检测器
pub struct CascadeFaceDetector {
  cascade: Mutex<CascadeClassifier>,
}

impl CascadeFaceDetector {
  pub fn from_path(path: &Path) -> Result<Self, FaceDetectError> {
    let path_str = path
      .to_str()
      .ok_or_else(|| FaceDetectError::Detector(format!("无效的级联文件路径: {:?}", path)))?;
    let cascade = CascadeClassifier::new(path_str).map_err(cv_err)?;
    if cascade.empty().map_err(cv_err)? {
      return Err(FaceDetectError::Detector(format!(
        "级联文件为空或无法解析: {:?}",
        path
      )));
    }

    info!("加载人脸级联模型: {:?}", path);
    Ok(CascadeFaceDetector {
      cascade: Mutex::new(cascade),
    })
  }

  /// 在常见的系统目录中查找 `haarcascade_frontalface_default.xml`
  pub fn locate() -> Result<Self, FaceDetectError> {
    let path = CASCADE_DIRS
      .iter()
      .map(|dir| PathBuf::from(dir).join(CASCADE_FILE))
      .find(|p| p.exists())
      .ok_or_else(|| FaceDetectError::Detector(format!("找不到 {}", CASCADE_FILE)))?;
    Self::from_path(&path)
  }
}

impl FaceDetector for CascadeFaceDetector {
  fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceBox>, FaceDetectError> {
    let (width, height) = gray.dimensions();
    let mat = Mat::new_rows_cols_with_data(height as i32, width as i32, gray.as_raw())
      .map_err(cv_err)?;

    let mut faces = Vector::<Rect>::new();
    let (min_size, max_size) = face_size_bounds();
    {
      let mut cascade = self
        .cascade
        .lock()
        .map_err(|_| FaceDetectError::Detector("级联模型锁已损坏".to_string()))?;
      cascade
        .detect_multi_scale(
          &*mat,
          &mut faces,
          SCALE_FACTOR,
          MIN_NEIGHBORS,
          0,
          min_size,
          max_size,
        )
        .map_err(cv_err)?;
    }

    let boxes: Vec<FaceBox> = faces
      .iter()
      .map(|r| {
        FaceBox::new(
          r.x.max(0) as u32,
          r.y.max(0) as u32,
          r.width.max(0) as u32,
          r.height.max(0) as u32,
        )
      })
      .collect();
    debug!("级联检测到 {} 张人脸", boxes.len());
    Ok(boxes)
  }
}

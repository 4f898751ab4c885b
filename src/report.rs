// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/report.rs - 对外输出的检测报告
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

use serde::{Serialize, Serializer};

use crate::{
  detector::CanonicalResult,
  error::DetectError,
  stream::{BatchAggregate, BatchFailure, BatchFrame, BatchResult},
  video::VideoAggregate,
};

/// 序列化时保留两位小数
pub fn round2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_f64((value * 100.0).round() / 100.0)
}

/// 每个报告都携带的结论
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
  pub is_fake: bool,
  #[serde(serialize_with = "round2")]
  pub confidence_percent: f64,
  pub model_used: &'static str,
}

impl From<&CanonicalResult> for Verdict {
  fn from(r: &CanonicalResult) -> Self {
    Verdict {
      is_fake: r.is_fake,
      confidence_percent: r.confidence_percent,
      model_used: r.model_used,
    }
  }
}

/// 批量中一帧的结论，`frame_index` 指向输入中的位置
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameVerdict {
  pub frame_index: usize,
  #[serde(flatten)]
  pub verdict: Verdict,
}

impl From<&BatchFrame> for FrameVerdict {
  fn from(f: &BatchFrame) -> Self {
    FrameVerdict {
      frame_index: f.frame_index,
      verdict: (&f.result).into(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DetectionReport {
  Image {
    source: String,
    #[serde(flatten)]
    verdict: Verdict,
  },
  Video {
    source: String,
    #[serde(flatten)]
    verdict: Verdict,
    details: VideoAggregate,
  },
  Camera {
    session: String,
    frame_number: u64,
    #[serde(flatten)]
    verdict: Verdict,
  },
  Batch {
    model_used: &'static str,
    frames: Vec<FrameVerdict>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<BatchFailure>,
    aggregate: BatchAggregate,
  },
}

impl DetectionReport {
  pub fn image(source: impl Into<String>, result: &CanonicalResult) -> Self {
    DetectionReport::Image {
      source: source.into(),
      verdict: result.into(),
    }
  }

  pub fn video(source: impl Into<String>, result: &CanonicalResult, details: VideoAggregate) -> Self {
    DetectionReport::Video {
      source: source.into(),
      verdict: result.into(),
      details,
    }
  }

  pub fn camera(session: impl Into<String>, frame_number: u64, result: &CanonicalResult) -> Self {
    DetectionReport::Camera {
      session: session.into(),
      frame_number,
      verdict: result.into(),
    }
  }

  pub fn batch(model_used: &'static str, result: BatchResult) -> Self {
    DetectionReport::Batch {
      model_used,
      frames: result.frames.iter().map(FrameVerdict::from).collect(),
      failures: result.failures,
      aggregate: result.aggregate,
    }
  }

  pub fn is_fake(&self) -> bool {
    match self {
      DetectionReport::Image { verdict, .. }
      | DetectionReport::Video { verdict, .. }
      | DetectionReport::Camera { verdict, .. } => verdict.is_fake,
      DetectionReport::Batch { aggregate, .. } => aggregate.is_fake,
    }
  }
}

/// 带标签的失败
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
  pub error: &'static str,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source: Option<String>,
}

impl ErrorReport {
  pub fn new(err: &DetectError, source: Option<String>) -> Self {
    ErrorReport {
      error: err.tag(),
      message: err.to_string(),
      source,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn result(is_fake: bool, confidence_percent: f64) -> CanonicalResult {
    CanonicalResult {
      is_fake,
      confidence_percent,
      model_used: "Dima806 Deepfake Detector",
    }
  }

  #[test]
  fn image_report_is_flat_and_rounded() {
    let report = DetectionReport::image("a.jpg", &result(true, 88.333_333));
    assert_eq!(
      serde_json::to_value(&report).unwrap(),
      json!({
        "kind": "image",
        "source": "a.jpg",
        "is_fake": true,
        "confidence_percent": 88.33,
        "model_used": "Dima806 Deepfake Detector"
      })
    );
    assert!(report.is_fake());
  }

  #[test]
  fn camera_report_carries_frame_number() {
    let report = DetectionReport::camera("cam0", 42, &result(false, 35.0));
    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v["kind"], "camera");
    assert_eq!(v["frame_number"], 42);
    assert_eq!(v["is_fake"], false);
  }

  #[test]
  fn error_report_uses_stable_tag() {
    let v = serde_json::to_value(ErrorReport::new(&DetectError::NoFramesProcessed, None)).unwrap();
    assert_eq!(v["error"], "no_frames_processed");
    assert!(v.get("source").is_none());
  }

  #[test]
  fn batch_report_keeps_input_positions() {
    let batch = BatchResult {
      frames: vec![
        BatchFrame {
          frame_index: 0,
          result: result(true, 91.0),
        },
        BatchFrame {
          frame_index: 2,
          result: result(true, 87.5),
        },
      ],
      failures: vec![BatchFailure::new(1, &DetectError::decode("bad payload"))],
      aggregate: BatchAggregate {
        is_fake: true,
        confidence_percent: 89.25,
        processed_frames: 2,
        failed_frames: 1,
        fake_frame_count: 2,
        real_frame_count: 0,
      },
    };
    let v = serde_json::to_value(DetectionReport::batch("m", batch)).unwrap();
    assert_eq!(v["kind"], "batch");
    assert_eq!(v["frames"][1]["frame_index"], 2);
    assert_eq!(v["frames"][1]["confidence_percent"], 87.5);
    assert_eq!(v["failures"][0]["frame_index"], 1);
    assert_eq!(v["failures"][0]["error"], "decode_error");
    assert_eq!(v["aggregate"]["failed_frames"], 1);
  }
}

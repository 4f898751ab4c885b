// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/label.rs - 标签归一化
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

//! 不同后端的类别顺序和标签文本各不相同，本模块把后端原始的预测类别
//! 统一映射为两种规范结果：[`Outcome::Fake`] 或 [`Outcome::Real`]。

use serde::Serialize;

/// 被视为“伪造”的模型原生标签（大小写不敏感）
const FAKE_LABELS: [&str; 3] = ["fake", "deepfake", "synthetic"];

/// 规范结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
  Fake,
  Real,
}

impl Outcome {
  pub fn is_fake(self) -> bool {
    self == Outcome::Fake
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Outcome::Fake => "Fake",
      Outcome::Real => "Real",
    }
  }

  /// 由标签文本判断结果，只有 fake / deepfake / synthetic 视为伪造
  pub fn from_label_text(label: &str) -> Self {
    if FAKE_LABELS.iter().any(|l| label.eq_ignore_ascii_case(l)) {
      Outcome::Fake
    } else {
      Outcome::Real
    }
  }
}

impl std::fmt::Display for Outcome {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 后端的标签方案
///
/// 每个后端描述符携带自己的方案，归一化规则随方案分派，
/// 不依赖后端键的条件分支。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScheme {
  /// 显式映射：下标即类别索引
  Explicit(&'static [Outcome]),
  /// 使用模型自带的标签词表（如 `id2label`）
  ModelNative,
}

/// 归一化后的预测
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
  pub label: String,
  pub outcome: Outcome,
}

impl LabelScheme {
  /// 把预测类别映射为标签文本和规范结果
  ///
  /// 未知索引得到 `Class_<index>`，并归为 `Real`。
  pub fn normalize<'a, F>(&self, index: usize, native_label: F) -> Normalized
  where
    F: FnOnce(usize) -> Option<&'a str>,
  {
    match self {
      LabelScheme::Explicit(map) => match map.get(index) {
        Some(outcome) => Normalized {
          label: outcome.as_str().to_string(),
          outcome: *outcome,
        },
        None => unknown_class(index),
      },
      LabelScheme::ModelNative => match native_label(index) {
        Some(label) => Normalized {
          label: label.to_string(),
          outcome: Outcome::from_label_text(label),
        },
        None => unknown_class(index),
      },
    }
  }
}

fn unknown_class(index: usize) -> Normalized {
  Normalized {
    label: format!("Class_{}", index),
    outcome: Outcome::Real,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const FAKE_REAL: LabelScheme = LabelScheme::Explicit(&[Outcome::Fake, Outcome::Real]);

  #[test]
  fn explicit_map_is_pure() {
    for _ in 0..3 {
      assert_eq!(FAKE_REAL.normalize(0, |_| None).outcome, Outcome::Fake);
      assert_eq!(FAKE_REAL.normalize(1, |_| None).outcome, Outcome::Real);
    }
  }

  #[test]
  fn explicit_map_ignores_native_vocabulary() {
    let n = FAKE_REAL.normalize(1, |_| Some("deepfake"));
    assert_eq!(n.outcome, Outcome::Real);
    assert_eq!(n.label, "Real");
  }

  #[test]
  fn native_labels_are_case_insensitive() {
    let vocab = ["Realism", "DEEPFAKE", "Synthetic", "fake", "Real"];
    let outcomes: Vec<Outcome> = (0..vocab.len())
      .map(|i| {
        LabelScheme::ModelNative
          .normalize(i, |i| vocab.get(i).copied())
          .outcome
      })
      .collect();
    assert_eq!(
      outcomes,
      vec![
        Outcome::Real,
        Outcome::Fake,
        Outcome::Fake,
        Outcome::Fake,
        Outcome::Real
      ]
    );
  }

  #[test]
  fn unknown_index_fails_open_to_real() {
    let n = LabelScheme::ModelNative.normalize(7, |_| None);
    assert_eq!(n.label, "Class_7");
    assert_eq!(n.outcome, Outcome::Real);

    let n = FAKE_REAL.normalize(2, |_| None);
    assert_eq!(n.label, "Class_2");
    assert_eq!(n.outcome, Outcome::Real);
  }
}

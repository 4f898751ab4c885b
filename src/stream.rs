// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/stream.rs - 连续帧平滑与会话
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

//! 摄像头等连续输入的平滑。
//!
//! 每个会话持有自己的 [`StreamStabilizer`]（以及其中的窗口），
//! 由 [`SessionHub`] 为每个会话启动一个工作线程，通过通道按提交顺序处理帧。

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  detector::{CanonicalResult, DetectorInstance},
  error::DetectError,
  input::decode_image,
  registry::DetectorRegistry,
  report::round2,
};

/// 窗口容量
pub const WINDOW_CAPACITY: usize = 5;
/// 窗口中至少有这么多条记录时才做众数平滑
pub const SMOOTHING_MIN_ENTRIES: usize = 3;
/// 低于该置信度的结论一律报告为真实
pub const CONFIDENCE_GATE_PERCENT: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEntry {
  pub class_index: usize,
  pub raw_confidence: f64,
}

/// 固定容量的 FIFO 窗口，溢出时丢弃最旧记录
#[derive(Debug, Clone)]
pub struct StabilizationWindow {
  entries: VecDeque<WindowEntry>,
}

impl Default for StabilizationWindow {
  fn default() -> Self {
    StabilizationWindow {
      entries: VecDeque::with_capacity(WINDOW_CAPACITY),
    }
  }
}

impl StabilizationWindow {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, entry: WindowEntry) {
    if self.entries.len() == WINDOW_CAPACITY {
      self.entries.pop_front();
    }
    self.entries.push_back(entry);
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
    self.entries.iter()
  }

  /// 众数类别及该类别记录的平均置信度；记录不足 3 条时返回 `None`
  ///
  /// 出现次数相同时取窗口中最先出现的类别。
  pub fn smoothed(&self) -> Option<WindowEntry> {
    if self.entries.len() < SMOOTHING_MIN_ENTRIES {
      return None;
    }

    // (类别, 次数, 置信度之和)，按首次出现顺序
    let mut tally: Vec<(usize, usize, f64)> = Vec::new();
    for entry in &self.entries {
      match tally.iter_mut().find(|t| t.0 == entry.class_index) {
        Some(t) => {
          t.1 += 1;
          t.2 += entry.raw_confidence;
        }
        None => tally.push((entry.class_index, 1, entry.raw_confidence)),
      }
    }

    let (class_index, count, sum) = tally
      .into_iter()
      .fold(None, |best: Option<(usize, usize, f64)>, t| match best {
        Some(b) if b.1 >= t.1 => Some(b),
        _ => Some(t),
      })?;

    Some(WindowEntry {
      class_index,
      raw_confidence: sum / count as f64,
    })
  }
}

/// 置信门限：低于 70% 的结论改报为真实，置信度取 `100 - c`
pub fn apply_gate(result: CanonicalResult) -> CanonicalResult {
  if result.confidence_percent < CONFIDENCE_GATE_PERCENT {
    debug!(
      "置信度 {:.2}% 低于门限, 报告为真实",
      result.confidence_percent
    );
    CanonicalResult {
      is_fake: false,
      confidence_percent: 100.0 - result.confidence_percent,
      ..result
    }
  } else {
    result
  }
}

/// 批量帧的聚合结论
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchAggregate {
  pub is_fake: bool,
  #[serde(serialize_with = "round2")]
  pub confidence_percent: f64,
  pub processed_frames: usize,
  pub failed_frames: usize,
  pub fake_frame_count: usize,
  pub real_frame_count: usize,
}

/// 批量中成功的一帧，`frame_index` 为该帧在输入中的位置
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFrame {
  pub frame_index: usize,
  pub result: CanonicalResult,
}

/// 批量中失败的一帧
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
  pub frame_index: usize,
  pub error: &'static str,
  pub message: String,
}

impl BatchFailure {
  pub fn new(frame_index: usize, err: &DetectError) -> Self {
    BatchFailure {
      frame_index,
      error: err.tag(),
      message: err.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
  pub frames: Vec<BatchFrame>,
  pub failures: Vec<BatchFailure>,
  pub aggregate: BatchAggregate,
}

/// 一个会话的平滑器，独占自己的窗口
pub struct StreamStabilizer {
  detector: Arc<DetectorInstance>,
  window: StabilizationWindow,
}

impl StreamStabilizer {
  pub fn new(detector: Arc<DetectorInstance>) -> Self {
    StreamStabilizer {
      detector,
      window: StabilizationWindow::new(),
    }
  }

  pub fn window(&self) -> &StabilizationWindow {
    &self.window
  }

  pub fn detector(&self) -> &Arc<DetectorInstance> {
    &self.detector
  }

  /// 人脸增强必开，结果经窗口平滑与置信门限
  pub fn classify_stream_image(&mut self, image: &RgbImage) -> Result<CanonicalResult, DetectError> {
    let prediction = self.detector.predict(image, true)?;
    let latest = WindowEntry {
      class_index: prediction.class_index,
      raw_confidence: prediction.confidence,
    };
    self.window.push(latest);

    let entry = self.window.smoothed().unwrap_or(latest);
    let normalized = self.detector.normalize(entry.class_index)?;
    let result = apply_gate(CanonicalResult::new(
      normalized.outcome,
      entry.raw_confidence,
      self.detector.display_name(),
    ));

    debug!(
      "窗口 {} 条, 原始 {} {:.4}, 平滑后 {} {:.4}",
      self.window.len(),
      latest.class_index,
      latest.raw_confidence,
      entry.class_index,
      entry.raw_confidence
    );
    Ok(result)
  }

  pub fn classify_stream_frame(&mut self, bytes: &[u8]) -> Result<CanonicalResult, DetectError> {
    let image = decode_image(bytes)?;
    self.classify_stream_image(&image)
  }

  /// 批量帧：逐帧走与摄像头相同的路径，再对各帧结论做多数投票
  ///
  /// 输入中的每一项对应一帧；读取或解码阶段已失败的帧以 `Err` 传入，
  /// 与分类失败的帧一起计入 `failed_frames`。全部失败时返回
  /// [`DetectError::NoFramesProcessed`]。
  pub fn classify_batch<I, B>(&mut self, frames: I) -> Result<BatchResult, DetectError>
  where
    I: IntoIterator<Item = Result<B, DetectError>>,
    B: AsRef<[u8]>,
  {
    self.detector.ensure_loaded()?;

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for (frame_index, frame) in frames.into_iter().enumerate() {
      match frame.and_then(|bytes| self.classify_stream_frame(bytes.as_ref())) {
        Ok(result) => results.push(BatchFrame {
          frame_index,
          result,
        }),
        Err(e) => {
          warn!("批量第 {} 帧处理失败: {}", frame_index, e);
          failures.push(BatchFailure::new(frame_index, &e));
        }
      }
    }

    let verdicts: Vec<CanonicalResult> = results.iter().map(|f| f.result.clone()).collect();
    let aggregate = aggregate_verdicts(&verdicts, failures.len())?;
    info!(
      "批量结论: {} ({}/{} 帧伪造, {} 帧失败, {:.2}%)",
      if aggregate.is_fake { "FAKE" } else { "REAL" },
      aggregate.fake_frame_count,
      aggregate.processed_frames,
      aggregate.failed_frames,
      aggregate.confidence_percent
    );
    Ok(BatchResult {
      frames: results,
      failures,
      aggregate,
    })
  }
}

/// 对各帧结论做多数投票，置信度为 `vote_ratio × 平均置信度`
pub fn aggregate_verdicts(
  results: &[CanonicalResult],
  failed_frames: usize,
) -> Result<BatchAggregate, DetectError> {
  let processed = results.len();
  if processed == 0 {
    return Err(DetectError::NoFramesProcessed);
  }

  let fake = results.iter().filter(|r| r.is_fake).count();
  let real = processed - fake;
  let mean = results.iter().map(|r| r.confidence_percent).sum::<f64>() / processed as f64;
  let vote_ratio = fake.max(real) as f64 / processed as f64;

  Ok(BatchAggregate {
    is_fake: fake > real,
    confidence_percent: (vote_ratio * mean).clamp(0.0, 100.0),
    processed_frames: processed,
    failed_frames,
    fake_frame_count: fake,
    real_frame_count: real,
  })
}

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("会话不存在: {0}")]
  UnknownSession(String),
  #[error("会话 {0} 的工作线程已退出")]
  WorkerGone(String),
  #[error("无法启动会话线程: {0}")]
  Spawn(#[from] std::io::Error),
  #[error(transparent)]
  Detect(#[from] DetectError),
}

enum StreamRequest {
  Bytes(Vec<u8>),
  Image(RgbImage),
}

type Reply = Sender<Result<CanonicalResult, DetectError>>;

struct SessionHandle {
  sender: Sender<(StreamRequest, Reply)>,
  worker: JoinHandle<()>,
}

fn run_session(id: String, mut stabilizer: StreamStabilizer, rx: Receiver<(StreamRequest, Reply)>) {
  debug!("会话 {} 开始", id);
  for (request, reply) in rx {
    let result = match request {
      StreamRequest::Bytes(bytes) => stabilizer.classify_stream_frame(&bytes),
      StreamRequest::Image(image) => stabilizer.classify_stream_image(&image),
    };
    if reply.send(result).is_err() {
      debug!("会话 {} 的调用方已放弃请求", id);
    }
  }
  debug!("会话 {} 结束", id);
}

/// 按会话 ID 管理平滑器
///
/// 同一后端的不同会话共享模型权重，但各自拥有窗口和工作线程。
pub struct SessionHub {
  registry: Arc<DetectorRegistry>,
  sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionHub {
  pub fn new(registry: Arc<DetectorRegistry>) -> Self {
    SessionHub {
      registry,
      sessions: Mutex::new(HashMap::new()),
    }
  }

  /// 打开会话并加载后端权重；加载失败时不创建会话。已存在的会话保持不变
  pub fn open(&self, session_id: &str, backend_key: &str) -> Result<(), SessionError> {
    let mut sessions = self
      .sessions
      .lock()
      .map_err(|_| SessionError::WorkerGone(session_id.to_string()))?;
    if sessions.contains_key(session_id) {
      warn!("会话 {} 已存在", session_id);
      return Ok(());
    }

    let detector = self.registry.get_or_create(backend_key)?;
    detector.ensure_loaded()?;
    info!("打开会话 {}, 后端 {}", session_id, detector.descriptor().key);

    let (sender, rx) = mpsc::channel();
    let id = session_id.to_string();
    let stabilizer = StreamStabilizer::new(detector);
    let worker = std::thread::Builder::new()
      .name(format!("stream-{}", session_id))
      .spawn(move || run_session(id, stabilizer, rx))?;

    sessions.insert(session_id.to_string(), SessionHandle { sender, worker });
    Ok(())
  }

  fn request(&self, session_id: &str, request: StreamRequest) -> Result<CanonicalResult, SessionError> {
    let sender = {
      let sessions = self
        .sessions
        .lock()
        .map_err(|_| SessionError::WorkerGone(session_id.to_string()))?;
      sessions
        .get(session_id)
        .map(|h| h.sender.clone())
        .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?
    };

    let (reply, response) = mpsc::channel();
    sender
      .send((request, reply))
      .map_err(|_| SessionError::WorkerGone(session_id.to_string()))?;
    let result = response
      .recv()
      .map_err(|_| SessionError::WorkerGone(session_id.to_string()))?;
    Ok(result?)
  }

  /// 提交一帧编码图像，等待该会话的平滑结果
  pub fn submit(&self, session_id: &str, bytes: Vec<u8>) -> Result<CanonicalResult, SessionError> {
    self.request(session_id, StreamRequest::Bytes(bytes))
  }

  pub fn submit_image(&self, session_id: &str, image: RgbImage) -> Result<CanonicalResult, SessionError> {
    self.request(session_id, StreamRequest::Image(image))
  }

  /// 关闭会话并等待工作线程退出
  pub fn close(&self, session_id: &str) -> bool {
    let handle = match self.sessions.lock() {
      Ok(mut sessions) => sessions.remove(session_id),
      Err(_) => None,
    };
    match handle {
      Some(SessionHandle { sender, worker }) => {
        drop(sender);
        if worker.join().is_err() {
          warn!("会话 {} 的工作线程异常退出", session_id);
        }
        info!("关闭会话 {}", session_id);
        true
      }
      None => false,
    }
  }

  pub fn session_count(&self) -> usize {
    self.sessions.lock().map(|s| s.len()).unwrap_or(0)
  }

  pub fn close_all(&self) {
    let ids: Vec<String> = self
      .sessions
      .lock()
      .map(|s| s.keys().cloned().collect())
      .unwrap_or_default();
    for id in ids {
      self.close(&id);
    }
  }
}

impl Drop for SessionHub {
  fn drop(&mut self) {
    self.close_all();
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use image::{DynamicImage, ImageFormat, Rgb};

  use super::*;
  use crate::backend::BackendCatalog;
  use crate::detector::testing::*;
  use crate::face::FacePreprocessor;
  use crate::model::{Classifier, ClassifierLoader, InferenceError, ModelLoadError};

  fn entry(class_index: usize, raw_confidence: f64) -> WindowEntry {
    WindowEntry {
      class_index,
      raw_confidence,
    }
  }

  fn verdict(is_fake: bool, confidence_percent: f64) -> CanonicalResult {
    CanonicalResult {
      is_fake,
      confidence_percent,
      model_used: "m",
    }
  }

  /// 红色通道 > 128 判为类别 0，置信度取绿色通道 / 100
  struct PixelKeyed;

  impl Classifier for PixelKeyed {
    fn logits(&self, image: &RgbImage) -> Result<Vec<f32>, InferenceError> {
      let Rgb([r, g, _]) = *image.get_pixel(0, 0);
      let class = if r > 128 { 0 } else { 1 };
      Ok(logits_for(class, g as f64 / 100.0))
    }
  }

  struct PixelKeyedLoader;

  impl ClassifierLoader for PixelKeyedLoader {
    fn load(
      &self,
      _descriptor: &crate::backend::BackendDescriptor,
    ) -> Result<Arc<dyn Classifier>, ModelLoadError> {
      Ok(Arc::new(PixelKeyed))
    }
  }

  /// 类别 0（dima806 下为 Fake）或类别 1，置信度百分比为 `pct`
  fn pixel(class: usize, pct: u8) -> RgbImage {
    let r = if class == 0 { 255 } else { 0 };
    RgbImage::from_pixel(2, 2, Rgb([r, pct, 0]))
  }

  fn png(image: &RgbImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image.clone())
      .write_to(&mut buf, ImageFormat::Png)
      .unwrap();
    buf.into_inner()
  }

  fn registry() -> Arc<DetectorRegistry> {
    Arc::new(DetectorRegistry::init(
      BackendCatalog::builtin(),
      Arc::new(PixelKeyedLoader),
      FacePreprocessor::disabled(),
    ))
  }

  fn stabilizer() -> StreamStabilizer {
    StreamStabilizer::new(registry().get_or_create("dima806").unwrap())
  }

  #[test]
  fn gate_flips_low_confidence() {
    let r = apply_gate(verdict(true, 65.0));
    assert!(!r.is_fake);
    assert!((r.confidence_percent - 35.0).abs() < 1e-9);

    let r = apply_gate(verdict(true, 70.0));
    assert!(r.is_fake);
    assert_eq!(r.confidence_percent, 70.0);
  }

  #[test]
  fn window_evicts_oldest() {
    let mut w = StabilizationWindow::new();
    for i in 0..5 {
      w.push(entry(i, 0.5));
    }
    w.push(entry(9, 0.9));
    assert_eq!(w.len(), WINDOW_CAPACITY);
    assert!(w.entries().all(|e| e.class_index != 0));
    assert_eq!(w.entries().last().unwrap().class_index, 9);
  }

  #[test]
  fn evicted_entries_no_longer_vote() {
    let mut w = StabilizationWindow::new();
    for e in [
      entry(0, 0.6),
      entry(0, 0.7),
      entry(0, 0.8),
      entry(1, 0.9),
      entry(1, 0.9),
    ] {
      w.push(e);
    }
    assert_eq!(w.smoothed().unwrap().class_index, 0);

    // the first class-0 entry drops out, class 1 now holds the majority
    w.push(entry(1, 0.6));
    let s = w.smoothed().unwrap();
    assert_eq!(s.class_index, 1);
    assert!((s.raw_confidence - 0.8).abs() < 1e-12);

    // once the early class-0 entries are gone only the new ones count toward the mean
    w.push(entry(0, 0.9));
    w.push(entry(0, 0.9));
    let s = w.smoothed().unwrap();
    assert_eq!(s.class_index, 1);
    w.push(entry(0, 0.9));
    let s = w.smoothed().unwrap();
    assert_eq!(s.class_index, 0);
    assert!((s.raw_confidence - 0.9).abs() < 1e-12);
  }

  #[test]
  fn smoothing_needs_three_entries() {
    let mut w = StabilizationWindow::new();
    w.push(entry(0, 0.9));
    w.push(entry(1, 0.8));
    assert_eq!(w.smoothed(), None);
    w.push(entry(0, 0.7));
    let s = w.smoothed().unwrap();
    assert_eq!(s.class_index, 0);
    assert!((s.raw_confidence - 0.8).abs() < 1e-12);
  }

  #[test]
  fn mode_tie_goes_to_first_seen_class() {
    let mut w = StabilizationWindow::new();
    for e in [entry(1, 0.6), entry(0, 0.9), entry(0, 0.9), entry(1, 0.8)] {
      w.push(e);
    }
    let s = w.smoothed().unwrap();
    assert_eq!(s.class_index, 1);
    assert!((s.raw_confidence - 0.7).abs() < 1e-12);
  }

  #[test]
  fn early_frames_report_raw_result() {
    let mut s = stabilizer();
    let r = s.classify_stream_image(&pixel(0, 90)).unwrap();
    assert!(r.is_fake);
    assert!((r.confidence_percent - 90.0).abs() < 1e-3);

    let r = s.classify_stream_image(&pixel(1, 80)).unwrap();
    assert!(!r.is_fake);
    assert!((r.confidence_percent - 80.0).abs() < 1e-3);
  }

  #[test]
  fn smoothing_outvotes_a_single_outlier() {
    let mut s = stabilizer();
    s.classify_stream_image(&pixel(0, 90)).unwrap();
    s.classify_stream_image(&pixel(0, 80)).unwrap();
    let r = s.classify_stream_image(&pixel(1, 99)).unwrap();
    assert!(r.is_fake);
    assert!((r.confidence_percent - 85.0).abs() < 1e-3);
  }

  #[test]
  fn smoothed_low_confidence_is_gated() {
    let mut s = stabilizer();
    for pct in [60, 70, 65] {
      s.classify_stream_image(&pixel(0, pct)).unwrap();
    }
    let r = s.classify_stream_image(&pixel(0, 65)).unwrap();
    // mean of 60, 70, 65, 65
    assert!(!r.is_fake);
    assert!((r.confidence_percent - 35.0).abs() < 1e-3);
  }

  /// 记录收到的每帧尺寸
  #[derive(Default)]
  struct SizeRecorder(Mutex<Vec<(u32, u32)>>);

  impl Classifier for SizeRecorder {
    fn logits(&self, image: &RgbImage) -> Result<Vec<f32>, InferenceError> {
      self.0.lock().unwrap().push(image.dimensions());
      Ok(logits_for(1, 0.9))
    }
  }

  struct SharedLoader(Arc<SizeRecorder>);

  impl ClassifierLoader for SharedLoader {
    fn load(
      &self,
      _descriptor: &crate::backend::BackendDescriptor,
    ) -> Result<Arc<dyn Classifier>, ModelLoadError> {
      Ok(self.0.clone())
    }
  }

  #[test]
  fn stream_frames_are_always_face_enhanced() {
    use crate::face::{FaceBox, tests::FixedFaces};

    let recorder = Arc::new(SizeRecorder::default());
    let face = FacePreprocessor::new(Arc::new(FixedFaces(vec![FaceBox::new(10, 10, 10, 10)])));
    let registry = DetectorRegistry::init(
      BackendCatalog::builtin(),
      Arc::new(SharedLoader(recorder.clone())),
      face,
    );
    let detector = registry.get_or_create("deep-fake-v2").unwrap();

    let mut s = StreamStabilizer::new(detector.clone());
    s.classify_stream_image(&RgbImage::new(40, 40)).unwrap();
    s.classify_stream_frame(&png(&RgbImage::new(40, 40))).unwrap();
    // single-image path without enhancement sees the full frame
    detector.classify(&RgbImage::new(40, 40), false).unwrap();

    // 10x10 face padded by 3 px on each side
    assert_eq!(*recorder.0.lock().unwrap(), vec![(16, 16), (16, 16), (40, 40)]);
  }

  #[test]
  fn stream_frames_are_decoded() {
    let mut s = stabilizer();
    let r = s.classify_stream_frame(&png(&pixel(0, 95))).unwrap();
    assert!(r.is_fake);
    assert!(s.classify_stream_frame(b"garbage").is_err());
    assert_eq!(s.window().len(), 1);
  }

  #[test]
  fn batch_tie_is_real() {
    let agg = aggregate_verdicts(&[verdict(true, 90.0), verdict(false, 80.0)], 0).unwrap();
    assert!(!agg.is_fake);
    assert!((agg.confidence_percent - 42.5).abs() < 1e-9);
    assert!(matches!(
      aggregate_verdicts(&[], 3),
      Err(DetectError::NoFramesProcessed)
    ));
  }

  #[test]
  fn batch_skips_undecodable_frames() {
    let mut s = stabilizer();
    let frames = vec![png(&pixel(0, 95)), b"nope".to_vec(), png(&pixel(0, 90))];
    let batch = s.classify_batch(frames.into_iter().map(Ok)).unwrap();
    assert_eq!(batch.frames.len(), 2);
    assert_eq!(batch.aggregate.failed_frames, 1);
    assert!(batch.aggregate.is_fake);
    assert_eq!(batch.failures[0].frame_index, 1);
    assert_eq!(batch.failures[0].error, "decode_error");
  }

  #[test]
  fn batch_counts_frames_that_failed_before_classification() {
    let mut s = stabilizer();
    let frames: Vec<Result<Vec<u8>, DetectError>> = vec![
      Err(DetectError::decode("bad base64")),
      Ok(png(&pixel(1, 90))),
      Err(DetectError::NotFound("missing.png".into())),
      Ok(png(&pixel(1, 80))),
    ];
    let batch = s.classify_batch(frames).unwrap();
    assert_eq!(batch.aggregate.processed_frames, 2);
    assert_eq!(batch.aggregate.failed_frames, 2);
    let indices: Vec<usize> = batch.frames.iter().map(|f| f.frame_index).collect();
    assert_eq!(indices, vec![1, 3]);
    let failed: Vec<(usize, &str)> = batch
      .failures
      .iter()
      .map(|f| (f.frame_index, f.error))
      .collect();
    assert_eq!(failed, vec![(0, "decode_error"), (2, "not_found")]);
    // frames that failed upstream never enter the window
    assert_eq!(s.window().len(), 2);
  }

  #[test]
  fn batch_of_only_failures_is_no_frames_processed() {
    let mut s = stabilizer();
    let frames: Vec<Result<&[u8], DetectError>> = vec![Err(DetectError::decode("x"))];
    assert!(matches!(
      s.classify_batch(frames),
      Err(DetectError::NoFramesProcessed)
    ));
  }

  #[test]
  fn sessions_do_not_share_windows() {
    let hub = SessionHub::new(registry());
    hub.open("a", "dima806").unwrap();
    hub.open("b", "dima806").unwrap();
    assert_eq!(hub.session_count(), 2);

    for _ in 0..3 {
      assert!(hub.submit_image("a", pixel(0, 90)).unwrap().is_fake);
    }
    let r = hub.submit_image("b", pixel(1, 88)).unwrap();
    assert!(!r.is_fake);
    assert!((r.confidence_percent - 88.0).abs() < 1e-3);

    let r = hub.submit("a", png(&pixel(1, 95))).unwrap();
    assert!(r.is_fake);

    assert!(hub.close("a"));
    assert!(!hub.close("a"));
    assert!(matches!(
      hub.submit_image("a", pixel(0, 90)),
      Err(SessionError::UnknownSession(_))
    ));
  }

  #[test]
  fn open_fails_when_weights_cannot_load() {
    let loader = Arc::new(StaticLoader::failing());
    let registry = Arc::new(DetectorRegistry::init(
      BackendCatalog::builtin(),
      loader.clone(),
      FacePreprocessor::disabled(),
    ));
    let hub = SessionHub::new(registry);
    let err = hub.open("cam", "dima806").unwrap_err();
    assert!(matches!(
      err,
      SessionError::Detect(DetectError::ModelLoadFailure(_))
    ));
    assert_eq!(hub.session_count(), 0);
    assert_eq!(loader.load_count(), 1);
  }

  #[test]
  fn session_errors_are_returned_to_caller() {
    let hub = SessionHub::new(registry());
    hub.open("cam", "deep-fake-v2").unwrap();
    let err = hub.submit("cam", b"not an image".to_vec()).unwrap_err();
    assert!(matches!(err, SessionError::Detect(DetectError::DecodeError(_))));
    // the worker survives a failed frame
    assert!(hub.submit_image("cam", pixel(1, 90)).is_ok());
  }
}

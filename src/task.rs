// 该文件是 Jianzhen （鉴真） 项目的一部分。
// src/task.rs - 任务驱动
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

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::{thread, time::Duration};

use tracing::{error, info, warn};

use crate::{
  detector::DetectorInstance,
  error::DetectError,
  output::Report,
  report::{DetectionReport, ErrorReport},
  stream::{SessionError, SessionHub, StreamStabilizer},
  video::{VideoSource, aggregate},
};

pub trait Task<I, O>: Sized {
  type Error;
  fn run_task(self, input: I, output: O) -> Result<(), Self::Error>;
}

fn report_failure<O>(output: &O, err: &DetectError, source: Option<String>) -> anyhow::Result<()>
where
  O: Report,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  error!("{}", err);
  output.report(&ErrorReport::new(err, source), None)?;
  Ok(())
}

/// 逐个分类图像文件，每个文件一条报告
pub struct OneShotTask {
  detector: Arc<DetectorInstance>,
  enhance: bool,
}

impl OneShotTask {
  pub fn new(detector: Arc<DetectorInstance>) -> Self {
    OneShotTask {
      detector,
      enhance: true,
    }
  }

  pub fn with_enhance(mut self, enhance: bool) -> Self {
    self.enhance = enhance;
    self
  }
}

impl<I, O> Task<I, O> for OneShotTask
where
  I: IntoIterator<Item = PathBuf>,
  O: Report,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut failures = 0usize;
    for path in input {
      let source = path.display().to_string();
      let now = std::time::Instant::now();
      match self.detector.classify_path(&path, self.enhance) {
        Ok(result) => {
          info!("{} 推理完成，耗时: {:.2?}", source, now.elapsed());
          output.report(&DetectionReport::image(source, &result), None)?;
        }
        Err(e) => {
          failures += 1;
          report_failure(&output, &e, Some(source))?;
        }
      }
    }

    if failures > 0 {
      anyhow::bail!("{} 个输入处理失败", failures);
    }
    info!("任务完成，退出");
    Ok(())
  }
}

/// 视频采样聚合
pub struct VideoTask {
  detector: Arc<DetectorInstance>,
  target_fps: f64,
}

impl VideoTask {
  pub fn new(detector: Arc<DetectorInstance>, target_fps: f64) -> Self {
    VideoTask {
      detector,
      target_fps,
    }
  }
}

impl<V, O> Task<(String, V), O> for VideoTask
where
  V: VideoSource,
  O: Report,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, (source, mut video): (String, V), output: O) -> Result<(), Self::Error> {
    info!("开始处理视频 {}", source);
    let now = std::time::Instant::now();
    match aggregate(&self.detector, &mut video, self.target_fps) {
      Ok((result, details)) => {
        info!("视频处理完成，耗时: {:.2?}", now.elapsed());
        output.report(&DetectionReport::video(source, &result, details), None)?;
        Ok(())
      }
      Err(e) => {
        report_failure(&output, &e, Some(source))?;
        Err(e.into())
      }
    }
  }
}

/// 摄像头等连续输入，经会话平滑后逐帧报告
///
/// 后端权重在读取第一帧之前加载，加载失败时报告错误并中止；
/// 单帧失败写入一条错误报告后继续。设置 [`ContinuousTask::with_ctrlc`] 后收到 Ctrl-C 时退出。
pub struct ContinuousTask {
  hub: Arc<SessionHub>,
  session: String,
  backend_key: String,
  frame_number: Option<usize>,
  interrupt: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn new(hub: Arc<SessionHub>, session: impl Into<String>, backend_key: impl Into<String>) -> Self {
    ContinuousTask {
      hub,
      session: session.into(),
      backend_key: backend_key.into(),
      frame_number: None,
      interrupt: None,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 安装 Ctrl-C 处理：收到信号后结束循环，30 秒内未退出则强制结束进程
  pub fn with_ctrlc(mut self) -> Result<Self, ctrlc::Error> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    self.interrupt = Some(rx);
    Ok(self)
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }
}

impl<V, O> Task<V, O> for ContinuousTask
where
  V: VideoSource,
  O: Report,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: V, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");

    match self.hub.open(&self.session, &self.backend_key) {
      Ok(()) => {}
      Err(SessionError::Detect(e)) => {
        report_failure(&output, &e, Some(self.session.clone()))?;
        return Err(e.into());
      }
      Err(e) => return Err(e.into()),
    }

    let result = self.run_frames(&mut input, &output);
    self.hub.close(&self.session);
    info!("任务完成，退出");
    result
  }
}

impl ContinuousTask {
  fn run_frames<V, O>(&self, input: &mut V, output: &O) -> anyhow::Result<()>
  where
    V: VideoSource,
    O: Report,
    O::Error: std::error::Error + Sync + Send + 'static,
  {
    let mut frame_index: usize = 0;
    let mut now = std::time::Instant::now();
    while let Some(frame) = input.next_frame() {
      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          warn!("读取帧失败: {}", e);
          break;
        }
      };
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧图像", frame_index);

      match self.hub.submit_image(&self.session, frame.clone()) {
        Ok(result) => {
          let elapsed_a = now.elapsed();
          let report = DetectionReport::camera(&self.session, frame_index as u64, &result);
          output.report(&report, Some(&frame))?;
          info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, now.elapsed());
        }
        Err(SessionError::Detect(e)) => {
          report_failure(output, &e, Some(format!("{}#{}", self.session, frame_index)))?;
          if matches!(e, DetectError::ModelLoadFailure(_)) {
            return Err(e.into());
          }
        }
        Err(e) => return Err(e.into()),
      }
      now = std::time::Instant::now();

      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }
    Ok(())
  }
}

/// 批量帧：一个新窗口走完所有帧，再给出聚合结论
///
/// 输入按帧顺序给出；已在读取阶段失败的帧以 `Err` 传入，计入失败帧。
pub struct BatchTask {
  detector: Arc<DetectorInstance>,
}

impl BatchTask {
  pub fn new(detector: Arc<DetectorInstance>) -> Self {
    BatchTask { detector }
  }
}

impl<I, O> Task<I, O> for BatchTask
where
  I: IntoIterator<Item = Result<Vec<u8>, DetectError>>,
  O: Report,
  O::Error: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, output: O) -> Result<(), Self::Error> {
    info!("开始批量任务...");
    let model_used = self.detector.display_name();
    let mut stabilizer = StreamStabilizer::new(self.detector);
    match stabilizer.classify_batch(input) {
      Ok(result) => {
        output.report(&DetectionReport::batch(model_used, result), None)?;
        Ok(())
      }
      Err(e) => {
        report_failure(&output, &e, None)?;
        Err(e.into())
      }
    }
  }
}

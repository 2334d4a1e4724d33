// 该文件是 Beifeng （北风） 项目的一部分。
// src/task.rs - 检测节点与任务循环
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

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use std::thread;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::RgbFrame,
  limiter::CaptureRateLimiter,
  model::Model,
  output::{NullOutput, Publish, Render, StorageError, TargetStore, draw::{Annotate, Draw}},
  phase::PhaseState,
  processor::{FrameOutcome, FrameProcessor},
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 一帧中某个出口的失败，不影响同一帧其它出口
#[derive(Error, Debug)]
pub enum DeliveryFailure {
  #[error("消息发布失败: {0}")]
  Publish(#[source] BoxError),
  #[error("目标图像保存失败: {0}")]
  Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum NodeError {
  #[error("模型推理失败: {0}")]
  Model(#[source] BoxError),
  /// 本帧已处理完毕，但有出口失败；处理结果仍然有效
  #[error("{} 个输出失败: {}", .failures.len(), join_failures(.failures))]
  Delivery {
    outcome: Box<FrameOutcome>,
    failures: Vec<DeliveryFailure>,
  },
}

fn join_failures(failures: &[DeliveryFailure]) -> String {
  failures
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

/// 把模型、决策流程、阶段状态、限速器与各个出口组合成一个处理节点
pub struct DetectorNode<M, P, R = NullOutput, A = Draw> {
  model: M,
  processor: FrameProcessor<A>,
  phase: Arc<PhaseState>,
  limiter: CaptureRateLimiter,
  publisher: P,
  store: TargetStore,
  preview: R,
}

impl<M, P, A> DetectorNode<M, P, NullOutput, A> {
  pub fn new(
    model: M,
    processor: FrameProcessor<A>,
    phase: Arc<PhaseState>,
    limiter: CaptureRateLimiter,
    publisher: P,
    store: TargetStore,
  ) -> Self {
    Self {
      model,
      processor,
      phase,
      limiter,
      publisher,
      store,
      preview: NullOutput,
    }
  }
}

impl<M, P, R, A> DetectorNode<M, P, R, A> {
  pub fn with_preview<R2>(self, preview: R2) -> DetectorNode<M, P, R2, A> {
    DetectorNode {
      model: self.model,
      processor: self.processor,
      phase: self.phase,
      limiter: self.limiter,
      publisher: self.publisher,
      store: self.store,
      preview,
    }
  }

  pub fn phase_state(&self) -> &Arc<PhaseState> {
    &self.phase
  }

  pub fn publisher(&self) -> &P {
    &self.publisher
  }

  pub fn into_publisher(self) -> P {
    self.publisher
  }
}

impl<M, P, R, A> DetectorNode<M, P, R, A>
where
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  P: Publish,
  P::Error: std::error::Error + Send + Sync + 'static,
  R: Render,
  R::Error: std::fmt::Display,
  A: Annotate,
{
  pub fn handle_frame(&self, frame: &RgbFrame) -> Result<FrameOutcome, NodeError> {
    self.handle_frame_at(frame, Instant::now(), Utc::now())
  }

  /// 处理一帧：推理、按阶段决策、发布、抓拍落盘、预览。
  ///
  /// 各出口互不影响：发布或落盘失败后仍继续其余输出，
  /// 全部失败以 `NodeError::Delivery` 返回，其中带着本帧完整的处理结果。
  pub fn handle_frame_at(
    &self,
    frame: &RgbFrame,
    now: Instant,
    stamp: DateTime<Utc>,
  ) -> Result<FrameOutcome, NodeError> {
    let raw = self
      .model
      .infer(frame)
      .map_err(|e| NodeError::Model(Box::new(e)))?;
    let phase = self.phase.current();
    let outcome = self
      .processor
      .process(frame, &raw, &phase, &self.limiter, now);
    debug!(
      "阶段 {}: {} 个候选, {} 个检测结果",
      phase,
      raw.len(),
      outcome.detections.len()
    );

    let mut failures = Vec::new();
    for obstacle in &outcome.obstacles {
      if let Err(e) = self.publisher.publish_obstacle(obstacle) {
        failures.push(DeliveryFailure::Publish(Box::new(e)));
      }
    }

    if let Some(target) = &outcome.target {
      if let Err(e) = self.store.save(&target.image, stamp) {
        failures.push(DeliveryFailure::Storage(e));
      }
      if let Err(e) = self.publisher.publish_target(target, stamp) {
        failures.push(DeliveryFailure::Publish(Box::new(e)));
      }
    }

    if let Err(e) = self
      .preview
      .render_result(&outcome.annotated, &outcome.detections)
    {
      warn!("预览输出失败: {}", e);
    }

    if failures.is_empty() {
      Ok(outcome)
    } else {
      Err(NodeError::Delivery {
        outcome: Box::new(outcome),
        failures,
      })
    }
  }
}

pub trait Task<I, N>: Sized {
  type Error;
  fn run_task(self, input: I, node: &N) -> Result<(), Self::Error>;
}

/// 任务结束时的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskSummary {
  pub frames: usize,
  pub obstacles: usize,
  pub targets: usize,
  pub storage_failures: usize,
  pub publish_failures: usize,
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  interrupt: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 安装 Ctrl-C 处理器。收到信号后在当前帧结束时退出，30 秒后仍未退出则强制结束进程。
  pub fn interruptible(mut self) -> Result<Self, ctrlc::Error> {
    let (tx, rx) = std::sync::mpsc::channel();
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

  pub fn run<I, M, P, R, A>(
    self,
    input: I,
    node: &DetectorNode<M, P, R, A>,
  ) -> Result<TaskSummary, NodeError>
  where
    I: Iterator<Item = RgbFrame>,
    M: Model,
    M::Error: std::error::Error + Send + Sync + 'static,
    P: Publish,
    P::Error: std::error::Error + Send + Sync + 'static,
    R: Render,
    R::Error: std::fmt::Display,
    A: Annotate,
  {
    info!("开始任务...");
    let mut summary = TaskSummary::default();
    let mut now = Instant::now();

    for frame in input {
      summary.frames += 1;
      debug!("处理第 {} 帧图像", summary.frames);

      let outcome = match node.handle_frame(&frame) {
        Ok(outcome) => outcome,
        Err(NodeError::Delivery { outcome, failures }) => {
          for failure in &failures {
            error!("第 {} 帧: {}", summary.frames, failure);
            match failure {
              DeliveryFailure::Storage(_) => summary.storage_failures += 1,
              DeliveryFailure::Publish(_) => summary.publish_failures += 1,
            }
          }
          *outcome
        }
        Err(e) => return Err(e),
      };
      summary.obstacles += outcome.obstacles.len();
      summary.targets += usize::from(outcome.target.is_some());

      debug!("处理完成，耗时: {:.2?}", now.elapsed());
      now = Instant::now();

      if self.frame_number.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
      if self
        .interrupt
        .as_ref()
        .is_some_and(|rx| rx.try_recv().is_ok())
      {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!(
      "任务完成: {} 帧, {} 条障碍物消息, {} 张目标图像, {} 次保存失败, {} 次发布失败",
      summary.frames,
      summary.obstacles,
      summary.targets,
      summary.storage_failures,
      summary.publish_failures
    );
    Ok(summary)
  }
}

impl<I, M, P, R, A> Task<I, DetectorNode<M, P, R, A>> for ContinuousTask
where
  I: Iterator<Item = RgbFrame>,
  M: Model,
  M::Error: std::error::Error + Send + Sync + 'static,
  P: Publish,
  P::Error: std::error::Error + Send + Sync + 'static,
  R: Render,
  R::Error: std::fmt::Display,
  A: Annotate,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, node: &DetectorNode<M, P, R, A>) -> Result<(), Self::Error> {
    self.run(input, node)?;
    Ok(())
  }
}

// 该文件是 Beifeng （北风） 项目的一部分。
// src/processor.rs - 单帧决策流程
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

use std::time::Instant;

use serde::Serialize;

use crate::{
  detection::{Detection, DetectionFilter},
  frame::RgbFrame,
  limiter::CaptureRateLimiter,
  model::RawDetection,
  output::draw::{Annotate, Draw},
  phase::{Phase, PhaseAction, PhaseGate},
};

/// 障碍物消息，障碍物阶段下每个检测结果一条
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObstacleMessage {
  pub label: String,
  pub x: f64,
  pub y: f64,
}

impl From<&Detection> for ObstacleMessage {
  fn from(detection: &Detection) -> Self {
    Self {
      label: detection.label.clone(),
      x: detection.x_center,
      y: detection.y_center,
    }
  }
}

/// 目标图像消息，抓拍阶段下按限速产生
#[derive(Debug, Clone)]
pub struct TargetMessage {
  pub image: RgbFrame,
  pub captured_at: Instant,
}

/// 一帧的处理结果
#[derive(Debug, Clone)]
pub struct FrameOutcome {
  pub detections: Vec<Detection>,
  pub annotated: RgbFrame,
  pub obstacles: Vec<ObstacleMessage>,
  pub target: Option<TargetMessage>,
}

pub struct FrameProcessor<A = Draw> {
  filter: DetectionFilter,
  gate: PhaseGate,
  annotator: A,
}

impl<A: Annotate> FrameProcessor<A> {
  pub fn new(filter: DetectionFilter, gate: PhaseGate, annotator: A) -> Self {
    Self {
      filter,
      gate,
      annotator,
    }
  }

  pub fn filter(&self) -> &DetectionFilter {
    &self.filter
  }

  pub fn gate(&self) -> &PhaseGate {
    &self.gate
  }

  /// 过滤、按阶段生成消息、绘制标注，并在抓拍阶段询问限速器。
  ///
  /// 标注与阶段无关；限速器只在抓拍阶段被询问。
  pub fn process(
    &self,
    frame: &RgbFrame,
    raw: &[RawDetection],
    phase: &Phase,
    limiter: &CaptureRateLimiter,
    now: Instant,
  ) -> FrameOutcome {
    let detections = self.filter.filter(frame.width(), frame.height(), raw);
    let action = self.gate.action(phase);

    let obstacles = obstacle_messages(&detections, action);
    let annotated = self.annotate(frame, &detections);

    let target = (action == PhaseAction::CaptureTarget && limiter.due(now)).then(|| TargetMessage {
      image: annotated.clone(),
      captured_at: now,
    });

    FrameOutcome {
      detections,
      annotated,
      obstacles,
      target,
    }
  }

  pub fn annotate(&self, frame: &RgbFrame, detections: &[Detection]) -> RgbFrame {
    if detections.is_empty() {
      return frame.clone();
    }
    let mut image = frame.to_rgb_image();
    self.annotator.annotate(&mut image, detections);
    RgbFrame::from(image)
  }
}

pub fn obstacle_messages(detections: &[Detection], action: PhaseAction) -> Vec<ObstacleMessage> {
  match action {
    PhaseAction::ReportObstacles => detections.iter().map(ObstacleMessage::from).collect(),
    PhaseAction::CaptureTarget | PhaseAction::Idle => Vec::new(),
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  fn processor() -> FrameProcessor {
    FrameProcessor::new(
      DetectionFilter::default(),
      PhaseGate::default(),
      Draw::boxes_only(),
    )
  }

  fn raw() -> Vec<RawDetection> {
    vec![
      RawDetection::new("car", 0.5, [0.1, 0.1, 0.2, 0.2]),
      RawDetection::new("cone", 0.2, [0.3, 0.3, 0.4, 0.4]),
    ]
  }

  #[test]
  fn obstacle_phase_reports_centers() {
    let t0 = Instant::now();
    let limiter = CaptureRateLimiter::new(Duration::from_secs(1), t0);
    let frame = RgbFrame::with_shape(640, 480);

    let outcome = processor().process(&frame, &raw(), &"8".into(), &limiter, t0);
    assert_eq!(
      outcome.obstacles,
      vec![ObstacleMessage {
        label: "car".to_string(),
        x: 96.0,
        y: 72.0
      }]
    );
    assert!(outcome.target.is_none());
  }

  #[test]
  fn capture_phase_respects_limiter() {
    let t0 = Instant::now();
    let limiter = CaptureRateLimiter::new(Duration::from_secs(1), t0);
    let frame = RgbFrame::with_shape(64, 48);
    let p = processor();

    let first = p.process(&frame, &raw(), &"3".into(), &limiter, t0 + Duration::from_millis(500));
    assert!(first.target.is_none());
    assert!(first.obstacles.is_empty());

    let at = t0 + Duration::from_millis(1200);
    let second = p.process(&frame, &raw(), &"3".into(), &limiter, at);
    let target = second.target.expect("target due");
    assert_eq!(target.captured_at, at);
    assert_eq!(target.image, second.annotated);
  }

  #[test]
  fn unset_and_unknown_phases_emit_nothing() {
    let t0 = Instant::now();
    let limiter = CaptureRateLimiter::new(Duration::from_secs(1), t0);
    let frame = RgbFrame::with_shape(64, 48);
    let p = processor();

    for phase in [Phase::Unset, Phase::from("9")] {
      let outcome = p.process(&frame, &raw(), &phase, &limiter, t0 + Duration::from_secs(10));
      assert!(outcome.obstacles.is_empty());
      assert!(outcome.target.is_none());
      assert_eq!(outcome.detections.len(), 1);
    }
    // 非抓拍阶段没有消耗限速器
    assert!(limiter.due(t0 + Duration::from_secs(10)));
  }

  #[test]
  fn annotation_is_phase_independent() {
    let t0 = Instant::now();
    let limiter = CaptureRateLimiter::new(Duration::from_secs(1), t0);
    let frame = RgbFrame::with_shape(64, 48);
    let p = processor();

    let idle = p.process(&frame, &raw(), &Phase::Unset, &limiter, t0);
    let obstacle = p.process(&frame, &raw(), &"8".into(), &limiter, t0);
    assert_ne!(idle.annotated, frame);
    assert_eq!(idle.annotated, obstacle.annotated);
  }

  #[test]
  fn obstacle_messages_follow_filter_order() {
    let frame = RgbFrame::with_shape(100, 100);
    let raw = vec![
      RawDetection::new("b", 0.9, [0.5, 0.5, 0.7, 0.7]),
      RawDetection::new("a", 0.4, [0.0, 0.0, 0.2, 0.2]),
    ];
    let detections = DetectionFilter::default().filter(frame.width(), frame.height(), &raw);
    let messages = obstacle_messages(&detections, PhaseAction::ReportObstacles);
    let labels: Vec<_> = messages.iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, ["b", "a"]);
    assert!(obstacle_messages(&detections, PhaseAction::Idle).is_empty());
  }
}

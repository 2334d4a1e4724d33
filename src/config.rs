// 该文件是 Beifeng （北风） 项目的一部分。
// src/config.rs - 流水线配置
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
use std::time::Duration;

use thiserror::Error;

use crate::{
  detection::{DEFAULT_CONFIDENCE_THRESHOLD, DetectionFilter},
  limiter::DEFAULT_CAPTURE_INTERVAL,
  output::draw::Annotate,
  output::DEFAULT_CAPTURE_DIR,
  phase::{DEFAULT_CAPTURE_PHASE, DEFAULT_OBSTACLE_PHASE, PhaseGate},
  processor::FrameProcessor,
};

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值必须在 [0, 1] 之间: {0}")]
  InvalidThreshold(f32),
  #[error("抓拍间隔必须是正的有限秒数: {0}")]
  InvalidInterval(f64),
  #[error("阶段令牌不能为空")]
  EmptyPhaseToken,
  #[error("障碍物阶段与抓拍阶段不能相同: {0}")]
  SamePhaseTokens(String),
}

/// 单帧决策流程的全部可配置项
#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub confidence_threshold: f32,
  pub capture_interval: Duration,
  pub obstacle_phase: String,
  pub capture_phase: String,
  pub capture_dir: PathBuf,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      capture_interval: DEFAULT_CAPTURE_INTERVAL,
      obstacle_phase: DEFAULT_OBSTACLE_PHASE.to_string(),
      capture_phase: DEFAULT_CAPTURE_PHASE.to_string(),
      capture_dir: PathBuf::from(DEFAULT_CAPTURE_DIR),
    }
  }
}

impl PipelineConfig {
  pub fn new(
    confidence_threshold: f32,
    capture_interval_secs: f64,
    obstacle_phase: impl Into<String>,
    capture_phase: impl Into<String>,
    capture_dir: impl Into<PathBuf>,
  ) -> Result<Self, ConfigError> {
    if !capture_interval_secs.is_finite() || capture_interval_secs <= 0.0 {
      return Err(ConfigError::InvalidInterval(capture_interval_secs));
    }
    let capture_interval = Duration::try_from_secs_f64(capture_interval_secs)
      .map_err(|_| ConfigError::InvalidInterval(capture_interval_secs))?;

    let config = Self {
      confidence_threshold,
      capture_interval,
      obstacle_phase: obstacle_phase.into().trim().to_string(),
      capture_phase: capture_phase.into().trim().to_string(),
      capture_dir: capture_dir.into(),
    };
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ConfigError::InvalidThreshold(self.confidence_threshold));
    }
    if self.capture_interval.is_zero() {
      return Err(ConfigError::InvalidInterval(0.0));
    }
    if self.obstacle_phase.is_empty() || self.capture_phase.is_empty() {
      return Err(ConfigError::EmptyPhaseToken);
    }
    if self.obstacle_phase == self.capture_phase {
      return Err(ConfigError::SamePhaseTokens(self.obstacle_phase.clone()));
    }
    Ok(())
  }

  pub fn detection_filter(&self) -> DetectionFilter {
    DetectionFilter::new(self.confidence_threshold)
  }

  pub fn phase_gate(&self) -> PhaseGate {
    PhaseGate::new(&self.obstacle_phase, &self.capture_phase)
  }

  pub fn frame_processor<A: Annotate>(&self, annotator: A) -> FrameProcessor<A> {
    FrameProcessor::new(self.detection_filter(), self.phase_gate(), annotator)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_vehicle_setup() {
    let config = PipelineConfig::default();
    assert_eq!(config.confidence_threshold, 0.3);
    assert_eq!(config.capture_interval, Duration::from_secs(1));
    assert_eq!(config.obstacle_phase, "8");
    assert_eq!(config.capture_phase, "3");
    assert_eq!(config.capture_dir, PathBuf::from("target_capture"));
    assert!(config.validate().is_ok());
  }

  #[test]
  fn rejects_bad_values() {
    assert_eq!(
      PipelineConfig::new(1.5, 1.0, "8", "3", "x").unwrap_err(),
      ConfigError::InvalidThreshold(1.5)
    );
    assert!(matches!(
      PipelineConfig::new(f32::NAN, 1.0, "8", "3", "x"),
      Err(ConfigError::InvalidThreshold(_))
    ));
    assert_eq!(
      PipelineConfig::new(0.3, 0.0, "8", "3", "x").unwrap_err(),
      ConfigError::InvalidInterval(0.0)
    );
    assert!(matches!(
      PipelineConfig::new(0.3, f64::INFINITY, "8", "3", "x"),
      Err(ConfigError::InvalidInterval(_))
    ));
    assert_eq!(
      PipelineConfig::new(0.3, 1.0, " ", "3", "x").unwrap_err(),
      ConfigError::EmptyPhaseToken
    );
    assert_eq!(
      PipelineConfig::new(0.3, 1.0, "3", "3", "x").unwrap_err(),
      ConfigError::SamePhaseTokens("3".to_string())
    );
  }

  #[test]
  fn accepts_fractional_interval() {
    let config = PipelineConfig::new(0.5, 0.25, "8", "3", "captures").unwrap();
    assert_eq!(config.capture_interval, Duration::from_millis(250));
  }
}

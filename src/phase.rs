// 该文件是 Beifeng （北风） 项目的一部分。
// src/phase.rs - 车辆阶段状态
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

use std::sync::{Arc, PoisonError, RwLock};

pub const DEFAULT_OBSTACLE_PHASE: &str = "8";
pub const DEFAULT_CAPTURE_PHASE: &str = "3";

/// 车辆当前阶段。收到第一条阶段消息之前为 `Unset`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
  #[default]
  Unset,
  Token(Arc<str>),
}

impl Phase {
  pub fn token(&self) -> Option<&str> {
    match self {
      Phase::Unset => None,
      Phase::Token(token) => Some(token),
    }
  }
}

impl From<&str> for Phase {
  fn from(token: &str) -> Self {
    Phase::Token(Arc::from(token))
  }
}

impl From<String> for Phase {
  fn from(token: String) -> Self {
    Phase::Token(Arc::from(token))
  }
}

impl std::fmt::Display for Phase {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Phase::Unset => f.write_str("<unset>"),
      Phase::Token(token) => f.write_str(token),
    }
  }
}

/// 单槽阶段状态：整体替换，不保留历史。
///
/// 写入来自阶段消息监听线程，读取来自帧处理流程；
/// 读写都只持有锁完成一次克隆或赋值，读方不会看到写了一半的值。
#[derive(Debug, Default)]
pub struct PhaseState {
  current: RwLock<Phase>,
}

impl PhaseState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn update(&self, phase: impl Into<Phase>) {
    let phase = phase.into();
    *self.current.write().unwrap_or_else(PoisonError::into_inner) = phase;
  }

  pub fn current(&self) -> Phase {
    self
      .current
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}

/// 某一阶段下允许的输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseAction {
  ReportObstacles,
  CaptureTarget,
  Idle,
}

/// 阶段令牌到输出行为的映射，未识别的令牌与 `Unset` 都映射为 `Idle`
#[derive(Debug, Clone)]
pub struct PhaseGate {
  obstacle: String,
  capture: String,
}

impl Default for PhaseGate {
  fn default() -> Self {
    Self::new(DEFAULT_OBSTACLE_PHASE, DEFAULT_CAPTURE_PHASE)
  }
}

impl PhaseGate {
  pub fn new(obstacle: impl Into<String>, capture: impl Into<String>) -> Self {
    Self {
      obstacle: obstacle.into(),
      capture: capture.into(),
    }
  }

  pub fn action(&self, phase: &Phase) -> PhaseAction {
    match phase.token() {
      Some(token) if token == self.obstacle => PhaseAction::ReportObstacles,
      Some(token) if token == self.capture => PhaseAction::CaptureTarget,
      _ => PhaseAction::Idle,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn starts_unset() {
    let state = PhaseState::new();
    assert_eq!(state.current(), Phase::Unset);
    assert_eq!(PhaseGate::default().action(&state.current()), PhaseAction::Idle);
  }

  #[test]
  fn last_update_wins() {
    let state = PhaseState::new();
    state.update("3");
    state.update("8");
    assert_eq!(state.current(), Phase::from("8"));
  }

  #[test]
  fn gate_maps_tokens() {
    let gate = PhaseGate::default();
    assert_eq!(gate.action(&"8".into()), PhaseAction::ReportObstacles);
    assert_eq!(gate.action(&"3".into()), PhaseAction::CaptureTarget);
    assert_eq!(gate.action(&"9".into()), PhaseAction::Idle);
    assert_eq!(gate.action(&"".into()), PhaseAction::Idle);
  }

  #[test]
  fn concurrent_readers_see_whole_tokens() {
    let state = Arc::new(PhaseState::new());
    let tokens = ["alpha-phase", "b"];

    let writer = {
      let state = Arc::clone(&state);
      std::thread::spawn(move || {
        for i in 0..2000 {
          state.update(tokens[i % 2]);
        }
      })
    };

    for _ in 0..2000 {
      match state.current() {
        Phase::Unset => {}
        Phase::Token(token) => assert!(tokens.contains(&&*token)),
      }
    }
    writer.join().unwrap();
  }
}

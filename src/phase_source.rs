// 该文件是 Beifeng （北风） 项目的一部分。
// src/phase_source.rs - 车辆阶段消息来源
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

use std::io::BufRead;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, phase::PhaseState};

pub const PHASE_TOPIC: &str = "vehicle_phase";

#[derive(Error, Debug)]
pub enum PhaseSourceError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("固定阶段缺少令牌")]
  MissingToken,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[cfg(feature = "mqtt")]
  #[error("MQTT 错误: {0}")]
  MqttError(#[from] crate::mqtt::MqttError),
}

/// 解析阶段消息负载：裸令牌，或 `{"phase": "3"}` / `{"phase": 3}` 形式的 JSON。
/// 空负载与无法识别的 JSON 返回 `None`。
pub fn parse_phase_payload(payload: &[u8]) -> Option<String> {
  let text = std::str::from_utf8(payload).ok()?.trim();
  if text.is_empty() {
    return None;
  }

  if !text.starts_with('{') {
    return Some(text.to_string());
  }

  let value: serde_json::Value = serde_json::from_str(text).ok()?;
  match value.get("phase")? {
    serde_json::Value::String(token) if !token.trim().is_empty() => Some(token.trim().to_string()),
    serde_json::Value::Number(number) => Some(number_token(number)),
    _ => None,
  }
}

/// 整数值的浮点数按整数处理，`3.0` 与 `3` 得到同一个令牌
fn number_token(number: &serde_json::Number) -> String {
  match number.as_f64() {
    Some(value) if number.is_f64() && value.fract() == 0.0 && value.abs() < 1e15 => {
      format!("{}", value as i64)
    }
    _ => number.to_string(),
  }
}

fn apply_payload(state: &PhaseState, payload: &[u8]) {
  match parse_phase_payload(payload) {
    Some(token) => {
      info!("车辆阶段更新: {}", token);
      state.update(token);
    }
    None => warn!("忽略无法解析的阶段消息: {:?}", String::from_utf8_lossy(payload)),
  }
}

/// 阶段来源挂接到 `PhaseState` 后返回的句柄，持有后台线程或连接
pub enum PhaseListener {
  Fixed,
  Thread(JoinHandle<()>),
  #[cfg(feature = "mqtt")]
  Mqtt(crate::mqtt::MqttRuntime),
}

impl PhaseListener {
  /// 停止监听。标准输入线程阻塞在读取上，只能随进程结束。
  pub fn close(self) -> Result<(), PhaseSourceError> {
    match self {
      PhaseListener::Fixed | PhaseListener::Thread(_) => Ok(()),
      #[cfg(feature = "mqtt")]
      PhaseListener::Mqtt(runtime) => Ok(runtime.disconnect()?),
    }
  }
}

/// `stdin://`：每行一个阶段令牌
#[derive(Debug, Default)]
pub struct StdinPhaseSource;

impl FromUrlWithScheme for StdinPhaseSource {
  const SCHEME: &'static str = "stdin";
}

impl FromUrl for StdinPhaseSource {
  type Error = PhaseSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PhaseSourceError::SchemeMismatch);
    }
    Ok(StdinPhaseSource)
  }
}

impl StdinPhaseSource {
  pub fn attach(self, state: Arc<PhaseState>) -> Result<PhaseListener, PhaseSourceError> {
    let handle = std::thread::Builder::new()
      .name("phase-stdin".to_string())
      .spawn(move || read_phase_lines(std::io::stdin().lock(), &state))?;
    Ok(PhaseListener::Thread(handle))
  }
}

pub fn read_phase_lines(reader: impl BufRead, state: &PhaseState) {
  for line in reader.lines() {
    match line {
      Ok(line) => apply_payload(state, line.as_bytes()),
      Err(e) => {
        warn!("读取阶段输入失败: {}", e);
        break;
      }
    }
  }
  info!("阶段输入已结束，保持最后一个阶段");
}

/// `fixed://<token>`：启动时设置一次
#[derive(Debug)]
pub struct FixedPhaseSource {
  token: String,
}

impl FromUrlWithScheme for FixedPhaseSource {
  const SCHEME: &'static str = "fixed";
}

impl FromUrl for FixedPhaseSource {
  type Error = PhaseSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(PhaseSourceError::SchemeMismatch);
    }
    let token = url
      .host_str()
      .filter(|token| !token.is_empty())
      .map(str::to_string)
      .or_else(|| Some(url.path().trim_matches('/').to_string()).filter(|t| !t.is_empty()))
      .ok_or(PhaseSourceError::MissingToken)?;
    Ok(Self { token })
  }
}

impl FixedPhaseSource {
  pub fn attach(self, state: Arc<PhaseState>) -> Result<PhaseListener, PhaseSourceError> {
    info!("使用固定车辆阶段: {}", self.token);
    state.update(self.token);
    Ok(PhaseListener::Fixed)
  }
}

/// `mqtt://host:port/prefix`：订阅 `<prefix>/vehicle_phase`
#[cfg(feature = "mqtt")]
#[derive(Debug)]
pub struct MqttPhaseSource {
  endpoint: crate::mqtt::MqttEndpoint,
}

#[cfg(feature = "mqtt")]
impl FromUrl for MqttPhaseSource {
  type Error = PhaseSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(Self {
      endpoint: crate::mqtt::MqttEndpoint::from_url(url)?,
    })
  }
}

#[cfg(feature = "mqtt")]
impl MqttPhaseSource {
  pub fn attach(self, state: Arc<PhaseState>) -> Result<PhaseListener, PhaseSourceError> {
    let topic = self.endpoint.topic(PHASE_TOPIC);
    info!("订阅车辆阶段主题: {}", topic);
    let runtime =
      crate::mqtt::MqttRuntime::connect(&self.endpoint, "phase", vec![topic], move |_, payload| {
        apply_payload(&state, payload)
      });
    Ok(PhaseListener::Mqtt(runtime))
  }
}

pub enum PhaseSourceWrapper {
  Stdin(StdinPhaseSource),
  Fixed(FixedPhaseSource),
  #[cfg(feature = "mqtt")]
  Mqtt(MqttPhaseSource),
}

impl FromUrl for PhaseSourceWrapper {
  type Error = PhaseSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      StdinPhaseSource::SCHEME => Ok(PhaseSourceWrapper::Stdin(StdinPhaseSource::from_url(url)?)),
      FixedPhaseSource::SCHEME => Ok(PhaseSourceWrapper::Fixed(FixedPhaseSource::from_url(url)?)),
      #[cfg(feature = "mqtt")]
      crate::mqtt::MqttEndpoint::SCHEME => {
        Ok(PhaseSourceWrapper::Mqtt(MqttPhaseSource::from_url(url)?))
      }
      _ => Err(PhaseSourceError::SchemeMismatch),
    }
  }
}

impl PhaseSourceWrapper {
  pub fn attach(self, state: Arc<PhaseState>) -> Result<PhaseListener, PhaseSourceError> {
    match self {
      PhaseSourceWrapper::Stdin(source) => source.attach(state),
      PhaseSourceWrapper::Fixed(source) => source.attach(state),
      #[cfg(feature = "mqtt")]
      PhaseSourceWrapper::Mqtt(source) => source.attach(state),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::phase::Phase;

  #[test]
  fn parses_plain_and_json_payloads() {
    assert_eq!(parse_phase_payload(b"3\n").as_deref(), Some("3"));
    assert_eq!(parse_phase_payload(br#"{"phase":"8"}"#).as_deref(), Some("8"));
    assert_eq!(parse_phase_payload(br#"{"phase": 3}"#).as_deref(), Some("3"));
    assert_eq!(parse_phase_payload(br#"{"phase": 3.0}"#).as_deref(), Some("3"));
    assert_eq!(parse_phase_payload(br#"{"phase": -8.0}"#).as_deref(), Some("-8"));
    assert_eq!(parse_phase_payload(br#"{"phase": 3.5}"#).as_deref(), Some("3.5"));
    assert_eq!(parse_phase_payload(b"   "), None);
    assert_eq!(parse_phase_payload(br#"{"mode":"8"}"#), None);
    assert_eq!(parse_phase_payload(br#"{"phase":""}"#), None);
    assert_eq!(parse_phase_payload(&[0xFF, 0xFE]), None);
  }

  #[test]
  fn lines_update_state_and_skip_garbage() {
    let state = PhaseState::new();
    read_phase_lines("3\n\n{\"phase\":\"8\"}\n{broken\n".as_bytes(), &state);
    // `{broken` 不是合法 JSON，被忽略
    assert_eq!(state.current(), Phase::from("8"));
  }

  #[test]
  fn fixed_source_sets_phase_once() {
    let state = Arc::new(PhaseState::new());
    let source = PhaseSourceWrapper::from_url(&Url::parse("fixed://3").unwrap()).unwrap();
    source.attach(Arc::clone(&state)).unwrap();
    assert_eq!(state.current(), Phase::from("3"));
  }

  #[test]
  fn fixed_source_requires_token() {
    assert!(matches!(
      FixedPhaseSource::from_url(&Url::parse("fixed://").unwrap()),
      Err(PhaseSourceError::MissingToken)
    ));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    assert!(matches!(
      PhaseSourceWrapper::from_url(&Url::parse("udp://0.0.0.0:9000").unwrap()),
      Err(PhaseSourceError::SchemeMismatch)
    ));
  }
}

// 该文件是 Beifeng （北风） 项目的一部分。
// src/output.rs - 输出定义
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

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use crate::detection::Detection;
use crate::frame::RgbFrame;
use crate::processor::{ObstacleMessage, TargetMessage};
use crate::{FromUrl, FromUrlWithScheme};

pub const OBSTACLE_TOPIC: &str = "yolo_obstacle";
pub const TARGET_TOPIC: &str = "yolo_target";

/// 向下游发布障碍物与目标图像消息
pub trait Publish {
  type Error;
  fn publish_obstacle(&self, message: &ObstacleMessage) -> Result<(), Self::Error>;
  fn publish_target(
    &self,
    message: &TargetMessage,
    stamp: DateTime<Utc>,
  ) -> Result<(), Self::Error>;
}

/// 标注后帧的可视化出口
pub trait Render {
  type Error;
  fn render_result(&self, annotated: &RgbFrame, detections: &[Detection])
  -> Result<(), Self::Error>;
}

pub mod draw;

mod target_store;
pub use self::target_store::{DEFAULT_CAPTURE_DIR, StorageError, TargetStore};

mod json_lines;
pub use self::json_lines::{JsonLinesOutput, JsonLinesOutputError};

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[cfg(feature = "mqtt")]
mod mqtt_output;
#[cfg(feature = "mqtt")]
pub use self::mqtt_output::MqttOutput;

/// 丢弃所有消息
#[derive(Debug, Default)]
pub struct NullOutput;

impl FromUrlWithScheme for NullOutput {
  const SCHEME: &'static str = "null";
}

impl FromUrl for NullOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    Ok(NullOutput)
  }
}

impl Render for NullOutput {
  type Error = OutputError;

  fn render_result(
    &self,
    _annotated: &RgbFrame,
    _detections: &[Detection],
  ) -> Result<(), Self::Error> {
    Ok(())
  }
}

impl<R: Render> Render for Option<R> {
  type Error = R::Error;

  fn render_result(&self, annotated: &RgbFrame, detections: &[Detection])
  -> Result<(), Self::Error> {
    match self {
      Some(render) => render.render_result(annotated, detections),
      None => Ok(()),
    }
  }
}

impl Publish for NullOutput {
  type Error = OutputError;

  fn publish_obstacle(&self, _message: &ObstacleMessage) -> Result<(), Self::Error> {
    Ok(())
  }

  fn publish_target(
    &self,
    _message: &TargetMessage,
    _stamp: DateTime<Utc>,
  ) -> Result<(), Self::Error> {
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 行输出错误: {0}")]
  JsonLinesOutputError(#[from] JsonLinesOutputError),
  #[cfg(feature = "mqtt")]
  #[error("MQTT 输出错误: {0}")]
  MqttError(#[from] crate::mqtt::MqttError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  JsonLines(JsonLinesOutput),
  #[cfg(feature = "mqtt")]
  Mqtt(MqttOutput),
  Null(NullOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      JsonLinesOutput::STDOUT_SCHEME | JsonLinesOutput::SCHEME => {
        Ok(OutputWrapper::JsonLines(JsonLinesOutput::from_url(url)?))
      }
      #[cfg(feature = "mqtt")]
      crate::mqtt::MqttEndpoint::SCHEME => Ok(OutputWrapper::Mqtt(MqttOutput::from_url(url)?)),
      NullOutput::SCHEME => Ok(OutputWrapper::Null(NullOutput::from_url(url)?)),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl OutputWrapper {
  /// 结束输出，MQTT 输出会断开连接
  pub fn finish(self) -> Result<(), OutputError> {
    match self {
      OutputWrapper::JsonLines(_) | OutputWrapper::Null(_) => Ok(()),
      #[cfg(feature = "mqtt")]
      OutputWrapper::Mqtt(output) => output.finish().map_err(OutputError::from),
    }
  }
}

impl Publish for OutputWrapper {
  type Error = OutputError;

  fn publish_obstacle(&self, message: &ObstacleMessage) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonLines(output) => output
        .publish_obstacle(message)
        .map_err(OutputError::from),
      #[cfg(feature = "mqtt")]
      OutputWrapper::Mqtt(output) => output.publish_obstacle(message).map_err(OutputError::from),
      OutputWrapper::Null(output) => output.publish_obstacle(message),
    }
  }

  fn publish_target(
    &self,
    message: &TargetMessage,
    stamp: DateTime<Utc>,
  ) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::JsonLines(output) => output
        .publish_target(message, stamp)
        .map_err(OutputError::from),
      #[cfg(feature = "mqtt")]
      OutputWrapper::Mqtt(output) => output
        .publish_target(message, stamp)
        .map_err(OutputError::from),
      OutputWrapper::Null(output) => output.publish_target(message, stamp),
    }
  }
}

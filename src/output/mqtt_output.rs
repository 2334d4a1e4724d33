// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/mqtt_output.rs - MQTT 消息输出
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
use tracing::debug;
use url::Url;

use crate::{
  FromUrl,
  mqtt::{MqttEndpoint, MqttError, MqttRuntime},
  output::{OBSTACLE_TOPIC, Publish, TARGET_TOPIC},
  processor::{ObstacleMessage, TargetMessage},
};

/// 障碍物以 JSON 发往 `<prefix>/yolo_obstacle`，
/// 目标图像以 JPEG 原始字节发往 `<prefix>/yolo_target`
pub struct MqttOutput {
  runtime: MqttRuntime,
  obstacle_topic: String,
  target_topic: String,
}

impl FromUrl for MqttOutput {
  type Error = MqttError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let endpoint = MqttEndpoint::from_url(url)?;
    let runtime = MqttRuntime::connect(&endpoint, "publisher", Vec::new(), |topic, _| {
      debug!("忽略发布端收到的消息: {}", topic);
    });

    Ok(Self {
      runtime,
      obstacle_topic: endpoint.topic(OBSTACLE_TOPIC),
      target_topic: endpoint.topic(TARGET_TOPIC),
    })
  }
}

impl MqttOutput {
  /// 断开与代理的连接并等待事件循环退出
  pub fn finish(self) -> Result<(), MqttError> {
    self.runtime.disconnect()
  }
}

impl Publish for MqttOutput {
  type Error = MqttError;

  fn publish_obstacle(&self, message: &ObstacleMessage) -> Result<(), Self::Error> {
    let payload = serde_json::to_vec(message)?;
    self.runtime.publish(&self.obstacle_topic, payload)
  }

  fn publish_target(
    &self,
    message: &TargetMessage,
    stamp: DateTime<Utc>,
  ) -> Result<(), Self::Error> {
    let jpeg = message.image.encode_jpeg()?;
    debug!("发布目标图像 ({} 字节, {})", jpeg.len(), stamp);
    self.runtime.publish(&self.target_topic, jpeg)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc;
  use std::time::Duration;

  use super::*;

  #[test]
  fn unreachable_broker_never_blocks_publishing() {
    let output = MqttOutput::from_url(&Url::parse("mqtt://127.0.0.1:1/rover").unwrap()).unwrap();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
      let message = ObstacleMessage {
        label: "car".to_string(),
        x: 96.0,
        y: 72.0,
      };
      for index in 0..30 {
        let result = output.publish_obstacle(&message);
        let _ = tx.send((index, result.is_ok()));
      }
      let _ = tx.send((usize::MAX, output.finish().is_ok()));
    });

    let mut last = None;
    let mut finished = false;
    while let Ok((index, ok)) = rx.recv_timeout(Duration::from_secs(8)) {
      if index == usize::MAX {
        finished = ok;
        break;
      }
      last = Some(index);
    }
    assert_eq!(last, Some(29));
    assert!(finished);
  }
}

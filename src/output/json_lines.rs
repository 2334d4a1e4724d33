// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/json_lines.rs - JSON 行消息输出
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

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OBSTACLE_TOPIC, Publish, TARGET_TOPIC},
  processor::{ObstacleMessage, TargetMessage},
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("帧错误: {0}")]
  FrameError(#[from] crate::frame::FrameError),
}

#[derive(Serialize)]
struct ObstacleLine<'a> {
  topic: &'static str,
  #[serde(flatten)]
  message: &'a ObstacleMessage,
}

#[derive(Serialize)]
struct TargetLine {
  topic: &'static str,
  timestamp: i64,
  width: u32,
  height: u32,
  jpeg_bytes: usize,
}

/// 每条消息写一行 JSON。`stdout://` 写标准输出，`jsonl:///path` 追加写入文件。
pub struct JsonLinesOutput {
  writer: Mutex<Box<dyn Write + Send>>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl JsonLinesOutput {
  pub const STDOUT_SCHEME: &'static str = "stdout";

  pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
    Self {
      writer: Mutex::new(Box::new(writer)),
    }
  }

  pub fn append_to(path: impl AsRef<Path>) -> Result<Self, JsonLinesOutputError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Self::from_writer(BufWriter::new(file)))
  }

  fn write_line(&self, line: &impl Serialize) -> Result<(), JsonLinesOutputError> {
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    serde_json::to_writer(&mut *writer, line)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
  }
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      Self::STDOUT_SCHEME => Ok(Self::from_writer(std::io::stdout())),
      Self::SCHEME => Self::append_to(url.path()),
      other => Err(JsonLinesOutputError::SchemeMismatch(format!(
        "期望 '{}' 或 '{}', 实际 '{}'",
        Self::STDOUT_SCHEME,
        Self::SCHEME,
        other
      ))),
    }
  }
}

impl Publish for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn publish_obstacle(&self, message: &ObstacleMessage) -> Result<(), Self::Error> {
    self.write_line(&ObstacleLine {
      topic: OBSTACLE_TOPIC,
      message,
    })
  }

  fn publish_target(
    &self,
    message: &TargetMessage,
    stamp: DateTime<Utc>,
  ) -> Result<(), Self::Error> {
    let jpeg = message.image.encode_jpeg()?;
    self.write_line(&TargetLine {
      topic: TARGET_TOPIC,
      timestamp: stamp.timestamp(),
      width: message.image.width(),
      height: message.image.height(),
      jpeg_bytes: jpeg.len(),
    })
  }
}

#[cfg(test)]
mod tests {
  use std::time::Instant;

  use super::*;
  use crate::frame::RgbFrame;

  #[test]
  fn appends_one_line_per_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/messages.jsonl");
    let output = JsonLinesOutput::append_to(&path).unwrap();

    output
      .publish_obstacle(&ObstacleMessage {
        label: "car".to_string(),
        x: 96.0,
        y: 72.0,
      })
      .unwrap();
    output
      .publish_target(
        &TargetMessage {
          image: RgbFrame::with_shape(8, 8),
          captured_at: Instant::now(),
        },
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
      )
      .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = content
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["topic"], "yolo_obstacle");
    assert_eq!(lines[0]["label"], "car");
    assert_eq!(lines[0]["x"], 96.0);
    assert_eq!(lines[1]["topic"], "yolo_target");
    assert_eq!(lines[1]["timestamp"], 1_700_000_000);
    assert_eq!(lines[1]["width"], 8);
  }
}

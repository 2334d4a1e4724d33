// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/replay.rs - 检测结果回放模型
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

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::{Model, RawDetection},
  query_flag,
};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    source: serde_json::Error,
  },
}

/// 按帧回放预先录制的模型输出。
///
/// 文件每行是一帧的 JSON 数组，例如
/// `[{"label":"car","score":0.5,"bbox":[0.1,0.1,0.2,0.2]}]`，空行跳过。
/// 回放结束后返回空结果；URL 带 `?loop` 时从头循环。
pub struct ReplayModel {
  frames: Vec<Vec<RawDetection>>,
  cursor: AtomicUsize,
  looping: bool,
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayModelError::SchemaMismatch);
    }

    let content = std::fs::read_to_string(url.path())?;
    let model = Self::parse(&content, query_flag(url, "loop"))?;
    info!("回放文件 {} 共 {} 帧", url.path(), model.frames.len());
    Ok(model)
  }
}

impl ReplayModel {
  pub fn parse(content: &str, looping: bool) -> Result<Self, ReplayModelError> {
    let mut frames = Vec::new();
    for (index, line) in content.lines().enumerate() {
      let line = line.trim();
      if line.is_empty() {
        continue;
      }
      let items: Vec<RawDetection> =
        serde_json::from_str(line).map_err(|source| ReplayModelError::ParseError {
          line: index + 1,
          source,
        })?;
      frames.push(items);
    }

    Ok(Self {
      frames,
      cursor: AtomicUsize::new(0),
      looping,
    })
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }
}

impl Model for ReplayModel {
  type Error = ReplayModelError;

  fn infer(&self, _frame: &RgbFrame) -> Result<Vec<RawDetection>, Self::Error> {
    let index = self.cursor.fetch_add(1, Ordering::Relaxed);
    let index = if self.looping && !self.frames.is_empty() {
      index % self.frames.len()
    } else {
      index
    };

    match self.frames.get(index) {
      Some(items) => Ok(items.clone()),
      None => {
        debug!("回放已结束，返回空结果");
        Ok(Vec::new())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const TWO_FRAMES: &str = r#"
[{"label":"car","score":0.5,"bbox":[0.1,0.1,0.2,0.2]}]

[]
"#;

  #[test]
  fn replays_frames_in_order_then_empties() {
    let model = ReplayModel::parse(TWO_FRAMES, false).unwrap();
    let frame = RgbFrame::with_shape(4, 4);
    assert_eq!(model.len(), 2);
    assert_eq!(model.infer(&frame).unwrap()[0].label, "car");
    assert!(model.infer(&frame).unwrap().is_empty());
    assert!(model.infer(&frame).unwrap().is_empty());
  }

  #[test]
  fn loops_when_requested() {
    let model = ReplayModel::parse(TWO_FRAMES, true).unwrap();
    let frame = RgbFrame::with_shape(4, 4);
    model.infer(&frame).unwrap();
    model.infer(&frame).unwrap();
    assert_eq!(model.infer(&frame).unwrap().len(), 1);
  }

  #[test]
  fn reports_bad_line_number() {
    let err = ReplayModel::parse("[]\n{not json", false).err().unwrap();
    assert!(matches!(err, ReplayModelError::ParseError { line: 2, .. }));
  }
}

// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/directory_record.rs - 标注帧目录记录
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
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  detection::Detection,
  frame::RgbFrame,
  output::Render,
  query_flag,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把标注后的帧按 `年/月/日/时-分-秒-序号.png` 存入目录。
/// 默认只保存有检测结果的帧，URL 带 `?always` 时每帧都保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput::new(
      uri.path(),
      query_flag(uri, "always"),
    ))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, always: bool) -> Self {
    Self {
      directory: directory.into(),
      frame_counter: AtomicU16::new(0),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    annotated: &RgbFrame,
    detections: &[Detection],
  ) -> Result<(), Self::Error> {
    if !self.always && detections.is_empty() {
      return Ok(());
    }
    let path = self.frame_path(Utc::now())?;
    annotated.to_rgb_image().save(&path)?;
    debug!("标注帧已保存到 {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::PixelBox;

  fn walk_files(dir: &std::path::Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        files.extend(walk_files(&path));
      } else {
        files.push(path);
      }
    }
    files
  }

  #[test]
  fn skips_empty_frames_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = RgbFrame::with_shape(8, 8);
    let detection = Detection {
      label: "car".to_string(),
      score: 0.5,
      bbox: PixelBox {
        x1: 1,
        y1: 1,
        x2: 4,
        y2: 4,
      },
      x_center: 2.5,
      y_center: 2.5,
    };

    let selective = DirectoryRecordOutput::new(dir.path().join("a"), false);
    selective.render_result(&frame, &[]).unwrap();
    selective.render_result(&frame, &[detection]).unwrap();
    assert_eq!(walk_files(&dir.path().join("a")).len(), 1);

    let always = DirectoryRecordOutput::new(dir.path().join("b"), true);
    always.render_result(&frame, &[]).unwrap();
    always.render_result(&frame, &[]).unwrap();
    assert_eq!(walk_files(&dir.path().join("b")).len(), 2);
  }
}

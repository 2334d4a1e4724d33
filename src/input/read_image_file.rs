// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, query_value};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Invalid repeat count: {0}")]
  InvalidRepeat(String),
}

/// 单张图像作为输入。`?repeat=N` 重复 N 次，`repeat=0` 表示无限重复。
pub struct ImageFileInput {
  frame: RgbFrame,
  remaining: Option<usize>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let repeat = match query_value(url, "repeat") {
      Some(value) => value
        .parse::<usize>()
        .map_err(|_| ImageFileInputError::InvalidRepeat(value))?,
      None => 1,
    };

    let image = ImageReader::open(url.path())?.decode()?.to_rgb8();
    Ok(ImageFileInput::new(RgbFrame::from(image), repeat))
  }
}

impl ImageFileInput {
  pub fn new(frame: RgbFrame, repeat: usize) -> Self {
    Self {
      frame,
      remaining: (repeat > 0).then_some(repeat),
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match &mut self.remaining {
      None => Some(self.frame.clone()),
      Some(0) => None,
      Some(remaining) => {
        *remaining -= 1;
        Some(self.frame.clone())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn repeats_the_same_frame() {
    let input = ImageFileInput::new(RgbFrame::with_shape(2, 2), 3);
    assert_eq!(input.count(), 3);
  }

  #[test]
  fn zero_repeat_is_endless() {
    let input = ImageFileInput::new(RgbFrame::with_shape(2, 2), 0);
    assert_eq!(input.take(50).count(), 50);
  }

  #[test]
  fn loads_image_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    image::RgbImage::new(5, 3).save(&path).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&format!("image://{}?repeat=2", url.path())).unwrap();
    let frames: Vec<_> = ImageFileInput::from_url(&url).unwrap().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!((frames[0].width(), frames[0].height()), (5, 3));
  }
}

// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use thiserror::Error;
use tracing::warn;

use crate::detection::{Detection, PixelBox};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色

static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 把检测结果画到图像上
pub trait Annotate {
  fn annotate(&self, image: &mut RgbImage, detections: &[Detection]);
}

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  box_color: [u8; 3],
  font: Option<FontArc>,
}

/// 默认使用内置的 DejaVu Sans 画边框和标签
impl Default for Draw {
  fn default() -> Self {
    match FontArc::try_from_slice(EMBEDDED_FONT) {
      Ok(font) => Self {
        font: Some(font),
        ..Self::boxes_only()
      },
      Err(e) => {
        warn!("内置字体无法加载，只画边框: {}", e);
        Self::boxes_only()
      }
    }
  }
}

impl Draw {
  /// 只画边框，不画标签文字
  pub fn boxes_only() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      box_color: BOX_COLOR,
      font: None,
    }
  }

  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    Ok(Self {
      font: Some(font),
      ..Self::boxes_only()
    })
  }

  fn draw_bbox(&self, image: &mut RgbImage, bbox: &PixelBox) -> Option<(i32, i32)> {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return None;
    }

    // 模型给出的坐标可能越界，画图时裁剪到图像范围内
    let x_min = bbox.x1.clamp(0, w - 1);
    let y_min = bbox.y1.clamp(0, h - 1);
    let x_max = bbox.x2.clamp(0, w - 1);
    let y_max = bbox.y2.clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return None;
    }

    let color = Rgb(self.box_color);
    for thickness in 0..BOX_THICKNESS {
      let left = (x_min + thickness).min(x_max);
      let top = (y_min + thickness).min(y_max);
      let right = (x_max - thickness).max(x_min);
      let bottom = (y_max - thickness).max(y_min);

      for x in left..=right {
        image.put_pixel(x as u32, top as u32, color);
        image.put_pixel(x as u32, bottom as u32, color);
      }
      for y in top..=bottom {
        image.put_pixel(left as u32, y as u32, color);
        image.put_pixel(right as u32, y as u32, color);
      }
    }

    Some((x_min, y_min))
  }

  fn draw_label(&self, image: &mut RgbImage, font: &FontArc, at: (i32, i32), text: &str) {
    let (x_min, y_min) = at;
    let w = image.width() as i32;

    let text_width = (text.chars().count() as f32 * self.label_char_width) as i32;
    let label_x = x_min.max(0);
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min((w - label_x).max(0)) as u32;
    let label_height = self.label_text_height as u32;

    // 仅在标签有空间时绘制
    if label_width == 0 || label_height == 0 {
      return;
    }

    let rect = imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, label_height);
    draw_filled_rect_mut(image, rect, Rgb(self.box_color));
    draw_text_mut(
      image,
      Rgb([255u8, 255u8, 255u8]),
      label_x,
      label_y + self.label_text_vertical_padding,
      PxScale::from(self.font_size),
      font,
      text,
    );
  }
}

impl Annotate for Draw {
  fn annotate(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      let Some(corner) = self.draw_bbox(image, &detection.bbox) else {
        continue;
      };
      if let Some(font) = &self.font {
        let text = format!("{} {:.2}", detection.label, detection.score);
        self.draw_label(image, font, corner, &text);
      }
    }
  }
}

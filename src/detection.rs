// 该文件是 Beifeng （北风） 项目的一部分。
// src/detection.rs - 检测结果过滤与像素坐标换算
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

use crate::model::RawDetection;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// 像素坐标边框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl PixelBox {
  /// 边框中心点，在 f64 中求和，越界坐标也不会溢出
  pub fn center(&self) -> (f64, f64) {
    (
      (f64::from(self.x1) + f64::from(self.x2)) / 2.0,
      (f64::from(self.y1) + f64::from(self.y2)) / 2.0,
    )
  }
}

/// 通过置信度阈值的检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub label: String,
  pub score: f32,
  pub bbox: PixelBox,
  pub x_center: f64,
  pub y_center: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionFilter {
  threshold: f32,
}

impl Default for DetectionFilter {
  fn default() -> Self {
    Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
  }
}

impl DetectionFilter {
  pub fn new(threshold: f32) -> Self {
    Self { threshold }
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  /// 保留 `score >= threshold` 的结果，顺序与模型输出一致。
  ///
  /// 归一化坐标乘以帧宽高后向零截断。超出 [0, 1] 的坐标原样换算，不做裁剪。
  pub fn filter(&self, width: u32, height: u32, raw: &[RawDetection]) -> Vec<Detection> {
    let (w, h) = (f64::from(width), f64::from(height));

    raw
      .iter()
      .filter(|item| item.score >= self.threshold)
      .map(|item| {
        let bbox = PixelBox {
          x1: (f64::from(item.bbox[0]) * w) as i32,
          y1: (f64::from(item.bbox[1]) * h) as i32,
          x2: (f64::from(item.bbox[2]) * w) as i32,
          y2: (f64::from(item.bbox[3]) * h) as i32,
        };
        let (x_center, y_center) = bbox.center();
        Detection {
          label: item.label.clone(),
          score: item.score,
          bbox,
          x_center,
          y_center,
        }
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Vec<RawDetection> {
    vec![
      RawDetection::new("car", 0.5, [0.1, 0.1, 0.2, 0.2]),
      RawDetection::new("cone", 0.2, [0.3, 0.3, 0.4, 0.4]),
    ]
  }

  #[test]
  fn drops_low_confidence_and_computes_center() {
    let detections = DetectionFilter::default().filter(640, 480, &sample());
    assert_eq!(detections.len(), 1);
    let car = &detections[0];
    assert_eq!(car.label, "car");
    assert_eq!(
      car.bbox,
      PixelBox {
        x1: 64,
        y1: 48,
        x2: 128,
        y2: 96
      }
    );
    assert_eq!((car.x_center, car.y_center), (96.0, 72.0));
  }

  #[test]
  fn threshold_is_inclusive() {
    let filter = DetectionFilter::new(0.3);
    for (score, kept) in [(0.0, false), (0.29, false), (0.3, true), (0.31, true), (1.0, true)] {
      let raw = [RawDetection::new("x", score, [0.0, 0.0, 1.0, 1.0])];
      assert_eq!(filter.filter(10, 10, &raw).len() == 1, kept, "score {score}");
    }
  }

  #[test]
  fn keeps_model_order() {
    let raw = vec![
      RawDetection::new("b", 0.9, [0.5, 0.5, 0.6, 0.6]),
      RawDetection::new("a", 0.4, [0.0, 0.0, 0.1, 0.1]),
      RawDetection::new("c", 0.8, [0.2, 0.2, 0.3, 0.3]),
    ];
    let labels: Vec<_> = DetectionFilter::default()
      .filter(100, 100, &raw)
      .into_iter()
      .map(|d| d.label)
      .collect();
    assert_eq!(labels, ["b", "a", "c"]);
  }

  #[test]
  fn out_of_range_coordinates_pass_through() {
    let raw = [RawDetection::new("far", 0.9, [-0.1, 0.5, 1.5, 1.0])];
    let detections = DetectionFilter::default().filter(100, 200, &raw);
    assert_eq!(
      detections[0].bbox,
      PixelBox {
        x1: -10,
        y1: 100,
        x2: 150,
        y2: 200
      }
    );
  }

  #[test]
  fn huge_coordinates_saturate_without_overflow() {
    let raw = [RawDetection::new("car", 0.9, [1e30, 0.0, 1e30, 0.5])];
    let detections = DetectionFilter::default().filter(640, 480, &raw);
    let car = &detections[0];
    assert_eq!(car.bbox.x1, i32::MAX);
    assert_eq!(car.bbox.x2, i32::MAX);
    assert_eq!(car.x_center, f64::from(i32::MAX));
    assert_eq!(car.y_center, 120.0);
  }

  #[test]
  fn empty_input_and_repeated_runs() {
    let filter = DetectionFilter::default();
    assert!(filter.filter(640, 480, &[]).is_empty());
    let raw = sample();
    assert_eq!(filter.filter(640, 480, &raw), filter.filter(640, 480, &raw));
  }
}

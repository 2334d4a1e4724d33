// 该文件是 Beifeng （北风） 项目的一部分。
// src/model.rs - 模型
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame};

/// 检测模型。模型本身是黑盒：输入一帧，输出若干候选目标。
pub trait Model {
  type Error;

  fn infer(&self, frame: &RgbFrame) -> Result<Vec<RawDetection>, Self::Error>;
}

/// 模型原始输出，坐标为归一化值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

impl RawDetection {
  pub fn new(label: impl Into<String>, score: f32, bbox: [f32; 4]) -> Self {
    Self {
      label: label.into(),
      score,
      bbox,
    }
  }
}

mod replay;
pub use self::replay::{ReplayModel, ReplayModelError};

/// 不产生任何检测结果的模型，仅用于目标抓拍等不需要检测的场景
#[derive(Debug, Default)]
pub struct EmptyModel;

impl FromUrlWithScheme for EmptyModel {
  const SCHEME: &'static str = "empty";
}

impl FromUrl for EmptyModel {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch);
    }
    Ok(EmptyModel)
  }
}

impl Model for EmptyModel {
  type Error = std::convert::Infallible;

  fn infer(&self, _frame: &RgbFrame) -> Result<Vec<RawDetection>, Self::Error> {
    Ok(Vec::new())
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("回放模型错误: {0}")]
  ReplayModelError(#[from] ReplayModelError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum ModelWrapper {
  Replay(ReplayModel),
  Empty(EmptyModel),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayModel::SCHEME => Ok(ModelWrapper::Replay(ReplayModel::from_url(url)?)),
      EmptyModel::SCHEME => Ok(ModelWrapper::Empty(EmptyModel::from_url(url)?)),
      _ => Err(ModelError::SchemeMismatch),
    }
  }
}

impl Model for ModelWrapper {
  type Error = ModelError;

  fn infer(&self, frame: &RgbFrame) -> Result<Vec<RawDetection>, Self::Error> {
    match self {
      ModelWrapper::Replay(model) => model.infer(frame).map_err(ModelError::from),
      ModelWrapper::Empty(model) => match model.infer(frame) {
        Ok(items) => Ok(items),
        Err(never) => match never {},
      },
    }
  }
}

// 该文件是 Beifeng （北风） 项目的一部分。
// src/args.rs - 命令行参数
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

use beifeng::config::{ConfigError, PipelineConfig};
use clap::Parser;
use url::Url;

/// Beifeng 按车辆阶段上报障碍物、抓拍目标
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型
  /// - replay:///path/detections.jsonl[?loop]
  /// - empty://
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// - image:///path/frame.jpg[?repeat=N]
  /// - dir:///path/frames
  /// - v4l:///dev/video0[?width=640&height=480]
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 消息输出
  /// - stdout://
  /// - jsonl:///path/messages.jsonl
  /// - mqtt://host:1883/prefix
  /// - null://
  #[arg(long, value_name = "OUTPUT", default_value = "stdout://")]
  pub output: Url,

  /// 车辆阶段来源
  /// - stdin://
  /// - fixed://<token>
  /// - mqtt://host:1883/prefix
  #[arg(long, value_name = "PHASE", default_value = "stdin://")]
  pub phase: Url,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = beifeng::detection::DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 两次抓拍之间的最小间隔（秒）
  #[arg(long, default_value_t = 1.0, value_name = "SECONDS")]
  pub capture_interval: f64,

  /// 上报障碍物的阶段令牌
  #[arg(long, default_value = beifeng::phase::DEFAULT_OBSTACLE_PHASE, value_name = "TOKEN")]
  pub obstacle_phase: String,

  /// 抓拍目标的阶段令牌
  #[arg(long, default_value = beifeng::phase::DEFAULT_CAPTURE_PHASE, value_name = "TOKEN")]
  pub capture_phase: String,

  /// 目标图像保存目录
  #[arg(long, default_value = beifeng::output::DEFAULT_CAPTURE_DIR, value_name = "DIR")]
  pub capture_dir: PathBuf,

  /// 标签文字使用的 TrueType 字体，不指定时使用内置字体
  #[arg(long, value_name = "FONT", conflicts_with = "no_labels")]
  pub font: Option<PathBuf>,

  /// 只画边框，不画标签文字
  #[arg(long)]
  pub no_labels: bool,

  /// 标注帧预览目录，folder:///path[?always]
  #[arg(long, value_name = "PREVIEW")]
  pub preview: Option<Url>,

  /// 最大处理帧数，0 表示无限制
  #[arg(long, value_name = "FRAME_NUMBER", default_value_t = 0)]
  pub frame_number: usize,
}

impl TryFrom<&Args> for PipelineConfig {
  type Error = ConfigError;

  fn try_from(args: &Args) -> Result<Self, Self::Error> {
    PipelineConfig::new(
      args.confidence,
      args.capture_interval,
      &args.obstacle_phase,
      &args.capture_phase,
      &args.capture_dir,
    )
  }
}

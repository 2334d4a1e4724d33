// 该文件是 Beifeng （北风） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use beifeng::{
  FromUrl,
  config::PipelineConfig,
  input::InputWrapper,
  limiter::CaptureRateLimiter,
  model::ModelWrapper,
  output::{DirectoryRecordOutput, OutputWrapper, TargetStore, draw::Draw},
  phase::PhaseState,
  phase_source::PhaseSourceWrapper,
  task::{ContinuousTask, DetectorNode, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let config = PipelineConfig::try_from(&args)?;

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("消息输出: {}", args.output);
  info!("阶段来源: {}", args.phase);
  info!(
    "置信度阈值: {}, 抓拍间隔: {:?}, 障碍物阶段: {}, 抓拍阶段: {}",
    config.confidence_threshold,
    config.capture_interval,
    config.obstacle_phase,
    config.capture_phase
  );

  let draw = match &args.font {
    Some(path) => Draw::with_font_file(path)?,
    None if args.no_labels => {
      warn!("已关闭标签文字，标注只画边框");
      Draw::boxes_only()
    }
    None => Draw::default(),
  };
  let preview = args
    .preview
    .as_ref()
    .map(DirectoryRecordOutput::from_url)
    .transpose()?;

  let model = ModelWrapper::from_url(&args.model)?;
  let input = InputWrapper::from_url(&args.input)?;
  let publisher = OutputWrapper::from_url(&args.output)?;
  let store = TargetStore::open(&config.capture_dir)?;
  info!("目标图像保存目录: {}", store.directory().display());

  let phase = Arc::new(PhaseState::new());
  let listener = PhaseSourceWrapper::from_url(&args.phase)?.attach(Arc::clone(&phase))?;

  let node = DetectorNode::new(
    model,
    config.frame_processor(draw),
    phase,
    CaptureRateLimiter::starting_now(config.capture_interval),
    publisher,
    store,
  )
  .with_preview(preview);

  ContinuousTask::default()
    .with_frame_number(Some(args.frame_number).filter(|n| *n > 0))
    .interruptible()?
    .run_task(input, &node)?;

  node.into_publisher().finish()?;
  listener.close()?;
  Ok(())
}

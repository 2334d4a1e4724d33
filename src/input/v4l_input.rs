// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/v4l_input.rs - V4L 视频输入
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

use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, query_value};

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid dimension: {0}")]
  InvalidDimension(String),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
  #[error("Image decode error: {0}")]
  DecodeError(#[from] image::ImageError),
  #[error("Frame error: {0}")]
  FrameError(#[from] crate::frame::FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Rgb3,
  Yuyv,
  Mjpg,
}

impl PixelFormat {
  fn from_fourcc(fourcc: FourCC) -> Option<Self> {
    match &fourcc.repr {
      b"RGB3" => Some(PixelFormat::Rgb3),
      b"YUYV" => Some(PixelFormat::Yuyv),
      b"MJPG" => Some(PixelFormat::Mjpg),
      _ => None,
    }
  }
}

/// V4L2 摄像头输入，`v4l:///dev/video0?width=640&height=480`。
///
/// 采集在独立线程中进行；处理跟不上时丢弃新帧，不对摄像头施加背压。
pub struct V4lInput {
  frames: Receiver<RgbFrame>,
  _capture: JoinHandle<()>,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    // v4l:///dev/video0 或 v4l://localhost/dev/video0
    let device_path = if url.path().is_empty() || url.path() == "/" {
      DEFAULT_DEVICE.to_string()
    } else {
      url.path().to_string()
    };
    let width = parse_dimension(url, "width", DEFAULT_WIDTH)?;
    let height = parse_dimension(url, "height", DEFAULT_HEIGHT)?;

    V4lInput::open(&device_path, width, height)
  }
}

fn parse_dimension(url: &Url, key: &str, default: u32) -> Result<u32, V4lInputError> {
  match query_value(url, key) {
    Some(value) => value
      .parse()
      .ok()
      .filter(|v| *v > 0)
      .ok_or(V4lInputError::InvalidDimension(value)),
    None => Ok(default),
  }
}

impl V4lInput {
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, V4lInputError> {
    let device = Device::with_path(device_path)?;

    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"RGB3");
    let format = device.set_format(&format)?;

    let pixel_format = PixelFormat::from_fourcc(format.fourcc)
      .ok_or_else(|| V4lInputError::UnsupportedPixelFormat(format.fourcc.to_string()))?;
    info!(
      "摄像头 {} 已打开: {}x{} {}",
      device_path, format.width, format.height, format.fourcc
    );

    let (tx, rx) = sync_channel(1);
    let (width, height) = (format.width, format.height);
    let capture = std::thread::Builder::new()
      .name("v4l-capture".to_string())
      .spawn(move || {
        if let Err(e) = capture_loop(&device, pixel_format, width, height, &tx) {
          error!("摄像头采集失败: {}", e);
        }
      })?;

    Ok(Self {
      frames: rx,
      _capture: capture,
    })
  }
}

fn capture_loop(
  device: &Device,
  pixel_format: PixelFormat,
  width: u32,
  height: u32,
  tx: &SyncSender<RgbFrame>,
) -> Result<(), V4lInputError> {
  let mut stream = Stream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)?;

  loop {
    let (buffer, meta) = stream.next()?;
    let used = (meta.bytesused as usize).min(buffer.len());
    let used = if used == 0 { buffer.len() } else { used };

    let frame = match convert(&buffer[..used], pixel_format, width, height) {
      Ok(frame) => frame,
      Err(e) => {
        warn!("丢弃无法转换的帧: {}", e);
        continue;
      }
    };

    match tx.try_send(frame) {
      Ok(()) => {}
      Err(TrySendError::Full(_)) => debug!("处理繁忙，丢弃一帧"),
      Err(TrySendError::Disconnected(_)) => return Ok(()),
    }
  }
}

fn convert(
  data: &[u8],
  pixel_format: PixelFormat,
  width: u32,
  height: u32,
) -> Result<RgbFrame, V4lInputError> {
  let pixels = (width as usize) * (height as usize);
  match pixel_format {
    PixelFormat::Rgb3 => {
      let size = pixels * 3;
      let data = data.get(..size).unwrap_or(data);
      Ok(RgbFrame::from_raw(width, height, data.to_vec())?)
    }
    PixelFormat::Yuyv => Ok(RgbFrame::from_raw(width, height, yuyv_to_rgb(data, pixels))?),
    PixelFormat::Mjpg => {
      let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?;
      Ok(RgbFrame::from(image.to_rgb8()))
    }
  }
}

/// YUYV 4:2:2 转 RGB，BT.601 系数
fn yuyv_to_rgb(data: &[u8], pixels: usize) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(pixels * 3);
  for chunk in data.chunks_exact(4).take(pixels / 2) {
    let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
    for y in [y0, y1] {
      let c = f32::from(y) - 16.0;
      let d = f32::from(u) - 128.0;
      let e = f32::from(v) - 128.0;
      let r = 1.164 * c + 1.596 * e;
      let g = 1.164 * c - 0.392 * d - 0.813 * e;
      let b = 1.164 * c + 2.017 * d;
      rgb.extend([r, g, b].map(|x| x.clamp(0.0, 255.0) as u8));
    }
  }
  rgb
}

impl Iterator for V4lInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frames.recv().ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yuyv_gray_maps_to_gray() {
    let rgb = yuyv_to_rgb(&[126, 128, 126, 128], 2);
    assert_eq!(rgb.len(), 6);
    assert!(rgb.iter().all(|v| (127..=129).contains(v)));
  }

  #[test]
  fn rgb_buffers_must_cover_the_frame() {
    assert!(convert(&[0; 12], PixelFormat::Rgb3, 2, 2).is_ok());
    assert!(convert(&[0; 11], PixelFormat::Rgb3, 2, 2).is_err());
  }

  #[test]
  fn rejects_zero_dimensions() {
    let url = Url::parse("v4l:///dev/video9?width=0").unwrap();
    assert!(matches!(
      parse_dimension(&url, "width", DEFAULT_WIDTH),
      Err(V4lInputError::InvalidDimension(_))
    ));
    assert_eq!(parse_dimension(&url, "height", 480).unwrap(), 480);
  }
}

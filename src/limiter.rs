// 该文件是 Beifeng （北风） 项目的一部分。
// src/limiter.rs - 目标抓拍限速
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

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_secs(1);

/// 保证两次抓拍之间至少间隔 `interval`。
///
/// 构造时视为刚刚抓拍过一次，因此启动后的第一个间隔内不会放行。
/// 上次抓拍时间以相对 `origin` 的纳秒数保存，检查与记录通过一次 CAS 完成。
#[derive(Debug)]
pub struct CaptureRateLimiter {
  origin: Instant,
  interval: Duration,
  last_capture: AtomicU64,
}

impl CaptureRateLimiter {
  pub fn new(interval: Duration, now: Instant) -> Self {
    Self {
      origin: now,
      interval,
      last_capture: AtomicU64::new(0),
    }
  }

  pub fn starting_now(interval: Duration) -> Self {
    Self::new(interval, Instant::now())
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  /// 到期时返回 `true` 并把 `now` 记为最近一次抓拍时间
  pub fn due(&self, now: Instant) -> bool {
    let elapsed = nanos(now.saturating_duration_since(self.origin));
    let interval = nanos(self.interval);

    let mut last = self.last_capture.load(Ordering::Acquire);
    loop {
      if elapsed < last || elapsed - last < interval {
        return false;
      }
      match self.last_capture.compare_exchange_weak(
        last,
        elapsed,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => return true,
        Err(actual) => last = actual,
      }
    }
  }
}

fn nanos(duration: Duration) -> u64 {
  u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;

  fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
  }

  #[test]
  fn suppresses_first_interval() {
    let t0 = Instant::now();
    let limiter = CaptureRateLimiter::new(DEFAULT_CAPTURE_INTERVAL, t0);
    assert!(!limiter.due(t0));
    assert!(!limiter.due(t0 + secs(0.5)));
    assert!(!limiter.due(t0 + secs(0.999)));
    assert!(limiter.due(t0 + secs(1.0)));
  }

  #[test]
  fn records_capture_time_when_due() {
    let t0 = Instant::now();
    let limiter = CaptureRateLimiter::new(DEFAULT_CAPTURE_INTERVAL, t0);
    assert!(!limiter.due(t0 + secs(0.5)));
    assert!(limiter.due(t0 + secs(1.2)));
    assert!(!limiter.due(t0 + secs(2.1)));
    assert!(limiter.due(t0 + secs(2.2)));
  }

  #[test]
  fn increasing_sequence_never_passes_twice_within_interval() {
    let t0 = Instant::now();
    let interval = secs(0.25);
    let limiter = CaptureRateLimiter::new(interval, t0);
    let mut passed = Vec::new();
    for step in 1..400u32 {
      let now = t0 + Duration::from_millis(u64::from(step) * 7);
      if limiter.due(now) {
        passed.push(now);
      }
    }
    assert!(!passed.is_empty());
    assert!(passed[0] >= t0 + interval);
    for pair in passed.windows(2) {
      assert!(pair[1] - pair[0] >= interval);
    }
  }

  #[test]
  fn time_before_construction_is_never_due() {
    let now = Instant::now();
    let limiter = CaptureRateLimiter::new(DEFAULT_CAPTURE_INTERVAL, now + secs(5.0));
    assert!(!limiter.due(now));
    assert!(!limiter.due(now + secs(5.5)));
  }

  #[test]
  fn only_one_concurrent_caller_wins() {
    let t0 = Instant::now();
    let limiter = Arc::new(CaptureRateLimiter::new(DEFAULT_CAPTURE_INTERVAL, t0));
    let at = t0 + secs(1.5);

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let limiter = Arc::clone(&limiter);
        std::thread::spawn(move || limiter.due(at))
      })
      .collect();
    let wins = handles
      .into_iter()
      .map(|h| h.join().unwrap())
      .filter(|won| *won)
      .count();
    assert_eq!(wins, 1);
  }
}

// 该文件是 Beifeng （北风） 项目的一部分。
// src/mqtt.rs - MQTT 连接
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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, query_value};

const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_CLIENT_ID: &str = "beifeng";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const REQUEST_CAPACITY: usize = 10;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum MqttError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("缺少 MQTT 代理地址")]
  MissingHost,
  #[error("MQTT 发送队列已满，丢弃发往 {0} 的消息")]
  QueueFull(String),
  #[error("MQTT 客户端错误: {0}")]
  ClientError(#[from] rumqttc::ClientError),
  #[error("消息序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("图像编码错误: {0}")]
  FrameError(#[from] crate::frame::FrameError),
}

/// `mqtt://[user[:password]@]host[:port][/prefix][?client_id=...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttEndpoint {
  pub host: String,
  pub port: u16,
  pub username: Option<String>,
  pub password: Option<String>,
  pub client_id: String,
  pub topic_prefix: String,
}

impl FromUrlWithScheme for MqttEndpoint {
  const SCHEME: &'static str = "mqtt";
}

impl FromUrl for MqttEndpoint {
  type Error = MqttError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(MqttError::SchemeMismatch);
    }

    let host = url
      .host_str()
      .filter(|host| !host.is_empty())
      .ok_or(MqttError::MissingHost)?
      .to_string();
    let username = Some(url.username())
      .filter(|name| !name.is_empty())
      .map(str::to_string);

    Ok(Self {
      host,
      port: url.port().unwrap_or(DEFAULT_MQTT_PORT),
      username,
      password: url.password().map(str::to_string),
      client_id: query_value(url, "client_id").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
      topic_prefix: url.path().trim_matches('/').to_string(),
    })
  }
}

impl MqttEndpoint {
  pub fn topic(&self, name: &str) -> String {
    if self.topic_prefix.is_empty() {
      name.to_string()
    } else {
      format!("{}/{}", self.topic_prefix, name)
    }
  }

  fn options(&self, client_suffix: &str) -> MqttOptions {
    let client_id = format!("{}-{}", self.client_id, client_suffix);
    let mut options = MqttOptions::new(client_id, &self.host, self.port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_session(true);
    if let Some(user) = &self.username {
      options.set_credentials(user, self.password.clone().unwrap_or_default());
    }
    options
  }
}

/// 客户端加上后台事件循环线程。每次 ConnAck 后重新订阅，收到的消息交给回调。
///
/// 发布不会阻塞调用方：发送队列满时返回 `MqttError::QueueFull`。
pub struct MqttRuntime {
  client: Client,
  stopping: Arc<AtomicBool>,
  connection_handle: Option<JoinHandle<()>>,
}

impl MqttRuntime {
  pub fn connect<F>(
    endpoint: &MqttEndpoint,
    client_suffix: &str,
    subscriptions: Vec<String>,
    mut on_publish: F,
  ) -> Self
  where
    F: FnMut(&str, &[u8]) + Send + 'static,
  {
    let (client, connection) = Client::new(endpoint.options(client_suffix), REQUEST_CAPACITY);
    info!(
      "连接 MQTT 代理 {}:{} (客户端: {}-{})",
      endpoint.host, endpoint.port, endpoint.client_id, client_suffix
    );

    let subscriber = client.clone();
    let stopping = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stopping);
    let handle = std::thread::spawn(move || {
      run_event_loop(
        connection,
        &subscriber,
        &subscriptions,
        &stop_flag,
        &mut on_publish,
      )
    });

    Self {
      client,
      stopping,
      connection_handle: Some(handle),
    }
  }

  pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
    match self
      .client
      .try_publish(topic, QoS::AtLeastOnce, false, payload)
    {
      Ok(()) => Ok(()),
      Err(rumqttc::ClientError::TryRequest(_)) => Err(MqttError::QueueFull(topic.to_string())),
      Err(e) => Err(e.into()),
    }
  }

  /// 请求断开并等待事件循环退出，最多等待 `SHUTDOWN_TIMEOUT`
  pub fn disconnect(mut self) -> Result<(), MqttError> {
    self.stopping.store(true, Ordering::Release);
    let requested = self.client.try_disconnect();

    if let Some(handle) = self.connection_handle.take() {
      let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
      while !handle.is_finished() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
      }
      if handle.is_finished() {
        let _ = handle.join();
      } else {
        warn!("MQTT 事件循环未能及时退出，放弃等待");
      }
    }

    match requested {
      Ok(()) | Err(rumqttc::ClientError::TryRequest(_)) => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}

fn run_event_loop<F>(
  mut connection: Connection,
  client: &Client,
  subscriptions: &[String],
  stopping: &AtomicBool,
  on_publish: &mut F,
) where
  F: FnMut(&str, &[u8]),
{
  for event in connection.iter() {
    if stopping.load(Ordering::Acquire) && event.is_err() {
      debug!("MQTT 连接已停止");
      break;
    }
    match event {
      Ok(Event::Incoming(Packet::ConnAck(_))) => {
        for topic in subscriptions {
          if let Err(e) = client.subscribe(topic.as_str(), QoS::AtLeastOnce) {
            warn!("订阅 {} 失败: {}", topic, e);
          } else {
            debug!("已订阅 {}", topic);
          }
        }
      }
      Ok(Event::Incoming(Packet::Publish(publish))) => {
        on_publish(&publish.topic, &publish.payload);
      }
      Ok(Event::Incoming(Packet::Disconnect)) => {
        info!("MQTT 代理断开连接");
      }
      Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
        debug!("MQTT 客户端主动断开");
        break;
      }
      Ok(_) => {}
      Err(e) => {
        warn!("MQTT 连接错误: {}，{:?} 后重连", e, RECONNECT_DELAY);
        std::thread::sleep(RECONNECT_DELAY);
      }
    }
  }
}

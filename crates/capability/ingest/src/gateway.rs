//! TCP 采集网关
//!
//! 每条电表连接一个任务：读取 → 解码 → 发布。解码失败与发布失败都只记录日志，
//! 连接保持打开；发布在独立任务中完成，不阻塞下一次读取。

use bytes::BytesMut;
use domain::Reading;
use meter_log::LogPort;
use meter_protocol::{PACKET_LEN, decode};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};

use crate::error::IngestError;

const CHUNK_READ_SIZE: usize = 4096;

/// 字节流分帧方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// 每次读取到的数据视为一个报文
    #[default]
    Chunk,
    /// 按 20 字节定长切帧，连接关闭时残留字节按截断报文处理
    Fixed,
}

/// 采集网关配置。
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub listen_addr: String,
    pub topic: String,
    pub framing: Framing,
    /// 并发连接上限，超出的连接在 accept 前等待
    pub max_connections: usize,
    /// 未完成发布上限，超出时丢弃读数
    pub max_inflight_publishes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4000".to_string(),
            topic: "meter-readings".to_string(),
            framing: Framing::Chunk,
            max_connections: 1024,
            max_inflight_publishes: 1024,
        }
    }
}

impl IngestConfig {
    fn sanitized(mut self) -> Self {
        self.max_connections = self.max_connections.clamp(1, Semaphore::MAX_PERMITS);
        self.max_inflight_publishes = self
            .max_inflight_publishes
            .clamp(1, u32::MAX as usize)
            .min(Semaphore::MAX_PERMITS);
        self
    }
}

/// 单条连接的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Streaming,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// 连接关闭时的统计。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub peer: String,
    pub state: ConnectionState,
    pub packets: u64,
    pub decode_failures: u64,
    /// 已交给发布任务的读数（不代表发布成功）
    pub readings_dispatched: u64,
    /// 因发布并发已满被丢弃的读数
    pub readings_dropped: u64,
}

impl ConnectionSummary {
    fn new(peer: &str) -> Self {
        Self {
            peer: peer.to_string(),
            state: ConnectionState::Connected,
            packets: 0,
            decode_failures: 0,
            readings_dispatched: 0,
            readings_dropped: 0,
        }
    }
}

struct GatewayInner {
    config: IngestConfig,
    log: Arc<dyn LogPort>,
    connections: Arc<Semaphore>,
    inflight: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
}

/// TCP 采集网关。
#[derive(Clone)]
pub struct IngestGateway {
    inner: Arc<GatewayInner>,
}

impl IngestGateway {
    pub fn new(log: Arc<dyn LogPort>, config: IngestConfig) -> Self {
        let config = config.sanitized();
        let inner = GatewayInner {
            connections: Arc::new(Semaphore::new(config.max_connections)),
            inflight: Arc::new(Semaphore::new(config.max_inflight_publishes)),
            shutdown: watch::channel(false).0,
            config,
            log,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// 绑定配置中的监听地址。
    pub async fn bind(&self) -> Result<TcpListener, IngestError> {
        let addr = self.inner.config.listen_addr.clone();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| IngestError::Bind { addr, source })
    }

    /// 在已绑定的监听器上运行 accept 循环，直到 [`IngestGateway::close`]。
    pub async fn serve(&self, listener: TcpListener) -> Result<(), IngestError> {
        if let Ok(addr) = listener.local_addr() {
            info!(target: "meter.ingest", addr = %addr, "ingest_listening");
        }
        let mut shutdown = self.inner.shutdown.subscribe();
        loop {
            let permit = tokio::select! {
                permit = Arc::clone(&self.inner.connections).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.wait_for(|closed| *closed) => break,
            };
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.wait_for(|closed| *closed) => break,
            };
            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(target: "meter.ingest", error = %err, "ingest_accept_failed");
                    continue;
                }
            };
            if let Err(err) = stream.set_nodelay(true) {
                debug!(target: "meter.ingest", peer = %peer, error = %err, "set_nodelay_failed");
            }
            let gateway = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                gateway.handle_connection(stream, peer.to_string()).await;
            });
        }
        info!(target: "meter.ingest", "ingest_stopped");
        Ok(())
    }

    /// 停止接收新连接（已有连接不受影响）。
    pub fn close(&self) {
        self.inner.shutdown.send_replace(true);
    }

    /// 等待所有未完成的发布任务结束。
    pub async fn drain(&self) {
        let permits = u32::try_from(self.inner.config.max_inflight_publishes).unwrap_or(u32::MAX);
        if let Ok(all) = self.inner.inflight.acquire_many(permits).await {
            drop(all);
        }
    }

    /// 处理一条连接直到对端关闭或读取出错。
    pub async fn handle_connection<R>(&self, mut reader: R, peer: String) -> ConnectionSummary
    where
        R: AsyncRead + Unpin,
    {
        let mut summary = ConnectionSummary::new(&peer);
        meter_telemetry::record_connection_opened();
        summary.state = ConnectionState::Streaming;
        info!(target: "meter.ingest", peer = %peer, "meter_connected");

        let result = match self.inner.config.framing {
            Framing::Chunk => self.read_chunks(&mut reader, &mut summary).await,
            Framing::Fixed => self.read_fixed_frames(&mut reader, &mut summary).await,
        };

        summary.state = ConnectionState::Closed;
        meter_telemetry::record_connection_closed();
        match result {
            Ok(()) => info!(
                target: "meter.ingest",
                peer = %peer,
                packets = summary.packets,
                decode_failures = summary.decode_failures,
                "meter_disconnected"
            ),
            Err(err) => warn!(
                target: "meter.ingest",
                peer = %peer,
                packets = summary.packets,
                error = %err,
                "meter_connection_error"
            ),
        }
        summary
    }

    async fn read_chunks<R>(
        &self,
        reader: &mut R,
        summary: &mut ConnectionSummary,
    ) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; CHUNK_READ_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            self.process_packet(&buf[..n], summary);
        }
    }

    async fn read_fixed_frames<R>(
        &self,
        reader: &mut R,
        summary: &mut ConnectionSummary,
    ) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(CHUNK_READ_SIZE);
        loop {
            buf.reserve(PACKET_LEN);
            let n = reader.read_buf(&mut buf).await?;
            if n == 0 {
                if !buf.is_empty() {
                    let rest = buf.split();
                    self.process_packet(&rest, summary);
                }
                return Ok(());
            }
            while buf.len() >= PACKET_LEN {
                let frame = buf.split_to(PACKET_LEN);
                self.process_packet(&frame, summary);
            }
        }
    }

    fn process_packet(&self, bytes: &[u8], summary: &mut ConnectionSummary) {
        summary.packets += 1;
        meter_telemetry::record_packet_received();
        match decode(bytes) {
            Ok(reading) => {
                if self.dispatch_publish(reading, &summary.peer) {
                    summary.readings_dispatched += 1;
                } else {
                    summary.readings_dropped += 1;
                }
            }
            Err(err) => {
                summary.decode_failures += 1;
                meter_telemetry::record_decode_failure();
                warn!(
                    target: "meter.ingest",
                    peer = %summary.peer,
                    len = bytes.len(),
                    error = %err,
                    "packet_decode_failed"
                );
            }
        }
    }

    /// 在独立任务中发布；返回 false 表示读数被丢弃。
    fn dispatch_publish(&self, reading: Reading, peer: &str) -> bool {
        let payload = match reading.to_payload() {
            Ok(payload) => payload,
            Err(err) => {
                meter_telemetry::record_publish_failure();
                warn!(
                    target: "meter.ingest",
                    meter_id = reading.meter_id,
                    error = %err,
                    "reading_serialize_failed"
                );
                return false;
            }
        };
        let permit = match Arc::clone(&self.inner.inflight).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                meter_telemetry::record_publish_backpressure();
                warn!(
                    target: "meter.ingest",
                    peer = %peer,
                    meter_id = reading.meter_id,
                    "reading_dropped_backpressure"
                );
                return false;
            }
        };

        let log = Arc::clone(&self.inner.log);
        let topic = self.inner.config.topic.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let key = reading.meter_id.to_string();
            match log.publish(&topic, Some(&key), payload).await {
                Ok(ack) => {
                    meter_telemetry::record_reading_published();
                    debug!(
                        target: "meter.ingest",
                        meter_id = reading.meter_id,
                        partition = ack.partition,
                        offset = ?ack.offset,
                        "reading_published"
                    );
                }
                Err(err) => {
                    meter_telemetry::record_publish_failure();
                    warn!(
                        target: "meter.ingest",
                        meter_id = reading.meter_id,
                        error = %err,
                        "reading_publish_failed"
                    );
                }
            }
        });
        true
    }
}

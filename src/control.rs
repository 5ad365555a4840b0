//! Telemetry frames and the TCP control endpoint.
//!
//! Each scheduler period produces one [`TelemetryFrame`] snapshot of the
//! sample bank. Frames are newline-delimited JSON on the wire so a plain
//! `nc` session can watch the stream. The endpoint serves one client at a
//! time and never blocks the acquisition loop: accepting, reading, and
//! writing all bail out immediately when the socket is not ready, and a
//! client that stops draining its socket is dropped rather than waited on.

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::SensorResult;
use crate::registers::{COUNTS_PER_G, COUNTS_PER_UT};
use crate::sample::{Sample, SampleBank};
use crate::status::SystemStatus;

/// How long a frame write may stall before the client is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_millis(20);

/// Inbound bytes tolerated without a newline before the buffer is cleared.
const MAX_PENDING_COMMAND_BYTES: usize = 512;

/// One channel's contribution to a telemetry frame.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AxesReport {
    /// Raw conditioned counts, most recent sample.
    pub raw: [i16; 3],
    /// X axis in physical units.
    pub x: f32,
    /// Y axis in physical units.
    pub y: f32,
    /// Z axis in physical units.
    pub z: f32,
    /// Physical unit of `x`, `y`, `z`.
    pub unit: &'static str,
    /// Samples appended to this channel since startup.
    pub total_samples: u64,
}

impl AxesReport {
    fn acceleration(sample: Sample, total_samples: u64) -> Self {
        Self {
            raw: [sample.x, sample.y, sample.z],
            x: f32::from(sample.x) / COUNTS_PER_G,
            y: f32::from(sample.y) / COUNTS_PER_G,
            z: f32::from(sample.z) / COUNTS_PER_G,
            unit: "g",
            total_samples,
        }
    }

    fn magnetic_field(sample: Sample, total_samples: u64) -> Self {
        Self {
            raw: [sample.x, sample.y, sample.z],
            x: f32::from(sample.x) / COUNTS_PER_UT,
            y: f32::from(sample.y) / COUNTS_PER_UT,
            z: f32::from(sample.z) / COUNTS_PER_UT,
            unit: "uT",
            total_samples,
        }
    }
}

/// Snapshot of one acquisition period, encoded as one JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryFrame {
    /// Wall-clock capture time.
    pub timestamp: DateTime<Utc>,
    /// Periods fired since the scheduler started.
    pub cycle: u64,
    /// Grid deadlines skipped due to overruns so far.
    pub skipped_cycles: u64,
    /// Published system status at capture time.
    pub status: SystemStatus,
    /// Latest accelerometer sample, if any arrived yet.
    pub accel: Option<AxesReport>,
    /// Latest magnetometer sample, if any arrived yet.
    pub mag: Option<AxesReport>,
    /// Latest die temperature in Celsius, if read yet.
    pub temperature_c: Option<f32>,
}

impl TelemetryFrame {
    /// Snapshot `bank` before the fusion stage consumes it.
    pub fn capture(
        bank: &SampleBank,
        cycle: u64,
        skipped_cycles: u64,
        status: SystemStatus,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            cycle,
            skipped_cycles,
            status,
            accel: bank
                .accel
                .latest()
                .map(|s| AxesReport::acceleration(s, bank.accel.total_written())),
            mag: bank
                .mag
                .latest()
                .map(|s| AxesReport::magnetic_field(s, bank.mag.total_written())),
            temperature_c: bank.temperature_c(),
        }
    }

    /// Encode as one newline-terminated JSON line.
    pub fn encode(&self) -> SensorResult<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Commands accepted on the control connection, one per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Resume per-period frame streaming.
    StreamOn,
    /// Stop streaming; the connection stays up for commands.
    StreamOff,
    /// Send one frame now regardless of the streaming gate.
    Status,
}

impl ControlCommand {
    /// Parse one inbound line. Matching is case-insensitive and ignores
    /// surrounding whitespace; unknown input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "stream on" => Some(ControlCommand::StreamOn),
            "stream off" => Some(ControlCommand::StreamOff),
            "status" => Some(ControlCommand::Status),
            _ => None,
        }
    }
}

/// Non-blocking client endpoint the scheduler polls once per period.
#[async_trait]
pub trait ControlPort: Send {
    /// Accept a waiting client if there is one. Returns whether a client
    /// is connected after the poll.
    async fn poll_client(&mut self) -> bool;

    /// Send one frame to the connected client, if any.
    async fn stream(&mut self, frame: &TelemetryFrame) -> SensorResult<()>;

    /// Drain complete command lines received since the last poll.
    async fn poll_commands(&mut self) -> SensorResult<Vec<ControlCommand>>;
}

/// Port used when telemetry is configured off.
#[derive(Debug, Default)]
pub struct NullControlPort;

#[async_trait]
impl ControlPort for NullControlPort {
    async fn poll_client(&mut self) -> bool {
        false
    }

    async fn stream(&mut self, _frame: &TelemetryFrame) -> SensorResult<()> {
        Ok(())
    }

    async fn poll_commands(&mut self) -> SensorResult<Vec<ControlCommand>> {
        Ok(Vec::new())
    }
}

/// Single-client TCP endpoint speaking newline-delimited JSON out and
/// line commands in.
pub struct TcpControlPort {
    listener: TcpListener,
    client: Option<TcpStream>,
    inbound: BytesMut,
}

impl TcpControlPort {
    /// Bind the listening socket.
    pub async fn bind(addr: &str) -> SensorResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "telemetry endpoint listening");
        Ok(Self {
            listener,
            client: None,
            inbound: BytesMut::new(),
        })
    }

    /// Address the listener actually bound, useful when the port was 0.
    pub fn local_addr(&self) -> SensorResult<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    fn drop_client(&mut self, reason: &str) {
        if self.client.take().is_some() {
            self.inbound.clear();
            info!(reason, "telemetry client disconnected");
        }
    }

    fn parse_pending(&mut self) -> Vec<ControlCommand> {
        let mut commands = Vec::new();
        while let Some(pos) = self.inbound.iter().position(|&b| b == b'\n') {
            let line = self.inbound.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            match ControlCommand::parse(trimmed) {
                Some(command) => commands.push(command),
                None => warn!(line = trimmed, "ignoring unrecognized command"),
            }
        }
        if self.inbound.len() > MAX_PENDING_COMMAND_BYTES {
            warn!(
                pending = self.inbound.len(),
                "discarding inbound bytes with no line ending"
            );
            self.inbound.clear();
        }
        commands
    }
}

#[async_trait]
impl ControlPort for TcpControlPort {
    async fn poll_client(&mut self) -> bool {
        if self.client.is_none() {
            // One poll of the accept future; a waiting connection resolves
            // immediately, otherwise nobody is kept waiting.
            if let Some(Ok((stream, peer))) = self.listener.accept().now_or_never() {
                info!(%peer, "telemetry client connected");
                self.inbound.clear();
                self.client = Some(stream);
            }
        }
        self.client.is_some()
    }

    async fn stream(&mut self, frame: &TelemetryFrame) -> SensorResult<()> {
        let Some(client) = self.client.as_mut() else {
            return Ok(());
        };
        let line = frame.encode()?;
        match tokio::time::timeout(WRITE_TIMEOUT, client.write_all(&line)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                warn!(error = %err, "telemetry write failed");
                self.drop_client("write error");
                Ok(())
            }
            Err(_) => {
                self.drop_client("write stalled");
                Ok(())
            }
        }
    }

    async fn poll_commands(&mut self) -> SensorResult<Vec<ControlCommand>> {
        let Some(client) = self.client.as_mut() else {
            return Ok(Vec::new());
        };

        let mut buf = [0u8; 256];
        loop {
            match client.try_read(&mut buf) {
                Ok(0) => {
                    self.drop_client("closed by peer");
                    break;
                }
                Ok(n) => self.inbound.extend_from_slice(&buf[..n]),
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(error = %err, "telemetry read failed");
                    self.drop_client("read error");
                    break;
                }
            }
        }
        Ok(self.parse_pending())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn commands_parse_loosely() {
        assert_eq!(
            ControlCommand::parse("  STREAM ON \r"),
            Some(ControlCommand::StreamOn)
        );
        assert_eq!(
            ControlCommand::parse("stream off"),
            Some(ControlCommand::StreamOff)
        );
        assert_eq!(ControlCommand::parse("Status"), Some(ControlCommand::Status));
        assert_eq!(ControlCommand::parse("bogus"), None);
    }

    #[test]
    fn frame_encodes_as_one_json_line() {
        let mut bank = SampleBank::new(4, 4);
        bank.accel.push(Sample {
            x: 0,
            y: 0,
            z: 8192,
        });
        bank.set_temperature(24.96);

        let frame = TelemetryFrame::capture(&bank, 7, 0, SystemStatus::Normal);
        let line = frame.encode().expect("encode");
        assert_eq!(line.last(), Some(&b'\n'));

        let value: serde_json::Value =
            serde_json::from_slice(&line[..line.len() - 1]).expect("valid json");
        assert_eq!(value["cycle"], 7);
        assert_eq!(value["status"], "normal");
        assert_eq!(value["accel"]["unit"], "g");
        assert!((value["accel"]["z"].as_f64().expect("z") - 1.0).abs() < 1e-6);
        assert!(value["mag"].is_null());
    }

    #[tokio::test]
    async fn tcp_port_accepts_commands_and_streams() {
        let mut port = TcpControlPort::bind("127.0.0.1:0").await.expect("bind");
        let addr = port.local_addr().expect("addr");

        let mut peer = TcpStream::connect(addr).await.expect("connect");
        let mut connected = false;
        for _ in 0..100 {
            if port.poll_client().await {
                connected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(connected, "client never accepted");

        peer.write_all(b"stream off\nstatus\n").await.expect("send");
        let mut commands = Vec::new();
        for _ in 0..100 {
            commands.extend(port.poll_commands().await.expect("poll"));
            if commands.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            commands,
            vec![ControlCommand::StreamOff, ControlCommand::Status]
        );

        let bank = SampleBank::new(4, 4);
        let frame = TelemetryFrame::capture(&bank, 1, 0, SystemStatus::Normal);
        port.stream(&frame).await.expect("stream");

        let mut received = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            peer.read_exact(&mut byte).await.expect("read");
            if byte[0] == b'\n' {
                break;
            }
            received.push(byte[0]);
        }
        let value: serde_json::Value = serde_json::from_slice(&received).expect("frame json");
        assert_eq!(value["cycle"], 1);
    }
}

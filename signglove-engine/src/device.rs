//! Upstream device commands
//!
//! Commands are single text lines. The pipeline itself only needs `stream`
//! and `stream:off`; the rest are exposed for tooling.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Start one batch capture
    Start,
    /// Stop batch capture
    Stop,
    /// Start continuous streaming
    Stream,
    /// Stop continuous streaming
    StreamOff,
    /// Set sampling rate in Hz
    Rate(u32),
    /// Run bend-sensor calibration
    Calibrate,
    /// Run IMU calibration
    ImuCalibrate,
    /// Query calibration detail
    CalibrationInfo,
    /// Switch active calibration profile
    Profile(u32),
    /// Tag following samples with a gesture label
    Label(String),
    /// Set trial number for captures
    Trial(u32),
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Start => write!(f, "start"),
            DeviceCommand::Stop => write!(f, "stop"),
            DeviceCommand::Stream => write!(f, "stream"),
            DeviceCommand::StreamOff => write!(f, "stream:off"),
            DeviceCommand::Rate(hz) => write!(f, "rate:{}", hz),
            DeviceCommand::Calibrate => write!(f, "cal"),
            DeviceCommand::ImuCalibrate => write!(f, "imu_cal"),
            DeviceCommand::CalibrationInfo => write!(f, "cal_info"),
            DeviceCommand::Profile(n) => write!(f, "profile:{}", n),
            DeviceCommand::Label(text) => write!(f, "label:{}", text),
            DeviceCommand::Trial(n) => write!(f, "trial:{}", n),
        }
    }
}

impl FromStr for DeviceCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let number = |value: &str| {
            value
                .parse::<u32>()
                .map_err(|_| Error::Device(format!("invalid number in command '{}'", s)))
        };

        let command = match s.split_once(':') {
            None => match s {
                "start" => DeviceCommand::Start,
                "stop" => DeviceCommand::Stop,
                "stream" => DeviceCommand::Stream,
                "cal" => DeviceCommand::Calibrate,
                "imu_cal" => DeviceCommand::ImuCalibrate,
                "cal_info" => DeviceCommand::CalibrationInfo,
                _ => return Err(Error::Device(format!("unknown command '{}'", s))),
            },
            Some(("stream", "off")) => DeviceCommand::StreamOff,
            Some(("rate", value)) => DeviceCommand::Rate(number(value)?),
            Some(("profile", value)) => DeviceCommand::Profile(number(value)?),
            Some(("trial", value)) => DeviceCommand::Trial(number(value)?),
            Some(("label", value)) if !value.is_empty() => DeviceCommand::Label(value.to_string()),
            Some(_) => return Err(Error::Device(format!("unknown command '{}'", s))),
        };
        Ok(command)
    }
}

/// Destination for device commands
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: &DeviceCommand) -> Result<()>;
}

/// Writes each command as one `\n`-terminated line
pub struct WriterSink<W> {
    writer: tokio::sync::Mutex<W>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> CommandSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, command: &DeviceCommand) -> Result<()> {
        let line = format!("{}\n", command);
        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Device(format!("failed to send '{}': {}", command, e)))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::Device(format!("failed to flush '{}': {}", command, e)))?;
        debug!("Sent device command: {}", command);
        Ok(())
    }
}

/// Keeps sent commands in memory; used when no device link is attached
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<DeviceCommand>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<DeviceCommand> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn send(&self, command: &DeviceCommand) -> Result<()> {
        debug!("Recorded device command: {}", command);
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(command.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_and_parse() {
        let commands = [
            (DeviceCommand::Start, "start"),
            (DeviceCommand::StreamOff, "stream:off"),
            (DeviceCommand::Rate(50), "rate:50"),
            (DeviceCommand::ImuCalibrate, "imu_cal"),
            (DeviceCommand::Profile(2), "profile:2"),
            (DeviceCommand::Label("hello".to_string()), "label:hello"),
            (DeviceCommand::Trial(7), "trial:7"),
        ];
        for (command, text) in commands {
            assert_eq!(command.to_string(), text);
            assert_eq!(text.parse::<DeviceCommand>().unwrap(), command);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("reboot".parse::<DeviceCommand>().is_err());
        assert!("rate:fast".parse::<DeviceCommand>().is_err());
        assert!("label:".parse::<DeviceCommand>().is_err());
    }

    #[tokio::test]
    async fn test_writer_sink_writes_lines() {
        let sink = WriterSink::new(Vec::<u8>::new());
        sink.send(&DeviceCommand::Stream).await.unwrap();
        sink.send(&DeviceCommand::StreamOff).await.unwrap();
        assert_eq!(sink.into_inner(), b"stream\nstream:off\n");
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.send(&DeviceCommand::Stream).await.unwrap();
        assert_eq!(sink.sent(), vec![DeviceCommand::Stream]);
    }
}

use std::fs::read_to_string;
use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use transport::EcnCodepoint;

/// Which ECT codepoint a stream marks its outgoing datagrams with.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum EctChoice {
    Ect0,
    Ect1,
}

impl Default for EctChoice {
    fn default() -> Self {
        Self::Ect1
    }
}

impl EctChoice {
    pub fn as_codepoint(self) -> EcnCodepoint {
        match self {
            Self::Ect0 => EcnCodepoint::Ect0,
            Self::Ect1 => EcnCodepoint::Ect1,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Stream {
    ///
    /// local bind address for the RTP/RTCP socket pair (RTCP is carried on
    /// the next port up, per RFC 3550 section 11's convention).
    ///
    pub local: SocketAddr,
    ///
    /// remote peer address.
    ///
    pub remote: SocketAddr,
    ///
    /// packets per probing block. See `congestion::RateState`.
    ///
    #[serde(default = "Stream::packets_in_block")]
    pub packets_in_block: usize,
    ///
    /// ECT codepoint this stream marks its outgoing datagrams with.
    ///
    #[serde(default)]
    pub ect: EctChoice,
    ///
    /// payload budget a generic frame is fragmented against.
    ///
    #[serde(default = "Stream::mtu_payload")]
    pub mtu_payload: usize,
    ///
    /// batch egress datagrams into clustered syscalls where the platform
    /// supports it.
    ///
    #[serde(default = "Stream::system_call_clustering")]
    pub system_call_clustering: bool,
    ///
    /// RTP payload type.
    ///
    #[serde(default = "Stream::payload_kind")]
    pub payload_kind: u8,
    ///
    /// RTP clock rate advance applied once per pushed frame.
    ///
    #[serde(default = "Stream::clock_rate_increment")]
    pub clock_rate_increment: u32,
}

impl Stream {
    pub fn packets_in_block() -> usize {
        10
    }

    pub fn mtu_payload() -> usize {
        1200
    }

    pub fn system_call_clustering() -> bool {
        false
    }

    pub fn payload_kind() -> u8 {
        96
    }

    pub fn clock_rate_increment() -> u32 {
        3000
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Rtcp {
    ///
    /// `RCC_ECN_AGGREGATION_TIME_WINDOW`: receiver-side window duration, in
    /// milliseconds.
    ///
    #[serde(default = "Rtcp::aggregation_window_ms")]
    pub aggregation_window_ms: u64,
    ///
    /// RTCP compound-packet timer: the receiver emits a report at this
    /// cadence even if no window has closed on its own, so a report still
    /// goes out during a quiet period with no incoming RTP.
    ///
    #[serde(default = "Rtcp::timer_interval_ms")]
    pub timer_interval_ms: u64,
    #[serde(default = "Rtcp::enabled")]
    pub enabled: bool,
}

impl Rtcp {
    fn aggregation_window_ms() -> u64 {
        100
    }

    fn timer_interval_ms() -> u64 {
        1000
    }

    fn enabled() -> bool {
        true
    }
}

impl Default for Rtcp {
    fn default() -> Self {
        Self {
            aggregation_window_ms: Self::aggregation_window_ms(),
            timer_interval_ms: Self::timer_interval_ms(),
            enabled: Self::enabled(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub stream: Stream,
    #[serde(default)]
    pub rtcp: Rtcp,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS")
)]
struct Cli {
    ///
    /// Specify the configuration file path.
    ///
    /// Example: rcc-rtp --config /etc/rcc-rtp/config.json5
    ///
    #[arg(long, short)]
    config: String,
}

impl Config {
    ///
    /// Loads configuration from the file path given on the command line.
    ///
    pub fn load() -> Result<Self> {
        Ok(serde_json5::from_str::<Self>(&read_to_string(Cli::parse().config)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let doc = r#"{
            stream: { local: "127.0.0.1:5000", remote: "127.0.0.1:5001" },
        }"#;
        let config: Config = serde_json5::from_str(doc).unwrap();
        assert_eq!(config.stream.packets_in_block, 10);
        assert!(config.rtcp.enabled);
        assert_eq!(config.rtcp.aggregation_window_ms, 100);
    }

    #[test]
    fn overrides_defaults() {
        let doc = r#"{
            stream: {
                local: "127.0.0.1:5000",
                remote: "127.0.0.1:5001",
                "packets-in-block": 20,
                ect: "ect-0",
            },
            rtcp: { "aggregation-window-ms": 50 },
        }"#;
        let config: Config = serde_json5::from_str(doc).unwrap();
        assert_eq!(config.stream.packets_in_block, 20);
        assert_eq!(config.rtcp.aggregation_window_ms, 50);
    }
}

//! Opens the receive side of an ECN-instrumented RTP stream and lets it run,
//! printing nothing itself — the sender-side demo is where ECN reports are
//! logged, since the receiver's job is just to observe and report, not to
//! react. Mirrors the companion `rtcp_receiver` walkthrough.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rcc_rtp::config::{Config, EctChoice, Log, Rtcp, Stream};

const LOCAL_PORT: u16 = 8890;
const REMOTE_PORT: u16 = 8888;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <sender-ip>", args[0]);
        std::process::exit(1);
    }
    let sender_ip = &args[1];

    simple_logger::init_with_level(log::Level::Info)?;
    println!("Starting RTCP hook receiver, sender ip {sender_ip}");

    let config = Arc::new(Config {
        stream: Stream {
            local: format!("0.0.0.0:{LOCAL_PORT}").parse::<SocketAddr>()?,
            remote: format!("{sender_ip}:{REMOTE_PORT}").parse::<SocketAddr>()?,
            packets_in_block: Stream::packets_in_block(),
            ect: EctChoice::default(),
            mtu_payload: Stream::mtu_payload(),
            system_call_clustering: Stream::system_call_clustering(),
            payload_kind: Stream::payload_kind(),
            clock_rate_increment: Stream::clock_rate_increment(),
        },
        rtcp: Rtcp { aggregation_window_ms: 100, ..Rtcp::default() },
        log: Log::default(),
    });

    // The sender side drives `push_frame`; this demo only needs the
    // receive-side `Listener` the library spins up as part of `startup`, so
    // the returned `Stream` handle is kept alive but never fed frames.
    let (_stream, _listener) = rcc_rtp::startup_default(config)?;

    std::thread::sleep(Duration::from_secs(600));
    Ok(())
}

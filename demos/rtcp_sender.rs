//! Sends an RTP stream while reacting to ECN feedback reported back over
//! RTCP, printing every report as it arrives. Mirrors the `rtcp_sender`
//! walkthrough this crate's congestion-control loop was modeled on: a
//! steady-pace camera-like source whose frame size tracks the sender's own
//! idea of the current link capacity.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use congestion::{EcnHook, MIN_BITRATE_KBITS};
use rcc_rtp::config::{Config, EctChoice, Log, Rtcp, Stream};
use rtcp::EcnReport;

const LOCAL_PORT: u16 = 8888;
const REMOTE_PORT: u16 = 8890;
const FRAME_RATE: u32 = 30;

struct PrintingHook {
    congested: AtomicBool,
    capacity_kbits: AtomicU32,
}

impl EcnHook for PrintingHook {
    fn on_ecn_report(&self, report: &EcnReport) {
        println!(
            "ECN Report from: {} packets: {} ecn-ce: {} capacity: {} kbits early_feedback_mode: {}",
            report.ssrc,
            report.packet_count_tw,
            report.ect_ce_count_tw,
            report.capacity_kbits,
            report.early_feedback_mode
        );

        if report.capacity_kbits > 0 {
            self.capacity_kbits.store(report.capacity_kbits, Ordering::SeqCst);
        }

        let was_congested = self.congested.swap(report.early_feedback_mode, Ordering::SeqCst);
        if !was_congested && report.early_feedback_mode {
            self.capacity_kbits.store(MIN_BITRATE_KBITS, Ordering::SeqCst);
            println!("congestion experienced, use min bitrate {MIN_BITRATE_KBITS} kbits");
        } else if was_congested && !report.early_feedback_mode {
            println!("congestion over, bitrate {} kbits", self.capacity_kbits.load(Ordering::SeqCst));
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        eprintln!("Usage: {} <receiver-ip> <link-usage 0..1> <test-duration-s>", args[0]);
        std::process::exit(1);
    }
    let receiver_ip = &args[1];
    let link_usage_scale: f64 = args[2].parse()?;
    let test_duration_s: u64 = args[3].parse()?;

    simple_logger::init_with_level(log::Level::Info)?;

    let config = Arc::new(Config {
        stream: Stream {
            local: format!("0.0.0.0:{LOCAL_PORT}").parse::<SocketAddr>()?,
            remote: format!("{receiver_ip}:{REMOTE_PORT}").parse::<SocketAddr>()?,
            packets_in_block: Stream::packets_in_block(),
            ect: EctChoice::default(),
            mtu_payload: Stream::mtu_payload(),
            system_call_clustering: true,
            payload_kind: Stream::payload_kind(),
            clock_rate_increment: Stream::clock_rate_increment(),
        },
        rtcp: Rtcp::default(),
        log: Log::default(),
    });

    let hook = Arc::new(PrintingHook {
        congested: AtomicBool::new(false),
        capacity_kbits: AtomicU32::new(MIN_BITRATE_KBITS * 4),
    });

    let (mut stream, _listener) = rcc_rtp::startup(config, hook.clone())?;

    let start = Instant::now();
    let deadline = Duration::from_secs(test_duration_s);
    let frame_interval = Duration::from_millis(1000 / FRAME_RATE as u64);

    let mut frame_index: u32 = 0;
    while start.elapsed() < deadline {
        let capacity_kbits = hook.capacity_kbits.load(Ordering::SeqCst) as f64;
        let frame_size_bytes = ((capacity_kbits * 1000.0 * link_usage_scale) / (FRAME_RATE as f64 * 8.0)) as usize;
        println!("Sending RTP frame size {frame_size_bytes} byte");

        let mut buffer = vec![b'a'; frame_size_bytes.max(1)];
        if buffer.len() >= 24 {
            buffer[..3].fill(0);
            buffer[3] = 1;
            buffer[4..24].fill(1); // intra-frame marker, for flavor only
        }

        if let Err(e) = stream.push_frame(&buffer) {
            log::warn!("push_frame failed: {e}");
        }

        frame_index += 1;
        let next_frame_time = frame_interval * frame_index;
        if let Some(remaining) = next_frame_time.checked_sub(start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    println!("Sending finished");
    Ok(())
}

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use congestion::{CapacityEstimator, EstimatorConfig, WindowReport};
use parking_lot::Mutex;
use rtcp::EcnReport;
use rtp::sentinel;
use transport::{DatagramSocket, SocketOptions};

use crate::config::Config;
use crate::stream::bump_port;

/// Receiver-side companion to [`crate::stream::Stream`]: observes incoming
/// RTP datagrams' ECN codepoints, derives window reports via
/// `congestion::CapacityEstimator`, and emits them back to the sender as
/// RTCP ECN reports.
///
/// Runs two threads, per SPEC_FULL section 4.H's "one RTP receive thread;
/// one RTCP timer thread": the RTP thread closes a window (and reports) as
/// soon as one fills or a CE mark arrives, while the timer thread forces a
/// report out on a fixed cadence so a quiet link still gets reports. Both
/// share one `CapacityEstimator` under a lock since either can close the
/// current window.
pub struct Listener {
    shutdown: Arc<AtomicBool>,
    rtp_worker: Option<JoinHandle<()>>,
    timer_worker: Option<JoinHandle<()>>,
}

impl Listener {
    /// `rtp_socket` is the caller's own local RTP socket (see
    /// [`crate::stream::Stream::rtp_socket`]) — a receiver binds its local
    /// receive address, never the remote peer's, so this reuses the socket
    /// `Stream::open` already bound to `config.stream.local` rather than
    /// binding a second, independent socket to the same local address.
    pub fn open(config: &Config, ssrc: u32, rtp_socket: Arc<DatagramSocket>) -> anyhow::Result<Self> {
        let ect = config.stream.ect.as_codepoint();

        // The report-sending socket doesn't need a fixed local port of its
        // own; an ephemeral port is enough since the peer learns our
        // address from the datagram's source address, not from a
        // well-known port.
        let rtcp_socket = Arc::new(DatagramSocket::bind(
            ephemeral_port(config.stream.local),
            SocketOptions { ect, receive_ecn: false, system_call_clustering: false },
        )?);
        let rtcp_peer = bump_port(config.stream.remote);

        let window = Duration::from_millis(config.rtcp.aggregation_window_ms);
        let estimator = Arc::new(Mutex::new(CapacityEstimator::new(EstimatorConfig {
            aggregation_window: window,
        })));
        let rtcp_enabled = config.rtcp.enabled;

        let shutdown = Arc::new(AtomicBool::new(false));

        let shutdown_rtp = shutdown.clone();
        let estimator_rtp = estimator.clone();
        let rtcp_socket_rtp = rtcp_socket.clone();
        let rtp_worker = std::thread::spawn(move || {
            let mut buf = [0u8; 2048];

            while !shutdown_rtp.load(Ordering::SeqCst) {
                match rtp_socket.recv_with_ecn(&mut buf) {
                    Ok((n, _from, ecn)) => {
                        let boundary = sentinel::read(&buf[..n]);
                        let closed = estimator_rtp.lock().observe(n, ecn, boundary);
                        if let Some(window_report) = closed {
                            if rtcp_enabled {
                                send_report(&rtcp_socket_rtp, rtcp_peer, ssrc, window_report);
                            }
                        }
                    }
                    Err(transport::Error::Interrupted) => continue,
                    Err(e) => {
                        log::warn!("rtp receive error: {e}");
                        break;
                    }
                }
            }
        });

        let shutdown_timer = shutdown.clone();
        let timer_interval = Duration::from_millis(config.rtcp.timer_interval_ms);
        let timer_worker = std::thread::spawn(move || {
            while !shutdown_timer.load(Ordering::SeqCst) {
                std::thread::sleep(timer_interval);
                if shutdown_timer.load(Ordering::SeqCst) {
                    break;
                }
                let closed = estimator.lock().close_now();
                if let Some(window_report) = closed {
                    if rtcp_enabled {
                        send_report(&rtcp_socket, rtcp_peer, ssrc, window_report);
                    }
                }
            }
        });

        Ok(Self { shutdown, rtp_worker: Some(rtp_worker), timer_worker: Some(timer_worker) })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.rtp_worker.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.timer_worker.take() {
            let _ = handle.join();
        }
    }
}

fn ephemeral_port(addr: SocketAddr) -> SocketAddr {
    let mut addr = addr;
    addr.set_port(0);
    addr
}

fn send_report(socket: &DatagramSocket, to: SocketAddr, ssrc: u32, window: WindowReport) {
    let report = EcnReport {
        ssrc,
        packet_count_tw: window.packet_count_tw,
        ect_ce_count_tw: window.ect_ce_count_tw,
        capacity_kbits: window.capacity_kbits,
        early_feedback_mode: window.early_feedback_mode,
    };

    let encoded = report.encode();
    if let Err(e) = socket.send(&[&encoded[..]], to) {
        log::warn!("failed to send ecn report: {e}");
    }
}

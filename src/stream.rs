use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use congestion::{apply_report, EcnHook, FrameQueue, FrameQueueOptions, RateState};
use rtcp::{Rtcp, RtcpDecoder};
use transport::{DatagramSocket, SocketOptions};

use crate::config::Config;

/// Ties the frame queue, pacer, ECN-aware transport, and RTCP feedback
/// channel together into the single object an application drives with
/// [`Stream::push_frame`]. This struct only wires collaborators together —
/// the congestion-control algorithm itself lives entirely in the
/// `congestion` crate.
pub struct Stream {
    queue: FrameQueue,
    socket: Arc<DatagramSocket>,
    remote: SocketAddr,
    rate: Arc<RateState>,
    shutdown: Arc<AtomicBool>,
    rtcp_receiver: Option<JoinHandle<()>>,
}

impl Stream {
    pub fn open(config: &Config, hook: Arc<dyn EcnHook>) -> anyhow::Result<Self> {
        let ect = config.stream.ect.as_codepoint();

        // ECN observation is enabled on this socket even though `Stream`
        // itself never reads it: the `Listener` companion (see
        // `crate::listener`) receives the peer's RTP on this same local
        // socket and needs the TOS/TCLASS ancillary data switched on at
        // bind time.
        let socket = Arc::new(DatagramSocket::bind(
            config.stream.local,
            SocketOptions {
                ect,
                receive_ecn: true,
                system_call_clustering: config.stream.system_call_clustering,
            },
        )?);

        let rtcp_local = bump_port(config.stream.local);
        let rtcp_socket = Arc::new(DatagramSocket::bind(
            rtcp_local,
            SocketOptions { ect, receive_ecn: true, system_call_clustering: false },
        )?);

        let rate = RateState::new(1_000_000, config.stream.packets_in_block);

        let queue = FrameQueue::new(
            config.stream.payload_kind,
            config.stream.clock_rate_increment,
            FrameQueueOptions {
                mtu_payload: config.stream.mtu_payload,
                fragment_generic: true,
                authenticate_rtp: false,
            },
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let rtcp_receiver =
            spawn_rtcp_receiver(rtcp_socket, rate.clone(), hook, shutdown.clone());

        Ok(Self {
            queue,
            socket,
            remote: config.stream.remote,
            rate,
            shutdown,
            rtcp_receiver: Some(rtcp_receiver),
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.queue.ssrc()
    }

    /// The RTP socket this stream sends on, bound to `config.stream.local`.
    /// Shared with a co-located [`crate::listener::Listener`] so the two
    /// roles don't each try to bind the same local port.
    pub(crate) fn rtp_socket(&self) -> Arc<DatagramSocket> {
        self.socket.clone()
    }

    /// Fragments, paces, and sends one media frame. See
    /// `congestion::FrameQueue::push_frame` for the full contract.
    pub fn push_frame(&mut self, frame: &[u8]) -> congestion::Result<()> {
        self.queue.push_frame(frame, &self.socket, self.remote, &self.rate)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.rate.shutdown();
        if let Some(handle) = self.rtcp_receiver.take() {
            let _ = handle.join();
        }
    }
}

pub(crate) fn bump_port(addr: SocketAddr) -> SocketAddr {
    let mut addr = addr;
    addr.set_port(addr.port().wrapping_add(1));
    addr
}

fn spawn_rtcp_receiver(
    socket: Arc<DatagramSocket>,
    rate: Arc<RateState>,
    hook: Arc<dyn EcnHook>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut decoder = RtcpDecoder::new();
        let mut buf = [0u8; 2048];

        while !shutdown.load(Ordering::SeqCst) {
            match socket.recv_with_ecn(&mut buf) {
                Ok((n, _from, _ecn)) => {
                    decoder.extend(&buf[..n]);
                    while let Ok(Some(packet)) = decoder.accept() {
                        if let Rtcp::Ecn(report) = packet {
                            hook.on_ecn_report(&report);
                            apply_report(&rate, &report);
                        }
                    }
                }
                Err(transport::Error::Interrupted) => continue,
                Err(e) => {
                    log::warn!("rtcp receive error: {e}");
                    break;
                }
            }
        }
    })
}

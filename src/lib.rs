pub mod config;
pub mod listener;
pub mod stream;

use std::sync::Arc;

use config::Config;
use congestion::{EcnHook, NoopHook};
use listener::Listener;
use stream::Stream;

/// Opens the sender-side [`Stream`] and, unless the configuration disables
/// RTCP feedback, the receiver-side [`Listener`] that drives it. Mirrors the
/// shape of a production entry point that wires collaborators together and
/// then parks: ours blocks on `push_frame` calls from its caller rather than
/// serving requests, so there is nothing analogous to await here — the
/// caller owns the returned `Stream` and is expected to keep calling
/// `push_frame` for the lifetime of the session.
pub fn startup(config: Arc<Config>, hook: Arc<dyn EcnHook>) -> anyhow::Result<(Stream, Option<Listener>)> {
    let stream = Stream::open(&config, hook)?;
    let ssrc = stream.ssrc();

    let listener = if config.rtcp.enabled {
        Some(Listener::open(&config, ssrc, stream.rtp_socket())?)
    } else {
        None
    };

    Ok((stream, listener))
}

/// Convenience entry point for callers that don't need to observe ECN
/// reports themselves; the controller still reacts to them internally.
pub fn startup_default(config: Arc<Config>) -> anyhow::Result<(Stream, Option<Listener>)> {
    startup(config, Arc::new(NoopHook))
}

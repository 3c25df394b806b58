#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rcc_rtp::config::Config;

fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load()?);
    simple_logger::init_with_level(config.log.level.as_level())?;

    let (mut stream, listener) = rcc_rtp::startup_default(config.clone())?;

    if listener.is_none() {
        log::warn!("RTCP is disabled in configuration; the rate controller will never react to feedback");
    }

    log::info!("stream ssrc={} local={} remote={}", stream.ssrc(), config.stream.local, config.stream.remote);

    let frame = vec![0u8; config.stream.mtu_payload * 2 + 1];
    loop {
        if let Err(e) = stream.push_frame(&frame) {
            log::warn!("push_frame failed: {e}");
        }
        thread::sleep(Duration::from_millis(1000 / 30));
    }
}

pub mod ecn;
pub mod error;
pub mod packet;

pub use ecn::EcnReport;
pub use error::{Error, Result};
pub use packet::{PacketKind, Rtcp, RtcpDecoder};

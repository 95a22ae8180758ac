//! Buffer sources: live CTP7 socket or replay file
//!
//! The variant is fixed at construction. Neither variant retries; failures
//! are returned to the caller.

pub mod live;
pub mod replay;

pub use live::{LiveConfig, LiveSource};
pub use replay::{write_block, BlockReader, ReplaySource};

use crate::common::{DecoderResult, RawBuffer};

/// Where raw buffers come from
pub enum BufferSource {
    Live(LiveSource),
    Replay(ReplaySource),
}

impl BufferSource {
    /// Fetch the next raw buffer
    pub fn acquire(&mut self) -> DecoderResult<RawBuffer> {
        match self {
            Self::Live(source) => source.acquire(),
            Self::Replay(source) => source.acquire(),
        }
    }

    /// Human-readable origin for logs
    pub fn describe(&self) -> String {
        match self {
            Self::Live(source) => format!("live {}", source.endpoint()),
            Self::Replay(source) => format!("replay {}", source.path().display()),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

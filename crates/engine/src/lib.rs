//! The relay engine: dedup ledger semantics, sequence allocation, filename
//! generation, and the polling/retry control loop, all behind a narrow
//! transport seam.
//!
//! Each source file is relayed at most once, even across restarts; sequence
//! numbers are allocated monotonically in processing order; rate-limit
//! signals from the remote service are honored verbatim.

pub mod config;
pub mod error;
pub mod monitor;
pub mod namer;
pub mod pipeline;
pub mod scanner;
pub mod transport;
pub mod types;

pub use {
    config::{RelayConfig, RelayMode},
    error::{Error, Result},
    monitor::Monitor,
    namer::FileNamer,
    pipeline::{RelayOutcome, RelayPipeline},
    scanner::ChannelScanner,
    transport::{DownloadedDocument, SessionInfo, Transport, TransportError},
    types::{ChannelRef, FileFingerprint, RemoteDocument, RemoteMessage},
};

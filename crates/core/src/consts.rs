//! Constant variables.

/// Bit width of the identifier ring.
pub const RING_BITS: usize = 160;
/// Default length of successor list.
pub const DEFAULT_SUCCESSOR_LIST_LEN: usize = 5;
/// Default maintenance period in ms.
pub const DEFAULT_STABILIZE_INTERVAL_MS: u64 = 50;
/// Delay before notifying a successor promoted by successor list repair, in ms.
pub const DEFAULT_NOTIFY_GRACE_MS: u64 = 100;
/// Dial attempts before a peer is considered unreachable.
pub const DEFAULT_DIAL_ATTEMPTS: u32 = 5;
/// Sleep between two dial attempts in ms.
pub const DEFAULT_DIAL_BACKOFF_MS: u64 = 50;
/// Timeout of a single connect attempt in ms.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;
/// Timeout of request/response exchange after dialing, in ms.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;
/// Capacity of a routing bucket, also the number of replicas of a key.
pub const DEFAULT_KAD_BUCKET_SIZE: usize = 20;
/// Period of the republish loop of bucket routing, in ms.
pub const DEFAULT_KAD_REPUBLISH_INTERVAL_MS: u64 = 1_000;
/// 64M
pub const FRAME_MAX_SIZE: usize = 64 * 1024 * 1024;

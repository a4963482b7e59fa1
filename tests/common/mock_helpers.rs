//! Helpers standing in for the device and for plot windows

use crossbeam_channel::Receiver;
use telemetry_cli::backend::MemoryPeer;
use telemetry_cli::store::TransferPoint;
use telemetry_cli::types::Payload;

/// Queue `count` samples `topic 0`, `topic 1`, ... on the device side
pub fn push_counter(peer: &MemoryPeer, topic: &str, count: usize) {
    for i in 0..count {
        peer.push_line(&format!("{} {}", topic, i));
    }
}

/// Everything currently queued on a plot's point stream, as `(x, y)` pairs
pub fn drain_points(points: &Receiver<TransferPoint>) -> Vec<(u64, Payload)> {
    points.try_iter().map(|p| (p.x, p.y)).collect()
}

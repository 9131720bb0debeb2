//! Generation events and the observer interface.
//!
//! Generators report what they did through a [`GenerationObserver`] handed to
//! them at construction. The observer's lifetime is the generator's; there is
//! no global listener list.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::cache::CacheKey;
use crate::heightmap::ChunkCoord;

/// Which complex generator produced an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComplexKindTag {
    Dungeon,
    Settlement,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GenerationEvent {
    /// A chunk height map was generated (not served from cache)
    HeightMapGenerated { chunk: ChunkCoord, size: usize },
    /// A chunk biome map was classified
    BiomeMapGenerated { chunk: ChunkCoord },
    /// A dungeon or settlement finished
    ComplexGenerated { kind: ComplexKindTag, label: String, regions: usize, paths: usize },
    /// Fewer regions were placed than planned
    PlacementShortfall { kind: ComplexKindTag, requested: usize, placed: usize },
    /// Structures were scattered over a chunk
    StructuresScattered { chunk: ChunkCoord, accepted: usize, rejected: usize },
    /// An entry left the shared cache to make room
    CacheEvicted { key: CacheKey },
    /// Stored data failed to decode and was regenerated
    RestoreFailed { key: CacheKey, reason: String },
}

pub trait GenerationObserver: Send + Sync {
    fn on_event(&self, event: &GenerationEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl GenerationObserver for NullObserver {
    fn on_event(&self, _event: &GenerationEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl GenerationObserver for LogObserver {
    fn on_event(&self, event: &GenerationEvent) {
        match event {
            GenerationEvent::HeightMapGenerated { chunk, size } => {
                debug!(chunk_x = chunk.x, chunk_y = chunk.y, size, "height map generated")
            }
            GenerationEvent::BiomeMapGenerated { chunk } => {
                debug!(chunk_x = chunk.x, chunk_y = chunk.y, "biome map generated")
            }
            GenerationEvent::ComplexGenerated { kind, label, regions, paths } => {
                info!(?kind, %label, regions, paths, "complex generated")
            }
            GenerationEvent::PlacementShortfall { kind, requested, placed } => {
                warn!(?kind, requested, placed, "placement budget exhausted, returning partial layout")
            }
            GenerationEvent::StructuresScattered { chunk, accepted, rejected } => {
                debug!(chunk_x = chunk.x, chunk_y = chunk.y, accepted, rejected, "structures scattered")
            }
            GenerationEvent::CacheEvicted { key } => debug!(%key, "cache entry evicted"),
            GenerationEvent::RestoreFailed { key, reason } => {
                warn!(%key, %reason, "stored value unreadable, regenerating")
            }
        }
    }
}

/// Pushes events into a bounded channel. Events are dropped, not blocked on,
/// when the receiver falls behind.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    sender: Sender<GenerationEvent>,
}

impl ChannelObserver {
    pub fn bounded(capacity: usize) -> (Self, Receiver<GenerationEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl GenerationObserver for ChannelObserver {
    fn on_event(&self, event: &GenerationEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => debug!("event channel full, dropping event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_delivers_in_order() {
        let (observer, rx) = ChannelObserver::bounded(8);
        observer.on_event(&GenerationEvent::BiomeMapGenerated { chunk: ChunkCoord::new(1, 2) });
        observer.on_event(&GenerationEvent::HeightMapGenerated { chunk: ChunkCoord::new(0, 0), size: 4 });
        assert_eq!(rx.try_recv().unwrap(), GenerationEvent::BiomeMapGenerated { chunk: ChunkCoord::new(1, 2) });
        assert!(matches!(rx.try_recv().unwrap(), GenerationEvent::HeightMapGenerated { size: 4, .. }));
    }

    #[test]
    fn test_channel_observer_drops_when_full() {
        let (observer, rx) = ChannelObserver::bounded(1);
        for _ in 0..3 {
            observer.on_event(&GenerationEvent::BiomeMapGenerated { chunk: ChunkCoord::new(0, 0) });
        }
        assert_eq!(rx.len(), 1);
    }
}

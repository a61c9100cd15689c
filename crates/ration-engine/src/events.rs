use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ration_protocol::{AllocationEvent, AllocationEventKind};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub const DEFAULT_EVENT_BUFFER: usize = 1024;

// Sequence numbers start at 1 and are shared by clones.
#[derive(Debug, Clone)]
pub struct AllocationEventHub {
    sender: broadcast::Sender<AllocationEvent>,
    sequence: Arc<AtomicU64>,
}

impl AllocationEventHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, kind: AllocationEventKind) -> AllocationEvent {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = AllocationEvent::new(sequence, kind);
        let _ = self.sender.send(event.clone());
        event
    }

    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AllocationEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<AllocationEvent> {
        BroadcastStream::new(self.sender.subscribe())
    }
}

impl Default for AllocationEventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

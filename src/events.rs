//! Fan-out of engine events to any number of in-process listeners.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;

/// Default max buffered events per listener.
pub const DEFAULT_LISTENER_BUFFER: usize = 256;

/// A set of listeners for one kind of event.
///
/// Each listener gets its own bounded channel. A listener whose buffer is
/// full or whose receiver was dropped is removed on the next emit; the
/// receiver then reports a disconnect once drained.
pub struct Listeners<T> {
    senders: RwLock<Vec<Sender<T>>>,
    buffer_size: usize,
}

impl<T: Clone> Listeners<T> {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_LISTENER_BUFFER)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            senders: RwLock::new(Vec::new()),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register a new listener.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = bounded(self.buffer_size);
        self.senders.write().push(tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.senders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `event` to every listener, dropping the ones that cannot take it.
    pub fn emit(&self, event: T) {
        self.senders
            .write()
            .retain(|tx| tx.try_send(event.clone()).is_ok());
    }
}

impl<T: Clone> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_emit_reaches_every_listener() {
        let listeners = Listeners::new();
        let a = listeners.subscribe();
        let b = listeners.subscribe();

        listeners.emit(7u32);

        assert_eq!(a.recv_timeout(Duration::from_millis(100)).unwrap(), 7);
        assert_eq!(b.recv_timeout(Duration::from_millis(100)).unwrap(), 7);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let listeners = Listeners::new();
        let rx = listeners.subscribe();
        let _keep = listeners.subscribe();
        drop(rx);

        listeners.emit(1u32);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_full_listener_is_pruned() {
        let listeners = Listeners::with_buffer_size(1);
        let rx = listeners.subscribe();

        listeners.emit(1u32);
        listeners.emit(2u32);

        assert!(listeners.is_empty());
        // Buffered event is still readable, then the channel reports closed
        assert_eq!(rx.recv().unwrap(), 1);
        assert!(rx.recv().is_err());
    }
}

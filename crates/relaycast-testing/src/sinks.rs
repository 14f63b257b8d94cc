//! Recording emergency sink.

use std::sync::{Arc, Mutex};

use relaycast_delivery::{EmergencyEntry, EmergencySink};

/// Emergency sink that keeps every entry in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmergencySink {
    entries: Arc<Mutex<Vec<EmergencyEntry>>>,
}

impl RecordingEmergencySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries written so far, in write order.
    pub fn entries(&self) -> Vec<EmergencyEntry> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    /// Number of entries written.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmergencySink for RecordingEmergencySink {
    fn write(&self, entry: &EmergencyEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}

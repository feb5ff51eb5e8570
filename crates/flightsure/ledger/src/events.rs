use chrono::{DateTime, Utc};
use flightsure_types::ConsortiumEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const BROADCAST_CAPACITY: usize = 1024;

/// An event as committed to the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, starting at 1
    pub sequence: u64,
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub event: ConsortiumEvent,
}

/// Append-only event log with live fan-out to subscribers.
///
/// Only committed events reach the log: services buffer events while staging
/// an operation and append them in one batch on success.
#[derive(Debug)]
pub struct EventLog {
    records: Vec<EventRecord>,
    sender: broadcast::Sender<EventRecord>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            records: Vec::new(),
            sender,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a batch of committed events.
    pub fn append_all(&mut self, events: Vec<ConsortiumEvent>) {
        for event in events {
            let record = EventRecord {
                sequence: self.records.len() as u64 + 1,
                id: Uuid::new_v4(),
                recorded_at: Utc::now(),
                event,
            };
            // No receivers is not an error
            let _ = self.sender.send(record.clone());
            self.records.push(record);
        }
    }

    /// Records with a sequence number greater than `sequence`.
    pub fn since(&self, sequence: u64) -> Vec<EventRecord> {
        let start = usize::try_from(sequence)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        self.records[start..].to_vec()
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Receive every event committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flightsure_types::Principal;

    fn registered(name: &str) -> ConsortiumEvent {
        ConsortiumEvent::AffiliateRegistered {
            affiliate: Principal::new(name),
            title: name.to_uppercase(),
        }
    }

    #[test]
    fn sequences_are_contiguous() {
        let mut log = EventLog::new();
        log.append_all(vec![registered("a1"), registered("a2")]);
        log.append_all(vec![registered("a3")]);

        let sequences: Vec<u64> = log.records().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn since_returns_tail() {
        let mut log = EventLog::new();
        log.append_all(vec![registered("a1"), registered("a2"), registered("a3")]);

        let tail = log.since(1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 2);
        assert!(log.since(10).is_empty());
        assert_eq!(log.since(0).len(), 3);
    }

    #[test]
    fn subscribers_receive_appended_events() {
        let mut log = EventLog::new();
        let mut rx = log.subscribe();
        log.append_all(vec![registered("a1")]);

        let record = rx.try_recv().unwrap();
        assert_eq!(record.sequence, 1);
        assert_eq!(record.event, registered("a1"));
    }

    #[test]
    fn records_serialize_with_tagged_event() {
        let mut log = EventLog::new();
        log.append_all(vec![registered("a1")]);
        let json = serde_json::to_value(&log.records()[0]).unwrap();
        assert_eq!(json["sequence"], 1);
        assert_eq!(json["event"]["event"], "affiliate_registered");
    }
}

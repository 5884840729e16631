use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sentinel_proto::telemetry::OutboundRecord;

/// Records waiting for the link, oldest first. Bounded by count and by age;
/// whichever bound is hit evicts from the front.
#[derive(Debug)]
pub struct OutboundBuffer {
    items: VecDeque<(Instant, OutboundRecord)>,
    max_records: usize,
    max_age: Duration,
    dropped: u64,
}

impl OutboundBuffer {
    pub fn new(max_records: usize, max_age: Duration) -> Self {
        let max_records = max_records.max(1);
        Self { items: VecDeque::with_capacity(max_records.min(1024)), max_records, max_age, dropped: 0 }
    }

    /// Appends `rec`, evicting the oldest records if the buffer is full.
    /// Returns how many were evicted.
    pub fn push(&mut self, rec: OutboundRecord, now: Instant) -> usize {
        let aged = self.prune(now);
        let mut overflow = 0;
        while self.items.len() >= self.max_records {
            self.items.pop_front();
            overflow += 1;
        }
        self.items.push_back((now, rec));
        self.dropped += overflow as u64;
        aged + overflow
    }

    /// Drops records older than the age bound.
    pub fn prune(&mut self, now: Instant) -> usize {
        let mut n = 0;
        while let Some((at, _)) = self.items.front() {
            if now.saturating_duration_since(*at) <= self.max_age {
                break;
            }
            self.items.pop_front();
            n += 1;
        }
        self.dropped += n as u64;
        n
    }

    pub fn front(&self) -> Option<&OutboundRecord> {
        self.items.front().map(|(_, r)| r)
    }

    pub fn pop_front(&mut self) -> Option<OutboundRecord> {
        self.items.pop_front().map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total records lost to either bound since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_proto::telemetry::RecordBody;

    fn rec(seq: u64) -> OutboundRecord {
        OutboundRecord::new("v1", seq, 0, RecordBody::Heartbeat)
    }

    fn drain(b: &mut OutboundBuffer) -> Vec<u64> {
        std::iter::from_fn(|| b.pop_front()).map(|r| r.seq).collect()
    }

    #[test]
    fn drains_in_insertion_order() {
        let mut b = OutboundBuffer::new(10, Duration::from_secs(60));
        let now = Instant::now();
        for seq in 1..=5 {
            b.push(rec(seq), now);
        }
        assert_eq!(b.front().map(|r| r.seq), Some(1));
        assert_eq!(drain(&mut b), vec![1, 2, 3, 4, 5]);
        assert!(b.is_empty());
    }

    #[test]
    fn overflow_drops_oldest_and_never_exceeds_bound() {
        let mut b = OutboundBuffer::new(3, Duration::from_secs(60));
        let now = Instant::now();
        let mut evicted = 0;
        for seq in 1..=7 {
            evicted += b.push(rec(seq), now);
            assert!(b.len() <= 3);
        }
        assert_eq!(evicted, 4);
        assert_eq!(b.dropped(), 4);
        assert_eq!(drain(&mut b), vec![5, 6, 7]);
    }

    #[test]
    fn aged_records_are_dropped_first() {
        let mut b = OutboundBuffer::new(10, Duration::from_secs(30));
        let t0 = Instant::now();
        b.push(rec(1), t0);
        b.push(rec(2), t0 + Duration::from_secs(20));
        assert_eq!(b.push(rec(3), t0 + Duration::from_secs(40)), 1);
        assert_eq!(drain(&mut b), vec![2, 3]);
    }
}

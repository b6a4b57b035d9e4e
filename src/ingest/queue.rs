//! Ingestion queue: unbounded, ordered hand-off from turbines to the monitor.
//!
//! Any number of producers (turbine agents or the HTTP endpoint) hold an
//! [`IngestSender`]; the monitor owns the single [`IngestReceiver`]. Records
//! sent from one producer are received in the order they were sent.

use tokio::sync::mpsc;

use crate::types::MetricRecord;

/// The monitor side has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ingestion queue closed")]
pub struct IngestClosed;

/// Create a connected sender/receiver pair.
pub fn ingestion_queue() -> (IngestSender, IngestReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IngestSender { tx }, IngestReceiver { rx })
}

/// Producer handle. Cheap to clone; never blocks.
#[derive(Debug, Clone)]
pub struct IngestSender {
    tx: mpsc::UnboundedSender<MetricRecord>,
}

impl IngestSender {
    pub fn send(&self, record: MetricRecord) -> Result<(), IngestClosed> {
        self.tx.send(record).map_err(|_| IngestClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer handle, owned by the monitor.
#[derive(Debug)]
pub struct IngestReceiver {
    rx: mpsc::UnboundedReceiver<MetricRecord>,
}

impl IngestReceiver {
    /// Wait for the next record. `None` once every sender is dropped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<MetricRecord> {
        self.rx.recv().await
    }

    /// Records waiting to be consumed.
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationalStatus;

    fn record(turbine_id: u32, timestamp: f64) -> MetricRecord {
        MetricRecord {
            turbine_id,
            wind_speed: 10.0,
            power_output_kwh: 100.0,
            status: OperationalStatus::Ok,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_preserves_per_producer_order() {
        let (tx, mut rx) = ingestion_queue();
        let other = tx.clone();

        for i in 0..5 {
            tx.send(record(1, f64::from(i))).unwrap();
            other.send(record(2, f64::from(i))).unwrap();
        }
        drop(tx);
        drop(other);

        let mut seen_1 = Vec::new();
        let mut seen_2 = Vec::new();
        while let Some(r) = rx.recv().await {
            match r.turbine_id {
                1 => seen_1.push(r.timestamp),
                _ => seen_2.push(r.timestamp),
            }
        }
        assert_eq!(seen_1, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(seen_2, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (tx, rx) = ingestion_queue();
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.send(record(1, 0.0)), Err(IngestClosed));
    }

    #[test]
    fn test_backlog_counts_pending_records() {
        let (tx, rx) = ingestion_queue();
        tx.send(record(1, 0.0)).unwrap();
        tx.send(record(1, 1.0)).unwrap();
        assert_eq!(rx.backlog(), 2);
    }
}

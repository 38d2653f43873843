use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery state of one message for one recipient.
///
/// Variants are ordered; a receipt only ever moves to a higher rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent = 0,
    Delivered = 1,
    Read = 2,
}

impl DeliveryStatus {
    pub fn rank(self) -> i16 {
        self as i16
    }

    pub fn from_rank(rank: i16) -> Option<Self> {
        match rank {
            0 => Some(Self::Sent),
            1 => Some(Self::Delivered),
            2 => Some(Self::Read),
            _ => None,
        }
    }

    /// Status after applying `incoming` on top of `self`; never regresses.
    pub fn advance(self, incoming: DeliveryStatus) -> DeliveryStatus {
        self.max(incoming)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub message_id: i64,
    pub user_id: Uuid,
    pub status: DeliveryStatus,
    pub updated_at: DateTime<Utc>,
}

/// Aggregated receipt state shown to a message's sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub status: DeliveryStatus,
    pub delivered_count: usize,
    pub read_count: usize,
}

impl DeliverySummary {
    pub fn from_receipts<'a>(receipts: impl IntoIterator<Item = &'a DeliveryReceipt>) -> Self {
        let mut summary = Self {
            status: DeliveryStatus::Sent,
            delivered_count: 0,
            read_count: 0,
        };
        for receipt in receipts {
            summary.status = summary.status.advance(receipt.status);
            if receipt.status >= DeliveryStatus::Delivered {
                summary.delivered_count += 1;
            }
            if receipt.status == DeliveryStatus::Read {
                summary.read_count += 1;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_never_regresses() {
        assert_eq!(
            DeliveryStatus::Read.advance(DeliveryStatus::Delivered),
            DeliveryStatus::Read
        );
        assert_eq!(
            DeliveryStatus::Sent.advance(DeliveryStatus::Delivered),
            DeliveryStatus::Delivered
        );
        assert_eq!(
            DeliveryStatus::Delivered.advance(DeliveryStatus::Read),
            DeliveryStatus::Read
        );
    }

    #[test]
    fn test_rank_round_trip() {
        for status in [
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Read,
        ] {
            assert_eq!(DeliveryStatus::from_rank(status.rank()), Some(status));
        }
        assert_eq!(DeliveryStatus::from_rank(7), None);
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let receipt = |status| DeliveryReceipt {
            message_id: 1,
            user_id: Uuid::new_v4(),
            status,
            updated_at: now,
        };
        let receipts = vec![receipt(DeliveryStatus::Delivered), receipt(DeliveryStatus::Read)];
        let summary = DeliverySummary::from_receipts(&receipts);
        assert_eq!(summary.status, DeliveryStatus::Read);
        assert_eq!(summary.delivered_count, 2);
        assert_eq!(summary.read_count, 1);

        let empty = DeliverySummary::from_receipts(&Vec::<DeliveryReceipt>::new());
        assert_eq!(empty.status, DeliveryStatus::Sent);
    }
}

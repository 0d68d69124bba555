//! Stock Reservation Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reservation lifecycle
///
/// `Pending → Confirmed` on order commit, `Pending → Expired` by the sweep.
/// Both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    #[default]
    Pending,
    Confirmed,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

/// Advisory hold record (the stock itself is already decremented)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub product_id: i64,
    pub customer_id: i64,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Reservation {
    /// Whether the sweep may reclaim this hold at `now`
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.status == ReservationStatus::Pending && self.expires_at <= now
    }
}

/// Insert payload for a new reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub product_id: i64,
    pub customer_id: i64,
    pub quantity: i32,
    pub created_at: i64,
    pub expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(status: ReservationStatus, expires_at: i64) -> Reservation {
        Reservation {
            id: 1,
            product_id: 10,
            customer_id: 20,
            quantity: 2,
            status,
            created_at: 0,
            expires_at,
        }
    }

    #[test]
    fn test_status_round_trip_via_str() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>(), Ok(status));
        }
        assert!("held".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_only_pending_past_expiry_is_expired() {
        assert!(reservation(ReservationStatus::Pending, 100).is_expired_at(100));
        assert!(!reservation(ReservationStatus::Pending, 101).is_expired_at(100));
        assert!(!reservation(ReservationStatus::Confirmed, 50).is_expired_at(100));
    }
}

//! Stock reservation engine

pub mod error;
pub mod manager;
pub mod sweeper;

pub use error::{StockError, StockResult};
pub use manager::{
    BatchReservation, LineResult, LineStatus, ReserveRequest, StockHold, StockHoldMode,
    StockReservationManager, StockSettings, SweepReport,
};
pub use sweeper::ReservationSweeper;

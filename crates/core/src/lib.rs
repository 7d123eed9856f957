//! `storepulse-core` — shared building blocks for the retail analytics core.
//!
//! Pure value types only: money, time windows, identifiers, clocks and the
//! domain error model. No IO lives here.

pub mod clock;
pub mod error;
pub mod id;
pub mod money;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, ExpenseId, SaleId};
pub use money::Cents;
pub use window::{TimeWindow, TrendInterval};

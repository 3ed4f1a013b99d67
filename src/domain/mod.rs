//! Marketplace domain: statuses and the pure order/payout workflow.
//! Nothing in here touches the database; services load rows, run the
//! transition, then persist whatever changed.

pub mod order;
pub mod payout;
pub mod reference;
pub mod status;

pub use order::{Confirmation, ItemCancellation, OrderAggregate, OrderError};
pub use payout::PayoutError;
pub use status::{CopyCondition, CopyStatus, OrderItemStatus, OrderStatus, PayoutTaskStatus};

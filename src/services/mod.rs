pub mod auth;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payouts;

pub use auth::AuthService;
pub use checkout::{CheckoutResult, CheckoutService};
pub use orders::{OrderDetails, OrderService};
pub use payouts::PayoutService;

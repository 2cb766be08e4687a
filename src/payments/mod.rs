pub mod stripe;
pub mod webhook;

pub use stripe::{CheckoutSession, StripeClient};
pub use webhook::{PgSubscriptionStore, SubscriptionStore};

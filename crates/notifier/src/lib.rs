//! Outbound notification delivery.
//!
//! Producers enqueue into the [`queue::DeliveryQueue`]; the
//! [`dispatcher::Dispatcher`] drains it at a bounded rate through a
//! [`transport::ChatTransport`], fanning out to the chats listed by the
//! [`recipients::RecipientDirectory`] and retrying failures on the
//! [`backoff::BackoffPolicy`] schedule.

pub mod backoff;
pub mod dispatcher;
pub mod mock;
pub mod queue;
pub mod recipients;
pub mod telegram;
pub mod transport;

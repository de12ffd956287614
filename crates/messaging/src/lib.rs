//! Messaging for saga outcomes.
//!
//! - [`DomainEvent`]: the envelope published once a business fact is settled
//! - [`InMemoryMessageBus`]: an explicitly constructed broadcast bus; the
//!   application creates it, registers listeners and shuts it down
//! - [`RetryingConsumer`]: drives one [`EventHandler`] with bounded,
//!   exponentially backed-off retries and a terminal [`DeadLetterSink`]
//!
//! Delivery is at-least-once from the consumer's point of view and lies
//! outside any saga's atomicity.

pub mod bus;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod event;
pub mod handler;
pub mod retry;

pub use bus::{InMemoryMessageBus, MessageBus, Subscription};
pub use consumer::{ConsumerStats, Delivery, RetryingConsumer};
pub use dead_letter::{DeadLetter, DeadLetterSink, InMemoryDeadLetterSink};
pub use error::{HandlerError, MessagingError, Result};
pub use event::DomainEvent;
pub use handler::EventHandler;
pub use retry::RetryPolicy;

//! Bill payment service wiring.
//!
//! [`App::start`] builds the message bus, the in-memory stores and the
//! [`PayBillUseCase`], then subscribes the outcome listeners before any
//! payment runs. [`App::shutdown`] closes the bus and waits for the
//! listeners to drain.

pub mod config;
pub mod error;
pub mod listeners;

use billing::pay_bill::PayBillUseCase;
use billing::services::{
    Bill, InMemoryAnalyticsStore, InMemoryBillingStore, InMemoryNotificationDispatcher,
    InMemoryPaymentStore,
};
use billing::{PAYMENT_FAILED, PayBillOutcome, PayBillRequest};
use common::{CustomerId, Money};
use messaging::{ConsumerStats, InMemoryDeadLetterSink, InMemoryMessageBus, RetryingConsumer};
use tokio::task::JoinHandle;

pub use config::{AppConfig, LogFormat};
pub use error::{AppError, Result};
use listeners::{ManualInterventionAlert, PaymentAuditLog};

/// The use case as wired by [`App`].
pub type PayBill = PayBillUseCase<
    InMemoryBillingStore,
    InMemoryPaymentStore,
    InMemoryNotificationDispatcher,
    InMemoryAnalyticsStore,
    InMemoryMessageBus,
>;

/// A running service instance.
pub struct App {
    pub config: AppConfig,
    pub bus: InMemoryMessageBus,
    pub bills: InMemoryBillingStore,
    pub payments: InMemoryPaymentStore,
    pub notifications: InMemoryNotificationDispatcher,
    pub analytics: InMemoryAnalyticsStore,
    pub dead_letters: InMemoryDeadLetterSink,
    pub audit_log: PaymentAuditLog,
    pub alerts: ManualInterventionAlert,
    pay_bill: PayBill,
    listeners: Vec<(String, JoinHandle<ConsumerStats>)>,
}

impl App {
    /// Creates the bus and stores and starts the listeners.
    pub async fn start(config: AppConfig) -> Result<Self> {
        let bus = InMemoryMessageBus::new(config.bus_capacity);
        let bills = InMemoryBillingStore::new();
        let payments = InMemoryPaymentStore::new();
        let notifications = InMemoryNotificationDispatcher::new();
        let analytics = InMemoryAnalyticsStore::new();
        let dead_letters = InMemoryDeadLetterSink::new();
        let audit_log = PaymentAuditLog::new();
        let alerts = ManualInterventionAlert::new();
        let policy = config.retry_policy();

        let audit = RetryingConsumer::new(audit_log.clone(), dead_letters.clone(), policy)
            .with_pattern("bill.payment.*");
        let alert = RetryingConsumer::new(alerts.clone(), dead_letters.clone(), policy)
            .with_pattern(PAYMENT_FAILED);
        let listeners = vec![
            (
                audit.handler_name().to_string(),
                audit.spawn(bus.subscribe().await?),
            ),
            (
                alert.handler_name().to_string(),
                alert.spawn(bus.subscribe().await?),
            ),
        ];

        let pay_bill = PayBillUseCase::new(
            bills.clone(),
            payments.clone(),
            notifications.clone(),
            analytics.clone(),
            bus.clone(),
        )
        .with_step_timeout(config.step_timeout);

        tracing::info!(
            step_timeout_ms = config.step_timeout.as_millis() as u64,
            bus_capacity = config.bus_capacity,
            listeners = listeners.len(),
            "service started"
        );

        Ok(Self {
            config,
            bus,
            bills,
            payments,
            notifications,
            analytics,
            dead_letters,
            audit_log,
            alerts,
            pay_bill,
            listeners,
        })
    }

    /// Adds a pending bill and returns it.
    pub fn open_bill(&self, customer_id: CustomerId, amount: Money) -> Bill {
        let bill = Bill::new(customer_id, amount);
        self.bills.insert(bill.clone());
        bill
    }

    /// Pays a bill.
    pub async fn pay_bill(&self, request: PayBillRequest) -> Result<PayBillOutcome> {
        Ok(self.pay_bill.execute(request).await?)
    }

    /// Closes the bus and waits for every listener to finish what is
    /// buffered. Returns each listener's totals.
    pub async fn shutdown(self) -> Result<Vec<(String, ConsumerStats)>> {
        self.bus.shutdown().await;

        let mut stats = Vec::with_capacity(self.listeners.len());
        for (name, handle) in self.listeners {
            let totals = handle.await?;
            tracing::info!(listener = %name, ?totals, "listener drained");
            stats.push((name, totals));
        }

        let dead_letters = self.dead_letters.len().await;
        if dead_letters > 0 {
            tracing::warn!(dead_letters, "service stopped with dead letters");
        }
        Ok(stats)
    }
}

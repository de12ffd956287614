//! The pay-bill saga: six steps across four stores, one outcome event.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{BillId, CustomerId, Money, PaymentId, SagaId};
use messaging::MessageBus;
use saga::{SagaDefinition, SagaOrchestrator, SagaResult, SagaStep, StepError, with_timeout};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BillingError, Result};
use crate::events::{BillPaymentEvent, PaymentFailedData, PaymentSucceededData};
use crate::services::{
    AnalyticsEntry, AnalyticsStore, Bill, BillStatus, BillingStore, NotificationDispatcher,
    PaymentStatus, PaymentStore,
};

/// Saga name used in logs, metrics and audit records.
pub const SAGA_NAME: &str = "PayBill";

/// Step name: check the bill exists, belongs to the customer and is payable.
pub const STEP_VERIFY_BILL: &str = "verify_bill";

/// Step name: create a pending payment record.
pub const STEP_CREATE_PAYMENT_RECORD: &str = "create_payment_record";

/// Step name: charge the customer.
pub const STEP_PROCESS_PAYMENT: &str = "process_payment";

/// Step name: mark the bill paid.
pub const STEP_MARK_BILL_PAID: &str = "mark_bill_paid";

/// Step name: tell the customer.
pub const STEP_SEND_NOTIFICATION: &str = "send_notification";

/// Step name: record the payment for reporting.
pub const STEP_RECORD_ANALYTICS: &str = "record_analytics";

/// Time limit applied to each store call when none is configured.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);

const FAILURE_MESSAGE: &str = "Payment could not be processed. Please try again later.";
const SUCCESS_MESSAGE: &str = "Payment completed.";

/// A customer's request to pay a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayBillRequest {
    pub bill_id: BillId,
    pub customer_id: CustomerId,
    pub amount: Money,
}

/// What the customer is told.
///
/// Never carries step names or error text, those stay in the
/// [`SagaResult`] for internal use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayBillResponse {
    pub success: bool,
    pub reference: SagaId,
    pub payment_id: Option<PaymentId>,
    pub message: String,
}

/// Everything one pay-bill call produced.
#[derive(Debug, Clone)]
pub struct PayBillOutcome {
    pub response: PayBillResponse,
    pub result: SagaResult,
    /// Whether the outcome event reached the bus.
    pub event_published: bool,
}

/// Values earlier steps hand forward to later ones within one run.
///
/// Separate from each step's compensation context, which stays private to
/// the step.
#[derive(Debug, Default)]
struct RunState {
    bill: OnceLock<Bill>,
    payment_id: OnceLock<PaymentId>,
}

impl RunState {
    fn bill(&self) -> std::result::Result<&Bill, StepError> {
        self.bill
            .get()
            .ok_or_else(|| StepError::new("bill has not been verified"))
    }

    fn payment_id(&self) -> std::result::Result<PaymentId, StepError> {
        self.payment_id
            .get()
            .copied()
            .ok_or_else(|| StepError::new("payment record has not been created"))
    }
}

struct VerifyBill<B> {
    bills: Arc<B>,
    request: PayBillRequest,
    run: Arc<RunState>,
    timeout: Duration,
}

#[async_trait]
impl<B: BillingStore + 'static> SagaStep for VerifyBill<B> {
    type Context = ();

    fn name(&self) -> &str {
        STEP_VERIFY_BILL
    }

    async fn execute(&self) -> std::result::Result<(), StepError> {
        let request = self.request;
        let bill = with_timeout(STEP_VERIFY_BILL, self.timeout, async {
            self.bills.get_bill(request.bill_id).await.map_err(StepError::from)
        })
        .await?;

        if bill.customer_id != request.customer_id {
            return Err(BillingError::BillMismatch {
                bill_id: bill.id,
                reason: "bill belongs to another customer".to_string(),
            }
            .into());
        }
        if !request.amount.is_positive() || bill.amount != request.amount {
            return Err(BillingError::BillMismatch {
                bill_id: bill.id,
                reason: format!("amount {} does not match {} owed", request.amount, bill.amount),
            }
            .into());
        }
        if bill.status != BillStatus::Pending {
            return Err(BillingError::BillNotPayable {
                bill_id: bill.id,
                status: bill.status,
            }
            .into());
        }

        self.run
            .bill
            .set(bill)
            .map_err(|_| StepError::new("bill verified twice"))
    }

    // Read-only: nothing to undo.
    async fn compensate(&self, _context: ()) -> std::result::Result<(), StepError> {
        Ok(())
    }
}

struct CreatePaymentRecord<P> {
    payments: Arc<P>,
    request: PayBillRequest,
    run: Arc<RunState>,
    timeout: Duration,
}

#[async_trait]
impl<P: PaymentStore + 'static> SagaStep for CreatePaymentRecord<P> {
    type Context = PaymentId;

    fn name(&self) -> &str {
        STEP_CREATE_PAYMENT_RECORD
    }

    async fn execute(&self) -> std::result::Result<PaymentId, StepError> {
        let request = self.request;
        let record = with_timeout(STEP_CREATE_PAYMENT_RECORD, self.timeout, async {
            self.payments
                .create_payment(request.bill_id, request.customer_id, request.amount)
                .await
                .map_err(StepError::from)
        })
        .await?;

        tracing::debug!(payment_id = %record.id, "payment record created");
        self.run
            .payment_id
            .set(record.id)
            .map_err(|_| StepError::new("payment record created twice"))?;
        Ok(record.id)
    }

    // The record is kept for the audit trail: marked Failed, or left as
    // Refunded when money already moved and came back.
    async fn compensate(&self, payment_id: PaymentId) -> std::result::Result<(), StepError> {
        with_timeout(STEP_CREATE_PAYMENT_RECORD, self.timeout, async {
            let record = self.payments.get_payment(payment_id).await;
            match record {
                Ok(record) if record.status == PaymentStatus::Refunded => Ok(()),
                Ok(_) => self
                    .payments
                    .update_status(payment_id, PaymentStatus::Failed)
                    .await
                    .map_err(StepError::from),
                Err(error) => Err(StepError::from(error)),
            }
        })
        .await
    }
}

struct ProcessPayment<P> {
    payments: Arc<P>,
    run: Arc<RunState>,
    timeout: Duration,
}

#[async_trait]
impl<P: PaymentStore + 'static> SagaStep for ProcessPayment<P> {
    type Context = PaymentId;

    fn name(&self) -> &str {
        STEP_PROCESS_PAYMENT
    }

    async fn execute(&self) -> std::result::Result<PaymentId, StepError> {
        let payment_id = self.run.payment_id()?;
        let transaction_ref = with_timeout(STEP_PROCESS_PAYMENT, self.timeout, async {
            self.payments.process(payment_id).await.map_err(StepError::from)
        })
        .await?;

        tracing::debug!(%payment_id, %transaction_ref, "payment charged");
        Ok(payment_id)
    }

    async fn compensate(&self, payment_id: PaymentId) -> std::result::Result<(), StepError> {
        with_timeout(STEP_PROCESS_PAYMENT, self.timeout, async {
            self.payments.refund(payment_id).await.map_err(StepError::from)
        })
        .await
    }
}

struct MarkBillPaid<B> {
    bills: Arc<B>,
    run: Arc<RunState>,
    timeout: Duration,
}

#[async_trait]
impl<B: BillingStore + 'static> SagaStep for MarkBillPaid<B> {
    /// The bill and the version written by the update.
    type Context = (BillId, u64);

    fn name(&self) -> &str {
        STEP_MARK_BILL_PAID
    }

    async fn execute(&self) -> std::result::Result<(BillId, u64), StepError> {
        let bill = self.run.bill()?;
        let paid = with_timeout(STEP_MARK_BILL_PAID, self.timeout, async {
            self.bills
                .update_status(bill.id, BillStatus::Paid, bill.version)
                .await
                .map_err(StepError::from)
        })
        .await?;
        Ok((paid.id, paid.version))
    }

    async fn compensate(&self, context: (BillId, u64)) -> std::result::Result<(), StepError> {
        let (bill_id, version) = context;
        with_timeout(STEP_MARK_BILL_PAID, self.timeout, async {
            self.bills
                .update_status(bill_id, BillStatus::Pending, version)
                .await
                .map(|_| ())
                .map_err(StepError::from)
        })
        .await
    }
}

struct SendNotification<N> {
    notifications: Arc<N>,
    request: PayBillRequest,
    timeout: Duration,
}

#[async_trait]
impl<N: NotificationDispatcher + 'static> SagaStep for SendNotification<N> {
    type Context = Uuid;

    fn name(&self) -> &str {
        STEP_SEND_NOTIFICATION
    }

    async fn execute(&self) -> std::result::Result<Uuid, StepError> {
        let message = format!(
            "Payment of {} received for bill {}",
            self.request.amount, self.request.bill_id
        );
        with_timeout(STEP_SEND_NOTIFICATION, self.timeout, async {
            self.notifications
                .send(self.request.customer_id, &message)
                .await
                .map_err(StepError::from)
        })
        .await
    }

    async fn compensate(&self, notification_id: Uuid) -> std::result::Result<(), StepError> {
        with_timeout(STEP_SEND_NOTIFICATION, self.timeout, async {
            self.notifications.retract(notification_id).await.map_err(StepError::from)
        })
        .await
    }
}

struct RecordAnalytics<A> {
    analytics: Arc<A>,
    request: PayBillRequest,
    timeout: Duration,
}

#[async_trait]
impl<A: AnalyticsStore + 'static> SagaStep for RecordAnalytics<A> {
    type Context = Uuid;

    fn name(&self) -> &str {
        STEP_RECORD_ANALYTICS
    }

    async fn execute(&self) -> std::result::Result<Uuid, StepError> {
        let request = self.request;
        let entry = AnalyticsEntry::new(request.bill_id, request.customer_id, request.amount);
        with_timeout(STEP_RECORD_ANALYTICS, self.timeout, async {
            self.analytics.record(entry).await.map_err(StepError::from)
        })
        .await
    }

    async fn compensate(&self, entry_id: Uuid) -> std::result::Result<(), StepError> {
        with_timeout(STEP_RECORD_ANALYTICS, self.timeout, async {
            self.analytics.remove(entry_id).await.map_err(StepError::from)
        })
        .await
    }
}

/// Pays a bill across the billing, payment, notification and analytics
/// stores, then announces the outcome on the bus.
///
/// The bus is passed in by whoever wires the application; publishing
/// happens after the saga finished and is not part of its atomicity. A
/// failed publish is logged and reported in
/// [`PayBillOutcome::event_published`], it never changes the saga outcome.
pub struct PayBillUseCase<B, P, N, A, M> {
    bills: Arc<B>,
    payments: Arc<P>,
    notifications: Arc<N>,
    analytics: Arc<A>,
    bus: Arc<M>,
    orchestrator: SagaOrchestrator,
    step_timeout: Duration,
}

impl<B, P, N, A, M> PayBillUseCase<B, P, N, A, M>
where
    B: BillingStore + 'static,
    P: PaymentStore + 'static,
    N: NotificationDispatcher + 'static,
    A: AnalyticsStore + 'static,
    M: MessageBus,
{
    pub fn new(bills: B, payments: P, notifications: N, analytics: A, bus: M) -> Self {
        Self {
            bills: Arc::new(bills),
            payments: Arc::new(payments),
            notifications: Arc::new(notifications),
            analytics: Arc::new(analytics),
            bus: Arc::new(bus),
            orchestrator: SagaOrchestrator::new(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Sets the time limit for each store call.
    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    fn definition(&self, request: PayBillRequest, run: &Arc<RunState>) -> SagaDefinition {
        let timeout = self.step_timeout;
        SagaDefinition::new(SAGA_NAME)
            .step(VerifyBill {
                bills: self.bills.clone(),
                request,
                run: run.clone(),
                timeout,
            })
            .step(CreatePaymentRecord {
                payments: self.payments.clone(),
                request,
                run: run.clone(),
                timeout,
            })
            .step(ProcessPayment {
                payments: self.payments.clone(),
                run: run.clone(),
                timeout,
            })
            .step(MarkBillPaid {
                bills: self.bills.clone(),
                run: run.clone(),
                timeout,
            })
            .step(SendNotification {
                notifications: self.notifications.clone(),
                request,
                timeout,
            })
            .step(RecordAnalytics {
                analytics: self.analytics.clone(),
                request,
                timeout,
            })
    }

    /// Runs the saga for `request`.
    ///
    /// Returns `Err` only if the saga definition is rejected. A failed
    /// payment is an `Ok` outcome with `response.success == false`.
    #[tracing::instrument(
        skip(self, request),
        fields(bill_id = %request.bill_id, customer_id = %request.customer_id)
    )]
    pub async fn execute(&self, request: PayBillRequest) -> Result<PayBillOutcome> {
        let run = Arc::new(RunState::default());
        let result = self
            .orchestrator
            .execute_saga(self.definition(request, &run))
            .await?;
        audit(&result);

        let payment_id = run.payment_id.get().copied();
        let event = outcome_event(&request, payment_id, &result);
        let event_published = self.publish(event).await;

        let response = if result.success() {
            PayBillResponse {
                success: true,
                reference: result.saga_id(),
                payment_id,
                message: SUCCESS_MESSAGE.to_string(),
            }
        } else {
            PayBillResponse {
                success: false,
                reference: result.saga_id(),
                payment_id: None,
                message: FAILURE_MESSAGE.to_string(),
            }
        };

        Ok(PayBillOutcome {
            response,
            result,
            event_published,
        })
    }

    async fn publish(&self, event: BillPaymentEvent) -> bool {
        let event_type = event.event_type();
        let envelope = match event.into_domain_event() {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::error!(event_type, %error, "outcome event could not be encoded");
                return false;
            }
        };
        match self.bus.publish(envelope).await {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(event_type, %error, "outcome event was not published");
                false
            }
        }
    }
}

fn outcome_event(
    request: &PayBillRequest,
    payment_id: Option<PaymentId>,
    result: &SagaResult,
) -> BillPaymentEvent {
    if result.success() {
        BillPaymentEvent::Succeeded(PaymentSucceededData {
            saga_id: result.saga_id(),
            bill_id: request.bill_id,
            customer_id: request.customer_id,
            payment_id,
            amount: request.amount,
            paid_at: result.finished_at().unwrap_or_else(Utc::now),
        })
    } else {
        BillPaymentEvent::Failed(PaymentFailedData {
            saga_id: result.saga_id(),
            bill_id: request.bill_id,
            customer_id: request.customer_id,
            amount: request.amount,
            failed_step: result.failed_step().map(str::to_string),
            reason: result.error().map(ToString::to_string),
            needs_manual_intervention: result.needs_manual_intervention(),
            failed_at: result.finished_at().unwrap_or_else(Utc::now),
        })
    }
}

fn audit(result: &SagaResult) {
    match serde_json::to_string(result) {
        Ok(record) => tracing::info!(
            saga_id = %result.saga_id(),
            success = result.success(),
            audit = %record,
            "saga audit record"
        ),
        Err(error) => tracing::error!(saga_id = %result.saga_id(), %error, "saga audit record could not be encoded"),
    }
    for error in result.compensation_errors() {
        tracing::error!(
            saga_id = %result.saga_id(),
            %error,
            manual_intervention = true,
            "payment rollback incomplete"
        );
    }
}

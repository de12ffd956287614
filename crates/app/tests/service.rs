//! Service-level tests: payments flow through the bus to the listeners.

use std::time::Duration;

use app::{App, AppConfig};
use billing::PayBillRequest;
use common::{CustomerId, Money};
use saga::SagaState;

fn test_config() -> AppConfig {
    AppConfig {
        step_timeout: Duration::from_millis(500),
        bus_capacity: 32,
        retry_max_attempts: 2,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_outcomes_reach_the_audit_log() {
    let app = App::start(test_config()).await.unwrap();
    let customer = CustomerId::new();

    let paid = app.open_bill(customer, Money::from_dollars(30));
    let declined = app.open_bill(customer, Money::from_dollars(45));

    let ok = app
        .pay_bill(PayBillRequest {
            bill_id: paid.id,
            customer_id: customer,
            amount: paid.amount,
        })
        .await
        .unwrap();
    assert!(ok.response.success);

    app.payments.set_decline(Some("card expired"));
    let failed = app
        .pay_bill(PayBillRequest {
            bill_id: declined.id,
            customer_id: customer,
            amount: declined.amount,
        })
        .await
        .unwrap();
    assert!(!failed.response.success);
    assert_eq!(failed.result.state(), SagaState::Failed);

    let audit_log = app.audit_log.clone();
    let alerts = app.alerts.clone();
    let dead_letters = app.dead_letters.clone();
    let stats = app.shutdown().await.unwrap();

    assert_eq!(audit_log.tally().await, (1, 1));
    assert!(alerts.flagged().await.is_empty());
    assert!(dead_letters.is_empty().await);

    let names: Vec<_> = stats.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["payment_audit_log", "manual_intervention_alert"]);
    // The alert listener only subscribes to failures.
    assert_eq!(stats[1].1.handled, 1);
    assert_eq!(stats[1].1.skipped, 1);
}

#[tokio::test]
async fn test_incomplete_rollback_raises_alert() {
    let app = App::start(test_config()).await.unwrap();
    let customer = CustomerId::new();
    let bill = app.open_bill(customer, Money::from_cents(9_900));

    app.analytics.set_fail_on_record(true);
    app.notifications.set_fail_on_retract(true);

    let outcome = app
        .pay_bill(PayBillRequest {
            bill_id: bill.id,
            customer_id: customer,
            amount: bill.amount,
        })
        .await
        .unwrap();
    assert!(outcome.result.needs_manual_intervention());

    let alerts = app.alerts.clone();
    app.shutdown().await.unwrap();

    let flagged = alerts.flagged().await;
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].saga_id, outcome.result.saga_id());
    assert_eq!(flagged[0].failed_step.as_deref(), Some("record_analytics"));
}

#[tokio::test]
async fn test_shutdown_closes_the_bus() {
    let app = App::start(test_config()).await.unwrap();
    let bus = app.bus.clone();

    let stats = app.shutdown().await.unwrap();

    assert!(bus.is_closed().await);
    assert!(stats.iter().all(|(_, s)| s.handled == 0));
}

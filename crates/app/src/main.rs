//! Service entry point: runs a few bill payments and reports metrics.

use app::{App, AppConfig, LogFormat};
use billing::PayBillRequest;
use common::{CustomerId, Money};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Pays one bill successfully, then has the processor decline a second.
async fn run_payments(app: &App) -> app::Result<()> {
    let customer = CustomerId::new();

    let electricity = app.open_bill(customer, Money::from_dollars(120));
    let outcome = app
        .pay_bill(PayBillRequest {
            bill_id: electricity.id,
            customer_id: customer,
            amount: electricity.amount,
        })
        .await?;
    tracing::info!(response = ?outcome.response, "electricity bill");

    let water = app.open_bill(customer, Money::from_cents(4_550));
    app.payments.set_decline(Some("insufficient funds"));
    let outcome = app
        .pay_bill(PayBillRequest {
            bill_id: water.id,
            customer_id: customer,
            amount: water.amount,
        })
        .await?;
    app.payments.set_decline(None);
    tracing::info!(response = ?outcome.response, "water bill");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration and tracing
    let config = AppConfig::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    // 3. Wire the bus, stores and listeners
    let app = App::start(config).await?;

    // 4. Run until done or interrupted
    tokio::select! {
        result = run_payments(&app) => result?,
        () = shutdown_signal() => {}
    }

    // 5. Drain listeners
    let audit_log = app.audit_log.clone();
    let stats = app.shutdown().await?;
    let (succeeded, failed) = audit_log.tally().await;
    tracing::info!(succeeded, failed, listeners = stats.len(), "service shut down gracefully");

    println!("{}", metrics_handle.render());
    Ok(())
}

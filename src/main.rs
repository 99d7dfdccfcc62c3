use library_loans::{
    adapters::postgres::{
        PostgresBookCatalog, PostgresLoanRepository, PostgresUserDirectory, ensure_loan_schema,
    },
    application::loan::{ServiceDependencies, detect_overdue_loans},
    config::AppConfig,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "library_loans=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    tracing::info!(
        max_connections = config.max_connections,
        daily_rate = %config.fine_policy.daily_rate,
        "Starting library loans"
    );

    // Initialize database connection pool
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    // Bring the loans table in line with the declared schema before any work
    ensure_loan_schema(&pool).await?;

    let Some(interval) = config.overdue_sweep_interval else {
        tracing::info!("No overdue sweep interval configured; exiting after schema sync");
        return Ok(());
    };

    // Initialize adapters
    let service_deps = ServiceDependencies {
        loan_repository: Arc::new(PostgresLoanRepository::new(pool.clone())),
        book_catalog: Arc::new(PostgresBookCatalog::new(pool.clone())),
        user_directory: Arc::new(PostgresUserDirectory::new(pool.clone())),
        fine_policy: config.fine_policy,
    };

    tracing::info!(interval_secs = interval.as_secs(), "Overdue sweep running");

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = detect_overdue_loans(&service_deps, chrono::Utc::now()).await {
                    tracing::error!(error = %err, "Overdue sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    pool.close().await;
    Ok(())
}

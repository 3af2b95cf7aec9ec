use budget_planner::{
    config::{database, settings},
    core::{monthly, workflow::DssWorkflow},
    errors::Result,
};
use chrono::Utc;
use dotenvy::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = settings::load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Connect and create tables
    let database_url = database::resolve_database_url(app_config.database_url.as_deref());
    if database_url == database::DEFAULT_DATABASE_URL {
        std::fs::create_dir_all("data")?;
    }
    let db = database::create_connection(&database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))?;

    // 5. Close months whose period has ended and open their successors
    let sweep = monthly::close_expired_months(&db, Utc::now().date_naive()).await?;
    info!("{}", monthly::format_close_summary(&sweep));
    for closed in &sweep.closed {
        if let Err(e) = monthly::open_following_month(&db, closed.month_id, &closed.user_id).await {
            warn!("Could not open the month after {}: {}", closed.month_id, e);
        }
    }

    // 6. Planning service, ready for a transport layer to drive it
    let workflow = DssWorkflow::from_config(db, &app_config);
    info!(
        "Planning service ready (staging {}, debt share {:.0}%)",
        if app_config.staging.enabled { "enabled" } else { "disabled" },
        app_config.dss.default_debt_allocation_pct * 100.0
    );
    workflow.db().ping().await?;

    Ok(())
}

use forgepay_infra::{App, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    forgepay_observability::init_with_filter(&config.log_filter);

    let app = App::from_config(config).await?;
    let scheduler = app.scheduler().start();
    tracing::info!("forgepay worker running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    scheduler.shutdown().await;
    Ok(())
}

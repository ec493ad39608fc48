//! Application lifecycle: connect, register modules, migrate, serve.

use anyhow::Context;
use shelf_kernel::{settings::Settings, InitCtx, ModuleRegistry};
use sqlx::SqlitePool;

/// Register modules, initialize them and bring the schema up to date.
pub async fn prepare(settings: &Settings, pool: &SqlitePool) -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    crate::modules::register_all(&mut registry, pool)?;

    let ctx = InitCtx {
        settings,
        db: pool,
    };
    registry.init_all(&ctx).await?;

    let applied = shelf_db::migrate(pool, &registry.collect_migrations())
        .await
        .context("failed to apply migrations")?;
    tracing::info!(applied, "schema up to date");

    Ok(registry)
}

/// Apply pending migrations and exit. Returns how many were applied.
pub async fn migrate(settings: &Settings) -> anyhow::Result<usize> {
    let pool = shelf_db::connect(&settings.database).await?;

    let mut registry = ModuleRegistry::new();
    crate::modules::register_all(&mut registry, &pool)?;

    let applied = shelf_db::migrate(&pool, &registry.collect_migrations()).await?;
    pool.close().await;
    Ok(applied)
}

/// Run the HTTP service until a shutdown signal arrives.
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let pool = shelf_db::connect(&settings.database).await?;
    let registry = prepare(settings, &pool).await?;

    let ctx = InitCtx {
        settings,
        db: &pool,
    };
    registry.start_all(&ctx).await?;

    let served = shelf_http::start_server(&registry, settings).await;

    registry.stop_all().await?;
    pool.close().await;
    tracing::info!("shelf-app stopped");

    served
}

use async_trait::async_trait;
use axum::Router;
use sqlx::SqlitePool;

/// What a module sees while the service boots.
///
/// The same context is handed to [`Module::init`] (before migrations) and
/// [`Module::start`] (after them), so `db` may not hold the module's tables yet
/// during `init`.
pub struct InitCtx<'a> {
    pub settings: &'a crate::settings::Settings,
    /// Pool shared by every module; owned by the application.
    pub db: &'a SqlitePool,
}

/// A named SQL script contributed by a module.
///
/// `id` is recorded once applied and must never change afterwards.
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: &'static str,
    pub up: &'static str,
}

/// A feature area of the service, mounted under `/api/{name}`.
#[async_trait]
pub trait Module: Sync + Send {
    /// Route prefix and migration namespace; unique within a registry.
    fn name(&self) -> &'static str;

    /// Check the module's preconditions. Runs before any migration.
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Routes relative to the module's mount point.
    fn routes(&self) -> Router {
        Router::new()
    }

    /// OpenAPI fragment with `paths` relative to the mount point and
    /// `components.schemas`; merged into the service document.
    fn openapi(&self) -> Option<serde_json::Value> {
        None
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![]
    }

    /// Runs once the schema is up to date.
    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

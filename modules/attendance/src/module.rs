use std::sync::Arc;

use arc_swap::ArcSwapOption;
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

use crate::config::AttendanceConfig;
use crate::contract::client::AttendanceApi;
use crate::domain::ports::SystemClock;
use crate::domain::repo::Repositories;
use crate::domain::service::{Service, ServiceConfig};
use crate::gateways::local::AttendanceLocalClient;
use crate::infra::events::TracingEventPublisher;
use crate::infra::storage::{Migrator, SeaOrmAttendanceRepository};

/// Wires the SeaORM repository, the system clock and the tracing event
/// publisher into the domain service.
#[derive(Default)]
pub struct AttendanceModule {
    // Keep the domain service behind ArcSwap for cheap read-mostly access.
    service: ArcSwapOption<Service>,
}

impl Clone for AttendanceModule {
    fn clone(&self) -> Self {
        Self {
            service: ArcSwapOption::new(self.service.load_full()),
        }
    }
}

impl AttendanceModule {
    pub fn init(
        &self,
        conn: DatabaseConnection,
        cfg: &AttendanceConfig,
    ) -> anyhow::Result<Arc<dyn AttendanceApi>> {
        info!("Initializing attendance module");
        let service_config = ServiceConfig::from_config(cfg)?;
        debug!(
            default_timezone = %service_config.default_timezone.name(),
            target = service_config.rollcall.default_target,
            min_gap = service_config.rollcall.min_gap_minutes,
            max_gap = service_config.rollcall.max_gap_minutes,
            "Loaded attendance config"
        );

        let repo = Arc::new(SeaOrmAttendanceRepository::new(conn));
        let service = Arc::new(Service::new(
            Repositories::from_shared(repo),
            Arc::new(TracingEventPublisher),
            Arc::new(SystemClock),
            service_config,
        ));
        self.service.store(Some(service.clone()));

        let api: Arc<dyn AttendanceApi> = Arc::new(AttendanceLocalClient::new(service));
        Ok(api)
    }

    pub async fn migrate(&self, conn: &DatabaseConnection) -> anyhow::Result<()> {
        info!("Running attendance database migrations");
        Migrator::up(conn, None).await?;
        info!("Attendance database migrations completed successfully");
        Ok(())
    }

    pub fn service(&self) -> anyhow::Result<Arc<Service>> {
        self.service
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("Service not initialized"))
    }
}

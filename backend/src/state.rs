use std::sync::Arc;

use crate::{
    config::Config,
    db::connection::DbPool,
    repositories::{
        AlertStore, AuditEventStore, BlockStore, InMemoryAlertStore, InMemoryAuditEventStore,
        InMemoryBlockStore, PgAlertStore, PgAuditEventStore, PgBlockStore,
    },
    services::{
        AlertWorkflow, AuditSink, BlockRegistry, CorrelationEngine, DashboardService,
        PatternMatcher, SecurityMonitor, SiemExporter,
    },
    utils::time::Clock,
};

/// The three stores shared by every security component.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn AuditEventStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub blocks: Arc<dyn BlockStore>,
}

impl Stores {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            events: Arc::new(PgAuditEventStore::new(pool.clone())),
            alerts: Arc::new(PgAlertStore::new(pool.clone())),
            blocks: Arc::new(PgBlockStore::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            events: Arc::new(InMemoryAuditEventStore::new()),
            alerts: Arc::new(InMemoryAlertStore::new()),
            blocks: Arc::new(InMemoryBlockStore::new()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub monitor: SecurityMonitor,
    pub blocks: BlockRegistry,
    pub matcher: Arc<PatternMatcher>,
    pub dashboard: DashboardService,
    pub exporter: SiemExporter,
    pub workflow: AlertWorkflow,
}

impl AppState {
    /// Wires the services over `stores`. Fails only if the signature
    /// patterns do not compile.
    pub fn new(config: Config, stores: Stores, clock: Arc<dyn Clock>) -> Result<Self, regex::Error> {
        let matcher = Arc::new(PatternMatcher::new()?);
        let sink = AuditSink::new(stores.events.clone(), clock.clone());
        let blocks = BlockRegistry::new(stores.blocks.clone(), clock.clone());
        let engine = Arc::new(CorrelationEngine::new(
            stores.events.clone(),
            stores.alerts.clone(),
            blocks.clone(),
            sink.clone(),
            clock.clone(),
            config.auth_path_prefix.clone(),
        ));
        let dashboard = DashboardService::new(
            stores.events.clone(),
            stores.alerts.clone(),
            blocks.clone(),
            clock.clone(),
        );
        let exporter = SiemExporter::new(
            stores.events.clone(),
            config.siem_vendor.clone(),
            config.export_max_limit,
        );
        let workflow = AlertWorkflow::new(stores.alerts, clock);

        Ok(Self {
            config,
            monitor: SecurityMonitor::new(sink, engine),
            blocks,
            matcher,
            dashboard,
            exporter,
            workflow,
        })
    }
}

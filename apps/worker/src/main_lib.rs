use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::file_drop::FileDropGateway;
use ledgersync_connect::{
    ItemSyncPipeline, PlaidItemSyncer, SimpleFinItemSyncer, SyncJobRunner, SyncProgressPayload,
    SyncProgressReporter,
};
use ledgersync_core::accounts::AccountRepositoryTrait;
use ledgersync_core::balances::BalanceMaterializer;
use ledgersync_core::events::{DomainEvent, DomainEventSink};
use ledgersync_core::ledger::LedgerRepositoryTrait;
use ledgersync_core::market_data::NoOpMarketDataImporter;
use ledgersync_core::providers::{
    JsonTransactionNormalizer, ProviderItemRepositoryTrait, ProviderKind,
};
use ledgersync_core::sync::{
    AccountSyncOrchestrator, AccountSyncQueue, SyncRun, SyncRunRepositoryTrait, SyncStatsCollector,
};
use ledgersync_core::telemetry::LogErrorReporter;
use ledgersync_core::transfers::NoOpTransferMatcher;
use ledgersync_storage_sqlite::{
    AccountRepository, BalanceRepository, LedgerRepository, ProviderItemRepository,
    SyncRunRepository,
};

pub struct WorkerState {
    pub runner: SyncJobRunner,
    pub provider_items: Arc<dyn ProviderItemRepositoryTrait>,
    pub gateway: Arc<FileDropGateway>,
}

pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Logs domain events; the worker has no UI to push them to.
struct TracingEventSink;

impl DomainEventSink for TracingEventSink {
    fn emit(&self, event: DomainEvent) {
        tracing::debug!(target: "ledgersync::events", "{:?}", event);
    }
}

struct TracingProgressReporter;

impl SyncProgressReporter for TracingProgressReporter {
    fn report_progress(&self, payload: SyncProgressPayload) {
        tracing::info!(
            "Sync run {} ({} {}): {:?}, {} accounts scheduled{}",
            payload.sync_run_id,
            payload.syncable_type,
            payload.syncable_id,
            payload.status,
            payload.accounts_scheduled,
            payload
                .message
                .map(|m| format!(", {}", m))
                .unwrap_or_default()
        );
    }

    fn report_sync_start(&self, sync_run: &SyncRun) {
        tracing::debug!("Sync run {} started", sync_run.id);
    }

    fn report_sync_complete(&self, sync_run: &SyncRun) {
        self.report_progress(SyncProgressPayload::new(sync_run));
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<WorkerState>> {
    let db_path = ledgersync_storage_sqlite::init(&config.data_dir)?;
    let pool = ledgersync_storage_sqlite::create_pool(&db_path)?;
    ledgersync_storage_sqlite::run_migrations(&pool)?;
    let writer = ledgersync_storage_sqlite::spawn_writer((*pool).clone());
    tracing::info!("Database ready at {}", db_path);

    let accounts: Arc<dyn AccountRepositoryTrait> =
        Arc::new(AccountRepository::new(pool.clone(), writer.clone()));
    let ledger: Arc<dyn LedgerRepositoryTrait> =
        Arc::new(LedgerRepository::new(pool.clone(), writer.clone()));
    let balances = Arc::new(BalanceRepository::new(pool.clone(), writer.clone()));
    let provider_items: Arc<dyn ProviderItemRepositoryTrait> =
        Arc::new(ProviderItemRepository::new(pool.clone(), writer.clone()));
    let sync_runs = Arc::new(SyncRunRepository::new(pool.clone(), writer.clone()));

    let event_sink: Arc<dyn DomainEventSink> = Arc::new(TracingEventSink);
    let stats = SyncStatsCollector::new(sync_runs.clone(), ledger.clone());

    let materializer = Arc::new(
        BalanceMaterializer::new(accounts.clone(), ledger.clone(), balances)
            .with_event_sink(event_sink.clone()),
    );
    let account_sync = Arc::new(AccountSyncOrchestrator::new(
        Arc::new(NoOpMarketDataImporter),
        materializer,
        Arc::new(NoOpTransferMatcher),
        Arc::new(LogErrorReporter),
        stats.clone(),
    ));

    std::fs::create_dir_all(&config.drop_dir)?;
    let gateway = Arc::new(FileDropGateway::new(&config.drop_dir));
    let queue = Arc::new(AccountSyncQueue::new());

    let pipeline = |kind: ProviderKind| {
        ItemSyncPipeline::new(
            gateway.clone(),
            Arc::new(JsonTransactionNormalizer::new(kind.source_tag())),
            provider_items.clone(),
            accounts.clone(),
            ledger.clone(),
            queue.clone(),
            stats.clone(),
        )
        .with_event_sink(event_sink.clone())
    };

    let runner = SyncJobRunner::new(
        account_sync,
        provider_items.clone(),
        accounts.clone(),
        sync_runs as Arc<dyn SyncRunRepositoryTrait>,
        queue.clone(),
    )
    .register(Arc::new(PlaidItemSyncer::new(
        pipeline(ProviderKind::Plaid),
        &config.sync,
    )))
    .register(Arc::new(SimpleFinItemSyncer::new(
        pipeline(ProviderKind::SimpleFin),
        &config.sync,
    )))
    .with_event_sink(event_sink)
    .with_progress_reporter(Arc::new(TracingProgressReporter));

    Ok(Arc::new(WorkerState {
        runner,
        provider_items,
        gateway,
    }))
}

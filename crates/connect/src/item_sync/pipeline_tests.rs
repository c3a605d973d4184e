//! Tests for the provider item pipeline and its two provider front ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use super::*;
use crate::SyncConfig;
use ledgersync_core::accounts::{AccountRepositoryTrait, BalanceAnchor};
use ledgersync_core::balances::MaterializationWindow;
use ledgersync_core::errors::{Error, ProviderError, Result};
use ledgersync_core::events::{DomainEvent, MockDomainEventSink};
use ledgersync_core::providers::{
    FetchRequest, JsonTransactionNormalizer, ProviderAccount, ProviderCheckpoint, ProviderGateway,
    ProviderItem, ProviderItemRepositoryTrait, ProviderItemStatus, ProviderKind, ProviderPayload,
    RemoteAccount,
};
use ledgersync_core::sync::{
    AccountSyncQueue, CancellationToken, ErrorCategory, SyncContext, SyncErrorRecord, SyncRun,
    SyncRunRepositoryTrait, SyncStats, SyncStatsCollector, Syncable,
};
use ledgersync_core::testing::{
    date, manual_account, InMemoryAccountRepository, InMemoryLedgerRepository,
    InMemoryProviderItemRepository, InMemorySyncRunRepository,
};
use ledgersync_core::utils::clock::FixedClock;

fn today() -> NaiveDate {
    date(2024, 6, 30)
}

#[derive(Default)]
struct StubGateway {
    payload: Mutex<ProviderPayload>,
    auth_failure: AtomicBool,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StubGateway {
    fn set_payload(&self, payload: ProviderPayload) {
        *self.payload.lock().unwrap() = payload;
    }

    fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderGateway for StubGateway {
    async fn fetch(&self, _item: &ProviderItem, request: &FetchRequest) -> Result<ProviderPayload> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.auth_failure.load(Ordering::SeqCst) {
            return Err(ProviderError::AuthenticationRequired("login expired".to_string()).into());
        }
        Ok(self.payload.lock().unwrap().clone())
    }
}

fn transactions() -> Value {
    json!([
        {"id": "t-1", "date": "2024-06-28", "amount": "-25.50", "name": "Groceries"},
        {"id": "t-2", "date": "2024-06-29", "amount": 1200, "name": "Payroll"},
        {"id": "t-3", "date": "2024-06-29", "amount": "-4.75"},
        {"date": "2024-06-29", "amount": "-1.00", "name": "No id"},
        {"id": "t-5", "amount": "-9.99"}
    ])
}

fn remote(external_id: &str, transactions: Value) -> RemoteAccount {
    RemoteAccount {
        external_account_id: external_id.to_string(),
        name: format!("Checking {}", external_id),
        currency: "USD".to_string(),
        mask: Some("0000".to_string()),
        transactions: Some(transactions),
        holdings: Some(json!([{"symbol": "VTI"}, {"symbol": "BND"}])),
        balance: Some(dec!(1500)),
        balance_date: Some(today()),
    }
}

fn linked_provider_account(item_id: &str, external_id: &str, account_id: &str) -> ProviderAccount {
    let now = Utc::now();
    ProviderAccount {
        id: format!("pa-{}", external_id),
        provider_item_id: item_id.to_string(),
        external_account_id: external_id.to_string(),
        name: "Checking".to_string(),
        currency: "USD".to_string(),
        mask: None,
        account_id: Some(account_id.to_string()),
        raw_transactions_payload: None,
        raw_holdings_payload: None,
        reported_balance: None,
        reported_balance_date: None,
        created_at: now,
        updated_at: now,
    }
}

struct Harness {
    gateway: Arc<StubGateway>,
    items: Arc<InMemoryProviderItemRepository>,
    accounts: Arc<InMemoryAccountRepository>,
    ledger: Arc<InMemoryLedgerRepository>,
    runs: Arc<InMemorySyncRunRepository>,
    queue: Arc<AccountSyncQueue>,
    events: Arc<MockDomainEventSink>,
    context: SyncContext,
}

impl Harness {
    fn new() -> Self {
        Self {
            gateway: Arc::new(StubGateway::default()),
            items: Arc::new(InMemoryProviderItemRepository::new()),
            accounts: Arc::new(InMemoryAccountRepository::new()),
            ledger: Arc::new(InMemoryLedgerRepository::new()),
            runs: Arc::new(InMemorySyncRunRepository::new()),
            queue: Arc::new(AccountSyncQueue::new()),
            events: Arc::new(MockDomainEventSink::new()),
            context: SyncContext::new("family-1"),
        }
    }

    fn pipeline(&self, source: &str) -> ItemSyncPipeline {
        let stats = SyncStatsCollector::new(self.runs.clone(), self.ledger.clone());
        ItemSyncPipeline::new(
            self.gateway.clone(),
            Arc::new(JsonTransactionNormalizer::new(source)),
            self.items.clone(),
            self.accounts.clone(),
            self.ledger.clone(),
            self.queue.clone(),
            stats,
        )
        .with_event_sink(self.events.clone())
        .with_clock(Arc::new(FixedClock(today())))
    }

    fn plaid(&self) -> PlaidItemSyncer {
        PlaidItemSyncer::new(self.pipeline("plaid"), &SyncConfig::default())
    }

    fn simplefin(&self) -> SimpleFinItemSyncer {
        SimpleFinItemSyncer::new(self.pipeline("simplefin"), &SyncConfig::default())
    }

    /// A Plaid item with one remote account linked to a manual account.
    fn linked_item(&self, kind: ProviderKind) -> ProviderItem {
        let item = ProviderItem::new("family-1".to_string(), kind, "Bank".to_string());
        self.items.insert_item(item.clone());
        self.accounts.insert(manual_account(
            "acc-1",
            BalanceAnchor::new(date(2024, 1, 1), dec!(0)),
        ));
        self.items
            .insert_provider_account(linked_provider_account(&item.id, "ext-1", "acc-1"));
        self.gateway.set_payload(ProviderPayload {
            accounts: vec![remote("ext-1", transactions())],
            next_cursor: Some("cursor-2".to_string()),
        });
        item
    }

    fn start_run(&self, item: &ProviderItem, stats: SyncStats) -> SyncRun {
        let mut run = SyncRun::new(
            "family-1".to_string(),
            Syncable::ProviderItem(item.id.clone()),
            MaterializationWindow::new(Some(date(2024, 6, 1)), None),
        )
        .with_stats(stats);
        run.start().unwrap();
        self.runs.insert(run.clone());
        run
    }

    fn stored_run(&self, run: &SyncRun) -> SyncRun {
        self.runs.get_by_id(&run.id).unwrap()
    }
}

#[tokio::test]
async fn test_full_sync_imports_processes_and_schedules() {
    let h = Harness::new();
    let item = h.linked_item(ProviderKind::Plaid);
    let run = h.start_run(&item, SyncStats::default());

    let outcome = h
        .plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.balances_only);
    assert_eq!(outcome.linked_accounts, 1);
    assert_eq!(outcome.upserted.inserted, 3);
    assert_eq!(outcome.skipped_transactions, 2);
    assert_eq!(outcome.holdings_processed, 2);
    assert_eq!(outcome.scheduled_accounts, vec!["acc-1".to_string()]);

    let entries = h.ledger.all();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.source.as_deref() == Some("plaid")));

    let account = h.accounts.get_by_id("acc-1").unwrap();
    assert_eq!(
        account.reported_balance,
        Some(BalanceAnchor::new(today(), dec!(1500)))
    );

    let scheduled = h.queue.drain_for_parent(&run.id);
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].account_id, "acc-1");
    assert_eq!(scheduled[0].window, run.window());

    let stored_item = h.items.get_item(&item.id).unwrap();
    assert_eq!(
        stored_item.checkpoint,
        Some(ProviderCheckpoint::Cursor {
            cursor: "cursor-2".to_string()
        })
    );
    assert!(stored_item.last_synced_at.is_some());
    assert!(!stored_item.pending_account_setup);

    let stats = h.stored_run(&run).sync_stats;
    let setup = stats.setup.unwrap();
    assert_eq!((setup.total, setup.linked, setup.unlinked), (1, 1, 0));
    assert!(stats.import_started_at.is_some());
    let plaid = stats.transactions["plaid"];
    assert_eq!(plaid.seen, 5);
    assert_eq!(plaid.created, 3);
    assert_eq!(plaid.skipped, 2);
    assert_eq!(stats.holdings["holdings"].processed, 2);
    assert_eq!(stats.health.unwrap().error_count, 0);
    assert!(stats.errors.is_empty());

    assert_eq!(
        h.runs.status_history(&run.id),
        vec![
            "Importing accounts from plaid...",
            "Checking account setup...",
            "Processing transactions...",
            "Scheduling balance recompute...",
            "Recording sync stats...",
        ]
    );
    assert!(h.events.events().contains(&DomainEvent::ledger_entries_changed(
        vec!["acc-1".to_string()],
        3,
        0
    )));
}

#[tokio::test]
async fn test_rerun_with_same_payload_is_idempotent() {
    let h = Harness::new();
    let item = h.linked_item(ProviderKind::Plaid);
    let syncer = h.plaid();

    let first = h.start_run(&item, SyncStats::default());
    syncer
        .perform_sync(&h.context, &item, &first, &CancellationToken::new())
        .await
        .unwrap();

    let item = h.items.get_item(&item.id).unwrap();
    let second = h.start_run(&item, SyncStats::default());
    let outcome = syncer
        .perform_sync(&h.context, &item, &second, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.ledger.all().len(), 3);
    assert_eq!(outcome.upserted.inserted, 0);
    assert_eq!(outcome.upserted.unchanged, 3);
    assert_eq!(h.stored_run(&second).sync_stats.transactions["plaid"].created, 0);
    assert_eq!(
        h.gateway.requests()[1].cursor.as_deref(),
        Some("cursor-2")
    );
}

#[tokio::test]
async fn test_no_linked_accounts_short_circuits() {
    let h = Harness::new();
    let item = ProviderItem::new("family-1".to_string(), ProviderKind::Plaid, "Bank".to_string());
    h.items.insert_item(item.clone());
    h.gateway.set_payload(ProviderPayload {
        accounts: vec![remote("ext-1", transactions()), remote("ext-2", json!([]))],
        next_cursor: None,
    });
    let run = h.start_run(&item, SyncStats::default());

    let outcome = h
        .plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.balances_only);
    assert_eq!(outcome.provider_accounts, 2);
    assert!(h.ledger.all().is_empty());
    assert!(h.queue.is_empty());
    assert!(h.items.get_item(&item.id).unwrap().pending_account_setup);
    assert!(h
        .events
        .events()
        .contains(&DomainEvent::provider_accounts_pending_setup(item.id.clone(), 2)));

    let stats = h.stored_run(&run).sync_stats;
    assert_eq!(stats.setup.unwrap().unlinked, 2);
    assert_eq!(stats.health.unwrap().error_count, 0);
    assert!(stats.transactions.is_empty());
}

#[tokio::test]
async fn test_balances_only_request_keeps_checkpoint() {
    let h = Harness::new();
    let mut item = h.linked_item(ProviderKind::Plaid);
    item.checkpoint = Some(ProviderCheckpoint::Cursor {
        cursor: "cursor-1".to_string(),
    });
    h.items.insert_item(item.clone());
    let run = h.start_run(&item, SyncStats::balances_only());

    let outcome = h
        .plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.balances_only);
    assert!(h.gateway.requests()[0].balances_only);
    assert!(h.ledger.all().is_empty());
    assert!(h.queue.is_empty());
    assert_eq!(h.items.get_item(&item.id).unwrap().cursor(), Some("cursor-1"));
}

#[tokio::test]
async fn test_authentication_failure_flags_item_and_records_error() {
    let h = Harness::new();
    let item = h.linked_item(ProviderKind::Plaid);
    h.gateway.auth_failure.store(true, Ordering::SeqCst);
    let run = h.start_run(&item, SyncStats::default());

    let err = h
        .plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Provider(ProviderError::AuthenticationRequired(_))
    ));
    assert_eq!(
        h.items.get_item(&item.id).unwrap().status,
        ProviderItemStatus::RequiresUpdate
    );
    let stats = h.stored_run(&run).sync_stats;
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].category, ErrorCategory::Authentication);
    assert_eq!(stats.health.unwrap().error_count, 1);
}

#[tokio::test]
async fn test_successful_sync_clears_requires_update() {
    let h = Harness::new();
    let mut item = h.linked_item(ProviderKind::Plaid);
    item.status = ProviderItemStatus::RequiresUpdate;
    h.items.insert_item(item.clone());
    let run = h.start_run(&item, SyncStats::default());

    h.plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        h.items.get_item(&item.id).unwrap().status,
        ProviderItemStatus::Good
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_gateway_times_out() {
    let h = Harness::new();
    let item = h.linked_item(ProviderKind::Plaid);
    *h.gateway.delay.lock().unwrap() = Some(Duration::from_secs(120));
    let config = SyncConfig::default().with_gateway_timeout(Duration::from_secs(5));
    let syncer = PlaidItemSyncer::new(h.pipeline("plaid"), &config);
    let run = h.start_run(&item, SyncStats::default());

    let err = syncer
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Provider(ProviderError::Timeout { seconds: 5, .. })
    ));
    assert_eq!(
        h.stored_run(&run).sync_stats.errors[0].category,
        ErrorCategory::Timeout
    );
    assert!(h.items.list_provider_accounts(&item.id).unwrap()[0]
        .raw_transactions_payload
        .is_none());
}

#[tokio::test]
async fn test_cancelled_before_start_records_nothing() {
    let h = Harness::new();
    let item = h.linked_item(ProviderKind::Plaid);
    let run = h.start_run(&item, SyncStats::default());
    let token = CancellationToken::new();
    token.cancel();

    let err = h
        .plaid()
        .perform_sync(&h.context, &item, &run, &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(h.gateway.requests().is_empty());
    let stats = h.stored_run(&run).sync_stats;
    assert!(stats.errors.is_empty());
    assert!(stats.health.is_none());
}

#[tokio::test]
async fn test_normalization_failure_is_recorded_once() {
    let h = Harness::new();
    let item = h.linked_item(ProviderKind::Plaid);
    h.gateway.set_payload(ProviderPayload {
        accounts: vec![remote(
            "ext-1",
            json!([{"id": "t-1", "date": "June 1st", "amount": "1.00"}]),
        )],
        next_cursor: None,
    });
    let run = h.start_run(&item, SyncStats::default());

    let err = h
        .plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Normalization(_)));
    assert!(h.queue.is_empty());
    let stats = h.stored_run(&run).sync_stats;
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].category, ErrorCategory::Normalization);
}

#[tokio::test]
async fn test_normalization_failure_keeps_checkpoint() {
    let h = Harness::new();
    let mut item = h.linked_item(ProviderKind::Plaid);
    item.checkpoint = Some(ProviderCheckpoint::Cursor {
        cursor: "cursor-1".to_string(),
    });
    h.items.insert_item(item.clone());
    h.gateway.set_payload(ProviderPayload {
        accounts: vec![remote(
            "ext-1",
            json!([{"id": "t-1", "date": "June 1st", "amount": "1.00"}]),
        )],
        next_cursor: Some("cursor-2".to_string()),
    });
    let run = h.start_run(&item, SyncStats::default());

    h.plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap_err();

    // The retry must ask for the same page again.
    assert_eq!(h.items.get_item(&item.id).unwrap().cursor(), Some("cursor-1"));
}

#[tokio::test]
async fn test_unlinked_sync_does_not_skip_history_once_linked() {
    let h = Harness::new();
    let item = ProviderItem::new("family-1".to_string(), ProviderKind::Plaid, "Bank".to_string());
    h.items.insert_item(item.clone());
    h.gateway.set_payload(ProviderPayload {
        accounts: vec![remote("ext-1", transactions())],
        next_cursor: Some("cursor-2".to_string()),
    });
    let syncer = h.plaid();

    let first = h.start_run(&item, SyncStats::default());
    let outcome = syncer
        .perform_sync(&h.context, &item, &first, &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.balances_only);
    assert!(h.items.get_item(&item.id).unwrap().checkpoint.is_none());

    h.accounts.insert(manual_account(
        "acc-1",
        BalanceAnchor::new(date(2024, 1, 1), dec!(0)),
    ));
    let provider_account = h.items.list_provider_accounts(&item.id).unwrap().remove(0);
    h.items
        .link_provider_account(&provider_account.id, Some("acc-1".to_string()))
        .await
        .unwrap();

    let item = h.items.get_item(&item.id).unwrap();
    let second = h.start_run(&item, SyncStats::default());
    let outcome = syncer
        .perform_sync(&h.context, &item, &second, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.balances_only);
    assert_eq!(outcome.upserted.inserted, 3);
    assert_eq!(h.ledger.all().len(), 3);
    let requests = h.gateway.requests();
    assert!(requests.iter().all(|r| r.cursor.is_none()));
    assert_eq!(h.items.get_item(&item.id).unwrap().cursor(), Some("cursor-2"));
}

#[tokio::test]
async fn test_failure_after_earlier_error_keeps_first_error() {
    let h = Harness::new();
    let item = h.linked_item(ProviderKind::Plaid);
    h.gateway.auth_failure.store(true, Ordering::SeqCst);
    let seeded = SyncStats {
        errors: vec![SyncErrorRecord {
            message: "earlier failure".to_string(),
            category: ErrorCategory::Unexpected,
        }],
        ..SyncStats::default()
    };
    let run = h.start_run(&item, seeded);

    h.plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap_err();

    let stats = h.stored_run(&run).sync_stats;
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].message, "earlier failure");
    assert_eq!(stats.errors[0].category, ErrorCategory::Unexpected);
    // The item is still flagged for re-authentication.
    assert_eq!(
        h.items.get_item(&item.id).unwrap().status,
        ProviderItemStatus::RequiresUpdate
    );
}

#[tokio::test]
async fn test_import_repairs_links_by_identifier() {
    let h = Harness::new();
    let item = ProviderItem::new("family-1".to_string(), ProviderKind::Plaid, "Bank".to_string());
    h.items.insert_item(item.clone());
    let mut account = manual_account("acc-9", BalanceAnchor::new(date(2024, 1, 1), dec!(0)));
    account.provider_account_ref = Some("ext-9".to_string());
    h.accounts.insert(account);
    h.gateway.set_payload(ProviderPayload {
        accounts: vec![remote("ext-9", transactions())],
        next_cursor: None,
    });
    let run = h.start_run(&item, SyncStats::default());

    let outcome = h
        .plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.repaired_links, 1);
    assert_eq!(outcome.linked_accounts, 1);
    assert_eq!(outcome.scheduled_accounts, vec!["acc-9".to_string()]);
    let provider_account = &h.items.list_provider_accounts(&item.id).unwrap()[0];
    assert_eq!(provider_account.account_id.as_deref(), Some("acc-9"));
    assert!(h.accounts.get_by_id("acc-9").unwrap().linked);
}

#[tokio::test]
async fn test_simplefin_requests_date_window_and_stores_last_synced() {
    let h = Harness::new();
    let mut item = h.linked_item(ProviderKind::SimpleFin);
    item.checkpoint = Some(ProviderCheckpoint::LastSynced {
        date: date(2024, 6, 25),
    });
    h.items.insert_item(item.clone());
    let run = h.start_run(&item, SyncStats::default());

    let outcome = h
        .simplefin()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap();

    // The run's window starts on June 1st, earlier than the lookback.
    let request = &h.gateway.requests()[0];
    assert_eq!(request.start_date, Some(date(2024, 6, 1)));
    assert_eq!(request.end_date, Some(today()));
    assert!(request.cursor.is_none());

    assert_eq!(outcome.upserted.inserted, 3);
    assert_eq!(
        h.items.get_item(&item.id).unwrap().last_synced_date(),
        Some(today())
    );
    assert_eq!(
        h.stored_run(&run).sync_stats.transactions["simplefin"].created,
        3
    );
}

#[tokio::test]
async fn test_syncer_rejects_other_provider_kind() {
    let h = Harness::new();
    let item = h.linked_item(ProviderKind::SimpleFin);
    let run = h.start_run(&item, SyncStats::default());

    let err = h
        .plaid()
        .perform_sync(&h.context, &item, &run, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SyncState(_)));
    assert!(h.gateway.requests().is_empty());
}

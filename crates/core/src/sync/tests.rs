//! Tests for sync run models, stats merging and the stats collector.

use super::*;
use crate::balances::MaterializationWindow;
use crate::errors::{Error, ProviderError};
use crate::ledger::{LedgerRepositoryTrait, NewLedgerEntry, UpsertSummary};
use crate::testing::{date, InMemoryLedgerRepository, InMemorySyncRunRepository};
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// SyncRun Tests
// ============================================================================

mod sync_run_tests {
    use super::*;

    fn item_run() -> SyncRun {
        SyncRun::new(
            "family-1".to_string(),
            Syncable::ProviderItem("item-1".to_string()),
            MaterializationWindow::new(Some(date(2024, 1, 1)), None),
        )
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = item_run();
        assert!(!run.id.is_empty());
        assert_eq!(run.status, SyncRunStatus::Pending);
        assert!(run.started_at.is_none());
        assert_eq!(run.window().start, Some(date(2024, 1, 1)));
        assert_eq!(run.sync_stats, SyncStats::default());
    }

    #[test]
    fn test_lifecycle_completes_once() {
        let mut run = item_run();
        run.start().unwrap();
        assert_eq!(run.status, SyncRunStatus::Syncing);
        assert!(run.started_at.is_some());

        run.complete().unwrap();
        assert_eq!(run.status, SyncRunStatus::Completed);
        assert!(run.finished_at.is_some());

        assert!(run.fail("late".to_string()).is_err());
        assert!(run.cancel().is_err());
        assert_eq!(run.status, SyncRunStatus::Completed);
        assert!(run.error.is_none());
    }

    #[test]
    fn test_cannot_restart() {
        let mut run = item_run();
        run.start().unwrap();
        assert!(run.start().is_err());
    }

    #[test]
    fn test_fail_records_error() {
        let mut run = item_run();
        run.start().unwrap();
        run.fail("gateway down".to_string()).unwrap();
        assert_eq!(run.status, SyncRunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("gateway down"));
    }

    #[test]
    fn test_child_run_inherits_family_and_parent() {
        let parent = item_run();
        let child = SyncRun::child_of(&parent, "acc-1".to_string(), MaterializationWindow::full());
        assert_eq!(child.family_id, "family-1");
        assert_eq!(child.parent_run_id.as_deref(), Some(parent.id.as_str()));
        assert_eq!(child.syncable, Syncable::Account("acc-1".to_string()));
        assert_ne!(child.id, parent.id);
    }

    #[test]
    fn test_syncable_round_trips_through_parts() {
        let syncable = Syncable::Family("family-9".to_string());
        assert_eq!(
            Syncable::from_parts(syncable.kind(), syncable.id().to_string()),
            Some(syncable)
        );
        assert_eq!(SyncRunStatus::parse("CANCELLED"), Some(SyncRunStatus::Cancelled));
    }
}

// ============================================================================
// SyncStats Tests
// ============================================================================

mod sync_stats_tests {
    use super::*;

    fn transactions(source: &str, seen: usize, created: usize) -> SyncStats {
        SyncStats {
            transactions: BTreeMap::from([(
                source.to_string(),
                TransactionStats {
                    seen,
                    created,
                    updated: 0,
                    skipped: 0,
                },
            )]),
            ..SyncStats::default()
        }
    }

    #[test]
    fn test_merge_sums_counters_per_key() {
        let mut stats = transactions("plaid", 10, 4);
        stats.merge(&transactions("plaid", 5, 1));
        stats.merge(&transactions("simplefin", 2, 2));

        assert_eq!(stats.transactions["plaid"].seen, 15);
        assert_eq!(stats.transactions["plaid"].created, 5);
        assert_eq!(stats.transactions["simplefin"].created, 2);
    }

    #[test]
    fn test_merge_never_drops_keys() {
        let mut stats = SyncStats {
            setup: Some(SetupStats {
                total: 3,
                linked: 2,
                unlinked: 1,
            }),
            holdings: BTreeMap::from([("holdings".to_string(), HoldingsStats { processed: 4 })]),
            ..SyncStats::default()
        };
        stats.merge(&SyncStats::default());
        stats.merge(&transactions("plaid", 1, 1));

        assert_eq!(stats.setup.map(|s| s.linked), Some(2));
        assert_eq!(stats.holdings["holdings"].processed, 4);
        assert!(stats.transactions.contains_key("plaid"));
    }

    #[test]
    fn test_merge_keeps_earliest_import_start_and_appends_errors() {
        let earlier = Utc::now() - Duration::minutes(5);
        let later = Utc::now();
        let mut stats = SyncStats {
            import_started_at: Some(later),
            ..SyncStats::default()
        };
        let timeout = Error::Provider(ProviderError::Timeout {
            provider: "plaid".to_string(),
            seconds: 30,
        });
        stats.merge(&SyncStats {
            import_started_at: Some(earlier),
            errors: vec![SyncErrorRecord::from_error(&timeout)],
            ..SyncStats::default()
        });

        assert_eq!(stats.import_started_at, Some(earlier));
        assert_eq!(stats.first_error().map(|e| e.category), Some(ErrorCategory::Timeout));
    }

    #[test]
    fn test_balances_only_is_sticky() {
        let stats = SyncStats::balances_only().merged(&SyncStats::default());
        assert!(stats.balances_only);
    }

    #[test]
    fn test_stats_json_omits_empty_sections() {
        let json = serde_json::to_value(SyncStats::default()).unwrap();
        assert_eq!(json, serde_json::json!({"balancesOnly": false}));

        let parsed: SyncStats = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, SyncStats::default());
    }
}

// ============================================================================
// SyncStatsCollector Tests
// ============================================================================

mod stats_collector_tests {
    use super::*;

    fn collector() -> (
        SyncStatsCollector,
        Arc<InMemorySyncRunRepository>,
        Arc<InMemoryLedgerRepository>,
        SyncRun,
    ) {
        let runs = Arc::new(InMemorySyncRunRepository::new());
        let ledger = Arc::new(InMemoryLedgerRepository::new());
        let run = SyncRun::new(
            "family-1".to_string(),
            Syncable::ProviderItem("item-1".to_string()),
            MaterializationWindow::full(),
        );
        runs.insert(run.clone());
        (
            SyncStatsCollector::new(runs.clone(), ledger.clone()),
            runs,
            ledger,
            run,
        )
    }

    #[tokio::test]
    async fn test_transaction_stats_count_entries_created_since_import() {
        let (collector, runs, ledger, run) = collector();
        ledger
            .upsert_entries(vec![NewLedgerEntry {
                account_id: "acc-1".to_string(),
                date: date(2024, 1, 1),
                amount: dec!(1),
                currency: "USD".to_string(),
                name: "before".to_string(),
                external_id: Some("old".to_string()),
                source: Some("plaid".to_string()),
            }])
            .await
            .unwrap();

        let started = collector.mark_import_started(&run.id).await.unwrap();
        let summary = ledger
            .upsert_entries(vec![NewLedgerEntry {
                account_id: "acc-1".to_string(),
                date: date(2024, 1, 2),
                amount: dec!(2),
                currency: "USD".to_string(),
                name: "after".to_string(),
                external_id: Some("new".to_string()),
                source: Some("plaid".to_string()),
            }])
            .await
            .unwrap();

        let stats = collector
            .collect_transaction_stats(
                &run.id,
                "plaid",
                &["acc-1".to_string()],
                started,
                summary,
                2,
            )
            .await
            .unwrap();

        assert_eq!(stats.created, 1);
        assert_eq!(stats.seen, 3);
        assert_eq!(stats.skipped, 2);

        let stored = runs.get_by_id(&run.id).unwrap().sync_stats;
        assert_eq!(stored.import_started_at, Some(started));
        assert_eq!(stored.transactions["plaid"], stats);
    }

    #[tokio::test]
    async fn test_collectors_merge_additively() {
        let (collector, runs, _ledger, run) = collector();

        collector
            .collect_holdings_stats(&run.id, "holdings", 3)
            .await
            .unwrap();
        collector
            .collect_holdings_stats(&run.id, "holdings", 2)
            .await
            .unwrap();
        collector
            .collect_transaction_stats(
                &run.id,
                "simplefin",
                &[],
                Utc::now(),
                UpsertSummary {
                    inserted: 0,
                    updated: 1,
                    unchanged: 1,
                },
                0,
            )
            .await
            .unwrap();
        collector.collect_health_stats(&run.id, &[]).await.unwrap();

        let stored = runs.get_by_id(&run.id).unwrap().sync_stats;
        assert_eq!(stored.holdings["holdings"].processed, 5);
        assert_eq!(stored.transactions["simplefin"].updated, 1);
        assert_eq!(stored.health, Some(HealthStats { error_count: 0 }));
        assert!(stored.errors.is_empty());
    }

    #[tokio::test]
    async fn test_first_recorded_failure_wins() {
        let (collector, runs, _ledger, run) = collector();

        let first = Error::Provider(ProviderError::AuthenticationRequired("expired".to_string()));
        let later = Error::Normalization("bad row".to_string());
        assert!(collector.record_failure(&run.id, &first).await.unwrap());
        assert!(!collector.record_failure(&run.id, &later).await.unwrap());

        let stored = runs.get_by_id(&run.id).unwrap().sync_stats;
        assert_eq!(stored.errors.len(), 1);
        assert_eq!(stored.first_error().unwrap().category, ErrorCategory::Authentication);
        assert_eq!(stored.health, Some(HealthStats { error_count: 1 }));
    }

    #[tokio::test]
    async fn test_clean_health_stats_leave_room_for_a_failure() {
        let (collector, runs, _ledger, run) = collector();
        collector.collect_health_stats(&run.id, &[]).await.unwrap();

        let failure = Error::Unexpected("boom".to_string());
        assert!(collector.record_failure(&run.id, &failure).await.unwrap());
        assert_eq!(runs.get_by_id(&run.id).unwrap().sync_stats.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_status_text_is_written() {
        let (collector, runs, _ledger, run) = collector();
        collector
            .set_status_text(&run.id, "Importing accounts...")
            .await
            .unwrap();
        assert_eq!(
            runs.get_by_id(&run.id).unwrap().status_text.as_deref(),
            Some("Importing accounts...")
        );
    }
}

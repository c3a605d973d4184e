//! Property-based integration tests for balance series calculation.
//!
//! These tests check invariants of the forward and reverse calculators and the
//! stats merge across random inputs, using the `proptest` crate.

use chrono::{Duration, NaiveDate, Utc};
use ledgersync_core::accounts::{Account, AccountClassification, BalanceAnchor};
use ledgersync_core::balances::{
    calculate_forward_balances, calculate_reverse_balances, BalanceStrategy, DailyDeltas,
};
use ledgersync_core::sync::{SetupStats, SyncStats, TransactionStats};
use proptest::prelude::*;
use rust_decimal::Decimal;

// =============================================================================
// Generators
// =============================================================================

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Amount in cents between -10,000.00 and 10,000.00.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// Sparse daily deltas over the first `span` days of 2024.
fn arb_deltas(span: i64) -> impl Strategy<Value = DailyDeltas> {
    proptest::collection::btree_map(0..span, arb_amount(), 0..20).prop_map(|days| {
        days.into_iter()
            .map(|(offset, amount)| (base_date() + Duration::days(offset), amount))
            .collect()
    })
}

fn arb_transaction_stats() -> impl Strategy<Value = TransactionStats> {
    (0usize..500, 0usize..500, 0usize..500, 0usize..500).prop_map(
        |(seen, created, updated, skipped)| TransactionStats {
            seen,
            created,
            updated,
            skipped,
        },
    )
}

fn arb_stats() -> impl Strategy<Value = SyncStats> {
    (
        proptest::option::of((0usize..50, 0usize..50)),
        proptest::collection::btree_map(
            prop_oneof![Just("plaid".to_string()), Just("simplefin".to_string())],
            arb_transaction_stats(),
            0..3,
        ),
    )
        .prop_map(|(setup, transactions)| SyncStats {
            setup: setup.map(|(linked, unlinked)| SetupStats {
                total: linked + unlinked,
                linked,
                unlinked,
            }),
            transactions,
            ..SyncStats::default()
        })
}

fn account(linked: bool) -> Account {
    let now = Utc::now().naive_utc();
    Account {
        id: "acc".to_string(),
        family_id: "family".to_string(),
        name: "Account".to_string(),
        currency: "USD".to_string(),
        classification: AccountClassification::Asset,
        linked,
        balance: Decimal::ZERO,
        opening_anchor: None,
        reported_balance: None,
        provider_account_ref: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn sum_between(deltas: &DailyDeltas, from_exclusive: NaiveDate, to_inclusive: NaiveDate) -> Decimal {
    deltas
        .iter()
        .filter(|(date, _)| **date > from_exclusive && **date <= to_inclusive)
        .map(|(_, amount)| *amount)
        .sum()
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Linked accounts always materialize in reverse, manual ones forward.
    #[test]
    fn prop_strategy_follows_linked_flag(linked in any::<bool>()) {
        let expected = if linked { BalanceStrategy::Reverse } else { BalanceStrategy::Forward };
        prop_assert_eq!(account(linked).balance_strategy(), expected);
    }

    /// Going back k days from the reported date subtracts exactly the deltas
    /// of the k most recent days.
    #[test]
    fn prop_reverse_consistency(
        deltas in arb_deltas(60),
        reported_offset in 0i64..60,
        reported_balance in arb_amount(),
    ) {
        let reported = BalanceAnchor::new(base_date() + Duration::days(reported_offset), reported_balance);
        let end = base_date() + Duration::days(70);
        let series = calculate_reverse_balances("acc", reported, &deltas, base_date(), end).unwrap();

        for (date, balance) in series.iter().filter(|(date, _)| *date <= reported.date) {
            let expected = reported.balance - sum_between(&deltas, *date, reported.date);
            prop_assert_eq!(*balance, expected);
        }
    }

    /// Both calculators produce exactly one snapshot per day of the range.
    #[test]
    fn prop_series_are_gapless(
        deltas in arb_deltas(45),
        start_offset in 0i64..20,
        length in 0i64..40,
    ) {
        let start = base_date() + Duration::days(start_offset);
        let end = start + Duration::days(length);
        let anchor = BalanceAnchor::new(base_date(), Decimal::ZERO);

        let forward = calculate_forward_balances("acc", anchor, &deltas, start, end).unwrap();
        let reverse = calculate_reverse_balances("acc", anchor, &deltas, start, end).unwrap();

        for series in [&forward, &reverse] {
            prop_assert_eq!(series.len() as i64, length + 1);
            prop_assert_eq!(series.first().map(|(d, _)| *d), Some(start));
            for pair in series.windows(2) {
                prop_assert_eq!(pair[0].0 + Duration::days(1), pair[1].0);
            }
        }
    }

    /// Recomputing forward over the same entries gives identical rows, and a
    /// window starting mid-series agrees with the full recompute.
    #[test]
    fn prop_forward_is_deterministic(
        deltas in arb_deltas(40),
        opening in arb_amount(),
        split in 0i64..40,
    ) {
        let anchor = BalanceAnchor::new(base_date(), opening);
        let end = base_date() + Duration::days(39);

        let first = calculate_forward_balances("acc", anchor, &deltas, base_date(), end).unwrap();
        let second = calculate_forward_balances("acc", anchor, &deltas, base_date(), end).unwrap();
        prop_assert_eq!(&first, &second);

        let split_date = base_date() + Duration::days(split);
        let tail = calculate_forward_balances("acc", anchor, &deltas, split_date, end).unwrap();
        let expected: Vec<_> = first.into_iter().filter(|(d, _)| *d >= split_date).collect();
        prop_assert_eq!(tail, expected);
    }

    /// Unwinding from the final forward balance reproduces the forward series.
    #[test]
    fn prop_reverse_inverts_forward(
        deltas in arb_deltas(30),
        opening in arb_amount(),
    ) {
        let end = base_date() + Duration::days(29);
        let forward = calculate_forward_balances(
            "acc", BalanceAnchor::new(base_date(), opening), &deltas, base_date(), end,
        ).unwrap();

        let (last_date, last_balance) = *forward.last().unwrap();
        let reverse = calculate_reverse_balances(
            "acc", BalanceAnchor::new(last_date, last_balance), &deltas, base_date(), end,
        ).unwrap();

        prop_assert_eq!(forward, reverse);
    }

    /// Merging stats deltas sums every counter and never loses a key.
    #[test]
    fn prop_stats_merge_is_additive(a in arb_stats(), b in arb_stats()) {
        let merged = a.clone().merged(&b);

        let linked = |s: &SyncStats| s.setup.map_or(0, |s| s.linked);
        prop_assert_eq!(linked(&merged), linked(&a) + linked(&b));

        let mut keys: Vec<&String> = a.transactions.keys().chain(b.transactions.keys()).collect();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(merged.transactions.len(), keys.len());

        let seen = |s: &SyncStats, key: &str| s.transactions.get(key).map_or(0, |t| t.seen);
        for key in keys {
            prop_assert_eq!(seen(&merged, key), seen(&a, key) + seen(&b, key));
        }
    }
}

//! Rebuilds and persists an account's balance series.

use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, info, warn};
use rust_decimal::Decimal;

use super::balance_calculator::{calculate_forward_balances, calculate_reverse_balances};
use super::{
    BalanceRepositoryTrait, BalanceSnapshot, BalanceStrategy, MaterializationResult,
    MaterializationWindow,
};
use crate::accounts::{Account, AccountRepositoryTrait};
use crate::errors::{MaterializationError, Result};
use crate::events::{DomainEvent, DomainEventSink, NoOpDomainEventSink};
use crate::ledger::{daily_net_deltas, LedgerRepositoryTrait};
use crate::utils::clock::{Clock, SystemClock};

/// Resolved write range for one materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WritePlan {
    start: NaiveDate,
    end: NaiveDate,
    /// The plan starts at the series origin, so anything outside it is stale.
    covers_origin: bool,
}

/// Recomputes an account's balance snapshots from its ledger entries.
///
/// Callers must hold the account's lock (see `sync::AccountLockRegistry`):
/// both strategies rewrite the same rows across a multi-day range.
pub struct BalanceMaterializer {
    account_repository: Arc<dyn AccountRepositoryTrait>,
    ledger_repository: Arc<dyn LedgerRepositoryTrait>,
    balance_repository: Arc<dyn BalanceRepositoryTrait>,
    clock: Arc<dyn Clock>,
    event_sink: Arc<dyn DomainEventSink>,
}

impl BalanceMaterializer {
    pub fn new(
        account_repository: Arc<dyn AccountRepositoryTrait>,
        ledger_repository: Arc<dyn LedgerRepositoryTrait>,
        balance_repository: Arc<dyn BalanceRepositoryTrait>,
    ) -> Self {
        Self {
            account_repository,
            ledger_repository,
            balance_repository,
            clock: Arc::new(SystemClock),
            event_sink: Arc::new(NoOpDomainEventSink),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_sink(mut self, event_sink: Arc<dyn DomainEventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    /// Recomputes the account's series with the given strategy.
    ///
    /// The window bounds where entries changed. Forward recomputation extends
    /// it to the end of the existing series, reverse recomputation always
    /// rebuilds back to the series origin, since both directions propagate a
    /// change to every later (forward) or earlier (reverse) day.
    pub async fn materialize(
        &self,
        account: &Account,
        strategy: BalanceStrategy,
        window: MaterializationWindow,
    ) -> Result<MaterializationResult> {
        window.validate(&account.id)?;
        debug!(
            "Materializing balances for account {} ({}, window {:?}..{:?})",
            account.id, strategy, window.start, window.end
        );

        let (plan, balances) = match strategy {
            BalanceStrategy::Forward => self.compute_forward(account, window)?,
            BalanceStrategy::Reverse => self.compute_reverse(account, window)?,
        };

        let snapshots: Vec<BalanceSnapshot> = balances
            .iter()
            .map(|(date, balance)| BalanceSnapshot {
                account_id: account.id.clone(),
                date: *date,
                balance: *balance,
                currency: account.currency.clone(),
            })
            .collect();

        self.balance_repository
            .overwrite_range(&account.id, plan.start, plan.end, &snapshots)
            .await?;

        let stale_snapshots_removed = if plan.covers_origin {
            self.balance_repository
                .delete_outside_range(&account.id, plan.start, plan.end)
                .await?
        } else {
            0
        };

        let current_balance = self.current_balance(&balances, plan.end);
        self.account_repository
            .update_balance(&account.id, current_balance)
            .await?;

        info!(
            "Materialized {} snapshots for account {} ({}, {}..={}), current balance {}",
            snapshots.len(),
            account.id,
            strategy,
            plan.start,
            plan.end,
            current_balance
        );

        self.event_sink.emit(DomainEvent::balances_materialized(
            account.id.clone(),
            plan.start,
            plan.end,
        ));

        Ok(MaterializationResult {
            account_id: account.id.clone(),
            strategy,
            start_date: plan.start,
            end_date: plan.end,
            snapshots_written: snapshots.len(),
            stale_snapshots_removed,
            current_balance,
        })
    }

    /// Materializes with the account's own strategy.
    pub async fn materialize_account(
        &self,
        account: &Account,
        window: MaterializationWindow,
    ) -> Result<MaterializationResult> {
        self.materialize(account, account.balance_strategy(), window)
            .await
    }

    fn compute_forward(
        &self,
        account: &Account,
        window: MaterializationWindow,
    ) -> Result<(WritePlan, Vec<(NaiveDate, Decimal)>)> {
        let anchor =
            account
                .opening_anchor
                .ok_or_else(|| MaterializationError::MissingOpeningAnchor {
                    account_id: account.id.clone(),
                })?;

        let end = self.resolve_end(account, window.end)?;
        if end < anchor.date {
            return Err(MaterializationError::InvalidWindow {
                account_id: account.id.clone(),
                start: anchor.date,
                end,
            }
            .into());
        }

        // A later start is only safe when the day before it is already stored;
        // otherwise the series would have a hole.
        let start = match window.start {
            Some(requested) if requested > anchor.date => {
                let previous_day = requested.pred_opt().unwrap_or(requested);
                if self
                    .balance_repository
                    .get_snapshot(&account.id, previous_day)?
                    .is_some()
                {
                    requested
                } else {
                    debug!(
                        "No snapshot before {} for account {}, recomputing from anchor {}",
                        requested, account.id, anchor.date
                    );
                    anchor.date
                }
            }
            _ => anchor.date,
        };
        let start = start.min(end);

        if let Some(earliest) = self.ledger_repository.earliest_entry_date(&account.id)? {
            if earliest < anchor.date {
                warn!(
                    "Account {} has entries dated before its opening anchor {} (earliest {}); they are ignored",
                    account.id, anchor.date, earliest
                );
            }
        }

        let entries =
            self.ledger_repository
                .list_for_account(&account.id, Some(anchor.date), Some(end))?;
        let deltas = daily_net_deltas(&entries, account.classification);
        let balances = calculate_forward_balances(&account.id, anchor, &deltas, start, end)?;

        Ok((
            WritePlan {
                start,
                end,
                covers_origin: start == anchor.date,
            },
            balances,
        ))
    }

    fn compute_reverse(
        &self,
        account: &Account,
        window: MaterializationWindow,
    ) -> Result<(WritePlan, Vec<(NaiveDate, Decimal)>)> {
        let reported = account.reported_balance.ok_or_else(|| {
            MaterializationError::MissingReportedBalance {
                account_id: account.id.clone(),
            }
        })?;

        let end = self.resolve_end(account, window.end)?.max(reported.date);

        let mut origin = reported.date;
        if let Some(anchor_date) = account.opening_anchor_date() {
            origin = origin.min(anchor_date);
        }
        if let Some(earliest) = self.ledger_repository.earliest_entry_date(&account.id)? {
            origin = origin.min(earliest);
        }

        let entries = self
            .ledger_repository
            .list_for_account(&account.id, Some(origin), Some(end))?;
        let deltas = daily_net_deltas(&entries, account.classification);
        let balances = calculate_reverse_balances(&account.id, reported, &deltas, origin, end)?;

        Ok((
            WritePlan {
                start: origin,
                end,
                covers_origin: true,
            },
            balances,
        ))
    }

    /// Window end, defaulting to today and stretched over any stored snapshots
    /// that lie beyond it.
    fn resolve_end(&self, account: &Account, requested: Option<NaiveDate>) -> Result<NaiveDate> {
        let end = requested.unwrap_or_else(|| self.clock.today());
        let latest_stored = self.balance_repository.latest_snapshot_date(&account.id)?;
        Ok(match latest_stored {
            Some(latest) if latest > end => latest,
            _ => end,
        })
    }

    /// Balance for "today", or the last computed day when the series ends earlier.
    fn current_balance(&self, balances: &[(NaiveDate, Decimal)], end: NaiveDate) -> Decimal {
        let target = self.clock.today().min(end);
        balances
            .iter()
            .rev()
            .find(|(date, _)| *date <= target)
            .or_else(|| balances.last())
            .map(|(_, balance)| *balance)
            .unwrap_or(Decimal::ZERO)
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::accounts::{Account, AccountRepositoryTrait, BalanceAnchor, NewAccount};
use crate::balances::{BalanceRepositoryTrait, BalanceSnapshot};
use crate::errors::{DatabaseError, Error, Result};
use crate::ledger::{LedgerEntry, LedgerRepositoryTrait, NewLedgerEntry, UpsertSummary};
use crate::providers::{
    ProviderAccount, ProviderCheckpoint, ProviderItem, ProviderItemRepositoryTrait,
    ProviderItemStatus, RemoteAccount,
};
use crate::sync::{StatsSink, SyncRun, SyncRunRepositoryTrait, SyncStats};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(what: &str, id: &str) -> Error {
    Error::Database(DatabaseError::NotFound(format!("{} {}", what, id)))
}

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: Mutex<BTreeMap<String, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) {
        guard(&self.accounts).insert(account.id.clone(), account);
    }
}

#[async_trait]
impl AccountRepositoryTrait for InMemoryAccountRepository {
    async fn create(&self, new_account: NewAccount) -> Result<Account> {
        new_account.validate()?;
        let now = Utc::now().naive_utc();
        let account = Account {
            id: new_account
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            family_id: new_account.family_id,
            name: new_account.name,
            currency: new_account.currency,
            classification: new_account.classification,
            linked: new_account.linked,
            balance: Decimal::ZERO,
            opening_anchor: new_account.opening_anchor,
            reported_balance: None,
            provider_account_ref: new_account.provider_account_ref,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.insert(account.clone());
        Ok(account)
    }

    fn get_by_id(&self, account_id: &str) -> Result<Account> {
        guard(&self.accounts)
            .get(account_id)
            .cloned()
            .ok_or_else(|| not_found("account", account_id))
    }

    fn list_by_family(
        &self,
        family_id: &str,
        account_ids: Option<&[String]>,
    ) -> Result<Vec<Account>> {
        Ok(guard(&self.accounts)
            .values()
            .filter(|a| a.family_id == family_id)
            .filter(|a| account_ids.map_or(true, |ids| ids.contains(&a.id)))
            .cloned()
            .collect())
    }

    async fn update_balance(&self, account_id: &str, balance: Decimal) -> Result<()> {
        let mut accounts = guard(&self.accounts);
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| not_found("account", account_id))?;
        account.balance = balance;
        Ok(())
    }

    async fn update_reported_balance(&self, account_id: &str, anchor: BalanceAnchor) -> Result<()> {
        let mut accounts = guard(&self.accounts);
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| not_found("account", account_id))?;
        account.reported_balance = Some(anchor);
        Ok(())
    }

    async fn set_provider_link(
        &self,
        account_id: &str,
        provider_account_ref: Option<String>,
    ) -> Result<Account> {
        let mut accounts = guard(&self.accounts);
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| not_found("account", account_id))?;
        account.linked = provider_account_ref.is_some();
        account.provider_account_ref = provider_account_ref;
        Ok(account.clone())
    }
}

#[derive(Default)]
pub struct InMemoryLedgerRepository {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<LedgerEntry> {
        guard(&self.entries).clone()
    }
}

#[async_trait]
impl LedgerRepositoryTrait for InMemoryLedgerRepository {
    async fn upsert_entries(&self, new_entries: Vec<NewLedgerEntry>) -> Result<UpsertSummary> {
        for entry in &new_entries {
            entry.validate()?;
        }
        let mut entries = guard(&self.entries);
        let mut summary = UpsertSummary::default();
        let now = Utc::now().naive_utc();

        for new_entry in new_entries {
            let existing = new_entry.external_id.as_ref().and_then(|external_id| {
                entries.iter().position(|e| {
                    e.account_id == new_entry.account_id
                        && e.external_id.as_ref() == Some(external_id)
                })
            });
            match existing {
                Some(index) => {
                    let entry = &mut entries[index];
                    let unchanged = entry.date == new_entry.date
                        && entry.amount == new_entry.amount
                        && entry.currency == new_entry.currency
                        && entry.name == new_entry.name
                        && entry.source == new_entry.source;
                    if unchanged {
                        summary.unchanged += 1;
                    } else {
                        entry.date = new_entry.date;
                        entry.amount = new_entry.amount;
                        entry.currency = new_entry.currency;
                        entry.name = new_entry.name;
                        entry.source = new_entry.source;
                        entry.updated_at = now;
                        summary.updated += 1;
                    }
                }
                None => {
                    entries.push(LedgerEntry {
                        id: uuid::Uuid::new_v4().to_string(),
                        account_id: new_entry.account_id,
                        date: new_entry.date,
                        amount: new_entry.amount,
                        currency: new_entry.currency,
                        name: new_entry.name,
                        external_id: new_entry.external_id,
                        source: new_entry.source,
                        created_at: now,
                        updated_at: now,
                    });
                    summary.inserted += 1;
                }
            }
        }
        Ok(summary)
    }

    fn list_for_account(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<LedgerEntry>> {
        let mut result: Vec<LedgerEntry> = guard(&self.entries)
            .iter()
            .filter(|e| e.account_id == account_id)
            .filter(|e| start_date.map_or(true, |start| e.date >= start))
            .filter(|e| end_date.map_or(true, |end| e.date <= end))
            .cloned()
            .collect();
        result.sort_by_key(|e| e.date);
        Ok(result)
    }

    fn earliest_entry_date(&self, account_id: &str) -> Result<Option<NaiveDate>> {
        Ok(guard(&self.entries)
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.date)
            .min())
    }

    fn count_created_since(
        &self,
        account_ids: &[String],
        source: &str,
        since: DateTime<Utc>,
    ) -> Result<usize> {
        let since = since.naive_utc();
        Ok(guard(&self.entries)
            .iter()
            .filter(|e| account_ids.contains(&e.account_id))
            .filter(|e| e.source.as_deref() == Some(source))
            .filter(|e| e.created_at >= since)
            .count())
    }

    fn count_by_source(&self, account_ids: &[String], source: &str) -> Result<usize> {
        Ok(guard(&self.entries)
            .iter()
            .filter(|e| account_ids.contains(&e.account_id))
            .filter(|e| e.source.as_deref() == Some(source))
            .count())
    }
}

#[derive(Default)]
pub struct InMemoryBalanceRepository {
    snapshots: Mutex<BTreeMap<(String, NaiveDate), BalanceSnapshot>>,
}

impl InMemoryBalanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: BalanceSnapshot) {
        guard(&self.snapshots).insert((snapshot.account_id.clone(), snapshot.date), snapshot);
    }
}

#[async_trait]
impl BalanceRepositoryTrait for InMemoryBalanceRepository {
    fn get_snapshots(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<BalanceSnapshot>> {
        Ok(guard(&self.snapshots)
            .values()
            .filter(|s| s.account_id == account_id)
            .filter(|s| start_date.map_or(true, |start| s.date >= start))
            .filter(|s| end_date.map_or(true, |end| s.date <= end))
            .cloned()
            .collect())
    }

    fn get_snapshot(&self, account_id: &str, date: NaiveDate) -> Result<Option<BalanceSnapshot>> {
        Ok(guard(&self.snapshots)
            .get(&(account_id.to_string(), date))
            .cloned())
    }

    fn latest_snapshot_date(&self, account_id: &str) -> Result<Option<NaiveDate>> {
        Ok(guard(&self.snapshots)
            .keys()
            .filter(|(id, _)| id == account_id)
            .map(|(_, date)| *date)
            .max())
    }

    async fn overwrite_range(
        &self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        snapshots: &[BalanceSnapshot],
    ) -> Result<()> {
        let mut stored = guard(&self.snapshots);
        stored.retain(|(id, date), _| !(id == account_id && *date >= start_date && *date <= end_date));
        for snapshot in snapshots {
            stored.insert((snapshot.account_id.clone(), snapshot.date), snapshot.clone());
        }
        Ok(())
    }

    async fn delete_outside_range(
        &self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<usize> {
        let mut stored = guard(&self.snapshots);
        let before = stored.len();
        stored.retain(|(id, date), _| !(id == account_id && (*date < start_date || *date > end_date)));
        Ok(before - stored.len())
    }
}

#[derive(Default)]
pub struct InMemoryProviderItemRepository {
    items: Mutex<HashMap<String, ProviderItem>>,
    provider_accounts: Mutex<Vec<ProviderAccount>>,
}

impl InMemoryProviderItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&self, item: ProviderItem) {
        guard(&self.items).insert(item.id.clone(), item);
    }

    pub fn insert_provider_account(&self, provider_account: ProviderAccount) {
        guard(&self.provider_accounts).push(provider_account);
    }

    fn with_item<T>(&self, item_id: &str, f: impl FnOnce(&mut ProviderItem) -> T) -> Result<T> {
        let mut items = guard(&self.items);
        let item = items
            .get_mut(item_id)
            .ok_or_else(|| not_found("provider item", item_id))?;
        let result = f(item);
        item.updated_at = Utc::now();
        Ok(result)
    }
}

#[async_trait]
impl ProviderItemRepositoryTrait for InMemoryProviderItemRepository {
    async fn create_item(&self, item: ProviderItem) -> Result<ProviderItem> {
        self.insert_item(item.clone());
        Ok(item)
    }

    fn get_item(&self, item_id: &str) -> Result<ProviderItem> {
        guard(&self.items)
            .get(item_id)
            .cloned()
            .ok_or_else(|| not_found("provider item", item_id))
    }

    fn list_items(&self, family_id: Option<&str>) -> Result<Vec<ProviderItem>> {
        let mut items: Vec<ProviderItem> = guard(&self.items)
            .values()
            .filter(|i| family_id.map_or(true, |f| i.family_id == f))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn update_status(&self, item_id: &str, status: ProviderItemStatus) -> Result<()> {
        self.with_item(item_id, |item| item.status = status)
    }

    async fn set_pending_account_setup(&self, item_id: &str, pending: bool) -> Result<()> {
        self.with_item(item_id, |item| item.pending_account_setup = pending)
    }

    async fn save_checkpoint(&self, item_id: &str, checkpoint: ProviderCheckpoint) -> Result<()> {
        self.with_item(item_id, |item| item.checkpoint = Some(checkpoint))
    }

    async fn mark_synced(&self, item_id: &str, synced_at: DateTime<Utc>) -> Result<()> {
        self.with_item(item_id, |item| item.last_synced_at = Some(synced_at))
    }

    async fn upsert_provider_account(
        &self,
        item_id: &str,
        remote: &RemoteAccount,
    ) -> Result<ProviderAccount> {
        let mut provider_accounts = guard(&self.provider_accounts);
        let now = Utc::now();
        if let Some(existing) = provider_accounts.iter_mut().find(|pa| {
            pa.provider_item_id == item_id && pa.external_account_id == remote.external_account_id
        }) {
            existing.name = remote.name.clone();
            existing.currency = remote.currency.clone();
            existing.mask = remote.mask.clone();
            existing.raw_transactions_payload = remote.transactions.clone();
            existing.raw_holdings_payload = remote.holdings.clone();
            existing.reported_balance = remote.balance;
            existing.reported_balance_date = remote.balance_date;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let created = ProviderAccount {
            id: uuid::Uuid::new_v4().to_string(),
            provider_item_id: item_id.to_string(),
            external_account_id: remote.external_account_id.clone(),
            name: remote.name.clone(),
            currency: remote.currency.clone(),
            mask: remote.mask.clone(),
            account_id: None,
            raw_transactions_payload: remote.transactions.clone(),
            raw_holdings_payload: remote.holdings.clone(),
            reported_balance: remote.balance,
            reported_balance_date: remote.balance_date,
            created_at: now,
            updated_at: now,
        };
        provider_accounts.push(created.clone());
        Ok(created)
    }

    fn list_provider_accounts(&self, item_id: &str) -> Result<Vec<ProviderAccount>> {
        Ok(guard(&self.provider_accounts)
            .iter()
            .filter(|pa| pa.provider_item_id == item_id)
            .cloned()
            .collect())
    }

    async fn link_provider_account(
        &self,
        provider_account_id: &str,
        account_id: Option<String>,
    ) -> Result<ProviderAccount> {
        let mut provider_accounts = guard(&self.provider_accounts);
        let provider_account = provider_accounts
            .iter_mut()
            .find(|pa| pa.id == provider_account_id)
            .ok_or_else(|| not_found("provider account", provider_account_id))?;
        provider_account.account_id = account_id;
        provider_account.updated_at = Utc::now();
        Ok(provider_account.clone())
    }
}

#[derive(Default)]
pub struct InMemorySyncRunRepository {
    runs: Mutex<HashMap<String, SyncRun>>,
    status_history: Mutex<Vec<(String, String)>>,
}

impl InMemorySyncRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sync_run: SyncRun) {
        guard(&self.runs).insert(sync_run.id.clone(), sync_run);
    }

    /// Every status text written for a run, in order.
    pub fn status_history(&self, sync_run_id: &str) -> Vec<String> {
        guard(&self.status_history)
            .iter()
            .filter(|(id, _)| id == sync_run_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<SyncRun> {
        guard(&self.runs).values().cloned().collect()
    }
}

#[async_trait]
impl StatsSink for InMemorySyncRunRepository {
    async fn merge_stats(&self, sync_run_id: &str, delta: SyncStats) -> Result<SyncStats> {
        let mut runs = guard(&self.runs);
        let run = runs
            .get_mut(sync_run_id)
            .ok_or_else(|| not_found("sync run", sync_run_id))?;
        run.sync_stats.merge(&delta);
        run.updated_at = Utc::now();
        Ok(run.sync_stats.clone())
    }

    async fn update_status_text(&self, sync_run_id: &str, status_text: &str) -> Result<()> {
        let mut runs = guard(&self.runs);
        let run = runs
            .get_mut(sync_run_id)
            .ok_or_else(|| not_found("sync run", sync_run_id))?;
        run.status_text = Some(status_text.to_string());
        guard(&self.status_history).push((sync_run_id.to_string(), status_text.to_string()));
        Ok(())
    }

    fn load_stats(&self, sync_run_id: &str) -> Result<SyncStats> {
        guard(&self.runs)
            .get(sync_run_id)
            .map(|run| run.sync_stats.clone())
            .ok_or_else(|| not_found("sync run", sync_run_id))
    }
}

#[async_trait]
impl SyncRunRepositoryTrait for InMemorySyncRunRepository {
    async fn create(&self, sync_run: SyncRun) -> Result<SyncRun> {
        self.insert(sync_run.clone());
        Ok(sync_run)
    }

    async fn update(&self, sync_run: SyncRun) -> Result<SyncRun> {
        let mut runs = guard(&self.runs);
        let stored = runs
            .get_mut(&sync_run.id)
            .ok_or_else(|| not_found("sync run", &sync_run.id))?;
        let stats = stored.sync_stats.clone();
        *stored = SyncRun {
            sync_stats: stats,
            ..sync_run
        };
        Ok(stored.clone())
    }

    fn get_by_id(&self, sync_run_id: &str) -> Result<SyncRun> {
        guard(&self.runs)
            .get(sync_run_id)
            .cloned()
            .ok_or_else(|| not_found("sync run", sync_run_id))
    }

    fn list_children(&self, parent_run_id: &str) -> Result<Vec<SyncRun>> {
        let mut children: Vec<SyncRun> = guard(&self.runs)
            .values()
            .filter(|r| r.parent_run_id.as_deref() == Some(parent_run_id))
            .cloned()
            .collect();
        children.sort_by_key(|r| r.created_at);
        Ok(children)
    }

    fn list_recent(&self, family_id: &str, limit: i64) -> Result<Vec<SyncRun>> {
        let mut runs: Vec<SyncRun> = guard(&self.runs)
            .values()
            .filter(|r| r.family_id == family_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(runs)
    }
}

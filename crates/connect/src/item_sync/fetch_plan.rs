//! How each provider pages its data: by opaque cursor or by date window.

use chrono::{Duration, NaiveDate};

use ledgersync_core::balances::MaterializationWindow;
use ledgersync_core::providers::{FetchRequest, ProviderCheckpoint, ProviderItem, ProviderPayload};

/// Builds gateway requests from an item's checkpoint and derives the
/// checkpoint to store after a successful fetch.
pub trait FetchPlan: Send + Sync {
    fn fetch_request(
        &self,
        item: &ProviderItem,
        window: MaterializationWindow,
        today: NaiveDate,
        balances_only: bool,
    ) -> FetchRequest;

    /// `None` keeps the stored checkpoint.
    fn next_checkpoint(
        &self,
        request: &FetchRequest,
        payload: &ProviderPayload,
    ) -> Option<ProviderCheckpoint>;
}

/// Cursor paging: resume from the stored cursor, store whatever the provider
/// hands back.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorFetchPlan;

impl FetchPlan for CursorFetchPlan {
    fn fetch_request(
        &self,
        item: &ProviderItem,
        _window: MaterializationWindow,
        _today: NaiveDate,
        balances_only: bool,
    ) -> FetchRequest {
        FetchRequest {
            cursor: item.cursor().map(str::to_string),
            balances_only,
            ..FetchRequest::default()
        }
    }

    fn next_checkpoint(
        &self,
        _request: &FetchRequest,
        payload: &ProviderPayload,
    ) -> Option<ProviderCheckpoint> {
        payload
            .next_cursor
            .as_ref()
            .filter(|cursor| !cursor.is_empty())
            .map(|cursor| ProviderCheckpoint::Cursor {
                cursor: cursor.clone(),
            })
    }
}

/// Date-window paging with a lookback over the last synced date.
#[derive(Debug, Clone, Copy)]
pub struct DateWindowFetchPlan {
    pub lookback_days: i64,
    pub initial_history_days: i64,
}

impl DateWindowFetchPlan {
    pub fn new(lookback_days: i64, initial_history_days: i64) -> Self {
        Self {
            lookback_days,
            initial_history_days,
        }
    }

    fn start_date(
        &self,
        item: &ProviderItem,
        window: MaterializationWindow,
        today: NaiveDate,
    ) -> NaiveDate {
        let from_checkpoint = match item.last_synced_date() {
            Some(last) => last - Duration::days(self.lookback_days.max(0)),
            None => today - Duration::days(self.initial_history_days.max(0)),
        };
        // A run asking for older history widens the request.
        match window.start {
            Some(requested) if requested < from_checkpoint => requested,
            _ => from_checkpoint,
        }
    }
}

impl FetchPlan for DateWindowFetchPlan {
    fn fetch_request(
        &self,
        item: &ProviderItem,
        window: MaterializationWindow,
        today: NaiveDate,
        balances_only: bool,
    ) -> FetchRequest {
        let start = self.start_date(item, window, today).min(today);
        FetchRequest {
            start_date: Some(start),
            end_date: Some(today),
            cursor: None,
            balances_only,
        }
    }

    fn next_checkpoint(
        &self,
        request: &FetchRequest,
        _payload: &ProviderPayload,
    ) -> Option<ProviderCheckpoint> {
        request
            .end_date
            .map(|date| ProviderCheckpoint::LastSynced { date })
    }
}

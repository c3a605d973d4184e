//! Provider connection domain models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accounts::BalanceAnchor;

/// Which aggregation service backs a provider item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Plaid,
    SimpleFin,
}

impl ProviderKind {
    /// Source tag written on ledger entries this provider produces.
    pub fn source_tag(self) -> &'static str {
        match self {
            ProviderKind::Plaid => "plaid",
            ProviderKind::SimpleFin => "simplefin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "plaid" => Some(ProviderKind::Plaid),
            "simplefin" => Some(ProviderKind::SimpleFin),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.source_tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderItemStatus {
    #[default]
    Good,
    /// Credentials expired or revoked; the user must reconnect
    RequiresUpdate,
    Disconnected,
}

impl ProviderItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderItemStatus::Good => "GOOD",
            ProviderItemStatus::RequiresUpdate => "REQUIRES_UPDATE",
            ProviderItemStatus::Disconnected => "DISCONNECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GOOD" => Some(ProviderItemStatus::Good),
            "REQUIRES_UPDATE" => Some(ProviderItemStatus::RequiresUpdate),
            "DISCONNECTED" => Some(ProviderItemStatus::Disconnected),
            _ => None,
        }
    }
}

/// Where the next fetch should resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderCheckpoint {
    /// Opaque cursor returned by cursor-paged providers
    Cursor { cursor: String },
    /// Last date covered by a date-windowed fetch
    LastSynced { date: NaiveDate },
}

/// One external connection. Owns its provider accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderItem {
    pub id: String,
    pub family_id: String,
    pub kind: ProviderKind,
    pub name: String,
    pub status: ProviderItemStatus,
    /// Some remote accounts are not linked to a local account yet
    pub pending_account_setup: bool,
    pub checkpoint: Option<ProviderCheckpoint>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderItem {
    pub fn new(family_id: String, kind: ProviderKind, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            family_id,
            kind,
            name,
            status: ProviderItemStatus::Good,
            pending_account_setup: false,
            checkpoint: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        match &self.checkpoint {
            Some(ProviderCheckpoint::Cursor { cursor }) => Some(cursor),
            _ => None,
        }
    }

    pub fn last_synced_date(&self) -> Option<NaiveDate> {
        match &self.checkpoint {
            Some(ProviderCheckpoint::LastSynced { date }) => Some(*date),
            _ => None,
        }
    }
}

/// A remote account exposed by a provider item.
///
/// `account_id` is a back-reference to the local account it feeds, not
/// ownership; `None` means the user has not set it up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAccount {
    pub id: String,
    pub provider_item_id: String,
    pub external_account_id: String,
    pub name: String,
    pub currency: String,
    pub mask: Option<String>,
    pub account_id: Option<String>,
    pub raw_transactions_payload: Option<Value>,
    pub raw_holdings_payload: Option<Value>,
    pub reported_balance: Option<Decimal>,
    pub reported_balance_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderAccount {
    pub fn is_linked(&self) -> bool {
        self.account_id.is_some()
    }

    pub fn reported_anchor(&self) -> Option<BalanceAnchor> {
        match (self.reported_balance_date, self.reported_balance) {
            (Some(date), Some(balance)) => Some(BalanceAnchor::new(date, balance)),
            _ => None,
        }
    }
}

/// A remote account as the gateway returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAccount {
    pub external_account_id: String,
    pub name: String,
    pub currency: String,
    #[serde(default)]
    pub mask: Option<String>,
    /// Raw transaction list, opaque until normalized
    #[serde(default)]
    pub transactions: Option<Value>,
    #[serde(default)]
    pub holdings: Option<Value>,
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub balance_date: Option<NaiveDate>,
}

/// What to ask a gateway for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub cursor: Option<String>,
    /// Only account metadata and balances are needed
    pub balances_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPayload {
    pub accounts: Vec<RemoteAccount>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_checkpoint_accessors() {
        let mut item = ProviderItem::new("fam".to_string(), ProviderKind::Plaid, "Bank".to_string());
        assert!(item.cursor().is_none());

        item.checkpoint = Some(ProviderCheckpoint::Cursor {
            cursor: "abc".to_string(),
        });
        assert_eq!(item.cursor(), Some("abc"));
        assert!(item.last_synced_date().is_none());

        let date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        item.checkpoint = Some(ProviderCheckpoint::LastSynced { date });
        assert_eq!(item.last_synced_date(), Some(date));
    }

    #[test]
    fn test_checkpoint_json_shape() {
        let checkpoint = ProviderCheckpoint::Cursor {
            cursor: "c-1".to_string(),
        };
        let json = serde_json::to_value(&checkpoint).unwrap();
        assert_eq!(json["kind"], "cursor");
        assert_eq!(json["cursor"], "c-1");
    }

    #[test]
    fn test_provider_kind_tags() {
        assert_eq!(ProviderKind::parse("simplefin"), Some(ProviderKind::SimpleFin));
        assert_eq!(ProviderKind::Plaid.source_tag(), "plaid");
        assert_eq!(ProviderKind::parse("mx"), None);
    }

    #[test]
    fn test_remote_account_parses_with_defaults() {
        let remote: RemoteAccount = serde_json::from_str(
            r#"{"externalAccountId":"ext-1","name":"Checking","currency":"USD","balance":12.5,"balanceDate":"2024-04-02"}"#,
        )
        .unwrap();
        assert_eq!(remote.balance, Some(dec!(12.50)));
        assert!(remote.transactions.is_none());
    }
}

//! Identifier-matching repair of provider account links.

use std::collections::{HashMap, HashSet};

use super::ProviderAccount;
use crate::accounts::Account;

/// A link the repair pass wants to establish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairLink {
    pub provider_account_id: String,
    pub account_id: String,
}

/// Pairs unlinked provider accounts with local accounts whose
/// `provider_account_ref` equals their `external_account_id`.
///
/// Local accounts already fed by another provider account of the same item are
/// left alone, as are refs shared by more than one local account.
pub fn match_unlinked_accounts(
    provider_accounts: &[ProviderAccount],
    accounts: &[Account],
) -> Vec<RepairLink> {
    let already_linked: HashSet<&str> = provider_accounts
        .iter()
        .filter_map(|pa| pa.account_id.as_deref())
        .collect();

    let mut by_ref: HashMap<&str, Vec<&Account>> = HashMap::new();
    for account in accounts.iter().filter(|a| a.is_active) {
        if let Some(reference) = account.provider_account_ref.as_deref() {
            by_ref.entry(reference).or_default().push(account);
        }
    }

    provider_accounts
        .iter()
        .filter(|pa| !pa.is_linked())
        .filter_map(|pa| {
            let candidates = by_ref.get(pa.external_account_id.as_str())?;
            if candidates.len() != 1 {
                log::warn!(
                    "Provider account {} matches {} local accounts, not repairing",
                    pa.id,
                    candidates.len()
                );
                return None;
            }
            let account = candidates[0];
            if already_linked.contains(account.id.as_str()) {
                return None;
            }
            Some(RepairLink {
                provider_account_id: pa.id.clone(),
                account_id: account.id.clone(),
            })
        })
        .collect()
}

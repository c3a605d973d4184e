/// Holdings label used when a provider does not distinguish holding kinds
pub const DEFAULT_HOLDINGS_LABEL: &str = "holdings";

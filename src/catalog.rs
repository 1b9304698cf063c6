use std::collections::{BTreeMap, BTreeSet};

/// Immutable mapping from human-readable metric names to the field
/// identifiers the fundamentals provider understands. Built once at startup
/// and handed to the accessor; lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    fields: BTreeMap<String, String>,
    cagr_eligible: BTreeSet<String>,
}

impl MetricCatalog {
    pub fn new<I, C>(entries: I, cagr_eligible: C) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
        C: IntoIterator<Item = String>,
    {
        Self {
            fields: entries
                .into_iter()
                .map(|(name, field)| (name.to_lowercase(), field))
                .collect(),
            cagr_eligible: cagr_eligible.into_iter().map(|n| n.to_lowercase()).collect(),
        }
    }

    /// The standard catalog served by the fundamentals provider.
    pub fn default_catalog() -> Self {
        let entries = [
            ("total revenues", "is_sales_and_services_revenues"),
            ("net income", "is_net_income"),
            ("eps - diluted", "is_diluted_eps"),
            ("free cash flow", "cf_free_cash_flow"),
            ("operating margin", "oper_margin"),
            ("return on equity", "return_com_eqy"),
            ("total debt", "bs_total_debt"),
            ("capital expenditures", "cf_cap_expenditures"),
        ];
        let cagr = ["total revenues", "net income", "eps - diluted", "free cash flow"];
        Self::new(
            entries.map(|(n, f)| (n.to_string(), f.to_string())),
            cagr.map(str::to_string),
        )
    }

    /// Resolve a metric name to its upstream field identifier.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn is_cagr_eligible(&self, name: &str) -> bool {
        self.cagr_eligible.contains(&name.to_lowercase())
    }

    /// All (name, field) pairs, in stable order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_case_insensitive() {
        let catalog = MetricCatalog::default_catalog();
        assert_eq!(catalog.resolve("Net Income"), Some("is_net_income"));
        assert_eq!(catalog.resolve("NET INCOME"), Some("is_net_income"));
        assert_eq!(catalog.resolve("not a metric"), None);
    }

    #[test]
    fn cagr_flags_cover_a_subset() {
        let catalog = MetricCatalog::default_catalog();
        assert!(catalog.is_cagr_eligible("Total Revenues"));
        assert!(!catalog.is_cagr_eligible("operating margin"));
        assert!(!catalog.is_cagr_eligible("unknown"));
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use tracing::{info, warn};

use crate::accessor::DataAccessor;
use crate::error::{DataError, Result};
use crate::models::MetricSeries;

/// One row of a metrics report.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub metric: String,
    pub values: BTreeMap<i32, f64>,
    /// Populated only for CAGR-eligible metrics with a computable growth rate.
    pub cagr: Option<f64>,
}

/// Tabular report: one row per metric, one column per fiscal year.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    pub ticker: String,
    pub years: Vec<i32>,
    pub rows: Vec<MetricRow>,
}

impl MetricsReport {
    /// Render as an aligned text table.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{:<24}", "metric");
        for year in &self.years {
            let _ = write!(out, " {year:>14}");
        }
        let _ = writeln!(out, " {:>10}", "CAGR %");
        let _ = writeln!(out, "{}", "-".repeat(24 + self.years.len() * 15 + 11));
        for row in &self.rows {
            let _ = write!(out, "{:<24}", row.metric);
            for year in &self.years {
                match row.values.get(year) {
                    Some(value) => {
                        let _ = write!(out, " {value:>14.2}");
                    }
                    None => {
                        let _ = write!(out, " {:>14}", "");
                    }
                }
            }
            match row.cagr {
                Some(cagr) => {
                    let _ = writeln!(out, " {cagr:>10.2}");
                }
                None => {
                    let _ = writeln!(out, " {:>10}", "");
                }
            }
        }
        out
    }
}

/// Compound annual growth rate in percent, or `None` when undefined: fewer
/// than two points, or an endpoint that is not strictly positive (a negative
/// base under a fractional exponent has no real meaning).
pub fn compound_annual_growth(series: &MetricSeries) -> Option<f64> {
    let first = series.first_value()?;
    let last = series.last_value()?;
    let num_years = series.len().checked_sub(1)?;
    if num_years == 0 || first <= 0.0 || last <= 0.0 {
        return None;
    }
    Some(((last / first).powf(1.0 / num_years as f64) - 1.0) * 100.0)
}

/// Composes multiple metric reads into one report with growth-rate
/// annotations.
pub struct MetricsTableBuilder<'a> {
    accessor: &'a DataAccessor,
}

impl<'a> MetricsTableBuilder<'a> {
    pub fn new(accessor: &'a DataAccessor) -> Self {
        Self { accessor }
    }

    /// Build a report for the requested metrics. Unknown or absent metrics
    /// are logged and skipped; if every metric is absent the report itself
    /// is absent.
    pub async fn build(
        &self,
        ticker: &str,
        metrics: &[String],
        start_year: i32,
        end_year: i32,
    ) -> Result<Option<MetricsReport>> {
        let mut rows = Vec::new();
        for metric in metrics {
            let metric_key = metric.to_lowercase();
            match self
                .accessor
                .get_financial(ticker, &metric_key, start_year, end_year)
                .await
            {
                Ok(Some(series)) => {
                    let cagr = if self.accessor.catalog().is_cagr_eligible(&metric_key) {
                        compound_annual_growth(&series)
                    } else {
                        None
                    };
                    rows.push(MetricRow { metric: metric_key, values: series.values, cagr });
                }
                Ok(None) => {
                    info!("no data for metric '{}' on {}, skipping", metric_key, ticker);
                }
                Err(DataError::UnknownMetric(name)) => {
                    warn!("unknown metric '{}', skipping", name);
                }
                Err(err) => return Err(err),
            }
        }

        if rows.is_empty() {
            return Ok(None);
        }
        let years: BTreeSet<i32> = rows.iter().flat_map(|r| r.values.keys().copied()).collect();
        Ok(Some(MetricsReport {
            ticker: ticker.to_uppercase(),
            years: years.into_iter().collect(),
            rows,
        }))
    }
}

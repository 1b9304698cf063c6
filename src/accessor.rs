use std::collections::BTreeMap;

use chrono::{Datelike, Duration, Months, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::api::{ChartClient, FundamentalsProvider, PriceHistoryProvider, RqlClient};
use crate::catalog::MetricCatalog;
use crate::database::CacheStore;
use crate::error::{DataError, Result};
use crate::frame::{Cell, Frame};
use crate::models::{MetricSeries, PriceBar};

const HISTORY_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];
const FISCAL_YEAR_COLUMN: &str = "fiscal_year";

/// Cache table for a ticker's price history. Every path that touches the
/// cache derives names through these two helpers so hit detection cannot
/// diverge.
pub fn history_table_name(ticker: &str) -> String {
    format!("his_{}", ticker.to_lowercase())
}

/// Cache table for a ticker's financial metrics.
pub fn financial_table_name(ticker: &str) -> String {
    format!("roic_{}", ticker.to_lowercase())
}

/// Lookback window for [`lookback_start_date`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Quarters(u32),
    Days(u32),
}

/// Compute the start date for an analysis window ending at `end_date`
/// (`YYYY-MM-DD`). A missing or unparseable end date falls back to today
/// with a warning rather than failing.
pub fn lookback_start_date(end_date: Option<&str>, lookback: Lookback) -> NaiveDate {
    let end = match end_date {
        None | Some("") => Utc::now().date_naive(),
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => date,
            Err(err) => {
                warn!("invalid end date '{}', using current date: {}", raw, err);
                Utc::now().date_naive()
            }
        },
    };
    match lookback {
        Lookback::Quarters(n) => end
            .checked_sub_months(Months::new(3 * n))
            .unwrap_or(end),
        Lookback::Days(n) => end - Duration::days(i64::from(n)),
    }
}

/// Period-over-period fractional change of the `close` column. The first
/// element, otherwise undefined, is 0; null closes contribute a 0 step.
pub fn daily_returns(frame: &Frame) -> Result<Vec<f64>> {
    let close = frame
        .column_index("close")
        .ok_or_else(|| DataError::MissingColumn("close".to_string()))?;

    let mut returns = Vec::with_capacity(frame.len());
    let mut previous: Option<f64> = None;
    for row in frame.rows() {
        let value = row[close].as_f64();
        let change = match (previous, value) {
            (Some(prev), Some(current)) if prev != 0.0 => (current - prev) / prev,
            _ => 0.0,
        };
        returns.push(change);
        if value.is_some() {
            previous = value;
        }
    }
    Ok(returns)
}

/// Serves historical price series and financial-metric series, transparently
/// reconciling the persistent cache with the two upstream providers.
///
/// Every write to the cache is a wholesale table replace; concurrent callers
/// racing on the same ticker degrade to last-writer-wins.
pub struct DataAccessor {
    store: CacheStore,
    prices: ChartClient,
    fundamentals: RqlClient,
    catalog: MetricCatalog,
}

impl DataAccessor {
    pub fn new(
        store: CacheStore,
        prices: ChartClient,
        fundamentals: RqlClient,
        catalog: MetricCatalog,
    ) -> Self {
        Self { store, prices, fundamentals, catalog }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Cached-or-fetched daily price history, filtered to `[start, end]`
    /// inclusive and sorted ascending. If the cache cannot be written or
    /// re-read after a successful upstream fetch, the fetched series is
    /// served directly.
    pub async fn get_or_fetch_historical(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>> {
        self.historical(ticker, start, end, true).await
    }

    /// Same cache-then-fetch sequence as [`Self::get_or_fetch_historical`],
    /// but a cache failure after the fetch propagates instead of degrading.
    pub async fn get_historical(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>> {
        self.historical(ticker, start, end, false).await
    }

    async fn historical(
        &self,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        fallback: bool,
    ) -> Result<Vec<PriceBar>> {
        let table = history_table_name(ticker);

        // Warm cache first: any readable row in the window is a hit.
        match self.store.read_table(&table).await {
            Ok(Some(frame)) => match bars_from_frame(&frame) {
                Ok(bars) => {
                    let hit = filter_window(bars, start, end);
                    if !hit.is_empty() {
                        debug!("serving {} price history from cache", ticker);
                        return Ok(hit);
                    }
                }
                Err(err) => warn!("cache table {} for {} is unreadable: {}", table, ticker, err),
            },
            Ok(None) => debug!("no cache table {} for {}", table, ticker),
            Err(err) => warn!("cache lookup failed for {}: {}", ticker, err),
        }

        // Miss: one upstream fetch, bounded when the caller gave both dates.
        info!("fetching price history for {} from provider", ticker);
        let symbol = ticker.to_uppercase();
        let range = match (start, end) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        };
        let fetched = self.prices.price_history(&symbol, range).await?;
        if fetched.is_empty() {
            return Err(DataError::NoData {
                ticker: ticker.to_string(),
                context: "price provider returned an empty history".to_string(),
            });
        }

        // Persist wholesale, then serve the request from the refreshed cache.
        let refreshed: Result<Vec<PriceBar>> = async {
            self.store
                .replace_table(&table, &frame_from_bars(&fetched))
                .await?;
            let frame = self.store.read_table(&table).await?.ok_or_else(|| {
                DataError::Malformed(format!("cache table {table} vanished after store"))
            })?;
            bars_from_frame(&frame)
        }
        .await;

        match refreshed {
            Ok(bars) => {
                let hit = filter_window(bars, start, end);
                if hit.is_empty() {
                    return Err(DataError::NoData {
                        ticker: ticker.to_string(),
                        context: "no rows in the requested date window".to_string(),
                    });
                }
                Ok(hit)
            }
            Err(err) if fallback => {
                warn!(
                    "cache store failed for {} after fetch, serving provider data directly: {}",
                    ticker, err
                );
                Ok(fetched)
            }
            Err(err) => Err(err),
        }
    }

    /// Fetch the full available (or bounded) history for a ticker and
    /// replace its cache table unconditionally. Returns the stored row count.
    pub async fn refresh_history_cache(
        &self,
        ticker: &str,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<usize> {
        info!("refreshing price history cache for {}", ticker);
        let symbol = ticker.to_uppercase();
        let fetched = self.prices.price_history(&symbol, range).await?;
        if fetched.is_empty() {
            return Err(DataError::NoData {
                ticker: ticker.to_string(),
                context: "price provider returned an empty history".to_string(),
            });
        }
        self.store
            .replace_table(&history_table_name(ticker), &frame_from_bars(&fetched))
            .await?;
        Ok(fetched.len())
    }

    /// Cached-or-fetched financial metric keyed by fiscal year. Unknown
    /// metric names are a soft error; `Ok(None)` signals routine absence.
    /// When the cache fails after the upstream sweep, the single requested
    /// metric is fetched directly instead.
    pub async fn get_or_fetch_financial(
        &self,
        ticker: &str,
        metric_name: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Option<MetricSeries>> {
        self.financial(ticker, metric_name, start_year, end_year, true).await
    }

    /// Same sequence as [`Self::get_or_fetch_financial`], but a cache or
    /// provider failure after the catalog sweep degrades to absence without
    /// the direct-fetch attempt.
    pub async fn get_financial(
        &self,
        ticker: &str,
        metric_name: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Option<MetricSeries>> {
        self.financial(ticker, metric_name, start_year, end_year, false).await
    }

    async fn financial(
        &self,
        ticker: &str,
        metric_name: &str,
        start_year: i32,
        end_year: i32,
        fallback: bool,
    ) -> Result<Option<MetricSeries>> {
        let metric_key = metric_name.to_lowercase();
        let field = self
            .catalog
            .resolve(&metric_key)
            .ok_or_else(|| DataError::UnknownMetric(metric_name.to_string()))?
            .to_string();
        let table = financial_table_name(ticker);

        // Warm cache: the table must exist and carry the resolved column.
        match self.store.read_table(&table).await {
            Ok(Some(frame)) if frame.has_column(&field) => {
                if let Some(series) =
                    series_from_frame(&frame, &metric_key, &field, start_year, end_year)
                {
                    debug!("serving {} '{}' from cache", ticker, metric_key);
                    return Ok(Some(series));
                }
            }
            Ok(Some(_)) => debug!("cache table {} lacks column {}", table, field),
            Ok(None) => debug!("no cache table {} for {}", table, ticker),
            Err(err) => warn!("cache lookup failed for {}: {}", ticker, err),
        }

        // Miss: sweep every catalog metric, persist wholesale, re-read.
        let refreshed: Result<Option<MetricSeries>> = async {
            let Some(combined) = self.fetch_all_metrics(ticker, start_year, end_year).await? else {
                return Ok(None);
            };
            self.store.replace_table(&table, &combined).await?;
            let frame = self.store.read_table(&table).await?.ok_or_else(|| {
                DataError::Malformed(format!("cache table {table} vanished after store"))
            })?;
            Ok(series_from_frame(&frame, &metric_key, &field, start_year, end_year))
        }
        .await;

        match refreshed {
            Ok(Some(series)) => Ok(Some(series)),
            Ok(None) => {
                info!("no financial data for {} '{}'", ticker, metric_key);
                Ok(None)
            }
            Err(err) if fallback => {
                warn!(
                    "fundamentals cache failed for {}, fetching '{}' directly: {}",
                    ticker, metric_key, err
                );
                self.direct_metric(ticker, &metric_key, &field, start_year, end_year)
                    .await
            }
            Err(err) => {
                warn!(
                    "error fetching financial data for {} '{}': {}",
                    ticker, metric_key, err
                );
                Ok(None)
            }
        }
    }

    /// Fetch every catalog metric for a ticker and replace its financial
    /// cache table. With `years` absent, the trailing five calendar years
    /// are used. Returns the stored row count.
    pub async fn refresh_financial_cache(
        &self,
        ticker: &str,
        years: Option<(i32, i32)>,
    ) -> Result<usize> {
        let (start_year, end_year) = years.unwrap_or_else(|| {
            let current = Utc::now().year();
            (current - 5, current)
        });
        info!(
            "refreshing financial cache for {} over {}..={}",
            ticker, start_year, end_year
        );
        let combined = self
            .fetch_all_metrics(ticker, start_year, end_year)
            .await?
            .ok_or_else(|| DataError::NoData {
                ticker: ticker.to_string(),
                context: "fundamentals provider returned no rows".to_string(),
            })?;
        self.store
            .replace_table(&financial_table_name(ticker), &combined)
            .await?;
        Ok(combined.len())
    }

    /// One upstream call per catalog metric, merged column-wise on
    /// fiscal_year. `Ok(None)` means the provider had nothing at all.
    async fn fetch_all_metrics(
        &self,
        ticker: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Option<Frame>> {
        info!("fetching fundamentals for {} from provider", ticker);
        let symbol = ticker.to_uppercase();
        let mut combined = Frame::default();
        for (name, field) in self.catalog.entries() {
            let frame = self
                .fundamentals
                .metric_frame(&symbol, field, start_year, end_year)
                .await?;
            if frame.is_empty() {
                debug!("provider returned no rows for {} '{}'", ticker, name);
                continue;
            }
            if !frame.has_column(FISCAL_YEAR_COLUMN) {
                warn!(
                    "provider payload for {} '{}' lacks a fiscal_year column, skipping",
                    ticker, name
                );
                continue;
            }
            combined.merge_on(&frame, FISCAL_YEAR_COLUMN)?;
        }
        if combined.is_empty() {
            info!("no financial data found for {}", ticker);
            return Ok(None);
        }
        Ok(Some(combined))
    }

    /// Last-resort single-metric fetch; any failure here is routine absence.
    async fn direct_metric(
        &self,
        ticker: &str,
        metric_key: &str,
        field: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Option<MetricSeries>> {
        let symbol = ticker.to_uppercase();
        match self
            .fundamentals
            .metric_frame(&symbol, field, start_year, end_year)
            .await
        {
            Ok(frame) if !frame.is_empty() => {
                Ok(series_from_frame(&frame, metric_key, field, start_year, end_year))
            }
            Ok(_) => Ok(None),
            Err(err) => {
                warn!(
                    "direct fundamentals fetch for {} '{}' failed: {}",
                    ticker, metric_key, err
                );
                Ok(None)
            }
        }
    }
}

/// Extract a metric series from a financial frame, filtered to the fiscal
/// year window. Rows without a valid 4-digit year are dropped.
fn series_from_frame(
    frame: &Frame,
    metric_key: &str,
    field: &str,
    start_year: i32,
    end_year: i32,
) -> Option<MetricSeries> {
    let year_col = frame.column_index(FISCAL_YEAR_COLUMN)?;
    let value_col = frame.column_index(field)?;

    let mut values = BTreeMap::new();
    for row in frame.rows() {
        let Some(year) = row[year_col].as_i64() else {
            continue;
        };
        if !(1000..=9999).contains(&year) {
            warn!("dropping row with malformed fiscal year {}", year);
            continue;
        }
        let year = year as i32;
        if year < start_year || year > end_year {
            continue;
        }
        if let Some(value) = row[value_col].as_f64() {
            values.insert(year, value);
        }
    }
    if values.is_empty() {
        return None;
    }
    Some(MetricSeries { metric: metric_key.to_string(), values })
}

fn frame_from_bars(bars: &[PriceBar]) -> Frame {
    let mut frame = Frame::new(HISTORY_COLUMNS.map(String::from).to_vec());
    for bar in bars {
        // widths always match the fixed column set
        let _ = frame.push_row(vec![
            Cell::Text(bar.date.format("%Y-%m-%d").to_string()),
            Cell::Float(bar.open),
            Cell::Float(bar.high),
            Cell::Float(bar.low),
            Cell::Float(bar.close),
            Cell::Int(bar.volume),
        ]);
    }
    frame
}

/// Type a raw cache frame back into bars, sorted ascending and unique by
/// date. Rows with unreadable cells are dropped with a warning.
fn bars_from_frame(frame: &Frame) -> Result<Vec<PriceBar>> {
    let column = |name: &str| {
        frame
            .column_index(name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    };
    let date_col = column("date")?;
    let open_col = column("open")?;
    let high_col = column("high")?;
    let low_col = column("low")?;
    let close_col = column("close")?;
    let volume_col = column("volume")?;

    let mut bars = Vec::with_capacity(frame.len());
    for row in frame.rows() {
        let date = row[date_col]
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
        let fields = (
            date,
            row[open_col].as_f64(),
            row[high_col].as_f64(),
            row[low_col].as_f64(),
            row[close_col].as_f64(),
        );
        let (Some(date), Some(open), Some(high), Some(low), Some(close)) = fields else {
            warn!("dropping unreadable cached price row");
            continue;
        };
        let volume = row[volume_col].as_i64().unwrap_or(0);
        bars.push(PriceBar { date, open, high, low, close, volume });
    }
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    Ok(bars)
}

fn filter_window(
    bars: Vec<PriceBar>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<PriceBar> {
    bars.into_iter()
        .filter(|bar| {
            start.map_or(true, |s| bar.date >= s) && end.map_or(true, |e| bar.date <= e)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn table_names_are_lowercased_per_kind() {
        assert_eq!(history_table_name("AAPL"), "his_aapl");
        assert_eq!(financial_table_name("Brk-B"), "roic_brk-b");
    }

    #[test]
    fn quarter_lookback_subtracts_three_months_each() {
        let start = lookback_start_date(Some("2024-03-31"), Lookback::Quarters(2));
        assert_eq!(start, date("2023-09-30"));
    }

    #[test]
    fn day_lookback_subtracts_calendar_days() {
        let start = lookback_start_date(Some("2024-03-01"), Lookback::Days(30));
        assert_eq!(start, date("2024-01-31"));
    }

    #[test]
    fn invalid_end_date_falls_back_to_today() {
        let today = Utc::now().date_naive();
        let start = lookback_start_date(Some("03/31/2024"), Lookback::Days(0));
        assert_eq!(start, today);
        let start = lookback_start_date(None, Lookback::Days(0));
        assert_eq!(start, today);
    }

    #[test]
    fn daily_returns_start_at_zero() {
        let mut frame = Frame::new(vec!["close".to_string()]);
        for close in [100.0, 110.0, 99.0] {
            frame.push_row(vec![Cell::Float(close)]).unwrap();
        }
        let returns = daily_returns(&frame).unwrap();
        assert_eq!(returns.len(), 3);
        assert_eq!(returns[0], 0.0);
        assert!((returns[1] - 0.10).abs() < 1e-9);
        assert!((returns[2] + 0.10).abs() < 1e-9);
    }

    #[test]
    fn daily_returns_require_a_close_column() {
        let frame = Frame::new(vec!["open".to_string()]);
        let err = daily_returns(&frame).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(name) if name == "close"));
    }

    #[test]
    fn window_filter_is_inclusive_on_both_ends() {
        let bars: Vec<PriceBar> = ["2024-01-02", "2024-01-03", "2024-01-04"]
            .iter()
            .map(|d| PriceBar {
                date: date(d),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0,
            })
            .collect();
        let hit = filter_window(bars.clone(), Some(date("2024-01-02")), Some(date("2024-01-03")));
        assert_eq!(hit.len(), 2);
        let open_ended = filter_window(bars, None, Some(date("2024-01-02")));
        assert_eq!(open_ended.len(), 1);
    }

    #[test]
    fn cached_frame_round_trips_into_sorted_bars() {
        let bars = vec![
            PriceBar {
                date: date("2024-01-03"),
                open: 2.0,
                high: 2.5,
                low: 1.5,
                close: 2.2,
                volume: 20,
            },
            PriceBar {
                date: date("2024-01-02"),
                open: 1.0,
                high: 1.5,
                low: 0.5,
                close: 1.2,
                volume: 10,
            },
        ];
        let frame = frame_from_bars(&bars);
        let round_tripped = bars_from_frame(&frame).unwrap();
        assert_eq!(round_tripped.len(), 2);
        assert_eq!(round_tripped[0].date, date("2024-01-02"));
        assert_eq!(round_tripped[1].close, 2.2);
    }

    #[test]
    fn series_extraction_honors_year_window_and_validity() {
        let mut frame = Frame::new(vec![
            FISCAL_YEAR_COLUMN.to_string(),
            "is_net_income".to_string(),
        ]);
        for (year, value) in [(2019_i64, 10.0), (2020, 12.0), (2021, 14.0), (99, 999.0)] {
            frame
                .push_row(vec![Cell::Int(year), Cell::Float(value)])
                .unwrap();
        }
        let series =
            series_from_frame(&frame, "net income", "is_net_income", 2020, 2021).unwrap();
        assert_eq!(series.values.len(), 2);
        assert_eq!(series.values[&2020], 12.0);
        assert!(series_from_frame(&frame, "net income", "is_net_income", 2025, 2030).is_none());
    }
}

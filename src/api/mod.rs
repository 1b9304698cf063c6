use chrono::NaiveDate;

use crate::error::Result;
use crate::frame::Frame;
use crate::models::PriceBar;

pub mod chart_client;
pub mod rql_client;

pub use chart_client::ChartClient;
pub use rql_client::RqlClient;

/// Daily price history source.
#[async_trait::async_trait]
pub trait PriceHistoryProvider {
    /// Fetch daily bars for a symbol. `None` means the provider's full
    /// available history.
    async fn price_history(
        &self,
        symbol: &str,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<PriceBar>>;
}

/// Fundamentals source queried one metric field at a time.
#[async_trait::async_trait]
pub trait FundamentalsProvider {
    /// Fetch a single metric field for a symbol over a fiscal-year range,
    /// already normalized into a frame keyed by `fiscal_year`.
    async fn metric_frame(
        &self,
        symbol: &str,
        field: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Frame>;
}

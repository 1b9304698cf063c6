pub mod accessor;
pub mod api;
pub mod catalog;
pub mod database;
pub mod error;
pub mod frame;
pub mod models;
pub mod report;

pub use accessor::{
    daily_returns, financial_table_name, history_table_name, lookback_start_date, DataAccessor,
    Lookback,
};
pub use api::{ChartClient, FundamentalsProvider, PriceHistoryProvider, RqlClient};
pub use catalog::MetricCatalog;
pub use database::CacheStore;
pub use error::{DataError, Result};
pub use frame::{Cell, Frame};
pub use models::{Config, MetricSeries, PriceBar};
pub use report::{compound_annual_growth, MetricsReport, MetricsTableBuilder};

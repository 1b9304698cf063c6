use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// One day of OHLCV data. Dates are naive calendar dates; any timezone the
/// provider attaches is stripped during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// A named financial metric keyed by fiscal year, ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric: String,
    pub values: BTreeMap<i32, f64>,
}

impl MetricSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_value(&self) -> Option<f64> {
        self.values.values().next().copied()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.values.values().next_back().copied()
    }
}

/// Configuration for the data access layer.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub fundamentals_api_key: String,
    pub fundamentals_base_url: String,
    pub price_base_url: String,
    pub http_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Config {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:stockcache.db".to_string()),
            fundamentals_api_key: std::env::var("FUNDAMENTALS_API_KEY").map_err(|_| {
                DataError::Config("FUNDAMENTALS_API_KEY environment variable required".to_string())
            })?,
            fundamentals_base_url: std::env::var("FUNDAMENTALS_BASE_URL")
                .unwrap_or_else(|_| "https://api.roic.ai/v1/rql".to_string()),
            price_base_url: std::env::var("PRICE_BASE_URL")
                .unwrap_or_else(|_| "https://query1.finance.yahoo.com".to_string()),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        })
    }
}

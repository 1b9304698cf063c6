#![allow(dead_code)]

//! Shared fixtures: mock upstream providers and a scratch database.

use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stockcache::{CacheStore, ChartClient, Config, DataAccessor, MetricCatalog, RqlClient};

pub const REVENUE_FIELD: &str = "is_sales_and_services_revenues";
pub const NET_INCOME_FIELD: &str = "is_net_income";
pub const MARGIN_FIELD: &str = "oper_margin";

pub struct Fixture {
    pub price_server: MockServer,
    pub fundamentals_server: MockServer,
    pub config: Config,
    _db_dir: TempDir,
}

pub async fn fixture() -> Fixture {
    let price_server = MockServer::start().await;
    let fundamentals_server = MockServer::start().await;
    let db_dir = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = db_dir.path().join("cache.db");
    let config = Config {
        database_url: format!("sqlite:{}", db_path.display()),
        fundamentals_api_key: "test-key".to_string(),
        fundamentals_base_url: fundamentals_server.uri(),
        price_base_url: price_server.uri(),
        http_timeout_secs: 5,
    };
    Fixture { price_server, fundamentals_server, config, _db_dir: db_dir }
}

impl Fixture {
    pub async fn store(&self) -> CacheStore {
        CacheStore::connect(&self.config.database_url)
            .await
            .expect("failed to connect cache store")
    }

    pub async fn accessor(&self) -> DataAccessor {
        let store = self.store().await;
        self.accessor_with(store)
    }

    /// Accessor over a read-only store connection. The database file must
    /// already exist; keep a writable store alive while using this.
    pub async fn read_only_accessor(&self) -> DataAccessor {
        let store = CacheStore::connect_read_only(&self.config.database_url)
            .await
            .expect("failed to connect read-only store");
        self.accessor_with(store)
    }

    fn accessor_with(&self, store: CacheStore) -> DataAccessor {
        DataAccessor::new(
            store,
            ChartClient::new(&self.config).expect("failed to build chart client"),
            RqlClient::new(&self.config).expect("failed to build rql client"),
            test_catalog(),
        )
    }
}

/// Three-metric catalog so the upstream sweep stays small in tests.
pub fn test_catalog() -> MetricCatalog {
    MetricCatalog::new(
        [
            ("total revenues".to_string(), REVENUE_FIELD.to_string()),
            ("net income".to_string(), NET_INCOME_FIELD.to_string()),
            ("operating margin".to_string(), MARGIN_FIELD.to_string()),
        ],
        ["total revenues".to_string(), "net income".to_string()],
    )
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("bad test date")
}

/// Epoch seconds for a mid-session timestamp on the given day, mimicking the
/// timezone-carrying dates the provider returns.
pub fn ts(day: &str) -> i64 {
    date(day)
        .and_time(NaiveTime::from_hms_opt(14, 30, 0).expect("bad test time"))
        .and_utc()
        .timestamp()
}

/// Chart payload for a list of (date, open, high, low, close, volume) days.
pub fn chart_body(days: &[(&str, f64, f64, f64, f64, i64)]) -> Value {
    let timestamps: Vec<i64> = days.iter().map(|d| ts(d.0)).collect();
    let opens: Vec<f64> = days.iter().map(|d| d.1).collect();
    let highs: Vec<f64> = days.iter().map(|d| d.2).collect();
    let lows: Vec<f64> = days.iter().map(|d| d.3).collect();
    let closes: Vec<f64> = days.iter().map(|d| d.4).collect();
    let volumes: Vec<i64> = days.iter().map(|d| d.5).collect();
    json!({
        "chart": {
            "result": [{
                "timestamp": timestamps,
                "indicators": { "quote": [{
                    "open": opens,
                    "high": highs,
                    "low": lows,
                    "close": closes,
                    "volume": volumes
                }]}
            }],
            "error": null
        }
    })
}

pub async fn mount_chart(server: &MockServer, symbol: &str, body: Value, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/v8/finance/chart/{symbol}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

/// Fundamentals payload: header row followed by stringly-typed data rows,
/// the shape the provider actually sends.
pub fn metric_rows(field: &str, rows: &[(i32, f64)]) -> Value {
    let mut payload = vec![json!(["fiscal_year", field])];
    for (year, value) in rows {
        payload.push(json!([year.to_string(), value.to_string()]));
    }
    Value::Array(payload)
}

pub async fn mount_metric(
    server: &MockServer,
    symbol: &str,
    field: &str,
    start_year: i32,
    end_year: i32,
    body: Value,
    expected_calls: u64,
) {
    let query = format!(
        "get({field}(fa_period_reference=range('{start_year}', '{end_year}'))) for('{symbol}')"
    );
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("query", query.as_str()))
        .and(query_param("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::api::FundamentalsProvider;
use crate::error::{DataError, Result};
use crate::frame::Frame;
use crate::models::Config;

/// Client for the fundamentals-query API. Queries are RQL expressions
/// carried in the query string together with a static API key.
pub struct RqlClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl RqlClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent("stockcache/0.1")
            .build()?;
        let base_url = Url::parse(&config.fundamentals_base_url)
            .map_err(|e| DataError::Config(format!("invalid fundamentals base url: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key: config.fundamentals_api_key.clone(),
        })
    }
}

fn rql_query(field: &str, start_year: i32, end_year: i32, symbol: &str) -> String {
    format!("get({field}(fa_period_reference=range('{start_year}', '{end_year}'))) for('{symbol}')")
}

#[async_trait::async_trait]
impl FundamentalsProvider for RqlClient {
    async fn metric_frame(
        &self,
        symbol: &str,
        field: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<Frame> {
        let query = rql_query(field, start_year, end_year, symbol);
        debug!("requesting fundamentals field {} for {}", field, symbol);

        let response = self
            .client
            .get(self.base_url.clone())
            .query(&[("query", query.as_str()), ("apikey", self.api_key.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DataError::Malformed(format!(
                "fundamentals request for {symbol} field {field} failed with status {status}: {body}"
            )));
        }

        // The payload is an array of arrays whose first row is the header.
        let rows: Vec<Vec<Value>> = response.json().await?;
        Frame::from_header_rows(&rows)
    }
}

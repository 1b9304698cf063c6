//! End-to-end tests for the metrics report builder.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{
    fixture, metric_rows, mount_metric, MARGIN_FIELD, NET_INCOME_FIELD, REVENUE_FIELD,
};
use stockcache::MetricsTableBuilder;

#[tokio::test]
async fn report_annotates_cagr_only_for_eligible_metrics() {
    let fx = fixture().await;
    let server = &fx.fundamentals_server;
    mount_metric(server, "MSFT", REVENUE_FIELD, 2022, 2023, metric_rows(REVENUE_FIELD, &[(2022, 10.0), (2023, 20.0)]), 1).await;
    mount_metric(server, "MSFT", NET_INCOME_FIELD, 2022, 2023, metric_rows(NET_INCOME_FIELD, &[(2022, 5.0), (2023, 6.0)]), 1).await;
    mount_metric(server, "MSFT", MARGIN_FIELD, 2022, 2023, metric_rows(MARGIN_FIELD, &[(2022, 0.30), (2023, 0.31)]), 1).await;

    let accessor = fx.accessor().await;
    let builder = MetricsTableBuilder::new(&accessor);
    let report = builder
        .build(
            "MSFT",
            &["Total Revenues".to_string(), "Operating Margin".to_string()],
            2022,
            2023,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.ticker, "MSFT");
    assert_eq!(report.years, vec![2022, 2023]);
    assert_eq!(report.rows.len(), 2);

    // doubling over one year is a 100% growth rate
    let revenue = &report.rows[0];
    assert_eq!(revenue.metric, "total revenues");
    assert!((revenue.cagr.unwrap() - 100.0).abs() < 1e-9);

    // margins grew too, but the metric is not flagged for CAGR
    let margin = &report.rows[1];
    assert_eq!(margin.metric, "operating margin");
    assert_eq!(margin.cagr, None);
    assert_eq!(margin.values[&2023], 0.31);
}

#[tokio::test]
async fn negative_endpoint_leaves_the_cagr_cell_empty() {
    let fx = fixture().await;
    let server = &fx.fundamentals_server;
    mount_metric(server, "MSFT", REVENUE_FIELD, 2022, 2023, metric_rows(REVENUE_FIELD, &[(2022, 10.0), (2023, -5.0)]), 1).await;
    mount_metric(server, "MSFT", NET_INCOME_FIELD, 2022, 2023, metric_rows(NET_INCOME_FIELD, &[(2022, 5.0), (2023, 6.0)]), 1).await;
    mount_metric(server, "MSFT", MARGIN_FIELD, 2022, 2023, metric_rows(MARGIN_FIELD, &[(2022, 0.30), (2023, 0.31)]), 1).await;

    let accessor = fx.accessor().await;
    let builder = MetricsTableBuilder::new(&accessor);
    let report = builder
        .build("MSFT", &["total revenues".to_string()], 2022, 2023)
        .await
        .unwrap()
        .unwrap();

    let revenue = &report.rows[0];
    assert_eq!(revenue.values[&2023], -5.0);
    assert_eq!(revenue.cagr, None);
}

#[tokio::test]
async fn unknown_metrics_are_skipped_and_all_unknown_is_absent() {
    let fx = fixture().await;
    let accessor = fx.accessor().await;
    let builder = MetricsTableBuilder::new(&accessor);

    let report = builder
        .build(
            "MSFT",
            &["made up".to_string(), "also made up".to_string()],
            2019,
            2023,
        )
        .await
        .unwrap();
    assert!(report.is_none());
}

#[tokio::test]
async fn metrics_without_data_are_skipped() {
    let fx = fixture().await;
    let server = &fx.fundamentals_server;
    for field in [REVENUE_FIELD, NET_INCOME_FIELD, MARGIN_FIELD] {
        mount_metric(server, "MSFT", field, 2019, 2023, json!([]), 1).await;
    }
    let accessor = fx.accessor().await;
    let builder = MetricsTableBuilder::new(&accessor);

    let report = builder
        .build("MSFT", &["total revenues".to_string()], 2019, 2023)
        .await
        .unwrap();
    assert!(report.is_none());
}

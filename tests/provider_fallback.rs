//! Behavior tests for retry, backoff and provider fallback.
//!
//! Every test runs against a scripted transport on a paused clock, so backoff
//! sleeps complete instantly while the recorded call times stay exact.

mod support;

use std::sync::Arc;
use std::time::Duration;

use ratiolens_core::{
    FailureKind, Metric, ProviderId, RatioCategoryKind, ScriptedHttpClient, ScriptedReply,
};

use support::{
    engine, fmp_ttm, offline_config, summary_body, yahoo_chart, yahoo_summary, CHART_BODY,
};

const FMP_TD: &str = r#"[{"peRatioTTM": 12.5, "priceToBookRatioTTM": 1.8,
    "returnOnEquityTTM": 0.16, "currentRatioTTM": 1.1, "debtEquityRatioTTM": 0.4}]"#;

fn yahoo_td() -> String {
    summary_body(
        r#""currentRatio": {"raw": 1.6}, "returnOnEquity": {"raw": 0.11}, "debtToEquity": {"raw": 85.0}"#,
        r#""trailingPE": {"raw": 13.4}"#,
    )
}

// =============================================================================
// Retry behavior
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_primary_recovers_after_transient_failures_its_data_is_adopted() {
    // Given: FMP answers 503 twice, then a valid row
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), ScriptedReply::status(503))
            .on(fmp_ttm("TD"), ScriptedReply::status(503))
            .on(fmp_ttm("TD"), ScriptedReply::json(FMP_TD)),
    );
    let engine = engine(offline_config(), &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: FMP is adopted after three attempts and Yahoo is never called
    assert_eq!(ratios.adopted, Some(ProviderId::Fmp));
    assert_eq!(ratios.providers_attempted, vec![ProviderId::Fmp]);
    assert!(ratios.errors.is_empty());
    assert_eq!(http.calls_matching(&fmp_ttm("TD")).len(), 3);
    assert!(http.calls_matching("yahoo.test").is_empty());
}

#[tokio::test(start_paused = true)]
async fn when_network_keeps_failing_delays_grow_between_attempts() {
    // Given: FMP refuses every connection
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), ScriptedReply::connect_error())
            .on(yahoo_summary("TD"), ScriptedReply::json(yahoo_td())),
    );
    let engine = engine(offline_config(), &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: FMP is tried max_retries + 1 times with a doubling delay
    let calls = http.calls_matching(&fmp_ttm("TD"));
    assert_eq!(calls.len(), 3);
    let first_gap = calls[1].at - calls[0].at;
    let second_gap = calls[2].at - calls[1].at;
    assert_eq!(first_gap, Duration::from_secs(1));
    assert_eq!(second_gap, Duration::from_secs(2));
    assert!(second_gap > first_gap);

    // And: the network failure is recorded as retryable
    let fmp_error = &ratios.errors[0];
    assert_eq!(fmp_error.code, FailureKind::Network.code());
    assert_eq!(fmp_error.provider, Some(ProviderId::Fmp));
    assert!(fmp_error.retryable);
}

#[tokio::test(start_paused = true)]
async fn when_provider_reports_an_error_it_is_called_exactly_once() {
    // Given: FMP answers with an explicit error payload
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(
                fmp_ttm("TD"),
                ScriptedReply::json(r#"{"Error Message": "Invalid API KEY."}"#),
            )
            .on(yahoo_summary("TD"), ScriptedReply::json(yahoo_td())),
    );
    let engine = engine(offline_config(), &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: no retry happens and Yahoo takes over
    assert_eq!(http.calls_matching(&fmp_ttm("TD")).len(), 1);
    assert_eq!(ratios.adopted, Some(ProviderId::Yahoo));
    assert_eq!(ratios.errors[0].code, FailureKind::Provider.code());
    assert!(ratios.errors[0].message.contains("Invalid API KEY"));
    assert!(!ratios.errors[0].retryable);
}

#[tokio::test(start_paused = true)]
async fn when_body_does_not_parse_it_fails_fast() {
    // Given: FMP returns HTML instead of JSON
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), ScriptedReply::json("<html>maintenance</html>"))
            .on(yahoo_summary("TD"), ScriptedReply::json(yahoo_td())),
    );
    let engine = engine(offline_config(), &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: one call, a parse failure, then fallback
    assert_eq!(http.calls_matching(&fmp_ttm("TD")).len(), 1);
    assert_eq!(ratios.errors[0].code, FailureKind::Parse.code());
    assert_eq!(ratios.adopted, Some(ProviderId::Yahoo));
}

#[tokio::test(start_paused = true)]
async fn when_provider_hangs_each_attempt_times_out() {
    // Given: only Yahoo is configured and it never answers
    let http = Arc::new(ScriptedHttpClient::new().on(yahoo_summary("TD"), ScriptedReply::Hang));
    let mut config = offline_config();
    config.provider_order = vec![ProviderId::Yahoo];
    let engine = engine(config, &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: every attempt ends in a timeout instead of blocking
    assert_eq!(http.calls_matching(&yahoo_summary("TD")).len(), 3);
    assert!(ratios.is_empty());
    assert_eq!(ratios.errors.len(), 1);
    assert_eq!(ratios.errors[0].code, FailureKind::Timeout.code());
}

// =============================================================================
// Fallback and provenance
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_primary_fails_every_field_comes_from_the_fallback() {
    // Given: FMP rejects the key and Yahoo has data
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), ScriptedReply::status(401))
            .on(yahoo_summary("TD"), ScriptedReply::json(yahoo_td())),
    );
    let engine = engine(offline_config(), &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: provenance is Yahoo for every populated metric
    assert_eq!(
        ratios.providers_attempted,
        vec![ProviderId::Fmp, ProviderId::Yahoo]
    );
    let populated = ratios.populated().collect::<Vec<_>>();
    assert!(!populated.is_empty());
    assert!(populated
        .iter()
        .all(|(_, _, source)| *source == ProviderId::Yahoo));
    assert_eq!(ratios.value(Metric::DebtToEquity), Some(0.85));
    assert_eq!(ratios.source_of(Metric::PeRatio), Some(ProviderId::Yahoo));

    // And: the FMP failure stays visible
    assert_eq!(ratios.errors.len(), 1);
    assert_eq!(ratios.errors[0].provider, Some(ProviderId::Fmp));
    assert_eq!(ratios.errors[0].symbol.as_deref(), Some("TD"));
}

#[tokio::test(start_paused = true)]
async fn when_primary_reports_only_empty_fields_the_next_provider_is_used() {
    // Given: FMP returns a row whose every ratio is null
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(
                fmp_ttm("TD"),
                ScriptedReply::json(r#"[{"peRatioTTM": null, "currentRatioTTM": null}]"#),
            )
            .on(yahoo_summary("TD"), ScriptedReply::json(yahoo_td())),
    );
    let engine = engine(offline_config(), &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: the empty response is not adopted
    assert_eq!(ratios.adopted, Some(ProviderId::Yahoo));
    assert_eq!(ratios.errors[0].code, "provider.no_usable_fields");
}

#[tokio::test(start_paused = true)]
async fn primary_results_are_adopted_whole_not_merged() {
    // Given: FMP reports ROE but no quick ratio, Yahoo would have both
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), ScriptedReply::json(r#"[{"returnOnEquityTTM": 0.16}]"#))
            .on(
                yahoo_summary("TD"),
                ScriptedReply::json(summary_body(
                    r#""returnOnEquity": {"raw": 0.11}, "quickRatio": {"raw": 0.9}"#,
                    "",
                )),
            ),
    );
    let engine = engine(offline_config(), &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: Yahoo is never consulted to fill the gap
    assert_eq!(ratios.value(Metric::Roe), Some(0.16));
    assert_eq!(ratios.value(Metric::QuickRatio), None);
    assert!(ratios.category(RatioCategoryKind::Profitability).is_populated());
    assert!(!ratios.category(RatioCategoryKind::Liquidity).is_populated());
    assert!(http.calls_matching("yahoo.test").is_empty());
}

#[tokio::test(start_paused = true)]
async fn when_every_provider_fails_the_set_is_empty_with_ordered_errors() {
    // Given: both providers answer with client errors
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), ScriptedReply::status(403))
            .on(yahoo_summary("TD"), ScriptedReply::status(404)),
    );
    let engine = engine(offline_config(), &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: nothing is populated and each failure is listed in order
    assert!(ratios.is_empty());
    assert_eq!(ratios.adopted, None);
    let providers = ratios
        .errors
        .iter()
        .map(|error| error.provider)
        .collect::<Vec<_>>();
    assert_eq!(
        providers,
        vec![Some(ProviderId::Fmp), Some(ProviderId::Yahoo)]
    );
}

#[tokio::test(start_paused = true)]
async fn configured_order_is_respected() {
    // Given: Yahoo is preferred over FMP
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), ScriptedReply::json(FMP_TD))
            .on(yahoo_summary("TD"), ScriptedReply::json(yahoo_td())),
    );
    let mut config = offline_config();
    config.provider_order = vec![ProviderId::Yahoo, ProviderId::Fmp];
    let engine = engine(config, &http);

    // When: ratios are aggregated
    let ratios = engine.ratios("TD").await.expect("valid symbol");

    // Then: FMP is not touched
    assert_eq!(ratios.adopted, Some(ProviderId::Yahoo));
    assert!(http.calls_matching("fmp.test").is_empty());
}

// =============================================================================
// Symbols on the wire
// =============================================================================

#[tokio::test(start_paused = true)]
async fn each_provider_receives_its_own_wire_form() {
    // Given: FMP fails so both providers are called
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("BBD-B"), ScriptedReply::status(401))
            .on(yahoo_summary("BBD-B"), ScriptedReply::json(yahoo_td())),
    );
    let engine = engine(offline_config(), &http);

    // When: the user passes the Yahoo spelling in lower case
    let ratios = engine.ratios("  bbd-b.to ").await.expect("valid symbol");

    // Then: the canonical base is used and each host sees its suffix
    assert_eq!(ratios.symbol.base(), "BBD-B");
    let fmp_calls = http.calls_matching("fmp.test");
    assert_eq!(fmp_calls.len(), 1);
    assert!(fmp_calls[0].url.contains("/ratios-ttm/BBD-B.TRT?"));
    assert!(fmp_calls[0].url.contains("apikey=test-key"));
    assert_eq!(http.calls_matching("/quoteSummary/BBD-B.TO?").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_symbol_is_rejected_without_network_calls() {
    // Given: a scripted transport with no routes
    let http = Arc::new(ScriptedHttpClient::new());
    let engine = engine(offline_config(), &http);

    // When: the symbol contains characters no venue accepts
    let result = engine.ratios("TD;DROP").await;

    // Then: validation fails before any request is made
    assert!(result.is_err());
    assert!(http.calls().is_empty());
}

// =============================================================================
// Quote and history routing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn price_history_skips_providers_without_the_endpoint() {
    // Given: only Yahoo serves daily bars
    let http = Arc::new(ScriptedHttpClient::new().on(yahoo_chart("TD"), ScriptedReply::json(CHART_BODY)));
    let engine = engine(offline_config(), &http);

    // When: five days of history are requested
    let (_, routed) = engine.price_history("TD", 5).await.expect("valid request");

    // Then: FMP is skipped as unsupported and Yahoo's bars are returned
    let route = routed.expect("yahoo serves history");
    assert_eq!(route.selected_source, ProviderId::Yahoo);
    assert_eq!(route.source_chain, vec![ProviderId::Fmp, ProviderId::Yahoo]);
    assert_eq!(route.errors[0].code, FailureKind::Unsupported.code());
    assert_eq!(route.data.bars.len(), 3);
    assert!(http.calls_matching("fmp.test").is_empty());
    assert!(http.calls()[0].url.contains("range=5d"));
}

#[tokio::test(start_paused = true)]
async fn quote_falls_back_to_chart_metadata() {
    // Given: FMP has no quote for the symbol
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on("/quote/TD.TRT", ScriptedReply::json("[]"))
            .on(yahoo_chart("TD"), ScriptedReply::json(CHART_BODY)),
    );
    let engine = engine(offline_config(), &http);

    // When: a quote is requested
    let (_, routed) = engine.quote("TD").await.expect("valid symbol");

    // Then: the empty answer was retried, then Yahoo supplied the price
    let route = routed.expect("yahoo serves quotes");
    assert_eq!(http.calls_matching("/quote/TD.TRT").len(), 3);
    assert_eq!(route.errors[0].code, FailureKind::EmptyData.code());
    assert_eq!(route.data.price, 51.0);
    assert_eq!(route.data.change, Some(1.0));
    let position = route.data.range_position().expect("52 week range reported");
    assert!((position - 55.0).abs() < 1e-9);
}

//! Behavior tests for peer selection and relative statistics.

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ratiolens_core::peers::{compare_metric, PEER_UNAVAILABLE};
use ratiolens_core::{
    Metric, PeerPerformance, PeerRequest, ScriptedHttpClient, ScriptedReply, Standing,
};

use support::{engine, fmp_ttm, offline_config};

fn fmp_row(pe: f64, pb: f64, roe: f64, current: f64, debt_to_equity: f64) -> ScriptedReply {
    ScriptedReply::json(fmp_body(pe, pb, roe, current, debt_to_equity))
}

fn fmp_body(pe: f64, pb: f64, roe: f64, current: f64, debt_to_equity: f64) -> String {
    format!(
        r#"[{{"peRatioTTM": {pe}, "priceToBookRatioTTM": {pb}, "returnOnEquityTTM": {roe},
            "currentRatioTTM": {current}, "debtEquityRatioTTM": {debt_to_equity}}}]"#
    )
}

fn values(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs
        .iter()
        .map(|(symbol, value)| ((*symbol).to_owned(), *value))
        .collect()
}

// =============================================================================
// Statistics
// =============================================================================

#[test]
fn percentile_counts_values_strictly_below_the_primary() {
    // Given: peers at 10, 20 and 30 and a primary at 25
    let peers = values(&[("A", 10.0), ("B", 20.0), ("C", 30.0)]);

    // When: the metric is compared
    let comparison = compare_metric(Metric::PeRatio, 25.0, peers).expect("peers present");

    // Then: the mean is 20, the primary is above it, and 2 of 4 values are below it
    assert_eq!(comparison.peer_mean, 20.0);
    assert_eq!(comparison.standing, Standing::AboveAverage);
    assert_eq!(comparison.percentile, 50.0);
}

#[test]
fn ties_with_the_primary_are_not_counted_as_below() {
    // Given: one peer equal to the primary
    let peers = values(&[("A", 25.0), ("B", 10.0)]);

    // When: the metric is compared
    let comparison = compare_metric(Metric::Roe, 25.0, peers).expect("peers present");

    // Then: only the lower peer counts, rounded to one decimal
    assert_eq!(comparison.percentile, 33.3);
    assert_eq!(comparison.standing, Standing::AboveAverage);
}

#[test]
fn primary_equal_to_mean_is_below_average() {
    let comparison =
        compare_metric(Metric::Roe, 20.0, values(&[("A", 10.0), ("B", 30.0)])).expect("peers");
    assert_eq!(comparison.standing, Standing::BelowAverage);
}

#[test]
fn metric_without_peer_values_is_skipped() {
    assert!(compare_metric(Metric::PbRatio, 1.5, BTreeMap::new()).is_none());
}

// =============================================================================
// Partial failure isolation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_one_of_three_peers_fails_the_others_are_still_compared() {
    // Given: TD with three explicit peers, BMO unavailable on every provider
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), fmp_row(12.5, 1.8, 0.16, 1.1, 0.4))
            .on(fmp_ttm("RY"), fmp_row(11.0, 1.6, 0.14, 0.9, 0.5))
            .on(fmp_ttm("BNS"), fmp_row(10.0, 1.2, 0.12, 1.0, 0.6))
            .on(fmp_ttm("BMO"), ScriptedReply::status(401)),
    );
    let engine = engine(offline_config(), &http);
    let request = PeerRequest::explicit(["RY", "BNS", "BMO"], 3);

    // When: the peer comparison runs
    let (primary, analysis) = engine.peers("TD", &request).await.expect("valid request");

    // Then: every metric is computed from the two healthy peers
    assert!(!primary.is_empty());
    assert_eq!(analysis.peers, vec!["RY", "BNS", "BMO"]);
    assert_eq!(analysis.comparisons.len(), 5);
    let pe = analysis.comparison(Metric::PeRatio).expect("pe compared");
    assert_eq!(
        pe.peer_values.keys().cloned().collect::<Vec<_>>(),
        vec!["BNS", "RY"]
    );
    assert_eq!(pe.peer_mean, 10.5);
    assert_eq!(pe.percentile, 66.7);

    // And: the failed peer is named in the error list
    assert_eq!(analysis.errors.len(), 1);
    assert_eq!(analysis.errors[0].code, PEER_UNAVAILABLE);
    assert_eq!(analysis.errors[0].symbol.as_deref(), Some("BMO"));
    assert!(analysis.errors[0].message.contains("provider.error"));

    // And: four of five metrics beat the peer mean
    assert_eq!(analysis.above_average, 4);
    assert_eq!(
        analysis.comparison(Metric::DebtToEquity).map(|entry| entry.standing),
        Some(Standing::BelowAverage)
    );
    assert_eq!(analysis.performance, Some(PeerPerformance::Outperforming));
}

#[tokio::test(start_paused = true)]
async fn parallel_peer_fetches_respect_the_outbound_budget() {
    // Given: three parallel peer fetches, two outbound permits, BMO refusing connections
    let slow = Duration::from_millis(50);
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), fmp_row(12.5, 1.8, 0.16, 1.1, 0.4))
            .on(
                fmp_ttm("RY"),
                ScriptedReply::json_after(fmp_body(11.0, 1.6, 0.14, 0.9, 0.5), slow),
            )
            .on(
                fmp_ttm("BNS"),
                ScriptedReply::json_after(fmp_body(10.0, 1.2, 0.12, 1.0, 0.6), slow),
            )
            .on(fmp_ttm("BMO"), ScriptedReply::connect_error()),
    );
    let mut config = offline_config();
    config.peer_concurrency = 3;
    config.max_in_flight = 2;
    let engine = engine(config, &http);

    // When: the peer comparison runs
    let request = PeerRequest::explicit(["RY", "BNS", "BMO"], 3);
    let (_, analysis) = engine.peers("TD", &request).await.expect("valid request");

    // Then: the healthy peers are compared and the failed one is isolated
    assert_eq!(analysis.peers, vec!["RY", "BNS", "BMO"]);
    let pe = analysis.comparison(Metric::PeRatio).expect("pe compared");
    assert_eq!(pe.peer_values.len(), 2);
    assert_eq!(pe.peer_mean, 10.5);
    assert_eq!(pe.percentile, 66.7);
    assert_eq!(analysis.errors.len(), 1);
    assert_eq!(analysis.errors[0].symbol.as_deref(), Some("BMO"));
    assert!(analysis.errors[0].message.contains("provider.network"));

    // And: the slow peers overlapped without exceeding the two permits
    assert_eq!(http.peak_in_flight(), 2);
    let ry = &http.calls_matching(&fmp_ttm("RY"))[0];
    let bns = &http.calls_matching(&fmp_ttm("BNS"))[0];
    assert!(bns.at.duration_since(ry.at) < slow);
}

#[tokio::test(start_paused = true)]
async fn when_every_peer_fails_no_metric_is_compared() {
    // Given: only the primary has data
    let http = Arc::new(
        ScriptedHttpClient::new().on(fmp_ttm("TD"), fmp_row(12.5, 1.8, 0.16, 1.1, 0.4)),
    );
    let engine = engine(offline_config(), &http);

    // When: two unknown peers are compared
    let request = PeerRequest::explicit(["AAA", "BBB"], 3);
    let (_, analysis) = engine.peers("TD", &request).await.expect("valid request");

    // Then: the analysis is unavailable and lists both peers
    assert!(!analysis.is_available());
    assert_eq!(analysis.performance, None);
    assert_eq!(analysis.errors.len(), 2);
}

// =============================================================================
// Peer selection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn sector_members_are_selected_excluding_the_primary() {
    // Given: TD belongs to Financial Services alongside RY
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), fmp_row(12.5, 1.8, 0.16, 1.1, 0.4))
            .on(fmp_ttm("RY"), fmp_row(11.0, 1.6, 0.14, 0.9, 0.5)),
    );
    let engine = engine(offline_config(), &http);

    // When: peers are chosen by detected sector
    let (_, analysis) = engine
        .peers("TD", &PeerRequest::sector(None, 3))
        .await
        .expect("valid request");

    // Then: only the sector co-member is used
    assert_eq!(analysis.sector.as_deref(), Some("Financial Services"));
    assert_eq!(analysis.peers, vec!["RY"]);
    assert!(!analysis.used_fallback);
    assert!(analysis.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_sector_falls_back_to_the_default_set() {
    // Given: ABC is not in the universe
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("ABC"), fmp_row(20.0, 2.0, 0.1, 1.2, 0.8))
            .on(fmp_ttm("SHOP"), fmp_row(60.0, 9.0, 0.08, 4.0, 0.1)),
    );
    let engine = engine(offline_config(), &http);

    // When: peers are chosen by sector
    let (_, analysis) = engine
        .peers("ABC", &PeerRequest::default())
        .await
        .expect("valid request");

    // Then: the fallback set is used, capped at three
    assert!(analysis.used_fallback);
    assert_eq!(analysis.sector, None);
    assert_eq!(analysis.peers, vec!["SHOP", "TD", "RY"]);
    assert_eq!(analysis.errors.len(), 2);
    assert!(analysis.is_available());
}

#[tokio::test(start_paused = true)]
async fn explicit_list_drops_self_duplicates_and_respects_the_cap() {
    // Given: an engine limited to two peers
    let http = Arc::new(ScriptedHttpClient::new().on(fmp_ttm("TD"), fmp_row(12.5, 1.8, 0.16, 1.1, 0.4)));
    let mut config = offline_config();
    config.max_peers = 2;
    let engine = engine(config, &http);

    // When: the caller lists self, a duplicate spelling and three others
    let request = PeerRequest::explicit(["td", "ry.to", "RY", "BNS", "BMO"], 5);
    let (_, analysis) = engine.peers("TD", &request).await.expect("valid request");

    // Then: two distinct peers remain, in request order
    assert_eq!(analysis.peers, vec!["RY", "BNS"]);
    assert!(http.calls_matching("BMO").is_empty());
}

#[tokio::test(start_paused = true)]
async fn invalid_peer_request_is_rejected_before_any_call() {
    let http = Arc::new(ScriptedHttpClient::new());
    let engine = engine(offline_config(), &http);

    assert!(engine.peers("TD", &PeerRequest::explicit(Vec::<String>::new(), 3)).await.is_err());
    assert!(engine.peers("TD", &PeerRequest::sector(None, 0)).await.is_err());
    assert!(engine.peers("TD", &PeerRequest::explicit(["R$"], 3)).await.is_err());
    assert!(http.calls().is_empty());
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test(start_paused = true)]
async fn sequential_peer_fetches_are_spaced() {
    // Given: sequential peer fetches with a 100ms minimum spacing
    let http = Arc::new(
        ScriptedHttpClient::new()
            .on(fmp_ttm("TD"), fmp_row(12.5, 1.8, 0.16, 1.1, 0.4))
            .on(fmp_ttm("RY"), fmp_row(11.0, 1.6, 0.14, 0.9, 0.5))
            .on(fmp_ttm("BNS"), fmp_row(10.0, 1.2, 0.12, 1.0, 0.6)),
    );
    let mut config = offline_config();
    config.peer_concurrency = 1;
    config.peer_spacing = Duration::from_millis(100);
    let engine = engine(config, &http);

    // When: two peers are compared
    let request = PeerRequest::explicit(["RY", "BNS"], 2);
    engine.peers("TD", &request).await.expect("valid request");

    // Then: the second peer call waits for the spacing
    let ry = &http.calls_matching(&fmp_ttm("RY"))[0];
    let bns = &http.calls_matching(&fmp_ttm("BNS"))[0];
    assert!(bns.at - ry.at >= Duration::from_millis(100));
}

//! End-to-end behaviour of the validation service over a scripted probe

mod common;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use common::{Answer, ScriptedProbe, test_config};
use stream_validator::config::CriticalErrorPolicy;
use stream_validator::models::{Channel, OutcomeSource, ValidationOptions};
use stream_validator::services::{RunState, ValidationService};
use stream_validator::utils::{LoadSample, LoadSampler};

fn ids(channels: &[Channel]) -> Vec<&str> {
    channels.iter().map(|c| c.id.as_str()).collect()
}

fn scenario_channels() -> Vec<Channel> {
    vec![
        Channel::new("a", "Channel A", "https://ok.example/stream"),
        Channel::new("b", "Channel B", "https://dead.invalid/stream"),
    ]
}

#[tokio::test]
async fn downgrade_success_and_plain_timeout_are_partitioned() {
    // Nothing scripted for dead.invalid, so both of its schemes time out
    let probe = Arc::new(ScriptedProbe::new().up("http://ok.example/stream"));
    let service = ValidationService::with_probe(test_config(), probe.clone()).unwrap();

    let report = service
        .validate_channels_parallel(&scenario_channels(), &ValidationOptions::default())
        .await
        .unwrap();

    assert_eq!(ids(&report.valid_channels), vec!["a"]);
    assert_eq!(ids(&report.invalid_channels), vec!["b"]);
    assert_eq!(report.stats.total_processed, 2);
    assert_eq!(report.stats.conversions, 1);
    assert_eq!(report.valid_channels[0].stream_url, "http://ok.example/stream");
    assert!(report.valid_channels[0].validated);
    assert!(!report.invalid_channels[0].validated);
    assert_eq!(probe.calls_to("https://dead.invalid/stream"), 1);
    assert_eq!(service.run_state(), RunState::Completed);
}

#[tokio::test(start_paused = true)]
async fn secure_original_is_tried_after_the_downgrade_hangs() {
    let probe = Arc::new(
        ScriptedProbe::new()
            .answer("http://secure.example/live", Answer::Hang)
            .up("https://secure.example/live"),
    );
    let service = ValidationService::with_probe(test_config(), probe.clone()).unwrap();
    let channels = vec![
        Channel::new("s", "Secure", "https://secure.example/live"),
        Channel::new("a", "Channel A", "https://ok.example/stream"),
    ];

    let report = service
        .validate_channels_parallel(&channels, &ValidationOptions::default())
        .await
        .unwrap();

    assert_eq!(ids(&report.valid_channels), vec!["s"]);
    assert_eq!(ids(&report.invalid_channels), vec!["a"]);
    assert_eq!(report.valid_channels[0].stream_url, "https://secure.example/live");
    assert_eq!(report.stats.conversions, 0);
    assert_eq!(probe.calls_to("https://secure.example/live"), 1);
}

#[tokio::test]
async fn refused_downgrade_falls_back_without_aborting() {
    let probe = Arc::new(
        ScriptedProbe::new()
            .answer(
                "http://secure.example/live",
                Answer::Fail(stream_validator::errors::ValidationError::ConnectionRefused {
                    url: "http://secure.example/live".to_string(),
                }),
            )
            .up("https://secure.example/live")
            .up("http://ok.example/stream"),
    );
    let service = ValidationService::with_probe(test_config(), probe.clone()).unwrap();
    let channels = vec![
        Channel::new("s", "Secure", "https://secure.example/live"),
        Channel::new("a", "Channel A", "https://ok.example/stream"),
    ];

    for report in [
        service
            .validate_channels_parallel(&channels, &ValidationOptions::default())
            .await
            .unwrap(),
        service
            .validate_channels_batch(&channels, &ValidationOptions::default())
            .await
            .unwrap(),
    ] {
        assert_eq!(ids(&report.valid_channels), vec!["s", "a"]);
        assert!(report.invalid_channels.is_empty());
    }
    assert_eq!(service.run_state(), RunState::Completed);
}

#[tokio::test]
async fn standalone_check_after_a_run_keeps_its_stats() {
    let probe = Arc::new(ScriptedProbe::new().up("http://ok.example/stream"));
    let service = ValidationService::with_probe(test_config(), probe).unwrap();

    let report = service
        .validate_channels_parallel(&scenario_channels(), &ValidationOptions::default())
        .await
        .unwrap();
    service
        .validate_channel(&Channel::new("c", "Other", "https://other.example/live"))
        .await
        .unwrap();

    assert_eq!(service.get_validation_stats(), report.stats);
    assert_eq!(report.stats.total_processed, 2);
}

#[tokio::test]
async fn dns_failure_aborts_the_whole_run() {
    let probe = Arc::new(
        ScriptedProbe::new()
            .up("http://ok.example/stream")
            .dns_failure("http://dead.invalid/stream")
            .dns_failure("https://dead.invalid/stream"),
    );
    let service = ValidationService::with_probe(test_config(), probe).unwrap();

    let err = service
        .validate_channels_parallel(&scenario_channels(), &ValidationOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "ENOTFOUND");
    assert_eq!(service.run_state(), RunState::Aborted);
}

#[tokio::test]
async fn dns_failure_aborts_batch_path_too() {
    let probe = Arc::new(
        ScriptedProbe::new()
            .dns_failure("http://dead.invalid/stream")
            .dns_failure("https://dead.invalid/stream"),
    );
    let service = ValidationService::with_probe(test_config(), probe).unwrap();

    let result = service
        .validate_channels_batch(&scenario_channels(), &ValidationOptions::default())
        .await;

    assert!(result.is_err());
    assert_eq!(service.run_state(), RunState::Aborted);
}

#[tokio::test]
async fn unreachable_channels_never_appear_valid() {
    let probe = Arc::new(ScriptedProbe::new().answer(
        "http://flaky.example/live",
        Answer::Fail(stream_validator::errors::ValidationError::HttpStatus {
            url: "http://flaky.example/live".to_string(),
            status: 503,
        }),
    ));
    let service = ValidationService::with_probe(test_config(), probe).unwrap();
    let channels: Vec<Channel> = (0..12)
        .map(|i| Channel::new(format!("c{i}"), "Dead", format!("https://host{i}.example/live")))
        .chain([Channel::new("flaky", "Flaky", "https://flaky.example/live")])
        .collect();

    let report = service
        .validate_channels_parallel(
            &channels,
            &ValidationOptions {
                chunk_size: Some(5),
                concurrency: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(report.valid_channels.is_empty());
    assert_eq!(report.invalid_channels.len(), channels.len());
    assert_eq!(report.stats.invalid_count, channels.len() as u64);
    // Input order is kept within the partition
    assert_eq!(report.invalid_channels[0].id, "c0");
    assert_eq!(report.invalid_channels[12].id, "flaky");
}

#[tokio::test]
async fn revalidation_within_ttl_hits_the_cache() {
    let probe = Arc::new(ScriptedProbe::new().up("http://ok.example/stream"));
    let service = ValidationService::with_probe(test_config(), probe.clone()).unwrap();
    let channels = scenario_channels();
    let options = ValidationOptions::default();

    let first = service
        .validate_channels_batch(&channels, &options)
        .await
        .unwrap();
    let probes_after_first = probe.total_calls();
    let second = service
        .validate_channels_batch(&channels, &options)
        .await
        .unwrap();

    assert_eq!(probe.total_calls(), probes_after_first);
    assert_eq!(first.stats.cache_hits, 0);
    assert_eq!(second.stats.cache_hits, 2);
    assert_eq!(service.get_validation_stats().cache_hits, 2);

    // Same partition both times
    assert_eq!(first.valid_channels, second.valid_channels);
    assert_eq!(first.invalid_channels, second.invalid_channels);
}

#[tokio::test]
async fn cached_outcome_is_flagged() {
    let probe = Arc::new(ScriptedProbe::new().up("http://ok.example/stream"));
    let service = ValidationService::with_probe(test_config(), probe.clone()).unwrap();
    let channel = Channel::new("a", "A", "https://ok.example/stream");

    let fresh = service.validate_channel(&channel).await.unwrap();
    let cached = service.validate_channel(&channel).await.unwrap();

    assert_eq!(fresh.source, OutcomeSource::Converted);
    assert!(fresh.meta.converted);
    assert_eq!(
        fresh.meta.preferred_url.as_deref(),
        Some("http://ok.example/stream")
    );
    assert_eq!(cached.source, OutcomeSource::Cache);
    assert!(cached.meta.from_cache);
    assert_eq!(probe.calls_to("http://ok.example/stream"), 1);

    service.clear_cache().await;
    service.validate_channel(&channel).await.unwrap();
    assert_eq!(probe.calls_to("http://ok.example/stream"), 2);
}

#[tokio::test]
async fn skip_original_after_failed_downgrade() {
    let probe = Arc::new(ScriptedProbe::new().up("https://secure-only.example/live"));
    let mut config = test_config();
    config.validation.skip_https_if_http_fails = true;
    let service = ValidationService::with_probe(config, probe.clone()).unwrap();

    let outcome = service
        .validate_channel(&Channel::new("s", "Secure", "https://secure-only.example/live"))
        .await
        .unwrap();

    assert!(!outcome.is_valid);
    assert!(outcome.meta.https_skipped);
    assert_eq!(probe.calls_to("https://secure-only.example/live"), 0);
}

#[tokio::test]
async fn abort_chunk_policy_continues_with_other_chunks() {
    let probe = Arc::new(
        ScriptedProbe::new()
            .dns_failure("http://broken.example/live")
            .up("http://x.example/live")
            .up("http://y.example/live"),
    );
    let mut config = test_config();
    config.validation.critical_error_policy = CriticalErrorPolicy::AbortChunk;
    let service = ValidationService::with_probe(config, probe.clone()).unwrap();
    let channels = vec![
        Channel::new("broken", "Broken", "http://broken.example/live"),
        Channel::new("x", "X", "http://x.example/live"),
        Channel::new("y", "Y", "http://y.example/live"),
    ];

    let report = service
        .validate_channels_parallel(
            &channels,
            &ValidationOptions {
                chunk_size: Some(2),
                concurrency: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(ids(&report.valid_channels), vec!["y"]);
    assert_eq!(ids(&report.invalid_channels), vec!["broken", "x"]);
    assert_eq!(report.stats.total_processed, 3);
    assert_eq!(probe.calls_to("http://x.example/live"), 0);
    assert_eq!(service.run_state(), RunState::Completed);
}

#[tokio::test]
async fn duplicate_urls_are_probed_once() {
    let probe = Arc::new(ScriptedProbe::new().up("http://ok.example/stream"));
    let service = ValidationService::with_probe(test_config(), probe.clone()).unwrap();
    let channels = vec![
        Channel::new("a", "A", "https://ok.example/stream"),
        Channel::new("a2", "A mirror", "http://OK.example/stream/"),
    ];

    let report = service
        .validate_channels_parallel(&channels, &ValidationOptions::default())
        .await
        .unwrap();

    assert_eq!(ids(&report.valid_channels), vec!["a"]);
    assert_eq!(report.stats.duplicates_removed, 1);
    assert_eq!(report.stats.total_processed, 1);

    let report = service
        .validate_channels_parallel(
            &channels,
            &ValidationOptions {
                deduplicate: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(report.stats.total_processed, 2);
    assert_eq!(report.stats.duplicates_removed, 0);
}

#[tokio::test(start_paused = true)]
async fn in_flight_probes_respect_the_concurrency_limit() {
    let mut probe = ScriptedProbe::new();
    let channels: Vec<Channel> = (0..20)
        .map(|i| {
            let url = format!("http://host{i}.example/live");
            probe = std::mem::take(&mut probe)
                .answer(&url, Answer::Slow(Duration::from_millis(100)));
            Channel::new(format!("c{i}"), "Slow", url)
        })
        .collect();
    let probe = Arc::new(probe);

    let mut config = test_config();
    config.concurrency.min_limit = 1;
    config.concurrency.max_limit = 3;
    config.validation.concurrency = 10;
    let service = ValidationService::with_probe(config, probe.clone()).unwrap();

    let report = service
        .validate_channels_parallel(&channels, &ValidationOptions::default())
        .await
        .unwrap();

    assert_eq!(report.valid_channels.len(), 20);
    assert!(probe.peak_in_flight() <= 3, "peak {}", probe.peak_in_flight());
    assert_eq!(service.concurrency_state().in_flight, 0);
}

struct AlwaysHot;

#[async_trait]
impl LoadSampler for AlwaysHot {
    async fn sample(&self) -> LoadSample {
        LoadSample::new(99.0, 99.0)
    }
}

#[tokio::test(start_paused = true)]
async fn throttling_during_a_run_is_counted() {
    let probe = Arc::new(
        ScriptedProbe::new().answer("http://slow.example/live", Answer::Slow(Duration::from_secs(3))),
    );
    let mut config = test_config();
    config.concurrency.adaptive = true;
    config.concurrency.sample_interval = Duration::from_secs(1);
    let service =
        ValidationService::with_components(config, probe, Some(Arc::new(AlwaysHot))).unwrap();
    let mut events = service.subscribe_throttle_events();

    let report = service
        .validate_channels_parallel(
            &[Channel::new("s", "Slow", "http://slow.example/live")],
            &ValidationOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.valid_channels.len(), 1);
    assert_eq!(report.stats.throttle_events, 1);
    assert!(events.try_recv().is_ok());
    assert!(service.concurrency_state().throttled);
}

#[tokio::test]
async fn empty_input_completes() {
    let service =
        ValidationService::with_probe(test_config(), Arc::new(ScriptedProbe::new())).unwrap();
    let report = service
        .validate_channels_parallel(&[], &ValidationOptions::default())
        .await
        .unwrap();
    assert!(report.valid_channels.is_empty());
    assert!(report.invalid_channels.is_empty());
    assert_eq!(service.run_state(), RunState::Completed);
}

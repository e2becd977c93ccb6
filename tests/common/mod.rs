//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stream_validator::config::ValidatorConfig;
use stream_validator::errors::{ValidationError, ValidationResult};
use stream_validator::services::{ProbeResponse, StreamProbe};

/// How a scripted URL answers
#[derive(Debug, Clone)]
pub enum Answer {
    Up,
    /// Up after sleeping this long
    Slow(Duration),
    /// Silent for the whole timeout, then times out
    Hang,
    Fail(ValidationError),
}

/// In-memory probe answering from a script; unknown URLs time out
#[derive(Default)]
pub struct ScriptedProbe {
    answers: HashMap<String, Answer>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, url: &str, answer: Answer) -> Self {
        self.answers.insert(url.to_string(), answer);
        self
    }

    pub fn up(self, url: &str) -> Self {
        self.answer(url, Answer::Up)
    }

    pub fn dns_failure(self, url: &str) -> Self {
        let host = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        self.answer(
            url,
            Answer::Fail(ValidationError::Dns {
                host,
                message: "dns error: failed to lookup address information".to_string(),
            }),
        )
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamProbe for ScriptedProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ValidationResult<ProbeResponse> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = match self.answers.get(url) {
            Some(Answer::Up) => Ok(()),
            Some(Answer::Slow(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            Some(Answer::Hang) => {
                tokio::time::sleep(timeout).await;
                Err(ValidationError::Timeout {
                    url: url.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Some(Answer::Fail(error)) => Err(error.clone()),
            None => Err(ValidationError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map(|_| ProbeResponse {
            status: 200,
            content_type: Some("video/mp2t".to_string()),
            elapsed: Duration::from_millis(3),
        })
    }
}

/// Default config with a fixed concurrency ceiling
pub fn test_config() -> ValidatorConfig {
    let mut config = ValidatorConfig::default();
    config.concurrency.adaptive = false;
    config
}

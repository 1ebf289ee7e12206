//! Property-based tests for throttling and response parsing
//!
//! These tests verify invariants that must hold for any rate, any idle pattern
//! and any server-provided header or body.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use openepd_http::http::classifier::parse_error_body;
use openepd_http::http::{Clock, ManualClock, RateThrottler, ThrottleBudget};
use openepd_http::http::retry_after_delay;
use proptest::prelude::*;

/// Strategy for idle gaps between requests, mostly zero
fn idle_strategy() -> impl Strategy<Value = Duration> {
    prop_oneof![
        3 => Just(Duration::ZERO),
        1 => (0u64..3_000).prop_map(Duration::from_millis),
    ]
}

/// Strategy for content types a server might send with an error
fn content_type_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("application/json".to_string())),
        Just(Some("application/problem+json; charset=utf-8".to_string())),
        Just(Some("text/html".to_string())),
    ]
}

/// Strategy for JSON-ish error bodies
fn error_body_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        ".*",
        "[a-z ]{0,40}".prop_map(|detail| format!(r#"{{"detail":"{}"}}"#, detail)),
        ("[a-z]{1,10}", "[a-z ]{0,20}").prop_map(|(field, msg)| {
            format!(r#"{{"validation_errors":{{"code":"E1","{}":["{}"]}}}}"#, field, msg)
        }),
        Just(r#"{"detail":null,"validation_errors":[]}"#.to_string()),
        Just(r#"[1,2,3]"#.to_string()),
    ]
}

fn grant_times(rate: f64, idles: &[Duration]) -> (Vec<Instant>, RateThrottler) {
    let clock = Arc::new(ManualClock::new());
    let throttler = RateThrottler::with_clock(rate, clock.clone()).unwrap();

    let times = idles
        .iter()
        .map(|idle| {
            clock.advance(*idle);
            let _permit = throttler.acquire();
            clock.now()
        })
        .collect();

    (times, throttler)
}

proptest! {
    #[test]
    fn prop_any_window_holds_at_most_max_grants(
        rate in 0.5f64..50.0,
        idles in prop::collection::vec(idle_strategy(), 1..120),
    ) {
        let (times, throttler) = grant_times(rate, &idles);
        let n = throttler.max_grants();

        prop_assert!(throttler.window() >= Duration::from_secs(1));
        for pair in times.windows(n + 1) {
            prop_assert!(pair[n] - pair[0] >= throttler.window());
        }
        prop_assert_eq!(throttler.in_flight(), 0);
    }

    #[test]
    fn prop_burst_never_waits_for_first_grants(rate in 0.5f64..50.0) {
        let clock = Arc::new(ManualClock::new());
        let throttler = RateThrottler::with_clock(rate, clock.clone()).unwrap();

        for _ in 0..throttler.max_grants() {
            let _permit = throttler.acquire();
        }

        prop_assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn prop_numeric_retry_after_is_exact(seconds in 1u32..1_000_000) {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let wait = retry_after_delay(Some(&seconds.to_string()), now, Duration::from_secs(10));
        prop_assert_eq!(wait, Duration::from_secs(u64::from(seconds)));
    }

    #[test]
    fn prop_retry_after_never_panics(value in ".*") {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let _ = retry_after_delay(Some(&value), now, Duration::from_secs(10));
    }

    #[test]
    fn prop_budget_always_shrinks(
        total in 0u64..600,
        waits in prop::collection::vec(0u64..120, 1..20),
    ) {
        let mut budget = ThrottleBudget::new(Duration::from_secs(total));
        for wait in waits {
            let before = budget.remaining();
            budget.consume(Duration::from_secs(wait));
            prop_assert!(budget.remaining() < before || before.is_zero());
        }
    }

    #[test]
    fn prop_error_body_parsing_never_panics(
        content_type in content_type_strategy(),
        body in error_body_strategy(),
    ) {
        let parsed = parse_error_body(content_type.as_deref(), &body);
        if parsed.code.is_some() {
            prop_assert!(parsed.summary.starts_with('['));
        }
    }
}

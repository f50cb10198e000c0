#![cfg(feature = "metrics")]
//! Metric helpers record into the installed recorder.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use netview::metrics::{self, Outcome};
use rstest::rstest;

fn recorded(
    snapshotter: &Snapshotter,
    name: &str,
    label: Option<(&str, &str)>,
) -> Option<DebugValue> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, _, _, _)| {
            key.key().name() == name
                && label.is_none_or(|(k, v)| {
                    key.key()
                        .labels()
                        .any(|l| l.key() == k && l.value() == v)
                })
        })
        .map(|(_, _, _, value)| value)
}

#[rstest]
#[case(Outcome::Success, "success")]
#[case(Outcome::Timeout, "timeout")]
#[case(Outcome::Closed, "closed")]
#[case(Outcome::NotConnected, "not_connected")]
fn request_outcomes_are_labelled(#[case] outcome: Outcome, #[case] label: &str) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_requests(outcome);
        metrics::inc_requests(outcome);
    });

    let value = recorded(&snapshotter, metrics::REQUESTS_TOTAL, Some(("outcome", label)));
    assert!(matches!(value, Some(DebugValue::Counter(2))), "got {value:?}");
}

#[test]
fn reconnect_and_malformed_counters_increment() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    ::metrics::with_local_recorder(&recorder, || {
        metrics::inc_reconnect_attempts();
        metrics::inc_malformed_frames();
        metrics::inc_malformed_frames();
    });

    let snapshot = snapshotter.snapshot().into_hashmap();
    let count = |name: &str| {
        snapshot
            .iter()
            .find(|(key, _)| key.key().name() == name)
            .map(|(_, (_, _, value))| value.clone())
    };
    assert!(matches!(
        count(metrics::RECONNECT_ATTEMPTS),
        Some(DebugValue::Counter(1))
    ));
    assert!(matches!(
        count(metrics::MALFORMED_FRAMES),
        Some(DebugValue::Counter(2))
    ));
}

#[test]
fn connected_gauge_follows_the_link() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    ::metrics::with_local_recorder(&recorder, || metrics::set_connected(true));
    let up = recorded(&snapshotter, metrics::CONNECTED, None);
    assert!(matches!(up, Some(DebugValue::Gauge(v)) if v.into_inner() == 1.0));

    ::metrics::with_local_recorder(&recorder, || metrics::set_connected(false));
    let down = recorded(&snapshotter, metrics::CONNECTED, None);
    assert!(matches!(down, Some(DebugValue::Gauge(v)) if v.into_inner() == 0.0));
}

// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

use ConnectionState::*;

#[parameterized(
    disconnected_connect = { Disconnected, LinkEvent::Connect, Connecting },
    disconnected_open = { Disconnected, LinkEvent::Open, Disconnected },
    disconnected_alive = { Disconnected, LinkEvent::Alive, Disconnected },
    disconnected_error = { Disconnected, LinkEvent::Error, Disconnected },
    disconnected_close = { Disconnected, LinkEvent::Close, Disconnected },
    disconnected_disconnect = { Disconnected, LinkEvent::Disconnect, Disconnected },
    connecting_connect = { Connecting, LinkEvent::Connect, Connecting },
    connecting_open = { Connecting, LinkEvent::Open, Connected },
    connecting_alive = { Connecting, LinkEvent::Alive, Connecting },
    connecting_error = { Connecting, LinkEvent::Error, Disconnected },
    connecting_close = { Connecting, LinkEvent::Close, Disconnected },
    connecting_disconnect = { Connecting, LinkEvent::Disconnect, Disconnected },
    connected_connect = { Connected, LinkEvent::Connect, Connected },
    connected_open = { Connected, LinkEvent::Open, Connected },
    connected_alive = { Connected, LinkEvent::Alive, Connected },
    connected_error = { Connected, LinkEvent::Error, Disconnected },
    connected_close = { Connected, LinkEvent::Close, Disconnected },
    connected_disconnect = { Connected, LinkEvent::Disconnect, Disconnected },
    awaiting_connect = { AwaitingSignal, LinkEvent::Connect, AwaitingSignal },
    awaiting_open = { AwaitingSignal, LinkEvent::Open, AwaitingSignal },
    awaiting_alive = { AwaitingSignal, LinkEvent::Alive, Connected },
    awaiting_error = { AwaitingSignal, LinkEvent::Error, Disconnected },
    awaiting_close = { AwaitingSignal, LinkEvent::Close, Disconnected },
    awaiting_disconnect = { AwaitingSignal, LinkEvent::Disconnect, Disconnected },
)]
fn transition_table(from: ConnectionState, event: LinkEvent, expected: ConnectionState) {
    assert_eq!(from.next(event, false), expected);
}

#[test]
fn open_awaits_signal_when_liveness_required() {
    assert_eq!(Connecting.next(LinkEvent::Open, true), AwaitingSignal);
    assert_eq!(
        Connecting
            .next(LinkEvent::Open, true)
            .next(LinkEvent::Alive, true),
        Connected
    );
}

#[test]
fn transitions_are_deterministic() {
    let states = [Disconnected, Connecting, Connected, AwaitingSignal];
    let events = [
        LinkEvent::Connect,
        LinkEvent::Open,
        LinkEvent::Alive,
        LinkEvent::Error,
        LinkEvent::Close,
        LinkEvent::Disconnect,
    ];
    for state in states {
        for event in events {
            for liveness in [false, true] {
                assert_eq!(state.next(event, liveness), state.next(event, liveness));
            }
        }
    }
}

#[parameterized(
    disconnected = { Disconnected, "disconnected" },
    connecting = { Connecting, "connecting" },
    connected = { Connected, "connected" },
    awaiting = { AwaitingSignal, "awaiting_signal" },
)]
fn state_string_roundtrip(state: ConnectionState, s: &str) {
    assert_eq!(state.as_str(), s);
    assert_eq!(s.parse::<ConnectionState>().unwrap(), state);
    assert_eq!(
        serde_json::to_string(&state).unwrap(),
        format!("\"{}\"", s)
    );
}

#[test]
fn parse_rejects_unknown_state() {
    assert!("online".parse::<ConnectionState>().is_err());
}

#[test]
fn is_open_only_for_open_states() {
    assert!(!Disconnected.is_open());
    assert!(!Connecting.is_open());
    assert!(Connected.is_open());
    assert!(AwaitingSignal.is_open());
}

#[test]
fn continuous_policy_always_retries() {
    let mut policy = ReconnectPolicy::new(ReconnectMode::Continuous, Duration::from_secs(3));
    for _ in 0..1000 {
        policy.record_attempt();
    }
    assert_eq!(policy.decide(), RetryDecision::Retry(Duration::from_secs(3)));
    assert!(!policy.is_exhausted());
}

#[test]
fn capped_policy_exhausts_at_cap() {
    let mut policy = ReconnectPolicy::new(
        ReconnectMode::Capped { max_attempts: 10 },
        Duration::from_secs(3),
    );

    for attempt in 1..10 {
        policy.record_attempt();
        assert_eq!(policy.attempts(), attempt);
        assert_eq!(policy.decide(), RetryDecision::Retry(Duration::from_secs(3)));
    }

    policy.record_attempt();
    assert_eq!(policy.attempts(), 10);
    assert!(policy.is_exhausted());
    assert_eq!(policy.decide(), RetryDecision::Exhausted);

    policy.reset();
    assert_eq!(policy.attempts(), 0);
    assert_eq!(policy.decide(), RetryDecision::Retry(Duration::from_secs(3)));
}

#[test]
fn signal_gated_policy_never_schedules() {
    let mut policy = ReconnectPolicy::new(ReconnectMode::SignalGated, Duration::from_secs(3));
    assert_eq!(policy.decide(), RetryDecision::AwaitSignal);
    policy.record_attempt();
    assert_eq!(policy.decide(), RetryDecision::AwaitSignal);
    assert_eq!(policy.max_attempts(), None);
}

#[parameterized(
    continuous = { ReconnectMode::Continuous, "continuous" },
    capped = { ReconnectMode::Capped { max_attempts: 3 }, "capped" },
    gated = { ReconnectMode::SignalGated, "signal_gated" },
)]
fn mode_names(mode: ReconnectMode, name: &str) {
    assert_eq!(mode.name(), name);
}

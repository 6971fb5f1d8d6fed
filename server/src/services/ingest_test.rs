
use super::*;

#[test]
fn retry_after_parses_delta_seconds() {
    assert_eq!(parse_retry_after("45"), Some(Duration::from_secs(45)));
    assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
    assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
}

#[test]
fn retry_after_rejects_dates_and_garbage() {
    assert_eq!(parse_retry_after("Wed, 21 Oct 2026 07:28:00 GMT"), None);
    assert_eq!(parse_retry_after(""), None);
    assert_eq!(parse_retry_after("-5"), None);
}

#[test]
fn backoff_never_beats_the_poll_interval() {
    let poll = Duration::from_secs(60);
    // Scenario: upstream says 45s but we poll every 60s anyway.
    assert_eq!(backoff_for(Duration::from_secs(45), poll), poll);
    assert_eq!(backoff_for(Duration::from_secs(90), poll), Duration::from_secs(90));
    assert_eq!(backoff_for(Duration::ZERO, poll), poll);
}

#[test]
fn states_response_tolerates_null_states() {
    let decoded: StatesResponse = serde_json::from_str(r#"{"time":123,"states":null}"#).unwrap();
    assert!(decoded.states.is_none());

    let decoded: StatesResponse =
        serde_json::from_str(r#"{"time":123,"states":[["abc123","AAL100 "]]}"#).unwrap();
    let states = decoded.states.unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0][0], "abc123");
}

#[test]
fn client_defaults_poll_interval_when_zero() {
    let client = OpenSkyClient::new(None, None, Duration::ZERO).unwrap();
    assert_eq!(client.poll_interval(), Duration::from_secs(10));

    let client = OpenSkyClient::new(None, None, Duration::from_secs(60)).unwrap();
    assert_eq!(client.poll_interval(), Duration::from_secs(60));
}

#[test]
fn client_rejects_malformed_proxy() {
    assert!(matches!(
        OpenSkyClient::new(Some("::not a url::"), None, Duration::from_secs(60)),
        Err(IngestError::Proxy(_))
    ));
    assert!(OpenSkyClient::new(Some("socks5://127.0.0.1:1080"), None, Duration::from_secs(60)).is_ok());
    assert!(OpenSkyClient::new(Some("  "), None, Duration::from_secs(60)).is_ok(), "blank proxy is no proxy");
}

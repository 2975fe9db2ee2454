use reqwest::StatusCode;

use chat_api::error::parse_error_message;
use chat_api::ChatApiError;

#[test]
fn parse_error_message_prefers_json_message() {
    let body = r#"{"error":{"code":"model_not_found","message":"The model `nope` does not exist"}}"#;
    let message = parse_error_message(StatusCode::NOT_FOUND, body);
    assert_eq!(message, "The model `nope` does not exist");
}

#[test]
fn parse_error_message_uses_code_when_message_missing() {
    let body = r#"{"error":{"type":"invalid_api_key"}}"#;
    let message = parse_error_message(StatusCode::UNAUTHORIZED, body);
    assert_eq!(message, "invalid_api_key");
}

#[test]
fn parse_error_message_skips_empty_message_for_numeric_code() {
    let body = r#"{"error":{"code":429,"message":""}}"#;
    let message = parse_error_message(StatusCode::TOO_MANY_REQUESTS, body);
    assert_eq!(message, "429");
}

#[test]
fn parse_error_message_accepts_string_error() {
    let body = r#"{"error":"model is loading"}"#;
    let message = parse_error_message(StatusCode::SERVICE_UNAVAILABLE, body);
    assert_eq!(message, "model is loading");
}

#[test]
fn parse_error_message_falls_back_to_raw_body() {
    let message = parse_error_message(StatusCode::INTERNAL_SERVER_ERROR, "raw failure text");
    assert_eq!(message, "raw failure text");
}

#[test]
fn parse_error_message_falls_back_to_reason_phrase() {
    let message = parse_error_message(StatusCode::BAD_GATEWAY, "");
    assert_eq!(message, "Bad Gateway");
}

#[test]
fn status_error_exposes_status_code() {
    let error = ChatApiError::Status(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string());
    assert_eq!(error.status(), Some(StatusCode::TOO_MANY_REQUESTS));
    assert_eq!(error.to_string(), "HTTP 429 Too Many Requests slow down");
}

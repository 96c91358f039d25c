use hearth::http::parser::{ParseError, parse_request_head};
use hearth::http::request::Method;

#[test]
fn test_parse_full_head() {
    let raw = b"GET /docs/index.html HTTP/1.1\r\nHost: example.com\r\nAccept: text/html\r\n\r\n";

    let (head, consumed) = parse_request_head(raw).unwrap();

    assert_eq!(head.method, Method::Get);
    assert_eq!(head.target, "/docs/index.html");
    assert_eq!(head.version, "HTTP/1.1");
    assert_eq!(head.headers.get("Host"), Some("example.com"));
    assert_eq!(head.headers.get("accept"), Some("text/html"));
    assert_eq!(consumed, raw.len());
}

#[test]
fn test_incomplete_until_terminator() {
    let raw = b"GET / HTTP/1.1\r\nHost: example.com\r\n";

    assert_eq!(
        parse_request_head(raw).unwrap_err(),
        ParseError::Incomplete
    );
}

#[test]
fn test_missing_version_is_malformed() {
    let raw = b"GET /\r\n\r\n";

    assert_eq!(
        parse_request_head(raw).unwrap_err(),
        ParseError::MalformedRequestLine
    );
}

#[test]
fn test_extra_spaces_are_malformed() {
    let raw = b"GET  / HTTP/1.1\r\n\r\n";

    assert_eq!(
        parse_request_head(raw).unwrap_err(),
        ParseError::MalformedRequestLine
    );
}

#[test]
fn test_version_must_be_http() {
    let raw = b"GET / SPDY/3\r\n\r\n";

    assert_eq!(
        parse_request_head(raw).unwrap_err(),
        ParseError::MalformedRequestLine
    );
}

#[test]
fn test_unknown_method_is_carried_through() {
    let raw = b"PURGE /cache HTTP/1.1\r\n\r\n";

    let (head, _) = parse_request_head(raw).unwrap();

    assert_eq!(head.method, Method::Other("PURGE".to_string()));
}

#[test]
fn test_method_tokens_are_case_sensitive() {
    let raw = b"get / HTTP/1.1\r\n\r\n";

    let (head, _) = parse_request_head(raw).unwrap();

    assert_eq!(head.method, Method::Other("get".to_string()));
}

#[test]
fn test_header_without_colon_is_malformed() {
    let raw = b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n";

    assert_eq!(
        parse_request_head(raw).unwrap_err(),
        ParseError::MalformedHeader
    );
}

#[test]
fn test_space_before_colon_is_malformed() {
    let raw = b"GET / HTTP/1.1\r\nHost : example.com\r\n\r\n";

    assert_eq!(
        parse_request_head(raw).unwrap_err(),
        ParseError::MalformedHeader
    );
}

#[test]
fn test_repeated_headers_fold_in_order() {
    let raw = b"GET / HTTP/1.1\r\nAccept: text/html\r\nAccept: application/json\r\n\r\n";

    let (head, _) = parse_request_head(raw).unwrap();

    assert_eq!(
        head.headers.get("Accept"),
        Some("text/html, application/json")
    );
}

#[test]
fn test_header_values_are_trimmed() {
    let raw = b"GET / HTTP/1.1\r\nHost:    example.com   \r\n\r\n";

    let (head, _) = parse_request_head(raw).unwrap();

    assert_eq!(head.headers.get("Host"), Some("example.com"));
}

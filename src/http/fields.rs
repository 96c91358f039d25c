//! Catalog of HTTP status codes and header field names.
//!
//! Read-only tables consumed by the parser and the response writer. Status
//! codes cover the IANA-registered set (100-511, RFC 7231 and friends);
//! header names are the canonical wire spellings so handlers can be written
//! without hard-coding strings.

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// Conventional alternate port for a TLS-terminated deployment.
///
/// TLS itself is out of scope; the constant exists so embedders front the
/// server with a terminating proxy on a well-known port.
pub const SECURE_PORT: u16 = 8443;

/// Numeric HTTP status codes, IANA registry order.
pub mod status {
    pub const CONTINUE: u16 = 100;
    pub const SWITCHING_PROTOCOLS: u16 = 101;
    pub const PROCESSING: u16 = 102;
    pub const EARLY_HINTS: u16 = 103;

    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const ACCEPTED: u16 = 202;
    pub const NON_AUTHORITATIVE_INFORMATION: u16 = 203;
    pub const NO_CONTENT: u16 = 204;
    pub const RESET_CONTENT: u16 = 205;
    pub const PARTIAL_CONTENT: u16 = 206;
    pub const MULTI_STATUS: u16 = 207;
    pub const ALREADY_REPORTED: u16 = 208;
    pub const IM_USED: u16 = 226;

    pub const MULTIPLE_CHOICES: u16 = 300;
    pub const MOVED_PERMANENTLY: u16 = 301;
    pub const FOUND: u16 = 302;
    pub const SEE_OTHER: u16 = 303;
    pub const NOT_MODIFIED: u16 = 304;
    pub const USE_PROXY: u16 = 305;
    pub const TEMPORARY_REDIRECT: u16 = 307;
    pub const PERMANENT_REDIRECT: u16 = 308;

    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const PAYMENT_REQUIRED: u16 = 402;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const METHOD_NOT_ALLOWED: u16 = 405;
    pub const NOT_ACCEPTABLE: u16 = 406;
    pub const PROXY_AUTHENTICATION_REQUIRED: u16 = 407;
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const CONFLICT: u16 = 409;
    pub const GONE: u16 = 410;
    pub const LENGTH_REQUIRED: u16 = 411;
    pub const PRECONDITION_FAILED: u16 = 412;
    pub const PAYLOAD_TOO_LARGE: u16 = 413;
    pub const URI_TOO_LONG: u16 = 414;
    pub const UNSUPPORTED_MEDIA_TYPE: u16 = 415;
    pub const RANGE_NOT_SATISFIABLE: u16 = 416;
    pub const EXPECTATION_FAILED: u16 = 417;
    pub const IM_A_TEAPOT: u16 = 418;
    pub const MISDIRECTED_REQUEST: u16 = 421;
    pub const UNPROCESSABLE_ENTITY: u16 = 422;
    pub const LOCKED: u16 = 423;
    pub const FAILED_DEPENDENCY: u16 = 424;
    pub const TOO_EARLY: u16 = 425;
    pub const UPGRADE_REQUIRED: u16 = 426;
    pub const PRECONDITION_REQUIRED: u16 = 428;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const REQUEST_HEADER_FIELDS_TOO_LARGE: u16 = 431;
    pub const UNAVAILABLE_FOR_LEGAL_REASONS: u16 = 451;

    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const NOT_IMPLEMENTED: u16 = 501;
    pub const BAD_GATEWAY: u16 = 502;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
    pub const GATEWAY_TIMEOUT: u16 = 504;
    pub const HTTP_VERSION_NOT_SUPPORTED: u16 = 505;
    pub const VARIANT_ALSO_NEGOTIATES: u16 = 506;
    pub const INSUFFICIENT_STORAGE: u16 = 507;
    pub const LOOP_DETECTED: u16 = 508;
    pub const NOT_EXTENDED: u16 = 510;
    pub const NETWORK_AUTHENTICATION_REQUIRED: u16 = 511;
}

/// Returns the registered reason phrase for a status code.
///
/// Unregistered codes get a generic placeholder so the status line is still
/// well-formed on the wire.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        103 => "Early Hints",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        207 => "Multi-Status",
        208 => "Already Reported",
        226 => "IM Used",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a Teapot",
        421 => "Misdirected Request",
        422 => "Unprocessable Entity",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        _ => "Unknown",
    }
}

/// Canonical header field names.
pub mod header {
    // General fields
    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const CONNECTION: &str = "Connection";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const DATE: &str = "Date";
    pub const PRAGMA: &str = "Pragma";
    pub const UPGRADE: &str = "Upgrade";
    pub const VIA: &str = "Via";
    pub const WARNING: &str = "Warning";

    // Request fields
    pub const ACCEPT: &str = "Accept";
    pub const ACCEPT_CHARSET: &str = "Accept-Charset";
    pub const ACCEPT_ENCODING: &str = "Accept-Encoding";
    pub const ACCEPT_LANGUAGE: &str = "Accept-Language";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const COOKIE: &str = "Cookie";
    pub const EXPECT: &str = "Expect";
    pub const FORWARDED: &str = "Forwarded";
    pub const FROM: &str = "From";
    pub const HOST: &str = "Host";
    pub const IF_MATCH: &str = "If-Match";
    pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
    pub const IF_RANGE: &str = "If-Range";
    pub const IF_UNMODIFIED_SINCE: &str = "If-Unmodified-Since";
    pub const MAX_FORWARDS: &str = "Max-Forwards";
    pub const ORIGIN: &str = "Origin";
    pub const RANGE: &str = "Range";
    pub const REFERER: &str = "Referer";
    pub const TE: &str = "TE";
    pub const USER_AGENT: &str = "User-Agent";

    // Response fields
    pub const ACCEPT_RANGES: &str = "Accept-Ranges";
    pub const AGE: &str = "Age";
    pub const ALLOW: &str = "Allow";
    pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
    pub const CONTENT_ENCODING: &str = "Content-Encoding";
    pub const CONTENT_LANGUAGE: &str = "Content-Language";
    pub const CONTENT_LOCATION: &str = "Content-Location";
    pub const CONTENT_RANGE: &str = "Content-Range";
    pub const ETAG: &str = "ETag";
    pub const EXPIRES: &str = "Expires";
    pub const LAST_MODIFIED: &str = "Last-Modified";
    pub const LINK: &str = "Link";
    pub const LOCATION: &str = "Location";
    pub const RETRY_AFTER: &str = "Retry-After";
    pub const SERVER: &str = "Server";
    pub const SET_COOKIE: &str = "Set-Cookie";
    pub const TRAILER: &str = "Trailer";
    pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
    pub const VARY: &str = "Vary";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_reason_phrases() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(501), "Not Implemented");
    }

    #[test]
    fn unknown_reason_phrase_is_placeholder() {
        assert_eq!(reason_phrase(299), "Unknown");
        assert_eq!(reason_phrase(999), "Unknown");
    }
}

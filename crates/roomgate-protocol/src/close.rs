//! WebSocket close codes (RFC 6455 §7.4.1) that Roomgate cares about.
//!
//! Only two of them count as a *graceful* end of a connection: the peer
//! finished normally, or it is going away (tab closed, server restart).
//! Every other code is an abnormal termination and gets logged.

/// The connection completed its purpose.
pub const NORMAL: u16 = 1000;

/// The endpoint is going away (page navigation, process shutdown).
pub const GOING_AWAY: u16 = 1001;

/// A close frame arrived without a status code.
pub const NO_STATUS: u16 = 1005;

/// The connection dropped without any close frame.
pub const ABNORMAL: u16 = 1006;

/// Returns `true` if `code` marks an expected, graceful closure.
pub fn is_graceful(code: u16) -> bool {
    matches!(code, NORMAL | GOING_AWAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_and_going_away_are_graceful() {
        assert!(is_graceful(NORMAL));
        assert!(is_graceful(GOING_AWAY));
    }

    #[test]
    fn test_other_codes_are_not_graceful() {
        for code in [NO_STATUS, ABNORMAL, 1002, 1008, 1011, 4000] {
            assert!(!is_graceful(code), "{code} should not be graceful");
        }
    }
}

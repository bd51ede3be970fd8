use tgm_core::Error;

use crate::wire::ErrorBody;

const UNAVAILABLE: &[&str] = &[
    "USERNAME_NOT_OCCUPIED",
    "USERNAME_INVALID",
    "CHANNEL_PRIVATE",
    "CHANNEL_INVALID",
    "CHANNEL_PUBLIC_GROUP_NA",
];

const AUTH: &[&str] = &[
    "AUTH_KEY_UNREGISTERED",
    "AUTH_KEY_INVALID",
    "SESSION_REVOKED",
    "SESSION_EXPIRED",
    "USER_DEACTIVATED",
    "USER_DEACTIVATED_BAN",
];

/// Map a non-2xx gateway response into a core error.
///
/// `subject` names the channel the request was about, if any.
pub fn map_gateway_error(
    status: u16,
    retry_after: Option<u64>,
    body: ErrorBody,
    subject: Option<&str>,
) -> Error {
    let code = body.error.trim().to_uppercase();

    if let Some(seconds) = flood_seconds(&code).or(body.seconds.filter(|_| status == 429)) {
        return Error::FloodWait { seconds };
    }
    if status == 429 {
        return Error::FloodWait {
            seconds: retry_after.unwrap_or(60),
        };
    }

    if UNAVAILABLE.contains(&code.as_str()) {
        return Error::ChannelUnavailable {
            channel: subject.unwrap_or("?").to_string(),
            reason: code,
        };
    }
    if AUTH.contains(&code.as_str()) || status == 401 {
        return Error::Auth(if code.is_empty() {
            "gateway rejected the session".to_string()
        } else {
            code
        });
    }

    let detail = body.message.unwrap_or_default();
    match (code.is_empty(), detail.is_empty()) {
        (true, true) => Error::Rpc(format!("gateway returned HTTP {status}")),
        (true, false) => Error::Rpc(detail),
        (false, true) => Error::Rpc(code),
        (false, false) => Error::Rpc(format!("{code}: {detail}")),
    }
}

/// `FLOOD_WAIT_42` / `FLOOD_PREMIUM_WAIT_42` -> 42.
fn flood_seconds(code: &str) -> Option<u64> {
    code.strip_prefix("FLOOD_WAIT_")
        .or_else(|| code.strip_prefix("FLOOD_PREMIUM_WAIT_"))
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(error: &str) -> ErrorBody {
        ErrorBody {
            error: error.to_string(),
            ..ErrorBody::default()
        }
    }

    #[test]
    fn flood_wait_code_carries_seconds() {
        let e = map_gateway_error(420, None, body("FLOOD_WAIT_42"), None);
        assert!(matches!(e, Error::FloodWait { seconds: 42 }));

        let e = map_gateway_error(420, None, body("flood_premium_wait_7"), None);
        assert!(matches!(e, Error::FloodWait { seconds: 7 }));
    }

    #[test]
    fn http_429_uses_retry_after() {
        let e = map_gateway_error(429, Some(15), ErrorBody::default(), None);
        assert!(matches!(e, Error::FloodWait { seconds: 15 }));
    }

    #[test]
    fn unknown_usernames_are_channel_unavailable() {
        let e = map_gateway_error(400, None, body("USERNAME_NOT_OCCUPIED"), Some("ghost"));
        match e {
            Error::ChannelUnavailable { channel, reason } => {
                assert_eq!(channel, "ghost");
                assert_eq!(reason, "USERNAME_NOT_OCCUPIED");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn revoked_sessions_are_auth_errors() {
        assert!(matches!(
            map_gateway_error(401, None, body("SESSION_REVOKED"), None),
            Error::Auth(_)
        ));
        assert!(matches!(
            map_gateway_error(401, None, ErrorBody::default(), None),
            Error::Auth(_)
        ));
    }

    #[test]
    fn everything_else_is_rpc() {
        let e = map_gateway_error(
            400,
            None,
            ErrorBody {
                error: "MSG_ID_INVALID".into(),
                message: Some("bad id".into()),
                seconds: None,
            },
            None,
        );
        assert_eq!(e.to_string(), "rpc error: MSG_ID_INVALID: bad id");
        let e = map_gateway_error(502, None, ErrorBody::default(), None);
        assert_eq!(e.to_string(), "rpc error: gateway returned HTTP 502");
    }
}

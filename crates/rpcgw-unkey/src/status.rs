use http::StatusCode;

/// Maps an upstream verification code onto the HTTP status the gateway acts on.
/// Empty means `VALID`; anything unrecognized is treated as unauthorized.
pub fn status_from_code(code: &str) -> StatusCode {
    match code {
        "" | "VALID" => StatusCode::OK,
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "FORBIDDEN" | "INSUFFICIENT_PERMISSIONS" | "DISABLED" => StatusCode::FORBIDDEN,
        "INSUFFICIENT_CREDITS" => StatusCode::PAYMENT_REQUIRED,
        "USAGE_EXCEEDED" | "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
        "EXPIRED" => StatusCode::UNAUTHORIZED,
        _ => StatusCode::UNAUTHORIZED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        let cases = [
            ("VALID", 200),
            ("", 200),
            ("NOT_FOUND", 404),
            ("FORBIDDEN", 403),
            ("INSUFFICIENT_PERMISSIONS", 403),
            ("DISABLED", 403),
            ("INSUFFICIENT_CREDITS", 402),
            ("USAGE_EXCEEDED", 429),
            ("RATE_LIMITED", 429),
            ("EXPIRED", 401),
        ];
        for (code, expected) in cases {
            assert_eq!(status_from_code(code).as_u16(), expected, "code {code:?}");
        }
    }

    #[test]
    fn unknown_codes_are_unauthorized() {
        for code in ["SOMETHING_NEW", "valid", " VALID", "rate_limited"] {
            assert_eq!(status_from_code(code), StatusCode::UNAUTHORIZED, "code {code:?}");
        }
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};

const MAX_BACKOFF_SHIFT: usize = 6;

/// GitHub statuses worth another attempt: rate limiting and server errors.
pub fn is_retryable_github_status(status: u16) -> bool {
    status == 429 || status >= 500
}

pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Parses `retry-after` as delta-seconds or an HTTP date.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let delay_ms = retry_at.signed_duration_since(Utc::now()).num_milliseconds();
    Some(Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0)))
}

/// Exponential backoff for 1-based `attempt`, floored by `retry_after`.
pub fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    let backoff = Duration::from_millis(base_delay_ms.saturating_mul(1_u64 << shift));
    match retry_after {
        Some(retry_after) => backoff.max(retry_after),
        None => backoff,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    use super::{is_retryable_github_status, parse_retry_after, retry_delay};

    #[test]
    fn unit_retryable_statuses_cover_rate_limits_and_server_errors() {
        assert!(is_retryable_github_status(429));
        assert!(is_retryable_github_status(502));
        assert!(!is_retryable_github_status(404));
        assert!(!is_retryable_github_status(422));
    }

    #[test]
    fn unit_retry_delay_doubles_per_attempt() {
        assert_eq!(retry_delay(100, 1, None), Duration::from_millis(100));
        assert_eq!(retry_delay(100, 2, None), Duration::from_millis(200));
        assert_eq!(retry_delay(100, 3, None), Duration::from_millis(400));
        assert_eq!(retry_delay(100, 50, None), Duration::from_millis(6_400));
    }

    #[test]
    fn regression_retry_delay_honors_retry_after_floor() {
        assert_eq!(
            retry_delay(100, 1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            retry_delay(1_000, 2, Some(Duration::from_millis(10))),
            Duration::from_millis(2_000)
        );
    }

    #[test]
    fn functional_parse_retry_after_accepts_seconds_and_dates() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));

        let date = (Utc::now() + chrono::Duration::seconds(2))
            .to_rfc2822()
            .replace("+0000", "GMT");
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_str(&date).expect("retry-after date"),
        );
        let delay = parse_retry_after(&headers).expect("delay from date");
        assert!(delay <= Duration::from_millis(2_500));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }
}

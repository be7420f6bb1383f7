use std::fmt::Display;

use tracing::warn;

/// Calls `op` up to `attempts` times (at least once) until it succeeds.
///
/// Retries immediately, without backoff. Each failure is logged with
/// `label`; the last error is returned when every attempt fails.
pub fn with_retry<T, E, F>(attempts: u32, label: &str, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(label, attempt, attempts, error = %e, "Attempt failed");
                if attempt >= attempts {
                    return Err(e);
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let result: Result<u32, String> = with_retry(3, "flaky", || {
            calls += 1;
            if calls < 3 { Err(format!("failure {calls}")) } else { Ok(calls) }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn gives_up_with_last_error() {
        let mut calls = 0;
        let result: Result<(), String> = with_retry(3, "broken", || {
            calls += 1;
            Err(format!("failure {calls}"))
        });
        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls, 3);
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        let mut calls = 0;
        let _: Result<(), &str> = with_retry(0, "once", || {
            calls += 1;
            Err("no")
        });
        assert_eq!(calls, 1);
    }
}

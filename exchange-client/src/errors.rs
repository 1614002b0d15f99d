use thiserror::Error;

/// All errors generated by `exchange-client`.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to parse response: {0}. body: {1}")]
    Parse(serde_json::Error, String),

    #[error("failed to encode query params: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("websocket is not connected; call connect() first")]
    NotConnected,

    #[error("{0}")]
    Other(String),
}

impl ExchangeError {
    /// Whether this error should never be retried: an authoritative rejection
    /// from the exchange rather than a transient failure. 429 is a 4xx but
    /// means "rate limited," not "rejected," so it's excluded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeError::Http { status, .. } if (400..500).contains(status) && *status != 429)
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        struct TestCase {
            input: ExchangeError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: 4xx is terminal
                input: ExchangeError::Http {
                    status: 404,
                    body: String::new(),
                },
                expected: true,
            },
            TestCase {
                // TC1: 5xx is not terminal (retryable)
                input: ExchangeError::Http {
                    status: 503,
                    body: String::new(),
                },
                expected: false,
            },
            TestCase {
                // TC2: Other is not terminal
                input: ExchangeError::Other("boom".into()),
                expected: false,
            },
            TestCase {
                // TC3: 429 is a 4xx but means rate-limited, not rejected
                input: ExchangeError::Http {
                    status: 429,
                    body: String::new(),
                },
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.is_terminal();
            assert_eq!(actual, test.expected, "TC{index} failed");
        }
    }
}

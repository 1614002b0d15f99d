use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("exchange error while listing markets: {0}")]
    Exchange(#[from] exchange_client::ExchangeError),
}

impl RegistryError {
    pub fn is_fatal(&self) -> bool {
        match self {
            RegistryError::Exchange(e) => e.is_terminal(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("exchange error: {0}")]
    Exchange(#[from] exchange_client::ExchangeError),
    #[error("connection closed by peer")]
    ClosedByPeer,
    #[error("no frame received within the ping timeout")]
    Stale,
}

impl ConnectionError {
    /// Fatal connection errors abort the task outright instead of
    /// reconnecting; everything else runs through the backoff loop.
    pub fn is_fatal(&self) -> bool {
        match self {
            ConnectionError::Exchange(e) => e.is_terminal(),
            ConnectionError::ClosedByPeer => false,
            ConnectionError::Stale => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("exchange error: {0}")]
    Exchange(#[from] exchange_client::ExchangeError),
}

impl PollerError {
    pub fn is_fatal(&self) -> bool {
        match self {
            PollerError::Exchange(e) => e.is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_is_fatal() {
        struct TestCase {
            input: ConnectionError,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: closed by peer is retryable
                input: ConnectionError::ClosedByPeer,
                expected: false,
            },
            TestCase {
                // TC1: 4xx exchange error is fatal
                input: ConnectionError::Exchange(exchange_client::ExchangeError::Http {
                    status: 401,
                    body: String::new(),
                }),
                expected: true,
            },
            TestCase {
                // TC2: staleness triggers a reconnect, not an abort
                input: ConnectionError::Stale,
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.is_fatal(), test.expected, "TC{index} failed");
        }
    }
}

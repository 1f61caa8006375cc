use std::{path::Path, time::Duration};

use sha2::{Digest, Sha256};
use url::Url;

use crate::{
    errors::error::{TailsFileError, TailsResult},
    http_client::put_tails_file,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the failed `attempt` (1-based) before trying again.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Uploads tails files to a tails server which stores them under their content hash.
#[derive(Clone, Debug, Default)]
pub struct TailsFileDistributor {
    retry: RetryPolicy,
}

impl TailsFileDistributor {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Uploads the file with `PUT {base_url}/{content_hash}` and returns the public URL of the
    /// uploaded file. Re-uploading the same file yields the same URL.
    pub async fn upload(
        &self,
        tails_file_path: &Path,
        content_hash: &str,
        base_url: &Url,
    ) -> TailsResult<Url> {
        trace!(
            "TailsFileDistributor::upload >>> tails_file_path: {}, content_hash: {}, base_url: {}",
            tails_file_path.display(),
            content_hash,
            base_url
        );
        let url = tails_file_url(base_url, content_hash)?;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match put_tails_file(&url, tails_file_path).await {
                Ok(()) => {
                    info!("Uploaded tails file {} to {}", content_hash, url);
                    return Ok(url);
                }
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        "Tails upload attempt {}/{} failed, retrying in {:?}; err: {}",
                        attempt, max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        "Tails upload of {} failed after {} attempt(s); err: {}",
                        content_hash, attempt, err
                    );
                    return Err(err);
                }
            }
        }
    }
}

/// `{base_url}/{content_hash}` with the hash percent-encoded as a single path segment.
pub fn tails_file_url(base_url: &Url, content_hash: &str) -> TailsResult<Url> {
    if content_hash.is_empty() {
        return Err(TailsFileError::InvalidRequest(
            "tails hash must not be empty".to_string(),
        ));
    }
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| TailsFileError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: "url cannot be a base".to_string(),
        })?
        .pop_if_empty()
        .push(content_hash);
    Ok(url)
}

/// Base58 encoded SHA-256 of the tails file content.
pub fn tails_hash(content: &[u8]) -> String {
    bs58::encode(Sha256::digest(content)).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tails_file_url_appends_hash_to_base() {
        let base = Url::parse("https://tails.example.org").unwrap();
        let url = tails_file_url(&base, "4Ha9AjLq").unwrap();
        assert_eq!(url.as_str(), "https://tails.example.org/4Ha9AjLq");
    }

    #[test]
    fn test_tails_file_url_keeps_base_path() {
        let base = Url::parse("http://localhost:6543/tails/").unwrap();
        let url = tails_file_url(&base, "4Ha9AjLq").unwrap();
        assert_eq!(url.as_str(), "http://localhost:6543/tails/4Ha9AjLq");

        let base = Url::parse("http://localhost:6543/tails").unwrap();
        let url = tails_file_url(&base, "4Ha9AjLq").unwrap();
        assert_eq!(url.as_str(), "http://localhost:6543/tails/4Ha9AjLq");
    }

    #[test]
    fn test_tails_file_url_encodes_hash() {
        let base = Url::parse("http://localhost:6543").unwrap();
        let url = tails_file_url(&base, "a/b c?").unwrap();
        assert_eq!(url.as_str(), "http://localhost:6543/a%2Fb%20c%3F");
    }

    #[test]
    fn test_tails_file_url_rejects_invalid_input() {
        let base = Url::parse("mailto:tails@example.org").unwrap();
        assert!(matches!(
            tails_file_url(&base, "hash"),
            Err(TailsFileError::InvalidBaseUrl { .. })
        ));
        let base = Url::parse("http://localhost:6543").unwrap();
        assert!(matches!(
            tails_file_url(&base, ""),
            Err(TailsFileError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_tails_hash_is_deterministic() {
        let hash = tails_hash(b"tails");
        assert_eq!(hash, tails_hash(b"tails"));
        assert_ne!(hash, tails_hash(b"other tails"));
        assert_eq!(bs58::decode(&hash).into_vec().unwrap().len(), 32);
    }
}

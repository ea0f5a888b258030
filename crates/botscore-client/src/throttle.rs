//! Client-side request spacing shared by every worker

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Enforces a minimum interval between consecutive requests
pub struct RequestThrottle {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RequestThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait until the next request may be sent
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Request throttle: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_is_immediate() {
        let throttle = RequestThrottle::new(Duration::from_secs(60));
        let started = Instant::now();
        tokio_test::block_on(throttle.wait());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_spacing_between_requests() {
        let throttle = RequestThrottle::new(Duration::from_millis(30));
        let started = Instant::now();
        throttle.wait().await;
        throttle.wait().await;
        throttle.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}

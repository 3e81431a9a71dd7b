use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{info, warn};

use crate::error::Result;
use crate::metrics::POPULARITY_REFRESH_TOTAL;
use crate::services::popularity::{PopularityBoard, PopularitySource};

/// Keeps the popularity snapshot fresh.
///
/// Runs once immediately so search has a populated snapshot shortly after
/// startup, then on the configured interval. A failed refresh leaves the
/// previous snapshot in place; stale popularity is still used for ranking.
#[derive(Clone)]
pub struct PopularityRefreshJob {
    source: Arc<dyn PopularitySource>,
    board: PopularityBoard,
    interval: Duration,
    window_days: i64,
}

impl PopularityRefreshJob {
    pub fn new(
        source: Arc<dyn PopularitySource>,
        board: PopularityBoard,
        interval: Duration,
        window_days: i64,
    ) -> Self {
        Self {
            source,
            board,
            interval,
            window_days,
        }
    }

    /// Run the refresh loop. Intended to be spawned on the Tokio runtime.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now(), self.interval);
        info!(
            interval_secs = self.interval.as_secs(),
            window_days = self.window_days,
            "Popularity refresh job started"
        );

        loop {
            ticker.tick().await;
            // Failures are logged inside; the loop keeps going.
            let _ = self.refresh_once().await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn refresh_once(&self) -> Result<usize> {
        match self
            .board
            .refresh(self.source.as_ref(), self.window_days, Utc::now())
            .await
        {
            Ok(size) => {
                POPULARITY_REFRESH_TOTAL.with_label_values(&["success"]).inc();
                Ok(size)
            }
            Err(err) => {
                POPULARITY_REFRESH_TOTAL.with_label_values(&["error"]).inc();
                let stale_since = self.board.current().await.computed_at;
                warn!(
                    error = %err,
                    stale_since = ?stale_since,
                    "Popularity refresh failed, keeping previous snapshot"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct FixedSource(Uuid);

    #[async_trait]
    impl PopularitySource for FixedSource {
        async fn recompute(&self, window_days: i64, _: DateTime<Utc>) -> Result<HashMap<Uuid, u64>> {
            Ok(HashMap::from([(self.0, window_days as u64)]))
        }
    }

    #[tokio::test]
    async fn test_refresh_once_loads_board() {
        let recipe = Uuid::new_v4();
        let board = PopularityBoard::new();
        let job = PopularityRefreshJob::new(
            Arc::new(FixedSource(recipe)),
            board.clone(),
            Duration::from_secs(300),
            30,
        );

        assert_eq!(job.refresh_once().await.unwrap(), 1);
        assert_eq!(board.current().await.count(&recipe), 30);
    }
}

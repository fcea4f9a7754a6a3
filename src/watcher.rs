// src/watcher.rs - Stock change feed
//
// A background task polls stocks.updated_at and publishes debounced change
// events over a broadcast channel. Clients subscribe through an SSE endpoint
// and only see events for their own owner scope.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::interval;

use crate::auth::{get_current_user, resolve_owner_id};
use crate::config::WatcherConfig;
use crate::error::ApiResult;
use crate::AppState;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct StockChangeEvent {
    pub stock_id: String,
    #[serde(skip_serializing)]
    pub user_id: String,
    pub product_name: String,
    pub barcode: String,
    pub total_quantity: i64,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ChangedStockRow {
    id: String,
    user_id: String,
    product_name: String,
    barcode: String,
    total_quantity: i64,
    status: String,
    updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct StockWatcher {
    sender: broadcast::Sender<StockChangeEvent>,
}

impl StockWatcher {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StockChangeEvent> {
        self.sender.subscribe()
    }

    /// Spawn the polling loop. Each stock id is debounced so a burst of
    /// writes produces a single event.
    pub fn spawn(&self, pool: SqlitePool, config: WatcherConfig) {
        if !config.enabled {
            log::info!("Stock watcher disabled by configuration");
            return;
        }

        let sender = self.sender.clone();
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(config.poll_interval_ms));
            let debounce = Duration::from_millis(config.debounce_ms);
            let mut last_checked = Utc::now();
            let mut last_emitted: HashMap<String, Instant> = HashMap::new();

            loop {
                ticker.tick().await;

                let changed: Vec<ChangedStockRow> = match sqlx::query_as(
                    r#"SELECT id, user_id, product_name, barcode, total_quantity,
                              status, updated_at
                       FROM stocks
                       WHERE updated_at > ?"#,
                )
                .bind(last_checked)
                .fetch_all(&pool)
                .await
                {
                    Ok(rows) => rows,
                    Err(e) => {
                        log::error!("Stock watcher poll failed: {}", e);
                        continue;
                    }
                };

                let poll_time = Utc::now();
                let now = Instant::now();

                for row in changed {
                    let recently_sent = last_emitted
                        .get(&row.id)
                        .map(|t| now.duration_since(*t) < debounce)
                        .unwrap_or(false);
                    if recently_sent {
                        continue;
                    }
                    last_emitted.insert(row.id.clone(), now);

                    let event = StockChangeEvent {
                        stock_id: row.id,
                        user_id: row.user_id,
                        product_name: row.product_name,
                        barcode: row.barcode,
                        total_quantity: row.total_quantity,
                        status: row.status,
                        updated_at: row.updated_at,
                    };
                    // Ignore send errors: no subscriber is fine
                    let _ = sender.send(event);
                }

                last_emitted.retain(|_, t| now.duration_since(*t) < debounce * 4);
                last_checked = poll_time;
            }
        });
    }
}

impl Default for StockWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /api/stocks/events` - server-sent events stream of stock changes for
/// the caller's owner scope.
pub async fn stock_events(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let owner_id = resolve_owner_id(&claims)?;

    let receiver = app_state.stock_watcher.subscribe();

    let stream = futures_util::stream::unfold(
        (receiver, owner_id),
        |(mut receiver, owner_id)| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if event.user_id != owner_id {
                            continue;
                        }
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(_) => continue,
                        };
                        let frame = web::Bytes::from(format!("data: {}\n\n", payload));
                        return Some((
                            Ok::<web::Bytes, actix_web::Error>(frame),
                            (receiver, owner_id),
                        ));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("SSE subscriber lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        },
    );

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_receives_published_events() {
        let watcher = StockWatcher::new();
        let mut rx = watcher.subscribe();

        let event = StockChangeEvent {
            stock_id: "s-1".to_string(),
            user_id: "u-1".to_string(),
            product_name: "น้ำดื่ม".to_string(),
            barcode: "885000111".to_string(),
            total_quantity: 12,
            status: "สินค้าพร้อมขาย".to_string(),
            updated_at: Utc::now(),
        };
        watcher.sender.send(event.clone()).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.stock_id, "s-1");
        assert_eq!(received.total_quantity, 12);
    }

    #[tokio::test]
    async fn test_disabled_watcher_spawns_nothing() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let watcher = StockWatcher::new();
        watcher.spawn(
            pool,
            WatcherConfig {
                enabled: false,
                poll_interval_ms: 10,
                debounce_ms: 10,
            },
        );
        // No poll loop runs, so no events arrive
        let mut rx = watcher.subscribe();
        let outcome =
            tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(outcome.is_err());
    }
}

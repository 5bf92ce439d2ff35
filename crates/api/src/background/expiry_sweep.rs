//! Periodic expiry of overdue pending requests.
//!
//! Reads already expire requests lazily; the sweep catches the ones nobody
//! reads, so their clients and the eligible technicians hear about it.

use std::sync::Arc;
use std::time::Duration;

use repairlink_negotiation::LifecycleEngine;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(engine: Arc<LifecycleEngine>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Expiry sweep started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Expiry sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                match engine.expire_overdue().await {
                    Ok(0) => tracing::debug!("Expiry sweep: nothing overdue"),
                    Ok(expired) => tracing::info!(expired, "Expiry sweep: expired overdue requests"),
                    Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use repairlink_db::models::service_request::CreateServiceRequest;
    use repairlink_db::models::status::RequestStatus;
    use repairlink_events::EventBus;
    use repairlink_negotiation::clock::ManualClock;
    use repairlink_negotiation::memory::{InMemoryStore, StaticDirectory};

    use super::*;

    #[tokio::test]
    async fn sweep_expires_overdue_and_stops_on_cancel() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap(),
        ));
        let directory = StaticDirectory::new()
            .with_user(1, "client", "Dana")
            .with_appliance(100, "oven", "Bosch", "HBG634")
            .with_specialty(10, "oven");
        let engine = Arc::new(
            LifecycleEngine::new(
                Arc::new(InMemoryStore::new()),
                Arc::new(directory),
                Arc::new(EventBus::default()),
            )
            .with_clock(clock.clone()),
        );

        let request = engine
            .create(
                1,
                &CreateServiceRequest {
                    appliance_id: 100,
                    description: "Does not heat".to_string(),
                    client_price: 20_000,
                    valid_minutes: Some(1),
                },
            )
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(2));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&engine),
            Duration::from_millis(10),
            cancel.clone(),
        ));

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweep should stop after cancel")
            .unwrap();

        // Listing does not expire lazily, so this observes the sweep.
        let rows = engine.by_client(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, request.id);
        assert_eq!(rows[0].status(), Some(RequestStatus::Expired));
    }
}

//! End-to-end tests for the dispatch protocol
//!
//! Drive the public API the way the HTTP layer does: create a ride, feed driver
//! replies through the inbound handler, read status back.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use ride_dispatch::channel::RecordingChannel;
use ride_dispatch::config::Config;
use ride_dispatch::dispatch::DispatchService;
use ride_dispatch::inbound::{InboundOutcome, InboundSms};
use ride_dispatch::poller::{poll_until_resolved, PollOutcome, PollPolicy};
use ride_dispatch::ride::{NewRide, RideRequest, RideStatus};
use ride_dispatch::store::{MemoryStore, RideStore, SqliteStore};
use ride_dispatch::Error;
use std::sync::Arc;

const DRIVER: &str = "+15555550100";

fn service_with(store: Arc<dyn RideStore>) -> (Arc<DispatchService>, Arc<RecordingChannel>) {
    let channel = Arc::new(RecordingChannel::new());
    let service = DispatchService::new(store, channel.clone(), DRIVER, Duration::minutes(30));
    (Arc::new(service), channel)
}

fn service() -> (Arc<DispatchService>, Arc<RecordingChannel>) {
    service_with(Arc::new(MemoryStore::new()))
}

fn ride(rider_id: &str, name: &str, pickup: &str, dropoff: &str, fare: f64) -> NewRide {
    NewRide {
        rider_id: rider_id.to_string(),
        rider_name: name.to_string(),
        pickup_location: pickup.to_string(),
        dropoff_location: dropoff.to_string(),
        estimated_fare: fare,
    }
}

/// Scenario 1: a new request is stored as pending
#[tokio::test]
async fn test_send_notification_then_status() {
    let (service, channel) = service();
    let outcome = service
        .send_notification(ride("r1", "Alice", "Main St", "Airport", 0.0004))
        .await
        .unwrap();

    let status = service.get_status(outcome.ride_id()).unwrap();
    assert_eq!(status.status, RideStatus::Pending);
    assert_eq!(status.rider_name, "Alice");
    assert_eq!(status.estimated_fare, 0.0004);
    assert_eq!(status.pickup_location, "Main St");
    assert_eq!(status.dropoff_location, "Airport");

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, DRIVER);
    assert!(sent[0].text.contains("0.0004"));
}

/// Scenario 2: lower-case accept from the driver resolves the ride
#[tokio::test]
async fn test_driver_accepts() {
    let (service, channel) = service();
    service
        .send_notification_with_id("RIDE123", ride("r1", "Alice", "Main St", "Airport", 0.0004))
        .await
        .unwrap();
    channel.clear();

    let handler = service.inbound_handler();
    let outcome = handler.handle(&InboundSms::new("accept RIDE123", DRIVER)).await;

    assert_eq!(outcome, InboundOutcome::Accepted("RIDE123".to_string()));
    assert_eq!(service.get_status("RIDE123").unwrap().status, RideStatus::Accepted);
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Main St"));
    assert!(sent[0].text.contains("Alice"));
}

/// Scenario 3: reply for a ride that does not exist
#[tokio::test]
async fn test_driver_replies_to_unknown_ride() {
    let (service, channel) = service();
    let existing = service
        .send_notification(ride("r1", "Alice", "Main St", "Airport", 0.0004))
        .await
        .unwrap();
    channel.clear();

    let handler = service.inbound_handler();
    let outcome = handler.handle(&InboundSms::new("IGNORE RIDE999", DRIVER)).await;

    assert_eq!(outcome, InboundOutcome::RideNotFound(Some("RIDE999".to_string())));
    assert_eq!(service.ride_count().unwrap(), 1);
    assert_eq!(
        service.get_status(existing.ride_id()).unwrap().status,
        RideStatus::Pending
    );

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, DRIVER);
    assert!(sent[0].text.contains("RIDE999"));
}

/// Scenario 4: replies from anyone but the driver change nothing
#[tokio::test]
async fn test_unknown_sender_changes_nothing() {
    let (service, channel) = service();
    service
        .send_notification_with_id("RIDE123", ride("r1", "Alice", "Main St", "Airport", 0.0004))
        .await
        .unwrap();
    channel.clear();

    let handler = service.inbound_handler();
    for body in ["ACCEPT RIDE123", "IGNORE RIDE123", "hello", ""] {
        let outcome = handler.handle(&InboundSms::new(body, "+16175551234")).await;
        assert_eq!(outcome, InboundOutcome::UnknownSender);
    }

    assert_eq!(service.get_status("RIDE123").unwrap().status, RideStatus::Pending);
    assert!(channel.sent().is_empty());
}

#[tokio::test]
async fn test_retransmitted_accept_single_transition() {
    let (service, channel) = service();
    service
        .send_notification_with_id("RIDE5", ride("r1", "Alice", "Main St", "Airport", 1.25))
        .await
        .unwrap();
    channel.clear();

    let handler = service.inbound_handler();
    let sms = InboundSms::new("ACCEPT RIDE5", DRIVER);
    let first = handler.handle(&sms).await;
    let second = handler.handle(&sms).await;

    assert_eq!(first, InboundOutcome::Accepted("RIDE5".to_string()));
    assert!(matches!(second, InboundOutcome::AlreadyResolved { status: RideStatus::Accepted, .. }));
    assert_eq!(channel.sent().len(), 1);
}

#[tokio::test]
async fn test_poller_sees_driver_answer() {
    let (service, _channel) = service();
    let outcome = service
        .send_notification(ride("r1", "Alice", "Main St", "Airport", 0.0004))
        .await
        .unwrap();
    let ride_id = outcome.ride_id().to_string();

    let handler = service.inbound_handler();
    let reply_id = ride_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        handler
            .handle(&InboundSms::new(&format!("ignore {}", reply_id), DRIVER))
            .await;
    });

    let policy = PollPolicy {
        interval: std::time::Duration::from_millis(5),
        timeout: std::time::Duration::from_secs(5),
    };
    let result = poll_until_resolved(service.as_ref(), &ride_id, policy).await.unwrap();
    assert_eq!(result, PollOutcome::Resolved(RideStatus::Ignored));
}

#[tokio::test]
async fn test_poller_timeout_leaves_record_pending() {
    let (service, _channel) = service();
    let outcome = service
        .send_notification(ride("r1", "Alice", "Main St", "Airport", 0.0004))
        .await
        .unwrap();

    let policy = PollPolicy::from_config(&Config::for_test());
    let result = poll_until_resolved(service.as_ref(), outcome.ride_id(), policy).await.unwrap();

    assert_eq!(result.effective_status(), RideStatus::Ignored);
    assert_eq!(
        service.get_status(outcome.ride_id()).unwrap().status,
        RideStatus::Pending
    );
}

#[test]
fn test_retention_sweep_regardless_of_status() {
    for store in [
        Arc::new(MemoryStore::new()) as Arc<dyn RideStore>,
        Arc::new(SqliteStore::open_in_memory().unwrap()) as Arc<dyn RideStore>,
    ] {
        let (service, _channel) = service_with(Arc::clone(&store));
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        for (id, status) in [
            ("PENDING1", None),
            ("ACCEPTED1", Some(RideStatus::Accepted)),
            ("IGNORED1", Some(RideStatus::Ignored)),
        ] {
            store
                .insert(RideRequest::new(
                    id.to_string(),
                    ride("r1", "Alice", "Main St", "Airport", 0.0004),
                    t,
                ))
                .unwrap();
            if let Some(status) = status {
                store.set_status(id, status).unwrap();
            }
        }

        let retention = Duration::minutes(30);
        assert_eq!(service.sweep_expired(t + retention - Duration::seconds(1)).unwrap(), 0);
        assert_eq!(service.ride_count().unwrap(), 3);

        assert_eq!(service.sweep_expired(t + retention + Duration::seconds(1)).unwrap(), 3);
        assert!(matches!(service.get_status("ACCEPTED1"), Err(Error::NotFound(_))));
    }
}

#[tokio::test]
async fn test_sqlite_backed_flow() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::open(&temp_dir.path().join("rides.db")).unwrap());
    let (service, _channel) = service_with(store);

    let outcome = service
        .send_notification(ride("r2", "Bob", "Pier 39", "Union Square", 0.0123))
        .await
        .unwrap();
    let handler = service.inbound_handler();
    let reply = format!("  Accept {}  ", outcome.ride_id().to_lowercase());
    handler.handle(&InboundSms::new(&reply, DRIVER)).await;

    let stored = service.get_status(outcome.ride_id()).unwrap();
    assert_eq!(stored.status, RideStatus::Accepted);
    assert_eq!(stored.rider_name, "Bob");
    assert_eq!(stored.created_at, outcome.ride.created_at);
}

#[derive(Debug, Clone, Copy)]
enum Attempt {
    Accept,
    Ignore,
    Reset,
}

fn attempt() -> impl Strategy<Value = Attempt> {
    prop_oneof![Just(Attempt::Accept), Just(Attempt::Ignore), Just(Attempt::Reset)]
}

proptest! {
    /// After the first successful transition the status never moves again
    #[test]
    fn prop_status_is_monotonic(attempts in prop::collection::vec(attempt(), 1..30)) {
        let store = MemoryStore::new();
        store
            .insert(RideRequest::new(
                "RIDE1".to_string(),
                ride("r1", "Alice", "Main St", "Airport", 0.0004),
                Utc::now(),
            ))
            .unwrap();

        let mut resolved: Option<RideStatus> = None;
        for attempt in attempts {
            let target = match attempt {
                Attempt::Accept => RideStatus::Accepted,
                Attempt::Ignore => RideStatus::Ignored,
                Attempt::Reset => RideStatus::Pending,
            };
            let result = store.set_status("RIDE1", target);
            match resolved {
                Some(_) => prop_assert!(result.is_err()),
                None if target.is_terminal() => {
                    prop_assert!(result.is_ok());
                    resolved = Some(target);
                }
                None => prop_assert!(result.is_err()),
            }
            let current = store.get("RIDE1").unwrap().status;
            prop_assert_eq!(current, resolved.unwrap_or(RideStatus::Pending));
        }
    }

    /// Any sender other than the driver leaves every record untouched
    #[test]
    fn prop_foreign_sender_isolated(body in ".{0,40}", from in "\\+1[2-4][0-9]{9}") {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (service, channel) = service();
        runtime.block_on(async {
            service
                .send_notification_with_id("RIDE1", ride("r1", "Alice", "Main St", "Airport", 0.0004))
                .await
                .unwrap();
        });
        channel.clear();

        let outcome = runtime.block_on(service.inbound_handler().handle(&InboundSms::new(&body, &from)));
        prop_assert_eq!(outcome, InboundOutcome::UnknownSender);
        prop_assert_eq!(service.get_status("RIDE1").unwrap().status, RideStatus::Pending);
        prop_assert!(channel.sent().is_empty());
    }
}

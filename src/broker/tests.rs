use super::Broker;
use super::message::{EventFrame, KEEPALIVE_FRAME, is_valid_event_name};
use crate::client::SseDecoder;
use super::subscriber::Subscriber;
use super::topic::Topic;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};

fn subscriber() -> (Subscriber, UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    (Subscriber::new(tx), rx)
}

#[test]
fn test_topic_new() {
    let topic = Topic::new("test_topic");
    assert_eq!(topic.name, "test_topic");
    assert!(topic.is_empty());
}

#[test]
fn test_topic_subscribe_same_id_twice_keeps_one_entry() {
    let mut topic = Topic::new("test_topic");
    let (tx, _rx) = mpsc::unbounded_channel::<String>();
    let first = Subscriber::new(tx.clone());
    let id = first.id.clone();
    topic.subscribe(first);

    let mut again = Subscriber::new(tx);
    again.id = id.clone();
    topic.subscribe(again);

    assert_eq!(topic.len(), 1);
    assert!(topic.contains(&id));
}

#[test]
fn test_frame_encoding() {
    let frame = EventFrame::new("odds_update", &json!({"price": 10}));
    assert_eq!(frame.encode(), "event: odds_update\ndata: {\"price\":10}\n\n");
}

#[test]
fn test_frame_string_payload_is_verbatim() {
    let frame = EventFrame::new("notice", &json!("doors open"));
    assert_eq!(frame.encode(), "event: notice\ndata: doors open\n\n");

    let multiline = EventFrame::new("notice", &json!("round 1\nround 2"));
    assert_eq!(
        multiline.encode(),
        "event: notice\ndata: round 1\ndata: round 2\n\n"
    );
}

#[test]
fn test_frame_splits_data_on_cr_and_crlf() {
    let crlf = EventFrame::new("notice", &json!("a\r\nb"));
    assert_eq!(crlf.encode(), "event: notice\ndata: a\ndata: b\n\n");

    let cr = EventFrame::new("notice", &json!("a\rb"));
    assert_eq!(cr.encode(), "event: notice\ndata: a\ndata: b\n\n");

    let mut decoder = SseDecoder::new();
    let events = decoder.feed(cr.encode().as_bytes()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, "a\nb");
}

#[test]
fn test_frame_event_name_cannot_inject_fields() {
    assert!(is_valid_event_name("odds_update"));
    assert!(!is_valid_event_name("odds_update\ndata: forged"));
    assert!(!is_valid_event_name("odds_update\r"));

    let frame = EventFrame::new("odds_update\ndata: forged\n", &json!({"price": 10}));
    let encoded = frame.encode();
    let fields: Vec<&str> = encoded.lines().filter(|line| !line.is_empty()).collect();
    assert_eq!(fields.len(), 2);
    assert!(fields[0].starts_with("event: "));
    assert!(fields[1].starts_with("data: "));

    let mut decoder = SseDecoder::new();
    let events = decoder.feed(encoded.as_bytes()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.as_deref(), Some("odds_updatedata: forged"));
    assert_eq!(events[0].data, "{\"price\":10}");
}

#[test]
fn test_broker_new() {
    let broker = Broker::default();
    assert_eq!(broker.topic_count(), 0);
    assert_eq!(broker.total_subscribers(), 0);
}

#[test]
fn test_broker_subscribe_and_unsubscribe() {
    let mut broker = Broker::new();
    let (sub, _rx) = subscriber();
    let id = sub.id.clone();

    broker.subscribe("test_topic", sub);
    assert!(broker.is_subscribed("test_topic", &id));
    assert_eq!(broker.subscriber_count("test_topic"), 1);

    assert!(broker.unsubscribe("test_topic", &id));
    assert!(!broker.is_subscribed("test_topic", &id));
    // emptied topics do not linger
    assert!(!broker.topics.contains_key("test_topic"));
    assert_eq!(broker.total_subscribers(), 0);
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let mut broker = Broker::new();
    let (sub, _rx) = subscriber();
    let id = sub.id.clone();
    broker.subscribe("t", sub);

    assert!(broker.unsubscribe("t", &id));
    assert!(!broker.unsubscribe("t", &id));
    assert!(!broker.unsubscribe("never-existed", &id));
}

#[test]
fn test_subscribe_moves_between_topics() {
    let mut broker = Broker::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let first = Subscriber::new(tx.clone());
    let id = first.id.clone();
    broker.subscribe("a", first);

    let mut moved = Subscriber::new(tx);
    moved.id = id.clone();
    broker.subscribe("b", moved);

    assert!(!broker.is_subscribed("a", &id));
    assert!(broker.is_subscribed("b", &id));
    assert!(!broker.topics.contains_key("a"));

    assert_eq!(broker.publish("a", "ping", &json!(1)), 0);
    assert_eq!(broker.publish("b", "ping", &json!(1)), 1);
    assert_eq!(rx.try_recv().unwrap(), "event: ping\ndata: 1\n\n");
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_remove_subscriber_by_id() {
    let mut broker = Broker::new();
    let (sub, _rx) = subscriber();
    let id = sub.id.clone();
    broker.subscribe("fight-7", sub);

    assert!(broker.remove_subscriber(&id));
    assert!(!broker.remove_subscriber(&id));
    assert_eq!(broker.topic_count(), 0);
}

#[test]
fn test_publish_scenario_then_unsubscribe() {
    let mut broker = Broker::new();
    let (a, mut rx_a) = subscriber();
    let (b, mut rx_b) = subscriber();
    let id_a = a.id.clone();
    broker.subscribe("event-42", a);
    broker.subscribe("event-42", b);

    let delivered = broker.publish("event-42", "odds_update", &json!({"price": 10}));
    assert_eq!(delivered, 2);

    let expected = "event: odds_update\ndata: {\"price\":10}\n\n";
    assert_eq!(rx_a.try_recv().unwrap(), expected);
    assert_eq!(rx_b.try_recv().unwrap(), expected);

    broker.unsubscribe("event-42", &id_a);
    let delivered = broker.publish("event-42", "odds_update", &json!({"price": 12}));
    assert_eq!(delivered, 1);

    assert!(rx_a.try_recv().is_err());
    assert_eq!(
        rx_b.try_recv().unwrap(),
        "event: odds_update\ndata: {\"price\":12}\n\n"
    );
}

#[test]
fn test_publish_to_nonexistent_topic() {
    let mut broker = Broker::default();
    assert_eq!(broker.publish("nonexistent_topic", "x", &json!({})), 0);
    assert_eq!(broker.topic_count(), 0);
}

#[test]
fn test_publish_drops_closed_subscriber_and_still_delivers() {
    let mut broker = Broker::new();
    let (dead, dead_rx) = subscriber();
    let (live, mut live_rx) = subscriber();
    let dead_id = dead.id.clone();
    let live_id = live.id.clone();
    broker.subscribe("t", dead);
    broker.subscribe("t", live);

    // Drop the receiver to close the channel
    drop(dead_rx);

    assert_eq!(broker.publish("t", "tick", &json!({"n": 1})), 1);
    assert!(!broker.is_subscribed("t", &dead_id));
    assert!(broker.is_subscribed("t", &live_id));
    assert_eq!(live_rx.try_recv().unwrap(), "event: tick\ndata: {\"n\":1}\n\n");
}

#[test]
fn test_publish_removes_topic_when_all_writes_fail() {
    let mut broker = Broker::new();
    let (sub, rx) = subscriber();
    broker.subscribe("t", sub);
    drop(rx);

    assert_eq!(broker.publish("t", "tick", &json!(null)), 0);
    assert_eq!(broker.topic_count(), 0);
    assert_eq!(broker.total_subscribers(), 0);
}

#[test]
fn test_publish_all_reaches_every_topic() {
    let mut broker = Broker::new();
    let (a, mut rx_a) = subscriber();
    let (b, mut rx_b) = subscriber();
    broker.subscribe("event-1", a);
    broker.subscribe("event-2", b);

    let delivered = broker.publish_all("announcement", &json!({"msg": "maintenance"}));
    assert_eq!(delivered, 2);

    let expected = "event: announcement\ndata: {\"msg\":\"maintenance\"}\n\n";
    assert_eq!(rx_a.try_recv().unwrap(), expected);
    assert_eq!(rx_b.try_recv().unwrap(), expected);
}

#[test]
fn test_heartbeat_reaps_closed_streams() {
    let mut broker = Broker::new();
    let (dead, dead_rx) = subscriber();
    let (live, mut live_rx) = subscriber();
    broker.subscribe("quiet", dead);
    broker.subscribe("quiet", live);
    drop(dead_rx);

    assert_eq!(broker.heartbeat(), 1);
    assert_eq!(broker.subscriber_count("quiet"), 1);
    assert_eq!(live_rx.try_recv().unwrap(), KEEPALIVE_FRAME);
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_loop_reaps_in_background() {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    let broker = Arc::new(Mutex::new(Broker::new()));
    let (sub, rx) = subscriber();
    broker.lock().subscribe("quiet", sub);
    drop(rx);

    let task = tokio::spawn(Broker::start_keepalive_loop(
        broker.clone(),
        Duration::from_secs(15),
    ));

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(broker.lock().topic_count(), 0);
    task.abort();
}

#[test]
fn test_close_all_ends_every_stream() {
    let mut broker = Broker::new();
    let (a, mut rx_a) = subscriber();
    let (b, mut rx_b) = subscriber();
    broker.subscribe("event-1", a);
    broker.subscribe("event-2", b);

    assert_eq!(broker.close_all(), 2);
    assert_eq!(broker.topic_count(), 0);
    assert_eq!(broker.total_subscribers(), 0);
    // senders are gone, so the receivers observe the end of the stream
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.blocking_recv().is_none());
}

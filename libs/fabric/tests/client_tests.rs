use cmwlight_core::message::{
    Body, DataContext, ExceptionMessage, Header, Message, MessageType, RequestContext,
};
use cmwlight_fabric::{
    channel::Channel,
    codec::{BincodeCodec, Codec},
    error::Error,
    publisher::{ChannelPublisher, EventKind, PublishedEvent},
    subscription::SubscriptionState,
    transport::{MemoryTransport, Transport},
    Client, ClientConfig, ConnectionState, Housekeeping,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

fn ack(version: &str) -> Message {
    Message::ServerConnectAck {
        version: version.to_string(),
    }
}

fn reply(id: u64, body: Body) -> Message {
    Message::Reply {
        header: Header::new(id, "testdev", "testprop"),
        body,
    }
}

fn data_reply(id: u64) -> Message {
    reply(
        id,
        Body::Reply {
            data: vec![1, 2, 3],
            context: DataContext {
                cycle_name: "FAIR.SELECTOR.C=1".to_string(),
                cycle_stamp: 10,
                acq_stamp: 11,
                data: None,
            },
        },
    )
}

fn notification(id: u64, notification_id: i64) -> Message {
    reply(
        id,
        Body::NotificationData {
            notification_id,
            data: vec![notification_id as u8],
            context: DataContext::default(),
        },
    )
}

fn exception(message: &str) -> ExceptionMessage {
    ExceptionMessage::new(314, 981, message, 3)
}

/// Client plus the server end of its connection, already past the handshake
async fn connected(config: ClientConfig) -> (Client, Channel) {
    let (client_side, server_side) = MemoryTransport::pair();
    let mut server = Channel::from_transport(server_side);
    server.send(&ack("1.0.0")).await.unwrap();

    let mut client = Client::new(client_side, config);
    client.connect().await.unwrap();
    assert_eq!(
        server.receive().await.unwrap(),
        Message::ClientConnect {
            version: "1.0.0".to_string()
        }
    );
    (client, server)
}

async fn next_request(server: &mut Channel) -> (Header, Body) {
    match server.receive().await.unwrap() {
        Message::Request { header, body } => (header, body),
        other => panic!("Expected a request, got {:?}", other),
    }
}

#[tokio::test]
async fn connect_twice_sends_one_client_connect() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    assert_eq!(client.state(), ConnectionState::Connected);

    // Second call is a no-op; the next thing on the wire is the heartbeat
    client.connect().await.unwrap();
    client.send_heartbeat().await.unwrap();

    assert_eq!(server.receive().await.unwrap(), Message::ClientHeartbeat);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn non_ack_reply_fails_connect_and_allows_retry() {
    let (client_side, server_side) = MemoryTransport::pair();
    let mut server = Channel::from_transport(server_side);
    let mut client = Client::new(client_side, ClientConfig::new());

    server.send(&Message::ServerHeartbeat).await.unwrap();
    match client.connect().await {
        Err(Error::UnexpectedReply { actual, .. }) => {
            assert_eq!(actual, MessageType::ServerHeartbeat)
        }
        other => panic!("Expected UnexpectedReply, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);

    server.send(&ack("1.0.0")).await.unwrap();
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    for _ in 0..2 {
        assert!(matches!(
            server.receive().await.unwrap(),
            Message::ClientConnect { .. }
        ));
    }
}

#[tokio::test]
async fn connect_checks_major_version() {
    let (client_side, server_side) = MemoryTransport::pair();
    let mut server = Channel::from_transport(server_side);
    let mut client = Client::new(client_side, ClientConfig::new());

    server.send(&ack("2.0.0")).await.unwrap();
    match client.connect().await {
        Err(Error::VersionMismatch { client, server }) => {
            assert_eq!(client, "1.0.0");
            assert_eq!(server, "2.0.0");
        }
        other => panic!("Expected VersionMismatch, got {:?}", other),
    }

    server.send(&ack("1.7.3")).await.unwrap();
    client.connect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn connect_times_out_without_ack() {
    let (client_side, _server_side) = MemoryTransport::pair();
    let config = ClientConfig::new().connect_timeout(Duration::from_millis(50));
    let mut client = Client::new(client_side, config);

    match client.connect().await {
        Err(Error::Timeout(what)) => assert_eq!(what, "Connect"),
        other => panic!("Expected timeout, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn requests_need_a_connection() {
    let (client_side, _server_side) = MemoryTransport::pair();
    let mut client = Client::new(client_side, ClientConfig::new());

    let result = client
        .get("testdev", "testprop", RequestContext::new("sel"))
        .await;
    assert!(matches!(result, Err(Error::NotConnected)));
    assert!(matches!(client.send_heartbeat().await, Err(Error::NotConnected)));
    assert!(matches!(client.receive().await, Err(Error::NotConnected)));
}

#[tokio::test]
async fn request_ids_strictly_increase() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let ctx = RequestContext::new("sel");

    let mut ids = Vec::new();
    for round in 0..5 {
        ids.push(client.get("dev", "prop", ctx.clone()).await.unwrap());
        ids.push(
            client
                .set("dev", "prop", vec![round], ctx.clone())
                .await
                .unwrap(),
        );
        ids.push(client.subscribe("dev", "prop", ctx.clone()).await.unwrap());
    }

    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    for &id in &ids {
        let (header, _) = next_request(&mut server).await;
        assert_eq!(header.id, id);
        assert_eq!(header.session_id, client.identity());
    }
}

#[tokio::test]
async fn identity_and_session_id() {
    let (client, _server) = connected(ClientConfig::new()).await;
    let prefix = format!("cmwlight-rs-{}-", std::process::id());
    assert!(client.identity().starts_with(&prefix));
    assert!(client.identity().ends_with("-1"));
    assert_eq!(client.session_id(), client.identity());

    let config = ClientConfig::new().session_id("testsession");
    let (mut client, mut server) = connected(config).await;
    client
        .get("testdev", "testprop", RequestContext::new("sel"))
        .await
        .unwrap();
    let (header, _) = next_request(&mut server).await;
    assert_eq!(header.session_id, "testsession");
}

#[tokio::test]
async fn server_heartbeats_are_filtered() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let id = client
        .get("testdev", "testprop", RequestContext::new("sel"))
        .await
        .unwrap();

    server.send(&Message::ServerHeartbeat).await.unwrap();
    server.send(&data_reply(id)).await.unwrap();

    assert_eq!(client.receive().await.unwrap(), None);
    assert_eq!(client.receive().await.unwrap(), Some(data_reply(id)));
}

#[tokio::test]
async fn get_gets_at_most_one_reply() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let id = client
        .get("testdev", "testprop", RequestContext::new("sel"))
        .await
        .unwrap();
    assert!(client.is_pending(id));

    server.send(&data_reply(id)).await.unwrap();
    server.send(&data_reply(id)).await.unwrap();
    server.send(&data_reply(id + 100)).await.unwrap();

    assert!(client.receive().await.unwrap().is_some());
    assert!(!client.is_pending(id));
    assert_eq!(client.receive().await.unwrap(), None);
    assert_eq!(client.receive().await.unwrap(), None);
}

#[tokio::test]
async fn exception_reply_is_delivered_intact() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let id = client
        .set("testdev", "testprop", vec![9], RequestContext::new("sel"))
        .await
        .unwrap();

    let expected = reply(id, Body::Exception(exception("test exception message")));
    server.send(&expected).await.unwrap();

    assert_eq!(client.receive().await.unwrap(), Some(expected));
}

#[tokio::test]
async fn subscription_lifecycle() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let ctx = RequestContext::new("FAIR.SELECTOR.ALL");
    let id = client
        .subscribe("testdev", "testprop", ctx.clone())
        .await
        .unwrap();

    let (header, body) = next_request(&mut server).await;
    assert_eq!(header.id, id);
    assert_eq!(body, Body::Subscribe(ctx));
    assert_eq!(
        client.subscription(id).unwrap().state,
        SubscriptionState::Subscribing
    );

    server
        .send(&reply(id, Body::SubscribeAck { source_id: 99 }))
        .await
        .unwrap();
    server.send(&notification(id, 1)).await.unwrap();
    server.send(&notification(id, 2)).await.unwrap();

    assert!(client.receive().await.unwrap().is_some());
    let sub = client.subscription(id).unwrap();
    assert_eq!(sub.state, SubscriptionState::Subscribed);
    assert_eq!(sub.source_id, Some(99));

    assert_eq!(client.receive().await.unwrap(), Some(notification(id, 1)));
    assert_eq!(client.receive().await.unwrap(), Some(notification(id, 2)));
    let sub = client.subscription(id).unwrap();
    assert_eq!(sub.notifications, 2);
    assert_eq!(sub.last_notification_id, Some(2));

    client.unsubscribe(id).await.unwrap();
    let (header, body) = next_request(&mut server).await;
    assert_eq!(header.id, id);
    assert_eq!(body, Body::Unsubscribe);
    assert!(client.subscription(id).is_none());

    // Still in flight when UNSUBSCRIBE went out
    server.send(&notification(id, 3)).await.unwrap();
    assert_eq!(client.receive().await.unwrap(), None);

    assert!(matches!(
        client.unsubscribe(id).await,
        Err(Error::UnknownSubscription(n)) if n == id
    ));
}

#[tokio::test]
async fn subscribe_exception_marks_subscription_failed() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let id = client
        .subscribe("testdev", "testprop", RequestContext::new("sel"))
        .await
        .unwrap();

    let failure = reply(id, Body::SubscribeException(exception("no such property")));
    server.send(&failure).await.unwrap();

    assert_eq!(client.receive().await.unwrap(), Some(failure));
    assert_eq!(
        client.subscription(id).unwrap().state,
        SubscriptionState::Failed
    );

    // Data after a failure revives it
    server.send(&notification(id, 5)).await.unwrap();
    assert!(client.receive().await.unwrap().is_some());
    assert_eq!(
        client.subscription(id).unwrap().state,
        SubscriptionState::Subscribed
    );
}

#[tokio::test]
async fn unexpected_message_type_while_connected() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    server.send(&ack("1.0.0")).await.unwrap();

    match client.receive().await {
        Err(Error::UnexpectedReply { actual, .. }) => {
            assert_eq!(actual, MessageType::ServerConnectAck)
        }
        other => panic!("Expected UnexpectedReply, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn receive_honours_timeout() {
    let config = ClientConfig::new().receive_timeout(Duration::from_millis(50));
    let (mut client, _server) = connected(config).await;

    assert!(matches!(
        client.receive().await,
        Err(Error::Timeout("Receive"))
    ));
}

#[tokio::test]
async fn reply_after_receive_timeout_is_still_delivered() {
    let config = ClientConfig::new().receive_timeout(Duration::from_millis(50));
    let (mut client, mut server) = connected(config).await;

    let id = client
        .get("testdev", "testprop", RequestContext::default())
        .await
        .unwrap();
    next_request(&mut server).await;
    assert!(matches!(
        client.receive().await,
        Err(Error::Timeout("Receive"))
    ));

    server.send(&data_reply(id)).await.unwrap();
    assert_eq!(client.receive().await.unwrap(), Some(data_reply(id)));
    assert!(!client.is_pending(id));
}

#[tokio::test]
async fn undecodable_traffic_still_counts_as_activity() {
    let config = ClientConfig::new()
        .heartbeat_interval(Duration::from_millis(100))
        .heartbeat_allowed_missed(3);
    let (client_side, mut server) = MemoryTransport::pair();
    let hello = cmwlight_core::protocol::encode(&ack("1.0.0")).unwrap();
    server.send(&hello).await.unwrap();
    let mut client = Client::new(client_side, config);
    client.connect().await.unwrap();
    server.receive().await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    server.send(&[vec![0x42]]).await.unwrap();
    assert!(matches!(client.receive().await, Err(Error::Protocol(_))));

    // Silent for 350ms since connect, but only 100ms since the bad message
    let later = Instant::now() + Duration::from_millis(100);
    assert_eq!(
        client.housekeeping(later).await.unwrap(),
        Housekeeping::HeartbeatSent
    );
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn housekeeping_sends_heartbeats_and_detects_stall() {
    let config = ClientConfig::new()
        .heartbeat_interval(Duration::from_secs(1))
        .heartbeat_allowed_missed(3);
    let (mut client, mut server) = connected(config).await;
    let now = Instant::now();

    assert_eq!(client.housekeeping(now).await.unwrap(), Housekeeping::Alive);
    assert_eq!(
        client
            .housekeeping(now + Duration::from_millis(1500))
            .await
            .unwrap(),
        Housekeeping::HeartbeatSent
    );
    assert_eq!(server.receive().await.unwrap(), Message::ClientHeartbeat);
    assert_eq!(
        client
            .housekeeping(now + Duration::from_secs(2))
            .await
            .unwrap(),
        Housekeeping::Alive
    );

    assert_eq!(
        client
            .housekeeping(now + Duration::from_secs(10))
            .await
            .unwrap(),
        Housekeeping::Stalled
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.housekeeping(now).await.unwrap(), Housekeeping::Idle);
}

#[tokio::test]
async fn resubscribe_after_reattach_reuses_ids() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let first = client
        .subscribe("dev", "a", RequestContext::new("sel"))
        .await
        .unwrap();
    let second = client
        .subscribe("dev", "b", RequestContext::new("sel"))
        .await
        .unwrap();
    server
        .send(&reply(first, Body::SubscribeAck { source_id: 1 }))
        .await
        .unwrap();
    client.receive().await.unwrap();

    let (client_side, server_side) = MemoryTransport::pair();
    let mut server = Channel::from_transport(server_side);
    server.send(&ack("1.0.0")).await.unwrap();

    client.reattach(client_side);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    client.connect().await.unwrap();
    assert!(client.identity().ends_with("-2"));
    assert_eq!(client.resubscribe().await.unwrap(), 2);

    assert!(matches!(
        server.receive().await.unwrap(),
        Message::ClientConnect { .. }
    ));
    for (expected_id, property) in [(first, "a"), (second, "b")] {
        let (header, body) = next_request(&mut server).await;
        assert_eq!(header.id, expected_id);
        assert_eq!(header.property_name, property);
        assert!(matches!(body, Body::Subscribe(_)));
    }

    let sub = client.subscription(first).unwrap();
    assert_eq!(sub.state, SubscriptionState::Subscribing);
    assert_eq!(sub.source_id, None);
}

#[tokio::test]
async fn poll_publishes_with_classification() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let get = client
        .get("testdev", "testprop", RequestContext::new("sel"))
        .await
        .unwrap();
    let sub = client
        .subscribe("testdev", "testprop", RequestContext::new("sel"))
        .await
        .unwrap();

    server.send(&data_reply(get)).await.unwrap();
    server.send(&Message::ServerHeartbeat).await.unwrap();
    server
        .send(&reply(sub, Body::NotificationException(exception("gone"))))
        .await
        .unwrap();

    let mut events: Vec<PublishedEvent> = Vec::new();
    assert!(client.poll(&mut events).await.unwrap());
    assert!(!client.poll(&mut events).await.unwrap());
    assert!(client.poll(&mut events).await.unwrap());

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Update);
    assert_eq!(events[0].kind.as_str(), "update");
    assert_eq!(events[0].address, client.peer());
    assert_eq!(events[1].kind, EventKind::Exception);
    assert_eq!(events[1].kind.as_str(), "exception");
}

#[tokio::test]
async fn channel_publisher_forwards_events() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let id = client
        .get("testdev", "testprop", RequestContext::new("sel"))
        .await
        .unwrap();
    server.send(&data_reply(id)).await.unwrap();

    let (mut publisher, mut events) = ChannelPublisher::channel();
    assert!(client.poll(&mut publisher).await.unwrap());

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind, EventKind::Update);
    assert_eq!(event.message, data_reply(id));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Setting {
    current: f64,
    label: String,
}

#[tokio::test]
async fn set_value_encodes_payload_with_codec() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    let value = Setting {
        current: 12.5,
        label: "ramp".to_string(),
    };

    client
        .set_value(
            &BincodeCodec::new(),
            "testdev",
            "Setting",
            &value,
            RequestContext::new("sel"),
        )
        .await
        .unwrap();

    let (_, body) = next_request(&mut server).await;
    let decoded: Setting = BincodeCodec::new().decode_body(&body).unwrap();
    assert_eq!(decoded, value);

    let missing: Result<Setting, _> = BincodeCodec::new().decode_body(&Body::Unsubscribe);
    assert!(matches!(missing, Err(Error::Codec(_))));
}

#[tokio::test]
async fn close_disconnects() {
    let (mut client, mut server) = connected(ClientConfig::new()).await;
    client.close().await.unwrap();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(server.receive().await, Err(Error::ConnectionClosed)));
}

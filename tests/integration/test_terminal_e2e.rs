use crate::common::{next_event, ChannelHandler, FakeBroker, HandlerEvent};
use crate::test_config::{DELIVERY_WINDOW, TEST_TOPIC};
use mqttline::mqtt::{Connection, ConnectionState, InboundMessage};
use mqttline::terminal::Terminal;
use rumqttc::QoS;
use tokio::io::BufReader;

#[tokio::test]
async fn test_terminal_session_against_broker() {
    let broker = FakeBroker::start().await;
    let (handler, mut events) = ChannelHandler::new();
    let connection = Connection::connect(&broker.config(), handler).await.unwrap();
    assert!(matches!(
        next_event(&mut events, DELIVERY_WINDOW).await,
        Some(HandlerEvent::Connected { code: 0, .. })
    ));

    let input = tokio_test::io::Builder::new()
        .read(b"hello\n")
        .read(b"second line\n")
        .read(b"\n")
        .build();
    let mut output = Vec::new();

    let summary = Terminal::new(BufReader::new(input), &mut output, TEST_TOPIC, QoS::AtLeastOnce)
        .run(&connection)
        .await
        .unwrap();

    assert_eq!(summary.published, 2);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(
        broker.published(),
        vec![
            (TEST_TOPIC.to_string(), "hello".to_string()),
            (TEST_TOPIC.to_string(), "second line".to_string()),
        ]
    );

    // Each line was acknowledged before the next prompt, and the
    // subscription delivered both back before the blank line.
    let mut received = Vec::new();
    while let Some(event) = next_event(&mut events, DELIVERY_WINDOW).await {
        match event {
            HandlerEvent::Message(InboundMessage { payload, .. }) => received.push(payload),
            HandlerEvent::Disconnected { code, .. } => {
                assert_eq!(code, 0);
                break;
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert_eq!(received, vec!["hello", "second line"]);

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.ends_with("Bye!\n\n"));
    assert!(broker.wait_for_active(0, DELIVERY_WINDOW).await);
}

use crate::common::{RecordingSession, Transcript, TranscriptWriter};
use crate::test_config::TEST_TOPIC;
use mqttline::terminal::{Terminal, FAREWELL, PROMPT};
use rumqttc::QoS;
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;

fn new_transcript() -> Transcript {
    Arc::new(Mutex::new(Vec::new()))
}

fn prompt() -> String {
    format!("out:{}\n", PROMPT)
}

#[tokio::test]
async fn test_each_line_is_published_before_next_prompt() {
    let transcript = new_transcript();
    let session = RecordingSession::new(transcript.clone());
    let input = tokio_test::io::Builder::new()
        .read(b"hello\n")
        .read(b"world\n")
        .read(b"\n")
        .build();
    let output = TranscriptWriter {
        transcript: transcript.clone(),
    };

    let summary = Terminal::new(BufReader::new(input), output, TEST_TOPIC, QoS::AtLeastOnce)
        .run(&session)
        .await
        .unwrap();

    assert_eq!(summary.published, 2);
    assert_eq!(summary.failed, 0);

    let expected = vec![
        "subscribe:t/1".to_string(),
        prompt(),
        "out:\n".to_string(),
        "publish:t/1:hello".to_string(),
        prompt(),
        "out:\n".to_string(),
        "publish:t/1:world".to_string(),
        prompt(),
        "out:\n".to_string(),
        "disconnect".to_string(),
        format!("out:{}\n", FAREWELL),
        "out:\n".to_string(),
    ];
    assert_eq!(*transcript.lock().unwrap(), expected);
}

#[tokio::test]
async fn test_blank_line_disconnects_exactly_once() {
    let transcript = new_transcript();
    let session = RecordingSession::new(transcript.clone());
    // Anything after the blank line must never be read or published.
    let input: &[u8] = b"first\n\nafter\n\n";
    let mut output = Vec::new();

    Terminal::new(input, &mut output, TEST_TOPIC, QoS::AtLeastOnce)
        .run(&session)
        .await
        .unwrap();

    let calls = transcript.lock().unwrap().clone();
    assert_eq!(calls.iter().filter(|c| *c == "disconnect").count(), 1);
    assert!(!calls.iter().any(|c| c.contains("after")));

    let printed = String::from_utf8(output).unwrap();
    assert_eq!(printed.matches(PROMPT).count(), 2);
    assert!(printed.ends_with("Bye!\n\n"));
}

#[tokio::test]
async fn test_immediate_blank_line_publishes_nothing() {
    let transcript = new_transcript();
    let session = RecordingSession::new(transcript.clone());
    let input = tokio_test::io::Builder::new().read(b"\n").build();
    let mut output = Vec::new();

    let summary = Terminal::new(BufReader::new(input), &mut output, TEST_TOPIC, QoS::AtMostOnce)
        .run(&session)
        .await
        .unwrap();

    assert_eq!(summary.published, 0);
    assert_eq!(
        *transcript.lock().unwrap(),
        vec!["subscribe:t/1".to_string(), "disconnect".to_string()]
    );
}

#[tokio::test]
async fn test_publish_failure_is_reported_and_loop_continues() {
    let transcript = new_transcript();
    let mut session = RecordingSession::new(transcript.clone());
    session.fail_publish_of = Some("broken".to_string());
    let input: &[u8] = b"broken\nfine\n\n";
    let mut output = Vec::new();

    let summary = Terminal::new(input, &mut output, TEST_TOPIC, QoS::AtLeastOnce)
        .run(&session)
        .await
        .unwrap();

    assert_eq!(summary.published, 1);
    assert_eq!(summary.failed, 1);

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.contains("Failed to publish message: not connected"));

    let calls = transcript.lock().unwrap().clone();
    assert!(calls.contains(&"publish:t/1:fine".to_string()));
    assert_eq!(calls.last().unwrap(), "disconnect");
}

#[tokio::test]
async fn test_subscribe_failure_aborts_and_releases_session() {
    let transcript = new_transcript();
    let mut session = RecordingSession::new(transcript.clone());
    session.fail_subscribe = true;
    let input: &[u8] = b"never\n\n";
    let mut output = Vec::new();

    let result = Terminal::new(input, &mut output, TEST_TOPIC, QoS::AtLeastOnce)
        .run(&session)
        .await;

    let error = result.unwrap_err();
    assert!(error.to_string().contains("Failed to subscribe to topic 't/1'"));
    assert!(output.is_empty());
    assert_eq!(
        *transcript.lock().unwrap(),
        vec!["subscribe:t/1".to_string(), "disconnect".to_string()]
    );
}

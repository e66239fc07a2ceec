//! Lifecycle of calls driven through the public API with scripted transports.

use std::sync::Arc;

use xmlcall::CallState;
use xmlcall::Client;
use xmlcall::ClientConfig;
use xmlcall::Error;
use xmlcall::Mode;
use xmlcall::mock_transport::ScriptedTransport;
use xmlcall::transport;
use xmlwire::Value;

fn client(transport: &ScriptedTransport, mode: Mode) -> Client {
    let config = ClientConfig::builder("https://rpc.test/xmlrpc").mode(mode).build().unwrap();
    Client::new(Arc::new(transport.clone()), config)
}

#[tokio::test]
async fn test_status_500_fails_without_parsing() {
    let transport = ScriptedTransport::respond(
        500,
        "<methodResponse><params><param><value>1</value></param></params></methodResponse>",
    );
    let client = client(&transport, Mode::Buffered);

    let mut pending = client.start_call("state.getName").await.unwrap().dispatch().unwrap();
    let mut states = pending.watch_state();

    match (&mut pending).await {
        Err(Error::Transport(transport::Error::Status(500))) => {}
        other => panic!("Expected Status(500), got {:?}", other),
    }
    assert_eq!(*states.borrow_and_update(), CallState::Failed);
    assert_eq!(pending.stats().parse_events, 0);
    assert_eq!(transport.log().chunks_served, 0);
}

#[tokio::test]
async fn test_states_walk_forward() {
    let transport = ScriptedTransport::success(&Value::from("South Dakota")).unwrap();
    let client = client(&transport, Mode::Streamed);

    let mut call = client.start_call("state.getName").await.unwrap();
    let mut states = call.watch_state();
    call.push_param(&Value::Int(41)).await.unwrap();

    let first = *states.borrow_and_update();
    let observer = tokio::spawn(async move {
        let mut seen = vec![first];
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            seen.push(state);
            if state.is_terminal() {
                break;
            }
        }
        seen
    });

    assert_eq!(call.finish().await.unwrap(), Value::from("South Dakota"));
    let seen = observer.await.unwrap();

    // a watch channel may coalesce intermediate states, but never reorders them
    let order = [
        CallState::Building,
        CallState::Dispatched,
        CallState::AwaitingResponse,
        CallState::Completed,
    ];
    let mut last = 0;
    for state in &seen {
        let at = order.iter().position(|s| s == state).unwrap();
        assert!(at >= last, "state went backwards: {:?}", seen);
        last = at;
    }
    assert_eq!(seen.first(), Some(&CallState::Building));
    assert_eq!(seen.last(), Some(&CallState::Completed));
}

#[tokio::test]
async fn test_stats_account_for_both_directions() {
    let value = Value::array(["a", "b", "c"]);
    let transport = ScriptedTransport::success(&value).unwrap();
    let client = client(&transport, Mode::Streamed);

    let mut call = client.start_call("letters").await.unwrap();
    call.push_param(&Value::Int(3)).await.unwrap();
    let pending = call.dispatch().unwrap();
    let mut states = pending.watch_state();
    states.wait_for(|s| s.is_terminal()).await.unwrap();

    let stats = pending.stats();
    let log = transport.log();
    assert_eq!(stats.bytes_sent as usize, log.body.len());
    assert_eq!(stats.writes as usize, log.writes);
    assert_eq!(stats.chunks_received, 1);
    assert!(stats.parse_events > 0);
    assert_eq!(pending.await.unwrap(), value);
}

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pinflow_config::PinRef;
use pinflow_debugger::protocol::{CommandTarget, OutboundMessage, StateSource};
use pinflow_debugger::server::{self, DebugServer};
use pinflow_debugger::{DebuggerEvent, DebuggerEventKind, EventHistory};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct RecordingTarget {
  calls: Mutex<Vec<String>>,
}

impl CommandTarget for RecordingTarget {
  fn set_breakpoints(&self, breakpoints: Vec<PinRef>) {
    self.calls.lock().push(format!("breakpoints:{}", breakpoints.len()));
  }

  fn inject_input(&self, ins_id: &str, pin_id: &str, value: Value) {
    self.calls.lock().push(format!("inject:{ins_id}.{pin_id}={value}"));
  }

  fn resume(&self) {
    self.calls.lock().push("resume".to_string());
  }
}

struct FixedState(Value);

impl StateSource for FixedState {
  fn state_snapshot(&self) -> Value {
    self.0.clone()
  }
}

fn output(ins: &str, pin: &str, value: Value) -> DebuggerEvent {
  DebuggerEvent::new(
    DebuggerEventKind::OutputChange,
    "exec-1",
    ins,
    Some(pin.to_string()),
    value,
    0,
  )
}

struct Fixture {
  server: DebugServer,
  target: Arc<RecordingTarget>,
  history: Arc<EventHistory>,
  events: broadcast::Sender<OutboundMessage>,
}

fn fixture() -> Fixture {
  let target = Arc::new(RecordingTarget::default());
  let history = Arc::new(EventHistory::default());
  let (events, _) = broadcast::channel(server::CLIENT_BUFFER);
  let server = DebugServer::new(
    target.clone(),
    history.clone(),
    Arc::new(FixedState(json!({ "collect": { "collect.buffer": [1] } }))),
    events.clone(),
  );
  Fixture {
    server,
    target,
    history,
    events,
  }
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
  let request = Request::builder()
    .method(method)
    .uri(uri)
    .body(Body::empty())
    .unwrap();
  let response = app.clone().oneshot(request).await.unwrap();
  let status = response.status();
  let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
  (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_history_routes() {
  let fixture = fixture();
  fixture.history.record(output("add1", "r", json!(6)));
  fixture.history.record(output("add1", "r", json!(7)));
  let app = server::router(fixture.server);

  let (status, body) = call(&app, "GET", "/history?insId=add1&pinId=r&limit=1").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["total"], json!(2));
  assert_eq!(body["lastSamples"][0]["value"], json!(7));

  let (status, body) = call(&app, "DELETE", "/history").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "cleared": true }));

  let (_, body) = call(&app, "GET", "/history?insId=add1&pinId=r").await;
  assert_eq!(body["total"], json!(0));
}

#[tokio::test]
async fn test_state_route() {
  let app = server::router(fixture().server);

  let (status, body) = call(&app, "GET", "/state").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "collect": { "collect.buffer": [1] } }));
}

#[tokio::test]
async fn test_bad_requests_are_rejected() {
  let app = server::router(fixture().server);

  let (status, _) = call(&app, "GET", "/history?pinId=r").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = call(&app, "GET", "/history?insId=a&limit=many").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = call(&app, "POST", "/state").await;
  assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

  let (status, _) = call(&app, "GET", "/nowhere").await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_websocket_carries_commands_and_events() {
  let fixture = fixture();
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let serving = tokio::spawn(server::serve(listener, fixture.server.clone()));

  let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
    .await
    .unwrap();

  socket
    .send(Message::Text(
      r#"{ "type": "injectInput", "insId": "add1", "pinId": "n1", "value": 3 }"#.to_string(),
    ))
    .await
    .unwrap();
  socket.send(Message::Text("not json".to_string())).await.unwrap();
  socket
    .send(Message::Text(r#"{ "type": "resume" }"#.to_string()))
    .await
    .unwrap();

  tokio::time::timeout(TIMEOUT, async {
    while fixture.target.calls.lock().len() < 2 {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .unwrap();
  assert_eq!(
    fixture.target.calls.lock().as_slice(),
    &["inject:add1.n1=3".to_string(), "resume".to_string()]
  );

  fixture
    .events
    .send(OutboundMessage::Events {
      events: vec![output("add1", "r", json!(4))],
    })
    .unwrap();
  let frame = tokio::time::timeout(TIMEOUT, socket.next())
    .await
    .unwrap()
    .unwrap()
    .unwrap();
  let text = match frame {
    Message::Text(text) => text,
    other => panic!("expected a text frame, got {other:?}"),
  };
  let batch: Value = serde_json::from_str(&text).unwrap();
  assert_eq!(batch["type"], json!("events"));
  assert_eq!(batch["events"][0]["insId"], json!("add1"));
  assert_eq!(batch["events"][0]["value"], json!(4));

  fixture.server.shutdown();
  drop(socket);
  tokio::time::timeout(TIMEOUT, serving)
    .await
    .unwrap()
    .unwrap()
    .unwrap();
}

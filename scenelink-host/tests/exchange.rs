//! Sender ⇄ listener exchanges over loopback.

use std::io::Write;
use std::net::TcpStream;
use std::path::Path;
use std::thread;
use std::time::Duration;

use scenelink::{Error, ErrorKind, Params, Sender, Value};
use scenelink_host::{Exchange, Listener, LuaEvaluator, MemoryScene, Registry, Scene};
use scenelink_proto::{Command, Response};

async fn listener(project_dir: &Path) -> Listener<MemoryScene> {
    Listener::bind(
        "127.0.0.1:0",
        Registry::new(LuaEvaluator),
        MemoryScene::new(project_dir),
    )
    .await
    .unwrap()
}

fn sender_for(listener: &Listener<MemoryScene>) -> Sender {
    let addr = listener.local_addr().unwrap();
    Sender::new(addr.ip().to_string(), addr.port())
        .timeout(Duration::from_secs(10))
        .user("tests")
}

#[tokio::test]
async fn create_cube_adds_one_object() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let sender = sender_for(&listener);

    let client = thread::spawn(move || sender.create_cube([1.0, 0.0, 0.0], 2.0));
    assert_eq!(listener.serve_one().await.unwrap(), Exchange::Responded);

    assert_eq!(client.join().unwrap().unwrap(), Some(Value::from("Cube")));
    assert_eq!(listener.scene().object_count(), 1);
}

#[tokio::test]
async fn unknown_command_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let sender = sender_for(&listener);

    let client = thread::spawn(move || {
        let first = sender.request("summon_dragon", Params::new());
        let second = sender.delete_all();
        (first, second)
    });
    listener.serve_one().await.unwrap();
    listener.serve_one().await.unwrap();

    let (first, second) = client.join().unwrap();
    assert_eq!(first.unwrap_err().remote_kind(), Some(ErrorKind::UnknownCommand));
    assert_eq!(second.unwrap(), None);
}

#[tokio::test]
async fn failing_script_leaves_listener_serving() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let sender = sender_for(&listener);

    let client = thread::spawn(move || {
        let failed = sender.execute_code("error('no such operator')");
        let next = sender.create_sphere([0.0, 0.0, 1.0], 0.5);
        (failed, next)
    });
    assert_eq!(listener.serve_one().await.unwrap(), Exchange::Responded);
    assert_eq!(listener.serve_one().await.unwrap(), Exchange::Responded);

    let (failed, next) = client.join().unwrap();
    let err = failed.unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::HandlerExecution));
    assert!(err.to_string().contains("no such operator"), "{err}");
    assert_eq!(next.unwrap(), Some(Value::from("Sphere")));
    assert_eq!(listener.scene().object_count(), 1);
}

#[tokio::test]
async fn sequential_calls_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let sender = sender_for(&listener);

    let client = thread::spawn(move || {
        let first = sender.create_cube([0.0; 3], 1.0);
        let second = sender.create_cube([3.0, 0.0, 0.0], 1.0);
        (first, second)
    });

    listener.serve_one().await.unwrap();
    // The second command cannot have been read yet.
    assert_eq!(listener.scene().object_names(), ["Cube"]);
    listener.serve_one().await.unwrap();
    assert_eq!(listener.scene().object_names(), ["Cube", "Cube.001"]);

    let (first, second) = client.join().unwrap();
    assert_eq!(first.unwrap(), Some(Value::from("Cube")));
    assert_eq!(second.unwrap(), Some(Value::from("Cube.001")));
}

#[tokio::test]
async fn delete_all_empties_scene_idempotently() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let sender = sender_for(&listener);

    let client = thread::spawn(move || {
        sender
            .execute_code("for i = 1, 4 do scene.create_cube(i, 0, 0) end")
            .unwrap();
        (sender.delete_all(), sender.delete_all())
    });
    listener.serve_one().await.unwrap();
    assert_eq!(listener.scene().object_count(), 4);
    listener.serve_one().await.unwrap();
    assert_eq!(listener.scene().object_count(), 0);
    listener.serve_one().await.unwrap();
    assert_eq!(listener.scene().object_count(), 0);

    let (first, second) = client.join().unwrap();
    assert_eq!(first.unwrap(), None);
    assert_eq!(second.unwrap(), None);
}

#[tokio::test]
async fn invalid_params_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let sender = sender_for(&listener);

    let client = thread::spawn(move || {
        let params = Params::from([("location".to_owned(), Value::from([0.0; 3]))]);
        sender.request("create_cube", params)
    });
    listener.serve_one().await.unwrap();

    let err = client.join().unwrap().unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::InvalidParams));
    assert!(err.to_string().contains("missing: size"), "{err}");
    assert_eq!(listener.scene().object_count(), 0);
}

#[tokio::test]
async fn malformed_payload_gets_decode_error_response() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let addr = listener.local_addr().unwrap();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        scenelink_proto::write_frame(&mut stream, b"{\"command\": 42").unwrap();
        scenelink_proto::decode::<Response>(&mut stream).unwrap()
    });
    assert_eq!(listener.serve_one().await.unwrap(), Exchange::Responded);

    let resp = client.join().unwrap();
    assert!(
        matches!(resp, Response::Error { kind: ErrorKind::Decode, .. }),
        "{resp:?}"
    );
}

#[tokio::test]
async fn short_location_is_invalid_params_not_decode() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let addr = listener.local_addr().unwrap();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        scenelink_proto::write_frame(
            &mut stream,
            br#"{"command":"create_cube","params":{"location":[1,0],"size":2}}"#,
        )
        .unwrap();
        scenelink_proto::decode::<Response>(&mut stream).unwrap()
    });
    assert_eq!(listener.serve_one().await.unwrap(), Exchange::Responded);

    let resp = client.join().unwrap();
    assert!(
        matches!(resp, Response::Error { kind: ErrorKind::InvalidParams, .. }),
        "{resp:?}"
    );
    assert_eq!(listener.scene().object_count(), 0);
}

#[tokio::test]
async fn early_close_gets_no_response() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let addr = listener.local_addr().unwrap();
    let sender = sender_for(&listener);

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        // Header promises 100 bytes; only 2 arrive.
        stream.write_all(&100u32.to_be_bytes()).unwrap();
        stream.write_all(b"{}").unwrap();
        drop(stream);
        sender.delete_all()
    });
    assert_eq!(listener.serve_one().await.unwrap(), Exchange::PeerClosed);
    assert_eq!(listener.serve_one().await.unwrap(), Exchange::Responded);
    assert_eq!(client.join().unwrap().unwrap(), None);
}

#[tokio::test]
async fn render_writes_under_project_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let sender = sender_for(&listener);

    let client = thread::spawn(move || sender.render_scene("//frames/0001.png"));
    listener.serve_one().await.unwrap();

    let expected = dir.path().join("frames/0001.png");
    assert_eq!(
        client.join().unwrap().unwrap(),
        Some(Value::Text(expected.display().to_string()))
    );
    assert!(expected.is_file());
}

#[tokio::test]
async fn text_blocks_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let sender = sender_for(&listener);

    let client = thread::spawn(move || {
        let name = sender.create_text_block(
            "scene.create_sphere(0, 0, 0); return scene.count()",
            Some("ball.lua"),
            false,
        )?;
        let ran = sender.execute_text_block("ball.lua")?;
        Ok::<_, Error>((name, ran))
    });
    listener.serve_one().await.unwrap();
    assert!(listener.scene().text("ball.lua").is_some());
    assert_eq!(listener.scene().object_count(), 0);
    listener.serve_one().await.unwrap();

    let (name, ran) = client.join().unwrap().unwrap();
    assert_eq!(name, Some(Value::from("ball.lua")));
    assert_eq!(ran, Some(Value::Number(1.0)));
}

#[tokio::test]
async fn run_until_stops_between_connections() {
    let dir = tempfile::tempdir().unwrap();
    let mut listener = listener(dir.path()).await;
    let sender = sender_for(&listener);
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();

    let client = thread::spawn(move || {
        let result = sender.create_cube([0.0; 3], 2.0);
        let _ = done_tx.send(());
        result
    });
    listener
        .run_until(async {
            let _ = done_rx.await;
        })
        .await;

    assert!(client.join().unwrap().is_ok());
    assert_eq!(listener.scene().object_count(), 1);
}

#[test]
fn unreachable_listener_is_connection_error() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let err = Sender::new("127.0.0.1", port)
        .timeout(Duration::from_millis(500))
        .create_cube([0.0; 3], 1.0)
        .unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "{err:?}");
}

#[test]
fn wire_command_decodes_on_host_side() {
    let cmd = Command::new("create_cube")
        .param("location", [1.0, 0.0, 0.0])
        .param("size", 2.0)
        .issued("2025-01-01 00:00:00", "tests");
    let payload = scenelink_proto::to_payload(&cmd).unwrap();

    let registry = Registry::new(LuaEvaluator);
    let mut scene = MemoryScene::default();
    assert_eq!(
        registry.handle(&mut scene, &payload),
        Response::ok(Some(Value::from("Cube")))
    );
}

use cliprelay::adapters::local::{router, AppState, MemoryQueue};
use cliprelay::application::delivery::DeliveryService;
use cliprelay::application::registry::SourceRegistry;
use cliprelay::application::worker::WorkerActivity;
use cliprelay::domain::reassembly::ReassemblerLimits;
use cliprelay::ports::queue::JobQueuePort;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    registry: Arc<SourceRegistry>,
    queue: Arc<MemoryQueue>,
    shutdown: CancellationToken,
}

async fn serve(limits: ReassemblerLimits) -> Server {
    let shutdown = CancellationToken::new();
    let registry = Arc::new(SourceRegistry::new(&["cam-1".to_string()], 10));
    let queue = Arc::new(MemoryQueue::new(8, shutdown.clone()));
    let state = AppState {
        registry: registry.clone(),
        queue: queue.clone(),
        delivery: DeliveryService::new(
            registry.clone(),
            queue.clone(),
            Arc::new(WorkerActivity::default()),
            3,
        ),
        limits,
        enqueue_timeout: Duration::from_millis(100),
        content_type: String::from("video/mp4"),
        shutdown: shutdown.clone(),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let graceful = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, router(state))
            .with_graceful_shutdown(async move { graceful.cancelled().await })
            .await
            .unwrap();
    });

    Server {
        addr,
        registry,
        queue,
        shutdown,
    }
}

async fn connect(addr: SocketAddr, token: &str) -> Socket {
    let url = format!("ws://{}/ws/camera/{}", addr, token);
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next text or close frame, skipping control traffic.
async fn next_frame(socket: &mut Socket) -> Message {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(msg @ (Message::Text(_) | Message::Close(_)))) => return msg,
                Some(Ok(_)) => continue,
                other => panic!("connection ended unexpectedly: {:?}", other),
            }
        }
    })
    .await
    .unwrap()
}

fn close_code(msg: &Message) -> Option<u16> {
    match msg {
        Message::Close(Some(frame)) => Some(u16::from(frame.code)),
        _ => None,
    }
}

async fn wait_for_epoch(server: &Server, epoch: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(source) = server.registry.get("cam-1") {
                if source.epoch() >= epoch {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn upload_is_acked_and_queued() {
    let server = serve(ReassemblerLimits::default()).await;
    let mut socket = connect(server.addr, "cam-1").await;

    send_json(
        &mut socket,
        json!({"type": "clip-begin", "clipNumber": 1, "size": 150000, "duration": 10.0}),
    )
    .await;
    for (index, size) in [65536usize, 65536, 18928].into_iter().enumerate() {
        send_json(
            &mut socket,
            json!({"type": "chunk-header", "clipNumber": 1, "chunkIndex": index, "chunkSize": size}),
        )
        .await;
        socket.send(Message::Binary(vec![9u8; size])).await.unwrap();
    }
    send_json(
        &mut socket,
        json!({"type": "clip-complete", "clipNumber": 1, "totalChunks": 3}),
    )
    .await;

    let ack = match next_frame(&mut socket).await {
        Message::Text(text) => serde_json::from_str::<Value>(&text).unwrap(),
        other => panic!("expected ack, got {:?}", other),
    };
    assert_eq!(ack["type"], "clip-ack");
    assert_eq!(ack["clipNumber"], 1);
    assert_eq!(ack["accepted"], true);

    assert_eq!(server.queue.depth_for("cam-1"), 1);
    let clip = server.queue.dequeue_job().await.unwrap();
    assert_eq!(clip.payload.len(), 150000);

    server.shutdown.cancel();
}

#[tokio::test]
async fn newer_connection_supersedes_older() {
    let server = serve(ReassemblerLimits::default()).await;
    let mut first = connect(server.addr, "cam-1").await;
    wait_for_epoch(&server, 1).await;

    let _second = connect(server.addr, "cam-1").await;

    let frame = next_frame(&mut first).await;
    assert_eq!(close_code(&frame), Some(4000));
    wait_for_epoch(&server, 2).await;
    assert!(server.registry.get("cam-1").unwrap().is_live());

    server.shutdown.cancel();
}

#[tokio::test]
async fn unknown_token_is_closed() {
    let server = serve(ReassemblerLimits::default()).await;
    let mut socket = connect(server.addr, "ghost").await;

    let frame = next_frame(&mut socket).await;
    assert_eq!(close_code(&frame), Some(4404));
    assert!(server.registry.get("ghost").is_none());

    server.shutdown.cancel();
}

#[tokio::test]
async fn idle_assembly_is_swept() {
    let limits = ReassemblerLimits {
        timeout: Duration::from_millis(50),
        ..ReassemblerLimits::default()
    };
    let server = serve(limits).await;
    let mut socket = connect(server.addr, "cam-1").await;
    send_json(
        &mut socket,
        json!({"type": "clip-begin", "clipNumber": 1, "size": 10, "duration": 1.0}),
    )
    .await;

    // No further frames: only the periodic sweep can expire the clip.
    wait_for_epoch(&server, 1).await;
    let source = server.registry.get("cam-1").unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while source.counters.reassembly_failures.load(Ordering::Relaxed) < 1 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    server.shutdown.cancel();
}

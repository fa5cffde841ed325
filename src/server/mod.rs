//! WebSocket control server: one client drives task creation/cancellation
//! and receives every execution event as a state message.

pub mod message;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{debug, error, info, warn};
use webpilot_core_types::TaskId;
use webpilot_event_bus::{ChannelSink, EventSink};

use agent_core::{Event, TaskExecutionEngine, TaskManager};

use message::{
    CancelTask, CreateTask, CurrentTask, ErrorReport, MessageKind, TaskState, WsMessage,
};

pub struct ServerState {
    engine: Arc<TaskExecutionEngine>,
    tasks: Arc<TaskManager>,
    /// Only one controller connection is allowed.
    connected: AtomicBool,
}

/// Run the control server until the process is stopped.
pub async fn serve(
    host: &str,
    port: u16,
    engine: Arc<TaskExecutionEngine>,
    tasks: Arc<TaskManager>,
) -> Result<()> {
    // mirror every execution event into the task store
    engine
        .bus()
        .subscribe(Arc::clone(&tasks) as Arc<dyn EventSink<Event>>);

    let state = Arc::new(ServerState {
        engine,
        tasks,
        connected: AtomicBool::new(false),
    });
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    info!("control server listening on ws://{host}:{port}/ws");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}

async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> Response {
    if state
        .connected
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        warn!("rejecting connection: maximum connection limit reached");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(mut socket: WebSocket, state: Arc<ServerState>) {
    info!("controller connected");
    let (sink, mut events) = ChannelSink::new(256);
    let sink: Arc<dyn EventSink<Event>> = sink;
    state.engine.bus().subscribe(Arc::clone(&sink));

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsFrame::Text(text))) => {
                        if let Err(err) = handle_text(&mut socket, &state, &text).await {
                            warn!(error = %err, "failed to handle message");
                        }
                    }
                    Some(Ok(WsFrame::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket receive failed");
                        break;
                    }
                }
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                let message = WsMessage::new(
                    MessageKind::State,
                    serde_json::to_value(TaskState::from_event(&event)).ok(),
                );
                if send(&mut socket, &message).await.is_err() {
                    break;
                }
            }
        }
    }

    state.engine.bus().unsubscribe(&sink);
    state.connected.store(false, Ordering::SeqCst);
    info!("controller disconnected");
}

async fn handle_text(
    socket: &mut WebSocket,
    state: &Arc<ServerState>,
    text: &str,
) -> Result<()> {
    let message: WsMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(error = %err, "discarding undecodable message");
            return Ok(());
        }
    };

    match message.kind {
        MessageKind::Hb => {
            send(socket, &WsMessage::new(MessageKind::Ack, message.data)).await?;
        }
        MessageKind::Create => {
            let create: CreateTask =
                serde_json::from_value(message.data.unwrap_or_default())
                    .context("malformed create message")?;
            handle_create(socket, state, create).await?;
        }
        MessageKind::Cancel => {
            let cancel: CancelTask =
                serde_json::from_value(message.data.unwrap_or_default())
                    .context("malformed cancel message")?;
            handle_cancel(socket, state, cancel).await?;
        }
        MessageKind::GetTask => {
            let current = CurrentTask {
                task_id: state
                    .engine
                    .current_task()
                    .await
                    .map(|id| id.to_string()),
            };
            send(
                socket,
                &WsMessage::new(MessageKind::CurrentTask, serde_json::to_value(current).ok()),
            )
            .await?;
        }
        other => warn!(kind = ?other, "unexpected message kind"),
    }
    Ok(())
}

async fn handle_create(
    socket: &mut WebSocket,
    state: &Arc<ServerState>,
    create: CreateTask,
) -> Result<()> {
    let task_id = TaskId::new(create.task_id.clone());
    match state
        .tasks
        .create_task(task_id.clone(), &create.intent, create.args.clone())
        .await
    {
        Ok(_) => {
            let engine = Arc::clone(&state.engine);
            let tasks = Arc::clone(&state.tasks);
            tokio::spawn(async move {
                let result = engine
                    .run(&create.intent, task_id.clone(), create.tab_id.as_deref())
                    .await;
                if let Err(err) = result {
                    error!(%task_id, error = %err, "task run rejected");
                }
                // safety net: a rejected run leaves no terminal event for
                // the stored task, so flush whatever was recorded
                if let Err(err) = tasks.close_task().await {
                    warn!(error = %err, "failed to close task record");
                }
            });
        }
        Err(err) => {
            send_error(socket, &create.task_id, &err.to_string()).await?;
        }
    }
    Ok(())
}

async fn handle_cancel(
    socket: &mut WebSocket,
    state: &Arc<ServerState>,
    cancel: CancelTask,
) -> Result<()> {
    let requested = TaskId::new(cancel.task_id.clone());
    match state.engine.current_task().await {
        Some(current) if current == requested => {
            info!(task_id = %requested, "cancellation requested");
            state.engine.cancel().await;
        }
        current => {
            let running = current
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".to_string());
            send_error(
                socket,
                &cancel.task_id,
                &format!("task is not running (current: {running})"),
            )
            .await?;
        }
    }
    Ok(())
}

async fn send(socket: &mut WebSocket, message: &WsMessage) -> Result<()> {
    let json = serde_json::to_string(message).context("serializing message")?;
    socket
        .send(WsFrame::Text(json))
        .await
        .context("sending message")
}

async fn send_error(socket: &mut WebSocket, task_id: &str, message: &str) -> Result<()> {
    send(
        socket,
        &WsMessage::new(
            MessageKind::Error,
            serde_json::to_value(ErrorReport::new(task_id, message)).ok(),
        ),
    )
    .await
}

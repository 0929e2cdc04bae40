use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::ClientMessage,
    error::PollError,
    services::{connection_service, poll_events, poll_service},
    state::{ConnectionId, SharedState},
};

/// Handle the full lifecycle of a classroom client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let id: ConnectionId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let mut writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    state.gateway().attach(id, outbound_tx.clone());
    info!(connection = %id, "client connected");
    connection_service::sync_connection(&state, id).await;

    let mut writer_done = false;
    loop {
        tokio::select! {
            _ = &mut writer_task => {
                debug!(connection = %id, "writer task finished; closing connection");
                writer_done = true;
                break;
            }
            message = receiver.next() => {
                let Some(message) = message else {
                    break;
                };
                match message {
                    Ok(Message::Text(text)) => handle_text(&state, id, text.as_str()).await,
                    Ok(Message::Ping(payload)) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Close(frame)) => {
                        info!(connection = %id, "client closed");
                        let _ = outbound_tx.send(Message::Close(frame));
                        break;
                    }
                    Ok(Message::Binary(_)) => {}
                    Ok(Message::Pong(_)) => {}
                    Err(err) => {
                        warn!(connection = %id, error = %err, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    connection_service::disconnect(&state, id).await;
    info!(connection = %id, "client disconnected");

    if writer_done {
        drop(outbound_tx);
    } else {
        finalize(writer_task, outbound_tx).await;
    }
}

/// Parse and dispatch one text frame, reporting failures to the sender only.
pub async fn handle_text(state: &SharedState, id: ConnectionId, text: &str) {
    let result = match ClientMessage::from_json_str(text) {
        Ok(message) => dispatch(state, id, message).await,
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        debug!(connection = %id, error = %err, "rejected client message");
        poll_events::send_error(state, id, err.to_string());
    }
}

/// Route a parsed client message to the service implementing it.
pub async fn dispatch(
    state: &SharedState,
    id: ConnectionId,
    message: ClientMessage,
) -> Result<(), PollError> {
    match message {
        ClientMessage::Join(request) => connection_service::join(state, id, request).await,
        ClientMessage::CreatePoll(request) => poll_service::create_poll(state, request).await?,
        ClientMessage::SubmitAnswer(submission) => {
            poll_service::submit_answer(state, submission).await?;
        }
        ClientMessage::NextQuestion(request) => {
            poll_service::advance_to_next_question(state, request).await?
        }
        ClientMessage::EndPoll => poll_service::end_poll(state).await?,
        ClientMessage::PreparingNextQuestion => poll_service::prepare_next_question(state).await,
        ClientMessage::RequestPollHistory => {
            connection_service::send_poll_history(state, id).await
        }
        ClientMessage::RequestStudentList => {
            connection_service::send_student_list(state, id).await
        }
        ClientMessage::KickStudent(name) => {
            connection_service::kick_student(state, id, &name).await?
        }
        ClientMessage::ForceBroadcast => poll_service::force_broadcast(state, id).await,
        ClientMessage::RequestDebug => connection_service::send_debug_info(state, id).await,
    }
    Ok(())
}

/// Drop the sender and wait for the writer task to flush.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

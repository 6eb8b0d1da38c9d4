//! IPC client implementation

use std::collections::VecDeque;
use std::path::Path;
use tether_api::{Command, Event, Request, Response, ResponsePayload, ResponseResult, SessionSnapshot};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use crate::{IpcError, IpcResult};

/// One line from the daemon
enum Incoming {
    Response(Response),
    Event(Event),
}

fn parse_line(line: &str) -> IpcResult<Incoming> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("request_id").is_some() {
        Ok(Incoming::Response(serde_json::from_value(value)?))
    } else if value.get("payload").is_some() {
        Ok(Incoming::Event(serde_json::from_value(value)?))
    } else {
        Err(IpcError::InvalidMessage(format!(
            "neither a response nor an event: {}",
            line
        )))
    }
}

/// IPC client for tetherd
pub struct IpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
    /// Events that arrived while waiting for a response
    pending_events: VecDeque<Event>,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            next_request_id: 1,
            pending_events: VecDeque::new(),
        })
    }

    async fn read_incoming(&mut self) -> IpcResult<Incoming> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(IpcError::ConnectionClosed);
            }
            if !line.trim().is_empty() {
                return parse_line(line.trim());
            }
        }
    }

    /// Send a command and wait for its response
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let request = Request::new(request_id, command);
        let mut json = serde_json::to_string(&request)?;
        json.push('\n');

        self.writer.write_all(json.as_bytes()).await?;

        loop {
            match self.read_incoming().await? {
                Incoming::Response(response) => return Ok(response),
                Incoming::Event(event) => self.pending_events.push_back(event),
            }
        }
    }

    /// Send a command and unwrap a successful payload
    pub async fn call(&mut self, command: Command) -> IpcResult<ResponsePayload> {
        match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(e) => Err(IpcError::ServerError(format!(
                "{}: {}",
                e.code, e.message
            ))),
        }
    }

    /// Next pushed event. Only meaningful after subscribing.
    pub async fn next_event(&mut self) -> IpcResult<Event> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(event);
        }

        loop {
            match self.read_incoming().await? {
                Incoming::Event(event) => return Ok(event),
                Incoming::Response(response) => {
                    debug!(
                        request_id = response.request_id,
                        "Ignoring response while waiting for events"
                    );
                }
            }
        }
    }

    /// Subscribe to status pushes. Returns the state as of subscribing.
    pub async fn subscribe(&mut self) -> IpcResult<SessionSnapshot> {
        match self.call(Command::SubscribeStatus).await? {
            ResponsePayload::Subscribed { snapshot, .. } => Ok(snapshot),
            other => Err(IpcError::InvalidMessage(format!(
                "unexpected reply to subscribe: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_api::EventPayload;

    #[test]
    fn classifies_lines() {
        let response = serde_json::to_string(&Response::success(4, ResponsePayload::Pong)).unwrap();
        assert!(matches!(parse_line(&response), Ok(Incoming::Response(r)) if r.request_id == 4));

        let event = serde_json::to_string(&Event::new(EventPayload::Shutdown)).unwrap();
        assert!(matches!(parse_line(&event), Ok(Incoming::Event(_))));

        assert!(matches!(
            parse_line(r#"{"hello": 1}"#),
            Err(IpcError::InvalidMessage(_))
        ));
        assert!(matches!(parse_line("nope"), Err(IpcError::Json(_))));
    }
}

//! Host transports: where serialized puzzle messages go.

use crate::environment::{HostStateError, HostStateProvider};
use crate::message::{MessageError, PuzzleMessage};
use serde_json::{Value, json};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::Mutex;
use thiserror::Error;

pub const PUZZLE_TO_HOST_CAP: usize = 65_536;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no host transport available")]
    Unavailable,
    #[error("outbound queue full (cap={capacity})")]
    QueueFull { capacity: usize },
    #[error("host transport disconnected")]
    Disconnected,
    #[error("frame too large: {len} > {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Sink for serialized messages, conceptually the host's `postMessage`.
pub trait HostTransport: Send + Sync {
    fn post_message(&self, raw: &str) -> Result<(), TransportError>;
}

/// Stands in when no host is attached; every post reports `Unavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MissingTransport;

impl HostTransport for MissingTransport {
    fn post_message(&self, _raw: &str) -> Result<(), TransportError> {
        Err(TransportError::Unavailable)
    }
}

/// Queues messages for a writer thread (see [`writer_loop`]).
#[derive(Debug)]
pub struct ChannelTransport {
    tx: SyncSender<String>,
    capacity: usize,
    dropped: AtomicU64,
}

impl ChannelTransport {
    pub fn new(tx: SyncSender<String>, capacity: usize) -> Self {
        Self {
            tx,
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl HostTransport for ChannelTransport {
    fn post_message(&self, raw: &str) -> Result<(), TransportError> {
        if raw.len() > PUZZLE_TO_HOST_CAP {
            return Err(TransportError::FrameTooLarge {
                len: raw.len(),
                max: PUZZLE_TO_HOST_CAP,
            });
        }

        match self.tx.try_send(raw.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_raw)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped.is_power_of_two() {
                    tracing::warn!(
                        "puzzle outbound queue full (cap={}); dropped {dropped} message(s)",
                        self.capacity
                    );
                }
                Err(TransportError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_raw)) => Err(TransportError::Disconnected),
        }
    }
}

/// Drains queued messages into length-prefixed frames until every sender is gone.
pub fn writer_loop(rx: Receiver<String>, mut writer: impl Write) -> io::Result<()> {
    for raw in rx {
        if let Err(err) = write_frame(&mut writer, raw.as_bytes(), PUZZLE_TO_HOST_CAP) {
            if err.kind() != io::ErrorKind::InvalidData {
                return Err(err);
            }
            tracing::warn!("dropping outbound message: {err}");
            continue;
        }
        writer.flush()?;
    }

    Ok(())
}

/// Host side: reads one frame and decodes it. `Ok(None)` on a clean end of stream.
pub fn read_message(
    reader: &mut impl Read,
    max_payload: usize,
) -> Result<Option<PuzzleMessage>, TransportError> {
    let payload = match read_frame(reader, max_payload) {
        Ok(payload) => payload,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let raw = String::from_utf8(payload)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    PuzzleMessage::parse(&raw)
        .map(Some)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err).into())
}

pub fn read_frame(reader: &mut impl Read, max_payload: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0_u8; 4];
    reader.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} > {max_payload}"),
        ));
    }

    let mut payload = vec![0_u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_frame(writer: &mut impl Write, payload: &[u8], max_payload: usize) -> io::Result<()> {
    if payload.len() > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} > {}", payload.len(), max_payload),
        ));
    }

    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "payload exceeds u32"))?;

    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    Ok(())
}

/// Local stand-in for a real host, for running a puzzle outside one.
///
/// Mirrors `config` and `progress` into its own host state so that a second
/// session started from the same `DevHost` resumes where the first left off.
#[derive(Debug)]
pub struct DevHost {
    state: Mutex<Value>,
    posted: Mutex<Vec<PuzzleMessage>>,
}

impl DevHost {
    pub fn new(initial_state: Value) -> Self {
        Self {
            state: Mutex::new(initial_state),
            posted: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> Value {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or(Value::Null)
    }

    pub fn posted(&self) -> Vec<PuzzleMessage> {
        self.posted
            .lock()
            .map(|posted| posted.clone())
            .unwrap_or_default()
    }

    fn store(&self, key: &str, value: Value) -> Result<(), TransportError> {
        let mut state = self.state.lock().map_err(|_| TransportError::Disconnected)?;

        if !state.is_object() {
            *state = json!({});
        }
        if let Value::Object(map) = &mut *state {
            map.insert(key.to_string(), value);
        }

        Ok(())
    }
}

impl Default for DevHost {
    fn default() -> Self {
        Self::new(json!({ "preview": false, "config": {}, "data": {} }))
    }
}

impl HostTransport for DevHost {
    fn post_message(&self, raw: &str) -> Result<(), TransportError> {
        let message = PuzzleMessage::parse(raw).map_err(|err: MessageError| {
            TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, err))
        })?;

        match &message {
            PuzzleMessage::Config(data) => self.store("config", data.clone())?,
            PuzzleMessage::Progress(data) => self.store("data", data.clone())?,
            PuzzleMessage::Failure(_) => tracing::info!("Epic fail! Try again"),
            PuzzleMessage::Success(_) => tracing::info!("Nice job! You completed the puzzle!"),
        }

        self.posted
            .lock()
            .map_err(|_| TransportError::Disconnected)?
            .push(message);
        Ok(())
    }
}

impl HostStateProvider for DevHost {
    fn host_state(&self) -> Result<Option<Value>, HostStateError> {
        self.state
            .lock()
            .map(|state| Some(state.clone()))
            .map_err(|_| HostStateError::Unreadable("dev host state lock poisoned".to_string()))
    }
}

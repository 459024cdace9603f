//! Scripted transport doubles for reader and supervisor tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::application::ports::{FeedConnection, FeedConnector, Frame, RawMessage, TransportError};

/// One scripted read result.
#[derive(Debug, Clone)]
pub enum Step {
    Data(String),
    Heartbeat,
    Error,
    Close,
}

impl Step {
    pub fn data(text: &str) -> Self {
        Self::Data(text.to_string())
    }
}

/// Plays back `steps`, then blocks forever.
#[derive(Debug)]
pub struct ScriptedConnection {
    steps: VecDeque<Step>,
    closed: Arc<AtomicBool>,
}

impl ScriptedConnection {
    pub fn new(steps: Vec<Step>) -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                steps: steps.into(),
                closed: Arc::clone(&closed),
            },
            closed,
        )
    }
}

#[async_trait]
impl FeedConnection for ScriptedConnection {
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.steps.pop_front() {
            Some(Step::Data(text)) => Ok(Some(Frame::Data(RawMessage::from(text.as_str())))),
            Some(Step::Heartbeat) => Ok(Some(Frame::Heartbeat)),
            Some(Step::Error) => Err(TransportError::Read("connection reset by peer".into())),
            Some(Step::Close) => Ok(None),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Outcome of one scripted connect attempt.
#[derive(Debug, Clone)]
pub enum Attempt {
    Refuse,
    Fatal,
    Accept(Vec<Step>),
}

/// Plays back connect attempts, recording when each one happened.
/// Once the script is exhausted, connecting blocks forever.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    log: Arc<Mutex<Vec<Instant>>>,
    closed: Mutex<Vec<Arc<AtomicBool>>>,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            ..Self::default()
        }
    }

    pub fn attempt_log(&self) -> Arc<Mutex<Vec<Instant>>> {
        Arc::clone(&self.log)
    }

    pub fn all_closed(&self) -> bool {
        self.closed.lock().iter().all(|c| c.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl FeedConnector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn connect(&self) -> Result<Self::Connection, TransportError> {
        self.log.lock().push(Instant::now());
        let next = self.attempts.lock().pop_front();
        match next {
            Some(Attempt::Refuse) => Err(TransportError::Connect("connection refused".into())),
            Some(Attempt::Fatal) => Err(TransportError::InvalidTarget("bad url".into())),
            Some(Attempt::Accept(steps)) => {
                let (connection, closed) = ScriptedConnection::new(steps);
                self.closed.lock().push(closed);
                Ok(connection)
            }
            None => std::future::pending().await,
        }
    }
}

//! Network task instrumentation.
//!
//! `NetworkLogger` records each request as a task record plus a linked log message.
//! Registration lives in an injectable `InstrumentationContext` instead of process
//! globals: registering twice is a no-op reported as `AlreadyRegistered`, and
//! transports built from the context are instrumented only while a logger is
//! registered.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use uuid::Uuid;

use pulse_core::{LogEntry, LogLevel, NetworkTask, NewRecord, RecordBody, RecordId, TaskState};

use crate::error::StoreError;
use crate::store::RecordSink;

/// Label of log messages written for network tasks.
pub const NETWORK_LABEL: &str = "network";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub body_len: u64,
}

impl HttpRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_owned(),
            url: url.to_owned(),
            body_len: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Something that performs HTTP requests.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

pub struct NetworkLogger {
    sink: Arc<dyn RecordSink>,
    session: Uuid,
}

impl NetworkLogger {
    pub fn new(sink: Arc<dyn RecordSink>, session: Uuid) -> Self {
        Self { sink, session }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn task_started(&self, request: &HttpRequest) -> Result<RecordId, StoreError> {
        let mut task = NetworkTask::pending(&request.method, &request.url);
        task.request_bytes = request.body_len;
        self.sink.append(NewRecord::task(self.session, task))
    }

    pub fn task_completed(
        &self,
        id: RecordId,
        request: &HttpRequest,
        response: &HttpResponse,
        elapsed: Duration,
    ) -> Result<(), StoreError> {
        let mut task = NetworkTask::pending(&request.method, &request.url);
        task.request_bytes = request.body_len;
        task.response_bytes = response.body_len;
        task.status_code = Some(response.status);
        task.duration_ms = Some(millis(elapsed));
        task.state = if response.status >= 400 {
            TaskState::Failure
        } else {
            TaskState::Success
        };
        let level = if task.is_failure() {
            LogLevel::Error
        } else {
            LogLevel::Debug
        };
        let message = format!("{} {} {}", task.method, task.url, response.status);
        self.sink.replace(id, RecordBody::Task(task))?;
        self.log_for_task(id, level, &message)
    }

    pub fn task_failed(
        &self,
        id: RecordId,
        request: &HttpRequest,
        error: &TransportError,
        elapsed: Duration,
    ) -> Result<(), StoreError> {
        let mut task = NetworkTask::pending(&request.method, &request.url);
        task.request_bytes = request.body_len;
        task.duration_ms = Some(millis(elapsed));
        task.state = TaskState::Failure;
        task.error = Some(error.to_string());
        let message = format!("{} {} failed: {error}", task.method, task.url);
        self.sink.replace(id, RecordBody::Task(task))?;
        self.log_for_task(id, LogLevel::Error, &message)
    }

    fn log_for_task(&self, id: RecordId, level: LogLevel, message: &str) -> Result<(), StoreError> {
        let entry = LogEntry::new(level, NETWORK_LABEL, message).with_task(id);
        self.sink.append(NewRecord::log(self.session, entry)).map(|_| ())
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyRegistered,
}

/// Holds the registered logger and the "already registered" guard.
#[derive(Default)]
pub struct InstrumentationContext {
    logger: Mutex<Option<Arc<NetworkLogger>>>,
}

impl InstrumentationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `logger`. A second registration keeps the first logger.
    pub fn register(&self, logger: Arc<NetworkLogger>) -> Registration {
        let mut slot = self.lock();
        if slot.is_some() {
            tracing::debug!("network instrumentation already registered");
            return Registration::AlreadyRegistered;
        }
        tracing::info!(session = %logger.session(), "network instrumentation registered");
        *slot = Some(logger);
        Registration::Registered
    }

    /// Returns whether a logger was registered.
    pub fn unregister(&self) -> bool {
        self.lock().take().is_some()
    }

    pub fn is_registered(&self) -> bool {
        self.lock().is_some()
    }

    pub fn logger(&self) -> Option<Arc<NetworkLogger>> {
        self.lock().clone()
    }

    /// Wrap `transport`; requests are recorded only if a logger is registered now.
    pub fn instrument<T: Transport>(&self, transport: T) -> InstrumentedTransport<T> {
        InstrumentedTransport {
            inner: transport,
            logger: self.logger(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<NetworkLogger>>> {
        match self.logger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct InstrumentedTransport<T> {
    inner: T,
    logger: Option<Arc<NetworkLogger>>,
}

impl<T> InstrumentedTransport<T> {
    pub fn is_instrumented(&self) -> bool {
        self.logger.is_some()
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for InstrumentedTransport<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let Some(logger) = &self.logger else {
            return self.inner.send(request);
        };

        // Recording failures never fail the request itself.
        let task_id = match logger.task_started(request) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(error = %err, url = %request.url, "failed to record network task");
                None
            }
        };
        let started = Instant::now();
        let result = self.inner.send(request);
        let Some(task_id) = task_id else {
            return result;
        };

        let recorded = match &result {
            Ok(response) => logger.task_completed(task_id, request, response, started.elapsed()),
            Err(error) => logger.task_failed(task_id, request, error, started.elapsed()),
        };
        if let Err(err) = recorded {
            tracing::warn!(error = %err, task = %task_id, "failed to finish network task");
        }
        result
    }
}

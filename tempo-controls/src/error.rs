use snafu::prelude::*;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Cannot build a queue without items"))]
    InvalidQueue,
    #[snafu(display("Queue index {index} is out of range for {len} items"))]
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
    #[snafu(display("Snapshot is corrupt: {reason}"))]
    CorruptSnapshot {
        reason: String,
    },
    #[snafu(display("Snapshot references {missing} items that no longer resolve"))]
    StaleReference {
        missing: usize,
    },
    #[snafu(display("Listener {listener} failed: {message}"))]
    ListenerFailure {
        listener: String,
        message: String,
    },
    #[snafu(display("Unable to send command, coordinator has stopped"))]
    SendError,
    #[snafu(display("Unable to init mpris. Is address already taken?"))]
    MprisInitError,
    #[snafu(display("Unable to set mpris property: {property}"))]
    MprisPropertyError {
        property: String,
    },
    #[snafu(display("Unable to migrate database to latest version"))]
    DatabaseMigrationError,
    #[snafu(display("Unable to find database location"))]
    DatabaseLocationError,
    #[snafu(display("Database error: {source}"))]
    DatabaseError {
        #[snafu(source)]
        source: sqlx::Error,
    },
    #[snafu(display("Serialization error: {source}"))]
    SerializationError {
        #[snafu(source)]
        source: serde_json::Error,
    },
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(_value: sqlx::migrate::MigrateError) -> Self {
        Self::DatabaseMigrationError
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::SerializationError { source }
    }
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::DatabaseError { source }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::SendError
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::SendError
    }
}

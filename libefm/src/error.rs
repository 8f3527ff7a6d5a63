use std::path::PathBuf;
use thiserror::Error;

use super::acquisition_status::AcquisitionStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleParseError {
    #[error("Sample line was empty")]
    EmptyLine,
    #[error("Sample line contained a non-integer token {token:?} at position {position}")]
    BadToken { token: String, position: usize },
}

#[derive(Debug, Error)]
pub enum LogWriterError {
    #[error("CsvLogWriter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("CsvLogWriter could not format the UTC file timestamp: {0}")]
    TimeFormat(#[from] time::error::Format),
}

#[derive(Debug, Error)]
pub enum SerialReaderError {
    #[error("Failed to open serial port {port}: {source}")]
    PortOpen {
        port: String,
        source: serialport::Error,
    },
    #[error("Serial reader failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Broadcaster could not encode a round message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Broadcaster failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Broadcaster thread panicked")]
    ThreadPanic,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Acquisition failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Acquisition failed due to LogWriter error: {0}")]
    LogError(#[from] LogWriterError),
    #[error("Acquisition failed due to SerialReader error: {0}")]
    SerialError(#[from] SerialReaderError),
    #[error("Acquisition failed due to Broadcast error: {0}")]
    BroadcastError(#[from] BroadcastError),
    #[error("Acquisition failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<AcquisitionStatus>),
    #[error("Acquisition failed because the reader thread panicked")]
    ThreadPanic,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Could not open record because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Record failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Record {0:?} contained no usable rows")]
    Empty(PathBuf),
}

#[derive(Debug, Error)]
pub enum HDFReaderError {
    #[error("HDFReader failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("HDFReader found no 2D dataset in file {0:?}")]
    NoDataset(PathBuf),
    #[error("HDFReader was asked for column {column} but the dataset only has {width} columns")]
    BadColumn { column: usize, width: usize },
}

#[derive(Debug, Error)]
pub enum DayStackError {
    #[error("DayStack failed with IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("DayStack was given an invalid hour {0}")]
    BadHour(usize),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering failed in the drawing backend: {0}")]
    Backend(String),
    #[error("Rendering failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Rendering could not format a timestamp: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("Nothing to render: {0}")]
    NoData(String),
}

impl<E: std::error::Error + Send + Sync> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for RenderError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        Self::Backend(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum HelicorderError {
    #[error("Helicorder was given an invalid date {0:?}; expected YYYYMMDD")]
    BadDate(String),
    #[error("No data found for date {0}. Cannot generate plot.")]
    NoDataForDay(String),
    #[error("Helicorder failed due to DayStack error: {0}")]
    DayStackError(#[from] DayStackError),
    #[error("Helicorder failed due to Render error: {0}")]
    RenderError(#[from] RenderError),
    #[error("Helicorder failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Helicorder could not format the date: {0}")]
    TimeFormat(#[from] time::error::Format),
}

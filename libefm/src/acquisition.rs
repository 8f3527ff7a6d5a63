use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use time::OffsetDateTime;

use super::acquisition_status::{AcquisitionCounters, AcquisitionStatus};
use super::broadcast::{BroadcastHub, WebsocketBroadcaster};
use super::config::AcquisitionConfig;
use super::error::{AcquisitionError, ConfigError, LogWriterError};
use super::log_writer::{default_log_name, Clock, CsvLogWriter};
use super::sample::parse_line;
use super::serial_reader::{open_port, LinePump};

/// Work out where the CSV log goes: the configured file, or a fresh UTC-stamped name
pub fn resolve_log_path(config: &AcquisitionConfig) -> Result<PathBuf, LogWriterError> {
    match &config.log_file {
        Some(path) => Ok(path.clone()),
        None => Ok(PathBuf::from(default_log_name(
            &config.log_prefix,
            OffsetDateTime::now_utc(),
        )?)),
    }
}

/// The main loop of the acquisition.
///
/// Pulls lines until the pump runs dry or is stopped. Every line that parses is logged
/// verbatim, offset-corrected, published to the websocket hub (if any) and reported on
/// `tx`. Lines that do not parse are reported and dropped; the next line is processed as
/// usual.
pub fn pump_into<R: BufRead, C: Clock>(
    pump: &mut LinePump<R>,
    writer: &mut CsvLogWriter<C>,
    mut hub: Option<&mut BroadcastHub>,
    value_offset: i64,
    tx: &Sender<AcquisitionStatus>,
) -> Result<AcquisitionCounters, AcquisitionError> {
    let mut counters = AcquisitionCounters::default();
    while let Some(line) = pump.next_line()? {
        let raw = line.trim();
        match parse_line(raw) {
            Ok(values) => {
                let sample = writer.append(raw, values)?;
                counters.logged += 1;
                let values = sample.centered(value_offset);
                let mut clients = 0;
                if let Some(hub) = hub.as_mut() {
                    clients = hub.publish(&values, Instant::now())?;
                    if clients > 0 {
                        counters.broadcast += 1;
                    }
                }
                tx.send(AcquisitionStatus::Round {
                    timestamp: sample.timestamp,
                    values,
                    clients,
                })?;
            }
            Err(e) => {
                log::warn!("Discarding serial line {raw:?}: {e}");
                counters.rejected += 1;
                tx.send(AcquisitionStatus::Rejected {
                    line: raw.to_string(),
                    reason: e.to_string(),
                })?;
            }
        }
    }
    Ok(counters)
}

/// Body of the reader thread
fn run_reader(
    port_name: String,
    baudrate: u32,
    mut writer: CsvLogWriter,
    mut hub: Option<BroadcastHub>,
    value_offset: i64,
    stop: Arc<AtomicBool>,
    tx: Sender<AcquisitionStatus>,
) -> Result<AcquisitionCounters, AcquisitionError> {
    let port = match open_port(&port_name, baudrate) {
        Ok(port) => port,
        Err(e) => {
            // Not fatal: the caller decides whether to keep the rest of the pipeline up
            log::error!("{e}");
            writer.close()?;
            tx.send(AcquisitionStatus::PortFailed(e.to_string()))?;
            let counters = AcquisitionCounters::default();
            let _ = tx.send(AcquisitionStatus::Finished(counters));
            return Ok(counters);
        }
    };
    log::info!("Opened serial port {port_name} at {baudrate} baud");

    let mut pump = LinePump::new(BufReader::new(port), stop);
    let result = pump_into(&mut pump, &mut writer, hub.as_mut(), value_offset, &tx);
    writer.close()?;
    let counters = result?;
    log::info!(
        "Serial reader finished: {} rounds logged, {} lines rejected, {} rounds broadcast",
        counters.logged,
        counters.rejected,
        counters.broadcast
    );
    // The receiver may already be gone during shutdown
    let _ = tx.send(AcquisitionStatus::Finished(counters));
    Ok(counters)
}

/// A running acquisition: the serial reader thread plus the optional websocket server.
///
/// The parent for all live processing.
#[derive(Debug)]
pub struct Acquisition {
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<Result<AcquisitionCounters, AcquisitionError>>>,
    broadcaster: Option<WebsocketBroadcaster>,
}

impl Acquisition {
    /// Open the log, start the websocket server if asked to, and spawn the reader
    pub fn start(
        config: &AcquisitionConfig,
        tx: Sender<AcquisitionStatus>,
    ) -> Result<Self, AcquisitionError> {
        if !config.is_baudrate_valid() {
            return Err(ConfigError::InvalidValue(format!("baudrate {}", config.baudrate)).into());
        }
        // Settle the websocket settings before anything is created on disk
        let ws_settings = if config.websocket {
            Some((config.ws_address()?, config.ws_min_period()?))
        } else {
            None
        };
        let log_path = resolve_log_path(config)?;
        let writer = CsvLogWriter::open(&log_path)?;
        log::info!("Logging rounds to {}", log_path.display());

        let mut hub = None;
        let mut broadcaster = None;
        if let Some((addr, min_period)) = ws_settings {
            let new_hub = BroadcastHub::new(min_period);
            broadcaster = Some(WebsocketBroadcaster::spawn(addr, &new_hub)?);
            hub = Some(new_hub);
        }

        tx.send(AcquisitionStatus::Started { log_path })?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let port_name = config.port.clone();
        let baudrate = config.baudrate;
        let value_offset = config.value_offset;
        let reader = std::thread::spawn(move || {
            run_reader(
                port_name,
                baudrate,
                writer,
                hub,
                value_offset,
                thread_stop,
                tx,
            )
        });

        Ok(Self {
            stop,
            reader: Some(reader),
            broadcaster,
        })
    }

    /// True once the reader thread has exited (port failure, end of stream, error)
    pub fn is_finished(&self) -> bool {
        self.reader
            .as_ref()
            .map(|reader| reader.is_finished())
            .unwrap_or(true)
    }

    /// Stop reading, close the log and shut the websocket server down
    pub fn stop(mut self) -> Result<AcquisitionCounters, AcquisitionError> {
        self.stop.store(true, Ordering::Relaxed);
        let result = match self.reader.take() {
            Some(reader) => match reader.join() {
                Ok(result) => result,
                Err(_) => Err(AcquisitionError::ThreadPanic),
            },
            None => Ok(AcquisitionCounters::default()),
        };
        if let Some(broadcaster) = self.broadcaster.take() {
            broadcaster.stop()?;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    struct FixedClock(f64);

    impl Clock for FixedClock {
        fn now(&self) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_pump_logs_only_accepted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("efm.csv");
        let mut writer = CsvLogWriter::with_clock(&path, FixedClock(1000.0)).unwrap();
        let mut hub = BroadcastHub::new(Duration::ZERO);
        let mut client = hub.subscribe();
        let (tx, rx) = mpsc::channel();

        let data: &[u8] = b"255,300,210\r\ngarbage,1\n260,250\n";
        let mut pump = LinePump::new(data, Arc::new(AtomicBool::new(false)));
        let counters = pump_into(&mut pump, &mut writer, Some(&mut hub), 255, &tx).unwrap();
        writer.close().unwrap();

        assert_eq!(
            counters,
            AcquisitionCounters {
                logged: 2,
                rejected: 1,
                broadcast: 2
            }
        );
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "1000.000000,255,300,210\n1000.000000,260,250\n");

        let statuses: Vec<AcquisitionStatus> = rx.try_iter().collect();
        assert_eq!(statuses.len(), 3);
        assert_eq!(
            statuses[0],
            AcquisitionStatus::Round {
                timestamp: 1000.0,
                values: vec![0, 45, -45],
                clients: 1
            }
        );
        assert!(matches!(statuses[1], AcquisitionStatus::Rejected { .. }));
        assert_eq!(
            client.try_recv().unwrap(),
            r#"{"type":"round","data":[0,45,-45]}"#
        );
        assert_eq!(client.try_recv().unwrap(), r#"{"type":"round","data":[5,-5]}"#);
    }

    #[test]
    fn test_pump_without_hub() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvLogWriter::with_clock(&dir.path().join("a.csv"), FixedClock(5.0))
            .unwrap();
        let (tx, _rx) = mpsc::channel();
        let data: &[u8] = b"1,2,3\n";
        let mut pump = LinePump::new(data, Arc::new(AtomicBool::new(false)));
        let counters = pump_into(&mut pump, &mut writer, None, 0, &tx).unwrap();
        assert_eq!(counters.logged, 1);
        assert_eq!(counters.broadcast, 0);
    }

    #[test]
    fn test_port_failure_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let config = AcquisitionConfig {
            port: String::from("/dev/this-port-does-not-exist"),
            log_file: Some(dir.path().join("efm.csv")),
            ..Default::default()
        };
        let (tx, rx) = mpsc::channel();
        let acquisition = Acquisition::start(&config, tx).unwrap();
        let counters = acquisition.stop().unwrap();
        assert_eq!(counters.total(), 0);

        let statuses: Vec<AcquisitionStatus> = rx.try_iter().collect();
        assert!(matches!(statuses[0], AcquisitionStatus::Started { .. }));
        assert!(statuses
            .iter()
            .any(|s| matches!(s, AcquisitionStatus::PortFailed(_))));
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let (tx, _rx) = mpsc::channel();
        let config = AcquisitionConfig {
            baudrate: 0,
            ..Default::default()
        };
        assert!(matches!(
            Acquisition::start(&config, tx),
            Err(AcquisitionError::ConfigError(_))
        ));
    }

    #[test]
    fn test_pump_survives_extreme_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            CsvLogWriter::with_clock(&dir.path().join("a.csv"), FixedClock(1.0)).unwrap();
        let (tx, rx) = mpsc::channel();
        let data: &[u8] = b"-9223372036854775808,1\n300\n";
        let mut pump = LinePump::new(data, Arc::new(AtomicBool::new(false)));
        let counters = pump_into(&mut pump, &mut writer, None, 255, &tx).unwrap();
        assert_eq!(counters.logged, 2);

        let statuses: Vec<AcquisitionStatus> = rx.try_iter().collect();
        assert!(matches!(
            &statuses[0],
            AcquisitionStatus::Round { values, .. } if values == &vec![i64::MIN, -254]
        ));
        assert!(matches!(
            &statuses[1],
            AcquisitionStatus::Round { values, .. } if values == &vec![45]
        ));
    }

    #[test]
    fn test_bad_websocket_settings_are_refused_before_logging() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("efm.csv");
        let (tx, rx) = mpsc::channel();
        let config = AcquisitionConfig {
            log_file: Some(log_file.clone()),
            websocket: true,
            ws_host: String::from("127.0.0.1"),
            ws_port: 0,
            ws_min_period: f64::INFINITY,
            ..Default::default()
        };
        assert!(matches!(
            Acquisition::start(&config, tx),
            Err(AcquisitionError::ConfigError(ConfigError::InvalidValue(_)))
        ));
        assert!(!log_file.exists());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_resolve_log_path() {
        let mut config = AcquisitionConfig::default();
        let generated = resolve_log_path(&config).unwrap();
        let name = generated.to_string_lossy().to_string();
        assert!(name.starts_with("EFM_THUNDERMILL01log_"));
        assert!(name.ends_with("_UTC.csv"));

        config.log_file = Some(PathBuf::from("/tmp/fixed.csv"));
        assert_eq!(resolve_log_path(&config).unwrap(), PathBuf::from("/tmp/fixed.csv"));
    }
}

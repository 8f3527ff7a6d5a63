//! # efm_plotter
//!
//! Part of the libefm crate family.
//!
//! This is the live electric field mill display, using [egui](https://github.com/emilk/egui).
//!
//! ## Install
//!
//! Use `cargo install --path ./efm_plotter`
//!
//! ## Use
//!
//! To launch the application simply invoke it after it is installed, optionally with a
//! configuration file to start from
//!
//! ```bash
//! efm_plotter [config.yml]
//! ```
//!
//! Fill out the configuration fields and click Start. Each round the mill reports is drawn
//! in gold on top of the previous rounds (grey) and their average (cyan). The dashed
//! markers show the two samples used for the Δ readout.
//!
//! ## Configuration
//!
//! The following configuration controls are available in the GUI:
//!
//! - Serial port: Path of the serial device, e.g. `/dev/ttyUSB0` or `COM3`
//! - Baud rate: Serial speed, 9600 for the stock firmware
//! - Log file: A fixed CSV file to append to. Default creates a new timestamped file per run
//! - Log prefix: Prefix of the generated log file names
//! - Value offset: Subtracted from every value before plotting and broadcasting
//! - Websocket broadcast: Re-publish every round to websocket clients
//!   - Websocket host/port: Address to listen on
//!   - Min period: Minimum time between two broadcast messages, in seconds
//! - History: Number of past rounds kept on the plot
//! - Calibrated units: Plot rotor phase (°) against the electric field (kV/m)
//!   - Zero field value/kV/m per unit: Conversion from the raw values
//!   - Field range: Fixed vertical range in kV/m
//! - Y range: Fixed vertical range of the plot in raw units
//!
//! Configurations can be saved using File->Save and loaded using File->Open. A configuration
//! saved from the GUI can be used with `efm_cli acquire --config` and vice-versa.

mod app;
use app::EfmApp;
use libefm::config::AcquisitionConfig;
use simplelog::{Config, LevelFilter, WriteLogger};
use std::fs::File;
use std::path::PathBuf;

/// The program entry point
fn main() {
    // Setup logging to a file
    match File::create("./efm_plotter.log") {
        Ok(log_file) => {
            if let Err(e) = WriteLogger::init(LevelFilter::Info, Config::default(), log_file) {
                eprintln!("Could not initialise logging: {e}");
            }
        }
        Err(e) => eprintln!("Could not create log file efm_plotter.log: {e}"),
    }
    log::info!("Starting EFM plotter UI");

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => match AcquisitionConfig::read_config_file(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("{e}");
                AcquisitionConfig::default()
            }
        },
        None => AcquisitionConfig::default(),
    };

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("EFM Plotter")
            .with_inner_size(eframe::epaint::vec2(1100.0, 600.0))
            .with_min_inner_size(eframe::epaint::vec2(800.0, 400.0)),
        ..Default::default()
    };
    match eframe::run_native(
        "efm_plotter",
        native_options,
        Box::new(|cc| Ok(Box::new(EfmApp::new(cc, config)))),
    ) {
        Ok(()) => (),
        Err(e) => log::error!("Eframe error: {}", e),
    }
}

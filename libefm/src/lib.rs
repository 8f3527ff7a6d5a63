//! # libefm
//!
//! libefm is the library behind the THUNDERMILL electric field mill (EFM) tools, written in
//! Rust. It reads the comma-separated waveform lines the mill firmware prints on its serial
//! port, appends them to a CSV log, re-broadcasts them to websocket clients and renders
//! offline charts from recorded data.
//!
//! Two front ends use it: `efm_plotter`, a desktop application with a live plot, and
//! `efm_cli`, a headless tool for acquisition and offline plotting.
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### HDF5
//!
//! The helicorder reads the hourly waveform files of the station, which are HDF5. HDF5 must
//! be installed before building. Typically this will be installed using a package manager
//! (homebrew, apt, etc), and the Rust libraries will auto detect the location of the HDF
//! install. If it lives somewhere unusual, write the following snippet into the file
//! `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Serial access
//!
//! On Linux the user running the acquisition needs read access to the serial device,
//! usually by being a member of the `dialout` group.
//!
//! ### Building & Install
//!
//! To build and install the GUI use `cargo install --path ./efm_plotter` and for the CLI
//! `cargo install --path ./efm_cli`, both from the top level of the repository.
//!
//! ## Acquisition
//!
//! The mill prints one line per rotor turn ("round"):
//!
//! ```text
//! 255,261,270,284,...\r\n
//! ```
//!
//! Every line that parses as a list of integers is appended to the log as
//! `<unix timestamp>,<line as received>`. Lines that do not parse are reported and dropped;
//! the stream carries on with the next line. The log is opened in append mode and flushed
//! after each line, so an interrupted acquisition loses at most the line in flight.
//!
//! When the websocket is enabled, each accepted round is also sent to every connected
//! client as
//!
//! ```json
//! {"type": "round", "data": [0, 6, 15, 29]}
//! ```
//!
//! with the configured `value_offset` subtracted from every value. At most one message per
//! `ws_min_period` seconds is sent; rounds in between are skipped.
//!
//! ## Configuration
//!
//! Acquisition settings are stored as YAML and can be shared between the GUI and the CLI:
//!
//! ```yml
//! port: /dev/ttyUSB0
//! baudrate: 9600
//! log_file: null
//! log_prefix: EFM_THUNDERMILL01
//! websocket: false
//! ws_host: 0.0.0.0
//! ws_port: 1234
//! ws_min_period: 0.25
//! value_offset: 0
//! y_range: [-10.0, 65546.0]
//! history: 30
//! calibrated: false
//! field_midpoint: 256.0
//! field_scale: 0.13636363636363635
//! field_y_range: [-40.0, 40.0]
//! ```
//!
//! If `log_file` is `null` a new file named `<log_prefix>log_<YYYYMMDD_HHMMSS>_UTC.csv` is
//! created in the working directory. Firmware that reports around a 255 midpoint should
//! use `value_offset: 255`. With `calibrated: true` the live plot shows rotor phase in
//! degrees against `(value - field_midpoint) * field_scale` in kV/m.
//!
//! ## Helicorder
//!
//! Hourly waveform files are expected at
//!
//! ```text
//! <input>/YYYY/MM/DD/<station>_<YYYYMMDD>_<HH>*.h5
//! ```
//!
//! Each file holds a 2D dataset (preferably named `waveform`) of samples by channels. The
//! EFI trace is the difference of two channels (13 and 33 by default). The day is drawn as
//! 24 stacked traces, hour 0 at the top, and written to
//! `<output>/YYYY_MM/<station>_EFI_HELICORDER_<YYYYMMDD>.<png|svg>`.
pub mod acquisition;
pub mod acquisition_status;
pub mod analysis;
pub mod broadcast;
pub mod config;
pub mod constants;
pub mod day_stack;
pub mod error;
pub mod hdf_reader;
pub mod helicorder;
pub mod log_writer;
pub mod plot;
pub mod record;
pub mod sample;
pub mod serial_reader;
pub mod throttle;

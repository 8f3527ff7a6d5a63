use std::path::{Path, PathBuf};
use std::sync::mpsc;

use eframe::egui::{Align2, Color32, DragValue, RichText};
use egui_plot::{Legend, Line, LineStyle, Plot, PlotBounds, PlotPoint, Text, VLine};
use rfd::FileDialog;

use libefm::acquisition::Acquisition;
use libefm::acquisition_status::{AcquisitionCounters, AcquisitionStatus};
use libefm::analysis::{LiveUnits, RoundHistory};
use libefm::config::AcquisitionConfig;

const HISTORY_COLOR: Color32 = Color32::from_rgba_premultiplied(60, 60, 60, 60);
const LATEST_COLOR: Color32 = Color32::GOLD;
const AVERAGE_COLOR: Color32 = Color32::from_rgb(0, 255, 255);
const MARKER_COLOR: Color32 = Color32::LIGHT_RED;

fn render_error_dialog(show: &mut bool, message: &str, ctx: &eframe::egui::Context) {
    eframe::egui::Window::new("Error")
        .open(show)
        .show(ctx, |ui| {
            if !message.is_empty() {
                ui.label(message);
            }
            ui.label(
                "There was an error! Check the log file efm_plotter.log for more information.",
            )
        });
}

fn runtime_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_default()
}

fn format_delta(delta: Option<i64>, units: LiveUnits) -> String {
    match (delta, units) {
        (None, _) => String::from("-"),
        (Some(d), LiveUnits::Raw) => d.to_string(),
        (Some(d), LiveUnits::Calibrated { kv_per_m, .. }) => {
            format!("{:.2} kV/m", d as f64 * kv_per_m)
        }
    }
}

/// The UI app which inherits the eframe::App trait.
///
/// The parent for the live acquisition.
#[derive(Debug)]
pub struct EfmApp {
    config: AcquisitionConfig,
    acquisition: Option<Acquisition>,
    history: RoundHistory,
    log_path: Option<PathBuf>,
    rounds_seen: u64,
    rejected_seen: u64,
    clients: usize,
    last_counters: Option<AcquisitionCounters>,
    show_error_window: bool,
    error_message: String,
    status_rx: mpsc::Receiver<AcquisitionStatus>,
    status_tx: mpsc::Sender<AcquisitionStatus>,
}

impl EfmApp {
    /// Create the application
    pub fn new(cc: &eframe::CreationContext<'_>, config: AcquisitionConfig) -> Self {
        let mut visuals = eframe::egui::Visuals::dark();
        visuals.override_text_color = Some(Color32::LIGHT_GRAY);
        cc.egui_ctx.set_visuals(visuals);
        cc.egui_ctx.set_theme(eframe::egui::Theme::Dark);
        let (tx, rx) = mpsc::channel::<AcquisitionStatus>();
        EfmApp {
            history: RoundHistory::new(config.history),
            config,
            acquisition: None,
            log_path: None,
            rounds_seen: 0,
            rejected_seen: 0,
            clients: 0,
            last_counters: None,
            show_error_window: false,
            error_message: String::new(),
            status_rx: rx,
            status_tx: tx,
        }
    }

    fn raise_error(&mut self, message: String) {
        log::error!("{message}");
        self.error_message = message;
        self.show_error_window = true;
    }

    /// Open the log and start reading the port
    fn start_acquisition(&mut self) {
        if self.acquisition.is_some() {
            return;
        }
        self.history = RoundHistory::new(self.config.history);
        self.rounds_seen = 0;
        self.rejected_seen = 0;
        self.clients = 0;
        self.last_counters = None;
        match Acquisition::start(&self.config, self.status_tx.clone()) {
            Ok(acquisition) => self.acquisition = Some(acquisition),
            Err(e) => self.raise_error(format!("Could not start acquisition: {e}")),
        }
    }

    /// Stop the acquisition and wait for it to wind down
    fn stop_acquisition(&mut self) {
        if let Some(acquisition) = self.acquisition.take() {
            match acquisition.stop() {
                Ok(counters) => {
                    log::info!(
                        "Acquisition stopped after {} rounds ({} rejected lines)",
                        counters.logged,
                        counters.rejected
                    );
                    self.last_counters = Some(counters);
                }
                Err(e) => self.raise_error(format!("Acquisition error: {e}")),
            }
        }
    }

    fn poll_messages(&mut self) {
        loop {
            match self.status_rx.try_recv() {
                Ok(status) => match status {
                    AcquisitionStatus::Started { log_path } => self.log_path = Some(log_path),
                    AcquisitionStatus::Round {
                        values, clients, ..
                    } => {
                        self.history.push(&values);
                        self.rounds_seen += 1;
                        self.clients = clients;
                    }
                    AcquisitionStatus::Rejected { .. } => self.rejected_seen += 1,
                    AcquisitionStatus::PortFailed(message) => self.raise_error(message),
                    AcquisitionStatus::Finished(counters) => self.last_counters = Some(counters),
                },
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    // The app owns a sender, so this only happens while tearing down
                    break;
                }
            }
        }
    }

    /// Write the current config to a file
    fn write_config(&mut self, path: &Path) {
        if let Err(e) = self.config.write_config_file(path) {
            self.raise_error(format!(
                "Could not write config to {}: {e}",
                path.display()
            ));
        }
    }

    /// Read the config from a file
    fn read_config(&mut self, path: &Path) {
        match AcquisitionConfig::read_config_file(path) {
            Ok(conf) => {
                self.history.set_capacity(conf.history);
                self.config = conf;
            }
            Err(e) => self.raise_error(format!("{e}")),
        }
    }

    fn config_grid(&mut self, ui: &mut eframe::egui::Ui) {
        eframe::egui::Grid::new("ConfigGrid").show(ui, |ui| {
            ui.label("Serial port");
            ui.text_edit_singleline(&mut self.config.port);
            ui.end_row();

            ui.label("Baud rate");
            ui.add(DragValue::new(&mut self.config.baudrate).speed(100));
            ui.end_row();

            let log_render_text = match &self.config.log_file {
                Some(p) => p.to_string_lossy().to_string(),
                None => String::from("New file per run"),
            };
            ui.label(format!("Log file: {log_render_text}"));
            ui.horizontal(|ui| {
                if ui.button("Open...").clicked() {
                    if let Some(path) = FileDialog::new()
                        .set_directory(runtime_dir())
                        .add_filter("CSV file", &["csv", "CSV", "txt"])
                        .save_file()
                    {
                        self.config.log_file = Some(path);
                    }
                }
                if ui.button("Default").clicked() {
                    self.config.log_file = None
                }
            });
            ui.end_row();

            ui.label("Log prefix");
            ui.text_edit_singleline(&mut self.config.log_prefix);
            ui.end_row();

            ui.label("Value offset");
            ui.add(DragValue::new(&mut self.config.value_offset).speed(1));
            ui.end_row();

            ui.checkbox(&mut self.config.websocket, "Websocket broadcast");
            ui.end_row();
            if self.config.websocket {
                ui.label("Websocket host");
                ui.text_edit_singleline(&mut self.config.ws_host);
                ui.end_row();

                ui.label("Websocket port");
                ui.add(DragValue::new(&mut self.config.ws_port).speed(1));
                ui.end_row();

                ui.label("Min period (s)");
                ui.add(
                    DragValue::new(&mut self.config.ws_min_period)
                        .speed(0.05)
                        .range(0.0..=60.0),
                );
                ui.end_row();
            }

            ui.label("History (rounds)");
            if ui
                .add(
                    DragValue::new(&mut self.config.history)
                        .speed(1)
                        .range(1..=1000),
                )
                .changed()
            {
                self.history.set_capacity(self.config.history);
            }
            ui.end_row();

            ui.checkbox(&mut self.config.calibrated, "Calibrated units (kV/m)");
            ui.end_row();
            if self.config.calibrated {
                ui.label("Zero field value");
                ui.add(DragValue::new(&mut self.config.field_midpoint).speed(1.0));
                ui.end_row();

                ui.label("kV/m per unit");
                ui.add(DragValue::new(&mut self.config.field_scale).speed(0.001));
                ui.end_row();

                ui.label("Field range (kV/m)");
                ui.horizontal(|ui| {
                    ui.add(DragValue::new(&mut self.config.field_y_range[0]).speed(1.0));
                    ui.add(DragValue::new(&mut self.config.field_y_range[1]).speed(1.0));
                });
                ui.end_row();
            } else {
                ui.label("Y range");
                ui.horizontal(|ui| {
                    ui.add(DragValue::new(&mut self.config.y_range[0]).speed(10.0));
                    ui.add(DragValue::new(&mut self.config.y_range[1]).speed(10.0));
                });
                ui.end_row();
            }
        });
    }

    fn live_plot(&self, ui: &mut eframe::egui::Ui) {
        let units = self.config.live_units();
        let [y_min, y_max] = self.config.plot_y_range();
        let (start, stop) = self.history.markers();
        let average = self.history.average();
        let latest = self.history.latest();
        let avg_delta = average.as_deref().and_then(|a| self.history.delta(a));
        let last_delta = latest.and_then(|l| self.history.delta(l));
        let round_len = latest.map_or(0, |l| l.len());
        let x_max = units.x(round_len.saturating_sub(1), round_len).max(1.0);
        let (x_label, y_label) = match units {
            LiveUnits::Raw => ("Sample", "Value"),
            LiveUnits::Calibrated { .. } => ("Rotor phase [°]", "Electric field [kV/m]"),
        };

        Plot::new("efm_live_plot")
            .legend(Legend::default())
            .x_axis_label(x_label)
            .y_axis_label(y_label)
            .allow_zoom(false)
            .allow_drag(false)
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                plot_ui.set_plot_bounds(PlotBounds::from_min_max([0.0, y_min], [x_max, y_max]));
                for round in self.history.earlier() {
                    plot_ui.line(Line::new(units.points(round)).color(HISTORY_COLOR));
                }
                if let Some(latest) = latest {
                    plot_ui.line(
                        Line::new(units.points(latest))
                            .color(LATEST_COLOR)
                            .width(2.0)
                            .name("Last round"),
                    );
                }
                if let Some(average) = &average {
                    plot_ui.line(
                        Line::new(units.points(average))
                            .color(AVERAGE_COLOR)
                            .width(2.0)
                            .name("Average"),
                    );
                }
                for marker in [start, stop] {
                    plot_ui.vline(
                        VLine::new(units.x(marker, round_len))
                            .color(MARKER_COLOR)
                            .style(LineStyle::dashed_loose()),
                    );
                }
                plot_ui.text(
                    Text::new(
                        PlotPoint::new(0.0, y_max),
                        format!(
                            "Avg Δ: {} / Last Δ: {}",
                            format_delta(avg_delta, units),
                            format_delta(last_delta, units)
                        ),
                    )
                    .color(Color32::WHITE)
                    .anchor(Align2::LEFT_TOP),
                );
            });
    }
}

impl eframe::App for EfmApp {
    fn update(&mut self, ctx: &eframe::egui::Context, _frame: &mut eframe::Frame) {
        self.poll_messages();
        // The reader exits on its own if the port fails or the device goes away
        if self
            .acquisition
            .as_ref()
            .is_some_and(|acquisition| acquisition.is_finished())
        {
            self.stop_acquisition();
        }
        render_error_dialog(&mut self.show_error_window, &self.error_message, ctx);

        eframe::egui::SidePanel::left("ConfigPanel")
            .resizable(true)
            .show(ctx, |ui| {
                //Menus
                ui.menu_button("File", |ui| {
                    if ui.button("Open...").clicked() {
                        if let Some(path) = FileDialog::new()
                            .set_directory(runtime_dir())
                            .add_filter("YAML file", &["yaml", "yml"])
                            .pick_file()
                        {
                            self.read_config(&path);
                        }
                    }
                    if ui.button("Save...").clicked() {
                        if let Some(path) = FileDialog::new()
                            .set_directory(runtime_dir())
                            .add_filter("YAML file", &["yaml", "yml"])
                            .save_file()
                        {
                            self.write_config(&path);
                        }
                    }
                });

                //Config
                ui.separator();
                ui.label(
                    RichText::new("Configuration")
                        .color(Color32::LIGHT_BLUE)
                        .size(18.0),
                );
                let idle = self.acquisition.is_none();
                ui.add_enabled_ui(idle, |ui| self.config_grid(ui));

                //Controls
                ui.separator();
                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(idle, eframe::egui::Button::new("Start"))
                        .clicked()
                    {
                        log::info!("Starting acquisition on {}...", self.config.port);
                        self.start_acquisition();
                    }
                    if ui
                        .add_enabled(!idle, eframe::egui::Button::new("Stop"))
                        .clicked()
                    {
                        self.stop_acquisition();
                    }
                });

                //Status
                ui.separator();
                ui.label(
                    RichText::new("Status")
                        .color(Color32::LIGHT_BLUE)
                        .size(18.0),
                );
                let state = if idle { "Idle" } else { "Running" };
                ui.label(format!("State: {state}"));
                if let Some(path) = &self.log_path {
                    ui.label(format!("Log: {}", path.display()));
                }
                ui.label(format!("Rounds: {}", self.rounds_seen));
                ui.label(format!("Rejected lines: {}", self.rejected_seen));
                if self.config.websocket {
                    ui.label(format!("Websocket clients: {}", self.clients));
                }
                if let Some(counters) = &self.last_counters {
                    ui.label(format!(
                        "Last run: {} logged, {} rejected, {} broadcast",
                        counters.logged, counters.rejected, counters.broadcast
                    ));
                }
            });

        eframe::egui::CentralPanel::default().show(ctx, |ui| {
            self.live_plot(ui);
        });

        ctx.request_repaint_after(std::time::Duration::from_millis(50));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Closing the window ends the acquisition
        self.stop_acquisition();
    }
}

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use libefm::acquisition::Acquisition;
use libefm::acquisition_status::{AcquisitionCounters, AcquisitionStatus};
use libefm::config::{AcquisitionConfig, HelicorderConfig, OutputFormat, Theme};
use libefm::constants::DEFAULT_FRAME_STEP;
use libefm::helicorder::run_helicorder;
use libefm::plot::{render_frames, render_record_plot};
use libefm::record::RecordLog;

const POLL_PERIOD: Duration = Duration::from_millis(200);

fn make_template_config(path: &Path) {
    match AcquisitionConfig::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

fn log_config<T: serde::Serialize>(config: &T) {
    match serde_yaml::to_string(config) {
        Ok(yaml) => {
            for line in yaml.lines() {
                log::info!("  {line}");
            }
        }
        Err(e) => log::warn!("Could not display config: {e}"),
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn cli() -> Command {
    Command::new("efm_cli")
        .about("Headless tools for the THUNDERMILL electric field mill")
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug output"),
        )
        .subcommand(
            Command::new("new")
                .about("Make a template acquisition configuration yaml file")
                .arg(
                    Arg::new("path")
                        .short('p')
                        .long("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to the file"),
                ),
        )
        .subcommand(
            Command::new("acquire")
                .about("Read the mill, log every round and optionally broadcast it")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Acquisition configuration yaml file"),
                )
                .arg(Arg::new("port").long("port").help("Serial port"))
                .arg(
                    Arg::new("baudrate")
                        .long("baudrate")
                        .value_parser(value_parser!(u32))
                        .help("Baud rate"),
                )
                .arg(
                    Arg::new("log-file")
                        .long("log-file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Append to this CSV file instead of creating a new one"),
                )
                .arg(
                    Arg::new("log-prefix")
                        .long("log-prefix")
                        .help("Prefix of the generated log file name"),
                )
                .arg(
                    Arg::new("websocket")
                        .long("websocket")
                        .action(ArgAction::SetTrue)
                        .help("Broadcast rounds over a websocket"),
                )
                .arg(Arg::new("ws-host").long("ws-host").help("Websocket host"))
                .arg(
                    Arg::new("ws-port")
                        .long("ws-port")
                        .value_parser(value_parser!(u16))
                        .help("Websocket port"),
                )
                .arg(
                    Arg::new("ws-min-period")
                        .long("ws-min-period")
                        .value_parser(value_parser!(f64))
                        .help("Minimum seconds between websocket messages"),
                )
                .arg(
                    Arg::new("offset")
                        .long("offset")
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(i64))
                        .help("Value subtracted from every sample before broadcasting"),
                ),
        )
        .subcommand(
            Command::new("helicorder")
                .about("Render a daily EFI helicorder from hourly HDF5 files")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Helicorder configuration yaml file"),
                )
                .arg(
                    Arg::new("input")
                        .long("input")
                        .value_parser(value_parser!(PathBuf))
                        .help("Root directory containing waveform data"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_parser(value_parser!(PathBuf))
                        .help("Root directory for output files"),
                )
                .arg(
                    Arg::new("date")
                        .long("date")
                        .help("Date to plot in YYYYMMDD format (default: today, or yesterday before 02:00 UTC)"),
                )
                .arg(Arg::new("observatory").long("observatory").help("Name of the observatory"))
                .arg(Arg::new("station").long("station").help("Station prefix"))
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_parser(["png", "svg"])
                        .help("Output format"),
                )
                .arg(
                    Arg::new("theme")
                        .long("theme")
                        .value_parser(["light", "dark"])
                        .help("Plot theme"),
                )
                .arg(
                    Arg::new("calibration")
                        .long("calibration")
                        .value_parser(value_parser!(f64))
                        .help("Calibration coefficient, ADU per kV/m"),
                ),
        )
        .subcommand(
            Command::new("record")
                .about("Plot a recorded CSV log")
                .arg(
                    Arg::new("log")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("CSV log written by the acquisition"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("PNG file to write"),
                )
                .arg(
                    Arg::new("station")
                        .long("station")
                        .default_value("THUNDERMILL01")
                        .help("Station name used in the title"),
                ),
        )
        .subcommand(
            Command::new("frames")
                .about("Render animation frames from a recorded CSV log")
                .arg(
                    Arg::new("log")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("CSV log written by the acquisition"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory for the frames"),
                )
                .arg(
                    Arg::new("step")
                        .long("step")
                        .value_parser(value_parser!(usize))
                        .help("Render every n-th row"),
                ),
        )
}

fn acquisition_config(args: &ArgMatches) -> Option<AcquisitionConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => {
            log::info!("Loading config from {}...", path.display());
            match AcquisitionConfig::read_config_file(path) {
                Ok(c) => c,
                Err(e) => {
                    log::error!("{e}");
                    return None;
                }
            }
        }
        None => AcquisitionConfig::default(),
    };
    if let Some(port) = args.get_one::<String>("port") {
        config.port = port.clone();
    }
    if let Some(baudrate) = args.get_one::<u32>("baudrate") {
        config.baudrate = *baudrate;
    }
    if let Some(log_file) = args.get_one::<PathBuf>("log-file") {
        config.log_file = Some(log_file.clone());
    }
    if let Some(prefix) = args.get_one::<String>("log-prefix") {
        config.log_prefix = prefix.clone();
    }
    if args.get_flag("websocket") {
        config.websocket = true;
    }
    if let Some(host) = args.get_one::<String>("ws-host") {
        config.ws_host = host.clone();
    }
    if let Some(port) = args.get_one::<u16>("ws-port") {
        config.ws_port = *port;
    }
    if let Some(period) = args.get_one::<f64>("ws-min-period") {
        config.ws_min_period = *period;
    }
    if let Some(offset) = args.get_one::<i64>("offset") {
        config.value_offset = *offset;
    }
    Some(config)
}

fn acquire(args: &ArgMatches, pb_manager: &MultiProgress) {
    let Some(config) = acquisition_config(args) else {
        return;
    };
    log::info!("Acquisition settings:");
    log_config(&config);

    let (tx, rx) = mpsc::channel::<AcquisitionStatus>();
    let acquisition = match Acquisition::start(&config, tx) {
        Ok(a) => a,
        Err(e) => {
            log::error!("Could not start acquisition: {e}");
            return;
        }
    };

    let spinner = pb_manager.add(ProgressBar::new_spinner());
    spinner.set_style(bar_style("{spinner} [{elapsed_precise}] {msg}"));
    let mut seen = AcquisitionCounters::default();
    let mut clients = 0;

    // Runs until the reader gives up or the process is interrupted; every line is already
    // flushed to the log when it arrives
    loop {
        std::thread::sleep(POLL_PERIOD);
        for status in rx.try_iter() {
            match status {
                AcquisitionStatus::Started { log_path } => {
                    log::info!("Writing to {}", log_path.display())
                }
                AcquisitionStatus::Round {
                    clients: c, ..
                } => {
                    seen.logged += 1;
                    clients = c;
                    if c > 0 {
                        seen.broadcast += 1;
                    }
                }
                AcquisitionStatus::Rejected { .. } => seen.rejected += 1,
                AcquisitionStatus::PortFailed(message) => log::error!("{message}"),
                AcquisitionStatus::Finished(counters) => seen = counters,
            }
        }
        spinner.set_message(format!(
            "{} rounds logged, {} rejected, {} broadcast ({} clients)",
            seen.logged, seen.rejected, seen.broadcast, clients
        ));
        spinner.tick();

        if acquisition.is_finished() {
            break;
        }
    }
    spinner.finish();

    match acquisition.stop() {
        Ok(counters) => log::info!(
            "Acquisition finished: {} rounds logged, {} lines rejected.",
            counters.logged,
            counters.rejected
        ),
        Err(e) => log::error!("Acquisition failed with error: {e}"),
    }
}

fn helicorder_config(args: &ArgMatches) -> Option<HelicorderConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => match HelicorderConfig::read_config_file(path) {
            Ok(c) => c,
            Err(e) => {
                log::error!("{e}");
                return None;
            }
        },
        None => HelicorderConfig::default(),
    };
    if let Some(input) = args.get_one::<PathBuf>("input") {
        config.input = input.clone();
    }
    if let Some(output) = args.get_one::<PathBuf>("output") {
        config.output = output.clone();
    }
    if let Some(date) = args.get_one::<String>("date") {
        config.date = Some(date.clone());
    }
    if let Some(observatory) = args.get_one::<String>("observatory") {
        config.observatory = observatory.clone();
    }
    if let Some(station) = args.get_one::<String>("station") {
        config.station = station.clone();
    }
    if let Some(format) = args.get_one::<String>("format") {
        match format.parse::<OutputFormat>() {
            Ok(f) => config.format = f,
            Err(e) => {
                log::error!("{e}");
                return None;
            }
        }
    }
    if let Some(theme) = args.get_one::<String>("theme") {
        match theme.parse::<Theme>() {
            Ok(t) => config.theme = t,
            Err(e) => {
                log::error!("{e}");
                return None;
            }
        }
    }
    if let Some(calibration) = args.get_one::<f64>("calibration") {
        config.calibration = *calibration;
    }
    if !config.input.is_dir() {
        log::error!(
            "Input directory {} does not exist; pass --input or set it in the config",
            config.input.display()
        );
        return None;
    }
    Some(config)
}

fn helicorder(args: &ArgMatches, pb_manager: &MultiProgress) {
    let Some(config) = helicorder_config(args) else {
        return;
    };
    log::info!("=== EFI Helicorder Plot Generator ===");
    log::debug!("Helicorder settings:");
    if log::log_enabled!(log::Level::Debug) {
        log_config(&config);
    }

    let pb = pb_manager.add(ProgressBar::new(24));
    pb.set_style(bar_style("Loading hours {bar:40.cyan/blue} {pos}/{len}"));
    let result = run_helicorder(&config, |hours| pb.set_position(hours as u64));
    pb.finish();

    match result {
        Ok(path) => log::info!("Done. Helicorder written to {}", path.display()),
        Err(e) => log::error!("{e}"),
    }
}

fn record(args: &ArgMatches) {
    let (Some(log_path), Some(output)) = (
        args.get_one::<PathBuf>("log"),
        args.get_one::<PathBuf>("output"),
    ) else {
        return;
    };
    let station = args
        .get_one::<String>("station")
        .cloned()
        .unwrap_or_default();

    let record = match RecordLog::read(log_path) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    match render_record_plot(&record, &station, output) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Plotting failed with error: {e}"),
    }
}

fn frames(args: &ArgMatches, pb_manager: &MultiProgress) {
    let (Some(log_path), Some(output)) = (
        args.get_one::<PathBuf>("log"),
        args.get_one::<PathBuf>("output"),
    ) else {
        return;
    };
    let step = args
        .get_one::<usize>("step")
        .copied()
        .unwrap_or(DEFAULT_FRAME_STEP);

    let record = match RecordLog::read(log_path) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };

    let pb = pb_manager.add(ProgressBar::new(0));
    pb.set_style(bar_style("Rendering {bar:40.green/white} {pos}/{len} frames"));
    let result = render_frames(&record, output, step, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    });
    pb.finish();

    match result {
        Ok(written) => log::info!("Done. Wrote {} frames.", written.len()),
        Err(e) => log::error!("Rendering failed with error: {e}"),
    }
}

fn main() {
    // Create a cli
    let matches = cli().get_matches();

    // Initialize feedback
    let level = if matches.get_flag("verbose") {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    let logger = simplelog::TermLogger::new(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    log::set_max_level(level);

    match matches.subcommand() {
        Some(("new", args)) => {
            if let Some(path) = args.get_one::<PathBuf>("path") {
                log::info!("Making a template config at {}...", path.display());
                make_template_config(path);
            }
        }
        Some(("acquire", args)) => acquire(args, &pb_manager),
        Some(("helicorder", args)) => helicorder(args, &pb_manager),
        Some(("record", args)) => record(args),
        Some(("frames", args)) => frames(args, &pb_manager),
        _ => (),
    }
}

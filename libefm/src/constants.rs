// Serial acquisition defaults
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUDRATE: u32 = 9600;
pub const DEFAULT_LOG_PREFIX: &str = "EFM_THUNDERMILL01";
pub const SERIAL_READ_TIMEOUT_MS: u64 = 200;

// Websocket fan-out defaults
pub const DEFAULT_WS_HOST: &str = "0.0.0.0";
pub const DEFAULT_WS_PORT: u16 = 1234;
pub const DEFAULT_WS_MIN_PERIOD_S: f64 = 0.25;
pub const WS_CHANNEL_CAPACITY: usize = 64;
pub const ROUND_MESSAGE_TYPE: &str = "round";

// Live plot
pub const DEFAULT_HISTORY: usize = 30;
pub const DEFAULT_Y_RANGE: [f64; 2] = [-10.0, 65546.0];
pub const DELTA_START_INDEX: usize = 11;
pub const DELTA_STOP_INDEX: usize = 29;
/// Raw value of a zero field
pub const DEFAULT_FIELD_MIDPOINT: f64 = 256.0;
/// kV/m per raw unit: 3/5.5 V divider, 2.5 kV/m per volt, 10 counts per volt
pub const DEFAULT_FIELD_SCALE: f64 = 3.0 / 5.5 * 2.5 / 10.0;
pub const DEFAULT_FIELD_Y_RANGE: [f64; 2] = [-40.0, 40.0];

/// Value used by the firmware to mark an empty slot; short CSV rows are padded with it
pub const SENTINEL_VALUE: f64 = 255.0;

// Record analysis
pub const SMOOTHING_WINDOW: usize = 20;
pub const STEEP_DROP_THRESHOLD: f64 = -10.0;
pub const ROTOR_HALF_TURN_DEG: f64 = 180.0;
pub const DEFAULT_FRAME_STEP: usize = 10;

// Helicorder
pub const HOURS_PER_DAY: usize = 24;
pub const MINUTES_PER_HOUR: f64 = 60.0;
pub const AMP_OFFSET: f64 = 15000.0;
pub const BOTTOM_MARGIN_FACTOR: f64 = 2.5;
pub const TOP_MARGIN_FACTOR: f64 = 2.2;
pub const SCALE_BAR_KV_PER_M: f64 = 10.0;
pub const SCALE_BAR_X: f64 = 62.0;
pub const DEFAULT_CALIBRATION: f64 = 1.0 / 1.4244 * 1000.0;
pub const DEFAULT_POSITIVE_CHANNEL: usize = 13;
pub const DEFAULT_NEGATIVE_CHANNEL: usize = 33;
pub const DEFAULT_OBSERVATORY: &str = "Musala";
pub const DEFAULT_STATION: &str = "THUNDERMILL01";
pub const WAVEFORM_DATASET: &str = "waveform";
/// Before this UTC hour the helicorder defaults to the previous day
pub const PREVIOUS_DAY_CUTOFF_HOUR: u8 = 2;
pub const HELICORDER_SIZE: (u32, u32) = (1680, 1200);
pub const RECORD_PLOT_SIZE: (u32, u32) = (1600, 900);

use crate::sensirion::Cmd;

// Basic commands
pub const START_PERIODIC_MEASUREMENT: Cmd = [0x21, 0xb1];
pub const READ_MEASUREMENT: Cmd = [0xec, 0x05];
pub const STOP_PERIODIC_MEASUREMENT: Cmd = [0x3f, 0x86];

// On-chip output signal compensation
pub const SET_TEMPERATURE_OFFSET: Cmd = [0x24, 0x1d];
pub const GET_TEMPERATURE_OFFSET: Cmd = [0x23, 0x18];
pub const SET_SENSOR_ALTITUDE: Cmd = [0x24, 0x27];
pub const GET_SENSOR_ALTITUDE: Cmd = [0x23, 0x22];

// Field calibration
pub const PERFORM_FORCED_RECALIBRATION: Cmd = [0x36, 0x2f];
pub const SET_AUTOMATIC_SELF_CALIBRATION_ENABLED: Cmd = [0x24, 0x16];
pub const GET_AUTOMATIC_SELF_CALIBRATION_ENABLED: Cmd = [0x23, 0x13];

// Low power periodic measurement mode
pub const START_LOW_POWER_PERIODIC_MEASUREMENT: Cmd = [0x21, 0xac];
pub const GET_DATA_READY_STATUS: Cmd = [0xe4, 0xb8];

// Advanced features
pub const PERSIST_SETTINGS: Cmd = [0x36, 0x15];
pub const GET_SERIAL_NUMBER: Cmd = [0x36, 0x82];
pub const PERFORM_SELF_TEST: Cmd = [0x36, 0x39];
/// Named perform_factory_reset in the datasheet.
pub const SOFT_RESET: Cmd = [0x36, 0x32];
pub const REINIT: Cmd = [0x36, 0x46];
pub const GET_SENSOR_VARIANT: Cmd = [0x20, 0x2f];

// Single shot measurement mode (SCD41 and SCD43)
pub const MEASURE_SINGLE_SHOT: Cmd = [0x21, 0x9d];
pub const MEASURE_SINGLE_SHOT_RHT_ONLY: Cmd = [0x21, 0x96];

/// Three words of two data bytes and one checksum byte each.
pub const READ_MEASUREMENT_LEN: usize = 9;

// Execution times in milliseconds, waited on top of the bus settle delay
pub const STOP_PERIODIC_MEASUREMENT_MS: u32 = 500;
pub const MEASURE_SINGLE_SHOT_MS: u32 = 5_000;
pub const MEASURE_SINGLE_SHOT_RHT_ONLY_MS: u32 = 50;
pub const SOFT_RESET_MS: u32 = 500;
pub const PERFORM_SELF_TEST_MS: u32 = 10_000;
pub const PERFORM_FORCED_RECALIBRATION_MS: u32 = 500;
pub const PERSIST_SETTINGS_MS: u32 = 800;
pub const REINIT_MS: u32 = 30;

/// Extra pause `initialize_sensor` takes after the soft reset has settled.
pub const INITIALIZE_RESET_PAUSE_MS: u32 = 500;

use core::fmt;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::sensirion::*;

pub mod asynchronous;
pub mod codec;
pub mod commands;

pub const ADDR: u8 = 0x62;

impl Default for Config {
    fn default() -> Self {
        Config::new(ADDR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variant {
    SCD40,
    SCD41,
    SCD43,
}

impl Variant {
    fn from_word<E>(word: u16) -> Result<Self, Error<E>> {
        match word >> 12 {
            0b0000 => Ok(Variant::SCD40),
            0b0001 => Ok(Variant::SCD41),
            0b0101 => Ok(Variant::SCD43),
            _ => Err(Error::InvalidResponse),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    pub co2_ppm: u16,
    pub temp_celsius: f32,
    pub humidity_percent: f32,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ppm CO2, {:.1}°C, {:.1}% RH",
            self.co2_ppm, self.temp_celsius, self.humidity_percent
        )
    }
}

/// The three serial number words, most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialNumber(pub [u16; 3]);

impl SerialNumber {
    pub fn words(&self) -> [u16; 3] {
        self.0
    }

    pub fn as_u64(&self) -> u64 {
        let [hi, mid, lo] = self.0;
        (hi as u64) << 32 | (mid as u64) << 16 | (lo as u64)
    }
}

impl From<SerialNumber> for u64 {
    fn from(serial: SerialNumber) -> u64 {
        serial.as_u64()
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [hi, mid, lo] = self.0;
        write!(f, "{:04x}-{:04x}-{:04x}", hi, mid, lo)
    }
}

/// What the driver last told the sensor to do.
///
/// Tracked for callers, not enforced: every command is sent whatever the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    #[default]
    Idle,
    PeriodicMeasurement,
    /// A single shot was triggered and its result has not been read yet.
    SingleShotPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SingleShot {
    /// CO2, temperature and humidity.
    Full,
    /// Temperature and humidity only; the CO2 word reads as zero.
    RhtOnly,
}

impl SingleShot {
    pub fn command(self) -> &'static Cmd {
        match self {
            SingleShot::Full => &commands::MEASURE_SINGLE_SHOT,
            SingleShot::RhtOnly => &commands::MEASURE_SINGLE_SHOT_RHT_ONLY,
        }
    }

    /// How long the sensor needs before the result can be read.
    pub fn duration_ms(self) -> u32 {
        match self {
            SingleShot::Full => commands::MEASURE_SINGLE_SHOT_MS,
            SingleShot::RhtOnly => commands::MEASURE_SINGLE_SHOT_RHT_ONLY_MS,
        }
    }
}

/// Outcome of [`SCD4x::initialize_sensor`]. A step that failed leaves its
/// field empty.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InitReport {
    pub serial_number: Option<SerialNumber>,
    pub self_test_passed: bool,
    pub temperature_offset: Option<f32>,
}

#[derive(Debug)]
pub struct SCD4x<I2C, D> {
    sensor: Sensor<I2C, D>,
    mode: Mode,
}

impl<I2C, D> SCD4x<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_config(i2c, delay, Config::default())
    }

    pub fn with_config(i2c: I2C, delay: D, config: Config) -> Self {
        Self {
            sensor: Sensor::new(i2c, delay, config),
            mode: Mode::Idle,
        }
    }

    pub fn config(&self) -> &Config {
        self.sensor.config()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Failed bus attempts since the last successful transfer, for health
    /// monitoring. Reset to zero by any successful command.
    pub fn consecutive_failures(&self) -> u32 {
        self.sensor.consecutive_failures()
    }

    /// Gives back the bus and the delay.
    pub fn release(self) -> (I2C, D) {
        self.sensor.release()
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            debug!("scd4x mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
        }
    }
}

impl<I2C: I2c, D: DelayNs> SCD4x<I2C, D> {
    /// Polls the sensor for whether data from a periodic or single shot measurement is ready to be read out.
    pub fn get_data_ready_status(&mut self) -> Result<bool, Error<I2C::Error>> {
        let status = self.sensor.read_word(&commands::GET_DATA_READY_STATUS)?;

        // From the datasheet, if the 11 LSB are 0, data is not ready.
        Ok((status & 0x7FF) != 0)
    }

    /// Reading out the serial number can be used to identify the chip and to verify the presence of the sensor.
    pub fn get_serial_number(&mut self) -> Result<SerialNumber, Error<I2C::Error>> {
        let words = self.sensor.read_three_words(&commands::GET_SERIAL_NUMBER)?;

        Ok(SerialNumber(words))
    }

    /// Starts the self-test without waiting for it.
    /// Its result can be read with [`Self::read_self_test_result`] 10s later.
    pub fn start_self_test(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(&commands::PERFORM_SELF_TEST)?;
        Ok(())
    }

    /// Returns true if no malfunction detected, false if failed.
    /// Result is available 10s after self-test is started.
    pub fn read_self_test_result(&mut self) -> Result<bool, Error<I2C::Error>> {
        let status = self.sensor.read_response_word()?;

        Ok(status == 0)
    }

    /// Runs the end-of-line self-test, blocking for 10s.
    /// Returns true if no malfunction detected, false if failed.
    pub fn perform_self_test(&mut self) -> Result<bool, Error<I2C::Error>> {
        let status = self
            .sensor
            .read_word_delayed(&commands::PERFORM_SELF_TEST, commands::PERFORM_SELF_TEST_MS)?;

        Ok(status == 0)
    }

    /// Reads out the SCD4x sensor variant
    pub fn get_sensor_variant(&mut self) -> Result<Variant, Error<I2C::Error>> {
        let status = self.sensor.read_word(&commands::GET_SENSOR_VARIANT)?;

        Variant::from_word(status)
    }

    /// Starts the periodic measurement mode. The signal update interval is 5 seconds.
    pub fn start_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .send_command(&commands::START_PERIODIC_MEASUREMENT)?;
        self.set_mode(Mode::PeriodicMeasurement);
        Ok(())
    }

    /// Starts the low power periodic measurement mode. The signal update
    /// interval is approximately 30 seconds.
    pub fn start_low_power_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .send_command(&commands::START_LOW_POWER_PERIODIC_MEASUREMENT)?;
        self.set_mode(Mode::PeriodicMeasurement);
        Ok(())
    }

    /// Command returns a sensor running in periodic measurement mode or low power
    /// periodic measurement mode back to the idle state, e.g. to then allow
    /// changing the sensor configuration or to save power.
    /// Blocks for the 500 ms the sensor needs before it responds to other commands.
    pub fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .send_command(&commands::STOP_PERIODIC_MEASUREMENT)?;
        self.sensor
            .wait_ms(commands::STOP_PERIODIC_MEASUREMENT_MS);
        self.set_mode(Mode::Idle);
        Ok(())
    }

    /// Triggers a single shot measurement and returns immediately. The
    /// result may be read once [`SingleShot::duration_ms`] has passed.
    pub fn trigger_single_shot(&mut self, kind: SingleShot) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(kind.command())?;
        self.set_mode(Mode::SingleShotPending);
        Ok(())
    }

    /// Triggers a full single shot measurement and blocks for 5 s until it is done.
    pub fn measure_single_shot(&mut self) -> Result<(), Error<I2C::Error>> {
        self.single_shot(SingleShot::Full)
    }

    /// Triggers a temperature and humidity single shot and blocks for 50 ms.
    pub fn measure_single_shot_rht_only(&mut self) -> Result<(), Error<I2C::Error>> {
        self.single_shot(SingleShot::RhtOnly)
    }

    fn single_shot(&mut self, kind: SingleShot) -> Result<(), Error<I2C::Error>> {
        self.trigger_single_shot(kind)?;
        self.sensor.wait_ms(kind.duration_ms());
        Ok(())
    }

    /// Reads the sensor output. The measurement data can only be read out once
    /// per signal update interval as the buffer is emptied upon read-out.
    /// If no data is available in the buffer, the sensor returns a NACK, so an
    /// error here is routine in periodic mode and means "no sample".
    pub fn read_measurement(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        let raw = self
            .sensor
            .read_raw::<{ commands::READ_MEASUREMENT_LEN }>(&commands::READ_MEASUREMENT)?;
        let measurement =
            codec::decode_measurement::<I2C::Error>(&raw, self.sensor.config().checksum)?;

        if self.mode == Mode::SingleShotPending {
            self.set_mode(Mode::Idle);
        }
        Ok(measurement)
    }

    /// Restores the factory configuration and returns the sensor to idle.
    /// Blocks for 500 ms.
    pub fn soft_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(&commands::SOFT_RESET)?;
        self.sensor.wait_ms(commands::SOFT_RESET_MS);
        self.set_mode(Mode::Idle);
        Ok(())
    }

    /// Reloads the user settings from EEPROM and returns the sensor to idle.
    pub fn reinit(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(&commands::REINIT)?;
        self.sensor.wait_ms(commands::REINIT_MS);
        self.set_mode(Mode::Idle);
        Ok(())
    }

    /// Stores the current configuration in EEPROM so it survives a power cycle.
    pub fn persist_settings(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(&commands::PERSIST_SETTINGS)?;
        self.sensor.wait_ms(commands::PERSIST_SETTINGS_MS);
        Ok(())
    }

    /// Sets the temperature offset in °C. Scaled by
    /// [`codec::TEMPERATURE_OFFSET_SCALE`].
    pub fn set_temperature_offset(&mut self, celsius: f32) -> Result<(), Error<I2C::Error>> {
        let raw = codec::encode_temperature_offset::<I2C::Error>(celsius)?;
        self.sensor
            .send_command_with_arg(&commands::SET_TEMPERATURE_OFFSET, raw)?;
        Ok(())
    }

    pub fn get_temperature_offset(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = self.sensor.read_word(&commands::GET_TEMPERATURE_OFFSET)?;

        Ok(codec::decode_temperature_offset(raw))
    }

    /// Sets the altitude above sea level in meters.
    pub fn set_altitude(&mut self, meters: u16) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .send_command_with_arg(&commands::SET_SENSOR_ALTITUDE, meters)?;
        Ok(())
    }

    pub fn get_altitude(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.sensor.read_word(&commands::GET_SENSOR_ALTITUDE)
    }

    /// Recalibrates against a known CO2 concentration and returns the
    /// correction word reported by the sensor, uninterpreted. Blocks for 500 ms.
    pub fn perform_forced_calibration(&mut self, target_ppm: u16) -> Result<u16, Error<I2C::Error>> {
        self.sensor.read_word_with_arg(
            &commands::PERFORM_FORCED_RECALIBRATION,
            target_ppm,
            commands::PERFORM_FORCED_RECALIBRATION_MS,
        )
    }

    pub fn set_automatic_self_calibration(&mut self, enabled: bool) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command_with_arg(
            &commands::SET_AUTOMATIC_SELF_CALIBRATION_ENABLED,
            codec::encode_self_calibration(enabled),
        )?;
        Ok(())
    }

    pub fn get_automatic_self_calibration(&mut self) -> Result<bool, Error<I2C::Error>> {
        let raw = self
            .sensor
            .read_word(&commands::GET_AUTOMATIC_SELF_CALIBRATION_ENABLED)?;

        Ok(codec::decode_self_calibration(raw))
    }

    /// Resets the sensor and runs its diagnostics: serial number, self-test
    /// and temperature offset. Progress is logged; a failing step does not
    /// stop the sequence.
    ///
    /// The soft reset stops any running measurement, so the tracked mode ends
    /// at [`Mode::Idle`]. Periodic measurement is not restarted.
    pub fn initialize_sensor(&mut self) -> InitReport {
        info!("initializing sensor");
        if self.soft_reset().is_err() {
            warn!("soft reset failed");
        }
        self.sensor.wait_ms(commands::INITIALIZE_RESET_PAUSE_MS);

        let serial_number = match self.get_serial_number() {
            Ok(serial) => {
                info!("sensor serial number: {}", serial.as_u64());
                Some(serial)
            }
            Err(_) => {
                warn!("failed to read sensor serial number");
                None
            }
        };

        let self_test_passed = matches!(self.perform_self_test(), Ok(true));
        if self_test_passed {
            info!("sensor self-test passed");
        } else {
            warn!("sensor self-test failed");
        }

        let temperature_offset = match self.get_temperature_offset() {
            Ok(offset) => {
                info!("temperature offset: {} degC", offset);
                Some(offset)
            }
            Err(_) => {
                warn!("failed to read temperature offset");
                None
            }
        };

        info!("initialization complete");
        InitReport {
            serial_number,
            self_test_passed,
            temperature_offset,
        }
    }
}

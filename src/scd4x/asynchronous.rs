//! The SCD4x session over `embedded-hal-async`.
//!
//! Long operations (the 10 s self-test, the 5 s single shot) await the delay
//! instead of blocking, so other tasks keep running meanwhile.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use super::{InitReport, Measurement, Mode, SerialNumber, SingleShot, Variant, codec, commands};
use crate::sensirion::{AsyncSensor, Config, Error};

#[derive(Debug)]
pub struct AsyncSCD4x<I2C, D> {
    sensor: AsyncSensor<I2C, D>,
    mode: Mode,
}

impl<I2C, D> AsyncSCD4x<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_config(i2c, delay, Config::default())
    }

    pub fn with_config(i2c: I2C, delay: D, config: Config) -> Self {
        Self {
            sensor: AsyncSensor::new(i2c, delay, config),
            mode: Mode::Idle,
        }
    }

    pub fn config(&self) -> &Config {
        self.sensor.config()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.sensor.consecutive_failures()
    }

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

impl<I2C: I2c, D: DelayNs> AsyncSCD4x<I2C, D> {
    pub async fn get_data_ready_status(&mut self) -> Result<bool, Error<I2C::Error>> {
        let status = self
            .sensor
            .read_word(&commands::GET_DATA_READY_STATUS)
            .await?;

        Ok((status & 0x7FF) != 0)
    }

    pub async fn get_serial_number(&mut self) -> Result<SerialNumber, Error<I2C::Error>> {
        let words = self
            .sensor
            .read_three_words(&commands::GET_SERIAL_NUMBER)
            .await?;

        Ok(SerialNumber(words))
    }

    pub async fn start_self_test(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(&commands::PERFORM_SELF_TEST).await
    }

    pub async fn read_self_test_result(&mut self) -> Result<bool, Error<I2C::Error>> {
        let status = self.sensor.read_response_word().await?;

        Ok(status == 0)
    }

    pub async fn perform_self_test(&mut self) -> Result<bool, Error<I2C::Error>> {
        let status = self
            .sensor
            .read_word_delayed(&commands::PERFORM_SELF_TEST, commands::PERFORM_SELF_TEST_MS)
            .await?;

        Ok(status == 0)
    }

    pub async fn get_sensor_variant(&mut self) -> Result<Variant, Error<I2C::Error>> {
        let status = self
            .sensor
            .read_word(&commands::GET_SENSOR_VARIANT)
            .await?;

        Variant::from_word(status)
    }

    pub async fn start_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .send_command(&commands::START_PERIODIC_MEASUREMENT)
            .await?;
        self.set_mode(Mode::PeriodicMeasurement);
        Ok(())
    }

    pub async fn start_low_power_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .send_command(&commands::START_LOW_POWER_PERIODIC_MEASUREMENT)
            .await?;
        self.set_mode(Mode::PeriodicMeasurement);
        Ok(())
    }

    pub async fn stop_periodic_measurement(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .send_command(&commands::STOP_PERIODIC_MEASUREMENT)
            .await?;
        self.sensor
            .wait_ms(commands::STOP_PERIODIC_MEASUREMENT_MS)
            .await;
        self.set_mode(Mode::Idle);
        Ok(())
    }

    pub async fn trigger_single_shot(&mut self, kind: SingleShot) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(kind.command()).await?;
        self.set_mode(Mode::SingleShotPending);
        Ok(())
    }

    pub async fn measure_single_shot(&mut self) -> Result<(), Error<I2C::Error>> {
        self.single_shot(SingleShot::Full).await
    }

    pub async fn measure_single_shot_rht_only(&mut self) -> Result<(), Error<I2C::Error>> {
        self.single_shot(SingleShot::RhtOnly).await
    }

    async fn single_shot(&mut self, kind: SingleShot) -> Result<(), Error<I2C::Error>> {
        self.trigger_single_shot(kind).await?;
        self.sensor.wait_ms(kind.duration_ms()).await;
        Ok(())
    }

    pub async fn read_measurement(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        let raw = self
            .sensor
            .read_raw::<{ commands::READ_MEASUREMENT_LEN }>(&commands::READ_MEASUREMENT)
            .await?;
        let measurement =
            codec::decode_measurement::<I2C::Error>(&raw, self.sensor.config().checksum)?;

        if self.mode == Mode::SingleShotPending {
            self.set_mode(Mode::Idle);
        }
        Ok(measurement)
    }

    pub async fn soft_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(&commands::SOFT_RESET).await?;
        self.sensor.wait_ms(commands::SOFT_RESET_MS).await;
        self.set_mode(Mode::Idle);
        Ok(())
    }

    pub async fn reinit(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(&commands::REINIT).await?;
        self.sensor.wait_ms(commands::REINIT_MS).await;
        self.set_mode(Mode::Idle);
        Ok(())
    }

    pub async fn persist_settings(&mut self) -> Result<(), Error<I2C::Error>> {
        self.sensor.send_command(&commands::PERSIST_SETTINGS).await?;
        self.sensor.wait_ms(commands::PERSIST_SETTINGS_MS).await;
        Ok(())
    }

    pub async fn set_temperature_offset(&mut self, celsius: f32) -> Result<(), Error<I2C::Error>> {
        let raw = codec::encode_temperature_offset::<I2C::Error>(celsius)?;
        self.sensor
            .send_command_with_arg(&commands::SET_TEMPERATURE_OFFSET, raw)
            .await
    }

    pub async fn get_temperature_offset(&mut self) -> Result<f32, Error<I2C::Error>> {
        let raw = self
            .sensor
            .read_word(&commands::GET_TEMPERATURE_OFFSET)
            .await?;

        Ok(codec::decode_temperature_offset(raw))
    }

    pub async fn set_altitude(&mut self, meters: u16) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .send_command_with_arg(&commands::SET_SENSOR_ALTITUDE, meters)
            .await
    }

    pub async fn get_altitude(&mut self) -> Result<u16, Error<I2C::Error>> {
        self.sensor.read_word(&commands::GET_SENSOR_ALTITUDE).await
    }

    pub async fn perform_forced_calibration(
        &mut self,
        target_ppm: u16,
    ) -> Result<u16, Error<I2C::Error>> {
        self.sensor
            .read_word_with_arg(
                &commands::PERFORM_FORCED_RECALIBRATION,
                target_ppm,
                commands::PERFORM_FORCED_RECALIBRATION_MS,
            )
            .await
    }

    pub async fn set_automatic_self_calibration(
        &mut self,
        enabled: bool,
    ) -> Result<(), Error<I2C::Error>> {
        self.sensor
            .send_command_with_arg(
                &commands::SET_AUTOMATIC_SELF_CALIBRATION_ENABLED,
                codec::encode_self_calibration(enabled),
            )
            .await
    }

    pub async fn get_automatic_self_calibration(&mut self) -> Result<bool, Error<I2C::Error>> {
        let raw = self
            .sensor
            .read_word(&commands::GET_AUTOMATIC_SELF_CALIBRATION_ENABLED)
            .await?;

        Ok(codec::decode_self_calibration(raw))
    }

    /// Same sequence as [`SCD4x::initialize_sensor`](super::SCD4x::initialize_sensor):
    /// the soft reset leaves the tracked mode at [`Mode::Idle`] and periodic
    /// measurement is not restarted.
    pub async fn initialize_sensor(&mut self) -> InitReport {
        info!("initializing sensor");
        if self.soft_reset().await.is_err() {
            warn!("soft reset failed");
        }
        self.sensor
            .wait_ms(commands::INITIALIZE_RESET_PAUSE_MS)
            .await;

        let serial_number = self.get_serial_number().await.ok();
        match serial_number {
            Some(serial) => info!("sensor serial number: {}", serial.as_u64()),
            None => warn!("failed to read sensor serial number"),
        }

        let self_test_passed = matches!(self.perform_self_test().await, Ok(true));
        if self_test_passed {
            info!("sensor self-test passed");
        } else {
            warn!("sensor self-test failed");
        }

        let temperature_offset = self.get_temperature_offset().await.ok();
        match temperature_offset {
            Some(offset) => info!("temperature offset: {} degC", offset),
            None => warn!("failed to read temperature offset"),
        }

        info!("initialization complete");
        InitReport {
            serial_number,
            self_test_passed,
            temperature_offset,
        }
    }
}

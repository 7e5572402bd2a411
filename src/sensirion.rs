use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use thiserror::Error;

pub type Cmd = [u8; 2];

#[derive(Clone, Copy, Hash, Debug, PartialEq, Eq, PartialOrd, Ord, Error)]
pub enum Error<I2cError> {
    #[error("invalid response")]
    InvalidResponse,
    #[error("invalid CRC")]
    InvalidCrc,
    #[error("value out of range")]
    OutOfRange,
    #[error(transparent)]
    I2c(#[from] I2cError),
}

impl<E> embedded_hal::i2c::Error for Error<E>
where
    E: embedded_hal::i2c::Error,
{
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        match self {
            Self::I2c(err) => err.kind(),
            _ => embedded_hal::i2c::ErrorKind::Other,
        }
    }
}

/// How bus faults are retried and how long the device is given between the
/// write and read phases of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first one. Zero behaves as one.
    pub max_attempts: u8,
    /// Fixed back-off after a failed attempt.
    pub retry_delay_ms: u32,
    /// Wait after every write, before the read phase or the next operation.
    pub settle_delay_ms: u32,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u8 = 5;
    pub const DEFAULT_RETRY_DELAY_MS: u32 = 100;
    pub const DEFAULT_SETTLE_DELAY_MS: u32 = 20;

    pub const DEFAULT: RetryPolicy = RetryPolicy {
        max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        retry_delay_ms: Self::DEFAULT_RETRY_DELAY_MS,
        settle_delay_ms: Self::DEFAULT_SETTLE_DELAY_MS,
    };

    /// A policy without any waiting, for simulated buses.
    pub const fn immediate(max_attempts: u8) -> Self {
        Self {
            max_attempts,
            retry_delay_ms: 0,
            settle_delay_ms: 0,
        }
    }

    fn attempts(&self) -> u8 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Whether the per-word CRC-8 of the Sensirion protocol is used.
///
/// With `Disabled` argument words go out bare and the checksum bytes of a
/// response are ignored. With `Enabled` every argument word is followed by its
/// checksum and every response word is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Checksum {
    #[default]
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub address: u8,
    pub retry: RetryPolicy,
    pub checksum: Checksum,
}

impl Config {
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            retry: RetryPolicy::DEFAULT,
            checksum: Checksum::Disabled,
        }
    }

    pub const fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub const fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = checksum;
        self
    }
}

// https://sensirion.com/media/documents/296373BB/6203C5DF/Sensirion_Gas_Sensors_Datasheet_SGP40.pdf
// Section 4.6
pub fn crc(data: &[u8; 2]) -> u8 {
    let mut crc = 0xff;

    for byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ 0x31;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

fn check_crc<E>(data: &[u8]) -> Result<(), Error<E>> {
    if crc(&[data[0], data[1]]) != data[2] {
        warn!("checksum mismatch on response word");
        Err(Error::InvalidCrc)
    } else {
        Ok(())
    }
}

/// Splits a response into its big-endian words. Each word occupies three
/// bytes on the wire, the third being its checksum.
pub fn decode_words<const W: usize, E>(
    raw: &[u8],
    checksum: Checksum,
) -> Result<[u16; W], Error<E>> {
    if raw.len() != W * 3 {
        return Err(Error::InvalidResponse);
    }

    let mut words = [0u16; W];
    for (word, piece) in words.iter_mut().zip(raw.chunks_exact(3)) {
        if checksum == Checksum::Enabled {
            check_crc(piece)?;
        }
        *word = u16::from_be_bytes([piece[0], piece[1]]);
    }

    Ok(words)
}

/// An outgoing write: the opcode, optionally followed by one argument word.
#[derive(Debug, Clone, Copy)]
struct Frame {
    buf: [u8; 5],
    len: usize,
}

impl Frame {
    fn command(cmd: &Cmd) -> Self {
        Self {
            buf: [cmd[0], cmd[1], 0, 0, 0],
            len: 2,
        }
    }

    fn with_arg(cmd: &Cmd, arg: u16, checksum: Checksum) -> Self {
        let [hi, lo] = arg.to_be_bytes();
        let mut frame = Self {
            buf: [cmd[0], cmd[1], hi, lo, 0],
            len: 4,
        };
        if checksum == Checksum::Enabled {
            frame.buf[4] = crc(&[hi, lo]);
            frame.len = 5;
        }
        frame
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Failure bookkeeping shared by the blocking and async executors.
#[derive(Debug)]
struct Link {
    config: Config,
    failures: u32,
}

impl Link {
    fn succeeded(&mut self) {
        self.failures = 0;
    }

    /// Records a failed attempt and returns whether another one is allowed.
    fn failed(&mut self, attempt: u8) -> bool {
        self.failures = self.failures.saturating_add(1);
        let attempts = self.config.retry.attempts();
        if attempt >= attempts {
            warn!(
                "bus fault, giving up after {} attempts ({} consecutive failures)",
                attempts,
                self.failures
            );
            false
        } else {
            debug!("bus fault on attempt {} of {}, retrying", attempt, attempts);
            true
        }
    }

    fn settle_ms(&self, exec_ms: u32) -> u32 {
        self.config.retry.settle_delay_ms.saturating_add(exec_ms)
    }
}

/// Retrying command executor over a blocking bus.
///
/// Every transfer is a write, a settle delay and, for queries, a separate read.
/// A bus error anywhere in that sequence fails the attempt; the whole sequence
/// is repeated after the back-off until the retry budget is spent.
#[derive(Debug)]
pub struct Sensor<I2C, D> {
    i2c: I2C,
    delay: D,
    link: Link,
}

impl<I2C, D> Sensor<I2C, D> {
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        Self {
            i2c,
            delay,
            link: Link {
                config,
                failures: 0,
            },
        }
    }

    pub fn config(&self) -> &Config {
        &self.link.config
    }

    /// Failed attempts since the last successful transfer.
    pub fn consecutive_failures(&self) -> u32 {
        self.link.failures
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C: I2c, D: DelayNs> Sensor<I2C, D> {
    pub fn send_command(&mut self, cmd: &Cmd) -> Result<(), Error<I2C::Error>> {
        self.transfer::<0>(Some(&Frame::command(cmd)), 0)?;
        Ok(())
    }

    pub fn send_command_with_arg(&mut self, cmd: &Cmd, arg: u16) -> Result<(), Error<I2C::Error>> {
        let frame = Frame::with_arg(cmd, arg, self.link.config.checksum);
        self.transfer::<0>(Some(&frame), 0)?;
        Ok(())
    }

    pub fn read_word(&mut self, cmd: &Cmd) -> Result<u16, Error<I2C::Error>> {
        self.read_word_delayed(cmd, 0)
    }

    /// Like [`Self::read_word`] but gives the device `exec_ms` of extra
    /// processing time before reading.
    pub fn read_word_delayed(&mut self, cmd: &Cmd, exec_ms: u32) -> Result<u16, Error<I2C::Error>> {
        let raw = self.transfer::<3>(Some(&Frame::command(cmd)), exec_ms)?;
        let [word] = decode_words::<1, I2C::Error>(&raw, self.link.config.checksum)?;
        Ok(word)
    }

    pub fn read_word_with_arg(
        &mut self,
        cmd: &Cmd,
        arg: u16,
        exec_ms: u32,
    ) -> Result<u16, Error<I2C::Error>> {
        let frame = Frame::with_arg(cmd, arg, self.link.config.checksum);
        let raw = self.transfer::<3>(Some(&frame), exec_ms)?;
        let [word] = decode_words::<1, I2C::Error>(&raw, self.link.config.checksum)?;
        Ok(word)
    }

    pub fn read_three_words(&mut self, cmd: &Cmd) -> Result<[u16; 3], Error<I2C::Error>> {
        let raw = self.read_raw::<9>(cmd)?;
        decode_words(&raw, self.link.config.checksum)
    }

    /// Reads the word left behind by an earlier command, without writing.
    pub fn read_response_word(&mut self) -> Result<u16, Error<I2C::Error>> {
        let raw = self.transfer::<3>(None, 0)?;
        let [word] = decode_words::<1, I2C::Error>(&raw, self.link.config.checksum)?;
        Ok(word)
    }

    /// Issues `cmd` and returns the response bytes undecoded.
    pub fn read_raw<const N: usize>(&mut self, cmd: &Cmd) -> Result<[u8; N], Error<I2C::Error>> {
        self.transfer::<N>(Some(&Frame::command(cmd)), 0)
    }

    pub fn wait_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    fn transfer<const N: usize>(
        &mut self,
        frame: Option<&Frame>,
        exec_ms: u32,
    ) -> Result<[u8; N], Error<I2C::Error>> {
        let mut attempt = 1;
        loop {
            match self.attempt::<N>(frame, exec_ms) {
                Ok(response) => {
                    self.link.succeeded();
                    return Ok(response);
                }
                Err(err) => {
                    if !self.link.failed(attempt) {
                        return Err(Error::I2c(err));
                    }
                    self.delay.delay_ms(self.link.config.retry.retry_delay_ms);
                    attempt += 1;
                }
            }
        }
    }

    fn attempt<const N: usize>(
        &mut self,
        frame: Option<&Frame>,
        exec_ms: u32,
    ) -> Result<[u8; N], I2C::Error> {
        let addr = self.link.config.address;
        trace!("transfer to {}: {} response bytes", addr, N);
        if let Some(frame) = frame {
            self.i2c.write(addr, frame.as_bytes())?;
            self.delay.delay_ms(self.link.settle_ms(exec_ms));
        }

        let mut response = [0u8; N];
        if N > 0 {
            self.i2c.read(addr, &mut response)?;
        }
        Ok(response)
    }
}

/// The retrying executor over an async bus. Same transfer shape and
/// bookkeeping as [`Sensor`].
#[derive(Debug)]
pub struct AsyncSensor<I2C, D> {
    i2c: I2C,
    delay: D,
    link: Link,
}

impl<I2C, D> AsyncSensor<I2C, D> {
    pub fn new(i2c: I2C, delay: D, config: Config) -> Self {
        Self {
            i2c,
            delay,
            link: Link {
                config,
                failures: 0,
            },
        }
    }

    pub fn config(&self) -> &Config {
        &self.link.config
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.link.failures
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C, D> AsyncSensor<I2C, D>
where
    I2C: embedded_hal_async::i2c::I2c,
    D: embedded_hal_async::delay::DelayNs,
{
    pub async fn send_command(&mut self, cmd: &Cmd) -> Result<(), Error<I2C::Error>> {
        self.transfer::<0>(Some(&Frame::command(cmd)), 0).await?;
        Ok(())
    }

    pub async fn send_command_with_arg(
        &mut self,
        cmd: &Cmd,
        arg: u16,
    ) -> Result<(), Error<I2C::Error>> {
        let frame = Frame::with_arg(cmd, arg, self.link.config.checksum);
        self.transfer::<0>(Some(&frame), 0).await?;
        Ok(())
    }

    pub async fn read_word(&mut self, cmd: &Cmd) -> Result<u16, Error<I2C::Error>> {
        self.read_word_delayed(cmd, 0).await
    }

    pub async fn read_word_delayed(
        &mut self,
        cmd: &Cmd,
        exec_ms: u32,
    ) -> Result<u16, Error<I2C::Error>> {
        let raw = self.transfer::<3>(Some(&Frame::command(cmd)), exec_ms).await?;
        let [word] = decode_words::<1, I2C::Error>(&raw, self.link.config.checksum)?;
        Ok(word)
    }

    pub async fn read_word_with_arg(
        &mut self,
        cmd: &Cmd,
        arg: u16,
        exec_ms: u32,
    ) -> Result<u16, Error<I2C::Error>> {
        let frame = Frame::with_arg(cmd, arg, self.link.config.checksum);
        let raw = self.transfer::<3>(Some(&frame), exec_ms).await?;
        let [word] = decode_words::<1, I2C::Error>(&raw, self.link.config.checksum)?;
        Ok(word)
    }

    pub async fn read_three_words(&mut self, cmd: &Cmd) -> Result<[u16; 3], Error<I2C::Error>> {
        let raw = self.read_raw::<9>(cmd).await?;
        decode_words(&raw, self.link.config.checksum)
    }

    pub async fn read_response_word(&mut self) -> Result<u16, Error<I2C::Error>> {
        let raw = self.transfer::<3>(None, 0).await?;
        let [word] = decode_words::<1, I2C::Error>(&raw, self.link.config.checksum)?;
        Ok(word)
    }

    pub async fn read_raw<const N: usize>(
        &mut self,
        cmd: &Cmd,
    ) -> Result<[u8; N], Error<I2C::Error>> {
        self.transfer::<N>(Some(&Frame::command(cmd)), 0).await
    }

    pub async fn wait_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
    }

    async fn transfer<const N: usize>(
        &mut self,
        frame: Option<&Frame>,
        exec_ms: u32,
    ) -> Result<[u8; N], Error<I2C::Error>> {
        let mut attempt = 1;
        loop {
            match self.attempt::<N>(frame, exec_ms).await {
                Ok(response) => {
                    self.link.succeeded();
                    return Ok(response);
                }
                Err(err) => {
                    if !self.link.failed(attempt) {
                        return Err(Error::I2c(err));
                    }
                    self.delay
                        .delay_ms(self.link.config.retry.retry_delay_ms)
                        .await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt<const N: usize>(
        &mut self,
        frame: Option<&Frame>,
        exec_ms: u32,
    ) -> Result<[u8; N], I2C::Error> {
        let addr = self.link.config.address;
        trace!("transfer to {}: {} response bytes", addr, N);
        if let Some(frame) = frame {
            self.i2c.write(addr, frame.as_bytes()).await?;
            self.delay.delay_ms(self.link.settle_ms(exec_ms)).await;
        }

        let mut response = [0u8; N];
        if N > 0 {
            self.i2c.read(addr, &mut response).await?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::{Checksum, Config, Error, RetryPolicy, Sensor, check_crc, decode_words};
    use crate::debug_utils::{DummyBus, DummyError, RecordingDelay};

    const ADDR: u8 = 0x62;

    fn sensor(bus: DummyBus<'_>, attempts: u8) -> Sensor<DummyBus<'_>, RecordingDelay> {
        let config = Config::new(ADDR).with_retry(RetryPolicy::immediate(attempts));
        Sensor::new(bus, RecordingDelay::default(), config)
    }

    #[test]
    fn test_default_retry_policy() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::DEFAULT);
        assert_eq!(Config::new(ADDR).retry, RetryPolicy::DEFAULT);
        assert_eq!(RetryPolicy::DEFAULT.max_attempts, 5);
        assert_eq!(RetryPolicy::DEFAULT.retry_delay_ms, 100);
        assert_eq!(RetryPolicy::DEFAULT.settle_delay_ms, 20);
    }

    #[test]
    fn test_crc() {
        assert_eq!(check_crc::<DummyError>(&[0xbe, 0xef, 0x92]), Ok(()));
        assert_eq!(
            check_crc::<DummyError>(&[0xbe, 0x01, 0x92]),
            Err(Error::InvalidCrc)
        );
    }

    #[test]
    fn test_decode_words_ignores_crc_when_disabled() {
        let words = decode_words::<3, DummyError>(
            &[0x01, 0xf4, 0x00, 0x66, 0x66, 0x00, 0x80, 0x00, 0x00],
            Checksum::Disabled,
        );
        assert_eq!(words, Ok([0x01f4, 0x6666, 0x8000]));
    }

    #[test]
    fn test_decode_words_verifies_crc_when_enabled() {
        let good = [0x01, 0xf4, 0x33, 0x66, 0x66, 0x93, 0x80, 0x00, 0xa2];
        assert_eq!(
            decode_words::<3, DummyError>(&good, Checksum::Enabled),
            Ok([0x01f4, 0x6666, 0x8000])
        );

        let mut bad = good;
        bad[7] ^= 0x01;
        assert_eq!(
            decode_words::<3, DummyError>(&bad, Checksum::Enabled),
            Err(Error::InvalidCrc)
        );
    }

    #[test]
    fn test_decode_words_rejects_short_input() {
        assert_eq!(
            decode_words::<3, DummyError>(&[0x01, 0xf4, 0x33, 0x66], Checksum::Disabled),
            Err(Error::InvalidResponse)
        );
    }

    #[test]
    fn test_recovers_after_transient_faults() {
        let bus = DummyBus::failing(&[0x04, 0xab, 0x14], 3);
        let mut sensor = sensor(bus, 5);

        assert_eq!(sensor.read_word(&[0x23, 0x22]), Ok(0x04ab));
        assert_eq!(sensor.consecutive_failures(), 0);
    }

    #[test]
    fn test_gives_up_after_retry_budget() {
        let bus = DummyBus::failing(&[0x04, 0xab, 0x14], 5);
        let mut sensor = sensor(bus, 5);

        assert_eq!(
            sensor.read_word(&[0x23, 0x22]),
            Err(Error::I2c(DummyError::Nack))
        );
        assert_eq!(sensor.consecutive_failures(), 5);

        let (bus, _) = sensor.release();
        assert_eq!(bus.transactions, 5);
    }

    #[test]
    fn test_failures_accumulate_across_calls_until_success() {
        let bus = DummyBus::failing(&[], 6);
        let mut sensor = sensor(bus, 3);

        assert!(sensor.send_command(&[0x21, 0xb1]).is_err());
        assert!(sensor.send_command(&[0x21, 0xb1]).is_err());
        assert_eq!(sensor.consecutive_failures(), 6);

        assert_eq!(sensor.send_command(&[0x21, 0xb1]), Ok(()));
        assert_eq!(sensor.consecutive_failures(), 0);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let bus = DummyBus::new(&[]);
        let mut sensor = sensor(bus, 0);

        assert_eq!(sensor.send_command(&[0x21, 0xb1]), Ok(()));
        let (bus, _) = sensor.release();
        assert_eq!(bus.transactions, 1);
    }

    #[test]
    fn test_waits_settle_and_backoff() {
        let bus = DummyBus::failing(&[0x00, 0x00, 0x81], 2);
        let config = Config::new(ADDR);
        let mut sensor = Sensor::new(bus, RecordingDelay::default(), config);

        assert_eq!(sensor.read_word(&[0x23, 0x18]), Ok(0));

        // Two failed writes back off 100 ms each, the successful write settles 20 ms.
        let (_, delay) = sensor.release();
        assert_eq!(delay.total_ms(), 2 * 100 + 20);
    }

    #[test]
    fn test_argument_word_framing() {
        let bus = DummyBus::new(&[]);
        let mut plain = sensor(bus, 1);
        plain.send_command_with_arg(&[0x24, 0x27], 0x04ab).unwrap();
        let (bus, _) = plain.release();
        assert_eq!(bus.written, vec![vec![0x24, 0x27, 0x04, 0xab]]);

        let config = Config::new(ADDR)
            .with_retry(RetryPolicy::immediate(1))
            .with_checksum(Checksum::Enabled);
        let mut checked = Sensor::new(DummyBus::new(&[]), RecordingDelay::default(), config);
        checked.send_command_with_arg(&[0x24, 0x27], 0x04ab).unwrap();
        let (bus, _) = checked.release();
        assert_eq!(bus.written, vec![vec![0x24, 0x27, 0x04, 0xab, 0x14]]);
    }

    #[test]
    fn test_checksum_mismatch_is_not_retried() {
        let bus = DummyBus::new(&[0x04, 0xab, 0x00]);
        let config = Config::new(ADDR)
            .with_retry(RetryPolicy::immediate(5))
            .with_checksum(Checksum::Enabled);
        let mut sensor = Sensor::new(bus, RecordingDelay::default(), config);

        assert_eq!(sensor.read_word(&[0x23, 0x22]), Err(Error::InvalidCrc));
        assert_eq!(sensor.consecutive_failures(), 0);

        let (bus, _) = sensor.release();
        assert_eq!(bus.transactions, 2);
    }
}

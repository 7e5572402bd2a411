use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyError {
    InvalidTest,
    Nack,
}

impl Error for DummyError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        match &self {
            DummyError::InvalidTest => embedded_hal::i2c::ErrorKind::Other,
            DummyError::Nack => embedded_hal::i2c::ErrorKind::NoAcknowledge(
                embedded_hal::i2c::NoAcknowledgeSource::Unknown,
            ),
        }
    }
}

/// Answers every read with `response` after NACKing the first `fail_first`
/// transactions. Successful writes are recorded.
pub struct DummyBus<'a> {
    pub response: &'a [u8],
    pub fail_first: usize,
    pub transactions: usize,
    pub written: Vec<Vec<u8>>,
}

impl<'a> DummyBus<'a> {
    pub fn new(response: &'a [u8]) -> Self {
        Self::failing(response, 0)
    }

    pub fn failing(response: &'a [u8], fail_first: usize) -> Self {
        Self {
            response,
            fail_first,
            transactions: 0,
            written: Vec::new(),
        }
    }
}

impl embedded_hal::i2c::ErrorType for DummyBus<'_> {
    type Error = DummyError;
}

impl embedded_hal::i2c::I2c for DummyBus<'_> {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [embedded_hal::i2c::Operation],
    ) -> Result<(), Self::Error> {
        self.transactions += 1;
        if self.fail_first > 0 {
            self.fail_first -= 1;
            return Err(DummyError::Nack);
        }

        match operations {
            [Operation::Read(response)] => {
                if response.len() != self.response.len() {
                    return Err(DummyError::InvalidTest);
                }

                response.copy_from_slice(self.response);

                Ok(())
            }
            [Operation::Write(bytes)] => {
                self.written.push(bytes.to_vec());
                Ok(())
            }
            // Other transactions are invalid
            _ => Err(DummyError::InvalidTest),
        }
    }
}

/// Adds up every requested delay instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    pub total_ns: u64,
}

impl RecordingDelay {
    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.total_ns += u64::from(us) * 1_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.total_ns += u64::from(ms) * 1_000_000;
    }
}

impl embedded_hal_async::delay::DelayNs for RecordingDelay {
    async fn delay_ns(&mut self, ns: u32) {
        DelayNs::delay_ns(self, ns);
    }

    async fn delay_us(&mut self, us: u32) {
        DelayNs::delay_us(self, us);
    }

    async fn delay_ms(&mut self, ms: u32) {
        DelayNs::delay_ms(self, ms);
    }
}

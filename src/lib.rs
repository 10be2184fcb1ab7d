//! Implements a driver for accessing MS5837 temperature and pressure sensors.
//!
//! The library is built to work with [`embedded-hal`] and computes the
//! compensated values with the fixed-point algorithm from the datasheets of
//! the [MS5837-30BA][30ba] and [MS5837-02BA][02ba], including the
//! second-order correction. No floating point is used when turning raw ADC
//! conversions into readings.
//!
//! [30ba]: https://www.te.com/commerce/DocumentDelivery/DDEController?Action=showdoc&DocId=Data+Sheet%7FMS5837-30BA%7FB1%7Fpdf%7FEnglish%7FENG_DS_MS5837-30BA_B1.pdf
//! [02ba]: https://www.te.com/commerce/DocumentDelivery/DDEController?Action=showdoc&DocId=Data+Sheet%7FMS5837-02BA01%7FA8%7Fpdf%7FEnglish%7FENG_DS_MS5837-02BA01_A8.pdf
//!
//! # Usage
//!
//! Provide something that can delay execution by a specific time, and a
//! reference to the I2C bus itself:
//!
//! ```ignore
//! let mut ms5837 = ms5837::MS5837::new(DeviceModel::Ms5837_30Ba, &mut delay, &mut i2c)?;
//! let reading = ms5837.read_temperature_and_pressure(&mut delay, &mut i2c)?;
//! ```
//!
//! The library can be cooperatively used with other sensors on the same
//! I2C-bus. The PROM validation and compensation are available on their own
//! in [`prom`] and [`compensation`] for use with other transports.
//!
//! Depth and altitude conversions live in [`units`]; the altitude functions
//! need the `altitude-adjust` feature flag.
#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod compensation;
pub mod prom;
pub mod units;

pub use compensation::{
    compensate, CompensatedReading, DeviceModel, RawSample, Reading, TemperatureRange,
};
pub use prom::{validate, ChecksumError, CoefficientTable, ValidatedTable};

/// 7-bit unshifted I2C address for the MS5837 sensor.
pub const MS5837_ADDR: u8 = 0x76;

/// MS5837 command to initiate a read from PROM address 0.
const MS5837_PROM_ADDRESS_READ_ADDRESS_0: u8 = 0xA0;

/// MS5837 command to reset the sensor chip.
const MS5837_RESET_COMMAND: u8 = 0x1E;

/// MS5837 command to start a pressure (D1) ADC conversion.
const MS5837_START_PRESSURE_ADC_CONVERSION: u8 = 0x40;

/// MS5837 command to start a temperature (D2) ADC conversion.
const MS5837_START_TEMPERATURE_ADC_CONVERSION: u8 = 0x50;

/// MS5837 command to read the ADC.
const MS5837_READ_ADC: u8 = 0x00;

/// Time for the chip to reload its PROM after a reset, in milliseconds.
const MS5837_RESET_TIME_MS: u32 = 10;

/// How often a bus transaction is attempted before a measurement cycle or
/// the bring-up is given up.
pub const MAX_BUS_ATTEMPTS: usize = 5;

/// Represents an I2C-connected MS5837 sensor.
#[derive(Copy, Clone, Debug)]
pub struct MS5837<I2C, D> {
    /// Calibration coefficients stored on the chip.
    coeffs: ValidatedTable,

    /// Variant of the chip, selecting the compensation constants.
    model: DeviceModel,

    /// Currently selected resolution of the sensor.
    resolution: Resolution,

    /// Marker to satisfy the compiler.
    _delay: core::marker::PhantomData<D>,

    /// I2C interface for communicating with the sensor.
    _i2c: core::marker::PhantomData<I2C>,
}

impl<I2C, D> MS5837<I2C, D>
where
    D: embedded_hal::blocking::delay::DelayMs<u32>,
    I2C: embedded_hal::blocking::i2c::Read + embedded_hal::blocking::i2c::Write,
{
    /// Creates a connection with an MS5837 sensor via I2C.
    ///
    /// Initialization sequence:
    /// - Sends a reset command to the chip.
    /// - Reads the PROM coefficients and checks their CRC.
    ///
    /// A CRC mismatch means the device is absent, miscalibrated or not an
    /// MS5837, and is not retried.
    pub fn new(model: DeviceModel, delay: &mut D, i2c: &mut I2C) -> Result<Self> {
        retry(|| {
            i2c.write(MS5837_ADDR, &[MS5837_RESET_COMMAND])
                .map_err(|_| MS5837Error::I2cTransferError)
        })?;

        delay.delay_ms(MS5837_RESET_TIME_MS);

        let table = read_prom(i2c)?;
        let coeffs = validate(table).map_err(|err| {
            #[cfg(feature = "defmt")]
            defmt::warn!("PROM CRC mismatch: {=u8:#x} stored, {=u8:#x} computed", err.stored, err.computed);
            MS5837Error::from(err)
        })?;

        #[cfg(feature = "defmt")]
        defmt::info!("MS5837 ready: {}", model);

        Ok(Self {
            coeffs,
            model,
            resolution: Resolution::Osr8192,
            _delay: core::marker::PhantomData::default(),
            _i2c: core::marker::PhantomData::default(),
        })
    }

    /// Triggers conversion and reading of the 24-bit ADC value specified in
    /// the command.
    ///
    /// The ADC returns 0 when read before the conversion has finished, which
    /// is treated like a failed transfer.
    fn begin_conversion_and_read_adc(
        &mut self,
        cmd: u8,
        delay: &mut D,
        i2c: &mut I2C,
    ) -> Result<RawSample> {
        let mut buf = [0; 3];

        i2c.write(MS5837_ADDR, &[cmd])
            .map_err(|_| MS5837Error::WriteI2CError)?;

        delay.delay_ms(self.resolution.get_conversion_time());

        i2c.write(MS5837_ADDR, &[MS5837_READ_ADC])
            .map_err(|_| MS5837Error::WriteI2CError)?;

        i2c.read(MS5837_ADDR, &mut buf)
            .map_err(|_| MS5837Error::ReadI2CError)?;

        let sample = RawSample::from_be_bytes(buf);
        if sample.value() == 0 {
            return Err(MS5837Error::I2cTransferError);
        }

        Ok(sample)
    }

    /// Reads the raw pressure (D1) and temperature (D2) conversions.
    ///
    /// Each conversion is retried up to [`MAX_BUS_ATTEMPTS`] times.
    pub fn read_raw_samples(
        &mut self,
        delay: &mut D,
        i2c: &mut I2C,
    ) -> Result<(RawSample, RawSample)> {
        let cmd = (self.resolution as u8) * 2 | MS5837_START_PRESSURE_ADC_CONVERSION;
        let adc_pressure = retry(|| self.begin_conversion_and_read_adc(cmd, delay, i2c))?;

        let cmd = (self.resolution as u8) * 2 | MS5837_START_TEMPERATURE_ADC_CONVERSION;
        let adc_temperature = retry(|| self.begin_conversion_and_read_adc(cmd, delay, i2c))?;

        Ok((adc_pressure, adc_temperature))
    }

    /// Reads the temperature and pressure ADC values and computes the
    /// compensated values, including second order compensation.
    pub fn read_temperature_and_pressure(
        &mut self,
        delay: &mut D,
        i2c: &mut I2C,
    ) -> Result<CompensatedReading> {
        let (d1, d2) = self.read_raw_samples(delay, i2c)?;
        Ok(compensate(&self.coeffs, self.model, d1, d2))
    }

    /// Sets the ADC resolution for the next read.
    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    /// Calibration coefficients read at initialization.
    pub fn coefficients(&self) -> &ValidatedTable {
        &self.coeffs
    }
}

/// Resolution RMS, where a higher resolution means longer conversion time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Resolution {
    /// Conversion time 0.6 ms max.
    Osr256 = 0,
    /// Conversion time 1.17 ms max.
    Osr512 = 1,
    /// Conversion time 2.28 ms max.
    Osr1024 = 2,
    /// Conversion time 4.54 ms max.
    Osr2048 = 3,
    /// Conversion time 9.04 ms max.
    Osr4096 = 4,
    /// Conversion time 18.08 ms max.
    Osr8192 = 5,
}

impl Resolution {
    /// Gets the conversion time in milliseconds.
    fn get_conversion_time(&self) -> u32 {
        match self {
            Resolution::Osr256 => 1,
            Resolution::Osr512 => 2,
            Resolution::Osr1024 => 3,
            Resolution::Osr2048 => 5,
            Resolution::Osr4096 => 10,
            Resolution::Osr8192 => 20,
        }
    }
}

/// Shorthand for all functions returning an error in this module.
type Result<T> = core::result::Result<T, MS5837Error>;

/// Represents any error that may happen during communication.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MS5837Error {
    CrcError(ChecksumError),
    I2cTransferError,
    ReadI2CError,
    WriteI2CError,
}

impl From<ChecksumError> for MS5837Error {
    fn from(err: ChecksumError) -> Self {
        MS5837Error::CrcError(err)
    }
}

/// Runs a bus operation until it succeeds, at most [`MAX_BUS_ATTEMPTS`]
/// times, returning the last error.
fn retry<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= MAX_BUS_ATTEMPTS => return Err(err),
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("bus attempt {} failed: {}", attempt, _err);
                attempt += 1;
            }
        }
    }
}

/// Reads the 7 PROM words holding the CRC and the calibration coefficients.
fn read_prom<I2C>(i2c: &mut I2C) -> Result<CoefficientTable>
where
    I2C: embedded_hal::blocking::i2c::Read + embedded_hal::blocking::i2c::Write,
{
    let mut words = [0_u16; prom::COEFFICIENT_COUNT];
    for (idx, val) in words.iter_mut().enumerate() {
        *val = retry(|| read_prom_word(i2c, idx as u8))?;
    }

    Ok(CoefficientTable::new(words))
}

/// Reads the MS5837 PROM word stored at the given PROM index.
fn read_prom_word<I2C>(i2c: &mut I2C, idx: u8) -> Result<u16>
where
    I2C: embedded_hal::blocking::i2c::Read + embedded_hal::blocking::i2c::Write,
{
    let mut buf = [0_u8; 2];
    let cmd = MS5837_PROM_ADDRESS_READ_ADDRESS_0 + idx * 2;

    i2c.write(MS5837_ADDR, &[cmd])
        .map_err(|_| MS5837Error::WriteI2CError)?;

    i2c.read(MS5837_ADDR, &mut buf)
        .map_err(|_| MS5837Error::ReadI2CError)?;

    Ok(u16::from_be_bytes(buf))
}

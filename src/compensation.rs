//! First- and second-order compensation of raw ADC conversions.
//!
//! The whole pipeline runs on `i64`. Every division by a power of two from
//! the datasheet is an arithmetic right shift, i.e. it rounds towards
//! negative infinity, which is what the datasheet sample calculation uses.
//!
//! With D1, D2 < 2^24 and all coefficients < 2^16 the largest intermediate
//! is `D1 * SENS2`, which stays below 2^62.

use crate::prom::ValidatedTable;

/// Reference temperature of the compensation in 0.01 °C (20.00 °C).
const REFERENCE_TEMPERATURE: i64 = 2000;

/// Lower breakpoint of the 30BA second-order correction in 0.01 °C.
const VERY_LOW_TEMPERATURE: i64 = -1500;

/// The sensor variants sharing the compensation algorithm.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceModel {
    /// 0 to 2 bar variant, pressure counts in 0.01 mbar.
    Ms5837_02Ba,
    /// 0 to 30 bar variant, pressure counts in 0.1 mbar.
    Ms5837_30Ba,
}

/// Shift amounts and divisors for one device model.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModelConstants {
    /// Left shift of SENS_T1 (C1) in SENS.
    pub sens_shift: u32,
    /// Right shift of TCS * dT (C3) in SENS.
    pub tcs_shift: u32,
    /// Left shift of OFF_T1 (C2) in OFF.
    pub off_shift: u32,
    /// Right shift of TCO * dT (C4) in OFF.
    pub tco_shift: u32,
    /// Final shift turning `D1 * SENS / 2^21 - OFF` into pressure counts.
    pub pressure_shift: u32,
    /// Pressure counts per millibar.
    pub counts_per_millibar: i32,
    /// Whether a second-order correction applies at or above 20 °C.
    pub high_temperature_correction: bool,
}

impl DeviceModel {
    pub const fn constants(self) -> ModelConstants {
        match self {
            DeviceModel::Ms5837_02Ba => ModelConstants {
                sens_shift: 16,
                tcs_shift: 7,
                off_shift: 17,
                tco_shift: 6,
                pressure_shift: 15,
                counts_per_millibar: 100,
                high_temperature_correction: false,
            },
            DeviceModel::Ms5837_30Ba => ModelConstants {
                sens_shift: 15,
                tcs_shift: 8,
                off_shift: 16,
                tco_shift: 7,
                pressure_shift: 13,
                counts_per_millibar: 10,
                high_temperature_correction: true,
            },
        }
    }

    /// Converts pressure counts of this model to whole millibar, truncating.
    pub const fn millibar(self, pressure: i32) -> i32 {
        pressure / self.constants().counts_per_millibar
    }
}

/// One 24-bit ADC conversion result.
#[derive(Copy, Clone, Debug, Default, Ord, PartialOrd, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawSample(u32);

impl RawSample {
    pub const MAX: u32 = (1 << 24) - 1;

    /// Returns `None` if the value does not fit in 24 bits.
    pub const fn new(value: u32) -> Option<Self> {
        if value > Self::MAX {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Assembles the three bytes returned by an ADC read, MSB first.
    pub const fn from_be_bytes(bytes: [u8; 3]) -> Self {
        Self(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

/// Compensated temperature and pressure in the sensor's fixed-point units.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompensatedReading {
    /// Temperature in 0.01 °C.
    pub temperature: i32,
    /// Pressure in 0.01 mbar (02BA) or 0.1 mbar (30BA).
    pub pressure: i32,
}

impl CompensatedReading {
    /// Converts to floating point units for display.
    pub fn to_reading(&self, model: DeviceModel) -> Reading {
        Reading {
            pressure: self.pressure as f32 / model.constants().counts_per_millibar as f32,
            temperature: self.temperature as f32 / 100.0,
        }
    }
}

/// Represents the reading in engineering units.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Pressure in millibar.
    pub pressure: f32,

    /// Temperature in degrees Celsius.
    pub temperature: f32,
}

/// Temperature range selecting the second-order correction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TemperatureRange {
    /// Below -15 °C, 30BA only.
    VeryLow,
    /// Below 20 °C.
    Low,
    /// 20 °C and above, 30BA only.
    High,
    /// 20 °C and above without correction (02BA).
    Standard,
}

impl TemperatureRange {
    /// Classifies a first-order temperature in 0.01 °C.
    pub fn classify(model: DeviceModel, temp: i64) -> Self {
        if temp < REFERENCE_TEMPERATURE {
            if model == DeviceModel::Ms5837_30Ba && temp < VERY_LOW_TEMPERATURE {
                TemperatureRange::VeryLow
            } else {
                TemperatureRange::Low
            }
        } else if model.constants().high_temperature_correction {
            TemperatureRange::High
        } else {
            TemperatureRange::Standard
        }
    }
}

/// Intermediate results of the first-order compensation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct FirstOrder {
    pub delta_t: i64,
    pub temperature: i64,
    pub offset: i64,
    pub sensitivity: i64,
}

/// Second-order correction terms Ti, OFFi and SENSi.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Correction {
    pub ti: i64,
    pub offi: i64,
    pub sensi: i64,
}

/// Computes temperature and temperature-compensated pressure from the raw
/// pressure (D1) and temperature (D2) conversions.
///
/// The pressure is returned in counts of the model, 0.01 mbar for the 02BA
/// and 0.1 mbar for the 30BA. [`DeviceModel::millibar`] applies the final
/// division to whole millibar.
pub fn compensate(
    table: &ValidatedTable,
    model: DeviceModel,
    d1: RawSample,
    d2: RawSample,
) -> CompensatedReading {
    let first = first_order(table, model, d2);
    let correction = second_order(model, first.delta_t, first.temperature);

    let temperature = first.temperature - correction.ti;
    let off2 = first.offset - correction.offi;
    let sens2 = first.sensitivity - correction.sensi;
    let pressure = calculate_pressure(model, d1, off2, sens2);

    CompensatedReading {
        temperature: temperature as i32,
        pressure: pressure as i32,
    }
}

/// dT = D2 - T_REF * 2^8
///
/// TEMP = 20 °C + dT * TEMPSENS / 2^23
///
/// SENS = SENS_T1 * 2^n + TCS * dT / 2^m, OFF likewise with the model's
/// shift amounts.
pub(crate) fn first_order(table: &ValidatedTable, model: DeviceModel, d2: RawSample) -> FirstOrder {
    let k = model.constants();

    let delta_t = d2.value() as i64 - ((table.reference_temperature() as i64) << 8);
    let temperature =
        REFERENCE_TEMPERATURE + ((delta_t * table.temp_coeff_of_temperature() as i64) >> 23);

    let sensitivity = ((table.pressure_sensitivity() as i64) << k.sens_shift)
        + ((table.temp_coeff_of_pressure_sensitivity() as i64 * delta_t) >> k.tcs_shift);
    let offset = ((table.pressure_offset() as i64) << k.off_shift)
        + ((table.temp_coeff_of_pressure_offset() as i64 * delta_t) >> k.tco_shift);

    FirstOrder {
        delta_t,
        temperature,
        offset,
        sensitivity,
    }
}

/// Calculates the second-order correction terms for a first-order
/// temperature.
pub(crate) fn second_order(model: DeviceModel, delta_t: i64, temp: i64) -> Correction {
    let dt_squared = delta_t * delta_t;
    let t_minus_2000_squared = (temp - REFERENCE_TEMPERATURE) * (temp - REFERENCE_TEMPERATURE);

    match (model, TemperatureRange::classify(model, temp)) {
        (DeviceModel::Ms5837_02Ba, TemperatureRange::Low) => Correction {
            ti: (11 * dt_squared) >> 35,
            offi: (31 * t_minus_2000_squared) >> 3,
            sensi: (63 * t_minus_2000_squared) >> 5,
        },
        (DeviceModel::Ms5837_30Ba, TemperatureRange::Low) => Correction {
            ti: (3 * dt_squared) >> 33,
            offi: (3 * t_minus_2000_squared) >> 1,
            sensi: (5 * t_minus_2000_squared) >> 3,
        },
        (DeviceModel::Ms5837_30Ba, TemperatureRange::VeryLow) => {
            let t_plus_1500_squared =
                (temp - VERY_LOW_TEMPERATURE) * (temp - VERY_LOW_TEMPERATURE);
            Correction {
                ti: (3 * dt_squared) >> 33,
                offi: ((3 * t_minus_2000_squared) >> 1) + 7 * t_plus_1500_squared,
                sensi: ((5 * t_minus_2000_squared) >> 3) + 4 * t_plus_1500_squared,
            }
        }
        (DeviceModel::Ms5837_30Ba, TemperatureRange::High) => Correction {
            ti: (2 * dt_squared) >> 37,
            offi: t_minus_2000_squared >> 4,
            sensi: 0,
        },
        _ => Correction::default(),
    }
}

/// P = (D1 * SENS / 2^21 - OFF) / 2^n
fn calculate_pressure(model: DeviceModel, d1: RawSample, off: i64, sens: i64) -> i64 {
    (((d1.value() as i64 * sens) >> 21) - off) >> model.constants().pressure_shift
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prom::{validate, CoefficientTable};

    /// Coefficients from the sample calculation in the MS5837-30BA
    /// datasheet.
    fn sample_table() -> ValidatedTable {
        validate(CoefficientTable::new([0x2000, 34982, 36352, 20328, 22354, 26646, 26146])).unwrap()
    }

    fn sample(value: u32) -> RawSample {
        RawSample::new(value).unwrap()
    }

    /// Sample ADC values (pressure, temperature) from the datasheet.
    fn sample_adc_values() -> (RawSample, RawSample) {
        (sample(4958179), sample(6815414))
    }

    /// D2 at which the sample table's first-order temperature is exactly
    /// 20.00 °C.
    const D2_AT_20C: u32 = 6821376;

    /// D2 at which the sample table's first-order temperature is exactly
    /// -15.00 °C.
    const D2_AT_MINUS_15C: u32 = 5698446;

    #[test]
    fn first_order_with_sample_coefficients() {
        let table = sample_table();
        let (_, adc_temperature) = sample_adc_values();

        let first = first_order(&table, DeviceModel::Ms5837_30Ba, adc_temperature);
        assert_eq!(first.delta_t, -5962);
        assert_eq!(first.temperature, 1981);
        assert_eq!(first.offset, 2_381_323_464);
        assert_eq!(first.sensitivity, 1_145_816_755);
    }

    #[test]
    fn compensate_with_sample_coefficients() {
        let table = sample_table();
        let (adc_pressure, adc_temperature) = sample_adc_values();

        let reading = compensate(&table, DeviceModel::Ms5837_30Ba, adc_pressure, adc_temperature);
        assert_eq!(
            reading,
            CompensatedReading {
                temperature: 1981,
                pressure: 39_998,
            }
        );
        assert_eq!(DeviceModel::Ms5837_30Ba.millibar(reading.pressure), 3999);
    }

    #[test]
    fn compensate_02ba() {
        let table = validate(
            CoefficientTable::new([0, 46372, 43981, 29059, 27842, 31553, 28165]).with_crc(),
        )
        .unwrap();

        let first = first_order(&table, DeviceModel::Ms5837_02Ba, sample(8077636));
        assert_eq!(first.delta_t, 68);
        assert_eq!(first.offset, 5_764_707_214);
        assert_eq!(first.sensitivity, 3_039_050_829);

        let reading = compensate(&table, DeviceModel::Ms5837_02Ba, sample(6465444), sample(8077636));
        assert_eq!(
            reading,
            CompensatedReading {
                temperature: 2000,
                pressure: 110_002,
            }
        );
        assert_eq!(DeviceModel::Ms5837_02Ba.millibar(reading.pressure), 1100);
    }

    #[test]
    fn compensate_is_deterministic() {
        let table = sample_table();
        let (d1, d2) = sample_adc_values();
        for model in [DeviceModel::Ms5837_02Ba, DeviceModel::Ms5837_30Ba] {
            assert_eq!(compensate(&table, model, d1, d2), compensate(&table, model, d1, d2));
        }
    }

    #[test]
    fn low_temperature_02ba() {
        let table = sample_table();
        let (d1, d2) = sample_adc_values();

        assert_eq!(TemperatureRange::classify(DeviceModel::Ms5837_02Ba, 1981), TemperatureRange::Low);
        assert_eq!(
            second_order(DeviceModel::Ms5837_02Ba, -5962, 1981),
            Correction {
                ti: 0,
                offi: 1398,
                sensi: 710,
            }
        );
        let reading = compensate(&table, DeviceModel::Ms5837_02Ba, d1, d2);
        assert_eq!(reading.pressure, 19_999);

        let cold = compensate(&table, DeviceModel::Ms5837_02Ba, d1, sample(4315414));
        assert_eq!(
            second_order(DeviceModel::Ms5837_02Ba, -2505962, -5811),
            Correction {
                ti: 2010,
                offi: 236_420_418,
                sensi: 120_116_825,
            }
        );
        assert_eq!(
            cold,
            CompensatedReading {
                temperature: -7821,
                pressure: 16_549,
            }
        );
    }

    #[test]
    fn low_temperature_30ba() {
        let table = sample_table();
        let (d1, _) = sample_adc_values();

        assert_eq!(TemperatureRange::classify(DeviceModel::Ms5837_30Ba, -1500), TemperatureRange::Low);
        let correction = second_order(DeviceModel::Ms5837_30Ba, -1122930, -1500);
        assert_eq!(
            correction,
            Correction {
                ti: 440,
                offi: 18_375_000,
                sensi: 7_656_250,
            }
        );

        let reading = compensate(&table, DeviceModel::Ms5837_30Ba, d1, sample(D2_AT_MINUS_15C));
        assert_eq!(
            reading,
            CompensatedReading {
                temperature: -1940,
                pressure: 38_246,
            }
        );
    }

    #[test]
    fn very_low_temperature_30ba() {
        let table = sample_table();

        let first = first_order(&table, DeviceModel::Ms5837_30Ba, sample(D2_AT_MINUS_15C - 1));
        assert_eq!(first.temperature, -1501);
        assert_eq!(
            TemperatureRange::classify(DeviceModel::Ms5837_30Ba, first.temperature),
            TemperatureRange::VeryLow
        );
        assert_eq!(
            second_order(DeviceModel::Ms5837_30Ba, first.delta_t, first.temperature),
            Correction {
                ti: 440,
                offi: 18_385_508,
                sensi: 7_660_629,
            }
        );

        let deep = second_order(DeviceModel::Ms5837_30Ba, -3505962, -8928);
        assert_eq!(
            deep,
            Correction {
                ti: 4292,
                offi: 565_358_064,
                sensi: 295_338_976,
            }
        );
    }

    #[test]
    fn very_low_temperature_is_30ba_only() {
        assert_eq!(TemperatureRange::classify(DeviceModel::Ms5837_02Ba, -1501), TemperatureRange::Low);
        assert_eq!(TemperatureRange::classify(DeviceModel::Ms5837_02Ba, -8928), TemperatureRange::Low);
    }

    #[test]
    fn high_temperature_30ba() {
        let table = sample_table();
        let (d1, _) = sample_adc_values();

        assert_eq!(TemperatureRange::classify(DeviceModel::Ms5837_30Ba, 8215), TemperatureRange::High);
        assert_eq!(
            second_order(DeviceModel::Ms5837_30Ba, 1994038, 8215),
            Correction {
                ti: 57,
                offi: 2_414_139,
                sensi: 0,
            }
        );
        let reading = compensate(&table, DeviceModel::Ms5837_30Ba, d1, sample(8815414));
        assert_eq!(
            reading,
            CompensatedReading {
                temperature: 8158,
                pressure: 43_490,
            }
        );
    }

    #[test]
    fn high_temperature_02ba_is_uncorrected() {
        let table = sample_table();
        let (d1, _) = sample_adc_values();

        assert_eq!(
            TemperatureRange::classify(DeviceModel::Ms5837_02Ba, 8215),
            TemperatureRange::Standard
        );
        assert_eq!(second_order(DeviceModel::Ms5837_02Ba, 1994038, 8215), Correction::default());
        let reading = compensate(&table, DeviceModel::Ms5837_02Ba, d1, sample(8815414));
        assert_eq!(
            reading,
            CompensatedReading {
                temperature: 8215,
                pressure: 21_597,
            }
        );
    }

    #[test]
    fn reference_temperature_is_not_low() {
        let table = sample_table();
        let first = first_order(&table, DeviceModel::Ms5837_30Ba, sample(D2_AT_20C));
        assert_eq!(first.temperature, 2000);

        assert_eq!(TemperatureRange::classify(DeviceModel::Ms5837_30Ba, 2000), TemperatureRange::High);
        assert_eq!(TemperatureRange::classify(DeviceModel::Ms5837_30Ba, 1999), TemperatureRange::Low);
        assert_eq!(
            TemperatureRange::classify(DeviceModel::Ms5837_02Ba, 2000),
            TemperatureRange::Standard
        );
        assert_eq!(TemperatureRange::classify(DeviceModel::Ms5837_02Ba, 1999), TemperatureRange::Low);

        let (d1, _) = sample_adc_values();
        assert_eq!(
            compensate(&table, DeviceModel::Ms5837_30Ba, d1, sample(D2_AT_20C)),
            CompensatedReading {
                temperature: 2000,
                pressure: 40_007,
            }
        );
        assert_eq!(
            compensate(&table, DeviceModel::Ms5837_02Ba, d1, sample(D2_AT_20C)),
            CompensatedReading {
                temperature: 2000,
                pressure: 20_003,
            }
        );
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        let table = validate(CoefficientTable::new([0xFFFF; 7]).with_crc()).unwrap();
        let max = sample(RawSample::MAX);
        let min = sample(0);

        assert_eq!(
            compensate(&table, DeviceModel::Ms5837_02Ba, max, max),
            CompensatedReading {
                temperature: 2001,
                pressure: 786_443,
            }
        );
        assert_eq!(
            compensate(&table, DeviceModel::Ms5837_30Ba, max, max),
            CompensatedReading {
                temperature: 2001,
                pressure: 1_572_887,
            }
        );
        assert_eq!(
            compensate(&table, DeviceModel::Ms5837_02Ba, min, min),
            CompensatedReading {
                temperature: -219_178,
                pressure: 2_293_655,
            }
        );
        assert_eq!(
            compensate(&table, DeviceModel::Ms5837_30Ba, min, min),
            CompensatedReading {
                temperature: -227_370,
                pressure: 17_575_725,
            }
        );
    }

    #[test]
    fn raw_sample_range() {
        assert_eq!(RawSample::new(RawSample::MAX).map(RawSample::value), Some(0xFF_FFFF));
        assert_eq!(RawSample::new(1 << 24), None);
        assert_eq!(RawSample::from_be_bytes([0x4B, 0xA7, 0xE3]).value(), 4958179);
    }

    #[test]
    fn reading_in_engineering_units() {
        let reading = CompensatedReading {
            temperature: 1981,
            pressure: 39_998,
        };
        let converted = reading.to_reading(DeviceModel::Ms5837_30Ba);
        assert!((converted.temperature - 19.81).abs() < 1e-4);
        assert!((converted.pressure - 3999.8).abs() < 1e-2);
    }
}

//! Calibration coefficients stored in the sensor PROM and their CRC-4 check.

/// Number of configuration coefficients in PROM, including the CRC word.
pub const COEFFICIENT_COUNT: usize = 7;

/// Generator polynomial of the PROM CRC-4, as given in the datasheet.
const CRC4_POLYNOMIAL: u16 = 0x3000;

/// The seven raw 16-bit words read from PROM addresses 0 to 6.
///
/// Word 0 carries the CRC in its upper nibble, words 1 to 6 are the factory
/// calibration coefficients C1 to C6.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoefficientTable([u16; COEFFICIENT_COUNT]);

impl CoefficientTable {
    pub const fn new(words: [u16; COEFFICIENT_COUNT]) -> Self {
        Self(words)
    }

    /// Builds the table from a PROM dump, two big-endian bytes per word.
    pub fn from_be_bytes(bytes: [u8; COEFFICIENT_COUNT * 2]) -> Self {
        let mut words = [0_u16; COEFFICIENT_COUNT];
        for (word, pair) in words.iter_mut().zip(bytes.chunks_exact(2)) {
            *word = u16::from_be_bytes([pair[0], pair[1]]);
        }
        Self(words)
    }

    pub const fn words(&self) -> &[u16; COEFFICIENT_COUNT] {
        &self.0
    }

    /// CRC nibble as programmed by the manufacturer.
    pub const fn stored_crc(&self) -> u8 {
        ((self.0[0] >> 12) & 0x000F) as u8
    }

    /// Returns a copy with the computed CRC written into the top nibble of
    /// word 0.
    pub fn with_crc(&self) -> Self {
        let mut words = self.0;
        words[0] = (words[0] & 0x0FFF) | ((crc4(self) as u16) << 12);
        Self(words)
    }
}

/// The stored CRC does not match the CRC computed over the coefficients.
///
/// Either the PROM was read over a corrupted transfer, or the device at the
/// bus address is not an uncorrupted MS5837.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChecksumError {
    pub stored: u8,
    pub computed: u8,
}

/// Calibration coefficients that passed the CRC check.
///
/// Only obtainable through [`validate`], so holding one proves the check was
/// done.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValidatedTable {
    words: [u16; COEFFICIENT_COUNT],
}

impl ValidatedTable {
    /// Pressure sensitivity SENS_T1 (C1).
    pub const fn pressure_sensitivity(&self) -> u16 {
        self.words[1]
    }

    /// Pressure offset OFF_T1 (C2).
    pub const fn pressure_offset(&self) -> u16 {
        self.words[2]
    }

    /// Temperature coefficient of pressure sensitivity TCS (C3).
    pub const fn temp_coeff_of_pressure_sensitivity(&self) -> u16 {
        self.words[3]
    }

    /// Temperature coefficient of pressure offset TCO (C4).
    pub const fn temp_coeff_of_pressure_offset(&self) -> u16 {
        self.words[4]
    }

    /// Reference temperature T_REF (C5).
    pub const fn reference_temperature(&self) -> u16 {
        self.words[5]
    }

    /// Temperature coefficient of the temperature TEMPSENS (C6).
    pub const fn temp_coeff_of_temperature(&self) -> u16 {
        self.words[6]
    }

    pub const fn words(&self) -> &[u16; COEFFICIENT_COUNT] {
        &self.words
    }
}

/// Checks the CRC-4 of the table and hands out the validated coefficients.
pub fn validate(table: CoefficientTable) -> Result<ValidatedTable, ChecksumError> {
    let stored = table.stored_crc();
    let computed = crc4(&table);
    if stored != computed {
        return Err(ChecksumError { stored, computed });
    }

    Ok(ValidatedTable { words: table.0 })
}

/// Calculates the CRC4 of the given table, as per MS5837 datasheet.
///
/// The CRC nibble of word 0 is masked out and an eighth, zero word is
/// appended before the 16 bytes are fed through the remainder register.
pub fn crc4(table: &CoefficientTable) -> u8 {
    let mut n_prom = [0_u16; COEFFICIENT_COUNT + 1];
    n_prom[..COEFFICIENT_COUNT].copy_from_slice(&table.0);
    n_prom[0] &= 0x0FFF;

    let mut n_rem: u16 = 0;
    for cnt in 0..(COEFFICIENT_COUNT + 1) * 2 {
        // choose LSB or MSB
        n_rem ^= if cnt % 2 == 1 {
            n_prom[cnt >> 1] & 0x00FF
        } else {
            n_prom[cnt >> 1] >> 8
        };

        for _bit in 0..8_u8 {
            n_rem = if (n_rem & 0x8000) != 0 {
                (n_rem << 1) ^ CRC4_POLYNOMIAL
            } else {
                n_rem << 1
            };
        }
    }

    ((n_rem >> 12) & 0x000F) as u8
}

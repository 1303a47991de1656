//! Genotype orientation configurations
//!
//! A configuration holds one bit per interaction term: 0 means the normal
//! genotype dosage goes into that term, 1 means the swapped dosage (2 - dose).
//! Full-model configurations have one bit per cell type; ct-model
//! configurations have one bit per *remaining* cell type after the model's
//! own cell type is excluded.

use std::fmt;
use std::str::FromStr;

use crate::error::{DeconError, Result};

/// Configurations are packed in a single word
const MAX_ARITY: usize = 64;

/// Fixed-length bit vector selecting genotype orientation per position
///
/// Position 0 is the first character of the string form, so
/// `"010".parse()` has bit 1 set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenotypeConfiguration {
    bits: u64,
    len: usize,
}

impl GenotypeConfiguration {
    /// All-normal orientation (0^n)
    pub fn zeros(len: usize) -> Self {
        GenotypeConfiguration { bits: 0, len }
    }

    /// All-swapped orientation (1^n)
    pub fn ones(len: usize) -> Self {
        let bits = if len == 0 { 0 } else { u64::MAX >> (MAX_ARITY - len) };
        GenotypeConfiguration { bits, len }
    }

    /// Configuration whose string form is the `len`-digit binary expansion of
    /// `value`, most significant digit first.
    fn from_value(value: u64, len: usize) -> Self {
        let mut bits = 0u64;
        for i in 0..len {
            if (value >> (len - 1 - i)) & 1 == 1 {
                bits |= 1 << i;
            }
        }
        GenotypeConfiguration { bits, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if the genotype should be swapped at `position`
    pub fn bit(&self, position: usize) -> bool {
        debug_assert!(position < self.len);
        (self.bits >> position) & 1 == 1
    }

    /// Copy with the bit at `position` inverted
    pub fn flipped(&self, position: usize) -> Self {
        debug_assert!(position < self.len);
        GenotypeConfiguration {
            bits: self.bits ^ (1 << position),
            len: self.len,
        }
    }

    /// Bitwise complement at the same length
    pub fn complement(&self) -> Self {
        GenotypeConfiguration {
            bits: !self.bits & Self::ones(self.len).bits,
            len: self.len,
        }
    }

    /// Copy with `position` deleted; the result is one bit shorter.
    ///
    /// This maps a full-model configuration to the ct-model configuration of
    /// the cell type at `position`.
    pub fn without(&self, position: usize) -> Self {
        debug_assert!(position < self.len);
        let mut out = GenotypeConfiguration {
            bits: 0,
            len: self.len - 1,
        };
        let mut j = 0;
        for i in 0..self.len {
            if i == position {
                continue;
            }
            if self.bit(i) {
                out.bits |= 1 << j;
            }
            j += 1;
        }
        out
    }
}

impl fmt::Display for GenotypeConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len {
            f.write_str(if self.bit(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for GenotypeConfiguration {
    type Err = DeconError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() > MAX_ARITY {
            return Err(DeconError::Configuration {
                reason: format!(
                    "Genotype configuration '{}' longer than {} positions",
                    s, MAX_ARITY
                ),
            });
        }
        let mut config = GenotypeConfiguration::zeros(s.len());
        for (i, c) in s.chars().enumerate() {
            match c {
                '0' => {}
                '1' => config = config.flipped(i),
                _ => {
                    return Err(DeconError::Configuration {
                        reason: format!("Genotype orientation should be 0 or 1, was: {}", c),
                    })
                }
            }
        }
        Ok(config)
    }
}

/// How the full-model configuration space is enumerated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationMode {
    /// Every orientation combination, 2^k configurations
    All,
    /// All-normal and all-swapped only
    Two,
    /// `Two` plus every single-bit deviation from either
    One,
    /// Single all-normal configuration; used with OLS where the orientation
    /// search is unnecessary
    OlsDefault,
    /// Per-cell-type reduced model: each cell type against "the rest"
    Base,
}

impl FromStr for ConfigurationMode {
    type Err = DeconError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(ConfigurationMode::All),
            "two" => Ok(ConfigurationMode::Two),
            "one" => Ok(ConfigurationMode::One),
            "ols-default" => Ok(ConfigurationMode::OlsDefault),
            "base" => Ok(ConfigurationMode::Base),
            other => Err(DeconError::Configuration {
                reason: format!(
                    "Genotype configuration mode should be 'all', 'two', 'one', \
                     'ols-default' or 'base', was: {}",
                    other
                ),
            }),
        }
    }
}

impl fmt::Display for ConfigurationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigurationMode::All => "all",
            ConfigurationMode::Two => "two",
            ConfigurationMode::One => "one",
            ConfigurationMode::OlsDefault => "ols-default",
            ConfigurationMode::Base => "base",
        };
        f.write_str(s)
    }
}

fn check_arity(n: usize) -> Result<()> {
    if n == 0 || n > MAX_ARITY {
        return Err(DeconError::Configuration {
            reason: format!("Cannot enumerate configurations for {} cell types", n),
        });
    }
    Ok(())
}

/// Power set of orientations for `len` positions, in binary-string order
/// (000, 001, 010, ...).
///
/// The count is taken in u128: at `len == MAX_ARITY` the value 2^64 does not
/// fit a u64.
fn power_set(len: usize) -> Vec<GenotypeConfiguration> {
    debug_assert!(len <= MAX_ARITY);
    (0..(1u128 << len))
        .map(|v| GenotypeConfiguration::from_value(v as u64, len))
        .collect()
}

/// Ordered full-model configurations for `n_celltypes` cell types.
///
/// `Base` mode fixes the arity at 2 regardless of the number of cell types
/// (one bit for the cell type's own interaction, one for "the rest").
pub fn full_configurations(
    n_celltypes: usize,
    mode: ConfigurationMode,
) -> Result<Vec<GenotypeConfiguration>> {
    check_arity(n_celltypes)?;
    let n = n_celltypes;
    let configs = match mode {
        ConfigurationMode::All => power_set(n),
        ConfigurationMode::Two => vec![
            GenotypeConfiguration::zeros(n),
            GenotypeConfiguration::ones(n),
        ],
        ConfigurationMode::One => {
            // 0^n, 1^n, then every single-bit deviation from each. For small n
            // some deviations coincide; the collection deduplicates them at
            // registration.
            let zeros = GenotypeConfiguration::zeros(n);
            let ones = GenotypeConfiguration::ones(n);
            let mut configs = vec![zeros, ones];
            configs.extend((0..n).map(|i| zeros.flipped(i)));
            configs.extend((0..n).map(|i| ones.flipped(i)));
            configs
        }
        ConfigurationMode::OlsDefault => vec![GenotypeConfiguration::zeros(n)],
        ConfigurationMode::Base => power_set(2),
    };
    Ok(configs)
}

/// Ordered ct-model configurations for `n_celltypes` cell types.
///
/// Ct models drop one interaction term, so the arity is k-1 (1 in `Base`
/// mode). The ct space is always the full power set except under
/// `OlsDefault`, where it degenerates to the single all-normal configuration.
pub fn ct_configurations(
    n_celltypes: usize,
    mode: ConfigurationMode,
) -> Result<Vec<GenotypeConfiguration>> {
    check_arity(n_celltypes)?;
    let configs = match mode {
        ConfigurationMode::Base => power_set(1),
        ConfigurationMode::OlsDefault => vec![GenotypeConfiguration::zeros(n_celltypes - 1)],
        _ => power_set(n_celltypes - 1),
    };
    Ok(configs)
}

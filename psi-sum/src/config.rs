//! Protocol configuration shared by both roles.

use crate::paillier::MIN_MODULUS_BITS;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default Paillier modulus size in bits.
pub const DEFAULT_MODULUS_BITS: u64 = 2048;
/// Default number of prime-pair attempts during key generation.
pub const DEFAULT_KEYGEN_ATTEMPTS: usize = 64;
/// Default domain tag for hash-to-group.
pub const DEFAULT_HASH_DOMAIN: &[u8] = b"psi-sum/hash-to-group/v1";

/// PSI-Sum protocol configuration.
///
/// Both parties must agree on `hash_domain`; the remaining fields only
/// constrain the local role.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
#[serde(try_from = "ProtocolConfigFields")]
pub struct ProtocolConfig {
    /// Size of the Paillier modulus Party2 generates.
    #[builder(default = "DEFAULT_MODULUS_BITS")]
    pub(crate) modulus_bits: u64,
    /// Smallest Paillier modulus Party1 accepts from its peer.
    #[builder(default = "self.modulus_bits.unwrap_or(DEFAULT_MODULUS_BITS)")]
    pub(crate) min_modulus_bits: u64,
    /// Largest value Party2 accepts for an input pair.
    #[builder(default = "u64::MAX")]
    pub(crate) max_value: u64,
    /// Whether a party may start with an empty input.
    #[builder(default = "true")]
    pub(crate) allow_empty_input: bool,
    /// Prime-pair attempts before key generation gives up.
    #[builder(default = "DEFAULT_KEYGEN_ATTEMPTS")]
    pub(crate) keygen_attempts: usize,
    /// Domain separation tag mixed into hash-to-group.
    #[builder(default = "DEFAULT_HASH_DOMAIN.to_vec()", setter(into))]
    pub(crate) hash_domain: Vec<u8>,
}

impl ProtocolConfig {
    /// Creates a new builder for the protocol configuration.
    pub fn builder() -> ProtocolConfigBuilder {
        ProtocolConfigBuilder::default()
    }

    /// Paillier modulus size generated by Party2.
    pub fn modulus_bits(&self) -> u64 {
        self.modulus_bits
    }

    /// Smallest modulus Party1 accepts.
    pub fn min_modulus_bits(&self) -> u64 {
        self.min_modulus_bits
    }

    /// Largest accepted per-element value.
    pub fn max_value(&self) -> u64 {
        self.max_value
    }

    /// Whether empty inputs are accepted.
    pub fn allow_empty_input(&self) -> bool {
        self.allow_empty_input
    }

    /// Key generation attempt budget.
    pub fn keygen_attempts(&self) -> usize {
        self.keygen_attempts
    }

    /// Hash-to-group domain tag.
    pub fn hash_domain(&self) -> &[u8] {
        &self.hash_domain
    }
}

impl ProtocolConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let modulus_bits = self.modulus_bits.unwrap_or(DEFAULT_MODULUS_BITS);
        if modulus_bits < MIN_MODULUS_BITS {
            return Err(format!(
                "modulus_bits must be at least {MIN_MODULUS_BITS}, got {modulus_bits}"
            ));
        }
        if modulus_bits % 2 != 0 {
            return Err(format!("modulus_bits must be even, got {modulus_bits}"));
        }
        if let Some(min) = self.min_modulus_bits {
            if min < MIN_MODULUS_BITS {
                return Err(format!(
                    "min_modulus_bits must be at least {MIN_MODULUS_BITS}, got {min}"
                ));
            }
            if min > modulus_bits {
                return Err(format!(
                    "min_modulus_bits ({min}) exceeds modulus_bits ({modulus_bits})"
                ));
            }
        }
        if self.keygen_attempts == Some(0) {
            return Err("keygen_attempts must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Wire shape of [`ProtocolConfig`]; deserialized configs pass through the
/// builder's validation.
#[derive(Deserialize)]
struct ProtocolConfigFields {
    modulus_bits: u64,
    min_modulus_bits: u64,
    max_value: u64,
    allow_empty_input: bool,
    keygen_attempts: usize,
    hash_domain: Vec<u8>,
}

impl TryFrom<ProtocolConfigFields> for ProtocolConfig {
    type Error = ProtocolConfigBuilderError;

    fn try_from(fields: ProtocolConfigFields) -> Result<Self, Self::Error> {
        ProtocolConfig::builder()
            .modulus_bits(fields.modulus_bits)
            .min_modulus_bits(fields.min_modulus_bits)
            .max_value(fields.max_value)
            .allow_empty_input(fields.allow_empty_input)
            .keygen_attempts(fields.keygen_attempts)
            .hash_domain(fields.hash_domain)
            .build()
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            modulus_bits: DEFAULT_MODULUS_BITS,
            min_modulus_bits: DEFAULT_MODULUS_BITS,
            max_value: u64::MAX,
            allow_empty_input: true,
            keygen_attempts: DEFAULT_KEYGEN_ATTEMPTS,
            hash_domain: DEFAULT_HASH_DOMAIN.to_vec(),
        }
    }
}

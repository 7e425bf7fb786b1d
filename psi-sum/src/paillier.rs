//! Paillier additively homomorphic encryption.
//!
//! Uses the `g = n + 1` variant, so that `Enc(m; r) = (1 + m·n) · rⁿ mod n²`
//! and decryption is `L(c^λ mod n²) · μ mod n` with `L(x) = (x − 1) / n`.

use crate::error::{PsiSumError, Result};
use crypto_bigint::BoxedUint;
use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// Smallest modulus size accepted anywhere in the crate.
pub const MIN_MODULUS_BITS: u64 = 256;

/// A Paillier ciphertext, an element of `Z*_{n²}`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<u8>", try_from = "Vec<u8>")]
pub struct Ciphertext(BigUint);

impl Ciphertext {
    /// Canonical encoding: minimal big-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }

    /// Decode a canonical encoding.
    ///
    /// This only checks the encoding; use
    /// [`PublicKey::validate_ciphertext`] to check membership in `Z*_{n²}`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.first() {
            None => Err(PsiSumError::malformed("empty ciphertext")),
            Some(0) => Err(PsiSumError::malformed("ciphertext has a leading zero byte")),
            Some(_) => Ok(Ciphertext(BigUint::from_bytes_be(bytes))),
        }
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext({} bits)", self.0.bits())
    }
}

impl From<Ciphertext> for Vec<u8> {
    fn from(ciphertext: Ciphertext) -> Self {
        ciphertext.to_bytes()
    }
}

impl TryFrom<Vec<u8>> for Ciphertext {
    type Error = PsiSumError;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Ciphertext::from_bytes(&bytes)
    }
}

/// A Paillier public key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<u8>", try_from = "Vec<u8>")]
pub struct PublicKey {
    n: BigUint,
    n_squared: BigUint,
}

impl PublicKey {
    fn from_modulus(n: BigUint) -> Self {
        let n_squared = &n * &n;
        Self { n, n_squared }
    }

    /// The modulus `n`.
    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    /// Size of the modulus in bits.
    pub fn modulus_bits(&self) -> u64 {
        self.n.bits()
    }

    /// Canonical encoding of the modulus.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.n.to_bytes_be()
    }

    /// Decode a modulus received from a peer.
    ///
    /// # Errors
    /// Returns `PsiSumError::MalformedMessage` for an empty, non-canonical,
    /// even, or undersized modulus.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.first() {
            None => return Err(PsiSumError::malformed("empty modulus")),
            Some(0) => return Err(PsiSumError::malformed("modulus has a leading zero byte")),
            Some(_) => {}
        }
        let n = BigUint::from_bytes_be(bytes);
        if n.is_even() {
            return Err(PsiSumError::malformed("modulus must be odd"));
        }
        if n.bits() < MIN_MODULUS_BITS {
            return Err(PsiSumError::malformed(format!(
                "modulus has {} bits, need at least {MIN_MODULUS_BITS}",
                n.bits()
            )));
        }
        Ok(Self::from_modulus(n))
    }

    /// Encrypt `plaintext` with fresh randomness.
    ///
    /// # Errors
    /// Returns `PsiSumError::PlaintextOutOfRange` unless `plaintext < n`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        plaintext: &BigUint,
        rng: &mut R,
    ) -> Result<Ciphertext> {
        if plaintext >= &self.n {
            return Err(PsiSumError::PlaintextOutOfRange);
        }
        let encoded = (BigUint::one() + plaintext * &self.n) % &self.n_squared;
        Ok(Ciphertext((encoded * self.blinding_factor(rng)) % &self.n_squared))
    }

    /// Homomorphic addition: the result decrypts to `m1 + m2 mod n`.
    pub fn add(&self, left: &Ciphertext, right: &Ciphertext) -> Ciphertext {
        Ciphertext((&left.0 * &right.0) % &self.n_squared)
    }

    /// Fold ciphertexts with [`PublicKey::add`] in order.
    ///
    /// An empty fold yields a fresh encryption of zero.
    pub fn sum<'a, I, R>(&self, ciphertexts: I, rng: &mut R) -> Result<Ciphertext>
    where
        I: IntoIterator<Item = &'a Ciphertext>,
        R: RngCore + CryptoRng,
    {
        let mut iter = ciphertexts.into_iter();
        match iter.next() {
            None => self.encrypt(&BigUint::zero(), rng),
            Some(first) => Ok(iter.fold(first.clone(), |acc, next| self.add(&acc, next))),
        }
    }

    /// Re-randomize a ciphertext without changing its plaintext.
    pub fn refresh<R: RngCore + CryptoRng>(&self, ciphertext: &Ciphertext, rng: &mut R) -> Ciphertext {
        Ciphertext((&ciphertext.0 * self.blinding_factor(rng)) % &self.n_squared)
    }

    /// Check that `ciphertext` lies in `Z*_{n²}`.
    ///
    /// # Errors
    /// Returns `PsiSumError::DecryptionError` otherwise.
    pub fn validate_ciphertext(&self, ciphertext: &Ciphertext) -> Result<()> {
        let c = &ciphertext.0;
        if c.is_zero() || c >= &self.n_squared {
            return Err(PsiSumError::DecryptionError(
                "ciphertext outside the ciphertext space".to_string(),
            ));
        }
        if !c.gcd(&self.n).is_one() {
            return Err(PsiSumError::DecryptionError(
                "ciphertext not coprime to the modulus".to_string(),
            ));
        }
        Ok(())
    }

    /// `rⁿ mod n²` for a uniform `r ∈ Z*_n`.
    fn blinding_factor<R: RngCore + CryptoRng>(&self, rng: &mut R) -> BigUint {
        let r = loop {
            let r = rng.gen_biguint_range(&BigUint::one(), &self.n);
            if r.gcd(&self.n).is_one() {
                break r;
            }
        };
        r.modpow(&self.n, &self.n_squared)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.n.bits())
    }
}

impl From<PublicKey> for Vec<u8> {
    fn from(key: PublicKey) -> Self {
        key.to_bytes()
    }
}

impl TryFrom<Vec<u8>> for PublicKey {
    type Error = PsiSumError;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        PublicKey::from_bytes(&bytes)
    }
}

/// A Paillier secret key. Never serialized.
#[derive(Clone)]
pub struct SecretKey {
    public_key: PublicKey,
    lambda: BigUint,
    mu: BigUint,
}

impl SecretKey {
    /// The matching public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Decrypt a ciphertext.
    ///
    /// # Errors
    /// Returns `PsiSumError::DecryptionError` if `ciphertext` is not in
    /// `Z*_{n²}` for this key.
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<BigUint> {
        self.public_key.validate_ciphertext(ciphertext)?;
        let n = &self.public_key.n;
        let u = ciphertext.0.modpow(&self.lambda, &self.public_key.n_squared);
        let l = (u - 1u32) / n;
        Ok((l * &self.mu) % n)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A Paillier key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
}

impl KeyPair {
    /// Generate a key pair with a modulus of exactly `modulus_bits` bits.
    ///
    /// # Errors
    /// Returns `PsiSumError::KeyGenError` for an unsupported size or when
    /// `max_attempts` prime pairs all fail the suitability checks.
    pub fn generate<R: RngCore + CryptoRng>(
        modulus_bits: u64,
        max_attempts: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if modulus_bits < MIN_MODULUS_BITS || modulus_bits % 2 != 0 {
            return Err(PsiSumError::KeyGenError(format!(
                "unsupported modulus size {modulus_bits}"
            )));
        }
        let prime_bits = modulus_bits / 2;

        for attempt in 1..=max_attempts {
            let p = generate_prime(prime_bits, rng)?;
            let q = generate_prime(prime_bits, rng)?;
            if p == q {
                trace!(attempt, "rejected equal primes");
                continue;
            }

            let p_minus_one = &p - 1u32;
            let q_minus_one = &q - 1u32;
            let n = &p * &q;
            if n.bits() != modulus_bits {
                trace!(attempt, "rejected prime pair: modulus one bit short");
                continue;
            }
            if !n.gcd(&(&p_minus_one * &q_minus_one)).is_one() {
                trace!(attempt, "rejected prime pair: gcd(n, phi) != 1");
                continue;
            }

            let lambda = p_minus_one.lcm(&q_minus_one);
            let Some(mu) = lambda.modinv(&n) else {
                trace!(attempt, "rejected prime pair: lambda not invertible");
                continue;
            };

            debug!(attempt, modulus_bits, "generated Paillier key pair");
            return Ok(KeyPair {
                secret_key: SecretKey {
                    public_key: PublicKey::from_modulus(n),
                    lambda,
                    mu,
                },
            });
        }

        Err(PsiSumError::KeyGenError(format!(
            "no suitable primes after {max_attempts} attempts"
        )))
    }

    /// The public half.
    pub fn public_key(&self) -> &PublicKey {
        &self.secret_key.public_key
    }

    /// The secret half.
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Split off the secret key, which also carries the public key.
    pub fn into_secret_key(self) -> SecretKey {
        self.secret_key
    }
}

/// Sample a probable prime of exactly `bits` bits.
fn generate_prime<R: RngCore + CryptoRng>(bits: u64, rng: &mut R) -> Result<BigUint> {
    let bit_length = u32::try_from(bits)
        .map_err(|_| PsiSumError::KeyGenError(format!("prime size {bits} too large")))?;
    let prime: BoxedUint = crypto_primes::generate_prime_with_rng(rng, bit_length);
    Ok(BigUint::from_bytes_be(&prime.to_be_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use rstest::rstest;

    const TEST_BITS: u64 = 512;

    fn keypair(seed: u64) -> (KeyPair, ChaCha20Rng) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let keys = KeyPair::generate(TEST_BITS, 64, &mut rng).unwrap();
        (keys, rng)
    }

    #[test]
    fn test_keygen_modulus_size() {
        let (keys, _) = keypair(1);
        assert_eq!(keys.public_key().modulus_bits(), TEST_BITS);
        assert!(keys.public_key().modulus().is_odd());
    }

    #[rstest]
    #[case(128)]
    #[case(511)]
    fn test_keygen_rejects_bad_size(#[case] bits: u64) {
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let err = KeyPair::generate(bits, 4, &mut rng).unwrap_err();
        assert!(matches!(err, PsiSumError::KeyGenError(_)));
    }

    #[test]
    fn test_keygen_zero_attempts() {
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let err = KeyPair::generate(TEST_BITS, 0, &mut rng).unwrap_err();
        assert!(matches!(err, PsiSumError::KeyGenError(_)));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(100, 300)]
    #[case(u64::MAX, 1)]
    #[case(123_456_789, 987_654_321)]
    fn test_homomorphic_add(#[case] x: u64, #[case] y: u64) {
        let (keys, mut rng) = keypair(2);
        let pk = keys.public_key();
        let cx = pk.encrypt(&BigUint::from(x), &mut rng).unwrap();
        let cy = pk.encrypt(&BigUint::from(y), &mut rng).unwrap();
        let sum = keys.secret_key().decrypt(&pk.add(&cx, &cy)).unwrap();
        assert_eq!(sum, BigUint::from(x) + BigUint::from(y));
    }

    #[test]
    fn test_add_wraps_modulo_n() {
        let (keys, mut rng) = keypair(3);
        let pk = keys.public_key();
        let n_minus_one = pk.modulus() - 1u32;
        let a = pk.encrypt(&n_minus_one, &mut rng).unwrap();
        let b = pk.encrypt(&BigUint::from(2u8), &mut rng).unwrap();
        assert_eq!(keys.secret_key().decrypt(&pk.add(&a, &b)).unwrap(), BigUint::one());
    }

    #[test]
    fn test_encrypt_is_randomized() {
        let (keys, mut rng) = keypair(4);
        let pk = keys.public_key();
        let m = BigUint::from(42u8);
        let a = pk.encrypt(&m, &mut rng).unwrap();
        let b = pk.encrypt(&m, &mut rng).unwrap();
        assert_ne!(a, b);
        assert_eq!(keys.secret_key().decrypt(&a).unwrap(), m);
        assert_eq!(keys.secret_key().decrypt(&b).unwrap(), m);
    }

    #[test]
    fn test_encrypt_out_of_range() {
        let (keys, mut rng) = keypair(5);
        let pk = keys.public_key();
        let n = pk.modulus().clone();
        assert_eq!(pk.encrypt(&n, &mut rng), Err(PsiSumError::PlaintextOutOfRange));
        assert_eq!(
            pk.encrypt(&(n + 1u32), &mut rng),
            Err(PsiSumError::PlaintextOutOfRange)
        );
    }

    #[test]
    fn test_sum_fold() {
        let (keys, mut rng) = keypair(6);
        let pk = keys.public_key();
        let ciphertexts: Vec<_> = [10u32, 20, 30, 40]
            .iter()
            .map(|v| pk.encrypt(&BigUint::from(*v), &mut rng).unwrap())
            .collect();
        let sum = pk.sum(&ciphertexts, &mut rng).unwrap();
        assert_eq!(keys.secret_key().decrypt(&sum).unwrap(), BigUint::from(100u32));
    }

    #[test]
    fn test_sum_empty_is_zero() {
        let (keys, mut rng) = keypair(7);
        let pk = keys.public_key();
        let sum = pk.sum(std::iter::empty(), &mut rng).unwrap();
        assert!(keys.secret_key().decrypt(&sum).unwrap().is_zero());
    }

    #[test]
    fn test_refresh_preserves_plaintext() {
        let (keys, mut rng) = keypair(8);
        let pk = keys.public_key();
        let c = pk.encrypt(&BigUint::from(400u32), &mut rng).unwrap();
        let refreshed = pk.refresh(&c, &mut rng);
        assert_ne!(refreshed, c);
        assert_eq!(
            keys.secret_key().decrypt(&refreshed).unwrap(),
            keys.secret_key().decrypt(&c).unwrap()
        );
    }

    #[test]
    fn test_decrypt_rejects_invalid() {
        let (keys, _) = keypair(9);
        let pk = keys.public_key();
        let sk = keys.secret_key();

        let zero = Ciphertext(BigUint::zero());
        let too_big = Ciphertext(pk.n_squared.clone());
        let not_coprime = Ciphertext(pk.modulus().clone());
        for c in [zero, too_big, not_coprime] {
            assert!(matches!(sk.decrypt(&c), Err(PsiSumError::DecryptionError(_))));
        }
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let (keys, mut rng) = keypair(10);
        let (other, _) = keypair(11);
        let c = keys
            .public_key()
            .encrypt(&BigUint::from(5u8), &mut rng)
            .unwrap();
        // Either rejected as out of range or decrypted to garbage.
        match other.secret_key().decrypt(&c) {
            Ok(m) => assert_ne!(m, BigUint::from(5u8)),
            Err(e) => assert!(matches!(e, PsiSumError::DecryptionError(_))),
        }
    }

    #[test]
    fn test_public_key_encoding() {
        let (keys, _) = keypair(12);
        let pk = keys.public_key();
        let decoded = PublicKey::from_bytes(&pk.to_bytes()).unwrap();
        assert_eq!(&decoded, pk);

        assert!(PublicKey::from_bytes(&[]).is_err());
        let mut leading_zero = vec![0u8];
        leading_zero.extend(pk.to_bytes());
        assert!(PublicKey::from_bytes(&leading_zero).is_err());
        let mut even = pk.to_bytes();
        *even.last_mut().unwrap() &= 0xfe;
        assert!(PublicKey::from_bytes(&even).is_err());
        assert!(PublicKey::from_bytes(&[0xff; 16]).is_err());
    }

    #[test]
    fn test_ciphertext_encoding() {
        let (keys, mut rng) = keypair(13);
        let c = keys
            .public_key()
            .encrypt(&BigUint::from(9u8), &mut rng)
            .unwrap();
        assert_eq!(Ciphertext::from_bytes(&c.to_bytes()).unwrap(), c);
        assert!(Ciphertext::from_bytes(&[]).is_err());
        assert!(Ciphertext::from_bytes(&[0, 1]).is_err());
    }

    #[rstest]
    #[case(128)]
    #[case(256)]
    #[case(257)]
    fn test_generate_prime_size(#[case] bits: u64) {
        let mut rng = ChaCha20Rng::seed_from_u64(bits);
        let p = generate_prime(bits, &mut rng).unwrap();
        assert_eq!(p.bits(), bits);
        assert!(p.is_odd());
        // Fermat check with base 2.
        let two = BigUint::from(2u8);
        assert!(two.modpow(&(&p - 1u32), &p).is_one());
    }

    #[test]
    fn test_keygen_primes_distinct_per_seed() {
        let (a, _) = keypair(20);
        let (b, _) = keypair(21);
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let (keys, _) = keypair(14);
        assert_eq!(format!("{:?}", keys.secret_key()), "SecretKey(<redacted>)");
    }
}

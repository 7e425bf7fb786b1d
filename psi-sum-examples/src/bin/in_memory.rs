//! In-memory example of a PSI-Sum run.
//!
//! Both roles live in one process. Every message is encoded to bytes and
//! decoded again on the other side, as a transport would do it.
//!
//! Run with:
//! ```bash
//! RUST_LOG=debug cargo run --bin in_memory
//! ```

use num_bigint::BigUint;
use psi_sum::{Party1Session, Party2Session, ProtocolConfig, ProtocolMessage};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Encode, log and decode a message as if it crossed the wire.
fn relay(from: &str, message: ProtocolMessage) -> psi_sum::Result<ProtocolMessage> {
    let bytes = message.to_bytes()?;
    info!(
        from,
        kind = %message.kind(),
        size = bytes.len(),
        prefix = %hex::encode(&bytes[..bytes.len().min(16)]),
        "relaying message"
    );
    ProtocolMessage::from_bytes(&bytes)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== PSI-Sum In-Memory Example ===\n");

    // Party1: identifiers only
    let identifiers: Vec<Vec<u8>> = vec![
        b"alice@example.com".to_vec(),
        b"bob@example.com".to_vec(),
        b"carol@example.com".to_vec(),
        b"dave@example.com".to_vec(),
    ];

    // Party2: identifiers with values
    let pairs: Vec<(Vec<u8>, u64)> = vec![
        (b"bob@example.com".to_vec(), 120),
        (b"erin@example.com".to_vec(), 75),
        (b"dave@example.com".to_vec(), 310),
        (b"frank@example.com".to_vec(), 42),
    ];

    println!("Party1 holds {} identifiers", identifiers.len());
    println!("Party2 holds {} pairs", pairs.len());

    // Plaintext answer, for checking the protocol output only.
    let common: Vec<u64> = pairs
        .iter()
        .filter(|(id, _)| identifiers.contains(id))
        .map(|(_, value)| *value)
        .collect();
    let expected_sum: BigUint = common.iter().map(|v| BigUint::from(*v)).sum();

    let config = ProtocolConfig::default();
    println!(
        "Generating a {}-bit Paillier key, this may take a moment...",
        config.modulus_bits()
    );

    let mut rng = OsRng;
    let mut party1 = Party1Session::new(config.clone(), identifiers)?;
    let mut party2 = Party2Session::new(config, pairs)?;

    let setup = relay("party2", party2.start(&mut rng)?)?;
    let round1 = party1
        .handle(setup, &mut rng)?
        .ok_or("party1 produced no round 1 message")?;
    let round2 = party2
        .handle(relay("party1", round1)?, &mut rng)?
        .ok_or("party2 produced no round 2 message")?;
    let round3 = party1
        .handle(relay("party2", round2)?, &mut rng)?
        .ok_or("party1 produced no round 3 message")?;
    party2.handle(relay("party1", round3)?, &mut rng)?;

    let output = party2.output().ok_or("party2 has no output")?;

    println!("\n=== Results ===");
    println!("Party1 learned cardinality: {:?}", party1.cardinality());
    println!("Party2 learned cardinality: {}", output.cardinality);
    println!("Party2 learned sum:         {}", output.sum);
    assert_eq!(output.cardinality, common.len() as u64);
    assert_eq!(output.sum, expected_sum);

    // Larger random run
    println!("\n=== Large Random Sets Example ===\n");

    let mut identifiers = Vec::new();
    let mut pairs = Vec::new();
    let mut expected = BigUint::from(0u32);
    for i in 0..100 {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        identifiers.push(bytes.to_vec());
        rng.fill_bytes(&mut bytes);
        pairs.push((bytes.to_vec(), i));
    }
    for i in 0..10 {
        let mut common = [0u8; 32];
        rng.fill_bytes(&mut common);
        identifiers.push(common.to_vec());
        pairs.push((common.to_vec(), 1_000 + i));
        expected += BigUint::from(1_000 + i);
    }

    let config = ProtocolConfig::default();
    let mut party1 = Party1Session::new(config.clone(), identifiers)?;
    let mut party2 = Party2Session::new(config, pairs)?;

    let mut inbound_for_party1 = Some(relay("party2", party2.start(&mut rng)?)?);
    while let Some(message) = inbound_for_party1.take() {
        let Some(reply) = party1.handle(message, &mut rng)? else {
            break;
        };
        if let Some(answer) = party2.handle(relay("party1", reply)?, &mut rng)? {
            inbound_for_party1 = Some(relay("party2", answer)?);
        }
    }

    let output = party2.output().ok_or("party2 has no output")?;
    println!(
        "Intersection size: {} (expected: 10), sum: {} (expected: {expected})",
        output.cardinality, output.sum
    );
    assert_eq!(output.sum, expected);

    Ok(())
}

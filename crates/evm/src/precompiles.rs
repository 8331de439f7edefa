//! Precompiled contracts at addresses `0x01..0x09`, invoked via `CALL`-family dispatch rather
//! than the bytecode interpreter loop.

use alloy_primitives::{keccak256, Address, Bytes, U256};
use execore_chainspec::ForkId;

/// An error produced while running a precompile.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PrecompileError {
    /// The gas supplied was insufficient for the computed cost.
    #[error("out of gas")]
    OutOfGas,
    /// This precompile address has no implementation in this workspace (BN254 pairing curve
    /// operations: no pairing-curve crate is part of the dependency stack).
    #[error("precompile {address} is unsupported")]
    Unsupported {
        /// The unsupported address.
        address: Address,
    },
}

/// A precompile's result: consumed gas and output bytes (empty on failure-but-gas-charged).
pub type PrecompileResult = Result<(u64, Bytes), PrecompileError>;

const ECRECOVER_COST: u64 = 3000;
const SHA256_BASE_COST: u64 = 60;
const SHA256_WORD_COST: u64 = 12;
const RIPEMD160_BASE_COST: u64 = 600;
const RIPEMD160_WORD_COST: u64 = 120;
const IDENTITY_BASE_COST: u64 = 15;
const IDENTITY_WORD_COST: u64 = 3;

fn word_count(len: usize) -> u64 {
    ((len + 31) / 32) as u64
}

/// Dispatches to the precompile at `address` if one is defined, running it against `input` with
/// `gas_limit` available. Returns `None` if `address` is not a precompile.
pub fn run(address: Address, input: &[u8], gas_limit: u64, fork: ForkId) -> Option<PrecompileResult> {
    let last_byte = *address.as_slice().last()?;
    if address.as_slice()[..19].iter().any(|&b| b != 0) {
        return None;
    }
    Some(match last_byte {
        0x01 => ec_recover(input, gas_limit),
        0x02 => sha256(input, gas_limit),
        0x03 => ripemd160(input, gas_limit),
        0x04 => identity(input, gas_limit),
        0x05 => mod_exp(input, gas_limit, fork),
        0x06..=0x09 => Err(PrecompileError::Unsupported { address }),
        _ => return None,
    })
}

fn ec_recover(input: &[u8], gas_limit: u64) -> PrecompileResult {
    if gas_limit < ECRECOVER_COST {
        return Err(PrecompileError::OutOfGas);
    }
    let mut buf = [0u8; 128];
    let n = input.len().min(128);
    buf[..n].copy_from_slice(&input[..n]);

    let hash = &buf[0..32];
    let v = U256::from_be_slice(&buf[32..64]);
    let r = &buf[64..96];
    let s = &buf[96..128];

    if v != U256::from(27_u64) && v != U256::from(28_u64) {
        return Ok((ECRECOVER_COST, Bytes::new()));
    }
    let recovery_id = (v.to::<u64>() - 27) as u8;

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(r);
    sig_bytes[32..].copy_from_slice(s);

    let Ok(signature) = k256::ecdsa::Signature::from_slice(&sig_bytes) else {
        return Ok((ECRECOVER_COST, Bytes::new()));
    };
    let Ok(recovery_id) = k256::ecdsa::RecoveryId::from_byte(recovery_id) else {
        return Ok((ECRECOVER_COST, Bytes::new()));
    };
    let Ok(verifying_key) =
        k256::ecdsa::VerifyingKey::recover_from_prehash(hash, &signature, recovery_id)
    else {
        return Ok((ECRECOVER_COST, Bytes::new()));
    };

    let encoded = verifying_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut output = vec![0u8; 32];
    output[12..].copy_from_slice(&hash[12..]);
    Ok((ECRECOVER_COST, Bytes::from(output)))
}

fn sha256(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = SHA256_BASE_COST + SHA256_WORD_COST * word_count(input.len());
    if gas_limit < cost {
        return Err(PrecompileError::OutOfGas);
    }
    use sha2::Digest;
    let digest = sha2::Sha256::digest(input);
    Ok((cost, Bytes::copy_from_slice(&digest)))
}

fn ripemd160(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = RIPEMD160_BASE_COST + RIPEMD160_WORD_COST * word_count(input.len());
    if gas_limit < cost {
        return Err(PrecompileError::OutOfGas);
    }
    use ripemd::Digest;
    let digest = ripemd::Ripemd160::digest(input);
    let mut output = vec![0u8; 32];
    output[12..].copy_from_slice(&digest);
    Ok((cost, Bytes::from(output)))
}

fn identity(input: &[u8], gas_limit: u64) -> PrecompileResult {
    let cost = IDENTITY_BASE_COST + IDENTITY_WORD_COST * word_count(input.len());
    if gas_limit < cost {
        return Err(PrecompileError::OutOfGas);
    }
    Ok((cost, Bytes::copy_from_slice(input)))
}

/// The base/modulus multiplication-complexity function from EIP-198 (Byzantium through Istanbul).
fn mult_complexity_legacy(x: u128) -> u128 {
    let squared = x.saturating_mul(x);
    if x <= 64 {
        squared
    } else if x <= 1024 {
        squared / 4 + 96 * x - 3072
    } else {
        squared / 16 + 480 * x - 199680
    }
}

/// The multiplication-complexity function from EIP-2565 (Berlin+): words of the longer operand,
/// squared.
fn mult_complexity_eip2565(x: u128) -> u128 {
    let words = (x + 7) / 8;
    words.saturating_mul(words)
}

fn mod_exp(input: &[u8], gas_limit: u64, fork: ForkId) -> PrecompileResult {
    let read_len = |offset: usize| -> usize {
        let mut buf = [0u8; 32];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = input.get(offset + i).copied().unwrap_or(0);
        }
        U256::from_be_bytes(buf).try_into().unwrap_or(usize::MAX)
    };
    let base_len = read_len(0);
    let exp_len = read_len(32);
    let mod_len = read_len(64);

    // Bit length of EXPONENT: for exp_len <= 32, the bit length of the value itself; otherwise
    // 8 * (exp_len - 32) plus the bit length of its leading 32 bytes (EIP-198's "head" rule).
    let exponent_bit_length = {
        let head_len = exp_len.min(32);
        let mut buf = [0u8; 32];
        for (i, b) in buf[32 - head_len..].iter_mut().enumerate() {
            *b = input.get(96 + base_len + i).copied().unwrap_or(0);
        }
        let head_bits = (256 - U256::from_be_bytes(buf).leading_zeros()) as u64;
        if exp_len > 32 {
            8 * (exp_len as u64 - 32) + head_bits
        } else {
            head_bits
        }
    };
    let adjusted_exponent_length = (exponent_bit_length.saturating_sub(1) as u128).max(1);

    let max_len = base_len.max(mod_len) as u128;
    let is_eip2565 = fork as u8 >= ForkId::Berlin as u8;
    let (mult_complexity, divisor) = if is_eip2565 {
        (mult_complexity_eip2565(max_len), 3u128)
    } else {
        (mult_complexity_legacy(max_len), 20u128)
    };
    let cost_raw = mult_complexity.saturating_mul(adjusted_exponent_length) / divisor;
    let cost = if is_eip2565 { cost_raw.max(200) } else { cost_raw }.min(u64::MAX as u128) as u64;
    if gas_limit < cost {
        return Err(PrecompileError::OutOfGas);
    }
    if base_len == 0 && mod_len == 0 {
        return Ok((cost, Bytes::new()));
    }

    let data_start = 96;
    let read_bytes = |offset: usize, len: usize| -> Vec<u8> {
        let mut buf = vec![0u8; len];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = input.get(data_start + offset + i).copied().unwrap_or(0);
        }
        buf
    };
    let base = read_bytes(0, base_len);
    let exponent = read_bytes(base_len, exp_len);
    let modulus = read_bytes(base_len + exp_len, mod_len);

    let result = mod_pow(&base, &exponent, &modulus);
    let mut output = vec![0u8; mod_len];
    let start = mod_len.saturating_sub(result.len());
    output[start..].copy_from_slice(&result[result.len().saturating_sub(mod_len)..]);
    Ok((cost, Bytes::from(output)))
}

/// Big-endian byte-string modular exponentiation via repeated squaring, implemented directly
/// rather than pulled from a bignum crate (none is part of this workspace's stack).
fn mod_pow(base: &[u8], exponent: &[u8], modulus: &[u8]) -> Vec<u8> {
    if modulus.iter().all(|&b| b == 0) {
        return vec![0u8; modulus.len()];
    }
    let mut result = vec![1u8];
    let mut base = bytes_mod(base, modulus);
    for byte in exponent {
        for bit in (0..8).rev() {
            result = bytes_mod(&bytes_mul(&result, &result), modulus);
            if (byte >> bit) & 1 == 1 {
                result = bytes_mod(&bytes_mul(&result, &base), modulus);
            }
        }
        base = bytes_mod(&bytes_mul(&base, &base), modulus);
    }
    result
}

/// Big-endian addition, arbitrary length, producing a result one byte longer than the wider
/// operand to hold a possible carry-out.
pub(crate) fn bytes_add(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    let mut result = vec![0u8; len + 1];
    let mut carry = 0u16;
    for i in 0..len {
        let av = a.get(a.len().wrapping_sub(1 + i)).copied().unwrap_or(0) as u16;
        let bv = b.get(b.len().wrapping_sub(1 + i)).copied().unwrap_or(0) as u16;
        let sum = av + bv + carry;
        result[len - i] = (sum & 0xff) as u8;
        carry = sum >> 8;
    }
    result[0] = carry as u8;
    result
}

/// Big-endian schoolbook multiplication, arbitrary length (EIP-198 places no 32-byte bound on
/// `MODEXP`'s operands).
pub(crate) fn bytes_mul(a: &[u8], b: &[u8]) -> Vec<u8> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    // `acc[pos]` accumulates the coefficient of `256^pos`, least-significant first.
    let mut acc = vec![0u32; a.len() + b.len()];
    for (i, &ai) in a.iter().rev().enumerate() {
        for (j, &bj) in b.iter().rev().enumerate() {
            acc[i + j] += ai as u32 * bj as u32;
        }
    }
    let mut carry = 0u64;
    let mut little_endian = vec![0u8; acc.len()];
    for (pos, &limb) in acc.iter().enumerate() {
        let v = limb as u64 + carry;
        little_endian[pos] = (v & 0xff) as u8;
        carry = v >> 8;
    }
    while carry > 0 {
        little_endian.push((carry & 0xff) as u8);
        carry >>= 8;
    }
    little_endian.reverse();
    little_endian
}

/// Strips leading zero bytes, leaving at least one byte.
fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let n = bytes.iter().take_while(|&&b| b == 0).count();
    if n == bytes.len() {
        &bytes[bytes.len() - 1..]
    } else {
        &bytes[n..]
    }
}

fn bytes_ge(a: &[u8], b: &[u8]) -> bool {
    let a = trim_leading_zeros(a);
    let b = trim_leading_zeros(b);
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Equal => a >= b,
        other => other == std::cmp::Ordering::Greater,
    }
}

/// Subtracts `b` from `a` (big-endian, equal length), assuming `a >= b`.
fn bytes_sub(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    let mut result = vec![0u8; a.len()];
    let mut borrow = 0i16;
    for i in (0..a.len()).rev() {
        let mut diff = a[i] as i16 - b[i] as i16 - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        result[i] = diff as u8;
    }
    result
}

/// Big-endian modular reduction by bringing down one byte at a time and subtracting the modulus
/// (shifted up by repeated doubling) until the running remainder is smaller than it.
pub(crate) fn bytes_mod(value: &[u8], modulus: &[u8]) -> Vec<u8> {
    if modulus.iter().all(|&b| b == 0) {
        return vec![0u8; modulus.len()];
    }
    let modulus_trimmed = trim_leading_zeros(modulus).to_vec();
    let mut remainder: Vec<u8> = vec![0];
    for &byte in value {
        remainder = trim_leading_zeros(&remainder).to_vec();
        remainder.push(byte);
        while bytes_ge(&remainder, &modulus_trimmed) {
            let aligned_len = remainder.len();
            let mut aligned_modulus = vec![0u8; aligned_len];
            let start = aligned_len - modulus_trimmed.len();
            aligned_modulus[start..].copy_from_slice(&modulus_trimmed);
            remainder = bytes_sub(&remainder, &aligned_modulus);
        }
    }
    trim_leading_zeros(&remainder).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn identity_echoes_input_and_charges_per_word() {
        let (cost, output) = identity(&[1, 2, 3], 1000).unwrap();
        assert_eq!(output.as_ref(), &[1, 2, 3]);
        assert_eq!(cost, IDENTITY_BASE_COST + IDENTITY_WORD_COST);
    }

    #[test]
    fn sha256_matches_known_digest() {
        let (_, output) = sha256(b"abc", 1_000_000).unwrap();
        let expected: [u8; 32] = [
            0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
            0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
            0xf2, 0x00, 0x15, 0xad,
        ];
        assert_eq!(output.as_ref(), &expected);
    }

    #[test]
    fn bn254_addresses_are_unsupported() {
        let address = address!("0000000000000000000000000000000000000006");
        let result = run(address, &[], 1_000_000, ForkId::Byzantium).unwrap();
        assert!(matches!(result, Err(PrecompileError::Unsupported { .. })));
    }

    #[test]
    fn unknown_address_returns_none() {
        let address = address!("00000000000000000000000000000000000099");
        assert!(run(address, &[], 1_000_000, ForkId::Byzantium).is_none());
    }

    #[test]
    fn mod_exp_small_case() {
        // 3^2 mod 5 == 4; lengths 1,1,1 in the header, values in the body.
        let mut input = vec![0u8; 96];
        input[31] = 1;
        input[63] = 1;
        input[95] = 1;
        input.push(3);
        input.push(2);
        input.push(5);
        let (_, output) = mod_exp(&input, 1_000_000, ForkId::Byzantium).unwrap();
        assert_eq!(output.as_ref(), &[4]);
    }

    #[test]
    fn mod_exp_berlin_charges_less_than_byzantium() {
        let mut input = vec![0u8; 96];
        input[31] = 1;
        input[63] = 1;
        input[95] = 1;
        input.push(3);
        input.push(2);
        input.push(5);
        let (byzantium_cost, _) = mod_exp(&input, 1_000_000, ForkId::Byzantium).unwrap();
        let (berlin_cost, _) = mod_exp(&input, 1_000_000, ForkId::Berlin).unwrap();
        assert!(berlin_cost <= byzantium_cost);
        assert!(berlin_cost >= 200);
    }

    #[test]
    fn mod_exp_zero_exponent_costs_minimum_iteration() {
        let mut input = vec![0u8; 96];
        input[31] = 1;
        input[63] = 1;
        input[95] = 1;
        input.push(7);
        input.push(0);
        input.push(5);
        let (_, output) = mod_exp(&input, 1_000_000, ForkId::Berlin).unwrap();
        assert_eq!(output.as_ref(), &[1]);
    }
}

use alloy::primitives::B256;
use ark_bn254::Fr;
use ark_ff::{
    BigInteger,
    PrimeField,
};
use light_poseidon::{
    Poseidon,
    PoseidonHasher,
};

/// Convert B256 to BN254 field element.
pub fn b256_to_fr(value: B256) -> Fr {
    Fr::from_be_bytes_mod_order(value.as_ref())
}

/// Convert BN254 field element to B256.
pub fn fr_to_b256(value: Fr) -> B256 {
    let big_int = value.into_bigint();
    let bytes = big_int.to_bytes_be();
    B256::left_padding_from(&bytes)
}

/// Reduce an arbitrary 32-byte word into the BN254 scalar field.
pub fn reduce_to_field(value: B256) -> B256 {
    fr_to_b256(b256_to_fr(value))
}

/// Poseidon hash with 1 input.
/// Used for: nullifier_hash = poseidon1(nullifier)
pub fn poseidon1(a: B256) -> B256 {
    let mut hasher =
        Poseidon::<Fr>::new_circom(1).expect("Failed to create Poseidon hasher");
    let input = b256_to_fr(a);
    let result = hasher
        .hash(&[input])
        .expect("Failed to compute Poseidon hash");
    fr_to_b256(result)
}

/// Poseidon hash with 2 inputs.
/// Used for:
/// - commitment = poseidon2(nullifier, secret)
/// - merkle_node = poseidon2(left, right)
pub fn poseidon2(a: B256, b: B256) -> B256 {
    let mut hasher =
        Poseidon::<Fr>::new_circom(2).expect("Failed to create Poseidon hasher");
    let inputs = [b256_to_fr(a), b256_to_fr(b)];
    let result = hasher
        .hash(&inputs)
        .expect("Failed to compute Poseidon hash");
    fr_to_b256(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poseidon1_deterministic() {
        let input = B256::repeat_byte(0x42);
        assert_eq!(poseidon1(input), poseidon1(input));
    }

    #[test]
    fn test_poseidon1_different_inputs() {
        let hash1 = poseidon1(B256::repeat_byte(0x01));
        let hash2 = poseidon1(B256::repeat_byte(0x02));
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_poseidon2_order_matters() {
        let a = B256::repeat_byte(0x01);
        let b = B256::repeat_byte(0x02);
        assert_ne!(poseidon2(a, b), poseidon2(b, a));
    }

    #[test]
    fn test_arity_separates_domains() {
        let a = B256::repeat_byte(0x07);
        assert_ne!(poseidon1(a), poseidon2(a, B256::ZERO));
    }

    #[test]
    fn test_reduce_is_identity_inside_field() {
        let small = B256::left_padding_from(&[0x12, 0x34]);
        assert_eq!(reduce_to_field(small), small);
        // 0xff..ff is above the modulus and must wrap
        let big = B256::repeat_byte(0xff);
        assert_ne!(reduce_to_field(big), big);
    }
}

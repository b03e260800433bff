use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use sha1::{Digest, Sha1};
use xkonnect::{CpuKey, CpuKeyError};

const VALID: &str = "C0DE8DAAE05493BCB0F1664FB1751F00";
const BAD_ECD: &str = "C0DE8DAAE05493BCB0F1664FB1751F10";
const BAD_WEIGHT: &str = "C1DE8DAAE05493BCB0F1664FB1751F00";
const BAD_BOTH: &str = "C1DE8DAAE05493BCB0F1664FB1751F10";
const ALL_ZERO: &str = "00000000000000000000000000000000";

fn hash_of(key: &CpuKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn valid_key_parses_and_round_trips() {
    let key = CpuKey::from_hex(VALID).expect("valid key");
    assert!(key.is_valid());
    assert_eq!(key.to_hex(), VALID);

    let from_bytes = CpuKey::from_bytes(key.as_bytes()).expect("bytes round trip");
    assert_eq!(from_bytes, key);

    let from_str = CpuKey::from_str(&key.to_hex()).expect("hex round trip");
    assert_eq!(from_str, key);
}

#[test]
fn parsing_is_case_insensitive_and_normalizes_to_uppercase() {
    let lower = CpuKey::from_hex(&VALID.to_lowercase()).expect("lowercase parses");
    let upper = CpuKey::from_hex(VALID).expect("uppercase parses");
    assert_eq!(lower, upper);
    assert_eq!(lower.to_hex(), VALID);
    assert_eq!(lower.to_string(), VALID);
}

#[test]
fn error_taxonomy_distinguishes_malformed_from_invalid() {
    assert_eq!(CpuKey::from_hex(""), Err(CpuKeyError::Empty));
    assert_eq!(CpuKey::from_hex("C0DE"), Err(CpuKeyError::Length(2)));
    assert_eq!(
        CpuKey::from_hex("X0DE8DAAE05493BCB0F1664FB1751F00"),
        Err(CpuKeyError::NonHex)
    );
    assert_eq!(CpuKey::from_hex(ALL_ZERO), Err(CpuKeyError::AllZero));
    assert_eq!(CpuKey::from_hex(BAD_WEIGHT), Err(CpuKeyError::HammingWeight));
    assert_eq!(CpuKey::from_hex(BAD_ECD), Err(CpuKeyError::Ecd));
    // the weight check runs first when both fail
    assert_eq!(CpuKey::from_hex(BAD_BOTH), Err(CpuKeyError::HammingWeight));

    assert!(CpuKeyError::AllZero.is_malformed());
    assert!(!CpuKeyError::AllZero.is_structurally_invalid());
    assert!(CpuKeyError::Ecd.is_structurally_invalid());
    assert!(CpuKeyError::HammingWeight.is_structurally_invalid());

    assert_eq!(CpuKey::from_bytes(&[]), Err(CpuKeyError::Empty));
    assert_eq!(CpuKey::from_bytes(&[0xC0; 4]), Err(CpuKeyError::Length(4)));
}

#[test]
fn try_parse_is_three_way() {
    // valid input: the key itself
    let key = CpuKey::try_parse(VALID).expect("valid key");
    assert!(key.is_valid());

    // structurally invalid input: the well-formed Empty sentinel
    let sentinel = CpuKey::try_parse(BAD_ECD).expect("sentinel");
    assert_eq!(sentinel, CpuKey::EMPTY);
    assert!(!sentinel.is_valid());

    // malformed input: nothing at all
    assert_eq!(CpuKey::try_parse(ALL_ZERO), None);
    assert_eq!(CpuKey::try_parse(""), None);
    assert_eq!(CpuKey::try_parse("zz"), None);

    // the byte-sequence variant follows the same contract
    let bad_ecd_bytes = hex::decode(BAD_ECD).expect("test vector");
    assert_eq!(CpuKey::try_parse_bytes(&bad_ecd_bytes), Some(CpuKey::EMPTY));
    assert_eq!(CpuKey::try_parse_bytes(&[0u8; 16]), None);
    assert_eq!(CpuKey::try_parse_bytes(&[1, 2, 3]), None);
}

#[test]
fn random_keys_are_valid_and_distinct() {
    let mut seen = HashSet::new();
    for _ in 0..100 {
        let key = CpuKey::random();
        assert!(key.is_valid(), "generated key failed validation: {key}");
        let reparsed = CpuKey::from_hex(&key.to_hex()).expect("generated key parses");
        assert_eq!(reparsed, key);
        seen.insert(key);
    }
    assert_eq!(seen.len(), 100, "random keys collided");
}

#[test]
fn equality_ordering_and_hashing_agree() {
    let a = CpuKey::from_hex(VALID).expect("valid key");
    let b = CpuKey::from_hex(&VALID.to_lowercase()).expect("valid key");
    let c = CpuKey::random();

    // reflexive, symmetric, consistent with hash
    assert_eq!(a, a);
    assert_eq!(a, b);
    assert_eq!(b, a);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_eq!(a.cmp(&b), Ordering::Equal);

    // ordering is byte-lexicographic
    assert_eq!(a.cmp(&c), a.as_bytes().cmp(c.as_bytes()));
    assert_eq!(c.cmp(&a), a.cmp(&c).reverse());
    assert_eq!(a.cmp(&c) == Ordering::Equal, a == c);
}

#[test]
fn interop_equality_with_hex_and_bytes() {
    let key = CpuKey::from_hex(VALID).expect("valid key");
    assert!(key == VALID);
    assert!(key == VALID.to_lowercase());
    assert!(key == *key.as_bytes());
    assert!(key == key.as_bytes().as_slice());
    assert!(key != ALL_ZERO);
}

#[test]
fn digest_is_sha1_of_the_raw_bytes() {
    let key = CpuKey::from_hex(VALID).expect("valid key");
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    let expected: [u8; 20] = hasher.finalize().into();
    assert_eq!(key.digest(), expected);
    assert_ne!(CpuKey::random().digest(), expected);
}

//! Tests for tag polling, held-card debounce and PN532 UID decoding.

#![allow(dead_code)]

#[path = "../src/config.rs"]
mod config;
#[path = "../src/error.rs"]
mod error;
#[path = "../src/feedback.rs"]
mod feedback;
#[path = "../src/hal.rs"]
mod hal;
#[path = "../src/scanner.rs"]
mod scanner;
#[path = "../src/types.rs"]
mod types;


use config::RuntimeConfig;
use fakes::{FakeClock, FakeReader};
use hal::Clock;
use scanner::{decode_inlist_uid, Scanner};
use types::card_id;

fn scanner(reader: &FakeReader, clock: &FakeClock) -> Scanner<FakeReader, FakeClock> {
    Scanner::new(reader.clone(), clock.clone(), &RuntimeConfig::default())
}

// ============================================================================
// Polling and debounce
// ============================================================================

#[test]
fn test_poll_empty_field() {
    let reader = FakeReader::new();
    let clock = FakeClock::new();
    let mut scanner = scanner(&reader, &clock);
    assert_eq!(scanner.poll(1_000), None);
    assert!(!scanner.is_holding());
}

#[test]
fn test_poll_yields_new_card() {
    let reader = FakeReader::new();
    reader.present(&[0xDE, 0xAD, 0xBE, 0xEF]);
    let clock = FakeClock::new();
    let mut scanner = scanner(&reader, &clock);

    let uid = scanner.poll(1_000).unwrap();
    assert_eq!(uid.as_slice(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(scanner.is_holding());
}

#[test]
fn test_one_poll_per_call() {
    let reader = FakeReader::new();
    let clock = FakeClock::new();
    let mut scanner = scanner(&reader, &clock);
    scanner.poll(1_000);
    scanner.poll(1_000);
    assert_eq!(reader.reads.get(), 2);
}

#[test]
fn test_wait_for_removal_returns_once_field_is_empty() {
    let reader = FakeReader::new();
    reader.present(&[1, 2, 3, 4]);
    reader.present_for(&[1, 2, 3, 4], 3);
    let clock = FakeClock::new();
    let mut scanner = scanner(&reader, &clock);

    scanner.poll(1_000).unwrap();
    assert!(scanner.wait_for_removal());
    assert!(!scanner.is_holding());
    // Three present reads, then the empty one.
    assert_eq!(reader.reads.get(), 1 + 4);
    assert_eq!(clock.sleeps(), vec![100; 3]);
}

#[test]
fn test_card_left_on_reader_is_reported_once() {
    let reader = FakeReader::new();
    let clock = FakeClock::new();
    let config = RuntimeConfig {
        max_hold_ms: 1_000,
        ..RuntimeConfig::default()
    };
    let mut scanner = Scanner::new(reader.clone(), clock.clone(), &config);

    reader.present_for(&[7, 7, 7, 7], 50);
    assert!(scanner.poll(1_000).is_some());
    assert!(!scanner.wait_for_removal());
    assert!(scanner.is_holding());
    assert!(clock.now_ms() >= 1_000);

    // Still the same card: suppressed.
    assert_eq!(scanner.poll(1_000), None);
    assert_eq!(scanner.poll(1_000), None);
}

#[test]
fn test_held_card_reported_again_after_removal() {
    let reader = FakeReader::new();
    let clock = FakeClock::new();
    let config = RuntimeConfig {
        max_hold_ms: 0,
        ..RuntimeConfig::default()
    };
    let mut scanner = Scanner::new(reader.clone(), clock.clone(), &config);

    reader.present_for(&[9, 9, 9, 9], 3);
    reader.empty();
    reader.present(&[9, 9, 9, 9]);

    assert!(scanner.poll(1_000).is_some());
    assert!(!scanner.wait_for_removal());
    assert_eq!(scanner.poll(1_000), None);
    // Field empty: hold released.
    assert_eq!(scanner.poll(1_000), None);
    assert!(!scanner.is_holding());
    assert!(scanner.poll(1_000).is_some());
}

#[test]
fn test_different_card_while_holding_is_reported() {
    let reader = FakeReader::new();
    let clock = FakeClock::new();
    let config = RuntimeConfig {
        max_hold_ms: 0,
        ..RuntimeConfig::default()
    };
    let mut scanner = Scanner::new(reader.clone(), clock.clone(), &config);

    reader.present_for(&[1, 1, 1, 1], 2);
    reader.present(&[2, 2, 2, 2]);

    assert!(scanner.poll(1_000).is_some());
    assert!(!scanner.wait_for_removal());
    let uid = scanner.poll(1_000).unwrap();
    assert_eq!(uid.as_slice(), &[2, 2, 2, 2]);
}

// ============================================================================
// InListPassiveTarget decoding
// ============================================================================

#[test]
fn test_decode_four_byte_uid() {
    // NbTg=1, Tg=1, SENS_RES=0x0004, SEL_RES=0x08, len=4, uid
    let response = [0x01, 0x01, 0x00, 0x04, 0x08, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];
    let uid = decode_inlist_uid(&response).unwrap();
    assert_eq!(uid.as_slice(), &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn test_decode_seven_byte_uid() {
    let response = [
        0x01, 0x01, 0x00, 0x44, 0x00, 0x07, 0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66,
    ];
    let uid = decode_inlist_uid(&response).unwrap();
    assert_eq!(uid.len(), 7);
    assert_eq!(card_id(&uid).as_str(), "04112233445566");
}

#[test]
fn test_decode_no_target() {
    let response = [0x00, 0x01, 0x00, 0x04, 0x08, 0x04, 0xDE];
    assert_eq!(decode_inlist_uid(&response), None);
}

#[test]
fn test_decode_short_response() {
    assert_eq!(decode_inlist_uid(&[0x01, 0x01, 0x00]), None);
    assert_eq!(decode_inlist_uid(&[]), None);
}

#[test]
fn test_decode_truncated_uid() {
    // Claims 7 bytes, carries 4.
    let response = [0x01, 0x01, 0x00, 0x44, 0x00, 0x07, 0x04, 0x11, 0x22, 0x33];
    assert_eq!(decode_inlist_uid(&response), None);
}

#[test]
fn test_decode_oversized_uid_length() {
    let mut response = vec![0x01, 0x01, 0x00, 0x44, 0x00, 11];
    response.extend_from_slice(&[0xAA; 11]);
    assert_eq!(decode_inlist_uid(&response), None);
}

// ============================================================================
// Card id rendering
// ============================================================================

#[test]
fn test_card_id_uppercase_hex() {
    assert_eq!(card_id(&[0xDE, 0xAD]).as_str(), "DEAD");
    assert_eq!(card_id(&[0x01, 0x02, 0x03, 0x04]).as_str(), "01020304");
    assert_eq!(card_id(&[]).as_str(), "");
}

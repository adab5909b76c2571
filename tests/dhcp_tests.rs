//! Tests for the setup network's DHCP server.

#![allow(dead_code)]

#[path = "../src/config.rs"]
mod config;
#[path = "../src/dhcp.rs"]
mod dhcp;
#[path = "../src/error.rs"]
mod error;
#[path = "../src/types.rs"]
mod types;

use config::AccessPointSettings;
use dhcp::{
    encode_reply, parse, prefix_mask, reply, ClientKind, ClientMessage, LeasePool, Reply,
    ReplyKind, POOL_SIZE, REPLY_LEN,
};
use smoltcp::wire::{DhcpMessageType, DhcpPacket, DhcpRepr};

const SETTINGS: AccessPointSettings = AccessPointSettings::FIXED;
const PHONE: [u8; 6] = [0x02, 0x11, 0x22, 0x33, 0x44, 0x55];
const LAPTOP: [u8; 6] = [0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE];

const DISCOVER: u8 = 1;
const OFFER: u8 = 2;
const REQUEST: u8 = 3;
const RELEASE: u8 = 7;

/// Build a client BOOTREQUEST carrying message type `kind` plus `options`.
fn frame(kind: u8, xid: u32, mac: [u8; 6], options: &[(u8, &[u8])]) -> Vec<u8> {
    let mut buf = vec![0u8; 300];
    buf[0] = 1;
    buf[1] = 1;
    buf[2] = 6;
    buf[4..8].copy_from_slice(&xid.to_be_bytes());
    buf[28..34].copy_from_slice(&mac);
    buf[236..240].copy_from_slice(&[0x63, 0x82, 0x53, 0x63]);
    let mut at = 240;
    for (code, data) in [(53u8, &[kind][..])].iter().chain(options.iter()) {
        buf[at] = *code;
        buf[at + 1] = data.len() as u8;
        buf[at + 2..at + 2 + data.len()].copy_from_slice(data);
        at += 2 + data.len();
    }
    buf[at] = 255;
    buf
}

fn message(kind: ClientKind, mac: [u8; 6]) -> ClientMessage {
    ClientMessage {
        kind,
        transaction_id: 0x1234,
        mac,
        requested_ip: None,
        server_id: None,
    }
}

fn request(mac: [u8; 6], ip: [u8; 4]) -> ClientMessage {
    ClientMessage {
        requested_ip: Some(ip),
        server_id: Some(SETTINGS.address),
        ..message(ClientKind::Request, mac)
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_discover() {
    let raw = frame(DISCOVER, 0xDEADBEEF, PHONE, &[]);
    let msg = parse(&raw).unwrap();
    assert_eq!(msg.kind, ClientKind::Discover);
    assert_eq!(msg.transaction_id, 0xDEADBEEF);
    assert_eq!(msg.mac, PHONE);
    assert_eq!(msg.requested_ip, None);
    assert_eq!(msg.server_id, None);
}

#[test]
fn test_parse_request_options() {
    let raw = frame(
        REQUEST,
        7,
        PHONE,
        &[(50, &[192, 168, 4, 2][..]), (54, &[192, 168, 4, 1][..])],
    );
    let msg = parse(&raw).unwrap();
    assert_eq!(msg.kind, ClientKind::Request);
    assert_eq!(msg.requested_ip, Some([192, 168, 4, 2]));
    assert_eq!(msg.server_id, Some([192, 168, 4, 1]));
}

#[test]
fn test_parse_release() {
    let raw = frame(RELEASE, 9, LAPTOP, &[]);
    assert_eq!(parse(&raw).unwrap().kind, ClientKind::Release);
}

#[test]
fn test_parse_ignores_other_messages() {
    assert_eq!(parse(&frame(OFFER, 1, PHONE, &[])), None);
    assert_eq!(parse(&[0u8; 20]), None);
    assert_eq!(parse(&[]), None);
}

#[test]
fn test_parse_rejects_bad_cookie() {
    let mut raw = frame(DISCOVER, 1, PHONE, &[]);
    raw[236] = 0;
    assert_eq!(parse(&raw), None);
}

// ============================================================================
// Lease decisions
// ============================================================================

#[test]
fn test_discover_offers_first_free_address() {
    let mut pool = LeasePool::new();
    let offer = reply(&message(ClientKind::Discover, PHONE), &SETTINGS, &mut pool, 0).unwrap();
    assert_eq!(
        offer,
        Reply {
            kind: ReplyKind::Offer,
            transaction_id: 0x1234,
            mac: PHONE,
            your_ip: [192, 168, 4, 2],
        }
    );

    let second = reply(&message(ClientKind::Discover, LAPTOP), &SETTINGS, &mut pool, 0).unwrap();
    assert_eq!(second.your_ip, [192, 168, 4, 3]);
}

#[test]
fn test_repeat_discover_gets_same_address() {
    let mut pool = LeasePool::new();
    let first = reply(&message(ClientKind::Discover, PHONE), &SETTINGS, &mut pool, 0).unwrap();
    let again = reply(&message(ClientKind::Discover, PHONE), &SETTINGS, &mut pool, 1_000).unwrap();
    assert_eq!(first.your_ip, again.your_ip);
}

#[test]
fn test_request_after_offer_is_acked() {
    let mut pool = LeasePool::new();
    let offer = reply(&message(ClientKind::Discover, PHONE), &SETTINGS, &mut pool, 0).unwrap();
    let ack = reply(&request(PHONE, offer.your_ip), &SETTINGS, &mut pool, 10).unwrap();

    assert_eq!(ack.kind, ReplyKind::Ack);
    assert_eq!(ack.your_ip, offer.your_ip);
    assert_eq!(pool.address_of(&PHONE, &SETTINGS), Some(offer.your_ip));
}

#[test]
fn test_lease_lasts_lease_secs() {
    let mut pool = LeasePool::new();
    reply(&request(PHONE, [192, 168, 4, 2]), &SETTINGS, &mut pool, 0).unwrap();
    let lease_ms = SETTINGS.lease_secs as u64 * 1000;
    assert_eq!(pool.active(lease_ms - 1), 1);
    assert_eq!(pool.active(lease_ms), 0);
}

#[test]
fn test_renewal_without_requested_ip() {
    let mut pool = LeasePool::new();
    reply(&request(PHONE, [192, 168, 4, 5]), &SETTINGS, &mut pool, 0).unwrap();

    let ack = reply(&message(ClientKind::Request, PHONE), &SETTINGS, &mut pool, 1_000).unwrap();
    assert_eq!(ack.kind, ReplyKind::Ack);
    assert_eq!(ack.your_ip, [192, 168, 4, 5]);
}

#[test]
fn test_request_for_taken_address_is_naked() {
    let mut pool = LeasePool::new();
    reply(&request(PHONE, [192, 168, 4, 2]), &SETTINGS, &mut pool, 0).unwrap();

    let nak = reply(&request(LAPTOP, [192, 168, 4, 2]), &SETTINGS, &mut pool, 0).unwrap();
    assert_eq!(nak.kind, ReplyKind::Nak);
    assert_eq!(nak.your_ip, [0; 4]);
    assert_eq!(pool.address_of(&PHONE, &SETTINGS), Some([192, 168, 4, 2]));
}

#[test]
fn test_request_outside_pool_is_naked() {
    let mut pool = LeasePool::new();
    for ip in [
        [10, 0, 0, 2],
        [192, 168, 4, 1],
        [192, 168, 4, 50],
        [192, 168, 4, 0],
    ] {
        let nak = reply(&request(PHONE, ip), &SETTINGS, &mut pool, 0).unwrap();
        assert_eq!(nak.kind, ReplyKind::Nak, "{:?}", ip);
    }
    // Nothing to renew either.
    let nak = reply(&message(ClientKind::Request, PHONE), &SETTINGS, &mut pool, 0).unwrap();
    assert_eq!(nak.kind, ReplyKind::Nak);
}

#[test]
fn test_request_for_other_server_drops_offer() {
    let mut pool = LeasePool::new();
    reply(&message(ClientKind::Discover, PHONE), &SETTINGS, &mut pool, 0).unwrap();

    let msg = ClientMessage {
        server_id: Some([192, 168, 4, 99]),
        ..request(PHONE, [192, 168, 4, 2])
    };
    assert_eq!(reply(&msg, &SETTINGS, &mut pool, 0), None);
    assert_eq!(pool.address_of(&PHONE, &SETTINGS), None);
}

#[test]
fn test_release_frees_address() {
    let mut pool = LeasePool::new();
    reply(&request(PHONE, [192, 168, 4, 2]), &SETTINGS, &mut pool, 0).unwrap();
    assert_eq!(reply(&message(ClientKind::Release, PHONE), &SETTINGS, &mut pool, 0), None);
    assert_eq!(pool.active(0), 0);

    let ack = reply(&request(LAPTOP, [192, 168, 4, 2]), &SETTINGS, &mut pool, 0).unwrap();
    assert_eq!(ack.kind, ReplyKind::Ack);
}

#[test]
fn test_switching_address_frees_old_slot() {
    let mut pool = LeasePool::new();
    reply(&request(PHONE, [192, 168, 4, 2]), &SETTINGS, &mut pool, 0).unwrap();
    reply(&request(PHONE, [192, 168, 4, 4]), &SETTINGS, &mut pool, 0).unwrap();
    assert_eq!(pool.active(0), 1);
    assert_eq!(pool.address_of(&PHONE, &SETTINGS), Some([192, 168, 4, 4]));
}

#[test]
fn test_pool_exhaustion_and_reuse() {
    let mut pool = LeasePool::new();
    for i in 0..POOL_SIZE {
        let mac = [0x02, 0, 0, 0, 0, i as u8];
        assert!(reply(&message(ClientKind::Discover, mac), &SETTINGS, &mut pool, 0).is_some());
    }
    let late = [0x02, 0, 0, 0, 1, 0];
    assert_eq!(reply(&message(ClientKind::Discover, late), &SETTINGS, &mut pool, 0), None);

    // Unanswered offers lapse after a minute.
    let offer = reply(&message(ClientKind::Discover, late), &SETTINGS, &mut pool, 60_000).unwrap();
    assert_eq!(offer.your_ip, [192, 168, 4, 2]);
}

#[test]
fn test_rediscover_keeps_active_lease() {
    let mut pool = LeasePool::new();
    let ack = reply(&request(PHONE, [192, 168, 4, 2]), &SETTINGS, &mut pool, 0).unwrap();
    assert_eq!(ack.kind, ReplyKind::Ack);

    let again = reply(&message(ClientKind::Discover, PHONE), &SETTINGS, &mut pool, 1_000).unwrap();
    assert_eq!(again.your_ip, [192, 168, 4, 2]);

    for i in 1..POOL_SIZE {
        let mac = [0x02, 0, 0, 0, 0, i as u8];
        let ip = [192, 168, 4, 2 + i as u8];
        let ack = reply(&request(mac, ip), &SETTINGS, &mut pool, 2_000).unwrap();
        assert_eq!(ack.kind, ReplyKind::Ack);
    }

    // Well past the offer hold but inside the phone's lease.
    assert_eq!(
        reply(&message(ClientKind::Discover, LAPTOP), &SETTINGS, &mut pool, 120_000),
        None
    );
    assert_eq!(pool.address_of(&PHONE, &SETTINGS), Some([192, 168, 4, 2]));
    assert_eq!(pool.active(120_000), POOL_SIZE);
}

// ============================================================================
// Encoding
// ============================================================================

#[test]
fn test_encode_offer() {
    let offer = Reply {
        kind: ReplyKind::Offer,
        transaction_id: 0xCAFE_F00D,
        mac: PHONE,
        your_ip: [192, 168, 4, 2],
    };
    let mut buf = [0xAAu8; 512];
    let len = encode_reply(&offer, &SETTINGS, &mut buf);
    assert_eq!(len, REPLY_LEN);

    assert_eq!(buf[0], 2);
    assert_eq!(&buf[4..8], &0xCAFE_F00Du32.to_be_bytes());
    assert_eq!(buf[10], 0x80);
    assert_eq!(&buf[16..20], &[192, 168, 4, 2]);
    assert_eq!(&buf[20..24], &[192, 168, 4, 1]);
    assert_eq!(&buf[28..34], &PHONE);
    assert_eq!(&buf[240..243], &[53, 1, 2]);

    let packet = DhcpPacket::new_checked(&buf[..len]).unwrap();
    let repr = DhcpRepr::parse(&packet).unwrap();
    assert_eq!(repr.message_type, DhcpMessageType::Offer);
    assert_eq!(repr.transaction_id, 0xCAFE_F00D);
    assert_eq!(repr.your_ip.octets(), [192, 168, 4, 2]);
    assert_eq!(repr.server_identifier.map(|ip| ip.octets()), Some([192, 168, 4, 1]));
    assert_eq!(repr.subnet_mask.map(|ip| ip.octets()), Some([255, 255, 255, 0]));
    assert_eq!(repr.router.map(|ip| ip.octets()), Some([192, 168, 4, 1]));
    assert_eq!(repr.lease_duration, Some(SETTINGS.lease_secs));
    assert!(repr.broadcast);
    let dns: Vec<[u8; 4]> = repr
        .dns_servers
        .iter()
        .flatten()
        .map(|ip| ip.octets())
        .collect();
    assert_eq!(dns, vec![[192, 168, 4, 1]]);
    // Zero padded past the end option.
    assert!(buf[len - 20..len].iter().all(|&b| b == 0));
    assert_eq!(buf[len], 0xAA);
}

#[test]
fn test_encode_nak_omits_lease_options() {
    let nak = Reply {
        kind: ReplyKind::Nak,
        transaction_id: 1,
        mac: PHONE,
        your_ip: [0; 4],
    };
    let mut buf = [0u8; REPLY_LEN];
    let len = encode_reply(&nak, &SETTINGS, &mut buf);
    assert_eq!(len, REPLY_LEN);

    assert_eq!(&buf[20..24], &[0; 4]);
    assert_eq!(&buf[240..249], &[53, 1, 6, 54, 4, 192, 168, 4, 1]);
    assert_eq!(buf[249], 255);

    let packet = DhcpPacket::new_checked(&buf[..len]).unwrap();
    let repr = DhcpRepr::parse(&packet).unwrap();
    assert_eq!(repr.message_type, DhcpMessageType::Nak);
    assert_eq!(repr.server_identifier.map(|ip| ip.octets()), Some([192, 168, 4, 1]));
    assert_eq!(repr.lease_duration, None);
    assert_eq!(repr.subnet_mask, None);
    assert_eq!(repr.router, None);
    assert!(repr.dns_servers.is_none());
}

#[test]
fn test_encode_needs_room() {
    let ack = Reply {
        kind: ReplyKind::Ack,
        transaction_id: 1,
        mac: PHONE,
        your_ip: [192, 168, 4, 2],
    };
    let mut buf = [0u8; 100];
    assert_eq!(encode_reply(&ack, &SETTINGS, &mut buf), 0);
}

#[test]
fn test_prefix_mask() {
    assert_eq!(prefix_mask(24), [255, 255, 255, 0]);
    assert_eq!(prefix_mask(20), [255, 255, 240, 0]);
    assert_eq!(prefix_mask(0), [0, 0, 0, 0]);
    assert_eq!(prefix_mask(32), [255, 255, 255, 255]);
    assert_eq!(prefix_mask(40), [255, 255, 255, 255]);
}

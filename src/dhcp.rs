//! Tiny DHCP server for the setup access point.
//!
//! Phones joining the recovery network expect an address before they will
//! open the portal. Leases come from a fixed pool of [`POOL_SIZE`] addresses
//! starting at `lease_start` in the AP subnet, one per client MAC. The AP
//! address doubles as router and DNS server.

use smoltcp::wire::{
    DhcpMessageType, DhcpPacket, DhcpRepr, EthernetAddress, Ipv4Address, DHCP_CLIENT_PORT,
    DHCP_SERVER_PORT,
};

use crate::config::AccessPointSettings;

pub const SERVER_PORT: u16 = DHCP_SERVER_PORT;
pub const CLIENT_PORT: u16 = DHCP_CLIENT_PORT;
pub const POOL_SIZE: usize = 8;

/// How long an offered address stays reserved for the client.
const OFFER_HOLD_MS: u64 = 60_000;

/// Length of every reply [`encode_reply`] produces.
pub const REPLY_LEN: usize = 300;

pub type Mac = [u8; 6];

/// The parts of a client message the server acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientMessage {
    pub kind: ClientKind,
    pub transaction_id: u32,
    pub mac: Mac,
    pub requested_ip: Option<[u8; 4]>,
    pub server_id: Option<[u8; 4]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientKind {
    Discover,
    Request,
    Release,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    Offer,
    Ack,
    Nak,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub transaction_id: u32,
    pub mac: Mac,
    pub your_ip: [u8; 4],
}

#[derive(Clone, Copy, Debug, Default)]
struct Lease {
    mac: Mac,
    expires_ms: u64,
}

/// One address per client MAC, recycled once expired.
#[derive(Debug, Default)]
pub struct LeasePool {
    slots: [Option<Lease>; POOL_SIZE],
}

impl LeasePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot already bound to `mac`, else a free or expired one.
    fn slot_for(&self, mac: &Mac, now_ms: u64) -> Option<usize> {
        if let Some(i) = self.find(mac) {
            return Some(i);
        }
        self.slots
            .iter()
            .position(|s| s.map_or(true, |l| l.expires_ms <= now_ms))
    }

    fn find(&self, mac: &Mac) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.map_or(false, |l| &l.mac == mac))
    }

    fn bind(&mut self, slot: usize, mac: Mac, expires_ms: u64) {
        self.slots[slot] = Some(Lease { mac, expires_ms });
    }

    pub fn release(&mut self, mac: &Mac) {
        if let Some(i) = self.find(mac) {
            self.slots[i] = None;
        }
    }

    /// Address currently leased to `mac`, if any.
    pub fn address_of(&self, mac: &Mac, settings: &AccessPointSettings) -> Option<[u8; 4]> {
        self.find(mac).map(|i| slot_address(settings, i))
    }

    pub fn active(&self, now_ms: u64) -> usize {
        self.slots
            .iter()
            .filter(|s| s.map_or(false, |l| l.expires_ms > now_ms))
            .count()
    }
}

fn slot_address(settings: &AccessPointSettings, slot: usize) -> [u8; 4] {
    let [a, b, c, _] = settings.address;
    [a, b, c, settings.lease_start.wrapping_add(slot as u8)]
}

fn slot_of(settings: &AccessPointSettings, ip: [u8; 4]) -> Option<usize> {
    let [a, b, c, d] = settings.address;
    if ip[..3] != [a, b, c] || ip[3] == d {
        return None;
    }
    let slot = ip[3].checked_sub(settings.lease_start)? as usize;
    (slot < POOL_SIZE).then_some(slot)
}

/// Parse a client message. Anything but Discover/Request/Release is ignored.
pub fn parse(frame: &[u8]) -> Option<ClientMessage> {
    let packet = DhcpPacket::new_checked(frame).ok()?;
    let repr = DhcpRepr::parse(&packet).ok()?;
    let kind = match repr.message_type {
        DhcpMessageType::Discover => ClientKind::Discover,
        DhcpMessageType::Request => ClientKind::Request,
        DhcpMessageType::Release => ClientKind::Release,
        _ => return None,
    };
    Some(ClientMessage {
        kind,
        transaction_id: repr.transaction_id,
        mac: repr.client_hardware_address.0,
        requested_ip: repr.requested_ip.map(|ip| ip.octets()),
        server_id: repr.server_identifier.map(|ip| ip.octets()),
    })
}

/// Decide the answer to one client message.
pub fn reply(
    msg: &ClientMessage,
    settings: &AccessPointSettings,
    pool: &mut LeasePool,
    now_ms: u64,
) -> Option<Reply> {
    let lease_ms = settings.lease_secs as u64 * 1000;
    let answer = |kind, your_ip| Reply {
        kind,
        transaction_id: msg.transaction_id,
        mac: msg.mac,
        your_ip,
    };

    match msg.kind {
        ClientKind::Discover => {
            let Some(slot) = pool.slot_for(&msg.mac, now_ms) else {
                log::warn!("dhcp: pool exhausted");
                return None;
            };
            // Hold the slot briefly so two clients are not offered the same
            // address. A live lease keeps its own expiry.
            let hold = now_ms + OFFER_HOLD_MS;
            let expires_ms = match pool.slots[slot] {
                Some(lease) if lease.mac == msg.mac => lease.expires_ms.max(hold),
                _ => hold,
            };
            pool.bind(slot, msg.mac, expires_ms);
            Some(answer(ReplyKind::Offer, slot_address(settings, slot)))
        }
        ClientKind::Request => {
            // Selecting some other server's offer.
            if msg.server_id.is_some_and(|id| id != settings.address) {
                pool.release(&msg.mac);
                return None;
            }
            let requested = msg
                .requested_ip
                .or_else(|| pool.address_of(&msg.mac, settings));
            let slot = requested.and_then(|ip| slot_of(settings, ip));
            match slot {
                Some(slot)
                    if pool.slots[slot].map_or(true, |l| {
                        l.mac == msg.mac || l.expires_ms <= now_ms
                    }) =>
                {
                    if let Some(old) = pool.find(&msg.mac).filter(|&i| i != slot) {
                        pool.slots[old] = None;
                    }
                    pool.bind(slot, msg.mac, now_ms + lease_ms);
                    let ip = slot_address(settings, slot);
                    log::info!("dhcp: leased {}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3]);
                    Some(answer(ReplyKind::Ack, ip))
                }
                _ => Some(answer(ReplyKind::Nak, [0; 4])),
            }
        }
        ClientKind::Release => {
            pool.release(&msg.mac);
            None
        }
    }
}

/// Write a BOOTREPLY for `reply` into `buf`, returning its length.
///
/// Replies are zero padded to [`REPLY_LEN`], the BOOTP minimum some clients
/// insist on.
pub fn encode_reply(reply: &Reply, settings: &AccessPointSettings, buf: &mut [u8]) -> usize {
    if buf.len() < REPLY_LEN {
        return 0;
    }
    let server = Ipv4Address::from(settings.address);
    let offered = reply.kind != ReplyKind::Nak;

    let mut dns_servers = heapless::Vec::new();
    if offered {
        let _ = dns_servers.push(server);
    }
    let repr = DhcpRepr {
        message_type: match reply.kind {
            ReplyKind::Offer => DhcpMessageType::Offer,
            ReplyKind::Ack => DhcpMessageType::Ack,
            ReplyKind::Nak => DhcpMessageType::Nak,
        },
        transaction_id: reply.transaction_id,
        secs: 0,
        client_hardware_address: EthernetAddress(reply.mac),
        client_ip: Ipv4Address::UNSPECIFIED,
        your_ip: Ipv4Address::from(reply.your_ip),
        server_ip: if offered { server } else { Ipv4Address::UNSPECIFIED },
        router: offered.then_some(server),
        subnet_mask: offered.then(|| Ipv4Address::from(prefix_mask(settings.prefix_len))),
        relay_agent_ip: Ipv4Address::UNSPECIFIED,
        // Clients without an address cannot take unicast.
        broadcast: true,
        requested_ip: None,
        client_identifier: None,
        server_identifier: Some(server),
        parameter_request_list: None,
        dns_servers: offered.then_some(dns_servers),
        max_size: None,
        lease_duration: offered.then_some(settings.lease_secs),
        renew_duration: None,
        rebind_duration: None,
        additional_options: &[],
    };

    let len = repr.buffer_len();
    if len > REPLY_LEN {
        return 0;
    }
    buf[..REPLY_LEN].fill(0);
    let mut packet = DhcpPacket::new_unchecked(&mut buf[..len]);
    match repr.emit(&mut packet) {
        Ok(()) => REPLY_LEN,
        Err(e) => {
            log::warn!("dhcp: reply encode failed: {:?}", e);
            0
        }
    }
}

pub fn prefix_mask(prefix_len: u8) -> [u8; 4] {
    let bits = match prefix_len {
        0 => 0,
        n if n >= 32 => u32::MAX,
        n => u32::MAX << (32 - n),
    };
    bits.to_be_bytes()
}

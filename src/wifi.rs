//! Wi-Fi station and setup access point on esp-radio + smoltcp.
//!
//! One radio, two smoltcp interfaces: the station interface (DHCP client, DNS,
//! one reusable TCP client socket for tap reports) and the access point
//! interface (static address, DHCP server on UDP 67, portal listener on TCP 80).
//! Only one of them is live at a time.
//!
//! Every wait here is a poll loop with a deadline that yields to the RTOS with
//! `usleep` so the Wi-Fi driver task keeps running.

use alloc::string::ToString;

use esp_radio::wifi::{
    AccessPointConfig, AuthMethod, ClientConfig, ModeConfig, WifiController, WifiDevice,
};
use heapless::Vec as HVec;
use smoltcp::iface::{Config, Interface, SocketHandle, SocketSet, SocketStorage};
use smoltcp::socket::dhcpv4::{Event as DhcpEvent, Socket as DhcpSocket};
use smoltcp::socket::dns::{DnsQuery, GetQueryResultError, Socket as DnsSocket};
use smoltcp::socket::tcp::{Socket as TcpSocket, SocketBuffer, State as TcpState};
use smoltcp::socket::udp::{PacketBuffer, PacketMetadata, Socket as UdpSocket};
use smoltcp::time::Instant as SmoltcpInstant;
use smoltcp::wire::{
    DnsQueryType, EthernetAddress, HardwareAddress, IpAddress, IpCidr, IpEndpoint,
};
use static_cell::StaticCell;

use crate::config::AccessPointSettings;
use crate::dhcp;
use crate::error::{RadioError, TransportError};
use crate::hal::{AccessPoint, HttpClient, Station};
use crate::http;
use crate::system::{feed_watchdog, now_ms};
use crate::types::NetworkCredentials;

const DNS_TIMEOUT_MS: u64 = 5_000;
const TCP_CONNECT_TIMEOUT_MS: u64 = 5_000;
const RESPONSE_TIMEOUT_MS: u64 = 5_000;
const FLUSH_TIMEOUT_MS: u64 = 500;
const POLL_INTERVAL_US: u32 = 10_000;

const LOCAL_PORT_FIRST: u16 = 49152;
const PORTAL_PORT: u16 = 80;

const RESPONSE_BUFFER: usize = 1024;
const REQUEST_BUFFER: usize = 1024;

static STA_SOCKETS: StaticCell<[SocketStorage<'static>; 4]> = StaticCell::new();
static AP_SOCKETS: StaticCell<[SocketStorage<'static>; 3]> = StaticCell::new();
static DNS_QUERIES: StaticCell<[Option<DnsQuery>; 1]> = StaticCell::new();
static CLIENT_RX: StaticCell<[u8; 1536]> = StaticCell::new();
static CLIENT_TX: StaticCell<[u8; 1024]> = StaticCell::new();
static PORTAL_RX: StaticCell<[u8; 1024]> = StaticCell::new();
static PORTAL_TX: StaticCell<[u8; 2048]> = StaticCell::new();
static DHCP_RX_META: StaticCell<[PacketMetadata; 4]> = StaticCell::new();
static DHCP_RX: StaticCell<[u8; 1024]> = StaticCell::new();
static DHCP_TX_META: StaticCell<[PacketMetadata; 4]> = StaticCell::new();
static DHCP_TX: StaticCell<[u8; 1024]> = StaticCell::new();

fn timestamp() -> SmoltcpInstant {
    SmoltcpInstant::from_millis(now_ms() as i64)
}

fn pause() {
    feed_watchdog();
    esp_radio_rtos_driver::usleep(POLL_INTERVAL_US);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Idle,
    Station,
    AccessPoint,
}

/// Station side: DHCP lease, resolver and the tap report socket.
struct StaLink {
    iface: Interface,
    sockets: SocketSet<'static>,
    dhcp: SocketHandle,
    dns: SocketHandle,
    tcp: SocketHandle,
    configured: bool,
    next_port: u16,
}

impl StaLink {
    fn new(device: &mut WifiDevice<'static>) -> Self {
        let mac = esp_radio::wifi::sta_mac();
        let config = Config::new(HardwareAddress::Ethernet(EthernetAddress(mac)));
        let iface = Interface::new(config, device, SmoltcpInstant::ZERO);

        let mut sockets = SocketSet::new(&mut STA_SOCKETS.init(Default::default())[..]);
        let dhcp = sockets.add(DhcpSocket::new());
        let dns = sockets.add(DnsSocket::new(&[], &mut DNS_QUERIES.init([None])[..]));
        let tcp = sockets.add(TcpSocket::new(
            SocketBuffer::new(&mut CLIENT_RX.init([0; 1536])[..]),
            SocketBuffer::new(&mut CLIENT_TX.init([0; 1024])[..]),
        ));

        Self {
            iface,
            sockets,
            dhcp,
            dns,
            tcp,
            configured: false,
            next_port: LOCAL_PORT_FIRST,
        }
    }

    /// Drop the lease and any connection; used when re-associating.
    fn reset(&mut self) {
        self.sockets.get_mut::<TcpSocket>(self.tcp).abort();
        self.sockets.get_mut::<DhcpSocket>(self.dhcp).reset();
        self.iface.update_ip_addrs(|addrs| addrs.clear());
        self.iface.routes_mut().remove_default_ipv4_route();
        self.configured = false;
    }

    fn poll(&mut self, device: &mut WifiDevice<'static>) {
        self.iface.poll(timestamp(), device, &mut self.sockets);

        let event = self.sockets.get_mut::<DhcpSocket>(self.dhcp).poll();
        match event {
            Some(DhcpEvent::Configured(lease)) => {
                let addr = lease.address;
                self.iface.update_ip_addrs(|addrs| {
                    addrs.clear();
                    addrs.push(IpCidr::Ipv4(addr)).ok();
                });
                if let Some(router) = lease.router {
                    self.iface.routes_mut().add_default_ipv4_route(router).ok();
                }
                let servers: HVec<IpAddress, 3> = lease
                    .dns_servers
                    .iter()
                    .map(|s| IpAddress::Ipv4(*s))
                    .collect();
                self.sockets
                    .get_mut::<DnsSocket>(self.dns)
                    .update_servers(&servers);
                log::info!("dhcp: IP={}", addr);
                self.configured = true;
            }
            Some(DhcpEvent::Deconfigured) => {
                log::warn!("dhcp: deconfigured");
                self.iface.update_ip_addrs(|addrs| addrs.clear());
                self.iface.routes_mut().remove_default_ipv4_route();
                self.configured = false;
            }
            None => {}
        }
    }

    fn resolve(
        &mut self,
        device: &mut WifiDevice<'static>,
        host: &str,
    ) -> Result<IpAddress, TransportError> {
        if let Some([a, b, c, d]) = http::parse_ipv4(host) {
            return Ok(IpAddress::v4(a, b, c, d));
        }

        let query = self
            .sockets
            .get_mut::<DnsSocket>(self.dns)
            .start_query(self.iface.context(), host, DnsQueryType::A)
            .map_err(|e| {
                log::warn!("dns: query for {} not started: {:?}", host, e);
                TransportError::Dns
            })?;

        let deadline = now_ms() + DNS_TIMEOUT_MS;
        loop {
            self.poll(device);
            let socket = self.sockets.get_mut::<DnsSocket>(self.dns);
            match socket.get_query_result(query) {
                Ok(addrs) => {
                    return addrs.first().copied().ok_or(TransportError::Dns);
                }
                Err(GetQueryResultError::Pending) => {}
                Err(GetQueryResultError::Failed) => {
                    log::warn!("dns: {} did not resolve", host);
                    return Err(TransportError::Dns);
                }
            }
            if now_ms() > deadline {
                socket.cancel_query(query);
                log::warn!("dns: {} timed out", host);
                return Err(TransportError::Timeout);
            }
            pause();
        }
    }

    /// Connect, send `request`, read until the response is complete.
    /// Returns the response length in `response`.
    fn exchange(
        &mut self,
        device: &mut WifiDevice<'static>,
        remote: (IpAddress, u16),
        request: &[u8],
        response: &mut [u8],
    ) -> Result<usize, TransportError> {
        let local_port = self.next_port;
        self.next_port = self.next_port.checked_add(1).unwrap_or(LOCAL_PORT_FIRST);

        {
            let socket = self.sockets.get_mut::<TcpSocket>(self.tcp);
            socket.abort();
            if socket.connect(self.iface.context(), remote, local_port).is_err() {
                log::error!("http: connect initiation failed");
                return Err(TransportError::Connect);
            }
        }

        let deadline = now_ms() + TCP_CONNECT_TIMEOUT_MS;
        loop {
            self.poll(device);
            let socket = self.sockets.get_mut::<TcpSocket>(self.tcp);
            if socket.may_send() {
                break;
            }
            if socket.state() == TcpState::Closed {
                return Err(TransportError::Connect);
            }
            if now_ms() > deadline {
                socket.abort();
                return Err(TransportError::Timeout);
            }
            pause();
        }

        {
            let socket = self.sockets.get_mut::<TcpSocket>(self.tcp);
            match socket.send_slice(request) {
                Ok(n) if n == request.len() => {}
                _ => {
                    socket.abort();
                    return Err(TransportError::Io);
                }
            }
        }

        let mut len = 0;
        let deadline = now_ms() + RESPONSE_TIMEOUT_MS;
        loop {
            self.poll(device);
            let socket = self.sockets.get_mut::<TcpSocket>(self.tcp);

            if socket.may_recv() && len < response.len() {
                if let Ok(n) = socket.recv_slice(&mut response[len..]) {
                    len += n;
                }
            }

            let peer_closed = matches!(socket.state(), TcpState::CloseWait | TcpState::Closed);
            if http::response_complete(&response[..len], peer_closed) || len == response.len() {
                break;
            }
            if peer_closed && len == 0 {
                socket.abort();
                return Err(TransportError::Io);
            }
            if now_ms() > deadline {
                socket.abort();
                return Err(TransportError::Timeout);
            }
            pause();
        }

        self.sockets.get_mut::<TcpSocket>(self.tcp).close();
        self.poll(device);
        Ok(len)
    }
}

/// Access point side: DHCP server and portal listener.
struct ApLink {
    iface: Interface,
    sockets: SocketSet<'static>,
    dhcp: SocketHandle,
    http: SocketHandle,
    leases: dhcp::LeasePool,
    settings: Option<AccessPointSettings>,
    pending: [u8; REQUEST_BUFFER],
    pending_len: usize,
}

impl ApLink {
    fn new(device: &mut WifiDevice<'static>) -> Self {
        let mac = esp_radio::wifi::ap_mac();
        let config = Config::new(HardwareAddress::Ethernet(EthernetAddress(mac)));
        let iface = Interface::new(config, device, SmoltcpInstant::ZERO);

        let mut sockets = SocketSet::new(&mut AP_SOCKETS.init(Default::default())[..]);
        let dhcp = sockets.add(UdpSocket::new(
            PacketBuffer::new(
                &mut DHCP_RX_META.init([PacketMetadata::EMPTY; 4])[..],
                &mut DHCP_RX.init([0; 1024])[..],
            ),
            PacketBuffer::new(
                &mut DHCP_TX_META.init([PacketMetadata::EMPTY; 4])[..],
                &mut DHCP_TX.init([0; 1024])[..],
            ),
        ));
        let http = sockets.add(TcpSocket::new(
            SocketBuffer::new(&mut PORTAL_RX.init([0; 1024])[..]),
            SocketBuffer::new(&mut PORTAL_TX.init([0; 2048])[..]),
        ));

        Self {
            iface,
            sockets,
            dhcp,
            http,
            leases: dhcp::LeasePool::new(),
            settings: None,
            pending: [0; REQUEST_BUFFER],
            pending_len: 0,
        }
    }

    fn configure(&mut self, settings: &AccessPointSettings) -> Result<(), RadioError> {
        let [a, b, c, d] = settings.address;
        self.iface.update_ip_addrs(|addrs| {
            addrs.clear();
            addrs
                .push(IpCidr::new(IpAddress::v4(a, b, c, d), settings.prefix_len))
                .ok();
        });

        let udp = self.sockets.get_mut::<UdpSocket>(self.dhcp);
        if !udp.is_open() {
            udp.bind(dhcp::SERVER_PORT).map_err(|e| {
                log::error!("dhcp: bind failed: {:?}", e);
                RadioError::Socket
            })?;
        }
        let tcp = self.sockets.get_mut::<TcpSocket>(self.http);
        tcp.abort();
        tcp.listen(PORTAL_PORT).map_err(|e| {
            log::error!("portal: listen failed: {:?}", e);
            RadioError::Socket
        })?;

        self.settings = Some(*settings);
        self.pending_len = 0;
        Ok(())
    }

    fn poll(&mut self, device: &mut WifiDevice<'static>) {
        self.iface.poll(timestamp(), device, &mut self.sockets);
        self.serve_dhcp();
    }

    fn serve_dhcp(&mut self) {
        let Some(settings) = self.settings else {
            return;
        };
        let now = now_ms();
        let socket = self.sockets.get_mut::<UdpSocket>(self.dhcp);
        let mut frame = [0u8; 576];
        while let Ok((n, _)) = socket.recv_slice(&mut frame) {
            let Some(msg) = dhcp::parse(&frame[..n]) else {
                continue;
            };
            let Some(reply) = dhcp::reply(&msg, &settings, &mut self.leases, now) else {
                continue;
            };
            let mut out = [0u8; dhcp::REPLY_LEN];
            let len = dhcp::encode_reply(&reply, &settings, &mut out);
            let to = IpEndpoint::new(IpAddress::v4(255, 255, 255, 255), dhcp::CLIENT_PORT);
            if let Err(e) = socket.send_slice(&out[..len], to) {
                log::warn!("dhcp: reply not sent: {:?}", e);
            }
        }
    }

    /// Advance the listener and collect a request. Returns its length once
    /// the header block is complete (or the buffer is full).
    fn take_request(&mut self, buf: &mut [u8]) -> Option<usize> {
        let socket = self.sockets.get_mut::<TcpSocket>(self.http);

        match socket.state() {
            TcpState::Closed => {
                socket.listen(PORTAL_PORT).ok();
                self.pending_len = 0;
                return None;
            }
            TcpState::CloseWait if self.pending_len == 0 => {
                socket.close();
                return None;
            }
            TcpState::TimeWait | TcpState::LastAck | TcpState::Closing => {
                socket.abort();
                self.pending_len = 0;
                return None;
            }
            TcpState::Listen | TcpState::SynReceived | TcpState::SynSent => {
                self.pending_len = 0;
                return None;
            }
            _ => {}
        }

        if socket.may_recv() && self.pending_len < self.pending.len() {
            if let Ok(n) = socket.recv_slice(&mut self.pending[self.pending_len..]) {
                self.pending_len += n;
            }
        }

        let data = &self.pending[..self.pending_len];
        let complete = http::find_header_end(data).is_some()
            || self.pending_len == self.pending.len()
            || (self.pending_len > 0 && socket.state() == TcpState::CloseWait);
        if !complete {
            return None;
        }

        let len = self.pending_len.min(buf.len());
        buf[..len].copy_from_slice(&self.pending[..len]);
        self.pending_len = 0;
        Some(len)
    }
}

/// The device's only network interface, in station or access point mode.
pub struct WifiNet {
    controller: WifiController<'static>,
    sta_device: WifiDevice<'static>,
    ap_device: WifiDevice<'static>,
    sta: StaLink,
    ap: ApLink,
    mode: Mode,
}

impl WifiNet {
    pub fn new(
        controller: WifiController<'static>,
        mut sta_device: WifiDevice<'static>,
        mut ap_device: WifiDevice<'static>,
    ) -> Self {
        let sta = StaLink::new(&mut sta_device);
        let ap = ApLink::new(&mut ap_device);
        Self {
            controller,
            sta_device,
            ap_device,
            sta,
            ap,
            mode: Mode::Idle,
        }
    }

    fn stop_radio(&mut self) {
        if let Err(e) = self.controller.stop() {
            log::debug!("wifi: stop failed: {:?}", e);
        }
        esp_radio_rtos_driver::usleep(POLL_INTERVAL_US);
        self.mode = Mode::Idle;
    }
}

impl Station for WifiNet {
    fn begin_connect(&mut self, credentials: &NetworkCredentials) -> Result<(), RadioError> {
        // The radio must be stopped before it is reconfigured.
        self.stop_radio();
        self.sta.reset();

        let mut client = ClientConfig::default()
            .with_ssid(credentials.ssid.to_string())
            .with_password(credentials.password.to_string());
        if credentials.is_open() {
            client = client.with_auth_method(AuthMethod::None);
        }
        self.controller
            .set_config(&ModeConfig::Client(client))
            .map_err(|e| {
                log::error!("wifi: set_config failed: {:?}", e);
                RadioError::Config
            })?;
        self.controller.start().map_err(|e| {
            log::error!("wifi: start failed: {:?}", e);
            RadioError::Start
        })?;
        self.controller.connect().map_err(|e| {
            log::error!("wifi: connect failed: {:?}", e);
            RadioError::Connect
        })?;
        self.mode = Mode::Station;
        Ok(())
    }

    fn is_link_up(&mut self) -> bool {
        if self.mode != Mode::Station || !self.controller.is_connected().unwrap_or(false) {
            return false;
        }
        self.sta.poll(&mut self.sta_device);
        self.sta.configured
    }
}

impl HttpClient for WifiNet {
    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<u16, TransportError> {
        let url = http::parse_url(url)?;
        let request = http::encode_post(&url, headers, body)?;
        if !self.is_link_up() {
            return Err(TransportError::LinkDown);
        }

        let ip = self.sta.resolve(&mut self.sta_device, url.host)?;
        log::debug!("http: POST {}:{}{}", ip, url.port, url.path);

        let mut response = [0u8; RESPONSE_BUFFER];
        let len = self.sta.exchange(
            &mut self.sta_device,
            (ip, url.port),
            request.as_bytes(),
            &mut response,
        )?;

        let header_end = http::find_header_end(&response[..len]).unwrap_or(len);
        core::str::from_utf8(&response[..header_end])
            .ok()
            .and_then(http::parse_status_code)
            .ok_or(TransportError::MalformedResponse)
    }
}

impl AccessPoint for WifiNet {
    fn start_access_point(&mut self, settings: &AccessPointSettings) -> Result<(), RadioError> {
        self.stop_radio();

        let config = AccessPointConfig::default()
            .with_ssid(settings.ssid.to_string())
            .with_password(settings.password.to_string())
            .with_auth_method(AuthMethod::Wpa2Personal);
        self.controller
            .set_config(&ModeConfig::AccessPoint(config))
            .map_err(|e| {
                log::error!("wifi: access point config failed: {:?}", e);
                RadioError::Config
            })?;
        self.controller.start().map_err(|e| {
            log::error!("wifi: access point start failed: {:?}", e);
            RadioError::Start
        })?;

        self.ap.configure(settings)?;
        self.mode = Mode::AccessPoint;
        Ok(())
    }

    fn poll_request(
        &mut self,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<Option<usize>, RadioError> {
        if self.mode != Mode::AccessPoint {
            return Err(RadioError::NotServing);
        }
        let deadline = now_ms() + timeout_ms;
        loop {
            self.ap.poll(&mut self.ap_device);
            if let Some(len) = self.ap.take_request(buf) {
                return Ok(Some(len));
            }
            if now_ms() >= deadline {
                return Ok(None);
            }
            pause();
        }
    }

    fn respond(&mut self, response: &[u8]) -> Result<(), RadioError> {
        if self.mode != Mode::AccessPoint {
            return Err(RadioError::NotServing);
        }
        {
            let socket = self.ap.sockets.get_mut::<TcpSocket>(self.ap.http);
            if !socket.may_send() {
                return Err(RadioError::Socket);
            }
            let sent = socket.send_slice(response).map_err(|_| RadioError::Socket)?;
            if sent < response.len() {
                log::warn!("portal: response truncated ({} of {})", sent, response.len());
            }
            socket.close();
        }

        // Push the response out before the caller moves on or restarts.
        let deadline = now_ms() + FLUSH_TIMEOUT_MS;
        loop {
            self.ap.poll(&mut self.ap_device);
            let socket = self.ap.sockets.get_mut::<TcpSocket>(self.ap.http);
            if socket.send_queue() == 0 || now_ms() >= deadline {
                return Ok(());
            }
            pause();
        }
    }
}

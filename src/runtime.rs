//! Top-level control loop.
//!
//! ```text
//! Uninitialized --boot--> Operational <--> (link retries)
//!        |                     |
//!        +------------------> Recovery  (portal until restart)
//! ```
//!
//! Operational ticks keep the station link alive, read one tag and report it.
//! Recovery runs the setup portal until new credentials are saved; the only
//! way out is a restart.

use core::convert::Infallible;

use crate::config::{AccessPointSettings, RuntimeConfig};
use crate::connectivity::ConnectivityManager;
use crate::dispatch::Dispatcher;
use crate::error::BootError;
use crate::feedback::{Feedback, Pattern, Signaler};
use crate::hal::{AccessPoint, Clock, CredentialStore, HttpClient, Station, TagReader, Transducer};
use crate::portal::{Portal, PortalStep};
use crate::scanner::Scanner;
use crate::types::{
    ConnectivityState, DeliveryOutcome, DeviceIdentity, NetworkCredentials, TapEvent,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Operational,
    Recovery,
}

/// What one operational tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Link up, no card presented.
    Idle,
    /// Link was down; the tag read was skipped.
    LinkRetry,
    EnteredRecovery,
    Reported(DeliveryOutcome),
}

pub struct Runtime<N, R, B, S, C> {
    config: RuntimeConfig,
    net: N,
    store: S,
    scanner: Scanner<R, C>,
    signaler: Signaler<B, C>,
    link: ConnectivityManager<C>,
    dispatcher: Dispatcher<C>,
    portal: Portal<C>,
    clock: C,
    identity: Option<DeviceIdentity>,
    credentials: Option<NetworkCredentials>,
    state: RuntimeState,
    restart_pending: bool,
}

impl<N, R, B, S, C> Runtime<N, R, B, S, C>
where
    N: Station + HttpClient + AccessPoint,
    R: TagReader,
    B: Transducer,
    S: CredentialStore,
    C: Clock,
{
    pub fn new(config: RuntimeConfig, net: N, reader: R, buzzer: B, store: S, clock: C) -> Self {
        Self {
            scanner: Scanner::new(reader, clock.clone(), &config),
            signaler: Signaler::new(buzzer, clock.clone()),
            link: ConnectivityManager::new(clock.clone(), &config),
            dispatcher: Dispatcher::new(clock.clone(), &config),
            portal: Portal::new(clock.clone(), &config),
            config,
            net,
            store,
            clock,
            identity: None,
            credentials: None,
            state: RuntimeState::Uninitialized,
            restart_pending: false,
        }
    }

    pub fn state(&self) -> RuntimeState {
        self.state
    }

    pub fn link_state(&self) -> ConnectivityState {
        self.link.state()
    }

    /// Set when recovery could not bring up the access point.
    pub fn restart_pending(&self) -> bool {
        self.restart_pending
    }

    pub fn boot(&mut self) -> Result<RuntimeState, BootError> {
        let identity = match self.store.load_identity() {
            Some(identity) => identity,
            None => {
                log::error!("boot: no device identity provisioned");
                return Err(BootError::IdentityMissing);
            }
        };
        log::info!(
            "boot: device {} reporting to {}",
            identity.device_id,
            identity.endpoint_url
        );
        self.identity = Some(identity);
        self.signaler.play(Pattern::Boot);

        self.credentials = self.store.load_network();
        let Some(credentials) = self.credentials.as_ref() else {
            log::warn!("boot: no network configured");
            self.enter_recovery();
            return Ok(self.state);
        };

        match self
            .link
            .ensure_link(&mut self.net, &mut self.signaler, credentials)
        {
            ConnectivityState::Connected => {
                log::info!("boot: operational");
                self.state = RuntimeState::Operational;
            }
            other => {
                log::warn!("boot: initial connect ended in {:?}", other);
                self.enter_recovery();
            }
        }
        Ok(self.state)
    }

    /// One operational iteration: link check, tag poll, report.
    pub fn tick(&mut self) -> Tick {
        let (Some(credentials), Some(identity)) = (self.credentials.as_ref(), self.identity.as_ref())
        else {
            self.enter_recovery();
            return Tick::EnteredRecovery;
        };

        match self
            .link
            .ensure_link(&mut self.net, &mut self.signaler, credentials)
        {
            ConnectivityState::Connected => {}
            ConnectivityState::RecoveryMode => {
                self.enter_recovery();
                return Tick::EnteredRecovery;
            }
            ConnectivityState::Reconnecting | ConnectivityState::Degraded => {
                return Tick::LinkRetry;
            }
        }

        let Some(uid) = self.scanner.poll(self.config.scan_timeout_ms) else {
            return Tick::Idle;
        };
        let tap = TapEvent::new(uid, self.clock.now_ms());
        log::info!("scan: card {}", tap.card_id());

        let outcome = self
            .dispatcher
            .report(&mut self.net, &mut self.signaler, &tap, identity);
        self.scanner.wait_for_removal();
        Tick::Reported(outcome)
    }

    /// One recovery iteration.
    pub fn portal_tick(&mut self) -> PortalStep {
        self.portal.step(
            &mut self.net,
            &mut self.store,
            &mut self.scanner,
            &mut self.signaler,
        )
    }

    fn enter_recovery(&mut self) {
        self.state = RuntimeState::Recovery;
        let settings = AccessPointSettings::FIXED;
        match self.net.start_access_point(&settings) {
            Ok(()) => log::info!("recovery: join '{}' to configure", settings.ssid),
            Err(e) => {
                log::error!("recovery: access point failed: {}", e);
                self.signaler.play(Pattern::WifiError);
                self.restart_pending = true;
            }
        }
    }

    /// Boot and loop forever. Only returns when boot fails.
    pub fn run(mut self, restart: fn() -> !) -> Result<Infallible, BootError> {
        self.boot()?;
        loop {
            if self.restart_pending {
                self.clock.sleep_ms(self.config.restart_delay_ms);
                restart();
            }
            match self.state {
                RuntimeState::Operational => {
                    self.tick();
                }
                RuntimeState::Recovery => {
                    if let PortalStep::Saved(_) = self.portal_tick() {
                        log::info!("recovery: restarting with new network");
                        self.restart_pending = true;
                    }
                }
                RuntimeState::Uninitialized => {
                    self.boot()?;
                }
            }
        }
    }
}

//! WiFi station-mode adapter.
//!
//! Implements [`LinkPort`], the hexagonal boundary for the wireless link.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//! - **all other targets**: a simulated link whose state tests flip directly.
//!
//! `reconnect()` never blocks: it asks the driver to associate and
//! returns.  The supervisor observes progress through `is_connected()`,
//! which only reports true once the station interface has an address.

use core::net::Ipv4Addr;

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{LinkPort, MacAddress};
use crate::config::{validate_password, validate_ssid};
use crate::error::LinkError;

use super::device_id;

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiLink {
    ssid: heapless::String<32>,
    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::EspWifi<'static>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimState,
}

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
struct SimState {
    up: bool,
    /// Whether a reconnect request brings the link up.
    heals: bool,
    rssi: i8,
    reconnects: u32,
}

impl WifiLink {
    /// Configure the station and start the driver.  Does not wait for
    /// association; the first `reconnect()` does that.
    #[cfg(target_os = "espidf")]
    pub fn new(
        mut wifi: esp_idf_svc::wifi::EspWifi<'static>,
        ssid: &str,
        password: &str,
    ) -> Result<Self, LinkError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let ssid = credential::<32>(ssid, validate_ssid(ssid))?;
        let pass = credential::<64>(password, validate_password(password))?;
        let auth_method = if pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: ssid.clone(),
            password: pass,
            auth_method,
            ..Default::default()
        }))
        .map_err(|e| {
            warn!("WiFi configuration rejected: {:?}", e);
            LinkError::ConnectionFailed
        })?;
        wifi.start().map_err(|e| {
            warn!("WiFi start failed: {:?}", e);
            LinkError::ConnectionFailed
        })?;

        info!("WiFi STA started for '{}'", ssid);
        Ok(Self { ssid, wifi })
    }

    /// Simulated link.  `heals` decides whether `reconnect()` succeeds.
    #[cfg(not(target_os = "espidf"))]
    pub fn simulated(ssid: &str, password: &str, heals: bool) -> Result<Self, LinkError> {
        let ssid = credential::<32>(ssid, validate_ssid(ssid))?;
        validate_password(password)?;
        Ok(Self {
            ssid,
            sim: SimState {
                heals,
                rssi: -60,
                ..SimState::default()
            },
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }
}

fn credential<const N: usize>(
    value: &str,
    check: Result<(), LinkError>,
) -> Result<heapless::String<N>, LinkError> {
    check?;
    let mut out = heapless::String::new();
    out.push_str(value).map_err(|()| LinkError::NoCredentials)?;
    Ok(out)
}

// ── Simulation controls ───────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl WifiLink {
    pub fn set_up(&mut self, up: bool) {
        self.sim.up = up;
    }

    pub fn set_heals(&mut self, heals: bool) {
        self.sim.heals = heals;
    }

    pub fn set_rssi(&mut self, rssi: i8) {
        self.sim.rssi = rssi;
    }

    pub fn reconnects(&self) -> u32 {
        self.sim.reconnects
    }
}

// ── LinkPort implementation ───────────────────────────────────

#[cfg(target_os = "espidf")]
impl LinkPort for WifiLink {
    fn reconnect(&mut self) {
        info!("WiFi: associating with '{}'", self.ssid);
        if let Err(e) = self.wifi.connect() {
            warn!("WiFi connect request failed: {:?}", e);
        }
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.sta_netif().is_up().unwrap_or(false)
    }

    fn rssi(&self) -> Option<i8> {
        let mut info = esp_idf_svc::sys::wifi_ap_record_t::default();
        // SAFETY: `info` is a valid, writable record for the duration of the call.
        let err = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut info) };
        (err == esp_idf_svc::sys::ESP_OK).then_some(info.rssi)
    }

    fn mac_address(&self) -> MacAddress {
        device_id::read_mac()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        let ip = self.wifi.sta_netif().get_ip_info().ok()?.ip;
        (!ip.is_unspecified()).then_some(ip)
    }
}

#[cfg(not(target_os = "espidf"))]
impl LinkPort for WifiLink {
    fn reconnect(&mut self) {
        self.sim.reconnects += 1;
        info!("WiFi(sim): reconnect #{} to '{}'", self.sim.reconnects, self.ssid);
        if self.sim.heals {
            self.sim.up = true;
        }
    }

    fn is_connected(&self) -> bool {
        self.sim.up
    }

    fn rssi(&self) -> Option<i8> {
        self.sim.up.then_some(self.sim.rssi)
    }

    fn mac_address(&self) -> MacAddress {
        device_id::read_mac()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.sim.up.then(|| Ipv4Addr::new(192, 168, 1, 50))
    }
}

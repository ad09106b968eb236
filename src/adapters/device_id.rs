//! Hardware and network address text for the online status message.
//!
//! The station MAC is the factory-burned eFuse address, so the `mac`
//! field of the status message is stable across reboots.

use core::fmt::Write;
use core::net::Ipv4Addr;

use crate::app::ports::MacAddress;

/// `AA:BB:CC:DD:EE:FF`
pub type MacString = heapless::String<17>;

/// Dotted quad, at most `255.255.255.255`.
pub type IpString = heapless::String<15>;

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: `mac` is a writable 6-byte buffer, as the call requires.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Upper-case, colon-separated hex.
pub fn format_mac(mac: &MacAddress) -> MacString {
    let mut s = MacString::new();
    let _ = write!(
        s,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    s
}

/// `0.0.0.0` when the interface has no address.
pub fn format_ip(ip: Option<Ipv4Addr>) -> IpString {
    let mut s = IpString::new();
    let _ = write!(s, "{}", ip.unwrap_or(Ipv4Addr::UNSPECIFIED));
    s
}

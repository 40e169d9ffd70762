//! RB-032: dhcpcd profiles and wpa_supplicant configuration.

use super::Shared;
use crate::core::error::{Error, Result};
use std::fmt;
use std::fmt::Write as _;
use std::net::IpAddr;
use std::str::FromStr;

/// Which half of a [`Profile`] is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileKind {
    #[default]
    Dhcp,
    Static,
}

impl ProfileKind {
    pub fn name(self) -> &'static str {
        match self {
            ProfileKind::Dhcp => "DHCP",
            ProfileKind::Static => "Static",
        }
    }
}

/// An address with its prefix length. Unlike a network, the host bits are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::eval(format!("invalid CIDR address: {}", s));
        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(invalid());
        }
        Ok(Cidr { addr, prefix })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Parse an IP literal, naming `field` on failure.
pub fn parse_ip(field: &str, s: &str) -> Result<IpAddr> {
    s.parse()
        .map_err(|_| Error::eval(format!("{}: invalid IP address {:?}", field, s)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpSettings {
    pub lease_seconds: i64,
    pub client_id: bool,
    pub present_hostname: bool,
    pub hostname: String,
    pub persistent: bool,
    pub rapid_commit: bool,
    pub setup_dns: bool,
    pub request_ntp: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSettings {
    pub network: Option<Cidr>,
    pub broadcast: Option<IpAddr>,
    pub ipv6: Option<IpAddr>,
    pub routers: Vec<IpAddr>,
    pub dns: Vec<String>,
}

/// One dhcpcd section. Only one of `name` or `interface` is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub kind: ProfileKind,
    pub name: String,
    pub interface: String,
    pub dhcp: DhcpSettings,
    pub fixed: StaticSettings,
}

impl Profile {
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.name.is_empty() {
            let _ = writeln!(out, "profile {}", self.name);
        } else if !self.interface.is_empty() {
            let _ = writeln!(out, "interface {}", self.interface);
        }

        match self.kind {
            ProfileKind::Dhcp => {
                let d = &self.dhcp;
                out.push_str("dhcp\n");
                if d.present_hostname {
                    if d.hostname.is_empty() {
                        out.push_str("hostname\n");
                    } else {
                        let _ = writeln!(out, "hostname {}", d.hostname);
                    }
                }
                if d.client_id {
                    out.push_str("clientid\n");
                }
                if d.persistent {
                    out.push_str("persistent\n");
                }
                if d.rapid_commit {
                    out.push_str("option rapid_commit\n");
                }
                if d.setup_dns {
                    out.push_str("option domain_name_servers\n");
                }
                if d.request_ntp {
                    out.push_str("option ntp_servers\n");
                }
                if d.lease_seconds > 0 {
                    let _ = writeln!(out, "leasetime {}", d.lease_seconds);
                }
            }
            ProfileKind::Static => {
                let s = &self.fixed;
                if let Some(network) = &s.network {
                    let _ = writeln!(out, "static ip_address={}", network);
                }
                if let Some(broadcast) = &s.broadcast {
                    let _ = writeln!(out, "static broadcast_address={}", broadcast);
                }
                if let Some(ipv6) = &s.ipv6 {
                    let _ = writeln!(out, "static ip6_address={}", ipv6);
                }
                if !s.routers.is_empty() {
                    let routers: Vec<String> = s.routers.iter().map(|r| r.to_string()).collect();
                    let _ = writeln!(out, "static routers={}", routers.join(" "));
                }
                if !s.dns.is_empty() {
                    let _ = writeln!(out, "static domain_name_servers={}", s.dns.join(" "));
                }
            }
        }
        out
    }
}

/// dhcpcd.conf contents. Profiles are shared so proxies read from the list alias it.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DhcpClientConf {
    pub control_group: String,
    pub profiles: Vec<Shared<Profile>>,
}

impl DhcpClientConf {
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.control_group.is_empty() {
            let _ = writeln!(out, "controlgroup {}", self.control_group);
        }
        let sections: Vec<String> = self.profiles.iter().map(|p| p.borrow().render()).collect();
        out.push_str(&sections.join("\n"));
        out
    }
}

pub const MODE_CLIENT: u8 = 0;
pub const MODE_ADHOC: u8 = 1;
pub const MODE_AP: u8 = 2;

/// A `network={...}` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WifiNetwork {
    pub mode: u8,
    pub disabled: bool,
    pub ssid: String,
    pub psk: String,
}

impl WifiNetwork {
    pub fn render(&self) -> String {
        let mut out = String::from("network={\n");
        let _ = writeln!(out, "\tmode={}", self.mode);
        let _ = writeln!(out, "\tdisabled={}", u8::from(self.disabled));
        let _ = writeln!(out, "\tssid={:?}", self.ssid);
        let _ = writeln!(out, "\tpsk={:?}", self.psk);
        out.push_str("}\n");
        out
    }
}

/// wpa_supplicant.conf contents.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SupplicantConfig {
    pub control_interface: String,
    pub control_interface_group: String,
    pub allow_update_config: bool,
    pub country_code: String,
    pub device_name: String,
    pub networks: Vec<Shared<WifiNetwork>>,
}

impl SupplicantConfig {
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.control_interface.is_empty() {
            if !self.control_interface_group.is_empty() {
                let _ = writeln!(
                    out,
                    "DIR={} GROUP={}",
                    self.control_interface, self.control_interface_group
                );
            }
            let _ = writeln!(out, "ctrl_interface={}", self.control_interface);
        }
        let _ = writeln!(out, "update_config={}", u8::from(self.allow_update_config));
        if !self.country_code.is_empty() {
            let _ = writeln!(out, "country={}", self.country_code);
        }
        if !self.device_name.is_empty() {
            let _ = writeln!(out, "device_name={}", self.device_name);
        }
        let networks: Vec<String> = self.networks.iter().map(|n| n.borrow().render()).collect();
        out.push_str(&networks.join("\n"));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::shared;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_net_dhcpcd_empty() {
        assert_eq!(DhcpClientConf::default().render(), "");
    }

    #[test]
    fn test_net_dhcpcd_dhcp_interface() {
        let conf = DhcpClientConf {
            profiles: vec![shared(Profile {
                interface: "eth0".into(),
                ..Default::default()
            })],
            ..Default::default()
        };
        assert_eq!(conf.render(), "interface eth0\ndhcp\n");
    }

    #[test]
    fn test_net_dhcpcd_static_interface() {
        let conf = DhcpClientConf {
            profiles: vec![shared(Profile {
                kind: ProfileKind::Static,
                interface: "eth0".into(),
                fixed: StaticSettings {
                    network: Some("192.168.1.5/24".parse().unwrap()),
                    routers: vec![ip("192.168.1.1"), ip("192.168.1.11")],
                    dns: vec!["8.8.8.8".into()],
                    ..Default::default()
                },
                ..Default::default()
            })],
            ..Default::default()
        };
        assert_eq!(
            conf.render(),
            "interface eth0\nstatic ip_address=192.168.1.5/24\n\
             static routers=192.168.1.1 192.168.1.11\nstatic domain_name_servers=8.8.8.8\n"
        );
    }

    #[test]
    fn test_net_dhcpcd_profiles_and_options() {
        let conf = DhcpClientConf {
            control_group: "netdev".into(),
            profiles: vec![
                shared(Profile {
                    name: "fallback".into(),
                    dhcp: DhcpSettings {
                        present_hostname: true,
                        client_id: true,
                        rapid_commit: true,
                        lease_seconds: 3600,
                        ..Default::default()
                    },
                    ..Default::default()
                }),
                shared(Profile {
                    interface: "wlan0".into(),
                    dhcp: DhcpSettings {
                        hostname: "pi".into(),
                        present_hostname: true,
                        ..Default::default()
                    },
                    ..Default::default()
                }),
            ],
        };
        assert_eq!(
            conf.render(),
            "controlgroup netdev\nprofile fallback\ndhcp\nhostname\nclientid\n\
             option rapid_commit\nleasetime 3600\n\ninterface wlan0\ndhcp\nhostname pi\n"
        );
    }

    #[test]
    fn test_net_cidr_keeps_host_address() {
        let c: Cidr = "192.168.1.5/24".parse().unwrap();
        assert_eq!(c.addr, ip("192.168.1.5"));
        assert_eq!(c.prefix, 24);
        assert_eq!(c.to_string(), "192.168.1.5/24");
        assert_eq!("fd00::1/64".parse::<Cidr>().unwrap().to_string(), "fd00::1/64");
    }

    #[test]
    fn test_net_cidr_rejects_invalid() {
        for bad in ["192.168.1.5", "192.168.1.5/33", "nope/8", "10.0.0.1/x", ""] {
            assert!(bad.parse::<Cidr>().is_err(), "{:?} should not parse", bad);
        }
        assert!(parse_ip("routers", "1.2.3").is_err());
    }

    #[test]
    fn test_net_supplicant_render() {
        let conf = SupplicantConfig {
            allow_update_config: true,
            country_code: "US".into(),
            networks: vec![shared(WifiNetwork {
                ssid: "yolo".into(),
                psk: "swaggins".into(),
                ..Default::default()
            })],
            ..Default::default()
        };
        assert_eq!(
            conf.render(),
            "update_config=1\ncountry=US\nnetwork={\n\tmode=0\n\tdisabled=0\n\
             \tssid=\"yolo\"\n\tpsk=\"swaggins\"\n}\n"
        );
    }

    #[test]
    fn test_net_supplicant_control_interface() {
        let conf = SupplicantConfig {
            control_interface: "/var/run/wpa_supplicant".into(),
            control_interface_group: "netdev".into(),
            device_name: "pi".into(),
            ..Default::default()
        };
        assert_eq!(
            conf.render(),
            "DIR=/var/run/wpa_supplicant GROUP=netdev\nctrl_interface=/var/run/wpa_supplicant\n\
             update_config=0\ndevice_name=pi\n"
        );
    }
}

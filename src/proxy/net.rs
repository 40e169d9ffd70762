//! RB-052: Adapters for dhcpcd profiles and wpa_supplicant configuration.
//!
//! DHCP and static profiles share one record and one adapter; the profile's
//! kind decides how `dns` reads and writes and which type name is reported.

use super::{construct, expect_proxy, uint_arg, Field, Proxy};
use crate::conf::net::{
    parse_ip, Cidr, DhcpClientConf, Profile, ProfileKind, SupplicantConfig, WifiNetwork,
};
use crate::conf::{shared, Shared};
use crate::core::error::Result;
use crate::lang::value::{Arguments, Value};
use std::net::IpAddr;

/// `net.DHCPProfile` / `net.StaticProfile`.
pub struct ProfileProxy {
    profile: Shared<Profile>,
}

impl ProfileProxy {
    pub fn new(profile: Shared<Profile>) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &Shared<Profile> {
        &self.profile
    }
}

fn optional_ip(v: &Value, ctx: &str) -> Result<Option<IpAddr>> {
    let s = v.expect_str(ctx)?;
    if s.is_empty() {
        return Ok(None);
    }
    parse_ip(ctx, &s).map(Some)
}

fn ip_string(ip: Option<IpAddr>) -> Value {
    Value::str(&ip.map(|ip| ip.to_string()).unwrap_or_default())
}

const PROFILE_FIELDS: &[Field<ProfileProxy>] = &[
    Field {
        name: "name",
        get: |p: &ProfileProxy| Ok(Value::str(&p.profile.borrow().name)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            p.profile.borrow_mut().name = v.expect_str(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "interface",
        get: |p: &ProfileProxy| Ok(Value::str(&p.profile.borrow().interface)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            p.profile.borrow_mut().interface = v.expect_str(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "hostname",
        get: |p: &ProfileProxy| Ok(Value::str(&p.profile.borrow().dhcp.hostname)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            let hostname = v.expect_str(ctx)?;
            let mut profile = p.profile.borrow_mut();
            profile.dhcp.present_hostname = !hostname.is_empty();
            profile.dhcp.hostname = hostname;
            Ok(())
        }),
    },
    Field {
        name: "lease_seconds",
        get: |p: &ProfileProxy| Ok(Value::from(p.profile.borrow().dhcp.lease_seconds)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            p.profile.borrow_mut().dhcp.lease_seconds = uint_arg(v, ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "client_id",
        get: |p: &ProfileProxy| Ok(Value::Bool(p.profile.borrow().dhcp.client_id)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            p.profile.borrow_mut().dhcp.client_id = v.expect_bool(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "persistent",
        get: |p: &ProfileProxy| Ok(Value::Bool(p.profile.borrow().dhcp.persistent)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            p.profile.borrow_mut().dhcp.persistent = v.expect_bool(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "rapid_commit",
        get: |p: &ProfileProxy| Ok(Value::Bool(p.profile.borrow().dhcp.rapid_commit)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            p.profile.borrow_mut().dhcp.rapid_commit = v.expect_bool(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "dns",
        get: |p: &ProfileProxy| {
            let profile = p.profile.borrow();
            Ok(match profile.kind {
                ProfileKind::Dhcp => Value::Bool(profile.dhcp.setup_dns),
                ProfileKind::Static => Value::str_list(&profile.fixed.dns),
            })
        },
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            let kind = p.profile.borrow().kind;
            match kind {
                ProfileKind::Dhcp => p.profile.borrow_mut().dhcp.setup_dns = v.expect_bool(ctx)?,
                ProfileKind::Static => p.profile.borrow_mut().fixed.dns = v.expect_str_list(ctx)?,
            }
            Ok(())
        }),
    },
    Field {
        name: "ntp",
        get: |p: &ProfileProxy| Ok(Value::Bool(p.profile.borrow().dhcp.request_ntp)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            p.profile.borrow_mut().dhcp.request_ntp = v.expect_bool(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "network",
        get: |p: &ProfileProxy| {
            let network = p.profile.borrow().fixed.network;
            Ok(Value::str(&network.map(|n| n.to_string()).unwrap_or_default()))
        },
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            let s = v.expect_str(ctx)?;
            let network = if s.is_empty() {
                None
            } else {
                Some(s.parse::<Cidr>()?)
            };
            p.profile.borrow_mut().fixed.network = network;
            Ok(())
        }),
    },
    Field {
        name: "broadcast",
        get: |p: &ProfileProxy| Ok(ip_string(p.profile.borrow().fixed.broadcast)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            p.profile.borrow_mut().fixed.broadcast = optional_ip(v, ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "ipv6",
        get: |p: &ProfileProxy| Ok(ip_string(p.profile.borrow().fixed.ipv6)),
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            p.profile.borrow_mut().fixed.ipv6 = optional_ip(v, ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "routers",
        get: |p: &ProfileProxy| {
            let profile = p.profile.borrow();
            Ok(Value::list(
                profile.fixed.routers.iter().map(|r| Value::str(&r.to_string())).collect(),
            ))
        },
        set: Some(|p: &ProfileProxy, v: &Value, ctx: &str| {
            let routers = v
                .expect_str_list(ctx)?
                .iter()
                .enumerate()
                .map(|(i, s)| parse_ip(&format!("{}[{}]", ctx, i), s))
                .collect::<Result<Vec<_>>>()?;
            p.profile.borrow_mut().fixed.routers = routers;
            Ok(())
        }),
    },
];

impl Proxy for ProfileProxy {
    fn proxy_type(&self) -> String {
        format!("net.{}Profile", self.profile.borrow().kind.name())
    }

    fn rendered(&self) -> String {
        self.profile.borrow().render()
    }

    fn fields(&self) -> &'static [Field<Self>] {
        PROFILE_FIELDS
    }
}

fn profile_of(kind: ProfileKind) -> ProfileProxy {
    ProfileProxy::new(shared(Profile {
        kind,
        ..Default::default()
    }))
}

pub fn new_dhcp_profile(args: Arguments) -> Result<Value> {
    let proxy = construct(
        profile_of(ProfileKind::Dhcp),
        "DHCPProfile",
        &[
            "name?",
            "interface",
            "hostname",
            "client_id",
            "persistent",
            "rapid_commit",
            "dns",
            "request_ntp=ntp",
            "lease_seconds",
        ],
        &args,
    )?;
    Ok(Value::native(proxy))
}

pub fn new_static_profile(args: Arguments) -> Result<Value> {
    let proxy = construct(
        profile_of(ProfileKind::Static),
        "StaticProfile",
        &["name?", "interface", "network", "broadcast", "ipv6", "routers", "dns"],
        &args,
    )?;
    Ok(Value::native(proxy))
}

/// `net.DHCPClient`. Assigned profiles are copied in; read profiles alias the client.
pub struct DhcpClientProxy {
    conf: Shared<DhcpClientConf>,
}

impl DhcpClientProxy {
    pub fn new(conf: Shared<DhcpClientConf>) -> Self {
        Self { conf }
    }
}

fn profiles_arg(v: &Value, ctx: &str) -> Result<Vec<Shared<Profile>>> {
    v.expect_list(ctx)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            expect_proxy::<ProfileProxy>(item, &format!("{}[{}]", ctx, i), "net.DHCPProfile or net.StaticProfile")
                .map(|p| shared(p.profile.borrow().clone()))
        })
        .collect()
}

const CLIENT_FIELDS: &[Field<DhcpClientProxy>] = &[
    Field {
        name: "control_group",
        get: |p: &DhcpClientProxy| Ok(Value::str(&p.conf.borrow().control_group)),
        set: Some(|p: &DhcpClientProxy, v: &Value, ctx: &str| {
            p.conf.borrow_mut().control_group = v.expect_str(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "profiles",
        get: |p: &DhcpClientProxy| {
            let conf = p.conf.borrow();
            Ok(Value::list(
                conf.profiles
                    .iter()
                    .map(|s| Value::native(ProfileProxy::new(s.clone())))
                    .collect(),
            ))
        },
        set: Some(|p: &DhcpClientProxy, v: &Value, ctx: &str| {
            p.conf.borrow_mut().profiles = profiles_arg(v, ctx)?;
            Ok(())
        }),
    },
];

impl Proxy for DhcpClientProxy {
    fn proxy_type(&self) -> String {
        "net.DHCPClient".into()
    }

    fn rendered(&self) -> String {
        self.conf.borrow().render()
    }

    fn fields(&self) -> &'static [Field<Self>] {
        CLIENT_FIELDS
    }
}

pub fn new_dhcp_client(args: Arguments) -> Result<Value> {
    let proxy = construct(
        DhcpClientProxy::new(shared(DhcpClientConf::default())),
        "DHCPClient",
        &["control_group?", "profiles"],
        &args,
    )?;
    Ok(Value::native(proxy))
}

/// `net.wifi.Network`.
pub struct WifiNetworkProxy {
    network: Shared<WifiNetwork>,
}

impl WifiNetworkProxy {
    pub fn new(network: Shared<WifiNetwork>) -> Self {
        Self { network }
    }
}

const NETWORK_FIELDS: &[Field<WifiNetworkProxy>] = &[
    Field {
        name: "mode",
        get: |p: &WifiNetworkProxy| Ok(Value::Int(p.network.borrow().mode.into())),
        set: Some(|p: &WifiNetworkProxy, v: &Value, ctx: &str| {
            p.network.borrow_mut().mode = uint_arg(v, ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "ssid",
        get: |p: &WifiNetworkProxy| Ok(Value::str(&p.network.borrow().ssid)),
        set: Some(|p: &WifiNetworkProxy, v: &Value, ctx: &str| {
            p.network.borrow_mut().ssid = v.expect_str(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "psk",
        get: |p: &WifiNetworkProxy| Ok(Value::str(&p.network.borrow().psk)),
        set: Some(|p: &WifiNetworkProxy, v: &Value, ctx: &str| {
            p.network.borrow_mut().psk = v.expect_str(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "disabled",
        get: |p: &WifiNetworkProxy| Ok(Value::Bool(p.network.borrow().disabled)),
        set: Some(|p: &WifiNetworkProxy, v: &Value, ctx: &str| {
            p.network.borrow_mut().disabled = v.expect_bool(ctx)?;
            Ok(())
        }),
    },
];

impl Proxy for WifiNetworkProxy {
    fn proxy_type(&self) -> String {
        "net.wifi.Network".into()
    }

    fn rendered(&self) -> String {
        self.network.borrow().render()
    }

    fn fields(&self) -> &'static [Field<Self>] {
        NETWORK_FIELDS
    }
}

pub fn new_wifi_network(args: Arguments) -> Result<Value> {
    let proxy = construct(
        WifiNetworkProxy::new(shared(WifiNetwork::default())),
        "Network",
        &["mode?", "ssid", "psk", "disabled"],
        &args,
    )?;
    Ok(Value::native(proxy))
}

/// `net.wifi.SupplicantConfig`.
pub struct SupplicantProxy {
    conf: Shared<SupplicantConfig>,
}

impl SupplicantProxy {
    pub fn new(conf: Shared<SupplicantConfig>) -> Self {
        Self { conf }
    }
}

fn networks_arg(v: &Value, ctx: &str) -> Result<Vec<Shared<WifiNetwork>>> {
    v.expect_list(ctx)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            expect_proxy::<WifiNetworkProxy>(item, &format!("{}[{}]", ctx, i), "net.wifi.Network")
                .map(|n| shared(n.network.borrow().clone()))
        })
        .collect()
}

macro_rules! supplicant_str {
    ($name:literal, $field:ident) => {
        Field {
            name: $name,
            get: |p: &SupplicantProxy| Ok(Value::str(&p.conf.borrow().$field)),
            set: Some(|p: &SupplicantProxy, v: &Value, ctx: &str| {
                p.conf.borrow_mut().$field = v.expect_str(ctx)?;
                Ok(())
            }),
        }
    };
}

const SUPPLICANT_FIELDS: &[Field<SupplicantProxy>] = &[
    supplicant_str!("control_interface", control_interface),
    supplicant_str!("control_interface_group", control_interface_group),
    Field {
        name: "allow_update_config",
        get: |p: &SupplicantProxy| Ok(Value::Bool(p.conf.borrow().allow_update_config)),
        set: Some(|p: &SupplicantProxy, v: &Value, ctx: &str| {
            p.conf.borrow_mut().allow_update_config = v.expect_bool(ctx)?;
            Ok(())
        }),
    },
    supplicant_str!("country_code", country_code),
    supplicant_str!("device_name", device_name),
    Field {
        name: "networks",
        get: |p: &SupplicantProxy| {
            let conf = p.conf.borrow();
            Ok(Value::list(
                conf.networks
                    .iter()
                    .map(|n| Value::native(WifiNetworkProxy::new(n.clone())))
                    .collect(),
            ))
        },
        set: Some(|p: &SupplicantProxy, v: &Value, ctx: &str| {
            p.conf.borrow_mut().networks = networks_arg(v, ctx)?;
            Ok(())
        }),
    },
];

impl Proxy for SupplicantProxy {
    fn proxy_type(&self) -> String {
        "net.wifi.SupplicantConfig".into()
    }

    fn rendered(&self) -> String {
        self.conf.borrow().render()
    }

    fn fields(&self) -> &'static [Field<Self>] {
        SUPPLICANT_FIELDS
    }
}

pub fn new_supplicant_config(args: Arguments) -> Result<Value> {
    let proxy = construct(
        SupplicantProxy::new(shared(SupplicantConfig::default())),
        "SupplicantConfig",
        &[
            "control_interface?",
            "control_interface_group",
            "allow_update_config",
            "country_code",
            "device_name",
            "networks",
        ],
        &args,
    )?;
    Ok(Value::native(proxy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::lang::value::{get_attr, set_attr};
    use proptest::prelude::*;

    fn kwargs(pairs: Vec<(&str, Value)>) -> Arguments {
        Arguments {
            positional: vec![],
            named: pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn static_profile() -> Value {
        new_static_profile(kwargs(vec![
            ("interface", Value::str("eth0")),
            ("network", Value::str("192.168.1.5/24")),
            ("routers", Value::str_list(&["192.168.1.1".into(), "192.168.1.11".into()])),
            ("dns", Value::str_list(&["8.8.8.8".into()])),
        ]))
        .unwrap()
    }

    #[test]
    fn test_static_profile_network_reassign_is_noop() {
        let p = static_profile();
        let before = p.to_str();
        let network = get_attr(&p, "network").unwrap();
        assert_eq!(network.expect_str("network").unwrap(), "192.168.1.5/24");
        set_attr(&p, "network", network).unwrap();
        assert_eq!(get_attr(&p, "network").unwrap().expect_str("n").unwrap(), "192.168.1.5/24");
        assert_eq!(p.to_str(), before);
        assert_eq!(
            before,
            "interface eth0\nstatic ip_address=192.168.1.5/24\n\
             static routers=192.168.1.1 192.168.1.11\nstatic domain_name_servers=8.8.8.8\n"
        );
    }

    #[test]
    fn test_static_profile_rejects_bad_addresses() {
        let p = static_profile();
        assert!(set_attr(&p, "network", Value::str("192.168.1.5")).is_err());
        assert!(set_attr(&p, "routers", Value::str_list(&["nope".into()])).is_err());
        assert!(set_attr(&p, "broadcast", Value::str("1.2.3")).is_err());
        // Nothing changed.
        assert_eq!(
            get_attr(&p, "routers").unwrap().expect_str_list("r").unwrap(),
            ["192.168.1.1", "192.168.1.11"]
        );
        set_attr(&p, "broadcast", Value::str("192.168.1.255")).unwrap();
        assert!(p.to_str().contains("static broadcast_address=192.168.1.255\n"));
        set_attr(&p, "broadcast", Value::str("")).unwrap();
        assert_eq!(get_attr(&p, "broadcast").unwrap().expect_str("b").unwrap(), "");
    }

    #[test]
    fn test_profile_dns_depends_on_kind() {
        let dhcp = new_dhcp_profile(kwargs(vec![("dns", Value::Bool(true))])).unwrap();
        assert_eq!(dhcp.type_name(), "net.DHCPProfile");
        assert!(get_attr(&dhcp, "dns").unwrap().expect_bool("dns").unwrap());
        assert!(matches!(
            set_attr(&dhcp, "dns", Value::str_list(&[])),
            Err(Error::TypeMismatch { .. })
        ));

        let st = static_profile();
        assert_eq!(st.type_name(), "net.StaticProfile");
        assert!(matches!(
            set_attr(&st, "dns", Value::Bool(true)),
            Err(Error::TypeMismatch { .. })
        ));
        set_attr(&st, "dns", Value::str_list(&["1.1.1.1".into(), "9.9.9.9".into()])).unwrap();
        assert_eq!(
            get_attr(&st, "dns").unwrap().expect_str_list("dns").unwrap(),
            ["1.1.1.1", "9.9.9.9"]
        );
    }

    #[test]
    fn test_dhcp_profile_hostname_presence() {
        let p = new_dhcp_profile(kwargs(vec![
            ("interface", Value::str("wlan0")),
            ("hostname", Value::str("pi")),
            ("request_ntp", Value::Bool(true)),
        ]))
        .unwrap();
        assert_eq!(p.to_str(), "interface wlan0\ndhcp\nhostname pi\noption ntp_servers\n");
        assert!(get_attr(&p, "ntp").unwrap().expect_bool("ntp").unwrap());
        set_attr(&p, "hostname", Value::str("")).unwrap();
        assert_eq!(p.to_str(), "interface wlan0\ndhcp\noption ntp_servers\n");
    }

    #[test]
    fn test_dhcp_client_copies_on_assign_and_aliases_on_read() {
        let profile = static_profile();
        let client = new_dhcp_client(kwargs(vec![("profiles", Value::list(vec![profile.clone()]))])).unwrap();

        // Later edits to the original profile do not reach the client.
        set_attr(&profile, "interface", Value::str("eth1")).unwrap();
        assert!(client.to_str().starts_with("interface eth0\n"));

        // Profiles read back from the client do.
        let read = get_attr(&client, "profiles").unwrap().expect_list("p").unwrap();
        set_attr(&read[0], "interface", Value::str("eth2")).unwrap();
        assert!(client.to_str().starts_with("interface eth2\n"));
    }

    #[test]
    fn test_dhcp_client_rejects_foreign_profiles() {
        let client = new_dhcp_client(Arguments::default()).unwrap();
        let err = set_attr(&client, "profiles", Value::list(vec![Value::Int(1)])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "set_profiles[0]: expected net.DHCPProfile or net.StaticProfile, got int"
        );
    }

    #[test]
    fn test_supplicant_config_render() {
        let network = new_wifi_network(kwargs(vec![
            ("ssid", Value::str("yolo")),
            ("psk", Value::str("swaggins")),
        ]))
        .unwrap();
        let conf = new_supplicant_config(kwargs(vec![
            ("allow_update_config", Value::Bool(true)),
            ("country_code", Value::str("US")),
            ("networks", Value::list(vec![network])),
        ]))
        .unwrap();
        assert_eq!(
            conf.to_str(),
            "update_config=1\ncountry=US\nnetwork={\n\tmode=0\n\tdisabled=0\n\
             \tssid=\"yolo\"\n\tpsk=\"swaggins\"\n}\n"
        );
        let networks = get_attr(&conf, "networks").unwrap().expect_list("n").unwrap();
        assert_eq!(networks[0].type_name(), "net.wifi.Network");
    }

    #[test]
    fn test_wifi_network_mode_range() {
        let n = new_wifi_network(Arguments::default()).unwrap();
        set_attr(&n, "mode", Value::Int(2)).unwrap();
        assert_eq!(get_attr(&n, "mode").unwrap().expect_int("m").unwrap(), 2);
        assert!(set_attr(&n, "mode", Value::Int(-1)).is_err());
        assert!(set_attr(&n, "mode", Value::str("ap")).is_err());
    }

    proptest! {
        #[test]
        fn test_static_network_round_trip(a in 1u8..255, b in any::<u8>(), c in any::<u8>(), d in 1u8..255, prefix in 0u8..=32) {
            let p = new_static_profile(Arguments::default()).unwrap();
            let cidr = format!("{}.{}.{}.{}/{}", a, b, c, d, prefix);
            set_attr(&p, "network", Value::str(&cidr)).unwrap();
            prop_assert_eq!(get_attr(&p, "network").unwrap().expect_str("n").unwrap(), cidr);
        }

        #[test]
        fn test_dhcp_bools_round_trip(flags in proptest::collection::vec(any::<bool>(), 5)) {
            let p = new_dhcp_profile(Arguments::default()).unwrap();
            let names = ["client_id", "persistent", "rapid_commit", "dns", "ntp"];
            for (name, flag) in names.iter().zip(&flags) {
                set_attr(&p, name, Value::Bool(*flag)).unwrap();
            }
            for (name, flag) in names.iter().zip(&flags) {
                prop_assert_eq!(get_attr(&p, name).unwrap().expect_bool(name).unwrap(), *flag);
            }
        }

        #[test]
        fn test_lease_seconds_round_trip(secs in 0i64..i64::MAX) {
            let p = new_dhcp_profile(Arguments::default()).unwrap();
            set_attr(&p, "lease_seconds", Value::from(secs)).unwrap();
            prop_assert_eq!(get_attr(&p, "lease_seconds").unwrap().expect_int("l").unwrap(), i128::from(secs));
        }

        #[test]
        fn test_wifi_network_fields_round_trip(ssid in "[ -~]{0,32}", psk in "[ -~]{8,63}", disabled in any::<bool>()) {
            let n = new_wifi_network(Arguments::default()).unwrap();
            set_attr(&n, "ssid", Value::str(&ssid)).unwrap();
            set_attr(&n, "psk", Value::str(&psk)).unwrap();
            set_attr(&n, "disabled", Value::Bool(disabled)).unwrap();

            for name in ["ssid", "psk"] {
                let rejected = matches!(set_attr(&n, name, Value::Bool(true)), Err(Error::TypeMismatch { .. }));
                prop_assert!(rejected);
            }
            let rejected = matches!(set_attr(&n, "disabled", Value::str("yes")), Err(Error::TypeMismatch { .. }));
            prop_assert!(rejected);

            prop_assert_eq!(get_attr(&n, "ssid").unwrap().expect_str("s").unwrap(), ssid);
            prop_assert_eq!(get_attr(&n, "psk").unwrap().expect_str("p").unwrap(), psk);
            prop_assert_eq!(get_attr(&n, "disabled").unwrap().expect_bool("d").unwrap(), disabled);
        }

        #[test]
        fn test_supplicant_fields_round_trip(idx in 0usize..4, s in "[ -~]{0,24}", allow in any::<bool>()) {
            let name = ["control_interface", "control_interface_group", "country_code", "device_name"][idx];
            let conf = new_supplicant_config(Arguments::default()).unwrap();
            set_attr(&conf, name, Value::str(&s)).unwrap();
            set_attr(&conf, "allow_update_config", Value::Bool(allow)).unwrap();

            let rejected = matches!(set_attr(&conf, name, Value::from(7i64)), Err(Error::TypeMismatch { .. }));
            prop_assert!(rejected);
            let rejected = matches!(
                set_attr(&conf, "allow_update_config", Value::str("true")),
                Err(Error::TypeMismatch { .. })
            );
            prop_assert!(rejected);
            prop_assert!(set_attr(&conf, "networks", Value::list(vec![Value::str("home")])).is_err());

            prop_assert_eq!(get_attr(&conf, name).unwrap().expect_str(name).unwrap(), s);
            prop_assert_eq!(get_attr(&conf, "allow_update_config").unwrap().expect_bool("a").unwrap(), allow);
            prop_assert!(get_attr(&conf, "networks").unwrap().expect_list("n").unwrap().is_empty());
        }

        #[test]
        fn test_static_profile_ipv6_round_trip(segments in any::<[u16; 8]>()) {
            let p = new_static_profile(Arguments::default()).unwrap();
            let addr = std::net::Ipv6Addr::from(segments).to_string();
            set_attr(&p, "ipv6", Value::str(&addr)).unwrap();
            prop_assert_eq!(get_attr(&p, "ipv6").unwrap().expect_str("v6").unwrap(), addr.clone());

            let rejected = matches!(set_attr(&p, "ipv6", Value::from(6i64)), Err(Error::TypeMismatch { .. }));
            prop_assert!(rejected);
            prop_assert!(set_attr(&p, "ipv6", Value::str("not-an-address")).is_err());
            prop_assert_eq!(get_attr(&p, "ipv6").unwrap().expect_str("v6").unwrap(), addr);

            set_attr(&p, "ipv6", Value::str("")).unwrap();
            prop_assert_eq!(get_attr(&p, "ipv6").unwrap().expect_str("v6").unwrap(), "");
        }
    }
}

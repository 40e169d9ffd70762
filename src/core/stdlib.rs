//! RB-012: In-tree library modules, loadable as `load("pi.lib", "pi")`.

use super::error::Result;
use super::loader::ModuleResolver;

const PI_LIB: &str = r#"
library_version = 1

def assert_valid_partitions(parts):
    if len(parts) < 3:
        crash("expected >=3 partitions, got " + str(len(parts)))
    if parts[0].type_name != "FAT32-LBA":
        crash("expected first partition to be FAT32-LBA, got " + parts[0].type_name)
    if parts[1].type_name != "Native Linux":
        crash("expected second partition to be Native Linux, got " + parts[1].type_name)

def load_img(img):
    partitions = fs.read_partitions(img)
    assert_valid_partitions(partitions)
    ext4 = fs.mnt_ext4(img, partitions[1])
    fat = fs.mnt_vfat(img, partitions[0])
    return struct(ext4 = ext4, fat = fat)

def configure_static_ethernet(image, address = None, router = None, dns = "8.8.8.8"):
    static = net.StaticProfile(
        interface = "eth0",
        network = address,
        routers = [router],
        dns = [dns],
    )
    config = net.DHCPClient(profiles = [static])
    image.ext4.write("/etc/dhcpcd.conf", str(config), fs.perms.default)

def configure_dynamic_ethernet(image, lease_seconds = 60 * 60 * 12, hostname = None):
    dynamic = net.DHCPProfile(
        interface = "eth0",
        lease_seconds = lease_seconds,
    )
    if hostname:
        dynamic.set_hostname(hostname)
    config = net.DHCPClient(profiles = [dynamic])
    image.ext4.write("/etc/dhcpcd.conf", str(config), fs.perms.default)

def configure_wifi(image, ssid, psk, country = "US"):
    network = net.wifi.Network(ssid = ssid, psk = psk)
    config = net.wifi.SupplicantConfig(
        control_interface = "/var/run/wpa_supplicant",
        control_interface_group = "netdev",
        allow_update_config = True,
        country_code = country,
        networks = [network],
    )
    image.fat.write("/wpa_supplicant.conf", str(config), fs.perms.default)

def configure_hostname(image, hostname):
    image.ext4.write("/etc/hostname", str(hostname).strip() + "\n", fs.perms.default)

def enable_ssh(image):
    image.fat.write("/ssh", "", fs.perms.default)

def cmdline(image):
    return image.fat.cat("/cmdline.txt").strip()

def disable_resize(image):
    line = cmdline(image).replace("init=/usr/lib/raspi-config/init_resize.sh", "")
    image.fat.write("/cmdline.txt", line, fs.perms.default)
    for path in ["/etc/init.d/resize2fs_once", "/etc/rc3.d/S01resize2fs_once"]:
        if image.ext4.exists(path):
            print("Deleting: %s" % path)
            image.ext4.remove(path)

pi = struct(
    library_version = library_version,
    assert_valid_partitions = assert_valid_partitions,
    load_img = load_img,
    configure_static_ethernet = configure_static_ethernet,
    configure_dynamic_ethernet = configure_dynamic_ethernet,
    configure_wifi = configure_wifi,
    configure_hostname = configure_hostname,
    enable_ssh = enable_ssh,
    cmdline = cmdline,
    disable_resize = disable_resize,
)
"#;

const UNIX_LIB: &str = r#"
library_version = 1

def configure_hostname(mount, hostname):
    mount.write("/etc/hostname", str(hostname).strip() + "\n", fs.perms.default)

def append_line(mount, path, line):
    data = ""
    mode = 0o644
    st = mount.stat(path)
    if st.success:
        data = mount.cat(path)
        mode = math._and(st.mode, 0o7777)
        if data and not data.endswith("\n"):
            data += "\n"
    mount.write(path, data + line + "\n", mode)

def add_fstab_entry(mount, what, where, fs_type, options = "defaults", dump = 0, passno = 0):
    append_line(mount, "/etc/fstab", "%s %s %s %s %d %d" % (what, where, fs_type, options, dump, passno))

def set_motd(mount, text):
    mount.write("/etc/motd", text, fs.perms.user_r + fs.perms.user_w + fs.perms.group_r + fs.perms.other_r)

unix = struct(
    library_version = library_version,
    configure_hostname = configure_hostname,
    append_line = append_line,
    add_fstab_entry = add_fstab_entry,
    set_motd = set_motd,
)
"#;

/// Name and source of every in-tree module.
pub const MODULES: &[(&str, &str)] = &[("pi.lib", PI_LIB), ("unix.lib", UNIX_LIB)];

/// Serves [`MODULES`]. Tried before any user resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdlibResolver;

impl ModuleResolver for StdlibResolver {
    fn resolve(&self, name: &str) -> Result<Option<String>> {
        Ok(MODULES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, src)| src.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::parse;

    #[test]
    fn test_stdlib_modules_parse() {
        for (name, src) in MODULES {
            parse(src, name).unwrap_or_else(|e| panic!("{}: {}", name, e));
        }
    }

    #[test]
    fn test_stdlib_resolver_lookup() {
        assert!(StdlibResolver.resolve("pi.lib").unwrap().is_some());
        assert!(StdlibResolver.resolve("unix.lib").unwrap().is_some());
        assert!(StdlibResolver.resolve("nope.lib").unwrap().is_none());
    }
}

//! RB-010: Environment builder for the predeclared namespace of a Script.
//!
//! Every module a Script executes sees the same namespace: the universe
//! builtins plus the `args`, `time`, `math`, `fs`, `systemd` and `net`
//! groups. Builtins reach the host only through [`Capabilities`], and mount
//! handles are registered with the Script's [`Registry`] before they are
//! returned to the script.

use super::error::{Error, Result};
use super::registry::Registry;
use crate::conf::systemd::{consts, ConditionKind, OutputSinks};
use crate::conf::net::{MODE_ADHOC, MODE_AP, MODE_CLIENT};
use crate::host::file::describe;
use crate::host::{
    DirMounter, FsKind, InitSystem, MbrReader, MountRequest, Mounter, PartitionReader, Systemd,
};
use crate::lang::universe::{universe, PrintSink};
use crate::lang::value::{get_attr, Arguments, Builtin, Namespace, Struct, Value};
use crate::proxy::fs::{stat_struct, FsMountProxy};
use crate::proxy::systemd::{new_condition, new_mount, new_service, new_unit, UnitProxy};
use crate::proxy::{expect_proxy, net as netproxy};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reported as `compiler.version`.
pub const COMPILER_VERSION: i64 = 1;

/// Permission bits exposed as `fs.perms`.
const PERMS: &[(&str, i64)] = &[
    ("set_uid", 0o4000),
    ("set_gid", 0o2000),
    ("sticky", 0o1000),
    ("user_r", 0o400),
    ("user_w", 0o200),
    ("user_x", 0o100),
    ("group_r", 0o040),
    ("group_w", 0o020),
    ("group_x", 0o010),
    ("other_r", 0o004),
    ("other_w", 0o002),
    ("other_x", 0o001),
    ("default", 0o755),
];

/// Host collaborators the builtins delegate to.
#[derive(Clone)]
pub struct Capabilities {
    pub mounter: Rc<dyn Mounter>,
    pub partitions: Rc<dyn PartitionReader>,
    pub init: Rc<dyn InitSystem>,
}

impl Capabilities {
    /// Directory-backed mounts under `staging`, MBR partition tables, systemd layout.
    pub fn staging(staging: impl Into<PathBuf>) -> Self {
        Self {
            mounter: Rc::new(DirMounter::new(staging)),
            partitions: Rc::new(MbrReader),
            init: Rc::new(Systemd),
        }
    }
}

/// Per-Script inputs to the environment.
pub struct EnvInputs {
    /// Positional arguments left after flag parsing.
    pub args: Vec<String>,
    pub verbose: bool,
    pub test_hook: Option<Value>,
    pub print: PrintSink,
    /// Nanoseconds since the epoch when the Script was constructed.
    pub start_ns: i128,
}

pub fn now_ns() -> i128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0)
}

fn record(fields: Vec<(&str, Value)>) -> Value {
    Struct::value(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn builtin(name: &str, f: impl Fn(Arguments) -> Result<Value> + 'static) -> (&str, Value) {
    (name, Builtin::value(name, f))
}

/// Assemble the predeclared namespace.
pub fn build(inputs: EnvInputs, caps: &Capabilities, registry: &Rc<Registry>) -> Namespace {
    let mut ns = universe(inputs.print.clone());
    ns.insert(
        "crash".into(),
        Builtin::value("crash", |a| {
            let a = a.bind("crash", &["msg?"])?;
            let msg = match &a[0] {
                Some(v) => v.to_str(),
                None => "aborted by script".into(),
            };
            Err(Error::Crash(msg))
        }),
    );
    ns.insert("args".into(), args_group(inputs.args, inputs.verbose));
    ns.insert("time".into(), time_group(inputs.start_ns));
    ns.insert("math".into(), math_group());
    ns.insert("fs".into(), fs_group(caps, registry));
    ns.insert("systemd".into(), systemd_group(caps));
    ns.insert("net".into(), net_group());
    ns.insert(
        "compiler".into(),
        record(vec![("version", Value::from(COMPILER_VERSION))]),
    );
    if let Some(hook) = inputs.test_hook {
        ns.insert("test_hook".into(), hook);
    }
    ns
}

fn args_group(args: Vec<String>, verbose: bool) -> Value {
    let args = Rc::new(args);
    let (count, all, one) = (args.clone(), args.clone(), args);
    record(vec![
        ("verbose", Value::Bool(verbose)),
        builtin("num_args", move |a| {
            a.exact("num_args", 0)?;
            Ok(Value::from(count.len() as u64))
        }),
        builtin("args", move |a| {
            a.exact("args", 0)?;
            Ok(Value::str_list(&all))
        }),
        builtin("arg", move |a| {
            let pos = a.one("arg")?.expect_int("arg: position")?;
            let s = usize::try_from(pos)
                .ok()
                .and_then(|i| one.get(i))
                .map(String::as_str)
                .unwrap_or("");
            Ok(Value::str(s))
        }),
    ])
}

fn time_group(start_ns: i128) -> Value {
    record(vec![
        ("start", Value::Int(start_ns)),
        builtin("now", |a| {
            a.exact("now", 0)?;
            Ok(Value::Int(now_ns()))
        }),
    ])
}

/// An int that fits in u64. Negative or oversized values are the wrong kind.
fn u64_arg(v: &Value, ctx: &str) -> Result<u64> {
    let i = v.expect_int(ctx)?;
    u64::try_from(i).map_err(|_| {
        let actual = if i < 0 { "negative int" } else { "int beyond 64 bits" };
        Error::type_mismatch(ctx, "uint64", actual)
    })
}

fn shift(a: &Arguments, fname: &str) -> Result<(u64, Option<u32>)> {
    let a = a.bind(fname, &["base", "shift"])?;
    let (Some(base), Some(amount)) = (&a[0], &a[1]) else {
        return Err(Error::eval(format!("{}: missing argument", fname)));
    };
    let base = u64_arg(base, &format!("{}: base", fname))?;
    let amount = u64_arg(amount, &format!("{}: shift", fname))?;
    Ok((base, u32::try_from(amount).ok()))
}

fn math_group() -> Value {
    record(vec![
        builtin("shl", |a| {
            let (base, amount) = shift(&a, "shl")?;
            Ok(Value::from(amount.and_then(|s| base.checked_shl(s)).unwrap_or(0)))
        }),
        builtin("shr", |a| {
            let (base, amount) = shift(&a, "shr")?;
            Ok(Value::from(amount.and_then(|s| base.checked_shr(s)).unwrap_or(0)))
        }),
        builtin("_not", |a| {
            let a = a.bind("_not", &["base"])?;
            let base = a[0].as_ref().map_or(Ok(0), |v| u64_arg(v, "_not: base"))?;
            Ok(Value::from(!base))
        }),
        builtin("_and", |a| {
            let a = a.bind("_and", &["op1", "op2"])?;
            let op = |i: usize, name: &str| {
                a[i].as_ref()
                    .map_or(Ok(0), |v| u64_arg(v, &format!("_and: {}", name)))
            };
            Ok(Value::from(op(0, "op1")? & op(1, "op2")?))
        }),
    ])
}

fn path_arg(a: &Arguments, fname: &str) -> Result<String> {
    a.one(fname)?.expect_str(&format!("{}: path", fname))
}

fn partition_record(p: &crate::host::PartitionEntry) -> Value {
    record(vec![
        ("bootable", Value::Bool(p.bootable)),
        ("empty", Value::Bool(p.empty)),
        ("index", Value::from(p.index as u64)),
        (
            "lba",
            record(vec![
                ("length", Value::from(u64::from(p.lba_length))),
                ("start", Value::from(u64::from(p.lba_start))),
            ]),
        ),
        ("type", Value::from(u64::from(p.type_code))),
        ("type_name", Value::str(p.type_name())),
    ])
}

/// Sector range of a partition record returned by `read_partitions`.
fn partition_span(part: &Value, fname: &str) -> Result<(u64, u64)> {
    if part.is_none() {
        return Err(Error::eval(format!("{}: no partition information provided", fname)));
    }
    let lba = get_attr(part, "lba")?;
    let start = u64_arg(&get_attr(&lba, "start")?, &format!("{}: lba.start", fname))?;
    let length = u64_arg(&get_attr(&lba, "length")?, &format!("{}: lba.length", fname))?;
    Ok((start, length))
}

fn mount_builtin(kind: FsKind, caps: &Capabilities, registry: &Rc<Registry>) -> Value {
    let fname = match kind {
        FsKind::Ext4 => "mnt_ext4",
        FsKind::Vfat => "mnt_vfat",
    };
    let params: &[&str] = match kind {
        FsKind::Ext4 => &["path", "part", "resize?"],
        FsKind::Vfat => &["path", "part"],
    };
    let mounter = caps.mounter.clone();
    let registry = registry.clone();
    Builtin::value(fname, move |a| {
        let a = a.bind(fname, params)?;
        let (Some(path), Some(part)) = (&a[0], &a[1]) else {
            return Err(Error::eval(format!("{}: missing argument", fname)));
        };
        let image = path.expect_str(&format!("{}: path", fname))?;
        let (start_sector, sector_count) = partition_span(part, fname)?;
        let resize = match a.get(2) {
            Some(Some(v)) => v.expect_bool(&format!("{}: resize", fname))?,
            _ => false,
        };
        let fs = mounter.mount(&MountRequest {
            image: PathBuf::from(&image),
            kind,
            start_sector,
            sector_count,
            resize,
        })?;
        let proxy = Rc::new(FsMountProxy::new(kind, image, fs));
        registry.register(proxy.clone());
        Ok(Value::Native(proxy))
    })
}

fn fs_group(caps: &Capabilities, registry: &Rc<Registry>) -> Value {
    let partitions = caps.partitions.clone();
    let part_enums = crate::host::partition::KNOWN_TYPES
        .iter()
        .map(|(code, name)| (*name, Value::from(u64::from(*code))))
        .collect();
    record(vec![
        builtin("exists", |a| {
            let path = path_arg(&a, "exists")?;
            match std::fs::metadata(&path) {
                Ok(_) => Ok(Value::Bool(true)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::Bool(false)),
                Err(e) => Err(Error::resource(format!("stat {}", path), e)),
            }
        }),
        builtin("cat", |a| {
            let path = path_arg(&a, "cat")?;
            std::fs::read_to_string(&path)
                .map(|s| Value::str(&s))
                .map_err(|e| Error::resource(format!("read {}", path), e))
        }),
        builtin("stat", |a| {
            let path = path_arg(&a, "stat")?;
            let res = std::fs::metadata(&path)
                .map(|meta| describe(&path, &meta))
                .map_err(|e| Error::resource(format!("stat {}", path), e));
            Ok(stat_struct(res))
        }),
        (
            "enums",
            record(vec![("partitions", record(part_enums))]),
        ),
        (
            "perms",
            record(PERMS.iter().map(|(k, v)| (*k, Value::from(*v))).collect()),
        ),
        builtin("read_partitions", move |a| {
            let path = path_arg(&a, "read_partitions")?;
            let entries = partitions.read_partitions(Path::new(&path))?;
            Ok(Value::list(entries.iter().map(partition_record).collect()))
        }),
        ("mnt_ext4", mount_builtin(FsKind::Ext4, caps, registry)),
        ("mnt_vfat", mount_builtin(FsKind::Vfat, caps, registry)),
    ])
}

const MOUNT_KINDS: &str = "fs.Ext4Mount or fs.VFATMount";

fn mount_of<'a>(v: &'a Value, fname: &str) -> Result<&'a FsMountProxy> {
    expect_proxy::<FsMountProxy>(v, &format!("{}: mount", fname), MOUNT_KINDS)
}

/// `(mount, name, ...)` with all parameters required.
fn unit_call<'a>(a: &'a [Option<Value>], fname: &str) -> Result<(&'a FsMountProxy, String)> {
    let (Some(Some(mount)), Some(Some(name))) = (a.first(), a.get(1)) else {
        return Err(Error::eval(format!("{}: missing argument", fname)));
    };
    Ok((mount_of(mount, fname)?, name.expect_str(&format!("{}: name", fname))?))
}

fn table(
    entries: &'static [(&'static str, &'static str)],
) -> impl Iterator<Item = (&'static str, Value)> {
    entries.iter().map(|(k, v)| (*k, Value::str(v)))
}

fn systemd_group(caps: &Capabilities) -> Value {
    let constants = table(consts::RESTART)
        .chain(table(consts::KILL_MODE))
        .chain(table(consts::SERVICE_TYPE))
        .chain(table(consts::NOTIFY_ACCESS))
        .collect();
    let sink = |f: OutputSinks| Value::from(u64::from(f.bits()));
    let mut fields = vec![
        ("const", record(constants)),
        (
            "out",
            record(vec![
                ("console", sink(OutputSinks::CONSOLE)),
                ("journal", sink(OutputSinks::JOURNAL)),
                ("inherit", sink(OutputSinks::INHERIT)),
                ("syslog", sink(OutputSinks::SYSLOG)),
                ("kmesg", sink(OutputSinks::KMSG)),
            ]),
        ),
        builtin("Unit", new_unit),
        builtin("Service", new_service),
        builtin("Mount", new_mount),
    ];
    for kind in [
        ConditionKind::Exists,
        ConditionKind::NotExists,
        ConditionKind::Host,
        ConditionKind::FirstBoot,
    ] {
        let name = match kind {
            ConditionKind::Exists => "ConditionExists",
            ConditionKind::NotExists => "ConditionNotExists",
            ConditionKind::Host => "ConditionHost",
            ConditionKind::FirstBoot => "ConditionFirstBoot",
        };
        fields.push(builtin(name, move |a| new_condition(kind, a)));
    }

    let init = caps.init.clone();
    fields.push(builtin("exists", move |a| {
        let a = a.bind("exists", &["mount", "name"])?;
        let (mount, name) = unit_call(&a, "exists")?;
        init.exists(mount.live("exists")?, &name).map(Value::Bool)
    }));
    let init = caps.init.clone();
    fields.push(builtin("install", move |a| {
        let a = a.bind("install", &["mount", "name", "unit", "overwrite?"])?;
        let (mount, name) = unit_call(&a, "install")?;
        let Some(Some(unit)) = a.get(2) else {
            return Err(Error::eval("install: missing argument for unit"));
        };
        let unit = expect_proxy::<UnitProxy>(unit, "install: unit", "systemd.Unit")?;
        let overwrite = match a.get(3) {
            Some(Some(v)) => v.expect_bool("install: overwrite")?,
            _ => false,
        };
        let conf = unit.unit().borrow();
        init.install(mount.live("install")?, &name, &conf, overwrite)
            .map(|_| Value::None)
    }));
    let init = caps.init.clone();
    fields.push(builtin("is_enabled", move |a| {
        let a = a.bind("is_enabled", &["mount", "name", "target"])?;
        let (mount, name) = unit_call(&a, "is_enabled")?;
        let target = target_arg(&a, "is_enabled")?;
        init.is_enabled_on_target(mount.live("is_enabled")?, &name, &target)
            .map(Value::Bool)
    }));
    let init = caps.init.clone();
    fields.push(builtin("enable", move |a| {
        let a = a.bind("enable", &["mount", "name", "target"])?;
        let (mount, name) = unit_call(&a, "enable")?;
        let target = target_arg(&a, "enable")?;
        init.enable_on_target(mount.live("enable")?, &name, &target)
            .map(|_| Value::None)
    }));
    record(fields)
}

fn target_arg(a: &[Option<Value>], fname: &str) -> Result<String> {
    match a.get(2) {
        Some(Some(v)) => v.expect_str(&format!("{}: target", fname)),
        _ => Err(Error::eval(format!("{}: missing argument for target", fname))),
    }
}

fn net_group() -> Value {
    let mode = |m: u8| Value::from(u64::from(m));
    record(vec![
        builtin("DHCPClient", netproxy::new_dhcp_client),
        builtin("DHCPProfile", netproxy::new_dhcp_profile),
        builtin("StaticProfile", netproxy::new_static_profile),
        (
            "wifi",
            record(vec![
                builtin("Network", netproxy::new_wifi_network),
                builtin("SupplicantConfig", netproxy::new_supplicant_config),
                ("mode_client", mode(MODE_CLIENT)),
                ("mode_adhoc", mode(MODE_ADHOC)),
                ("mode_ap", mode(MODE_AP)),
            ]),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::partition::tests::pi_sector;
    use crate::host::PartitionEntry;
    use proptest::prelude::*;
    use std::cell::RefCell;

    struct FixedPartitions;

    impl PartitionReader for FixedPartitions {
        fn read_partitions(&self, _image: &Path) -> Result<Vec<PartitionEntry>> {
            crate::host::partition::parse_mbr(&pi_sector())
        }
    }

    fn env_with(args: &[&str], staging: &Path) -> (Namespace, Rc<Registry>) {
        let registry = Rc::new(Registry::new());
        let caps = Capabilities {
            partitions: Rc::new(FixedPartitions),
            ..Capabilities::staging(staging)
        };
        let inputs = EnvInputs {
            args: args.iter().map(|s| s.to_string()).collect(),
            verbose: true,
            test_hook: None,
            print: Rc::new(|_: &str| {}),
            start_ns: 42,
        };
        (build(inputs, &caps, &registry), registry)
    }

    fn member(ns: &Namespace, path: &str) -> Value {
        let mut parts = path.split('.');
        let mut v = ns[parts.next().unwrap()].clone();
        for p in parts {
            v = get_attr(&v, p).unwrap();
        }
        v
    }

    fn call(ns: &Namespace, path: &str, args: Vec<Value>) -> Result<Value> {
        match member(ns, path) {
            Value::Builtin(b) => (b.func)(Arguments::positional(args)),
            other => panic!("{} is not callable: {}", path, other.type_name()),
        }
    }

    fn int(v: Value) -> i128 {
        v.expect_int("test").unwrap()
    }

    #[test]
    fn test_env_groups_present() {
        let dir = tempfile::tempdir().unwrap();
        let (ns, _) = env_with(&[], dir.path());
        for name in ["crash", "struct", "args", "time", "math", "fs", "systemd", "net", "compiler", "len"] {
            assert!(ns.contains_key(name), "missing {}", name);
        }
        assert!(!ns.contains_key("test_hook"));
        assert_eq!(int(member(&ns, "compiler.version")), 1);
        assert_eq!(int(member(&ns, "time.start")), 42);
        assert!(int(call(&ns, "time.now", vec![]).unwrap()) > 0);
        assert_eq!(int(member(&ns, "fs.perms.default")), 0o755);
        assert_eq!(int(member(&ns, "fs.perms.set_uid")), 0o4000);
        assert_eq!(int(member(&ns, "fs.perms.other_x")), 1);
        assert_eq!(int(member(&ns, "net.wifi.mode_ap")), 2);
        assert_eq!(int(member(&ns, "systemd.out.kmesg")), 16);
        assert_eq!(member(&ns, "systemd.const.restart_never").to_str(), "no");
        assert_eq!(member(&ns, "systemd.const.service_oneshot").to_str(), "oneshot");
    }

    #[test]
    fn test_env_partition_enums() {
        let dir = tempfile::tempdir().unwrap();
        let (ns, _) = env_with(&[], dir.path());
        let parts = member(&ns, "fs.enums.partitions");
        assert_eq!(int(get_attr(&parts, "FAT32-LBA").unwrap()), 12);
        assert_eq!(int(get_attr(&parts, "Native Linux").unwrap()), 131);
    }

    #[test]
    fn test_env_args_accessors() {
        let dir = tempfile::tempdir().unwrap();
        let (ns, _) = env_with(&["a", "b"], dir.path());
        assert!(member(&ns, "args.verbose").truth());
        assert_eq!(int(call(&ns, "args.num_args", vec![]).unwrap()), 2);
        assert_eq!(
            call(&ns, "args.args", vec![]).unwrap().expect_str_list("a").unwrap(),
            ["a", "b"]
        );
        assert_eq!(call(&ns, "args.arg", vec![Value::Int(1)]).unwrap().to_str(), "b");
        assert_eq!(call(&ns, "args.arg", vec![Value::Int(5)]).unwrap().to_str(), "");
        assert_eq!(call(&ns, "args.arg", vec![Value::Int(-1)]).unwrap().to_str(), "");
    }

    #[test]
    fn test_env_crash_is_catchable() {
        let dir = tempfile::tempdir().unwrap();
        let (ns, _) = env_with(&[], dir.path());
        let err = call(&ns, "crash", vec![Value::str("stop")]).unwrap_err();
        assert!(matches!(err, Error::Crash(ref m) if m == "stop"));
        assert!(matches!(call(&ns, "crash", vec![]), Err(Error::Crash(_))));
    }

    #[test]
    fn test_env_math_edges() {
        let dir = tempfile::tempdir().unwrap();
        let (ns, _) = env_with(&[], dir.path());
        assert_eq!(int(call(&ns, "math._not", vec![Value::Int(0)]).unwrap()), i128::from(u64::MAX));
        assert_eq!(int(call(&ns, "math.shl", vec![Value::Int(1), Value::Int(64)]).unwrap()), 0);
        assert_eq!(int(call(&ns, "math.shr", vec![Value::Int(8), Value::Int(200)]).unwrap()), 0);
        assert!(matches!(
            call(&ns, "math.shl", vec![Value::Int(-1), Value::Int(1)]),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            call(&ns, "math._and", vec![Value::Int(1), Value::str("x")]),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_env_host_stat_and_cat() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.txt");
        std::fs::write(&file, "hi").unwrap();
        let (ns, _) = env_with(&[], dir.path());
        let path = Value::str(&file.to_string_lossy());
        assert!(call(&ns, "fs.exists", vec![path.clone()]).unwrap().truth());
        assert_eq!(call(&ns, "fs.cat", vec![path.clone()]).unwrap().to_str(), "hi");
        let st = call(&ns, "fs.stat", vec![path]).unwrap();
        assert_eq!(int(get_attr(&st, "size").unwrap()), 2);
        assert_eq!(get_attr(&st, "name").unwrap().to_str(), "hello.txt");

        let missing = Value::str(&dir.path().join("nope").to_string_lossy());
        assert!(!call(&ns, "fs.exists", vec![missing.clone()]).unwrap().truth());
        let st = call(&ns, "fs.stat", vec![missing]).unwrap();
        assert!(get_attr(&st, "not_exists").unwrap().truth());
    }

    #[test]
    fn test_env_read_partitions_and_mount() {
        let dir = tempfile::tempdir().unwrap();
        let (ns, registry) = env_with(&[], dir.path());
        let parts = call(&ns, "fs.read_partitions", vec![Value::str("disk.img")])
            .unwrap()
            .expect_list("parts")
            .unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(get_attr(&parts[0], "type_name").unwrap().to_str(), "FAT32-LBA");
        assert_eq!(int(get_attr(&get_attr(&parts[1], "lba").unwrap(), "start").unwrap()), 532480);
        assert!(get_attr(&parts[3], "empty").unwrap().truth());

        let boot = call(&ns, "fs.mnt_vfat", vec![Value::str("disk.img"), parts[0].clone()]).unwrap();
        assert_eq!(boot.type_name(), "fs.VFATMount");
        let root = call(&ns, "fs.mnt_ext4", vec![Value::str("disk.img"), parts[1].clone()]).unwrap();
        assert_eq!(root.type_name(), "fs.Ext4Mount");
        assert_eq!(registry.len(), 2);
        assert!(dir.path().join("disk.img.p532480").is_dir());

        // Empty partitions cannot be mounted and nothing is registered.
        assert!(call(&ns, "fs.mnt_ext4", vec![Value::str("disk.img"), parts[3].clone()]).is_err());
        assert!(call(&ns, "fs.mnt_ext4", vec![Value::str("disk.img"), Value::None]).is_err());
        assert_eq!(registry.len(), 2);

        registry.close_all().unwrap();
        assert!(root.as_native::<FsMountProxy>().unwrap().is_closed());
    }

    #[test]
    fn test_env_systemd_install_and_enable() {
        let dir = tempfile::tempdir().unwrap();
        let (ns, _) = env_with(&[], dir.path());
        let parts = call(&ns, "fs.read_partitions", vec![Value::str("disk.img")])
            .unwrap()
            .expect_list("parts")
            .unwrap();
        let root = call(&ns, "fs.mnt_ext4", vec![Value::str("disk.img"), parts[1].clone()]).unwrap();
        let staged = dir.path().join("disk.img.p532480");
        std::fs::create_dir_all(staged.join("lib/systemd/system")).unwrap();

        let unit = call(&ns, "systemd.Unit", vec![Value::str("blink")]).unwrap();
        let name = Value::str("blink.service");
        assert!(!call(&ns, "systemd.exists", vec![root.clone(), name.clone()]).unwrap().truth());
        call(&ns, "systemd.install", vec![root.clone(), name.clone(), unit.clone()]).unwrap();
        assert!(call(&ns, "systemd.exists", vec![root.clone(), name.clone()]).unwrap().truth());
        let err = call(&ns, "systemd.install", vec![root.clone(), name.clone(), unit.clone()]).unwrap_err();
        assert!(err.to_string().contains("file already exists"), "{}", err);
        call(
            &ns,
            "systemd.install",
            vec![root.clone(), name.clone(), unit, Value::Bool(true)],
        )
        .unwrap();

        let target = Value::str("multi-user.target");
        assert!(!call(&ns, "systemd.is_enabled", vec![root.clone(), name.clone(), target.clone()])
            .unwrap()
            .truth());
        call(&ns, "systemd.enable", vec![root.clone(), name.clone(), target.clone()]).unwrap();
        assert!(call(&ns, "systemd.is_enabled", vec![root.clone(), name.clone(), target])
            .unwrap()
            .truth());

        let err = call(&ns, "systemd.exists", vec![Value::str("/"), name]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "exists: mount: expected fs.Ext4Mount or fs.VFATMount, got string"
        );
    }

    #[test]
    fn test_env_test_hook_is_exposed() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Rc::new(RefCell::new(0));
        let counter = seen.clone();
        let hook = Builtin::value("test_hook", move |_| {
            *counter.borrow_mut() += 1;
            Ok(Value::None)
        });
        let registry = Rc::new(Registry::new());
        let ns = build(
            EnvInputs {
                args: vec![],
                verbose: false,
                test_hook: Some(hook),
                print: Rc::new(|_: &str| {}),
                start_ns: 0,
            },
            &Capabilities::staging(dir.path()),
            &registry,
        );
        call(&ns, "test_hook", vec![]).unwrap();
        assert_eq!(*seen.borrow(), 1);
    }

    proptest! {
        #[test]
        fn test_env_math_matches_u64_ops(a in any::<u64>(), b in any::<u64>(), s in 0u32..80) {
            let dir = tempfile::tempdir().unwrap();
            let (ns, _) = env_with(&[], dir.path());
            let big = |v: u64| Value::Int(i128::from(v));
            let shl = call(&ns, "math.shl", vec![big(a), Value::Int(s.into())]).unwrap();
            prop_assert_eq!(int(shl), i128::from(a.checked_shl(s).unwrap_or(0)));
            let shr = call(&ns, "math.shr", vec![big(a), Value::Int(s.into())]).unwrap();
            prop_assert_eq!(int(shr), i128::from(a.checked_shr(s).unwrap_or(0)));
            prop_assert_eq!(int(call(&ns, "math._not", vec![big(a)]).unwrap()), i128::from(!a));
            prop_assert_eq!(int(call(&ns, "math._and", vec![big(a), big(b)]).unwrap()), i128::from(a & b));
        }
    }
}

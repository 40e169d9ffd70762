//! RB-053: Mounted image filesystems as script values.

use super::{uint_arg, Field, Proxy};
use crate::core::error::{Error, Result};
use crate::core::registry::Closable;
use crate::host::{FileStat, Filesystem, FsKind};
use crate::lang::value::{Arguments, Namespace, Struct, Value};
use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

/// `fs.Ext4Mount` / `fs.VFATMount`. Registered with the Script's registry
/// when created; closing it releases the underlying mount.
pub struct FsMountProxy {
    kind: FsKind,
    image: String,
    fs: Rc<dyn Filesystem>,
    closed: Cell<bool>,
}

impl FsMountProxy {
    pub fn new(kind: FsKind, image: impl Into<String>, fs: Rc<dyn Filesystem>) -> Self {
        Self {
            kind,
            image: image.into(),
            fs,
            closed: Cell::new(false),
        }
    }

    pub fn filesystem(&self) -> &dyn Filesystem {
        self.fs.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    /// The mounted filesystem, unless the mount was already closed.
    pub fn live(&self, method: &str) -> Result<&dyn Filesystem> {
        if self.closed.get() {
            return Err(Error::eval(format!(
                "{}.{}: filesystem is closed",
                self.proxy_type(),
                method
            )));
        }
        Ok(self.fs.as_ref())
    }
}

/// Script view of a stat call. Failures are data, not errors.
pub fn stat_struct(res: Result<FileStat>) -> Value {
    let mut fields = Namespace::new();
    match res {
        Ok(st) => {
            fields.insert("success".into(), Value::Bool(true));
            fields.insert("error".into(), Value::Bool(false));
            fields.insert("not_exists".into(), Value::Bool(false));
            fields.insert("name".into(), Value::str(&st.name));
            fields.insert("size".into(), Value::from(st.size));
            fields.insert("dir".into(), Value::Bool(st.is_dir));
            fields.insert("mode".into(), Value::Int(st.mode.into()));
        }
        Err(e) => {
            fields.insert("success".into(), Value::Bool(false));
            fields.insert("not_exists".into(), Value::Bool(e.is_not_found()));
            fields.insert("error".into(), Value::str(&e.to_string()));
        }
    }
    Struct::value(fields)
}

const MOUNT_FIELDS: &[Field<FsMountProxy>] = &[Field {
    name: "base",
    get: |p: &FsMountProxy| Ok(Value::str(&p.image)),
    set: None,
}];

const MOUNT_METHODS: &[&str] = &[
    "cat",
    "exists",
    "stat",
    "lstat",
    "mkdir",
    "write",
    "copy_into",
    "remove",
    "remove_all",
    "chmod",
    "chown",
    "symlink",
];

fn path_arg(args: &Arguments, method: &str) -> Result<String> {
    let bound = args.bind(method, &["path"])?;
    match &bound[0] {
        Some(v) => v.expect_str(&format!("{}: path", method)),
        None => Err(Error::eval(format!("{}: missing argument for path", method))),
    }
}

/// Bind all-required parameters.
fn required(args: &Arguments, method: &str, params: &[&str]) -> Result<Vec<Value>> {
    args.bind(method, params)?
        .into_iter()
        .zip(params)
        .map(|(v, p)| v.ok_or_else(|| Error::eval(format!("{}: missing argument for {}", method, p))))
        .collect()
}

impl Proxy for FsMountProxy {
    fn proxy_type(&self) -> String {
        format!("fs.{}Mount", self.kind.name())
    }

    fn rendered(&self) -> String {
        format!("{}{{{}}}", self.proxy_type(), self.image)
    }

    fn fields(&self) -> &'static [Field<Self>] {
        MOUNT_FIELDS
    }

    fn methods(&self) -> &'static [&'static str] {
        MOUNT_METHODS
    }

    fn call(&self, name: &str, args: Arguments) -> Result<Value> {
        let fs = self.live(name)?;
        match name {
            "cat" => {
                let path = path_arg(&args, name)?;
                let data = fs.read(&path)?;
                String::from_utf8(data)
                    .map(|s| Value::str(&s))
                    .map_err(|_| Error::eval(format!("cat: {} is not valid UTF-8", path)))
            }
            "exists" => match fs.stat(&path_arg(&args, name)?) {
                Ok(_) => Ok(Value::Bool(true)),
                Err(e) if e.is_not_found() => Ok(Value::Bool(false)),
                Err(e) => Err(e),
            },
            "stat" => Ok(stat_struct(fs.stat(&path_arg(&args, name)?))),
            "lstat" => Ok(stat_struct(fs.lstat(&path_arg(&args, name)?))),
            "mkdir" => fs.mkdir(&path_arg(&args, name)?).map(|_| Value::None),
            "remove" => fs.remove(&path_arg(&args, name)?).map(|_| Value::None),
            "remove_all" => fs.remove_all(&path_arg(&args, name)?).map(|_| Value::None),
            "write" => {
                let a = required(&args, name, &["path", "data", "permission"])?;
                let path = a[0].expect_str("write: path")?;
                let data = a[1].expect_str("write: data")?;
                let mode: u32 = uint_arg(&a[2], "write: permission")?;
                fs.write(&path, data.as_bytes(), mode).map(|_| Value::None)
            }
            "copy_into" => {
                let a = required(&args, name, &["system_path", "path"])?;
                let host = a[0].expect_str("copy_into: system_path")?;
                let path = a[1].expect_str("copy_into: path")?;
                fs.copy_into(Path::new(&host), &path).map(|_| Value::None)
            }
            "chmod" => {
                let a = required(&args, name, &["path", "mode"])?;
                let path = a[0].expect_str("chmod: path")?;
                let mode: u32 = uint_arg(&a[1], "chmod: mode")?;
                fs.chmod(&path, mode).map(|_| Value::None)
            }
            "chown" => {
                let a = required(&args, name, &["path", "uid", "gid"])?;
                let path = a[0].expect_str("chown: path")?;
                let uid: u32 = uint_arg(&a[1], "chown: uid")?;
                let gid: u32 = uint_arg(&a[2], "chown: gid")?;
                fs.chown(&path, uid, gid).map(|_| Value::None)
            }
            "symlink" => {
                let a = required(&args, name, &["target", "link"])?;
                let target = a[0].expect_str("symlink: target")?;
                let link = a[1].expect_str("symlink: link")?;
                fs.symlink(&target, &link).map(|_| Value::None)
            }
            _ => Err(Error::NoSuchAttribute {
                type_name: self.proxy_type(),
                name: name.into(),
            }),
        }
    }
}

impl Closable for FsMountProxy {
    fn close(&self) -> Result<()> {
        if self.closed.replace(true) {
            return Ok(());
        }
        self.fs.close()
    }

    fn describe(&self) -> String {
        self.rendered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DirFs;
    use crate::lang::value::get_attr;
    use std::os::unix::fs::PermissionsExt;

    fn mounted() -> (tempfile::TempDir, Rc<FsMountProxy>, Value) {
        let dir = tempfile::tempdir().unwrap();
        let fs: Rc<dyn Filesystem> = Rc::new(DirFs::new(dir.path()));
        let proxy = Rc::new(FsMountProxy::new(FsKind::Ext4, "disk.img", fs));
        let value = Value::Native(proxy.clone());
        (dir, proxy, value)
    }

    fn call(v: &Value, method: &str, args: Vec<Value>) -> Result<Value> {
        match get_attr(v, method)? {
            Value::Builtin(b) => (b.func)(Arguments::positional(args)),
            other => panic!("{} is not callable: {}", method, other.type_name()),
        }
    }

    #[test]
    fn test_fs_mount_write_cat_stat() {
        let (dir, _proxy, m) = mounted();
        assert_eq!(m.type_name(), "fs.Ext4Mount");
        assert_eq!(get_attr(&m, "base").unwrap().expect_str("base").unwrap(), "disk.img");

        call(&m, "mkdir", vec![Value::str("/etc")]).unwrap();
        call(
            &m,
            "write",
            vec![Value::str("/etc/hostname"), Value::str("pi\n"), Value::Int(0o644)],
        )
        .unwrap();
        assert_eq!(
            call(&m, "cat", vec![Value::str("/etc/hostname")]).unwrap().to_str(),
            "pi\n"
        );
        let mode = std::fs::metadata(dir.path().join("etc/hostname"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);

        let st = call(&m, "stat", vec![Value::str("/etc/hostname")]).unwrap();
        assert!(get_attr(&st, "success").unwrap().expect_bool("s").unwrap());
        assert_eq!(get_attr(&st, "size").unwrap().expect_int("size").unwrap(), 3);
        assert_eq!(get_attr(&st, "name").unwrap().to_str(), "hostname");
    }

    #[test]
    fn test_fs_mount_missing_paths() {
        let (_dir, _proxy, m) = mounted();
        assert!(!call(&m, "exists", vec![Value::str("/nope")]).unwrap().truth());
        let st = call(&m, "stat", vec![Value::str("/nope")]).unwrap();
        assert!(!get_attr(&st, "success").unwrap().truth());
        assert!(get_attr(&st, "not_exists").unwrap().truth());
        assert!(get_attr(&st, "name").is_err());
        assert!(call(&m, "cat", vec![Value::str("/nope")]).is_err());
    }

    #[test]
    fn test_fs_mount_symlink_and_remove() {
        let (_dir, _proxy, m) = mounted();
        call(&m, "mkdir", vec![Value::str("/srv")]).unwrap();
        call(&m, "symlink", vec![Value::str("/srv"), Value::str("/data")]).unwrap();
        let st = call(&m, "lstat", vec![Value::str("/data")]).unwrap();
        assert!(get_attr(&st, "success").unwrap().truth());
        assert!(!get_attr(&st, "dir").unwrap().truth());
        call(&m, "remove", vec![Value::str("/data")]).unwrap();
        call(&m, "remove_all", vec![Value::str("/srv")]).unwrap();
        assert!(!call(&m, "exists", vec![Value::str("/srv")]).unwrap().truth());
    }

    #[test]
    fn test_fs_mount_argument_checks() {
        let (_dir, _proxy, m) = mounted();
        assert!(matches!(
            call(&m, "chmod", vec![Value::str("/x"), Value::Int(-1)]),
            Err(Error::Eval(_))
        ));
        assert!(matches!(
            call(&m, "write", vec![Value::str("/x"), Value::Int(1), Value::Int(0o644)]),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(call(&m, "write", vec![Value::str("/x")]).is_err());
        assert!(matches!(
            get_attr(&m, "umount"),
            Err(Error::NoSuchAttribute { .. })
        ));
    }

    #[test]
    fn test_fs_mount_close_is_idempotent() {
        let (_dir, proxy, m) = mounted();
        Closable::close(proxy.as_ref()).unwrap();
        Closable::close(proxy.as_ref()).unwrap();
        assert!(proxy.is_closed());
        let err = call(&m, "exists", vec![Value::str("/")]).unwrap_err();
        assert_eq!(err.to_string(), "fs.Ext4Mount.exists: filesystem is closed");
    }
}

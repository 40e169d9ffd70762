//! RB-051: Adapters for systemd units, services, mounts and conditions.

use super::{
    construct, duration_arg, duration_value, expect_proxy, flatten_strings, uint_arg, Field, Proxy,
};
use crate::conf::systemd::{Condition, ConditionKind, Mount, OutputSinks, Service, Unit};
use crate::conf::{shared, Shared};
use crate::core::error::{Error, Result};
use crate::lang::value::{Arguments, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// `systemd.Unit`. Repeated reads of `service` return the same proxy.
pub struct UnitProxy {
    unit: Shared<Unit>,
    service: RefCell<Option<Value>>,
}

impl UnitProxy {
    pub fn new(unit: Shared<Unit>) -> Self {
        Self {
            unit,
            service: RefCell::new(None),
        }
    }

    pub fn unit(&self) -> &Shared<Unit> {
        &self.unit
    }

    fn service_value(&self) -> Value {
        let Some(service) = self.unit.borrow().service.clone() else {
            return Value::None;
        };
        if let Some(cached) = self.service.borrow().as_ref() {
            let same = cached
                .as_native::<ServiceProxy>()
                .is_some_and(|s| Rc::ptr_eq(&s.service, &service));
            if same {
                return cached.clone();
            }
        }
        let v = Value::native(ServiceProxy::new(service));
        *self.service.borrow_mut() = Some(v.clone());
        v
    }

    /// Drop the current service, clearing its back-reference to this unit.
    fn detach_service(&self) {
        let Some(old) = self.unit.borrow_mut().service.take() else {
            return;
        };
        let owned_here = old
            .borrow()
            .unit
            .upgrade()
            .is_some_and(|u| Rc::ptr_eq(&u, &self.unit));
        if owned_here {
            old.borrow_mut().unit = Weak::new();
        }
        *self.service.borrow_mut() = None;
    }

    /// A service belongs to at most one unit: attaching it here takes it
    /// away from its previous owner.
    fn attach_service(&self, v: &Value, ctx: &str) -> Result<()> {
        if v.is_none() {
            self.detach_service();
            return Ok(());
        }
        let s = expect_proxy::<ServiceProxy>(v, ctx, "systemd.Service")?;
        let previous = s.service.borrow().unit.upgrade();
        if let Some(owner) = previous.filter(|u| !Rc::ptr_eq(u, &self.unit)) {
            owner.borrow_mut().service = None;
        }
        self.detach_service();
        s.service.borrow_mut().unit = Rc::downgrade(&self.unit);
        self.unit.borrow_mut().service = Some(s.service.clone());
        *self.service.borrow_mut() = Some(v.clone());
        Ok(())
    }
}

const UNIT_FIELDS: &[Field<UnitProxy>] = &[
    Field {
        name: "description",
        get: |p: &UnitProxy| Ok(Value::str(&p.unit.borrow().description)),
        set: Some(|p: &UnitProxy, v: &Value, ctx: &str| {
            p.unit.borrow_mut().description = v.expect_str(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "after",
        get: |p: &UnitProxy| Ok(Value::str_list(&p.unit.borrow().after)),
        set: None,
    },
    Field {
        name: "wanted_by",
        get: |p: &UnitProxy| Ok(Value::str_list(&p.unit.borrow().wanted_by)),
        set: None,
    },
    Field {
        name: "required_by",
        get: |p: &UnitProxy| Ok(Value::str_list(&p.unit.borrow().required_by)),
        set: None,
    },
    Field {
        name: "service",
        get: |p: &UnitProxy| Ok(p.service_value()),
        set: Some(|p: &UnitProxy, v: &Value, ctx: &str| p.attach_service(v, ctx)),
    },
];

impl Proxy for UnitProxy {
    fn proxy_type(&self) -> String {
        "systemd.Unit".into()
    }

    fn rendered(&self) -> String {
        self.unit.borrow().render()
    }

    fn fields(&self) -> &'static [Field<Self>] {
        UNIT_FIELDS
    }

    fn methods(&self) -> &'static [&'static str] {
        &["append_after", "append_wanted_by", "append_required_by"]
    }

    fn call(&self, name: &str, args: Arguments) -> Result<Value> {
        let items = flatten_strings(name, &args)?;
        let mut unit = self.unit.borrow_mut();
        let list = match name {
            "append_after" => &mut unit.after,
            "append_wanted_by" => &mut unit.wanted_by,
            "append_required_by" => &mut unit.required_by,
            _ => {
                return Err(Error::NoSuchAttribute {
                    type_name: self.proxy_type(),
                    name: name.into(),
                })
            }
        };
        list.extend(items);
        Ok(Value::None)
    }
}

/// `Unit(description?, after, wanted_by, required_by, service)`.
pub fn new_unit(args: Arguments) -> Result<Value> {
    let bound = args.bind(
        "Unit",
        &["description?", "after", "wanted_by", "required_by", "service"],
    )?;
    let [description, after, wanted_by, required_by, service] =
        <[Option<Value>; 5]>::try_from(bound).map_err(|_| Error::eval("Unit: argument binding"))?;

    let strings = |v: Option<Value>, ctx: &str| -> Result<Vec<String>> {
        v.map(|v| v.expect_str_list(ctx)).transpose().map(Option::unwrap_or_default)
    };
    let unit = Unit {
        description: description
            .map(|v| v.expect_str("Unit: description"))
            .transpose()?
            .unwrap_or_default(),
        after: strings(after, "Unit: after")?,
        wanted_by: strings(wanted_by, "Unit: wanted_by")?,
        required_by: strings(required_by, "Unit: required_by")?,
        service: None,
    };
    let proxy = UnitProxy::new(shared(unit));
    if let Some(service) = service {
        proxy.attach_service(&service, "Unit: service")?;
    }
    Ok(Value::native(proxy))
}

/// `systemd.Service`.
pub struct ServiceProxy {
    service: Shared<Service>,
}

impl ServiceProxy {
    pub fn new(service: Shared<Service>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Shared<Service> {
        &self.service
    }
}

fn sinks_arg(v: &Value, ctx: &str) -> Result<OutputSinks> {
    let bits: u8 = uint_arg(v, ctx)?;
    OutputSinks::from_bits(bits)
        .ok_or_else(|| Error::eval(format!("{}: {} is not a valid output mask", ctx, bits)))
}

fn conditions_arg(v: &Value, ctx: &str) -> Result<Vec<Condition>> {
    v.expect_list(ctx)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            expect_proxy::<ConditionProxy>(item, &format!("{}[{}]", ctx, i), "systemd.Condition")
                .map(|c| c.condition.clone())
        })
        .collect()
}

/// String fields of a service share one getter/setter shape.
macro_rules! service_str {
    ($name:literal, $field:ident) => {
        Field {
            name: $name,
            get: |p: &ServiceProxy| Ok(Value::str(&p.service.borrow().$field)),
            set: Some(|p: &ServiceProxy, v: &Value, ctx: &str| {
                p.service.borrow_mut().$field = v.expect_str(ctx)?;
                Ok(())
            }),
        }
    };
}

macro_rules! service_duration {
    ($name:literal, $field:ident) => {
        Field {
            name: $name,
            get: |p: &ServiceProxy| Ok(duration_value(p.service.borrow().$field)),
            set: Some(|p: &ServiceProxy, v: &Value, ctx: &str| {
                p.service.borrow_mut().$field = duration_arg(v, ctx)?;
                Ok(())
            }),
        }
    };
}

const SERVICE_FIELDS: &[Field<ServiceProxy>] = &[
    service_str!("type", service_type),
    service_str!("exec_start_pre", exec_start_pre),
    service_str!("exec_start", exec_start),
    service_str!("exec_reload", exec_reload),
    service_str!("exec_stop", exec_stop),
    service_str!("exec_stop_post", exec_stop_post),
    service_str!("working_dir", working_dir),
    service_str!("root_dir", root_dir),
    service_str!("kill_mode", kill_mode),
    service_str!("user", user),
    service_str!("group", group),
    service_str!("restart", restart),
    service_duration!("timeout_stop_sec", timeout_stop),
    service_duration!("restart_sec", restart_sec),
    service_duration!("watchdog_sec", watchdog_sec),
    service_str!("notify_access", notify_access),
    Field {
        name: "ignore_sigpipe",
        get: |p: &ServiceProxy| Ok(Value::Bool(p.service.borrow().ignore_sigpipe)),
        set: Some(|p: &ServiceProxy, v: &Value, ctx: &str| {
            p.service.borrow_mut().ignore_sigpipe = v.expect_bool(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "stdout",
        get: |p: &ServiceProxy| Ok(Value::Int(p.service.borrow().stdout.bits().into())),
        set: Some(|p: &ServiceProxy, v: &Value, ctx: &str| {
            p.service.borrow_mut().stdout = sinks_arg(v, ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "stderr",
        get: |p: &ServiceProxy| Ok(Value::Int(p.service.borrow().stderr.bits().into())),
        set: Some(|p: &ServiceProxy, v: &Value, ctx: &str| {
            p.service.borrow_mut().stderr = sinks_arg(v, ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "conditions",
        get: |p: &ServiceProxy| {
            let service = p.service.borrow();
            Ok(Value::list(
                service
                    .conditions
                    .iter()
                    .map(|c| Value::native(ConditionProxy::new(c.clone())))
                    .collect(),
            ))
        },
        set: Some(|p: &ServiceProxy, v: &Value, ctx: &str| {
            p.service.borrow_mut().conditions = conditions_arg(v, ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "unit",
        get: |p: &ServiceProxy| {
            let owner = p.service.borrow().unit.upgrade();
            Ok(owner.map_or(Value::None, |u| Value::native(UnitProxy::new(u))))
        },
        set: None,
    },
];

impl Proxy for ServiceProxy {
    fn proxy_type(&self) -> String {
        "systemd.Service".into()
    }

    fn rendered(&self) -> String {
        self.service.borrow().render()
    }

    fn fields(&self) -> &'static [Field<Self>] {
        SERVICE_FIELDS
    }
}

pub fn new_service(args: Arguments) -> Result<Value> {
    let proxy = construct(
        ServiceProxy::new(shared(Service::default())),
        "Service",
        &[
            "type?",
            "exec_start",
            "exec_start_pre",
            "exec_reload",
            "exec_stop",
            "exec_stop_post",
            "working_dir",
            "root_dir",
            "kill_mode",
            "user",
            "group",
            "restart",
            "timeout_stop_sec",
            "restart_sec",
            "watchdog_sec",
            "notify_access",
            "ignore_sigpipe",
            "stdout",
            "stderr",
            "conditions",
        ],
        &args,
    )?;
    Ok(Value::native(proxy))
}

/// `systemd.Mount`.
pub struct MountProxy {
    mount: Shared<Mount>,
}

impl MountProxy {
    pub fn new(mount: Shared<Mount>) -> Self {
        Self { mount }
    }
}

const MOUNT_FIELDS: &[Field<MountProxy>] = &[
    Field {
        name: "what_path",
        get: |p: &MountProxy| Ok(Value::str(&p.mount.borrow().what_path)),
        set: Some(|p: &MountProxy, v: &Value, ctx: &str| {
            p.mount.borrow_mut().what_path = v.expect_str(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "where_path",
        get: |p: &MountProxy| Ok(Value::str(&p.mount.borrow().where_path)),
        set: Some(|p: &MountProxy, v: &Value, ctx: &str| {
            p.mount.borrow_mut().where_path = v.expect_str(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "fs_type",
        get: |p: &MountProxy| Ok(Value::str(&p.mount.borrow().fs_type)),
        set: Some(|p: &MountProxy, v: &Value, ctx: &str| {
            p.mount.borrow_mut().fs_type = v.expect_str(ctx)?;
            Ok(())
        }),
    },
    Field {
        name: "options",
        get: |p: &MountProxy| Ok(Value::str_list(&p.mount.borrow().options)),
        set: Some(|p: &MountProxy, v: &Value, ctx: &str| {
            p.mount.borrow_mut().options = v.expect_str_list(ctx)?;
            Ok(())
        }),
    },
];

impl Proxy for MountProxy {
    fn proxy_type(&self) -> String {
        "systemd.Mount".into()
    }

    fn rendered(&self) -> String {
        self.mount.borrow().render()
    }

    fn fields(&self) -> &'static [Field<Self>] {
        MOUNT_FIELDS
    }
}

pub fn new_mount(args: Arguments) -> Result<Value> {
    let proxy = construct(
        MountProxy::new(shared(Mount::default())),
        "Mount",
        &["what_path?", "where_path", "fs_type", "options"],
        &args,
    )?;
    Ok(Value::native(proxy))
}

/// `systemd.Condition<Kind>`. Conditions are values: a service stores copies.
pub struct ConditionProxy {
    condition: Condition,
}

impl ConditionProxy {
    pub fn new(condition: Condition) -> Self {
        Self { condition }
    }
}

const CONDITION_FIELDS: &[Field<ConditionProxy>] = &[Field {
    name: "arg",
    get: |p: &ConditionProxy| Ok(Value::str(&p.condition.arg)),
    set: None,
}];

impl Proxy for ConditionProxy {
    fn proxy_type(&self) -> String {
        format!("systemd.Condition{}", self.condition.kind.name())
    }

    fn rendered(&self) -> String {
        self.condition.render()
    }

    fn fields(&self) -> &'static [Field<Self>] {
        CONDITION_FIELDS
    }
}

pub fn new_condition(kind: ConditionKind, args: Arguments) -> Result<Value> {
    let fname = format!("Condition{}", kind.name());
    let arg = args.one(&fname)?.expect_str(&fname)?;
    Ok(Value::native(ConditionProxy::new(Condition { kind, arg })))
}

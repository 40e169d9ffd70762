//! RB-031: systemd unit, service, mount and condition records.

use super::{format_duration, Shared};
use bitflags::bitflags;
use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Weak;
use std::time::Duration;

/// A `.service`/`.mount` unit file: `[Unit]`, an optional `[Service]`, `[Install]`.
#[derive(Debug, Default)]
pub struct Unit {
    pub description: String,
    pub after: Vec<String>,
    pub service: Option<Shared<Service>>,
    pub wanted_by: Vec<String>,
    pub required_by: Vec<String>,
}

impl Unit {
    pub fn render(&self) -> String {
        let mut out = String::from("[Unit]\n");
        if !self.description.is_empty() {
            let _ = writeln!(out, "Description={}", self.description);
        }
        if !self.after.is_empty() {
            let _ = writeln!(out, "After={}", self.after.join(" "));
        }
        out.push('\n');

        if let Some(service) = &self.service {
            out.push_str(&service.borrow().render());
            out.push('\n');
        }

        if !self.wanted_by.is_empty() || !self.required_by.is_empty() {
            out.push_str("[Install]\n");
            if !self.wanted_by.is_empty() {
                let _ = writeln!(out, "WantedBy={}", self.wanted_by.join(" "));
            }
            if !self.required_by.is_empty() {
                let _ = writeln!(out, "RequiredBy={}", self.required_by.join(" "));
            }
            out.push('\n');
        }
        out
    }
}

bitflags! {
    /// Where a service's stdout/stderr is delivered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OutputSinks: u8 {
        const CONSOLE = 1 << 0;
        const JOURNAL = 1 << 1;
        const INHERIT = 1 << 2;
        const SYSLOG = 1 << 3;
        const KMSG = 1 << 4;
    }
}

impl OutputSinks {
    /// `journal+console` style rendering, in systemd's preferred order.
    pub fn render(self) -> String {
        [
            (Self::SYSLOG, "syslog"),
            (Self::KMSG, "kmsg"),
            (Self::JOURNAL, "journal"),
            (Self::CONSOLE, "console"),
            (Self::INHERIT, "inherit"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, ident)| *ident)
        .collect::<Vec<_>>()
        .join("+")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Exists,
    NotExists,
    Host,
    FirstBoot,
}

impl ConditionKind {
    pub fn name(self) -> &'static str {
        match self {
            ConditionKind::Exists => "Exists",
            ConditionKind::NotExists => "NotExists",
            ConditionKind::Host => "Host",
            ConditionKind::FirstBoot => "FirstBoot",
        }
    }

    /// Directive key in the unit file.
    pub fn key(self) -> &'static str {
        match self {
            ConditionKind::Exists => "ConditionPathExists",
            ConditionKind::NotExists => "ConditionPathNotExists",
            ConditionKind::Host => "ConditionHost",
            ConditionKind::FirstBoot => "ConditionFirstBoot",
        }
    }
}

/// A check that must pass for the unit to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub arg: String,
}

impl Condition {
    pub fn render(&self) -> String {
        format!("{}={}\n", self.kind.key(), self.arg)
    }
}

#[derive(Debug, Default)]
pub struct Service {
    pub service_type: String,
    pub exec_start_pre: String,
    pub exec_start: String,
    pub exec_reload: String,
    pub exec_stop: String,
    pub exec_stop_post: String,
    pub working_dir: String,
    pub root_dir: String,
    pub kill_mode: String,
    pub user: String,
    pub group: String,

    pub timeout_stop: Duration,
    pub restart: String,
    pub restart_sec: Duration,
    pub watchdog_sec: Duration,

    pub notify_access: String,

    pub ignore_sigpipe: bool,
    pub stdout: OutputSinks,
    pub stderr: OutputSinks,

    pub conditions: Vec<Condition>,

    /// Owning unit, if this service was attached to one. Lookup only.
    pub unit: Weak<RefCell<Unit>>,
}

impl Service {
    pub fn render(&self) -> String {
        let mut out = String::from("[Service]\n");
        let mut line = |key: &str, value: &str| {
            if !value.is_empty() {
                let _ = writeln!(out, "{}={}", key, value);
            }
        };
        line("Type", &self.service_type);
        line("ExecStartPre", &self.exec_start_pre);
        line("ExecStart", &self.exec_start);
        line("ExecReload", &self.exec_reload);
        line("ExecStop", &self.exec_stop);
        line("ExecStopPost", &self.exec_stop_post);
        line("WorkingDirectory", &self.working_dir);
        line("RootDirectory", &self.root_dir);
        line("KillMode", &self.kill_mode);
        line("User", &self.user);
        line("Group", &self.group);
        line("TimeoutStopSec", &span(self.timeout_stop));
        line("Restart", &self.restart);
        line("RestartSec", &span(self.restart_sec));
        line("WatchdogSec", &span(self.watchdog_sec));
        line("NotifyAccess", &self.notify_access);
        line(
            "IgnoreSIGPIPE",
            if self.ignore_sigpipe { "yes" } else { "no" },
        );
        line("StandardOutput", &self.stdout.render());
        line("StandardError", &self.stderr.render());

        for cond in &self.conditions {
            out.push_str(&cond.render());
        }
        out
    }
}

fn span(d: Duration) -> String {
    if d.is_zero() {
        String::new()
    } else {
        format_duration(d)
    }
}

/// A `[Mount]` stanza.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Mount {
    pub what_path: String,
    pub where_path: String,
    pub fs_type: String,
    pub options: Vec<String>,
}

impl Mount {
    pub fn render(&self) -> String {
        let mut out = String::from("[Mount]\n");
        if !self.what_path.is_empty() {
            let _ = writeln!(out, "What={}", self.what_path);
        }
        if !self.where_path.is_empty() {
            let _ = writeln!(out, "Where={}", self.where_path);
        }
        if !self.fs_type.is_empty() {
            let _ = writeln!(out, "Type={}", self.fs_type);
        }
        if !self.options.is_empty() {
            let _ = writeln!(out, "Options={}", self.options.join(","));
        }
        out
    }
}

/// Values scripts use for string-typed service fields.
pub mod consts {
    pub const RESTART: &[(&str, &str)] = &[
        ("restart_always", "always"),
        ("restart_never", "no"),
        ("restart_success", "on-success"),
        ("restart_failure", "on-failure"),
        ("restart_abnormal", "on-abnormal"),
        ("restart_watchdog", "on-watchdog"),
        ("restart_abort", "on-abort"),
    ];

    pub const KILL_MODE: &[(&str, &str)] = &[
        ("killmode_controlgroup", "control-group"),
        ("killmode_process", "process"),
        ("killmode_mixed", "mixed"),
        ("killmode_none", "none"),
    ];

    pub const SERVICE_TYPE: &[(&str, &str)] = &[
        ("service_simple", "simple"),
        ("service_exec", "exec"),
        ("service_forking", "forking"),
        ("service_oneshot", "oneshot"),
        ("service_notify", "notify"),
        ("service_idle", "idle"),
    ];

    pub const NOTIFY_ACCESS: &[(&str, &str)] = &[
        ("notifymode_none", "none"),
        ("notifymode_main", "main"),
        ("notifymode_exec", "exec"),
        ("notifymode_all", "all"),
    ];
}

//! RB-014: Script lifecycle from construction through entrypoints to teardown.
//!
//! A [`Script`] is built once per run: flags are checked, the environment is
//! assembled, and the top-level module executes. Entrypoints then run one at
//! a time until [`Script::close`] releases every registered resource.

use super::env::{self, Capabilities, EnvInputs};
use super::error::{Error, Result};
use super::loader::{Loader, ModuleResolver};
use super::registry::Registry;
use super::stdlib::StdlibResolver;
use crate::lang::universe::PrintSink;
use crate::lang::value::{Arguments, Module, Value};
use crate::lang::Thread;
use std::rc::Rc;
use tracing::{debug, warn};

/// Per-run settings beyond the script source and arguments.
pub struct ScriptOptions {
    pub verbose: bool,
    /// Exposed to scripts as `test_hook` when set.
    pub test_hook: Option<Value>,
    /// Receives `print()` output; stdout when unset.
    pub print: Option<PrintSink>,
    pub capabilities: Capabilities,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            test_hook: None,
            print: None,
            capabilities: Capabilities::staging(std::env::temp_dir().join("rbox")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    /// Top level executed; entrypoints may be invoked.
    Loaded,
    /// An entrypoint is running.
    Executing,
    Closed,
}

/// Check `args` against an empty flag set and return the positional arguments.
///
/// Any `-x`, `--x` or `-x=v` token before the first positional argument is
/// an undefined flag. `--` ends flag parsing; a lone `-` is positional.
pub fn parse_flags(args: &[String]) -> Result<Vec<String>> {
    for (i, arg) in args.iter().enumerate() {
        if arg == "--" {
            return Ok(args[i + 1..].to_vec());
        }
        if arg.len() < 2 || !arg.starts_with('-') {
            return Ok(args[i..].to_vec());
        }
        let name = arg.trim_start_matches('-');
        let name = name.split_once('=').map_or(name, |(n, _)| n);
        return Err(Error::Flag(format!("flag provided but not defined: -{}", name)));
    }
    Ok(Vec::new())
}

pub struct Script {
    name: String,
    loader: Loader,
    module: Rc<Module>,
    registry: Rc<Registry>,
    state: ScriptState,
    setup_result: Option<Value>,
}

impl Script {
    /// Build the environment and execute the top level of `source`.
    ///
    /// `resolver` serves user modules; the in-tree library is consulted first.
    /// On failure, anything the top level already opened is closed again.
    pub fn new(
        source: &str,
        name: &str,
        resolver: Box<dyn ModuleResolver>,
        args: &[String],
        options: ScriptOptions,
    ) -> Result<Self> {
        let args = parse_flags(args)?;
        let registry = Rc::new(Registry::new());
        let print: PrintSink = match options.print {
            Some(print) => print,
            None => Rc::new(|line: &str| println!("{}", line)),
        };
        let predeclared = env::build(
            EnvInputs {
                args,
                verbose: options.verbose,
                test_hook: options.test_hook,
                print,
                start_ns: env::now_ns(),
            },
            &options.capabilities,
            &registry,
        );
        let loader = Loader::new(Rc::new(predeclared), vec![Box::new(StdlibResolver), resolver]);

        debug!(script = name, "executing top level");
        let module = match loader.exec(name, source) {
            Ok(m) => m,
            Err(e) => {
                if let Err(close_err) = registry.close_all() {
                    warn!(script = name, error = %close_err, "cleanup after failed load");
                }
                loader.clear();
                return Err(e);
            }
        };
        Ok(Self {
            name: name.to_string(),
            loader,
            module,
            registry,
            state: ScriptState::Loaded,
            setup_result: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ScriptState {
        self.state
    }

    /// Names bound at the top level, in definition order.
    pub fn globals(&self) -> Vec<String> {
        self.module.globals.borrow().keys().cloned().collect()
    }

    /// Which of the given entrypoint names are callable globals.
    pub fn entrypoints(&self, names: &[&str]) -> Vec<String> {
        let globals = self.module.globals.borrow();
        names
            .iter()
            .filter(|n| matches!(globals.get(**n), Some(Value::Function(_) | Value::Builtin(_))))
            .map(|n| n.to_string())
            .collect()
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        self.loader.loaded()
    }

    /// Open resources not yet released.
    pub fn open_resources(&self) -> usize {
        self.registry.len()
    }

    fn call_entrypoint(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        if self.state == ScriptState::Closed {
            return Err(Error::eval(format!("{}(): script is closed", name)));
        }
        let Some(f) = self.module.global(name) else {
            return Err(Error::EntrypointMissing { name: name.into() });
        };
        debug!(script = %self.name, entrypoint = name, "invoking");
        self.state = ScriptState::Executing;
        let result = Thread::new(Some(&self.loader)).call(&f, Arguments::positional(args));
        self.state = ScriptState::Loaded;
        result.map_err(|e| Error::Entrypoint {
            name: name.into(),
            source: Box::new(e),
        })
    }

    /// Run `setup(template)` if the script defines it. Its result becomes
    /// the argument to `build`; without `setup`, `build` receives `None`.
    pub fn invoke_setup(&mut self, template: &str) -> Result<()> {
        if self.module.global("setup").is_none() {
            debug!(script = %self.name, "no setup entrypoint");
            self.setup_result = None;
            return Ok(());
        }
        let v = self.call_entrypoint("setup", vec![Value::str(template)])?;
        self.setup_result = Some(v);
        Ok(())
    }

    pub fn invoke_build(&mut self) -> Result<()> {
        let arg = self.setup_result.clone().unwrap_or(Value::None);
        self.call_entrypoint("build", vec![arg]).map(|_| ())
    }

    /// Call a zero-argument entrypoint that must return a string.
    pub fn invoke_named(&mut self, name: &str) -> Result<String> {
        match self.call_entrypoint(name, Vec::new())? {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(Error::type_mismatch(
                format!("{}()", name),
                "string",
                other.type_name(),
            )),
        }
    }

    /// Release every registered resource and drop the script's globals.
    /// The first close failure is returned; later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ScriptState::Closed {
            return Ok(());
        }
        self.state = ScriptState::Closed;
        self.setup_result = None;
        let res = self.registry.close_all();
        self.loader.clear();
        self.module.globals.borrow_mut().clear();
        debug!(script = %self.name, "closed");
        res
    }
}

impl Drop for Script {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(script = %self.name, error = %e, "close on drop failed");
        }
    }
}

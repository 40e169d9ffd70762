//! RB-011: Module loader with cycle detection and once-only execution.
//!
//! Each module name moves through [`ModuleState`] exactly once:
//! unseen → loading → loaded. A `load()` that finds its target still
//! loading is a cycle. The cache belongs to one Script.

use super::error::{Error, Result};
use crate::lang::parser::parse;
use crate::lang::value::{Module, Namespace};
use crate::lang::{ModuleLoader, Thread};
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// Source of module text. `Ok(None)` means the name is unknown here.
pub trait ModuleResolver {
    fn resolve(&self, name: &str) -> Result<Option<String>>;
}

/// Resolves module names to files under a list of directories.
#[derive(Debug, Clone, Default)]
pub struct DirResolver {
    dirs: Vec<PathBuf>,
}

impl DirResolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl ModuleResolver for DirResolver {
    fn resolve(&self, name: &str) -> Result<Option<String>> {
        let relative = Path::new(name);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(Error::Import {
                module: name.into(),
                reason: "module names must be relative paths".into(),
            });
        }
        for dir in &self.dirs {
            let path = dir.join(relative);
            match std::fs::read_to_string(&path) {
                Ok(src) => return Ok(Some(src)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::resource(format!("read {}", path.display()), e)),
            }
        }
        Ok(None)
    }
}

#[derive(Clone)]
pub enum ModuleState {
    Unseen,
    Loading,
    Loaded(Rc<Module>),
}

pub struct Loader {
    predeclared: Rc<Namespace>,
    resolvers: Vec<Box<dyn ModuleResolver>>,
    cache: RefCell<IndexMap<String, ModuleState, FxBuildHasher>>,
}

impl Loader {
    /// `resolvers` are consulted in order; the first that knows a name wins.
    pub fn new(predeclared: Rc<Namespace>, resolvers: Vec<Box<dyn ModuleResolver>>) -> Self {
        Self {
            predeclared,
            resolvers,
            cache: RefCell::new(IndexMap::default()),
        }
    }

    pub fn predeclared(&self) -> &Rc<Namespace> {
        &self.predeclared
    }

    pub fn state(&self, name: &str) -> ModuleState {
        self.cache
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or(ModuleState::Unseen)
    }

    /// Names of loaded modules, in the order they finished loading.
    pub fn loaded(&self) -> Vec<String> {
        self.cache
            .borrow()
            .iter()
            .filter(|(_, s)| matches!(s, ModuleState::Loaded(_)))
            .map(|(n, _)| n.clone())
            .collect()
    }

    fn find_source(&self, name: &str) -> Result<String> {
        for resolver in &self.resolvers {
            match resolver.resolve(name) {
                Ok(Some(src)) => return Ok(src),
                Ok(None) => {}
                Err(e @ Error::Import { .. }) => return Err(e),
                Err(e) => {
                    return Err(Error::Import {
                        module: name.into(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        Err(Error::Import {
            module: name.into(),
            reason: "module not found".into(),
        })
    }

    /// Parse and execute `src` as module `name` against the predeclared namespace.
    pub fn exec(&self, name: &str, src: &str) -> Result<Rc<Module>> {
        let program = parse(src, name)?;
        let module = Rc::new(Module::new(name, self.predeclared.clone()));
        Thread::new(Some(self)).exec_module(&module, &program)?;
        Ok(module)
    }

    fn load_fresh(&self, name: &str) -> Result<Rc<Module>> {
        let src = self.find_source(name)?;
        self.exec(name, &src)
    }

    /// Drop the globals of every loaded module. Functions hold their module,
    /// and globals hold functions, so this is what lets the modules go.
    pub fn clear(&self) {
        for (_, state) in self.cache.borrow_mut().drain(..) {
            if let ModuleState::Loaded(m) = state {
                m.globals.borrow_mut().clear();
            }
        }
    }
}

impl ModuleLoader for Loader {
    fn load(&self, name: &str) -> Result<Rc<Module>> {
        match self.state(name) {
            ModuleState::Loaded(m) => return Ok(m),
            ModuleState::Loading => return Err(Error::Cycle { module: name.into() }),
            ModuleState::Unseen => {}
        }
        self.cache
            .borrow_mut()
            .insert(name.to_string(), ModuleState::Loading);
        debug!(module = name, "loading module");

        match self.load_fresh(name) {
            Ok(module) => {
                // Re-inserting keeps the slot taken when loading began; move it
                // to the end so `loaded()` reports completion order.
                let mut cache = self.cache.borrow_mut();
                cache.shift_remove(name);
                cache.insert(name.to_string(), ModuleState::Loaded(module.clone()));
                debug!(module = name, "loaded module");
                Ok(module)
            }
            Err(e) => {
                self.cache.borrow_mut().shift_remove(name);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::universe::universe;
    use crate::lang::value::{Builtin, Value};
    use rustc_hash::FxHashMap;
    use std::cell::Cell;

    struct MapResolver(FxHashMap<String, String>);

    impl MapResolver {
        fn new(modules: &[(&str, &str)]) -> Self {
            Self(
                modules
                    .iter()
                    .map(|(n, s)| (n.to_string(), s.to_string()))
                    .collect(),
            )
        }
    }

    impl ModuleResolver for MapResolver {
        fn resolve(&self, name: &str) -> Result<Option<String>> {
            Ok(self.0.get(name).cloned())
        }
    }

    struct Failing;

    impl ModuleResolver for Failing {
        fn resolve(&self, name: &str) -> Result<Option<String>> {
            Err(Error::resource(
                format!("read {}", name),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ))
        }
    }

    /// Predeclared namespace with a `tick()` builtin counting executions.
    fn counting_env() -> (Rc<Namespace>, Rc<Cell<u32>>) {
        let ticks = Rc::new(Cell::new(0));
        let counter = ticks.clone();
        let mut ns = universe(Rc::new(|_: &str| {}));
        ns.insert(
            "tick".into(),
            Builtin::value("tick", move |_| {
                counter.set(counter.get() + 1);
                Ok(Value::None)
            }),
        );
        (Rc::new(ns), ticks)
    }

    #[test]
    fn test_loader_import_is_idempotent() {
        let (env, ticks) = counting_env();
        let loader = Loader::new(
            env,
            vec![Box::new(MapResolver::new(&[("lib.star", "tick()\nx = [1, 2]\n")]))],
        );
        let main = "load('lib.star', 'x')\nload('lib.star', y = 'x')\n";
        let m = loader.exec("main.star", main).unwrap();
        assert_eq!(ticks.get(), 1);
        assert!(m.global("x").unwrap().equals(&m.global("y").unwrap()));
        assert!(matches!(loader.state("lib.star"), ModuleState::Loaded(_)));
        assert_eq!(loader.loaded(), ["lib.star"]);
    }

    #[test]
    fn test_loader_rejects_cycles() {
        let (env, _) = counting_env();
        let loader = Loader::new(
            env,
            vec![Box::new(MapResolver::new(&[
                ("a.star", "load('b.star', 'b')\na = 1\n"),
                ("b.star", "load('a.star', 'a')\nb = 2\n"),
            ]))],
        );
        let err = loader.exec("main.star", "load('a.star', 'a')\n").unwrap_err();
        assert!(
            err.to_string().contains("cycle in dependency graph when loading a.star"),
            "{}",
            err
        );
        assert!(matches!(loader.state("a.star"), ModuleState::Unseen));
        assert!(matches!(loader.state("b.star"), ModuleState::Unseen));
    }

    #[test]
    fn test_loader_self_import_is_a_cycle() {
        let (env, _) = counting_env();
        let loader = Loader::new(
            env,
            vec![Box::new(MapResolver::new(&[("a.star", "load('a.star', 'x')\nx = 1\n")]))],
        );
        assert!(loader.load("a.star").is_err());
    }

    #[test]
    fn test_loader_deep_acyclic_chain() {
        let (env, ticks) = counting_env();
        let mut modules = Vec::new();
        for i in 0..50 {
            let src = if i == 49 {
                "tick()\nv = 49\n".to_string()
            } else {
                format!("load('m{}.star', 'v')\ntick()\n", i + 1)
            };
            modules.push((format!("m{}.star", i), src));
        }
        let refs: Vec<(&str, &str)> = modules.iter().map(|(n, s)| (n.as_str(), s.as_str())).collect();
        let loader = Loader::new(env, vec![Box::new(MapResolver::new(&refs))]);
        let m = loader.load("m0.star").unwrap();
        assert_eq!(m.global("v").unwrap().expect_int("v").unwrap(), 49);
        assert_eq!(ticks.get(), 50);
        assert_eq!(loader.loaded().len(), 50);
        assert_eq!(loader.loaded()[0], "m49.star");
    }

    #[test]
    fn test_loader_unknown_module_can_be_retried() {
        let (env, _) = counting_env();
        let loader = Loader::new(env, vec![Box::new(MapResolver::new(&[]))]);
        for _ in 0..2 {
            let err = loader.load("missing.star").unwrap_err();
            assert!(matches!(err, Error::Import { ref module, .. } if module == "missing.star"));
            assert!(matches!(loader.state("missing.star"), ModuleState::Unseen));
        }
    }

    #[test]
    fn test_loader_resolver_priority_and_failures() {
        let (env, _) = counting_env();
        let loader = Loader::new(
            env.clone(),
            vec![
                Box::new(MapResolver::new(&[("lib.star", "who = 'first'\n")])),
                Box::new(MapResolver::new(&[("lib.star", "who = 'second'\n")])),
            ],
        );
        let m = loader.load("lib.star").unwrap();
        assert_eq!(m.global("who").unwrap().to_str(), "first");

        let loader = Loader::new(env, vec![Box::new(Failing)]);
        let err = loader.load("lib.star").unwrap_err();
        assert!(matches!(err, Error::Import { .. }));
        assert!(err.to_string().contains("denied"), "{}", err);
    }

    #[test]
    fn test_loader_dir_resolver() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("lib/util.star"), "answer = 42\n").unwrap();
        let resolver = DirResolver::new(vec![dir.path().to_path_buf()]);
        assert!(resolver.resolve("lib/util.star").unwrap().is_some());
        assert!(resolver.resolve("lib/none.star").unwrap().is_none());
        assert!(resolver.resolve("../etc/passwd").is_err());
        assert!(resolver.resolve("/etc/passwd").is_err());
    }

    #[test]
    fn test_loader_clear_releases_globals() {
        let (env, _) = counting_env();
        let loader = Loader::new(
            env,
            vec![Box::new(MapResolver::new(&[("lib.star", "def f():\n    pass\n")]))],
        );
        let m = loader.load("lib.star").unwrap();
        assert!(m.global("f").is_some());
        loader.clear();
        assert!(m.global("f").is_none());
        assert!(loader.loaded().is_empty());
    }
}

//! RB-013: Resource registry of closable handles opened by builtins.
//!
//! Scoped to one Script. Builtins register a handle before handing the
//! corresponding value to the script, so teardown reaches it even when the
//! script fails right after.

use super::error::Result;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::warn;

/// A handle with an explicit release step. `close` must tolerate repeat calls.
pub trait Closable {
    fn close(&self) -> Result<()>;

    /// Short label used when a close failure is logged.
    fn describe(&self) -> String;
}

#[derive(Default)]
pub struct Registry {
    entries: RefCell<Vec<Rc<dyn Closable>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: Rc<dyn Closable>) {
        self.entries.borrow_mut().push(handle);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Close every entry, most recent first. Keeps going past failures and
    /// returns the first one; the rest are logged.
    pub fn close_all(&self) -> Result<()> {
        let entries: Vec<_> = self.entries.borrow_mut().drain(..).collect();
        let mut first = None;
        for handle in entries.iter().rev() {
            if let Err(e) = handle.close() {
                if first.is_none() {
                    first = Some(e);
                } else {
                    warn!(resource = %handle.describe(), error = %e, "close failed");
                }
            }
        }
        first.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use std::cell::Cell;

    struct Counted {
        name: &'static str,
        closes: Cell<u32>,
        fail: bool,
    }

    impl Counted {
        fn new(name: &'static str, fail: bool) -> Rc<Self> {
            Rc::new(Self {
                name,
                closes: Cell::new(0),
                fail,
            })
        }
    }

    impl Closable for Counted {
        fn close(&self) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            if self.fail {
                return Err(Error::eval(format!("{} busy", self.name)));
            }
            Ok(())
        }

        fn describe(&self) -> String {
            self.name.into()
        }
    }

    #[test]
    fn test_registry_closes_everything_once() {
        let reg = Registry::new();
        let handles = [Counted::new("a", false), Counted::new("b", false)];
        for h in &handles {
            reg.register(h.clone());
        }
        assert_eq!(reg.len(), 2);
        reg.close_all().unwrap();
        reg.close_all().unwrap();
        assert!(reg.is_empty());
        for h in &handles {
            assert_eq!(h.closes.get(), 1);
        }
    }

    #[test]
    fn test_registry_continues_past_failures() {
        let reg = Registry::new();
        let a = Counted::new("a", true);
        let b = Counted::new("b", false);
        let c = Counted::new("c", true);
        reg.register(a.clone());
        reg.register(b.clone());
        reg.register(c.clone());
        let err = reg.close_all().unwrap_err();
        // Reverse order: c fails first and is the one surfaced.
        assert_eq!(err.to_string(), "c busy");
        assert_eq!((a.closes.get(), b.closes.get(), c.closes.get()), (1, 1, 1));
    }
}

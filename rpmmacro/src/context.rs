use std::fmt::Write as _;

use crate::macro_def::MacroEntry;

/// All definitions of one macro name, most recent last
#[derive(Clone, Debug)]
pub struct MacroSlot {
    name: String,
    stack: Vec<MacroEntry>,
}

impl MacroSlot {
    /// The macro name shared by every entry on the stack
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The visible (most recently pushed) definition
    #[must_use]
    pub fn top(&self) -> &MacroEntry {
        // a slot never outlives its last entry
        &self.stack[self.stack.len() - 1]
    }

    pub(crate) fn top_mut(&mut self) -> &mut MacroEntry {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    /// Number of shadowed definitions, including the visible one
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Definitions from oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &MacroEntry> {
        self.stack.iter()
    }
}

/// A macro table: name-sorted slots, each a stack of shadowing definitions
///
/// A name is present in the table if and only if its stack is non-empty.
#[derive(Clone, Debug, Default)]
pub struct MacroContext {
    slots: Vec<MacroSlot>,
    pub(crate) trace: bool,
}

impl MacroContext {
    /// Create an empty macro table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.slots
            .binary_search_by(|slot| slot.name.as_str().cmp(name))
    }

    /// Look up the slot for `name`
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&MacroSlot> {
        self.position(name).ok().map(|i| &self.slots[i])
    }

    pub(crate) fn find_mut(&mut self, name: &str) -> Option<&mut MacroSlot> {
        match self.position(name) {
            Ok(i) => Some(&mut self.slots[i]),
            Err(_) => None,
        }
    }

    /// Visible definition of `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MacroEntry> {
        self.find(name).map(MacroSlot::top)
    }

    /// Raw body of `name` without expansion
    #[must_use]
    pub fn get_body(&self, name: &str) -> Option<&str> {
        self.get(name).map(MacroEntry::body)
    }

    /// Check if a macro is defined
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    /// Push a definition, shadowing any previous one
    ///
    /// `opts` of `Some("")` declares a macro that takes positional arguments
    /// but no options; `None` declares a plain substitution.
    pub fn define(&mut self, name: &str, opts: Option<&str>, body: &str, level: i32) {
        tracing::debug!(name, ?opts, level, "define macro");
        let entry = MacroEntry::new(opts, body, level);
        match self.position(name) {
            Ok(i) => self.slots[i].stack.push(entry),
            Err(i) => self.slots.insert(
                i,
                MacroSlot {
                    name: name.to_string(),
                    stack: vec![entry],
                },
            ),
        }
    }

    /// Pop the visible definition of `name`; unknown names are ignored
    pub fn undefine(&mut self, name: &str) {
        if let Ok(i) = self.position(name) {
            tracing::debug!(name, "undefine macro");
            self.slots[i].stack.pop();
            if self.slots[i].stack.is_empty() {
                self.slots.remove(i);
            }
        }
    }

    /// Drop every definition made at `level` or deeper
    ///
    /// Used after a parameterized macro returns, so its argument bindings
    /// (and anything it defined locally) do not leak into siblings.
    pub fn free_args(&mut self, level: i32) {
        for slot in &mut self.slots {
            while slot.stack.last().is_some_and(|e| e.level >= level) {
                slot.stack.pop();
            }
        }
        self.slots.retain(|slot| !slot.stack.is_empty());
    }

    /// Copy every visible definition into `target` at `level`
    pub fn load_into(&self, target: &mut MacroContext, level: i32) {
        for slot in &self.slots {
            let top = slot.top();
            target.define(&slot.name, top.opts(), top.body(), level);
        }
    }

    /// Pop every stack to empty
    pub fn clear(&mut self) {
        self.slots.clear();
        self.trace = false;
    }

    /// Number of defined names
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no macro is defined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots in name order
    pub fn iter(&self) -> impl Iterator<Item = &MacroSlot> {
        self.slots.iter()
    }

    /// Render the table the way `%dump` prints it
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::from("========================\n");
        for slot in &self.slots {
            let me = slot.top();
            let mark = if me.used > 0 { '=' } else { ':' };
            let _ = write!(out, "{:3}{} {}", me.level, mark, slot.name);
            if let Some(opts) = me.opts().filter(|o| !o.is_empty()) {
                let _ = write!(out, "({opts})");
            }
            if !me.body.is_empty() {
                let _ = write!(out, "\t{}", me.body);
            }
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "======================== active {} empty 0",
            self.slots.len()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_stays_sorted() {
        let mut mc = MacroContext::new();
        for name in ["zeta", "alpha", "mid", "_under", "Beta"] {
            mc.define(name, None, "x", 0);
        }
        let names: Vec<&str> = mc.iter().map(MacroSlot::name).collect();
        assert_eq!(names, vec!["Beta", "_under", "alpha", "mid", "zeta"]);
        assert!(mc.find("mid").is_some());
        assert!(mc.find("nope").is_none());
    }

    #[test]
    fn shadowing_is_lifo() {
        let mut mc = MacroContext::new();
        mc.define("x", None, "1", 0);
        mc.define("x", None, "2", 1);
        assert_eq!(mc.get_body("x"), Some("2"));
        assert_eq!(mc.find("x").map(MacroSlot::depth), Some(2));
        mc.undefine("x");
        assert_eq!(mc.get_body("x"), Some("1"));
        mc.undefine("x");
        assert!(!mc.is_defined("x"));
        assert!(mc.is_empty());
    }

    #[test]
    fn undefine_unknown_is_noop() {
        let mut mc = MacroContext::new();
        mc.define("keep", None, "v", 0);
        mc.undefine("missing");
        assert_eq!(mc.len(), 1);
    }

    #[test]
    fn free_args_pops_deep_levels_only() {
        let mut mc = MacroContext::new();
        mc.define("name", None, "base", 0);
        mc.define("name", None, "arg", 3);
        mc.define("1", None, "one", 3);
        mc.define("deeper", None, "d", 4);
        mc.free_args(3);
        assert_eq!(mc.get_body("name"), Some("base"));
        assert!(!mc.is_defined("1"));
        assert!(!mc.is_defined("deeper"));
    }

    #[test]
    fn load_into_copies_visible_entries() {
        let mut cli = MacroContext::new();
        cli.define("_topdir", None, "/tmp/build", -20);
        cli.define("_topdir", None, "/srv/build", -20);
        let mut global = MacroContext::new();
        cli.load_into(&mut global, -7);
        let entry = global.get("_topdir").unwrap();
        assert_eq!(entry.body(), "/srv/build");
        assert_eq!(entry.level(), -7);
    }

    #[test]
    fn dump_format() {
        let mut mc = MacroContext::new();
        mc.define("greet", Some("n:"), "Hello %1", -13);
        mc.define("empty", None, "", 0);
        let dump = mc.dump();
        assert_eq!(
            dump,
            "========================\n  0: empty\n-13: greet(n:)\tHello %1\n======================== active 2 empty 0\n"
        );
    }
}

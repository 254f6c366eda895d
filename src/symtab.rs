//! Symbol resolution: classifies names as param/local/global/static/
//! undefined, allocates slots, and enforces the redefinition rules,
//! including file-scoped statics for nested `read` includes.
use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Undefined,
    Global,
    Static,
    Local,
    Param,
}

#[derive(Debug, Clone)]
struct Local {
    name: String,
    depth: isize,
    slot: usize,
}

#[derive(Debug, Clone)]
struct GlobalEntry {
    handle: usize,
    is_static: bool,
    /// Index into the file-scope stack at the depth this static becomes
    /// invisible, or `None` for a true global / a static still in scope.
    file_scope_born_at: Option<usize>,
}

/// Contract every symbol store (the reference [`Symtab`] included, or any
/// host-provided equivalent) must satisfy.
pub trait SymbolTable {
    fn classify(&self, name: &str) -> SymbolKind;
    fn add_local(&mut self, name: &str) -> Result<usize, CompileError>;
    fn add_global(&mut self, name: &str, is_static: bool) -> usize;
    fn add_param(&mut self, name: &str) -> usize;
    fn find_local(&self, name: &str) -> Option<usize>;
    fn find_param(&self, name: &str) -> Option<usize>;
    fn find_global(&self, name: &str) -> Option<usize>;
    fn enter_file_scope(&mut self);
    fn exit_file_scope(&mut self);
    fn enter_func_scope(&mut self);
    fn exit_func_scope(&mut self) -> usize;
    fn end_static_scope(&mut self, name: &str);
}

/// Reference implementation of [`SymbolTable`].
#[derive(Debug, Default)]
pub struct Symtab {
    globals: std::collections::HashMap<String, GlobalEntry>,
    next_global_handle: usize,
    locals: Vec<Local>,
    params: Vec<String>,
    scope_depth: isize,
    file_scope_depth: usize,
}

impl Symtab {
    pub fn new() -> Self {
        Symtab::default()
    }

    pub fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Pops every local declared at the scope being exited; returns how
    /// many slots were freed (the emitter pops that many values).
    pub fn end_scope(&mut self) -> usize {
        self.scope_depth -= 1;
        let mut popped = 0;
        while matches!(self.locals.last(), Some(l) if l.depth > self.scope_depth) {
            self.locals.pop();
            popped += 1;
        }
        popped
    }
}

impl SymbolTable for Symtab {
    fn classify(&self, name: &str) -> SymbolKind {
        if self.params.iter().any(|p| p == name) {
            return SymbolKind::Param;
        }
        if self.locals.iter().rev().any(|l| l.name == name) {
            return SymbolKind::Local;
        }
        match self.globals.get(name) {
            Some(entry) if entry.is_static => SymbolKind::Static,
            Some(_) => SymbolKind::Global,
            None => SymbolKind::Undefined,
        }
    }

    fn add_local(&mut self, name: &str) -> Result<usize, CompileError> {
        if let Some(existing) = self
            .locals
            .iter()
            .rev()
            .take_while(|l| l.depth == self.scope_depth)
            .find(|l| l.name == name)
        {
            // Redeclaring a local in the same scope is permitted.
            return Ok(existing.slot);
        }
        let slot = self.locals.len();
        self.locals.push(Local {
            name: name.to_string(),
            depth: self.scope_depth,
            slot,
        });
        Ok(slot)
    }

    fn add_global(&mut self, name: &str, is_static: bool) -> usize {
        if let Some(existing) = self.globals.get(name) {
            if existing.is_static && !is_static {
                // A global redefinition ends the static's visibility.
                self.end_static_scope(name);
            }
        }
        let handle = match self.globals.get(name) {
            Some(entry) => entry.handle,
            None => {
                let handle = self.next_global_handle;
                self.next_global_handle += 1;
                handle
            }
        };
        self.globals.insert(
            name.to_string(),
            GlobalEntry {
                handle,
                is_static,
                file_scope_born_at: is_static.then_some(self.file_scope_depth),
            },
        );
        handle
    }

    fn add_param(&mut self, name: &str) -> usize {
        let slot = self.params.len();
        self.params.push(name.to_string());
        slot
    }

    fn find_local(&self, name: &str) -> Option<usize> {
        self.locals.iter().rev().find(|l| l.name == name).map(|l| l.slot)
    }

    fn find_param(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }

    fn find_global(&self, name: &str) -> Option<usize> {
        self.globals.get(name).map(|e| e.handle)
    }

    fn enter_file_scope(&mut self) {
        self.file_scope_depth += 1;
    }

    /// Exiting a file scope retires every static born inside it — they
    /// become invisible, scoped to the include-file they were declared in.
    fn exit_file_scope(&mut self) {
        let leaving = self.file_scope_depth;
        self.globals
            .retain(|_, entry| !(entry.is_static && entry.file_scope_born_at == Some(leaving)));
        self.file_scope_depth = self.file_scope_depth.saturating_sub(1);
    }

    fn enter_func_scope(&mut self) {
        self.params.clear();
        self.locals.clear();
        self.scope_depth = 0;
    }

    fn exit_func_scope(&mut self) -> usize {
        let count = self.locals.len();
        self.params.clear();
        self.locals.clear();
        self.scope_depth = 0;
        count
    }

    fn end_static_scope(&mut self, name: &str) {
        self.globals.remove(name);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn undefined_name_classifies_as_undefined() {
        let t = Symtab::new();
        assert_eq!(t.classify("x"), SymbolKind::Undefined);
    }

    #[test]
    fn param_shadows_global_classification() {
        let mut t = Symtab::new();
        t.add_global("x", false);
        t.add_param("x");
        assert_eq!(t.classify("x"), SymbolKind::Param);
    }

    #[test]
    fn redeclaring_local_in_same_scope_reuses_slot() {
        let mut t = Symtab::new();
        t.begin_scope();
        let a = t.add_local("x").unwrap();
        let b = t.add_local("x").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn static_promoted_to_global_ends_static_scope() {
        let mut t = Symtab::new();
        t.add_global("x", true);
        assert_eq!(t.classify("x"), SymbolKind::Static);
        t.add_global("x", false);
        assert_eq!(t.classify("x"), SymbolKind::Global);
    }

    #[test]
    fn exiting_file_scope_retires_its_statics() {
        let mut t = Symtab::new();
        t.enter_file_scope();
        t.add_global("s", true);
        assert_eq!(t.classify("s"), SymbolKind::Static);
        t.exit_file_scope();
        assert_eq!(t.classify("s"), SymbolKind::Undefined);
    }
}

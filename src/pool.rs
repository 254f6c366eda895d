//! The interning/registry tables treated as external collaborators: the
//! numeric/string constant pool, the object-type registry, and the
//! user/builtin function tables. Plain owned structs rather than a
//! process-global singleton (see DESIGN.md).
use std::collections::HashMap;

/// Interns numbers and strings, returning stable indices used as opcode
/// immediates (`NUMBER(idx)`, `STRING(idx)`).
#[derive(Debug, Default)]
pub struct ConstantPool {
    numbers: Vec<i64>,
    number_index: HashMap<i64, usize>,
    strings: Vec<String>,
    string_index: HashMap<String, usize>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_number(&mut self, value: i64) -> usize {
        if let Some(&idx) = self.number_index.get(&value) {
            return idx;
        }
        let idx = self.numbers.len();
        self.numbers.push(value);
        self.number_index.insert(value, idx);
        idx
    }

    pub fn intern_string(&mut self, value: &str) -> usize {
        if let Some(&idx) = self.string_index.get(value) {
            return idx;
        }
        let idx = self.strings.len();
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), idx);
        idx
    }

    pub fn number(&self, idx: usize) -> i64 {
        self.numbers[idx]
    }

    pub fn string(&self, idx: usize) -> &str {
        &self.strings[idx]
    }
}

/// Global element-name table: `.field` uses one integer per field name
/// across every object type.
#[derive(Debug, Default)]
pub struct ElementNames {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ElementNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }
}

#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub element_indices: Vec<usize>,
}

/// Registry of `obj` type declarations, keyed by name.
#[derive(Debug, Default)]
pub struct ObjectTypes {
    types: Vec<ObjectType>,
    index: HashMap<String, usize>,
}

impl ObjectTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &str, element_indices: Vec<usize>) -> Result<usize, ()> {
        if self.index.contains_key(name) {
            return Err(());
        }
        let idx = self.types.len();
        self.types.push(ObjectType {
            name: name.to_string(),
            element_indices,
        });
        self.index.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, idx: usize) -> &ObjectType {
        &self.types[idx]
    }
}

/// The user-defined function table (`define f(...) ...`), keyed by name so
/// redefinition replaces the previous entry in place.
#[derive(Debug, Default)]
pub struct UserFuncs {
    by_name: HashMap<String, usize>,
    functions: Vec<crate::opcode::Function>,
}

impl UserFuncs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines or replaces `function`, returning its stable index.
    pub fn define(&mut self, function: crate::opcode::Function) -> usize {
        if let Some(&idx) = self.by_name.get(&function.name) {
            self.functions[idx] = function;
            idx
        } else {
            let idx = self.functions.len();
            self.by_name.insert(function.name.clone(), idx);
            self.functions.push(function);
            idx
        }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn undefine(&mut self, name: &str) -> bool {
        if let Some(idx) = self.by_name.remove(name) {
            self.functions[idx] = crate::opcode::Function::new("");
            true
        } else {
            false
        }
    }

    /// `undefine *` — drops every user-defined function at once.
    pub fn undefine_all(&mut self) {
        self.by_name.clear();
        self.functions.clear();
    }

    pub fn get(&self, idx: usize) -> &crate::opcode::Function {
        &self.functions[idx]
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|s| s.as_str())
    }
}

/// The fixed builtin-function table (`sqrt`, `size`, `fact`, …). Names are
/// reserved: a user `define` of one of these is a
/// [`crate::error::CompileError::BuiltinNameCollision`].
#[derive(Debug)]
pub struct Builtins {
    names: Vec<&'static str>,
    index: HashMap<&'static str, usize>,
}

pub const BUILTIN_NAMES: &[&str] = &[
    "sqrt", "abs", "sgn", "size", "fact", "isnull", "isint", "isreal", "isstr", "isobj", "ismat",
    "sum", "max", "min", "int", "frac", "round",
];

impl Default for Builtins {
    fn default() -> Self {
        let names = BUILTIN_NAMES.to_vec();
        let index = names.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        Builtins { names, index }
    }
}

impl Builtins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn name(&self, idx: usize) -> &'static str {
        self.names[idx]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut pool = ConstantPool::new();
        let a = pool.intern_number(42);
        let b = pool.intern_number(42);
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_object_type_is_rejected() {
        let mut types = ObjectTypes::new();
        types.define("point", vec![0, 1]).unwrap();
        assert!(types.define("point", vec![0]).is_err());
    }

    #[test]
    fn builtin_names_are_recognized() {
        let b = Builtins::new();
        assert!(b.is_builtin("sqrt"));
        assert!(!b.is_builtin("not_a_builtin"));
    }
}

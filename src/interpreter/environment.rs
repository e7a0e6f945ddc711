use std::{
    cell::RefCell,
    collections::hash_map::Entry,
    fmt::{Debug, Display},
    rc::Rc,
};

use rustc_hash::FxHashMap;

use super::{ExecutionErrorKind, Value};

/// What kind of binding a symbol is; governs reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Function,
    NativeFunction,
    Parameter,
    Variable,
    ImmutableVariable,
    ClassDefinition,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Function => "function",
            Role::NativeFunction => "native_function",
            Role::Parameter => "parameter",
            Role::Variable => "variable",
            Role::ImmutableVariable => "immutable_variable",
            Role::ClassDefinition => "class_definition",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub role: Role,
    /// `None` until the first assignment.
    pub value: Option<Value>,
}

impl Symbol {
    pub fn is_initialized(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Clone, Default)]
pub struct Scope {
    symbols: FxHashMap<String, Symbol>,
    parent: Option<Rc<RefCell<Scope>>>,
}

impl Scope {
    pub fn boxed(parent: Option<Rc<RefCell<Scope>>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            symbols: FxHashMap::default(),
            parent,
        }))
    }

    /// A new, empty scope that sees later changes made to `scope`.
    pub fn child(scope: &Rc<RefCell<Scope>>) -> Rc<RefCell<Self>> {
        Self::boxed(Some(scope.clone()))
    }

    /// Copies the symbol tables of the whole chain. Bindings made in the
    /// copy and in the original no longer affect each other; lists and
    /// dictionaries stay shared since values are copied by handle.
    pub fn snapshot(scope: &Rc<RefCell<Scope>>) -> Rc<RefCell<Self>> {
        let scope = scope.borrow();
        Rc::new(RefCell::new(Self {
            symbols: scope.symbols.clone(),
            parent: scope.parent.as_ref().map(Self::snapshot),
        }))
    }

    pub fn declare(&mut self, name: &str, role: Role) -> Result<(), ExecutionErrorKind> {
        match self.symbols.entry(name.to_string()) {
            Entry::Occupied(o) => Err(ExecutionErrorKind::Redeclaration(o.key().clone())),
            Entry::Vacant(v) => {
                v.insert(Symbol {
                    name: name.to_string(),
                    role,
                    value: None,
                });
                Ok(())
            }
        }
    }

    /// Declares and initializes in one step.
    pub fn define(
        &mut self,
        name: &str,
        role: Role,
        value: Value,
    ) -> Result<(), ExecutionErrorKind> {
        self.declare(name, role)?;
        self.assign(name, value)
    }

    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), ExecutionErrorKind> {
        if let Some(symbol) = self.symbols.get_mut(name) {
            if matches!(value, Value::Void) {
                return Err(ExecutionErrorKind::VoidAssignment(name.to_string()));
            }
            if symbol.role == Role::ImmutableVariable && symbol.is_initialized() {
                return Err(ExecutionErrorKind::ImmutableReassignment(name.to_string()));
            }
            symbol.value = Some(value);
            return Ok(());
        }

        match &self.parent {
            Some(parent) => parent.borrow_mut().assign(name, value),
            None => Err(ExecutionErrorKind::UndeclaredVariable(name.to_string())),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Symbol, ExecutionErrorKind> {
        if let Some(symbol) = self.symbols.get(name) {
            return Ok(symbol.clone());
        }
        match &self.parent {
            Some(parent) => parent.borrow().lookup(name),
            None => Err(ExecutionErrorKind::UndeclaredVariable(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Result<Value, ExecutionErrorKind> {
        self.lookup(name)?
            .value
            .ok_or_else(|| ExecutionErrorKind::UninitializedVariable(name.to_string()))
    }

    pub fn is_declared_locally(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(format!("Scope<{:?}>", std::ptr::from_ref(self)).as_str())
            .field(
                "symbols",
                &self
                    .symbols
                    .values()
                    .map(|symbol| match &symbol.value {
                        Some(value) => format!("{} {} = {}", symbol.role, symbol.name, value),
                        None => format!("{} {}", symbol.role, symbol.name),
                    })
                    .collect::<Vec<_>>(),
            )
            .field("parent", &self.parent.as_ref().map(|p| p.as_ptr()))
            .finish()
    }
}

use std::{cell::RefCell, fmt::Debug, rc::Rc};

use rustc_hash::FxHashMap;

use crate::ast::Block;

use super::{
    environment::{Role, Scope},
    ExecutionErrorKind, Flow, Interpreter, Value,
};

/// A user-defined function together with the environment it captured.
pub struct Function {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Block,
    pub closure: Rc<RefCell<Scope>>,
}

impl Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("closure", &self.closure.as_ptr())
            .finish()
    }
}

impl Function {
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ExecutionErrorKind> {
        let scope = self.bind_arguments(args, kwargs)?;
        tracing::trace!(function = %self.name, "call");

        match interpreter.execute_block(&self.body, Some(scope))? {
            Flow::Normal => Ok(Value::Void),
            Flow::Return(value) => Ok(value),
            Flow::Break => Err(ExecutionErrorKind::BreakOutsideLoop),
            Flow::Continue => Err(ExecutionErrorKind::ContinueOutsideLoop),
        }
    }

    /// Opens the call scope on top of the closure and binds positional
    /// arguments in order, then keyword arguments by name.
    fn bind_arguments(
        &self,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Rc<RefCell<Scope>>, ExecutionErrorKind> {
        let given = args.len() + kwargs.len();
        let arity_error = || ExecutionErrorKind::InvalidFunctionCall {
            name: self.name.clone(),
            given,
            expected: self.parameters.len(),
        };
        if args.len() > self.parameters.len() {
            return Err(arity_error());
        }

        let scope = Scope::child(&self.closure);
        {
            let mut scope = scope.borrow_mut();
            for (parameter, value) in self.parameters.iter().zip(args) {
                scope.define(parameter, Role::Parameter, value)?;
            }

            for (keyword, value) in kwargs {
                if !self.parameters.contains(&keyword) {
                    return Err(ExecutionErrorKind::UnexpectedKeyword {
                        function: self.name.clone(),
                        keyword,
                    });
                }
                if scope.is_declared_locally(&keyword) {
                    return Err(ExecutionErrorKind::DuplicateArgument {
                        function: self.name.clone(),
                        parameter: keyword,
                    });
                }
                scope.define(&keyword, Role::Parameter, value)?;
            }

            if self
                .parameters
                .iter()
                .any(|parameter| !scope.is_declared_locally(parameter))
            {
                return Err(arity_error());
            }
        }

        Ok(scope)
    }
}

pub type NativeCallable =
    dyn Fn(Vec<Value>, FxHashMap<String, Value>) -> Result<Value, ExecutionErrorKind>;

/// A function provided by the host, called with already evaluated
/// arguments.
pub struct NativeFunction {
    pub name: String,
    function: Box<NativeCallable>,
}

impl Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        function: impl Fn(Vec<Value>, FxHashMap<String, Value>) -> Result<Value, ExecutionErrorKind>
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            function: Box::new(function),
        }
    }

    pub fn call(
        &self,
        args: Vec<Value>,
        kwargs: FxHashMap<String, Value>,
    ) -> Result<Value, ExecutionErrorKind> {
        tracing::trace!(native = %self.name, "call");
        (self.function)(args, kwargs)
    }
}

/// `push` and `pop` bound to one list.
pub fn list_method(items: &Rc<RefCell<Vec<Value>>>, name: &str) -> Option<NativeFunction> {
    let items = items.clone();
    match name {
        "push" => Some(NativeFunction::new("push", move |args, _| {
            let [value] = <[Value; 1]>::try_from(args).map_err(|args| {
                ExecutionErrorKind::InvalidFunctionCall {
                    name: "push".to_string(),
                    given: args.len(),
                    expected: 1,
                }
            })?;
            if matches!(value, Value::Void) {
                return Err(ExecutionErrorKind::VoidAssignment("push".to_string()));
            }
            items.borrow_mut().push(value);
            Ok(Value::Void)
        })),
        "pop" => Some(NativeFunction::new("pop", move |args, _| {
            if !args.is_empty() {
                return Err(ExecutionErrorKind::InvalidFunctionCall {
                    name: "pop".to_string(),
                    given: args.len(),
                    expected: 0,
                });
            }
            items.borrow_mut().pop().ok_or(ExecutionErrorKind::Native {
                function: "pop".to_string(),
                message: "pop from empty list".to_string(),
            })
        })),
        _ => None,
    }
}

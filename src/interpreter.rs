mod callable;
mod class;
mod environment;
mod value;

use std::{cell::RefCell, rc::Rc};

use crate::ast::{
    Block, ClassDefinition, Expression, ForBinding, FunctionDefinition, IfStatement, Operator,
    Program, Statement,
};

pub use self::{
    callable::{Function, NativeFunction},
    class::{Class, Instance},
    environment::{Role, Scope, Symbol},
    value::{Dictionary, Key, Value, MAX_SEQUENCE_LEN},
};

pub struct Interpreter {
    scope: Rc<RefCell<Scope>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(crate::natives::standard(Rc::new(RefCell::new(
            std::io::stdout(),
        ))))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Assertion failed: {test}")]
    AssertionFailed { test: Expression },
    #[error("{kind}\nwhile executing:\n{statement}")]
    Execution {
        kind: ExecutionErrorKind,
        statement: Statement,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Assertion failed: {0}")]
    AssertionFailed(Expression),
    #[error("Undeclared variable: {0}")]
    UndeclaredVariable(String),
    #[error("Redeclaration of {0} in the same scope")]
    Redeclaration(String),
    #[error("Cannot reassign immutable variable: {0}")]
    ImmutableReassignment(String),
    #[error("Cannot assign a void value to {0}")]
    VoidAssignment(String),
    #[error("Variable used before assignment: {0}")]
    UninitializedVariable(String),
    #[error("Invalid operation: {left} {op} {right}")]
    InvalidOperands {
        op: Operator,
        left: &'static str,
        right: &'static str,
    },
    #[error("Invalid negate operation: -{0}")]
    InvalidNegate(&'static str),
    #[error("Integer overflow in {0} operation")]
    IntegerOverflow(Operator),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Cannot repeat a sequence a negative number of times: {0}")]
    NegativeRepeat(i64),
    #[error("Sequence would be longer than {} elements", MAX_SEQUENCE_LEN)]
    SequenceTooLong,
    #[error("Not callable: {0}")]
    NotCallable(&'static str),
    #[error("Not indexable: {0}")]
    NotIndexable(&'static str),
    #[error("Not iterable: {0}")]
    NotIterable(&'static str),
    #[error("Index must be an integer, got {0}")]
    InvalidIndex(&'static str),
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("Missing key: {0}")]
    MissingKey(String),
    #[error("Unhashable dictionary key: {0}")]
    UnhashableKey(&'static str),
    #[error("Invalid assignment target: {0}")]
    InvalidAssignmentTarget(String),
    #[error("Unsupported attribute {name} on {type_name}")]
    UnsupportedAttribute {
        type_name: &'static str,
        name: String,
    },
    #[error("Invalid function call: {name} called with {given} arguments, expected {expected}")]
    InvalidFunctionCall {
        name: String,
        given: usize,
        expected: usize,
    },
    #[error("{function} got an unexpected keyword argument {keyword}")]
    UnexpectedKeyword { function: String, keyword: String },
    #[error("{function} got multiple values for argument {parameter}")]
    DuplicateArgument { function: String, parameter: String },
    #[error("return outside of a function")]
    ReturnOutsideFunction,
    #[error("break outside of a loop")]
    BreakOutsideLoop,
    #[error("continue outside of a loop")]
    ContinueOutsideLoop,
    #[error("{function}: {message}")]
    Native { function: String, message: String },
}

/// How a statement finished. Anything but `Normal` stops the enclosing
/// block and travels up to the loop or call that absorbs it.
#[derive(Debug)]
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

fn variable_role(is_mutable: bool) -> Role {
    if is_mutable {
        Role::Variable
    } else {
        Role::ImmutableVariable
    }
}

impl Interpreter {
    pub fn new(natives: impl IntoIterator<Item = NativeFunction>) -> Self {
        let scope = Scope::boxed(None);

        for native in natives {
            let name = native.name.clone();
            let declared = scope.borrow_mut().define(
                &name,
                Role::NativeFunction,
                Value::NativeFunction(Rc::new(native)),
            );
            if let Err(error) = declared {
                tracing::warn!(%name, %error, "skipping native function");
            }
        }

        Self { scope }
    }

    pub fn interpret(&mut self, program: &Program) -> Result<(), ExecutionError> {
        tracing::debug!(statements = program.main.body.len(), "executing program");

        for statement in program.main.body.iter() {
            let result = self.execute(statement).and_then(|flow| match flow {
                Flow::Normal => Ok(()),
                Flow::Return(_) => Err(ExecutionErrorKind::ReturnOutsideFunction),
                Flow::Break => Err(ExecutionErrorKind::BreakOutsideLoop),
                Flow::Continue => Err(ExecutionErrorKind::ContinueOutsideLoop),
            });

            match result {
                Ok(()) => {}
                Err(ExecutionErrorKind::AssertionFailed(test)) => {
                    return Err(ExecutionError::AssertionFailed { test })
                }
                Err(kind) => {
                    return Err(ExecutionError::Execution {
                        kind,
                        statement: statement.clone(),
                    })
                }
            }
        }

        tracing::debug!("program finished");
        Ok(())
    }

    /// Reads a binding visible from the current scope.
    pub fn get(&self, name: &str) -> Result<Value, ExecutionErrorKind> {
        self.scope.borrow().get(name)
    }

    fn execute(&mut self, statement: &Statement) -> Result<Flow, ExecutionErrorKind> {
        match statement {
            Statement::Expression(expression) => {
                self.evaluate(expression)?;
            }
            Statement::FunctionDefinition(definition) => self.define_function(definition)?,
            Statement::ClassDefinition(definition) => self.define_class(definition)?,
            Statement::VariableDeclaration { name, is_mutable } => self
                .scope
                .borrow_mut()
                .declare(name, variable_role(*is_mutable))?,
            Statement::Assignment { target, value } => self.assign(target, value)?,
            Statement::If(if_statement) => return self.execute_if(if_statement),
            Statement::While { test, body } => return self.execute_while(test, body),
            Statement::For {
                binding,
                iterable,
                body,
            } => return self.execute_for(binding, iterable, body),
            Statement::Return(value) => {
                let value = match value {
                    Some(expression) => self.evaluate(expression)?,
                    None => Value::Void,
                };
                return Ok(Flow::Return(value));
            }
            Statement::Break => return Ok(Flow::Break),
            Statement::Continue => return Ok(Flow::Continue),
            Statement::Assert(test) => {
                if !self.evaluate(test)?.is_truthy() {
                    return Err(ExecutionErrorKind::AssertionFailed(test.clone()));
                }
            }
        }

        Ok(Flow::Normal)
    }

    /// Runs `block` in `scope`, or in a fresh child of the current scope.
    fn execute_block(
        &mut self,
        block: &Block,
        scope: Option<Rc<RefCell<Scope>>>,
    ) -> Result<Flow, ExecutionErrorKind> {
        let scope = scope.unwrap_or_else(|| Scope::child(&self.scope));
        self.execute_in_scope(scope, |interpreter| {
            for statement in block.statements.iter() {
                match interpreter.execute(statement)? {
                    Flow::Normal => {}
                    flow => return Ok(flow),
                }
            }
            Ok(Flow::Normal)
        })
    }

    fn execute_in_scope<T>(
        &mut self,
        scope: Rc<RefCell<Scope>>,
        f: impl FnOnce(&mut Self) -> Result<T, ExecutionErrorKind>,
    ) -> Result<T, ExecutionErrorKind> {
        let prev = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = prev;
        result
    }

    fn define_function(
        &mut self,
        definition: &FunctionDefinition,
    ) -> Result<(), ExecutionErrorKind> {
        let closure = Scope::snapshot(&self.scope);
        let function = Value::Function(Rc::new(Function {
            name: definition.name.clone(),
            parameters: definition.parameters.clone(),
            body: definition.body.clone(),
            closure: closure.clone(),
        }));

        self.scope
            .borrow_mut()
            .define(&definition.name, Role::Function, function.clone())?;
        // Lets the body call itself by name.
        let result = closure
            .borrow_mut()
            .define(&definition.name, Role::Function, function);
        result
    }

    fn define_class(&mut self, definition: &ClassDefinition) -> Result<(), ExecutionErrorKind> {
        let closure = Scope::snapshot(&self.scope);
        let methods = definition
            .methods
            .iter()
            .map(|method| {
                let function = Function {
                    name: method.name.clone(),
                    parameters: method.parameters.clone(),
                    body: method.body.clone(),
                    closure: closure.clone(),
                };
                (method.name.clone(), Rc::new(function))
            })
            .collect();

        let class = Value::ClassDefinition(Rc::new(Class {
            name: definition.name.clone(),
            methods,
        }));

        self.scope
            .borrow_mut()
            .define(&definition.name, Role::ClassDefinition, class.clone())?;
        // Lets methods name their own class.
        let result = closure
            .borrow_mut()
            .define(&definition.name, Role::ClassDefinition, class);
        result
    }

    fn assign(
        &mut self,
        target: &Expression,
        value: &Expression,
    ) -> Result<(), ExecutionErrorKind> {
        match target {
            Expression::Name(name) => {
                self.scope.borrow().lookup(name)?;
                let value = self.evaluate(value)?;
                self.scope.borrow_mut().assign(name, value)
            }
            Expression::Index { target, key } => {
                let container = self.evaluate(target)?;
                let key = self.evaluate(key)?;
                let value = self.evaluate(value)?;
                container.set_index(&key, value)
            }
            Expression::Attribute { target, name } => {
                let object = self.evaluate(target)?;
                self.evaluate(value)?;
                Err(ExecutionErrorKind::UnsupportedAttribute {
                    type_name: object.type_name(),
                    name: name.clone(),
                })
            }
            other => Err(ExecutionErrorKind::InvalidAssignmentTarget(
                other.to_string(),
            )),
        }
    }

    fn execute_if(&mut self, if_statement: &IfStatement) -> Result<Flow, ExecutionErrorKind> {
        if self.evaluate(&if_statement.test)?.is_truthy() {
            return self.execute_block(&if_statement.body, None);
        }
        for (test, body) in if_statement.else_ifs.iter() {
            if self.evaluate(test)?.is_truthy() {
                return self.execute_block(body, None);
            }
        }
        match &if_statement.else_body {
            Some(body) => self.execute_block(body, None),
            None => Ok(Flow::Normal),
        }
    }

    fn execute_while(
        &mut self,
        test: &Expression,
        body: &Block,
    ) -> Result<Flow, ExecutionErrorKind> {
        tracing::trace!(%test, "while loop");
        while self.evaluate(test)?.is_truthy() {
            match self.execute_block(body, None)? {
                Flow::Normal | Flow::Continue => {}
                Flow::Break => break,
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn execute_for(
        &mut self,
        binding: &ForBinding,
        iterable: &Expression,
        body: &Block,
    ) -> Result<Flow, ExecutionErrorKind> {
        let items = self.evaluate(iterable)?.iterate()?;
        tracing::trace!(%iterable, items = items.len(), "for loop");

        for item in items {
            let scope = Scope::child(&self.scope);
            match binding {
                ForBinding::Declaration { name, is_mutable } => {
                    scope
                        .borrow_mut()
                        .define(name, variable_role(*is_mutable), item)?
                }
                ForBinding::Name(name) => scope.borrow_mut().assign(name, item)?,
            }

            match self.execute_block(body, Some(scope))? {
                Flow::Normal | Flow::Continue => {}
                Flow::Break => break,
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn evaluate(&mut self, expression: &Expression) -> Result<Value, ExecutionErrorKind> {
        match expression {
            Expression::Name(name) => self.scope.borrow().get(name),
            Expression::Integer(n) => Ok(Value::Integer(*n)),
            Expression::Float(n) => Ok(Value::Float(*n)),
            Expression::String(s) => Ok(Value::String(s.clone())),
            Expression::True => Ok(Value::Boolean(true)),
            Expression::False => Ok(Value::Boolean(false)),
            Expression::Null => Ok(Value::Null),
            Expression::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.evaluate_stored(item, "list item"))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(items))
            }
            Expression::Dictionary(pairs) => {
                let mut dictionary = Dictionary::default();
                for (key, value) in pairs.iter() {
                    let key = Key::try_from(&self.evaluate(key)?)?;
                    let value = self.evaluate_stored(value, "dictionary value")?;
                    dictionary.insert(key, value);
                }
                Ok(Value::Dictionary(Rc::new(RefCell::new(dictionary))))
            }
            Expression::Not(operand) => Ok(Value::Boolean(!self.evaluate(operand)?.is_truthy())),
            Expression::Negative(operand) => self.evaluate(operand)?.negate(),
            Expression::BinOp(left, op, right) => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                if op.is_comparison() {
                    left.compare(*op, &right).map(Value::Boolean)
                } else {
                    left.arithmetic(*op, &right)
                }
            }
            Expression::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut current = self.evaluate(left)?;
                for (op, comparator) in ops.iter().zip(comparators.iter()) {
                    let right = self.evaluate(comparator)?;
                    if !current.compare(*op, &right)? {
                        return Ok(Value::Boolean(false));
                    }
                    current = right;
                }
                Ok(Value::Boolean(true))
            }
            Expression::Call {
                callee,
                args,
                kwargs,
            } => self.call(callee, args, kwargs),
            Expression::Index { target, key } => {
                let target = self.evaluate(target)?;
                let key = self.evaluate(key)?;
                target.index(&key)
            }
            Expression::Attribute { target, name } => {
                let object = self.evaluate(target)?;
                let method = match &object {
                    Value::List(items) => callable::list_method(items, name),
                    _ => None,
                };
                method
                    .map(|method| Value::NativeFunction(Rc::new(method)))
                    .ok_or_else(|| ExecutionErrorKind::UnsupportedAttribute {
                        type_name: object.type_name(),
                        name: name.clone(),
                    })
            }
        }
    }

    /// Evaluates something about to be stored in a container.
    fn evaluate_stored(
        &mut self,
        expression: &Expression,
        what: &str,
    ) -> Result<Value, ExecutionErrorKind> {
        match self.evaluate(expression)? {
            Value::Void => Err(ExecutionErrorKind::VoidAssignment(what.to_string())),
            value => Ok(value),
        }
    }

    fn call(
        &mut self,
        callee: &Expression,
        args: &[Expression],
        kwargs: &[(String, Expression)],
    ) -> Result<Value, ExecutionErrorKind> {
        match self.evaluate(callee)? {
            Value::ClassDefinition(class) => {
                if !args.is_empty() || !kwargs.is_empty() {
                    tracing::warn!(class = %class.name, "class construction ignores its arguments");
                }
                Ok(Value::ClassInstance(Rc::new(Instance { class })))
            }
            Value::Function(function) => {
                let (args, kwargs) = self.evaluate_arguments(args, kwargs)?;
                function.call(self, args, kwargs)
            }
            Value::NativeFunction(native) => {
                let (args, kwargs) = self.evaluate_arguments(args, kwargs)?;
                native.call(args, kwargs.into_iter().collect())
            }
            other => Err(ExecutionErrorKind::NotCallable(other.type_name())),
        }
    }

    fn evaluate_arguments(
        &mut self,
        args: &[Expression],
        kwargs: &[(String, Expression)],
    ) -> Result<(Vec<Value>, Vec<(String, Value)>), ExecutionErrorKind> {
        let args = args
            .iter()
            .map(|arg| self.evaluate(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let kwargs = kwargs
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.evaluate(value)?)))
            .collect::<Result<Vec<_>, ExecutionErrorKind>>()?;
        Ok((args, kwargs))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{parser, tokenizer};

    fn run(source: &str) -> (Interpreter, Result<(), ExecutionError>) {
        let tokens = tokenizer::tokens(source).expect("Tokenize should work on test source");
        let program = parser::program(&tokens).expect("Parse should work on test source");
        let mut interpreter = Interpreter::new(Vec::<NativeFunction>::new());
        let result = interpreter.interpret(&program);
        (interpreter, result)
    }

    fn run_ok(source: &str) -> Interpreter {
        let (interpreter, result) = run(source);
        if let Err(error) = result {
            panic!("program failed: {}", error);
        }
        interpreter
    }

    fn run_err(source: &str) -> ExecutionErrorKind {
        match run(source).1 {
            Err(ExecutionError::Execution { kind, .. }) => kind,
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    fn integer(interpreter: &Interpreter, name: &str) -> i64 {
        match interpreter.get(name) {
            Ok(Value::Integer(n)) => n,
            other => panic!("expected integer for {}, got {:?}", name, other),
        }
    }

    fn boolean(interpreter: &Interpreter, name: &str) -> bool {
        match interpreter.get(name) {
            Ok(Value::Boolean(b)) => b,
            other => panic!("expected boolean for {}, got {:?}", name, other),
        }
    }

    #[test]
    fn test_while_loop() {
        let interpreter = run_ok("var mut a = 1\nwhile a < 4:\n    a = a + 1\n");
        assert_eq!(integer(&interpreter, "a"), 4);
    }

    #[test]
    fn test_precedence() {
        let interpreter = run_ok("var a = 2 + 3 * 4\nvar b = (2 + 3) * 4\n");
        assert_eq!(integer(&interpreter, "a"), 14);
        assert_eq!(integer(&interpreter, "b"), 20);
    }

    #[test]
    fn test_chained_comparisons() {
        let interpreter =
            run_ok("var a = 1 < 2 < 3\nvar b = 3 < 2 < 1\nvar c = 1 < 3 < 2\nvar d = 1 == 1.0\n");
        assert!(boolean(&interpreter, "a"));
        assert!(!boolean(&interpreter, "b"));
        assert!(!boolean(&interpreter, "c"));
        assert!(boolean(&interpreter, "d"));
    }

    #[test]
    fn test_comparison_stops_at_first_failure() {
        let interpreter = run_ok("var a = 2 < 1 < null\n");
        assert!(!boolean(&interpreter, "a"));
    }

    #[test]
    fn test_immutable_reassignment() {
        assert!(matches!(
            run_err("var x = 1\nx = 2\n"),
            ExecutionErrorKind::ImmutableReassignment(name) if name == "x"
        ));
        let interpreter = run_ok("var mut x = 1\nx = 2\nvar y\ny = 3\n");
        assert_eq!(integer(&interpreter, "x"), 2);
        assert_eq!(integer(&interpreter, "y"), 3);
    }

    #[test]
    fn test_scope_errors() {
        assert!(matches!(
            run_err("x = 1\n"),
            ExecutionErrorKind::UndeclaredVariable(_)
        ));
        assert!(matches!(
            run_err("var x\nvar x\n"),
            ExecutionErrorKind::Redeclaration(_)
        ));
        assert!(matches!(
            run_err("fun f():\n    var a = 1\nvar x = f()\n"),
            ExecutionErrorKind::VoidAssignment(_)
        ));
    }

    #[test]
    fn test_block_scope_does_not_leak() {
        assert!(matches!(
            run_err("if true:\n    var inner = 1\nvar x = inner\n"),
            ExecutionErrorKind::UndeclaredVariable(name) if name == "inner"
        ));
    }

    #[test]
    fn test_break_and_continue() {
        let source = "\
var mut total = 0
var mut i = 0
while true:
    i = i + 1
    if i > 10:
        break
    if i == 3:
        continue
    total = total + i
";
        let interpreter = run_ok(source);
        assert_eq!(integer(&interpreter, "total"), 52);
        assert_eq!(integer(&interpreter, "i"), 11);
    }

    #[test]
    fn test_return_from_nested_loops() {
        let source = "\
fun find(items, wanted):
    for var item in items:
        while true:
            if item == wanted:
                return item * 10
            break
    return -1
var a = find([1, 2, 3], 2)
var b = find([1], 5)
";
        let interpreter = run_ok(source);
        assert_eq!(integer(&interpreter, "a"), 20);
        assert_eq!(integer(&interpreter, "b"), -1);
    }

    #[test]
    fn test_recursion() {
        let source = "\
fun fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)
var x = fib(15)
";
        assert_eq!(integer(&run_ok(source), "x"), 610);
    }

    #[test]
    fn test_closures_are_snapshots() {
        let source = "\
var mut n = 1
fun get():
    return n
n = 2
var x = get()
";
        assert_eq!(integer(&run_ok(source), "x"), 1);
    }

    #[test]
    fn test_closure_keeps_its_own_state() {
        let source = "\
fun counter():
    var mut count = 0
    fun next():
        count = count + 1
        return count
    return next
var a = counter()
var b = counter()
a()
a()
var x = a()
var y = b()
";
        let interpreter = run_ok(source);
        assert_eq!(integer(&interpreter, "x"), 3);
        assert_eq!(integer(&interpreter, "y"), 1);
    }

    #[test]
    fn test_for_loop_bindings() {
        let source = "\
var mut total = 0
for var x in [1, 2, 3]:
    total = total + x
var mut last = null
for last in \"abc\":
    pass
    total = total + 1
";
        let interpreter = run_ok(source);
        assert_eq!(integer(&interpreter, "total"), 9);
        assert!(matches!(interpreter.get("last"), Ok(Value::String(s)) if s == "c"));
        assert!(matches!(
            run_err("for var x in [1, 2]:\n    x = 3\n"),
            ExecutionErrorKind::ImmutableReassignment(_)
        ));
    }

    #[test]
    fn test_keyword_arguments() {
        let source = "\
fun sub(a, b):
    return a - b
var x = sub(b=1, a=10)
var y = sub(10, b=4)
";
        let interpreter = run_ok(source);
        assert_eq!(integer(&interpreter, "x"), 9);
        assert_eq!(integer(&interpreter, "y"), 6);

        assert!(matches!(
            run_err("fun f(a):\n    return a\nf(1, 2)\n"),
            ExecutionErrorKind::InvalidFunctionCall {
                given: 2,
                expected: 1,
                ..
            }
        ));
        assert!(matches!(
            run_err("fun f(a):\n    return a\nf(1, a=2)\n"),
            ExecutionErrorKind::DuplicateArgument { .. }
        ));
        assert!(matches!(
            run_err("fun f(a):\n    return a\nf(c=2)\n"),
            ExecutionErrorKind::UnexpectedKeyword { .. }
        ));
    }

    #[test]
    fn test_containers() {
        let source = "\
var items = [1, 2]
items.push(3)
items[0] = 10
var popped = items.pop()
var d = {\"a\": 1}
d[\"b\"] = items[-1]
var x = items[0] + d[\"b\"] + popped
";
        assert_eq!(integer(&run_ok(source), "x"), 15);
    }

    #[test]
    fn test_class_call_allocates_instance() {
        let interpreter = run_ok("class Point:\n    pass\nvar p = Point(1, 2)\n");
        assert!(matches!(
            interpreter.get("p"),
            Ok(Value::ClassInstance(instance)) if instance.class.name == "Point"
        ));
        assert!(matches!(
            run_err("class A:\n    pass\nvar a = A()\na.x = 1\n"),
            ExecutionErrorKind::UnsupportedAttribute { .. }
        ));
    }

    #[test]
    fn test_methods_see_their_class() {
        let interpreter = run_ok("class Node:\n    fun make():\n        return Node()\n");
        let Ok(Value::ClassDefinition(class)) = interpreter.get("Node") else {
            panic!("Node should be a class");
        };
        let method = &class.methods["make"];
        assert!(matches!(
            method.closure.borrow().get("Node"),
            Ok(Value::ClassDefinition(found)) if Rc::ptr_eq(&found, &class)
        ));
    }

    #[test]
    fn test_uninitialized_read() {
        assert!(matches!(
            run_err("var x\nvar y = x\n"),
            ExecutionErrorKind::UninitializedVariable(name) if name == "x"
        ));
    }

    #[test]
    fn test_invalid_targets_and_calls() {
        assert!(matches!(
            run_err("1 = 2\n"),
            ExecutionErrorKind::InvalidAssignmentTarget(_)
        ));
        assert!(matches!(run_err("3()\n"), ExecutionErrorKind::NotCallable("integer")));
        assert!(matches!(
            run_err("var x = 1 / 0\n"),
            ExecutionErrorKind::DivisionByZero
        ));
    }

    #[test]
    fn test_control_flow_escapes() {
        assert!(matches!(
            run_err("break\n"),
            ExecutionErrorKind::BreakOutsideLoop
        ));
        assert!(matches!(
            run_err("return 1\n"),
            ExecutionErrorKind::ReturnOutsideFunction
        ));
        assert!(matches!(
            run_err("fun f():\n    continue\nwhile true:\n    f()\n"),
            ExecutionErrorKind::ContinueOutsideLoop
        ));
    }

    #[test]
    fn test_assertion_failure() {
        let (_, result) = run("assert 1 == 1\nassert false\nvar never = 1\n");
        assert!(matches!(
            result,
            Err(ExecutionError::AssertionFailed {
                test: Expression::False
            })
        ));

        let (interpreter, _) = run("fun check():\n    assert []\nvar before = 1\ncheck()\n");
        assert_eq!(integer(&interpreter, "before"), 1);
    }

    #[test]
    fn test_not_negates_truthiness() {
        let interpreter = run_ok("var a = not 0\nvar b = not [1]\n");
        assert!(boolean(&interpreter, "a"));
        assert!(!boolean(&interpreter, "b"));
    }
}

use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub main: Module,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDefinition {
    pub name: String,
    pub methods: Vec<FunctionDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub test: Expression,
    pub body: Block,
    pub else_ifs: Vec<(Expression, Block)>,
    pub else_body: Option<Block>,
}

/// The loop variable of a `for` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ForBinding {
    Name(String),
    Declaration { name: String, is_mutable: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    FunctionDefinition(FunctionDefinition),
    ClassDefinition(ClassDefinition),
    VariableDeclaration {
        name: String,
        is_mutable: bool,
    },
    Assignment {
        target: Expression,
        value: Expression,
    },
    If(IfStatement),
    While {
        test: Expression,
        body: Block,
    },
    For {
        binding: ForBinding,
        iterable: Expression,
        body: Block,
    },
    Return(Option<Expression>),
    Break,
    Continue,
    Assert(Expression),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Name(String),
    Integer(i64),
    Float(f64),
    String(String),
    True,
    False,
    Null,
    List(Vec<Expression>),
    Dictionary(Vec<(Expression, Expression)>),
    Not(Box<Expression>),
    Negative(Box<Expression>),
    BinOp(Box<Expression>, Operator, Box<Expression>),
    /// A run of comparisons; always holds as many operators as comparators.
    Compare {
        left: Box<Expression>,
        ops: Vec<Operator>,
        comparators: Vec<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
        kwargs: Vec<(String, Expression)>,
    },
    Index {
        target: Box<Expression>,
        key: Box<Expression>,
    },
    Attribute {
        target: Box<Expression>,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Gt,
    GtE,
    Lt,
    LtE,
    Eq,
    NotEq,
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        !matches!(
            self,
            Operator::Add | Operator::Subtract | Operator::Multiply | Operator::Divide
        )
    }
}

// The Display impls render source text that parses back to the same tree.

struct Indented<'a, T>(&'a T, usize);

fn pad(f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
    write!(f, "{:width$}", "", width = depth * 4)
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for statement in &self.main.body {
            write!(f, "{}", Indented(statement, 0))?;
        }
        Ok(())
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Indented(self, 0))
    }
}

impl Display for Indented<'_, Block> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Indented(block, depth) = self;
        for statement in &block.statements {
            write!(f, "{}", Indented(statement, *depth))?;
        }
        Ok(())
    }
}

impl Display for Indented<'_, FunctionDefinition> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Indented(function, depth) = self;
        pad(f, *depth)?;
        writeln!(
            f,
            "fun {}({}):",
            function.name,
            function.parameters.join(", ")
        )?;
        write!(f, "{}", Indented(&function.body, depth + 1))
    }
}

impl Display for Indented<'_, Statement> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Indented(statement, depth) = self;
        let depth = *depth;
        match statement {
            Statement::FunctionDefinition(function) => {
                return write!(f, "{}", Indented(function, depth));
            }
            Statement::ClassDefinition(class) => {
                pad(f, depth)?;
                writeln!(f, "class {}:", class.name)?;
                if class.methods.is_empty() {
                    pad(f, depth + 1)?;
                    return writeln!(f, "pass");
                }
                for method in &class.methods {
                    write!(f, "{}", Indented(method, depth + 1))?;
                }
                return Ok(());
            }
            Statement::If(if_statement) => {
                pad(f, depth)?;
                writeln!(f, "if {}:", if_statement.test)?;
                write!(f, "{}", Indented(&if_statement.body, depth + 1))?;
                for (test, body) in &if_statement.else_ifs {
                    pad(f, depth)?;
                    writeln!(f, "else if {}:", test)?;
                    write!(f, "{}", Indented(body, depth + 1))?;
                }
                if let Some(else_body) = &if_statement.else_body {
                    pad(f, depth)?;
                    writeln!(f, "else:")?;
                    write!(f, "{}", Indented(else_body, depth + 1))?;
                }
                return Ok(());
            }
            Statement::While { test, body } => {
                pad(f, depth)?;
                writeln!(f, "while {}:", test)?;
                return write!(f, "{}", Indented(body, depth + 1));
            }
            Statement::For {
                binding,
                iterable,
                body,
            } => {
                pad(f, depth)?;
                writeln!(f, "for {} in {}:", binding, iterable)?;
                return write!(f, "{}", Indented(body, depth + 1));
            }
            _ => {}
        }

        pad(f, depth)?;
        match statement {
            Statement::VariableDeclaration { name, is_mutable } => {
                if *is_mutable {
                    writeln!(f, "var mut {}", name)
                } else {
                    writeln!(f, "var {}", name)
                }
            }
            Statement::Assignment { target, value } => writeln!(f, "{} = {}", target, value),
            Statement::Return(Some(value)) => writeln!(f, "return {}", value),
            Statement::Return(None) => writeln!(f, "return"),
            Statement::Break => writeln!(f, "break"),
            Statement::Continue => writeln!(f, "continue"),
            Statement::Assert(test) => writeln!(f, "assert {}", test),
            Statement::Expression(expression) => writeln!(f, "{}", expression),
            Statement::FunctionDefinition(_)
            | Statement::ClassDefinition(_)
            | Statement::If(_)
            | Statement::While { .. }
            | Statement::For { .. } => unreachable!("compound statements are written above"),
        }
    }
}

impl Display for ForBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForBinding::Name(name) => write!(f, "{}", name),
            ForBinding::Declaration {
                name,
                is_mutable: true,
            } => write!(f, "var mut {}", name),
            ForBinding::Declaration {
                name,
                is_mutable: false,
            } => write!(f, "var {}", name),
        }
    }
}

fn comma_separated<T: Display>(
    f: &mut std::fmt::Formatter<'_>,
    items: impl IntoIterator<Item = T>,
) -> std::fmt::Result {
    for (i, item) in items.into_iter().enumerate() {
        if i != 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Plain decimal with at least one fractional digit, never exponent form.
pub fn format_float(n: f64) -> String {
    let text = n.to_string();
    if n.is_finite() && !text.contains('.') {
        format!("{}.0", text)
    } else {
        text
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Name(name) => write!(f, "{}", name),
            Expression::Integer(n) => write!(f, "{}", n),
            Expression::Float(n) => write!(f, "{}", format_float(*n)),
            Expression::String(s) => {
                if s.contains('"') {
                    write!(f, "'{}'", s)
                } else {
                    write!(f, "\"{}\"", s)
                }
            }
            Expression::True => write!(f, "true"),
            Expression::False => write!(f, "false"),
            Expression::Null => write!(f, "null"),
            Expression::List(items) => {
                write!(f, "[")?;
                comma_separated(f, items)?;
                write!(f, "]")
            }
            Expression::Dictionary(pairs) => {
                write!(f, "{{")?;
                comma_separated(f, pairs.iter().map(|(k, v)| format!("{}: {}", k, v)))?;
                write!(f, "}}")
            }
            Expression::Not(expr) => write!(f, "(not {})", expr),
            Expression::Negative(expr) => write!(f, "(-{})", expr),
            Expression::BinOp(left, op, right) => write!(f, "({} {} {})", left, op, right),
            Expression::Compare {
                left,
                ops,
                comparators,
            } => {
                write!(f, "({}", left)?;
                for (op, comparator) in ops.iter().zip(comparators) {
                    write!(f, " {} {}", op, comparator)?;
                }
                write!(f, ")")
            }
            Expression::Call {
                callee,
                args,
                kwargs,
            } => {
                write!(f, "{}(", callee)?;
                comma_separated(
                    f,
                    args.iter().map(ToString::to_string).chain(
                        kwargs
                            .iter()
                            .map(|(name, value)| format!("{}={}", name, value)),
                    ),
                )?;
                write!(f, ")")
            }
            Expression::Index { target, key } => write!(f, "{}[{}]", target, key),
            Expression::Attribute { target, name } => write!(f, "{}.{}", target, name),
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Add => write!(f, "+"),
            Operator::Subtract => write!(f, "-"),
            Operator::Multiply => write!(f, "*"),
            Operator::Divide => write!(f, "/"),
            Operator::Gt => write!(f, ">"),
            Operator::GtE => write!(f, ">="),
            Operator::Lt => write!(f, "<"),
            Operator::LtE => write!(f, "<="),
            Operator::Eq => write!(f, "=="),
            Operator::NotEq => write!(f, "!="),
        }
    }
}

use std::cell::RefCell;

use crate::{
    ast::{
        Block, ClassDefinition, Expression, ForBinding, FunctionDefinition, IfStatement, Module,
        Operator, Program, Statement,
    },
    tokenizer::{Token, TokenKind, TokenValue},
};

#[derive(Debug)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub token: Option<Token>,
    context: Vec<&'static str>,
}

impl ParseError {
    pub fn line(&self) -> Option<usize> {
        self.token.as_ref().map(|token| token.span.line)
    }
}

impl std::error::Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "While parsing {}", self.context.join(" > "))?;
        write!(f, "{}", self.kind)?;
        if let Some(token) = &self.token {
            write!(
                f,
                " at {} but found \"{}\"",
                token.span,
                token.lexeme.escape_default()
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("Expected \"{0}\"")]
    Expected(TokenKind),
    #[error("Expected an expression")]
    ExpectedExpression,
    #[error("Expected a statement")]
    ExpectedStatement,
    #[error("Expected an identifier")]
    ExpectedIdentifier,
    #[error("Blocks must contain at least one statement")]
    EmptyBlock,
    #[error("Class bodies may only contain function definitions and pass")]
    InvalidClassMember,
    #[error("Positional argument follows keyword argument")]
    PositionalAfterKeyword,
    #[error("Unexpected tokens after end of program")]
    TrailingTokens,
}

/// A production either did not match (`Soft`, the caller may try something
/// else) or matched its leading token and then broke (`Hard`, fatal).
#[derive(Debug)]
enum Failure {
    Soft,
    Hard(ParseError),
}

type Parsed<'a, T> = Result<(T, &'a [Token]), Failure>;

trait Commit {
    fn commit(self, context: &ParseContext, tokens: &[Token], kind: ParseErrorKind) -> Self;
}

impl<T> Commit for Result<T, Failure> {
    fn commit(self, context: &ParseContext, tokens: &[Token], kind: ParseErrorKind) -> Self {
        match self {
            Err(Failure::Soft) => Err(hard(context, tokens, kind)),
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            stack: RefCell::new(vec![]),
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self)
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

fn hard(context: &ParseContext, tokens: &[Token], kind: ParseErrorKind) -> Failure {
    Failure::Hard(ParseError {
        kind,
        token: tokens.first().cloned(),
        context: context.stack.borrow().clone(),
    })
}

pub fn program(tokens: &[Token]) -> Result<Program, ParseError> {
    let tokens: Vec<Token> = tokens
        .iter()
        .filter(|token| token.kind != TokenKind::Whitespace)
        .cloned()
        .collect();
    let context = ParseContext::new();
    let _guard = context.push("program");

    let result = statements(&context, &tokens).and_then(|(body, rest)| {
        match skip_newlines(rest) {
            [eof] if eof.kind == TokenKind::Eof => Ok(body),
            rest => Err(hard(&context, rest, ParseErrorKind::TrailingTokens)),
        }
    });

    match result {
        Ok(body) => {
            tracing::debug!(statements = body.len(), "parsed program");
            Ok(Program {
                main: Module { body },
            })
        }
        Err(Failure::Hard(error)) => {
            tracing::debug!(%error, "parse failed");
            Err(error)
        }
        Err(Failure::Soft) => Err(ParseError {
            kind: ParseErrorKind::ExpectedStatement,
            token: tokens.first().cloned(),
            context: vec!["program"],
        }),
    }
}

fn peek(tokens: &[Token]) -> Option<TokenKind> {
    tokens.first().map(Token::kind)
}

fn expect(tokens: &[Token], kind: TokenKind) -> Result<&[Token], Failure> {
    match peek(tokens) {
        Some(k) if k == kind => Ok(&tokens[1..]),
        _ => Err(Failure::Soft),
    }
}

fn require<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    kind: TokenKind,
) -> Result<&'a [Token], Failure> {
    expect(tokens, kind).commit(context, tokens, ParseErrorKind::Expected(kind))
}

fn match_identifier(tokens: &[Token]) -> Parsed<String> {
    match tokens.first().map(|token| &token.value) {
        Some(TokenValue::Name(name)) => Ok((name.clone(), &tokens[1..])),
        _ => Err(Failure::Soft),
    }
}

fn require_identifier<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, String> {
    match_identifier(tokens).commit(context, tokens, ParseErrorKind::ExpectedIdentifier)
}

fn skip_newlines(tokens: &[Token]) -> &[Token] {
    let count = tokens
        .iter()
        .take_while(|token| token.kind == TokenKind::NL)
        .count();
    &tokens[count..]
}

fn statements<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Vec<Statement>> {
    let mut statements = Vec::new();
    let mut tokens = tokens;

    loop {
        tokens = skip_newlines(tokens);
        match peek(tokens) {
            None | Some(TokenKind::Eof) | Some(TokenKind::Dedent) => break,
            _ => {}
        }
        let (mut parsed, rest) = statement(context, tokens)?;
        statements.append(&mut parsed);
        tokens = rest;
    }

    Ok((statements, tokens))
}

type StatementParser = for<'a> fn(&ParseContext, &'a [Token]) -> Parsed<'a, Vec<Statement>>;

/// Tried in order at every statement position; the first that does not
/// soft-fail wins.
const STATEMENT_PARSERS: [StatementParser; 13] = [
    function_definition,
    class_definition,
    return_statement,
    if_statement,
    while_statement,
    for_statement,
    continue_statement,
    break_statement,
    assert_statement,
    declaration,
    assignment,
    pass_statement,
    expression_statement,
];

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Vec<Statement>> {
    let _guard = context.push("statement");
    for parser in STATEMENT_PARSERS {
        match parser(context, tokens) {
            Err(Failure::Soft) => continue,
            result => return result,
        }
    }
    Err(hard(context, tokens, ParseErrorKind::ExpectedStatement))
}

fn function_definition<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, Vec<Statement>> {
    let (function, tokens) = function(context, tokens)?;
    Ok((vec![Statement::FunctionDefinition(function)], tokens))
}

fn function<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, FunctionDefinition> {
    let tokens = expect(tokens, TokenKind::FunctionDef)?;
    let _guard = context.push("function_definition");
    let (name, tokens) = require_identifier(context, tokens)?;
    let tokens = require(context, tokens, TokenKind::OpenParen)?;
    let (parameters, tokens) = parameters(context, tokens)?;
    let tokens = require(context, tokens, TokenKind::CloseParen)?;
    let tokens = require(context, tokens, TokenKind::Colon)?;
    let tokens = require(context, tokens, TokenKind::NL)?;
    let (body, tokens) = block(context, tokens)?;
    Ok((
        FunctionDefinition {
            name,
            parameters,
            body,
        },
        tokens,
    ))
}

fn parameters<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Vec<String>> {
    let mut parameters = vec![];
    let Ok((first, mut tokens)) = match_identifier(tokens) else {
        return Ok((parameters, tokens));
    };
    parameters.push(first);

    while let Ok(rest) = expect(tokens, TokenKind::Comma) {
        let (name, rest) = require_identifier(context, rest)?;
        parameters.push(name);
        tokens = rest;
    }

    Ok((parameters, tokens))
}

fn class_definition<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::ClassDef)?;
    let _guard = context.push("class_definition");
    let (name, tokens) = require_identifier(context, tokens)?;
    let tokens = require(context, tokens, TokenKind::Colon)?;
    let tokens = require(context, tokens, TokenKind::NL)?;
    let body_start = require(context, tokens, TokenKind::Indent)?;

    let mut methods = vec![];
    let mut saw_pass = false;
    let mut tokens = body_start;
    loop {
        tokens = skip_newlines(tokens);
        match peek(tokens) {
            Some(TokenKind::Dedent) => break,
            Some(TokenKind::Pass) => {
                tokens = require(context, &tokens[1..], TokenKind::NL)?;
                saw_pass = true;
            }
            Some(TokenKind::FunctionDef) => {
                let (method, rest) = function(context, tokens)?;
                methods.push(method);
                tokens = rest;
            }
            _ => return Err(hard(context, tokens, ParseErrorKind::InvalidClassMember)),
        }
    }

    if methods.is_empty() && !saw_pass {
        return Err(hard(context, body_start, ParseErrorKind::EmptyBlock));
    }
    let tokens = require(context, tokens, TokenKind::Dedent)?;

    Ok((
        vec![Statement::ClassDefinition(ClassDefinition { name, methods })],
        tokens,
    ))
}

fn return_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::Return)?;
    let _guard = context.push("return_statement");
    if let Ok(tokens) = expect(tokens, TokenKind::NL) {
        return Ok((vec![Statement::Return(None)], tokens));
    }
    let (value, tokens) = required_expression(context, tokens)?;
    let tokens = require(context, tokens, TokenKind::NL)?;
    Ok((vec![Statement::Return(Some(value))], tokens))
}

/// Parses `<test>: NL <block>`, the tail shared by if, else if and while.
fn guarded_block<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, (Expression, Block)> {
    let (test, tokens) = required_expression(context, tokens)?;
    let tokens = require(context, tokens, TokenKind::Colon)?;
    let tokens = require(context, tokens, TokenKind::NL)?;
    let (body, tokens) = block(context, tokens)?;
    Ok(((test, body), tokens))
}

fn if_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::If)?;
    let _guard = context.push("if_statement");
    let ((test, body), mut tokens) = guarded_block(context, tokens)?;

    let mut else_ifs = vec![];
    let mut else_body = None;
    while let Ok(rest) = expect(tokens, TokenKind::Else) {
        if let Ok(rest) = expect(rest, TokenKind::If) {
            let (else_if, rest) = guarded_block(context, rest)?;
            else_ifs.push(else_if);
            tokens = rest;
            continue;
        }

        let rest = require(context, rest, TokenKind::Colon)?;
        let rest = require(context, rest, TokenKind::NL)?;
        let (body, rest) = block(context, rest)?;
        else_body = Some(body);
        tokens = rest;
        break;
    }

    Ok((
        vec![Statement::If(IfStatement {
            test,
            body,
            else_ifs,
            else_body,
        })],
        tokens,
    ))
}

fn while_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::While)?;
    let _guard = context.push("while_statement");
    let ((test, body), tokens) = guarded_block(context, tokens)?;
    Ok((vec![Statement::While { test, body }], tokens))
}

fn for_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::For)?;
    let _guard = context.push("for_statement");

    let (binding, tokens) = match expect(tokens, TokenKind::VariableDeclaration) {
        Ok(tokens) => {
            let (is_mutable, tokens) = match expect(tokens, TokenKind::Mutable) {
                Ok(rest) => (true, rest),
                Err(_) => (false, tokens),
            };
            let (name, tokens) = require_identifier(context, tokens)?;
            (ForBinding::Declaration { name, is_mutable }, tokens)
        }
        Err(_) => {
            let (name, tokens) = require_identifier(context, tokens)?;
            (ForBinding::Name(name), tokens)
        }
    };

    let tokens = require(context, tokens, TokenKind::In)?;
    let ((iterable, body), tokens) = guarded_block(context, tokens)?;
    Ok((
        vec![Statement::For {
            binding,
            iterable,
            body,
        }],
        tokens,
    ))
}

fn continue_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::Continue)?;
    let tokens = require(context, tokens, TokenKind::NL)?;
    Ok((vec![Statement::Continue], tokens))
}

fn break_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::Break)?;
    let tokens = require(context, tokens, TokenKind::NL)?;
    Ok((vec![Statement::Break], tokens))
}

fn assert_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::Assert)?;
    let _guard = context.push("assert_statement");
    let (test, tokens) = required_expression(context, tokens)?;
    let tokens = require(context, tokens, TokenKind::NL)?;
    Ok((vec![Statement::Assert(test)], tokens))
}

fn declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::VariableDeclaration)?;
    let _guard = context.push("declaration");
    let (is_mutable, name_tokens) = match expect(tokens, TokenKind::Mutable) {
        Ok(rest) => (true, rest),
        Err(_) => (false, tokens),
    };
    let (name, tokens) = require_identifier(context, name_tokens)?;
    let declaration = Statement::VariableDeclaration { name, is_mutable };

    if peek(tokens) == Some(TokenKind::Assign) {
        // Back up to the name so the assignment parser sees `name = value`.
        let (mut statements, tokens) = assignment(context, name_tokens)
            .commit(context, name_tokens, ParseErrorKind::ExpectedStatement)?;
        statements.insert(0, declaration);
        return Ok((statements, tokens));
    }

    let tokens = require(context, tokens, TokenKind::NL)?;
    Ok((vec![declaration], tokens))
}

fn assignment<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Vec<Statement>> {
    let (target, tokens) = expression(context, tokens)?;
    let tokens = expect(tokens, TokenKind::Assign)?;
    let _guard = context.push("assignment");
    let (value, tokens) = required_expression(context, tokens)?;
    let tokens = require(context, tokens, TokenKind::NL)?;
    Ok((vec![Statement::Assignment { target, value }], tokens))
}

fn pass_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Vec<Statement>> {
    let tokens = expect(tokens, TokenKind::Pass)?;
    let tokens = require(context, tokens, TokenKind::NL)?;
    Ok((vec![], tokens))
}

fn expression_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> Parsed<'a, Vec<Statement>> {
    let (expression, tokens) = expression(context, tokens)?;
    let _guard = context.push("expression_statement");
    let tokens = require(context, tokens, TokenKind::NL)?;
    Ok((vec![Statement::Expression(expression)], tokens))
}

fn block<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Block> {
    let _guard = context.push("block");
    let start = require(context, tokens, TokenKind::Indent)?;
    let (statements, tokens) = self::statements(context, start)?;
    if statements.is_empty() {
        return Err(hard(context, start, ParseErrorKind::EmptyBlock));
    }
    let tokens = require(context, tokens, TokenKind::Dedent)?;
    Ok((Block { statements }, tokens))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    compare(context, tokens)
}

fn required_expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    expression(context, tokens).commit(context, tokens, ParseErrorKind::ExpectedExpression)
}

fn comparison_operator(kind: TokenKind) -> Option<Operator> {
    match kind {
        TokenKind::Eq => Some(Operator::Eq),
        TokenKind::NotEq => Some(Operator::NotEq),
        TokenKind::Gt => Some(Operator::Gt),
        TokenKind::GtE => Some(Operator::GtE),
        TokenKind::Lt => Some(Operator::Lt),
        TokenKind::LtE => Some(Operator::LtE),
        _ => None,
    }
}

fn compare<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let (left, mut tokens) = additive(context, tokens)?;
    let mut ops = vec![];
    let mut comparators = vec![];

    while let Some(op) = peek(tokens).and_then(comparison_operator) {
        let _guard = context.push("compare");
        let (right, rest) = additive(context, &tokens[1..]).commit(
            context,
            &tokens[1..],
            ParseErrorKind::ExpectedExpression,
        )?;
        ops.push(op);
        comparators.push(right);
        tokens = rest;
    }

    if ops.is_empty() {
        return Ok((left, tokens));
    }
    Ok((
        Expression::Compare {
            left: Box::new(left),
            ops,
            comparators,
        },
        tokens,
    ))
}

fn binary<'a>(
    context: &ParseContext,
    operand: impl Fn(&ParseContext, &'a [Token]) -> Parsed<'a, Expression>,
    operator: impl Fn(TokenKind) -> Option<Operator>,
    tokens: &'a [Token],
) -> Parsed<'a, Expression> {
    let (mut expr, mut tokens) = operand(context, tokens)?;

    while let Some(op) = peek(tokens).and_then(&operator) {
        tokens = &tokens[1..];
        let (right, rest) =
            operand(context, tokens).commit(context, tokens, ParseErrorKind::ExpectedExpression)?;
        expr = Expression::BinOp(Box::new(expr), op, Box::new(right));
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn additive<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    binary(
        context,
        multiplicative,
        |kind| match kind {
            TokenKind::Plus => Some(Operator::Add),
            TokenKind::Minus => Some(Operator::Subtract),
            _ => None,
        },
        tokens,
    )
}

fn multiplicative<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    binary(
        context,
        unary,
        |kind| match kind {
            TokenKind::Star => Some(Operator::Multiply),
            TokenKind::Slash => Some(Operator::Divide),
            _ => None,
        },
        tokens,
    )
}

fn unary<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let wrap: fn(Box<Expression>) -> Expression = match peek(tokens) {
        Some(TokenKind::Not) => Expression::Not,
        Some(TokenKind::Minus) => Expression::Negative,
        _ => return postfix(context, tokens),
    };

    let rest = &tokens[1..];
    let (operand, rest) =
        unary(context, rest).commit(context, rest, ParseErrorKind::ExpectedExpression)?;
    Ok((wrap(Box::new(operand)), rest))
}

type PrimaryParser = for<'a> fn(&ParseContext, &'a [Token]) -> Parsed<'a, Expression>;

const PRIMARY_PARSERS: [PrimaryParser; 9] = [
    name,
    boolean,
    string,
    integer,
    null,
    float,
    list,
    dictionary,
    parenthesized,
];

/// Postfix parsers hand the target back on a soft failure so the next one
/// can try it.
type PostfixResult<'a> = Result<(Expression, &'a [Token]), (Failure, Expression)>;

type PostfixParser = for<'a> fn(&ParseContext, &'a [Token], Expression) -> PostfixResult<'a>;

const POSTFIX_PARSERS: [PostfixParser; 3] = [finish_call, finish_attribute, finish_index];

fn postfix<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let (mut expr, mut tokens) = primary(context, tokens)?;

    'chain: loop {
        for parser in POSTFIX_PARSERS {
            match parser(context, tokens, expr) {
                Ok((next, rest)) => {
                    expr = next;
                    tokens = rest;
                    continue 'chain;
                }
                Err((Failure::Soft, target)) => expr = target,
                Err((failure, _)) => return Err(failure),
            }
        }
        break;
    }

    Ok((expr, tokens))
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    for parser in PRIMARY_PARSERS {
        match parser(context, tokens) {
            Err(Failure::Soft) => continue,
            result => return result,
        }
    }
    Err(Failure::Soft)
}

fn name<'a>(_: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let (name, tokens) = match_identifier(tokens)?;
    Ok((Expression::Name(name), tokens))
}

fn boolean<'a>(_: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    match peek(tokens) {
        Some(TokenKind::True) => Ok((Expression::True, &tokens[1..])),
        Some(TokenKind::False) => Ok((Expression::False, &tokens[1..])),
        _ => Err(Failure::Soft),
    }
}

fn string<'a>(_: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    match tokens.first().map(|token| &token.value) {
        Some(TokenValue::String(s)) => Ok((Expression::String(s.clone()), &tokens[1..])),
        _ => Err(Failure::Soft),
    }
}

fn integer<'a>(_: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    match tokens.first().map(|token| &token.value) {
        Some(TokenValue::Int(n)) => Ok((Expression::Integer(*n), &tokens[1..])),
        _ => Err(Failure::Soft),
    }
}

fn null<'a>(_: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let tokens = expect(tokens, TokenKind::Null)?;
    Ok((Expression::Null, tokens))
}

fn float<'a>(_: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    match tokens.first().map(|token| &token.value) {
        Some(TokenValue::Float(n)) => Ok((Expression::Float(*n), &tokens[1..])),
        _ => Err(Failure::Soft),
    }
}

/// Comma separated items; an empty sequence is allowed but every comma
/// must be followed by another item.
fn separated<'a, T>(
    context: &ParseContext,
    tokens: &'a [Token],
    item: impl Fn(&ParseContext, &'a [Token]) -> Parsed<'a, T>,
) -> Parsed<'a, Vec<T>> {
    let mut items = vec![];
    let (first, mut tokens) = match item(context, tokens) {
        Ok(parsed) => parsed,
        Err(Failure::Soft) => return Ok((items, tokens)),
        Err(failure) => return Err(failure),
    };
    items.push(first);

    while let Ok(rest) = expect(tokens, TokenKind::Comma) {
        let (next, rest) =
            item(context, rest).commit(context, rest, ParseErrorKind::ExpectedExpression)?;
        items.push(next);
        tokens = rest;
    }

    Ok((items, tokens))
}

fn list<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let tokens = expect(tokens, TokenKind::OpenBracket)?;
    let _guard = context.push("list");
    let (items, tokens) = separated(context, tokens, expression)?;
    let tokens = require(context, tokens, TokenKind::CloseBracket)?;
    Ok((Expression::List(items), tokens))
}

fn dictionary<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let tokens = expect(tokens, TokenKind::OpenBrace)?;
    let _guard = context.push("dictionary");
    let (pairs, tokens) = separated(context, tokens, |context, tokens| {
        let (key, tokens) = expression(context, tokens)?;
        let tokens = require(context, tokens, TokenKind::Colon)?;
        let (value, tokens) = required_expression(context, tokens)?;
        Ok(((key, value), tokens))
    })?;
    let tokens = require(context, tokens, TokenKind::CloseBrace)?;
    Ok((Expression::Dictionary(pairs), tokens))
}

fn parenthesized<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Expression> {
    let tokens = expect(tokens, TokenKind::OpenParen)?;
    let _guard = context.push("parenthesized");
    let (expr, tokens) = required_expression(context, tokens)?;
    let tokens = require(context, tokens, TokenKind::CloseParen)?;
    Ok((expr, tokens))
}

enum Argument {
    Positional(Expression),
    Keyword(String, Expression),
}

fn argument<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a, Argument> {
    if let Ok((name, rest)) = match_identifier(tokens) {
        if let Ok(rest) = expect(rest, TokenKind::Assign) {
            let (value, rest) = required_expression(context, rest)?;
            return Ok((Argument::Keyword(name, value), rest));
        }
    }
    let (value, rest) = expression(context, tokens)?;
    Ok((Argument::Positional(value), rest))
}

fn finish_call<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    callee: Expression,
) -> PostfixResult<'a> {
    let Ok(tokens) = expect(tokens, TokenKind::OpenParen) else {
        return Err((Failure::Soft, callee));
    };
    let _guard = context.push("call");
    let arguments_start = tokens;
    let (arguments, tokens) = match separated(context, tokens, argument) {
        Ok(parsed) => parsed,
        Err(failure) => return Err((failure, callee)),
    };

    let mut args = vec![];
    let mut kwargs = vec![];
    for argument in arguments {
        match argument {
            Argument::Positional(value) if kwargs.is_empty() => args.push(value),
            Argument::Positional(_) => {
                let failure = hard(
                    context,
                    arguments_start,
                    ParseErrorKind::PositionalAfterKeyword,
                );
                return Err((failure, callee));
            }
            Argument::Keyword(name, value) => kwargs.push((name, value)),
        }
    }

    match require(context, tokens, TokenKind::CloseParen) {
        Ok(tokens) => Ok((
            Expression::Call {
                callee: Box::new(callee),
                args,
                kwargs,
            },
            tokens,
        )),
        Err(failure) => Err((failure, callee)),
    }
}

fn finish_attribute<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    target: Expression,
) -> PostfixResult<'a> {
    let Ok(tokens) = expect(tokens, TokenKind::Period) else {
        return Err((Failure::Soft, target));
    };
    match require_identifier(context, tokens) {
        Ok((name, tokens)) => Ok((
            Expression::Attribute {
                target: Box::new(target),
                name,
            },
            tokens,
        )),
        Err(failure) => Err((failure, target)),
    }
}

fn finish_index<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    target: Expression,
) -> PostfixResult<'a> {
    let Ok(tokens) = expect(tokens, TokenKind::OpenBracket) else {
        return Err((Failure::Soft, target));
    };
    let _guard = context.push("index");
    let parsed = required_expression(context, tokens)
        .and_then(|(key, tokens)| Ok((key, require(context, tokens, TokenKind::CloseBracket)?)));
    match parsed {
        Ok((key, tokens)) => Ok((
            Expression::Index {
                target: Box::new(target),
                key: Box::new(key),
            },
            tokens,
        )),
        Err(failure) => Err((failure, target)),
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tokenizer::tokens;

    fn parse(source: &str) -> Result<Program, ParseError> {
        program(&tokens(source).expect("Tokenize should work on test source"))
    }

    fn body(source: &str) -> Vec<Statement> {
        parse(source)
            .expect("Parse should work on valid program")
            .main
            .body
    }

    fn expr(source: &str) -> Expression {
        match body(source).remove(0) {
            Statement::Expression(expr) => expr,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    fn name(n: &str) -> Box<Expression> {
        Box::new(Expression::Name(n.to_string()))
    }

    fn int(n: i64) -> Box<Expression> {
        Box::new(Expression::Integer(n))
    }

    fn error_kind(source: &str) -> ParseErrorKind {
        parse(source).expect_err("Parse should fail").kind
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        assert_eq!(
            expr("2 + 3 * 4"),
            Expression::BinOp(
                int(2),
                Operator::Add,
                Box::new(Expression::BinOp(int(3), Operator::Multiply, int(4)))
            )
        );
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(
            expr("8 - 4 - 2"),
            Expression::BinOp(
                Box::new(Expression::BinOp(int(8), Operator::Subtract, int(4))),
                Operator::Subtract,
                int(2)
            )
        );
    }

    #[test]
    fn test_chained_comparison() {
        assert_eq!(
            expr("a < b <= c"),
            Expression::Compare {
                left: name("a"),
                ops: vec![Operator::Lt, Operator::LtE],
                comparators: vec![Expression::Name("b".into()), Expression::Name("c".into())],
            }
        );
    }

    #[test]
    fn test_single_operand_is_not_a_compare() {
        assert_eq!(expr("a + 1"), Expression::BinOp(name("a"), Operator::Add, int(1)));
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(
            expr("not -a"),
            Expression::Not(Box::new(Expression::Negative(name("a"))))
        );
    }

    #[test]
    fn test_postfix_chain() {
        assert_eq!(
            expr("a.b(1)[2]"),
            Expression::Index {
                target: Box::new(Expression::Call {
                    callee: Box::new(Expression::Attribute {
                        target: name("a"),
                        name: "b".to_string(),
                    }),
                    args: vec![Expression::Integer(1)],
                    kwargs: vec![],
                }),
                key: int(2),
            }
        );
    }

    #[test]
    fn test_keyword_arguments() {
        assert_eq!(
            expr("print(1, end=\"\")"),
            Expression::Call {
                callee: name("print"),
                args: vec![Expression::Integer(1)],
                kwargs: vec![("end".to_string(), Expression::String(String::new()))],
            }
        );
        assert_eq!(
            error_kind("f(a=1, 2)"),
            ParseErrorKind::PositionalAfterKeyword
        );
    }

    #[test]
    fn test_list_and_dictionary_literals() {
        assert_eq!(
            expr("[1, [], {\"a\": 2}]"),
            Expression::List(vec![
                Expression::Integer(1),
                Expression::List(vec![]),
                Expression::Dictionary(vec![(
                    Expression::String("a".to_string()),
                    Expression::Integer(2)
                )]),
            ])
        );
    }

    #[test]
    fn test_declaration_with_value_emits_two_statements() {
        assert_eq!(
            body("var mut x = 1"),
            vec![
                Statement::VariableDeclaration {
                    name: "x".to_string(),
                    is_mutable: true,
                },
                Statement::Assignment {
                    target: Expression::Name("x".to_string()),
                    value: Expression::Integer(1),
                },
            ]
        );
    }

    #[test]
    fn test_if_else_if_else() {
        let source = "if a:\n    b\nelse if c:\n    d\nelse:\n    e\n";
        let Statement::If(if_statement) = body(source).remove(0) else {
            panic!("expected if statement");
        };
        assert_eq!(if_statement.test, Expression::Name("a".to_string()));
        assert_eq!(if_statement.else_ifs.len(), 1);
        assert_eq!(
            if_statement.else_body,
            Some(Block {
                statements: vec![Statement::Expression(Expression::Name("e".to_string()))]
            })
        );
    }

    #[test]
    fn test_for_with_declaration() {
        let source = "for var mut x in xs:\n    x\n";
        let Statement::For { binding, .. } = body(source).remove(0) else {
            panic!("expected for statement");
        };
        assert_eq!(
            binding,
            ForBinding::Declaration {
                name: "x".to_string(),
                is_mutable: true
            }
        );
    }

    #[test]
    fn test_function_and_class_definitions() {
        let source = "class Empty:\n    pass\nclass A:\n    fun f(a, b):\n        return a\n";
        let statements = body(source);
        assert_eq!(
            statements[0],
            Statement::ClassDefinition(ClassDefinition {
                name: "Empty".to_string(),
                methods: vec![],
            })
        );
        let Statement::ClassDefinition(class) = &statements[1] else {
            panic!("expected class definition");
        };
        assert_eq!(class.methods[0].parameters, vec!["a", "b"]);
    }

    #[test]
    fn test_return_without_value() {
        let source = "fun f():\n    return\n";
        let Statement::FunctionDefinition(function) = body(source).remove(0) else {
            panic!("expected function definition");
        };
        assert_eq!(function.body.statements, vec![Statement::Return(None)]);
    }

    #[test]
    fn test_empty_block_is_an_error() {
        assert_eq!(
            error_kind("while a:\n    pass\n"),
            ParseErrorKind::EmptyBlock
        );
        assert_eq!(
            error_kind("while a:\nb\n"),
            ParseErrorKind::Expected(TokenKind::Indent)
        );
    }

    #[test]
    fn test_committed_statement_fails_hard() {
        assert_eq!(
            error_kind("if a\n    b\n"),
            ParseErrorKind::Expected(TokenKind::Colon)
        );
        assert_eq!(error_kind("x = \n"), ParseErrorKind::ExpectedExpression);
        assert_eq!(error_kind("1 +\n"), ParseErrorKind::ExpectedExpression);
    }

    #[test]
    fn test_unparsable_statement() {
        let error = parse("else:\n    a\n").expect_err("stray else");
        assert_eq!(error.kind, ParseErrorKind::ExpectedStatement);
        assert_eq!(error.line(), Some(1));
    }

    #[test]
    fn test_class_body_rejects_other_statements() {
        let error = parse("class C:\n    fun f():\n        pass\n        return 1\n    var x = 1\n")
            .expect_err("class body with a variable");
        assert_eq!(error.kind, ParseErrorKind::InvalidClassMember);
        assert_eq!(error.line(), Some(5));
        assert_eq!(
            error_kind("class C:\n    print(1)\n"),
            ParseErrorKind::InvalidClassMember
        );
    }

    #[test]
    fn test_tokens_after_program_are_rejected() {
        let mut stream = tokens("a\n").unwrap();
        let eof = stream.pop().unwrap();
        stream.push(Token {
            kind: TokenKind::Dedent,
            value: TokenValue::None,
            lexeme: String::new(),
            span: eof.span,
        });
        stream.push(eof);

        let error = program(&stream).expect_err("stray dedent");
        assert_eq!(error.kind, ParseErrorKind::TrailingTokens);
        assert_eq!(error.token.map(|token| token.kind), Some(TokenKind::Dedent));
    }

    #[test]
    fn test_parse_error_reports_context() {
        let error = parse("fun f(:\n    a\n").expect_err("bad parameters");
        assert_eq!(error.kind, ParseErrorKind::Expected(TokenKind::CloseParen));
        assert!(error.to_string().contains("function_definition"));
    }

    #[test]
    fn test_display_round_trip() {
        let source = r#"
var mut total = 0
fun add(a, b):
    return a + b * (2 - 1)
for var x in [1, 2.5, "s", {1: null}]:
    if not x == 1 < 2:
        continue
    else if -x:
        break
    else:
        total = add(total, x)
while total.size()[0] != 3:
    assert true
class C:
    pass
var tiny = 0.0000001
var huge = 100000000000000000000.0
"#;
        let first = parse(source).unwrap();
        let second = parse(&first.to_string()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }
}

use std::{path::PathBuf, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use jan::{
    interpreter::{ExecutionError, Interpreter},
    parser::{self, ParseError},
    tokenizer::{self, TokenKind, TokenizeError},
};

#[derive(Debug, Parser)]
#[command(name = "jan", version, about = "Runs jan programs")]
struct Cli {
    /// Log pipeline stages to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a program
    Run(FileArgs),
    /// Print the token stream
    Tokens(FileArgs),
    /// Print the parsed program in source form
    Ast(FileArgs),
}

#[derive(Debug, Args)]
struct FileArgs {
    file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum InterpretError {
    #[error("Could not read {path}: {source}")]
    IO {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl InterpretError {
    fn exit_code(&self) -> u8 {
        match self {
            InterpretError::Execution(ExecutionError::AssertionFailed { .. }) => 3,
            InterpretError::Execution(_) => 1,
            InterpretError::Tokenize(_) | InterpretError::Parse(_) => 2,
            InterpretError::IO { .. } => 4,
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let result = match &args.command {
        Command::Run(args) => run_command(args),
        Command::Tokens(args) => tokens_command(args),
        Command::Ast(args) => ast_command(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn read_source(args: &FileArgs) -> Result<String, InterpretError> {
    std::fs::read_to_string(&args.file).map_err(|source| InterpretError::IO {
        path: args.file.clone(),
        source,
    })
}

fn run_command(args: &FileArgs) -> Result<(), InterpretError> {
    let source = read_source(args)?;
    interpret(&source)
}

fn interpret(source: &str) -> Result<(), InterpretError> {
    let tokens = tokenizer::tokens(source)?;
    tracing::debug!(tokens = tokens.len(), "tokenized");
    let program = parser::program(&tokens)?;

    let mut interpreter = Interpreter::default();
    interpreter.interpret(&program)?;
    Ok(())
}

fn tokens_command(args: &FileArgs) -> Result<(), InterpretError> {
    let source = read_source(args)?;
    let mut line = 0;
    for token in tokenizer::tokens(&source)? {
        if token.kind == TokenKind::Whitespace {
            continue;
        }
        if token.span.line != line {
            print!("{:4} ", token.span.line);
            line = token.span.line;
        } else {
            print!("   | ");
        }

        println!(
            "{:<10} {}",
            format!("{:?}", token.kind),
            token.lexeme.escape_default()
        );
    }

    Ok(())
}

fn ast_command(args: &FileArgs) -> Result<(), InterpretError> {
    let source = read_source(args)?;
    let program = parser::program(&tokenizer::tokens(&source)?)?;
    print!("{}", program);
    Ok(())
}

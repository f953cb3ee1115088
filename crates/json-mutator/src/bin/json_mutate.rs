//! `json-mutate`: apply patches or a transaction to a document.
//!
//! Usage:
//!   json-mutate '<patch-array-json | transaction-json>'   < document.json
//!   json-mutate --diff '<old text>' '<new text>'
//!
//! Set `RUST_LOG=debug` for logs on stderr.

use std::io::{self, Read, Write};

use json_mutator::cli::{diff, mutate, CliError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn run(args: &[String]) -> Result<String, CliError> {
    match args {
        [flag, old, new] if flag == "--diff" => Ok(diff(old, new)),
        [operations] => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| CliError::Usage(format!("cannot read stdin: {e}")))?;
            mutate(buf.trim(), operations)
        }
        _ => Err(CliError::Usage(
            "json-mutate '<patches|transaction>' < doc.json | json-mutate --diff OLD NEW".into(),
        )),
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(out) => {
            let mut stdout = io::stdout();
            if let Err(e) = writeln!(stdout, "{out}") {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "json-mutate failed");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

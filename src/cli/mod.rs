//! CLI command implementations
//!
//! Parsing lives in [`handlers`]; this module dispatches and hosts the
//! interactive loop.

// CLI glue code - relaxed lint requirements
#![allow(clippy::missing_errors_doc)]

use std::io::{BufRead, Write};
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::error::{Result, SomniaError};
use crate::interpreter::DreamInterpreter;

pub mod handlers;
pub use handlers::{Cli, Commands, ModelArgs};

/// Main CLI entrypoint - dispatches commands to handlers
pub async fn entrypoint(cli: Cli, mut config: ServiceConfig) -> Result<()> {
    match cli.command {
        Commands::Serve {
            host,
            port,
            no_fallback,
            model,
        } => {
            model.apply(&mut config);
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.fallback_enabled &= !no_fallback;
            handlers::handle_serve(config).await
        },
        Commands::Interpret {
            text,
            verbose,
            model,
        } => {
            model.apply(&mut config);
            config.validate()?;
            let interpreter = Arc::new(handlers::load_interpreter(&config).await);
            tokio::task::spawn_blocking(move || {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                match text {
                    Some(text) => interpret_once(&interpreter, &text, verbose, &mut out),
                    None => run_repl(&interpreter, std::io::stdin().lock(), &mut out, verbose),
                }
            })
            .await
            .map_err(|e| SomniaError::UnsupportedOperation {
                operation: "interpret".to_string(),
                reason: format!("Interpreter task failed: {e}"),
            })?
        },
        Commands::Verify {
            path,
            reference,
            output,
        } => handlers::handle_verify(&path, reference.as_deref(), output.as_deref()).map(|_| ()),
        Commands::Info => {
            handlers::handle_info(&config);
            Ok(())
        },
    }
}

/// Write the model description (or why there is none)
pub fn write_model_info<W: Write>(interpreter: &DreamInterpreter, out: &mut W) -> Result<()> {
    writeln!(out, "Mode:         {}", interpreter.mode().as_str())?;
    match interpreter.engine_info() {
        Some(info) => {
            writeln!(out, "Model:        {}", info.model_id)?;
            writeln!(out, "Device:       {}", info.device)?;
            writeln!(out, "Template:     {:?}", info.template)?;
            writeln!(out, "Vocab size:   {}", info.vocab_size)?;
            writeln!(out, "Load steps:   {}", info.load_steps.len())?;
        },
        None => {
            writeln!(out, "Model:        not loaded")?;
            if let Some(reason) = interpreter.load_error() {
                writeln!(out, "Load error:   {reason}")?;
            }
        },
    }
    Ok(())
}

fn write_summary<W: Write>(interpreter: &DreamInterpreter, out: &mut W) -> Result<()> {
    let log = interpreter.last_log();
    if log.is_empty() {
        writeln!(out, "No interpretation yet.")?;
    } else {
        writeln!(out, "{}", "=".repeat(60))?;
        writeln!(out, "Inference steps:")?;
        writeln!(out, "{}", log.summary())?;
        writeln!(out, "{}", "=".repeat(60))?;
    }
    Ok(())
}

/// Interpret one text and print the answer
///
/// Interpretation errors are printed rather than returned so the loop keeps
/// running; only write failures propagate.
pub fn interpret_once<W: Write>(
    interpreter: &DreamInterpreter,
    text: &str,
    verbose: bool,
    out: &mut W,
) -> Result<()> {
    match interpreter.interpret(text) {
        Ok(result) => {
            writeln!(out)?;
            writeln!(out, "{}", result.text)?;
            writeln!(
                out,
                "\n[{} | {:.2}s]",
                interpreter.mode().as_str(),
                result.elapsed.as_secs_f64()
            )?;
            if verbose {
                write_summary(interpreter, out)?;
            }
        },
        Err(e) => writeln!(out, "Error: {e}")?,
    }
    Ok(())
}

/// Interactive loop: one dream per line
///
/// `exit` quits, `summary` prints the last inference log and `info` prints
/// the model description. End of input also quits.
pub fn run_repl<R: BufRead, W: Write>(
    interpreter: &DreamInterpreter,
    input: R,
    out: &mut W,
    verbose: bool,
) -> Result<()> {
    writeln!(out, "Describe a dream to interpret it.")?;
    writeln!(
        out,
        "Commands: 'info' model details, 'summary' last inference steps, 'exit' quit"
    )?;

    let mut lines = input.lines();
    loop {
        write!(out, "\ndream> ")?;
        out.flush()?;

        let Some(line) = lines.next() else { break };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.to_lowercase().as_str() {
            "exit" => break,
            "info" => write_model_info(interpreter, out)?,
            "summary" => write_summary(interpreter, out)?,
            _ => interpret_once(interpreter, line, verbose, out)?,
        }
    }

    writeln!(out, "\nGoodbye!")?;
    Ok(())
}

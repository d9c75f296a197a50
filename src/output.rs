//! Terminal output for Flock

use std::io::{self, Write};

use colored::Colorize;

/// Enable or disable colored output for the whole process
pub fn set_colors(enabled: bool) {
    colored::control::set_override(enabled);
}

/// Print a connection attempt, flushed before the handshake starts
pub fn connecting(host: &str) {
    println!("Connecting to {}...", host);
    io::stdout().flush().ok();
}

/// Echo a composed command before it is sent
pub fn command<W: Write>(out: &mut W, host: &str, call: &str) -> io::Result<()> {
    writeln!(out, "{}", format!("On {}: {}", host, call).green())?;
    out.flush()
}

/// Echo output captured from a command that failed
pub fn partial_output<W: Write>(out: &mut W, output: &str) -> io::Result<()> {
    write!(out, "{}", output)?;
    if !output.ends_with('\n') {
        writeln!(out)?;
    }
    out.flush()
}

/// Print a failure with the error marker
pub fn error(msg: &str) {
    println!("{}", msg.red());
}

/// Write the task list
pub fn task_list<'a, W: Write>(
    out: &mut W,
    names: impl IntoIterator<Item = &'a str>,
) -> io::Result<()> {
    writeln!(out, "Available tasks:")?;
    for name in names {
        writeln!(out, "flock {}", name)?;
    }
    writeln!(out)?;
    writeln!(out, "To print help information: flock --help")
}

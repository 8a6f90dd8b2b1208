//! Styled terminal output.

use std::fmt::Display;

use colored::Colorize;

pub fn info(msg: impl Display) {
    println!("{msg}");
}

pub fn success(msg: impl Display) {
    println!("{}", msg.to_string().green());
}

pub fn warning(msg: impl Display) {
    println!("{}", msg.to_string().yellow());
}

/// Goes to stderr.
pub fn error(msg: impl Display) {
    eprintln!("{} {msg}", "error:".red().bold());
}

/// Indented, dimmed SQL for dry runs.
pub fn sql(statement: &str) {
    for line in statement.lines() {
        println!("    {}", line.bright_black());
    }
}

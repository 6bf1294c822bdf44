//! Operator-facing status lines.

use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy)]
pub struct StatusPrinter {
    pub color: bool,
}

impl StatusPrinter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn heading(&self, text: &str) {
        if self.color {
            println!("\n{}", text.bold().cyan());
        } else {
            println!("\n{}", text);
        }
    }

    pub fn step(&self, text: &str) {
        if self.color {
            println!("\n{} {}", "==>".blue().bold(), text.bold());
        } else {
            println!("\n==> {}", text);
        }
    }

    pub fn info(&self, text: &str) {
        println!("    {}", text);
    }

    pub fn success(&self, text: &str) {
        if self.color {
            println!("{}", text.green());
        } else {
            println!("{}", text);
        }
    }

    pub fn warn(&self, text: &str) {
        if self.color {
            println!("{} {}", "warning:".yellow().bold(), text.yellow());
        } else {
            println!("warning: {}", text);
        }
    }

    pub fn error(&self, text: &str) {
        if self.color {
            eprintln!("{} {}", "error:".red().bold(), text);
        } else {
            eprintln!("error: {}", text);
        }
    }
}

//! The two interactive questions asked before anything is touched.

use std::io::{self, BufRead, StdinLock, Stdout, Write};

/// Version label used when the operator gives none.
pub const PLACEHOLDER_LABEL: &str = "TEST BUILD";

pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `prompt` and reads one line. `None` on end of input.
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    pub fn version_label(&mut self) -> io::Result<String> {
        let answer = self.ask(&format!(
            "Version label for this build (Enter = \"{}\"): ",
            PLACEHOLDER_LABEL
        ))?;
        Ok(answer
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_LABEL.to_string()))
    }

    /// Anything but `y`/`yes` declines, including end of input.
    pub fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.ask(&format!("{} (y/n): ", question))?;
        Ok(matches!(
            answer.map(|a| a.to_ascii_lowercase()).as_deref(),
            Some("y") | Some("yes")
        ))
    }
}

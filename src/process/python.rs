//! Launching the Python generator scripts.

use std::path::Path;

use super::CommandSpec;

/// Runs `script` with `interpreter`, unbuffered so progress lines stream
/// through to the console as the generator prints them.
pub fn script_command(interpreter: &str, script: &Path) -> CommandSpec {
    CommandSpec::new(
        interpreter,
        ["-u".to_string(), script.to_string_lossy().into_owned()],
    )
    .forward()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::OutputMode;

    #[test]
    fn builds_unbuffered_forwarded_command() {
        let spec = script_command("python3", Path::new("/tmp/x/temp_homepage_test.py"));
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec!["-u", "/tmp/x/temp_homepage_test.py"]);
        assert_eq!(spec.mode, OutputMode::Forward);
        assert_eq!(spec.cwd, None);
    }
}

//! Scripted [`CommandRunner`] for unit tests.

use std::cell::RefCell;

use super::{CommandRunner, CommandSpec, RunOutcome};

type Responder = Box<dyn Fn(&CommandSpec) -> RunOutcome>;

pub struct ScriptedRunner {
    calls: RefCell<Vec<CommandSpec>>,
    responder: Responder,
}

impl ScriptedRunner {
    pub fn new(responder: impl Fn(&CommandSpec) -> RunOutcome + 'static) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Every command succeeds with empty output.
    pub fn succeeding() -> Self {
        Self::new(|_| ok(""))
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.to_string()).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> RunOutcome {
        self.calls.borrow_mut().push(spec.clone());
        (self.responder)(spec)
    }
}

pub fn ok(stdout: &str) -> RunOutcome {
    RunOutcome::Success {
        stdout: stdout.to_string(),
    }
}

pub fn fail(code: i32, stderr: &str) -> RunOutcome {
    RunOutcome::Failed {
        code: Some(code),
        stderr: stderr.to_string(),
    }
}

/// True when `spec` is `git <sub> ...`.
pub fn is_git(spec: &CommandSpec, sub: &str) -> bool {
    spec.program == "git" && spec.args.first().map(String::as_str) == Some(sub)
}

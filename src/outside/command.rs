use std::process::{Child, Command, Output, Stdio};

use bitflags::bitflags;
use tracing::{debug, enabled, trace, Level};

use crate::result::{Error, Result};

pub const FFXXX_DEFAULT_ARGS: [&str; 3] = ["-hide_banner", "-loglevel", "error"];

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capture: u8 {
        const STDIN = 0b0000001;
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
        /// Let the child write to our own stdout/stderr instead of discarding them
        const INHERIT = 0b0001000;
    }
}

fn stdio_for(captured: bool, inherit: bool) -> Stdio {
    if captured {
        Stdio::piped()
    } else if inherit {
        Stdio::inherit()
    } else {
        Stdio::null()
    }
}

fn build<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
    is_debug: bool,
) -> Command {
    let inherit = capture.contains(Capture::INHERIT);
    let mut cmd = Command::new(program);
    f(&mut cmd)
        .stdin(stdio_for(capture.contains(Capture::STDIN), false))
        .stdout(stdio_for(
            capture.contains(Capture::STDOUT) || (is_debug && !inherit),
            inherit,
        ))
        .stderr(stdio_for(
            capture.contains(Capture::STDERR) || (is_debug && !inherit),
            inherit,
        ));
    cmd
}

fn launch_error(program: &str, source: std::io::Error) -> Error {
    Error::Launch {
        program: program.to_owned(),
        source,
    }
}

/// Run a command to completion, returning its raw output handle.
///
/// IO handles will be captured only if the caller required it or if the log level is Debug.
/// In that last case, `stdout` and `stderr` will be logged.
///
/// The function returns an error only if the command failed to execute.
/// If the program runs but returns a non-0 status code, it will not trigger an error.
pub fn run_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
) -> Result<Output> {
    let is_debug = enabled!(Level::DEBUG);
    let mut cmd = build(program, f, capture, is_debug);

    debug!("Executing command: {cmd:?}");
    let res = cmd.output().map_err(|err| launch_error(program, err))?;

    if is_debug {
        debug!("status: {}", res.status);
        debug!("stdout: {} bytes long", res.stdout.len());
        trace!("stdout: {:?}", String::from_utf8_lossy(&res.stdout));
        debug!("stderr: {} bytes long", res.stderr.len());
        trace!("stderr: {:?}", String::from_utf8_lossy(&res.stderr));
    }

    Ok(res)
}

/// Start a command without waiting for it.
///
/// Output is never captured since nobody would drain the pipes while the
/// child runs, it is either inherited or discarded.
pub fn spawn_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    f: F,
    capture: Capture,
) -> Result<Child> {
    let capture = capture & Capture::INHERIT;
    let mut cmd = build(program, f, capture, false);

    debug!("Spawning command: {cmd:?}");
    cmd.spawn().map_err(|err| launch_error(program, err))
}

/// Run the command and verify that it has returned a success status code.
///
/// `what` describes the action for the error message, e.g. "download chat history".
pub fn assert_success_command<F: FnOnce(&mut Command) -> &mut Command>(
    program: &str,
    what: &str,
    f: F,
) -> Result<()> {
    let res = run_command(program, f, Capture::empty())?;
    if res.status.success() {
        Ok(())
    } else {
        Err(Error::Finalize {
            program: program.to_owned(),
            code: res.status.code(),
            what: what.to_owned(),
        })
    }
}

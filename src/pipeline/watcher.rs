use std::{
    io::{self, BufRead, BufReader, IsTerminal},
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use tracing::{debug, info, warn};

use super::state::PipelineState;

/// How often the key thread checks whether it should end
const KEY_POLL: Duration = Duration::from_millis(100);

/// Toggles the stop request of a run each time the stop key is pressed.
///
/// On a terminal, single key presses are read in raw mode. Otherwise stdin is
/// read line by line and only a line made of the key counts.
/// Dropping the watcher restores the terminal.
pub struct CancellationWatcher {
    shutdown: Arc<AtomicBool>,
    keys: Option<JoinHandle<()>>,
}

/// Raw mode for as long as it is alive
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl CancellationWatcher {
    /// Start watching stdin on a dedicated thread.
    ///
    /// Failing to switch the terminal to raw mode only falls back to lines.
    pub fn spawn(key: char, state: Arc<PipelineState>) -> io::Result<Self> {
        if io::stdin().is_terminal() {
            match RawMode::enable() {
                Ok(raw) => {
                    let watcher = Self::spawn_keys(raw, key, state)?;
                    info!("Press '{key}' to stop after the current download");
                    return Ok(watcher);
                }
                Err(err) => warn!("Could not read single key presses: {err}"),
            }
        }

        let watcher = Self::spawn_lines(BufReader::new(io::stdin()), key, state)?;
        info!("Type '{key}' then Enter to stop after the current download");
        Ok(watcher)
    }

    fn spawn_keys(raw: RawMode, key: char, state: Arc<PipelineState>) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let keys = thread::Builder::new().name("watcher".to_owned()).spawn({
            let shutdown = shutdown.clone();
            move || {
                let _raw = raw;
                watch_keys(key, &state, &shutdown);
            }
        })?;

        Ok(Self {
            shutdown,
            keys: Some(keys),
        })
    }

    /// The thread is never waited for: a blocking read cannot be interrupted.
    /// It ends on its own at end of input or on the first read error.
    fn spawn_lines<R>(input: R, key: char, state: Arc<PipelineState>) -> io::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        thread::Builder::new()
            .name("watcher".to_owned())
            .spawn(move || watch_lines(input, key, &state))?;

        Ok(Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            keys: None,
        })
    }
}

impl Drop for CancellationWatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(keys) = self.keys.take() {
            if keys.join().is_err() {
                warn!("The stop key watcher panicked");
            }
        }
    }
}

fn watch_keys(key: char, state: &PipelineState, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        match event::poll(KEY_POLL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(err) => {
                debug!("Stop key watcher disabled: {err}");
                return;
            }
        }

        match event::read() {
            Ok(Event::Key(press)) => {
                if on_key(press, key, state).is_break() {
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => {
                debug!("Stop key watcher disabled: {err}");
                return;
            }
        }
    }
}

/// Raw mode swallows Ctrl+C: it requests a stop and gives the terminal back,
/// so that a second one interrupts the process as usual.
fn on_key(press: KeyEvent, key: char, state: &PipelineState) -> ControlFlow<()> {
    if press.kind != KeyEventKind::Press {
        return ControlFlow::Continue(());
    }

    let KeyCode::Char(c) = press.code else {
        return ControlFlow::Continue(());
    };
    if press.modifiers.contains(KeyModifiers::CONTROL) {
        if c.eq_ignore_ascii_case(&'c') {
            state.request_stop();
            warn!("Interrupted: stopping after the current download, press Ctrl+C again to abort");
            return ControlFlow::Break(());
        }
    } else if c.eq_ignore_ascii_case(&key) {
        toggle(key, state);
    }
    ControlFlow::Continue(())
}

fn watch_lines<R: BufRead>(input: R, key: char, state: &PipelineState) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                debug!("Stop key watcher disabled: {err}");
                return;
            }
        };

        let mut chars = line.trim().chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.eq_ignore_ascii_case(&key) {
                toggle(key, state);
            }
        }
    }

    debug!("Stop key watcher reached the end of its input");
}

fn toggle(key: char, state: &PipelineState) {
    if state.toggle_stop() {
        info!("Stop requested: running downloads will complete, no new one will start. Press '{key}' again to resume");
    } else {
        info!("Stop cancelled");
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::*;

    fn lines(input: &'static [u8]) -> Arc<PipelineState> {
        let state = PipelineState::new(None);
        watch_lines(Cursor::new(input), 's', &state);
        state
    }

    fn press(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    #[test]
    fn each_key_press_toggles_the_stop() {
        let state = PipelineState::new(None);

        assert!(on_key(press('s'), 's', &state).is_continue());
        assert!(state.stop_requested());
        assert!(on_key(press('S'), 's', &state).is_continue());
        assert!(!state.stop_requested());
    }

    #[test]
    fn releases_and_other_keys_are_ignored() {
        let state = PipelineState::new(None);
        let release =
            KeyEvent::new_with_kind(KeyCode::Char('s'), KeyModifiers::NONE, KeyEventKind::Release);

        on_key(release, 's', &state);
        on_key(press('y'), 's', &state);
        on_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE), 's', &state);
        on_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL), 's', &state);

        assert!(!state.stop_requested());
    }

    #[test]
    fn ctrl_c_stops_and_releases_the_terminal() {
        let state = PipelineState::new(None);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);

        assert!(on_key(ctrl_c, 's', &state).is_break());
        assert!(state.stop_requested());
        // Not a toggle
        assert!(on_key(ctrl_c, 's', &state).is_break());
        assert!(state.stop_requested());
    }

    #[test]
    fn only_lines_made_of_the_key_count() {
        assert!(lines(b"s\n").stop_requested());
        assert!(lines(b" S \n").stop_requested());
        assert!(!lines(b"s\ns\n").stop_requested());
        assert!(!lines(b"yes\n").stop_requested());
        assert!(!lines(b"status\n").stop_requested());
        assert!(!lines(b"abc\nq\n").stop_requested());
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no terminal"))
        }
    }

    #[test]
    fn read_errors_are_not_fatal() {
        let state = PipelineState::new(None);
        watch_lines(BufReader::new(Broken), 's', &state);
        assert!(!state.stop_requested());
    }
}

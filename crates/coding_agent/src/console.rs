//! Line-oriented terminal input and shareable output sinks.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use tracing::warn;

/// Source of whole input lines; `None` at end of input.
///
/// An interrupt (Ctrl-C) surfaces as an [`io::ErrorKind::Interrupted`] error.
pub trait LineInput {
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Anything that can wake a pending [`ConsoleInput::read_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    Eof,
    Interrupt,
}

#[derive(Debug)]
struct InputQueue {
    events: Receiver<InputEvent>,
    closed: bool,
}

/// Terminal input fed by a stdin reader thread and a SIGINT listener.
///
/// Clones share one queue, so the REPL and the approval prompt never race for
/// the same line. Once end of input is seen every later read returns `None`.
#[derive(Debug, Clone)]
pub struct ConsoleInput {
    queue: Arc<Mutex<InputQueue>>,
}

impl ConsoleInput {
    /// Starts reading process stdin and, on unix, listening for SIGINT.
    pub fn spawn() -> io::Result<Self> {
        let (sender, input) = input_channel();

        let lines = sender.clone();
        thread::Builder::new()
            .name("stdin-reader".to_string())
            .spawn(move || read_stdin(&lines))?;

        #[cfg(unix)]
        listen_for_interrupts(sender)?;

        Ok(input)
    }
}

/// A [`ConsoleInput`] driven by whoever holds the sender.
#[must_use]
pub fn input_channel() -> (Sender<InputEvent>, ConsoleInput) {
    let (sender, events) = mpsc::channel();
    let input = ConsoleInput {
        queue: Arc::new(Mutex::new(InputQueue {
            events,
            closed: false,
        })),
    };
    (sender, input)
}

impl LineInput for ConsoleInput {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut queue = lock_unpoisoned(&self.queue);
        if queue.closed {
            return Ok(None);
        }

        match queue.events.recv() {
            Ok(InputEvent::Line(line)) => Ok(Some(line)),
            Ok(InputEvent::Interrupt) => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "interrupted",
            )),
            Ok(InputEvent::Eof) | Err(_) => {
                queue.closed = true;
                Ok(None)
            }
        }
    }
}

fn read_stdin(events: &Sender<InputEvent>) {
    let stdin = io::stdin();
    loop {
        let mut line = String::new();
        let event = match stdin.lock().read_line(&mut line) {
            Ok(0) => InputEvent::Eof,
            Ok(_) => InputEvent::Line(trim_line_ending(line)),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                warn!(%error, "stdin read failed; treating as end of input");
                InputEvent::Eof
            }
        };

        let done = event == InputEvent::Eof;
        if events.send(event).is_err() || done {
            return;
        }
    }
}

#[cfg(unix)]
fn listen_for_interrupts(events: Sender<InputEvent>) -> io::Result<()> {
    use signal_hook::consts::SIGINT;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT])?;
    thread::Builder::new()
        .name("sigint-listener".to_string())
        .spawn(move || {
            for _ in signals.forever() {
                if events.send(InputEvent::Interrupt).is_err() {
                    break;
                }
            }
        })?;
    Ok(())
}

/// Pre-recorded input lines.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    #[must_use]
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl LineInput for ScriptedInput {
    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// In-memory writer whose clones share one buffer.
#[derive(Debug, Default, Clone)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock_unpoisoned(&self.bytes)).into_owned()
    }

    pub fn clear(&self) {
        lock_unpoisoned(&self.bytes).clear();
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock_unpoisoned(&self.bytes).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn trim_line_ending(mut line: String) -> String {
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    line
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_input_ends_with_none() {
        let mut input = ScriptedInput::new(["a", "b"]);

        assert_eq!(input.read_line().expect("line"), Some("a".to_string()));
        assert_eq!(input.read_line().expect("line"), Some("b".to_string()));
        assert_eq!(input.read_line().expect("line"), None);
    }

    #[test]
    fn shared_buffer_clones_see_the_same_bytes() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();

        write!(writer, "hello").expect("write");

        assert_eq!(buffer.contents(), "hello");
    }

    #[test]
    fn console_input_reports_interrupts_and_stays_closed_after_eof() {
        let (sender, mut input) = input_channel();
        let mut shared = input.clone();
        for event in [
            InputEvent::Line("first".to_string()),
            InputEvent::Interrupt,
            InputEvent::Eof,
            InputEvent::Line("after eof".to_string()),
        ] {
            sender.send(event).expect("send");
        }

        assert_eq!(input.read_line().expect("line"), Some("first".to_string()));
        let error = shared.read_line().expect_err("interrupt");
        assert_eq!(error.kind(), io::ErrorKind::Interrupted);
        assert_eq!(input.read_line().expect("eof"), None);
        assert_eq!(shared.read_line().expect("still closed"), None);
    }

    #[test]
    fn console_input_ends_when_every_sender_is_gone() {
        let (sender, mut input) = input_channel();
        drop(sender);

        assert_eq!(input.read_line().expect("eof"), None);
    }

    #[test]
    fn line_endings_are_trimmed() {
        assert_eq!(trim_line_ending("x\r\n".to_string()), "x");
    }
}

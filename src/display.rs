//! Terminal rendering of session events.
//!
//! Events arrive from the session over an unbounded channel and are written on a
//! blocking thread so stdout never stalls the async tasks. The elapsed counter is
//! redrawn in place on a single line.

use crate::model::SessionEvent;
use crate::timefmt::seconds_to_time_string;
use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
    tty::IsTty,
};
use std::io::Write;
use tokio::sync::mpsc::UnboundedReceiver;

const BANNER_RULE: &str = "***************************";

/// Spawn the stdout writer for a session. With `quiet`, events are drained silently.
pub(crate) fn spawn_session_writer(
    rx: UnboundedReceiver<SessionEvent>,
    quiet: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let ansi = stdout.is_tty();
        let mut out = Countdown::new(stdout.lock(), ansi);
        out.drain(rx, quiet);
    })
}

/// Line-oriented writer that keeps track of the in-place counter line.
///
/// Without `ansi` (stdout is not a terminal) the counter is redrawn with a bare
/// carriage return instead of cursor and clear sequences.
pub(crate) struct Countdown<W: Write> {
    out: W,
    ansi: bool,
    mid_line: bool,
}

impl<W: Write> Countdown<W> {
    pub(crate) fn new(out: W, ansi: bool) -> Self {
        Self {
            out,
            ansi,
            mid_line: false,
        }
    }

    pub(crate) fn drain(&mut self, mut rx: UnboundedReceiver<SessionEvent>, quiet: bool) {
        while let Some(ev) = rx.blocking_recv() {
            if quiet {
                continue;
            }
            let _ = self.render(&ev);
        }
        let _ = self.finish_line();
        let _ = self.out.flush();
    }

    pub(crate) fn render(&mut self, ev: &SessionEvent) -> std::io::Result<()> {
        match ev {
            SessionEvent::Selected { runnable } => {
                self.line(&format!("Randomly Running: {}", runnable.command_line()))?;
            }
            SessionEvent::Resumed { key, prior_seconds } => {
                self.line(&format!(
                    "{key}: {} so far",
                    seconds_to_time_string(*prior_seconds)
                ))?;
                self.line(BANNER_RULE)?;
            }
            SessionEvent::Tick { seconds } => {
                let text = seconds_to_time_string(*seconds);
                if self.ansi {
                    queue!(
                        self.out,
                        MoveToColumn(0),
                        Clear(ClearType::CurrentLine),
                        Print(text)
                    )?;
                } else {
                    write!(self.out, "\r{text}")?;
                }
                self.out.flush()?;
                self.mid_line = true;
            }
            SessionEvent::ProcessExited { success: true, .. } => {}
            SessionEvent::ProcessExited {
                success: false,
                code,
            } => {
                let status = code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
                self.line(&format!("Runnable exited with {status}"))?;
            }
            SessionEvent::LaunchFailed { message } => {
                self.line(&format!("Could not launch: {message}"))?;
            }
            SessionEvent::Finalized { key, seconds } => {
                self.line(&format!(
                    "Recorded {key}: {}",
                    seconds_to_time_string(*seconds)
                ))?;
            }
        }
        Ok(())
    }

    fn line(&mut self, text: &str) -> std::io::Result<()> {
        self.finish_line()?;
        writeln!(self.out, "{text}")
    }

    fn finish_line(&mut self) -> std::io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        Ok(())
    }
}

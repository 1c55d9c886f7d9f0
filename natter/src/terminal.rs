//! Terminal rendering — crossterm-backed single-line prompt redraw.
//!
//! The prompt always occupies exactly one terminal line, so every render
//! reduces to one primitive: move to column 0 and erase to end of line.
//! Incoming messages are written *above* the prompt by erasing it,
//! printing the message into permanent scrollback, and redrawing the
//! prompt afterwards — the fixed ordering that keeps both streams intact.
//!
//! [`Terminal`] owns a boxed writer so tests can render into a byte
//! buffer; the client passes `std::io::stdout()`.

use std::io::{self, Write};

use crossterm::{
    cursor, queue,
    style::Print,
    terminal::{self, ClearType},
};

/// Marker printed at the left edge of the input line.
pub const PROMPT: &str = "> ";

// ── Terminal ──────────────────────────────────────────────────────────────

/// Wraps the output stream with crossterm commands and tracks the width
/// used for input-line windowing.
pub struct Terminal {
    /// Terminal width in columns.
    width: u16,
    out: Box<dyn Write>,
}

impl Terminal {
    /// Create a [`Terminal`] writing to `out`.
    ///
    /// Queries the current terminal width; falls back to 80 columns if
    /// unavailable.
    pub fn new(out: impl Write + 'static) -> Self {
        let (width, _) = terminal::size().unwrap_or((80, 24));
        Self { width, out: Box::new(out) }
    }

    /// Enable raw mode.  Returns a guard that disables it on drop.
    pub fn enter_raw_mode() -> io::Result<RawModeGuard> {
        terminal::enable_raw_mode()?;
        Ok(RawModeGuard(()))
    }

    /// Update the stored width after a `SIGWINCH` / resize event.
    pub fn handle_resize(&mut self, width: u16) {
        self.width = width;
    }

    /// Redraw the prompt line in place: column 0, erase to end of line,
    /// prompt marker plus `text`.  Never emits a newline.
    ///
    /// When the marker and text exceed the terminal width, the tail window
    /// of `text` is shown so the edit position (end of line) stays visible.
    pub fn redraw_input(&mut self, text: &str) -> io::Result<()> {
        let window = self.input_window(text);
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::UntilNewLine),
            Print(PROMPT),
            Print(window),
        )?;
        self.flush()
    }

    /// Print `line` into permanent scrollback above the prompt: erase the
    /// prompt line, write `line` and a newline, then redraw the prompt
    /// with `input` unchanged.
    ///
    /// The erase → print → redraw order is what guarantees an incoming
    /// message never lands mid-way through uncommitted input, and that
    /// uncommitted input survives it untouched.
    pub fn print_over_input(&mut self, line: &str, input: &str) -> io::Result<()> {
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::UntilNewLine),
            Print(line),
            Print("\r\n"),
        )?;
        self.redraw_input(input)
    }

    /// Erase the prompt line and move to a fresh line.  Called once at
    /// session end so the shell prompt starts cleanly.
    pub fn cleanup(&mut self) -> io::Result<()> {
        queue!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::UntilNewLine),
            Print("\r\n"),
        )?;
        self.flush()
    }

    /// Ring the terminal bell.
    pub fn bell(&mut self) -> io::Result<()> {
        queue!(self.out, Print('\x07'))?;
        self.flush()
    }

    /// Flush queued commands to the terminal.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// The visible tail of `text` given the current width.  One column is
    /// left free for the cursor.
    fn input_window<'a>(&self, text: &'a str) -> &'a str {
        let avail = (self.width as usize).saturating_sub(PROMPT.len() + 1);
        if text.len() <= avail {
            text
        } else {
            &text[text.len() - avail..]
        }
    }
}

// ── RawModeGuard ──────────────────────────────────────────────────────────

/// RAII guard: disables raw mode when dropped.
///
/// The drop runs on every exit path, including unwinds, which is what
/// keeps the terminal usable after an abnormal exit.
pub struct RawModeGuard(());

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(std::io::stdout(), cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A writer the test can inspect after the terminal consumes it.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn terminal() -> (Terminal, SharedBuf) {
        let buf = SharedBuf::default();
        let mut term = Terminal::new(buf.clone());
        term.handle_resize(80);
        (term, buf)
    }

    fn rendered(buf: &SharedBuf) -> String {
        String::from_utf8_lossy(&buf.0.lock().unwrap()).into_owned()
    }

    #[test]
    fn redraw_shows_prompt_and_text() {
        let (mut term, buf) = terminal();
        term.redraw_input("abc").unwrap();
        assert!(rendered(&buf).contains("> abc"));
    }

    #[test]
    fn redraw_emits_no_newline() {
        let (mut term, buf) = terminal();
        term.redraw_input("abc").unwrap();
        assert!(!rendered(&buf).contains('\n'));
    }

    #[test]
    fn incoming_printed_before_prompt_redraw() {
        let (mut term, buf) = terminal();
        term.print_over_input("bob: hey", "abc").unwrap();
        let out = rendered(&buf);
        assert!(out.contains("bob: hey\r\n"));
        let msg_at = out.find("bob: hey").unwrap();
        let prompt_at = out.rfind("> abc").unwrap();
        assert!(msg_at < prompt_at, "message must precede the redrawn prompt");
    }

    #[test]
    fn incoming_with_empty_input_redraws_bare_prompt() {
        let (mut term, buf) = terminal();
        term.print_over_input("notice", "").unwrap();
        let out = rendered(&buf);
        assert!(out.contains("notice\r\n"));
        assert!(out.ends_with(PROMPT));
    }

    #[test]
    fn long_input_windows_to_the_tail() {
        let (mut term, buf) = terminal();
        term.handle_resize(20);
        let text = format!("{}TAIL", "A".repeat(30));
        term.redraw_input(&text).unwrap();
        let out = rendered(&buf);
        // 20 columns minus the marker and one cursor column = 17 visible.
        assert!(out.contains("TAIL"));
        assert!(!out.contains(&"A".repeat(14)));
        assert!(out.contains(&format!("{}TAIL", "A".repeat(13))));
    }

    #[test]
    fn bell_rings() {
        let (mut term, buf) = terminal();
        term.bell().unwrap();
        assert!(rendered(&buf).contains('\x07'));
    }

    #[test]
    fn cleanup_erases_and_advances() {
        let (mut term, buf) = terminal();
        term.cleanup().unwrap();
        assert!(rendered(&buf).ends_with("\r\n"));
    }
}

//! Main async event loop.
//!
//! A single `tokio::select!` multiplexes the server connection, raw
//! keyboard bytes, and POSIX signals.  Every piece of session state — the
//! reassembly buffer inside the connection, the input buffer, the history
//! — is owned here and mutated from exactly one select arm per iteration,
//! so the loop needs no locking.
//!
//! ```text
//!   ┌─────────────────────────┐
//!   │  EventLoop::run()       │
//!   │  tokio::select! over:   │
//!   │  • conn.recv()          │◄── chat server (TCP)
//!   │  • stdin bytes          │◄── stdin-reader thread
//!   │  • SIGWINCH             │
//!   │  • SIGTERM/INT/HUP      │
//!   └─────────────────────────┘
//! ```

use std::io;

use tokio::io::AsyncWriteExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::history::InputHistory;
use crate::input::LineEditor;
use crate::net::{Connection, NetEvent};
use crate::terminal::{Terminal, PROMPT};

/// The reserved input line that ends the session (exact match).
pub const QUIT_SENTINEL: &str = "quit";

/// How many submitted lines the Up/Down recall remembers.
const HISTORY_SIZE: usize = 500;

// ── Keyboard byte → Key decoder ───────────────────────────────────────────

/// One classified keypress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A printable ASCII character to append to the input line.
    Char(char),
    /// Submit the current line (CR or LF).
    Enter,
    /// Delete the character before the edit position (DEL or BS).
    Backspace,
    /// Recall the previous history entry (Up arrow).
    RecallOlder,
    /// Recall the next history entry (Down arrow).
    RecallNewer,
}

/// Accumulates raw bytes from stdin and classifies them into [`Key`]s.
///
/// Escape sequences are buffered until complete so the printable bytes
/// inside them (e.g. the `[` and `A` of an Up arrow) never leak into the
/// input buffer.  Complete but unbound sequences are swallowed whole.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    buf: Vec<u8>,
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one byte, returning a [`Key`] if a keypress was recognized, or
    /// `None` when more bytes are expected or the input is ignored.
    pub fn push(&mut self, b: u8) -> Option<Key> {
        if self.buf.is_empty() {
            return match b {
                b'\r' | b'\n' => Some(Key::Enter),
                0x7f | 0x08 => Some(Key::Backspace),
                0x1b => {
                    self.buf.push(b);
                    None
                }
                0x20..=0x7e => Some(Key::Char(b as char)),
                _ => None, // other control bytes — ignored
            };
        }

        // Inside an escape sequence.
        self.buf.push(b);
        let key = match self.buf.as_slice() {
            // CSI / SS3 introducer — wait for the final byte.
            [0x1b, b'['] | [0x1b, b'O'] => return None,
            [0x1b, b'[', b'A'] | [0x1b, b'O', b'A'] => Some(Key::RecallOlder),
            [0x1b, b'[', b'B'] | [0x1b, b'O', b'B'] => Some(Key::RecallNewer),
            // Parameter bytes extend a CSI sequence (e.g. `ESC [ 1 ; 5 C`).
            [0x1b, b'[', .., last] if !(0x40..=0x7e).contains(last) => return None,
            // Complete but unbound — swallow.
            _ => None,
        };
        self.buf.clear();
        key
    }
}

// ── SessionEnd ────────────────────────────────────────────────────────────

/// Why the session ended; decides the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user typed the quit sentinel, or closed stdin.
    UserQuit,
    /// The server closed the connection.
    PeerClosed,
    /// A send or receive failed.
    IoError,
    /// SIGTERM / SIGINT / SIGHUP.
    Terminated,
}

// ── EventLoop ─────────────────────────────────────────────────────────────

/// The top-level runtime: owns the connection, editor, history, and
/// terminal, and drives them from a single `tokio::select!` loop.
///
/// Create with [`EventLoop::new`] around an open [`Connection`], then call
/// [`EventLoop::run`].
pub struct EventLoop {
    conn: Connection,
    editor: LineEditor,
    history: InputHistory,
    decoder: KeyDecoder,
    terminal: Terminal,
    /// Transcript file (`-l <file>`), append-only.
    transcript: Option<tokio::fs::File>,
    /// Set once the session should end; checked at the top of each iteration.
    end: Option<SessionEnd>,
}

impl EventLoop {
    /// Build an event loop around an open connection, rendering to stdout.
    pub fn new(conn: Connection, transcript: Option<tokio::fs::File>) -> Self {
        Self {
            conn,
            editor: LineEditor::new(),
            history: InputHistory::new(HISTORY_SIZE),
            decoder: KeyDecoder::new(),
            terminal: Terminal::new(std::io::stdout()),
            transcript,
            end: None,
        }
    }

    /// Run until the session ends.  Raw mode is scoped to this call; the
    /// guard restores the terminal on every exit path, early error returns
    /// included.
    pub async fn run(&mut self) -> io::Result<SessionEnd> {
        let mut sigwinch = signal(SignalKind::window_change())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        let _raw = Terminal::enter_raw_mode()?;
        self.terminal.redraw_input("")?;

        // Keyboard bytes come through a reader thread rather than
        // tokio's async stdin: cancelling an in-flight async stdin read
        // (which select! does every time the connection arm wins) leaves
        // its blocking worker parked on the fd, and each parked worker
        // can steal keystrokes a fresh read never sees.  A chat session
        // lives or dies on not eating keypresses, so one thread keeps
        // sole ownership of stdin and ships whatever it reads into the
        // select below.  An empty send marks end of input.
        let (key_tx, mut key_rx) = mpsc::channel::<Vec<u8>>(16);
        std::thread::spawn(move || {
            use std::io::Read;
            let stdin = std::io::stdin();
            let mut handle = stdin.lock();
            let mut chunk = [0u8; 256];
            loop {
                match handle.read(&mut chunk) {
                    Ok(0) | Err(_) => {
                        let _ = key_tx.blocking_send(Vec::new());
                        break;
                    }
                    Ok(n) => {
                        if key_tx.blocking_send(chunk[..n].to_vec()).is_err() {
                            // Session is over; nobody is listening.
                            break;
                        }
                    }
                }
            }
        });

        while self.end.is_none() {
            tokio::select! {
                // Keyboard bytes from the reader thread.
                Some(bytes) = key_rx.recv() => {
                    if bytes.is_empty() {
                        // Stdin EOF: treat like a user-initiated quit.
                        self.end = Some(SessionEnd::UserQuit);
                    } else {
                        for b in bytes {
                            if let Some(key) = self.decoder.push(b) {
                                self.handle_key(key).await?;
                                if self.end.is_some() {
                                    break;
                                }
                            }
                        }
                    }
                }

                // Data from the server.
                result = self.conn.recv() => {
                    match result {
                        Ok(events) => {
                            for ev in events {
                                self.handle_net_event(ev).await?;
                            }
                        }
                        Err(e) => {
                            self.notice(&format!("** Receive error: {e} **"))?;
                            self.end = Some(SessionEnd::IoError);
                        }
                    }
                }

                // Terminal resize.
                _ = sigwinch.recv() => {
                    if let Ok((w, _)) = crossterm::terminal::size() {
                        self.terminal.handle_resize(w);
                        self.terminal.redraw_input(self.editor.text())?;
                    }
                }

                // External termination: fall through to the shared teardown.
                _ = sigterm.recv() => self.end = Some(SessionEnd::Terminated),
                _ = sigint.recv() => self.end = Some(SessionEnd::Terminated),
                _ = sighup.recv() => self.end = Some(SessionEnd::Terminated),
            }
        }

        // Leave the cursor on a fresh line so the shell prompt starts
        // cleanly; the raw-mode guard restores the terminal on drop.
        self.terminal.cleanup()?;
        Ok(self.end.unwrap_or(SessionEnd::UserQuit))
    }

    // ── Keyboard dispatch ─────────────────────────────────────────────────

    pub(crate) async fn handle_key(&mut self, key: Key) -> io::Result<()> {
        match key {
            Key::Char(c) => {
                if self.editor.append_char(c) {
                    self.terminal.redraw_input(self.editor.text())?;
                } else {
                    self.terminal.bell()?;
                }
            }

            Key::Backspace => {
                if self.editor.backspace() {
                    self.terminal.redraw_input(self.editor.text())?;
                }
            }

            Key::Enter => {
                let line = self.editor.take_line();
                self.history.record(&line);
                // Echo the submitted line into scrollback, then redraw the
                // now-empty prompt.
                self.terminal.print_over_input(&format!("{PROMPT}{line}"), "")?;
                if line.is_empty() {
                    // Bare newlines are not sent.
                    return Ok(());
                }
                self.log_line(&line).await;
                if let Err(e) = self.conn.send_line(&line).await {
                    self.notice(&format!("** Send error: {e} **"))?;
                    self.end = Some(SessionEnd::IoError);
                    return Ok(());
                }
                if line == QUIT_SENTINEL {
                    self.end = Some(SessionEnd::UserQuit);
                }
            }

            Key::RecallOlder => {
                let recalled = self
                    .history
                    .recall_older(self.editor.text())
                    .map(str::to_owned);
                match recalled {
                    Some(text) => {
                        self.editor.set_text(&text);
                        self.terminal.redraw_input(self.editor.text())?;
                    }
                    None => self.terminal.bell()?,
                }
            }

            Key::RecallNewer => {
                let recalled = self.history.recall_newer().map(str::to_owned);
                match recalled {
                    Some(text) => {
                        self.editor.set_text(&text);
                        self.terminal.redraw_input(self.editor.text())?;
                    }
                    None => self.terminal.bell()?,
                }
            }
        }
        Ok(())
    }

    // ── Network dispatch ──────────────────────────────────────────────────

    pub(crate) async fn handle_net_event(&mut self, ev: NetEvent) -> io::Result<()> {
        match ev {
            NetEvent::Line(bytes) => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.log_line(&text).await;
                self.terminal.print_over_input(&text, self.editor.text())?;
            }
            NetEvent::Dropped(n) => {
                self.notice(&format!("% Dropped oversized line ({n} bytes)"))?;
            }
            NetEvent::Closed => {
                self.notice("** Connection closed by server **")?;
                self.end = Some(SessionEnd::PeerClosed);
            }
        }
        Ok(())
    }

    /// Print a client-side notice above the prompt.
    fn notice(&mut self, msg: &str) -> io::Result<()> {
        self.terminal.print_over_input(msg, self.editor.text())
    }

    /// Append one line to the transcript file, if logging is on.
    /// Transcript writes are best-effort.
    async fn log_line(&mut self, text: &str) {
        if let Some(ref mut f) = self.transcript {
            let _ = f.write_all(format!("{text}\n").as_bytes()).await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    // ── KeyDecoder ────────────────────────────────────────────────────────

    #[test]
    fn decoder_printable_ascii() {
        let mut kd = KeyDecoder::new();
        assert_eq!(kd.push(b'a'), Some(Key::Char('a')));
        assert_eq!(kd.push(b'Z'), Some(Key::Char('Z')));
        assert_eq!(kd.push(b' '), Some(Key::Char(' ')));
    }

    #[test]
    fn decoder_cr_and_lf_are_enter() {
        let mut kd = KeyDecoder::new();
        assert_eq!(kd.push(b'\r'), Some(Key::Enter));
        assert_eq!(kd.push(b'\n'), Some(Key::Enter));
    }

    #[test]
    fn decoder_del_and_bs_are_backspace() {
        let mut kd = KeyDecoder::new();
        assert_eq!(kd.push(0x7f), Some(Key::Backspace));
        assert_eq!(kd.push(0x08), Some(Key::Backspace));
    }

    #[test]
    fn decoder_up_arrow_three_bytes() {
        let mut kd = KeyDecoder::new();
        assert_eq!(kd.push(0x1b), None);
        assert_eq!(kd.push(b'['), None);
        assert_eq!(kd.push(b'A'), Some(Key::RecallOlder));
    }

    #[test]
    fn decoder_ss3_down_arrow() {
        let mut kd = KeyDecoder::new();
        kd.push(0x1b);
        kd.push(b'O');
        assert_eq!(kd.push(b'B'), Some(Key::RecallNewer));
    }

    #[test]
    fn decoder_swallows_unknown_csi_whole() {
        let mut kd = KeyDecoder::new();
        // ESC [ 1 ; 5 C (ctrl-right) — no printable byte may leak out.
        for b in [0x1b, b'[', b'1', b';', b'5'] {
            assert_eq!(kd.push(b), None);
        }
        assert_eq!(kd.push(b'C'), None);
        // Decoder is clean again afterwards.
        assert_eq!(kd.push(b'x'), Some(Key::Char('x')));
    }

    #[test]
    fn decoder_drops_alt_chords() {
        let mut kd = KeyDecoder::new();
        assert_eq!(kd.push(0x1b), None);
        assert_eq!(kd.push(b'x'), None);
        assert_eq!(kd.push(b'y'), Some(Key::Char('y')));
    }

    #[test]
    fn decoder_ignores_other_controls() {
        let mut kd = KeyDecoder::new();
        assert_eq!(kd.push(0x03), None); // Ctrl-C byte in raw mode
        assert_eq!(kd.push(0x00), None);
    }

    // ── Session dispatch (local loopback) ─────────────────────────────────

    /// Connect a client to a one-shot loopback server, returning both ends.
    async fn loopback() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn, accepted) = tokio::join!(
            Connection::connect("127.0.0.1", addr.port()),
            listener.accept()
        );
        (conn.unwrap(), accepted.unwrap().0)
    }

    async fn type_line(el: &mut EventLoop, line: &str) {
        for c in line.chars() {
            el.handle_key(Key::Char(c)).await.unwrap();
        }
        el.handle_key(Key::Enter).await.unwrap();
    }

    #[tokio::test]
    async fn quit_sentinel_ends_session() {
        let (conn, mut server) = loopback().await;
        let mut el = EventLoop::new(conn, None);
        type_line(&mut el, "quit").await;
        assert_eq!(el.end, Some(SessionEnd::UserQuit));

        let mut buf = [0u8; 16];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"quit\n");
    }

    #[tokio::test]
    async fn near_miss_sentinels_do_not_quit() {
        let (conn, _server) = loopback().await;
        let mut el = EventLoop::new(conn, None);
        type_line(&mut el, "quitting").await;
        assert_eq!(el.end, None);
        type_line(&mut el, "Quit").await;
        assert_eq!(el.end, None);
    }

    #[tokio::test]
    async fn empty_submit_sends_nothing() {
        let (conn, mut server) = loopback().await;
        let mut el = EventLoop::new(conn, None);
        el.handle_key(Key::Enter).await.unwrap();
        type_line(&mut el, "hi").await;
        // The first bytes the server sees are from "hi", not a bare newline.
        let mut buf = [0u8; 16];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hi\n");
    }

    #[tokio::test]
    async fn submit_clears_editor_and_records_history() {
        let (conn, _server) = loopback().await;
        let mut el = EventLoop::new(conn, None);
        type_line(&mut el, "hello").await;
        assert!(el.editor.is_empty());
        el.handle_key(Key::RecallOlder).await.unwrap();
        assert_eq!(el.editor.text(), "hello");
    }

    #[tokio::test]
    async fn incoming_line_preserves_editor() {
        let (conn, _server) = loopback().await;
        let mut el = EventLoop::new(conn, None);
        el.handle_key(Key::Char('h')).await.unwrap();
        el.handle_key(Key::Char('i')).await.unwrap();
        el.handle_net_event(NetEvent::Line(b"bob: hey".to_vec()))
            .await
            .unwrap();
        assert_eq!(el.editor.text(), "hi");
    }

    #[tokio::test]
    async fn peer_close_sets_end() {
        let (conn, _server) = loopback().await;
        let mut el = EventLoop::new(conn, None);
        el.handle_net_event(NetEvent::Closed).await.unwrap();
        assert_eq!(el.end, Some(SessionEnd::PeerClosed));
    }

    #[tokio::test]
    async fn incoming_lines_appended_to_transcript() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(tmp.path())
            .await
            .unwrap();

        let (conn, _server) = loopback().await;
        let mut el = EventLoop::new(conn, Some(file));
        el.handle_net_event(NetEvent::Line(b"bob: hey".to_vec()))
            .await
            .unwrap();
        type_line(&mut el, "hi bob").await;

        if let Some(f) = el.transcript.as_mut() {
            f.flush().await.unwrap();
        }
        let contents = std::fs::read_to_string(tmp.path()).unwrap();
        assert_eq!(contents, "bob: hey\nhi bob\n");
    }
}

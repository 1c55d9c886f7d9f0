//! Command-line argument parsing.
//!
//! Usage:
//!   natter <screenname> [<host> [<port>]] [-l <logfile>]

use std::path::PathBuf;

// ── Defaults ──────────────────────────────────────────────────────────────

/// Fallback server endpoint, used when neither positional arguments nor
/// environment variables name one.
pub const DEFAULT_HOST: &str = "10.115.12.240";
pub const DEFAULT_PORT: u16 = 49153;

// ── Public types ──────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug)]
pub struct CliArgs {
    /// Display name sent to the server as the handshake line.
    pub screen_name: String,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Transcript log file (`-l <file>` or `NATTER_LOG`).
    pub transcript: Option<PathBuf>,
}

// ── Parsing ───────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut positional: Vec<String> = Vec::new();
    let mut transcript: Option<PathBuf> = None;
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();
        if arg == "-l" {
            // Separate: -l <file>
            i += 1;
            let file = argv
                .get(i)
                .ok_or_else(|| "-l requires a file argument".to_owned())?;
            transcript = Some(PathBuf::from(file));
        } else if let Some(file) = arg.strip_prefix("-l").filter(|f| !f.is_empty()) {
            // Embedded: -l<file>
            transcript = Some(PathBuf::from(file));
        } else if arg.starts_with('-') && arg != "-" {
            return Err(format!("unknown option: {arg}"));
        } else {
            positional.push(arg.to_owned());
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let screen_name = positional
        .next()
        .ok_or_else(|| "missing screen name".to_owned())?;
    let host_arg = positional.next();
    let port_arg = positional.next();
    if positional.next().is_some() {
        return Err("too many arguments".to_owned());
    }

    let port_arg = match port_arg {
        Some(p) => Some(
            p.parse::<u16>()
                .map_err(|_| format!("invalid port number: {p}"))?,
        ),
        None => None,
    };

    let (host, port) = resolve_endpoint(host_arg, port_arg);
    Ok(CliArgs {
        screen_name,
        host,
        port,
        transcript: transcript.or_else(transcript_from_env),
    })
}

/// The one-line usage summary, printed to standard output on bad
/// arguments.
pub fn usage() -> String {
    "Usage: natter <screenname> [<host> [<port>]] [-l <logfile>]".to_owned()
}

// ── Environment fallbacks ─────────────────────────────────────────────────

/// Endpoint priority: CLI positionals → `NATTER_HOST` / `NATTER_PORT` →
/// compiled-in defaults.
fn resolve_endpoint(host: Option<String>, port: Option<u16>) -> (String, u16) {
    let host = host
        .or_else(|| std::env::var("NATTER_HOST").ok())
        .unwrap_or_else(|| DEFAULT_HOST.to_owned());
    let port = port
        .or_else(|| std::env::var("NATTER_PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(DEFAULT_PORT);
    (host, port)
}

/// `NATTER_LOG` names a transcript file when no `-l` flag is given.
fn transcript_from_env() -> Option<PathBuf> {
    std::env::var("NATTER_LOG").ok().map(PathBuf::from)
}

// ── Tests ─────────────────────────────────────────────────────────────────

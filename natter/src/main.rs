use natter::cli;
use natter::event_loop::{EventLoop, SessionEnd};
use natter::net::Connection;

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            println!("natter: {e}");
            println!("{}", cli::usage());
            std::process::exit(1);
        }
    };

    // Raw mode and in-place redraw make no sense when stdio is not a
    // terminal.
    let is_tty = unsafe {
        libc::isatty(libc::STDIN_FILENO) != 0 && libc::isatty(libc::STDOUT_FILENO) != 0
    };
    if !is_tty {
        eprintln!("natter: stdin and stdout must be a terminal");
        std::process::exit(1);
    }

    let mut conn = match Connection::connect(&args.host, args.port).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("natter: connect {}:{}: {e}", args.host, args.port);
            std::process::exit(1);
        }
    };

    // Handshake: the first line is the display name the server tags our
    // broadcasts with.
    if let Err(e) = conn.send_line(&args.screen_name).await {
        eprintln!("natter: send: {e}");
        std::process::exit(1);
    }

    let transcript = match &args.transcript {
        Some(path) => {
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
            {
                Ok(f) => Some(f),
                Err(e) => {
                    eprintln!("natter: {}: {e}", path.display());
                    std::process::exit(1);
                }
            }
        }
        None => None,
    };

    let mut event_loop = EventLoop::new(conn, transcript);
    match event_loop.run().await {
        Ok(SessionEnd::UserQuit) => {}
        Ok(_) => std::process::exit(1),
        Err(e) => {
            eprintln!("natter: {e}");
            std::process::exit(1);
        }
    }
}

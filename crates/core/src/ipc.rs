//! Line protocol between the runner and the magnifier process.
//!
//! One UTF-8 command per line on the child's stdin: `show`, `hide`, `quit`.
//! Nothing is sent back. An empty line or end of input means `quit`.

use std::io::{self, BufRead, Write};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnifierCommand {
    Show,
    Hide,
    Quit,
}

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("pipe error: {0}")]
    Io(#[from] io::Error),
}

impl MagnifierCommand {
    /// Parse one line, surrounding whitespace ignored
    pub fn parse(line: &str) -> Result<Self, IpcError> {
        match line.trim() {
            "show" => Ok(MagnifierCommand::Show),
            "hide" => Ok(MagnifierCommand::Hide),
            "quit" | "" => Ok(MagnifierCommand::Quit),
            other => Err(IpcError::UnknownCommand(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MagnifierCommand::Show => "show",
            MagnifierCommand::Hide => "hide",
            MagnifierCommand::Quit => "quit",
        }
    }
}

/// Write one command line and flush it through the pipe
pub fn write_command<W: Write>(writer: &mut W, command: MagnifierCommand) -> io::Result<()> {
    writeln!(writer, "{}", command.as_str())?;
    writer.flush()
}

/// Block on `reader` and hand every command to `dispatch`.
///
/// Returns after dispatching `Quit`, which is also sent on end of input or a
/// read error. Unknown lines are logged and skipped. A `dispatch` returning
/// false means the receiving side is gone and ends the reader early.
pub fn read_commands<R, F>(mut reader: R, mut dispatch: F) -> Result<(), IpcError>
where
    R: BufRead,
    F: FnMut(MagnifierCommand) -> bool,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = match reader.read_line(&mut line) {
            Ok(read) => read,
            Err(e) => {
                dispatch(MagnifierCommand::Quit);
                return Err(e.into());
            }
        };
        if read == 0 {
            debug!("Command stream closed");
            dispatch(MagnifierCommand::Quit);
            return Ok(());
        }

        let command = match MagnifierCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring {}", e);
                continue;
            }
        };
        debug!("Received command: {}", command.as_str());

        if !dispatch(command) || command == MagnifierCommand::Quit {
            return Ok(());
        }
    }
}

/// Run [`read_commands`] over this process's stdin on a dedicated thread
pub fn spawn_stdin_reader<F>(dispatch: F) -> io::Result<JoinHandle<()>>
where
    F: FnMut(MagnifierCommand) -> bool + Send + 'static,
{
    thread::Builder::new()
        .name("ipc-reader".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            if let Err(e) = read_commands(stdin.lock(), dispatch) {
                warn!("Command reader stopped: {}", e);
            }
            info!("Command reader finished");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(input: &str) -> Vec<MagnifierCommand> {
        let mut seen = Vec::new();
        read_commands(Cursor::new(input.as_bytes().to_vec()), |cmd| {
            seen.push(cmd);
            true
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(MagnifierCommand::parse("show\n").unwrap(), MagnifierCommand::Show);
        assert_eq!(MagnifierCommand::parse("  hide\r\n").unwrap(), MagnifierCommand::Hide);
        assert_eq!(MagnifierCommand::parse("quit").unwrap(), MagnifierCommand::Quit);
        assert_eq!(MagnifierCommand::parse("\n").unwrap(), MagnifierCommand::Quit);
        assert!(matches!(
            MagnifierCommand::parse("SHOW"),
            Err(IpcError::UnknownCommand(cmd)) if cmd == "SHOW"
        ));
    }

    #[test]
    fn test_reader_stops_at_quit() {
        assert_eq!(
            collect("show\nhide\nquit\nshow\n"),
            vec![MagnifierCommand::Show, MagnifierCommand::Hide, MagnifierCommand::Quit]
        );
    }

    #[test]
    fn test_eof_and_empty_line_mean_quit() {
        assert_eq!(collect("show\n"), vec![MagnifierCommand::Show, MagnifierCommand::Quit]);
        assert_eq!(collect("hide\n\nshow\n"), vec![MagnifierCommand::Hide, MagnifierCommand::Quit]);
    }

    #[test]
    fn test_unknown_lines_skipped() {
        assert_eq!(
            collect("zoom 3\nshow\n"),
            vec![MagnifierCommand::Show, MagnifierCommand::Quit]
        );
    }

    #[test]
    fn test_closed_receiver_ends_reader() {
        let mut calls = 0;
        read_commands(Cursor::new(b"show\nhide\n".to_vec()), |_| {
            calls += 1;
            false
        })
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_write_command_lines() {
        let mut out = Vec::new();
        write_command(&mut out, MagnifierCommand::Show).unwrap();
        write_command(&mut out, MagnifierCommand::Quit).unwrap();
        assert_eq!(out, b"show\nquit\n");
    }
}

//! Terminal input for values missing from the local store.
//!
//! Plain reads go byte-by-byte through stdin so the prompt works the
//! same under pipes and interactive shells; passwords go through
//! `rpassword` with echo disabled and require a real terminal.

use std::io::{self, Read};

/// Read one line of plain text from stdin.
///
/// Reads a byte at a time until a newline. End-of-input before the
/// newline terminates the line and returns whatever was accumulated,
/// so a partial line on EOF is an observable result, not an error.
pub fn read_line() -> io::Result<String> {
    read_line_from(&mut io::stdin().lock())
}

/// Read a password from the controlling terminal with echo disabled.
///
/// Fails with an I/O error when stdin is not an interactive terminal.
pub fn read_secret() -> io::Result<String> {
    rpassword::read_password()
}

fn read_line_from<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut line = String::new();
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            // EOF: the partial line is the result
            Ok(0) => break,
            Ok(_) => {
                if buf[0] == b'\n' {
                    break;
                }
                line.push(buf[0] as char);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(line)
}

//! Response handling
//!
//! Control channel responses are blocks of text: every line ends with
//! `\r\n` and an empty line closes the block, so blank lines inside a body
//! are dropped.

pub const COMMAND_NOT_FOUND: &str = "Command not found.";
pub const COMMAND_TOO_LONG: &str = "Command too long.";

/// Format a response block for the control channel
pub fn format_response(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 4);
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out
}

pub fn greeting(client_ip: &str, data_port: u16) -> String {
    format!("Connected successfully with IP address {client_ip}, data port {data_port}")
}

pub fn directory_changed(path: &std::path::Path) -> String {
    format!("Directory successfully changed to {}", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ends_with_empty_line() {
        assert_eq!(format_response("one\ntwo\n"), "one\r\ntwo\r\n\r\n");
        assert_eq!(format_response(""), "\r\n");
        assert_eq!(format_response("a\n\n b"), "a\r\n b\r\n\r\n");
    }
}

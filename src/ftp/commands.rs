//! Module `commands`
//!
//! Parses FTP control lines into commands and defines the result a handler
//! hands back to the session loop.

/// An FTP command parsed from the client input.
///
/// Commands that take an argument carry it as a `String`. A known command
/// missing its mandatory argument parses as `UNKNOWN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    USER(String),
    PASS(String),
    QUIT,
    SYST,
    NOOP,
    FEAT,
    OPTS(String),
    TYPE(String),
    MODE(String),
    STRU(String),
    PWD,
    CWD(String),
    CDUP,
    LIST(Option<String>),
    NLST(Option<String>),
    RETR(String),
    STOR(String),
    DELE(String),
    MKD(String),
    RMD(String),
    RNFR(String),
    RNTO(String),
    SIZE(String),
    MDTM(String),
    REST(String),
    PASV,
    EPSV,
    PORT(String),
    AUTH(String),
    PBSZ(String),
    PROT(String),
    SITE(String),
    MFMT(String),
    UNKNOWN(String),
}

impl Command {
    /// Commands accepted before login
    pub fn allowed_before_login(&self) -> bool {
        matches!(
            self,
            Command::USER(_)
                | Command::PASS(_)
                | Command::QUIT
                | Command::SYST
                | Command::NOOP
                | Command::FEAT
                | Command::OPTS(_)
                | Command::AUTH(_)
                | Command::PBSZ(_)
                | Command::PROT(_)
        )
    }
}

/// Outcome of one command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
    /// The reply was sent; the control connection switches to TLS next.
    UpgradeTls,
}

#[derive(Debug)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success(code: u16, text: &str) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(format_reply(code, text)),
        }
    }

    pub fn failure(code: u16, text: &str) -> Self {
        Self {
            status: CommandStatus::Failure(text.to_string()),
            message: Some(format_reply(code, text)),
        }
    }

    pub fn with_status(status: CommandStatus, code: u16, text: &str) -> Self {
        Self {
            status,
            message: Some(format_reply(code, text)),
        }
    }

    /// A reply already formatted, e.g. a multi-line one.
    pub fn raw(message: String) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(message),
        }
    }
}

/// Format a single-line FTP reply
pub fn format_reply(code: u16, text: &str) -> String {
    format!("{code} {text}\r\n")
}

/// Parse a raw control line into a [`Command`].
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim_end_matches(['\r', '\n']).trim_start();
    let mut parts = trimmed.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
    // Path arguments may legitimately end with spaces
    let arg = parts.next().unwrap_or("");
    let optional = if arg.trim().is_empty() {
        None
    } else {
        Some(arg.to_string())
    };

    match cmd.as_str() {
        "USER" if !arg.is_empty() => Command::USER(arg.to_string()),
        // Empty passwords are legal
        "PASS" => Command::PASS(arg.to_string()),
        "QUIT" => Command::QUIT,
        "SYST" => Command::SYST,
        "NOOP" => Command::NOOP,
        "FEAT" => Command::FEAT,
        "OPTS" if !arg.is_empty() => Command::OPTS(arg.to_string()),
        "TYPE" if !arg.is_empty() => Command::TYPE(arg.to_string()),
        "MODE" if !arg.is_empty() => Command::MODE(arg.to_string()),
        "STRU" if !arg.is_empty() => Command::STRU(arg.to_string()),
        "PWD" | "XPWD" => Command::PWD,
        "CWD" | "XCWD" if !arg.is_empty() => Command::CWD(arg.to_string()),
        "CDUP" | "XCUP" => Command::CDUP,
        "LIST" => Command::LIST(optional),
        "NLST" => Command::NLST(optional),
        "RETR" if !arg.is_empty() => Command::RETR(arg.to_string()),
        "STOR" if !arg.is_empty() => Command::STOR(arg.to_string()),
        "DELE" if !arg.is_empty() => Command::DELE(arg.to_string()),
        "MKD" | "XMKD" if !arg.is_empty() => Command::MKD(arg.to_string()),
        "RMD" | "XRMD" if !arg.is_empty() => Command::RMD(arg.to_string()),
        "RNFR" if !arg.is_empty() => Command::RNFR(arg.to_string()),
        "RNTO" if !arg.is_empty() => Command::RNTO(arg.to_string()),
        "SIZE" if !arg.is_empty() => Command::SIZE(arg.to_string()),
        "MDTM" if !arg.is_empty() => Command::MDTM(arg.to_string()),
        "REST" if !arg.is_empty() => Command::REST(arg.trim().to_string()),
        "PASV" => Command::PASV,
        "EPSV" => Command::EPSV,
        "PORT" if !arg.is_empty() => Command::PORT(arg.trim().to_string()),
        "AUTH" if !arg.is_empty() => Command::AUTH(arg.trim().to_ascii_uppercase()),
        "PBSZ" if !arg.is_empty() => Command::PBSZ(arg.trim().to_string()),
        "PROT" if !arg.is_empty() => Command::PROT(arg.trim().to_ascii_uppercase()),
        "SITE" if !arg.is_empty() => Command::SITE(arg.to_string()),
        "MFMT" if !arg.is_empty() => Command::MFMT(arg.to_string()),
        _ => Command::UNKNOWN(cmd),
    }
}

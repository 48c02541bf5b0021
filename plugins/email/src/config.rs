use lettre::message::Mailbox;
use pipeliner::module::{ConfigError, ParameterMap};

pub const AUTH_USER: &str = "auth_user";
pub const AUTH_PASSWORD: &str = "auth_password";
pub const SMTP_SERVER: &str = "smtp_server";
pub const FROM: &str = "from";
pub const TO: &str = "to";
pub const SUBJECT: &str = "subject";

pub const DEFAULT_SUBJECT: &str = "pipeline output";

/// Port used when `smtp_server` does not specify one (submission with STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Validated configuration of an email output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub auth_user: String,
    pub auth_password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from: Mailbox,
    pub to: Mailbox,
    pub subject: String,
}

/// The recognized parameters and their default values.
pub fn default_parameters() -> ParameterMap {
    ParameterMap::from([
        (AUTH_USER, ""),
        (AUTH_PASSWORD, ""),
        (SMTP_SERVER, ""),
        (FROM, ""),
        (TO, ""),
        (SUBJECT, DEFAULT_SUBJECT),
    ])
}

impl EmailConfig {
    /// Reads the configuration from the module parameters.
    ///
    /// Parameters are checked in a fixed order, the first missing or invalid one is reported.
    pub fn from_parameters(params: &ParameterMap) -> Result<Self, ConfigError> {
        let auth_user = params.required(AUTH_USER)?.to_owned();
        let auth_password = params.required(AUTH_PASSWORD)?.to_owned();
        let (smtp_host, smtp_port) = parse_server(params.required(SMTP_SERVER)?)?;
        let from = parse_mailbox(FROM, params.required(FROM)?)?;
        let to = parse_mailbox(TO, params.required(TO)?)?;
        let subject = params.optional_or(SUBJECT, DEFAULT_SUBJECT).to_owned();
        Ok(Self {
            auth_user,
            auth_password,
            smtp_host,
            smtp_port,
            from,
            to,
            subject,
        })
    }
}

/// Splits `host[:port]`.
fn parse_server(server: &str) -> Result<(String, u16), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidParameter {
        name: SMTP_SERVER.to_owned(),
        reason,
    };
    let (host, port) = match server.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|e| invalid(format!("bad port {port:?}: {e}")))?;
            (host, port)
        }
        None => (server, DEFAULT_SMTP_PORT),
    };
    if host.is_empty() {
        return Err(invalid(String::from("missing host")));
    }
    Ok((host.to_owned(), port))
}

fn parse_mailbox(name: &str, value: &str) -> Result<Mailbox, ConfigError> {
    value.parse::<Mailbox>().map_err(|e| ConfigError::InvalidParameter {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

//! Attachment configuration.
use std::{borrow::Cow, fmt};

use crate::charset::{self, Charset};

/// Connection parameters for a database or service attachment.
///
/// Parsed from a `key=value;` connection string. Recognized keys and
/// their synonyms:
///
/// - `database`
/// - `datasource`, `data source`, `server`, `host`
/// - `port`
/// - `user`, `user name`, `userid`, `user id`
/// - `password`, `user password`
/// - `dialect`
/// - `charset`
/// - `role`
/// - `packet size`
/// - `timeout`, `connection timeout`
///
/// When no data source key is given, the database value may carry the
/// host itself as `//host:port/path` or `host/port:path`.
#[derive(Clone, Debug)]
pub struct AttachParams {
    pub(crate) user: String,
    pub(crate) pass: String,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) database: String,
    pub(crate) dialect: i32,
    pub(crate) role: String,
    pub(crate) charset: &'static Charset,
    pub(crate) packet_size: i32,
    pub(crate) timeout: u32,
}

impl Default for AttachParams {
    fn default() -> Self {
        Self {
            user: String::new(),
            pass: String::new(),
            host: "localhost".into(),
            port: 3050,
            database: String::new(),
            dialect: 3,
            role: String::new(),
            charset: &charset::NONE,
            packet_size: 8192,
            timeout: 15,
        }
    }
}

macro_rules! invalid {
    ($($tt:tt)*) => {
        return Err(ParseError { reason: format!($($tt)*).into() })
    };
}

impl AttachParams {
    /// Parse a `key=value;` connection string.
    pub fn parse(connection_string: &str) -> Result<AttachParams, ParseError> {
        let mut me = AttachParams::default();
        let mut host_set = false;

        for element in connection_string.split(';') {
            let Some((key, value)) = element.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim().to_ascii_lowercase().as_str() {
                "database" => me.database = value.into(),
                "datasource" | "data source" | "server" | "host" => {
                    host_set = true;
                    me.host = value.into();
                }
                "user" | "user name" | "userid" | "user id" => me.user = value.into(),
                "password" | "user password" => me.pass = value.into(),
                "port" => match value.parse() {
                    Ok(port) => me.port = port,
                    Err(_) => invalid!("invalid port: {value}"),
                },
                "dialect" => match value.parse() {
                    Ok(dialect) => me.dialect = dialect,
                    Err(_) => invalid!("invalid dialect: {value}"),
                },
                "charset" => match charset::by_name(value) {
                    Some(charset) => me.charset = charset,
                    None => invalid!("unknown charset: {value}"),
                },
                "role" => me.role = value.into(),
                "packet size" => match value.parse() {
                    Ok(size) => me.packet_size = size,
                    Err(_) => invalid!("invalid packet size: {value}"),
                },
                "timeout" | "connection timeout" => match value.parse() {
                    Ok(timeout) => me.timeout = timeout,
                    Err(_) => invalid!("invalid timeout: {value}"),
                },
                // other keys are accepted and ignored
                _ => {}
            }
        }

        if !host_set {
            me.split_connect_info()?;
        }

        if me.database.is_empty() {
            invalid!("database missing");
        }
        if me.host.is_empty() || me.port == 0 {
            invalid!("data source missing");
        }
        if !(1..=3).contains(&me.dialect) {
            invalid!("dialect should be 1, 2 or 3, got {}", me.dialect);
        }
        if !(512..=32767).contains(&me.packet_size) {
            invalid!("packet size should be between 512 and 32767, got {}", me.packet_size);
        }

        Ok(me)
    }

    /// Split a database value of the form `//host:port/path` or
    /// `host/port:path` into host, port and path.
    fn split_connect_info(&mut self) -> Result<(), ParseError> {
        let info = self.database.trim().to_owned();
        let (rest, host_sep, port_sep) = match info.strip_prefix("//") {
            Some(rest) => (rest, '/', ':'),
            None => (info.as_str(), ':', '/'),
        };

        let Some((source, database)) = rest.split_once(host_sep) else {
            return Ok(());
        };
        if source.is_empty() || database.is_empty() {
            invalid!("malformed database path: {info}");
        }

        let host = match source.split_once(port_sep) {
            Some((host, port)) => {
                if host.is_empty() || port.is_empty() {
                    invalid!("malformed database path: {info}");
                }
                let Ok(port) = port.parse() else {
                    invalid!("invalid port: {port}");
                };
                self.port = port;
                host
            }
            None => source,
        };

        self.host = host.to_owned();
        self.database = database.to_owned();
        Ok(())
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, pass: impl Into<String>) -> Self {
        self.pass = pass.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn charset(&self) -> &'static Charset {
        self.charset
    }

    pub fn packet_size(&self) -> i32 {
        self.packet_size
    }
}

impl std::str::FromStr for AttachParams {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error when parsing a connection string.
pub struct ParseError {
    pub(crate) reason: Cow<'static, str>,
}

impl std::error::Error for ParseError { }

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return f.write_str(&self.reason)
        }
        write!(f, "failed to parse connection string: {}", self.reason)
    }
}

impl fmt::Debug for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_key_values() {
        let p = AttachParams::parse(
            "User=SYSDBA;Password=masterkey;Server=db.example.com;Port=3051;\
             Database=/srv/data/emp.fdb;Charset=UTF8;Dialect=3;Packet Size=16384",
        )
        .unwrap();
        assert_eq!(p.user, "SYSDBA");
        assert_eq!(p.pass, "masterkey");
        assert_eq!(p.host, "db.example.com");
        assert_eq!(p.port, 3051);
        assert_eq!(p.database, "/srv/data/emp.fdb");
        assert_eq!(p.charset.name, "UTF8");
        assert_eq!(p.packet_size, 16384);
    }

    #[test]
    fn synonyms() {
        let p = AttachParams::parse(
            "user id=u;user password=p;data source=h;database=d.fdb;connection timeout=30",
        )
        .unwrap();
        assert_eq!(p.user, "u");
        assert_eq!(p.pass, "p");
        assert_eq!(p.host, "h");
        assert_eq!(p.timeout, 30);
    }

    #[test]
    fn host_inside_database_path() {
        let p = AttachParams::parse("user=u;password=p;database=//db.example.com:3051/emp.fdb")
            .unwrap();
        assert_eq!(p.host, "db.example.com");
        assert_eq!(p.port, 3051);
        assert_eq!(p.database, "emp.fdb");

        let p = AttachParams::parse("user=u;password=p;database=dbhost/3052:C:\\emp.fdb").unwrap();
        assert_eq!(p.host, "dbhost");
        assert_eq!(p.port, 3052);
        assert_eq!(p.database, "C:\\emp.fdb");

        let p = AttachParams::parse("user=u;password=p;database=dbhost:/srv/emp.fdb").unwrap();
        assert_eq!(p.host, "dbhost");
        assert_eq!(p.port, 3050);
        assert_eq!(p.database, "/srv/emp.fdb");
    }

    #[test]
    fn bounds() {
        assert!(AttachParams::parse("user=u;password=p;database=d;dialect=4").is_err());
        assert!(AttachParams::parse("user=u;password=p;database=d;packet size=256").is_err());
        assert!(AttachParams::parse("user=u;password=p;database=d;charset=bogus").is_err());
        assert!(AttachParams::parse("user=u;password=p").is_err());
    }
}

//! Error message templates for the ISC codes this crate surfaces.
//!
//! Templates use positional `{n}` placeholders filled from status vector
//! string and number arguments, matching the server message file layout.

use super::*;

static MESSAGES: &[(i32, &str)] = &[
    (ISC_ARITH_EXCEPT, "arithmetic exception, numeric overflow, or string truncation"),
    (ISC_OPEN_TRANS, "cannot disconnect database with open transactions ({0} active)"),
    (ISC_SEGMENT, "segment buffer length shorter than expected"),
    (ISC_SEGSTR_EOF, "attempted retrieval of more segments than exist"),
    (ISC_CONNECT_REJECT, "connection rejected by remote interface"),
    (ISC_INVALID_DIMENSION, "column not array or incorrect dimensions (expected {0}, encountered {1})"),
    (ISC_TRA_STATE, "transaction {0} is {1}"),
    (ISC_DSQL_SQLDA_ERR, "SQLDA error"),
    (ISC_NETWORK_ERROR, "Unable to complete network request to host \"{0}\"."),
    (ISC_NET_READ_ERR, "Error reading data from the connection."),
    (ISC_NET_WRITE_ERR, "Error writing data to the connection."),
];

/// Look up the message template for an ISC error code.
pub fn template(code: i32) -> Option<&'static str> {
    MESSAGES.iter().find(|(c, _)| *c == code).map(|(_, m)| *m)
}

/// Render the message for `code`, substituting `{n}` placeholders from
/// `args` in order. Unknown codes render as `unknown ISC error <code>`.
pub fn format(code: i32, args: &[String]) -> String {
    let Some(template) = template(code) else {
        return std::format!("unknown ISC error {code}");
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        match rest.find('}') {
            Some(close) if rest[..close].bytes().all(|b| b.is_ascii_digit()) => {
                let idx: usize = rest[..close].parse().unwrap_or(0);
                match args.get(idx) {
                    Some(arg) => out.push_str(arg),
                    None => {
                        out.push('{');
                        out.push_str(&rest[..close]);
                        out.push('}');
                    }
                }
                rest = &rest[close + 1..];
            }
            _ => out.push('{'),
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn positional_substitution() {
        let msg = format(ISC_TRA_STATE, &["1401".into(), "no valid".into()]);
        assert_eq!(msg, "transaction 1401 is no valid");
    }

    #[test]
    fn missing_argument_keeps_placeholder() {
        let msg = format(ISC_OPEN_TRANS, &[]);
        assert_eq!(msg, "cannot disconnect database with open transactions ({0} active)");
    }

    #[test]
    fn unknown_code() {
        assert_eq!(format(1, &[]), "unknown ISC error 1");
    }
}

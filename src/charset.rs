//! Character set registry.
//!
//! The table is fixed at compile time. The describe reply carries the
//! charset id in the low byte of a text column subtype, and the per
//! character width drives the character count of fixed length columns.

/// One character set known to the server.
#[derive(Debug, PartialEq, Eq)]
pub struct Charset {
    pub id: u8,
    pub name: &'static str,
    pub bytes_per_char: u8,
}

pub static NONE: Charset = Charset { id: 0, name: "NONE", bytes_per_char: 1 };

static CHARSETS: &[Charset] = &[
    Charset { id: 0, name: "NONE", bytes_per_char: 1 },
    Charset { id: 1, name: "OCTETS", bytes_per_char: 1 },
    Charset { id: 2, name: "ASCII", bytes_per_char: 1 },
    Charset { id: 3, name: "UNICODE_FSS", bytes_per_char: 3 },
    Charset { id: 4, name: "UTF8", bytes_per_char: 4 },
    Charset { id: 5, name: "SJIS_0208", bytes_per_char: 2 },
    Charset { id: 6, name: "EUCJ_0208", bytes_per_char: 2 },
    Charset { id: 10, name: "DOS437", bytes_per_char: 1 },
    Charset { id: 11, name: "DOS850", bytes_per_char: 1 },
    Charset { id: 12, name: "DOS865", bytes_per_char: 1 },
    Charset { id: 21, name: "ISO8859_1", bytes_per_char: 1 },
    Charset { id: 22, name: "ISO8859_2", bytes_per_char: 1 },
    Charset { id: 44, name: "KSC_5601", bytes_per_char: 2 },
    Charset { id: 51, name: "WIN1250", bytes_per_char: 1 },
    Charset { id: 52, name: "WIN1251", bytes_per_char: 1 },
    Charset { id: 53, name: "WIN1252", bytes_per_char: 1 },
    Charset { id: 54, name: "WIN1253", bytes_per_char: 1 },
    Charset { id: 55, name: "WIN1254", bytes_per_char: 1 },
    Charset { id: 56, name: "BIG_5", bytes_per_char: 2 },
    Charset { id: 57, name: "GB_2312", bytes_per_char: 2 },
    Charset { id: 58, name: "WIN1255", bytes_per_char: 1 },
    Charset { id: 59, name: "WIN1256", bytes_per_char: 1 },
    Charset { id: 60, name: "WIN1257", bytes_per_char: 1 },
];

/// Look up by server id. Unknown ids fall back to [`NONE`] so that
/// columns from servers with exotic collations still decode.
pub fn by_id(id: u8) -> &'static Charset {
    CHARSETS.iter().find(|c| c.id == id).unwrap_or(&NONE)
}

/// Look up by name, case insensitive.
pub fn by_name(name: &str) -> Option<&'static Charset> {
    CHARSETS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

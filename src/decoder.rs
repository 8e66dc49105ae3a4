//! Tabular decoding of uploaded spreadsheet exports.
//!
//! Raw bytes flow through here before anything else touches them:
//!
//! - **Encoding**: bytes are decoded through `encoding_rs` (UTF-8 unless a
//!   label is supplied). Undecodable sequences are replaced, never fatal.
//! - **BOM**: a leading byte-order mark is stripped before the header line is
//!   inspected.
//! - **Delimiter detection**: `;` wins unless commas strictly outnumber
//!   semicolons in the header line.
//! - **Row splitting**: text is cut into lines first. A quoted field may
//!   carry a line break only when its closing quote turns up later in the
//!   input; an unclosed quote damages its own line and nothing after it.
//!   Each logical row then goes through the `csv` reader in flexible mode,
//!   so ragged rows, stray quotes and quoted delimiters degrade to
//!   best-effort field boundaries. Every field is trimmed and blank rows are
//!   discarded.

use anyhow::{Result, anyhow};
use csv::Trim;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};

pub const SEMICOLON: u8 = b';';
pub const COMMA: u8 = b',';

const BOM: char = '\u{feff}';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Decodes `bytes` to text, replacing malformed sequences and dropping a leading BOM.
pub fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(
            "Input contained byte sequences invalid for {}; they were replaced",
            encoding.name()
        );
    }
    strip_bom(&text).to_string()
}

pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix(BOM).unwrap_or(text)
}

/// Picks `;` unless commas strictly outnumber semicolons in `header_line`.
pub fn detect_delimiter(header_line: &str) -> u8 {
    let semicolons = header_line.matches(';').count();
    let commas = header_line.matches(',').count();
    if commas > semicolons { COMMA } else { SEMICOLON }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRow {
    /// 1-based line of the source text where the row starts.
    pub line: usize,
    pub fields: Vec<String>,
}

impl DecodedRow {
    pub fn field(&self, idx: usize) -> &str {
        self.fields.get(idx).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct DecodedTable {
    pub delimiter: u8,
    pub header: Vec<String>,
    pub rows: Vec<DecodedRow>,
}

impl DecodedTable {
    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }
}

pub fn open_table_reader(text: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .trim(Trim::All)
        .flexible(true);
    builder.from_reader(text.as_bytes())
}

/// Reports whether `line` ends inside a quoted field when scanning starts
/// in the `in_quotes` state. A quote only opens a field as its first
/// character; inside quotes `""` is an escaped quote.
fn ends_in_quotes(line: &str, delimiter: u8, mut in_quotes: bool) -> bool {
    let bytes = line.as_bytes();
    let mut field_start = !in_quotes;
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        if in_quotes {
            if byte == b'"' {
                if bytes.get(idx + 1) == Some(&b'"') {
                    idx += 1;
                } else {
                    in_quotes = false;
                }
            }
        } else if byte == delimiter {
            field_start = true;
        } else {
            in_quotes = field_start && byte == b'"';
            field_start = false;
        }
        idx += 1;
    }
    in_quotes
}

/// Groups physical lines into logical records, paired with their 1-based
/// starting line. A quoted field may span lines only when its closing quote
/// appears before the end of input; otherwise the opening line stands alone.
fn logical_records(text: &str, delimiter: u8) -> Vec<(usize, String)> {
    let lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect::<Vec<_>>();
    let mut records = Vec::new();
    let mut start = 0;
    while start < lines.len() {
        let mut end = start;
        let mut open = ends_in_quotes(lines[start], delimiter, false);
        while open && end + 1 < lines.len() {
            end += 1;
            open = ends_in_quotes(lines[end], delimiter, true);
        }
        if open {
            warn!(
                "Line {}: quote is never closed; reading the line on its own",
                start + 1
            );
            end = start;
        }
        records.push((start + 1, lines[start..=end].join("\n")));
        start = end + 1;
    }
    records
}

/// Splits decoded text into a header row and data rows.
pub fn decode_table(text: &str) -> DecodedTable {
    let text = strip_bom(text);
    let header_line = text
        .lines()
        .map(|line| line.strip_prefix(BOM).unwrap_or(line))
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");
    let delimiter = detect_delimiter(header_line);
    debug!(
        "Detected delimiter '{}' from header line",
        crate::printable_delimiter(delimiter)
    );

    let mut header: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for (line, record_text) in logical_records(text, delimiter) {
        let mut reader = open_table_reader(&record_text, delimiter);
        for record in reader.byte_records() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    warn!("Line {line}: skipping unreadable row: {err}");
                    continue;
                }
            };
            let fields = record
                .iter()
                .map(|field| String::from_utf8_lossy(field).trim().to_string())
                .collect::<Vec<_>>();
            if fields.iter().all(|field| field.is_empty()) {
                continue;
            }
            if header.is_none() {
                header = Some(fields);
            } else {
                rows.push(DecodedRow { line, fields });
            }
        }
    }

    DecodedTable {
        delimiter,
        header: header.unwrap_or_default(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_delimiter_prefers_semicolon_on_tie() {
        assert_eq!(detect_delimiter("a;b,c"), SEMICOLON);
        assert_eq!(detect_delimiter("abc"), SEMICOLON);
        assert_eq!(detect_delimiter("a,b,c;d"), COMMA);
    }

    #[test]
    fn decode_table_strips_bom_and_blank_lines() {
        let table = decode_table("\u{feff}City;Map number\r\n\r\nSpringfield;5\r\n   \nShelbyville;6\n");
        assert_eq!(table.delimiter, SEMICOLON);
        assert_eq!(table.header, vec!["City", "Map number"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].fields, vec!["Springfield", "5"]);
        assert_eq!(table.rows[0].line, 3);
        assert_eq!(table.rows[1].field(0), "Shelbyville");
    }

    #[test]
    fn quoted_fields_keep_delimiters_and_doubled_quotes() {
        let table = decode_table("a,b,c\n\"x, y\",\"say \"\"hi\"\"\",  z  \n");
        assert_eq!(table.delimiter, COMMA);
        assert_eq!(table.rows[0].fields, vec!["x, y", "say \"hi\"", "z"]);
    }

    #[test]
    fn quoted_newline_stays_in_one_field() {
        let table = decode_table("a;b\n\"line one\r\nline two\";2\nnext;3\n");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].field(0), "line one\nline two");
        assert_eq!(table.rows[0].field(1), "2");
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].field(0), "next");
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn unclosed_leading_quote_only_damages_its_own_line() {
        let table = decode_table(
            "Cidade;Número do Mapa;Endereço\n\
             Springfield;1;\"Elm Street\n\
             Springfield;1;Oak Avenue\n\
             Springfield;2;Maple Road\n\
             Shelbyville;3;Main Street\n",
        );
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[0].field(2), "Elm Street");
        assert_eq!(table.rows[1].fields, vec!["Springfield", "1", "Oak Avenue"]);
        assert_eq!(table.rows[3].field(0), "Shelbyville");
        assert_eq!(
            table.rows.iter().map(|row| row.line).collect::<Vec<_>>(),
            vec![2, 3, 4, 5]
        );
    }

    #[test]
    fn ragged_rows_and_stray_quotes_do_not_fail() {
        let table = decode_table("a;b;c\n1\n2;3;4;5\nfoo\"bar;baz\n\"open;x\nlast;row\n");
        assert_eq!(table.rows.len(), 5);
        assert_eq!(table.rows[0].field(2), "");
        assert_eq!(table.rows[1].fields.len(), 4);
        assert!(table.rows[2].field(0).starts_with("foo"));
        assert!(table.rows[3].field(0).starts_with("open"));
        assert_eq!(table.rows[4].fields, vec!["last", "row"]);
    }

    #[test]
    fn quote_state_tracks_field_starts_and_escapes() {
        assert!(ends_in_quotes("a;\"open", SEMICOLON, false));
        assert!(!ends_in_quotes("a;\"closed\";b", SEMICOLON, false));
        assert!(!ends_in_quotes("a;mid\"quote", SEMICOLON, false));
        assert!(ends_in_quotes("say \"\"hi\"\" more", SEMICOLON, true));
        assert!(!ends_in_quotes("end\";b", SEMICOLON, true));
    }

    #[test]
    fn empty_input_yields_empty_table() {
        let table = decode_table("\n\n");
        assert!(table.is_empty());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn decode_text_replaces_invalid_utf8() {
        let text = decode_text(b"\xEF\xBB\xBFCity;\xFF\n", UTF_8);
        assert!(text.starts_with("City;"));
        assert!(text.contains('\u{fffd}'));
    }

    #[test]
    fn resolve_encoding_rejects_unknown_label() {
        assert!(resolve_encoding(Some("latin1")).is_ok());
        assert!(resolve_encoding(Some("not-an-encoding")).is_err());
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
    }
}

//! Minimal CIF reader and writer for the `_axis` category
//!
//! The reader understands what imgCIF geometry files are made of: comments, `data_`
//! blocks, single items, `loop_` tables, quoted strings and semicolon text fields.
//! Save frames and global blocks are skipped.

use std::{fmt::Display, fs, io, path::Path};

use strum::IntoEnumIterator;

use crate::{
    axis::{AxisRecord, Equipment},
    graph::AxisGraph,
    table::{self, AxisRow, TableError},
};

#[derive(Debug, thiserror::Error)]
pub enum CifError {
    #[error("failed to read {0}")]
    Read(String, #[source] io::Error),
    #[error("line {0}: unterminated text field")]
    UnterminatedText(usize),
    #[error("line {0}: unterminated quoted string")]
    UnterminatedQuote(usize),
    #[error("line {0}: {1} found before any data block")]
    NoDataBlock(usize, String),
    #[error("line {0}: loop_ without tags")]
    EmptyLoop(usize),
    #[error("line {line}: loop of {tags} tags holds {values} values")]
    LoopValues {
        line: usize,
        tags: usize,
        values: usize,
    },
    #[error("line {0}: tag {1} has no value")]
    MissingValue(usize, String),
    #[error("row {row} has {len} values, expected {expected}")]
    RowLength {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("data block {0}")]
    Table(String, #[source] TableError),
}
type Result<T> = std::result::Result<T, CifError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    DataBlock(String),
    Loop,
    Tag(String),
    Value(CifValue),
    Reserved,
}
impl Token {
    fn bare(word: &str) -> Self {
        let lower = word.to_lowercase();
        if lower.starts_with("data_") {
            Token::DataBlock(word[5..].to_string())
        } else if lower == "loop_" {
            Token::Loop
        } else if lower.starts_with("save_") || lower == "global_" || lower == "stop_" {
            Token::Reserved
        } else if word.starts_with('_') {
            Token::Tag(word.to_string())
        } else {
            Token::Value(CifValue::bare(word))
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut lines = text.lines().enumerate();
    while let Some((n, line)) = lines.next() {
        let line_no = n + 1;
        if let Some(first) = line.strip_prefix(';') {
            let mut value = first.to_string();
            loop {
                match lines.next() {
                    Some((_, l)) if l.starts_with(';') => break,
                    Some((_, l)) => {
                        value.push('\n');
                        value.push_str(l);
                    }
                    None => return Err(CifError::UnterminatedText(line_no)),
                }
            }
            tokens.push((line_no, Token::Value(CifValue::quoted(value))));
            continue;
        }
        let mut rest = line;
        loop {
            rest = rest.trim_start();
            if rest.is_empty() || rest.starts_with('#') {
                break;
            }
            let (token, tail) = match rest.chars().next() {
                Some(q @ ('\'' | '"')) => {
                    let body = &rest[1..];
                    // a quote only closes the string if followed by a blank
                    let end = body
                        .char_indices()
                        .find(|&(i, c)| {
                            c == q
                                && body[i + 1..]
                                    .chars()
                                    .next()
                                    .map_or(true, char::is_whitespace)
                        })
                        .map(|(i, _)| i)
                        .ok_or(CifError::UnterminatedQuote(line_no))?;
                    (Token::Value(CifValue::quoted(&body[..end])), &body[end + 1..])
                }
                _ => {
                    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                    (Token::bare(&rest[..end]), &rest[end..])
                }
            };
            tokens.push((line_no, token));
            rest = tail;
        }
    }
    Ok(tokens)
}

/// A CIF value, quoted values and text fields never being the `?` or `.` null markers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CifValue {
    pub text: String,
    pub quoted: bool,
}
impl CifValue {
    fn bare(text: &str) -> Self {
        Self {
            text: text.to_string(),
            quoted: false,
        }
    }
    fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }
    /// Copies the value into the `column` of an axis row
    fn set_into(&self, row: &mut AxisRow, column: &str) -> bool {
        if self.quoted {
            row.set_quoted(column, self.text.as_str())
        } else {
            row.set(column, self.text.as_str())
        }
    }
}

/// A `loop_` table, values stored row after row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CifLoop {
    pub tags: Vec<String>,
    values: Vec<CifValue>,
}
impl CifLoop {
    pub fn rows(&self) -> impl Iterator<Item = &[CifValue]> {
        self.values.chunks(self.tags.len().max(1))
    }
    pub fn len(&self) -> usize {
        self.values.len() / self.tags.len().max(1)
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The content of a `data_` block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataBlock {
    pub name: String,
    items: Vec<(String, CifValue)>,
    loops: Vec<CifLoop>,
}
impl DataBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    /// Value of a single item, tags are case-insensitive
    pub fn item(&self, tag: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(tag))
            .map(|(_, v)| v.text.as_str())
    }
    /// The loop holding `tag`
    pub fn find_loop(&self, tag: &str) -> Option<&CifLoop> {
        self.loops
            .iter()
            .find(|l| l.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
    }
    pub fn loops(&self) -> impl Iterator<Item = &CifLoop> {
        self.loops.iter()
    }
    /// Rows of the `_axis` table, looped or not
    pub fn axis_rows(&self) -> Vec<AxisRow> {
        let looped = self
            .loops
            .iter()
            .find(|l| l.tags.iter().any(|t| axis_column(t).is_some()));
        match looped {
            Some(axis_loop) => axis_loop
                .rows()
                .map(|values| {
                    let mut row = AxisRow::default();
                    for (tag, value) in axis_loop.tags.iter().zip(values) {
                        if let Some(column) = axis_column(tag) {
                            value.set_into(&mut row, &column);
                        }
                    }
                    row
                })
                .collect(),
            None => {
                let mut row = AxisRow::default();
                let mut found = false;
                for (tag, value) in self.items.iter() {
                    if let Some(column) = axis_column(tag) {
                        found |= value.set_into(&mut row, &column);
                    }
                }
                if found {
                    vec![row]
                } else {
                    vec![]
                }
            }
        }
    }
    pub fn axis_records(&self) -> Result<Vec<AxisRecord>> {
        table::into_records(self.axis_rows()).map_err(|e| CifError::Table(self.name.clone(), e))
    }
}

/// `_axis.vector[1]` and `_axis_vector[1]` both give `vector[1]`
fn axis_column(tag: &str) -> Option<String> {
    let lower = tag.to_lowercase();
    lower
        .strip_prefix("_axis.")
        .or_else(|| lower.strip_prefix("_axis_"))
        .map(|column| column.to_string())
}

/// Parses CIF text into its data blocks
pub fn parse(text: &str) -> Result<Vec<DataBlock>> {
    let mut blocks: Vec<DataBlock> = Vec::new();
    let mut tokens = tokenize(text)?.into_iter().peekable();
    while let Some((line, token)) = tokens.next() {
        match token {
            Token::DataBlock(name) => blocks.push(DataBlock::new(name)),
            Token::Reserved => (),
            Token::Loop => {
                let block = blocks
                    .last_mut()
                    .ok_or_else(|| CifError::NoDataBlock(line, "loop_".into()))?;
                let mut tags = Vec::new();
                while let Some((_, Token::Tag(tag))) =
                    tokens.next_if(|(_, t)| matches!(t, Token::Tag(_)))
                {
                    tags.push(tag);
                }
                let mut values = Vec::new();
                while let Some((_, Token::Value(value))) =
                    tokens.next_if(|(_, t)| matches!(t, Token::Value(_)))
                {
                    values.push(value);
                }
                if tags.is_empty() {
                    return Err(CifError::EmptyLoop(line));
                }
                if values.len() % tags.len() != 0 {
                    return Err(CifError::LoopValues {
                        line,
                        tags: tags.len(),
                        values: values.len(),
                    });
                }
                block.loops.push(CifLoop { tags, values });
            }
            Token::Tag(tag) => {
                let block = blocks
                    .last_mut()
                    .ok_or_else(|| CifError::NoDataBlock(line, tag.clone()))?;
                match tokens.next_if(|(_, t)| matches!(t, Token::Value(_))) {
                    Some((_, Token::Value(value))) => block.items.push((tag, value)),
                    _ => return Err(CifError::MissingValue(line, tag)),
                }
            }
            Token::Value(value) => {
                log::warn!("line {}: skipping stray value {}", line, value.text)
            }
        }
    }
    log::debug!("parsed {} data block(s)", blocks.len());
    Ok(blocks)
}

/// Reads and parses a CIF file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<DataBlock>> {
    let path = path.as_ref();
    log::info!("Loading {:?}...", path);
    let text = fs::read_to_string(path)
        .map_err(|e| CifError::Read(path.display().to_string(), e))?;
    parse(&text)
}

/// Quotes a value if it would not read back as a single bare CIF value
fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.chars().any(char::is_whitespace)
        || value.starts_with(&['_', '#', '$', '\'', '"', '[', ']', ';'][..])
        || value.to_lowercase().starts_with("data_")
        || value.eq_ignore_ascii_case("loop_");
    if !needs_quotes {
        value.to_string()
    } else if value.contains('\'') {
        format!("\"{}\"", value)
    } else {
        format!("'{}'", value)
    }
}

/// Assembles a `loop_` table ready to be written to a CIF file
pub fn cif_loop<F, V>(category: &str, fields: &[F], rows: &[Vec<V>]) -> Result<String>
where
    F: Display,
    V: Display,
{
    for (i, row) in rows.iter().enumerate() {
        if row.len() != fields.len() {
            return Err(CifError::RowLength {
                row: i + 1,
                len: row.len(),
                expected: fields.len(),
            });
        }
    }
    let mut lines = vec!["loop_".to_string()];
    lines.extend(fields.iter().map(|f| format!(" {}.{}", category, f)));
    lines.push(String::new());
    lines.extend(rows.iter().map(|row| {
        let values: Vec<String> = row.iter().map(|v| quote(&v.to_string())).collect();
        format!("  {}", values.join("\t"))
    }));
    lines.extend([String::new(), String::new()]);
    Ok(lines.join("\n"))
}

/// The `_axis` loop of a validated graph, chain after chain
pub fn write_axes(graph: &AxisGraph) -> Result<String> {
    let rows: Vec<Vec<String>> = Equipment::iter()
        .flat_map(|equipment| graph.chain_from_root(equipment))
        .map(|record| {
            AxisRow::from(record)
                .values()
                .iter()
                .map(|v| v.to_string())
                .collect()
        })
        .collect();
    cif_loop("_axis", &AxisRow::FIELDS, &rows)
}

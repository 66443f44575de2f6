use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use super::models::Record;

/// Destination for emitted records.
pub trait RecordSink: Send {
    fn emit(&mut self, record: &Record) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: RecordSink + ?Sized> RecordSink for &mut T {
    fn emit(&mut self, record: &Record) -> io::Result<()> {
        (**self).emit(record)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `insert into ... values (...)` statements.
    #[default]
    Sql,
    /// `group: id, name` / `user: id, name, groupId, roomRef` lines.
    Text,
    /// One JSON object per line.
    Jsonl,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(OutputFormat::Sql),
            "text" | "txt" => Ok(OutputFormat::Text),
            "jsonl" | "ndjson" | "json" => Ok(OutputFormat::Jsonl),
            other => Err(format!("unknown output format {other:?} (expected sql, text or jsonl)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Sql => "sql",
            OutputFormat::Text => "text",
            OutputFormat::Jsonl => "jsonl",
        })
    }
}

/// Writes one line per record to any `Write`.
pub struct WriterSink<W: Write + Send> {
    out: W,
    format: OutputFormat,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> RecordSink for WriterSink<W> {
    fn emit(&mut self, record: &Record) -> io::Result<()> {
        match self.format {
            OutputFormat::Sql => writeln!(self.out, "{}", sql_statement(record)),
            OutputFormat::Text => writeln!(self.out, "{}", text_line(record)),
            OutputFormat::Jsonl => {
                serde_json::to_writer(&mut self.out, record)?;
                self.out.write_all(b"\n")
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<Record>,
}

impl RecordSink for MemorySink {
    fn emit(&mut self, record: &Record) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Ids and room refs stay bare, names are quoted.
pub fn sql_statement(record: &Record) -> String {
    match record {
        Record::Group { id, name } => {
            format!("insert into game values ({}, '{}');", id, sql_escape(name))
        }
        Record::User {
            id,
            name,
            group_id,
            room,
        } => format!(
            "insert into user values ({}, '{}', {}, {});",
            id,
            sql_escape(name),
            group_id,
            room
        ),
    }
}

pub fn text_line(record: &Record) -> String {
    match record {
        Record::Group { id, name } => format!("group: {id}, {name}"),
        Record::User {
            id,
            name,
            group_id,
            room,
        } => format!("user: {id}, {name}, {group_id}, {room}"),
    }
}

fn sql_escape(s: &str) -> String {
    s.replace('\'', "''")
}

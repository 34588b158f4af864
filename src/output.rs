//! Rendering of search results
//!
//! Records go to one writer (stdout in the binary) and notices to another
//! (stderr), so JSON output stays machine readable.

use clap::ValueEnum;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::io::{self, Write};

use crate::directory::{AttributeMap, Record};
use crate::search::{Notice, RecordSink};

/// Output format selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// DN followed by indented YAML attributes
    Plain,
    /// Pretty printed JSON array
    Json,
    /// Single-line JSON array
    #[value(name = "json_tiny")]
    JsonTiny,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    attributes: &'a AttributeMap,
    dn: &'a str,
}

/// Writes records and notices in the chosen format
pub struct OutputSink<W: Write, E: Write> {
    format: OutputFormat,
    out: W,
    err: E,
    written: usize,
}

impl<W: Write, E: Write> OutputSink<W, E> {
    pub fn new(format: OutputFormat, out: W, err: E) -> Self {
        Self {
            format,
            out,
            err,
            written: 0,
        }
    }

    /// Closes the JSON array if one was opened and flushes the output
    pub fn finish(&mut self) -> io::Result<()> {
        if self.written > 0 && self.format != OutputFormat::Plain {
            write!(self.out, "]")?;
        }
        self.out.flush()
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }

    fn write_plain(&mut self, record: &Record) -> io::Result<()> {
        writeln!(self.out, "{}", record.dn)?;
        if record.attributes.is_empty() {
            return Ok(());
        }

        match serde_yaml::to_string(&record.attributes) {
            Ok(yaml) => {
                for line in yaml.lines() {
                    writeln!(self.out, "  {}", unlist_line(line))?;
                }
            }
            Err(_) => writeln!(self.out, "Character Encoding Error.")?,
        }
        Ok(())
    }

    fn write_json(&mut self, record: &Record, pretty: bool) -> io::Result<()> {
        write!(self.out, "{}", if self.written == 0 { "[" } else { "," })?;

        let value = JsonRecord {
            attributes: &record.attributes,
            dn: &record.dn,
        };

        if pretty {
            let mut serializer =
                serde_json::Serializer::with_formatter(&mut self.out, PrettyFormatter::with_indent(b"    "));
            value.serialize(&mut serializer).map_err(io::Error::from)?;
            writeln!(self.out)?;
        } else {
            serde_json::to_writer(&mut self.out, &value).map_err(io::Error::from)?;
        }
        Ok(())
    }
}

/// Replaces a YAML sequence dash with indentation (`- a` becomes `  a`)
fn unlist_line(line: &str) -> String {
    let indent = line.len() - line.trim_start().len();
    match line[indent..].strip_prefix('-') {
        Some(rest) => format!("{} {}", &line[..indent], rest),
        None => line.to_string(),
    }
}

impl<W: Write, E: Write> RecordSink for OutputSink<W, E> {
    fn record(&mut self, record: &Record) -> io::Result<()> {
        match self.format {
            OutputFormat::Plain => self.write_plain(record)?,
            OutputFormat::Json => self.write_json(record, true)?,
            OutputFormat::JsonTiny => self.write_json(record, false)?,
        }
        self.written += 1;
        Ok(())
    }

    fn notice(&mut self, notice: &Notice) {
        let message = match notice {
            Notice::CapReached { limit } => format!(
                "NOTICE: Search returned at least as many records as the maximum of {} allowed. You may be missing results.",
                limit
            ),
            Notice::ZeroResults => "NOTICE: No results were returned for your query".to_string(),
            Notice::SessionError(error) => format!("ERROR: {}", error),
        };
        // Notices are best effort, a closed stderr must not abort the search
        let _ = writeln!(self.err, "\n{}\n", message);
    }
}

use std::path::PathBuf;

use csv_core::WriteResult;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Table,
    Jsonl,
    Csv,
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "output::Args")]
pub struct Args {
    /// Write to this file instead of the terminal.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    #[arg(long, short = 'f', value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open the specified output file at {1:?}")]
    OpenOutputFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the output file at {1:?}")]
    WriteFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the terminal")]
    WriteStdout(#[source] std::io::Error),
    #[error("could not serialize a record to JSON")]
    SerializeJson(#[source] serde_json::Error),
}

impl Args {
    pub fn new(output: Option<PathBuf>, format: Format) -> Self {
        Self { output, format }
    }

    pub fn to_output(self) -> Result<Output, Error> {
        let io = match &self.output {
            None => Box::new(std::io::stdout().lock()) as Box<dyn std::io::Write>,
            Some(path) => Box::new(
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| Error::OpenOutputFile(e, path.clone()))?,
            ) as Box<_>,
        };
        let formatter = match self.format {
            Format::Table => Formatter::Table { comfy: new_table(), headers: Vec::new(), rows: 0 },
            Format::Jsonl => Formatter::Jsonl,
            Format::Csv => Formatter::Csv,
        };
        Ok(Output { path: self.output, io, formatter })
    }
}

fn new_table() -> comfy_table::Table {
    let mut comfy = comfy_table::Table::new();
    comfy.set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
    comfy
}

/// Rows of records, rendered as a table, JSON lines or CSV.
pub struct Output {
    path: Option<PathBuf>,
    io: Box<dyn std::io::Write>,
    formatter: Formatter,
}

enum Formatter {
    Csv,
    Table { comfy: comfy_table::Table, headers: Vec<&'static str>, rows: usize },
    Jsonl,
}

impl Output {
    /// Must be called before any [`Self::result`].
    pub fn table_headers(&mut self, headers: &[&'static str]) -> Result<(), Error> {
        match &mut self.formatter {
            Formatter::Csv => self.write_csv_row(headers)?,
            Formatter::Table { comfy, headers: saved, .. } => {
                comfy.set_header(headers.to_vec());
                *saved = headers.to_vec();
            }
            Formatter::Jsonl => {}
        }
        Ok(())
    }

    pub fn result<R: serde::Serialize>(
        &mut self,
        table_row: impl FnOnce() -> Vec<String>,
        serde_record: impl FnOnce() -> R,
    ) -> Result<(), Error> {
        match &mut self.formatter {
            Formatter::Csv => {
                let values = table_row();
                self.write_csv_row(&values)?;
            }
            Formatter::Table { comfy, rows, .. } => {
                comfy.add_row(table_row());
                *rows += 1;
            }
            Formatter::Jsonl => {
                serde_json::to_writer(&mut self.io, &serde_record()).map_err(Error::SerializeJson)?;
                writeln!(self.io).map_err(|e| self.write_error(e))?;
            }
        }
        Ok(())
    }

    /// Write out everything collected so far.
    ///
    /// Tables are printed and started anew with the same headers.
    pub fn end_batch(&mut self) -> Result<(), Error> {
        if let Formatter::Table { comfy, headers, rows } = &mut self.formatter {
            *rows = 0;
            let mut table = new_table();
            if !headers.is_empty() {
                table.set_header(headers.clone());
            }
            let finished = std::mem::replace(comfy, table);
            writeln!(self.io, "{finished}").map_err(|e| self.write_error(e))?;
        }
        self.io.flush().map_err(|e| self.write_error(e))
    }

    pub fn commit(mut self) -> Result<(), Error> {
        if let Formatter::Table { comfy, rows, .. } = &self.formatter {
            if *rows != 0 {
                writeln!(self.io, "{comfy}").map_err(|e| self.write_error(e))?;
            }
        }
        self.io.flush().map_err(|e| self.write_error(e))
    }

    fn write_csv_row<V: AsRef<str>>(&mut self, values: &[V]) -> Result<(), Error> {
        let mut writer = csv_core::Writer::new();
        let mut line = Vec::new();
        for (position, value) in values.iter().enumerate() {
            if position != 0 {
                csv_step(&mut line, |out| writer.delimiter(out));
            }
            let mut input = value.as_ref().as_bytes();
            loop {
                let mut buffer = [0; 256];
                let (result, read, written) = writer.field(input, &mut buffer);
                line.extend_from_slice(&buffer[..written]);
                input = &input[read..];
                if result == WriteResult::InputEmpty {
                    break;
                }
            }
        }
        csv_step(&mut line, |out| writer.terminator(out));
        self.io.write_all(&line).map_err(|e| self.write_error(e))
    }

    fn write_error(&self, e: std::io::Error) -> Error {
        match &self.path {
            None => Error::WriteStdout(e),
            Some(p) => Error::WriteFile(e, p.clone()),
        }
    }
}

/// Run a csv-core step that writes a few bytes at most, growing the line until it fits.
fn csv_step(line: &mut Vec<u8>, mut step: impl FnMut(&mut [u8]) -> (WriteResult, usize)) {
    let mut buffer = [0; 8];
    loop {
        let (result, written) = step(&mut buffer);
        line.extend_from_slice(&buffer[..written]);
        if result == WriteResult::InputEmpty {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(format: Format, rows: &[[&str; 2]]) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");
        let mut output = Args::new(Some(path.clone()), format).to_output().unwrap();
        output.table_headers(&["Name", "Value"]).unwrap();
        for row in rows {
            output
                .result(
                    || row.iter().map(|v| v.to_string()).collect(),
                    || serde_json::json!({ "name": row[0], "value": row[1] }),
                )
                .unwrap();
        }
        output.commit().unwrap();
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn csv_quotes_when_needed() {
        let text = render(Format::Csv, &[["Water In", "26.5"], ["Error messages", "E1: 3, E4: 7"]]);
        assert_eq!(text, "Name,Value\nWater In,26.5\nError messages,\"E1: 3, E4: 7\"\n");
    }

    #[test]
    fn jsonl_has_one_record_per_line() {
        let text = render(Format::Jsonl, &[["Water In", "26.5"], ["Ambient", ""]]);
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"name":"Water In","value":"26.5"}"#);
    }

    #[test]
    fn table_contains_every_cell() {
        let text = render(Format::Table, &[["Water In", "26.5"]]);
        for cell in ["Name", "Value", "Water In", "26.5"] {
            assert!(text.contains(cell), "{text}");
        }
    }
}

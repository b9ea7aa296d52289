use crate::flatten::types::Row;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes rows to JSON Lines files, one per table, inside a directory
pub struct TableWriter {
    dir: PathBuf,
    writers: HashMap<String, BufWriter<File>>,
}

impl TableWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        std::fs::create_dir_all(&output_dir)
            .context("Failed to create output directory")?;

        Ok(TableWriter {
            dir: output_dir.as_ref().to_path_buf(),
            writers: HashMap::new(),
        })
    }

    /// Append rows to `<dir>/<table>.jsonl`
    pub fn write_rows(&mut self, table: &str, rows: &[Row]) -> Result<()> {
        if !self.writers.contains_key(table) {
            let path = self.dir.join(format!("{}.jsonl", table));
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open file: {}", path.display()))?;
            self.writers.insert(table.to_string(), BufWriter::new(file));
        }

        let Some(writer) = self.writers.get_mut(table) else {
            return Ok(());
        };
        for row in rows {
            let json = serde_json::to_string(row)
                .context("Failed to serialize row")?;
            writeln!(writer, "{}", json)
                .context("Failed to write row")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush().context("Failed to flush writer")?;
        }
        Ok(())
    }
}

/// Writes every row to a single stream, tagged with its table when known
pub struct SingleWriter<W: Write> {
    writer: W,
}

impl<W: Write> SingleWriter<W> {
    pub fn new(writer: W) -> Self {
        SingleWriter { writer }
    }

    pub fn write_rows(&mut self, table: Option<&str>, rows: &[Row]) -> Result<()> {
        for row in rows {
            let mut data = row.to_json();
            if let (Some(table), Some(obj)) = (table, data.as_object_mut()) {
                obj.insert(
                    "_table".to_string(),
                    serde_json::Value::String(table.to_string()),
                );
            }

            let json = serde_json::to_string(&data)
                .context("Failed to serialize row")?;
            writeln!(self.writer, "{}", json)
                .context("Failed to write row")?;
        }
        Ok(())
    }

    /// Write a raw line, e.g. a generated statement
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{}", line).context("Failed to write line")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }
}

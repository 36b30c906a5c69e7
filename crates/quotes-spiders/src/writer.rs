use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use crossbeam_channel::{unbounded, Sender};
use serde::{Deserialize, Serialize};

use crate::quote::Quote;

pub const CSV_HEADERS: [&str; 3] = ["text", "author", "tags"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    #[default]
    #[cfg_attr(feature = "clap", value(name = "jsonl"))]
    JsonLines,
    Csv,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum FileMode {
    /// Fails if the file exists
    #[default]
    Create,
    Truncate,
    Append,
}

impl From<FileMode> for fs::OpenOptions {
    fn from(mode: FileMode) -> Self {
        let mut opts = fs::OpenOptions::new();
        match mode {
            FileMode::Create => opts.write(true).create_new(true),
            FileMode::Truncate => opts.write(true).create(true).truncate(true),
            FileMode::Append => opts.append(true).create(true),
        };
        opts
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WriterConfig {
    pub format: OutputFormat,
    /// Records go to stdout when missing
    pub file: Option<PathBuf>,
    pub file_mode: FileMode,
}

enum Output {
    File(BufWriter<fs::File>),
    Stdout(io::Stdout),
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::File(w) => w.write(buf),
            Self::Stdout(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::File(w) => w.flush(),
            Self::Stdout(w) => w.flush(),
        }
    }
}

enum RecordWriter {
    JsonLines(Output),
    Csv(csv::Writer<Output>),
}

impl RecordWriter {
    fn new(config: &WriterConfig) -> anyhow::Result<Self> {
        let output = match &config.file {
            Some(path) => {
                let opts: fs::OpenOptions = config.file_mode.into();
                let file = opts
                    .open(path)
                    .with_context(|| format!("Couldn't open output file {}", path.display()))?;
                Output::File(BufWriter::new(file))
            }
            None => Output::Stdout(io::stdout()),
        };

        let writer = match config.format {
            OutputFormat::JsonLines => Self::JsonLines(output),
            OutputFormat::Csv => {
                let has_data = match &config.file {
                    Some(path) if config.file_mode == FileMode::Append => {
                        fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
                    }
                    _ => false,
                };
                let mut wtr = csv::WriterBuilder::new().from_writer(output);
                if !has_data {
                    wtr.write_record(CSV_HEADERS)?;
                }
                Self::Csv(wtr)
            }
        };
        Ok(writer)
    }

    fn write(&mut self, quote: &Quote) -> anyhow::Result<()> {
        match self {
            Self::JsonLines(w) => {
                serde_json::to_writer(&mut *w, quote)?;
                w.write_all(b"\n")?;
            }
            Self::Csv(w) => {
                w.write_record([
                    quote.text.as_deref().unwrap_or_default(),
                    quote.author.as_deref().unwrap_or_default(),
                    quote.tags.join(",").as_str(),
                ])?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::JsonLines(w) => w.flush(),
            Self::Csv(w) => w.flush(),
        }
    }
}

enum Message {
    Record(Quote),
    Flush(Sender<()>),
}

/// Sending half of the record writer thread, cheap to clone.
///
/// The thread exits once every sink is dropped, see [`RecordSink::spawn`].
#[derive(Debug, Clone)]
pub struct RecordSink {
    tx: Sender<Message>,
    written: Arc<AtomicUsize>,
}

impl RecordSink {
    /// Opens the output and starts the writer thread.
    ///
    /// The returned handle yields the number of records written once all
    /// sinks are dropped.
    pub fn spawn(
        config: &WriterConfig,
    ) -> anyhow::Result<(Self, thread::JoinHandle<anyhow::Result<usize>>)> {
        let mut wtr = RecordWriter::new(config)?;
        let (tx, rx) = unbounded::<Message>();
        let written = Arc::new(AtomicUsize::new(0));

        let written_c = written.clone();
        let handle = thread::Builder::new()
            .name("writer".into())
            .spawn(move || {
                for msg in rx {
                    match msg {
                        Message::Record(quote) => match wtr.write(&quote) {
                            Ok(()) => {
                                written_c.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(e) => log::error!("Couldn't write record: {e}"),
                        },
                        Message::Flush(done) => {
                            if let Err(e) = wtr.flush() {
                                log::error!("Couldn't flush records: {e}");
                            }
                            done.send(()).ok();
                        }
                    }
                }
                wtr.flush()?;
                Ok::<_, anyhow::Error>(written_c.load(Ordering::SeqCst))
            })?;

        Ok((Self { tx, written }, handle))
    }

    pub fn send(&self, quote: Quote) {
        if let Err(e) = self.tx.send(Message::Record(quote)) {
            log::error!("Couldn't send record: {e}");
        }
    }

    /// Blocks until every record sent so far is flushed.
    pub fn flush(&self) {
        let (tx_done, rx_done) = crossbeam_channel::bounded(1);
        if self.tx.send(Message::Flush(tx_done)).is_ok() {
            rx_done.recv().ok();
        }
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quotes() -> Vec<Quote> {
        vec![
            Quote {
                text: Some("Life is...".into()),
                author: Some("Einstein".into()),
                tags: vec!["life".into(), "inspiration".into()],
            },
            Quote {
                text: None,
                author: None,
                tags: vec![],
            },
        ]
    }

    fn write_all(config: &WriterConfig) -> usize {
        let (sink, handle) = RecordSink::spawn(config).unwrap();
        for quote in quotes() {
            sink.send(quote);
        }
        sink.flush();
        assert_eq!(sink.written(), 2);
        drop(sink);
        handle.join().unwrap().unwrap()
    }

    #[test]
    fn writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.jsonl");
        let config = WriterConfig {
            file: Some(path.clone()),
            ..Default::default()
        };

        assert_eq!(write_all(&config), 2);

        let written = fs::read_to_string(&path).unwrap();
        let lines = written.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                r#"{"text":"Life is...","author":"Einstein","tags":["life","inspiration"]}"#,
                r#"{"text":null,"author":null,"tags":[]}"#,
            ]
        );
    }

    #[test]
    fn writes_csv_with_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.csv");
        let config = WriterConfig {
            format: OutputFormat::Csv,
            file: Some(path.clone()),
            file_mode: FileMode::Append,
        };

        write_all(&config);
        write_all(&config);

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "text,author,tags\n\
             Life is...,Einstein,\"life,inspiration\"\n\
             ,,\n\
             Life is...,Einstein,\"life,inspiration\"\n\
             ,,\n"
        );
    }

    #[test]
    fn sink_debug_hides_pending_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = WriterConfig {
            file: Some(dir.path().join("quotes.jsonl")),
            ..Default::default()
        };
        let (sink, handle) = RecordSink::spawn(&config).unwrap();
        sink.send(quotes().remove(0));

        let debug = format!("{sink:?}");
        assert!(debug.starts_with("RecordSink"));
        assert!(!debug.contains("Einstein"));

        drop(sink);
        assert_eq!(handle.join().unwrap().unwrap(), 1);
    }

    #[test]
    fn create_mode_refuses_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = WriterConfig {
            file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(RecordSink::spawn(&config).is_err());
    }
}

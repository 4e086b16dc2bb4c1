use std::io::{IsTerminal, Write};
use std::path::Path;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use termlink_remote::{Impedance, ReceivedFile};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    command: &'a str,
    reply: &'a str,
}

pub fn print_reply(command: &str, reply: &str, format: OutputFormat) {
    let reply = reply.trim_end_matches(&['\r', '\n'][..]);
    match format {
        OutputFormat::Json => print_json(&ReplyOutput { command, reply }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "REPLY"])
                .add_row(vec![command, reply]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{command} -> {reply}"),
        OutputFormat::Raw => print_raw(reply.as_bytes()),
    }
}

#[derive(Serialize)]
struct ImpedanceOutput {
    frequency: Option<f64>,
    #[serde(flatten)]
    impedance: Impedance,
    magnitude: f64,
    phase_degrees: f64,
}

pub fn print_impedance(impedance: Impedance, frequency: Option<f64>, format: OutputFormat) {
    let out = ImpedanceOutput {
        frequency,
        impedance,
        magnitude: impedance.magnitude(),
        phase_degrees: impedance.phase().to_degrees(),
    };
    let frequency = frequency.map_or_else(|| "-".to_string(), |f| f.to_string());

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FREQUENCY (Hz)", "REAL (Ω)", "IMAG (Ω)", "|Z| (Ω)", "PHASE (°)"])
                .add_row(vec![
                    frequency,
                    out.impedance.real.to_string(),
                    out.impedance.imaginary.to_string(),
                    format!("{:.6}", out.magnitude),
                    format!("{:.3}", out.phase_degrees),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "f={frequency} Hz Z={} |Z|={:.6} phase={:.3}°",
            out.impedance, out.magnitude, out.phase_degrees
        ),
        OutputFormat::Raw => println!("{},{}", out.impedance.real, out.impedance.imaginary),
    }
}

#[derive(Serialize)]
struct FileOutput<'a> {
    name: &'a str,
    path: &'a str,
    size: usize,
    saved_to: Option<String>,
}

pub fn print_file(file: &ReceivedFile, saved_to: Option<&Path>, format: OutputFormat) {
    let out = FileOutput {
        name: &file.name,
        path: &file.path,
        size: file.data.len(),
        saved_to: saved_to.map(|path| path.display().to_string()),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "SIZE", "TERMINAL PATH", "SAVED TO"])
                .add_row(vec![
                    out.name.to_string(),
                    out.size.to_string(),
                    out.path.to_string(),
                    out.saved_to.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "{} ({} bytes) from {}{}",
            out.name,
            out.size,
            out.path,
            out.saved_to
                .as_deref()
                .map(|path| format!(" saved to {path}"))
                .unwrap_or_default()
        ),
        OutputFormat::Raw => print_raw(file.data.as_ref()),
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

//! Remote-script commands.
//!
//! Commands travel on the COMMAND channel as `1:<command>:` and the terminal
//! answers on the same channel. Several commands can be chained with `:`
//! inside one telegram.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use termlink_connection::{Channel, Connection, ControlRequest};
use tracing::debug;

use crate::error::{RemoteError, Result};

const MIN_PERIODS: u32 = 1;
const MAX_PERIODS: u32 = 100;

/// Complex impedance in ohms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Impedance {
    pub real: f64,
    pub imaginary: f64,
}

impl Impedance {
    /// |Z| in ohms.
    pub fn magnitude(&self) -> f64 {
        self.real.hypot(self.imaginary)
    }

    /// Phase angle in radians.
    pub fn phase(&self) -> f64 {
        self.imaginary.atan2(self.real)
    }
}

impl fmt::Display for Impedance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.imaginary.is_sign_negative() {
            write!(f, "{} - {}j", self.real, -self.imaginary)
        } else {
            write!(f, "{} + {}j", self.real, self.imaginary)
        }
    }
}

/// Coupling of the potentiostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PotentiostatMode {
    Potentiostatic,
    Galvanostatic,
    PseudoGalvanostatic,
}

impl PotentiostatMode {
    fn command(self) -> &'static str {
        match self {
            PotentiostatMode::Potentiostatic => "Gal=0:GAL=0",
            PotentiostatMode::Galvanostatic => "Gal=-1:GAL=1",
            PotentiostatMode::PseudoGalvanostatic => "Gal=0:GAL=-1",
        }
    }
}

/// Instrument operations on top of a connected [`Connection`].
#[derive(Debug, Clone, Copy)]
pub struct ScriptWrapper<'a> {
    connection: &'a Connection,
    timeout: Option<Duration>,
}

impl<'a> ScriptWrapper<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        Self {
            connection,
            timeout: None,
        }
    }

    /// Reply timeout for every command. Without one the connection's default
    /// timeout applies.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run a remote-script command and return the terminal's reply.
    ///
    /// A reply containing `ERROR` is turned into [`RemoteError::Terminal`].
    pub fn execute_remote_command(&self, command: &str) -> Result<String> {
        let reply = self.connection.send_string_and_wait_for_reply_string(
            &format!("1:{command}:"),
            Channel::Command,
            self.timeout,
            None,
        )?;
        debug!(command, reply = reply.trim_end(), "remote command");
        check_reply(reply)
    }

    /// Switch the terminal into remote-script mode.
    pub fn force_into_remote_script(&self) -> Result<String> {
        let reply = self.connection.send_string_and_wait_for_reply_string(
            &ControlRequest::ForceRemoteScript.to_payload(),
            Channel::Control,
            self.timeout,
            None,
        )?;
        check_reply(reply)
    }

    /// Measured potential in volts.
    pub fn get_potential(&self) -> Result<f64> {
        self.request_value("POTENTIAL", "potential=", 'V')
    }

    /// Measured current in amperes.
    pub fn get_current(&self) -> Result<f64> {
        self.request_value("CURRENT", "current=", 'A')
    }

    /// Set the potential in volts.
    pub fn set_potential(&self, potential: f64) -> Result<()> {
        self.set_value("Pset", potential)
    }

    /// Set the current in amperes.
    pub fn set_current(&self, current: f64) -> Result<()> {
        self.set_value("Cset", current)
    }

    /// Set the excitation frequency in hertz.
    pub fn set_frequency(&self, frequency: f64) -> Result<()> {
        self.set_value("Frq", frequency)
    }

    /// Set the excitation amplitude in volts. The terminal expects millivolts.
    pub fn set_amplitude(&self, amplitude: f64) -> Result<()> {
        self.set_value("Ampl", amplitude * 1e3)
    }

    /// Number of periods averaged per impedance point, clamped to 1..=100.
    pub fn set_number_of_periods(&self, periods: u32) -> Result<()> {
        let periods = periods.clamp(MIN_PERIODS, MAX_PERIODS);
        self.execute_remote_command(&format!("Nw={periods}"))
            .map(drop)
    }

    /// Assign a remote-script variable.
    pub fn set_value(&self, name: &str, value: impl fmt::Display) -> Result<()> {
        self.execute_remote_command(&format!("{name}={value}"))
            .map(drop)
    }

    pub fn enable_potentiostat(&self, enabled: bool) -> Result<()> {
        let command = if enabled { "Pot=-1" } else { "Pot=0" };
        self.execute_remote_command(command).map(drop)
    }

    pub fn set_potentiostat_mode(&self, mode: PotentiostatMode) -> Result<()> {
        self.execute_remote_command(mode.command()).map(drop)
    }

    /// Measure one impedance point at the current settings.
    pub fn get_impedance(&self) -> Result<Impedance> {
        let reply = self.execute_remote_command("IMPEDANCE")?;
        parse_impedance(&reply).ok_or_else(|| RemoteError::InvalidReply {
            request: "IMPEDANCE".to_string(),
            reply,
        })
    }

    /// Measure one impedance point at `frequency` hertz.
    pub fn get_impedance_at(&self, frequency: f64) -> Result<Impedance> {
        self.set_frequency(frequency)?;
        self.get_impedance()
    }

    /// Measure one impedance point with explicit excitation.
    pub fn get_impedance_with(
        &self,
        frequency: f64,
        amplitude: f64,
        periods: u32,
    ) -> Result<Impedance> {
        self.set_frequency(frequency)?;
        self.set_amplitude(amplitude)?;
        self.set_number_of_periods(periods)?;
        self.get_impedance()
    }

    fn request_value(&self, command: &str, tag: &str, unit: char) -> Result<f64> {
        let reply = self.execute_remote_command(command)?;
        parse_tagged(&reply, tag, unit).ok_or_else(|| RemoteError::InvalidReply {
            request: command.to_string(),
            reply,
        })
    }
}

fn check_reply(reply: String) -> Result<String> {
    if reply.contains("ERROR") {
        return Err(RemoteError::Terminal(reply.trim_end().to_string()));
    }
    Ok(reply)
}

/// Extract the number between `tag` and `unit`, as in `potential= 1.2e-3V`.
fn parse_tagged(reply: &str, tag: &str, unit: char) -> Option<f64> {
    let start = reply.find(tag)? + tag.len();
    let rest = &reply[start..];
    let end = rest.find(unit)?;
    rest[..end].trim().parse().ok()
}

/// Parse `impedance=<real>,<imaginary>\r`.
fn parse_impedance(reply: &str) -> Option<Impedance> {
    const TAG: &str = "impedance=";

    let start = reply.find(TAG)? + TAG.len();
    let (real, rest) = reply[start..].split_once(',')?;
    let end = rest.find('\r')?;
    Some(Impedance {
        real: real.trim().parse().ok()?,
        imaginary: rest[..end].trim().parse().ok()?,
    })
}

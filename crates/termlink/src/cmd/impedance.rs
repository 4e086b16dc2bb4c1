use termlink_remote::ScriptWrapper;

use crate::cmd::ImpedanceArgs;
use crate::exit::{connection_error, remote_error, CliResult, SUCCESS};
use crate::output::{print_impedance, OutputFormat};

const DEFAULT_NAME: &str = "ScriptRemote";

pub fn run(args: ImpedanceArgs, format: OutputFormat) -> CliResult<i32> {
    let connection = args.terminal.connect(DEFAULT_NAME)?;
    let script = ScriptWrapper::new(&connection);

    let result = match (args.frequency, args.amplitude) {
        (Some(frequency), Some(amplitude)) => {
            script.get_impedance_with(frequency, amplitude, args.periods)
        }
        (Some(frequency), None) => script.get_impedance_at(frequency),
        _ => script.get_impedance(),
    };
    connection
        .disconnect()
        .map_err(|err| connection_error("disconnect failed", err))?;

    let impedance = result.map_err(|err| remote_error("impedance measurement failed", err))?;
    print_impedance(impedance, args.frequency, format);
    Ok(SUCCESS)
}

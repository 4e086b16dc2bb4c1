use termlink_remote::ScriptWrapper;
use tracing::debug;

use crate::cmd::CommandArgs;
use crate::exit::{connection_error, remote_error, CliResult, SUCCESS};
use crate::output::{print_reply, OutputFormat};

const DEFAULT_NAME: &str = "ScriptRemote";

pub fn run(args: CommandArgs, format: OutputFormat) -> CliResult<i32> {
    let connection = args.terminal.connect(DEFAULT_NAME)?;
    let script = ScriptWrapper::new(&connection);

    if args.force_remote {
        let reply = script
            .force_into_remote_script()
            .map_err(|err| remote_error("remote-script mode failed", err))?;
        debug!(reply = reply.trim_end(), "terminal in remote-script mode");
    }

    let result = script.execute_remote_command(&args.command);
    connection
        .disconnect()
        .map_err(|err| connection_error("disconnect failed", err))?;

    let reply = result.map_err(|err| remote_error("command failed", err))?;
    print_reply(&args.command, &reply, format);
    Ok(SUCCESS)
}

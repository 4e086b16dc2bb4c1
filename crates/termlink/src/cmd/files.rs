use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use termlink_remote::{FileExchange, DEFAULT_CONNECTION_NAME};
use tracing::{debug, info};

use crate::cmd::{AcquireFileArgs, TerminalArgs, WatchFilesArgs};
use crate::exit::{io_error, remote_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_file, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn open(terminal: &TerminalArgs) -> CliResult<FileExchange> {
    let name = terminal.name.as_deref().unwrap_or(DEFAULT_CONNECTION_NAME);
    FileExchange::open_with_config(&terminal.host, name, terminal.file_exchange_config()?)
        .map_err(|err| remote_error("connect failed", err))
}

pub fn acquire(args: AcquireFileArgs, format: OutputFormat) -> CliResult<i32> {
    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)
            .map_err(|err| io_error(&format!("failed creating {}", dir.display()), err))?;
    }

    let exchange = open(&args.terminal)?;
    if let Some(dir) = &args.output {
        exchange.enable_save_received_files_to_disk(dir.clone());
    }
    let result = exchange.acquire_file(&args.path).and_then(|file| {
        exchange.save_received_file(&file)?;
        Ok(file)
    });
    exchange
        .close()
        .map_err(|err| remote_error("disconnect failed", err))?;
    let file = result.map_err(|err| remote_error("file transfer failed", err))?;

    let saved_to = args.output.as_ref().map(|dir| dir.join(&file.name));
    print_file(&file, saved_to.as_deref(), format);
    Ok(SUCCESS)
}

pub fn watch(args: WatchFilesArgs, format: OutputFormat) -> CliResult<i32> {
    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)
            .map_err(|err| io_error(&format!("failed creating {}", dir.display()), err))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let exchange = open(&args.terminal)?;
    for name in &args.skip {
        exchange.append_files_to_skip(name.as_str());
    }
    if let Some(dir) = &args.output {
        exchange.enable_save_received_files_to_disk(dir.clone());
    }

    let reply = exchange
        .enable_automatic_file_exchange(&args.extensions)
        .map_err(|err| remote_error("enabling file exchange failed", err))?;
    info!(reply = reply.trim_end(), extensions = %args.extensions, "watching for files");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) && exchange.is_automatic_exchange_active() {
        let files = exchange.received_files();
        for file in files.iter().skip(printed) {
            let saved_to = args.output.as_ref().map(|dir| dir.join(&file.name));
            print_file(file, saved_to.as_deref(), format);
        }
        printed = files.len();

        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    if exchange.is_automatic_exchange_active() {
        exchange
            .disable_automatic_file_exchange()
            .map_err(|err| remote_error("disabling file exchange failed", err))?;
    } else {
        debug!("file exchange worker stopped on its own");
    }
    exchange
        .close()
        .map_err(|err| remote_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

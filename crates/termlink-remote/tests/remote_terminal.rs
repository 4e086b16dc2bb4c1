//! Script wrapper and file exchange against an in-process terminal.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use termlink_connection::{Channel, Connection, ConnectionConfig};
use termlink_frame::{Telegram, TelegramReader, TelegramWriter};
use termlink_remote::{
    FileExchange, FileExchangeConfig, PotentiostatMode, RemoteError, ScriptWrapper,
    DEFAULT_FILE_EXTENSIONS,
};

type Replies = Vec<(Channel, Vec<u8>)>;

/// Serves one client. Every telegram is reported on the returned receiver
/// as `(channel, text)` and answered with whatever `behavior` returns.
fn start_terminal<F>(mut behavior: F) -> (u16, mpsc::Receiver<(u8, String)>, JoinHandle<()>)
where
    F: FnMut(u8, &str) -> Replies + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("listener has an address").port();
    let (seen_tx, seen_rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("client should connect");
        let mut reader_stream = stream.try_clone().expect("stream should clone");
        skip_registration(&mut reader_stream);

        let mut reader = TelegramReader::new(reader_stream);
        let mut writer = TelegramWriter::new(stream);
        while let Ok(Telegram { channel, payload }) = reader.read_telegram() {
            if channel == Channel::Shutdown.id() {
                break;
            }
            let text = String::from_utf8_lossy(&payload).into_owned();
            let replies = if channel == Channel::Control.id() && text.ends_with(",0,OFF") {
                vec![(Channel::Control, b"OK".to_vec())]
            } else {
                behavior(channel, &text)
            };
            let _ = seen_tx.send((channel, text));
            for (channel, payload) in replies {
                writer.send(channel.id(), &payload).expect("reply should send");
            }
        }
    });

    (port, seen_rx, handle)
}

fn skip_registration(stream: &mut TcpStream) {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).expect("registration header");
    let mut name = vec![0u8; u16::from_le_bytes([header[0], header[1]]) as usize];
    stream.read_exact(&mut name).expect("registration name");
}

fn connection_config(port: u16) -> ConnectionConfig {
    let mut config = ConnectionConfig::default()
        .with_port(port)
        .with_settle(Duration::ZERO, Duration::from_millis(20))
        .with_default_timeout(Some(Duration::from_secs(5)));
    config.unregister_timeout = Duration::from_millis(200);
    config
}

fn exchange_config(port: u16) -> FileExchangeConfig {
    FileExchangeConfig {
        connection: connection_config(port),
        poll_interval: Duration::from_millis(50),
        drain_interval: Duration::from_millis(50),
        reply_timeout: Some(Duration::from_secs(5)),
    }
}

fn file_replies(path: &str, content: &[u8], chunk: usize) -> Replies {
    let mut replies = vec![
        (Channel::FilePath, path.as_bytes().to_vec()),
        (Channel::FileLength, content.len().to_string().into_bytes()),
    ];
    replies.extend(
        content
            .chunks(chunk)
            .map(|part| (Channel::FileChunk, part.to_vec())),
    );
    replies
}

fn commands(seen: &mpsc::Receiver<(u8, String)>) -> Vec<String> {
    seen.try_iter()
        .filter(|(channel, _)| *channel == Channel::Command.id())
        .map(|(_, text)| text)
        .collect()
}

#[test]
fn impedance_measurement_sets_up_excitation() {
    let (port, seen, terminal) = start_terminal(|_, text| match text {
        "1:IMPEDANCE:" => vec![(Channel::Command, b"impedance=1.0e3,-5.0e1\r".to_vec())],
        _ => vec![(Channel::Command, b"OK\r".to_vec())],
    });

    let connection = Connection::with_config(connection_config(port));
    connection
        .connect("127.0.0.1", "script")
        .expect("connect should succeed");
    let script = ScriptWrapper::new(&connection);

    let z = script
        .get_impedance_with(1000.0, 0.01, 500)
        .expect("impedance should parse");
    assert_eq!(z.real, 1000.0);
    assert_eq!(z.imaginary, -50.0);

    script.set_number_of_periods(0).expect("periods should be set");
    script.enable_potentiostat(true).expect("pot should enable");
    script
        .set_potentiostat_mode(PotentiostatMode::Galvanostatic)
        .expect("mode should be set");

    connection.disconnect().expect("disconnect should succeed");
    terminal.join().expect("terminal thread should complete");

    assert_eq!(
        commands(&seen),
        vec![
            "1:Frq=1000:",
            "1:Ampl=10:",
            "1:Nw=100:",
            "1:IMPEDANCE:",
            "1:Nw=1:",
            "1:Pot=-1:",
            "1:Gal=-1:GAL=1:",
        ]
    );
}

#[test]
fn readings_and_terminal_errors() {
    let (port, _seen, terminal) = start_terminal(|_, text| {
        let reply = match text {
            "1:POTENTIAL:" => "potential=1.25e-1V\r",
            "1:CURRENT:" => "current= -3.0e-6A\r",
            "1:Pset=99:" => "ERROR: 13 value out of range\r",
            _ => "garbage\r",
        };
        vec![(Channel::Command, reply.as_bytes().to_vec())]
    });

    let connection = Connection::with_config(connection_config(port));
    connection
        .connect("127.0.0.1", "readings")
        .expect("connect should succeed");
    let script = ScriptWrapper::new(&connection).with_timeout(Duration::from_secs(5));

    assert_eq!(script.get_potential().expect("potential"), 0.125);
    assert_eq!(script.get_current().expect("current"), -3.0e-6);

    let err = script.set_potential(99.0).unwrap_err();
    assert!(
        matches!(&err, RemoteError::Terminal(message) if message.contains("out of range")),
        "{err}"
    );

    let err = script.get_impedance().unwrap_err();
    assert!(matches!(err, RemoteError::InvalidReply { .. }), "{err}");

    connection.disconnect().expect("disconnect should succeed");
    terminal.join().expect("terminal thread should complete");
}

#[test]
fn force_into_remote_script_uses_control_channel() {
    let (port, seen, terminal) = start_terminal(|channel, text| {
        if channel == Channel::Control.id() && text == "2,ScriptRemote" {
            vec![(Channel::Control, b"OK".to_vec())]
        } else {
            Vec::new()
        }
    });

    let connection = Connection::with_config(connection_config(port));
    connection
        .connect("127.0.0.1", "remote")
        .expect("connect should succeed");
    let reply = ScriptWrapper::new(&connection)
        .force_into_remote_script()
        .expect("terminal should acknowledge");
    assert_eq!(reply, "OK");

    connection.disconnect().expect("disconnect should succeed");
    terminal.join().expect("terminal thread should complete");
    let (channel, text) = seen.recv().expect("request should be seen");
    assert_eq!((channel, text.as_str()), (Channel::Control.id(), "2,ScriptRemote"));
}

#[test]
fn acquire_single_file_in_chunks() {
    let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let served = content.clone();
    let (port, seen, terminal) = start_terminal(move |channel, text| {
        if channel == Channel::Control.id() && text == r"3,files,1,C:\THALES\temp\eis.ism" {
            file_replies(r"C:\THALES\temp\eis.ism", &served, 4096)
        } else {
            Vec::new()
        }
    });

    let exchange = FileExchange::open_with_config("127.0.0.1", "files", exchange_config(port))
        .expect("open should succeed");
    let file = exchange
        .acquire_file(r"C:\THALES\temp\eis.ism")
        .expect("file should arrive");

    assert_eq!(file.name, "eis.ism");
    assert_eq!(file.path, r"C:\THALES\temp\eis.ism");
    assert_eq!(file.data.as_ref(), content.as_slice());

    exchange.close().expect("close should succeed");
    terminal.join().expect("terminal thread should complete");
    assert!(seen.try_iter().any(|(_, text)| text == "3,files,0,OFF"));
}

#[test]
fn automatic_exchange_collects_files_and_honors_skip_list() {
    let (port, _seen, terminal) = start_terminal(|channel, text| {
        if channel != Channel::Control.id() {
            return Vec::new();
        }
        if text == format!("3,auto,4,ON,{DEFAULT_FILE_EXTENSIONS}") {
            let mut replies = vec![(Channel::FileExchange, b"ON".to_vec())];
            replies.extend(file_replies(r"C:\THALES\temp\lastshot.ism", b"skip", 2));
            replies.extend(file_replies(r"C:\THALES\temp\spectrum.ism", b"spectrum data", 5));
            replies.extend(file_replies("/data/cv.isc", b"cv", 5));
            return replies;
        }
        if text == "3,auto,4,OFF" {
            return vec![(Channel::FileExchange, b"OFF".to_vec())];
        }
        Vec::new()
    });

    let exchange = FileExchange::open_with_config("127.0.0.1", "auto", exchange_config(port))
        .expect("open should succeed");
    exchange.append_files_to_skip("cv.isc");

    let reply = exchange
        .enable_automatic_file_exchange(DEFAULT_FILE_EXTENSIONS)
        .expect("exchange should enable");
    assert_eq!(reply, "ON");
    assert!(exchange.is_automatic_exchange_active());
    assert!(matches!(
        exchange.acquire_file("x.ism"),
        Err(RemoteError::FileExchangeActive)
    ));

    let deadline = Instant::now() + Duration::from_secs(5);
    while exchange.received_files().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    let reply = exchange
        .disable_automatic_file_exchange()
        .expect("exchange should disable");
    assert_eq!(reply, "OFF");
    assert!(!exchange.is_automatic_exchange_active());

    let files = exchange.received_files();
    assert_eq!(files.len(), 1, "{files:?}");
    let latest = exchange.latest_received_file().expect("one file kept");
    assert_eq!(latest.name, "spectrum.ism");
    assert_eq!(latest.data.as_ref(), b"spectrum data");

    exchange.delete_received_files();
    assert!(exchange.received_files().is_empty());

    exchange.close().expect("close should succeed");
    terminal.join().expect("terminal thread should complete");
}

#[test]
fn worker_stops_when_terminal_goes_away() {
    let (port, _seen, terminal) = start_terminal(|channel, text| {
        if channel == Channel::Control.id() && text.contains(",4,ON,") {
            vec![(Channel::FileExchange, b"ON".to_vec())]
        } else {
            Vec::new()
        }
    });

    let exchange = FileExchange::open_with_config("127.0.0.1", "vanish", exchange_config(port))
        .expect("open should succeed");
    exchange
        .enable_automatic_file_exchange("*.ism")
        .expect("exchange should enable");

    // Shutting the terminal down from the client side looks like a lost peer to the worker.
    exchange
        .connection()
        .send(&[0xff, 0xff], Channel::Shutdown)
        .expect("shutdown telegram should send");
    terminal.join().expect("terminal thread should complete");

    let deadline = Instant::now() + Duration::from_secs(5);
    while exchange.is_automatic_exchange_active() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!exchange.is_automatic_exchange_active());
}

#[test]
fn automatic_exchange_restarts_after_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("listener has an address").port();

    let terminal = thread::spawn(move || {
        // First session: acknowledge automatic exchange, then vanish.
        let (first, _) = listener.accept().expect("first client should connect");
        let mut reader_stream = first.try_clone().expect("stream should clone");
        skip_registration(&mut reader_stream);
        let mut reader = TelegramReader::new(reader_stream);
        let mut writer = TelegramWriter::new(first);
        while let Ok(Telegram { channel, payload }) = reader.read_telegram() {
            if channel == Channel::Control.id() && payload.windows(6).any(|w| w == b",4,ON,") {
                writer
                    .send(Channel::FileExchange.id(), b"ON")
                    .expect("reply should send");
                break;
            }
        }
        drop(reader);
        drop(writer);

        // Second session: push one file once automatic exchange is back on.
        let (second, _) = listener.accept().expect("second client should connect");
        let mut reader_stream = second.try_clone().expect("stream should clone");
        skip_registration(&mut reader_stream);
        let mut reader = TelegramReader::new(reader_stream);
        let mut writer = TelegramWriter::new(second);
        while let Ok(Telegram { channel, payload }) = reader.read_telegram() {
            if channel == Channel::Shutdown.id() {
                break;
            }
            let text = String::from_utf8_lossy(&payload).into_owned();
            let replies = if text.ends_with(",0,OFF") {
                vec![(Channel::Control, b"OK".to_vec())]
            } else if text.contains(",4,ON,") {
                let mut replies = vec![(Channel::FileExchange, b"ON".to_vec())];
                replies.extend(file_replies(r"C:\THALES\temp\second.ism", b"after reconnect", 4));
                replies
            } else if text.ends_with(",4,OFF") {
                vec![(Channel::FileExchange, b"OFF".to_vec())]
            } else {
                Vec::new()
            };
            for (channel, payload) in replies {
                writer.send(channel.id(), &payload).expect("reply should send");
            }
        }
    });

    let exchange = FileExchange::open_with_config("127.0.0.1", "again", exchange_config(port))
        .expect("open should succeed");
    exchange
        .enable_automatic_file_exchange("*.ism")
        .expect("exchange should enable");

    let deadline = Instant::now() + Duration::from_secs(5);
    while exchange.is_automatic_exchange_active() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!exchange.is_automatic_exchange_active());

    // The stopped worker no longer blocks single-file requests.
    let err = exchange.acquire_file("x.ism").unwrap_err();
    assert!(err.is_connection_lost(), "{err}");

    exchange
        .connection()
        .disconnect()
        .expect("disconnect should succeed");
    exchange
        .connection()
        .connect("127.0.0.1", "again")
        .expect("reconnect should succeed");

    let reply = exchange
        .enable_automatic_file_exchange("*.ism")
        .expect("exchange should enable again");
    assert_eq!(reply, "ON");
    assert!(exchange.is_automatic_exchange_active());

    let deadline = Instant::now() + Duration::from_secs(5);
    while exchange.received_files().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    let latest = exchange.latest_received_file().expect("file should be collected");
    assert_eq!(latest.name, "second.ism");
    assert_eq!(latest.data.as_ref(), b"after reconnect");

    exchange.close().expect("close should succeed");
    terminal.join().expect("terminal thread should complete");
}

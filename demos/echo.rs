//! A minimal two-node echo demo: `env_logger::init()` plus a
//! `getopts`-parsed option set, then a loop that drives the protocol and
//! prints what happens.
//!
//! There is no real radio driver available here, so this demo wires two
//! [`lrtp::Host`]s together over the in-memory
//! [`lrtp::radio::sim::SimRadio`] pair instead of real hardware. One
//! side sends a message; the other echoes whatever it receives back.

use std::env;
use std::process;

use getopts::Options;

use lrtp::host::Host;
use lrtp::radio::sim::SimRadio;
use lrtp::time::{Duration, Instant};
use lrtp::wire::Address;

fn print_usage(program: &str, opts: &Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("m", "message", "message for the client to send", "TEXT");
    opts.optopt("t", "ticks", "maximum ticks to run before giving up", "N");
    opts.optflag("h", "help", "print this help menu");
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };
    if matches.opt_present("h") {
        print_usage(&program, &opts);
        return;
    }
    let message = matches
        .opt_str("m")
        .unwrap_or_else(|| "hello over lrtp".to_string());
    let max_ticks: usize = matches
        .opt_str("t")
        .and_then(|s| s.parse().ok())
        .unwrap_or(500);

    const CLIENT: u16 = 1;
    const SERVER: u16 = 2;

    let (mut client_radio, mut server_radio) = SimRadio::pair();
    let mut client = Host::new(CLIENT);
    let mut server = Host::new(SERVER);
    client.begin(&mut client_radio);
    server.begin(&mut server_radio);

    let mut now = Instant::ZERO;
    client.connect(Address(SERVER), now);

    let mut sent = false;
    let mut echoed = false;

    for tick in 0..max_ticks {
        now = now + Duration::from_millis(10);
        client.poll(&mut client_radio, now);
        server.poll(&mut server_radio, now);
        while client_radio.deliver_next() {}
        while server_radio.deliver_next() {}

        if !sent {
            if let Some(conn) = client.connection(Address(SERVER)) {
                if conn.state() == lrtp::connection::State::Connected {
                    conn.write(message.as_bytes());
                    log::info!("client: sent {:?}", message);
                    sent = true;
                }
            }
        }

        if let Some(conn) = server.connection(Address(CLIENT)) {
            if conn.available() > 0 {
                let mut buf = [0u8; 247];
                let n = conn.read(&mut buf);
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                log::info!("server: echoing {:?} back", text);
                conn.write(text.as_bytes());
            }
        }

        if !echoed {
            if let Some(conn) = client.connection(Address(SERVER)) {
                if conn.available() > 0 {
                    let mut buf = [0u8; 247];
                    let n = conn.read(&mut buf);
                    println!("{}", String::from_utf8_lossy(&buf[..n]));
                    echoed = true;
                }
            }
        }

        if echoed {
            log::debug!("demo converged after {} ticks", tick);
            return;
        }
    }

    eprintln!("no echo received within {} ticks", max_ticks);
    process::exit(1);
}

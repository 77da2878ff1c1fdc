use anyhow::{anyhow, Context as _, Result};
use clap::Parser as _;
use owo_colors::OwoColorize;
use pcsc::Context;
use scard_apdu::{Card, CommandApdu, PcscTransport, Protocol, Response, TransmitConfig};
use std::time::Duration;
use tracing::{debug, trace, trace_span};

#[derive(clap::Parser, Debug)]
struct Args {
    /// Increase log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log level.
    #[arg(short, long, action=clap::ArgAction::Count)]
    quiet: u8,

    /// Use a specific reader (from list-readers).
    #[arg(short, long)]
    reader: Option<String>,

    /// Preferred protocol (T0, T1 or RAW); PC/SC picks one if unset.
    #[arg(short, long)]
    protocol: Option<Protocol>,

    /// Milliseconds to wait before every retry or GET RESPONSE.
    #[arg(long, default_value_t = 0)]
    wait_ms: u64,

    /// Cap GET RESPONSE at this many bytes (status word included), instead of asking the
    /// reader.
    #[arg(long)]
    max_recv: Option<usize>,

    /// Give up after this many GET RESPONSE commands for one APDU.
    #[arg(long, default_value_t = scard_apdu::config::DEFAULT_MAX_CHAIN_LEN)]
    max_chain: usize,

    /// Command.
    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn config(&self) -> TransmitConfig {
        let mut cfg = TransmitConfig::default()
            .with_retransmit_wait(Duration::from_millis(self.wait_ms))
            .with_max_chain_len(Some(self.max_chain));
        if let Some(max) = self.max_recv {
            cfg = cfg.with_max_recv_size(max);
        }
        cfg
    }
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Send a command APDU (hex, eg. "00A4040007A0000000041010") and print the response.
    Transmit { apdu: String },

    /// List connected readers.
    ListReaders,
}

impl Command {
    pub fn run(&self, args: &Args) -> Result<()> {
        match self {
            Self::Transmit { apdu } => self.transmit(args, apdu),
            Self::ListReaders => self.list_readers(args),
        }
    }

    fn transmit(&self, args: &Args, apdu: &str) -> Result<()> {
        let span = trace_span!("transmit");
        let _enter = span.enter();

        let digits: String = apdu
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let raw = hex::decode(digits).context("APDU is not valid hex")?;
        let ctx = Context::establish(pcsc::Scope::User)?;
        let mut card = Card::with_config(select_card(&ctx, args)?, args.config());

        let cmd = CommandApdu::from_bytes(&raw, card.protocol())?;
        debug!(%cmd, "Sending command");
        let res = card.transmit(&cmd)?;
        print_response(&res)
    }

    fn list_readers(&self, _args: &Args) -> Result<()> {
        let span = trace_span!("list_readers");
        let _enter = span.enter();

        let ctx = Context::establish(pcsc::Scope::User)?;
        let mut readers_buf = [0; 2048];
        for name in ctx.list_readers(&mut readers_buf)? {
            println!("{}", name.to_str()?);
        }
        Ok(())
    }
}

fn print_response(res: &Response) -> Result<()> {
    for (i, apdu) in res.iter().enumerate() {
        println!(
            "[{}] {} SW={:04X}",
            i,
            hex::encode_upper(apdu.data().unwrap_or_default()),
            apdu.status_word()?
        );
    }
    if let Some(data) = res.data() {
        println!("Data: {}", hex::encode_upper(data));
    }

    let status = res.status()?;
    let line = format!("Status: {:04X} ({})", res.status_word()?, status);
    if status.is_success() {
        println!("{}", line.green());
    } else if status.is_warning() {
        println!("{}", line.yellow());
    } else {
        println!("{}", line.red());
    }
    Ok(())
}

fn select_card(ctx: &Context, args: &Args) -> Result<PcscTransport> {
    let span = trace_span!("select_card", reader = ?args.reader);
    let _enter = span.enter();

    Ok(if let Some(name) = &args.reader {
        debug!(%name, "Connecting to named reader");
        PcscTransport::connect(
            ctx,
            std::ffi::CString::new(name.clone())?.as_c_str(),
            args.protocol,
        )?
    } else {
        // If not, use the first available reader.
        let mut readers_buf = [0; 2048];
        debug!("Listing available readers");
        let name = ctx
            .list_readers(&mut readers_buf)?
            .next()
            .ok_or(anyhow!("No supported reader connected"))?;

        debug!(?name, "Connecting to first available reader");
        PcscTransport::connect(ctx, name, args.protocol)?
    })
}

fn init_logging(args: &Args) {
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_max_level(match 2 + args.verbose as i16 - args.quiet as i16 {
            i16::MIN..=0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            4.. => tracing::Level::TRACE,
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    trace!(?args, "Starting up");
    args.command.run(&args)
}

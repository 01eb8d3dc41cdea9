use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{error, info};

// Tracing file logging
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pipelink::infrastructure::config::AppConfig;
use pipelink::infrastructure::events::{EventPublisher, LoggingEventHandler, run_event_loop};
use pipelink::network::config::DEFAULT_PORT;
use pipelink::network::{Listener, Sender, Transport};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for messages and files until interrupted
    Listen {
        /// Transport to listen on (stream/tcp or datagram/udp)
        #[arg(short, long, default_value = "stream")]
        transport: Transport,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory received files are written to (overrides the config file)
        #[arg(long)]
        download_dir: Option<PathBuf>,

        /// Path to a JSON config file
        #[arg(long)]
        config: Option<String>,
    },
    /// Send a text message
    SendMessage {
        /// Destination IP address
        #[arg(long)]
        to: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        #[arg(short, long, default_value = "stream")]
        transport: Transport,

        /// Message text
        text: String,
    },
    /// Send a file over the stream transport
    SendFile {
        /// Destination IP address
        #[arg(long)]
        to: String,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Path to the file to send
        path: PathBuf,
    },
}

// Initialize tracing with console and daily rolling file output.
// The returned guard must stay alive for file logs to be written.
fn init_logging(log_file_prefix: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", log_file_prefix);
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false);

    let console_layer = fmt::layer().with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_logging("pipelink")?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen {
            transport,
            port,
            download_dir,
            config,
        } => {
            let mut app_config = AppConfig::load_or_default(config.as_deref());
            if let Some(port) = port {
                app_config.listen_port = port;
            }
            if let Some(dir) = download_dir {
                app_config.download_directory = dir.to_string_lossy().into_owned();
            }
            app_config.validate()?;
            app_config.ensure_directories()?;

            let (events, event_rx) = EventPublisher::channel();
            let mut listener = Listener::new(transport, app_config.listener_config(), events);
            let addr = listener.start().await?;
            info!(
                "Listening on {} ({}), saving files to {}",
                addr,
                transport,
                app_config.download_directory
            );

            let event_task = tokio::spawn(run_event_loop(event_rx, LoggingEventHandler));

            tokio::signal::ctrl_c()
                .await
                .context("failed to wait for Ctrl-C")?;
            info!("Shutting down");
            listener.stop().await;
            drop(listener);
            event_task.abort();
        }
        Commands::SendMessage {
            to,
            port,
            transport,
            text,
        } => {
            let mut sender = Sender::new(transport);
            sender.set_destination(&to, port)?;
            sender.send_text(&text).await?;
            info!("Message sent to {}:{} over {}", to, port, transport);
        }
        Commands::SendFile { to, port, path } => {
            let mut sender = Sender::new(Transport::Stream);
            sender.set_destination(&to, port)?;

            let total = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
            let progress = ProgressBar::new(total);
            progress.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                )?
                .progress_chars("#>-"),
            );

            let sent = sender
                .send_file_with_progress(&path, |bytes| progress.inc(bytes as u64))
                .await?;
            if !sent {
                progress.abandon();
                error!("File does not exist: {}", path.display());
                bail!("file not found: {}", path.display());
            }
            progress.finish_with_message("done");
            info!("Sent {} to {}:{}", path.display(), to, port);
        }
    }

    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use image_insights::client::render::{self, MarkupPolicy};
use image_insights::client::{
    Bounds, HttpRelay, InsightSession, NotificationKind, SystemClipboard, UploadedImage,
};
use image_insights::relay::{self, INSIGHTS_PATH};
use image_insights::{Language, Length, RelayConfig};

#[derive(Parser)]
#[command(name = "image-insights")]
#[command(about = "Image insights and visual Q&A backed by a hosted vision model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay and the browser front end
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Generate insights about an image
    Describe {
        image: PathBuf,
        #[arg(short, long, default_value = "english")]
        language: Language,
        #[arg(short = 'n', long, default_value = "medium")]
        length: Length,
        #[command(flatten)]
        client: ClientArgs,
    },
    /// Ask a question about an image
    Ask {
        image: PathBuf,
        question: String,
        #[command(flatten)]
        client: ClientArgs,
    },
}

#[derive(Args)]
struct ClientArgs {
    /// Relay endpoint URL
    #[arg(long, default_value_t = format!("http://localhost:3000{INSIGHTS_PATH}"))]
    endpoint: String,
    /// Preview container width
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Preview container height
    #[arg(long, default_value_t = 480)]
    height: u32,
    /// Copy the result to the clipboard
    #[arg(long)]
    copy: bool,
    /// Print the rendered HTML fragment instead of text
    #[arg(long)]
    html: bool,
    /// Escape markup in the HTML output
    #[arg(long, requires = "html")]
    escape_markup: bool,
}

fn init_tracing(config: &RelayConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Only `serve` reads the relay config; the client commands run on defaults.
fn settings_for(command: &Commands) -> Result<RelayConfig> {
    match command {
        Commands::Serve { port } => {
            let config = RelayConfig::load()?;
            Ok(RelayConfig {
                port: port.unwrap_or(config.port),
                ..config
            })
        }
        Commands::Describe { .. } | Commands::Ask { .. } => Ok(RelayConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = settings_for(&cli.command)?;
    init_tracing(&config);

    match cli.command {
        Commands::Serve { .. } => {
            relay::start_server(config).await?;
        }
        Commands::Describe {
            image,
            language,
            length,
            client,
        } => {
            run_client(image, client, |session| {
                session.set_parameters(language, length)
            })
            .await?;
        }
        Commands::Ask {
            image,
            question,
            client,
        } => {
            run_client(image, client, |session| session.set_question(question)).await?;
        }
    }

    Ok(())
}

async fn run_client(
    path: PathBuf,
    args: ClientArgs,
    configure: impl FnOnce(&mut InsightSession<HttpRelay>),
) -> Result<()> {
    let image = UploadedImage::from_path(&path)
        .with_context(|| format!("cannot use {}", path.display()))?;

    let mut session = InsightSession::new(
        HttpRelay::new(args.endpoint),
        Bounds::new(args.width, args.height),
    );
    session.select_image(image).await;
    if let Some(preview) = session.preview() {
        info!(
            "Preview {}x{} ({} byte data URL)",
            preview.size.width,
            preview.size.height,
            preview.data_url.len()
        );
    }
    configure(&mut session);

    let submitted = session.submit().await.map(str::to_owned);
    for note in session.drain_notifications() {
        match note.kind {
            NotificationKind::Success => info!("{}", note.message),
            NotificationKind::Failure => tracing::warn!("{}", note.message),
        }
    }
    let text = match submitted {
        Ok(text) => text,
        Err(err) => {
            let message = session.error().unwrap_or("request failed").to_string();
            return Err(anyhow::Error::new(err).context(message));
        }
    };

    if args.html {
        let policy = if args.escape_markup {
            MarkupPolicy::Escape
        } else {
            MarkupPolicy::Passthrough
        };
        let (mode, html) = render::to_html(&text, policy);
        info!("Rendered as {}", mode.label());
        println!("{html}");
    } else {
        println!("{}", render::to_terminal(&text));
    }

    if args.copy {
        let mut clipboard = SystemClipboard::new()?;
        session.copy_result(&mut clipboard);
        for note in session.drain_notifications() {
            info!("{}", note.message);
        }
    }

    Ok(())
}

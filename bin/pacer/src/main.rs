use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser};
use iori_pacer::{
    reqwest::{
        header::{HeaderMap, HeaderName, HeaderValue},
        Client,
    },
    HttpClient, HttpFetcher, Representation, SchedulerBuilder, SchedulerState, WriterSink,
};
use tokio::io::AsyncWrite;

mod config;

use config::Config;

/// Interval at which the simulated player reports its position.
const TICK: Duration = Duration::from_millis(250);

#[derive(Parser, Clone, Debug)]
#[clap(version, about)]
struct PacerArgs {
    /// Stream description
    #[clap(short, long, env = "PACER_CONFIG", default_value = "pacer.toml")]
    config: PathBuf,

    /// Write the stream to a file instead of stdout
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Start playback at this position, in seconds
    #[clap(short, long)]
    start: Option<f64>,

    /// Playback speed of the simulated player
    #[clap(long, default_value = "1.0")]
    rate: f64,

    #[clap(flatten)]
    http: HttpOptions,
}

#[derive(Args, Clone, Debug)]
struct HttpOptions {
    /// Additional HTTP headers
    #[clap(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Cookies sent along with segment requests
    #[clap(long = "cookie")]
    cookies: Vec<String>,

    /// HTTP timeout, in seconds
    #[clap(short, long, default_value = "10")]
    timeout: u64,
}

impl HttpOptions {
    fn into_client(self, base_url: &url::Url) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }

        let client = HttpClient::new(
            Client::builder()
                .default_headers(headers)
                .timeout(Duration::from_secs(self.timeout)),
        )?;
        if !self.cookies.is_empty() {
            client.add_cookies(self.cookies, base_url.clone())?;
        }
        Ok(client)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .try_from_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = PacerArgs::parse();
    let config = Config::load(&args.config)?;
    let client = args.http.clone().into_client(&config.stream.base_url)?;

    match &args.output {
        Some(output) => {
            let file = tokio::fs::File::create(output).await?;
            play(&args, config, client, WriterSink::new(file)).await
        }
        None => play(&args, config, client, WriterSink::new(tokio::io::stdout())).await,
    }
}

async fn play<W>(
    args: &PacerArgs,
    config: Config,
    client: HttpClient,
    sink: WriterSink<W>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let stream_type = config.stream.stream_type()?;
    let timeline = config.stream.timeline(&client).await?;
    let representation = Representation::new(
        config.stream.representation.clone(),
        config.stream.bandwidth,
        timeline,
    );

    let scheduler = SchedulerBuilder::new(stream_type)
        .config(config.scheduler.into())
        .build(sink, HttpFetcher::new(client));
    scheduler.set_representation(representation)?;
    if let Some(start) = args.start {
        scheduler.seek(Duration::from_secs_f64(start))?;
    }
    scheduler.start()?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interval = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, stopping");
                break;
            }
            _ = interval.tick() => {
                if scheduler.state() == SchedulerState::Stopped {
                    break;
                }
                // Without a start position the player begins where the first segment does.
                if let Some(position) = scheduler.playback_position() {
                    scheduler.on_time_updated(position + TICK.mul_f64(args.rate));
                }
            }
        }
    }

    scheduler.stop().await;
    Ok(())
}

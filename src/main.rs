use anyhow::Result;
use clap::Parser;
use skycast::App;
use skycast_core::Config;

/// Current weather for an address
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about)]
struct Cli {
    /// Free-text address, e.g. "1 Market St, San Francisco"
    #[arg(required = true, num_args = 1..)]
    address: Vec<String>,

    /// Print the JSON envelope on a single line
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    skycast_core::init()?;
    let cli = Cli::parse();

    let (config, _validation) = Config::load_validated()?;
    tracing::debug!("Loaded config from {}", config.config_dir.display());

    let app = App::new(&config)?;
    let response = app.lookup(&cli.address.join(" ")).await;

    let rendered = if cli.compact {
        serde_json::to_string(&response.body)?
    } else {
        serde_json::to_string_pretty(&response.body)?
    };
    println!("{}", rendered);

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

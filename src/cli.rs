use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "charge-core-rs",
    version,
    about = "EV charging telemetry core (ingestion + correlation)"
)]
pub struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

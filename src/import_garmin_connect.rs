use env_logger::Env;
use log::error;

use garmin_cli::garmin_cli_opts::GarminImportOpts;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let opts = GarminImportOpts::parse_args();
    env_logger::Builder::from_env(Env::default().default_filter_or(opts.log.as_str())).init();

    if let Err(e) = opts.process_args().await {
        error!("{e}");
        std::process::exit(1);
    }
}

use log::error;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = mcsm::run().await {
        error!("fatal: {e}");
        std::process::exit(1);
    }
}

use clap::Parser;
use eyre::Result;

use leetcode_solver::{
    app,
    config::{self, get_openai_proxy, Config},
    init_logger,
    request::build_handler,
};

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = Config::parse();
    init_logger(config.log_spec())?;
    config::init_openai_env();

    let handler = build_handler(
        config.handler_type,
        config.generation_timeout(),
        get_openai_proxy(),
    )?;
    log::debug!(
        "Using {:?} handler with model {}",
        config.handler_type,
        config.model_name()
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    if config.interactive {
        rt.block_on(app::run_interactive(&config, handler))
    } else {
        if config.image.is_none() {
            eyre::bail!("no screenshot given, pass an image path or use --interactive");
        }
        rt.block_on(app::run_once(&config, handler))
    }
}

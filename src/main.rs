use anyhow::Result;
use log::error;
use naturkartan::cli::ShellCommands;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = ShellCommands.run().await {
        // no-op if the config was read and logging is set up
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
        error!("CATASTROPHIC FAILURE: {e}");
        return Err(e);
    }
    Ok(())
}

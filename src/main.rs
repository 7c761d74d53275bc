//! gmail-actions - Entry point for the rule-driven Gmail CLI

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = gmail_actions::cli::run().await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

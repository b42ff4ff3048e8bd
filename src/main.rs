// src/main.rs

use std::process::ExitCode;

use bootdag::{cli, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("bootdag: cannot set up logging: {err:?}");
        return ExitCode::FAILURE;
    }

    match bootdag::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "startup failed");
            eprintln!("bootdag error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

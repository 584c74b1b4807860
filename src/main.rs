use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match lucidcare::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Fatal: {e}");
            eprintln!("lucidcare: {e}");
            ExitCode::FAILURE
        }
    }
}

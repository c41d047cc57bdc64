use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    twinquery_cli::run().await
}
